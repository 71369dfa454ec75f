use crate::collectors::{run_command, MetricSource, Reading, Scalar, SourceUnavailable};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

/// Minimum uid for human accounts on most Linux systems.
const HUMAN_UID_THRESHOLD: u32 = 1000;

/// Created and currently-active user accounts, from /etc/passwd plus `who`.
pub struct UsersSource {
    command_timeout: Duration,
}

impl UsersSource {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }
}

#[async_trait]
impl MetricSource for UsersSource {
    fn name(&self) -> &'static str {
        "users"
    }

    async fn collect(&self) -> Result<Reading, SourceUnavailable> {
        let passwd = fs::read_to_string("/etc/passwd")
            .map_err(|err| SourceUnavailable::new(format!("cannot read /etc/passwd: {err}")))?;
        let user_names = human_accounts(&passwd);

        let who_output = run_command("who", &[], self.command_timeout).await?;
        let active = active_users(&who_output);

        let mut reading = Reading::new();
        reading.push("Total users:", Scalar::Int(user_names.len() as i64));
        reading.push("Usernames:", Scalar::List(user_names));
        reading.push("Active user", Scalar::Int(active as i64));
        Ok(reading)
    }
}

fn human_accounts(passwd: &str) -> Vec<String> {
    passwd
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?;
            let _password = fields.next()?;
            let uid = fields.next()?.parse::<u32>().ok()?;
            (uid >= HUMAN_UID_THRESHOLD && name != "nobody").then(|| name.to_string())
        })
        .collect()
}

fn active_users(who_output: &str) -> usize {
    who_output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .collect::<HashSet<_>>()
        .len()
}

/// Active socket listing from `ss -t -u -p -a -n`: the header line is kept as
/// a description, the rest become the connection list.
pub struct ConnectionsSource {
    command_timeout: Duration,
}

impl ConnectionsSource {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }
}

#[async_trait]
impl MetricSource for ConnectionsSource {
    fn name(&self) -> &'static str {
        "connections"
    }

    async fn collect(&self) -> Result<Reading, SourceUnavailable> {
        let output = run_command("ss", &["-t", "-u", "-p", "-a", "-n"], self.command_timeout)
            .await?;
        let (description, connections) = parse_socket_listing(&output)?;

        let mut reading = Reading::new();
        reading.push(
            "Number active connections",
            Scalar::Int(connections.len() as i64),
        );
        reading.push("Description", Scalar::Text(description));
        reading.push("List active connections", Scalar::List(connections));
        Ok(reading)
    }
}

fn parse_socket_listing(output: &str) -> Result<(String, Vec<String>), SourceUnavailable> {
    let mut lines = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty());
    let description = lines
        .next()
        .ok_or_else(|| SourceUnavailable::new("empty socket listing".to_string()))?
        .to_string();
    let connections = lines.map(str::to_string).collect();
    Ok((description, connections))
}

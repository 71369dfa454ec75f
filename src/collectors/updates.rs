use crate::collectors::{MetricSource, Reading, Scalar, SourceUnavailable};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use sysinfo::{System, SystemExt};

/// Checks whether a newer distribution release is published. Only meaningful
/// for Ubuntu/Debian; other distributions report `false` without touching the
/// network.
pub struct UpdateSource {
    client: Client,
    url: String,
    timeout: Duration,
}

impl UpdateSource {
    pub fn new(client: Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MetricSource for UpdateSource {
    fn name(&self) -> &'static str {
        "updates"
    }

    async fn collect(&self) -> Result<Reading, SourceUnavailable> {
        let system = System::new();
        let distribution = system.distribution_id();
        let current = system.os_version().unwrap_or_default();

        let update_available = if matches!(distribution.as_str(), "ubuntu" | "debian") {
            let response = self
                .client
                .get(&self.url)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|err| SourceUnavailable::new(format!("update check failed: {err}")))?;

            if response.status().is_success() {
                let body = response.text().await.map_err(|err| {
                    SourceUnavailable::new(format!("update check body read failed: {err}"))
                })?;
                let latest = latest_version(&body).ok_or_else(|| {
                    SourceUnavailable::new("unrecognized meta-release format".to_string())
                })?;
                version_newer(&latest, &current)
            } else {
                false
            }
        } else {
            false
        };

        let mut reading = Reading::new();
        reading.push("Update available", Scalar::Bool(update_available));
        Ok(reading)
    }
}

/// The meta-release feed carries the release version on its third line as
/// `key=value`.
fn latest_version(body: &str) -> Option<String> {
    body.lines()
        .nth(2)?
        .split('=')
        .nth(1)
        .map(|v| v.trim().to_string())
}

/// Compares dotted versions segment by segment as numbers, so "10.04" orders
/// after "9.10". Non-numeric segments count as zero.
fn version_newer(candidate: &str, current: &str) -> bool {
    segments(candidate) > segments(current)
}

fn segments(version: &str) -> Vec<u64> {
    version
        .trim()
        .split('.')
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect()
}

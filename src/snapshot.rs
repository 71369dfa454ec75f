use crate::collectors::accounts::{ConnectionsSource, UsersSource};
use crate::collectors::sensors::TemperatureSource;
use crate::collectors::system::{
    CpuSource, DiskSource, KernelSource, MemorySource, NetworkSource, UptimeSource,
};
use crate::collectors::updates::UpdateSource;
use crate::collectors::{MetricSource, Reading};
use crate::config::Config;
use crate::host;
use bson::{doc, Bson, Document};
use reqwest::Client;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Size of the fixed chart taxonomy. Every run persists exactly this many
/// chart definitions and host reports.
pub const CHART_COUNT: usize = 10;

/// Static taxonomy entry. Ids are stable across runs and deployments; a
/// chart's identity never changes once assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartDefinition {
    pub id: i32,
    pub title: &'static str,
}

impl ChartDefinition {
    pub fn to_document(&self) -> Document {
        doc! { "_id": self.id, "Title": self.title }
    }
}

/// One metric reading attached to a point in time. Append-only once written.
#[derive(Debug, Clone, PartialEq)]
pub struct HostReport {
    pub chart: i32,
    pub hostserver: Option<String>,
    pub ts: i64,
    /// `None` when the source signaled unavailability; the entry is still
    /// emitted so chart cardinality per run stays fixed.
    pub payload: Option<Reading>,
}

impl HostReport {
    pub fn to_document(&self) -> Document {
        doc! {
            "chart": self.chart,
            "hostserver": self.hostserver.clone(),
            "ts": self.ts,
            "hostreport": self.payload.clone().map(Document::from).map(Bson::Document).unwrap_or(Bson::Null),
        }
    }
}

/// One row per monitored host, keyed by its operational network address.
/// Replaced in full on every run (last-write-wins).
#[derive(Debug, Clone, PartialEq)]
pub struct HostIdentity {
    pub key: Option<String>,
    pub created: i64,
    pub info: String,
    pub tag: String,
}

impl HostIdentity {
    pub fn id(&self) -> Bson {
        self.key.clone().map(Bson::String).unwrap_or(Bson::Null)
    }

    pub fn to_document(&self) -> Document {
        doc! {
            "_id": self.id(),
            "Created": self.created,
            "Info": self.info.clone(),
            "Type": self.tag.clone(),
        }
    }
}

/// All three document families produced by one run.
#[derive(Debug)]
pub struct Snapshot {
    pub charts: Vec<ChartDefinition>,
    pub reports: Vec<HostReport>,
    pub host: HostIdentity,
}

/// Fixed ordered mapping of chart id to metric source. The pairing is the
/// single place where chart identity is assigned.
pub fn taxonomy(cfg: &Config, client: &Client) -> Vec<(ChartDefinition, Box<dyn MetricSource>)> {
    let command_timeout = Duration::from_millis(cfg.command_timeout_ms);
    let update_timeout = Duration::from_millis(cfg.update_check.timeout_ms);

    vec![
        (chart(1, "Cpu Info"), Box::new(CpuSource)),
        (chart(2, "Memory Info"), Box::new(MemorySource)),
        (
            chart(3, "Disk Info"),
            Box::new(DiskSource::new(cfg.disk_mount.clone())),
        ),
        (chart(4, "Kernel Info"), Box::new(KernelSource)),
        (chart(5, "Network Info"), Box::new(NetworkSource)),
        (chart(6, "System Uptime"), Box::new(UptimeSource)),
        (
            chart(7, "Temperature Info"),
            Box::new(TemperatureSource::new(
                cfg.temp_disk_device.clone(),
                cfg.disk_temp_command.clone(),
                command_timeout,
            )),
        ),
        (
            chart(8, "Update Available"),
            Box::new(UpdateSource::new(
                client.clone(),
                cfg.update_check.url.clone(),
                update_timeout,
            )),
        ),
        (chart(9, "Users"), Box::new(UsersSource::new(command_timeout))),
        (
            chart(10, "Connections"),
            Box::new(ConnectionsSource::new(command_timeout)),
        ),
    ]
}

fn chart(id: i32, title: &'static str) -> ChartDefinition {
    ChartDefinition { id, title }
}

/// Builds the three document families for one run. The timestamp is captured
/// once before collection starts and shared by every report, so all readings
/// are correlated as the same moment even though collection takes over a
/// second. Never fails: source failures degrade to a null payload for that
/// one chart.
pub async fn assemble(
    taxonomy: &[(ChartDefinition, Box<dyn MetricSource>)],
    host_key: Option<String>,
    host_type: &str,
) -> Snapshot {
    let ts = now_micros();

    let mut reports = Vec::with_capacity(taxonomy.len());
    for (chart, source) in taxonomy {
        let payload = match source.collect().await {
            Ok(reading) => Some(reading),
            Err(err) => {
                warn!(chart = chart.id, source = source.name(), error = %err, "metric source unavailable");
                None
            }
        };
        reports.push(HostReport {
            chart: chart.id,
            hostserver: host_key.clone(),
            ts,
            payload,
        });
    }

    let charts = taxonomy.iter().map(|(chart, _)| chart.clone()).collect();
    let identity = HostIdentity {
        key: host_key,
        created: ts,
        info: host::display_name(),
        tag: host_type.to_string(),
    };

    Snapshot {
        charts,
        reports,
        host: identity,
    }
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

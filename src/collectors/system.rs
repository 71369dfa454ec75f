use crate::collectors::{MetricSource, Reading, Scalar, SourceUnavailable};
use async_trait::async_trait;
use std::time::Duration;
use sysinfo::{CpuExt, DiskExt, NetworkExt, NetworksExt, System, SystemExt};
use tokio::time;

/// Two refreshes separated by this interval give a usage percentage over a
/// real sampling window instead of an instantaneous guess.
const CPU_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

pub struct CpuSource;

#[async_trait]
impl MetricSource for CpuSource {
    fn name(&self) -> &'static str {
        "cpu"
    }

    async fn collect(&self) -> Result<Reading, SourceUnavailable> {
        let mut system = System::new();
        system.refresh_cpu();
        time::sleep(CPU_SAMPLE_INTERVAL).await;
        system.refresh_cpu();

        let physical = system
            .physical_core_count()
            .map(|v| Scalar::Int(v as i64))
            .unwrap_or(Scalar::Null);
        let logical = system.cpus().len() as i64;
        let frequency = system
            .cpus()
            .first()
            .map(|c| Scalar::Int(c.frequency() as i64))
            .unwrap_or(Scalar::Null);
        let usage = if system.cpus().is_empty() {
            Scalar::Null
        } else {
            let sum: f32 = system.cpus().iter().map(|c| c.cpu_usage()).sum();
            Scalar::Int((sum / system.cpus().len() as f32) as i64)
        };

        let mut reading = Reading::new();
        reading.push("Physical Cores", physical);
        reading.push("Total Cores", Scalar::Int(logical));
        reading.push("Processor Speed", frequency);
        reading.push("Total Cpu Usage", usage);
        Ok(reading)
    }
}

pub struct MemorySource;

#[async_trait]
impl MetricSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn collect(&self) -> Result<Reading, SourceUnavailable> {
        let mut system = System::new();
        system.refresh_memory();

        // Stored in kilobytes, matching the other size charts.
        let mut reading = Reading::new();
        reading.push(
            "Memory (total)",
            Scalar::Int((system.total_memory() / 1024) as i64),
        );
        reading.push(
            "Memory (used)",
            Scalar::Int((system.used_memory() / 1024) as i64),
        );
        reading.push(
            "Memory (free)",
            Scalar::Int((system.free_memory() / 1024) as i64),
        );
        Ok(reading)
    }
}

pub struct DiskSource {
    mount: String,
}

impl DiskSource {
    pub fn new(mount: impl Into<String>) -> Self {
        Self {
            mount: mount.into(),
        }
    }
}

#[async_trait]
impl MetricSource for DiskSource {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn collect(&self) -> Result<Reading, SourceUnavailable> {
        let mut system = System::new();
        system.refresh_disks_list();
        system.refresh_disks();

        let usage = system
            .disks()
            .iter()
            .find(|d| d.mount_point().to_string_lossy() == self.mount)
            .map(|d| {
                let total = d.total_space();
                let used = total.saturating_sub(d.available_space());
                (total, used)
            });

        let mut reading = Reading::new();
        match usage {
            Some((total, used)) => {
                reading.push("Disk (total)", Scalar::Int((total / 1024) as i64));
                reading.push("Disk (used)", Scalar::Int((used / 1024) as i64));
                reading.push(
                    "Disk (free)",
                    Scalar::Int((total.saturating_sub(used) / 1024) as i64),
                );
            }
            None => {
                reading.push("Disk (total)", Scalar::Null);
                reading.push("Disk (used)", Scalar::Null);
                reading.push("Disk (free)", Scalar::Null);
            }
        }
        Ok(reading)
    }
}

pub struct KernelSource;

#[async_trait]
impl MetricSource for KernelSource {
    fn name(&self) -> &'static str {
        "kernel"
    }

    async fn collect(&self) -> Result<Reading, SourceUnavailable> {
        let system = System::new();

        let mut reading = Reading::new();
        reading.push("Kernel Version", text_or_null(system.kernel_version()));
        reading.push("System Name", text_or_null(system.name()));
        reading.push("Node Name", text_or_null(system.host_name()));
        reading.push("Machine", Scalar::Text(std::env::consts::ARCH.to_string()));
        Ok(reading)
    }
}

pub struct NetworkSource;

#[async_trait]
impl MetricSource for NetworkSource {
    fn name(&self) -> &'static str {
        "network"
    }

    async fn collect(&self) -> Result<Reading, SourceUnavailable> {
        let mut system = System::new();
        system.refresh_networks_list();
        system.refresh_networks();

        let mut bytes_sent = 0_u64;
        let mut bytes_recv = 0_u64;
        let mut packets_sent = 0_u64;
        let mut packets_recv = 0_u64;
        for (_iface, data) in system.networks() {
            bytes_sent += data.total_transmitted();
            bytes_recv += data.total_received();
            packets_sent += data.total_packets_transmitted();
            packets_recv += data.total_packets_received();
        }

        let mut reading = Reading::new();
        reading.push("Bytes Sent", Scalar::Int(bytes_sent as i64));
        reading.push("Bytes Recv", Scalar::Int(bytes_recv as i64));
        reading.push("Packets Sent", Scalar::Int(packets_sent as i64));
        reading.push("Packets Recv", Scalar::Int(packets_recv as i64));
        Ok(reading)
    }
}

pub struct UptimeSource;

#[async_trait]
impl MetricSource for UptimeSource {
    fn name(&self) -> &'static str {
        "uptime"
    }

    async fn collect(&self) -> Result<Reading, SourceUnavailable> {
        let system = System::new();

        let mut reading = Reading::new();
        reading.push("Uptime", Scalar::Text(format_uptime(system.uptime())));
        Ok(reading)
    }
}

fn text_or_null(value: Option<String>) -> Scalar {
    value.map(Scalar::Text).unwrap_or(Scalar::Null)
}

fn format_uptime(total_seconds: u64) -> String {
    let minutes = total_seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    format!(
        "{} days, {} hours, {} minutes, {} seconds",
        days,
        hours % 24,
        minutes % 60,
        total_seconds % 60
    )
}

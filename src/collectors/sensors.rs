use crate::collectors::{run_command, MetricSource, Reading, Scalar, SourceUnavailable};
use async_trait::async_trait;
use std::time::Duration;
use sysinfo::{ComponentExt, System, SystemExt};

/// Temperature probe: CPU package via sysinfo components, one SATA disk via an
/// external helper script, one NVMe device via its component sensor. Every
/// sensor that cannot be read stays `Null` in the reading; the source itself
/// never signals unavailability.
pub struct TemperatureSource {
    disk_device: String,
    command: String,
    command_timeout: Duration,
}

impl TemperatureSource {
    pub fn new(
        disk_device: impl Into<String>,
        command: impl Into<String>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            disk_device: disk_device.into(),
            command: command.into(),
            command_timeout,
        }
    }

    fn disk_label(&self) -> String {
        format!("Disk({})", self.disk_device)
    }

    /// All sensors start out null so the payload shape is identical whether
    /// or not any hardware is readable.
    fn baseline(&self) -> Reading {
        let mut reading = Reading::new();
        reading.push("CPU", Scalar::Null);
        reading.push(self.disk_label(), Scalar::Null);
        reading.push("Disk(NVMe0)", Scalar::Null);
        reading
    }
}

#[async_trait]
impl MetricSource for TemperatureSource {
    fn name(&self) -> &'static str {
        "temperature"
    }

    async fn collect(&self) -> Result<Reading, SourceUnavailable> {
        let mut reading = self.baseline();

        let mut system = System::new();
        system.refresh_components_list();
        system.refresh_components();

        if let Some(temp) = cpu_package_temperature(&system) {
            reading.set("CPU", Scalar::Float(temp));
        }
        if let Some(temp) = nvme_temperature(&system) {
            reading.set("Disk(NVMe0)", Scalar::Int(temp as i64));
        }

        let device_path = format!("/dev/{}", self.disk_device);
        match run_command(&self.command, &[&device_path], self.command_timeout).await {
            Ok(output) => {
                if let Ok(temp) = output.trim().parse::<i64>() {
                    reading.set(&self.disk_label(), Scalar::Int(temp));
                }
            }
            Err(err) => {
                tracing::debug!(device = %self.disk_device, error = %err, "disk temperature helper unavailable");
            }
        }

        Ok(reading)
    }
}

fn cpu_package_temperature(system: &System) -> Option<f64> {
    let components = system.components();
    let package = components
        .iter()
        .find(|c| c.label().contains("Package id 0"))
        .or_else(|| {
            components.iter().find(|c| {
                let label = c.label().to_lowercase();
                label.contains("tctl") || label.contains("tdie")
            })
        })?;
    let temp = package.temperature() as f64;
    (temp > 0.0).then_some(temp)
}

fn nvme_temperature(system: &System) -> Option<f64> {
    let components = system.components();
    let sensor = components
        .iter()
        .find(|c| {
            let label = c.label().to_lowercase();
            label.contains("nvme") && label.contains("sensor 1")
        })
        .or_else(|| {
            components
                .iter()
                .find(|c| c.label().to_lowercase().contains("composite"))
        })?;
    let temp = sensor.temperature() as f64;
    (temp > 0.0).then_some(temp)
}

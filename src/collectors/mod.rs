pub mod accounts;
pub mod sensors;
pub mod system;
pub mod updates;

use async_trait::async_trait;
use bson::{Bson, Document};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time;

/// One labeled value inside a metric reading. Absent sensors are `Null`,
/// never an error, so a single dead sensor cannot abort the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    List(Vec<String>),
    Null,
}

impl From<Scalar> for Bson {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Int(v) => Bson::Int64(v),
            Scalar::Float(v) => Bson::Double(v),
            Scalar::Bool(v) => Bson::Boolean(v),
            Scalar::Text(v) => Bson::String(v),
            Scalar::List(v) => Bson::Array(v.into_iter().map(Bson::String).collect()),
            Scalar::Null => Bson::Null,
        }
    }
}

/// Ordered label → value mapping produced by one metric source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reading {
    entries: Vec<(String, Scalar)>,
}

impl Reading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: impl Into<String>, value: Scalar) {
        self.entries.push((label.into(), value));
    }

    pub fn set(&mut self, label: &str, value: Scalar) {
        match self.entries.iter_mut().find(|(l, _)| l == label) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((label.to_string(), value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Reading> for Document {
    fn from(reading: Reading) -> Self {
        let mut doc = Document::new();
        for (label, value) in reading.entries {
            doc.insert(label, Bson::from(value));
        }
        doc
    }
}

impl FromIterator<(String, Scalar)> for Reading {
    fn from_iter<I: IntoIterator<Item = (String, Scalar)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Signaled by sources that depend on an external command or service when
/// that dependency cannot be reached. Degrades the one chart to an empty
/// reading; never fatal for the run.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SourceUnavailable(pub String);

impl SourceUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    async fn collect(&self) -> Result<Reading, SourceUnavailable>;
}

/// Runs an external command under a timeout. Every failure mode (spawn
/// error, timeout, non-zero exit) maps to `SourceUnavailable` so a stuck
/// or missing tool never stalls or aborts the run.
pub(crate) async fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<String, SourceUnavailable> {
    let output = time::timeout(timeout, Command::new(program).args(args).output())
        .await
        .map_err(|_elapsed| SourceUnavailable::new(format!("{program} timed out")))?
        .map_err(|err| SourceUnavailable::new(format!("{program} failed to start: {err}")))?;

    if !output.status.success() {
        return Err(SourceUnavailable::new(format!(
            "{program} exited with {}",
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn reading_converts_to_document_in_insertion_order() {
        let mut reading = Reading::new();
        reading.push("Total Cores", Scalar::Int(8));
        reading.push("Processor Speed", Scalar::Null);
        reading.push("Names", Scalar::List(vec!["a".to_string(), "b".to_string()]));

        let doc = Document::from(reading);
        assert_eq!(
            doc,
            doc! { "Total Cores": 8_i64, "Processor Speed": null, "Names": ["a", "b"] }
        );
    }

    #[test]
    fn set_replaces_existing_label_in_place() {
        let mut reading = Reading::new();
        reading.push("CPU", Scalar::Null);
        reading.push("Disk(sda)", Scalar::Null);
        reading.set("CPU", Scalar::Float(41.5));

        let doc = Document::from(reading);
        assert_eq!(doc, doc! { "CPU": 41.5, "Disk(sda)": null });
    }

    #[tokio::test]
    async fn run_command_reports_missing_binary_as_unavailable() {
        let err = run_command(
            "hostsnap-no-such-binary",
            &[],
            Duration::from_millis(500),
        )
        .await
        .expect_err("missing binary must be unavailable");
        assert!(err.0.contains("failed to start"));
    }

    #[tokio::test]
    async fn run_command_times_out() {
        let err = run_command("sleep", &["5"], Duration::from_millis(50))
            .await
            .expect_err("sleep must exceed the timeout");
        assert!(err.0.contains("timed out"));
    }
}

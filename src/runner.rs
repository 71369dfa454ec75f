use crate::collectors::MetricSource;
use crate::config::Config;
use crate::host;
use crate::snapshot::{self, ChartDefinition};
use crate::store::{DocumentStore, Gateway, StoreError, WriteOutcome};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Outcome of one successful collect-and-persist cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub elapsed: Duration,
    pub host_key: Option<String>,
    pub charts: WriteOutcome,
    /// `None` when persistence was skipped because no host key resolved.
    pub host: Option<WriteOutcome>,
    pub reports: Option<WriteOutcome>,
}

/// Fatal cycle failure, carrying the elapsed time up to the point of failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct CycleError {
    pub elapsed: Duration,
    pub error: StoreError,
}

/// Executes one full cycle: resolve host identity, assemble the snapshot,
/// then persist charts, host identity and reports in that order. Charts and
/// host identity must be durable before reports are written, since reports
/// reference both by key.
pub async fn execute_cycle<S: DocumentStore>(
    cfg: &Config,
    gateway: &Gateway<S>,
    taxonomy: &[(ChartDefinition, Box<dyn MetricSource>)],
) -> Result<CycleReport, CycleError> {
    let host_key = host::resolve_host_key(&cfg.interface);
    if host_key.is_none() {
        warn!(interface = %cfg.interface, "no IPv4 address on interface, host identity and reports will be skipped");
    }
    run_with_key(cfg, gateway, taxonomy, host_key).await
}

async fn run_with_key<S: DocumentStore>(
    cfg: &Config,
    gateway: &Gateway<S>,
    taxonomy: &[(ChartDefinition, Box<dyn MetricSource>)],
    host_key: Option<String>,
) -> Result<CycleReport, CycleError> {
    let start = Instant::now();
    let fatal = |error: StoreError| CycleError {
        elapsed: start.elapsed(),
        error,
    };

    let snapshot = snapshot::assemble(taxonomy, host_key.clone(), &cfg.host_type).await;

    let charts = gateway
        .persist_charts(&snapshot.charts)
        .await
        .map_err(fatal)?;

    // Writing host identity or reports under a null key would produce
    // documents no reader can correlate; skip them and keep the run green.
    let (host, reports) = if host_key.is_some() {
        let host = gateway
            .persist_host(&snapshot.host)
            .await
            .map_err(fatal)?;
        let reports = gateway
            .persist_reports(&snapshot.reports)
            .await
            .map_err(fatal)?;
        (Some(host), Some(reports))
    } else {
        (None, None)
    };

    let elapsed = start.elapsed();
    info!(
        host = host_key.as_deref().unwrap_or("<unresolved>"),
        charts = snapshot.charts.len(),
        elapsed_secs = elapsed.as_secs_f64(),
        "snapshot persisted"
    );

    Ok(CycleReport {
        elapsed,
        host_key,
        charts,
        host,
        reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::testing::fake_taxonomy;
    use crate::snapshot::CHART_COUNT;
    use crate::store::memory::MemoryStore;
    use crate::store::{CHARTS_COLLECTION, HOSTS_COLLECTION, REPORTS_COLLECTION};

    fn test_config() -> Config {
        serde_yaml::from_str(
            "mongo_uri: \"mongodb://localhost:27017\"\ndatabase_name: \"db\"\ninterface: \"wg0\"\n",
        )
        .expect("config should parse")
    }

    #[tokio::test]
    async fn full_cycle_persists_all_three_families() {
        let cfg = test_config();
        let gateway = Gateway::new(MemoryStore::new());
        let taxonomy = fake_taxonomy(&[]);

        let report = run_with_key(&cfg, &gateway, &taxonomy, Some("10.0.0.5".to_string()))
            .await
            .expect("cycle should succeed");

        assert_eq!(report.host_key.as_deref(), Some("10.0.0.5"));
        assert_eq!(report.charts, WriteOutcome::Inserted { count: CHART_COUNT });
        assert_eq!(report.host, Some(WriteOutcome::Inserted { count: 1 }));
        assert_eq!(
            report.reports,
            Some(WriteOutcome::Inserted { count: CHART_COUNT })
        );

        let store = gateway.store();
        assert_eq!(store.docs(CHARTS_COLLECTION).len(), CHART_COUNT);
        assert_eq!(store.docs(HOSTS_COLLECTION).len(), 1);
        assert_eq!(store.docs(REPORTS_COLLECTION).len(), CHART_COUNT);
    }

    #[tokio::test]
    async fn unavailable_sources_do_not_change_cardinality() {
        let cfg = test_config();
        let gateway = Gateway::new(MemoryStore::new());
        let taxonomy = fake_taxonomy(&[2, 7, 9]);

        let report = run_with_key(&cfg, &gateway, &taxonomy, Some("10.0.0.5".to_string()))
            .await
            .expect("unavailable sources are never fatal");

        assert_eq!(report.charts, WriteOutcome::Inserted { count: CHART_COUNT });
        assert_eq!(
            gateway.store().docs(REPORTS_COLLECTION).len(),
            CHART_COUNT
        );
    }

    #[tokio::test]
    async fn null_host_key_skips_identity_and_reports() {
        let cfg = test_config();
        let gateway = Gateway::new(MemoryStore::new());
        let taxonomy = fake_taxonomy(&[]);

        let report = run_with_key(&cfg, &gateway, &taxonomy, None)
            .await
            .expect("null key is not a failure");

        assert_eq!(report.host_key, None);
        assert_eq!(report.host, None);
        assert_eq!(report.reports, None);

        let store = gateway.store();
        // Charts are not tied to the host key and are still asserted.
        assert_eq!(store.docs(CHARTS_COLLECTION).len(), CHART_COUNT);
        assert!(store.docs(HOSTS_COLLECTION).is_empty());
        assert!(store.docs(REPORTS_COLLECTION).is_empty());
    }

    #[tokio::test]
    async fn second_run_updates_host_identity_in_place() {
        let cfg = test_config();
        let gateway = Gateway::new(MemoryStore::new());
        let taxonomy = fake_taxonomy(&[]);

        run_with_key(&cfg, &gateway, &taxonomy, Some("10.0.0.5".to_string()))
            .await
            .expect("first run");
        let second = run_with_key(&cfg, &gateway, &taxonomy, Some("10.0.0.5".to_string()))
            .await
            .expect("second run");

        assert_eq!(
            second.charts,
            WriteOutcome::SkippedDuplicates {
                inserted: 0,
                skipped: CHART_COUNT
            }
        );
        assert_eq!(second.host, Some(WriteOutcome::UpdatedViaConflict));
        assert_eq!(gateway.store().docs(HOSTS_COLLECTION).len(), 1);
    }

    #[tokio::test]
    async fn fatal_chart_write_stops_the_cycle_before_later_families() {
        let cfg = test_config();
        let store = MemoryStore::new();
        store.fail_next_write(StoreError::Transport("connection refused".to_string()));
        let gateway = Gateway::new(store);
        let taxonomy = fake_taxonomy(&[]);

        let err = run_with_key(&cfg, &gateway, &taxonomy, Some("10.0.0.5".to_string()))
            .await
            .expect_err("transport failure must be fatal");
        assert!(matches!(err.error, StoreError::Transport(_)));

        let store = gateway.store();
        assert!(store.docs(HOSTS_COLLECTION).is_empty());
        assert!(store.docs(REPORTS_COLLECTION).is_empty());
    }
}

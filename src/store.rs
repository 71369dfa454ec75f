use crate::snapshot::{ChartDefinition, HostIdentity, HostReport};
use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, InsertManyOptions, ReplaceOptions};
use mongodb::{Client, Database};
use thiserror::Error;
use tracing::{info, warn};

pub const CHARTS_COLLECTION: &str = "hostcharts";
pub const HOSTS_COLLECTION: &str = "hosts";
pub const REPORTS_COLLECTION: &str = "hostreports";

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A document with the same key already exists. Expected for chart and
    /// host identity writes; handled inside the gateway and never surfaced
    /// past it.
    #[error("duplicate key in {collection}: {message}")]
    Duplicate { collection: String, message: String },
    /// Connection, server selection or authentication problem. Fatal for the
    /// run, not retried.
    #[error("store transport failure: {0}")]
    Transport(String),
    /// Any other store error. Fatal, surfaced verbatim.
    #[error("unexpected store error: {0}")]
    Unexpected(String),
}

/// Result of an unordered bulk insert: everything not listed as a duplicate
/// was committed.
#[derive(Debug, Default)]
pub struct BulkReport {
    pub inserted: usize,
    pub duplicates: Vec<String>,
}

/// Collection-oriented store boundary: bulk insert, single insert and
/// upsert-by-key, with duplicate-key violations signaled distinctly from
/// other write errors.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Unordered insert; duplicate-key entries are reported, the rest commit.
    async fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<BulkReport, StoreError>;

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<(), StoreError>;

    /// Replaces the document under `id`, creating it when absent.
    async fn replace_by_id(
        &self,
        collection: &str,
        id: Bson,
        doc: Document,
    ) -> Result<(), StoreError>;
}

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|err| classify("", err))?;
        let client = Client::with_options(options).map_err(|err| classify("", err))?;
        Ok(Self {
            db: client.database(database),
        })
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<BulkReport, StoreError> {
        let coll = self.db.collection::<Document>(collection);
        let total = docs.len();
        let options = InsertManyOptions::builder().ordered(false).build();

        match coll.insert_many(docs, options).await {
            Ok(_) => Ok(BulkReport {
                inserted: total,
                duplicates: Vec::new(),
            }),
            Err(err) => match err.kind.as_ref() {
                ErrorKind::BulkWrite(failure) => {
                    let write_errors = failure.write_errors.clone().unwrap_or_default();
                    let only_duplicates = !write_errors.is_empty()
                        && write_errors.iter().all(|e| e.code == DUPLICATE_KEY_CODE)
                        && failure.write_concern_error.is_none();
                    if only_duplicates {
                        let duplicates: Vec<String> =
                            write_errors.into_iter().map(|e| e.message).collect();
                        Ok(BulkReport {
                            inserted: total - duplicates.len(),
                            duplicates,
                        })
                    } else {
                        Err(StoreError::Unexpected(err.to_string()))
                    }
                }
                _ => Err(classify(collection, err)),
            },
        }
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<(), StoreError> {
        let coll = self.db.collection::<Document>(collection);
        coll.insert_one(doc, None)
            .await
            .map(|_| ())
            .map_err(|err| classify(collection, err))
    }

    async fn replace_by_id(
        &self,
        collection: &str,
        id: Bson,
        doc: Document,
    ) -> Result<(), StoreError> {
        let coll = self.db.collection::<Document>(collection);
        let options = ReplaceOptions::builder().upsert(true).build();
        coll.replace_one(doc! { "_id": id }, doc, options)
            .await
            .map(|_| ())
            .map_err(|err| classify(collection, err))
    }
}

fn classify(collection: &str, err: mongodb::error::Error) -> StoreError {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE =>
        {
            StoreError::Duplicate {
                collection: collection.to_string(),
                message: write_error.message.clone(),
            }
        }
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::Authentication { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => StoreError::Transport(err.to_string()),
        _ => StoreError::Unexpected(err.to_string()),
    }
}

/// How a gateway write landed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted { count: usize },
    /// Insert hit an existing key and was repaired by an upsert.
    UpdatedViaConflict,
    /// Benign duplicates were dropped; the rest of the batch committed.
    SkippedDuplicates { inserted: usize, skipped: usize },
}

/// Stateless writer for the three document families. Duplicate-key conflicts
/// are resolved here: charts treat them as no-ops, host identity falls back
/// to an upsert, reports drop the conflicting entry and keep the batch.
/// `StoreError::Duplicate` never escapes these methods.
pub struct Gateway<S> {
    store: S,
}

impl<S: DocumentStore> Gateway<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Re-asserts the full chart taxonomy. Entries already present are
    /// expected and skipped without error.
    pub async fn persist_charts(
        &self,
        charts: &[ChartDefinition],
    ) -> Result<WriteOutcome, StoreError> {
        let docs: Vec<Document> = charts.iter().map(ChartDefinition::to_document).collect();
        let report = self.store.insert_many(CHARTS_COLLECTION, docs).await?;
        Ok(bulk_outcome(CHARTS_COLLECTION, report))
    }

    /// Insert first; an existing key triggers a scoped replace-or-create of
    /// that exact key with the new content (last-write-wins).
    pub async fn persist_host(&self, identity: &HostIdentity) -> Result<WriteOutcome, StoreError> {
        let doc = identity.to_document();
        match self.store.insert_one(HOSTS_COLLECTION, doc.clone()).await {
            Ok(()) => Ok(WriteOutcome::Inserted { count: 1 }),
            Err(StoreError::Duplicate { message, .. }) => {
                warn!(collection = HOSTS_COLLECTION, message = %message, "duplicate key, updating existing document");
                self.store
                    .replace_by_id(HOSTS_COLLECTION, identity.id(), doc)
                    .await?;
                info!(collection = HOSTS_COLLECTION, id = %identity.id(), "host identity updated");
                Ok(WriteOutcome::UpdatedViaConflict)
            }
            Err(err) => Err(err),
        }
    }

    /// Append-only insert. A conflicting entry is dropped with a warning
    /// while the remaining entries still commit.
    pub async fn persist_reports(
        &self,
        reports: &[HostReport],
    ) -> Result<WriteOutcome, StoreError> {
        let docs: Vec<Document> = reports.iter().map(HostReport::to_document).collect();
        let report = self.store.insert_many(REPORTS_COLLECTION, docs).await?;
        Ok(bulk_outcome(REPORTS_COLLECTION, report))
    }
}

fn bulk_outcome(collection: &str, report: BulkReport) -> WriteOutcome {
    if report.duplicates.is_empty() {
        return WriteOutcome::Inserted {
            count: report.inserted,
        };
    }
    for message in &report.duplicates {
        warn!(collection, message = %message, "duplicate key, entry skipped");
    }
    WriteOutcome::SkippedDuplicates {
        inserted: report.inserted,
        skipped: report.duplicates.len(),
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory stand-in for the document store. Enforces `_id` uniqueness
    /// like a real collection; `hostreports` additionally gets a unique
    /// (chart, ts) index when `report_conflicts` is set, to exercise the
    /// partial-success path.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        collections: Mutex<HashMap<String, Vec<Document>>>,
        report_conflicts: bool,
        fail_next_write: Mutex<Option<StoreError>>,
    }

    impl MemoryStore {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with_report_conflicts() -> Self {
            Self {
                report_conflicts: true,
                ..Self::default()
            }
        }

        pub(crate) fn fail_next_write(&self, error: StoreError) {
            *self.fail_next_write.lock().unwrap() = Some(error);
        }

        pub(crate) fn seed(&self, collection: &str, doc: Document) {
            self.collections
                .lock()
                .unwrap()
                .entry(collection.to_string())
                .or_default()
                .push(doc);
        }

        pub(crate) fn docs(&self, collection: &str) -> Vec<Document> {
            self.collections
                .lock()
                .unwrap()
                .get(collection)
                .cloned()
                .unwrap_or_default()
        }

        fn take_failure(&self) -> Option<StoreError> {
            self.fail_next_write.lock().unwrap().take()
        }

        fn conflicts(&self, collection: &str, existing: &[Document], doc: &Document) -> bool {
            if let Some(id) = doc.get("_id") {
                if existing.iter().any(|d| d.get("_id") == Some(id)) {
                    return true;
                }
            }
            if self.report_conflicts && collection == REPORTS_COLLECTION {
                let key = (doc.get("chart"), doc.get("ts"));
                return existing
                    .iter()
                    .any(|d| (d.get("chart"), d.get("ts")) == key);
            }
            false
        }
    }

    #[async_trait]
    impl DocumentStore for MemoryStore {
        async fn insert_many(
            &self,
            collection: &str,
            docs: Vec<Document>,
        ) -> Result<BulkReport, StoreError> {
            if let Some(err) = self.take_failure() {
                return Err(err);
            }

            let mut guard = self.collections.lock().unwrap();
            let existing = guard.entry(collection.to_string()).or_default();
            let mut report = BulkReport::default();
            for doc in docs {
                if self.conflicts(collection, existing, &doc) {
                    report
                        .duplicates
                        .push(format!("E11000 duplicate key: {doc}"));
                } else {
                    existing.push(doc);
                    report.inserted += 1;
                }
            }
            Ok(report)
        }

        async fn insert_one(&self, collection: &str, doc: Document) -> Result<(), StoreError> {
            if let Some(err) = self.take_failure() {
                return Err(err);
            }

            let mut guard = self.collections.lock().unwrap();
            let existing = guard.entry(collection.to_string()).or_default();
            if self.conflicts(collection, existing, &doc) {
                return Err(StoreError::Duplicate {
                    collection: collection.to_string(),
                    message: format!("E11000 duplicate key: {doc}"),
                });
            }
            existing.push(doc);
            Ok(())
        }

        async fn replace_by_id(
            &self,
            collection: &str,
            id: Bson,
            doc: Document,
        ) -> Result<(), StoreError> {
            if let Some(err) = self.take_failure() {
                return Err(err);
            }

            let mut guard = self.collections.lock().unwrap();
            let existing = guard.entry(collection.to_string()).or_default();
            match existing.iter_mut().find(|d| d.get("_id") == Some(&id)) {
                Some(slot) => *slot = doc,
                None => existing.push(doc),
            }
            Ok(())
        }
    }
}

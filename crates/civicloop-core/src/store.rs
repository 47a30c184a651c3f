//! Aggregated hazard list
//!
//! [`HazardStore`] merges two sources into the list the map shows:
//! - the read-only baseline dataset shipped with the app
//! - the append-only report log kept in a [`KeyValueStore`]
//!
//! The visible list is always `baseline ++ log`, each in its original
//! order, with no deduplication. Load failures degrade the failing source
//! to an empty list and are only logged.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::models::HazardRecord;
use crate::persistence::{KeyValueStore, StoreError};

/// Key under which the report log is persisted
pub const REPORT_LOG_KEY: &str = "siri_reports";

const EVENT_CAPACITY: usize = 64;

/// Where the baseline dataset comes from
#[derive(Debug, Clone)]
pub enum BaselineSource {
    /// No baseline
    Empty,
    /// JSON document compiled into the binary
    Embedded(&'static str),
    /// JSON file on disk
    File(PathBuf),
    /// Pre-parsed records
    Records(Vec<HazardRecord>),
}

/// Errors that can occur while loading a source
///
/// Never surfaced to callers of [`HazardStore`]; logged and replaced by an
/// empty source.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Baseline file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Document is not a JSON array of hazard records
    #[error("corrupt hazard list: {0}")]
    Json(#[from] serde_json::Error),

    /// Key-value store read failed
    #[error("report log unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Change notifications published by [`HazardStore`]
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// Both sources were reloaded
    Refreshed {
        /// Records taken from the baseline
        baseline: usize,
        /// Records taken from the report log
        reports: usize,
    },
    /// A record was committed to the report log
    Appended(HazardRecord),
}

#[derive(Debug, Default)]
struct Snapshot {
    baseline: Arc<Vec<HazardRecord>>,
    reports: Arc<Vec<HazardRecord>>,
    merged: Arc<Vec<HazardRecord>>,
}

impl Snapshot {
    fn new(baseline: Arc<Vec<HazardRecord>>, reports: Vec<HazardRecord>) -> Self {
        let merged = baseline.iter().chain(reports.iter()).cloned().collect();
        Self {
            baseline,
            reports: Arc::new(reports),
            merged: Arc::new(merged),
        }
    }
}

struct Inner {
    baseline_source: BaselineSource,
    kv: Arc<dyn KeyValueStore>,
    snapshot: RwLock<Snapshot>,
    /// Serializes every read-modify-write of the persisted log
    log_lock: TokioMutex<()>,
    events: broadcast::Sender<StoreEvent>,
}

/// Owner of the aggregated hazard list and the persisted report log
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct HazardStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HazardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.inner.snapshot.read();
        f.debug_struct("HazardStore")
            .field("baseline", &snapshot.baseline.len())
            .field("reports", &snapshot.reports.len())
            .finish()
    }
}

impl HazardStore {
    /// Create a store and load both sources.
    pub async fn open(baseline_source: BaselineSource, kv: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let store = Self {
            inner: Arc::new(Inner {
                baseline_source,
                kv,
                snapshot: RwLock::new(Snapshot::default()),
                log_lock: TokioMutex::new(()),
                events,
            }),
        };
        store.refresh().await;
        store
    }

    /// Reload the baseline and the report log, replacing the visible list.
    #[instrument(skip(self))]
    pub async fn refresh(&self) {
        let baseline = match self.load_baseline().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Baseline unavailable, continuing without it");
                Vec::new()
            }
        };

        // Held so an append cannot commit between our log read and the swap.
        let _guard = self.inner.log_lock.lock().await;
        let reports = self.load_log_or_empty();

        let (baseline_len, reports_len) = (baseline.len(), reports.len());
        *self.inner.snapshot.write() = Snapshot::new(Arc::new(baseline), reports);

        info!(
            baseline = baseline_len,
            reports = reports_len,
            "Hazard list refreshed"
        );
        self.publish(StoreEvent::Refreshed {
            baseline: baseline_len,
            reports: reports_len,
        });
    }

    /// Run [`Self::refresh`] in the background.
    ///
    /// Meant for lifecycle hooks such as the app returning to the
    /// foreground; nobody has to await the handle.
    pub fn spawn_refresh(&self) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move { store.refresh().await })
    }

    /// Current aggregated list, baseline first
    pub fn potholes(&self) -> Arc<Vec<HazardRecord>> {
        Arc::clone(&self.inner.snapshot.read().merged)
    }

    /// Records loaded from the baseline
    pub fn baseline(&self) -> Arc<Vec<HazardRecord>> {
        Arc::clone(&self.inner.snapshot.read().baseline)
    }

    /// Records loaded from the report log
    pub fn reports(&self) -> Arc<Vec<HazardRecord>> {
        Arc::clone(&self.inner.snapshot.read().reports)
    }

    /// First record with the given id
    pub fn find(&self, id: &str) -> Option<HazardRecord> {
        self.inner
            .snapshot
            .read()
            .merged
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Append a record to the report log and persist the whole log.
    ///
    /// The record is committed only if the write succeeds; on error neither
    /// the persisted log nor the visible list changes. A log that cannot be
    /// read fails the append; a log that reads but does not parse is replaced.
    #[instrument(skip(self, record), fields(id = %record.id))]
    pub async fn append(&self, record: HazardRecord) -> Result<(), StoreError> {
        let _guard = self.inner.log_lock.lock().await;

        // A corrupt log is replaced; a log we cannot read must not be.
        let mut log = match self.load_log() {
            Ok(records) => records,
            Err(LoadError::Json(e)) => {
                warn!(error = %e, key = REPORT_LOG_KEY, "Report log corrupt, starting a new one");
                Vec::new()
            }
            Err(LoadError::Store(e)) => return Err(e),
            Err(LoadError::Io { source, .. }) => return Err(StoreError::Io(source)),
        };
        log.push(record.clone());

        let encoded = serde_json::to_vec(&log)?;
        let kv = Arc::clone(&self.inner.kv);
        tokio::task::spawn_blocking(move || kv.set(REPORT_LOG_KEY, &encoded))
            .await
            .map_err(|e| StoreError::Interrupted(e.to_string()))??;
        debug!(len = log.len(), "Report log persisted");

        {
            let mut snapshot = self.inner.snapshot.write();
            let baseline = Arc::clone(&snapshot.baseline);
            *snapshot = Snapshot::new(baseline, log);
        }

        info!("Report appended");
        self.publish(StoreEvent::Appended(record));
        Ok(())
    }

    async fn load_baseline(&self) -> Result<Vec<HazardRecord>, LoadError> {
        match &self.inner.baseline_source {
            BaselineSource::Empty => Ok(Vec::new()),
            BaselineSource::Records(records) => Ok(records.clone()),
            BaselineSource::Embedded(json) => Ok(serde_json::from_str(json)?),
            BaselineSource::File(path) => {
                let content =
                    tokio::fs::read_to_string(path)
                        .await
                        .map_err(|source| LoadError::Io {
                            path: path.clone(),
                            source,
                        })?;
                Ok(serde_json::from_str(&content)?)
            }
        }
    }

    fn load_log(&self) -> Result<Vec<HazardRecord>, LoadError> {
        match self.inner.kv.get(REPORT_LOG_KEY)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn load_log_or_empty(&self) -> Vec<HazardRecord> {
        match self.load_log() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, key = REPORT_LOG_KEY, "Report log unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryKeyValueStore;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn record(id: &str) -> HazardRecord {
        HazardRecord {
            id: id.to_string(),
            latitude: 42.33,
            longitude: -83.04,
            date_reported: "2025-10-01".to_string(),
        }
    }

    fn ids(records: &[HazardRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    /// Accepts reads, refuses every write
    struct ReadOnlyKv(MemoryKeyValueStore);

    impl KeyValueStore for ReadOnlyKv {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.0.get(key)
        }

        fn set(&self, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Rejected("disk full".to_string()))
        }
    }

    /// Backing store whose reads can be switched to fail
    #[derive(Default)]
    struct FlakyReadKv {
        inner: MemoryKeyValueStore,
        fail_reads: AtomicBool,
    }

    impl KeyValueStore for FlakyReadKv {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "locked by another process",
                )));
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
            self.inner.set(key, value)
        }
    }

    #[tokio::test]
    async fn merges_baseline_then_log_without_dedup() -> anyhow::Result<()> {
        let kv = MemoryKeyValueStore::default();
        kv.insert_raw(
            REPORT_LOG_KEY,
            serde_json::to_vec(&vec![record("b"), record("x"), record("b")])?,
        );

        let store = HazardStore::open(
            BaselineSource::Records(vec![record("a"), record("b")]),
            Arc::new(kv),
        )
        .await;

        assert_eq!(ids(&store.potholes()), vec!["a", "b", "b", "x", "b"]);
        assert_eq!(store.baseline().len(), 2);
        assert_eq!(store.reports().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_log_reads_as_empty() {
        let kv = MemoryKeyValueStore::default();
        kv.insert_raw(REPORT_LOG_KEY, "{not json");

        let store =
            HazardStore::open(BaselineSource::Records(vec![record("a")]), Arc::new(kv)).await;

        assert_eq!(ids(&store.potholes()), vec!["a"]);
        assert!(store.reports().is_empty());
    }

    #[tokio::test]
    async fn corrupt_or_missing_baseline_reads_as_empty() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::default());

        let corrupt = HazardStore::open(BaselineSource::Embedded("[{\"id\": 1}]"), kv.clone()).await;
        assert!(corrupt.potholes().is_empty());

        let missing = HazardStore::open(
            BaselineSource::File(PathBuf::from("/definitely/not/here/potholes.json")),
            kv,
        )
        .await;
        assert!(missing.potholes().is_empty());
    }

    #[tokio::test]
    async fn append_is_visible_after_refresh() -> anyhow::Result<()> {
        let kv = MemoryKeyValueStore::default();
        let store = HazardStore::open(
            BaselineSource::Records(vec![record("a")]),
            Arc::new(kv.clone()),
        )
        .await;

        store.append(record("new")).await?;
        assert_eq!(ids(&store.potholes()), vec!["a", "new"]);

        store.refresh().await;
        assert_eq!(ids(&store.potholes()), vec!["a", "new"]);

        let persisted: Vec<HazardRecord> =
            serde_json::from_slice(&kv.get(REPORT_LOG_KEY)?.unwrap_or_default())?;
        assert_eq!(ids(&persisted), vec!["new"]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_rolls_back() {
        let kv = MemoryKeyValueStore::default();
        kv.insert_raw(
            REPORT_LOG_KEY,
            serde_json::to_vec(&vec![record("old")]).unwrap(),
        );
        let store = HazardStore::open(BaselineSource::Empty, Arc::new(ReadOnlyKv(kv))).await;

        let result = store.append(record("new")).await;

        assert!(matches!(result, Err(StoreError::Rejected(_))));
        assert_eq!(ids(&store.potholes()), vec!["old"]);
        store.refresh().await;
        assert_eq!(ids(&store.potholes()), vec!["old"]);
    }

    #[tokio::test]
    async fn unreadable_log_fails_append_without_overwriting() -> anyhow::Result<()> {
        let kv = Arc::new(FlakyReadKv::default());
        kv.inner.insert_raw(
            REPORT_LOG_KEY,
            serde_json::to_vec(&vec![record("r1"), record("r2"), record("r3")])?,
        );
        let store = HazardStore::open(BaselineSource::Empty, kv.clone()).await;
        assert_eq!(store.reports().len(), 3);

        kv.fail_reads.store(true, Ordering::SeqCst);
        let result = store.append(record("new")).await;

        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(ids(&store.potholes()), vec!["r1", "r2", "r3"]);

        kv.fail_reads.store(false, Ordering::SeqCst);
        let persisted: Vec<HazardRecord> =
            serde_json::from_slice(&kv.get(REPORT_LOG_KEY)?.unwrap_or_default())?;
        assert_eq!(ids(&persisted), vec!["r1", "r2", "r3"]);

        store.append(record("new")).await?;
        assert_eq!(ids(&store.reports()), vec!["r1", "r2", "r3", "new"]);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_log_is_replaced_on_append() -> anyhow::Result<()> {
        let kv = MemoryKeyValueStore::default();
        kv.insert_raw(REPORT_LOG_KEY, "{not json");
        let store = HazardStore::open(BaselineSource::Empty, Arc::new(kv.clone())).await;

        store.append(record("new")).await?;

        let persisted: Vec<HazardRecord> =
            serde_json::from_slice(&kv.get(REPORT_LOG_KEY)?.unwrap_or_default())?;
        assert_eq!(ids(&persisted), vec!["new"]);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn refreshes_never_observe_fewer_reports_than_committed() -> anyhow::Result<()> {
        const APPENDS: usize = 20;
        let store = HazardStore::open(
            BaselineSource::Records(vec![record("a")]),
            Arc::new(MemoryKeyValueStore::default()),
        )
        .await;
        let mut rx = store.subscribe();

        let mut tasks = Vec::new();
        for i in 0..APPENDS {
            let appender = store.clone();
            tasks.push(tokio::spawn(async move {
                appender.append(record(&format!("r{i}"))).await
            }));
            let refresher = store.clone();
            tasks.push(tokio::spawn(async move {
                refresher.refresh().await;
                Ok(())
            }));
        }
        for task in tasks {
            task.await??;
        }

        // Events are published under the log lock, so their order is commit order.
        let mut committed = 0;
        for _ in 0..APPENDS * 2 {
            match rx.recv().await? {
                StoreEvent::Appended(_) => committed += 1,
                StoreEvent::Refreshed { baseline, reports } => {
                    assert_eq!(baseline, 1);
                    assert_eq!(reports, committed);
                }
            }
        }
        assert_eq!(committed, APPENDS);
        assert_eq!(store.reports().len(), APPENDS);
        assert_eq!(store.potholes().len(), APPENDS + 1);
        Ok(())
    }

    #[tokio::test]
    async fn publishes_events() -> anyhow::Result<()> {
        let store = HazardStore::open(
            BaselineSource::Records(vec![record("a")]),
            Arc::new(MemoryKeyValueStore::default()),
        )
        .await;
        let mut rx = store.subscribe();

        store.append(record("new")).await?;
        store.spawn_refresh().await?;

        match rx.recv().await? {
            StoreEvent::Appended(r) => assert_eq!(r.id, "new"),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await? {
            StoreEvent::Refreshed { baseline, reports } => {
                assert_eq!((baseline, reports), (1, 1));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn find_returns_first_match() {
        let mut dup = record("a");
        dup.latitude = 1.0;
        let store = HazardStore::open(
            BaselineSource::Records(vec![record("a"), dup]),
            Arc::new(MemoryKeyValueStore::default()),
        )
        .await;

        assert_eq!(store.find("a").map(|r| r.latitude), Some(42.33));
        assert!(store.find("zzz").is_none());
    }
}

// Bulk dataset: single-flight load and atomic snapshot replacement
use crate::domain::error::{RegistryError, ZipBombStage};
use crate::domain::matcher::FuzzyMatcher;
use crate::domain::model::{
    MedicineRecord, PharmacyCriteria, PharmacyRecord, SearchFilters, SearchHit, SuklCode,
};
use crate::infrastructure::config::DatasetConfig;
use crate::infrastructure::storage::snapshot::Snapshot;
use crate::infrastructure::storage::tables::{self, RawTables};
use crate::infrastructure::storage::zip_guard::{self, ZipGuard};
use futures_util::StreamExt;
use parking_lot::RwLock;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Where the archive comes from.
#[derive(Debug, Clone)]
pub enum ArchiveSource {
    File(PathBuf),
    Url(String),
    Bytes(Arc<Vec<u8>>),
}

impl ArchiveSource {
    /// A configured local file wins over the download URL.
    pub fn from_config(config: &DatasetConfig) -> Self {
        match &config.archive_path {
            Some(path) => ArchiveSource::File(path.clone()),
            None => ArchiveSource::Url(config.archive_url.clone()),
        }
    }

    fn describe(&self) -> String {
        match self {
            ArchiveSource::File(path) => path.display().to_string(),
            ArchiveSource::Url(url) => url.clone(),
            ArchiveSource::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
        }
    }
}

#[derive(Debug, Default)]
struct LoadState {
    sequence: u64,
    // failure of the attempt with the given number, handed to its waiters
    last_failure: Option<(u64, RegistryError)>,
}

pub struct BulkDataset {
    source: ArchiveSource,
    guard: ZipGuard,
    delimiter: u8,
    http: Client,
    matcher: FuzzyMatcher,
    current: RwLock<Option<Arc<Snapshot>>>,
    load_lock: Mutex<LoadState>,
    attempts: AtomicU64,
    loads: AtomicU64,
}

impl BulkDataset {
    pub fn new(
        source: ArchiveSource,
        guard: ZipGuard,
        delimiter: u8,
        http: Client,
        matcher: FuzzyMatcher,
    ) -> Self {
        Self {
            source,
            guard,
            delimiter,
            http,
            matcher,
            current: RwLock::new(None),
            load_lock: Mutex::new(LoadState::default()),
            attempts: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        }
    }

    pub fn from_config(
        config: &DatasetConfig,
        http: Client,
        matcher: FuzzyMatcher,
    ) -> Result<Self, RegistryError> {
        let delimiter = u8::try_from(config.csv_delimiter).map_err(|_| {
            RegistryError::Config("csv_delimiter must be an ASCII character".to_string())
        })?;
        Ok(Self::new(
            ArchiveSource::from_config(config),
            ZipGuard::new(config.size_cap_bytes),
            delimiter,
            http,
            matcher,
        ))
    }

    /// Loaded snapshot, if any, without triggering a load.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().clone()
    }

    /// Number of load attempts started so far.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn matcher(&self) -> &FuzzyMatcher {
        &self.matcher
    }

    /// Current snapshot, loading it on first access.
    ///
    /// Concurrent first accesses share one load: callers queue on the load
    /// lock and re-check after acquiring it. A failed attempt is reported to
    /// everyone who waited on it; the next caller starts a fresh attempt.
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>, RegistryError> {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        let seen = self.attempts.load(Ordering::SeqCst);
        let mut state = self.load_lock.lock().await;

        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }
        if let Some((attempt, err)) = &state.last_failure {
            if *attempt > seen {
                debug!("Sharing failure of load attempt {}", attempt);
                return Err(err.clone());
            }
        }

        self.load_locked(&mut state).await
    }

    /// Builds a fresh snapshot and swaps it in. On failure the previous
    /// snapshot stays in place.
    pub async fn reload(&self) -> Result<Arc<Snapshot>, RegistryError> {
        let mut state = self.load_lock.lock().await;
        self.load_locked(&mut state).await
    }

    async fn load_locked(&self, state: &mut LoadState) -> Result<Arc<Snapshot>, RegistryError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let sequence = state.sequence + 1;
        info!("Loading bulk dataset from {}", self.source.describe());

        let result = self.build(sequence).await;
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                let version = snapshot.version();
                info!(
                    "Bulk dataset #{} ready: {} medicines, {} pharmacies, {} ATC groups, {} rows skipped",
                    version.sequence,
                    version.medicines,
                    version.pharmacies,
                    version.atc_groups,
                    version.skipped_rows
                );
                state.sequence = sequence;
                state.last_failure = None;
                *self.current.write() = Some(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                warn!("Bulk dataset load attempt {} failed: {}", attempt, e);
                state.last_failure = Some((attempt, e.clone()));
                Err(e)
            }
        }
    }

    async fn build(&self, sequence: u64) -> Result<Snapshot, RegistryError> {
        let bytes = self.fetch().await?;
        let guard = self.guard;
        let delimiter = self.delimiter;

        // Inflating and parsing are CPU-bound
        tokio::task::spawn_blocking(move || -> Result<Snapshot, RegistryError> {
            let fingerprint = hex::encode(Sha256::digest(bytes.as_slice()));
            let files = guard.extract_archive(&bytes, &tables::all_files())?;
            let tables = RawTables::parse(&files, delimiter)?;
            Ok(Snapshot::build(tables, sequence, fingerprint))
        })
        .await?
    }

    /// Raw archive bytes; the compressed size is held to the same cap.
    async fn fetch(&self) -> Result<Arc<Vec<u8>>, RegistryError> {
        let oversized = |size: u64| RegistryError::ZipBomb {
            stage: ZipBombStage::Download,
            size,
            cap: self.guard.cap(),
        };

        match &self.source {
            ArchiveSource::Bytes(bytes) => {
                if bytes.len() as u64 > self.guard.cap() {
                    return Err(oversized(bytes.len() as u64));
                }
                Ok(bytes.clone())
            }
            ArchiveSource::File(path) => {
                let len = tokio::fs::metadata(path).await?.len();
                if len > self.guard.cap() {
                    return Err(oversized(len));
                }
                Ok(Arc::new(tokio::fs::read(path).await?))
            }
            ArchiveSource::Url(url) => {
                let res = self.http.get(url).send().await?.error_for_status()?;
                if let Some(len) = res.content_length() {
                    if len > self.guard.cap() {
                        return Err(oversized(len));
                    }
                }
                let mut budget = self.guard.budget(ZipBombStage::Download);
                let declared = res.content_length().unwrap_or(0);
                let mut out = Vec::with_capacity(zip_guard::initial_capacity(declared));
                let mut stream = res.bytes_stream();
                while let Some(item) = stream.next().await {
                    let chunk = item?;
                    budget.consume(chunk.len() as u64)?;
                    out.extend_from_slice(&chunk);
                }
                debug!("Downloaded {} bytes", out.len());
                Ok(Arc::new(out))
            }
        }
    }

    pub async fn lookup_by_code(
        &self,
        code: &SuklCode,
    ) -> Result<Option<MedicineRecord>, RegistryError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.lookup_by_code(code).cloned())
    }

    pub async fn search_by_substance_or_atc(
        &self,
        text: &str,
        limit: usize,
        filters: SearchFilters,
    ) -> Result<Vec<SearchHit>, RegistryError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.search_by_substance_or_atc(&self.matcher, text, limit, filters))
    }

    pub async fn find_pharmacies(
        &self,
        criteria: &PharmacyCriteria,
    ) -> Result<Vec<PharmacyRecord>, RegistryError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.find_pharmacies(criteria))
    }

    /// Drops the loaded snapshot. Readers holding it keep their handle.
    pub fn unload(&self) {
        *self.current.write() = None;
    }
}

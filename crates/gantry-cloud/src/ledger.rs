//! State ledger for provisioned resources
//!
//! Manages the `.gantry/ledger.json` file which records the last confirmed
//! state of every resource the sequencer has seen. Every transition is
//! persisted before the caller proceeds, so the file never runs ahead of the
//! external world.

use crate::error::{CloudError, Result};
use crate::planner::PlanEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_core::{ResourceDescriptor, ResourceKind, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const LEDGER_VERSION: u32 = 1;
const LEDGER_FILE: &str = "ledger.json";
const LEDGER_BACKUP: &str = "ledger.json.backup";
const LEDGER_TMP: &str = "ledger.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// Runtime status of a single resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Entered a plan, nothing issued yet
    Pending,
    /// Create/update issued, waiting for readiness
    InProgress,
    Ready,
    Failed,
    /// Skipped because a dependency failed or was itself blocked
    Blocked,
    Destroying,
    Destroyed,
}

impl ExecutionState {
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Pending, InProgress | Blocked | Failed)
                | (InProgress, InProgress | Ready | Failed | Destroying)
                | (Ready, InProgress | Destroying)
                | (Failed, InProgress | Blocked | Destroying)
                | (Blocked, InProgress | Blocked | Failed | Destroying)
                | (Destroying, Destroying | Destroyed | Failed)
        )
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionState::Pending => write!(f, "pending"),
            ExecutionState::InProgress => write!(f, "in_progress"),
            ExecutionState::Ready => write!(f, "ready"),
            ExecutionState::Failed => write!(f, "failed"),
            ExecutionState::Blocked => write!(f, "blocked"),
            ExecutionState::Destroying => write!(f, "destroying"),
            ExecutionState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Ledger entry for one descriptor id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: String,
    pub kind: ResourceKind,
    pub state: ExecutionState,

    /// Stable identity of the external resource, derived from its `ResourceSpec`
    pub external_identity: String,

    pub last_updated: DateTime<Utc>,

    /// Topological rank in the full descriptor graph
    pub rank: usize,

    #[serde(default)]
    pub depends_on: BTreeSet<String>,

    /// Spec most recently submitted
    pub spec: ResourceSpec,

    /// Spec last confirmed Ready
    #[serde(default)]
    pub applied_spec: Option<ResourceSpec>,

    /// Last error payload, if the most recent transition was a failure
    #[serde(default)]
    pub error: Option<String>,

    /// Provider handle of the submitted call still being polled
    /// (e.g. a Route 53 change id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl LedgerRecord {
    pub fn new(
        descriptor: &ResourceDescriptor,
        rank: usize,
        external_identity: impl Into<String>,
    ) -> Self {
        Self {
            id: descriptor.id.clone(),
            kind: descriptor.kind(),
            state: ExecutionState::Pending,
            external_identity: external_identity.into(),
            last_updated: Utc::now(),
            rank,
            depends_on: descriptor.depends_on.clone(),
            spec: descriptor.spec.clone(),
            applied_spec: None,
            error: None,
            operation: None,
        }
    }

    pub fn with_state(mut self, state: ExecutionState) -> Self {
        self.state = state;
        if state == ExecutionState::Ready {
            self.applied_spec = Some(self.spec.clone());
        }
        self
    }

    /// Descriptor for the resource as it exists externally
    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            id: self.id.clone(),
            spec: self.applied_spec.clone().unwrap_or_else(|| self.spec.clone()),
            depends_on: self.depends_on.clone(),
        }
    }
}

/// Persisted ledger document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerDocument {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    /// Ordered by (rank, id)
    pub records: Vec<LedgerRecord>,
}

impl Default for LedgerDocument {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            updated_at: Utc::now(),
            records: Vec::new(),
        }
    }
}

impl LedgerDocument {
    fn from_records(records: &BTreeMap<String, LedgerRecord>) -> Self {
        let mut records: Vec<LedgerRecord> = records.values().cloned().collect();
        records.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));
        Self {
            version: LEDGER_VERSION,
            updated_at: Utc::now(),
            records,
        }
    }
}

/// Durable storage behind a [`Ledger`]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Human readable location for diagnostics
    fn location(&self) -> String;

    /// Load the persisted document; a missing ledger is an empty document
    async fn load(&self) -> Result<LedgerDocument>;

    async fn save(&self, document: &LedgerDocument) -> Result<()>;
}

/// File-backed ledger store
pub struct FileLedgerStore {
    /// Directory holding ledger.json and lock.json
    dir: PathBuf,
}

impl FileLedgerStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn ledger_path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.dir.join(LEDGER_BACKUP)
    }

    fn tmp_path(&self) -> PathBuf {
        self.dir.join(LEDGER_TMP)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
            tracing::debug!("Created ledger directory: {}", self.dir.display());
        }
        Ok(())
    }

    /// Acquire a lock for exclusive access
    ///
    /// The lock file is created with `create_new`, so two processes racing
    /// for the same ledger cannot both succeed.
    pub async fn acquire_lock(&self) -> Result<LedgerLock> {
        self.ensure_dir().await?;

        let lock_path = self.lock_path();
        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&lock_info)?;

        if let Err(e) = create_lock_file(&lock_path, &content).await {
            if e.kind() != std::io::ErrorKind::AlreadyExists {
                return Err(e.into());
            }

            let existing = fs::read_to_string(&lock_path).await?;
            let holder: LockInfo = serde_json::from_str(&existing).map_err(|e| {
                CloudError::LockError(format!("unreadable lock file {}: {}", lock_path.display(), e))
            })?;

            // Locks older than one hour are considered stale
            let age = Utc::now().signed_duration_since(holder.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "Ledger is locked by {} (pid {}) since {}",
                    holder.holder, holder.pid, holder.acquired_at
                )));
            }

            tracing::warn!(holder = %holder.holder, "Removing stale ledger lock");
            fs::remove_file(&lock_path).await?;
            create_lock_file(&lock_path, &content).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    CloudError::LockError("Ledger lock was taken by another process".to_string())
                } else {
                    e.into()
                }
            })?;
        }

        tracing::debug!("Acquired ledger lock");
        Ok(LedgerLock {
            lock_path,
            released: false,
        })
    }
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    fn location(&self) -> String {
        self.ledger_path().display().to_string()
    }

    async fn load(&self) -> Result<LedgerDocument> {
        let path = self.ledger_path();
        if !path.exists() {
            tracing::debug!("Ledger file not found, starting empty");
            return Ok(LedgerDocument::default());
        }

        let content = fs::read_to_string(&path).await?;
        let document: LedgerDocument =
            serde_json::from_str(&content).map_err(|e| CloudError::LedgerCorruption {
                location: self.location(),
                message: e.to_string(),
            })?;

        if document.version > LEDGER_VERSION {
            return Err(CloudError::LedgerCorruption {
                location: self.location(),
                message: format!(
                    "ledger version {} is newer than supported version {}",
                    document.version, LEDGER_VERSION
                ),
            });
        }

        tracing::debug!("Loaded ledger with {} records", document.records.len());
        Ok(document)
    }

    async fn save(&self, document: &LedgerDocument) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.ledger_path();
        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }

        // Write then rename so a crash never leaves a half-written ledger
        let tmp = self.tmp_path();
        let content = serde_json::to_string_pretty(document)?;
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        tracing::trace!("Saved ledger with {} records", document.records.len());
        Ok(())
    }
}

/// In-memory ledger store, cloneable so a test can reopen the same ledger
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    document: Arc<std::sync::Mutex<Option<LedgerDocument>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved document
    pub fn document(&self) -> Option<LedgerDocument> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn location(&self) -> String {
        "memory".to_string()
    }

    async fn load(&self) -> Result<LedgerDocument> {
        Ok(self.document().unwrap_or_default())
    }

    async fn save(&self, document: &LedgerDocument) -> Result<()> {
        *self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(document.clone());
        Ok(())
    }
}

/// The sequencer's record of what it believes already exists
///
/// Shared between concurrent entries; every mutation is persisted while the
/// lock is held, so writes reach the store in the order they were made.
pub struct Ledger {
    store: Box<dyn LedgerStore>,
    records: Mutex<BTreeMap<String, LedgerRecord>>,
}

impl Ledger {
    /// Load the ledger from its store
    pub async fn open(store: impl LedgerStore + 'static) -> Result<Self> {
        let document = store.load().await?;
        let mut records = BTreeMap::new();
        for record in document.records {
            if records.insert(record.id.clone(), record).is_some() {
                return Err(CloudError::LedgerCorruption {
                    location: store.location(),
                    message: "duplicate record id".to_string(),
                });
            }
        }

        Ok(Self {
            store: Box::new(store),
            records: Mutex::new(records),
        })
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    pub async fn get(&self, id: &str) -> Option<LedgerRecord> {
        self.records.lock().await.get(id).cloned()
    }

    pub async fn state(&self, id: &str) -> Option<ExecutionState> {
        self.records.lock().await.get(id).map(|r| r.state)
    }

    /// All records ordered by (rank, id)
    pub async fn snapshot(&self) -> Vec<LedgerRecord> {
        LedgerDocument::from_records(&*self.records.lock().await).records
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Enter a plan entry into the ledger
    ///
    /// New ids start out `Pending`; existing records keep their state but
    /// pick up the submitted spec, rank and dependencies.
    pub async fn register(&self, entry: &PlanEntry, external_identity: String) -> Result<()> {
        let mut records = self.records.lock().await;
        let descriptor = &entry.descriptor;
        match records.get_mut(&descriptor.id) {
            Some(record) => {
                record.kind = descriptor.kind();
                record.spec = descriptor.spec.clone();
                record.rank = entry.rank;
                record.depends_on = descriptor.depends_on.clone();
                record.external_identity = external_identity;
            }
            None => {
                records.insert(
                    descriptor.id.clone(),
                    LedgerRecord::new(descriptor, entry.rank, external_identity),
                );
            }
        }
        self.persist(&records).await
    }

    /// Record a state transition and persist it
    ///
    /// Reaching `Ready` stamps the submitted spec as applied. Reaching
    /// `Destroyed` removes the record.
    pub async fn transition(
        &self,
        id: &str,
        to: ExecutionState,
        error: Option<String>,
    ) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| CloudError::RecordNotFound(id.to_string()))?;

        if !record.state.can_transition_to(to) {
            return Err(CloudError::InvalidTransition {
                id: id.to_string(),
                from: record.state,
                to,
            });
        }

        tracing::debug!(id, from = %record.state, to = %to, "Ledger transition");

        if to == ExecutionState::Destroyed {
            records.remove(id);
        } else {
            record.state = to;
            record.error = error;
            record.last_updated = Utc::now();
            if to == ExecutionState::Ready {
                record.applied_spec = Some(record.spec.clone());
                record.operation = None;
            }
        }

        self.persist(&records).await
    }

    /// Remember the provider handle of the call just submitted for `id`
    pub async fn record_operation(&self, id: &str, operation: Option<String>) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| CloudError::RecordNotFound(id.to_string()))?;
        if record.operation == operation {
            return Ok(());
        }
        record.operation = operation;
        record.last_updated = Utc::now();
        self.persist(&records).await
    }

    /// Drop a record that never reached the external world
    pub async fn remove(&self, id: &str) -> Result<Option<LedgerRecord>> {
        let mut records = self.records.lock().await;
        let removed = records.remove(id);
        if removed.is_some() {
            self.persist(&records).await?;
        }
        Ok(removed)
    }

    async fn persist(&self, records: &BTreeMap<String, LedgerRecord>) -> Result<()> {
        self.store.save(&LedgerDocument::from_records(records)).await
    }
}

/// Create the lock file, failing if it already exists
async fn create_lock_file(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the ledger lock
pub struct LedgerLock {
    lock_path: PathBuf,
    released: bool,
}

impl LedgerLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released ledger lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

//! Incremental directory scans.
//!
//! A scan enumerates eligible image files under one directory, reads the
//! embedded metadata of every file whose content identity changed since the
//! last scan, and feeds the tag index. At most one scan runs per directory;
//! progress is observable and cancellation takes effect between files, so a
//! cancelled scan leaves every already-processed file fully indexed.

use crate::fields::Namespace;
use crate::identity::ContentIdentity;
use crate::index::TagIndex;
use crate::library::Library;
use crate::metadata::MetadataTransaction;
use crate::walk;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

const PHASE_IDLE: u8 = 0;
const PHASE_RUNNING: u8 = 1;
const PHASE_CANCELLING: u8 = 2;

/// How a finished scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// Point-in-time view of a directory's scan.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScanSnapshot {
    pub scanning: bool,
    pub processed: usize,
    pub total: usize,
}

/// Live state of one directory's scan. Counters are atomics so status
/// queries never contend with the worker.
pub struct ScanState {
    phase: AtomicU8,
    processed: AtomicUsize,
    total: AtomicUsize,
    cancel: AtomicBool,
    outcome: Mutex<Option<ScanOutcome>>,
}

impl ScanState {
    fn new() -> Self {
        Self {
            phase: AtomicU8::new(PHASE_IDLE),
            processed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            cancel: AtomicBool::new(false),
            outcome: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            scanning: self.phase.load(Ordering::Acquire) != PHASE_IDLE,
            processed: self.processed.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }

    /// Last finished scan's outcome, if any scan has finished.
    pub fn last_outcome(&self) -> Option<ScanOutcome> {
        *self.outcome.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn request_cancel(&self) -> bool {
        // Flag first; the phase swap must not land after a finish() or the
        // state would read as scanning with no worker alive.
        self.cancel.store(true, Ordering::Release);
        self.phase
            .compare_exchange(
                PHASE_RUNNING,
                PHASE_CANCELLING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn finish(&self, outcome: ScanOutcome) {
        *self.outcome.lock().unwrap_or_else(|e| e.into_inner()) = Some(outcome);
        self.phase.store(PHASE_IDLE, Ordering::Release);
    }
}

/// One `ScanState` per directory, created on first use and reused across
/// scans so status remains queryable after a scan ends.
#[derive(Default)]
pub struct ScanRegistry {
    inner: Mutex<HashMap<PathBuf, Arc<ScanState>>>,
}

impl ScanRegistry {
    pub fn snapshot(&self, dir: &Path) -> ScanSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.get(dir) {
            Some(state) => state.snapshot(),
            None => ScanSnapshot {
                scanning: false,
                processed: 0,
                total: 0,
            },
        }
    }

    pub fn state(&self, dir: &Path) -> Option<Arc<ScanState>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(dir).cloned()
    }

    /// Claim the directory for a new scan. Returns `None` if a scan is
    /// already running; otherwise the state is reset and marked running
    /// before the registry lock is released, so two concurrent callers can
    /// never both claim it.
    fn try_begin(&self, dir: &Path) -> Option<Arc<ScanState>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let state = inner
            .entry(dir.to_path_buf())
            .or_insert_with(|| Arc::new(ScanState::new()));
        if state.phase.load(Ordering::Acquire) != PHASE_IDLE {
            return None;
        }
        state.processed.store(0, Ordering::Relaxed);
        state.total.store(0, Ordering::Relaxed);
        state.cancel.store(false, Ordering::Relaxed);
        state.phase.store(PHASE_RUNNING, Ordering::Release);
        Some(Arc::clone(state))
    }
}

/// Result of a scan request.
pub struct ScanStarted {
    /// False when a scan was already running or nothing needed work.
    pub started: bool,
    /// Files that will be (re)read this scan.
    pub total: usize,
    /// Joinable handle to the worker, present only when `started`.
    pub handle: Option<ScanHandle>,
}

/// Handle to a running scan worker.
pub struct ScanHandle {
    join: JoinHandle<()>,
    state: Arc<ScanState>,
}

impl ScanHandle {
    /// Block until the scan finishes and return its outcome.
    pub fn wait(self) -> ScanOutcome {
        let _ = self.join.join();
        self.state.last_outcome().unwrap_or(ScanOutcome::Failed)
    }
}

impl Library {
    /// Begin an incremental scan of `dir`.
    ///
    /// Enumeration and staleness filtering happen synchronously, so the
    /// returned total is exact and orphaned index rows are already pruned
    /// when this returns. Metadata extraction runs on a worker thread.
    /// Files whose stored content identity still matches on disk are
    /// skipped unless `force` is set.
    pub fn start_scan(&self, dir: &Path, force: bool) -> crate::Result<ScanStarted> {
        let dir = self.resolve_dir(dir)?;
        let state = match self.scans.try_begin(&dir) {
            Some(state) => state,
            None => {
                return Ok(ScanStarted {
                    started: false,
                    total: 0,
                    handle: None,
                })
            }
        };

        // Forward errors from enumeration, but never leave the directory
        // claimed on the error path.
        let prepared = self.prepare_scan(&dir, force);
        let work = match prepared {
            Ok(work) => work,
            Err(err) => {
                state.finish(ScanOutcome::Failed);
                return Err(err);
            }
        };

        if work.is_empty() {
            // Everything is current; an up-to-date directory counts as scanned
            let marked = {
                let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
                index.mark_directory_scanned(&dir)
            };
            if let Err(err) = marked {
                state.finish(ScanOutcome::Failed);
                return Err(err);
            }
            state.finish(ScanOutcome::Completed);
            return Ok(ScanStarted {
                started: false,
                total: 0,
                handle: None,
            });
        }

        let total = work.len();
        state.total.store(total, Ordering::Relaxed);

        let worker_state = Arc::clone(&state);
        let db_path = self.db_path.clone();
        let backend = Arc::clone(&self.backend);
        let scan_dir = dir.clone();
        let join = thread::spawn(move || {
            // Own connection: WAL keeps concurrent readers unblocked.
            let mut index = match TagIndex::open(&db_path) {
                Ok(index) => index,
                Err(err) => {
                    tracing::error!("scan of {} aborted: {err}", scan_dir.display());
                    worker_state.finish(ScanOutcome::Failed);
                    return;
                }
            };
            run_scan(&mut index, backend.as_ref(), &scan_dir, &work, &worker_state);
        });

        Ok(ScanStarted {
            started: true,
            total,
            handle: Some(ScanHandle { join, state }),
        })
    }

    /// Request cancellation of the scan running on `dir`. Returns whether
    /// a running scan was told to stop. The worker notices between files.
    pub fn cancel_scan(&self, dir: &Path) -> crate::Result<bool> {
        let dir = self.resolve_dir(dir)?;
        Ok(self
            .scans
            .state(&dir)
            .map(|state| state.request_cancel())
            .unwrap_or(false))
    }

    /// Current scan progress for `dir`.
    pub fn scan_status(&self, dir: &Path) -> crate::Result<ScanSnapshot> {
        let dir = self.resolve_dir(dir)?;
        Ok(self.scans.snapshot(&dir))
    }

    /// Enumerate eligible files, prune index rows for files that vanished,
    /// and return the subset whose content identity is stale (or all of
    /// them when forcing).
    fn prepare_scan(&self, dir: &Path, force: bool) -> crate::Result<Vec<PathBuf>> {
        let files = walk::discover_images(dir, &self.config)?;
        let present = files.iter().cloned().collect();

        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        let removed = index.remove_orphans(dir, &present)?;
        if removed > 0 {
            tracing::debug!("pruned {removed} vanished files under {}", dir.display());
        }

        let mut work = Vec::new();
        for file in files {
            if force {
                work.push(file);
                continue;
            }
            let stored = index.identity_of(&file)?;
            let current = ContentIdentity::of(&file).ok();
            match (stored, current) {
                (Some(a), Some(b)) if a == b => {}
                _ => work.push(file),
            }
        }
        Ok(work)
    }
}

fn run_scan(
    index: &mut TagIndex,
    backend: &dyn crate::metadata::ContainerBackend,
    dir: &Path,
    work: &[PathBuf],
    state: &ScanState,
) {
    tracing::info!("scanning {} ({} files)", dir.display(), work.len());

    for file in work {
        if state.cancel_requested() {
            tracing::info!(
                "scan of {} cancelled after {} files",
                dir.display(),
                state.processed.load(Ordering::Relaxed)
            );
            state.finish(ScanOutcome::Cancelled);
            return;
        }
        if let Err(err) = index_file(index, backend, file) {
            // Unreadable or corrupt files are skipped, the scan goes on
            tracing::warn!("skipping {}: {err}", file.display());
        }
        state.processed.fetch_add(1, Ordering::Relaxed);
    }

    if let Err(err) = index.mark_directory_scanned(dir) {
        tracing::error!("could not record scan of {}: {err}", dir.display());
        state.finish(ScanOutcome::Failed);
        return;
    }
    tracing::info!("scan of {} complete", dir.display());
    state.finish(ScanOutcome::Completed);
}

/// Read one file's container and mirror every known field into the index,
/// committing its content identity last so interruptions re-scan the file.
fn index_file(
    index: &mut TagIndex,
    backend: &dyn crate::metadata::ContainerBackend,
    file: &Path,
) -> crate::Result<()> {
    let identity = ContentIdentity::of(file)?;
    let all = MetadataTransaction::new(backend).read_all(file)?;
    for namespace in [Namespace::Iptc, Namespace::Exif] {
        let entries: Vec<(&'static str, Vec<String>)> = all
            .iter()
            .filter(|(def, _)| def.namespace == namespace)
            .map(|(def, values)| (def.key, values.clone()))
            .collect();
        index.upsert_fields(file, namespace, &entries)?;
    }
    index.record_identity(file, identity)?;
    Ok(())
}

//! End-to-end engine tests: scan, query, write, rescan.

use photometa_core::{
    ContainerBackend, FieldMap, Library, ListFilter, Namespace, PhotometaError, Resizer,
    ScanOutcome, SidecarBackend,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use tempfile::TempDir;

type Hook = Box<dyn FnOnce() + Send>;

/// Sidecar backend that counts reads and fires a one-shot hook when the
/// n-th read completes. Scans make exactly one read per file.
struct HookedBackend {
    inner: SidecarBackend,
    reads: AtomicUsize,
    hook_at: usize,
    hook: Mutex<Option<Hook>>,
}

impl HookedBackend {
    fn new(hook_at: usize) -> Self {
        Self {
            inner: SidecarBackend,
            reads: AtomicUsize::new(0),
            hook_at,
            hook: Mutex::new(None),
        }
    }

    fn set_hook(&self, hook: Hook) {
        *self.hook.lock().unwrap() = Some(hook);
    }
}

impl ContainerBackend for HookedBackend {
    fn read_fields(&self, path: &Path) -> photometa_core::Result<FieldMap> {
        let map = self.inner.read_fields(path)?;
        let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.hook_at {
            if let Some(hook) = self.hook.lock().unwrap().take() {
                hook();
            }
        }
        Ok(map)
    }

    fn write_fields(&self, path: &Path, fields: &FieldMap) -> photometa_core::Result<()> {
        self.inner.write_fields(path, fields)
    }
}

/// Backend whose first read blocks until the gate is released.
struct GatedBackend {
    inner: SidecarBackend,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
}

impl ContainerBackend for GatedBackend {
    fn read_fields(&self, path: &Path) -> photometa_core::Result<FieldMap> {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            let _ = gate.recv();
        }
        self.inner.read_fields(path)
    }

    fn write_fields(&self, path: &Path, fields: &FieldMap) -> photometa_core::Result<()> {
        self.inner.write_fields(path, fields)
    }
}

fn tagged_image(root: &Path, name: &str, keywords: &[&str]) -> PathBuf {
    let path = root.join(name);
    std::fs::write(&path, name.as_bytes()).unwrap();
    let mut map = FieldMap::new();
    map.insert(
        "Iptc.Application2.Keywords".to_string(),
        keywords.iter().map(|k| k.to_string()).collect(),
    );
    SidecarBackend.write_fields(&path, &map).unwrap();
    path
}

fn search(lib: &Library, query: &str) -> photometa_core::QueryPage {
    lib.list_images(
        lib.root(),
        &ListFilter::Search {
            query: query.to_string(),
            field: None,
        },
        0,
        Some(500),
    )
    .unwrap()
}

#[test]
fn scan_then_query_then_write_then_rescan() {
    let tmp = TempDir::new().unwrap();
    let lib = Library::init(tmp.path()).unwrap();
    let root = lib.root().to_path_buf();

    tagged_image(&root, "a.jpg", &["sunset", "beach"]);
    tagged_image(&root, "b.jpg", &["sunrise"]);
    let bare = root.join("c.jpg");
    std::fs::write(&bare, b"c").unwrap();

    let started = lib.start_scan(&root, false).unwrap();
    assert!(started.started);
    assert_eq!(started.total, 3);
    assert_eq!(started.handle.unwrap().wait(), ScanOutcome::Completed);
    assert!(lib.directory_scanned(&root).unwrap());

    let page = search(&lib, "sunset");
    assert_eq!(page.files, vec![root.join("a.jpg")]);
    assert_eq!(search(&lib, "sunset beach").total_count, 1);
    assert_eq!(search(&lib, "sunset sunrise").total_count, 0);

    // Nothing changed, so an incremental rescan has no work
    let again = lib.start_scan(&root, false).unwrap();
    assert!(!again.started);
    assert_eq!(again.total, 0);

    // A write shows up in queries immediately and keeps the file fresh
    lib.write_field(&bare, Namespace::Iptc, "Keywords", &["sunset".to_string()])
        .unwrap();
    assert_eq!(search(&lib, "sunset").total_count, 2);
    let after_write = lib.start_scan(&root, false).unwrap();
    assert!(!after_write.started);

    // Forcing rereads everything
    let forced = lib.start_scan(&root, true).unwrap();
    assert!(forced.started);
    assert_eq!(forced.total, 3);
    assert_eq!(forced.handle.unwrap().wait(), ScanOutcome::Completed);
    assert_eq!(search(&lib, "sunset").total_count, 2);
}

#[test]
fn cancelled_scan_keeps_everything_already_processed() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(HookedBackend::new(40));
    Library::init(tmp.path()).unwrap();
    let lib = Arc::new(
        Library::open_with(tmp.path(), backend.clone(), Box::new(Resizer)).unwrap(),
    );
    let root = lib.root().to_path_buf();

    for i in 0..100 {
        tagged_image(&root, &format!("img_{i:03}.jpg"), &["common"]);
    }

    {
        let lib = Arc::clone(&lib);
        let dir = root.clone();
        backend.set_hook(Box::new(move || {
            assert!(lib.cancel_scan(&dir).unwrap());
        }));
    }

    let started = lib.start_scan(&root, false).unwrap();
    assert!(started.started);
    assert_eq!(started.total, 100);
    assert_eq!(started.handle.unwrap().wait(), ScanOutcome::Cancelled);

    // Cancellation lands between files: the file being read when cancel
    // arrived still commits, nothing after it does.
    let status = lib.scan_status(&root).unwrap();
    assert!(!status.scanning);
    assert_eq!(status.processed, 40);
    assert_eq!(search(&lib, "common").total_count, 40);

    // Directory never completed, so the next scan picks up the rest
    assert!(!lib.directory_scanned(&root).unwrap());
    let resumed = lib.start_scan(&root, false).unwrap();
    assert!(resumed.started);
    assert_eq!(resumed.total, 60);
    assert_eq!(resumed.handle.unwrap().wait(), ScanOutcome::Completed);
    assert_eq!(search(&lib, "common").total_count, 100);
}

#[test]
fn only_one_scan_per_directory_at_a_time() {
    let tmp = TempDir::new().unwrap();
    let (release, gate) = mpsc::channel();
    let backend = Arc::new(GatedBackend {
        inner: SidecarBackend,
        gate: Mutex::new(Some(gate)),
    });
    Library::init(tmp.path()).unwrap();
    let lib = Library::open_with(tmp.path(), backend, Box::new(Resizer)).unwrap();
    let root = lib.root().to_path_buf();

    tagged_image(&root, "a.jpg", &["x"]);

    let first = lib.start_scan(&root, false).unwrap();
    assert!(first.started);
    assert!(lib.scan_status(&root).unwrap().scanning);

    let second = lib.start_scan(&root, false).unwrap();
    assert!(!second.started);

    release.send(()).unwrap();
    assert_eq!(first.handle.unwrap().wait(), ScanOutcome::Completed);
    assert!(!lib.scan_status(&root).unwrap().scanning);

    // With the first scan done the directory can be claimed again
    let third = lib.start_scan(&root, true).unwrap();
    assert!(third.started);
    assert_eq!(third.handle.unwrap().wait(), ScanOutcome::Completed);
}

#[test]
fn cancel_racing_with_completion_never_wedges_the_directory() {
    let tmp = TempDir::new().unwrap();
    let lib = Arc::new(Library::init(tmp.path()).unwrap());
    let root = lib.root().to_path_buf();
    tagged_image(&root, "only.jpg", &["x"]);

    // A cancel landing just as the worker finishes must not leave the
    // directory claimed, or every later scan would be refused.
    for _ in 0..50 {
        let started = lib.start_scan(&root, true).unwrap();
        assert!(started.started);
        let canceller = {
            let lib = Arc::clone(&lib);
            let dir = root.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let _ = lib.cancel_scan(&dir);
                }
            })
        };
        started.handle.unwrap().wait();
        canceller.join().unwrap();
        assert!(!lib.scan_status(&root).unwrap().scanning);
    }
}

#[test]
fn vanished_files_are_pruned_even_when_no_scan_work_remains() {
    let tmp = TempDir::new().unwrap();
    let lib = Library::init(tmp.path()).unwrap();
    let root = lib.root().to_path_buf();

    tagged_image(&root, "keep.jpg", &["stays"]);
    let gone = tagged_image(&root, "gone.jpg", &["leaves"]);

    lib.start_scan(&root, false)
        .unwrap()
        .handle
        .unwrap()
        .wait();
    assert_eq!(search(&lib, "leaves").total_count, 1);

    std::fs::remove_file(&gone).unwrap();
    let rescan = lib.start_scan(&root, false).unwrap();
    // Pruning happens during enumeration, before any worker is needed
    assert!(!rescan.started);
    assert_eq!(search(&lib, "leaves").total_count, 0);
    assert_eq!(search(&lib, "stays").total_count, 1);
    assert!(lib.search_tags("leave", None, 10).unwrap().is_empty());
}

#[test]
fn unreadable_files_are_skipped_and_the_scan_completes() {
    struct FailingBackend;
    impl ContainerBackend for FailingBackend {
        fn read_fields(&self, path: &Path) -> photometa_core::Result<FieldMap> {
            if path.file_name().is_some_and(|n| n == "bad.jpg") {
                return Err(PhotometaError::unreadable(path, "corrupt container"));
            }
            SidecarBackend.read_fields(path)
        }
        fn write_fields(&self, path: &Path, fields: &FieldMap) -> photometa_core::Result<()> {
            SidecarBackend.write_fields(path, fields)
        }
    }

    let tmp = TempDir::new().unwrap();
    Library::init(tmp.path()).unwrap();
    let lib = Library::open_with(tmp.path(), Arc::new(FailingBackend), Box::new(Resizer)).unwrap();
    let root = lib.root().to_path_buf();

    tagged_image(&root, "good.jpg", &["fine"]);
    tagged_image(&root, "bad.jpg", &["never"]);

    let started = lib.start_scan(&root, false).unwrap();
    assert_eq!(started.total, 2);
    assert_eq!(started.handle.unwrap().wait(), ScanOutcome::Completed);

    assert_eq!(search(&lib, "fine").total_count, 1);
    assert_eq!(search(&lib, "never").total_count, 0);
    // The bad file never got an identity, so a later scan retries it
    let retry = lib.start_scan(&root, false).unwrap();
    assert!(retry.started);
    assert_eq!(retry.total, 1);
}

#[test]
fn scan_of_subdirectory_leaves_siblings_alone() {
    let tmp = TempDir::new().unwrap();
    let lib = Library::init(tmp.path()).unwrap();
    let root = lib.root().to_path_buf();
    let sub = root.join("album");
    std::fs::create_dir(&sub).unwrap();

    tagged_image(&root, "top.jpg", &["top"]);
    tagged_image(&sub, "inner.jpg", &["inner"]);

    let started = lib.start_scan(&sub, false).unwrap();
    assert_eq!(started.total, 1);
    started.handle.unwrap().wait();

    assert_eq!(search(&lib, "inner").total_count, 1);
    assert_eq!(search(&lib, "top").total_count, 0);
    assert!(lib.directory_scanned(&sub).unwrap());
    assert!(!lib.directory_scanned(&root).unwrap());
}

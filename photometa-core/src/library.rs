//! Library façade.
//!
//! A library is a root directory plus the `.photometa/` state folder that
//! holds its config, tag index database and artifact cache. All engine
//! operations go through [`Library`]; callers never touch the index or the
//! container backend directly.

use crate::cache::{ArtifactCache, ArtifactKind, ImageResizer, Resizer};
use crate::config::{Config, DEFAULT_CONFIG};
use crate::fields::{FieldDef, Namespace};
use crate::identity::ContentIdentity;
use crate::index::{QueryPage, TagIndex};
use crate::metadata::{ContainerBackend, MetadataTransaction, SidecarBackend};
use crate::scan::ScanRegistry;
use crate::walk;
use crate::PhotometaError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Name of the state folder created inside a library root.
pub const STATE_DIR: &str = ".photometa";
const CONFIG_FILE: &str = "config.toml";
const DB_FILE: &str = "index.db";
const ARTIFACTS_DIR: &str = "artifacts";

/// How to filter a file listing.
#[derive(Debug, Clone)]
pub enum ListFilter {
    /// Every eligible file, straight from the filesystem.
    All,
    /// Files whose tags match a search string, optionally scoped to a field.
    Search {
        query: String,
        field: Option<(Namespace, String)>,
    },
    /// Files that carry no value for the given field.
    Untagged { namespace: Namespace, field: String },
}

/// One field with its current values, as returned by metadata reads.
#[derive(Debug, Clone, Serialize)]
pub struct FieldValues {
    pub key: &'static str,
    pub label: &'static str,
    pub namespace: Namespace,
    pub multi_valued: bool,
    pub values: Vec<String>,
}

pub struct Library {
    pub(crate) root: PathBuf,
    pub(crate) config: Config,
    pub(crate) db_path: PathBuf,
    pub(crate) index: Mutex<TagIndex>,
    pub(crate) backend: Arc<dyn ContainerBackend>,
    pub(crate) cache: ArtifactCache,
    pub(crate) scans: ScanRegistry,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("root", &self.root)
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl Library {
    /// Initialize a new library at `root`, writing the default config.
    pub fn init(root: &Path) -> crate::Result<Self> {
        let state = root.join(STATE_DIR);
        let config_path = state.join(CONFIG_FILE);
        if config_path.is_file() {
            return Err(PhotometaError::ConfigExists(config_path));
        }
        fs::create_dir_all(&state).map_err(|e| PhotometaError::write_failed(&state, e))?;
        fs::write(&config_path, DEFAULT_CONFIG)
            .map_err(|e| PhotometaError::write_failed(&config_path, e))?;
        Self::open(root)
    }

    /// Open an existing library at `root`.
    pub fn open(root: &Path) -> crate::Result<Self> {
        Self::open_with(root, Arc::new(SidecarBackend), Box::new(Resizer))
    }

    /// Open the library at `root`, initializing it first if needed.
    pub fn open_or_init(root: &Path) -> crate::Result<Self> {
        if root.join(STATE_DIR).join(CONFIG_FILE).is_file() {
            Self::open(root)
        } else {
            Self::init(root)
        }
    }

    /// Open with explicit backend and resizer. Tests swap these out.
    pub fn open_with(
        root: &Path,
        backend: Arc<dyn ContainerBackend>,
        resizer: Box<dyn ImageResizer>,
    ) -> crate::Result<Self> {
        crate::fields::validate_table()?;

        let state = root.join(STATE_DIR);
        let config_path = state.join(CONFIG_FILE);
        if !config_path.is_file() {
            return Err(PhotometaError::NotInitialized);
        }
        let config = Config::load(&config_path)?;
        let db_path = state.join(DB_FILE);
        let index = TagIndex::open(&db_path)?;
        let cache = ArtifactCache::new(state.join(ARTIFACTS_DIR), resizer);

        let root = root
            .canonicalize()
            .map_err(|e| PhotometaError::unreadable(root, e))?;

        Ok(Self {
            root,
            config,
            db_path,
            index: Mutex::new(index),
            backend,
            cache,
            scans: ScanRegistry::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// List files under `dir`, one page at a time. Pages are zero-indexed;
    /// a page past the end comes back empty with the counts intact.
    pub fn list_images(
        &self,
        dir: &Path,
        filter: &ListFilter,
        page: usize,
        page_size: Option<usize>,
    ) -> crate::Result<QueryPage> {
        let dir = self.resolve_dir(dir)?;
        let page_size = page_size.unwrap_or(self.config.listing.page_size).max(1);

        match filter {
            ListFilter::All => {
                let files = walk::discover_images(&dir, &self.config)?;
                Ok(paginate(files, page, page_size))
            }
            ListFilter::Search { query, field } => {
                let required = match field {
                    Some((namespace, key)) => {
                        let def = self.known_field(*namespace, key)?;
                        Some((*namespace, def.key))
                    }
                    None => None,
                };
                let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
                index.search_images(&dir, query, required, page, page_size)
            }
            ListFilter::Untagged { namespace, field } => {
                let def = self.known_field(*namespace, field)?;
                let files = walk::discover_images(&dir, &self.config)?;
                let tagged = {
                    let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
                    index.tagged_files(&dir, *namespace, def.key)?
                };
                let untagged: Vec<PathBuf> =
                    files.into_iter().filter(|f| !tagged.contains(f)).collect();
                Ok(paginate(untagged, page, page_size))
            }
        }
    }

    /// Current values of one field, read from the file's container.
    pub fn read_field(
        &self,
        path: &Path,
        namespace: Namespace,
        key: &str,
    ) -> crate::Result<Vec<String>> {
        let path = self.resolve_file(path)?;
        MetadataTransaction::new(self.backend.as_ref()).read_field(&path, namespace, key)
    }

    /// Every defined field of both namespaces with its current values.
    pub fn read_metadata(&self, path: &Path) -> crate::Result<Vec<FieldValues>> {
        let path = self.resolve_file(path)?;
        let tx = MetadataTransaction::new(self.backend.as_ref());
        Ok(tx
            .read_all(&path)?
            .into_iter()
            .map(|(def, values)| FieldValues {
                key: def.key,
                label: def.label,
                namespace: def.namespace,
                multi_valued: def.multi_valued,
                values,
            })
            .collect())
    }

    /// Replace one field's values in the file and mirror the change into
    /// the tag index, so queries see it without a rescan. Returns the
    /// values as persisted.
    pub fn write_field(
        &self,
        path: &Path,
        namespace: Namespace,
        key: &str,
        values: &[String],
    ) -> crate::Result<Vec<String>> {
        let path = self.resolve_file(path)?;
        let def = self.known_field(namespace, key)?;

        let tx = MetadataTransaction::new(self.backend.as_ref());
        let written = tx.write_field(&path, namespace, key, values)?;

        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        index.replace_field(&path, namespace, def.key, &written)?;
        // The write changed the file; refresh its identity so the next
        // incremental scan does not redo it.
        if let Ok(identity) = ContentIdentity::of(&path) {
            index.record_identity(&path, identity)?;
        }
        Ok(written)
    }

    /// Cached thumbnail for `path`, rendered on first request.
    pub fn thumbnail(&self, path: &Path) -> crate::Result<PathBuf> {
        let path = self.resolve_file(path)?;
        let a = &self.config.artifacts;
        self.cache
            .get_or_create(&path, ArtifactKind::Thumbnail, a.thumbnail_edge, a.thumbnail_quality)
    }

    /// Cached screen-size preview for `path`.
    pub fn preview(&self, path: &Path) -> crate::Result<PathBuf> {
        let path = self.resolve_file(path)?;
        let edge = self.suggested_preview_edge(&path);
        self.cache
            .get_or_create(&path, ArtifactKind::Preview, edge, self.config.artifacts.preview_quality)
    }

    /// Preview edge for a file: very large files and formats that decode
    /// slowly get the capped edge, everything else the full preview size.
    pub fn suggested_preview_edge(&self, path: &Path) -> u32 {
        let a = &self.config.artifacts;
        let heavy_format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                matches!(
                    e.to_ascii_lowercase().as_str(),
                    "tif" | "tiff" | "heic" | "heif"
                )
            })
            .unwrap_or(false);
        let oversized = fs::metadata(path)
            .map(|m| m.len() > a.large_file_threshold)
            .unwrap_or(false);
        if heavy_format || oversized {
            a.capped_preview_edge
        } else {
            a.preview_max_edge
        }
    }

    /// Autocomplete tag values across the library.
    pub fn search_tags(
        &self,
        query: &str,
        scope: Option<(Namespace, &str)>,
        limit: usize,
    ) -> crate::Result<Vec<String>> {
        let scope = match scope {
            Some((namespace, key)) => {
                let def = self.known_field(namespace, key)?;
                Some((namespace, def.key))
            }
            None => None,
        };
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        index.search_field_values(query, scope, limit)
    }

    /// Whether `dir` has ever completed a scan.
    pub fn directory_scanned(&self, dir: &Path) -> crate::Result<bool> {
        let dir = self.resolve_dir(dir)?;
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        index.directory_scanned(&dir)
    }

    fn known_field(&self, namespace: Namespace, key: &str) -> crate::Result<&'static FieldDef> {
        FieldDef::by_key(namespace, key)
            .ok_or_else(|| PhotometaError::UnknownField(format!("{namespace}.{key}")))
    }

    /// Resolve a directory argument against the library root and refuse
    /// paths that escape it.
    pub(crate) fn resolve_dir(&self, dir: &Path) -> crate::Result<PathBuf> {
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root.join(dir)
        };
        if !contained_in(&dir, &self.root) {
            return Err(PhotometaError::DirectoryUnavailable(dir));
        }
        Ok(dir)
    }

    fn resolve_file(&self, path: &Path) -> crate::Result<PathBuf> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if !contained_in(&path, &self.root) {
            return Err(PhotometaError::unreadable(&path, "outside library root"));
        }
        Ok(path)
    }
}

/// `starts_with` compares raw components, so a `..` segment could walk
/// back out of the root. Refuse those outright.
fn contained_in(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
        && !path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
}

fn paginate(files: Vec<PathBuf>, page: usize, page_size: usize) -> QueryPage {
    let total = files.len();
    let start = page.saturating_mul(page_size).min(total);
    let end = (start + page_size).min(total);
    QueryPage::new(files[start..end].to_vec(), page, page_size, total)
}

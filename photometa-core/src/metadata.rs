//! Metadata transactions: surgical per-field reads and writes against a
//! file's embedded metadata container.
//!
//! The container codec itself is an external capability behind
//! [`ContainerBackend`]; this module owns the correctness-critical part:
//! replacing exactly the entries of one field while leaving every other
//! field untouched, whether or not it shares a namespace, and never
//! leaving a file in a half-written state.

use crate::fields::{FieldDef, Namespace};
use crate::PhotometaError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// All container entries of a file, keyed by raw container key
/// (e.g. "Iptc.Application2.Keywords"). A key may hold several values.
pub type FieldMap = BTreeMap<String, Vec<String>>;

/// Read/write primitive for the embedded container format.
///
/// `write_fields` must be atomic: on failure the file's prior state stays
/// recoverable (write a temporary copy and swap in place).
pub trait ContainerBackend: Send + Sync {
    fn read_fields(&self, path: &Path) -> crate::Result<FieldMap>;
    fn write_fields(&self, path: &Path, fields: &FieldMap) -> crate::Result<()>;
}

/// Container backend that persists the field map in a hidden sidecar
/// document next to the image.
///
/// Stands in for a native exiv2-style codec; it honors the same contract
/// (whole-map read, atomic whole-map write) so the transaction layer is
/// agnostic to which backend is wired in.
#[derive(Debug, Default)]
pub struct SidecarBackend;

impl SidecarBackend {
    fn sidecar_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!(".{}.pmeta", name))
    }
}

impl ContainerBackend for SidecarBackend {
    fn read_fields(&self, path: &Path) -> crate::Result<FieldMap> {
        if !path.is_file() {
            return Err(PhotometaError::unreadable(path, "no such file"));
        }
        let sidecar = Self::sidecar_path(path);
        if !sidecar.exists() {
            return Ok(FieldMap::new());
        }
        let content =
            fs::read_to_string(&sidecar).map_err(|e| PhotometaError::unreadable(path, e))?;
        serde_json::from_str(&content).map_err(|e| PhotometaError::unreadable(path, e))
    }

    fn write_fields(&self, path: &Path, fields: &FieldMap) -> crate::Result<()> {
        if !path.is_file() {
            return Err(PhotometaError::unreadable(path, "no such file"));
        }
        let sidecar = Self::sidecar_path(path);
        let tmp = sidecar.with_extension("pmeta.tmp");
        let body = serde_json::to_vec_pretty(fields)?;
        fs::write(&tmp, body).map_err(|e| PhotometaError::write_failed(path, e))?;
        if let Err(e) = fs::rename(&tmp, &sidecar) {
            let _ = fs::remove_file(&tmp);
            return Err(PhotometaError::write_failed(path, e));
        }
        Ok(())
    }
}

/// Trim, drop blanks, and deduplicate preserving first occurrence.
fn clean_values<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for v in values {
        let v = v.as_ref().trim();
        if v.is_empty() {
            continue;
        }
        if seen.insert(v.to_string()) {
            out.push(v.to_string());
        }
    }
    out
}

/// Per-field read/write operations over a container backend.
pub struct MetadataTransaction<'a> {
    backend: &'a dyn ContainerBackend,
}

impl<'a> MetadataTransaction<'a> {
    pub fn new(backend: &'a dyn ContainerBackend) -> Self {
        Self { backend }
    }

    /// Read the current values of one field. Keys without a mapping entry
    /// read back empty rather than erroring; only writes reject them.
    pub fn read_field(
        &self,
        path: &Path,
        namespace: Namespace,
        key: &str,
    ) -> crate::Result<Vec<String>> {
        let Some(def) = FieldDef::by_key(namespace, key) else {
            return Ok(Vec::new());
        };
        let map = self.backend.read_fields(path)?;
        Ok(map
            .get(def.raw_key)
            .map(|vals| clean_values(vals))
            .unwrap_or_default())
    }

    /// Read every defined field of both namespaces, in table order, from a
    /// single container read. Used by the scan path and full-metadata reads.
    pub fn read_all(
        &self,
        path: &Path,
    ) -> crate::Result<Vec<(&'static FieldDef, Vec<String>)>> {
        let map = self.backend.read_fields(path)?;
        Ok(crate::fields::FIELD_DEFS
            .iter()
            .map(|def| {
                let values = map
                    .get(def.raw_key)
                    .map(|vals| clean_values(vals))
                    .unwrap_or_default();
                (def, values)
            })
            .collect())
    }

    /// Replace all entries of one field with `values`.
    ///
    /// Values are deduplicated preserving caller order; blank entries are
    /// dropped. A single-valued field keeps only the last value supplied.
    /// An empty `values` clears the field. Every other raw key in the
    /// container is carried over untouched.
    pub fn write_field(
        &self,
        path: &Path,
        namespace: Namespace,
        key: &str,
        values: &[String],
    ) -> crate::Result<Vec<String>> {
        let def = FieldDef::by_key(namespace, key).ok_or_else(|| {
            PhotometaError::UnknownField(format!("{}.{}", namespace, key))
        })?;

        let mut map = self.backend.read_fields(path)?;
        map.remove(def.raw_key);

        let mut cleaned = clean_values(values);
        if !def.multi_valued && cleaned.len() > 1 {
            // Keep-last policy for single-valued fields
            cleaned = vec![cleaned.pop().unwrap()];
        }
        if !cleaned.is_empty() {
            map.insert(def.raw_key.to_string(), cleaned.clone());
        }

        self.backend.write_fields(path, &map)?;
        Ok(cleaned)
    }
}

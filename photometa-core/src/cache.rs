//! Derived-artifact cache.
//!
//! Thumbnails and previews are rendered once and stored on disk under a
//! name that binds the source path, the artifact kind, the target edge and
//! the source's content identity. When the source changes, the stale
//! artifact's name no longer matches and is deleted on the next request.

use crate::identity::{path_digest, ContentIdentity};
use crate::PhotometaError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// What kind of derived image an artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Thumbnail,
    Preview,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Thumbnail => "thumb",
            ArtifactKind::Preview => "preview",
        }
    }
}

/// Renders a source image down to a JPEG no larger than `max_edge` on its
/// longest side. Seam for tests; production uses [`Resizer`].
pub trait ImageResizer: Send + Sync {
    fn render_jpeg(&self, source: &Path, max_edge: u32, quality: u8) -> crate::Result<Vec<u8>>;
}

/// Default resizer built on the `image` crate.
pub struct Resizer;

impl ImageResizer for Resizer {
    fn render_jpeg(&self, source: &Path, max_edge: u32, quality: u8) -> crate::Result<Vec<u8>> {
        let img = image::open(source).map_err(|err| PhotometaError::UnsupportedFormat {
            path: source.to_path_buf(),
            reason: err.to_string(),
        })?;
        let img = if img.width().max(img.height()) > max_edge {
            img.resize(max_edge, max_edge, FilterType::Lanczos3)
        } else {
            img
        };
        // JPEG output is always three-channel
        let rgb = img.to_rgb8();
        let mut buf = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buf, quality)
            .encode_image(&rgb)
            .map_err(|err| PhotometaError::UnsupportedFormat {
                path: source.to_path_buf(),
                reason: err.to_string(),
            })?;
        Ok(buf.into_inner())
    }
}

/// On-disk cache of rendered artifacts for one library.
pub struct ArtifactCache {
    dir: PathBuf,
    resizer: Box<dyn ImageResizer>,
}

impl ArtifactCache {
    pub fn new(dir: PathBuf, resizer: Box<dyn ImageResizer>) -> Self {
        Self { dir, resizer }
    }

    /// Path of the artifact for `source` at its current content identity,
    /// rendering it first if no fresh copy exists. Stale artifacts of the
    /// same source and kind are removed before the new one is written.
    pub fn get_or_create(
        &self,
        source: &Path,
        kind: ArtifactKind,
        edge: u32,
        quality: u8,
    ) -> crate::Result<PathBuf> {
        let identity = ContentIdentity::of(source)?;
        let name = self.artifact_name(source, kind, edge, &identity);
        let target = self.dir.join(&name);
        if target.is_file() {
            return Ok(target);
        }

        fs::create_dir_all(&self.dir).map_err(|e| PhotometaError::write_failed(&self.dir, e))?;
        self.remove_stale(source, kind, &name);

        let bytes = self.resizer.render_jpeg(source, edge, quality)?;
        let tmp = self.dir.join(format!("{name}.tmp"));
        fs::write(&tmp, &bytes).map_err(|e| PhotometaError::write_failed(&tmp, e))?;
        if let Err(err) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(PhotometaError::write_failed(&target, err));
        }
        Ok(target)
    }

    fn artifact_name(
        &self,
        source: &Path,
        kind: ArtifactKind,
        edge: u32,
        identity: &ContentIdentity,
    ) -> String {
        format!(
            "{}-{}-{}-{}.jpg",
            path_digest(source),
            kind.as_str(),
            edge,
            identity.fingerprint()
        )
    }

    /// Delete superseded artifacts: same source and kind, any other edge or
    /// identity. Failures are ignored, a leftover file is only wasted space.
    fn remove_stale(&self, source: &Path, kind: ArtifactKind, keep: &str) {
        let prefix = format!("{}-{}-", path_digest(source), kind.as_str());
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix) && name != keep {
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}

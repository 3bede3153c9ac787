//! photometa-core: an image-metadata indexing and caching engine.
//!
//! The engine manages a library of image files: it scans directories for
//! embedded IPTC/EXIF metadata, mirrors the values into a queryable SQLite
//! tag index, performs surgical per-field reads and writes against the
//! files themselves, and caches rendered thumbnails and previews keyed by
//! content identity.
//!
//! Entry point is [`Library`]; everything else is plumbing it composes.

pub mod cache;
pub mod config;
pub mod error;
pub mod fields;
pub mod identity;
pub mod index;
pub mod library;
pub mod metadata;
pub mod scan;
pub mod walk;

pub use cache::{ArtifactCache, ArtifactKind, ImageResizer, Resizer};
pub use config::Config;
pub use error::PhotometaError;
pub use fields::{FieldDef, Namespace, FIELD_DEFS};
pub use identity::ContentIdentity;
pub use index::{QueryPage, TagIndex};
pub use library::{FieldValues, Library, ListFilter};
pub use metadata::{ContainerBackend, FieldMap, MetadataTransaction, SidecarBackend};
pub use scan::{ScanOutcome, ScanSnapshot, ScanStarted};

pub type Result<T> = std::result::Result<T, PhotometaError>;

//! Static IPTC/EXIF field definitions.
//!
//! The engine never infers field properties from file content: whether a
//! field is multi-valued, and how its human-readable key maps to the raw
//! container key, is fixed here and validated once at library open.

use crate::error::PhotometaError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Metadata namespace within an image's embedded container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Iptc,
    Exif,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Iptc => "iptc",
            Namespace::Exif => "exif",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "iptc" => Some(Namespace::Iptc),
            "exif" => Some(Namespace::Exif),
            _ => None,
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One writable metadata field: human key, raw container key, display label.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDef {
    /// Machine key used throughout the API (e.g. "Keywords").
    pub key: &'static str,
    /// Raw key in the container's key space (e.g. "Iptc.Application2.Keywords").
    pub raw_key: &'static str,
    /// Human-readable label for UI display.
    pub label: &'static str,
    pub description: &'static str,
    pub namespace: Namespace,
    /// Whether the field may hold more than one concurrent value.
    pub multi_valued: bool,
}

macro_rules! field {
    ($ns:ident, $key:literal, $raw:literal, $label:literal, $desc:literal, $multi:literal) => {
        FieldDef {
            key: $key,
            raw_key: $raw,
            label: $label,
            description: $desc,
            namespace: Namespace::$ns,
            multi_valued: $multi,
        }
    };
}

/// The fixed set of writable fields. Keywords and SupplementalCategories are
/// the only multi-valued fields; everything else holds at most one value.
pub static FIELD_DEFS: &[FieldDef] = &[
    // IPTC Application2 record
    field!(Iptc, "ObjectName", "Iptc.Application2.ObjectName", "Object Name", "Shorthand reference or title for the object.", false),
    field!(Iptc, "Keywords", "Iptc.Application2.Keywords", "Keywords", "Keywords to assist with searching or indexing.", true),
    field!(Iptc, "Caption", "Iptc.Application2.Caption", "Caption", "A textual description or caption of the object.", false),
    field!(Iptc, "By-line", "Iptc.Application2.Byline", "By-line", "Name of the creator or photographer.", false),
    field!(Iptc, "By-lineTitle", "Iptc.Application2.BylineTitle", "By-line Title", "Job title or position of the creator.", false),
    field!(Iptc, "Credit", "Iptc.Application2.Credit", "Credit", "Credit line for the content's source or provider.", false),
    field!(Iptc, "Source", "Iptc.Application2.Source", "Source", "Original source of the content.", false),
    field!(Iptc, "CopyrightNotice", "Iptc.Application2.CopyrightNotice", "Copyright Notice", "Copyright information or notice.", false),
    field!(Iptc, "Headline", "Iptc.Application2.Headline", "Headline", "A brief summary or headline for the content.", false),
    field!(Iptc, "SpecialInstructions", "Iptc.Application2.SpecialInstructions", "Special Instructions", "Special handling instructions for the content.", false),
    field!(Iptc, "Category", "Iptc.Application2.Category", "Category", "Subject category for the content.", false),
    field!(Iptc, "SupplementalCategories", "Iptc.Application2.SupplementalCategories", "Supplemental Categories", "Additional subject categories.", true),
    field!(Iptc, "Urgency", "Iptc.Application2.Urgency", "Urgency", "Editorial urgency level (1-8).", false),
    field!(Iptc, "DateCreated", "Iptc.Application2.DateCreated", "Date Created", "Date the content was created (YYYYMMDD).", false),
    field!(Iptc, "City", "Iptc.Application2.City", "City", "City where the content was created.", false),
    field!(Iptc, "Province-State", "Iptc.Application2.Province-State", "Province/State", "Province or state where the content was created.", false),
    field!(Iptc, "Country-PrimaryLocationName", "Iptc.Application2.Country-PrimaryLocationName", "Country", "Name of the country where the content was created.", false),
    field!(Iptc, "OriginalTransmissionReference", "Iptc.Application2.OriginalTransmissionReference", "Original Transmission Reference", "Unique identifier of the transmission or reference.", false),
    // EXIF
    field!(Exif, "Artist", "Exif.Image.Artist", "Artist", "Name of the photographer or creator.", false),
    field!(Exif, "Copyright", "Exif.Image.Copyright", "Copyright", "Copyright notice for the image.", false),
    field!(Exif, "ImageDescription", "Exif.Image.ImageDescription", "Image Description", "A description of the image content.", false),
    field!(Exif, "UserComment", "Exif.Photo.UserComment", "User Comment", "User-defined comment or notes.", false),
    field!(Exif, "Software", "Exif.Image.Software", "Software", "Software used to create or process the image.", false),
    field!(Exif, "Make", "Exif.Image.Make", "Camera Make", "Manufacturer of the camera.", false),
    field!(Exif, "Model", "Exif.Image.Model", "Camera Model", "Model of the camera.", false),
    field!(Exif, "DateTimeOriginal", "Exif.Photo.DateTimeOriginal", "Date/Time Original", "Date and time when the photo was taken (YYYY:MM:DD HH:MM:SS).", false),
    field!(Exif, "GPSLatitude", "Exif.GPSInfo.GPSLatitude", "GPS Latitude", "Latitude coordinate.", false),
    field!(Exif, "GPSLongitude", "Exif.GPSInfo.GPSLongitude", "GPS Longitude", "Longitude coordinate.", false),
    field!(Exif, "GPSAltitude", "Exif.GPSInfo.GPSAltitude", "GPS Altitude", "Altitude in meters above sea level.", false),
];

impl FieldDef {
    /// Look up a field by namespace and machine key.
    pub fn by_key(namespace: Namespace, key: &str) -> Option<&'static FieldDef> {
        FIELD_DEFS
            .iter()
            .find(|d| d.namespace == namespace && d.key == key)
    }

    /// Look up a field by its raw container key.
    pub fn by_raw_key(raw_key: &str) -> Option<&'static FieldDef> {
        FIELD_DEFS.iter().find(|d| d.raw_key == raw_key)
    }
}

/// Verify the key <-> raw-key mapping is bidirectional and collision-free.
/// Run once at library open; a broken table is a build defect, not a user error.
pub fn validate_table() -> Result<(), PhotometaError> {
    let mut keys = HashSet::new();
    let mut raw_keys = HashSet::new();

    for def in FIELD_DEFS {
        if !keys.insert((def.namespace, def.key)) {
            return Err(PhotometaError::FieldTable(format!(
                "duplicate key {}.{}",
                def.namespace, def.key
            )));
        }
        if !raw_keys.insert(def.raw_key) {
            return Err(PhotometaError::FieldTable(format!(
                "duplicate raw key {}",
                def.raw_key
            )));
        }
        let expected_prefix = match def.namespace {
            Namespace::Iptc => "Iptc.",
            Namespace::Exif => "Exif.",
        };
        if !def.raw_key.starts_with(expected_prefix) {
            return Err(PhotometaError::FieldTable(format!(
                "raw key {} does not match namespace {}",
                def.raw_key, def.namespace
            )));
        }
    }

    Ok(())
}

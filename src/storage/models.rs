use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format tag a client declares for an uploaded or saved file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    #[serde(rename = "GeoJSON")]
    GeoJson,
    #[serde(rename = "KML")]
    Kml,
    #[serde(rename = "TIFF")]
    Tiff,
}

/// Extensions accepted by the upload endpoint (lower-case, without the dot).
pub const ALLOWED_EXTENSIONS: &[&str] = &["geojson", "json", "kml", "tif", "tiff"];

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::GeoJson => "GeoJSON",
            FileType::Kml => "KML",
            FileType::Tiff => "TIFF",
        }
    }

    /// The declared type an allow-listed extension is compatible with.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "geojson" | "json" => Some(FileType::GeoJson),
            "kml" => Some(FileType::Kml),
            "tif" | "tiff" => Some(FileType::Tiff),
            _ => None,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFileType(pub String);

impl FromStr for FileType {
    type Err = UnknownFileType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GeoJSON" => Ok(FileType::GeoJson),
            "KML" => Ok(FileType::Kml),
            "TIFF" => Ok(FileType::Tiff),
            other => Err(UnknownFileType(other.to_string())),
        }
    }
}

/// How an artifact entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactOrigin {
    /// Multipart upload of an existing file
    Upload,
    /// Named map authored in the client and saved as GeoJSON
    Saved,
}

/// A user account stored in redb
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    /// Normalized (trimmed, lower-case)
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Metadata for a stored geospatial file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: String,
    pub owner_id: String,
    /// Human-readable name; never used to build paths
    pub filename: String,
    /// Object store key of the content file
    pub storage_key: String,
    pub file_type: FileType,
    pub origin: ArtifactOrigin,
    pub byte_size: u64,
    /// Inline copy of the content for saved maps; must match the file
    #[serde(default)]
    pub map_data: Option<serde_json::Value>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub id: String,
    pub owner_id: String,
    pub shape_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub id: String,
    pub owner_id: String,
    pub lat: f64,
    pub lng: f64,
    pub created_at: DateTime<Utc>,
}

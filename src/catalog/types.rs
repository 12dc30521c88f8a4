use crate::spec::{SpecError, SpecFormat};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Layout of the `openapi_schemas` table.
///
/// Ordered: a store loaded from a v1 catalog must never replace a v2 one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CatalogVersion {
    /// `schema_id, schema_version, schema_format, schema_content`
    V1 = 1,
    /// v1 columns plus `status`
    V2 = 2,
}

impl CatalogVersion {
    pub fn from_number(n: u32) -> Option<Self> {
        match n {
            1 => Some(CatalogVersion::V1),
            2 => Some(CatalogVersion::V2),
            _ => None,
        }
    }
}

impl fmt::Display for CatalogVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", *self as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    New,
    Applied,
}

impl RecordStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Some(RecordStatus::New),
            "applied" => Some(RecordStatus::Applied),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::New => "new",
            RecordStatus::Applied => "applied",
        }
    }
}

/// One catalog row, exactly as read.
#[derive(Debug, Clone)]
pub struct SpecRecord {
    pub schema_id: i64,
    pub version: String,
    pub format: SpecFormat,
    /// Exact bytes, BOM included.
    pub content: Arc<[u8]>,
    /// `None` for v1 catalogs and non-database sources.
    pub status: Option<RecordStatus>,
    /// Lowercase hex SHA-256 of `content`.
    pub checksum: String,
}

impl SpecRecord {
    pub fn new(
        schema_id: i64,
        version: impl Into<String>,
        format: SpecFormat,
        content: impl Into<Arc<[u8]>>,
        status: Option<RecordStatus>,
    ) -> Self {
        let content = content.into();
        let checksum = sha256_hex(&content);
        Self {
            schema_id,
            version: version.into(),
            format,
            content,
            status,
            checksum,
        }
    }

    pub fn is_new(&self) -> bool {
        self.status == Some(RecordStatus::New)
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Everything a source produced in one read.
#[derive(Debug, Clone)]
pub struct CatalogLoad {
    pub version: CatalogVersion,
    pub records: Vec<SpecRecord>,
    /// Rows that were read but could not become records.
    pub rejected: Vec<SpecError>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog {0} does not exist")]
    Missing(PathBuf),
    #[error("catalog query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("reading catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("fetching catalog from {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("unsupported catalog version {0}")]
    UnsupportedVersion(u32),
    #[error("catalog layout: {0}")]
    BadLayout(String),
}

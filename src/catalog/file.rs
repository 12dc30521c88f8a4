use super::types::{sha256_hex, CatalogError, CatalogLoad, CatalogVersion, SpecRecord};
use super::CatalogSource;
use crate::spec::SpecFormat;
use std::path::{Path, PathBuf};

/// Format implied by a file extension, if any.
pub(crate) fn format_from_name(name: &str) -> Option<SpecFormat> {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".yaml") || lower.ends_with(".yml") {
        Some(SpecFormat::Yaml)
    } else if lower.ends_with(".json") {
        Some(SpecFormat::Json)
    } else {
        None
    }
}

/// Version string for sources without one: first 16 hex chars of the SHA-256.
pub(crate) fn content_version(content: &[u8]) -> String {
    sha256_hex(content).chars().take(16).collect()
}

/// A single OpenAPI document on disk served under one schema ID.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
    schema_id: i64,
}

impl FileCatalog {
    pub fn new(path: impl Into<PathBuf>, schema_id: i64) -> Self {
        Self {
            path: path.into(),
            schema_id,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogSource for FileCatalog {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn fetch(&self) -> Result<CatalogLoad, CatalogError> {
        if !self.path.exists() {
            return Err(CatalogError::Missing(self.path.clone()));
        }
        let content = std::fs::read(&self.path)?;
        let format = format_from_name(&self.path.to_string_lossy())
            .unwrap_or_else(|| SpecFormat::sniff(&content));
        let version = content_version(&content);
        Ok(CatalogLoad {
            version: CatalogVersion::V1,
            records: vec![SpecRecord::new(self.schema_id, version, format, content, None)],
            rejected: Vec::new(),
        })
    }
}

//! # Catalog Module
//!
//! Sources of specification records.
//!
//! A catalog yields `(schema_id, version, format, content[, status])` rows.
//! Three interchangeable sources produce that shape:
//!
//! - [`SqliteCatalog`]: the `openapi_schemas` table of an SQLite file, layout
//!   v1 or v2 (v2 adds `status`). Unspecified layouts are read off the
//!   table's columns.
//! - [`FileCatalog`]: one OpenAPI document on disk under a fixed schema ID.
//! - [`UrlCatalog`]: one OpenAPI document fetched over HTTP.
//!
//! [`CatalogSource::load`] turns the rows into a [`SpecStore`]. Records that
//! fail to parse are dropped and reported in the store's load errors; the
//! store is still usable with the rest.

mod file;
mod sqlite;
mod types;
mod url;

pub use file::FileCatalog;
pub use sqlite::SqliteCatalog;
pub use types::{
    sha256_hex, CatalogError, CatalogLoad, CatalogVersion, RecordStatus, SpecRecord,
};
pub use url::UrlCatalog;

use crate::store::SpecStore;

/// Producer of specification records.
pub trait CatalogSource: Send + Sync {
    /// Human readable origin for logs (`sqlite:/path`, `url:https://...`).
    fn describe(&self) -> String;

    /// Read every record.
    fn fetch(&self) -> Result<CatalogLoad, CatalogError>;

    /// Read and parse the catalog into a new store.
    fn load(&self) -> Result<SpecStore, CatalogError> {
        Ok(SpecStore::from_catalog(self.fetch()?))
    }

    /// Mark records of an applied store as `applied`.
    ///
    /// Returns how many records changed. Sources without a status column
    /// have nothing to mark.
    fn after_load(&self, _store: &SpecStore) -> Result<usize, CatalogError> {
        Ok(0)
    }
}

//! # Specification Store
//!
//! An immutable index `schema_id -> (record, parsed document)` built from one
//! catalog read. Stores are never mutated after construction: hot reload
//! builds a fresh store and publishes it through a [`Snapshot`].

mod snapshot;

pub use snapshot::{SharedSnapshot, Snapshot};

use crate::catalog::{CatalogLoad, CatalogVersion, RecordStatus, SpecRecord};
use crate::spec::{parse_document, OpenApiDocument, SpecError};
use crate::validator_cache::ValidatorCache;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A record together with its parsed document.
#[derive(Debug, Clone)]
pub struct SpecEntry {
    pub record: SpecRecord,
    pub document: Arc<OpenApiDocument>,
}

#[derive(Debug)]
pub struct SpecStore {
    version: CatalogVersion,
    entries: BTreeMap<i64, SpecEntry>,
    load_errors: Vec<SpecError>,
    /// Validators compiled for this store's documents.
    cache: Arc<ValidatorCache>,
}

impl SpecStore {
    /// Store with no schemas; never ready.
    pub fn empty(version: CatalogVersion) -> Self {
        Self {
            version,
            entries: BTreeMap::new(),
            load_errors: Vec::new(),
            cache: Arc::new(ValidatorCache::new()),
        }
    }

    /// Parse every record of a catalog read.
    ///
    /// Records that fail to parse or validate are dropped and kept in
    /// [`load_errors`](Self::load_errors), after the rows the source itself
    /// rejected. A repeated schema ID keeps the
    /// first row.
    pub fn from_catalog(load: CatalogLoad) -> Self {
        let mut store = Self::empty(load.version);
        store.load_errors = load.rejected;
        for record in load.records {
            if store.entries.contains_key(&record.schema_id) {
                warn!(schema_id = record.schema_id, "duplicate schema id in catalog, keeping first");
                continue;
            }
            match parse_document(
                &record.content,
                Some(record.format),
                record.schema_id,
                &record.version,
                &store.cache,
            ) {
                Ok(doc) => {
                    store.entries.insert(
                        record.schema_id,
                        SpecEntry {
                            record,
                            document: Arc::new(doc),
                        },
                    );
                }
                Err(e) => {
                    warn!(schema_id = record.schema_id, error = %e, "dropping specification");
                    store.load_errors.push(e);
                }
            }
        }
        let (hits, misses) = store.cache.stats();
        info!(
            catalog_version = %store.version,
            schemas = store.entries.len(),
            failed = store.load_errors.len(),
            validators = misses,
            shared_validators = hits,
            "specification store loaded"
        );
        store
    }

    /// Loaded schema IDs in ascending order.
    pub fn schema_ids(&self) -> Vec<i64> {
        self.entries.keys().copied().collect()
    }

    /// True once at least one specification is available.
    pub fn is_ready(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn is_loaded(&self, schema_id: i64) -> bool {
        self.entries.contains_key(&schema_id)
    }

    pub fn entry(&self, schema_id: i64) -> Option<&SpecEntry> {
        self.entries.get(&schema_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &SpecEntry> {
        self.entries.values()
    }

    pub fn specification(&self, schema_id: i64) -> Option<&Arc<OpenApiDocument>> {
        self.entries.get(&schema_id).map(|e| &e.document)
    }

    pub fn specification_raw(&self, schema_id: i64) -> Option<&SpecRecord> {
        self.entries.get(&schema_id).map(|e| &e.record)
    }

    pub fn specification_raw_content(&self, schema_id: i64) -> Option<&[u8]> {
        self.entries.get(&schema_id).map(|e| &e.record.content[..])
    }

    /// Author-supplied version; empty when the ID is unknown.
    pub fn specification_version(&self, schema_id: i64) -> &str {
        self.entries
            .get(&schema_id)
            .map(|e| e.record.version.as_str())
            .unwrap_or_default()
    }

    /// Catalog layout the store was read from.
    pub fn version(&self) -> CatalogVersion {
        self.version
    }

    pub fn load_errors(&self) -> &[SpecError] {
        &self.load_errors
    }

    pub fn validator_cache(&self) -> &Arc<ValidatorCache> {
        &self.cache
    }

    /// Whether `candidate` differs enough from `self` to be swapped in.
    ///
    /// True when the schema ID sets differ, when any candidate record is
    /// still `new`, or when any record's version string changed.
    pub fn should_update(&self, candidate: &SpecStore) -> bool {
        if !self.entries.keys().eq(candidate.entries.keys()) {
            return true;
        }
        if candidate
            .entries
            .values()
            .any(|e| e.record.status == Some(RecordStatus::New))
        {
            return true;
        }
        candidate.entries.iter().any(|(id, e)| {
            self.entries
                .get(id)
                .map_or(true, |cur| cur.record.version != e.record.version)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SpecFormat;

    fn doc(path: &str) -> String {
        format!(
            "openapi: 3.0.0\ninfo: {{title: t, version: '1'}}\npaths:\n  {path}:\n    get:\n      responses:\n        '200': {{description: ok}}\n"
        )
    }

    fn record(id: i64, version: &str, status: Option<RecordStatus>) -> SpecRecord {
        SpecRecord::new(id, version, SpecFormat::Yaml, doc("/").into_bytes(), status)
    }

    fn store(records: Vec<SpecRecord>) -> SpecStore {
        SpecStore::from_catalog(CatalogLoad {
            version: CatalogVersion::V2,
            records,
            rejected: Vec::new(),
        })
    }

    #[test]
    fn test_should_update_is_reflexive() {
        let a = store(vec![record(1, "v1", Some(RecordStatus::Applied))]);
        assert!(!a.should_update(&a));
    }

    #[test]
    fn test_should_update_rules() {
        let a = store(vec![record(1, "v1", Some(RecordStatus::Applied))]);
        let added = store(vec![
            record(1, "v1", Some(RecordStatus::Applied)),
            record(2, "v1", Some(RecordStatus::Applied)),
        ]);
        let bumped = store(vec![record(1, "v2", Some(RecordStatus::Applied))]);
        let fresh = store(vec![record(1, "v1", Some(RecordStatus::New))]);
        assert!(a.should_update(&added));
        assert!(added.should_update(&a));
        assert!(a.should_update(&bumped));
        assert!(a.should_update(&fresh));
    }

    #[test]
    fn test_bad_record_is_dropped_not_fatal() {
        let bad = SpecRecord::new(9, "x", SpecFormat::Json, b"{oops".to_vec(), None);
        let s = store(vec![record(1, "v1", None), bad]);
        assert_eq!(s.schema_ids(), vec![1]);
        assert!(s.is_ready());
        assert!(!s.is_loaded(9));
        assert_eq!(s.load_errors().len(), 1);
        assert_eq!(s.load_errors()[0].schema_id(), 9);
    }

    #[test]
    fn test_raw_accessors() {
        let s = store(vec![record(3, "v7", None)]);
        assert_eq!(s.specification_version(3), "v7");
        assert_eq!(s.specification_version(4), "");
        assert_eq!(
            s.specification_raw_content(3).unwrap(),
            doc("/").as_bytes()
        );
        assert_eq!(s.specification_raw(3).unwrap().checksum.len(), 64);
        assert!(s.specification(3).is_some());
    }

    #[test]
    fn test_identical_documents_share_validators() {
        let with_param = "openapi: 3.0.0\ninfo: {title: t, version: '1'}\npaths:\n  /a:\n    get:\n      parameters:\n        - {name: q, in: query, schema: {type: integer}}\n      responses:\n        '200': {description: ok}\n";
        let s = store(vec![
            SpecRecord::new(1, "v", SpecFormat::Yaml, with_param.as_bytes().to_vec(), None),
            SpecRecord::new(2, "v", SpecFormat::Yaml, with_param.as_bytes().to_vec(), None),
        ]);
        assert_eq!(s.validator_cache().len(), 1);
    }

    #[test]
    fn test_empty_store_not_ready() {
        assert!(!SpecStore::empty(CatalogVersion::V1).is_ready());
    }
}

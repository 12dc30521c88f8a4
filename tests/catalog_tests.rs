//! Catalog sources read from disk.

use api_firewall::catalog::{
    sha256_hex, CatalogError, CatalogSource, CatalogVersion, FileCatalog, RecordStatus, SqliteCatalog,
};
use api_firewall::spec::SpecFormat;

mod common;
use common::catalog_db::CatalogDb;
use common::specs::{PETSTORE, ROOT_AND_NEW, ROOT_ONLY};
use common::temp_files::Scratch;

const ROOT_ONLY_JSON: &str = r#"{
  "openapi": "3.0.1",
  "info": {"title": "json", "version": "1"},
  "paths": {"/": {"get": {"responses": {"200": {"description": "ok"}}}}}
}"#;

#[test]
fn test_sqlite_layout_is_detected() {
    let scratch = Scratch::new();

    let v1 = CatalogDb::v1(scratch.path("v1.db"));
    v1.insert(1, "a", "yaml", ROOT_ONLY, "");
    let load = SqliteCatalog::new(v1.path(), None).fetch().unwrap();
    assert_eq!(load.version, CatalogVersion::V1);
    assert_eq!(load.records.len(), 1);
    assert_eq!(load.records[0].status, None);
    assert_eq!(load.records[0].format, SpecFormat::Yaml);

    let v2 = CatalogDb::v2(scratch.path("v2.db"));
    v2.insert(1, "a", "yaml", ROOT_ONLY, "new");
    v2.insert(2, "b", "json", ROOT_ONLY_JSON, "applied");
    let load = SqliteCatalog::new(v2.path(), None).fetch().unwrap();
    assert_eq!(load.version, CatalogVersion::V2);
    let statuses: Vec<_> = load.records.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![Some(RecordStatus::New), Some(RecordStatus::Applied)]);
    assert!(load.records[0].is_new());
}

#[test]
fn test_sqlite_forced_layout() {
    let scratch = Scratch::new();
    let v1 = CatalogDb::v1(scratch.path("v1.db"));
    v1.insert(1, "a", "yaml", ROOT_ONLY, "");

    assert!(SqliteCatalog::new(v1.path(), Some(CatalogVersion::V2)).fetch().is_err());
    let load = SqliteCatalog::new(v1.path(), Some(CatalogVersion::V1)).fetch().unwrap();
    assert_eq!(load.version, CatalogVersion::V1);
}

#[test]
fn test_sqlite_store_drops_broken_documents() {
    let scratch = Scratch::new();
    let db = CatalogDb::v2(scratch.path("catalog.db"));
    db.insert(1, "1.0.0", "yaml", PETSTORE, "applied");
    db.insert(2, "x", "yaml", "openapi: [not, a, document", "applied");
    db.insert(3, "2", "yaml", ROOT_AND_NEW, "applied");

    let store = SqliteCatalog::new(db.path(), None).load().unwrap();
    assert_eq!(store.schema_ids(), vec![1, 3]);
    assert_eq!(store.load_errors().len(), 1);
    assert_eq!(store.specification_version(1), "1.0.0");
    assert_eq!(store.specification_version(2), "");
    assert!(store.is_ready());
}

#[test]
fn test_sqlite_bad_status_rejects_only_that_row() {
    let scratch = Scratch::new();
    let db = CatalogDb::v2(scratch.path("catalog.db"));
    db.insert(1, "1", "yaml", ROOT_ONLY, "new");
    db.insert(2, "2", "yaml", ROOT_AND_NEW, "pending");

    let catalog = SqliteCatalog::new(db.path(), None);
    let load = catalog.fetch().unwrap();
    assert_eq!(load.version, CatalogVersion::V2);
    assert_eq!(load.records.len(), 1);
    assert_eq!(load.records[0].status, Some(RecordStatus::New));
    assert_eq!(load.rejected.len(), 1);
    assert_eq!(load.rejected[0].schema_id(), 2);

    let store = catalog.load().unwrap();
    assert_eq!(store.version(), CatalogVersion::V2);
    assert_eq!(store.schema_ids(), vec![1]);
    assert_eq!(store.load_errors().len(), 1);
    assert_eq!(store.load_errors()[0].schema_id(), 2);

    assert_eq!(catalog.after_load(&store).unwrap(), 1);
    assert_eq!(
        db.statuses(),
        vec![(1, "applied".to_string()), (2, "pending".to_string())]
    );
}

#[test]
fn test_sqlite_without_table_is_a_layout_error() {
    let scratch = Scratch::new();
    let path = scratch.path("empty.db");
    rusqlite::Connection::open(&path)
        .unwrap()
        .execute_batch("CREATE TABLE other (id INTEGER);")
        .unwrap();

    let err = SqliteCatalog::new(&path, None).fetch().unwrap_err();
    assert!(matches!(err, CatalogError::BadLayout(_)), "{err}");
}

#[test]
fn test_missing_sources() {
    let scratch = Scratch::new();
    let missing = scratch.path("nope.db");
    assert!(matches!(
        SqliteCatalog::new(&missing, None).fetch(),
        Err(CatalogError::Missing(_))
    ));
    assert!(matches!(
        FileCatalog::new(scratch.path("nope.yaml"), 1).fetch(),
        Err(CatalogError::Missing(_))
    ));
}

#[test]
fn test_file_catalog_versions_by_content() {
    let scratch = Scratch::new();
    let yaml = scratch.write("api.yaml", ROOT_ONLY);
    let json = scratch.write("api.json", ROOT_ONLY_JSON);

    let load = FileCatalog::new(&yaml, 7).fetch().unwrap();
    assert_eq!(load.version, CatalogVersion::V1);
    let record = &load.records[0];
    assert_eq!(record.schema_id, 7);
    assert_eq!(record.format, SpecFormat::Yaml);
    assert_eq!(record.version, sha256_hex(ROOT_ONLY.as_bytes())[..16]);

    let store = FileCatalog::new(&json, 7).load().unwrap();
    assert!(store.is_loaded(7));
    assert_eq!(store.entry(7).unwrap().record.format, SpecFormat::Json);

    let before = FileCatalog::new(&yaml, 7).load().unwrap();
    std::fs::write(&yaml, ROOT_AND_NEW).unwrap();
    let after = FileCatalog::new(&yaml, 7).load().unwrap();
    assert!(before.should_update(&after));
    assert!(!after.should_update(&after));
}

#[test]
fn test_file_catalog_without_extension_is_sniffed() {
    let scratch = Scratch::new();
    let path = scratch.write("api", ROOT_ONLY_JSON);
    let load = FileCatalog::new(&path, 1).fetch().unwrap();
    assert_eq!(load.records[0].format, SpecFormat::Json);
}

use super::types::{CatalogError, CatalogLoad, CatalogVersion, RecordStatus, SpecRecord};
use super::CatalogSource;
use crate::spec::{SpecError, SpecFormat};
use crate::store::SpecStore;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SELECT_V1: &str =
    "SELECT schema_id, schema_version, schema_format, schema_content FROM openapi_schemas";
const SELECT_V2: &str =
    "SELECT schema_id, schema_version, schema_format, schema_content, status FROM openapi_schemas";
const MARK_APPLIED: &str = "UPDATE openapi_schemas SET status = 'applied' WHERE status = 'new'";
const TABLE_COLUMNS: &str = "SELECT name FROM pragma_table_info('openapi_schemas')";

/// Catalog kept in an SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    path: PathBuf,
    /// `None` picks the layout from the table's columns.
    version: Option<CatalogVersion>,
}

impl SqliteCatalog {
    pub fn new(path: impl Into<PathBuf>, version: Option<CatalogVersion>) -> Self {
        Self {
            path: path.into(),
            version,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self, flags: OpenFlags) -> Result<Connection, CatalogError> {
        if !self.path.exists() {
            return Err(CatalogError::Missing(self.path.clone()));
        }
        Ok(Connection::open_with_flags(&self.path, flags)?)
    }

    /// v2 when the table has a `status` column, v1 otherwise.
    fn detect_layout(conn: &Connection) -> Result<CatalogVersion, CatalogError> {
        let mut stmt = conn.prepare(TABLE_COLUMNS)?;
        let columns = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut found = false;
        let mut has_status = false;
        for column in columns {
            let column = column?;
            found = true;
            has_status |= column.eq_ignore_ascii_case("status");
        }
        if !found {
            return Err(CatalogError::BadLayout("table openapi_schemas not found".into()));
        }
        Ok(if has_status {
            CatalogVersion::V2
        } else {
            CatalogVersion::V1
        })
    }

    /// Rows that cannot become records are returned apart; only a failing
    /// query aborts the read.
    fn read(
        conn: &Connection,
        version: CatalogVersion,
    ) -> Result<(Vec<SpecRecord>, Vec<SpecError>), CatalogError> {
        let sql = match version {
            CatalogVersion::V1 => SELECT_V1,
            CatalogVersion::V2 => SELECT_V2,
        };
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        let mut rejected = Vec::new();
        while let Some(row) = rows.next()? {
            match RawRow::from_row(row, version).and_then(RawRow::into_record) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(schema_id = e.schema_id(), error = %e, "rejecting catalog row");
                    rejected.push(e);
                }
            }
        }
        Ok((records, rejected))
    }
}

struct RawRow {
    schema_id: i64,
    version: String,
    format: String,
    content: Vec<u8>,
    status: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>, version: CatalogVersion) -> Result<Self, SpecError> {
        let schema_id: i64 = row.get(0).map_err(|e| SpecError::Record {
            schema_id: 0,
            version: String::new(),
            reason: format!("schema_id: {e}"),
        })?;
        let column = |e: rusqlite::Error| SpecError::Record {
            schema_id,
            version: String::new(),
            reason: e.to_string(),
        };
        Ok(Self {
            schema_id,
            version: row.get::<_, Option<String>>(1).map_err(column)?.unwrap_or_default(),
            format: row.get::<_, Option<String>>(2).map_err(column)?.unwrap_or_default(),
            content: match row.get_ref(3).map_err(column)? {
                ValueRef::Text(b) | ValueRef::Blob(b) => b.to_vec(),
                _ => Vec::new(),
            },
            status: match version {
                CatalogVersion::V1 => None,
                CatalogVersion::V2 => row.get(4).map_err(column)?,
            },
        })
    }

    fn into_record(self) -> Result<SpecRecord, SpecError> {
        let format = SpecFormat::parse(&self.format)
            .unwrap_or_else(|| SpecFormat::sniff(&self.content));
        let status = match self.status.as_deref() {
            None => None,
            Some(s) => Some(RecordStatus::parse(s).ok_or_else(|| SpecError::Record {
                schema_id: self.schema_id,
                version: self.version.clone(),
                reason: format!("unknown status {s:?}"),
            })?),
        };
        Ok(SpecRecord::new(
            self.schema_id,
            self.version,
            format,
            self.content,
            status,
        ))
    }
}

impl CatalogSource for SqliteCatalog {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    fn fetch(&self) -> Result<CatalogLoad, CatalogError> {
        let conn = self.open(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;
        let version = match self.version {
            Some(v) => v,
            None => Self::detect_layout(&conn)?,
        };
        let (records, rejected) = Self::read(&conn, version)?;
        debug!(
            catalog = %self.path.display(),
            version = %version,
            records = records.len(),
            rejected = rejected.len(),
            "read catalog"
        );
        Ok(CatalogLoad {
            version,
            records,
            rejected,
        })
    }

    fn after_load(&self, store: &SpecStore) -> Result<usize, CatalogError> {
        if store.version() != CatalogVersion::V2 || !store.is_ready() {
            return Ok(0);
        }
        let conn = self.open(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;
        let changed = conn.execute(MARK_APPLIED, [])?;
        if changed > 0 {
            info!(catalog = %self.path.display(), records = changed, "marked catalog records applied");
        }
        Ok(changed)
    }
}

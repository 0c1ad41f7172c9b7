//! SQLite-backed [`RecordStore`].
//!
//! The table is derived from the catalog: one column per canonical field plus provenance columns.
//! Timestamps are stored as `YYYY-MM-DD HH:MM:SS` text.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Transaction, params_from_iter};

use crate::catalog::{Catalog, is_identifier};
use crate::error::{ImportError, ImportResult, StorageResult};
use crate::lock::lock_file_for;
use crate::types::{CanonicalRecord, FieldType, Value};

use super::{AtomicLoad, RecordStore};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How long a connection waits on another process's write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const PROVENANCE_COLUMNS: &[(&str, &str)] = &[
    ("filename", "TEXT NOT NULL"),
    ("uploaded_at", "TEXT NOT NULL"),
    ("source_row", "INTEGER NOT NULL"),
    ("description", "TEXT"),
];

/// A catalog-shaped table in a SQLite database.
pub struct SqliteStore {
    conn: Connection,
    /// Database file; `None` for in-memory databases.
    path: Option<PathBuf>,
    table: String,
    columns: Vec<String>,
    insert_sql: String,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("table", &self.table)
            .field("columns", &self.columns.len())
            .finish()
    }
}

impl SqliteStore {
    /// Open (or create) a database file and ensure `table` exists with every catalog column.
    pub fn open(path: impl AsRef<Path>, table: &str, catalog: &Catalog) -> ImportResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref()).map_err(ImportError::from_sqlite)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(ImportError::from_sqlite)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(ImportError::from_sqlite)?;
        Self::with_connection(conn, Some(path.as_ref().to_path_buf()), table, catalog)
    }

    /// A private in-memory database.
    pub fn open_in_memory(table: &str, catalog: &Catalog) -> ImportResult<Self> {
        let conn = Connection::open_in_memory().map_err(ImportError::from_sqlite)?;
        Self::with_connection(conn, None, table, catalog)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>, table: &str, catalog: &Catalog) -> ImportResult<Self> {
        if !is_identifier(table) {
            return Err(ImportError::Config {
                message: format!("'{table}' is not a valid table name (expected [a-z_][a-z0-9_]*)"),
            });
        }

        ensure_table(&conn, table, catalog).map_err(ImportError::from_sqlite)?;

        let columns: Vec<String> = catalog.field_names().map(str::to_owned).collect();
        let all: Vec<&str> = columns
            .iter()
            .map(String::as_str)
            .chain(PROVENANCE_COLUMNS.iter().map(|(c, _)| *c))
            .collect();
        let placeholders = (1..=all.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        let insert_sql = format!("INSERT INTO {table} ({}) VALUES ({placeholders})", all.join(", "));

        Ok(Self {
            conn,
            path,
            table: table.to_owned(),
            columns,
            insert_sql,
        })
    }

    /// Every stored value of one column, in insertion order.
    pub fn column_values(&self, column: &str) -> StorageResult<Vec<SqlValue>> {
        let known = self.columns.iter().any(|c| c == column)
            || PROVENANCE_COLUMNS.iter().any(|(c, _)| *c == column);
        if !known {
            return Err(rusqlite::Error::InvalidColumnName(column.to_owned()).into());
        }
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {column} FROM {} ORDER BY id", self.table))?;
        let values = stmt
            .query_map([], |r| r.get::<_, SqlValue>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }
}

impl ImportError {
    fn from_sqlite(e: rusqlite::Error) -> Self {
        Self::Storage(e.into())
    }
}

fn ensure_table(conn: &Connection, table: &str, catalog: &Catalog) -> rusqlite::Result<()> {
    let mut defs = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_owned()];
    defs.extend(
        catalog
            .fields()
            .iter()
            .map(|f| format!("{} {}", f.name, sql_type(f.field_type))),
    );
    defs.extend(PROVENANCE_COLUMNS.iter().map(|(c, t)| format!("{c} {t}")));
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} ({});
         CREATE INDEX IF NOT EXISTS idx_{table}_{identity} ON {table} ({identity});",
        defs.join(", "),
        identity = catalog.identity().name,
    ))?;

    // Tables created by an older catalog get the newer columns appended.
    let existing: Vec<String> = {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        names
    };
    for f in catalog.fields() {
        if !existing.iter().any(|c| c == &f.name) {
            tracing::info!(table, column = %f.name, "adding missing column");
            conn.execute_batch(&format!(
                "ALTER TABLE {table} ADD COLUMN {} {}",
                f.name,
                sql_type(f.field_type)
            ))?;
        }
    }
    Ok(())
}

fn sql_type(t: FieldType) -> &'static str {
    match t {
        FieldType::Text | FieldType::Timestamp => "TEXT",
        FieldType::Decimal => "REAL",
    }
}

fn to_sql(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Decimal(d) => SqlValue::Real(*d),
        Value::Timestamp(ts) => SqlValue::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
    }
}

fn row_params(columns: &[String], r: &CanonicalRecord) -> Vec<SqlValue> {
    let p = r.provenance();
    columns
        .iter()
        .map(|c| to_sql(r.get(c)))
        .chain([
            SqlValue::Text(p.filename.clone()),
            SqlValue::Text(p.uploaded_at.format(TIMESTAMP_FORMAT).to_string()),
            SqlValue::Integer(i64::try_from(p.row).unwrap_or(i64::MAX)),
            SqlValue::Text(p.description()),
        ])
        .collect()
}

fn insert_all(tx: &Transaction<'_>, sql: &str, columns: &[String], records: &[CanonicalRecord]) -> rusqlite::Result<usize> {
    let mut stmt = tx.prepare_cached(sql)?;
    for r in records {
        stmt.execute(params_from_iter(row_params(columns, r)))?;
    }
    Ok(records.len())
}

impl RecordStore for SqliteStore {
    fn target(&self) -> &str {
        &self.table
    }

    fn delete_all(&mut self) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let n = tx.execute(&format!("DELETE FROM {}", self.table), [])?;
        tx.commit()?;
        Ok(n)
    }

    fn insert_batch(&mut self, batch: &[CanonicalRecord]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let n = insert_all(&tx, &self.insert_sql, &self.columns, batch)?;
        tx.commit()?;
        Ok(n)
    }

    fn load_atomic(&mut self, records: &[CanonicalRecord], purge: bool) -> StorageResult<AtomicLoad> {
        let tx = self.conn.transaction()?;
        let deleted = if purge {
            Some(tx.execute(&format!("DELETE FROM {}", self.table), [])?)
        } else {
            None
        };
        let inserted = insert_all(&tx, &self.insert_sql, &self.columns, records)?;
        tx.commit()?;
        Ok(AtomicLoad { deleted, inserted })
    }

    fn count(&self) -> StorageResult<usize> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |r| r.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn lock_path(&self) -> Option<PathBuf> {
        self.path.as_deref().map(|p| lock_file_for(p, &self.table))
    }
}

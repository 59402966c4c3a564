use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode};
use tracing::debug;

use crate::error::SQLError;
use crate::traits::{Row, SQLExecutor, SQLStore, SQLTransaction, Value};

/// SqliteStore is a SQLStore implementation backed by rusqlite (bundled SQLite).
///
/// A single connection sits behind a mutex. A transaction holds the guard
/// for its whole lifetime, so transactions never interleave.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, SQLError> {
        let conn = Connection::open(path)
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        // WAL for concurrent readers from other processes.
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        Self::configure(&conn)?;
        debug!("sqlite store opened at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SQLError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        Self::configure(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn configure(conn: &Connection) -> Result<(), SQLError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| SQLError::Connection(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SQLError> {
        self.conn
            .lock()
            .map_err(|e| SQLError::Connection(e.to_string()))
    }
}

impl SQLExecutor for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        run_query(&*self.lock()?, sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        run_exec(&*self.lock()?, sql, params)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64, SQLError> {
        run_insert(&*self.lock()?, sql, params)
    }
}

impl SQLStore for SqliteStore {
    fn begin(&self) -> Result<Box<dyn SQLTransaction + '_>, SQLError> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN")
            .map_err(|e| map_err(e, SQLError::Execution))?;
        Ok(Box::new(SqliteTransaction {
            conn,
            finished: false,
        }))
    }
}

/// An open transaction on a SqliteStore connection.
struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl SQLExecutor for SqliteTransaction<'_> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        run_query(&self.conn, sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        run_exec(&self.conn, sql, params)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64, SQLError> {
        run_insert(&self.conn, sql, params)
    }
}

impl SQLTransaction for SqliteTransaction<'_> {
    fn commit(mut self: Box<Self>) -> Result<(), SQLError> {
        // Deferred foreign keys are checked here; on failure the
        // transaction is still open and Drop rolls it back.
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| map_err(e, SQLError::Execution))?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), SQLError> {
        self.finished = true;
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| map_err(e, SQLError::Execution))
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                debug!("rollback on drop failed: {}", e);
            }
        }
    }
}

/// Constraint violations get their own variant; everything else goes
/// through `fallback`.
fn map_err(e: rusqlite::Error, fallback: fn(String) -> SQLError) -> SQLError {
    if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
        SQLError::Constraint(e.to_string())
    } else {
        fallback(e.to_string())
    }
}

/// Convert our Value enum to rusqlite's ToSql.
fn bind_params(params: &[Value]) -> Vec<Box<dyn rusqlite::types::ToSql + '_>> {
    params
        .iter()
        .map(|v| -> Box<dyn rusqlite::types::ToSql + '_> {
            match v {
                Value::Null => Box::new(rusqlite::types::Null),
                Value::Integer(i) => Box::new(*i),
                Value::Real(f) => Box::new(*f),
                Value::Text(s) => Box::new(s.as_str()),
                Value::Blob(b) => Box::new(b.as_slice()),
            }
        })
        .collect()
}

fn run_query(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
    let bound = bind_params(params);
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        bound.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| SQLError::Query(e.to_string()))?;

    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            let mut columns = Vec::with_capacity(column_names.len());
            for (i, name) in column_names.iter().enumerate() {
                columns.push((name.clone(), row_value_at(row, i)?));
            }
            Ok(Row { columns })
        })
        .map_err(|e| SQLError::Query(e.to_string()))?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row.map_err(|e| SQLError::Query(e.to_string()))?);
    }
    Ok(result)
}

fn run_exec(conn: &Connection, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
    let bound = bind_params(params);
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        bound.iter().map(|b| b.as_ref()).collect();

    let affected = conn
        .execute(sql, param_refs.as_slice())
        .map_err(|e| map_err(e, SQLError::Execution))?;

    Ok(affected as u64)
}

fn run_insert(conn: &Connection, sql: &str, params: &[Value]) -> Result<i64, SQLError> {
    run_exec(conn, sql, params)?;
    Ok(conn.last_insert_rowid())
}

/// Extract a Value from a rusqlite row at a given column index.
fn row_value_at(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Value> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .exec(
                "CREATE TABLE item (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT UNIQUE)",
                &[],
            )
            .unwrap();
        store
    }

    fn count(store: &SqliteStore) -> i64 {
        let rows = store.query("SELECT COUNT(*) AS n FROM item", &[]).unwrap();
        rows[0].get_i64("n").unwrap()
    }

    #[test]
    fn insert_returns_rowid() {
        let store = store();
        let a = store.insert("INSERT INTO item (name) VALUES (?)", &["a".into()]).unwrap();
        let b = store.insert("INSERT INTO item (name) VALUES (?)", &["b".into()]).unwrap();
        assert_eq!(b, a + 1);

        let rows = store
            .query("SELECT id, name FROM item WHERE id = ?", &[Value::Integer(b)])
            .unwrap();
        assert_eq!(rows[0].get_str("name"), Some("b"));
    }

    #[test]
    fn unique_violation_is_constraint() {
        let store = store();
        store.exec("INSERT INTO item (name) VALUES (?)", &["a".into()]).unwrap();
        let err = store
            .exec("INSERT INTO item (name) VALUES (?)", &["a".into()])
            .unwrap_err();
        assert!(matches!(err, SQLError::Constraint(_)));
    }

    #[test]
    fn commit_persists() {
        let store = store();
        let tx = store.begin().unwrap();
        tx.exec("INSERT INTO item (name) VALUES (?)", &["a".into()]).unwrap();
        tx.commit().unwrap();
        assert_eq!(count(&store), 1);
    }

    #[test]
    fn rollback_and_drop_discard() {
        let store = store();
        let tx = store.begin().unwrap();
        tx.exec("INSERT INTO item (name) VALUES (?)", &["a".into()]).unwrap();
        tx.rollback().unwrap();
        assert_eq!(count(&store), 0);

        {
            let tx = store.begin().unwrap();
            tx.exec("INSERT INTO item (name) VALUES (?)", &["b".into()]).unwrap();
        }
        assert_eq!(count(&store), 0);
    }

    #[test]
    fn deferred_foreign_key_fails_at_commit() {
        let store = store();
        store
            .exec(
                "CREATE TABLE child (id INTEGER PRIMARY KEY, \
                 item_id INTEGER REFERENCES item(id) DEFERRABLE INITIALLY DEFERRED)",
                &[],
            )
            .unwrap();

        let tx = store.begin().unwrap();
        tx.exec("INSERT INTO child (item_id) VALUES (?)", &[Value::Integer(99)])
            .unwrap();
        let err = tx.commit().unwrap_err();
        assert!(matches!(err, SQLError::Constraint(_)));

        let rows = store.query("SELECT COUNT(*) AS n FROM child", &[]).unwrap();
        assert_eq!(rows[0].get_i64("n"), Some(0));
    }

    #[test]
    fn file_backed_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.exec("CREATE TABLE t (v TEXT)", &[]).unwrap();
            store.exec("INSERT INTO t (v) VALUES (?)", &["x".into()]).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let rows = store.query("SELECT v FROM t", &[]).unwrap();
        assert_eq!(rows[0].get_str("v"), Some("x"));
    }
}

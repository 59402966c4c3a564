//! Unit-of-work sessions over the entity store.
//!
//! A `Session` wraps one SQL transaction and records which entity
//! instances it created, modified or deleted. Commit hooks see that
//! change set in two phases: `before_commit` while the transaction is
//! still open, `after_commit` once it is durable. A hook never hears
//! about a transaction that rolled back or failed to commit.

use std::sync::Arc;

use microblog_core::ServiceError;
use microblog_sql::{Row, SQLError, SQLExecutor, SQLStore, SQLTransaction, Value};
use tracing::debug;

use crate::entity::{Entity, column_values, ensure_table, sql_err, to_document};
use crate::query::Query;

/// One entity instance touched by a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked {
    pub table: &'static str,
    pub id: i64,
    /// The serialized entity as of its last write in the session.
    pub data: serde_json::Value,
}

impl Tracked {
    fn same(&self, other: &Tracked) -> bool {
        self.table == other.table && self.id == other.id
    }
}

/// Instances created, modified and deleted by a session.
///
/// An instance appears in at most one list: created-then-modified stays
/// in `new` with the latest document, created-then-deleted is dropped,
/// modified-then-deleted moves to `deleted`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub new: Vec<Tracked>,
    pub dirty: Vec<Tracked>,
    pub deleted: Vec<Tracked>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.dirty.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.new.len() + self.dirty.len() + self.deleted.len()
    }

    pub fn record_new(&mut self, t: Tracked) {
        self.new.push(t);
    }

    pub fn record_dirty(&mut self, t: Tracked) {
        if let Some(n) = self.new.iter_mut().find(|n| n.same(&t)) {
            n.data = t.data;
        } else if let Some(d) = self.dirty.iter_mut().find(|d| d.same(&t)) {
            d.data = t.data;
        } else {
            self.dirty.push(t);
        }
    }

    pub fn record_deleted(&mut self, t: Tracked) {
        let before = self.new.len();
        self.new.retain(|n| !n.same(&t));
        if self.new.len() != before {
            return;
        }
        self.dirty.retain(|d| !d.same(&t));
        if !self.deleted.iter().any(|d| d.same(&t)) {
            self.deleted.push(t);
        }
    }

    /// Entries whose table satisfies `keep`.
    pub fn filter(&self, keep: impl Fn(&str) -> bool) -> ChangeSet {
        let pick = |list: &[Tracked]| -> Vec<Tracked> {
            list.iter().filter(|t| keep(t.table)).cloned().collect()
        };
        ChangeSet {
            new: pick(&self.new),
            dirty: pick(&self.dirty),
            deleted: pick(&self.deleted),
        }
    }
}

/// Observer of committed sessions.
///
/// `before_commit` runs while the transaction is open and returns the
/// snapshot the hook wants back. `after_commit` receives that snapshot
/// only if the commit succeeded. Snapshots travel with the commit call,
/// so concurrent sessions never see each other's pending changes.
pub trait CommitHook: Send + Sync {
    fn before_commit(&self, changes: &ChangeSet) -> ChangeSet;

    fn after_commit(&self, snapshot: ChangeSet);
}

/// Entity store handle: the SQL backend plus the registered hooks.
///
/// Calls made directly on `Database` autocommit. Do not call it while a
/// session is open on the same thread; use the session instead.
pub struct Database {
    sql: Arc<dyn SQLStore>,
    hooks: Vec<Arc<dyn CommitHook>>,
}

impl Database {
    pub fn new(sql: Arc<dyn SQLStore>) -> Self {
        Self {
            sql,
            hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn CommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Ensure the entity's table exists. Call once at startup.
    pub fn ensure_table<T: Entity>(&self) -> Result<(), ServiceError> {
        ensure_table::<T>(self)
    }

    /// Begin a session. Blocks while another session is open.
    pub fn session(&self) -> Result<Session<'_>, ServiceError> {
        let tx = self.sql.begin().map_err(sql_err)?;
        Ok(Session {
            tx,
            changes: ChangeSet::default(),
            hooks: &self.hooks,
        })
    }
}

impl SQLExecutor for Database {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        self.sql.query(sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        self.sql.exec(sql, params)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64, SQLError> {
        self.sql.insert(sql, params)
    }
}

/// One transaction plus its change set.
pub struct Session<'a> {
    tx: Box<dyn SQLTransaction + 'a>,
    changes: ChangeSet,
    hooks: &'a [Arc<dyn CommitHook>],
}

impl<'a> Session<'a> {
    /// Insert a new entity. Returns it with its assigned id.
    pub fn add<T: Entity>(&mut self, mut record: T) -> Result<T, ServiceError> {
        record.before_create();
        let doc = to_document(&record)?;

        let mut cols: Vec<String> = T::COLUMNS
            .iter()
            .map(|c| format!("\"{}\"", c.name))
            .collect();
        cols.push("\"data\"".to_string());
        let mut params = column_values::<T>(&doc);
        params.push(Value::Text(doc.to_string()));
        let marks = vec!["?"; params.len()].join(", ");

        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            T::TABLE,
            cols.join(", "),
            marks
        );
        let id = self.tx.insert(&sql, &params).map_err(sql_err)?;
        record.set_id(id);

        self.changes.record_new(Tracked {
            table: T::TABLE,
            id,
            data: to_document(&record)?,
        });
        Ok(record)
    }

    /// Write back a modified entity.
    pub fn update<T: Entity>(&mut self, mut record: T) -> Result<T, ServiceError> {
        let id = record.id();
        if id == 0 {
            return Err(ServiceError::Validation(format!(
                "{}: cannot update an unsaved record",
                T::TABLE
            )));
        }
        record.before_update();
        let doc = to_document(&record)?;

        let mut sets: Vec<String> = T::COLUMNS
            .iter()
            .map(|c| format!("\"{}\" = ?", c.name))
            .collect();
        sets.push("\"data\" = ?".to_string());
        let mut params = column_values::<T>(&doc);
        params.push(Value::Text(doc.to_string()));
        params.push(Value::Integer(id));

        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE \"id\" = ?",
            T::TABLE,
            sets.join(", ")
        );
        let affected = self.tx.exec(&sql, &params).map_err(sql_err)?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("{} {} not found", T::TABLE, id)));
        }

        self.changes.record_dirty(Tracked {
            table: T::TABLE,
            id,
            data: doc,
        });
        Ok(record)
    }

    pub fn delete<T: Entity>(&mut self, record: &T) -> Result<(), ServiceError> {
        let id = record.id();
        let sql = format!("DELETE FROM \"{}\" WHERE \"id\" = ?", T::TABLE);
        let affected = self
            .tx
            .exec(&sql, &[Value::Integer(id)])
            .map_err(sql_err)?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("{} {} not found", T::TABLE, id)));
        }

        self.changes.record_deleted(Tracked {
            table: T::TABLE,
            id,
            data: to_document(record)?,
        });
        Ok(())
    }

    /// Load an entity by id, seeing this session's own writes.
    pub fn get<T: Entity>(&self, id: i64) -> Result<Option<T>, ServiceError> {
        Query::<T>::new().filter_eq("id", id).first(self)
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Commit the transaction, then hand each hook its snapshot.
    pub fn commit(self) -> Result<(), ServiceError> {
        let Session { tx, changes, hooks } = self;

        // Pending state is only visible until COMMIT, so snapshot first.
        let snapshots: Vec<(&Arc<dyn CommitHook>, ChangeSet)> = hooks
            .iter()
            .map(|h| (h, h.before_commit(&changes)))
            .collect();

        if let Err(e) = tx.commit() {
            debug!(
                "commit failed, discarding {} hook snapshots: {}",
                snapshots.len(),
                e
            );
            return Err(sql_err(e));
        }
        debug!(
            new = changes.new.len(),
            dirty = changes.dirty.len(),
            deleted = changes.deleted.len(),
            "session committed"
        );

        for (hook, snapshot) in snapshots {
            hook.after_commit(snapshot);
        }
        Ok(())
    }

    /// Discard the transaction and the change set.
    pub fn rollback(self) -> Result<(), ServiceError> {
        debug!("session rolled back, {} changes discarded", self.changes.len());
        self.tx.rollback().map_err(sql_err)
    }
}

impl SQLExecutor for Session<'_> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        self.tx.query(sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        self.tx.exec(sql, params)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64, SQLError> {
        self.tx.insert(sql, params)
    }
}

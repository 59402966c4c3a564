//! Entity trait and table layout.
//!
//! Entities are stored as a JSON document in a `data` column, with
//! declared columns extracted next to it for filtering, ordering,
//! uniqueness and foreign keys. The `id` column is authoritative: the
//! copy inside `data` may be stale for a freshly inserted row.

use microblog_core::ServiceError;
use microblog_sql::{Row, SQLError, SQLExecutor, Value};
use serde::{Serialize, de::DeserializeOwned};

/// SQL affinity of an extracted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
        }
    }
}

/// A field mirrored out of the JSON document into its own column.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub unique: bool,
    pub indexed: bool,
    /// Table whose `id` this column references.
    pub references: Option<&'static str>,
}

impl Column {
    pub const fn integer(name: &'static str) -> Self {
        Self {
            name,
            ty: ColumnType::Integer,
            unique: false,
            indexed: false,
            references: None,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            ty: ColumnType::Text,
            unique: false,
            indexed: false,
            references: None,
        }
    }

    pub const fn unique(self) -> Self {
        Self { unique: true, ..self }
    }

    pub const fn indexed(self) -> Self {
        Self { indexed: true, ..self }
    }

    pub const fn references(self, table: &'static str) -> Self {
        Self {
            references: Some(table),
            ..self
        }
    }
}

/// Trait implemented by models persisted in the entity store.
///
/// ```ignore
/// impl Entity for Comment {
///     const TABLE: &'static str = "comment";
///     const COLUMNS: &'static [Column] = &[Column::integer("user_id").references("user")];
///     fn id(&self) -> i64 { self.id }
///     fn set_id(&mut self, id: i64) { self.id = id; }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table name in SQL.
    const TABLE: &'static str;

    /// Extracted columns (besides `id` and `data`).
    const COLUMNS: &'static [Column];

    /// Primary key; 0 until the entity is first saved.
    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    /// Called before inserting a new record.
    fn before_create(&mut self) {}

    /// Called before updating an existing record.
    fn before_update(&mut self) {}
}

/// Map a SQL error to the service layer. Constraint violations become
/// `Conflict`.
pub fn sql_err(e: SQLError) -> ServiceError {
    match e {
        SQLError::Constraint(msg) => ServiceError::Conflict(msg),
        other => ServiceError::Storage(other.to_string()),
    }
}

/// Create the entity's table and indexes if missing.
pub fn ensure_table<T: Entity>(exec: &dyn SQLExecutor) -> Result<(), ServiceError> {
    let table = T::TABLE;

    let mut cols = vec!["\"id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    for c in T::COLUMNS {
        let mut def = format!("\"{}\" {}", c.name, c.ty.sql());
        if let Some(parent) = c.references {
            // Checked at COMMIT, so rows may be written in any order
            // within a transaction.
            def.push_str(&format!(
                " REFERENCES \"{}\"(\"id\") DEFERRABLE INITIALLY DEFERRED",
                parent
            ));
        }
        cols.push(def);
    }
    cols.push("\"data\" TEXT NOT NULL".to_string());

    let create_sql = format!("CREATE TABLE IF NOT EXISTS \"{}\" ({})", table, cols.join(", "));
    exec.exec(&create_sql, &[]).map_err(sql_err)?;

    for c in T::COLUMNS {
        let idx_sql = if c.unique {
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS \"idx_{table}_{col}_uq\" ON \"{table}\" (\"{col}\")",
                table = table,
                col = c.name
            )
        } else if c.indexed || c.references.is_some() {
            format!(
                "CREATE INDEX IF NOT EXISTS \"idx_{table}_{col}\" ON \"{table}\" (\"{col}\")",
                table = table,
                col = c.name
            )
        } else {
            continue;
        };
        exec.exec(&idx_sql, &[]).map_err(sql_err)?;
    }

    Ok(())
}

/// Serialize an entity into its JSON document.
pub(crate) fn to_document<T: Entity>(record: &T) -> Result<serde_json::Value, ServiceError> {
    serde_json::to_value(record).map_err(|e| ServiceError::Internal(format!("serialize: {}", e)))
}

/// Extracted column values in `T::COLUMNS` order.
pub(crate) fn column_values<T: Entity>(doc: &serde_json::Value) -> Vec<Value> {
    T::COLUMNS
        .iter()
        .map(|c| match doc.get(c.name) {
            Some(serde_json::Value::String(s)) => Value::Text(s.clone()),
            Some(serde_json::Value::Number(n)) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Real(n.as_f64().unwrap_or_default()),
            },
            Some(serde_json::Value::Bool(b)) => Value::Integer(i64::from(*b)),
            Some(serde_json::Value::Null) | None => Value::Null,
            Some(other) => Value::Text(other.to_string()),
        })
        .collect()
}

/// Rebuild an entity from an `id, data` row.
pub(crate) fn from_row<T: Entity>(row: &Row) -> Result<T, ServiceError> {
    let id = row
        .get_i64("id")
        .ok_or_else(|| ServiceError::Internal(format!("{}: row without id", T::TABLE)))?;
    let mut record: T = match row.get("data") {
        Some(Value::Text(data)) => serde_json::from_str(data),
        Some(Value::Blob(data)) => serde_json::from_slice(data),
        _ => return Err(ServiceError::Internal(format!("{}: row without data", T::TABLE))),
    }
    .map_err(|e| ServiceError::Internal(format!("deserialize: {}", e)))?;
    record.set_id(id);
    Ok(record)
}

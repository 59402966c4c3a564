//! Entity store with commit hooks, and the search index kept in step
//! with it.
//!
//! - [`entity`]: `Entity` trait, table layout, `ensure_table`
//! - [`query`]: lazily executed `Query<T>`
//! - [`session`]: `Database`, `Session`, `ChangeSet`, `CommitHook`
//! - [`search`]: `SearchIndex` and the `Searchable` trait
//! - [`sync`]: `SearchSync`, the commit hook that mirrors searchable entities

pub mod entity;
pub mod query;
pub mod search;
pub mod session;
pub mod sync;

pub use entity::{Column, ColumnType, Entity, ensure_table, sql_err};
pub use query::{Direction, Query};
pub use search::{SearchIndex, Searchable, search_fields};
pub use session::{ChangeSet, CommitHook, Database, Session, Tracked};
pub use sync::SearchSync;

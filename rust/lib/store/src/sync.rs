//! Keeps searchable entities mirrored in the search index.
//!
//! `SearchSync` is a commit hook: registered types have their created
//! and modified instances upserted, and their deleted instances removed,
//! once the owning session commits. It also turns a full-text query
//! into an entity `Query` ordered by relevance.

use std::collections::HashMap;

use microblog_core::{PageParams, ServiceError};
use microblog_sql::SQLExecutor;
use tracing::{debug, info};

use crate::query::{Direction, Query};
use crate::search::{SearchIndex, Searchable, search_fields};
use crate::session::{ChangeSet, CommitHook, Tracked};

/// Rows loaded per batch while rebuilding an index.
const REINDEX_BATCH: usize = 500;

#[derive(Debug, Clone, Copy)]
struct Registration {
    collection: &'static str,
    fields: &'static [&'static str],
}

/// Search adapter for `Searchable` entities.
pub struct SearchSync {
    index: SearchIndex,
    registry: HashMap<&'static str, Registration>,
}

impl SearchSync {
    pub fn new(index: SearchIndex) -> Self {
        Self {
            index,
            registry: HashMap::new(),
        }
    }

    /// Mirror `T` into the index on every commit.
    pub fn register<T: Searchable>(mut self) -> Self {
        self.registry.insert(
            T::TABLE,
            Registration {
                collection: T::search_collection(),
                fields: T::SEARCHABLE,
            },
        );
        self
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    pub fn is_registered(&self, table: &str) -> bool {
        self.registry.contains_key(table)
    }

    /// Run `expression` against `T`'s collection.
    ///
    /// Returns a query yielding that page of entities in relevance order,
    /// and the total number of matches. No matches gives `Query::none()`.
    pub fn search<T: Searchable>(&self, expression: &str, params: PageParams) -> (Query<T>, usize) {
        let (ids, total) = self
            .index
            .query_index(T::search_collection(), expression, params);
        if total == 0 {
            return (Query::none(), 0);
        }
        let query = Query::new()
            .filter_in("id", &ids)
            .order_by_rank("id", &ids);
        (query, total)
    }

    /// Push every stored `T` to the index. Returns the number of rows sent.
    pub fn reindex<T: Searchable>(&self, exec: &dyn SQLExecutor) -> Result<usize, ServiceError> {
        if !self.index.is_enabled() {
            info!("search disabled, skipping reindex of {}", T::TABLE);
            return Ok(0);
        }
        let all = Query::<T>::new().order_by("id", Direction::Asc);
        let mut sent = 0;
        let mut page = 1;
        loop {
            let batch = all.paginate(exec, PageParams::new(page, REINDEX_BATCH)?)?;
            for record in &batch.items {
                self.index
                    .add_to_index(T::search_collection(), record.id(), record.search_doc());
            }
            sent += batch.items.len();
            if !batch.has_next {
                break;
            }
            page += 1;
        }
        info!("reindexed {} {} rows into {}", sent, T::TABLE, T::search_collection());
        Ok(sent)
    }

    fn upsert(&self, reg: Registration, t: &Tracked) {
        self.index
            .add_to_index(reg.collection, t.id, search_fields(&t.data, reg.fields));
    }
}

impl CommitHook for SearchSync {
    fn before_commit(&self, changes: &ChangeSet) -> ChangeSet {
        let snapshot = changes.filter(|table| self.is_registered(table));
        if !snapshot.is_empty() {
            debug!("search sync: {} pending index changes", snapshot.len());
        }
        snapshot
    }

    fn after_commit(&self, snapshot: ChangeSet) {
        for t in snapshot.new.iter().chain(&snapshot.dirty) {
            if let Some(reg) = self.registry.get(t.table) {
                self.upsert(*reg, t);
            }
        }
        for t in &snapshot.deleted {
            if let Some(reg) = self.registry.get(t.table) {
                self.index.remove_from_index(reg.collection, t.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::entity::tests::{Note, note};
    use crate::search::tests::StubEngine;
    use crate::session::Database;
    use microblog_sql::SqliteStore;

    impl Searchable for Note {
        const SEARCHABLE: &'static [&'static str] = &["title"];
    }

    fn setup(engine: StubEngine) -> (Database, Arc<SearchSync>, Arc<StubEngine>) {
        let engine = Arc::new(engine);
        let sync = Arc::new(SearchSync::new(SearchIndex::new(engine.clone())).register::<Note>());
        let db = Database::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
            .with_hook(sync.clone());
        db.ensure_table::<Note>().unwrap();
        (db, sync, engine)
    }

    #[test]
    fn commit_mirrors_changes() {
        let (db, _, engine) = setup(StubEngine::default());

        let mut s = db.session().unwrap();
        let a = s.add(note("alpha", 1)).unwrap();
        let b = s.add(note("beta", 1)).unwrap();
        s.commit().unwrap();

        let mut s = db.session().unwrap();
        let mut a2 = a.clone();
        a2.title = "gamma".into();
        s.update(a2).unwrap();
        s.delete(&b).unwrap();
        s.commit().unwrap();

        let calls = engine.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            [
                format!("index note/{} [(\"title\", \"alpha\")]", a.id),
                format!("index note/{} [(\"title\", \"beta\")]", b.id),
                format!("index note/{} [(\"title\", \"gamma\")]", a.id),
                format!("delete note/{}", b.id),
            ]
        );
    }

    #[test]
    fn rollback_leaves_index_untouched() {
        let (db, _, engine) = setup(StubEngine::default());
        let mut s = db.session().unwrap();
        s.add(note("alpha", 1)).unwrap();
        s.rollback().unwrap();
        assert!(engine.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn search_orders_by_rank() {
        let (db, sync, _) = setup(StubEngine {
            hits: vec!["3", "1", "2"],
            total: 3,
            ..Default::default()
        });
        let mut s = db.session().unwrap();
        for t in ["one", "two", "three"] {
            s.add(note(t, 0)).unwrap();
        }
        s.commit().unwrap();

        let (query, total) = sync.search::<Note>("anything", PageParams::default());
        assert_eq!(total, 3);
        let titles: Vec<String> = query
            .fetch_all(&db)
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["three", "one", "two"]);
    }

    #[test]
    fn no_hits_gives_empty_query() {
        let (_, sync, _) = setup(StubEngine::default());
        let (query, total) = sync.search::<Note>("anything", PageParams::default());
        assert_eq!(total, 0);
        assert!(query.is_none());
    }

    #[test]
    fn reindex_sends_every_row() {
        let (db, sync, engine) = setup(StubEngine::default());
        let mut s = db.session().unwrap();
        for t in ["one", "two"] {
            s.add(note(t, 0)).unwrap();
        }
        s.commit().unwrap();
        engine.calls.lock().unwrap().clear();

        assert_eq!(sync.reindex::<Note>(&db).unwrap(), 2);
        assert_eq!(engine.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn unregistered_tables_are_ignored() {
        let engine = Arc::new(StubEngine::default());
        let sync = SearchSync::new(SearchIndex::new(engine.clone()));
        let mut cs = ChangeSet::default();
        cs.record_new(Tracked {
            table: "note",
            id: 1,
            data: serde_json::json!({ "title": "x" }),
        });
        let snapshot = sync.before_commit(&cs);
        assert!(snapshot.is_empty());
        sync.after_commit(cs);
        assert!(engine.calls.lock().unwrap().is_empty());
    }
}

//! Search index synchronizer.
//!
//! Thin wrapper over an optional `SearchEngine`. Every operation is a
//! no-op when no engine is configured, and backend failures are logged
//! and swallowed: the search index is best-effort and never blocks a
//! write to the entity store.

use std::collections::HashMap;
use std::sync::Arc;

use microblog_core::PageParams;
use microblog_search::SearchEngine;
use tracing::warn;

use crate::entity::Entity;

/// Entity whose fields are mirrored into the search index.
pub trait Searchable: Entity {
    /// Field names copied into the index document.
    const SEARCHABLE: &'static [&'static str];

    /// Index collection name. Defaults to the table name.
    fn search_collection() -> &'static str {
        Self::TABLE
    }

    /// Build the index document from the searchable fields.
    fn search_doc(&self) -> HashMap<String, String> {
        match serde_json::to_value(self) {
            Ok(json) => search_fields(&json, Self::SEARCHABLE),
            Err(e) => {
                warn!(
                    "cannot serialize {}/{} for the search index: {}",
                    Self::search_collection(),
                    self.id(),
                    e
                );
                HashMap::new()
            }
        }
    }
}

/// Pick `fields` out of a serialized entity as strings.
pub fn search_fields(json: &serde_json::Value, fields: &[&str]) -> HashMap<String, String> {
    let mut doc = HashMap::new();
    for name in fields {
        let text = match json.get(*name) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => continue,
            Some(other) => other.to_string(),
        };
        doc.insert(name.to_string(), text);
    }
    doc
}

/// Handle on the (optional) full-text backend.
#[derive(Clone, Default)]
pub struct SearchIndex {
    engine: Option<Arc<dyn SearchEngine>>,
}

impl SearchIndex {
    pub fn new(engine: Arc<dyn SearchEngine>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    /// No backend: writes are dropped and queries come back empty.
    pub fn disabled() -> Self {
        Self { engine: None }
    }

    pub fn from_option(engine: Option<Arc<dyn SearchEngine>>) -> Self {
        Self { engine }
    }

    pub fn is_enabled(&self) -> bool {
        self.engine.is_some()
    }

    /// Upsert one document.
    pub fn add_to_index(&self, collection: &str, id: i64, fields: HashMap<String, String>) {
        let Some(engine) = &self.engine else {
            return;
        };
        if let Err(e) = engine.index(collection, &id.to_string(), fields) {
            warn!("search index: failed to add {}/{}: {}", collection, id, e);
        }
    }

    /// Remove one document. Unknown ids are ignored.
    pub fn remove_from_index(&self, collection: &str, id: i64) {
        let Some(engine) = &self.engine else {
            return;
        };
        if let Err(e) = engine.delete(collection, &id.to_string()) {
            warn!("search index: failed to remove {}/{}: {}", collection, id, e);
        }
    }

    /// Ranked ids for one page of `text`, plus the total match count.
    ///
    /// Disabled backend, blank text or a backend failure all give `([], 0)`.
    pub fn query_index(&self, collection: &str, text: &str, params: PageParams) -> (Vec<i64>, usize) {
        let Some(engine) = &self.engine else {
            return (Vec::new(), 0);
        };
        if text.trim().is_empty() {
            return (Vec::new(), 0);
        }
        match engine.search(collection, text, params.offset(), params.per_page) {
            Ok(page) => {
                let ids = page
                    .ids()
                    .filter_map(|id| match id.parse::<i64>() {
                        Ok(id) => Some(id),
                        Err(_) => {
                            warn!("search index: ignoring non-numeric id {:?} in {}", id, collection);
                            None
                        }
                    })
                    .collect();
                (ids, page.total)
            }
            Err(e) => {
                warn!("search index: query {:?} on {} failed: {}", text, collection, e);
                (Vec::new(), 0)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use microblog_search::{SearchError, SearchPage, SearchResult};

    /// Engine that records calls and answers searches with fixed ids.
    #[derive(Default)]
    pub(crate) struct StubEngine {
        pub calls: Mutex<Vec<String>>,
        pub hits: Vec<&'static str>,
        pub total: usize,
        pub fail: bool,
    }

    impl SearchEngine for StubEngine {
        fn index(
            &self,
            collection: &str,
            id: &str,
            doc: HashMap<String, String>,
        ) -> Result<(), SearchError> {
            let mut fields: Vec<_> = doc.into_iter().collect();
            fields.sort();
            self.calls
                .lock()
                .unwrap()
                .push(format!("index {}/{} {:?}", collection, id, fields));
            if self.fail {
                return Err(SearchError::Index("backend down".into()));
            }
            Ok(())
        }

        fn delete(&self, collection: &str, id: &str) -> Result<(), SearchError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("delete {}/{}", collection, id));
            if self.fail {
                return Err(SearchError::Index("backend down".into()));
            }
            Ok(())
        }

        fn search(
            &self,
            collection: &str,
            query: &str,
            offset: usize,
            limit: usize,
        ) -> Result<SearchPage, SearchError> {
            self.calls.lock().unwrap().push(format!(
                "search {} {:?} {} {}",
                collection, query, offset, limit
            ));
            if self.fail {
                return Err(SearchError::Query("backend down".into()));
            }
            Ok(SearchPage {
                results: self
                    .hits
                    .iter()
                    .map(|id| SearchResult {
                        id: id.to_string(),
                        score: 1.0,
                        fields: HashMap::new(),
                    })
                    .collect(),
                total: self.total,
            })
        }
    }

    #[test]
    fn disabled_index_is_inert() {
        let index = SearchIndex::disabled();
        assert!(!index.is_enabled());
        index.add_to_index("comment", 1, HashMap::new());
        index.remove_from_index("comment", 1);
        assert_eq!(
            index.query_index("comment", "anything", PageParams::default()),
            (vec![], 0)
        );
    }

    #[test]
    fn query_window_and_order() {
        let engine = Arc::new(StubEngine {
            hits: vec!["7", "3", "9"],
            total: 12,
            ..Default::default()
        });
        let index = SearchIndex::new(engine.clone());

        let (ids, total) = index.query_index("comment", "rust", PageParams::new(3, 5).unwrap());
        assert_eq!(ids, vec![7, 3, 9]);
        assert_eq!(total, 12);
        assert_eq!(
            engine.calls.lock().unwrap().as_slice(),
            ["search comment \"rust\" 10 5"]
        );
    }

    #[test]
    fn blank_text_skips_backend() {
        let engine = Arc::new(StubEngine::default());
        let index = SearchIndex::new(engine.clone());
        assert_eq!(index.query_index("comment", "  ", PageParams::default()), (vec![], 0));
        assert!(engine.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn backend_failures_are_swallowed() {
        let engine = Arc::new(StubEngine {
            hits: vec!["1"],
            total: 1,
            fail: true,
            ..Default::default()
        });
        let index = SearchIndex::new(engine.clone());

        index.add_to_index("comment", 1, HashMap::from([("body".into(), "x".into())]));
        index.remove_from_index("comment", 1);
        assert_eq!(index.query_index("comment", "x", PageParams::default()), (vec![], 0));
        assert_eq!(engine.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn search_fields_stringifies() {
        let json = serde_json::json!({ "body": "hi", "n": 3, "gone": null });
        let doc = search_fields(&json, &["body", "n", "gone", "missing"]);
        assert_eq!(doc.len(), 2);
        assert_eq!(doc["body"], "hi");
        assert_eq!(doc["n"], "3");
    }

    /// Serializes to an error: JSON object keys must be strings.
    #[derive(Clone, serde::Serialize, serde::Deserialize)]
    struct Unserializable {
        id: i64,
        body: String,
        tags: std::collections::BTreeMap<Vec<u8>, String>,
    }

    impl crate::Entity for Unserializable {
        const TABLE: &'static str = "unserializable";
        const COLUMNS: &'static [crate::Column] = &[];

        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    impl Searchable for Unserializable {
        const SEARCHABLE: &'static [&'static str] = &["body"];
    }

    #[test]
    fn unserializable_entity_gives_empty_doc() {
        let mut tags = std::collections::BTreeMap::new();
        tags.insert(vec![1u8], "x".to_string());
        let e = Unserializable {
            id: 3,
            body: "text".into(),
            tags,
        };
        assert!(serde_json::to_value(&e).is_err());
        assert!(e.search_doc().is_empty());
    }
}

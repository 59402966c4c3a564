use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use tantivy::collector::{Count, TopDocs};
use tantivy::query::QueryParser;
use tantivy::schema::Value as TantivyValue;
use tantivy::schema::{Field, STORED, STRING, Schema, TEXT};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, doc};
use tracing::debug;

use crate::error::SearchError;
use crate::traits::{SearchEngine, SearchPage, SearchResult};

/// Writer heap. One indexing thread is plenty for one-document commits.
const WRITER_HEAP_BYTES: usize = 20_000_000;

/// Per-collection index state.
struct CollectionIndex {
    index: Index,
    reader: IndexReader,
    writer: RwLock<IndexWriter>,
    id_field: Field,
    body_field: Field,
    fields_field: Field,
}

/// TantivyEngine is a SearchEngine implementation backed by Tantivy.
///
/// Each collection gets its own Tantivy index in a subdirectory.
/// Documents have three fields:
/// - `_id` (STRING | STORED): exact-match document ID, untokenized
/// - `_body` (TEXT): concatenated field values for full-text search
/// - `_fields` (STORED only): JSON of original fields for retrieval, not indexed
pub struct TantivyEngine {
    base_dir: std::path::PathBuf,
    collections: RwLock<HashMap<String, CollectionIndex>>,
}

fn poisoned<T>(_: T) -> SearchError {
    SearchError::Index("lock poisoned".into())
}

impl TantivyEngine {
    /// Create a new TantivyEngine with indexes stored under `base_dir`.
    pub fn open(base_dir: &Path) -> Result<Self, SearchError> {
        std::fs::create_dir_all(base_dir)
            .map_err(|e| SearchError::Index(e.to_string()))?;

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            collections: RwLock::new(HashMap::new()),
        })
    }

    /// Run `f` against a collection, opening or creating its index first.
    fn with_collection<R>(
        &self,
        collection: &str,
        f: impl FnOnce(&CollectionIndex) -> Result<R, SearchError>,
    ) -> Result<R, SearchError> {
        self.get_or_create_collection(collection)?;
        let collections = self.collections.read().map_err(poisoned)?;
        let col = collections
            .get(collection)
            .ok_or_else(|| SearchError::Index("collection not found".into()))?;
        f(col)
    }

    fn get_or_create_collection(&self, collection: &str) -> Result<(), SearchError> {
        // Fast path: already exists.
        {
            let collections = self.collections.read().map_err(poisoned)?;
            if collections.contains_key(collection) {
                return Ok(());
            }
        }

        // Slow path: create.
        let mut collections = self.collections.write().map_err(poisoned)?;
        if collections.contains_key(collection) {
            return Ok(());
        }

        let col_dir = self.base_dir.join(collection);
        std::fs::create_dir_all(&col_dir)
            .map_err(|e| SearchError::Index(e.to_string()))?;

        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("_id", STRING | STORED);
        let body_field = schema_builder.add_text_field("_body", TEXT);
        let fields_field = schema_builder.add_text_field("_fields", STORED);
        let schema = schema_builder.build();

        let dir = tantivy::directory::MmapDirectory::open(&col_dir)
            .map_err(|e| SearchError::Index(e.to_string()))?;

        let index = Index::open_or_create(dir, schema)
            .map_err(|e| SearchError::Index(e.to_string()))?;

        let writer = index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(|e| SearchError::Index(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e: tantivy::TantivyError| SearchError::Index(e.to_string()))?;

        debug!("search collection {} opened at {}", collection, col_dir.display());
        collections.insert(
            collection.to_string(),
            CollectionIndex {
                index,
                reader,
                writer: RwLock::new(writer),
                id_field,
                body_field,
                fields_field,
            },
        );

        Ok(())
    }
}

impl SearchEngine for TantivyEngine {
    fn index(
        &self,
        collection: &str,
        id: &str,
        doc_fields: HashMap<String, String>,
    ) -> Result<(), SearchError> {
        self.with_collection(collection, |col| {
            // _body: field values only, sorted by field name so re-indexing
            // the same document produces the same text.
            let mut names: Vec<&String> = doc_fields.keys().collect();
            names.sort();
            let body_text = names
                .iter()
                .map(|n| doc_fields[*n].as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let fields_json = serde_json::to_string(&doc_fields)
                .map_err(|e| SearchError::Index(e.to_string()))?;

            let mut writer = col.writer.write().map_err(poisoned)?;

            // Delete existing document with same ID (upsert).
            writer.delete_term(tantivy::Term::from_field_text(col.id_field, id));

            writer
                .add_document(doc!(
                    col.id_field => id,
                    col.body_field => body_text,
                    col.fields_field => fields_json,
                ))
                .map_err(|e| SearchError::Index(e.to_string()))?;

            writer
                .commit()
                .map_err(|e| SearchError::Index(e.to_string()))?;
            Ok(())
        })
    }

    fn delete(&self, collection: &str, id: &str) -> Result<(), SearchError> {
        self.with_collection(collection, |col| {
            let mut writer = col.writer.write().map_err(poisoned)?;
            writer.delete_term(tantivy::Term::from_field_text(col.id_field, id));
            writer
                .commit()
                .map_err(|e| SearchError::Index(e.to_string()))?;
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage, SearchError> {
        self.with_collection(collection, |col| {
            // Pick up the latest commits.
            col.reader
                .reload()
                .map_err(|e| SearchError::Query(e.to_string()))?;

            let searcher = col.reader.searcher();
            // Only _body is tokenized; _id is an exact-match key.
            let query_parser = QueryParser::for_index(&col.index, vec![col.body_field]);
            // User text may contain query syntax; lenient parsing drops
            // what it cannot understand instead of failing.
            let (parsed, _errors) = query_parser.parse_query_lenient(query);

            if limit == 0 {
                let total = searcher
                    .search(&*parsed, &Count)
                    .map_err(|e| SearchError::Query(e.to_string()))?;
                return Ok(SearchPage {
                    results: Vec::new(),
                    total,
                });
            }

            let (top_docs, total) = searcher
                .search(
                    &*parsed,
                    &(TopDocs::with_limit(limit).and_offset(offset), Count),
                )
                .map_err(|e| SearchError::Query(e.to_string()))?;

            let mut results = Vec::with_capacity(top_docs.len());
            for (score, doc_addr) in top_docs {
                let doc: TantivyDocument = searcher
                    .doc(doc_addr)
                    .map_err(|e| SearchError::Query(e.to_string()))?;

                let id = doc
                    .get_first(col.id_field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();

                let fields_json = doc
                    .get_first(col.fields_field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let fields = serde_json::from_str::<HashMap<String, String>>(fields_json)
                    .unwrap_or_default();

                results.push(SearchResult { id, score, fields });
            }

            Ok(SearchPage { results, total })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(text: &str) -> HashMap<String, String> {
        HashMap::from([("body".to_string(), text.to_string())])
    }

    #[test]
    fn index_search_delete() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TantivyEngine::open(dir.path()).unwrap();

        engine.index("comment", "1", body("the quick brown fox")).unwrap();
        engine.index("comment", "2", body("a lazy dog")).unwrap();

        let page = engine.search("comment", "fox", 0, 10).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.ids().collect::<Vec<_>>(), vec!["1"]);
        assert_eq!(page.results[0].fields["body"], "the quick brown fox");

        engine.delete("comment", "1").unwrap();
        let page = engine.search("comment", "fox", 0, 10).unwrap();
        assert_eq!(page.total, 0);
        assert!(page.results.is_empty());
    }

    #[test]
    fn reindex_replaces_document() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TantivyEngine::open(dir.path()).unwrap();

        engine.index("comment", "1", body("old words")).unwrap();
        engine.index("comment", "1", body("new words")).unwrap();

        assert_eq!(engine.search("comment", "old", 0, 10).unwrap().total, 0);
        assert_eq!(engine.search("comment", "words", 0, 10).unwrap().total, 1);
    }

    #[test]
    fn offset_window_keeps_total() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TantivyEngine::open(dir.path()).unwrap();
        for i in 0..5 {
            engine.index("comment", &i.to_string(), body("rust")).unwrap();
        }

        let first = engine.search("comment", "rust", 0, 2).unwrap();
        let third = engine.search("comment", "rust", 4, 2).unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.results.len(), 2);
        assert_eq!(third.total, 5);
        assert_eq!(third.results.len(), 1);

        let count_only = engine.search("comment", "rust", 0, 0).unwrap();
        assert_eq!(count_only.total, 5);
        assert!(count_only.results.is_empty());
    }

    #[test]
    fn collections_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TantivyEngine::open(dir.path()).unwrap();
        engine.index("comment", "1", body("shared term")).unwrap();

        assert_eq!(engine.search("user", "shared", 0, 10).unwrap().total, 0);
    }

    #[test]
    fn stray_syntax_does_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TantivyEngine::open(dir.path()).unwrap();
        engine.index("comment", "1", body("hello world")).unwrap();

        let page = engine.search("comment", "hello AND (", 0, 10).unwrap();
        assert!(page.total <= 1);
    }
}

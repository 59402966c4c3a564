use std::collections::HashMap;

use crate::error::SearchError;

/// A single search result with its document ID and relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub fields: HashMap<String, String>,
}

/// One window of ranked results plus the number of matches overall.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Results in relevance order (highest first).
    pub results: Vec<SearchResult>,
    /// Total matching documents, not just this window.
    pub total: usize,
}

impl SearchPage {
    /// Result IDs in rank order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|r| r.id.as_str())
    }
}

/// SearchEngine provides full-text search over indexed documents.
///
/// Documents are organized by collection (one per entity type, e.g.
/// "comment"). Each document has an ID and a set of string fields.
pub trait SearchEngine: Send + Sync {
    /// Index a document. If a document with the same ID already exists in the
    /// collection, it is replaced.
    fn index(
        &self,
        collection: &str,
        id: &str,
        doc: HashMap<String, String>,
    ) -> Result<(), SearchError>;

    /// Delete a document by ID from a collection. Deleting an unknown ID is
    /// not an error.
    fn delete(&self, collection: &str, id: &str) -> Result<(), SearchError>;

    /// Search a collection. Skips `offset` ranked results and returns at
    /// most `limit`, along with the total match count.
    fn search(
        &self,
        collection: &str,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage, SearchError>;
}

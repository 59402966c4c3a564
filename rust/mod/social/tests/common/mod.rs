#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use microblog_core::{CredentialVerifier, ServiceConfig, ServiceError};
use microblog_search::{SearchEngine, SearchError, SearchPage, SearchResult};
use microblog_social::{Comment, Microblog, User};
use microblog_sql::SqliteStore;

/// Reversible "hash" so tests do not pay for argon2.
pub struct PlainVerifier;

impl CredentialVerifier for PlainVerifier {
    fn hash(&self, secret: &str) -> Result<String, ServiceError> {
        Ok(format!("plain:{}", secret))
    }

    fn verify(&self, secret: &str, hash: &str) -> bool {
        hash.strip_prefix("plain:") == Some(secret)
    }
}

/// Answers every search with the same ranked ids.
pub struct RankedEngine {
    pub ids: Vec<i64>,
}

impl SearchEngine for RankedEngine {
    fn index(&self, _: &str, _: &str, _: HashMap<String, String>) -> Result<(), SearchError> {
        Ok(())
    }

    fn delete(&self, _: &str, _: &str) -> Result<(), SearchError> {
        Ok(())
    }

    fn search(&self, _: &str, _: &str, offset: usize, limit: usize) -> Result<SearchPage, SearchError> {
        Ok(SearchPage {
            results: self
                .ids
                .iter()
                .skip(offset)
                .take(limit)
                .map(|id| SearchResult {
                    id: id.to_string(),
                    score: 1.0,
                    fields: HashMap::new(),
                })
                .collect(),
            total: self.ids.len(),
        })
    }
}

/// Logs index writes; never finds anything.
#[derive(Default)]
pub struct RecordingEngine {
    pub log: Mutex<Vec<String>>,
}

impl RecordingEngine {
    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl SearchEngine for RecordingEngine {
    fn index(&self, collection: &str, id: &str, doc: HashMap<String, String>) -> Result<(), SearchError> {
        let body = doc.get("body").cloned().unwrap_or_default();
        self.log
            .lock()
            .unwrap()
            .push(format!("index {}/{} {}", collection, id, body));
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<(), SearchError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("delete {}/{}", collection, id));
        Ok(())
    }

    fn search(&self, _: &str, _: &str, _: usize, _: usize) -> Result<SearchPage, SearchError> {
        Ok(SearchPage::default())
    }
}

/// Backend that is always down.
pub struct DownEngine;

impl SearchEngine for DownEngine {
    fn index(&self, _: &str, _: &str, _: HashMap<String, String>) -> Result<(), SearchError> {
        Err(SearchError::Index("connection refused".into()))
    }

    fn delete(&self, _: &str, _: &str) -> Result<(), SearchError> {
        Err(SearchError::Index("connection refused".into()))
    }

    fn search(&self, _: &str, _: &str, _: usize, _: usize) -> Result<SearchPage, SearchError> {
        Err(SearchError::Query("connection refused".into()))
    }
}

pub fn service_with(config: ServiceConfig, engine: Option<Arc<dyn SearchEngine>>) -> Microblog {
    Microblog::with_parts(
        config,
        Arc::new(SqliteStore::open_in_memory().unwrap()),
        engine,
        Arc::new(PlainVerifier),
    )
    .unwrap()
}

pub fn service(engine: Option<Arc<dyn SearchEngine>>) -> Microblog {
    service_with(ServiceConfig::default(), engine)
}

pub fn with_engine(engine: Arc<dyn SearchEngine>) -> Microblog {
    service(Some(engine))
}

pub fn register(mb: &Microblog, name: &str) -> User {
    mb.register(name, &format!("{}@example.com", name), "cat").unwrap()
}

/// Store a comment with an explicit timestamp, bypassing the facade.
pub fn post_at(mb: &Microblog, author: &User, body: &str, at: DateTime<Utc>) -> Comment {
    let mut s = mb.database().session().unwrap();
    let mut c = Comment::new(author.id, body);
    c.timestamp = at;
    let c = s.add(c).unwrap();
    s.commit().unwrap();
    c
}

pub fn seconds_after(base: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    base + Duration::seconds(secs)
}

pub fn ids(comments: &[Comment]) -> Vec<i64> {
    comments.iter().map(|c| c.id).collect()
}

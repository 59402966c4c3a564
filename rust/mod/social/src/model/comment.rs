use chrono::{DateTime, Utc};
use microblog_store::{Column, Entity, Searchable};
use serde::{Deserialize, Serialize};

/// Longest accepted comment body, in characters.
pub const BODY_MAX: usize = 140;

/// A short post authored by a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    #[serde(default)]
    pub id: i64,
    pub body: String,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub timestamp: DateTime<Utc>,
    pub user_id: i64,
    /// Language tag detected or supplied at posting time.
    #[serde(default)]
    pub language: Option<String>,
}

impl Comment {
    /// New comment stamped with the current time.
    pub fn new(user_id: i64, body: &str) -> Self {
        Self {
            id: 0,
            body: body.to_string(),
            timestamp: Utc::now(),
            user_id,
            language: None,
        }
    }
}

impl Entity for Comment {
    const TABLE: &'static str = "comment";
    const COLUMNS: &'static [Column] = &[
        Column::integer("timestamp").indexed(),
        Column::integer("user_id").references("user"),
    ];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

impl Searchable for Comment {
    const SEARCHABLE: &'static [&'static str] = &["body"];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_an_integer_column() {
        let c = Comment::new(3, "hello");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["timestamp"].as_i64(), Some(c.timestamp.timestamp_micros()));
        assert_eq!(json["user_id"], 3);
    }

    #[test]
    fn search_doc_holds_body_only() {
        let mut c = Comment::new(1, "find me");
        c.language = Some("en".into());
        let doc = c.search_doc();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc["body"], "find me");
    }
}

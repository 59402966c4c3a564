use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ServiceError;

/// Whether a user may follow themself.
///
/// Nothing in the follower graph forbids the edge; the feed tolerates it
/// through union semantics. The service layer applies this policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelfFollow {
    #[default]
    Allow,
    Reject,
}

impl SelfFollow {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(SelfFollow::Allow),
            "reject" => Some(SelfFollow::Reject),
            _ => None,
        }
    }
}

/// Configuration shared by the library crates and the binary.
///
/// Loaded from a TOML file (every key optional), then overridden by
/// `--flag=value` arguments.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory holding the SQLite file and the search indexes.
    pub data_dir: Option<PathBuf>,

    /// Path to the SQLite database file.
    /// Defaults to `{data_dir}/microblog.sqlite` if not specified.
    pub sqlite_path: Option<PathBuf>,

    /// Directory for tantivy search indexes.
    /// Defaults to `{data_dir}/search/` if not specified.
    pub search_dir: Option<PathBuf>,

    /// When false no search backend is opened: indexing is a no-op and
    /// every search returns nothing.
    pub search: bool,

    /// HMAC secret for password reset tokens.
    pub secret_key: String,

    /// Lifetime of a password reset token.
    pub reset_token_ttl_secs: i64,

    /// Page size for feeds and search results.
    pub posts_per_page: usize,

    pub self_follow: SelfFollow,

    /// Language for user-facing messages ("en", "es").
    pub language: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sqlite_path: None,
            search_dir: None,
            search: true,
            secret_key: "you-will-never-guess".to_string(),
            reset_token_ttl_secs: 600,
            posts_per_page: 25,
            self_follow: SelfFollow::Allow,
            language: "en".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ServiceError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Internal(format!("read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| ServiceError::Validation(format!("parse {}: {}", path.display(), e)))
    }

    /// Apply command-line overrides.
    ///
    /// Supported flags:
    /// - `--data-dir=PATH`
    /// - `--sqlite=PATH`
    /// - `--search-dir=PATH`
    /// - `--no-search`
    /// - `--posts-per-page=N`
    /// - `--self-follow=allow|reject`
    /// - `--lang=CODE`
    pub fn apply_args(&mut self, args: &[String]) -> Result<(), ServiceError> {
        for arg in args {
            if let Some(val) = arg.strip_prefix("--data-dir=") {
                self.data_dir = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--sqlite=") {
                self.sqlite_path = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--search-dir=") {
                self.search_dir = Some(PathBuf::from(val));
            } else if arg == "--no-search" {
                self.search = false;
            } else if let Some(val) = arg.strip_prefix("--posts-per-page=") {
                self.posts_per_page = val
                    .parse()
                    .map_err(|_| ServiceError::Validation(format!("bad page size: {}", val)))?;
            } else if let Some(val) = arg.strip_prefix("--self-follow=") {
                self.self_follow = SelfFollow::parse(val)
                    .ok_or_else(|| ServiceError::Validation(format!("bad self-follow policy: {}", val)))?;
            } else if let Some(val) = arg.strip_prefix("--lang=") {
                self.language = val.to_string();
            }
        }
        Ok(())
    }

    /// Parse configuration from command-line arguments alone.
    pub fn from_args(args: &[String]) -> Result<Self, ServiceError> {
        let mut config = Self::default();
        config.apply_args(args)?;
        Ok(config)
    }

    /// Resolve the SQLite database path, falling back to `{data_dir}/microblog.sqlite`.
    pub fn resolve_sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("microblog.sqlite"))
    }

    /// Resolve the search index directory, or None when search is disabled.
    pub fn resolve_search_dir(&self) -> Option<PathBuf> {
        if !self.search {
            return None;
        }
        Some(
            self.search_dir
                .clone()
                .unwrap_or_else(|| self.resolve_data_subpath("search")),
        )
    }

    fn resolve_data_subpath(&self, name: &str) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(|d| d.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}

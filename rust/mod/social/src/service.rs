//! Microblog service facade.
//!
//! Validates input, runs each operation in its own session and turns
//! failures into localized `ServiceError`s. Front ends (the CLI, tests)
//! talk to this type only.

use std::sync::Arc;

use microblog_core::{
    CredentialVerifier, Page, PageParams, SelfFollow, ServiceConfig, ServiceError,
};
use microblog_search::{SearchEngine, TantivyEngine};
use microblog_sql::{SQLExecutor, SQLStore, SqliteStore};
use microblog_store::{Database, Query, SearchIndex, SearchSync, Session, sql_err};
use tracing::{debug, info, warn};

use crate::feed;
use crate::graph;
use crate::i18n::{DefaultLocalizer, Localizer};
use crate::model::{ABOUT_ME_MAX, BODY_MAX, Comment, EMAIL_MAX, USERNAME_MAX, User};
use crate::password::Argon2Verifier;
use crate::reset::ResetTokens;

pub struct Microblog {
    db: Database,
    search: Arc<SearchSync>,
    config: ServiceConfig,
    credentials: Arc<dyn CredentialVerifier>,
    i18n: Box<dyn Localizer>,
    tokens: ResetTokens,
}

impl Microblog {
    /// Open the SQLite file and search indexes named by `config`.
    ///
    /// A search backend that fails to open is logged and skipped; the
    /// service then runs without search.
    pub fn open(config: ServiceConfig) -> Result<Self, ServiceError> {
        let sqlite_path = config.resolve_sqlite_path();
        if let Some(parent) = sqlite_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ServiceError::Storage(format!("create {}: {}", parent.display(), e))
                })?;
            }
        }
        let sql = SqliteStore::open(&sqlite_path).map_err(sql_err)?;

        let engine: Option<Arc<dyn SearchEngine>> = match config.resolve_search_dir() {
            Some(dir) => match TantivyEngine::open(&dir) {
                Ok(engine) => {
                    info!("search indexes at {}", dir.display());
                    Some(Arc::new(engine))
                }
                Err(e) => {
                    warn!("search backend unavailable, continuing without it: {}", e);
                    None
                }
            },
            None => {
                info!("search disabled");
                None
            }
        };

        info!("microblog store at {}", sqlite_path.display());
        Self::with_parts(config, Arc::new(sql), engine, Arc::new(Argon2Verifier))
    }

    /// Assemble the service from already opened backends and create the
    /// schema if missing.
    pub fn with_parts(
        config: ServiceConfig,
        sql: Arc<dyn SQLStore>,
        engine: Option<Arc<dyn SearchEngine>>,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> Result<Self, ServiceError> {
        let search = Arc::new(
            SearchSync::new(SearchIndex::from_option(engine)).register::<Comment>(),
        );
        let db = Database::new(sql).with_hook(search.clone());
        db.ensure_table::<User>()?;
        db.ensure_table::<Comment>()?;
        graph::ensure_schema(&db)?;

        let i18n = Box::new(DefaultLocalizer::for_tag(&config.language));
        let tokens = ResetTokens::new(&config.secret_key, config.reset_token_ttl_secs);

        Ok(Self {
            db,
            search,
            config,
            credentials,
            i18n,
            tokens,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn search(&self) -> &SearchSync {
        &self.search
    }

    pub fn localizer(&self) -> &dyn Localizer {
        self.i18n.as_ref()
    }

    // ── Helpers ──

    fn t(&self, key: &str, args: &[(&str, &str)]) -> String {
        self.i18n.t(key, args)
    }

    fn page(&self, page: usize) -> Result<PageParams, ServiceError> {
        PageParams::new(page, self.config.posts_per_page)
    }

    fn load_user(&self, exec: &dyn SQLExecutor, id: i64) -> Result<User, ServiceError> {
        Query::<User>::new()
            .filter_eq("id", id)
            .first(exec)?
            .ok_or_else(|| {
                ServiceError::NotFound(self.t("error.user.id_not_found", &[("id", &id.to_string())]))
            })
    }

    fn find_by_username(exec: &dyn SQLExecutor, username: &str) -> Result<Option<User>, ServiceError> {
        Query::<User>::new().filter_eq("username", username).first(exec)
    }

    fn find_by_email(exec: &dyn SQLExecutor, email: &str) -> Result<Option<User>, ServiceError> {
        Query::<User>::new().filter_eq("email", email).first(exec)
    }

    fn check_username(&self, username: &str) -> Result<String, ServiceError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ServiceError::Validation(self.t("error.user.username_empty", &[])));
        }
        if username.chars().count() > USERNAME_MAX {
            return Err(ServiceError::Validation(self.t(
                "error.user.username_too_long",
                &[("max", &USERNAME_MAX.to_string())],
            )));
        }
        Ok(username.to_string())
    }

    fn check_email(&self, email: &str) -> Result<String, ServiceError> {
        let email = email.trim();
        let well_formed = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !email.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if !well_formed {
            return Err(ServiceError::Validation(self.t("error.user.email_invalid", &[])));
        }
        if email.chars().count() > EMAIL_MAX {
            return Err(ServiceError::Validation(self.t(
                "error.user.email_too_long",
                &[("max", &EMAIL_MAX.to_string())],
            )));
        }
        Ok(email.to_string())
    }

    fn check_password(&self, password: &str) -> Result<(), ServiceError> {
        if password.is_empty() {
            return Err(ServiceError::Validation(self.t("error.password.empty", &[])));
        }
        Ok(())
    }

    // ── Accounts ──

    /// Create an account. Username and email must both be unused.
    pub fn register(&self, username: &str, email: &str, password: &str) -> Result<User, ServiceError> {
        let username = self.check_username(username)?;
        let email = self.check_email(email)?;
        self.check_password(password)?;

        let mut user = User::new(&username, &email);
        user.set_password(self.credentials.as_ref(), password)?;

        let mut s = self.db.session()?;
        if Self::find_by_username(&s, &username)?.is_some() {
            return Err(ServiceError::Conflict(self.t("error.user.username_taken", &[])));
        }
        if Self::find_by_email(&s, &email)?.is_some() {
            return Err(ServiceError::Conflict(self.t("error.user.email_taken", &[])));
        }
        let user = s.add(user)?;
        s.commit()?;

        info!("registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    /// Check a username / password pair.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User, ServiceError> {
        let invalid = || ServiceError::Unauthorized(self.t("error.auth.invalid_credentials", &[]));
        let user = Self::find_by_username(&self.db, username.trim())?.ok_or_else(invalid)?;
        if !user.check_password(self.credentials.as_ref(), password) {
            return Err(invalid());
        }
        Ok(user)
    }

    pub fn user(&self, id: i64) -> Result<User, ServiceError> {
        self.load_user(&self.db, id)
    }

    pub fn user_by_username(&self, username: &str) -> Result<User, ServiceError> {
        Self::find_by_username(&self.db, username)?.ok_or_else(|| {
            ServiceError::NotFound(self.t("error.user.not_found", &[("username", username)]))
        })
    }

    /// Change username and "about me". An empty about-me clears it.
    pub fn update_profile(
        &self,
        user_id: i64,
        username: &str,
        about_me: Option<&str>,
    ) -> Result<User, ServiceError> {
        let username = self.check_username(username)?;
        let about_me = about_me.map(str::trim).filter(|s| !s.is_empty());
        if let Some(text) = about_me {
            if text.chars().count() > ABOUT_ME_MAX {
                return Err(ServiceError::Validation(self.t(
                    "error.profile.about_too_long",
                    &[("max", &ABOUT_ME_MAX.to_string())],
                )));
            }
        }

        let mut s = self.db.session()?;
        let mut user = self.load_user(&s, user_id)?;
        if username != user.username && Self::find_by_username(&s, &username)?.is_some() {
            return Err(ServiceError::Conflict(self.t("error.user.username_taken", &[])));
        }
        user.username = username;
        user.about_me = about_me.map(str::to_string);
        let user = s.update(user)?;
        s.commit()?;
        Ok(user)
    }

    /// Record activity by `user_id` now.
    pub fn touch_last_seen(&self, user_id: i64) -> Result<(), ServiceError> {
        let mut s = self.db.session()?;
        let mut user = self.load_user(&s, user_id)?;
        user.last_seen = chrono::Utc::now();
        s.update(user)?;
        s.commit()
    }

    // ── Comments ──

    /// Publish a comment. The body is trimmed and must be 1 to 140
    /// characters.
    pub fn post_comment(
        &self,
        user_id: i64,
        body: &str,
        language: Option<&str>,
    ) -> Result<Comment, ServiceError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ServiceError::Validation(self.t("error.comment.empty", &[])));
        }
        if body.chars().count() > BODY_MAX {
            return Err(ServiceError::Validation(self.t(
                "error.comment.too_long",
                &[("max", &BODY_MAX.to_string())],
            )));
        }

        let mut s = self.db.session()?;
        let author = self.load_user(&s, user_id)?;
        let mut comment = Comment::new(author.id, body);
        comment.language = language
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string);
        let comment = s.add(comment)?;
        s.commit()?;

        debug!("user {} posted comment {}", author.username, comment.id);
        Ok(comment)
    }

    /// Delete a comment. Only its author may.
    pub fn delete_comment(&self, user_id: i64, comment_id: i64) -> Result<(), ServiceError> {
        let mut s = self.db.session()?;
        let comment: Comment = s.get(comment_id)?.ok_or_else(|| {
            ServiceError::NotFound(self.t("error.comment.not_found", &[("id", &comment_id.to_string())]))
        })?;
        if comment.user_id != user_id {
            return Err(ServiceError::PermissionDenied(self.t("error.comment.not_author", &[])));
        }
        s.delete(&comment)?;
        s.commit()
    }

    // ── Follower graph ──

    fn edge_users(
        &self,
        s: &Session<'_>,
        user_id: i64,
        other_id: i64,
        self_key: &str,
    ) -> Result<(User, User), ServiceError> {
        let user = self.load_user(s, user_id)?;
        let other = self.load_user(s, other_id)?;
        if user.id == other.id && self.config.self_follow == SelfFollow::Reject {
            return Err(ServiceError::Validation(self.t(self_key, &[])));
        }
        Ok((user, other))
    }

    /// Make `user_id` follow `other_id`. Returns false if it already did.
    pub fn follow(&self, user_id: i64, other_id: i64) -> Result<bool, ServiceError> {
        let s = self.db.session()?;
        let (user, other) = self.edge_users(&s, user_id, other_id, "error.follow.self")?;
        let added = graph::follow(&s, &user, &other)?;
        s.commit()?;
        debug!("{} follows {}: {}", user.username, other.username, added);
        Ok(added)
    }

    /// Stop `user_id` following `other_id`. Returns false if it did not.
    pub fn unfollow(&self, user_id: i64, other_id: i64) -> Result<bool, ServiceError> {
        let s = self.db.session()?;
        let (user, other) = self.edge_users(&s, user_id, other_id, "error.unfollow.self")?;
        let removed = graph::unfollow(&s, &user, &other)?;
        s.commit()?;
        debug!("{} unfollows {}: {}", user.username, other.username, removed);
        Ok(removed)
    }

    pub fn is_following(&self, user_id: i64, other_id: i64) -> Result<bool, ServiceError> {
        let user = self.load_user(&self.db, user_id)?;
        let other = self.load_user(&self.db, other_id)?;
        graph::is_following(&self.db, &user, &other)
    }

    pub fn followers(&self, user_id: i64) -> Result<Vec<User>, ServiceError> {
        let user = self.load_user(&self.db, user_id)?;
        graph::followers_of(&self.db, &user)
    }

    pub fn following(&self, user_id: i64) -> Result<Vec<User>, ServiceError> {
        let user = self.load_user(&self.db, user_id)?;
        graph::followed_by(&self.db, &user)
    }

    /// (followers, following) counts for a profile.
    pub fn follow_counts(&self, user_id: i64) -> Result<(usize, usize), ServiceError> {
        let user = self.load_user(&self.db, user_id)?;
        Ok((
            graph::followers_count(&self.db, &user)?,
            graph::followed_count(&self.db, &user)?,
        ))
    }

    // ── Listings ──

    /// Home feed: followed users' comments plus the user's own.
    pub fn feed(&self, user_id: i64, page: usize) -> Result<Page<Comment>, ServiceError> {
        let params = self.page(page)?;
        self.read(|s| {
            let user = self.load_user(s, user_id)?;
            feed::feed(s, &user, params)
        })
    }

    pub fn explore(&self, page: usize) -> Result<Page<Comment>, ServiceError> {
        let params = self.page(page)?;
        self.read(|s| feed::explore(s, params))
    }

    pub fn user_comments(&self, user_id: i64, page: usize) -> Result<Page<Comment>, ServiceError> {
        let params = self.page(page)?;
        self.read(|s| {
            let user = self.load_user(s, user_id)?;
            feed::user_comments(s, &user, params)
        })
    }

    /// Run several reads against one transaction so counts and rows agree.
    fn read<R>(
        &self,
        f: impl FnOnce(&Session<'_>) -> Result<R, ServiceError>,
    ) -> Result<R, ServiceError> {
        let s = self.db.session()?;
        let out = f(&s)?;
        s.rollback()?;
        Ok(out)
    }

    // ── Search ──

    /// Full-text search over comment bodies, most relevant first.
    pub fn search_comments(&self, text: &str, page: usize) -> Result<Page<Comment>, ServiceError> {
        let params = self.page(page)?;
        let (query, total) = self.search.search::<Comment>(text, params);
        let items = query.fetch_all(&self.db)?;
        Ok(Page::new(items, params, total))
    }

    /// Rebuild the comment index from the store.
    pub fn reindex(&self) -> Result<usize, ServiceError> {
        self.search.reindex::<Comment>(&self.db)
    }

    // ── Password reset ──

    pub fn reset_password_token(&self, user_id: i64) -> Result<String, ServiceError> {
        let user = self.load_user(&self.db, user_id)?;
        self.tokens.issue(user.id)
    }

    /// The user a reset token was issued for, if the token is valid and
    /// the user still exists.
    pub fn verify_reset_password_token(&self, token: &str) -> Result<Option<User>, ServiceError> {
        match self.tokens.verify(token) {
            Some(id) => Query::<User>::new().filter_eq("id", id).first(&self.db),
            None => Ok(None),
        }
    }

    pub fn reset_password(&self, token: &str, new_password: &str) -> Result<User, ServiceError> {
        self.check_password(new_password)?;
        let invalid = || ServiceError::Unauthorized(self.t("error.auth.invalid_token", &[]));
        let user_id = self.tokens.verify(token).ok_or_else(invalid)?;

        let mut s = self.db.session()?;
        let mut user: User = s.get(user_id)?.ok_or_else(invalid)?;
        user.set_password(self.credentials.as_ref(), new_password)?;
        let user = s.update(user)?;
        s.commit()?;

        info!("password reset for user {}", user.username);
        Ok(user)
    }
}

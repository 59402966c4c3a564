//! Output formatting for CLI results.

use std::collections::HashMap;

use microblog_core::{Page, ServiceError};
use microblog_social::{Comment, Microblog, User};
use serde::Serialize;

/// Public view of a user; never includes the password hash.
#[derive(Serialize)]
struct UserView<'a> {
    id: i64,
    username: &'a str,
    about_me: Option<&'a str>,
    avatar: String,
    last_seen: String,
    followers: usize,
    following: usize,
}

#[derive(Serialize)]
struct CommentView {
    id: i64,
    author: String,
    body: String,
    timestamp: String,
    language: Option<String>,
}

pub enum Output {
    Table,
    Json,
}

impl Output {
    pub fn parse(s: &str) -> Self {
        if s == "json" { Output::Json } else { Output::Table }
    }

    pub fn user(&self, mb: &Microblog, user: &User) -> anyhow::Result<()> {
        let (followers, following) = mb.follow_counts(user.id)?;
        let view = UserView {
            id: user.id,
            username: &user.username,
            about_me: user.about_me.as_deref(),
            avatar: user.avatar(64),
            last_seen: user.last_seen.to_rfc3339(),
            followers,
            following,
        };
        match self {
            Output::Json => println!("{}", serde_json::to_string_pretty(&view)?),
            Output::Table => {
                println!("{} (#{})", view.username, view.id);
                if let Some(about) = view.about_me {
                    println!("  {}", about);
                }
                println!("  avatar {}", view.avatar);
                println!("  last seen {}", view.last_seen);
                println!(
                    "  {} followers, {} following",
                    view.followers, view.following
                );
            }
        }
        Ok(())
    }

    /// Print a service error with its stable code.
    pub fn error(&self, e: &ServiceError) {
        match self {
            Output::Json => {
                let out = serde_json::json!({ "code": e.error_code(), "message": e.to_string() });
                println!("{}", out);
            }
            Output::Table => eprintln!("error [{}]: {}", e.error_code(), e),
        }
    }

    pub fn comments(&self, mb: &Microblog, page: Page<Comment>) -> anyhow::Result<()> {
        let mut authors: HashMap<i64, String> = HashMap::new();
        for c in &page.items {
            if !authors.contains_key(&c.user_id) {
                authors.insert(c.user_id, mb.user(c.user_id)?.username);
            }
        }
        let page = page.map(|c| CommentView {
            id: c.id,
            author: authors.get(&c.user_id).cloned().unwrap_or_default(),
            timestamp: c.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            body: c.body,
            language: c.language,
        });

        match self {
            Output::Json => println!("{}", serde_json::to_string_pretty(&page)?),
            Output::Table => {
                if page.items.is_empty() {
                    println!("No comments.");
                }
                for v in &page.items {
                    println!("[{}] {} {}: {}", v.id, v.timestamp, v.author, v.body);
                }
                let mut nav = vec![format!("page {} of {} results", page.page, page.total)];
                if let Some(p) = page.prev_page {
                    nav.push(format!("prev: --page {}", p));
                }
                if let Some(n) = page.next_page {
                    nav.push(format!("next: --page {}", n));
                }
                println!("-- {}", nav.join(", "));
            }
        }
        Ok(())
    }
}

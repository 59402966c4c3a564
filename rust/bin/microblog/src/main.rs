//! `microblog`: command-line front end for the microblog service.
//!
//! Usage:
//!   microblog [-c microblog.toml] [--set KEY=VALUE]... <command>
//!
//! `--set` takes the flags of `ServiceConfig::apply_args` without the
//! leading dashes, e.g. `--set no-search`, `--set lang=es`,
//! `--set self-follow=reject`.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use microblog_core::{ServiceConfig, ServiceError};
use microblog_social::Microblog;
use tracing::{error, info};

/// Microblog: users, comments, feeds and search.
#[derive(Parser, Debug)]
#[command(name = "microblog", about = "Microblog command-line client")]
struct Cli {
    /// Path to the TOML config file. Missing file means defaults.
    #[arg(short = 'c', long = "config", global = true, default_value = "microblog.toml")]
    config: PathBuf,

    /// Config override, repeatable (e.g. `data-dir=/var/lib/microblog`).
    #[arg(long = "set", global = true, value_name = "KEY[=VALUE]")]
    set: Vec<String>,

    /// Secret for password reset tokens.
    #[arg(long = "secret-key", env = "SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Output format: table or json.
    #[arg(long = "output", short = 'o', global = true, default_value = "table")]
    output: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database and search indexes.
    Init,

    /// Create an account.
    Register {
        username: String,
        email: String,
        /// Password (not recommended, use the interactive prompt).
        #[arg(long)]
        password: Option<String>,
    },

    /// Show a user's profile and latest comments.
    User {
        username: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Edit a user's profile.
    Profile {
        username: String,
        /// New username.
        #[arg(long = "rename")]
        rename: Option<String>,
        /// New "about me" text; empty clears it.
        #[arg(long = "about")]
        about: Option<String>,
    },

    /// Post a comment as a user.
    Post {
        username: String,
        body: String,
        /// Language tag of the comment.
        #[arg(long)]
        lang: Option<String>,
    },

    /// Delete one of a user's comments.
    Delete { username: String, comment_id: i64 },

    /// Follow another user.
    Follow { username: String, other: String },

    /// Stop following another user.
    Unfollow { username: String, other: String },

    /// Show a user's home feed.
    Feed {
        username: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Show every comment, newest first.
    Explore {
        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Full-text search over comments.
    Search {
        text: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Rebuild the search index from the database.
    Reindex,

    /// Issue a password reset token for a user.
    ResetToken { username: String },

    /// Set a new password using a reset token.
    ResetPassword {
        token: String,
        #[arg(long)]
        password: Option<String>,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<ServiceConfig> {
    let mut config = ServiceConfig::load(&cli.config)?;
    let overrides: Vec<String> = cli.set.iter().map(|s| format!("--{}", s)).collect();
    config.apply_args(&overrides)?;
    if let Some(secret) = &cli.secret_key {
        config.secret_key = secret.clone();
    }
    Ok(config)
}

fn read_password(given: Option<String>, prompt: &str) -> anyhow::Result<String> {
    if let Some(p) = given {
        return Ok(p);
    }
    let pw = rpassword::prompt_password(prompt)?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if pw != confirm {
        anyhow::bail!("Passwords do not match.");
    }
    Ok(pw)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let out = commands::Output::parse(&cli.output);
    let result = run(cli, &out);
    if let Err(e) = &result {
        if let Some(se) = e.downcast_ref::<ServiceError>() {
            if !se.is_client_error() {
                error!(code = se.error_code(), "{}", se);
            }
            out.error(se);
            std::process::exit(1);
        }
    }
    result
}

fn run(cli: Cli, out: &commands::Output) -> anyhow::Result<()> {
    info!("Loading configuration from {}", cli.config.display());
    let config = load_config(&cli)?;
    let mb = Microblog::open(config)?;

    match cli.command {
        Commands::Init => {
            println!(
                "Initialized {} (search: {})",
                mb.config().resolve_sqlite_path().display(),
                if mb.search().index().is_enabled() { "on" } else { "off" }
            );
        }

        Commands::Register {
            username,
            email,
            password,
        } => {
            let password = read_password(password, "Password: ")?;
            let user = mb.register(&username, &email, &password)?;
            out.user(&mb, &user)?;
        }

        Commands::User { username, page } => {
            let user = mb.user_by_username(&username)?;
            out.user(&mb, &user)?;
            out.comments(&mb, mb.user_comments(user.id, page)?)?;
        }

        Commands::Profile {
            username,
            rename,
            about,
        } => {
            let user = mb.user_by_username(&username)?;
            let new_name = rename.unwrap_or_else(|| user.username.clone());
            let about = about.or_else(|| user.about_me.clone());
            let user = mb.update_profile(user.id, &new_name, about.as_deref())?;
            out.user(&mb, &user)?;
        }

        Commands::Post {
            username,
            body,
            lang,
        } => {
            let user = mb.user_by_username(&username)?;
            mb.touch_last_seen(user.id)?;
            let comment = mb.post_comment(user.id, &body, lang.as_deref())?;
            println!("Posted comment {}", comment.id);
        }

        Commands::Delete {
            username,
            comment_id,
        } => {
            let user = mb.user_by_username(&username)?;
            mb.delete_comment(user.id, comment_id)?;
            println!("Deleted comment {}", comment_id);
        }

        Commands::Follow { username, other } => {
            let user = mb.user_by_username(&username)?;
            let other = mb.user_by_username(&other)?;
            if mb.follow(user.id, other.id)? {
                println!("{} is now following {}", user.username, other.username);
            } else {
                println!("{} already follows {}", user.username, other.username);
            }
        }

        Commands::Unfollow { username, other } => {
            let user = mb.user_by_username(&username)?;
            let other = mb.user_by_username(&other)?;
            if mb.unfollow(user.id, other.id)? {
                println!("{} is no longer following {}", user.username, other.username);
            } else {
                println!("{} was not following {}", user.username, other.username);
            }
        }

        Commands::Feed { username, page } => {
            let user = mb.user_by_username(&username)?;
            out.comments(&mb, mb.feed(user.id, page)?)?;
        }

        Commands::Explore { page } => {
            out.comments(&mb, mb.explore(page)?)?;
        }

        Commands::Search { text, page } => {
            out.comments(&mb, mb.search_comments(&text, page)?)?;
        }

        Commands::Reindex => {
            let n = mb.reindex()?;
            println!("Reindexed {} comments", n);
        }

        Commands::ResetToken { username } => {
            let user = mb.user_by_username(&username)?;
            println!("{}", mb.reset_password_token(user.id)?);
        }

        Commands::ResetPassword { token, password } => {
            if mb.verify_reset_password_token(&token)?.is_none() {
                anyhow::bail!("Invalid or expired token.");
            }
            let password = read_password(password, "New password: ")?;
            let user = mb.reset_password(&token, &password)?;
            println!("Password updated for {}", user.username);
        }
    }

    Ok(())
}

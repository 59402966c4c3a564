//! Users, comments, the follower graph and the feed, behind the
//! `Microblog` service facade.

pub mod feed;
pub mod graph;
pub mod i18n;
pub mod model;
pub mod password;
pub mod reset;
pub mod service;

pub use i18n::{DefaultLocalizer, Lang, Localizer};
pub use model::{Comment, User};
pub use password::Argon2Verifier;
pub use reset::ResetTokens;
pub use service::Microblog;

mod comment;
mod user;

pub use comment::{BODY_MAX, Comment};
pub use user::{ABOUT_ME_MAX, EMAIL_MAX, USERNAME_MAX, User};

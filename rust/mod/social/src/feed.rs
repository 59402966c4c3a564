//! Home feed and other comment listings.
//!
//! All listings are newest first. Comments with the same timestamp are
//! ordered by descending id so paging is stable.

use microblog_core::{Page, PageParams, ServiceError};
use microblog_sql::{SQLExecutor, Value};
use microblog_store::{Direction, Query};

use crate::model::{Comment, User};

fn newest_first(query: Query<Comment>) -> Query<Comment> {
    query
        .order_by("timestamp", Direction::Desc)
        .order_by("id", Direction::Desc)
}

/// Comments by users `user` follows, plus `user`'s own.
///
/// The union drops duplicates, so a self-follow edge does not repeat
/// the user's comments.
pub fn followed_comments(user: &User) -> Query<Comment> {
    newest_first(Query::from_subquery(
        "SELECT \"comment\".* FROM \"comment\" JOIN \"followers\" \
         ON \"followers\".\"followed_id\" = \"comment\".\"user_id\" \
         WHERE \"followers\".\"follower_id\" = ? \
         UNION \
         SELECT \"comment\".* FROM \"comment\" WHERE \"comment\".\"user_id\" = ?",
        vec![Value::Integer(user.id), Value::Integer(user.id)],
    ))
}

pub fn feed(
    exec: &dyn SQLExecutor,
    user: &User,
    params: PageParams,
) -> Result<Page<Comment>, ServiceError> {
    followed_comments(user).paginate(exec, params)
}

/// Every comment.
pub fn explore(exec: &dyn SQLExecutor, params: PageParams) -> Result<Page<Comment>, ServiceError> {
    newest_first(Query::new()).paginate(exec, params)
}

/// Comments written by `user`.
pub fn user_comments(
    exec: &dyn SQLExecutor,
    user: &User,
    params: PageParams,
) -> Result<Page<Comment>, ServiceError> {
    newest_first(Query::new().filter_eq("user_id", user.id)).paginate(exec, params)
}

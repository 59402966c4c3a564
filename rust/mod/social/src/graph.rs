//! Follower graph.
//!
//! Directed edges `follower -> followed` in the `followers` table. Every
//! function runs on the executor it is given and never commits; pass a
//! `Session` to make edge changes part of a larger unit of work.

use microblog_core::ServiceError;
use microblog_sql::{SQLExecutor, Value};
use microblog_store::{Direction, Query, sql_err};

use crate::model::User;

pub const TABLE: &str = "followers";

/// Create the edge table if missing.
pub fn ensure_schema(exec: &dyn SQLExecutor) -> Result<(), ServiceError> {
    exec.exec(
        "CREATE TABLE IF NOT EXISTS \"followers\" (\
         \"follower_id\" INTEGER NOT NULL REFERENCES \"user\"(\"id\") DEFERRABLE INITIALLY DEFERRED, \
         \"followed_id\" INTEGER NOT NULL REFERENCES \"user\"(\"id\") DEFERRABLE INITIALLY DEFERRED, \
         PRIMARY KEY (\"follower_id\", \"followed_id\"))",
        &[],
    )
    .map_err(sql_err)?;
    exec.exec(
        "CREATE INDEX IF NOT EXISTS \"idx_followers_followed\" ON \"followers\" (\"followed_id\")",
        &[],
    )
    .map_err(sql_err)?;
    Ok(())
}

/// Add the edge. Returns false if it already existed.
pub fn follow(exec: &dyn SQLExecutor, follower: &User, followed: &User) -> Result<bool, ServiceError> {
    let added = exec
        .exec(
            "INSERT OR IGNORE INTO \"followers\" (\"follower_id\", \"followed_id\") VALUES (?, ?)",
            &[Value::Integer(follower.id), Value::Integer(followed.id)],
        )
        .map_err(sql_err)?;
    Ok(added > 0)
}

/// Remove the edge. Returns false if there was none.
pub fn unfollow(exec: &dyn SQLExecutor, follower: &User, followed: &User) -> Result<bool, ServiceError> {
    let removed = exec
        .exec(
            "DELETE FROM \"followers\" WHERE \"follower_id\" = ? AND \"followed_id\" = ?",
            &[Value::Integer(follower.id), Value::Integer(followed.id)],
        )
        .map_err(sql_err)?;
    Ok(removed > 0)
}

pub fn is_following(exec: &dyn SQLExecutor, follower: &User, followed: &User) -> Result<bool, ServiceError> {
    let rows = exec
        .query(
            "SELECT 1 AS \"hit\" FROM \"followers\" WHERE \"follower_id\" = ? AND \"followed_id\" = ?",
            &[Value::Integer(follower.id), Value::Integer(followed.id)],
        )
        .map_err(sql_err)?;
    Ok(!rows.is_empty())
}

/// Users following `user`, by username.
pub fn followers_of(exec: &dyn SQLExecutor, user: &User) -> Result<Vec<User>, ServiceError> {
    edge_users("followed_id", "follower_id", user.id).fetch_all(exec)
}

/// Users `user` follows, by username.
pub fn followed_by(exec: &dyn SQLExecutor, user: &User) -> Result<Vec<User>, ServiceError> {
    edge_users("follower_id", "followed_id", user.id).fetch_all(exec)
}

pub fn followers_count(exec: &dyn SQLExecutor, user: &User) -> Result<usize, ServiceError> {
    count_edges(exec, "followed_id", user.id)
}

pub fn followed_count(exec: &dyn SQLExecutor, user: &User) -> Result<usize, ServiceError> {
    count_edges(exec, "follower_id", user.id)
}

/// Users at the `other` end of edges whose `anchor` column is `id`.
fn edge_users(anchor: &str, other: &str, id: i64) -> Query<User> {
    Query::from_subquery(
        format!(
            "SELECT \"user\".* FROM \"user\" JOIN \"followers\" \
             ON \"followers\".\"{other}\" = \"user\".\"id\" \
             WHERE \"followers\".\"{anchor}\" = ?",
        ),
        vec![Value::Integer(id)],
    )
    .order_by("username", Direction::Asc)
}

fn count_edges(exec: &dyn SQLExecutor, column: &str, id: i64) -> Result<usize, ServiceError> {
    let sql = format!("SELECT COUNT(*) AS \"n\" FROM \"followers\" WHERE \"{}\" = ?", column);
    let rows = exec.query(&sql, &[Value::Integer(id)]).map_err(sql_err)?;
    Ok(rows
        .first()
        .and_then(|r| r.get_i64("n"))
        .unwrap_or_default() as usize)
}

//! Lazily executed SELECTs over an entity table.

use std::marker::PhantomData;

use microblog_core::{Page, PageParams, ServiceError};
use microblog_sql::{SQLExecutor, Value};

use crate::entity::{Entity, from_row, sql_err};

/// Sort direction for `order_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// A SELECT over `T`'s table, or over a subquery yielding `T`'s columns.
///
/// Nothing runs until `fetch_all`, `first`, `count` or `paginate`.
#[derive(Clone)]
pub struct Query<T: Entity> {
    subquery: Option<(String, Vec<Value>)>,
    filters: Vec<(String, Vec<Value>)>,
    order: Vec<String>,
    empty: bool,
    _phantom: PhantomData<T>,
}

impl<T: Entity> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Query<T> {
    /// Select from the entity table.
    pub fn new() -> Self {
        Self {
            subquery: None,
            filters: Vec::new(),
            order: Vec::new(),
            empty: false,
            _phantom: PhantomData,
        }
    }

    /// Select from a subquery that returns at least `id` and `data`.
    pub fn from_subquery(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            subquery: Some((sql.into(), params)),
            ..Self::new()
        }
    }

    /// A query that matches nothing.
    pub fn none() -> Self {
        Self {
            empty: true,
            ..Self::new()
        }
    }

    pub fn is_none(&self) -> bool {
        self.empty
    }

    pub fn filter_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters
            .push((format!("\"{}\" = ?", column), vec![value.into()]));
        self
    }

    /// Keep rows whose `column` is one of `ids`. An empty set matches nothing.
    pub fn filter_in(mut self, column: &str, ids: &[i64]) -> Self {
        if ids.is_empty() {
            self.empty = true;
            return self;
        }
        let marks = vec!["?"; ids.len()].join(", ");
        self.filters.push((
            format!("\"{}\" IN ({})", column, marks),
            ids.iter().copied().map(Value::Integer).collect(),
        ));
        self
    }

    pub fn order_by(mut self, column: &str, dir: Direction) -> Self {
        self.order.push(format!("\"{}\" {}", column, dir.sql()));
        self
    }

    /// Order rows by the position of `column` in `ids`; unlisted rows last.
    pub fn order_by_rank(mut self, column: &str, ids: &[i64]) -> Self {
        if ids.is_empty() {
            return self;
        }
        let mut case = format!("CASE \"{}\"", column);
        for (rank, id) in ids.iter().enumerate() {
            case.push_str(&format!(" WHEN {} THEN {}", id, rank));
        }
        case.push_str(&format!(" ELSE {} END", ids.len()));
        self.order.push(case);
        self
    }

    fn from_clause(&self, params: &mut Vec<Value>) -> String {
        match &self.subquery {
            Some((sql, sub_params)) => {
                params.extend(sub_params.iter().cloned());
                format!("({}) AS \"{}\"", sql, T::TABLE)
            }
            None => format!("\"{}\"", T::TABLE),
        }
    }

    fn where_clause(&self, params: &mut Vec<Value>) -> String {
        let mut conds: Vec<&str> = Vec::new();
        if self.empty {
            conds.push("0 = 1");
        }
        for (cond, values) in &self.filters {
            conds.push(cond.as_str());
            params.extend(values.iter().cloned());
        }
        if conds.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conds.join(" AND "))
        }
    }

    fn select_sql(&self, window: Option<(usize, usize)>) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let from = self.from_clause(&mut params);
        let mut sql = format!(
            "SELECT \"id\", \"data\" FROM {}{}",
            from,
            self.where_clause(&mut params)
        );
        if !self.order.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.order.join(", ")));
        }
        if let Some((limit, offset)) = window {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
            params.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
        }
        (sql, params)
    }

    /// The SELECT this query runs, with its bound parameters.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        self.select_sql(None)
    }

    fn load(
        &self,
        exec: &dyn SQLExecutor,
        window: Option<(usize, usize)>,
    ) -> Result<Vec<T>, ServiceError> {
        if self.empty {
            return Ok(Vec::new());
        }
        let (sql, params) = self.select_sql(window);
        let rows = exec.query(&sql, &params).map_err(sql_err)?;
        rows.iter().map(from_row::<T>).collect()
    }

    pub fn fetch_all(&self, exec: &dyn SQLExecutor) -> Result<Vec<T>, ServiceError> {
        self.load(exec, None)
    }

    pub fn first(&self, exec: &dyn SQLExecutor) -> Result<Option<T>, ServiceError> {
        Ok(self.load(exec, Some((1, 0)))?.into_iter().next())
    }

    pub fn count(&self, exec: &dyn SQLExecutor) -> Result<usize, ServiceError> {
        if self.empty {
            return Ok(0);
        }
        let mut params = Vec::new();
        let from = self.from_clause(&mut params);
        let sql = format!(
            "SELECT COUNT(*) AS \"n\" FROM {}{}",
            from,
            self.where_clause(&mut params)
        );
        let rows = exec.query(&sql, &params).map_err(sql_err)?;
        let n = rows.first().and_then(|r| r.get_i64("n")).unwrap_or_default();
        Ok(usize::try_from(n).unwrap_or_default())
    }

    /// One page of the ordered result set plus the overall count.
    pub fn paginate(
        &self,
        exec: &dyn SQLExecutor,
        params: PageParams,
    ) -> Result<Page<T>, ServiceError> {
        if self.empty {
            return Ok(Page::empty(params));
        }
        let total = self.count(exec)?;
        let items = self.load(exec, Some((params.per_page, params.offset())))?;
        Ok(Page::new(items, params, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ensure_table;
    use crate::entity::tests::{Note, note};
    use microblog_sql::SqliteStore;

    fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        ensure_table::<Note>(&store).unwrap();
        for (title, rank) in [("a", 3), ("b", 1), ("c", 2), ("d", 1)] {
            let doc = serde_json::to_string(&note(title, rank)).unwrap();
            store
                .insert(
                    "INSERT INTO \"note\" (\"title\", \"rank\", \"data\") VALUES (?, ?, ?)",
                    &[title.into(), Value::Integer(rank), doc.into()],
                )
                .unwrap();
        }
        store
    }

    fn titles(notes: &[Note]) -> Vec<&str> {
        notes.iter().map(|n| n.title.as_str()).collect()
    }

    #[test]
    fn filter_and_order() {
        let store = seeded();
        let q = Query::<Note>::new()
            .filter_eq("rank", 1i64)
            .order_by("id", Direction::Desc);
        let notes = q.fetch_all(&store).unwrap();
        assert_eq!(titles(&notes), vec!["d", "b"]);
        assert_eq!(q.count(&store).unwrap(), 2);
    }

    #[test]
    fn rank_order_follows_id_list() {
        let store = seeded();
        let ids = [3, 1, 4];
        let notes = Query::<Note>::new()
            .filter_in("id", &ids)
            .order_by_rank("id", &ids)
            .fetch_all(&store)
            .unwrap();
        assert_eq!(notes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![3, 1, 4]);
    }

    #[test]
    fn empty_filter_matches_nothing() {
        let store = seeded();
        let q = Query::<Note>::new().filter_in("id", &[]);
        assert!(q.is_none());
        assert!(q.fetch_all(&store).unwrap().is_empty());
        assert_eq!(q.count(&store).unwrap(), 0);

        let (sql, _) = Query::<Note>::none().to_sql();
        assert!(sql.contains("0 = 1"));
    }

    #[test]
    fn paginate_windows() {
        let store = seeded();
        let q = Query::<Note>::new().order_by("id", Direction::Asc);

        let p1 = q.paginate(&store, PageParams::new(1, 3).unwrap()).unwrap();
        assert_eq!(titles(&p1.items), vec!["a", "b", "c"]);
        assert_eq!(p1.total, 4);
        assert!(p1.has_next);
        assert!(!p1.has_prev);

        let p2 = q.paginate(&store, PageParams::new(2, 3).unwrap()).unwrap();
        assert_eq!(titles(&p2.items), vec!["d"]);
        assert!(!p2.has_next);
        assert_eq!(p2.prev_page, Some(1));

        let p9 = q.paginate(&store, PageParams::new(9, 3).unwrap()).unwrap();
        assert!(p9.items.is_empty());
        assert_eq!(p9.total, 4);
    }

    #[test]
    fn oversized_window_is_empty_not_wrapped() {
        let store = seeded();
        let q = Query::<Note>::new().order_by("id", Direction::Asc);
        let far = PageParams {
            page: 1 << 62,
            per_page: 25,
        };
        let page = q.paginate(&store, far).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 4);
        assert!(!page.has_next);
    }

    #[test]
    fn subquery_source() {
        let store = seeded();
        let q = Query::<Note>::from_subquery(
            "SELECT * FROM \"note\" WHERE \"rank\" >= ?",
            vec![Value::Integer(2)],
        )
        .filter_eq("title", "c");
        let notes = q.fetch_all(&store).unwrap();
        assert_eq!(titles(&notes), vec!["c"]);
        assert_eq!(q.count(&store).unwrap(), 1);
    }

    #[test]
    fn first_returns_one() {
        let store = seeded();
        let n = Query::<Note>::new()
            .order_by("rank", Direction::Desc)
            .first(&store)
            .unwrap()
            .unwrap();
        assert_eq!(n.title, "a");
        assert!(Query::<Note>::none().first(&store).unwrap().is_none());
    }
}

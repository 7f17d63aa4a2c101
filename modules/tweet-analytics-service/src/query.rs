//! Query construction and pagination over the `tweets` table.
//!
//! `TweetQuery` is a value: every builder method consumes it and returns the
//! extended query, so a filter can only be lost by discarding the result,
//! which `#[must_use]` turns into a warning.

use crate::classify;
use crate::error::{ApiError, ApiResult};
use rusqlite::types::Value;
use rusqlite::Connection;
use tweet_analytics_types::{
    ContentType, TweetColumn, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};

// =====================================================
// Pagination
// =====================================================

/// Validated 1-indexed page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: i64,
    page_size: i64,
}

impl Pagination {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> ApiResult<Self> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 {
            return Err(ApiError::invalid("page", format!("must be >= 1, got {}", page)));
        }
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ApiError::invalid(
                "page_size",
                format!(
                    "must be between {} and {}, got {}",
                    MIN_PAGE_SIZE, MAX_PAGE_SIZE, page_size
                ),
            ));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

// =====================================================
// Predicates
// =====================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(TweetColumn, Value),
    AtLeast(TweetColumn, Value),
    AtMost(TweetColumn, Value),
    Before(TweetColumn, Value),
    NotNull(TweetColumn),
    Content(ContentType),
}

impl Predicate {
    fn render(&self, params: &mut Vec<Value>) -> String {
        let mut bind = |col: TweetColumn, op: &str, value: &Value| {
            params.push(value.clone());
            format!("{} {} ?", col.as_str(), op)
        };
        match self {
            Predicate::Eq(col, v) => bind(*col, "=", v),
            Predicate::AtLeast(col, v) => bind(*col, ">=", v),
            Predicate::AtMost(col, v) => bind(*col, "<=", v),
            Predicate::Before(col, v) => bind(*col, "<", v),
            Predicate::NotNull(col) => format!("{} IS NOT NULL", col.as_str()),
            Predicate::Content(ct) => format!("({})", classify::rule(*ct).to_sql()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

// =====================================================
// Query Builder
// =====================================================

/// One page of results plus the total computed without paging.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub total: i64,
    pub rows: Vec<T>,
}

/// Expressions passed to `select`, `group_by` and `order_by` come from
/// static column names and fixed SQL in this crate; caller text only ever
/// reaches the store as bound parameters.
#[must_use]
#[derive(Debug, Clone, Default)]
pub struct TweetQuery {
    select: Vec<String>,
    predicates: Vec<Predicate>,
    group_by: Vec<String>,
    order_by: Vec<(String, Direction)>,
    top: Option<i64>,
}

impl TweetQuery {
    pub fn select<I, S>(exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            select: exprs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn filter_opt(self, predicate: Option<Predicate>) -> Self {
        match predicate {
            Some(p) => self.filter(p),
            None => self,
        }
    }

    pub fn group_by(mut self, expr: impl Into<String>) -> Self {
        self.group_by.push(expr.into());
        self
    }

    pub fn order_by(mut self, expr: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push((expr.into(), direction));
        self
    }

    /// Keep only the first `n` ordered rows before paging.
    pub fn top(mut self, n: Option<i64>) -> Self {
        self.top = n;
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Full query without paging, plus its bound parameters.
    fn base_sql(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = format!("SELECT {} FROM tweets", self.select.join(", "));

        if !self.predicates.is_empty() {
            let conditions: Vec<String> = self
                .predicates
                .iter()
                .map(|p| p.render(&mut params))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_clause());
        }
        if let Some(n) = self.top {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(n));
        }
        (sql, params)
    }

    fn order_clause(&self) -> String {
        self.order_by
            .iter()
            .map(|(expr, dir)| format!("{} {}", expr, dir.as_sql()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn count_sql(&self) -> (String, Vec<Value>) {
        let (base, params) = self.base_sql();
        (format!("SELECT COUNT(*) FROM ({})", base), params)
    }

    pub fn page_sql(&self, pagination: Pagination) -> (String, Vec<Value>) {
        let (base, mut params) = self.base_sql();
        let mut sql = if self.top.is_some() {
            // LIMIT inside the subquery already applied; ordering must be
            // restated because a subquery's order is not preserved.
            let mut outer = format!("SELECT * FROM ({})", base);
            if !self.order_by.is_empty() {
                outer.push_str(" ORDER BY ");
                outer.push_str(&self.order_clause());
            }
            outer
        } else {
            base
        };
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(Value::Integer(pagination.page_size()));
        params.push(Value::Integer(pagination.offset()));
        (sql, params)
    }

    /// Number of logical rows (groups, when grouped) the query yields.
    pub fn count(&self, conn: &Connection) -> rusqlite::Result<i64> {
        let (sql, params) = self.count_sql();
        log::debug!("count: {} {:?}", sql, params);
        conn.query_row(&sql, rusqlite::params_from_iter(params.iter()), |row| {
            row.get(0)
        })
    }

    /// Two passes: the total, then the requested window. Callers must end
    /// `order_by` with a unique key so that windows never overlap.
    pub fn fetch_page<T, F>(
        &self,
        conn: &Connection,
        pagination: Pagination,
        map_row: F,
    ) -> rusqlite::Result<Page<T>>
    where
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let total = self.count(conn)?;
        let (sql, params) = self.page_sql(pagination);
        log::debug!("page: {} {:?}", sql, params);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), map_row)?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(Page { total, rows })
    }

    /// Every row, unpaged. Only for queries whose result size is bounded by
    /// construction (e.g. one row per calendar day).
    pub fn fetch_all<T, F>(&self, conn: &Connection, map_row: F) -> rusqlite::Result<Vec<T>>
    where
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let (sql, params) = self.base_sql();
        log::debug!("all: {} {:?}", sql, params);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), map_row)?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
    }
}

/// Log grouping on columns that carry no index.
pub fn warn_if_unindexed(column: TweetColumn) {
    if !column.is_indexed() {
        log::warn!(
            "grouping on unindexed column '{}' scans the whole table",
            column
        );
    }
}

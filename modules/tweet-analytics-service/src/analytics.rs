//! Author ranking and daily tweet counts.

use crate::classify::parse_content_type;
use crate::db::Db;
use crate::error::{ApiError, ApiResult};
use crate::query::{Direction, Pagination, Predicate, TweetQuery};
use crate::timeparse::{format_timestamp, DateBound};
use chrono::{Duration, NaiveDate, Utc};
use rusqlite::types::Value;
use tweet_analytics_types::{
    AuthorTweetCount, ContentType, CountedPage, DailyTweetCount, PageQuery, TweetColumn,
    TweetStatsQuery,
};

/// Days covered by `/analytics/stats` when no start date is given.
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Validated parameters of the daily-count query.
#[derive(Debug, Clone, PartialEq)]
pub struct TweetStatsRequest {
    pub start: DateBound,
    pub end: DateBound,
    pub content_type: Option<ContentType>,
    pub pagination: Pagination,
}

impl TweetStatsRequest {
    pub fn from_query(q: &TweetStatsQuery, today: NaiveDate) -> ApiResult<Self> {
        let pagination = Pagination::new(q.page, q.page_size)?;
        let content_type = parse_content_type("criteria", q.criteria.as_deref())?;
        let end = match q.end_date.as_deref() {
            Some(raw) => parse_bound("end_date", raw)?,
            None => DateBound::Date(today),
        };
        let start = match q.start_date.as_deref() {
            Some(raw) => parse_bound("start_date", raw)?,
            None => end
                .start()
                .date()
                .checked_sub_signed(Duration::days(DEFAULT_WINDOW_DAYS))
                .map(DateBound::Date)
                .ok_or_else(|| ApiError::invalid("end_date", "too early for the default window"))?,
        };
        Ok(Self {
            start,
            end,
            content_type,
            pagination,
        })
    }
}

pub fn parse_bound(field: &str, raw: &str) -> ApiResult<DateBound> {
    DateBound::parse(raw).ok_or_else(|| {
        ApiError::invalid(
            field,
            format!("'{}' is not a date (YYYY-MM-DD) or timestamp", raw),
        )
    })
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Inclusive date-range predicates on `datetime`.
pub fn range_predicates(start: Option<DateBound>, end: Option<DateBound>) -> Vec<Predicate> {
    let mut predicates = Vec::new();
    if let Some(start) = start {
        predicates.push(Predicate::AtLeast(
            TweetColumn::Datetime,
            Value::Text(format_timestamp(start.start())),
        ));
    }
    if let Some(end) = end {
        predicates.push(Predicate::Before(
            TweetColumn::Datetime,
            Value::Text(format_timestamp(end.end_exclusive())),
        ));
    }
    predicates
}

impl Db {
    /// Authors ranked by tweet count, ties broken by author name.
    pub fn author_ranking(&self, q: &PageQuery) -> ApiResult<CountedPage<AuthorTweetCount>> {
        let pagination = Pagination::new(q.page, q.page_size)?;
        let conn = self.conn()?;

        let total_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT author) FROM tweets",
            [],
            |row| row.get(0),
        )?;

        let page = TweetQuery::select(["author", "COUNT(*) AS tweet_count"])
            .filter(Predicate::NotNull(TweetColumn::Author))
            .group_by("author")
            .order_by("tweet_count", Direction::Desc)
            .order_by("author", Direction::Asc)
            .fetch_page(&conn, pagination, |row| {
                Ok(AuthorTweetCount {
                    author: row.get(0)?,
                    tweet_count: row.get(1)?,
                })
            })?;

        Ok(CountedPage {
            total_count,
            items: page.rows,
        })
    }

    /// Tweets per calendar day inside `[start, end]`, oldest first.
    pub fn daily_tweet_counts(
        &self,
        req: &TweetStatsRequest,
    ) -> ApiResult<CountedPage<DailyTweetCount>> {
        let conn = self.conn()?;
        let mut query = TweetQuery::select(["date(datetime) AS date", "COUNT(*) AS tweet_count"]);
        for predicate in range_predicates(Some(req.start), Some(req.end)) {
            query = query.filter(predicate);
        }
        let page = query
            .filter_opt(req.content_type.map(Predicate::Content))
            .group_by("date(datetime)")
            .order_by("date", Direction::Asc)
            .fetch_page(&conn, req.pagination, |row| {
                Ok(DailyTweetCount {
                    date: row.get(0)?,
                    tweet_count: row.get(1)?,
                })
            })?;

        Ok(CountedPage {
            total_count: page.total,
            items: page.rows,
        })
    }
}

//! Generic day/month/year/content-type filter over full tweet records.

use crate::classify::parse_content_type;
use crate::db::{row_to_tweet, Db, TWEET_COLUMNS};
use crate::error::ApiResult;
use crate::query::{Direction, Pagination, Predicate, TweetQuery};
use rusqlite::types::Value;
use tweet_analytics_types::{ContentType, DataFilterRequest, FilteredTweets, PageQuery, TweetColumn};

#[derive(Debug, Clone, PartialEq)]
pub struct DataFilter {
    pub day: Option<i64>,
    pub month: Option<i64>,
    pub year: Option<i64>,
    pub content_type: Option<ContentType>,
    pub pagination: Pagination,
}

impl DataFilter {
    pub fn from_request(body: &DataFilterRequest, page: &PageQuery) -> ApiResult<Self> {
        Ok(Self {
            day: body.day,
            month: body.month,
            year: body.year,
            content_type: parse_content_type("content_type", body.content_type.as_deref())?,
            pagination: Pagination::new(page.page, page.page_size)?,
        })
    }

    fn query(&self) -> TweetQuery {
        let eq = |col, v: Option<i64>| v.map(|v| Predicate::Eq(col, Value::Integer(v)));
        TweetQuery::select([TWEET_COLUMNS])
            .filter_opt(eq(TweetColumn::Day, self.day))
            .filter_opt(eq(TweetColumn::Month, self.month))
            .filter_opt(eq(TweetColumn::Year, self.year))
            .filter_opt(self.content_type.map(Predicate::Content))
            .order_by("id", Direction::Asc)
    }
}

impl Db {
    pub fn filter_tweets(&self, filter: &DataFilter) -> ApiResult<FilteredTweets> {
        let conn = self.conn()?;
        let page = filter
            .query()
            .fetch_page(&conn, filter.pagination, row_to_tweet)?;
        Ok(FilteredTweets {
            tweets: page.rows,
            total_tweets: page.total,
        })
    }
}

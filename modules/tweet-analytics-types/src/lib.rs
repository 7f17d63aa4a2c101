//! Shared types for the tweet analytics service and its HTTP clients.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of rows (months) in a heatmap grid.
pub const HEATMAP_MONTHS: usize = 12;
/// Number of columns (days of month) in a heatmap grid.
pub const HEATMAP_DAYS: usize = 31;

/// Smallest and largest accepted `page_size`.
pub const MIN_PAGE_SIZE: i64 = 1;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

// =====================================================
// Parse Errors
// =====================================================

/// A name that is not part of one of the closed vocabularies below
/// (content type, column, time interval, level).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownName {
    pub kind: &'static str,
    pub name: String,
}

impl UnknownName {
    fn new(kind: &'static str, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for UnknownName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.name)
    }
}

impl std::error::Error for UnknownName {}

// =====================================================
// Domain Types
// =====================================================

/// Categorical severity shared by `threat_level` and `hateful`.
/// An absent value is modelled as `Option::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Low,
    Medium,
    High,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Low, Level::Medium, Level::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Low => "Low",
            Level::Medium => "Medium",
            Level::High => "High",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Level::Low),
            "medium" => Ok(Level::Medium),
            "high" => Ok(Level::High),
            _ => Err(UnknownName::new("level", s)),
        }
    }
}

/// One row of the `tweets` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: i64,
    pub author: Option<String>,
    pub author_created_utc: Option<String>,
    pub clean_text: Option<String>,
    pub created_at: Option<String>,
    pub datetime: Option<String>,
    pub day: Option<i64>,
    pub follower_count: Option<i64>,
    pub full_text: Option<String>,
    pub hateful: Option<Level>,
    pub lang: Option<String>,
    pub len_filter: Option<bool>,
    pub minute: Option<i64>,
    pub month: Option<i64>,
    pub reply_count: Option<i64>,
    pub retweet_count: Option<i64>,
    pub retweeted: Option<bool>,
    pub second: Option<i64>,
    pub text: Option<String>,
    pub threat_level: Option<Level>,
    pub year: Option<i64>,
    pub year_month: Option<String>,
    pub year_month_day: Option<String>,
    pub zip: Option<i64>,
}

// =====================================================
// Content Classification Labels
// =====================================================

/// Requested content category, mapped by the service to a predicate over
/// `threat_level` and `hateful`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Threatening,
    NonThreatening,
    Hateful,
    Neutral,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Threatening,
        ContentType::NonThreatening,
        ContentType::Hateful,
        ContentType::Neutral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Threatening => "threatening",
            ContentType::NonThreatening => "non_threatening",
            ContentType::Hateful => "hateful",
            ContentType::Neutral => "neutral",
        }
    }

    /// Parse an optional filter label. Missing, empty and `all` mean
    /// "no content filter".
    pub fn parse_filter(label: Option<&str>) -> Result<Option<Self>, UnknownName> {
        match label.map(str::trim) {
            None | Some("") | Some("all") => Ok(None),
            Some(other) => other.parse().map(Some),
        }
    }
}

impl FromStr for ContentType {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threatening" => Ok(ContentType::Threatening),
            "non_threatening" | "non-threatening" => Ok(ContentType::NonThreatening),
            "hateful" => Ok(ContentType::Hateful),
            "neutral" => Ok(ContentType::Neutral),
            _ => Err(UnknownName::new("content_type", s)),
        }
    }
}

// =====================================================
// Column Allow-List
// =====================================================

/// Every column of the `tweets` table that may be named by a caller
/// (`metric`, `category`). Names outside this list are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TweetColumn {
    Id,
    Author,
    AuthorCreatedUtc,
    CleanText,
    CreatedAt,
    Datetime,
    Day,
    FollowerCount,
    FullText,
    Hateful,
    Lang,
    LenFilter,
    Minute,
    Month,
    ReplyCount,
    RetweetCount,
    Retweeted,
    Second,
    Text,
    ThreatLevel,
    Year,
    YearMonth,
    YearMonthDay,
    Zip,
}

impl TweetColumn {
    pub const ALL: [TweetColumn; 24] = [
        TweetColumn::Id,
        TweetColumn::Author,
        TweetColumn::AuthorCreatedUtc,
        TweetColumn::CleanText,
        TweetColumn::CreatedAt,
        TweetColumn::Datetime,
        TweetColumn::Day,
        TweetColumn::FollowerCount,
        TweetColumn::FullText,
        TweetColumn::Hateful,
        TweetColumn::Lang,
        TweetColumn::LenFilter,
        TweetColumn::Minute,
        TweetColumn::Month,
        TweetColumn::ReplyCount,
        TweetColumn::RetweetCount,
        TweetColumn::Retweeted,
        TweetColumn::Second,
        TweetColumn::Text,
        TweetColumn::ThreatLevel,
        TweetColumn::Year,
        TweetColumn::YearMonth,
        TweetColumn::YearMonthDay,
        TweetColumn::Zip,
    ];

    /// Column name, identical in the table, the CSV header and the API.
    pub fn as_str(self) -> &'static str {
        match self {
            TweetColumn::Id => "id",
            TweetColumn::Author => "author",
            TweetColumn::AuthorCreatedUtc => "author_created_utc",
            TweetColumn::CleanText => "clean_text",
            TweetColumn::CreatedAt => "created_at",
            TweetColumn::Datetime => "datetime",
            TweetColumn::Day => "day",
            TweetColumn::FollowerCount => "follower_count",
            TweetColumn::FullText => "full_text",
            TweetColumn::Hateful => "hateful",
            TweetColumn::Lang => "lang",
            TweetColumn::LenFilter => "len_filter",
            TweetColumn::Minute => "minute",
            TweetColumn::Month => "month",
            TweetColumn::ReplyCount => "reply_count",
            TweetColumn::RetweetCount => "retweet_count",
            TweetColumn::Retweeted => "retweeted",
            TweetColumn::Second => "second",
            TweetColumn::Text => "text",
            TweetColumn::ThreatLevel => "threat_level",
            TweetColumn::Year => "year",
            TweetColumn::YearMonth => "year_month",
            TweetColumn::YearMonthDay => "year_month_day",
            TweetColumn::Zip => "zip",
        }
    }

    /// Whether the schema carries an index on this column. Free text and
    /// the author signup timestamp are not indexed.
    pub fn is_indexed(self) -> bool {
        !matches!(
            self,
            TweetColumn::FullText
                | TweetColumn::Text
                | TweetColumn::CleanText
                | TweetColumn::AuthorCreatedUtc
        )
    }
}

impl fmt::Display for TweetColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TweetColumn {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TweetColumn::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownName::new("column", s))
    }
}

// =====================================================
// Time Buckets
// =====================================================

/// Granularity a timestamp is truncated to before grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInterval {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeInterval {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeInterval::Minute => "minute",
            TimeInterval::Hour => "hour",
            TimeInterval::Day => "day",
            TimeInterval::Week => "week",
            TimeInterval::Month => "month",
            TimeInterval::Year => "year",
        }
    }
}

impl FromStr for TimeInterval {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minute" => Ok(TimeInterval::Minute),
            "hour" => Ok(TimeInterval::Hour),
            "day" => Ok(TimeInterval::Day),
            "week" => Ok(TimeInterval::Week),
            "month" => Ok(TimeInterval::Month),
            "year" => Ok(TimeInterval::Year),
            _ => Err(UnknownName::new("time_interval", s)),
        }
    }
}

// =====================================================
// Request / Query Types
// =====================================================

/// Pagination-only query string (`?page=&page_size=`).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// `GET /analytics/stats`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TweetStatsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub criteria: Option<String>,
}

/// Body of `POST /data_filtering/`
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataFilterRequest {
    pub day: Option<i64>,
    pub month: Option<i64>,
    pub year: Option<i64>,
    pub content_type: Option<String>,
}

/// `GET /visualization/trends`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TrendQuery {
    pub metric: String,
    pub time_interval: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// `GET /visualization/distribution`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DistributionQuery {
    pub metric: String,
    pub category: String,
    pub top_n: Option<i64>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// `GET /visualization/heatmap`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HeatmapQuery {
    pub start_date: String,
    pub end_date: String,
    pub threat_level: Option<String>,
}

// =====================================================
// Response Types
// =====================================================

/// A page of analytics items with the total computed before paging.
#[derive(Debug, Serialize, Deserialize)]
pub struct CountedPage<T> {
    pub total_count: i64,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorTweetCount {
    pub author: String,
    pub tweet_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTweetCount {
    pub date: String,
    pub tweet_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilteredTweets {
    pub tweets: Vec<Tweet>,
    pub total_tweets: i64,
}

/// Paged visualization data.
#[derive(Debug, Serialize, Deserialize)]
pub struct VisualizationPage<T> {
    pub total_results: i64,
    pub page: i64,
    pub page_size: i64,
    pub data: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: String,
    pub value: serde_json::Value,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionBucket {
    pub category: serde_json::Value,
    pub value: i64,
}

/// Month x day grid; `cells[month - 1][day - 1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Heatmap {
    pub cells: [[i64; HEATMAP_DAYS]; HEATMAP_MONTHS],
}

impl Heatmap {
    pub fn total(&self) -> i64 {
        self.cells.iter().flatten().sum()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub total_tweets: i64,
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Outcome of one CSV import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub rows_read: usize,
    pub inserted: usize,
    pub skipped_duplicates: usize,
}

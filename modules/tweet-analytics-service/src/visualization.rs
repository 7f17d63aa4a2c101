//! Trend, distribution and heatmap aggregations.

use crate::analytics::{parse_bound, range_predicates};
use crate::db::{value_to_json, Db};
use crate::error::{ApiError, ApiResult};
use crate::query::{warn_if_unindexed, Direction, Pagination, Predicate, TweetQuery};
use crate::timeparse::DateBound;
use rusqlite::types::Value;
use tweet_analytics_types::{
    DistributionBucket, DistributionQuery, Heatmap, HeatmapQuery, Level, TimeInterval,
    TrendPoint, TrendQuery, TweetColumn, VisualizationPage, HEATMAP_DAYS, HEATMAP_MONTHS,
};

fn parse_column(field: &str, label: &str, raw: &str) -> ApiResult<TweetColumn> {
    raw.parse()
        .map_err(|_| ApiError::invalid(field, format!("Invalid {}: '{}'", label, raw)))
}

/// SQL truncating `datetime` to the start of its bucket.
pub fn truncate_sql(interval: TimeInterval) -> &'static str {
    match interval {
        TimeInterval::Minute => "strftime('%Y-%m-%d %H:%M:00', datetime)",
        TimeInterval::Hour => "strftime('%Y-%m-%d %H:00:00', datetime)",
        TimeInterval::Day => "strftime('%Y-%m-%d 00:00:00', datetime)",
        // Monday-start weeks: jump to the coming Sunday, then back six days.
        TimeInterval::Week => "strftime('%Y-%m-%d 00:00:00', datetime, 'weekday 0', '-6 days')",
        TimeInterval::Month => "strftime('%Y-%m-01 00:00:00', datetime)",
        TimeInterval::Year => "strftime('%Y-01-01 00:00:00', datetime)",
    }
}

// =====================================================
// Trend
// =====================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TrendRequest {
    pub metric: TweetColumn,
    pub interval: TimeInterval,
    pub start: Option<DateBound>,
    pub end: Option<DateBound>,
    pub pagination: Pagination,
}

impl TrendRequest {
    pub fn from_query(q: &TrendQuery) -> ApiResult<Self> {
        let metric = parse_column("metric", "metric", &q.metric)?;
        let interval: TimeInterval = q.time_interval.parse().map_err(|_| {
            ApiError::invalid(
                "time_interval",
                format!(
                    "Invalid time_interval: '{}' (expected minute, hour, day, week, month or year)",
                    q.time_interval
                ),
            )
        })?;
        let start = q
            .start_date
            .as_deref()
            .map(|raw| parse_bound("start_date", raw))
            .transpose()?;
        let end = q
            .end_date
            .as_deref()
            .map(|raw| parse_bound("end_date", raw))
            .transpose()?;
        Ok(Self {
            metric,
            interval,
            start,
            end,
            pagination: Pagination::new(q.page, q.page_size)?,
        })
    }
}

// =====================================================
// Distribution
// =====================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionRequest {
    pub metric: TweetColumn,
    pub category: TweetColumn,
    pub top_n: Option<i64>,
    pub pagination: Pagination,
}

impl DistributionRequest {
    pub fn from_query(q: &DistributionQuery) -> ApiResult<Self> {
        let metric = parse_column("metric", "metric", &q.metric)?;
        let category = parse_column("category", "category", &q.category)?;
        if let Some(n) = q.top_n {
            if n < 1 {
                return Err(ApiError::invalid("top_n", format!("must be >= 1, got {}", n)));
            }
        }
        Ok(Self {
            metric,
            category,
            top_n: q.top_n,
            pagination: Pagination::new(q.page, q.page_size)?,
        })
    }
}

// =====================================================
// Heatmap
// =====================================================

#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapRequest {
    pub start: DateBound,
    pub end: DateBound,
    pub threat_level: Option<Level>,
}

impl HeatmapRequest {
    pub fn from_query(q: &HeatmapQuery) -> ApiResult<Self> {
        let threat_level = match q.threat_level.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<Level>().map_err(|_| {
                ApiError::invalid(
                    "threat_level",
                    format!("'{}' is not one of Low, Medium, High", raw),
                )
            })?),
        };
        Ok(Self {
            start: parse_bound("start_date", &q.start_date)?,
            end: parse_bound("end_date", &q.end_date)?,
            threat_level,
        })
    }
}

/// Project `(year, month, day)` groups onto the month x day grid, one
/// increment per group.
pub fn build_heatmap(groups: &[(Option<i64>, Option<i64>, Option<i64>)]) -> ApiResult<Heatmap> {
    let mut heatmap = Heatmap::default();
    for (year, month, day) in groups {
        let cell = match (month, day) {
            (Some(m), Some(d))
                if (1..=HEATMAP_MONTHS as i64).contains(m)
                    && (1..=HEATMAP_DAYS as i64).contains(d) =>
            {
                &mut heatmap.cells[(*m - 1) as usize][(*d - 1) as usize]
            }
            _ => {
                return Err(ApiError::DataIntegrity(format!(
                    "heatmap group outside the 12x31 grid: year={:?} month={:?} day={:?}",
                    year, month, day
                )));
            }
        };
        *cell += 1;
    }
    Ok(heatmap)
}

impl Db {
    pub fn tweet_trends(&self, req: &TrendRequest) -> ApiResult<VisualizationPage<TrendPoint>> {
        warn_if_unindexed(req.metric);
        let bucket = truncate_sql(req.interval);
        let metric = req.metric.as_str();

        let mut query = TweetQuery::select([
            format!("{} AS date", bucket),
            format!("{} AS value", metric),
            "COUNT(*) AS count".to_string(),
        ])
        .filter(Predicate::NotNull(TweetColumn::Datetime));
        for predicate in range_predicates(req.start, req.end) {
            query = query.filter(predicate);
        }

        let conn = self.conn()?;
        let page = query
            .group_by(bucket)
            .group_by(metric)
            .order_by("date", Direction::Asc)
            .order_by("value", Direction::Asc)
            .fetch_page(&conn, req.pagination, |row| {
                Ok(TrendPoint {
                    date: row.get(0)?,
                    value: value_to_json(row.get::<_, Value>(1)?),
                    count: row.get(2)?,
                })
            })?;

        Ok(VisualizationPage {
            total_results: page.total,
            page: req.pagination.page(),
            page_size: req.pagination.page_size(),
            data: page.rows,
        })
    }

    pub fn tweet_distribution(
        &self,
        req: &DistributionRequest,
    ) -> ApiResult<VisualizationPage<DistributionBucket>> {
        warn_if_unindexed(req.category);
        log::debug!(
            "distribution of {} over {} (top {:?})",
            req.metric,
            req.category,
            req.top_n
        );
        let category = req.category.as_str();

        let conn = self.conn()?;
        let page = TweetQuery::select([
            format!("{} AS category", category),
            "COUNT(*) AS value".to_string(),
        ])
        .group_by(category)
        .order_by("value", Direction::Desc)
        .order_by("category", Direction::Asc)
        .top(req.top_n)
        .fetch_page(&conn, req.pagination, |row| {
            Ok(DistributionBucket {
                category: value_to_json(row.get::<_, Value>(0)?),
                value: row.get(1)?,
            })
        })?;

        Ok(VisualizationPage {
            total_results: page.total,
            page: req.pagination.page(),
            page_size: req.pagination.page_size(),
            data: page.rows,
        })
    }

    pub fn tweet_heatmap(&self, req: &HeatmapRequest) -> ApiResult<Heatmap> {
        let mut query = TweetQuery::select(["year", "month", "day"]);
        for predicate in range_predicates(Some(req.start), Some(req.end)) {
            query = query.filter(predicate);
        }
        let query = query
            .filter_opt(req.threat_level.map(|level| {
                Predicate::Eq(TweetColumn::ThreatLevel, Value::Text(level.as_str().to_string()))
            }))
            .group_by("year")
            .group_by("month")
            .group_by("day")
            .order_by("year", Direction::Asc)
            .order_by("month", Direction::Asc)
            .order_by("day", Direction::Asc);

        let conn = self.conn()?;
        let groups: Vec<(Option<i64>, Option<i64>, Option<i64>)> =
            query.fetch_all(&conn, |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        build_heatmap(&groups)
    }
}

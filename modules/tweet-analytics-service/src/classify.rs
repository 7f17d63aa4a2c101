//! Content-type classification over `threat_level` and `hateful`.
//!
//! Each label maps to the set of levels it admits per column. The same
//! sets drive both the SQL predicate and the in-memory check, so the two
//! cannot drift apart.

use crate::error::{ApiError, ApiResult};
use tweet_analytics_types::{ContentType, Level};

const ELEVATED: &[Option<Level>] = &[Some(Level::Medium), Some(Level::High)];
const CALM: &[Option<Level>] = &[None, Some(Level::Low)];

/// Admitted levels per column; `None` leaves the column unconstrained.
#[derive(Debug, Clone, Copy)]
pub struct ContentRule {
    pub threat_level: Option<&'static [Option<Level>]>,
    pub hateful: Option<&'static [Option<Level>]>,
}

pub fn rule(content_type: ContentType) -> ContentRule {
    match content_type {
        ContentType::Threatening => ContentRule {
            threat_level: Some(ELEVATED),
            hateful: None,
        },
        ContentType::NonThreatening => ContentRule {
            threat_level: Some(CALM),
            hateful: None,
        },
        ContentType::Hateful => ContentRule {
            threat_level: None,
            hateful: Some(ELEVATED),
        },
        ContentType::Neutral => ContentRule {
            threat_level: Some(CALM),
            hateful: Some(CALM),
        },
    }
}

impl ContentRule {
    pub fn matches(&self, threat_level: Option<Level>, hateful: Option<Level>) -> bool {
        let admits = |allowed: Option<&[Option<Level>]>, value: Option<Level>| {
            allowed.is_none_or(|set| set.contains(&value))
        };
        admits(self.threat_level, threat_level) && admits(self.hateful, hateful)
    }

    /// SQL boolean expression equivalent to `matches`. Only enum literals are
    /// inlined, never caller text.
    pub fn to_sql(&self) -> String {
        let parts: Vec<String> = [("threat_level", self.threat_level), ("hateful", self.hateful)]
            .into_iter()
            .filter_map(|(column, allowed)| allowed.map(|set| column_sql(column, set)))
            .collect();
        if parts.is_empty() {
            "1=1".to_string()
        } else {
            parts.join(" AND ")
        }
    }
}

fn column_sql(column: &str, allowed: &[Option<Level>]) -> String {
    let levels: Vec<String> = allowed
        .iter()
        .flatten()
        .map(|l| format!("'{}'", l.as_str()))
        .collect();
    let in_list = format!("{} IN ({})", column, levels.join(", "));
    if allowed.contains(&None) {
        format!("({} IS NULL OR {})", column, in_list)
    } else {
        in_list
    }
}

/// Validate an optional content-type label supplied under `field`.
pub fn parse_content_type(field: &str, raw: Option<&str>) -> ApiResult<Option<ContentType>> {
    ContentType::parse_filter(raw).map_err(|e| {
        ApiError::invalid(
            field,
            format!(
                "'{}' is not a content type (expected one of: threatening, non_threatening, hateful, neutral)",
                e.name
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_level_pairs() -> Vec<(Option<Level>, Option<Level>)> {
        let values: Vec<Option<Level>> = std::iter::once(None)
            .chain(Level::ALL.into_iter().map(Some))
            .collect();
        values
            .iter()
            .flat_map(|t| values.iter().map(move |h| (*t, *h)))
            .collect()
    }

    #[test]
    fn test_threatening_and_non_threatening_partition() {
        let threatening = rule(ContentType::Threatening);
        let calm = rule(ContentType::NonThreatening);
        for (t, h) in all_level_pairs() {
            assert_ne!(
                threatening.matches(t, h),
                calm.matches(t, h),
                "threat={:?} hateful={:?} must land in exactly one side",
                t,
                h
            );
        }
    }

    #[test]
    fn test_neutral_is_subset_of_non_threatening() {
        let neutral = rule(ContentType::Neutral);
        let calm = rule(ContentType::NonThreatening);
        for (t, h) in all_level_pairs() {
            if neutral.matches(t, h) {
                assert!(calm.matches(t, h));
            }
        }
        assert!(!neutral.matches(None, Some(Level::High)));
        assert!(neutral.matches(Some(Level::Low), None));
    }

    #[test]
    fn test_hateful_ignores_threat_level() {
        let hateful = rule(ContentType::Hateful);
        assert!(hateful.matches(None, Some(Level::Medium)));
        assert!(hateful.matches(Some(Level::High), Some(Level::High)));
        assert!(!hateful.matches(Some(Level::High), Some(Level::Low)));
        assert!(!hateful.matches(Some(Level::High), None));
    }

    #[test]
    fn test_sql_rendering() {
        assert_eq!(
            rule(ContentType::Threatening).to_sql(),
            "threat_level IN ('Medium', 'High')"
        );
        assert_eq!(
            rule(ContentType::Neutral).to_sql(),
            "(threat_level IS NULL OR threat_level IN ('Low')) AND (hateful IS NULL OR hateful IN ('Low'))"
        );
    }

    #[test]
    fn test_sql_agrees_with_matches() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        for ct in ContentType::ALL {
            let r = rule(ct);
            for (t, h) in all_level_pairs() {
                let sql = format!(
                    "SELECT CASE WHEN {} THEN 1 ELSE 0 END FROM (SELECT ?1 AS threat_level, ?2 AS hateful)",
                    r.to_sql()
                );
                let hit: i64 = conn
                    .query_row(
                        &sql,
                        rusqlite::params![t.map(Level::as_str), h.map(Level::as_str)],
                        |row| row.get(0),
                    )
                    .unwrap();
                assert_eq!(hit == 1, r.matches(t, h), "{:?} {:?} {:?}", ct, t, h);
            }
        }
    }

    #[test]
    fn test_unknown_label_is_invalid_argument() {
        match parse_content_type("criteria", Some("bogus")) {
            Err(ApiError::InvalidArgument { field, .. }) => assert_eq!(field, "criteria"),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(parse_content_type("content_type", Some("all")).unwrap(), None);
    }
}

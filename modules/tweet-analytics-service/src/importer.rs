//! CSV bulk import into the `tweets` table.
//!
//! The whole file is parsed and validated before anything is written, then
//! inserted in a single transaction with duplicate ids ignored. A bad row
//! aborts the run with nothing committed.

use crate::db::{Db, DbError};
use crate::timeparse::{format_timestamp, parse_timestamp};
use chrono::{Datelike, NaiveDateTime, Timelike};
use csv::StringRecord;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tweet_analytics_types::{ImportSummary, Level, Tweet, TweetColumn};

const PROGRESS_EVERY: usize = 10_000;

/// Spellings of a missing value produced by common CSV exporters.
const NULL_TOKENS: &[&str] = &["", "None", "none", "nan", "NaN", "null", "NULL"];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV header has no '{0}' column")]
    MissingColumn(&'static str),

    #[error("line {line}, column '{column}': {message}")]
    Data {
        line: u64,
        column: &'static str,
        message: String,
    },

    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),
}

impl From<DbError> for ImportError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Pool(e) => ImportError::Pool(e),
            DbError::Sqlite(e) => ImportError::Database(e),
        }
    }
}

type ImportResult<T> = Result<T, ImportError>;

/// Import `path` into `db`. Re-importing the same file inserts nothing.
pub fn import_csv(db: &Db, path: &Path) -> ImportResult<ImportSummary> {
    let file = File::open(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Importing tweets from {}", path.display());

    let tweets = read_tweets(file)?;
    let inserted = db.insert_tweets(&tweets)?;

    let summary = ImportSummary {
        rows_read: tweets.len(),
        inserted,
        skipped_duplicates: tweets.len() - inserted,
    };
    log::info!(
        "Import finished: {} rows read, {} inserted, {} duplicates skipped",
        summary.rows_read,
        summary.inserted,
        summary.skipped_duplicates
    );
    Ok(summary)
}

/// Parse and validate every row without touching the database.
pub fn read_tweets<R: Read>(input: R) -> ImportResult<Vec<Tweet>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(input);

    let positions = header_positions(reader.headers()?)?;
    let mut tweets = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = CsvRow {
            record: &record,
            positions: &positions,
            line: record.position().map(|p| p.line()).unwrap_or(0),
        };
        tweets.push(row.to_tweet()?);
        if tweets.len() % PROGRESS_EVERY == 0 {
            log::info!("Parsed {} rows", tweets.len());
        }
    }
    Ok(tweets)
}

fn header_positions(headers: &StringRecord) -> ImportResult<HashMap<TweetColumn, usize>> {
    TweetColumn::ALL
        .iter()
        .map(|&col| {
            headers
                .iter()
                .position(|h| h.trim() == col.as_str())
                .map(|idx| (col, idx))
                .ok_or(ImportError::MissingColumn(col.as_str()))
        })
        .collect()
}

/// Fill whichever denormalized date parts are missing from `ts`.
pub(crate) fn fill_date_parts(t: &mut Tweet, ts: NaiveDateTime) {
    fn fill<T>(slot: &mut Option<T>, value: impl FnOnce() -> T) {
        if slot.is_none() {
            *slot = Some(value());
        }
    }
    fill(&mut t.year, || i64::from(ts.year()));
    fill(&mut t.month, || i64::from(ts.month()));
    fill(&mut t.day, || i64::from(ts.day()));
    fill(&mut t.minute, || i64::from(ts.minute()));
    fill(&mut t.second, || i64::from(ts.second()));
    fill(&mut t.year_month, || ts.format("%Y-%m").to_string());
    fill(&mut t.year_month_day, || ts.format("%Y-%m-%d").to_string());
}

struct CsvRow<'a> {
    record: &'a StringRecord,
    positions: &'a HashMap<TweetColumn, usize>,
    line: u64,
}

impl CsvRow<'_> {
    fn error(&self, col: TweetColumn, message: impl Into<String>) -> ImportError {
        ImportError::Data {
            line: self.line,
            column: col.as_str(),
            message: message.into(),
        }
    }

    /// Trimmed cell, `None` for any null spelling.
    fn raw(&self, col: TweetColumn) -> Option<&str> {
        let cell = self
            .positions
            .get(&col)
            .and_then(|&idx| self.record.get(idx))
            .map(str::trim)?;
        (!NULL_TOKENS.contains(&cell)).then_some(cell)
    }

    fn text(&self, col: TweetColumn) -> Option<String> {
        self.raw(col).map(str::to_string)
    }

    /// Integers, also accepting the `3.0` form float-typed exports write.
    fn int(&self, col: TweetColumn) -> ImportResult<Option<i64>> {
        let Some(raw) = self.raw(col) else {
            return Ok(None);
        };
        if let Ok(n) = raw.parse::<i64>() {
            return Ok(Some(n));
        }
        match raw.parse::<f64>() {
            Ok(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(f as i64)),
            _ => Err(self.error(col, format!("'{}' is not an integer", raw))),
        }
    }

    fn bool(&self, col: TweetColumn) -> ImportResult<Option<bool>> {
        match self.raw(col) {
            None => Ok(None),
            Some("True" | "true" | "TRUE" | "1") => Ok(Some(true)),
            Some("False" | "false" | "FALSE" | "0") => Ok(Some(false)),
            Some(other) => Err(self.error(col, format!("'{}' is not a boolean", other))),
        }
    }

    /// Levels are case-insensitive; legacy boolean cells map True to High
    /// and False to Low.
    fn level(&self, col: TweetColumn) -> ImportResult<Option<Level>> {
        match self.raw(col) {
            None => Ok(None),
            Some("True" | "true" | "TRUE") => Ok(Some(Level::High)),
            Some("False" | "false" | "FALSE") => Ok(Some(Level::Low)),
            Some(other) => other.parse().map(Some).map_err(|_| {
                self.error(col, format!("'{}' is not one of Low, Medium, High", other))
            }),
        }
    }

    fn timestamp(&self, col: TweetColumn) -> ImportResult<Option<NaiveDateTime>> {
        self.raw(col)
            .map(|raw| {
                parse_timestamp(raw)
                    .ok_or_else(|| self.error(col, format!("'{}' is not a timestamp", raw)))
            })
            .transpose()
    }

    fn to_tweet(&self) -> ImportResult<Tweet> {
        use TweetColumn as C;

        let id = self
            .int(C::Id)?
            .ok_or_else(|| self.error(C::Id, "id is required"))?;
        let datetime = self.timestamp(C::Datetime)?;

        let mut tweet = Tweet {
            id,
            author: self.text(C::Author),
            author_created_utc: self.timestamp(C::AuthorCreatedUtc)?.map(format_timestamp),
            clean_text: self.text(C::CleanText),
            created_at: self.timestamp(C::CreatedAt)?.map(format_timestamp),
            datetime: datetime.map(format_timestamp),
            day: self.int(C::Day)?,
            follower_count: self.int(C::FollowerCount)?,
            full_text: self.text(C::FullText),
            hateful: self.level(C::Hateful)?,
            lang: self.text(C::Lang),
            len_filter: self.bool(C::LenFilter)?,
            minute: self.int(C::Minute)?,
            month: self.int(C::Month)?,
            reply_count: self.int(C::ReplyCount)?,
            retweet_count: self.int(C::RetweetCount)?,
            retweeted: self.bool(C::Retweeted)?,
            second: self.int(C::Second)?,
            text: self.text(C::Text),
            threat_level: self.level(C::ThreatLevel)?,
            year: self.int(C::Year)?,
            year_month: self.text(C::YearMonth),
            year_month_day: self.text(C::YearMonthDay),
            zip: self.int(C::Zip)?,
        };

        if let Some(ts) = datetime {
            let mut derived = Tweet::default();
            fill_date_parts(&mut derived, ts);
            let int = |v: Option<i64>| v.map(|v| v.to_string());
            let parts = [
                (C::Year, int(tweet.year), int(derived.year)),
                (C::Month, int(tweet.month), int(derived.month)),
                (C::Day, int(tweet.day), int(derived.day)),
                (C::Minute, int(tweet.minute), int(derived.minute)),
                (C::Second, int(tweet.second), int(derived.second)),
                (C::YearMonth, tweet.year_month.clone(), derived.year_month),
                (C::YearMonthDay, tweet.year_month_day.clone(), derived.year_month_day),
            ];
            for (col, stored, expected) in parts {
                if let (Some(stored), Some(expected)) = (stored, expected) {
                    if stored != expected {
                        return Err(self.error(
                            col,
                            format!(
                                "{} disagrees with datetime {} (expected {})",
                                stored,
                                format_timestamp(ts),
                                expected
                            ),
                        ));
                    }
                }
            }
            fill_date_parts(&mut tweet, ts);
        }

        if let Some(month) = tweet.month.filter(|m| !(1..=12).contains(m)) {
            return Err(self.error(C::Month, format!("{} is outside 1..=12", month)));
        }
        if let Some(day) = tweet.day.filter(|d| !(1..=31).contains(d)) {
            return Err(self.error(C::Day, format!("{} is outside 1..=31", day)));
        }
        Ok(tweet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn header() -> String {
        TweetColumn::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// A CSV line with the given cells set and every other cell empty.
    fn line(cells: &[(TweetColumn, &str)]) -> String {
        TweetColumn::ALL
            .iter()
            .map(|col| {
                cells
                    .iter()
                    .find(|(c, _)| c == col)
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn csv_file(lines: &[String]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", header()).unwrap();
        for l in lines {
            writeln!(file, "{}", l).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn sample_rows() -> Vec<String> {
        use TweetColumn as C;
        vec![
            line(&[
                (C::Id, "1"),
                (C::Author, "alice"),
                (C::Datetime, "2023-01-01 10:00:00"),
                (C::ThreatLevel, "High"),
                (C::Retweeted, "False"),
            ]),
            line(&[
                (C::Id, "2"),
                (C::Author, "bob"),
                (C::Datetime, "2023-01-02T11:30:15"),
                (C::Hateful, "True"),
            ]),
            line(&[
                (C::Id, "3"),
                (C::Author, "carol"),
                (C::Datetime, "Sun Jan 01 12:00:00 +0000 2023"),
                (C::Year, "2023"),
                (C::FollowerCount, "42.0"),
            ]),
        ]
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let db = Db::open_in_memory().unwrap();
        let file = csv_file(&sample_rows());

        let first = import_csv(&db, file.path()).unwrap();
        assert_eq!(
            first,
            ImportSummary {
                rows_read: 3,
                inserted: 3,
                skipped_duplicates: 0
            }
        );

        let second = import_csv(&db, file.path()).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_duplicates, 3);
        assert_eq!(db.count_tweets().unwrap(), 3);
    }

    #[test]
    fn test_values_are_coerced_and_parts_derived() {
        let tweets = read_tweets(csv_file(&sample_rows()).reopen().unwrap()).unwrap();

        let alice = &tweets[0];
        assert_eq!(alice.threat_level, Some(Level::High));
        assert_eq!(alice.retweeted, Some(false));
        assert_eq!(alice.len_filter, None);
        assert_eq!(alice.year, Some(2023));
        assert_eq!(alice.month, Some(1));
        assert_eq!(alice.day, Some(1));
        assert_eq!(alice.year_month.as_deref(), Some("2023-01"));
        assert_eq!(alice.year_month_day.as_deref(), Some("2023-01-01"));

        let bob = &tweets[1];
        assert_eq!(bob.hateful, Some(Level::High));
        assert_eq!(bob.datetime.as_deref(), Some("2023-01-02 11:30:15"));
        assert_eq!(bob.minute, Some(30));
        assert_eq!(bob.second, Some(15));

        let carol = &tweets[2];
        assert_eq!(carol.datetime.as_deref(), Some("2023-01-01 12:00:00"));
        assert_eq!(carol.follower_count, Some(42));
        assert_eq!(carol.author.as_deref(), Some("carol"));
    }

    #[test]
    fn test_bad_boolean_aborts_whole_import() {
        use TweetColumn as C;
        let db = Db::open_in_memory().unwrap();
        let mut rows = sample_rows();
        rows.push(line(&[(C::Id, "4"), (C::Retweeted, "maybe")]));
        let file = csv_file(&rows);

        match import_csv(&db, file.path()) {
            Err(ImportError::Data { line, column, .. }) => {
                assert_eq!(line, 5);
                assert_eq!(column, "retweeted");
            }
            other => panic!("expected data error, got {:?}", other),
        }
        assert_eq!(db.count_tweets().unwrap(), 0);
    }

    #[test]
    fn test_missing_column_fails_before_insert() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,author,datetime").unwrap();
        writeln!(file, "1,alice,2023-01-01").unwrap();

        let db = Db::open_in_memory().unwrap();
        let err = import_csv(&db, file.path()).unwrap_err();
        assert!(
            matches!(err, ImportError::MissingColumn("author_created_utc")),
            "{:?}",
            err
        );
        assert_eq!(db.count_tweets().unwrap(), 0);
    }

    #[test]
    fn test_inconsistent_date_parts_rejected() {
        use TweetColumn as C;
        let rows = vec![line(&[
            (C::Id, "1"),
            (C::Datetime, "2023-03-04 05:06:07"),
            (C::Month, "4"),
        ])];
        let err = read_tweets(csv_file(&rows).reopen().unwrap()).unwrap_err();
        assert!(matches!(err, ImportError::Data { column: "month", .. }), "{:?}", err);

        for (col, value) in [
            (C::Minute, "59"),
            (C::Second, "8"),
            (C::YearMonth, "1999-12"),
            (C::YearMonthDay, "1999-12-31"),
        ] {
            let rows = vec![line(&[
                (C::Id, "1"),
                (C::Datetime, "2023-03-04 05:06:07"),
                (col, value),
            ])];
            match read_tweets(csv_file(&rows).reopen().unwrap()) {
                Err(ImportError::Data { column, .. }) => assert_eq!(column, col.as_str()),
                other => panic!("{} = {} should be rejected, got {:?}", col, value, other),
            }
        }

        // Parts that agree with datetime are kept as given.
        let rows = vec![line(&[
            (C::Id, "1"),
            (C::Datetime, "2023-03-04 05:06:07"),
            (C::Minute, "6"),
            (C::Second, "7"),
            (C::YearMonth, "2023-03"),
            (C::YearMonthDay, "2023-03-04"),
        ])];
        let tweets = read_tweets(csv_file(&rows).reopen().unwrap()).unwrap();
        assert_eq!(tweets[0].year_month_day.as_deref(), Some("2023-03-04"));
        assert_eq!(tweets[0].minute, Some(6));

        let rows = vec![line(&[(C::Id, "1"), (C::Day, "32")])];
        let err = read_tweets(csv_file(&rows).reopen().unwrap()).unwrap_err();
        assert!(matches!(err, ImportError::Data { column: "day", .. }), "{:?}", err);
    }

    #[test]
    fn test_invalid_level_and_missing_id() {
        use TweetColumn as C;
        let rows = vec![line(&[(C::Id, "1"), (C::ThreatLevel, "Severe")])];
        let err = read_tweets(csv_file(&rows).reopen().unwrap()).unwrap_err();
        assert!(matches!(err, ImportError::Data { column: "threat_level", .. }));

        let rows = vec![line(&[(C::Author, "nobody")])];
        let err = read_tweets(csv_file(&rows).reopen().unwrap()).unwrap_err();
        assert!(matches!(err, ImportError::Data { column: "id", .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let db = Db::open_in_memory().unwrap();
        let err = import_csv(&db, Path::new("/nonexistent/tweets.csv")).unwrap_err();
        assert!(matches!(err, ImportError::Io { .. }));
    }
}

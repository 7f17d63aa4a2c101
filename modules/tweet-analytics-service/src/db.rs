//! SQLite connection pool and the `tweets` table.

use crate::config::Config;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{Connection, Result as SqliteResult};
use tweet_analytics_types::{Level, Tweet, TweetColumn};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Column list in `SELECT` order; `row_to_tweet` reads by these positions.
pub const TWEET_COLUMNS: &str = "id, author, author_created_utc, clean_text, created_at, datetime,
    day, follower_count, full_text, hateful, lang, len_filter, minute, month, reply_count,
    retweet_count, retweeted, second, text, threat_level, year, year_month, year_month_day, zip";

const CREATE_TWEETS_TABLE: &str = "CREATE TABLE IF NOT EXISTS tweets (
    id INTEGER PRIMARY KEY,
    author TEXT,
    author_created_utc TEXT,
    clean_text TEXT,
    created_at TEXT,
    datetime TEXT,
    day INTEGER,
    follower_count INTEGER,
    full_text TEXT,
    hateful TEXT CHECK (hateful IN ('Low', 'Medium', 'High')),
    lang TEXT,
    len_filter INTEGER,
    minute INTEGER,
    month INTEGER,
    reply_count INTEGER,
    retweet_count INTEGER,
    retweeted INTEGER,
    second INTEGER,
    text TEXT,
    threat_level TEXT CHECK (threat_level IN ('Low', 'Medium', 'High')),
    year INTEGER,
    year_month TEXT,
    year_month_day TEXT,
    zip INTEGER
)";

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Clone)]
pub struct Db {
    pool: DbPool,
}

impl Db {
    pub fn open_with(config: &Config) -> Result<Self, DbError> {
        Self::open(&config.database_url, config.pool_size)
    }

    /// Open (creating if needed) the database at `path`. `:memory:` yields a
    /// single long-lived connection so every checkout sees the same data.
    pub fn open(path: &str, pool_size: u32) -> Result<Self, DbError> {
        let init = |conn: &mut Connection| {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
        };
        let pool = if path == ":memory:" {
            Pool::builder()
                .max_size(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .build(SqliteConnectionManager::memory().with_init(init))?
        } else {
            Pool::builder()
                .max_size(pool_size.max(1))
                .build(SqliteConnectionManager::file(path).with_init(init))?
        };

        let db = Self { pool };
        let conn = db.conn()?;
        create_tables(&conn)?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::open(":memory:", 1)
    }

    /// Check out a pooled connection; it returns to the pool on drop.
    pub fn conn(&self) -> Result<DbConn, DbError> {
        Ok(self.pool.get()?)
    }

    pub fn count_tweets(&self) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM tweets", [], |row| row.get(0))?)
    }

    /// Insert rows in one transaction, ignoring ids that already exist.
    /// Returns the number of rows actually written.
    pub fn insert_tweets(&self, tweets: &[Tweet]) -> Result<usize, DbError> {
        let mut conn = self.conn()?;
        Ok(insert_tweets(&mut conn, tweets)?)
    }
}

pub fn create_tables(conn: &Connection) -> SqliteResult<()> {
    conn.execute(CREATE_TWEETS_TABLE, [])?;
    for column in TweetColumn::ALL {
        if column == TweetColumn::Id || !column.is_indexed() {
            continue;
        }
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_tweets_{col} ON tweets({col})",
                col = column.as_str()
            ),
            [],
        )?;
    }
    Ok(())
}

pub fn insert_tweets(conn: &mut Connection, tweets: &[Tweet]) -> SqliteResult<usize> {
    let tx = conn.transaction()?;
    let mut inserted = 0;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT OR IGNORE INTO tweets ({}) VALUES
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
              ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
            TWEET_COLUMNS
        ))?;
        for t in tweets {
            inserted += stmt.execute(rusqlite::params![
                t.id,
                t.author,
                t.author_created_utc,
                t.clean_text,
                t.created_at,
                t.datetime,
                t.day,
                t.follower_count,
                t.full_text,
                t.hateful.map(Level::as_str),
                t.lang,
                t.len_filter,
                t.minute,
                t.month,
                t.reply_count,
                t.retweet_count,
                t.retweeted,
                t.second,
                t.text,
                t.threat_level.map(Level::as_str),
                t.year,
                t.year_month,
                t.year_month_day,
                t.zip,
            ])?;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

fn level_at(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<Level>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

pub fn row_to_tweet(row: &rusqlite::Row) -> rusqlite::Result<Tweet> {
    Ok(Tweet {
        id: row.get(0)?,
        author: row.get(1)?,
        author_created_utc: row.get(2)?,
        clean_text: row.get(3)?,
        created_at: row.get(4)?,
        datetime: row.get(5)?,
        day: row.get(6)?,
        follower_count: row.get(7)?,
        full_text: row.get(8)?,
        hateful: level_at(row, 9)?,
        lang: row.get(10)?,
        len_filter: row.get(11)?,
        minute: row.get(12)?,
        month: row.get(13)?,
        reply_count: row.get(14)?,
        retweet_count: row.get(15)?,
        retweeted: row.get(16)?,
        second: row.get(17)?,
        text: row.get(18)?,
        threat_level: level_at(row, 19)?,
        year: row.get(20)?,
        year_month: row.get(21)?,
        year_month_day: row.get(22)?,
        zip: row.get(23)?,
    })
}

/// JSON rendering of an arbitrary column value.
pub fn value_to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => i.into(),
        Value::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => s.into(),
        Value::Blob(b) => serde_json::Value::Array(b.into_iter().map(Into::into).collect()),
    }
}

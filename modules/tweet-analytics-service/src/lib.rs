//! Tweet analytics over a single SQLite `tweets` table: paginated
//! analytics, filtering and visualization queries served over HTTP, plus
//! the CSV importer that loads the table.

pub mod analytics;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod filtering;
pub mod importer;
pub mod query;
pub mod rate_limit;
pub mod routes;
pub mod timeparse;
pub mod visualization;

//! Service configuration read from the environment.

use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub database_url: String,
    pub pool_size: u32,
    pub rate_limit_per_minute: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 9103,
            database_url: "./tweets.db".to_string(),
            pool_size: 8,
            rate_limit_per_minute: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env::var("TWEET_ANALYTICS_BIND").unwrap_or(defaults.bind_addr),
            port: parse_var("TWEET_ANALYTICS_PORT", defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            pool_size: parse_var("DATABASE_POOL_SIZE", defaults.pool_size).max(1),
            rate_limit_per_minute: parse_var("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("{}={:?} is not valid, using {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

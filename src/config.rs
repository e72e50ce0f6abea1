//! Environment-sourced configuration. Store DSN parts, bind address, feed
//! dial address, and the fixed symbol universe — no other runtime flags,
//! per spec.

use crate::domain::Symbol;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: String,
    pub db_name: String,
}

impl PostgresConfig {
    pub fn dsn(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.db_name
        )
    }
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub postgres: PostgresConfig,
    pub bind_addr: String,
    pub feed_addr: String,
    pub symbols: Vec<Symbol>,
    pub log_level: String,
    pub store_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            postgres: PostgresConfig {
                user: "postgres".to_string(),
                password: "postgres".to_string(),
                host: "localhost".to_string(),
                port: "5432".to_string(),
                db_name: "broker".to_string(),
            },
            bind_addr: "0.0.0.0:11000".to_string(),
            feed_addr: "http://localhost:10000".to_string(),
            symbols: Vec::new(),
            log_level: "info".to_string(),
            store_timeout: Duration::from_millis(1000),
        }
    }
}

impl BrokerConfig {
    /// Load configuration from the process environment, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = BrokerConfig::default();

        if let Ok(v) = std::env::var("POSTGRES_USER") {
            config.postgres.user = v;
        }
        if let Ok(v) = std::env::var("POSTGRES_PASSWORD") {
            config.postgres.password = v;
        }
        if let Ok(v) = std::env::var("POSTGRES_HOST") {
            config.postgres.host = v;
        }
        if let Ok(v) = std::env::var("POSTGRES_PORT") {
            config.postgres.port = v;
        }
        if let Ok(v) = std::env::var("POSTGRES_DB") {
            config.postgres.db_name = v;
        }
        if let Ok(v) = std::env::var("BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Ok(v) = std::env::var("FEED_ADDR") {
            config.feed_addr = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Ok(v) = std::env::var("STORE_TIMEOUT_MS") {
            let millis: u64 = v
                .parse()
                .map_err(|_| anyhow::anyhow!("STORE_TIMEOUT_MS must be an integer, got {v}"))?;
            config.store_timeout = Duration::from_millis(millis);
        }
        if let Ok(v) = std::env::var("SYMBOLS") {
            config.symbols = parse_symbols(&v)?;
        }

        Ok(config)
    }
}

/// Parses `SYMBOLS="1:AAPL,2:MSFT"` into the fixed symbol universe.
fn parse_symbols(raw: &str) -> anyhow::Result<Vec<Symbol>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, title) = entry
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("invalid SYMBOLS entry: {entry}"))?;
            let id: i32 = id
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid symbol id in: {entry}"))?;
            Ok(Symbol {
                id,
                title: title.trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_symbol_list() {
        let symbols = parse_symbols("1:AAPL, 2:MSFT").unwrap();
        assert_eq!(
            symbols,
            vec![
                Symbol { id: 1, title: "AAPL".into() },
                Symbol { id: 2, title: "MSFT".into() },
            ]
        );
    }

    #[test]
    fn rejects_malformed_entry() {
        assert!(parse_symbols("1-AAPL").is_err());
    }

    #[test]
    fn dsn_formats_postgres_url() {
        let pg = PostgresConfig {
            user: "u".into(),
            password: "p".into(),
            host: "h".into(),
            port: "5432".into(),
            db_name: "d".into(),
        };
        assert_eq!(pg.dsn(), "postgres://u:p@h:5432/d");
    }
}

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::poller::orchestrator::DEFAULT_NOTIFICATION_URL;
use crate::poller::PollSettings;

/// Watches football matches on OpenLigaDB and notifies on goals and status changes
#[derive(Parser, Debug, Clone)]
#[command(name = "matchday-notifier", version, about)]
pub struct Config {
    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "matchday.db")]
    pub database_path: String,

    /// Command API listen address
    #[arg(long, env = "API_ADDR", default_value = "127.0.0.1:8080")]
    pub api_addr: String,

    /// OpenLigaDB API base URL
    #[arg(
        long,
        env = "OPENLIGADB_URL",
        default_value = "https://api.openligadb.de"
    )]
    pub openligadb_url: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "10")]
    pub http_timeout_secs: u64,

    /// First retry delay after a failed poll; doubles per consecutive failure
    #[arg(long, env = "BACKOFF_BASE_SECS", default_value = "30")]
    pub backoff_base_secs: u64,

    /// Consecutive failed polls after which polling stops
    #[arg(long, env = "MAX_CONSECUTIVE_ERRORS", default_value = "5")]
    pub max_consecutive_errors: u32,

    /// Shortest delay the poll timer is ever armed with
    #[arg(long, env = "MIN_POLL_INTERVAL_SECS", default_value = "30")]
    pub min_poll_interval_secs: u64,

    /// Page opened when a notification is clicked
    #[arg(long, env = "NOTIFICATION_URL", default_value = DEFAULT_NOTIFICATION_URL)]
    pub notification_url: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!("api_addr must be a socket address, got {:?}", self.api_addr);
        }
        if url::Url::parse(&self.openligadb_url).is_err() {
            anyhow::bail!("openligadb_url is not a valid URL: {}", self.openligadb_url);
        }
        if url::Url::parse(&self.notification_url).is_err() {
            anyhow::bail!("notification_url is not a valid URL: {}", self.notification_url);
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be positive");
        }
        if self.backoff_base_secs == 0 {
            anyhow::bail!("backoff_base_secs must be positive");
        }
        if self.max_consecutive_errors == 0 {
            anyhow::bail!("max_consecutive_errors must be at least 1");
        }
        if self.min_poll_interval_secs == 0 {
            anyhow::bail!("min_poll_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            backoff_base: Duration::from_secs(self.backoff_base_secs),
            max_consecutive_errors: self.max_consecutive_errors,
            min_interval: Duration::from_secs(self.min_poll_interval_secs),
            notification_url: self.notification_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("matchday-notifier").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]);
        config.validate().unwrap();
        let settings = config.poll_settings();
        assert_eq!(settings.backoff_base, Duration::from_secs(30));
        assert_eq!(settings.max_consecutive_errors, 5);
        assert_eq!(settings.min_interval, Duration::from_secs(30));
        assert_eq!(settings.notification_url, "https://www.openligadb.de/");
    }

    #[test]
    fn rejects_zero_and_malformed_values() {
        assert!(parse(&["--max-consecutive-errors", "0"]).validate().is_err());
        assert!(parse(&["--backoff-base-secs", "0"]).validate().is_err());
        assert!(parse(&["--api-addr", "localhost"]).validate().is_err());
        assert!(parse(&["--openligadb-url", "not a url"]).validate().is_err());
    }
}

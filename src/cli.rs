//! Command-line interface parsing for blockscope
//!
//! Every flag can also be supplied through a `BLOCKSCOPE_*` environment
//! variable. [`StartupConfig::from_cli`] validates the raw values and turns
//! them into the settings the rest of the application is built from.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use reqwest::Url;
use thiserror::Error;

use crate::refresh::RefreshConfig;

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// The node URL could not be parsed
    #[error("Invalid node URL '{0}': {1}")]
    InvalidNodeUrl(String, String),

    /// The bind address could not be parsed
    #[error("Invalid bind address '{0}'. Expected HOST:PORT, e.g. 127.0.0.1:4000")]
    InvalidBindAddress(String),

    /// A setting that must be positive was zero
    #[error("Invalid value for --{0}: must be at least 1")]
    MustBePositive(&'static str),
}

/// blockscope - read-only block explorer backed by a base node
#[derive(Parser, Debug)]
#[command(name = "blockscope")]
#[command(about = "Read-only block explorer serving cached chain summaries")]
#[command(version)]
pub struct Cli {
    /// JSON-RPC endpoint of the base node
    #[arg(
        long,
        env = "BLOCKSCOPE_NODE_URL",
        default_value = "http://127.0.0.1:18142/json_rpc"
    )]
    pub node_url: String,

    /// Address the HTTP server listens on
    #[arg(long, env = "BLOCKSCOPE_BIND", default_value = "127.0.0.1:4000")]
    pub bind: String,

    /// Milliseconds between the end of one index refresh and the start of the next
    #[arg(long, env = "BLOCKSCOPE_UPDATE_INTERVAL_MS", default_value_t = 60_000)]
    pub update_interval_ms: u64,

    /// Fetch attempts per refresh, first attempt included
    #[arg(long, env = "BLOCKSCOPE_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// Milliseconds to wait between failed attempts of one refresh
    #[arg(long, env = "BLOCKSCOPE_RETRY_DELAY_MS", default_value_t = 5_000)]
    pub retry_delay_ms: u64,

    /// How many blocks below the tip the cached index starts
    #[arg(long, env = "BLOCKSCOPE_INDEX_OFFSET", default_value_t = 0)]
    pub index_offset: u64,

    /// Number of blocks in the cached index
    #[arg(long, env = "BLOCKSCOPE_INDEX_LIMIT", default_value_t = 20)]
    pub index_limit: u64,

    /// Milliseconds before a single node request is abandoned
    #[arg(long, env = "BLOCKSCOPE_RPC_TIMEOUT_MS", default_value_t = 10_000)]
    pub rpc_timeout_ms: u64,
}

/// Validated settings derived from CLI arguments for application startup
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub node_url: Url,
    pub bind: SocketAddr,
    pub refresh: RefreshConfig,
    pub rpc_timeout: Duration,
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with validated settings
    /// * `Err(CliError)` if any value is malformed or out of range
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let node_url = Url::parse(&cli.node_url)
            .map_err(|e| CliError::InvalidNodeUrl(cli.node_url.clone(), e.to_string()))?;
        let bind = cli
            .bind
            .parse::<SocketAddr>()
            .map_err(|_| CliError::InvalidBindAddress(cli.bind.clone()))?;

        if cli.update_interval_ms == 0 {
            return Err(CliError::MustBePositive("update-interval-ms"));
        }
        if cli.max_attempts == 0 {
            return Err(CliError::MustBePositive("max-attempts"));
        }
        if cli.index_limit == 0 {
            return Err(CliError::MustBePositive("index-limit"));
        }
        if cli.rpc_timeout_ms == 0 {
            return Err(CliError::MustBePositive("rpc-timeout-ms"));
        }

        Ok(StartupConfig {
            node_url,
            bind,
            refresh: RefreshConfig {
                update_interval: Duration::from_millis(cli.update_interval_ms),
                max_attempts: cli.max_attempts,
                retry_delay: Duration::from_millis(cli.retry_delay_ms),
                query_offset: cli.index_offset,
                query_limit: cli.index_limit,
            },
            rpc_timeout: Duration::from_millis(cli.rpc_timeout_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_args_uses_defaults() {
        let cli = Cli::parse_from(["blockscope"]);
        let config = StartupConfig::from_cli(&cli).unwrap();
        assert_eq!(config.refresh, RefreshConfig::default());
        assert_eq!(config.bind, "127.0.0.1:4000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.node_url.as_str(), "http://127.0.0.1:18142/json_rpc");
        assert_eq!(config.rpc_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_cli_parse_refresh_settings() {
        let cli = Cli::parse_from([
            "blockscope",
            "--update-interval-ms",
            "1000",
            "--max-attempts",
            "5",
            "--retry-delay-ms",
            "250",
            "--index-offset",
            "2",
            "--index-limit",
            "50",
        ]);
        let config = StartupConfig::from_cli(&cli).unwrap();
        assert_eq!(config.refresh.update_interval, Duration::from_secs(1));
        assert_eq!(config.refresh.max_attempts, 5);
        assert_eq!(config.refresh.retry_delay, Duration::from_millis(250));
        assert_eq!(config.refresh.query_offset, 2);
        assert_eq!(config.refresh.query_limit, 50);
    }

    #[test]
    fn test_startup_config_rejects_zero_attempts() {
        let cli = Cli::parse_from(["blockscope", "--max-attempts", "0"]);
        let err = StartupConfig::from_cli(&cli).unwrap_err();
        assert!(matches!(err, CliError::MustBePositive("max-attempts")));
        assert!(err.to_string().contains("--max-attempts"));
    }

    #[test]
    fn test_startup_config_rejects_zero_interval() {
        let cli = Cli::parse_from(["blockscope", "--update-interval-ms", "0"]);
        let err = StartupConfig::from_cli(&cli).unwrap_err();
        assert!(matches!(err, CliError::MustBePositive("update-interval-ms")));
    }

    #[test]
    fn test_startup_config_rejects_zero_limit() {
        let cli = Cli::parse_from(["blockscope", "--index-limit", "0"]);
        assert!(matches!(
            StartupConfig::from_cli(&cli),
            Err(CliError::MustBePositive("index-limit"))
        ));
    }

    #[test]
    fn test_startup_config_rejects_bad_url() {
        let cli = Cli::parse_from(["blockscope", "--node-url", "not a url"]);
        let err = StartupConfig::from_cli(&cli).unwrap_err();
        assert!(err.to_string().contains("Invalid node URL"));
    }

    #[test]
    fn test_startup_config_rejects_bad_bind() {
        let cli = Cli::parse_from(["blockscope", "--bind", "localhost"]);
        let err = StartupConfig::from_cli(&cli).unwrap_err();
        assert!(matches!(err, CliError::InvalidBindAddress(_)));
    }

    #[test]
    fn test_cli_rejects_non_numeric_interval() {
        let result = Cli::try_parse_from(["blockscope", "--update-interval-ms", "soon"]);
        assert!(result.is_err());
    }
}

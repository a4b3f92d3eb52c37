use core::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use ferroslot::{AlgorithmKind, CUSTOM_EPOCH, RegistryConfig};

/// Runtime configuration for the `ferroslot` binary.
///
/// Every value can come from a CLI flag, an environment variable, or a `.env`
/// file in the working directory, in that order of precedence.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ferroslot",
    version,
    about = "Issues slot-backed Snowflake-style IDs from an in-process worker registry"
)]
pub struct CliArgs {
    /// Business group the worker slot is registered under.
    ///
    /// A numeric suffix after the last `_` (e.g. `orders_12`) is the business
    /// flag used by the `flagged` algorithm. It must be within 0..=100.
    ///
    /// Environment variable: `FERROSLOT_GROUP`
    #[arg(long, env = "FERROSLOT_GROUP", default_value_t = String::from("default"))]
    pub group: String,

    /// Root namespace of the worker registry.
    ///
    /// Environment variable: `FERROSLOT_NAMESPACE`
    #[arg(long, env = "FERROSLOT_NAMESPACE", default_value_t = String::from("ferroslot"))]
    pub namespace: String,

    /// Comma-separated `host:port` list of the coordination service.
    ///
    /// Environment variable: `FERROSLOT_SERVER_LISTS`
    #[arg(long, env = "FERROSLOT_SERVER_LISTS", default_value_t = String::from("localhost:2181"))]
    pub server_lists: String,

    /// Initial retry back-off when connecting to the coordination service.
    ///
    /// Environment variable: `FERROSLOT_BASE_SLEEP_TIME_MS`
    #[arg(long, env = "FERROSLOT_BASE_SLEEP_TIME_MS", default_value_t = 1_000)]
    pub base_sleep_time_ms: u64,

    /// Upper bound of the retry back-off.
    ///
    /// Environment variable: `FERROSLOT_MAX_SLEEP_TIME_MS`
    #[arg(long, env = "FERROSLOT_MAX_SLEEP_TIME_MS", default_value_t = 3_000)]
    pub max_sleep_time_ms: u64,

    /// Connection attempts before giving up.
    ///
    /// Environment variable: `FERROSLOT_MAX_RETRIES`
    #[arg(long, env = "FERROSLOT_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Environment variable: `FERROSLOT_SESSION_TIMEOUT_MS`
    #[arg(long, env = "FERROSLOT_SESSION_TIMEOUT_MS", default_value_t = 60_000)]
    pub session_timeout_ms: u64,

    /// Environment variable: `FERROSLOT_CONNECTION_TIMEOUT_MS`
    #[arg(long, env = "FERROSLOT_CONNECTION_TIMEOUT_MS", default_value_t = 15_000)]
    pub connection_timeout_ms: u64,

    /// `user:password` digest credentials for the registry, if it requires
    /// them.
    ///
    /// Environment variable: `FERROSLOT_DIGEST`
    #[arg(long, env = "FERROSLOT_DIGEST")]
    pub digest: Option<String>,

    /// Encoding algorithm: `classic` (timestamp, worker, sequence) or
    /// `flagged` (counter offset by the business flag).
    ///
    /// Environment variable: `FERROSLOT_ALGORITHM`
    #[arg(long, env = "FERROSLOT_ALGORITHM", default_value_t = String::from("classic"))]
    pub algorithm: String,

    /// Number of IDs to print.
    ///
    /// Environment variable: `FERROSLOT_COUNT`
    #[arg(short = 'n', long, env = "FERROSLOT_COUNT", default_value_t = 1)]
    pub count: usize,

    /// Output format of each ID.
    ///
    /// Environment variable: `FERROSLOT_FORMAT`
    #[arg(long, env = "FERROSLOT_FORMAT", value_enum, default_value = "raw")]
    pub format: OutputFormat,

    /// Epoch of the timestamp field, in milliseconds since the Unix epoch.
    ///
    /// Environment variable: `FERROSLOT_EPOCH_MS`
    #[arg(long, env = "FERROSLOT_EPOCH_MS", default_value_t = CUSTOM_EPOCH.as_millis() as u64)]
    pub epoch_ms: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain integer.
    Raw,
    /// Decimal string.
    String,
    /// Zero-padded decimal string.
    Fixed,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub registry: RegistryConfig,
    pub algorithm: AlgorithmKind,
    pub count: usize,
    pub format: OutputFormat,
    pub epoch: Duration,
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.count == 0 {
            bail!("FERROSLOT_COUNT must be greater than 0");
        }

        let algorithm: AlgorithmKind = args
            .algorithm
            .parse()
            .with_context(|| format!("FERROSLOT_ALGORITHM ({}) is not supported", args.algorithm))?;

        let registry = RegistryConfig {
            server_lists: args.server_lists,
            namespace: args.namespace,
            group: args.group,
            base_sleep_time_ms: args.base_sleep_time_ms,
            max_sleep_time_ms: args.max_sleep_time_ms,
            max_retries: args.max_retries,
            session_timeout_ms: args.session_timeout_ms,
            connection_timeout_ms: args.connection_timeout_ms,
            digest: args.digest,
        };
        registry.validate().context("invalid registry configuration")?;

        Ok(Self {
            registry,
            algorithm,
            count: args.count,
            format: args.format,
            epoch: Duration::from_millis(args.epoch_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<CliConfig> {
        let args = CliArgs::try_parse_from(core::iter::once("ferroslot").chain(args.iter().copied()))?;
        CliConfig::try_from(args)
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.algorithm, AlgorithmKind::ClassicSnowflake);
        assert_eq!(config.count, 1);
        assert_eq!(config.format, OutputFormat::Raw);
        assert_eq!(config.epoch, CUSTOM_EPOCH);
        assert_eq!(config.registry.node_path().to_string(), "/ferroslot/default");
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--group",
            "orders_7",
            "--algorithm",
            "flagged",
            "-n",
            "5",
            "--format",
            "fixed",
        ])
        .unwrap();
        assert_eq!(config.algorithm, AlgorithmKind::FlaggedCounter);
        assert_eq!(config.registry.group, "orders_7");
        assert_eq!(config.count, 5);
        assert_eq!(config.format, OutputFormat::Fixed);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(parse(&["--count", "0"]).is_err());
        assert!(parse(&["--algorithm", "uuid"]).is_err());
        assert!(parse(&["--group", "orders_101"]).is_err());
        assert!(parse(&["--base-sleep-time-ms", "5000"]).is_err());
        assert!(parse(&["--format", "hex"]).is_err());
    }
}

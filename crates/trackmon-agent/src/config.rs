use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser};
use serde::Deserialize;

#[derive(Parser, Debug, Clone)]
#[command(name = "trackmon-agent", version, about = "host metrics collection agent")]
pub struct AgentArgs {
    /// Server address to report to
    #[arg(
        short = 'a',
        long = "address",
        env = "ADDRESS",
        default_value = "127.0.0.1:8080"
    )]
    pub address: String,

    /// Signing key for metric MACs (empty disables signing)
    #[arg(short = 'k', long, env = "KEY", default_value = "")]
    pub key: String,

    /// Report format; "json" switches to the JSON endpoints
    #[arg(short = 'f', long, env = "FORMAT", default_value = "")]
    pub format: String,

    /// Send all metrics in one batch request
    #[arg(
        short = 'b',
        long,
        env = "BATCH",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub batch: bool,

    /// Poll interval in seconds
    #[arg(short = 'p', long, env = "POLL_INTERVAL", default_value_t = 2)]
    pub poll_interval: u64,

    /// Report interval in seconds
    #[arg(short = 'r', long, env = "REPORT_INTERVAL", default_value_t = 10)]
    pub report_interval: u64,

    /// Path to the PEM-encoded RSA public key for request encryption
    #[arg(long, env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// Outbound transport
    #[arg(long, env = "TRANSPORT", default_value = "http")]
    pub transport: String,

    /// Address stamped into the X-Real-IP header
    #[arg(long, env = "SELF_ADDRESS", default_value = "127.0.0.1")]
    pub self_address: String,

    /// Enable debug logging
    #[arg(short = 'v', long, env = "VERBOSE")]
    pub verbose: bool,

    /// TOML config file supplying defaults for any of the above
    #[arg(short = 'c', long, env = "CONFIG")]
    pub config: Option<PathBuf>,
}

/// File-level counterpart of [`AgentArgs`]; every field optional.
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    pub address: Option<String>,
    pub key: Option<String>,
    pub format: Option<String>,
    pub batch: Option<bool>,
    pub poll_interval: Option<u64>,
    pub report_interval: Option<u64>,
    pub crypto_key: Option<PathBuf>,
    pub transport: Option<String>,
    pub self_address: Option<String>,
}

impl AgentArgs {
    /// Parses flags and environment, then lets a `--config` file fill in
    /// any value the command line left at its default. Precedence:
    /// flag/env over file over built-in default.
    pub fn load() -> anyhow::Result<Self> {
        let matches = <Self as CommandFactory>::command().get_matches();
        Self::from_matches(matches)
    }

    fn from_matches(matches: clap::ArgMatches) -> anyhow::Result<Self> {
        let mut args = Self::from_arg_matches(&matches)?;
        let Some(path) = args.config.clone() else {
            return Ok(args);
        };
        let file: AgentFileConfig = toml::from_str(&std::fs::read_to_string(&path)?)?;
        let defaulted = |id: &str| {
            matches
                .value_source(id)
                .map_or(true, |s| s == ValueSource::DefaultValue)
        };
        if defaulted("address") {
            if let Some(v) = file.address {
                args.address = v;
            }
        }
        if defaulted("key") {
            if let Some(v) = file.key {
                args.key = v;
            }
        }
        if defaulted("format") {
            if let Some(v) = file.format {
                args.format = v;
            }
        }
        if defaulted("batch") {
            if let Some(v) = file.batch {
                args.batch = v;
            }
        }
        if defaulted("poll_interval") {
            if let Some(v) = file.poll_interval {
                args.poll_interval = v;
            }
        }
        if defaulted("report_interval") {
            if let Some(v) = file.report_interval {
                args.report_interval = v;
            }
        }
        if defaulted("crypto_key") {
            if let Some(v) = file.crypto_key {
                args.crypto_key = Some(v);
            }
        }
        if defaulted("transport") {
            if let Some(v) = file.transport {
                args.transport = v;
            }
        }
        if defaulted("self_address") {
            if let Some(v) = file.self_address {
                args.self_address = v;
            }
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_fills_defaults_but_flags_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            "address = \"10.0.0.9:9999\"\npoll_interval = 30\n",
        )
        .unwrap();

        let matches = <AgentArgs as CommandFactory>::command().get_matches_from([
            "trackmon-agent",
            "--address",
            "127.0.0.1:1234",
            "--config",
            path.to_str().unwrap(),
        ]);
        let args = AgentArgs::from_matches(matches).unwrap();
        // explicit flag beats the file
        assert_eq!(args.address, "127.0.0.1:1234");
        // file beats the built-in default
        assert_eq!(args.poll_interval, 30);
        assert_eq!(args.report_interval, 10);
    }

    #[test]
    fn defaults_without_config_file() {
        let matches =
            <AgentArgs as CommandFactory>::command().get_matches_from(["trackmon-agent"]);
        let args = AgentArgs::from_matches(matches).unwrap();
        assert_eq!(args.address, "127.0.0.1:8080");
        assert!(args.batch);
        assert_eq!(args.transport, "http");
    }
}

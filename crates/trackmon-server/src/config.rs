use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser};
use serde::Deserialize;

#[derive(Parser, Debug, Clone)]
#[command(name = "trackmon-server", version, about = "metrics ingestion server")]
pub struct ServerArgs {
    /// Listen address
    #[arg(
        short = 'a',
        long = "address",
        env = "ADDRESS",
        default_value = "127.0.0.1:8080"
    )]
    pub address: String,

    /// Signing key for MAC verification (empty disables the check)
    #[arg(short = 'k', long, env = "KEY", default_value = "")]
    pub key: String,

    /// Snapshot file of the in-memory store (empty logs instead of writing)
    #[arg(
        short = 'f',
        long,
        env = "STORE_FILE",
        default_value = "/tmp/devops-metrics-db.json"
    )]
    pub store_file: String,

    /// Snapshot interval in seconds (0 disables the ticker)
    #[arg(short = 'i', long, env = "STORE_INTERVAL", default_value_t = 300)]
    pub store_interval: u64,

    /// Load the snapshot file at startup
    #[arg(
        short = 'r',
        long,
        env = "RESTORE",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub restore: bool,

    /// Relational store DSN; empty selects the in-memory store
    #[arg(short = 'd', long, env = "DATABASE_DSN", default_value = "")]
    pub database_dsn: String,

    /// CIDR of admitted agents (empty admits everyone)
    #[arg(short = 't', long, env = "TRUSTED_SUBNET", default_value = "")]
    pub trusted_subnet: String,

    /// Path to the PEM-encoded RSA private key for request decryption
    #[arg(long, env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// Generate the crypto key pair at --crypto-key before starting
    #[arg(long)]
    pub generate_crypto_keys: bool,

    /// Periodically dump the store contents to the log
    #[arg(long)]
    pub show_store: bool,

    /// Inbound transport
    #[arg(long, env = "TRANSPORT", default_value = "http")]
    pub transport: String,

    /// Enable debug logging (also disables panic recovery)
    #[arg(short = 'v', long, env = "VERBOSE")]
    pub verbose: bool,

    /// TOML config file supplying defaults for any of the above
    #[arg(short = 'c', long, env = "CONFIG")]
    pub config: Option<PathBuf>,
}

/// File-level counterpart of [`ServerArgs`]; every field optional.
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub address: Option<String>,
    pub key: Option<String>,
    pub store_file: Option<String>,
    pub store_interval: Option<u64>,
    pub restore: Option<bool>,
    pub database_dsn: Option<String>,
    pub trusted_subnet: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub transport: Option<String>,
}

impl ServerArgs {
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
        let file: ServerFileConfig = toml::from_str(&std::fs::read_to_string(&path)?)?;
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
        if defaulted("store_file") {
            if let Some(v) = file.store_file {
                args.store_file = v;
            }
        }
        if defaulted("store_interval") {
            if let Some(v) = file.store_interval {
                args.store_interval = v;
            }
        }
        if defaulted("restore") {
            if let Some(v) = file.restore {
                args.restore = v;
            }
        }
        if defaulted("database_dsn") {
            if let Some(v) = file.database_dsn {
                args.database_dsn = v;
            }
        }
        if defaulted("trusted_subnet") {
            if let Some(v) = file.trusted_subnet {
                args.trusted_subnet = v;
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
        Ok(args)
    }
}

//! Runtime configuration (spec §1.1/§3.1): CLI args, JSON config file, and the
//! `LiteralOrEnv` indirection that lets secrets live in the environment rather than
//! in the config file itself.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::chain_id::ChainId;

#[derive(Debug, Parser)]
#[command(name = "firmswap", about = "FirmSwap aggregator and reference solver")]
pub struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(short, long, env = "CONFIG", default_value = "config.json")]
    pub config: PathBuf,
}

/// A value that is either given literally in the config file, or resolved from an
/// environment variable referenced as `$VAR` or `${VAR}` at deserialization time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralOrEnv<T> {
    Literal(T),
    Env(String),
}

impl<T> LiteralOrEnv<T>
where
    T: Clone + std::str::FromStr,
    T::Err: fmt::Display,
{
    /// Resolves to the final value, reading the environment if necessary.
    pub fn resolve(&self) -> Result<T, ConfigError> {
        match self {
            LiteralOrEnv::Literal(value) => Ok(value.clone()),
            LiteralOrEnv::Env(var) => {
                let raw = std::env::var(var)
                    .map_err(|_| ConfigError::MissingEnvVar(var.clone()))?;
                raw.parse::<T>()
                    .map_err(|e| ConfigError::InvalidEnvValue(var.clone(), e.to_string()))
            }
        }
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: Deserialize<'de> + fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<T> {
            Str(String),
            Other(T),
        }

        match Raw::<T>::deserialize(deserializer)? {
            Raw::Str(s) => {
                if let Some(var) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
                    Ok(LiteralOrEnv::Env(var.to_string()))
                } else if let Some(var) = s.strip_prefix('$') {
                    Ok(LiteralOrEnv::Env(var.to_string()))
                } else {
                    Err(D::Error::custom(
                        "expected either a literal value or a $VAR / ${VAR} reference",
                    ))
                }
            }
            Raw::Other(value) => Ok(LiteralOrEnv::Literal(value)),
        }
    }
}

impl<T: Serialize> Serialize for LiteralOrEnv<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            LiteralOrEnv::Literal(value) => value.serialize(serializer),
            LiteralOrEnv::Env(var) => serializer.serialize_str(&format!("${{{var}}}")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0:?}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file {0:?}: {1}")]
    Parse(PathBuf, serde_json::Error),
    #[error("environment variable {0:?} is not set")]
    MissingEnvVar(String),
    #[error("environment variable {0:?} has an invalid value: {1}")]
    InvalidEnvValue(String, String),
}

/// Per-chain connection details: RPC endpoint, settlement engine address, bond token.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub rpc_url: url::Url,
    pub settlement_engine: crate::types::EvmAddress,
    pub bond_token: crate::types::EvmAddress,
}

/// Reference solver configuration: signing key, pricing spread, and per-chain deposit
/// watcher polling interval.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolverConfig {
    pub private_key: LiteralOrEnv<String>,
    #[serde(default = "default_spread_bps")]
    pub spread_bps: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub deposit_poll_interval_secs: u64,
    #[serde(default = "default_usd_notional_ceiling")]
    pub usd_notional_ceiling: f64,
    /// Fixed bid/ask feed, keyed by `"{inputToken}:{outputToken}"` (lowercase
    /// addresses, in the order the pair is quoted). A real deployment would
    /// replace this with a live exchange adapter; this reference solver has
    /// none available, so the feed is config-supplied.
    #[serde(default)]
    pub price_feed: HashMap<String, PriceFeedEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PriceFeedEntry {
    pub bid: f64,
    pub ask: f64,
}

fn default_spread_bps() -> u32 {
    30
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_usd_notional_ceiling() -> f64 {
    1_000_000.0
}

/// Aggregator behavior: how long to wait for solver responses and how many of the
/// top-ranked quotes to return.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_solicit_timeout_ms")]
    pub solicit_timeout_ms: u64,
    #[serde(default = "default_max_quotes")]
    pub max_quotes_returned: usize,
}

fn default_solicit_timeout_ms() -> u64 {
    2_000
}

fn default_max_quotes() -> usize {
    5
}

/// Solver registry storage and capacity limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_registry_capacity")]
    pub max_solvers_per_chain: usize,
}

fn default_registry_capacity() -> usize {
    256
}

/// Top-level configuration assembled from the JSON config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub solver: Option<SolverConfig>,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    pub registry: RegistryConfig,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8402".to_string()
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            solicit_timeout_ms: default_solicit_timeout_ms(),
            max_quotes_returned: default_max_quotes(),
        }
    }
}

impl Config {
    pub fn load(args: &CliArgs) -> Result<Self, ConfigError> {
        Self::load_from_path(&args.config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }
}

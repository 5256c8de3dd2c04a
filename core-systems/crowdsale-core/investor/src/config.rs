//! Configuration loader for the crowdsale investor.
//!
//! Layers (highest precedence last):
//!   1) Built-in defaults
//!   2) Config file (explicit path or auto-discovered)
//!   3) Environment variables (optionally via .env)

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config as cfg;
use crowdsale_launchpad::gas::{GasLimitConfig, GasPriceSelection, DEFAULT_HARD_CAP_GAS_UNITS, DEFAULT_SAFETY_MARGIN_GAS_UNITS};
use crowdsale_launchpad::invest::InvestConfig;
use crowdsale_launchpad::validate::{parse_address, validate_numeric_field, NumericRules, Validity};
use directories::ProjectDirs;
use dotenvy::dotenv;
use ethers::types::Address;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const ENV_PREFIX: &str = "CROWDSALE";

/// Application config (validated).
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chain: Chain,
    pub sale: Sale,
    pub invest: Invest,
    pub gas_price: GasPrice,
    pub telemetry: Telemetry,
}

/// JSON-RPC endpoint and signer.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Chain {
    pub rpc_url: String,
    /// Refuse to run against any other chain when set.
    pub expected_chain_id: Option<u64>,
    /// Hex signing key. Without it transactions go through the node's own
    /// accounts (`eth_accounts` / `eth_sendTransaction`).
    pub private_key: Option<SecretString>,
    /// Give up retrying read calls after this long.
    #[serde(with = "humantime_serde")]
    pub read_retry_max_elapsed: Duration,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Sale {
    /// Crowdsale contract; joined tiers are discovered from it.
    pub crowdsale_address: String,
    pub token_decimals: u32,
    /// Tier plan for `validate`.
    pub tiers_file: Option<PathBuf>,
    /// Whitelist seed for `validate`.
    pub whitelist_file: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Invest {
    pub hard_cap_gas_units: u64,
    pub safety_margin_gas_units: u64,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub confirm_timeout: Duration,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct GasPrice {
    pub selection: GasPriceSelection,
    /// Gwei; used when `selection = "custom"`.
    pub custom_gwei: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Telemetry {
    /// RUST_LOG-like directive, e.g. "info,crowdsale_launchpad=debug".
    pub log_filter: Option<String>,
    pub json: bool,
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".into(),
            expected_chain_id: None,
            private_key: None,
            read_retry_max_elapsed: Duration::from_secs(30),
        }
    }
}

impl Default for Sale {
    fn default() -> Self {
        Self { crowdsale_address: String::new(), token_decimals: 18, tiers_file: None, whitelist_file: None }
    }
}

impl Default for Invest {
    fn default() -> Self {
        let core = InvestConfig::default();
        Self {
            hard_cap_gas_units: DEFAULT_HARD_CAP_GAS_UNITS,
            safety_margin_gas_units: DEFAULT_SAFETY_MARGIN_GAS_UNITS,
            poll_interval: core.poll_interval(),
            confirm_timeout: core.confirm_timeout(),
        }
    }
}

impl Invest {
    pub fn to_core(&self) -> InvestConfig {
        InvestConfig {
            gas: GasLimitConfig {
                hard_cap_gas_units: self.hard_cap_gas_units,
                safety_margin_gas_units: self.safety_margin_gas_units,
            },
            poll_interval_ms: u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            confirm_timeout_ms: u64::try_from(self.confirm_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Sale {
    /// Parsed crowdsale address; `None` when unset.
    pub fn crowdsale(&self) -> Result<Option<Address>, ConfigError> {
        if self.crowdsale_address.trim().is_empty() {
            return Ok(None);
        }
        parse_address(&self.crowdsale_address)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidAddress(self.crowdsale_address.clone()))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] cfg::ConfigError),
    #[error("invalid url `{0}`")]
    InvalidUrl(String),
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("path not found `{0}`")]
    PathNotFound(String),
}

/// Load configuration: defaults → file → environment.
/// Env prefix: `CROWDSALE__...`, nested fields separated by `__`.
///
/// Examples:
///   CROWDSALE__CHAIN__RPC_URL=https://rpc.example:8545
///   CROWDSALE__SALE__CROWDSALE_ADDRESS=0x...
///   CROWDSALE__CHAIN__PRIVATE_KEY=... (redacted in logs)
pub fn load(explicit_file: Option<&Path>) -> Result<Config, ConfigError> {
    let _ = dotenv();

    let defaults = Config::default();
    let mut builder = cfg::Config::builder()
        .set_default("chain.rpc_url", defaults.chain.rpc_url)?
        .set_default("chain.read_retry_max_elapsed", "30s")?
        .set_default("sale.token_decimals", i64::from(defaults.sale.token_decimals))?
        .set_default("invest.hard_cap_gas_units", defaults.invest.hard_cap_gas_units)?
        .set_default("invest.safety_margin_gas_units", defaults.invest.safety_margin_gas_units)?
        .set_default("invest.poll_interval", "500ms")?
        .set_default("invest.confirm_timeout", "10m")?
        .set_default("gas_price.selection", "slow")?
        .set_default("telemetry.json", false)?;

    for path in discover_config_files(explicit_file)? {
        builder = builder.add_source(cfg::File::from(path));
    }

    builder = builder.add_source(cfg::Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true));

    let mut config: Config = builder.build()?.try_deserialize()?;
    validate_and_normalize(&mut config)?;
    Ok(config)
}

/// Discover config files in precedence order:
/// - explicit path if provided
/// - $XDG_CONFIG_HOME/crowdsale-investor/crowdsale.{toml,yaml,yml,json}
/// - ./crowdsale.{toml,yaml,yml,json}
fn discover_config_files(explicit: Option<&Path>) -> Result<Vec<PathBuf>, ConfigError> {
    if let Some(p) = explicit {
        if p.exists() {
            return Ok(vec![p.to_path_buf()]);
        }
        return Err(ConfigError::PathNotFound(p.display().to_string()));
    }

    const NAMES: [&str; 4] = ["crowdsale.toml", "crowdsale.yaml", "crowdsale.yml", "crowdsale.json"];
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(pd) = ProjectDirs::from("io", "Crowdsale", "crowdsale-investor") {
        candidates.extend(NAMES.iter().map(|n| pd.config_dir().join(n)));
    }
    candidates.extend(NAMES.iter().map(PathBuf::from));

    Ok(candidates.into_iter().filter(|c| c.exists()).collect())
}

fn validate_and_normalize(config: &mut Config) -> Result<(), ConfigError> {
    config.chain.rpc_url = config.chain.rpc_url.trim().to_string();
    let url = Url::parse(&config.chain.rpc_url).map_err(|_| ConfigError::InvalidUrl(config.chain.rpc_url.clone()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(config.chain.rpc_url.clone()));
    }

    config.sale.crowdsale_address = config.sale.crowdsale_address.trim().to_string();
    config.sale.crowdsale()?;

    if config.sale.token_decimals > crowdsale_launchpad::amount::MAX_SCALE {
        return Err(ConfigError::InvalidValue {
            field: "sale.token_decimals",
            reason: format!("must be at most {}", crowdsale_launchpad::amount::MAX_SCALE),
        });
    }
    for path in [&config.sale.tiers_file, &config.sale.whitelist_file].into_iter().flatten() {
        if !path.exists() {
            return Err(ConfigError::PathNotFound(path.display().to_string()));
        }
    }

    if config.invest.poll_interval.is_zero() {
        return Err(ConfigError::InvalidValue { field: "invest.poll_interval", reason: "must be positive".into() });
    }
    if config.invest.safety_margin_gas_units >= config.invest.hard_cap_gas_units {
        return Err(ConfigError::InvalidValue {
            field: "invest.safety_margin_gas_units",
            reason: "must be below invest.hard_cap_gas_units".into(),
        });
    }

    if config.gas_price.selection == GasPriceSelection::Custom {
        let input = config.gas_price.custom_gwei.as_deref().unwrap_or_default();
        if let Validity::Invalid(reason) = validate_numeric_field(input, &NumericRules::gas_price_gwei()) {
            return Err(ConfigError::InvalidValue { field: "gas_price.custom_gwei", reason: reason.to_string() });
        }
    }
    Ok(())
}

/// Redacted Debug for Config: the signing key is masked.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("chain", &self.chain)
            .field("sale", &self.sale)
            .field("invest", &self.invest)
            .field("gas_price", &self.gas_price)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("rpc_url", &self.rpc_url)
            .field("expected_chain_id", &self.expected_chain_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("read_retry_max_elapsed", &self.read_retry_max_elapsed)
            .finish()
    }
}

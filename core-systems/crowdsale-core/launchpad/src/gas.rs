// crowdsale-core/launchpad/src/gas.rs
//! Payment and gas arithmetic, plus the shared gas-price selection.

use ethers_core::types::U256;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::amount::TokenAmount;
use crate::chain::{ChainError, GasPriceOracle, GasPriceQuotes};
use crate::validate::{parse_numeric, FieldStatus, NumericRules, Validity};

pub const DEFAULT_HARD_CAP_GAS_UNITS: u64 = 4_016_260;
pub const DEFAULT_SAFETY_MARGIN_GAS_UNITS: u64 = 100_000;

pub const GWEI_DECIMALS: u32 = 9;

/// Gas limit policy for the funding transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasLimitConfig {
    pub hard_cap_gas_units: u64,
    pub safety_margin_gas_units: u64,
}

impl Default for GasLimitConfig {
    fn default() -> Self {
        Self {
            hard_cap_gas_units: DEFAULT_HARD_CAP_GAS_UNITS,
            safety_margin_gas_units: DEFAULT_SAFETY_MARGIN_GAS_UNITS,
        }
    }
}

impl GasLimitConfig {
    pub fn bound(&self, provider_estimate: Option<U256>) -> U256 {
        bound_gas_limit(
            provider_estimate,
            U256::from(self.hard_cap_gas_units),
            U256::from(self.safety_margin_gas_units),
        )
    }
}

/// Wei owed for `tokens` at `rate` wei per token, truncated.
///
/// `None` only on 256-bit overflow.
pub fn compute_wei_to_send(tokens: &TokenAmount, rate: U256) -> Option<U256> {
    tokens.mul_floor(rate)
}

/// Missing, zero or over-cap estimates fall back to `hard_cap`; anything else
/// gets `safety_margin` added on top.
pub fn bound_gas_limit(provider_estimate: Option<U256>, hard_cap: U256, safety_margin: U256) -> U256 {
    match provider_estimate {
        Some(estimate) if !estimate.is_zero() && estimate <= hard_cap => estimate.saturating_add(safety_margin),
        _ => hard_cap,
    }
}

/// Wei rendered as gwei without trailing zeros, e.g. `1.5`.
pub fn format_gwei(wei: U256) -> String {
    let s = TokenAmount::from_units(wei, GWEI_DECIMALS).to_string();
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceSelection {
    #[default]
    Slow,
    Standard,
    Fast,
    Custom,
}

/// Read-only view of [`GasPriceStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GasPriceSnapshot {
    pub quotes: Option<GasPriceQuotes>,
    pub selection: GasPriceSelection,
    pub custom_input: String,
    pub custom_status: FieldStatus,
    /// Wei per gas for the current selection.
    pub price: Option<U256>,
}

struct Inner {
    quotes: Option<GasPriceQuotes>,
    selection: GasPriceSelection,
    custom_input: String,
    custom_wei: Option<U256>,
    custom_status: FieldStatus,
}

/// Gas price shared between the configuration wizard and the investment
/// pipeline. Writes validate before they land.
pub struct GasPriceStore {
    inner: RwLock<Inner>,
}

impl Default for GasPriceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GasPriceStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                quotes: None,
                selection: GasPriceSelection::default(),
                custom_input: String::new(),
                custom_wei: None,
                custom_status: FieldStatus::pristine(Validity::Invalid(
                    crate::validate::InvalidReason::Empty,
                )),
            }),
        }
    }

    /// Refreshes the presets. On failure the previous quotes stay in place.
    pub async fn update_values<O>(&self, oracle: &O) -> Result<GasPriceQuotes, ChainError>
    where
        O: GasPriceOracle + ?Sized,
    {
        match oracle.quotes().await {
            Ok(quotes) => {
                debug!(slow = %quotes.slow, standard = %quotes.standard, fast = %quotes.fast, "gas price quotes");
                self.inner.write().quotes = Some(quotes);
                Ok(quotes)
            }
            Err(e) => {
                warn!(error = %e, "gas price quotes unavailable");
                Err(e)
            }
        }
    }

    /// Switching presets never touches the custom value.
    pub fn select(&self, selection: GasPriceSelection) {
        self.inner.write().selection = selection;
    }

    /// Stores a custom price typed in gwei and returns its validity.
    pub fn set_custom_gwei(&self, input: &str) -> Validity {
        let parsed = parse_numeric(input, &NumericRules::gas_price_gwei());
        let mut st = self.inner.write();
        st.custom_input = input.to_string();
        match parsed {
            Ok(Some(gwei)) => match gwei.to_units(GWEI_DECIMALS) {
                Some(wei) => {
                    st.custom_wei = Some(wei);
                    st.custom_status = FieldStatus::edited(Validity::Valid);
                }
                None => {
                    st.custom_wei = None;
                    st.custom_status = FieldStatus::edited(Validity::Invalid(
                        crate::validate::InvalidReason::TooManyDecimals(GWEI_DECIMALS),
                    ));
                }
            },
            Ok(None) => {
                st.custom_wei = None;
                st.custom_status = FieldStatus::edited(Validity::Invalid(crate::validate::InvalidReason::Empty));
            }
            Err(reason) => {
                st.custom_wei = None;
                st.custom_status = FieldStatus::edited(Validity::Invalid(reason));
            }
        }
        st.custom_status.valid.clone()
    }

    /// Wei per gas for the current selection, if known.
    pub fn gas_price(&self) -> Option<U256> {
        let st = self.inner.read();
        Self::price_locked(&st)
    }

    /// A preset is always acceptable; a custom price must have passed validation.
    pub fn is_valid(&self) -> bool {
        let st = self.inner.read();
        st.selection != GasPriceSelection::Custom || st.custom_status.is_valid()
    }

    pub fn snapshot(&self) -> GasPriceSnapshot {
        let st = self.inner.read();
        GasPriceSnapshot {
            quotes: st.quotes,
            selection: st.selection,
            custom_input: st.custom_input.clone(),
            custom_status: st.custom_status.clone(),
            price: Self::price_locked(&st),
        }
    }

    fn price_locked(st: &Inner) -> Option<U256> {
        match st.selection {
            GasPriceSelection::Slow => st.quotes.map(|q| q.slow),
            GasPriceSelection::Standard => st.quotes.map(|q| q.standard),
            GasPriceSelection::Fast => st.quotes.map(|q| q.fast),
            GasPriceSelection::Custom => st.custom_wei,
        }
    }
}

// crowdsale-core/launchpad/src/validate.rs
//! Field validators for tier configuration.
//!
//! Every validator is a pure function returning a tagged [`Validity`]. Bad
//! input is a value here, never an error: the caller stores it next to the
//! field and renders it.

use ethers_core::types::{Address, U256};
use ethers_core::utils::to_checksum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::{AmountError, TokenAmount};
use crate::Timestamp;

/// Why a field failed validation.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidReason {
    #[error("value is required")]
    Empty,
    #[error("value is not a number")]
    NotNumeric,
    #[error("value must not be negative")]
    Negative,
    #[error("value must be greater than zero")]
    NotPositive,
    #[error("value must be at least {0}")]
    BelowMin(String),
    #[error("value must be a whole number")]
    NotInteger,
    #[error("value must not exceed {0} decimal places")]
    TooManyDecimals(u32),
    #[error("value is too large")]
    TooLarge,
    #[error("end time must be after start time")]
    EndNotAfterStart,
    #[error("start time must not precede the end of tier {0}")]
    StartsBeforePrevious(usize),
    #[error("time window overlaps tier {0}")]
    Overlaps(usize),
    #[error("minimum cap {min_cap} exceeds max supply {max_supply}")]
    MinCapExceedsSupply { min_cap: U256, max_supply: U256 },
    #[error("invalid address")]
    InvalidAddress,
    #[error("whitelist entry {0}: {1}")]
    WhitelistEntry(usize, Box<InvalidReason>),
    #[error("whitelist minimum exceeds maximum")]
    WhitelistMinAboveMax,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    Valid,
    Invalid(InvalidReason),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }

    pub fn reason(&self) -> Option<&InvalidReason> {
        match self {
            Validity::Valid => None,
            Validity::Invalid(r) => Some(r),
        }
    }
}

/// Per-field status: untouched fields stay `pristine` so the UI can hide
/// their errors until the user edits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStatus {
    pub pristine: bool,
    pub valid: Validity,
}

impl FieldStatus {
    pub fn pristine(valid: Validity) -> Self {
        Self { pristine: true, valid }
    }

    pub fn edited(valid: Validity) -> Self {
        Self { pristine: false, valid }
    }

    pub fn is_valid(&self) -> bool {
        self.valid.is_valid()
    }

    /// Error that should be shown right now, if any.
    pub fn visible_error(&self) -> Option<&InvalidReason> {
        if self.pristine {
            None
        } else {
            self.valid.reason()
        }
    }
}

impl Default for FieldStatus {
    fn default() -> Self {
        Self::pristine(Validity::Valid)
    }
}

/// Half-open `[start, end)` interval in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t < self.end
    }

    /// Empty windows overlap nothing.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }
}

/// Window of tier `index` against its own bounds and every other tier.
///
/// Tiers may be contiguous (`start == previous.end`) or gapped but never
/// interleaved.
pub fn validate_time_window(index: usize, windows: &[TimeWindow]) -> Validity {
    let Some(window) = windows.get(index) else {
        return Validity::Invalid(InvalidReason::Empty);
    };
    if window.is_empty() {
        return Validity::Invalid(InvalidReason::EndNotAfterStart);
    }
    if index > 0 && window.start < windows[index - 1].end {
        return Validity::Invalid(InvalidReason::StartsBeforePrevious(index - 1));
    }
    if let Some(other) = windows
        .iter()
        .enumerate()
        .find(|(j, w)| *j != index && window.overlaps(w))
        .map(|(j, _)| j)
    {
        return Validity::Invalid(InvalidReason::Overlaps(other));
    }
    Validity::Valid
}

/// Equality is valid.
pub fn validate_min_cap(global_min_cap: U256, max_supply: U256) -> Validity {
    if global_min_cap > max_supply {
        Validity::Invalid(InvalidReason::MinCapExceedsSupply { min_cap: global_min_cap, max_supply })
    } else {
        Validity::Valid
    }
}

/// Constraints for a numeric text input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericRules {
    pub min: Option<TokenAmount>,
    pub max_decimals: Option<u32>,
    pub accept_float: bool,
    pub accept_empty: bool,
}

impl Default for NumericRules {
    fn default() -> Self {
        Self { min: None, max_decimals: None, accept_float: true, accept_empty: false }
    }
}

impl NumericRules {
    /// Wei per token: positive integer.
    pub fn rate() -> Self {
        Self { min: Some(TokenAmount::new(1, 0)), accept_float: false, ..Self::default() }
    }

    /// Tokens allotted to a tier: positive integer.
    pub fn supply() -> Self {
        Self { min: Some(TokenAmount::new(1, 0)), accept_float: false, ..Self::default() }
    }

    /// Sale-wide minimum cap in tokens; may be left blank.
    pub fn min_cap(token_decimals: u32) -> Self {
        Self {
            min: Some(TokenAmount::new(0, 0)),
            max_decimals: Some(token_decimals),
            accept_float: token_decimals > 0,
            accept_empty: true,
        }
    }

    /// Custom gas price in gwei.
    pub fn gas_price_gwei() -> Self {
        Self {
            min: Some(TokenAmount::new(1, 1)),
            max_decimals: Some(9),
            accept_float: true,
            accept_empty: false,
        }
    }
}

pub fn validate_numeric_field(value: &str, rules: &NumericRules) -> Validity {
    match check_numeric(value, rules) {
        Ok(_) => Validity::Valid,
        Err(reason) => Validity::Invalid(reason),
    }
}

/// Parses `value` under `rules`; `Ok(None)` for an accepted empty input.
pub fn parse_numeric(value: &str, rules: &NumericRules) -> Result<Option<TokenAmount>, InvalidReason> {
    check_numeric(value, rules)
}

fn check_numeric(value: &str, rules: &NumericRules) -> Result<Option<TokenAmount>, InvalidReason> {
    let amount = match TokenAmount::parse(value) {
        Ok(a) => a,
        Err(AmountError::Empty) if rules.accept_empty => return Ok(None),
        Err(AmountError::Empty) => return Err(InvalidReason::Empty),
        Err(AmountError::NotNumeric(_)) => return Err(InvalidReason::NotNumeric),
        Err(AmountError::Negative) => return Err(InvalidReason::Negative),
        Err(AmountError::Overflow) => return Err(InvalidReason::TooLarge),
    };
    if !rules.accept_float && !amount.is_integer() {
        return Err(InvalidReason::NotInteger);
    }
    if let Some(max) = rules.max_decimals {
        if amount.decimal_places() > max {
            return Err(InvalidReason::TooManyDecimals(max));
        }
    }
    if let Some(min) = &rules.min {
        if amount.cmp_value(min).is_lt() {
            return Err(InvalidReason::BelowMin(min.to_string()));
        }
    }
    Ok(Some(amount))
}

/// `0x`-prefixed 20-byte hex. Mixed-case input must carry a valid EIP-55 checksum.
pub fn parse_address(input: &str) -> Option<Address> {
    let hex = input.trim().strip_prefix("0x")?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let address: Address = hex.parse().ok()?;
    let lower = hex.chars().all(|c| !c.is_ascii_uppercase());
    let upper = hex.chars().all(|c| !c.is_ascii_lowercase());
    if lower || upper || to_checksum(&address, None)[2..] == *hex {
        Some(address)
    } else {
        None
    }
}

pub fn validate_address(input: &str) -> Validity {
    match parse_address(input) {
        Some(_) => Validity::Valid,
        None => Validity::Invalid(InvalidReason::InvalidAddress),
    }
}

/// One investor allowed into a whitelisted tier, with per-investor token bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub address: String,
    pub min: String,
    pub max: String,
}

pub fn validate_whitelist_entry(entry: &WhitelistEntry, token_decimals: u32) -> Validity {
    if parse_address(&entry.address).is_none() {
        return Validity::Invalid(InvalidReason::InvalidAddress);
    }
    let rules = NumericRules {
        min: Some(TokenAmount::new(0, 0)),
        max_decimals: Some(token_decimals),
        accept_float: token_decimals > 0,
        accept_empty: false,
    };
    let min = match parse_numeric(&entry.min, &rules) {
        Ok(Some(v)) => v,
        Ok(None) => return Validity::Invalid(InvalidReason::Empty),
        Err(r) => return Validity::Invalid(r),
    };
    let max = match parse_numeric(&entry.max, &rules) {
        Ok(Some(v)) => v,
        Ok(None) => return Validity::Invalid(InvalidReason::Empty),
        Err(r) => return Validity::Invalid(r),
    };
    if min.cmp_value(&max).is_gt() {
        return Validity::Invalid(InvalidReason::WhitelistMinAboveMax);
    }
    Validity::Valid
}

pub fn validate_whitelist(entries: &[WhitelistEntry], token_decimals: u32) -> Validity {
    for (i, entry) in entries.iter().enumerate() {
        if let Validity::Invalid(reason) = validate_whitelist_entry(entry, token_decimals) {
            return Validity::Invalid(InvalidReason::WhitelistEntry(i, Box::new(reason)));
        }
    }
    Validity::Valid
}

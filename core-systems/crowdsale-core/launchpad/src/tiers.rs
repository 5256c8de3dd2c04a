// crowdsale-core/launchpad/src/tiers.rs
//! Ordered tier collection and its validation state.
//!
//! Every write goes through [`TierStore::set_tier_property`], which stores the
//! value, marks the field as edited and re-runs the validators the field
//! feeds (its own, plus cross-tier ones such as neighbouring windows or the
//! sale-wide min cap). Readers therefore never see a value without its
//! current status.

use std::fmt;

use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::amount::pow10;
use crate::chain::TierWhitelist;
use crate::validate::{
    parse_numeric, validate_address, validate_min_cap, validate_numeric_field, validate_time_window,
    validate_whitelist, FieldStatus, InvalidReason, NumericRules, TimeWindow, Validity, WhitelistEntry,
};
use crate::Timestamp;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TierStoreError {
    #[error("tier index {index} out of range (have {len} tiers)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{field} is a sale-wide setting and lives on tier 0, not tier {index}")]
    GlobalSettingOnTier { field: TierField, index: usize },
}

/// One sale phase as typed by the operator. Numeric fields keep their text so
/// validation sees exactly what was entered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// 1-based position, assigned on insert.
    #[serde(default)]
    pub ordinal: usize,
    #[serde(default)]
    pub label: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Wei per token.
    pub rate: String,
    /// Whole tokens allotted to this tier.
    pub supply: String,
    #[serde(default)]
    pub wallet_address: String,
    /// Sale-wide; read from tier 0 only.
    #[serde(default)]
    pub whitelist_enabled: bool,
    #[serde(default)]
    pub whitelist: Vec<WhitelistEntry>,
    /// Sale-wide; read from tier 0 only.
    #[serde(default)]
    pub min_cap: String,
    #[serde(skip)]
    pub contract_address: Option<Address>,
}

impl Tier {
    pub fn new(start_time: Timestamp, end_time: Timestamp, rate: impl Into<String>, supply: impl Into<String>) -> Self {
        Self { start_time, end_time, rate: rate.into(), supply: supply.into(), ..Self::default() }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierField {
    StartTime,
    EndTime,
    Rate,
    Supply,
    WalletAddress,
    WhitelistEnabled,
    Whitelist,
    MinCap,
}

impl TierField {
    pub const VALIDATED: [TierField; 7] = [
        TierField::StartTime,
        TierField::EndTime,
        TierField::Rate,
        TierField::Supply,
        TierField::WalletAddress,
        TierField::Whitelist,
        TierField::MinCap,
    ];

    fn is_global(self) -> bool {
        matches!(self, TierField::WhitelistEnabled | TierField::MinCap)
    }

    fn is_time(self) -> bool {
        matches!(self, TierField::StartTime | TierField::EndTime)
    }
}

impl fmt::Display for TierField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TierField::StartTime => "start_time",
            TierField::EndTime => "end_time",
            TierField::Rate => "rate",
            TierField::Supply => "supply",
            TierField::WalletAddress => "wallet_address",
            TierField::WhitelistEnabled => "whitelist_enabled",
            TierField::Whitelist => "whitelist",
            TierField::MinCap => "min_cap",
        };
        f.write_str(s)
    }
}

/// A typed field update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TierProperty {
    StartTime(Timestamp),
    EndTime(Timestamp),
    Rate(String),
    Supply(String),
    WalletAddress(String),
    WhitelistEnabled(bool),
    Whitelist(Vec<WhitelistEntry>),
    MinCap(String),
}

impl TierProperty {
    pub fn field(&self) -> TierField {
        match self {
            TierProperty::StartTime(_) => TierField::StartTime,
            TierProperty::EndTime(_) => TierField::EndTime,
            TierProperty::Rate(_) => TierField::Rate,
            TierProperty::Supply(_) => TierField::Supply,
            TierProperty::WalletAddress(_) => TierField::WalletAddress,
            TierProperty::WhitelistEnabled(_) => TierField::WhitelistEnabled,
            TierProperty::Whitelist(_) => TierField::Whitelist,
            TierProperty::MinCap(_) => TierField::MinCap,
        }
    }
}

/// Status of every validated field of one tier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TierValidations {
    pub start_time: FieldStatus,
    pub end_time: FieldStatus,
    pub rate: FieldStatus,
    pub supply: FieldStatus,
    pub wallet_address: FieldStatus,
    pub whitelist: FieldStatus,
    /// Only meaningful on tier 0; always valid elsewhere.
    pub min_cap: FieldStatus,
}

impl TierValidations {
    /// `None` for fields that carry no validator.
    pub fn get(&self, field: TierField) -> Option<&FieldStatus> {
        match field {
            TierField::StartTime => Some(&self.start_time),
            TierField::EndTime => Some(&self.end_time),
            TierField::Rate => Some(&self.rate),
            TierField::Supply => Some(&self.supply),
            TierField::WalletAddress => Some(&self.wallet_address),
            TierField::Whitelist => Some(&self.whitelist),
            TierField::MinCap => Some(&self.min_cap),
            TierField::WhitelistEnabled => None,
        }
    }

    fn get_mut(&mut self, field: TierField) -> Option<&mut FieldStatus> {
        match field {
            TierField::StartTime => Some(&mut self.start_time),
            TierField::EndTime => Some(&mut self.end_time),
            TierField::Rate => Some(&mut self.rate),
            TierField::Supply => Some(&mut self.supply),
            TierField::WalletAddress => Some(&mut self.wallet_address),
            TierField::Whitelist => Some(&mut self.whitelist),
            TierField::MinCap => Some(&mut self.min_cap),
            TierField::WhitelistEnabled => None,
        }
    }

    pub fn all_valid(&self) -> bool {
        TierField::VALIDATED
            .iter()
            .filter_map(|f| self.get(*f))
            .all(FieldStatus::is_valid)
    }

    /// Fields currently invalid, in declaration order.
    pub fn invalid_fields(&self) -> impl Iterator<Item = (TierField, &InvalidReason)> + '_ {
        TierField::VALIDATED
            .iter()
            .filter_map(move |f| self.get(*f).and_then(|s| s.valid.reason()).map(|r| (*f, r)))
    }

    fn mark_dirty(&mut self) {
        for f in TierField::VALIDATED {
            if let Some(s) = self.get_mut(f) {
                s.pristine = false;
            }
        }
    }
}

/// Replaces the validity of a status while keeping its pristine flag.
fn revalidate(status: &mut FieldStatus, valid: Validity) {
    status.valid = valid;
}

pub struct TierStore {
    tiers: Vec<Tier>,
    validations: Vec<TierValidations>,
    token_decimals: u32,
    connected_account: Option<Address>,
}

impl TierStore {
    pub fn new(token_decimals: u32, connected_account: Option<Address>) -> Self {
        Self { tiers: Vec::new(), validations: Vec::new(), token_decimals, connected_account }
    }

    pub fn token_decimals(&self) -> u32 {
        self.token_decimals
    }

    pub fn connected_account(&self) -> Option<Address> {
        self.connected_account
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn tier(&self, index: usize) -> Option<&Tier> {
        self.tiers.get(index)
    }

    pub fn validations(&self, index: usize) -> Option<&TierValidations> {
        self.validations.get(index)
    }

    /// Appends a tier and returns its index.
    ///
    /// The first tier gets the connected account as wallet when none is
    /// given and starts with whitelisting off; later tiers without a wallet
    /// inherit tier 0's. New fields start pristine.
    pub fn add_tier(&mut self, mut tier: Tier) -> usize {
        let index = self.tiers.len();
        tier.ordinal = index + 1;
        if tier.label.is_empty() {
            tier.label = format!("Tier {}", tier.ordinal);
        }
        if index == 0 {
            tier.whitelist_enabled = false;
            if tier.wallet_address.is_empty() {
                if let Some(account) = self.connected_account {
                    tier.wallet_address = format!("{account:#x}");
                }
            }
        } else {
            if tier.wallet_address.is_empty() {
                tier.wallet_address = self.tiers[0].wallet_address.clone();
            }
            tier.whitelist_enabled = false;
            tier.min_cap.clear();
        }

        debug!(index, label = %tier.label, "tier added");
        self.tiers.push(tier);
        self.validations.push(TierValidations::default());

        let whitelist = self.whitelist_validity(index);
        let v = &mut self.validations[index];
        let t = &self.tiers[index];
        v.rate = FieldStatus::pristine(validate_numeric_field(&t.rate, &NumericRules::rate()));
        v.supply = FieldStatus::pristine(validate_numeric_field(&t.supply, &NumericRules::supply()));
        v.wallet_address = FieldStatus::pristine(validate_address(&t.wallet_address));
        v.whitelist = FieldStatus::pristine(whitelist);

        self.revalidate_windows();
        self.revalidate_min_cap();
        index
    }

    /// Stores `value` on tier `index`, marks the field edited and revalidates.
    ///
    /// An out-of-range index, or a sale-wide setting addressed to any tier but
    /// 0, is rejected without touching the store.
    pub fn set_tier_property(&mut self, value: TierProperty, index: usize) -> Result<(), TierStoreError> {
        let len = self.tiers.len();
        if index >= len {
            return Err(TierStoreError::IndexOutOfRange { index, len });
        }
        let field = value.field();
        if field.is_global() && index != 0 {
            return Err(TierStoreError::GlobalSettingOnTier { field, index });
        }

        let tier = &mut self.tiers[index];
        match value {
            TierProperty::StartTime(t) => tier.start_time = t,
            TierProperty::EndTime(t) => tier.end_time = t,
            TierProperty::Rate(v) => tier.rate = v,
            TierProperty::Supply(v) => tier.supply = v,
            TierProperty::WalletAddress(v) => tier.wallet_address = v,
            TierProperty::WhitelistEnabled(v) => tier.whitelist_enabled = v,
            TierProperty::Whitelist(v) => tier.whitelist = v,
            TierProperty::MinCap(v) => tier.min_cap = v,
        }
        if let Some(status) = self.validations[index].get_mut(field) {
            status.pristine = false;
        }
        self.validate_tiers(field, index);
        Ok(())
    }

    /// Re-runs the validators `field` on tier `index` feeds.
    pub fn validate_tiers(&mut self, field: TierField, index: usize) {
        if index >= self.tiers.len() {
            warn!(index, %field, "validate_tiers on missing tier");
            return;
        }
        match field {
            f if f.is_time() => self.revalidate_windows(),
            TierField::Rate => {
                let valid = validate_numeric_field(&self.tiers[index].rate, &NumericRules::rate());
                revalidate(&mut self.validations[index].rate, valid);
            }
            TierField::Supply => {
                let valid = validate_numeric_field(&self.tiers[index].supply, &NumericRules::supply());
                revalidate(&mut self.validations[index].supply, valid);
                self.revalidate_min_cap();
            }
            TierField::WalletAddress => {
                let valid = validate_address(&self.tiers[index].wallet_address);
                revalidate(&mut self.validations[index].wallet_address, valid);
            }
            TierField::Whitelist => {
                let valid = self.whitelist_validity(index);
                revalidate(&mut self.validations[index].whitelist, valid);
            }
            TierField::WhitelistEnabled => {
                self.tiers[0].min_cap.clear();
                self.validations[0].min_cap = FieldStatus::edited(Validity::Valid);
                for i in 0..self.tiers.len() {
                    let valid = self.whitelist_validity(i);
                    revalidate(&mut self.validations[i].whitelist, valid);
                }
            }
            TierField::MinCap => self.revalidate_min_cap(),
            _ => {}
        }
    }

    /// Re-runs every validator on every tier. Pristine flags are kept.
    pub fn revalidate_all(&mut self) {
        for index in 0..self.tiers.len() {
            for field in [TierField::Rate, TierField::Supply, TierField::WalletAddress, TierField::Whitelist] {
                self.validate_tiers(field, index);
            }
        }
        self.revalidate_windows();
        self.revalidate_min_cap();
    }

    /// Whitelists only gate deployment while whitelisting is on.
    fn whitelist_validity(&self, index: usize) -> Validity {
        if !self.whitelist_enabled() {
            return Validity::Valid;
        }
        validate_whitelist(&self.tiers[index].whitelist, self.token_decimals)
    }

    fn revalidate_windows(&mut self) {
        let windows = self.windows();
        for (i, v) in self.validations.iter_mut().enumerate() {
            let valid = validate_time_window(i, &windows);
            revalidate(&mut v.start_time, valid.clone());
            revalidate(&mut v.end_time, valid);
        }
    }

    fn revalidate_min_cap(&mut self) {
        let Some(first) = self.tiers.first() else {
            return;
        };
        let valid = match parse_numeric(&first.min_cap, &NumericRules::min_cap(self.token_decimals)) {
            Err(reason) => Validity::Invalid(reason),
            Ok(None) => Validity::Valid,
            Ok(Some(cap)) => match cap.to_units(self.token_decimals) {
                Some(units) => validate_min_cap(units, self.max_supply_units()),
                None => Validity::Invalid(InvalidReason::TooLarge),
            },
        };
        revalidate(&mut self.validations[0].min_cap, valid);
    }

    /// True only when every validated field of every tier is valid.
    pub fn are_tiers_valid(&self) -> bool {
        self.validations.iter().all(TierValidations::all_valid)
    }

    /// Shows every error, including those on fields never edited.
    pub fn mark_all_dirty(&mut self) {
        for v in &mut self.validations {
            v.mark_dirty();
        }
    }

    pub fn windows(&self) -> Vec<TimeWindow> {
        self.tiers.iter().map(Tier::window).collect()
    }

    /// Earliest tier start, i.e. when the sale opens.
    pub fn sale_start(&self) -> Option<Timestamp> {
        self.tiers.iter().map(|t| t.start_time).min()
    }

    /// Sum of all tier supplies in the token's smallest units. Supplies that
    /// do not parse count as zero; their own field is invalid anyway. A
    /// whole supply written with trailing zeros (`500.0`) counts in full.
    pub fn max_supply_units(&self) -> U256 {
        let unit = pow10(self.token_decimals);
        self.tiers
            .iter()
            .filter_map(|t| parse_numeric(&t.supply, &NumericRules::supply()).ok().flatten())
            .map(|s| s.mul_floor(unit).unwrap_or(U256::MAX))
            .fold(U256::zero(), |acc, s| acc.saturating_add(s))
    }

    pub fn min_cap_status(&self) -> Option<&FieldStatus> {
        self.validations.first().map(|v| &v.min_cap)
    }

    pub fn whitelist_enabled(&self) -> bool {
        self.tiers.first().is_some_and(|t| t.whitelist_enabled)
    }

    /// Whitelisted addresses across all tiers; zero while whitelisting is off.
    pub fn whitelist_count(&self) -> usize {
        if !self.whitelist_enabled() {
            return 0;
        }
        self.tiers.iter().map(|t| t.whitelist.len()).sum()
    }

    /// Seeds tier whitelists from the whitelist source. Entries for tiers
    /// that do not exist are dropped.
    pub fn seed_whitelists(&mut self, lists: Vec<TierWhitelist>) -> usize {
        let mut seeded = 0;
        for list in lists {
            let Some(tier) = self.tiers.get_mut(list.tier) else {
                warn!(tier = list.tier, "whitelist for unknown tier dropped");
                continue;
            };
            tier.whitelist = list.entries;
            let valid = self.whitelist_validity(list.tier);
            revalidate(&mut self.validations[list.tier].whitelist, valid);
            seeded += 1;
        }
        seeded
    }

    pub fn assign_contract(&mut self, index: usize, address: Address) -> Result<(), TierStoreError> {
        let len = self.tiers.len();
        let tier = self.tiers.get_mut(index).ok_or(TierStoreError::IndexOutOfRange { index, len })?;
        tier.contract_address = Some(address);
        Ok(())
    }

    /// Contract addresses in tier order; `None` until every tier has one.
    pub fn contract_addresses(&self) -> Option<Vec<Address>> {
        self.tiers.iter().map(|t| t.contract_address).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "0x00000000000000000000000000000000000000aa";

    fn store() -> TierStore {
        TierStore::new(18, Some(ACCOUNT.parse().unwrap()))
    }

    fn three_tiers() -> TierStore {
        let mut s = store();
        s.add_tier(Tier::new(100, 200, "1000", "500"));
        s.add_tier(Tier::new(200, 300, "1500", "500"));
        s.add_tier(Tier::new(300, 400, "2000", "500"));
        s
    }

    #[test]
    fn add_tier_seeds_defaults() {
        let mut s = store();
        let first = Tier { whitelist_enabled: true, ..Tier::new(100, 200, "1000", "10") };
        assert_eq!(s.add_tier(first), 0);
        assert_eq!(s.add_tier(Tier::new(200, 300, "1000", "10")), 1);

        let t0 = s.tier(0).unwrap();
        assert_eq!(t0.ordinal, 1);
        assert_eq!(t0.label, "Tier 1");
        assert_eq!(t0.wallet_address, ACCOUNT);
        assert!(!t0.whitelist_enabled);

        let t1 = s.tier(1).unwrap();
        assert_eq!(t1.ordinal, 2);
        assert_eq!(t1.label, "Tier 2");
        assert_eq!(t1.wallet_address, ACCOUNT);
        assert!(s.are_tiers_valid());
        assert!(s.validations(0).unwrap().rate.pristine);
    }

    #[test]
    fn out_of_range_is_rejected_without_mutation() {
        let mut s = three_tiers();
        let err = s.set_tier_property(TierProperty::Rate("7".into()), 3).unwrap_err();
        assert_eq!(err, TierStoreError::IndexOutOfRange { index: 3, len: 3 });
        assert!(s.tiers().iter().all(|t| t.rate != "7"));

        let err = s.set_tier_property(TierProperty::MinCap("1".into()), 2).unwrap_err();
        assert_eq!(err, TierStoreError::GlobalSettingOnTier { field: TierField::MinCap, index: 2 });
    }

    #[test]
    fn editing_end_time_revalidates_next_tier() {
        let mut s = three_tiers();
        s.set_tier_property(TierProperty::EndTime(250), 0).unwrap();
        assert!(!s.are_tiers_valid());
        let v1 = s.validations(1).unwrap();
        assert_eq!(
            v1.start_time.valid,
            Validity::Invalid(InvalidReason::StartsBeforePrevious(0))
        );
        // tier 1 was never edited by hand
        assert!(v1.start_time.pristine);
        assert!(!s.validations(0).unwrap().end_time.pristine);

        s.set_tier_property(TierProperty::EndTime(200), 0).unwrap();
        assert!(s.are_tiers_valid());
    }

    #[test]
    fn field_edits_flip_validity() {
        let mut s = three_tiers();
        s.set_tier_property(TierProperty::Rate("1.5".into()), 1).unwrap();
        let st = &s.validations(1).unwrap().rate;
        assert_eq!(st.visible_error(), Some(&InvalidReason::NotInteger));
        assert!(!s.are_tiers_valid());

        s.set_tier_property(TierProperty::Rate("3".into()), 1).unwrap();
        s.set_tier_property(TierProperty::WalletAddress("0xnope".into()), 2).unwrap();
        assert_eq!(
            s.validations(2).unwrap().wallet_address.valid,
            Validity::Invalid(InvalidReason::InvalidAddress)
        );
    }

    #[test]
    fn min_cap_against_max_supply() {
        let mut s = three_tiers();
        assert_eq!(s.max_supply_units(), U256::from(1500u64) * U256::exp10(18));

        s.set_tier_property(TierProperty::MinCap("1500".into()), 0).unwrap();
        assert!(s.min_cap_status().unwrap().is_valid());

        s.set_tier_property(TierProperty::MinCap("1500.5".into()), 0).unwrap();
        assert!(matches!(
            s.min_cap_status().unwrap().valid,
            Validity::Invalid(InvalidReason::MinCapExceedsSupply { .. })
        ));

        // raising a supply clears the cross-field error
        s.set_tier_property(TierProperty::Supply("501".into()), 2).unwrap();
        assert!(s.min_cap_status().unwrap().is_valid());
        assert!(s.are_tiers_valid());
    }

    #[test]
    fn supply_with_trailing_zero_counts_toward_max_supply() {
        let mut s = store();
        s.add_tier(Tier::new(100, 200, "1000", "500.0"));
        assert!(s.validations(0).unwrap().supply.is_valid());
        assert_eq!(s.max_supply_units(), U256::from(500u64) * U256::exp10(18));

        s.set_tier_property(TierProperty::MinCap("1".into()), 0).unwrap();
        assert!(s.min_cap_status().unwrap().is_valid());
        assert!(s.are_tiers_valid());

        s.set_tier_property(TierProperty::MinCap("500.5".into()), 0).unwrap();
        assert!(!s.min_cap_status().unwrap().is_valid());
    }

    #[test]
    fn whitelist_only_checked_while_enabled() {
        let mut s = three_tiers();
        let broken = WhitelistEntry { address: "0xnope".into(), min: "5".into(), max: "1".into() };
        s.set_tier_property(TierProperty::Whitelist(vec![broken]), 1).unwrap();
        assert!(s.validations(1).unwrap().whitelist.is_valid());
        assert!(s.are_tiers_valid());

        s.set_tier_property(TierProperty::WhitelistEnabled(true), 0).unwrap();
        assert!(!s.validations(1).unwrap().whitelist.is_valid());
        assert!(!s.are_tiers_valid());

        s.set_tier_property(TierProperty::WhitelistEnabled(false), 0).unwrap();
        assert!(s.validations(1).unwrap().whitelist.is_valid());
        assert!(s.are_tiers_valid());
    }

    #[test]
    fn toggling_whitelist_resets_min_cap() {
        let mut s = three_tiers();
        s.set_tier_property(TierProperty::MinCap("-1".into()), 0).unwrap();
        assert!(!s.are_tiers_valid());

        s.set_tier_property(TierProperty::WhitelistEnabled(true), 0).unwrap();
        let t0 = s.tier(0).unwrap();
        assert!(t0.min_cap.is_empty());
        let st = s.min_cap_status().unwrap();
        assert!(st.is_valid());
        assert!(!st.pristine);
        assert!(s.whitelist_enabled());
    }

    #[test]
    fn whitelist_seed_and_count() {
        let mut s = three_tiers();
        let entry = WhitelistEntry {
            address: "0x0000000000000000000000000000000000000001".into(),
            min: "1".into(),
            max: "5".into(),
        };
        let seeded = s.seed_whitelists(vec![
            TierWhitelist { tier: 0, entries: vec![entry.clone()] },
            TierWhitelist { tier: 1, entries: vec![entry.clone(), entry.clone()] },
            TierWhitelist { tier: 9, entries: vec![entry] },
        ]);
        assert_eq!(seeded, 2);
        assert_eq!(s.whitelist_count(), 0);

        s.set_tier_property(TierProperty::WhitelistEnabled(true), 0).unwrap();
        assert_eq!(s.whitelist_count(), 3);
        assert!(s.are_tiers_valid());
    }

    #[test]
    fn mark_all_dirty_exposes_errors() {
        let mut s = store();
        s.add_tier(Tier::new(100, 50, "", "10"));
        let v = s.validations(0).unwrap();
        assert!(v.rate.visible_error().is_none());
        s.mark_all_dirty();
        let v = s.validations(0).unwrap();
        assert_eq!(v.rate.visible_error(), Some(&InvalidReason::Empty));
        assert_eq!(v.end_time.visible_error(), Some(&InvalidReason::EndNotAfterStart));
        assert_eq!(v.invalid_fields().count(), 3);
    }

    #[test]
    fn contracts_known_only_when_all_assigned() {
        let mut s = three_tiers();
        s.assign_contract(0, Address::repeat_byte(1)).unwrap();
        assert!(s.contract_addresses().is_none());
        s.assign_contract(1, Address::repeat_byte(2)).unwrap();
        s.assign_contract(2, Address::repeat_byte(3)).unwrap();
        assert_eq!(s.contract_addresses().unwrap().len(), 3);
        assert!(s.assign_contract(3, Address::zero()).is_err());
    }
}

// crowdsale-core/launchpad/src/deploy.rs
//! Gate between tier configuration and deployment.

use std::fmt;

use ethers_core::types::U256;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::chain::{Alert, AlertPresenter, ChainClient};
use crate::gas::GasPriceStore;
use crate::tiers::{TierField, TierStore};
use crate::validate::InvalidReason;

pub const MAINNET_CHAIN_ID: u64 = 1;

/// Summary of what is about to be deployed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeploymentPlan {
    pub tiers_count: usize,
    pub reserved_count: usize,
    pub has_reserved_tokens: bool,
    pub has_whitelist: bool,
    pub whitelist_count: usize,
    /// Wei per gas.
    pub gas_price: U256,
    /// Set when the wallet is connected to Ethereum mainnet.
    pub mainnet_warning: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeployBlocker {
    #[error("no tiers configured")]
    NoTiers,
    #[error("tier {index} {field}: {reason}")]
    InvalidField { index: usize, field: TierField, reason: InvalidReason },
    #[error("gas price is not valid")]
    GasPriceInvalid,
    #[error("no gas price available")]
    GasPriceUnavailable,
    #[error("min cap is not valid: {0}")]
    MinCapInvalid(InvalidReason),
    #[error("min cap {min_cap} exceeds max supply {max_supply}")]
    MinCapExceedsSupply { min_cap: U256, max_supply: U256 },
    #[error("chain unavailable: {0}")]
    ChainUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployBlocked(pub Vec<DeployBlocker>);

impl std::error::Error for DeployBlocked {}

impl fmt::Display for DeployBlocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deployment blocked")?;
        for (i, b) in self.0.iter().enumerate() {
            write!(f, "{}{b}", if i == 0 { ": " } else { "; " })?;
        }
        Ok(())
    }
}

/// Checks everything that can be checked offline.
///
/// Windows and fields are revalidated first. On failure every field of every
/// tier is marked edited so its error shows.
pub fn check_deployable(
    store: &mut TierStore,
    gas: &GasPriceStore,
    reserved_count: usize,
) -> Result<DeploymentPlan, DeployBlocked> {
    if store.is_empty() {
        return Err(DeployBlocked(vec![DeployBlocker::NoTiers]));
    }
    store.revalidate_all();

    let mut blockers = Vec::new();
    for index in 0..store.len() {
        let Some(v) = store.validations(index) else { continue };
        for (field, reason) in v.invalid_fields() {
            if field == TierField::MinCap {
                continue;
            }
            blockers.push(DeployBlocker::InvalidField { index, field, reason: reason.clone() });
        }
    }

    let gas_price = if !gas.is_valid() {
        blockers.push(DeployBlocker::GasPriceInvalid);
        None
    } else {
        let price = gas.gas_price();
        if price.is_none() {
            blockers.push(DeployBlocker::GasPriceUnavailable);
        }
        price
    };

    match store.min_cap_status().and_then(|s| s.valid.reason()) {
        Some(InvalidReason::MinCapExceedsSupply { min_cap, max_supply }) => {
            blockers.push(DeployBlocker::MinCapExceedsSupply { min_cap: *min_cap, max_supply: *max_supply })
        }
        Some(reason) => blockers.push(DeployBlocker::MinCapInvalid(reason.clone())),
        None => {}
    }

    match gas_price {
        Some(gas_price) if blockers.is_empty() => {
            let whitelist_count = store.whitelist_count();
            Ok(DeploymentPlan {
                tiers_count: store.len(),
                reserved_count,
                has_reserved_tokens: reserved_count > 0,
                has_whitelist: store.whitelist_enabled() && whitelist_count > 0,
                whitelist_count,
                gas_price,
                mainnet_warning: false,
            })
        }
        _ => {
            store.mark_all_dirty();
            warn!(blockers = blockers.len(), "deployment blocked");
            Err(DeployBlocked(blockers))
        }
    }
}

/// [`check_deployable`], then asks the chain which network the wallet is on
/// and raises the mainnet alert when it is Ethereum mainnet.
pub async fn prepare_deployment<C>(
    store: &mut TierStore,
    gas: &GasPriceStore,
    reserved_count: usize,
    chain: &C,
    alerts: &dyn AlertPresenter,
) -> Result<DeploymentPlan, DeployBlocked>
where
    C: ChainClient + ?Sized,
{
    let mut plan = check_deployable(store, gas, reserved_count)?;
    let chain_id = chain
        .chain_id()
        .await
        .map_err(|e| DeployBlocked(vec![DeployBlocker::ChainUnavailable(e.to_string())]))?;

    plan.mainnet_warning = chain_id == MAINNET_CHAIN_ID;
    if plan.mainnet_warning {
        alerts.notify(&Alert::MainnetDeployment {
            tiers: plan.tiers_count,
            whitelisted: plan.whitelist_count,
            reserved: plan.reserved_count,
            gas_price: plan.gas_price,
        });
    }
    info!(chain_id, tiers = plan.tiers_count, whitelisted = plan.whitelist_count, "deployment plan ready");
    Ok(plan)
}

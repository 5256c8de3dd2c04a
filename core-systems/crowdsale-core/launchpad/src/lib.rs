//! Crowdsale launchpad core
//!
//! - Tier configuration: ordered tiers with time windows, rates, supplies,
//!   wallets and whitelists; every write is validated on the spot
//! - Deployment gate: cross-tier checks, gas price, min cap vs max supply
//! - Investment: locate the open tier, price the order, bound gas, submit
//!   once and wait for the receipt with a timeout and a cancellation token
//! - Collaborators (chain RPC, whitelist source, gas oracle, alerts) are
//!   traits; `memory::MemoryChain` is an in-memory chain for tests
//!
//! Amounts are `U256` in the smallest unit; user input stays decimal text
//! until validated.

#![forbid(unsafe_code)]

pub mod amount;
pub mod chain;
pub mod deploy;
pub mod gas;
pub mod invest;
pub mod locator;
pub mod memory;
pub mod schedule;
pub mod tiers;
pub mod validate;

/// Unix time in seconds, as reported by the chain.
pub type Timestamp = u64;

pub use amount::{AmountError, TokenAmount};
pub use chain::{Alert, AlertPresenter, ChainClient, ChainError, GasPriceOracle, WhitelistService};
pub use deploy::{DeployBlocked, DeployBlocker, DeploymentPlan};
pub use gas::{GasLimitConfig, GasPriceSelection, GasPriceStore};
pub use invest::{FailureReason, InvestConfig, InvestmentPipeline, InvestmentReceipt, PipelineState, SaleContext};
pub use tiers::{Tier, TierField, TierProperty, TierStore, TierStoreError};
pub use validate::{FieldStatus, InvalidReason, Validity};

/// Convenience imports for embedders.
pub mod prelude {
    pub use super::chain::{
        Alert, AlertPresenter, ChainClient, ChainError, GasPriceOracle, GasPriceQuotes, NoopAlerts, Receipt,
        TierWhitelist, TxHash, TxOptions, WhitelistService,
    };
    pub use super::deploy::{check_deployable, prepare_deployment, DeployBlocked, DeploymentPlan};
    pub use super::gas::{bound_gas_limit, compute_wei_to_send, GasLimitConfig, GasPriceSelection, GasPriceStore};
    pub use super::invest::{FailureReason, InvestConfig, InvestmentPipeline, PipelineState, SaleContext};
    pub use super::locator::{discover_joined_tiers, is_sale_finalized, locate_active_tier, ActiveTierHandle};
    pub use super::tiers::{Tier, TierField, TierProperty, TierStore};
    pub use super::validate::{TimeWindow, Validity, WhitelistEntry};
    pub use super::{Timestamp, TokenAmount};
}

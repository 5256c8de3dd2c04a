// crowdsale-core/launchpad/src/chain.rs
//! Collaborators consumed by the core: chain RPC, whitelist source,
//! gas-price oracle and the alert sink.
//!
//! Implementations live outside this crate (JSON-RPC adapter in the investor
//! binary); [`crate::memory::MemoryChain`] is an in-memory one for tests.

use async_trait::async_trait;
use ethers_core::abi::Token;
use ethers_core::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::TokenAmount;
use crate::invest::FailureReason;
use crate::validate::WhitelistEntry;
use crate::Timestamp;

pub type TxHash = H256;

/// Contract methods the core reads or calls on a tier contract.
pub mod methods {
    pub const STARTS_AT: &str = "startsAt";
    pub const ENDS_AT: &str = "endsAt";
    pub const HALTED: &str = "halted";
    pub const FINALIZED: &str = "finalized";
    pub const RATE: &str = "rate";
    pub const JOINED_LEN: &str = "joinedCrowdsalesLen";
    pub const JOINED_AT: &str = "joinedCrowdsales";
    pub const BUY: &str = "buy";
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The node answered with an error; worth retrying.
    #[error("rpc error: {0}")]
    Rpc(String),
    /// Transport to the node is gone.
    #[error("provider connection lost: {0}")]
    ConnectionLost(String),
    /// Signature declined or transaction refused by the provider.
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Options attached to a state-changing call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub from: Address,
    pub value: U256,
    pub gas_price: Option<U256>,
    pub gas_limit: Option<U256>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    /// `None` while the transaction is pending.
    pub block_number: Option<u64>,
    /// `Some(1)` success, `Some(0)` reverted, `None` for pre-Byzantium nodes.
    pub status: Option<u64>,
}

impl Receipt {
    pub fn is_mined(&self) -> bool {
        self.block_number.is_some()
    }

    pub fn is_reverted(&self) -> bool {
        self.status == Some(0)
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Accounts the connected wallet exposes; the first one invests.
    async fn accounts(&self) -> Result<Vec<Address>, ChainError>;

    /// Read-only contract call returning the first output value.
    async fn call(&self, contract: Address, method: &str, args: Vec<Token>) -> Result<Token, ChainError>;

    async fn send_transaction(
        &self,
        contract: Address,
        method: &str,
        args: Vec<Token>,
        opts: &TxOptions,
    ) -> Result<TxHash, ChainError>;

    async fn transaction_receipt(&self, tx: TxHash) -> Result<Option<Receipt>, ChainError>;

    async fn estimate_gas(
        &self,
        contract: Address,
        method: &str,
        args: Vec<Token>,
        opts: &TxOptions,
    ) -> Result<U256, ChainError>;

    /// Timestamp of the latest block.
    async fn block_timestamp(&self) -> Result<Timestamp, ChainError>;

    async fn chain_id(&self) -> Result<u64, ChainError>;
}

/// Whitelist of one tier as delivered by the whitelist source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierWhitelist {
    pub tier: usize,
    pub entries: Vec<WhitelistEntry>,
}

#[async_trait]
pub trait WhitelistService: Send + Sync {
    /// Read once at session start to seed the tier store.
    async fn fetch_capped_assets(&self) -> Result<Vec<TierWhitelist>, ChainError>;
}

/// Gas price presets in wei.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceQuotes {
    pub slow: U256,
    pub standard: U256,
    pub fast: U256,
}

#[async_trait]
pub trait GasPriceOracle: Send + Sync {
    async fn quotes(&self) -> Result<GasPriceQuotes, ChainError>;
}

/// User-facing notifications. Fire-and-forget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Alert {
    Failed(FailureReason),
    Succeeded { tokens: TokenAmount },
    NoGasPriceAvailable,
    InvalidCrowdsaleAddress(String),
    MainnetDeployment { tiers: usize, whitelisted: usize, reserved: usize, gas_price: U256 },
}

pub trait AlertPresenter: Send + Sync {
    fn notify(&self, alert: &Alert);
}

#[derive(Default)]
pub struct NoopAlerts;
impl AlertPresenter for NoopAlerts {
    fn notify(&self, _alert: &Alert) {}
}

pub fn token_to_uint(method: &str, token: Token) -> Result<U256, ChainError> {
    token
        .into_uint()
        .ok_or_else(|| ChainError::Decode(format!("{method}: expected uint")))
}

pub fn token_to_bool(method: &str, token: Token) -> Result<bool, ChainError> {
    token
        .into_bool()
        .ok_or_else(|| ChainError::Decode(format!("{method}: expected bool")))
}

pub fn token_to_address(method: &str, token: Token) -> Result<Address, ChainError> {
    token
        .into_address()
        .ok_or_else(|| ChainError::Decode(format!("{method}: expected address")))
}

/// Values beyond `u64` clamp to `u64::MAX`.
pub fn uint_to_timestamp(value: U256) -> Timestamp {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_u64()
    }
}

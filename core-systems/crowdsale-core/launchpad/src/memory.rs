// crowdsale-core/launchpad/src/memory.rs
//! In-memory chain with scriptable tier contracts and failures.
//!
//! Backs the unit tests of this crate. Time only moves when told to.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use ethers_core::abi::Token;
use ethers_core::types::{Address, H256, U256};
use parking_lot::Mutex;

use crate::chain::{methods, ChainClient, ChainError, Receipt, TxHash, TxOptions};
use crate::Timestamp;

/// State of one tier contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryTier {
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub halted: bool,
    pub finalized: bool,
    pub rate: U256,
    /// Joined crowdsale list; `None` behaves like a contract without one.
    pub joined: Option<Vec<Address>>,
}

impl MemoryTier {
    pub fn new(starts_at: Timestamp, ends_at: Timestamp, rate: u64) -> Self {
        Self { starts_at, ends_at, halted: false, finalized: false, rate: U256::from(rate), joined: None }
    }

    pub fn joined(mut self, tiers: Vec<Address>) -> Self {
        self.joined = Some(tiers);
        self
    }
}

/// A transaction accepted by [`MemoryChain::send_transaction`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentTransaction {
    pub hash: TxHash,
    pub contract: Address,
    pub method: String,
    pub opts: TxOptions,
}

struct Inner {
    now: Timestamp,
    chain_id: u64,
    connected: bool,
    accounts: Vec<Address>,
    tiers: HashMap<Address, MemoryTier>,
    gas_estimate: Option<U256>,
    reject_next_send: Option<String>,
    confirm_after_polls: u32,
    revert: bool,
    receipt_errors: VecDeque<ChainError>,
    receipt_polls: HashMap<TxHash, u32>,
    sent: Vec<SentTransaction>,
    calls: u64,
}

pub struct MemoryChain {
    inner: Mutex<Inner>,
}

impl MemoryChain {
    /// Chain id 1337, one funded account, gas estimate of 200k, receipts
    /// mined on the first poll.
    pub fn new(now: Timestamp) -> Self {
        Self {
            inner: Mutex::new(Inner {
                now,
                chain_id: 1337,
                connected: true,
                accounts: vec![Address::repeat_byte(0xaa)],
                tiers: HashMap::new(),
                gas_estimate: Some(U256::from(200_000u64)),
                reject_next_send: None,
                confirm_after_polls: 1,
                revert: false,
                receipt_errors: VecDeque::new(),
                receipt_polls: HashMap::new(),
                sent: Vec::new(),
                calls: 0,
            }),
        }
    }

    pub fn add_tier(&self, contract: Address, tier: MemoryTier) {
        self.inner.lock().tiers.insert(contract, tier);
    }

    pub fn set_now(&self, now: Timestamp) {
        self.inner.lock().now = now;
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.inner.lock().chain_id = chain_id;
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.inner.lock().accounts = accounts;
    }

    pub fn set_halted(&self, contract: Address, halted: bool) {
        if let Some(t) = self.inner.lock().tiers.get_mut(&contract) {
            t.halted = halted;
        }
    }

    pub fn set_finalized(&self, contract: Address, finalized: bool) {
        if let Some(t) = self.inner.lock().tiers.get_mut(&contract) {
            t.finalized = finalized;
        }
    }

    /// `None` makes `estimate_gas` fail.
    pub fn set_gas_estimate(&self, estimate: Option<U256>) {
        self.inner.lock().gas_estimate = estimate;
    }

    pub fn reject_next_send(&self, reason: impl Into<String>) {
        self.inner.lock().reject_next_send = Some(reason.into());
    }

    /// Receipts stay pending until polled `polls` times.
    pub fn confirm_after(&self, polls: u32) {
        self.inner.lock().confirm_after_polls = polls;
    }

    /// Mined receipts report status 0.
    pub fn revert_transactions(&self, revert: bool) {
        self.inner.lock().revert = revert;
    }

    /// Queues errors returned by the next receipt polls, in order.
    pub fn fail_receipt_polls(&self, errors: impl IntoIterator<Item = ChainError>) {
        self.inner.lock().receipt_errors.extend(errors);
    }

    /// Every subsequent request fails with `ConnectionLost`.
    pub fn disconnect(&self) {
        self.inner.lock().connected = false;
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.inner.lock().sent.clone()
    }

    /// Read-only calls served so far.
    pub fn call_count(&self) -> u64 {
        self.inner.lock().calls
    }

    pub fn receipt_polls(&self, tx: TxHash) -> u32 {
        self.inner.lock().receipt_polls.get(&tx).copied().unwrap_or(0)
    }

    fn check_connected(inner: &Inner) -> Result<(), ChainError> {
        if inner.connected {
            Ok(())
        } else {
            Err(ChainError::ConnectionLost("memory chain disconnected".into()))
        }
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        let inner = self.inner.lock();
        Self::check_connected(&inner)?;
        Ok(inner.accounts.clone())
    }

    async fn call(&self, contract: Address, method: &str, args: Vec<Token>) -> Result<Token, ChainError> {
        let mut inner = self.inner.lock();
        Self::check_connected(&inner)?;
        inner.calls += 1;
        let tier = inner
            .tiers
            .get(&contract)
            .ok_or_else(|| ChainError::Rpc(format!("no contract at {contract:#x}")))?;
        match method {
            methods::STARTS_AT => Ok(Token::Uint(U256::from(tier.starts_at))),
            methods::ENDS_AT => Ok(Token::Uint(U256::from(tier.ends_at))),
            methods::HALTED => Ok(Token::Bool(tier.halted)),
            methods::FINALIZED => Ok(Token::Bool(tier.finalized)),
            methods::RATE => Ok(Token::Uint(tier.rate)),
            methods::JOINED_LEN => match &tier.joined {
                Some(list) => Ok(Token::Uint(U256::from(list.len()))),
                None => Err(ChainError::Rpc("execution reverted".into())),
            },
            methods::JOINED_AT => {
                let index = match args.first() {
                    Some(Token::Uint(i)) if *i <= U256::from(u32::MAX) => i.as_usize(),
                    _ => return Err(ChainError::Decode("joinedCrowdsales expects an index".into())),
                };
                tier.joined
                    .as_ref()
                    .and_then(|list| list.get(index))
                    .map(|a| Token::Address(*a))
                    .ok_or_else(|| ChainError::Rpc("execution reverted".into()))
            }
            other => Err(ChainError::Unsupported(other.to_string())),
        }
    }

    async fn send_transaction(
        &self,
        contract: Address,
        method: &str,
        _args: Vec<Token>,
        opts: &TxOptions,
    ) -> Result<TxHash, ChainError> {
        let mut inner = self.inner.lock();
        Self::check_connected(&inner)?;
        if let Some(reason) = inner.reject_next_send.take() {
            return Err(ChainError::Rejected(reason));
        }
        let hash = H256::from_low_u64_be(inner.sent.len() as u64 + 1);
        inner.sent.push(SentTransaction { hash, contract, method: method.to_string(), opts: opts.clone() });
        Ok(hash)
    }

    async fn transaction_receipt(&self, tx: TxHash) -> Result<Option<Receipt>, ChainError> {
        let mut inner = self.inner.lock();
        Self::check_connected(&inner)?;
        if let Some(err) = inner.receipt_errors.pop_front() {
            return Err(err);
        }
        if !inner.sent.iter().any(|s| s.hash == tx) {
            return Ok(None);
        }
        let polls = {
            let p = inner.receipt_polls.entry(tx).or_insert(0);
            *p += 1;
            *p
        };
        if polls < inner.confirm_after_polls {
            return Ok(None);
        }
        Ok(Some(Receipt {
            tx_hash: tx,
            block_number: Some(inner.now),
            status: Some(if inner.revert { 0 } else { 1 }),
        }))
    }

    async fn estimate_gas(
        &self,
        _contract: Address,
        _method: &str,
        _args: Vec<Token>,
        _opts: &TxOptions,
    ) -> Result<U256, ChainError> {
        let inner = self.inner.lock();
        Self::check_connected(&inner)?;
        inner
            .gas_estimate
            .ok_or_else(|| ChainError::Rpc("gas required exceeds allowance".into()))
    }

    async fn block_timestamp(&self) -> Result<Timestamp, ChainError> {
        let inner = self.inner.lock();
        Self::check_connected(&inner)?;
        Ok(inner.now)
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        let inner = self.inner.lock();
        Self::check_connected(&inner)?;
        Ok(inner.chain_id)
    }
}

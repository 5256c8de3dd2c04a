// crowdsale-core/launchpad/src/invest.rs
//! Investment pipeline: validate -> locate tier -> estimate gas -> submit -> confirm.
//!
//! One attempt runs at a time per pipeline. Every attempt ends in exactly one
//! terminal state, reported once to the [`AlertPresenter`]. Stages run in
//! order and each external call is an await point; dropping the attempt (or
//! cancelling its token) stops confirmation polling.

use std::sync::Arc;
use std::time::Duration;

use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::amount::TokenAmount;
use crate::chain::{methods, Alert, AlertPresenter, ChainClient, ChainError, Receipt, TxHash, TxOptions};
use crate::gas::{compute_wei_to_send, GasLimitConfig, GasPriceStore};
use crate::locator::{discover_joined_tiers, locate_active_tier, read_rate, read_sale_window, ActiveTierHandle};
use crate::validate::{parse_numeric, InvalidReason, NumericRules};
use crate::Timestamp;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_CONFIRM_TIMEOUT_MS: u64 = 10 * 60 * 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestConfig {
    pub gas: GasLimitConfig,
    /// Delay between receipt polls.
    pub poll_interval_ms: u64,
    /// Upper bound on the whole confirmation wait.
    pub confirm_timeout_ms: u64,
}

impl Default for InvestConfig {
    fn default() -> Self {
        Self {
            gas: GasLimitConfig::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            confirm_timeout_ms: DEFAULT_CONFIRM_TIMEOUT_MS,
        }
    }
}

impl InvestConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineState {
    Idle,
    Validating,
    LocatingTier,
    EstimatingGas,
    Submitting,
    Confirming,
    Succeeded,
    Failed,
}

impl PipelineState {
    /// True while an attempt is between `Validating` and `Confirming`.
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            PipelineState::Validating
                | PipelineState::LocatingTier
                | PipelineState::EstimatingGas
                | PipelineState::Submitting
                | PipelineState::Confirming
        )
    }
}

/// Why an attempt ended in `Failed`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("invalid amount: {0}")]
    InvalidAmount(InvalidReason),
    #[error("no wallet connected")]
    NoWalletConnected,
    #[error("sale has not started yet (starts at {starts_at})")]
    SaleNotStarted { starts_at: Timestamp },
    #[error("no tier is open for investment")]
    NoActiveTier,
    #[error("transaction rejected: {0}")]
    TransactionRejected(String),
    #[error("transaction {tx:#x} reverted")]
    TransactionReverted { tx: TxHash },
    #[error("transaction {tx:#x} not confirmed in time")]
    ConfirmationTimedOut { tx: TxHash },
    #[error("{0}")]
    ConnectionLost(String),
    #[error("chain unavailable: {0}")]
    ChainUnavailable(String),
    #[error("cancelled")]
    Cancelled,
    #[error("another investment is in progress")]
    AttemptInProgress,
}

fn chain_failure(e: ChainError) -> FailureReason {
    match e {
        ChainError::ConnectionLost(_) => FailureReason::ConnectionLost(e.to_string()),
        other => FailureReason::ChainUnavailable(other.to_string()),
    }
}

/// Sale facts the pipeline needs, resolved once per session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleContext {
    /// Tier contracts in tier order.
    pub tier_addresses: Vec<Address>,
    /// When the first tier opens.
    pub sale_start: Timestamp,
    pub token_decimals: u32,
}

impl SaleContext {
    /// Reads the tier list and sale start from the crowdsale at `crowdsale`.
    pub async fn discover<C>(chain: &C, crowdsale: Address, token_decimals: u32) -> Result<Self, ChainError>
    where
        C: ChainClient + ?Sized,
    {
        let tier_addresses = discover_joined_tiers(chain, crowdsale).await?;
        let window = read_sale_window(chain, &tier_addresses).await?;
        Ok(Self {
            sale_start: window.map(|w| w.start).unwrap_or_default(),
            tier_addresses,
            token_decimals,
        })
    }
}

/// Everything decided before the funding transaction goes out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvestmentIntent {
    pub tokens: TokenAmount,
    pub tier: ActiveTierHandle,
    pub wei: U256,
    pub gas_limit: U256,
    pub from: Address,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvestmentReceipt {
    pub intent: InvestmentIntent,
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

impl InvestmentReceipt {
    pub fn tokens(&self) -> &TokenAmount {
        &self.intent.tokens
    }
}

/// Amount check for an investment: strictly positive, within token precision.
pub fn parse_investment(tokens: &str, token_decimals: u32) -> Result<TokenAmount, InvalidReason> {
    let rules = NumericRules { max_decimals: Some(token_decimals), ..NumericRules::default() };
    match parse_numeric(tokens, &rules)? {
        Some(amount) if !amount.is_zero() => Ok(amount),
        Some(_) => Err(InvalidReason::NotPositive),
        None => Err(InvalidReason::Empty),
    }
}

pub struct InvestmentPipeline<C: ChainClient + ?Sized> {
    chain: Arc<C>,
    alerts: Arc<dyn AlertPresenter>,
    gas_prices: Arc<GasPriceStore>,
    cfg: InvestConfig,
    state: watch::Sender<PipelineState>,
    attempt: Mutex<()>,
}

impl<C: ChainClient + ?Sized> InvestmentPipeline<C> {
    pub fn new(
        chain: Arc<C>,
        alerts: Arc<dyn AlertPresenter>,
        gas_prices: Arc<GasPriceStore>,
        cfg: InvestConfig,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self { chain, alerts, gas_prices, cfg, state, attempt: Mutex::new(()) }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    fn set_state(&self, next: PipelineState) {
        debug!(?next, "pipeline state");
        self.state.send_replace(next);
    }

    /// Runs one investment attempt for `tokens` (decimal text).
    ///
    /// Resolves to the receipt or to the failure reason; either way the
    /// outcome has already been reported to the alert presenter.
    pub async fn invest(
        &self,
        ctx: &SaleContext,
        tokens: &str,
        cancel: &CancellationToken,
    ) -> Result<InvestmentReceipt, FailureReason> {
        let Ok(_guard) = self.attempt.try_lock() else {
            let reason = FailureReason::AttemptInProgress;
            warn!(%reason, "investment refused");
            self.alerts.notify(&Alert::Failed(reason.clone()));
            return Err(reason);
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FailureReason::Cancelled),
            r = self.run(ctx, tokens) => r,
        };

        match &outcome {
            Ok(receipt) => {
                self.set_state(PipelineState::Succeeded);
                info!(tokens = %receipt.intent.tokens, tx = ?receipt.tx_hash, tier = receipt.intent.tier.tier_index, "investment confirmed");
                self.alerts.notify(&Alert::Succeeded { tokens: receipt.intent.tokens });
            }
            Err(reason) => {
                self.set_state(PipelineState::Failed);
                warn!(%reason, "investment failed");
                self.alerts.notify(&Alert::Failed(reason.clone()));
            }
        }
        outcome
    }

    #[instrument(skip(self, ctx), fields(tiers = ctx.tier_addresses.len()))]
    async fn run(&self, ctx: &SaleContext, tokens: &str) -> Result<InvestmentReceipt, FailureReason> {
        self.set_state(PipelineState::Validating);
        let tokens = parse_investment(tokens, ctx.token_decimals).map_err(FailureReason::InvalidAmount)?;
        let from = self.investor_account().await?;
        let now = self.chain.block_timestamp().await.map_err(chain_failure)?;
        if now < ctx.sale_start {
            return Err(FailureReason::SaleNotStarted { starts_at: ctx.sale_start });
        }

        self.set_state(PipelineState::LocatingTier);
        let tier = locate_active_tier(&*self.chain, &ctx.tier_addresses, 0, now)
            .await
            .map_err(chain_failure)?
            .ok_or(FailureReason::NoActiveTier)?;
        let rate = read_rate(&*self.chain, tier.contract).await.map_err(chain_failure)?;
        let wei = compute_wei_to_send(&tokens, rate).ok_or(FailureReason::InvalidAmount(InvalidReason::TooLarge))?;

        self.set_state(PipelineState::EstimatingGas);
        let mut opts = TxOptions { from, value: wei, gas_price: self.gas_prices.gas_price(), gas_limit: None };
        let estimate = match self.chain.estimate_gas(tier.contract, methods::BUY, vec![], &opts).await {
            Ok(gas) => Some(gas),
            Err(e) => {
                warn!(error = %e, "gas estimation failed, falling back to hard cap");
                None
            }
        };
        let gas_limit = self.cfg.gas.bound(estimate);
        opts.gas_limit = Some(gas_limit);
        let intent = InvestmentIntent { tokens, tier, wei, gas_limit, from };

        self.set_state(PipelineState::Submitting);
        let tx_hash = self
            .chain
            .send_transaction(tier.contract, methods::BUY, vec![], &opts)
            .await
            .map_err(|e| FailureReason::TransactionRejected(e.to_string()))?;
        info!(tx = ?tx_hash, %wei, %gas_limit, tier = tier.tier_index, "funding transaction sent");

        self.set_state(PipelineState::Confirming);
        let receipt = self.confirm(tx_hash).await?;
        if receipt.is_reverted() {
            return Err(FailureReason::TransactionReverted { tx: tx_hash });
        }
        Ok(InvestmentReceipt { intent, tx_hash, block_number: receipt.block_number })
    }

    async fn investor_account(&self) -> Result<Address, FailureReason> {
        let accounts = self.chain.accounts().await.map_err(chain_failure)?;
        accounts.first().copied().ok_or(FailureReason::NoWalletConnected)
    }

    /// Polls until the receipt is mined. RPC errors are retried; a lost
    /// connection or the timeout ends the wait.
    async fn confirm(&self, tx: TxHash) -> Result<Receipt, FailureReason> {
        let poll = async {
            let mut ticker = interval(self.cfg.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.chain.transaction_receipt(tx).await {
                    Ok(Some(receipt)) if receipt.is_mined() => return Ok(receipt),
                    Ok(_) => {}
                    Err(e @ ChainError::ConnectionLost(_)) => return Err(chain_failure(e)),
                    Err(e) => debug!(error = %e, "receipt poll failed, retrying"),
                }
            }
        };
        match timeout(self.cfg.confirm_timeout(), poll).await {
            Ok(result) => result,
            Err(_) => Err(FailureReason::ConfirmationTimedOut { tx }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryChain, MemoryTier};
    use parking_lot::Mutex as SyncMutex;

    #[derive(Default)]
    struct RecordingAlerts {
        seen: SyncMutex<Vec<Alert>>,
    }

    impl AlertPresenter for RecordingAlerts {
        fn notify(&self, alert: &Alert) {
            self.seen.lock().push(alert.clone());
        }
    }

    impl RecordingAlerts {
        fn all(&self) -> Vec<Alert> {
            self.seen.lock().clone()
        }
    }

    struct Fixture {
        chain: Arc<MemoryChain>,
        alerts: Arc<RecordingAlerts>,
        pipeline: InvestmentPipeline<MemoryChain>,
        ctx: SaleContext,
    }

    fn fixture(now: Timestamp, cfg: InvestConfig) -> Fixture {
        let chain = Arc::new(MemoryChain::new(now));
        let tiers = vec![Address::repeat_byte(1), Address::repeat_byte(2), Address::repeat_byte(3)];
        chain.add_tier(tiers[0], MemoryTier::new(100, 200, 1000));
        chain.add_tier(tiers[1], MemoryTier::new(200, 300, 1000));
        chain.add_tier(tiers[2], MemoryTier::new(300, 400, 2000));
        let alerts = Arc::new(RecordingAlerts::default());
        let pipeline = InvestmentPipeline::new(chain.clone(), alerts.clone(), Arc::new(GasPriceStore::new()), cfg);
        let ctx = SaleContext { tier_addresses: tiers, sale_start: 100, token_decimals: 18 };
        Fixture { chain, alerts, pipeline, ctx }
    }

    fn failure(f: &Fixture) -> Option<FailureReason> {
        f.alerts.all().into_iter().find_map(|a| match a {
            Alert::Failed(r) => Some(r),
            _ => None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn ten_tokens_at_rate_1000() {
        let f = fixture(250, InvestConfig::default());
        let receipt = f.pipeline.invest(&f.ctx, "10", &CancellationToken::new()).await.unwrap();

        assert_eq!(receipt.tokens().to_string(), "10");
        assert_eq!(receipt.intent.wei, U256::from(10_000u64));
        assert_eq!(receipt.intent.tier.tier_index, 1);
        assert_eq!(receipt.intent.gas_limit, U256::from(300_000u64));
        assert_eq!(f.pipeline.state(), PipelineState::Succeeded);
        assert!(!f.pipeline.state().is_loading());

        let sent = f.chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, methods::BUY);
        assert_eq!(sent[0].contract, Address::repeat_byte(2));
        assert_eq!(sent[0].opts.value, U256::from(10_000u64));
        assert_eq!(f.alerts.all(), vec![Alert::Succeeded { tokens: TokenAmount::new(10, 0) }]);
    }

    #[tokio::test(start_paused = true)]
    async fn sale_not_started_never_submits() {
        let f = fixture(50, InvestConfig::default());
        let err = f.pipeline.invest(&f.ctx, "10", &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, FailureReason::SaleNotStarted { starts_at: 100 });
        assert!(f.chain.sent().is_empty());
        assert_eq!(f.pipeline.state(), PipelineState::Failed);
        assert_eq!(f.alerts.all(), vec![Alert::Failed(err)]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_bad_amounts() {
        let f = fixture(250, InvestConfig::default());
        let cancel = CancellationToken::new();
        for (input, reason) in [
            ("0", InvalidReason::NotPositive),
            ("", InvalidReason::Empty),
            ("ten", InvalidReason::NotNumeric),
            ("-1", InvalidReason::Negative),
        ] {
            let err = f.pipeline.invest(&f.ctx, input, &cancel).await.unwrap_err();
            assert_eq!(err, FailureReason::InvalidAmount(reason), "input {input:?}");
        }

        let whole_tokens = SaleContext { token_decimals: 0, ..f.ctx.clone() };
        let err = f.pipeline.invest(&whole_tokens, "1.5", &cancel).await.unwrap_err();
        assert_eq!(err, FailureReason::InvalidAmount(InvalidReason::TooManyDecimals(0)));
        assert!(f.chain.sent().is_empty());
        assert_eq!(f.alerts.all().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn needs_a_wallet() {
        let f = fixture(250, InvestConfig::default());
        f.chain.set_accounts(vec![]);
        let err = f.pipeline.invest(&f.ctx, "1", &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, FailureReason::NoWalletConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn no_open_tier_aborts_gracefully() {
        let f = fixture(450, InvestConfig::default());
        let err = f.pipeline.invest(&f.ctx, "1", &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, FailureReason::NoActiveTier);
        assert!(!f.pipeline.state().is_loading());
        assert_eq!(failure(&f), Some(FailureReason::NoActiveTier));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_estimate_uses_hard_cap() {
        let f = fixture(350, InvestConfig::default());
        f.chain.set_gas_estimate(None);
        let receipt = f.pipeline.invest(&f.ctx, "0.5", &CancellationToken::new()).await.unwrap();
        assert_eq!(receipt.intent.gas_limit, U256::from(4_016_260u64));
        assert_eq!(receipt.intent.wei, U256::from(1_000u64));
        assert_eq!(f.chain.sent()[0].opts.gas_limit, Some(U256::from(4_016_260u64)));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_send_is_not_retried() {
        let f = fixture(250, InvestConfig::default());
        f.chain.reject_next_send("user denied signature");
        let err = f.pipeline.invest(&f.ctx, "1", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, FailureReason::TransactionRejected(ref m) if m.contains("user denied")));
        assert!(f.chain.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reverted_receipt_fails() {
        let f = fixture(250, InvestConfig::default());
        f.chain.revert_transactions(true);
        let err = f.pipeline.invest(&f.ctx, "1", &CancellationToken::new()).await.unwrap_err();
        let tx = f.chain.sent()[0].hash;
        assert_eq!(err, FailureReason::TransactionReverted { tx });
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_errors_are_retried() {
        let f = fixture(250, InvestConfig::default());
        f.chain.confirm_after(2);
        f.chain.fail_receipt_polls([ChainError::Rpc("busy".into()), ChainError::Decode("garbled".into())]);
        let receipt = f.pipeline.invest(&f.ctx, "1", &CancellationToken::new()).await.unwrap();
        assert_eq!(f.chain.receipt_polls(receipt.tx_hash), 2);
        assert_eq!(f.chain.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection_stops_polling() {
        let f = fixture(250, InvestConfig::default());
        f.chain.confirm_after(5);
        f.chain.fail_receipt_polls([ChainError::ConnectionLost("socket closed".into())]);
        let err = f.pipeline.invest(&f.ctx, "1", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, FailureReason::ConnectionLost(_)));
        assert_eq!(f.chain.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_times_out() {
        let cfg = InvestConfig { confirm_timeout_ms: 2_000, ..InvestConfig::default() };
        let f = fixture(250, cfg);
        f.chain.confirm_after(u32::MAX);
        let err = f.pipeline.invest(&f.ctx, "1", &CancellationToken::new()).await.unwrap_err();
        let tx = f.chain.sent()[0].hash;
        assert_eq!(err, FailureReason::ConfirmationTimedOut { tx });
        // one poll up front, then one every 500ms
        assert!(f.chain.receipt_polls(tx) >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_attempt() {
        let f = fixture(250, InvestConfig::default());
        f.chain.confirm_after(u32::MAX);
        let cancel = CancellationToken::new();
        let (res, _) = tokio::join!(f.pipeline.invest(&f.ctx, "1", &cancel), async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            cancel.cancel();
        });
        assert_eq!(res.unwrap_err(), FailureReason::Cancelled);
        assert_eq!(failure(&f), Some(FailureReason::Cancelled));

        let tx = f.chain.sent()[0].hash;
        let polls = f.chain.receipt_polls(tx);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.chain.receipt_polls(tx), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn second_attempt_is_refused_while_one_runs() {
        let f = fixture(250, InvestConfig::default());
        f.chain.confirm_after(3);
        let rx = f.pipeline.subscribe();
        let cancel = CancellationToken::new();
        let (first, second) = tokio::join!(f.pipeline.invest(&f.ctx, "1", &cancel), async {
            assert_eq!(*rx.borrow(), PipelineState::Confirming);
            assert!(rx.borrow().is_loading());
            f.pipeline.invest(&f.ctx, "2", &cancel).await
        });
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), FailureReason::AttemptInProgress);
        assert_eq!(f.chain.sent().len(), 1);
        assert_eq!(f.pipeline.state(), PipelineState::Succeeded);
    }

    #[tokio::test]
    async fn context_from_joined_crowdsale() {
        let chain = MemoryChain::new(0);
        let (a, b) = (Address::repeat_byte(1), Address::repeat_byte(2));
        chain.add_tier(a, MemoryTier::new(100, 200, 1).joined(vec![a, b]));
        chain.add_tier(b, MemoryTier::new(200, 300, 1));
        let ctx = SaleContext::discover(&chain, a, 18).await.unwrap();
        assert_eq!(ctx, SaleContext { tier_addresses: vec![a, b], sale_start: 100, token_decimals: 18 });
    }
}

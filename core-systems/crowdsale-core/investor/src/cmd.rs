//! Subcommand bodies. Each takes a [`Session`] so it can run against a live
//! node or the in-memory chain.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use crowdsale_launchpad::prelude::*;
use crowdsale_launchpad::invest::InvestmentReceipt;
use crowdsale_launchpad::locator::{parse_crowdsale_address, read_tier_windows};
use crowdsale_launchpad::schedule::{next_tick, sale_ticks, Countdown, SaleTick};
use crowdsale_launchpad::tiers::TierStoreError;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::adapters::eth::EthChainClient;
use crate::adapters::gas_oracle::NodeGasOracle;
use crate::adapters::whitelist::FileWhitelistService;
use crate::alerts::TracingAlerts;
use crate::config::Config;

/// Collaborators shared by every subcommand.
pub struct Session {
    pub config: Config,
    pub chain: Arc<dyn ChainClient>,
    pub gas_oracle: Arc<dyn GasPriceOracle>,
    pub alerts: Arc<dyn AlertPresenter>,
}

impl Session {
    /// Connects to the configured node. With `chain.private_key` set,
    /// transactions are signed locally.
    pub async fn connect(config: Config) -> Result<Self> {
        let rpc = config.chain.rpc_url.as_str();
        let retry = config.chain.read_retry_max_elapsed;
        let expected_chain_id = config.chain.expected_chain_id;
        let (chain, gas_oracle): (Arc<dyn ChainClient>, Arc<dyn GasPriceOracle>) = match &config.chain.private_key {
            Some(key) => {
                let eth = EthChainClient::with_signer(rpc, key, retry).await.context("connect signer")?;
                if let Some(expected) = expected_chain_id {
                    eth.verify_chain_id(expected).await?;
                }
                let oracle = Arc::new(NodeGasOracle::new(eth.middleware()));
                (Arc::new(eth), oracle)
            }
            None => {
                let eth = EthChainClient::connect(rpc, retry).context("connect provider")?;
                if let Some(expected) = expected_chain_id {
                    eth.verify_chain_id(expected).await?;
                }
                let oracle = Arc::new(NodeGasOracle::new(eth.middleware()));
                (Arc::new(eth), oracle)
            }
        };
        info!(rpc_url = rpc, signer = config.chain.private_key.is_some(), "session ready");
        Ok(Self { config, chain, gas_oracle, alerts: Arc::new(TracingAlerts) })
    }

    fn crowdsale(&self) -> Result<Address> {
        let raw = self.config.sale.crowdsale_address.as_str();
        match parse_crowdsale_address(raw) {
            Some(address) => Ok(address),
            None => {
                self.alerts.notify(&Alert::InvalidCrowdsaleAddress(raw.to_string()));
                bail!("crowdsale address `{raw}` is not valid")
            }
        }
    }

    /// Gas price store primed from config and the oracle.
    async fn gas_prices(&self) -> GasPriceStore {
        let gas = GasPriceStore::new();
        gas.select(self.config.gas_price.selection);
        if let Some(custom) = &self.config.gas_price.custom_gwei {
            gas.set_custom_gwei(custom);
        }
        if gas.update_values(&*self.gas_oracle).await.is_err() {
            self.alerts.notify(&Alert::NoGasPriceAvailable);
        }
        gas
    }
}

/// Tier plan read by `validate`.
///
/// ```toml
/// reserved_tokens = 2
/// min_cap = "10"
///
/// [[tiers]]
/// start = "2026-11-01T00:00:00Z"
/// end = "2026-11-15T00:00:00Z"
/// rate = "1000000000000000"
/// supply = "1000000"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierPlan {
    /// Number of reserved-token holders set up alongside the sale.
    #[serde(default)]
    pub reserved_tokens: usize,
    #[serde(default)]
    pub whitelist_enabled: bool,
    #[serde(default)]
    pub min_cap: String,
    #[serde(default)]
    pub tiers: Vec<PlannedTier>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannedTier {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(with = "humantime_serde")]
    pub start: SystemTime,
    #[serde(with = "humantime_serde")]
    pub end: SystemTime,
    pub rate: String,
    pub supply: String,
    /// Defaults to the connected account on tier 0 and to tier 0's wallet elsewhere.
    #[serde(default)]
    pub wallet: Option<String>,
    #[serde(default)]
    pub whitelist: Vec<WhitelistEntry>,
}

impl TierPlan {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read tier plan: {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse tier plan: {}", path.display()))
    }
}

fn unix_seconds(t: SystemTime) -> Timestamp {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

/// Loads `plan` into `store` field by field, the way an operator would type it.
pub fn apply_plan(store: &mut TierStore, plan: &TierPlan) -> Result<(), TierStoreError> {
    for planned in &plan.tiers {
        let index = store.add_tier(Tier { label: planned.label.clone().unwrap_or_default(), ..Tier::default() });
        store.set_tier_property(TierProperty::StartTime(unix_seconds(planned.start)), index)?;
        store.set_tier_property(TierProperty::EndTime(unix_seconds(planned.end)), index)?;
        store.set_tier_property(TierProperty::Rate(planned.rate.clone()), index)?;
        store.set_tier_property(TierProperty::Supply(planned.supply.clone()), index)?;
        if let Some(wallet) = &planned.wallet {
            store.set_tier_property(TierProperty::WalletAddress(wallet.clone()), index)?;
        }
        if !planned.whitelist.is_empty() {
            store.set_tier_property(TierProperty::Whitelist(planned.whitelist.clone()), index)?;
        }
    }
    if store.is_empty() {
        return Ok(());
    }
    store.set_tier_property(TierProperty::WhitelistEnabled(plan.whitelist_enabled), 0)?;
    if !plan.min_cap.trim().is_empty() {
        store.set_tier_property(TierProperty::MinCap(plan.min_cap.clone()), 0)?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct TierReport {
    pub label: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Field name to error, for fields whose error is shown.
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub tiers: Vec<TierReport>,
    pub whitelists_seeded: usize,
    pub plan: Option<DeploymentPlan>,
    pub blockers: Vec<String>,
}

impl ValidationReport {
    pub fn is_deployable(&self) -> bool {
        self.plan.is_some()
    }
}

fn tier_reports(store: &TierStore) -> Vec<TierReport> {
    store
        .tiers()
        .iter()
        .enumerate()
        .map(|(index, tier)| {
            let errors: BTreeMap<String, String> = store
                .validations(index)
                .map(|v| {
                    TierField::VALIDATED
                        .iter()
                        .filter_map(|f| {
                            let reason = v.get(*f)?.visible_error()?;
                            Some((f.to_string(), reason.to_string()))
                        })
                        .collect()
                })
                .unwrap_or_default();
            TierReport { label: tier.label.clone(), start_time: tier.start_time, end_time: tier.end_time, errors }
        })
        .collect()
}

/// `validate`: load a tier plan, run the deployment gate, report.
#[instrument(skip(session))]
pub async fn validate(session: &Session, tiers_file: &Path) -> Result<ValidationReport> {
    let plan = TierPlan::from_file(tiers_file)?;
    let account = match session.chain.accounts().await {
        Ok(accounts) => accounts.first().copied(),
        Err(e) => {
            warn!(error = %e, "no connected account, tier 0 wallet must be set in the plan");
            None
        }
    };

    let mut store = TierStore::new(session.config.sale.token_decimals, account);
    apply_plan(&mut store, &plan).context("apply tier plan")?;

    let mut whitelists_seeded = 0;
    if let Some(path) = &session.config.sale.whitelist_file {
        let lists = FileWhitelistService::new(path).fetch_capped_assets().await.context("load whitelist seed")?;
        whitelists_seeded = store.seed_whitelists(lists);
    }

    let gas = session.gas_prices().await;
    let outcome =
        prepare_deployment(&mut store, &gas, plan.reserved_tokens, &*session.chain, &*session.alerts).await;

    let (deployment, blockers) = match outcome {
        Ok(p) => (Some(p), Vec::new()),
        Err(DeployBlocked(blockers)) => (None, blockers.iter().map(ToString::to_string).collect()),
    };
    Ok(ValidationReport { tiers: tier_reports(&store), whitelists_seeded, plan: deployment, blockers })
}

#[derive(Debug, Serialize)]
pub struct SaleStatus {
    pub crowdsale: Address,
    pub tiers: Vec<Address>,
    pub now: Timestamp,
    pub active_tier: Option<usize>,
    pub finalized: bool,
    pub windows: Vec<TimeWindow>,
    pub next_tick: Option<SaleTick>,
    /// Time left until `next_tick`.
    pub countdown: Option<String>,
}

/// `status`: where the sale stands right now.
#[instrument(skip(session))]
pub async fn status(session: &Session) -> Result<SaleStatus> {
    let crowdsale = session.crowdsale()?;
    let chain = &*session.chain;
    let tiers = discover_joined_tiers(chain, crowdsale).await.context("discover tiers")?;
    let now = chain.block_timestamp().await.context("read block time")?;
    let active = locate_active_tier(chain, &tiers, 0, now).await.context("locate active tier")?;
    let finalized = is_sale_finalized(chain, &tiers).await.context("read finalized")?;
    let windows = read_tier_windows(chain, &tiers).await.context("read tier windows")?;

    let next = next_tick(&sale_ticks(&windows), now);
    Ok(SaleStatus {
        crowdsale,
        tiers,
        now,
        active_tier: active.map(|a| a.tier_index),
        finalized,
        windows,
        next_tick: next,
        countdown: next.map(|t| Countdown::until(now, t.time).to_string()),
    })
}

/// `invest`: one funding attempt. Cancelling `cancel` stops it.
#[instrument(skip(session, cancel))]
pub async fn invest(session: &Session, tokens: &str, cancel: &CancellationToken) -> Result<InvestmentReceipt> {
    let crowdsale = session.crowdsale()?;
    let ctx = SaleContext::discover(&*session.chain, crowdsale, session.config.sale.token_decimals)
        .await
        .context("discover sale")?;
    let gas = Arc::new(session.gas_prices().await);
    let pipeline = InvestmentPipeline::new(
        Arc::clone(&session.chain),
        Arc::clone(&session.alerts),
        gas,
        session.config.invest.to_core(),
    );
    let receipt = pipeline.invest(&ctx, tokens, cancel).await?;
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crowdsale_launchpad::memory::{MemoryChain, MemoryTier};
    use ethers::types::U256;
    use parking_lot::Mutex;
    use std::io::Write;

    struct FixedOracle(Option<u64>);

    #[async_trait]
    impl GasPriceOracle for FixedOracle {
        async fn quotes(&self) -> Result<GasPriceQuotes, ChainError> {
            match self.0 {
                Some(p) => Ok(GasPriceQuotes { slow: U256::from(p), standard: U256::from(p), fast: U256::from(p) }),
                None => Err(ChainError::ConnectionLost("oracle down".into())),
            }
        }
    }

    #[derive(Default)]
    struct Seen(Mutex<Vec<Alert>>);

    impl AlertPresenter for Seen {
        fn notify(&self, alert: &Alert) {
            self.0.lock().push(alert.clone());
        }
    }

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    fn session(chain: Arc<MemoryChain>, oracle: Option<u64>, alerts: Arc<Seen>) -> Session {
        let mut config = Config::default();
        config.sale.crowdsale_address = format!("{:#x}", addr(1));
        Session { config, chain, gas_oracle: Arc::new(FixedOracle(oracle)), alerts }
    }

    fn plan_file(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    const TWO_TIERS: &str = r#"
reserved_tokens = 1
min_cap = "5"

[[tiers]]
start = "2026-11-01T00:00:00Z"
end = "2026-11-15T00:00:00Z"
rate = "1000"
supply = "500"

[[tiers]]
label = "Late"
start = "2026-11-15T00:00:00Z"
end = "2026-12-01T00:00:00Z"
rate = "2000"
supply = "500"
"#;

    #[tokio::test]
    async fn validate_builds_deployment_plan() {
        let alerts = Arc::new(Seen::default());
        let s = session(Arc::new(MemoryChain::new(0)), Some(3), alerts.clone());
        let f = plan_file(TWO_TIERS);

        let report = validate(&s, f.path()).await.unwrap();
        assert!(report.is_deployable(), "{:?}", report.blockers);
        let plan = report.plan.unwrap();
        assert_eq!(plan.tiers_count, 2);
        assert_eq!(plan.reserved_count, 1);
        assert_eq!(plan.gas_price, U256::from(3u64));
        assert_eq!(report.tiers[0].label, "Tier 1");
        assert_eq!(report.tiers[1].label, "Late");
        assert_eq!(report.tiers[0].end_time, report.tiers[1].start_time);
        assert!(report.tiers.iter().all(|t| t.errors.is_empty()));
        assert!(alerts.0.lock().is_empty());
    }

    #[tokio::test]
    async fn validate_reports_blockers_per_field() {
        let alerts = Arc::new(Seen::default());
        let s = session(Arc::new(MemoryChain::new(0)), None, alerts.clone());
        let f = plan_file(
            r#"
[[tiers]]
start = "2026-11-01T00:00:00Z"
end = "2026-11-15T00:00:00Z"
rate = "abc"
supply = "500"

[[tiers]]
start = "2026-11-10T00:00:00Z"
end = "2026-12-01T00:00:00Z"
rate = "1000"
supply = "500"
"#,
        );

        let report = validate(&s, f.path()).await.unwrap();
        assert!(!report.is_deployable());
        assert!(report.tiers[0].errors.contains_key("rate"));
        assert!(report.tiers[1].errors.contains_key("start_time"));
        assert!(report.blockers.iter().any(|b| b.contains("no gas price")));
        assert_eq!(alerts.0.lock().clone(), vec![Alert::NoGasPriceAvailable]);
    }

    #[tokio::test]
    async fn unknown_plan_keys_are_rejected() {
        let s = session(Arc::new(MemoryChain::new(0)), Some(1), Arc::default());
        let f = plan_file("reserved = 3\n");
        assert!(validate(&s, f.path()).await.is_err());
    }

    fn two_tier_chain(now: Timestamp) -> Arc<MemoryChain> {
        let chain = MemoryChain::new(now);
        chain.add_tier(addr(1), MemoryTier::new(100, 200, 1000).joined(vec![addr(2), addr(3)]));
        chain.add_tier(addr(2), MemoryTier::new(100, 200, 1000));
        chain.add_tier(addr(3), MemoryTier::new(200, 300, 2000));
        Arc::new(chain)
    }

    #[tokio::test]
    async fn status_reports_active_tier_and_countdown() {
        let s = session(two_tier_chain(150), Some(1), Arc::default());
        let st = status(&s).await.unwrap();
        assert_eq!(st.tiers, vec![addr(2), addr(3)]);
        assert_eq!(st.active_tier, Some(0));
        assert!(!st.finalized);
        assert_eq!(st.next_tick.map(|t| t.time), Some(200));
        assert_eq!(st.countdown.as_deref(), Some("0d 0h 0m 50s"));
    }

    #[tokio::test]
    async fn bad_crowdsale_address_is_alerted() {
        let alerts = Arc::new(Seen::default());
        let mut s = session(two_tier_chain(150), Some(1), alerts.clone());
        s.config.sale.crowdsale_address = "0x1234".into();
        assert!(status(&s).await.is_err());
        assert_eq!(alerts.0.lock().clone(), vec![Alert::InvalidCrowdsaleAddress("0x1234".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn invest_buys_from_open_tier() {
        let chain = two_tier_chain(250);
        let alerts = Arc::new(Seen::default());
        let s = session(chain.clone(), Some(7), alerts.clone());

        let receipt = invest(&s, "2", &CancellationToken::new()).await.unwrap();
        assert_eq!(receipt.intent.tier.tier_index, 1);
        assert_eq!(receipt.intent.wei, U256::from(4000u64));
        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].contract, addr(3));
        assert_eq!(sent[0].opts.gas_price, Some(U256::from(7u64)));
        assert!(matches!(alerts.0.lock().last(), Some(Alert::Succeeded { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_invest_sends_nothing() {
        let chain = two_tier_chain(250);
        let s = session(chain.clone(), Some(7), Arc::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = invest(&s, "2", &cancel).await.unwrap_err();
        assert_eq!(err.downcast_ref::<FailureReason>(), Some(&FailureReason::Cancelled));
        assert!(chain.sent().is_empty());
    }
}

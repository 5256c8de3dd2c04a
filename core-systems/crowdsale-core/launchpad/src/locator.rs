// crowdsale-core/launchpad/src/locator.rs
//! Finds the tier contract currently open for investment.

use ethers_core::abi::Token;
use ethers_core::types::{Address, U256};
use tracing::{debug, instrument, warn};

use crate::chain::{methods, token_to_address, token_to_bool, token_to_uint, uint_to_timestamp, ChainClient, ChainError};
use crate::validate::{parse_address, TimeWindow};
use crate::Timestamp;

/// Transient result of a discovery walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveTierHandle {
    pub contract: Address,
    pub tier_index: usize,
}

/// On-chain state of one tier contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierState {
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub halted: bool,
}

impl TierState {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.starts_at, self.ends_at)
    }

    pub fn is_open(&self, now: Timestamp) -> bool {
        !self.halted && self.window().contains(now)
    }
}

pub async fn read_tier_state<C>(chain: &C, contract: Address) -> Result<TierState, ChainError>
where
    C: ChainClient + ?Sized,
{
    let starts_at = token_to_uint(methods::STARTS_AT, chain.call(contract, methods::STARTS_AT, vec![]).await?)?;
    let ends_at = token_to_uint(methods::ENDS_AT, chain.call(contract, methods::ENDS_AT, vec![]).await?)?;
    let halted = token_to_bool(methods::HALTED, chain.call(contract, methods::HALTED, vec![]).await?)?;
    Ok(TierState {
        starts_at: uint_to_timestamp(starts_at),
        ends_at: uint_to_timestamp(ends_at),
        halted,
    })
}

/// Walks `tiers` from `start_index` and returns the first tier open at `now`.
///
/// When several tiers report open at once the lowest index wins. `Ok(None)`
/// means no tier is open, which callers treat as a normal outcome. Nothing is
/// cached: every call reads fresh state.
#[instrument(skip(chain, tiers), fields(tiers = tiers.len()))]
pub async fn locate_active_tier<C>(
    chain: &C,
    tiers: &[Address],
    start_index: usize,
    now: Timestamp,
) -> Result<Option<ActiveTierHandle>, ChainError>
where
    C: ChainClient + ?Sized,
{
    for (tier_index, contract) in tiers.iter().copied().enumerate().skip(start_index) {
        let state = read_tier_state(chain, contract).await?;
        debug!(tier_index, ?contract, starts_at = state.starts_at, ends_at = state.ends_at, halted = state.halted, "tier state");
        if state.is_open(now) {
            return Ok(Some(ActiveTierHandle { contract, tier_index }));
        }
    }
    Ok(None)
}

/// Tier contracts of the sale rooted at `crowdsale`, in tier order.
///
/// A contract without a joined list (or with an empty one) is a single-tier
/// sale. A lost connection is propagated; any other failure reading the list
/// falls back to the single-tier shape.
#[instrument(skip(chain))]
pub async fn discover_joined_tiers<C>(chain: &C, crowdsale: Address) -> Result<Vec<Address>, ChainError>
where
    C: ChainClient + ?Sized,
{
    let len = match chain.call(crowdsale, methods::JOINED_LEN, vec![]).await {
        Ok(token) => token_to_uint(methods::JOINED_LEN, token)?,
        Err(e @ ChainError::ConnectionLost(_)) => return Err(e),
        Err(e) => {
            debug!(error = %e, "no joined crowdsale list, treating as single tier");
            return Ok(vec![crowdsale]);
        }
    };
    if len.is_zero() {
        return Ok(vec![crowdsale]);
    }

    let count = len.min(U256::from(u16::MAX)).as_usize();
    let mut tiers = Vec::with_capacity(count);
    for i in 0..count {
        let token = chain
            .call(crowdsale, methods::JOINED_AT, vec![Token::Uint(U256::from(i))])
            .await?;
        tiers.push(token_to_address(methods::JOINED_AT, token)?);
    }
    Ok(tiers)
}

/// Parses the configured crowdsale address before any chain work starts.
pub fn parse_crowdsale_address(input: &str) -> Option<Address> {
    let parsed = parse_address(input);
    if parsed.is_none() {
        warn!(input, "invalid crowdsale address");
    }
    parsed
}

/// Finalization is recorded on the last tier contract.
pub async fn is_sale_finalized<C>(chain: &C, tiers: &[Address]) -> Result<bool, ChainError>
where
    C: ChainClient + ?Sized,
{
    let Some(last) = tiers.last() else {
        return Ok(false);
    };
    token_to_bool(methods::FINALIZED, chain.call(*last, methods::FINALIZED, vec![]).await?)
}

/// Overall sale window: first tier's start to last tier's end.
pub async fn read_sale_window<C>(chain: &C, tiers: &[Address]) -> Result<Option<TimeWindow>, ChainError>
where
    C: ChainClient + ?Sized,
{
    let (Some(first), Some(last)) = (tiers.first(), tiers.last()) else {
        return Ok(None);
    };
    let start = token_to_uint(methods::STARTS_AT, chain.call(*first, methods::STARTS_AT, vec![]).await?)?;
    let end = token_to_uint(methods::ENDS_AT, chain.call(*last, methods::ENDS_AT, vec![]).await?)?;
    Ok(Some(TimeWindow::new(uint_to_timestamp(start), uint_to_timestamp(end))))
}

/// Per-tier windows, in tier order.
pub async fn read_tier_windows<C>(chain: &C, tiers: &[Address]) -> Result<Vec<TimeWindow>, ChainError>
where
    C: ChainClient + ?Sized,
{
    let mut out = Vec::with_capacity(tiers.len());
    for contract in tiers {
        out.push(read_tier_state(chain, *contract).await?.window());
    }
    Ok(out)
}

/// Wei per token on `contract`.
pub async fn read_rate<C>(chain: &C, contract: Address) -> Result<U256, ChainError>
where
    C: ChainClient + ?Sized,
{
    token_to_uint(methods::RATE, chain.call(contract, methods::RATE, vec![]).await?)
}

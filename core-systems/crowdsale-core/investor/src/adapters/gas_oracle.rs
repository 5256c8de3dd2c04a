//! Gas price presets derived from the node's `eth_gasPrice`.

use std::sync::Arc;

use async_trait::async_trait;
use crowdsale_launchpad::chain::{ChainError, GasPriceOracle, GasPriceQuotes};
use ethers::{providers::Middleware, types::U256};
use tracing::debug;

use super::eth::{classify, ProviderFault};

/// Percent of the node quote used for each preset.
pub const SLOW_PERCENT: u64 = 90;
pub const FAST_PERCENT: u64 = 125;

pub struct NodeGasOracle<M> {
    client: Arc<M>,
}

impl<M: Middleware> NodeGasOracle<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }
}

/// Slow/standard/fast around a single node quote. Never returns zero for a
/// non-zero quote.
pub fn presets_from(standard: U256) -> GasPriceQuotes {
    let scaled = |percent: u64| {
        let v = standard.saturating_mul(U256::from(percent)) / U256::from(100u64);
        if v.is_zero() && !standard.is_zero() {
            U256::one()
        } else {
            v
        }
    };
    GasPriceQuotes { slow: scaled(SLOW_PERCENT), standard, fast: scaled(FAST_PERCENT) }
}

#[async_trait]
impl<M> GasPriceOracle for NodeGasOracle<M>
where
    M: Middleware + 'static,
    M::Error: ProviderFault,
{
    async fn quotes(&self) -> Result<GasPriceQuotes, ChainError> {
        let price = self.client.get_gas_price().await.map_err(|e| classify(&e))?;
        if price.is_zero() {
            return Err(ChainError::Rpc("node quoted a zero gas price".into()));
        }
        let quotes = presets_from(price);
        debug!(slow = %quotes.slow, standard = %quotes.standard, fast = %quotes.fast, "gas price quotes");
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_scale_around_node_quote() {
        let q = presets_from(U256::from(20_000_000_000u64));
        assert_eq!(q.slow, U256::from(18_000_000_000u64));
        assert_eq!(q.standard, U256::from(20_000_000_000u64));
        assert_eq!(q.fast, U256::from(25_000_000_000u64));
    }

    #[test]
    fn tiny_quote_never_rounds_to_zero() {
        let q = presets_from(U256::one());
        assert_eq!(q.slow, U256::one());
        assert_eq!(q.fast, U256::one());
        assert!(presets_from(U256::zero()).slow.is_zero());
    }
}

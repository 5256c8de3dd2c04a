//! `ChainClient` over an ethers JSON-RPC middleware.
//!
//! - Read calls are ABI-encoded from human-readable signatures (no codegen).
//! - Transport failures on reads are retried with exponential backoff; once
//!   the budget is spent they surface as `ConnectionLost`.
//! - JSON-RPC error responses (reverts, node-side errors) are not retried here.
//! - Sends are never retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use crowdsale_launchpad::chain::{methods, uint_to_timestamp, ChainClient, ChainError, Receipt, TxHash, TxOptions};
use crowdsale_launchpad::Timestamp;
use ethers::{
    abi::{parse_abi, Abi, Function, Token},
    middleware::{signer::SignerMiddlewareError, SignerMiddleware},
    providers::{Http, Middleware, Provider, ProviderError, RpcError},
    signers::{LocalWallet, Signer, WalletError},
    types::{transaction::eip2718::TypedTransaction, Address, BlockNumber, Bytes, TransactionRequest, U256},
};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Tier contract surface used by the launchpad.
pub const TIER_ABI: &[&str] = &[
    "function startsAt() view returns (uint256)",
    "function endsAt() view returns (uint256)",
    "function halted() view returns (bool)",
    "function finalized() view returns (bool)",
    "function rate() view returns (uint256)",
    "function joinedCrowdsalesLen() view returns (uint256)",
    "function joinedCrowdsales(uint256) view returns (address)",
    "function buy() payable",
];

#[derive(Error, Debug)]
pub enum EthAdapterError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("invalid rpc url: {0}")]
    Url(#[from] url::ParseError),
    #[error("signing key: {0}")]
    Wallet(#[from] WalletError),
    #[error("abi: {0}")]
    Abi(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("chain id mismatch: expected {expected}, got {got}")]
    ChainIdMismatch { expected: u64, got: u64 },
}

pub struct EthChainClient<M> {
    client: Arc<M>,
    abi: Abi,
    /// Local signer; `None` defers to the node's unlocked accounts.
    sender: Option<Address>,
    read_retry_max_elapsed: Duration,
}

impl EthChainClient<Provider<Http>> {
    /// Plain HTTP provider; transactions are signed by the node.
    pub fn connect(rpc_url: &str, read_retry_max_elapsed: Duration) -> Result<Self, EthAdapterError> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        Self::new(Arc::new(provider), None, read_retry_max_elapsed)
    }
}

impl EthChainClient<SignerMiddleware<Provider<Http>, LocalWallet>> {
    /// HTTP provider with a local wallet bound to the node's chain id.
    pub async fn with_signer(
        rpc_url: &str,
        key: &SecretString,
        read_retry_max_elapsed: Duration,
    ) -> Result<Self, EthAdapterError> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        let chain_id = provider.get_chainid().await?.low_u64();
        let wallet: LocalWallet = key.expose_secret().trim().trim_start_matches("0x").parse()?;
        let wallet = wallet.with_chain_id(chain_id);
        let sender = wallet.address();
        info!(?sender, chain_id, "local signer ready");
        let client = SignerMiddleware::new(provider, wallet);
        Self::new(Arc::new(client), Some(sender), read_retry_max_elapsed)
    }
}

impl<M> EthChainClient<M>
where
    M: Middleware + 'static,
    M::Error: ProviderFault,
{
    pub fn new(client: Arc<M>, sender: Option<Address>, read_retry_max_elapsed: Duration) -> Result<Self, EthAdapterError> {
        let abi = parse_abi(TIER_ABI).map_err(|e| EthAdapterError::Abi(e.to_string()))?;
        Ok(Self { client, abi, sender, read_retry_max_elapsed })
    }

    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    /// Shared handle to the underlying middleware, e.g. for the gas oracle.
    pub fn middleware(&self) -> Arc<M> {
        Arc::clone(&self.client)
    }

    /// Fails unless the node reports `expected`.
    pub async fn verify_chain_id(&self, expected: u64) -> Result<(), EthAdapterError> {
        let got = self.chain_id().await?;
        if got != expected {
            return Err(EthAdapterError::ChainIdMismatch { expected, got });
        }
        Ok(())
    }

    fn encode_call(&self, method: &str, args: &[Token]) -> Result<(&Function, Bytes), ChainError> {
        let function = self
            .abi
            .function(method)
            .map_err(|e| ChainError::Unsupported(format!("{method}: {e}")))?;
        let data = function
            .encode_input(args)
            .map_err(|e| ChainError::Decode(format!("{method}: {e}")))?;
        Ok((function, Bytes::from(data)))
    }

    fn request(&self, contract: Address, data: Bytes, opts: Option<&TxOptions>) -> TypedTransaction {
        let mut tx = TransactionRequest::new().to(contract).data(data);
        if let Some(opts) = opts {
            tx = tx.from(opts.from).value(opts.value);
            if let Some(price) = opts.gas_price {
                tx = tx.gas_price(price);
            }
            if let Some(limit) = opts.gas_limit {
                tx = tx.gas(limit);
            }
        }
        tx.into()
    }

    /// Retries transport failures until the read budget is spent.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ChainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.read_retry_max_elapsed),
            ..ExponentialBackoff::default()
        };
        retry(policy, || {
            let fut = op();
            async move {
                fut.await.map_err(|e| match e {
                    ChainError::ConnectionLost(_) => {
                        debug!(what, error = %e, "transport error, retrying");
                        backoff::Error::transient(e)
                    }
                    other => backoff::Error::permanent(other),
                })
            }
        })
        .await
    }
}

/// Reaches the transport-level [`ProviderError`] inside a middleware error,
/// when the failure came from the provider rather than from a layer above it.
pub trait ProviderFault: std::error::Error {
    fn provider_error(&self) -> Option<&ProviderError>;
}

impl ProviderFault for ProviderError {
    fn provider_error(&self) -> Option<&ProviderError> {
        Some(self)
    }
}

impl<M, S> ProviderFault for SignerMiddlewareError<M, S>
where
    M: Middleware<Error = ProviderError>,
    S: Signer,
{
    fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            SignerMiddlewareError::MiddlewareError(e) => Some(e),
            _ => None,
        }
    }
}

/// Maps a middleware error onto the launchpad taxonomy. Signing-layer
/// failures (missing nonce, wrong signer) are `Rejected`.
pub fn classify<E: ProviderFault>(e: &E) -> ChainError {
    match e.provider_error() {
        Some(p) => classify_provider(p),
        None => ChainError::Rejected(e.to_string()),
    }
}

pub fn classify_provider(e: &ProviderError) -> ChainError {
    match e {
        ProviderError::JsonRpcClientError(inner) => {
            if inner.as_error_response().is_some() {
                ChainError::Rpc(e.to_string())
            } else if inner.as_serde_error().is_some() {
                ChainError::Decode(e.to_string())
            } else {
                ChainError::ConnectionLost(e.to_string())
            }
        }
        ProviderError::HTTPError(_) => ChainError::ConnectionLost(e.to_string()),
        ProviderError::SerdeJson(_) | ProviderError::HexError(_) => ChainError::Decode(e.to_string()),
        ProviderError::UnsupportedRPC | ProviderError::UnsupportedNodeClient => ChainError::Unsupported(e.to_string()),
        _ => ChainError::Rpc(e.to_string()),
    }
}

#[async_trait]
impl<M> ChainClient for EthChainClient<M>
where
    M: Middleware + 'static,
    M::Error: ProviderFault,
{
    async fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        if let Some(sender) = self.sender {
            return Ok(vec![sender]);
        }
        self.with_retry("eth_accounts", || async { self.client.get_accounts().await.map_err(|e| classify(&e)) })
            .await
    }

    #[instrument(skip(self, args))]
    async fn call(&self, contract: Address, method: &str, args: Vec<Token>) -> Result<Token, ChainError> {
        let (function, data) = self.encode_call(method, &args)?;
        let tx = self.request(contract, data, None);
        let raw = self
            .with_retry(method, || async { self.client.call(&tx, None).await.map_err(|e| classify(&e)) })
            .await?;
        let mut out = function
            .decode_output(&raw)
            .map_err(|e| ChainError::Decode(format!("{method}: {e}")))?;
        if out.is_empty() {
            return Err(ChainError::Decode(format!("{method}: empty output")));
        }
        Ok(out.swap_remove(0))
    }

    #[instrument(skip(self, args, opts), fields(from = ?opts.from, value = %opts.value))]
    async fn send_transaction(
        &self,
        contract: Address,
        method: &str,
        args: Vec<Token>,
        opts: &TxOptions,
    ) -> Result<TxHash, ChainError> {
        let (_, data) = self.encode_call(method, &args)?;
        let tx = self.request(contract, data, Some(opts));
        let pending = self.client.send_transaction(tx, None).await.map_err(|e| {
            warn!(error = %e, "send rejected");
            ChainError::Rejected(e.to_string())
        })?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(&self, tx: TxHash) -> Result<Option<Receipt>, ChainError> {
        let receipt = self
            .with_retry("eth_getTransactionReceipt", || async {
                self.client.get_transaction_receipt(tx).await.map_err(|e| classify(&e))
            })
            .await?;
        Ok(receipt.map(|r| Receipt {
            tx_hash: r.transaction_hash,
            block_number: r.block_number.map(|b| b.low_u64()),
            status: r.status.map(|s| s.low_u64()),
        }))
    }

    async fn estimate_gas(
        &self,
        contract: Address,
        method: &str,
        args: Vec<Token>,
        opts: &TxOptions,
    ) -> Result<U256, ChainError> {
        let (_, data) = self.encode_call(method, &args)?;
        let tx = self.request(contract, data, Some(opts));
        self.client.estimate_gas(&tx, None).await.map_err(|e| classify(&e))
    }

    async fn block_timestamp(&self) -> Result<Timestamp, ChainError> {
        let block = self
            .with_retry("eth_getBlockByNumber", || async {
                self.client.get_block(BlockNumber::Latest).await.map_err(|e| classify(&e))
            })
            .await?
            .ok_or_else(|| ChainError::Decode("latest block missing".into()))?;
        Ok(uint_to_timestamp(block.timestamp))
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        let id = self
            .with_retry("eth_chainId", || async { self.client.get_chainid().await.map_err(|e| classify(&e)) })
            .await?;
        if id > U256::from(u64::MAX) {
            return Err(ChainError::Decode(format!("chain id {id} out of range")));
        }
        Ok(id.low_u64())
    }
}

/// Checks that every method the launchpad calls is in [`TIER_ABI`].
pub fn abi_covers_launchpad(abi: &Abi) -> bool {
    [
        methods::STARTS_AT,
        methods::ENDS_AT,
        methods::HALTED,
        methods::FINALIZED,
        methods::RATE,
        methods::JOINED_LEN,
        methods::JOINED_AT,
        methods::BUY,
    ]
    .iter()
    .all(|m| abi.function(m).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{HttpClientError, JsonRpcError};

    fn client() -> EthChainClient<Provider<Http>> {
        EthChainClient::connect("http://127.0.0.1:1", Duration::from_millis(10)).unwrap()
    }

    #[test]
    fn abi_has_every_tier_method() {
        assert!(abi_covers_launchpad(client().abi()));
    }

    #[test]
    fn encodes_selector_and_args() {
        let c = client();
        let (_, data) = c.encode_call(methods::STARTS_AT, &[]).unwrap();
        assert_eq!(&data[..], &ethers::utils::id("startsAt()")[..]);

        let (_, data) = c.encode_call(methods::JOINED_AT, &[Token::Uint(U256::from(2u64))]).unwrap();
        assert_eq!(&data[..4], &ethers::utils::id("joinedCrowdsales(uint256)")[..]);
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(data[35], 2);

        assert!(matches!(c.encode_call("selfdestruct", &[]), Err(ChainError::Unsupported(_))));
    }

    #[test]
    fn send_request_carries_options() {
        let c = client();
        let (_, data) = c.encode_call(methods::BUY, &[]).unwrap();
        let opts = TxOptions {
            from: Address::repeat_byte(0xaa),
            value: U256::from(10_000u64),
            gas_price: Some(U256::from(7u64)),
            gas_limit: Some(U256::from(300_000u64)),
        };
        let tx = c.request(Address::repeat_byte(1), data, Some(&opts));
        assert_eq!(tx.from(), Some(&Address::repeat_byte(0xaa)));
        assert_eq!(tx.value(), Some(&U256::from(10_000u64)));
        assert_eq!(tx.gas(), Some(&U256::from(300_000u64)));
        assert_eq!(tx.gas_price(), Some(U256::from(7u64)));
    }

    #[test]
    fn classifies_provider_errors() {
        let rpc = ProviderError::JsonRpcClientError(Box::new(HttpClientError::JsonRpcError(JsonRpcError {
            code: 3,
            message: "execution reverted".into(),
            data: None,
        })));
        assert!(matches!(classify_provider(&rpc), ChainError::Rpc(_)));

        let serde_err = serde_json::from_str::<u8>("x").unwrap_err();
        assert!(matches!(classify_provider(&ProviderError::SerdeJson(serde_err)), ChainError::Decode(_)));
        assert!(matches!(classify_provider(&ProviderError::UnsupportedRPC), ChainError::Unsupported(_)));
        assert!(matches!(classify_provider(&ProviderError::CustomError("x".into())), ChainError::Rpc(_)));
    }

    #[test]
    fn classifies_through_the_signer_layer() {
        assert!(matches!(classify(&ProviderError::UnsupportedRPC), ChainError::Unsupported(_)));

        type SignerErr = SignerMiddlewareError<Provider<Http>, LocalWallet>;
        let wrapped = SignerErr::MiddlewareError(ProviderError::UnsupportedRPC);
        assert!(matches!(classify(&wrapped), ChainError::Unsupported(_)));

        let node = SignerErr::MiddlewareError(ProviderError::CustomError("node says no".into()));
        assert!(matches!(classify(&node), ChainError::Rpc(_)));

        assert!(matches!(classify(&SignerErr::NonceMissing), ChainError::Rejected(_)));
    }

    #[tokio::test]
    async fn unreachable_node_is_connection_lost() {
        let c = client();
        let err = c.chain_id().await.unwrap_err();
        assert!(matches!(err, ChainError::ConnectionLost(_)), "{err:?}");
    }

    #[tokio::test]
    async fn receipt_poll_against_unreachable_node_is_connection_lost() {
        let c = client();
        let err = c.transaction_receipt(TxHash::zero()).await.unwrap_err();
        assert!(matches!(err, ChainError::ConnectionLost(_)), "{err:?}");

        let err = c.block_timestamp().await.unwrap_err();
        assert!(matches!(err, ChainError::ConnectionLost(_)), "{err:?}");
    }

    #[tokio::test]
    async fn chain_id_check_reports_transport_failure() {
        let err = client().verify_chain_id(1).await.unwrap_err();
        assert!(matches!(err, EthAdapterError::Chain(ChainError::ConnectionLost(_))), "{err:?}");
    }
}

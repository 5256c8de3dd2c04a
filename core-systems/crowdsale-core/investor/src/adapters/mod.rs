//! Concrete collaborators: JSON-RPC chain, node gas oracle, whitelist file.

pub mod eth;
pub mod gas_oracle;
pub mod whitelist;

pub use eth::{EthAdapterError, EthChainClient};
pub use gas_oracle::NodeGasOracle;
pub use whitelist::FileWhitelistService;

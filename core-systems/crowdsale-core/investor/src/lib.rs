//! Crowdsale investor: operator CLI over the launchpad core.
//!
//! - `config`: layered settings (defaults, file, `CROWDSALE__*` env)
//! - `telemetry`: tracing subscriber setup
//! - `adapters`: ethers JSON-RPC client, gas oracle, whitelist seed file
//! - `cmd`: `validate`, `status` and `invest` bodies

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]

pub mod adapters;
pub mod alerts;
pub mod cmd;
pub mod config;
pub mod telemetry;

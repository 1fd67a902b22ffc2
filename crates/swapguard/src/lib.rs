#![recursion_limit = "256"]
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

//! Client-side swap orchestration for constant-product AMM routers on EVM chains.
//!
//! Every swap attempt takes a fresh router quote, derives a slippage-bounded minimum output,
//! approves exactly the input amount when an ERC20 spend needs it, and dispatches the one
//! router function that matches the native/ERC20 shape of the pair.

pub mod allowance;
pub mod amount;
pub mod app;
pub mod cache;
pub mod chains;
pub mod config;
pub mod errors;
pub mod financial_math;
pub mod index_api;
pub mod market;
pub mod paths;
pub mod quote;
pub mod retry;
pub mod swap;
pub mod tokens;

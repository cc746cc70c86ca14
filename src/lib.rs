//! Stake Client Library
//!
//! Client for an on-chain, stake-weighted transcoder pool. It computes the
//! sorted-list hints every stake-changing write needs, sequences the reads and
//! dependent transactions of each staking operation, and tracks confirmation
//! of many concurrently submitted transactions.
//!
//! ## Modules
//!
//! - **pool**: pure simulation of pool mutations yielding neighbor hints
//! - **tracker**: receipt fan-out and per-transaction confirmation waits
//! - **client**: `StakeClient`, the composed contract sessions, domain queries
//!   and the staking orchestrator
//! - **contracts** / **backend**: traits for the external bindings, account
//!   management, gas pricing and the receipt stream
//! - **tickets**: payment ticket types and the ticket persistence boundary

pub mod backend;
pub mod client;
pub mod config;
pub mod contracts;
pub mod errors;
pub mod metrics;
pub mod observability;
pub mod pool;
pub mod tickets;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod tests;

pub use client::{ClientDeps, ContractAddresses, StakeClient};
pub use errors::{ClientError, ClientResult};
pub use pool::{simulate, simulate_hints, PoolEntry};
pub use tracker::{ConfirmationTracker, Subscription};
pub use types::*;

//! Error types for the staking client
//!
//! Errors fall into a small taxonomy:
//! - Preconditions: the chain is in a state where the write would revert, so
//!   nothing is submitted (`CurrentRoundLocked`, `RoundAlreadyInitialized`,
//!   `NothingToMint`)
//! - Configuration: the client cannot reach the chain at all
//! - Dependent steps: a read inside an orchestrated operation failed; wrapped
//!   in `Step` with the intent of the read
//! - Submission/confirmation: a transaction was mined but failed, or a
//!   replacement targeted an already mined transaction

use alloy_primitives::B256;
use thiserror::Error;

/// Result alias used across the crate
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the staking client
///
/// `Clone` so the confirmation broadcaster can fan a single stream failure
/// out to every registered subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The current round is locked; registering as a transcoder would revert
    #[error("current round locked")]
    CurrentRoundLocked,

    /// The current round has already been initialized
    #[error("round already initialized")]
    RoundAlreadyInitialized,

    /// Total bonded stake is zero, so no reward can be minted
    #[error("no rewards to be minted")]
    NothingToMint,

    /// No backend (and therefore no receipt stream) is configured
    #[error("missing chain client backend")]
    MissingBackend,

    /// Contract sessions have not been bound yet; call `set_gas_info` first
    #[error("contract sessions not initialized")]
    NotInitialized,

    /// The receipt broadcaster has terminated and accepts no new subscribers
    #[error("receipt broadcaster stopped")]
    BroadcasterStopped,

    /// Attempted to replace a transaction that has already been mined
    #[error("trying to replace already mined tx (hash={hash})")]
    ReplacingMinedTx { hash: B256 },

    /// The transaction was mined with a failure status
    #[error("transaction failed txHash={hash}")]
    TransactionFailed { hash: B256 },

    /// The caller's deadline elapsed before a matching receipt arrived
    #[error("timed out after {waited_ms}ms waiting for tx {hash}")]
    ConfirmationTimeout { hash: B256, waited_ms: u64 },

    /// A contract call returned no data
    ///
    /// Raised by the bindings for pending stake/fees reads against accounts
    /// that have never been checkpointed.
    #[error("abi: unmarshalling empty output (method={method})")]
    EmptyOutput { method: String },

    /// Call or submission failure reported by the RPC layer
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The receipt event stream failed or ended
    #[error("receipt stream error: {0}")]
    Stream(String),

    /// An on-chain status code had no known mapping
    #[error("unknown {kind} status: {value}")]
    UnknownStatus { kind: &'static str, value: u8 },

    /// Integer overflow/underflow while computing a new stake
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// Failed to produce a signature or transact options
    #[error("signing error: {0}")]
    Signing(String),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),

    /// A dependent read inside an orchestrated operation failed
    #[error("{step}: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// True for conditions detected before any write was attempted because the
    /// chain state would make the write revert
    pub fn is_precondition(&self) -> bool {
        matches!(
            self.root(),
            Self::CurrentRoundLocked | Self::RoundAlreadyInitialized | Self::NothingToMint
        )
    }

    /// Strip `Step` annotations and return the originating error
    pub fn root(&self) -> &ClientError {
        let mut err = self;
        while let Self::Step { source, .. } = err {
            err = source.as_ref();
        }
        err
    }

    /// Error category for metrics and logs
    pub fn category(&self) -> &'static str {
        match self.root() {
            Self::CurrentRoundLocked | Self::RoundAlreadyInitialized | Self::NothingToMint => {
                "precondition"
            }
            Self::MissingBackend | Self::NotInitialized | Self::Configuration(_) => "config",
            Self::BroadcasterStopped | Self::Stream(_) => "stream",
            Self::ReplacingMinedTx { .. }
            | Self::TransactionFailed { .. }
            | Self::ConfirmationTimeout { .. } => "confirmation",
            Self::EmptyOutput { .. } | Self::Rpc(_) | Self::UnknownStatus { .. } => "rpc",
            Self::Arithmetic(_) => "arithmetic",
            Self::Signing(_) => "signing",
            Self::Internal(_) => "internal",
            Self::Step { .. } => "internal",
        }
    }

    pub fn rpc(reason: impl Into<String>) -> Self {
        Self::Rpc(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

/// Annotates a failed read with the intent of the step that performed it
pub trait StepContext<T> {
    fn step(self, step: &'static str) -> ClientResult<T>;
}

impl<T> StepContext<T> for ClientResult<T> {
    fn step(self, step: &'static str) -> ClientResult<T> {
        self.map_err(|source| ClientError::Step {
            step,
            source: Box::new(source),
        })
    }
}

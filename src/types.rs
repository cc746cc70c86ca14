//! Domain types shared by the client, the pool simulator and the tracker

use alloy_primitives::{Address, B256, I256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::errors::{ClientError, ClientResult};
use crate::observability::CorrelationId;

/// Registration status of a transcoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscoderStatus {
    NotRegistered,
    Registered,
}

impl TranscoderStatus {
    /// Map the on-chain enum ordinal
    pub fn from_chain(value: u8) -> ClientResult<Self> {
        match value {
            0 => Ok(Self::NotRegistered),
            1 => Ok(Self::Registered),
            _ => Err(ClientError::UnknownStatus {
                kind: "transcoder",
                value,
            }),
        }
    }
}

/// Bonding status of a delegator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelegatorStatus {
    Pending,
    Bonded,
    Unbonded,
}

impl DelegatorStatus {
    pub fn from_chain(value: u8) -> ClientResult<Self> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Bonded),
            2 => Ok(Self::Unbonded),
            _ => Err(ClientError::UnknownStatus {
                kind: "delegator",
                value,
            }),
        }
    }
}

/// Assembled view of a transcoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcoder {
    pub address: Address,
    pub service_uri: String,
    pub last_reward_round: U256,
    pub reward_cut: U256,
    pub fee_share: U256,
    /// Total stake delegated to this transcoder, including self-bond
    pub delegated_stake: U256,
    pub activation_round: U256,
    pub deactivation_round: U256,
    pub active: bool,
    pub status: TranscoderStatus,
}

/// Pending stake or fees of a delegator
///
/// Accounts that have never been checkpointed have no pending value; that
/// state is kept distinct from a zero balance and renders as the sentinel `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAmount(Option<U256>);

impl PendingAmount {
    pub const NO_CHECKPOINT: Self = Self(None);

    pub fn new(amount: U256) -> Self {
        Self(Some(amount))
    }

    pub fn is_checkpointed(&self) -> bool {
        self.0.is_some()
    }

    pub fn amount(&self) -> Option<U256> {
        self.0
    }

    /// Signed representation, `-1` when no checkpoint exists
    pub fn to_signed(&self) -> I256 {
        match self.0 {
            Some(v) => I256::from_raw(v),
            None => I256::MINUS_ONE,
        }
    }
}

impl fmt::Display for PendingAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "-1"),
        }
    }
}

/// Assembled view of a delegator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegator {
    pub address: Address,
    pub bonded_amount: U256,
    pub fees: U256,
    pub delegate_address: Address,
    pub delegated_amount: U256,
    pub start_round: U256,
    pub last_claim_round: U256,
    pub next_unbonding_lock_id: U256,
    pub pending_stake: PendingAmount,
    pub pending_fees: PendingAmount,
    pub status: DelegatorStatus,
}

/// Stake waiting out the unbonding period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingLock {
    pub id: U256,
    pub delegator_address: Address,
    pub amount: U256,
    pub withdraw_round: U256,
}

/// Per-round reward and fee accounting of a transcoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsPool {
    pub reward_pool: U256,
    pub fee_pool: U256,
    pub total_stake: U256,
    pub claimable_stake: U256,
}

/// Neighbor hints for an on-chain sorted list mutation
///
/// A null address on either side means "no neighbor on that side".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TranscoderPoolHints {
    pub pos_prev: Address,
    pub pos_next: Address,
}

impl TranscoderPoolHints {
    pub fn is_empty(&self) -> bool {
        self.pos_prev.is_zero() && self.pos_next.is_zero()
    }
}

/// Where a transcoder will sit after a simulated pool mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolPosition {
    /// The transcoder stays in the pool next to these neighbors
    Hinted(TranscoderPoolHints),
    /// The transcoder is the only member; no neighbors to hint
    NoHintsNeeded,
    /// The transcoder falls out of a full pool
    Evicted,
}

impl PoolPosition {
    /// Collapse to the hint pair sent on-chain
    pub fn hints(&self) -> TranscoderPoolHints {
        match self {
            Self::Hinted(hints) => *hints,
            Self::NoHintsNeeded | Self::Evicted => TranscoderPoolHints::default(),
        }
    }

    /// Whether the transcoder is a pool member after the mutation
    pub fn in_pool(&self) -> bool {
        !matches!(self, Self::Evicted)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Hinted(_) => "hinted",
            Self::NoHintsNeeded => "no_hints_needed",
            Self::Evicted => "evicted",
        }
    }
}

/// Transaction options produced by the account manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactOpts {
    pub from: Address,
    pub gas_limit: u64,
    pub gas_price: U256,
}

/// A transaction handed to the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedTx {
    pub hash: B256,
    pub from: Address,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: U256,
}

/// On-chain execution status of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Failed,
    Success,
}

/// Receipt as delivered by the backend's event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinedReceipt {
    pub tx_hash: B256,
    pub status: TxStatus,
    /// Transport-level failure attached to this receipt, if any
    pub error: Option<ClientError>,
}

/// Receipt broadcast to confirmation subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Hash of the transaction as first submitted
    pub origin_tx_hash: B256,
    /// Hash of the transaction that was actually mined (differs after a replacement)
    pub tx_hash: B256,
    pub status: TxStatus,
    pub error: Option<ClientError>,
}

/// A submitted transaction that has not been observed mined yet
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub origin_tx_hash: B256,
    pub operation: &'static str,
    pub correlation_id: CorrelationId,
    pub submitted_at: Instant,
}

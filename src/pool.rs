//! Transcoder pool simulation
//!
//! The on-chain pool is a sorted linked list. Inserting or moving an entry is
//! cheap when the caller supplies the future neighbors of the entry, so before
//! every stake-changing write the client replays the mutation against a pool
//! snapshot and reads the neighbors off the result.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::metrics::recorder;
use crate::types::{PoolPosition, Transcoder, TranscoderPoolHints};

/// A pool member as seen by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub address: Address,
    pub stake: U256,
}

impl From<&Transcoder> for PoolEntry {
    fn from(t: &Transcoder) -> Self {
        Self {
            address: t.address,
            stake: t.delegated_stake,
        }
    }
}

/// Simulate `address` ending up with `new_stake` and report its future position
///
/// `pool` must be ordered by descending stake. Equal stakes keep their input
/// order, matching the contract's insertion tie-break. When `is_full` and
/// `address` is joining, the lowest entry after re-sorting is evicted.
pub fn simulate(
    address: Address,
    new_stake: U256,
    pool: &[PoolEntry],
    is_full: bool,
) -> PoolPosition {
    let next = simulated_pool(address, new_stake, pool, is_full);
    let position = find_position(address, &next);
    if let Some(m) = recorder() {
        m.pool_simulations
            .with_label_values(&[position.label()])
            .inc();
    }
    position
}

/// The pool ordering after the mutation
fn simulated_pool(
    address: Address,
    new_stake: U256,
    pool: &[PoolEntry],
    is_full: bool,
) -> Vec<PoolEntry> {
    let mut next: Vec<PoolEntry> = pool
        .iter()
        .filter(|e| e.address != address)
        .copied()
        .collect();
    next.push(PoolEntry {
        address,
        stake: new_stake,
    });

    // sort_by is stable
    next.sort_by(|a, b| b.stake.cmp(&a.stake));

    // Only a newcomer grows a full pool past capacity. A member changing its
    // own stake keeps the list at `pool.len()`, and dropping the tail then
    // would evict a different member and hint against a neighbor that is
    // still on chain.
    if is_full && next.len() > pool.len() {
        next.pop();
    }
    next
}

/// `simulate` collapsed to the hint pair sent on-chain
pub fn simulate_hints(
    address: Address,
    new_stake: U256,
    pool: &[PoolEntry],
    is_full: bool,
) -> TranscoderPoolHints {
    simulate(address, new_stake, pool, is_full).hints()
}

fn find_position(address: Address, pool: &[PoolEntry]) -> PoolPosition {
    let Some(i) = pool.iter().position(|e| e.address == address) else {
        return PoolPosition::Evicted;
    };
    if pool.len() == 1 {
        return PoolPosition::NoHintsNeeded;
    }

    let pos_prev = if i == 0 { Address::ZERO } else { pool[i - 1].address };
    let pos_next = pool.get(i + 1).map_or(Address::ZERO, |e| e.address);
    PoolPosition::Hinted(TranscoderPoolHints { pos_prev, pos_next })
}

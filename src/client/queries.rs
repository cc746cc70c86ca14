//! Domain views assembled from raw contract reads

use alloy_primitives::{Address, U256};
use tracing::{debug, error};

use super::StakeClient;
use crate::errors::{ClientError, ClientResult};
use crate::metrics::{recorder, Timer};
use crate::types::{
    Delegator, DelegatorStatus, EarningsPool, PendingAmount, Transcoder, TranscoderStatus,
    UnbondingLock,
};

/// Map the "no checkpoint" read failure to the sentinel, propagate everything else
fn pending_or_sentinel(result: ClientResult<U256>) -> ClientResult<PendingAmount> {
    match result {
        Ok(amount) => Ok(PendingAmount::new(amount)),
        Err(ClientError::EmptyOutput { .. }) => Ok(PendingAmount::NO_CHECKPOINT),
        Err(err) => Err(err),
    }
}

impl StakeClient {
    pub async fn is_active_transcoder(&self) -> ClientResult<bool> {
        self.contracts()?
            .bonding_manager
            .is_active_transcoder(self.account())
            .await
    }

    pub async fn transcoder_total_stake(&self, addr: Address) -> ClientResult<U256> {
        self.contracts()?
            .bonding_manager
            .transcoder_total_stake(addr)
            .await
    }

    /// Fold the transcoder record, status, stake, pool activity and service URI into one view
    pub async fn get_transcoder(&self, addr: Address) -> ClientResult<Transcoder> {
        let c = self.contracts()?;
        let bm = &c.bonding_manager;

        let info = bm.get_transcoder(addr).await?;
        let status = TranscoderStatus::from_chain(bm.transcoder_status(addr).await?)?;
        let delegated_stake = bm.transcoder_total_stake(addr).await?;
        let active = bm.is_active_transcoder(addr).await?;
        let service_uri = c.service_registry.get_service_uri(addr).await?;

        Ok(Transcoder {
            address: addr,
            service_uri,
            last_reward_round: info.last_reward_round,
            reward_cut: info.reward_cut,
            fee_share: info.fee_share,
            delegated_stake,
            activation_round: info.activation_round,
            deactivation_round: info.deactivation_round,
            active,
            status,
        })
    }

    pub async fn get_delegator(&self, addr: Address) -> ClientResult<Delegator> {
        let c = self.contracts()?;
        let bm = &c.bonding_manager;

        let info = bm.get_delegator(addr).await.map_err(|e| {
            error!(delegator = %addr, error = %e, "Error getting delegator from bonding manager");
            e
        })?;
        let status = DelegatorStatus::from_chain(bm.delegator_status(addr).await?)?;
        let round = c.rounds_manager.current_round().await?;

        let pending_stake = pending_or_sentinel(bm.pending_stake(addr, round).await)?;
        let pending_fees = pending_or_sentinel(bm.pending_fees(addr, round).await)?;
        if !pending_stake.is_checkpointed() {
            debug!(delegator = %addr, "no earnings checkpoint yet");
        }

        Ok(Delegator {
            address: addr,
            bonded_amount: info.bonded_amount,
            fees: info.fees,
            delegate_address: info.delegate_address,
            delegated_amount: info.delegated_amount,
            start_round: info.start_round,
            last_claim_round: info.last_claim_round,
            next_unbonding_lock_id: info.next_unbonding_lock_id,
            pending_stake,
            pending_fees,
            status,
        })
    }

    pub async fn get_delegator_unbonding_lock(
        &self,
        addr: Address,
        lock_id: U256,
    ) -> ClientResult<UnbondingLock> {
        let lock = self
            .contracts()?
            .bonding_manager
            .get_delegator_unbonding_lock(addr, lock_id)
            .await?;
        Ok(UnbondingLock {
            id: lock_id,
            delegator_address: addr,
            amount: lock.amount,
            withdraw_round: lock.withdraw_round,
        })
    }

    pub async fn get_transcoder_earnings_pool_for_round(
        &self,
        addr: Address,
        round: U256,
    ) -> ClientResult<EarningsPool> {
        let pool = self
            .contracts()?
            .bonding_manager
            .get_transcoder_earnings_pool_for_round(addr, round)
            .await?;
        Ok(EarningsPool {
            reward_pool: pool.reward_pool,
            fee_pool: pool.fee_pool,
            total_stake: pool.total_stake,
            claimable_stake: pool.claimable_stake,
        })
    }

    /// Walk the on-chain pool from its head until the null terminator
    ///
    /// Expensive: one assembled transcoder per member. Callers re-read it for
    /// every mutation rather than caching it.
    pub async fn transcoder_pool(&self) -> ClientResult<Vec<Transcoder>> {
        Ok(self.transcoder_pool_with_max_size().await?.0)
    }

    /// The pool walk together with the capacity it was bounded by
    pub(crate) async fn transcoder_pool_with_max_size(&self) -> ClientResult<(Vec<Transcoder>, U256)> {
        let timer = Timer::new();
        let c = self.contracts()?;
        let bm = &c.bonding_manager;

        // a well-formed list never has more members than the pool capacity
        let max_size = bm.get_transcoder_pool_max_size().await?;
        let limit = usize::try_from(max_size).unwrap_or(usize::MAX);

        let mut transcoders = Vec::new();
        let mut addr = bm.get_first_transcoder_in_pool().await?;
        while !addr.is_zero() {
            if transcoders.len() >= limit {
                return Err(ClientError::internal(format!(
                    "transcoder pool longer than max size {}",
                    max_size
                )));
            }
            transcoders.push(self.get_transcoder(addr).await?);
            addr = bm.get_next_transcoder_in_pool(addr).await?;
        }

        if let Some(m) = recorder() {
            timer.observe_duration(&m.pool_walk_latency);
        }
        debug!(size = transcoders.len(), "transcoder pool read");
        Ok((transcoders, max_size))
    }
}

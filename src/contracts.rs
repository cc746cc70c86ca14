//! Typed sessions over the protocol contracts
//!
//! Implementations wrap the generated ABI bindings; the client only sees these
//! traits. Read methods map directly onto contract calls, write methods return
//! the submitted transaction without waiting for it to be mined.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;

use crate::errors::ClientResult;
use crate::tickets::{SenderInfo, Ticket};
use crate::types::SubmittedTx;

/// Raw transcoder record as stored by the bonding manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscoderInfo {
    pub last_reward_round: U256,
    pub reward_cut: U256,
    pub fee_share: U256,
    pub activation_round: U256,
    pub deactivation_round: U256,
}

/// Raw delegator record as stored by the bonding manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegatorInfo {
    pub bonded_amount: U256,
    pub fees: U256,
    pub delegate_address: Address,
    pub delegated_amount: U256,
    pub start_round: U256,
    pub last_claim_round: U256,
    pub next_unbonding_lock_id: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnbondingLockInfo {
    pub amount: U256,
    pub withdraw_round: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EarningsPoolInfo {
    pub reward_pool: U256,
    pub fee_pool: U256,
    pub total_stake: U256,
    pub claimable_stake: U256,
}

/// Registry that maps contract name hashes to deployed addresses
#[async_trait]
pub trait Controller: Send + Sync {
    async fn get_contract(&self, name_hash: B256) -> ClientResult<Address>;
    async fn paused(&self) -> ClientResult<bool>;
}

#[async_trait]
pub trait Token: Send + Sync {
    async fn allowance(&self, owner: Address, spender: Address) -> ClientResult<U256>;
    async fn balance_of(&self, owner: Address) -> ClientResult<U256>;
    async fn total_supply(&self) -> ClientResult<U256>;
    async fn approve(&self, spender: Address, amount: U256) -> ClientResult<SubmittedTx>;
    async fn transfer(&self, to: Address, amount: U256) -> ClientResult<SubmittedTx>;
}

#[async_trait]
pub trait Faucet: Send + Sync {
    async fn request(&self) -> ClientResult<SubmittedTx>;
    async fn next_valid_request(&self, addr: Address) -> ClientResult<U256>;
}

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn get_service_uri(&self, addr: Address) -> ClientResult<String>;
    async fn set_service_uri(&self, uri: String) -> ClientResult<SubmittedTx>;
}

#[async_trait]
pub trait BondingManager: Send + Sync {
    // Reads
    async fn get_transcoder(&self, addr: Address) -> ClientResult<TranscoderInfo>;
    async fn transcoder_status(&self, addr: Address) -> ClientResult<u8>;
    async fn transcoder_total_stake(&self, addr: Address) -> ClientResult<U256>;
    async fn is_active_transcoder(&self, addr: Address) -> ClientResult<bool>;
    async fn get_delegator(&self, addr: Address) -> ClientResult<DelegatorInfo>;
    async fn delegator_status(&self, addr: Address) -> ClientResult<u8>;
    async fn pending_stake(&self, addr: Address, round: U256) -> ClientResult<U256>;
    async fn pending_fees(&self, addr: Address, round: U256) -> ClientResult<U256>;
    async fn get_delegator_unbonding_lock(
        &self,
        addr: Address,
        lock_id: U256,
    ) -> ClientResult<UnbondingLockInfo>;
    async fn get_transcoder_earnings_pool_for_round(
        &self,
        addr: Address,
        round: U256,
    ) -> ClientResult<EarningsPoolInfo>;
    async fn get_first_transcoder_in_pool(&self) -> ClientResult<Address>;
    async fn get_next_transcoder_in_pool(&self, addr: Address) -> ClientResult<Address>;
    async fn get_total_bonded(&self) -> ClientResult<U256>;
    async fn get_transcoder_pool_size(&self) -> ClientResult<U256>;
    async fn get_transcoder_pool_max_size(&self) -> ClientResult<U256>;
    async fn unbonding_period(&self) -> ClientResult<u64>;

    // Writes
    async fn transcoder(&self, reward_cut: U256, fee_share: U256) -> ClientResult<SubmittedTx>;
    async fn reward_with_hint(&self, prev: Address, next: Address) -> ClientResult<SubmittedTx>;
    #[allow(clippy::too_many_arguments)]
    async fn bond_with_hint(
        &self,
        amount: U256,
        to: Address,
        old_prev: Address,
        old_next: Address,
        new_prev: Address,
        new_next: Address,
    ) -> ClientResult<SubmittedTx>;
    async fn unbond_with_hint(
        &self,
        amount: U256,
        prev: Address,
        next: Address,
    ) -> ClientResult<SubmittedTx>;
    async fn rebond_with_hint(
        &self,
        lock_id: U256,
        prev: Address,
        next: Address,
    ) -> ClientResult<SubmittedTx>;
    async fn rebond_from_unbonded_with_hint(
        &self,
        to: Address,
        lock_id: U256,
        prev: Address,
        next: Address,
    ) -> ClientResult<SubmittedTx>;
    async fn withdraw_stake(&self, lock_id: U256) -> ClientResult<SubmittedTx>;
    async fn withdraw_fees(&self) -> ClientResult<SubmittedTx>;
    async fn claim_earnings(&self, end_round: U256) -> ClientResult<SubmittedTx>;
}

#[async_trait]
pub trait TicketBroker: Send + Sync {
    async fn fund_deposit_and_reserve(
        &self,
        deposit: U256,
        reserve: U256,
    ) -> ClientResult<SubmittedTx>;
    async fn fund_deposit(&self, amount: U256) -> ClientResult<SubmittedTx>;
    async fn fund_reserve(&self, amount: U256) -> ClientResult<SubmittedTx>;
    async fn unlock(&self) -> ClientResult<SubmittedTx>;
    async fn cancel_unlock(&self) -> ClientResult<SubmittedTx>;
    async fn withdraw(&self) -> ClientResult<SubmittedTx>;
    async fn redeem_winning_ticket(
        &self,
        ticket: Ticket,
        sig: Vec<u8>,
        recipient_rand: U256,
    ) -> ClientResult<SubmittedTx>;
    async fn used_tickets(&self, ticket_hash: B256) -> ClientResult<bool>;
    async fn get_sender_info(&self, sender: Address) -> ClientResult<SenderInfo>;
    async fn unlock_period(&self) -> ClientResult<U256>;
    async fn claimed_reserve(
        &self,
        reserve_holder: Address,
        claimant: Address,
    ) -> ClientResult<U256>;
}

#[async_trait]
pub trait RoundsManager: Send + Sync {
    async fn initialize_round(&self) -> ClientResult<SubmittedTx>;
    async fn current_round(&self) -> ClientResult<U256>;
    async fn last_initialized_round(&self) -> ClientResult<U256>;
    async fn block_hash_for_round(&self, round: U256) -> ClientResult<B256>;
    async fn current_round_initialized(&self) -> ClientResult<bool>;
    async fn current_round_locked(&self) -> ClientResult<bool>;
    async fn current_round_start_block(&self) -> ClientResult<U256>;
    async fn round_length(&self) -> ClientResult<U256>;
    async fn round_lock_amount(&self) -> ClientResult<U256>;
}

/// Minter is read-only from the client's point of view
#[async_trait]
pub trait Minter: Send + Sync {
    async fn current_mintable_tokens(&self) -> ClientResult<U256>;
    async fn inflation(&self) -> ClientResult<U256>;
    async fn inflation_change(&self) -> ClientResult<U256>;
    async fn target_bonding_rate(&self) -> ClientResult<U256>;
}

#[async_trait]
pub trait Poll: Send + Sync {
    async fn vote(&self, choice_id: U256) -> ClientResult<SubmittedTx>;
}

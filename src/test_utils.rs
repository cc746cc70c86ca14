//! Test Utilities Module
//!
//! An in-memory chain implementing every contract session, the account
//! manager, the gas price monitor and the receipt stream, so the client can be
//! driven end to end without a node. Writes are recorded in order and can be
//! mined automatically.

use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::backend::{AccountManager, Backend, ContractBinder, GasPriceMonitor, ReceiptStream};
use crate::client::{ClientDeps, StakeClient};
use crate::config::Config;
use crate::contracts::*;
use crate::errors::{ClientError, ClientResult};
use crate::tickets::{SenderInfo, Ticket};
use crate::types::{MinedReceipt, SubmittedTx, TransactOpts, TxStatus};

pub fn addr(b: u8) -> Address {
    Address::repeat_byte(b)
}

pub const SENDER: u8 = 0x5E;

/// Write calls observed by the mock chain, in submission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Approve { spender: Address, amount: U256 },
    Bond {
        amount: U256,
        to: Address,
        old_prev: Address,
        old_next: Address,
        new_prev: Address,
        new_next: Address,
    },
    Unbond { amount: U256, prev: Address, next: Address },
    Rebond { lock_id: U256, prev: Address, next: Address },
    RebondFromUnbonded { to: Address, lock_id: U256, prev: Address, next: Address },
    Reward { prev: Address, next: Address },
    Transcoder { reward_cut: U256, fee_share: U256 },
    InitializeRound,
    Other(&'static str),
}

#[derive(Default)]
pub struct MockState {
    /// Pool members, ordered by descending stake
    pub pool: Vec<(Address, U256)>,
    pub max_size: u64,
    pub allowance: U256,
    pub delegators: HashMap<Address, DelegatorInfo>,
    pub pending_stake: HashMap<Address, U256>,
    /// Override for transcoder total stake; defaults to the pool entry
    pub total_stake: HashMap<Address, U256>,
    pub locks: HashMap<U256, UnbondingLockInfo>,
    pub earnings: EarningsPoolInfo,
    pub mintable: U256,
    pub total_bonded: U256,
    pub current_round: U256,
    pub round_locked: bool,
    pub round_initialized: bool,
    /// Read methods that fail with an RPC error
    pub failing: HashSet<&'static str>,
    /// Number of calls per read method
    pub reads: HashMap<&'static str, usize>,
    /// Error returned by pending stake/fees reads instead of a value
    pub pending_error: Option<ClientError>,
    pub calls: Vec<Call>,
    /// Mine every write immediately with this status
    pub auto_mine: Option<TxStatus>,
    pub nonce: u64,
}

pub struct MockChain {
    pub state: Mutex<MockState>,
    feed: fmpsc::UnboundedSender<ClientResult<MinedReceipt>>,
    receipts: Mutex<Option<fmpsc::UnboundedReceiver<ClientResult<MinedReceipt>>>>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        let (feed, rx) = fmpsc::unbounded();
        Arc::new(Self {
            state: Mutex::new(MockState {
                max_size: 10,
                current_round: U256::from(100u64),
                auto_mine: Some(TxStatus::Success),
                ..Default::default()
            }),
            feed,
            receipts: Mutex::new(Some(rx)),
        })
    }

    pub fn with_pool(pool: &[(u8, u64)], max_size: u64) -> Arc<Self> {
        let chain = Self::new();
        {
            let mut s = chain.state.lock();
            s.pool = pool.iter().map(|&(a, st)| (addr(a), U256::from(st))).collect();
            s.max_size = max_size;
        }
        chain
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn mine(&self, hash: B256, status: TxStatus) {
        let _ = self.feed.unbounded_send(Ok(MinedReceipt {
            tx_hash: hash,
            status,
            error: None,
        }));
    }

    pub fn break_stream(&self, err: ClientError) {
        let _ = self.feed.unbounded_send(Err(err));
    }

    pub fn reads(&self, method: &str) -> usize {
        self.state.lock().reads.get(method).copied().unwrap_or_default()
    }

    fn read(&self, method: &'static str) -> ClientResult<()> {
        let mut s = self.state.lock();
        *s.reads.entry(method).or_default() += 1;
        if s.failing.contains(method) {
            return Err(ClientError::rpc(format!("{} failed", method)));
        }
        Ok(())
    }

    fn write(&self, call: Call) -> ClientResult<SubmittedTx> {
        let (tx, auto_mine) = {
            let mut s = self.state.lock();
            s.nonce += 1;
            s.calls.push(call);
            let tx = SubmittedTx {
                hash: keccak256(s.nonce.to_be_bytes()),
                from: addr(SENDER),
                nonce: s.nonce,
                gas_limit: 500_000,
                gas_price: U256::from(1u64),
            };
            (tx, s.auto_mine)
        };
        if let Some(status) = auto_mine {
            self.mine(tx.hash, status);
        }
        Ok(tx)
    }

    fn stake_of(&self, a: Address) -> U256 {
        let s = self.state.lock();
        if let Some(v) = s.total_stake.get(&a) {
            return *v;
        }
        s.pool
            .iter()
            .find(|(p, _)| *p == a)
            .map_or(U256::ZERO, |(_, st)| *st)
    }

    fn pending(&self, a: Address) -> ClientResult<U256> {
        let s = self.state.lock();
        if let Some(err) = &s.pending_error {
            return Err(err.clone());
        }
        Ok(s.pending_stake.get(&a).copied().unwrap_or_default())
    }
}

/// Build a client over `chain` with contracts already bound
pub async fn client_for(chain: &Arc<MockChain>) -> StakeClient {
    let mut config = Config::default();
    config.chain.controller_address = addr(0xC0);
    let deps = ClientDeps {
        account_manager: Arc::new(MockAccount),
        backend: Some(chain.clone()),
        binder: Arc::new(MockBinder(chain.clone())),
        gas_price_monitor: Arc::new(MockGasPrice),
    };
    StakeClient::connect(&config, deps).await.expect("client")
}

pub struct MockAccount;

#[async_trait]
impl AccountManager for MockAccount {
    fn account(&self) -> Address {
        addr(SENDER)
    }

    async fn create_transact_opts(&self, gas_limit: u64, gas_price: U256) -> ClientResult<TransactOpts> {
        Ok(TransactOpts {
            from: addr(SENDER),
            gas_limit,
            gas_price,
        })
    }

    async fn sign(&self, msg: &[u8]) -> ClientResult<Vec<u8>> {
        Ok(keccak256(msg).to_vec())
    }
}

pub struct MockGasPrice;

#[async_trait]
impl GasPriceMonitor for MockGasPrice {
    async fn gas_price(&self) -> ClientResult<U256> {
        Ok(U256::from(1u64))
    }
}

impl Backend for MockChain {
    fn receipts(&self) -> ClientResult<ReceiptStream> {
        let rx = self
            .receipts
            .lock()
            .take()
            .ok_or_else(|| ClientError::internal("receipt stream already taken"))?;
        Ok(Box::pin(rx))
    }
}

pub struct MockBinder(pub Arc<MockChain>);

impl ContractBinder for MockBinder {
    fn controller(&self, _: Address, _: Option<&TransactOpts>) -> ClientResult<Arc<dyn Controller>> {
        Ok(self.0.clone())
    }
    fn token(&self, _: Address, _: Option<&TransactOpts>) -> ClientResult<Arc<dyn Token>> {
        Ok(self.0.clone())
    }
    fn service_registry(&self, _: Address, _: Option<&TransactOpts>) -> ClientResult<Arc<dyn ServiceRegistry>> {
        Ok(self.0.clone())
    }
    fn bonding_manager(&self, _: Address, _: Option<&TransactOpts>) -> ClientResult<Arc<dyn BondingManager>> {
        Ok(self.0.clone())
    }
    fn ticket_broker(&self, _: Address, _: Option<&TransactOpts>) -> ClientResult<Arc<dyn TicketBroker>> {
        Ok(self.0.clone())
    }
    fn rounds_manager(&self, _: Address, _: Option<&TransactOpts>) -> ClientResult<Arc<dyn RoundsManager>> {
        Ok(self.0.clone())
    }
    fn minter(&self, _: Address, _: Option<&TransactOpts>) -> ClientResult<Arc<dyn Minter>> {
        Ok(self.0.clone())
    }
    fn faucet(&self, _: Address, _: Option<&TransactOpts>) -> ClientResult<Arc<dyn Faucet>> {
        Ok(self.0.clone())
    }
    fn poll(&self, _: Address, _: Option<&TransactOpts>) -> ClientResult<Arc<dyn Poll>> {
        Ok(self.0.clone())
    }
}

#[async_trait]
impl Controller for MockChain {
    async fn get_contract(&self, name_hash: B256) -> ClientResult<Address> {
        Ok(Address::from_slice(&name_hash[12..]))
    }
    async fn paused(&self) -> ClientResult<bool> {
        Ok(false)
    }
}

#[async_trait]
impl Token for MockChain {
    async fn allowance(&self, _owner: Address, _spender: Address) -> ClientResult<U256> {
        self.read("allowance")?;
        Ok(self.state.lock().allowance)
    }
    async fn balance_of(&self, _owner: Address) -> ClientResult<U256> {
        Ok(U256::from(1_000_000u64))
    }
    async fn total_supply(&self) -> ClientResult<U256> {
        Ok(U256::from(10_000_000u64))
    }
    async fn approve(&self, spender: Address, amount: U256) -> ClientResult<SubmittedTx> {
        self.state.lock().allowance = amount;
        self.write(Call::Approve { spender, amount })
    }
    async fn transfer(&self, _to: Address, _amount: U256) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("transfer"))
    }
}

#[async_trait]
impl Faucet for MockChain {
    async fn request(&self) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("request"))
    }
    async fn next_valid_request(&self, _addr: Address) -> ClientResult<U256> {
        Ok(U256::ZERO)
    }
}

#[async_trait]
impl ServiceRegistry for MockChain {
    async fn get_service_uri(&self, a: Address) -> ClientResult<String> {
        self.read("get_service_uri")?;
        Ok(format!("https://{}.example:8935", a))
    }
    async fn set_service_uri(&self, _uri: String) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("set_service_uri"))
    }
}

#[async_trait]
impl BondingManager for MockChain {
    async fn get_transcoder(&self, _a: Address) -> ClientResult<TranscoderInfo> {
        self.read("get_transcoder")?;
        Ok(TranscoderInfo {
            reward_cut: U256::from(50_000u64),
            fee_share: U256::from(250_000u64),
            ..Default::default()
        })
    }
    async fn transcoder_status(&self, _a: Address) -> ClientResult<u8> {
        Ok(1)
    }
    async fn transcoder_total_stake(&self, a: Address) -> ClientResult<U256> {
        self.read("transcoder_total_stake")?;
        Ok(self.stake_of(a))
    }
    async fn is_active_transcoder(&self, a: Address) -> ClientResult<bool> {
        Ok(self.state.lock().pool.iter().any(|(p, _)| *p == a))
    }
    async fn get_delegator(&self, a: Address) -> ClientResult<DelegatorInfo> {
        self.read("get_delegator")?;
        Ok(self.state.lock().delegators.get(&a).cloned().unwrap_or_default())
    }
    async fn delegator_status(&self, _a: Address) -> ClientResult<u8> {
        Ok(1)
    }
    async fn pending_stake(&self, a: Address, _round: U256) -> ClientResult<U256> {
        self.pending(a)
    }
    async fn pending_fees(&self, a: Address, _round: U256) -> ClientResult<U256> {
        self.pending(a).map(|_| U256::from(7u64))
    }
    async fn get_delegator_unbonding_lock(&self, _a: Address, lock_id: U256) -> ClientResult<UnbondingLockInfo> {
        self.read("get_delegator_unbonding_lock")?;
        Ok(self.state.lock().locks.get(&lock_id).cloned().unwrap_or_default())
    }
    async fn get_transcoder_earnings_pool_for_round(&self, _a: Address, _round: U256) -> ClientResult<EarningsPoolInfo> {
        Ok(self.state.lock().earnings.clone())
    }
    async fn get_first_transcoder_in_pool(&self) -> ClientResult<Address> {
        self.read("get_first_transcoder_in_pool")?;
        Ok(self.state.lock().pool.first().map_or(Address::ZERO, |(a, _)| *a))
    }
    async fn get_next_transcoder_in_pool(&self, a: Address) -> ClientResult<Address> {
        let s = self.state.lock();
        let idx = s.pool.iter().position(|(p, _)| *p == a);
        Ok(idx
            .and_then(|i| s.pool.get(i + 1))
            .map_or(Address::ZERO, |(n, _)| *n))
    }
    async fn get_total_bonded(&self) -> ClientResult<U256> {
        Ok(self.state.lock().total_bonded)
    }
    async fn get_transcoder_pool_size(&self) -> ClientResult<U256> {
        Ok(U256::from(self.state.lock().pool.len()))
    }
    async fn get_transcoder_pool_max_size(&self) -> ClientResult<U256> {
        self.read("get_transcoder_pool_max_size")?;
        Ok(U256::from(self.state.lock().max_size))
    }
    async fn unbonding_period(&self) -> ClientResult<u64> {
        Ok(7)
    }

    async fn transcoder(&self, reward_cut: U256, fee_share: U256) -> ClientResult<SubmittedTx> {
        self.write(Call::Transcoder { reward_cut, fee_share })
    }
    async fn reward_with_hint(&self, prev: Address, next: Address) -> ClientResult<SubmittedTx> {
        self.write(Call::Reward { prev, next })
    }
    async fn bond_with_hint(
        &self,
        amount: U256,
        to: Address,
        old_prev: Address,
        old_next: Address,
        new_prev: Address,
        new_next: Address,
    ) -> ClientResult<SubmittedTx> {
        self.write(Call::Bond { amount, to, old_prev, old_next, new_prev, new_next })
    }
    async fn unbond_with_hint(&self, amount: U256, prev: Address, next: Address) -> ClientResult<SubmittedTx> {
        self.write(Call::Unbond { amount, prev, next })
    }
    async fn rebond_with_hint(&self, lock_id: U256, prev: Address, next: Address) -> ClientResult<SubmittedTx> {
        self.write(Call::Rebond { lock_id, prev, next })
    }
    async fn rebond_from_unbonded_with_hint(
        &self,
        to: Address,
        lock_id: U256,
        prev: Address,
        next: Address,
    ) -> ClientResult<SubmittedTx> {
        self.write(Call::RebondFromUnbonded { to, lock_id, prev, next })
    }
    async fn withdraw_stake(&self, _lock_id: U256) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("withdraw_stake"))
    }
    async fn withdraw_fees(&self) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("withdraw_fees"))
    }
    async fn claim_earnings(&self, _end_round: U256) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("claim_earnings"))
    }
}

#[async_trait]
impl TicketBroker for MockChain {
    async fn fund_deposit_and_reserve(&self, _d: U256, _r: U256) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("fund_deposit_and_reserve"))
    }
    async fn fund_deposit(&self, _amount: U256) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("fund_deposit"))
    }
    async fn fund_reserve(&self, _amount: U256) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("fund_reserve"))
    }
    async fn unlock(&self) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("unlock"))
    }
    async fn cancel_unlock(&self) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("cancel_unlock"))
    }
    async fn withdraw(&self) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("withdraw"))
    }
    async fn redeem_winning_ticket(&self, _t: Ticket, _sig: Vec<u8>, _rand: U256) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("redeem_winning_ticket"))
    }
    async fn used_tickets(&self, _hash: B256) -> ClientResult<bool> {
        Ok(false)
    }
    async fn get_sender_info(&self, _sender: Address) -> ClientResult<SenderInfo> {
        Ok(SenderInfo::default())
    }
    async fn unlock_period(&self) -> ClientResult<U256> {
        Ok(U256::from(2u64))
    }
    async fn claimed_reserve(&self, _holder: Address, _claimant: Address) -> ClientResult<U256> {
        Ok(U256::ZERO)
    }
}

#[async_trait]
impl RoundsManager for MockChain {
    async fn initialize_round(&self) -> ClientResult<SubmittedTx> {
        self.write(Call::InitializeRound)
    }
    async fn current_round(&self) -> ClientResult<U256> {
        self.read("current_round")?;
        Ok(self.state.lock().current_round)
    }
    async fn last_initialized_round(&self) -> ClientResult<U256> {
        Ok(self.state.lock().current_round)
    }
    async fn block_hash_for_round(&self, _round: U256) -> ClientResult<B256> {
        Ok(B256::ZERO)
    }
    async fn current_round_initialized(&self) -> ClientResult<bool> {
        Ok(self.state.lock().round_initialized)
    }
    async fn current_round_locked(&self) -> ClientResult<bool> {
        Ok(self.state.lock().round_locked)
    }
    async fn current_round_start_block(&self) -> ClientResult<U256> {
        Ok(U256::from(5_000u64))
    }
    async fn round_length(&self) -> ClientResult<U256> {
        Ok(U256::from(50u64))
    }
    async fn round_lock_amount(&self) -> ClientResult<U256> {
        Ok(U256::from(100_000u64))
    }
}

#[async_trait]
impl Minter for MockChain {
    async fn current_mintable_tokens(&self) -> ClientResult<U256> {
        self.read("current_mintable_tokens")?;
        Ok(self.state.lock().mintable)
    }
    async fn inflation(&self) -> ClientResult<U256> {
        Ok(U256::from(137u64))
    }
    async fn inflation_change(&self) -> ClientResult<U256> {
        Ok(U256::from(3u64))
    }
    async fn target_bonding_rate(&self) -> ClientResult<U256> {
        Ok(U256::from(500_000u64))
    }
}

#[async_trait]
impl Poll for MockChain {
    async fn vote(&self, _choice_id: U256) -> ClientResult<SubmittedTx> {
        self.write(Call::Other("vote"))
    }
}

//! Staking client
//!
//! `StakeClient` owns one typed session per protocol contract (bound in
//! `set_gas_info`) plus the confirmation tracker. Its surface is split across:
//! - this module: construction, contract binding, helpers and the thin
//!   pass-through calls (rounds, token, service registry, ticket broker,
//!   protocol parameters, governance)
//! - `queries`: assembly of domain views from raw contract reads
//! - `staking`: orchestrated staking writes that need pool hints

mod queries;
mod staking;

use alloy_primitives::{keccak256, Address, B256, U256};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::{AccountManager, Backend, ContractBinder, GasPriceMonitor};
use crate::config::Config;
use crate::contracts::{
    BondingManager, Controller, Faucet, Minter, RoundsManager, ServiceRegistry, TicketBroker,
    Token,
};
use crate::errors::{ClientError, ClientResult};
use crate::metrics::{metrics, recorder};
use crate::observability::OperationContext;
use crate::tickets::{SenderInfo, Ticket};
use crate::tracker::ConfirmationTracker;
use crate::types::{SubmittedTx, TransactOpts};

/// Registry keys under which the controller stores contract addresses
pub mod registry_names {
    pub const TOKEN: &str = "LivepeerToken";
    pub const SERVICE_REGISTRY: &str = "ServiceRegistry";
    pub const BONDING_MANAGER: &str = "BondingManager";
    pub const TICKET_BROKER: &str = "TicketBroker";
    pub const ROUNDS_MANAGER: &str = "RoundsManager";
    pub const MINTER: &str = "Minter";
    pub const FAUCET: &str = "LivepeerTokenFaucet";
}

/// Deployed addresses of the protocol contracts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractAddresses {
    pub controller: Address,
    pub token: Address,
    pub service_registry: Address,
    pub bonding_manager: Address,
    pub ticket_broker: Address,
    pub rounds_manager: Address,
    pub minter: Address,
    pub faucet: Address,
}

impl ContractAddresses {
    pub fn to_map(&self) -> BTreeMap<&'static str, Address> {
        BTreeMap::from([
            ("Controller", self.controller),
            (registry_names::TOKEN, self.token),
            (registry_names::FAUCET, self.faucet),
            (registry_names::SERVICE_REGISTRY, self.service_registry),
            (registry_names::TICKET_BROKER, self.ticket_broker),
            (registry_names::ROUNDS_MANAGER, self.rounds_manager),
            (registry_names::BONDING_MANAGER, self.bonding_manager),
            (registry_names::MINTER, self.minter),
        ])
    }
}

/// Sessions bound against the active account's transact options
pub struct ContractSet {
    pub addresses: ContractAddresses,
    pub opts: TransactOpts,
    controller: Arc<dyn Controller>,
    token: Arc<dyn Token>,
    service_registry: Arc<dyn ServiceRegistry>,
    bonding_manager: Arc<dyn BondingManager>,
    ticket_broker: Arc<dyn TicketBroker>,
    rounds_manager: Arc<dyn RoundsManager>,
    minter: Arc<dyn Minter>,
    faucet: Arc<dyn Faucet>,
}

/// External collaborators the client is assembled from
pub struct ClientDeps {
    pub account_manager: Arc<dyn AccountManager>,
    /// `None` leaves the client unable to confirm transactions (`MissingBackend`)
    pub backend: Option<Arc<dyn Backend>>,
    pub binder: Arc<dyn ContractBinder>,
    pub gas_price_monitor: Arc<dyn GasPriceMonitor>,
}

pub struct StakeClient {
    account_manager: Arc<dyn AccountManager>,
    backend: Option<Arc<dyn Backend>>,
    binder: Arc<dyn ContractBinder>,
    gas_price_monitor: Arc<dyn GasPriceMonitor>,
    tracker: ConfirmationTracker,
    controller_addr: Address,
    confirmation_timeout: Option<Duration>,
    contracts: RwLock<Option<Arc<ContractSet>>>,
}

impl StakeClient {
    /// Build a client and start the receipt broadcaster
    ///
    /// Must be called from within a tokio runtime when a backend is supplied.
    pub fn new(config: &Config, deps: ClientDeps) -> ClientResult<Self> {
        metrics().set_enabled(config.monitoring.enable_metrics);
        let tracker = match &deps.backend {
            Some(backend) => {
                ConfirmationTracker::start(backend.receipts()?, config.tracker.mined_history)
            }
            None => ConfirmationTracker::with_history(config.tracker.mined_history),
        };

        Ok(Self {
            account_manager: deps.account_manager,
            backend: deps.backend,
            binder: deps.binder,
            gas_price_monitor: deps.gas_price_monitor,
            tracker,
            controller_addr: config.chain.controller_address,
            confirmation_timeout: config.confirmation_timeout(),
            contracts: RwLock::new(None),
        })
    }

    /// Build a client and bind its contract sessions with `chain.gas_limit`
    pub async fn connect(config: &Config, deps: ClientDeps) -> ClientResult<Self> {
        let client = Self::new(config, deps)?;
        client.set_gas_info(config.chain.gas_limit).await?;
        Ok(client)
    }

    /// Bind every contract session with transact options for `gas_limit`
    ///
    /// Must run once before any contract call; may run again to change the gas limit.
    pub async fn set_gas_info(&self, gas_limit: u64) -> ClientResult<()> {
        let gas_price = self.gas_price_monitor.gas_price().await?;
        let opts = self
            .account_manager
            .create_transact_opts(gas_limit, gas_price)
            .await?;
        let set = self.bind_contracts(opts).await?;
        *self.contracts.write() = Some(Arc::new(set));
        Ok(())
    }

    async fn bind_contracts(&self, opts: TransactOpts) -> ClientResult<ContractSet> {
        let binder = &self.binder;
        let controller = binder.controller(self.controller_addr, Some(&opts))?;
        debug!(address = %self.controller_addr, "Controller");

        let resolve = |name: &'static str| {
            let controller = Arc::clone(&controller);
            async move {
                let addr = controller.get_contract(keccak256(name.as_bytes())).await?;
                debug!(address = %addr, "{}", name);
                Ok::<_, ClientError>(addr)
            }
        };

        let addresses = ContractAddresses {
            controller: self.controller_addr,
            token: resolve(registry_names::TOKEN).await?,
            service_registry: resolve(registry_names::SERVICE_REGISTRY).await?,
            bonding_manager: resolve(registry_names::BONDING_MANAGER).await?,
            ticket_broker: resolve(registry_names::TICKET_BROKER).await?,
            rounds_manager: resolve(registry_names::ROUNDS_MANAGER).await?,
            minter: resolve(registry_names::MINTER).await?,
            faucet: resolve(registry_names::FAUCET).await?,
        };

        info!(
            gas_limit = opts.gas_limit,
            bonding_manager = %addresses.bonding_manager,
            "contract sessions bound"
        );

        Ok(ContractSet {
            token: binder.token(addresses.token, Some(&opts))?,
            service_registry: binder.service_registry(addresses.service_registry, Some(&opts))?,
            bonding_manager: binder.bonding_manager(addresses.bonding_manager, Some(&opts))?,
            ticket_broker: binder.ticket_broker(addresses.ticket_broker, Some(&opts))?,
            rounds_manager: binder.rounds_manager(addresses.rounds_manager, Some(&opts))?,
            // never transacted with directly
            minter: binder.minter(addresses.minter, None)?,
            faucet: binder.faucet(addresses.faucet, Some(&opts))?,
            controller,
            addresses,
            opts,
        })
    }

    fn contracts(&self) -> ClientResult<Arc<ContractSet>> {
        self.contracts
            .read()
            .as_ref()
            .cloned()
            .ok_or(ClientError::NotInitialized)
    }

    /// Register a freshly submitted transaction with the tracker
    async fn submit<F>(&self, ctx: &OperationContext, call: F) -> ClientResult<SubmittedTx>
    where
        F: Future<Output = ClientResult<SubmittedTx>>,
    {
        let tx = call.await?;
        self.tracker.track(&tx, ctx);
        if let Some(m) = recorder() {
            m.txs_submitted.inc();
        }
        info!(
            op = ctx.operation,
            correlation_id = %ctx.correlation_id,
            tx = %tx.hash,
            nonce = tx.nonce,
            "transaction submitted"
        );
        Ok(tx)
    }

    // Accessors

    pub fn account(&self) -> Address {
        self.account_manager.account()
    }

    pub fn backend(&self) -> Option<Arc<dyn Backend>> {
        self.backend.clone()
    }

    pub fn tracker(&self) -> &ConfirmationTracker {
        &self.tracker
    }

    pub fn gas_limit(&self) -> Option<u64> {
        self.contracts.read().as_ref().map(|c| c.opts.gas_limit)
    }

    /// Contract name to deployed address; unresolved entries are null before `set_gas_info`
    pub fn contract_addresses(&self) -> BTreeMap<&'static str, Address> {
        match self.contracts.read().as_ref() {
            Some(set) => set.addresses.to_map(),
            None => ContractAddresses {
                controller: self.controller_addr,
                ..Default::default()
            }
            .to_map(),
        }
    }

    /// Block until `tx` is mined; fails if it was mined with failure status
    pub async fn check_tx(&self, tx: &SubmittedTx) -> ClientResult<()> {
        match self.confirmation_timeout {
            Some(timeout) => self.tracker.wait_for_timeout(tx.hash, timeout).await,
            None => self.tracker.wait_for(tx.hash).await,
        }
    }

    pub async fn sign(&self, msg: &[u8]) -> ClientResult<Vec<u8>> {
        self.account_manager.sign(msg).await
    }

    // Rounds

    pub async fn current_round(&self) -> ClientResult<U256> {
        self.contracts()?.rounds_manager.current_round().await
    }

    pub async fn last_initialized_round(&self) -> ClientResult<U256> {
        self.contracts()?.rounds_manager.last_initialized_round().await
    }

    pub async fn block_hash_for_round(&self, round: U256) -> ClientResult<B256> {
        self.contracts()?.rounds_manager.block_hash_for_round(round).await
    }

    pub async fn current_round_initialized(&self) -> ClientResult<bool> {
        self.contracts()?.rounds_manager.current_round_initialized().await
    }

    pub async fn current_round_locked(&self) -> ClientResult<bool> {
        self.contracts()?.rounds_manager.current_round_locked().await
    }

    pub async fn current_round_start_block(&self) -> ClientResult<U256> {
        self.contracts()?.rounds_manager.current_round_start_block().await
    }

    // Token

    pub async fn transfer(&self, to: Address, amount: U256) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        self.submit(&OperationContext::new("transfer"), c.token.transfer(to, amount))
            .await
    }

    /// Request tokens from the faucet
    pub async fn request(&self) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        self.submit(&OperationContext::new("faucet_request"), c.faucet.request())
            .await
    }

    pub async fn next_valid_request(&self, addr: Address) -> ClientResult<U256> {
        self.contracts()?.faucet.next_valid_request(addr).await
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> ClientResult<U256> {
        self.contracts()?.token.allowance(owner, spender).await
    }

    pub async fn balance_of(&self, addr: Address) -> ClientResult<U256> {
        self.contracts()?.token.balance_of(addr).await
    }

    pub async fn total_supply(&self) -> ClientResult<U256> {
        self.contracts()?.token.total_supply().await
    }

    // Service registry

    pub async fn set_service_uri(&self, uri: String) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        self.submit(
            &OperationContext::new("set_service_uri"),
            c.service_registry.set_service_uri(uri),
        )
        .await
    }

    pub async fn get_service_uri(&self, addr: Address) -> ClientResult<String> {
        self.contracts()?.service_registry.get_service_uri(addr).await
    }

    // Ticket broker

    pub async fn fund_deposit_and_reserve(
        &self,
        deposit: U256,
        reserve: U256,
    ) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        self.submit(
            &OperationContext::new("fund_deposit_and_reserve"),
            c.ticket_broker.fund_deposit_and_reserve(deposit, reserve),
        )
        .await
    }

    pub async fn fund_deposit(&self, amount: U256) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        self.submit(
            &OperationContext::new("fund_deposit"),
            c.ticket_broker.fund_deposit(amount),
        )
        .await
    }

    pub async fn fund_reserve(&self, amount: U256) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        self.submit(
            &OperationContext::new("fund_reserve"),
            c.ticket_broker.fund_reserve(amount),
        )
        .await
    }

    pub async fn unlock(&self) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        self.submit(&OperationContext::new("unlock"), c.ticket_broker.unlock())
            .await
    }

    pub async fn cancel_unlock(&self) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        self.submit(
            &OperationContext::new("cancel_unlock"),
            c.ticket_broker.cancel_unlock(),
        )
        .await
    }

    pub async fn withdraw(&self) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        self.submit(&OperationContext::new("withdraw"), c.ticket_broker.withdraw())
            .await
    }

    pub async fn redeem_winning_ticket(
        &self,
        ticket: Ticket,
        sig: Vec<u8>,
        recipient_rand: U256,
    ) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        self.submit(
            &OperationContext::new("redeem_winning_ticket"),
            c.ticket_broker
                .redeem_winning_ticket(ticket, sig, recipient_rand),
        )
        .await
    }

    pub async fn is_used_ticket(&self, ticket: &Ticket) -> ClientResult<bool> {
        self.contracts()?.ticket_broker.used_tickets(ticket.hash()).await
    }

    pub async fn get_sender_info(&self, sender: Address) -> ClientResult<SenderInfo> {
        self.contracts()?.ticket_broker.get_sender_info(sender).await
    }

    pub async fn unlock_period(&self) -> ClientResult<U256> {
        self.contracts()?.ticket_broker.unlock_period().await
    }

    pub async fn claimed_reserve(
        &self,
        reserve_holder: Address,
        claimant: Address,
    ) -> ClientResult<U256> {
        self.contracts()?
            .ticket_broker
            .claimed_reserve(reserve_holder, claimant)
            .await
    }

    // Parameters

    pub async fn transcoder_pool_max_size(&self) -> ClientResult<U256> {
        self.contracts()?
            .bonding_manager
            .get_transcoder_pool_max_size()
            .await
    }

    pub async fn transcoder_pool_size(&self) -> ClientResult<U256> {
        self.contracts()?.bonding_manager.get_transcoder_pool_size().await
    }

    pub async fn total_bonded(&self) -> ClientResult<U256> {
        self.contracts()?.bonding_manager.get_total_bonded().await
    }

    pub async fn round_length(&self) -> ClientResult<U256> {
        self.contracts()?.rounds_manager.round_length().await
    }

    pub async fn round_lock_amount(&self) -> ClientResult<U256> {
        self.contracts()?.rounds_manager.round_lock_amount().await
    }

    pub async fn unbonding_period(&self) -> ClientResult<u64> {
        self.contracts()?.bonding_manager.unbonding_period().await
    }

    pub async fn inflation(&self) -> ClientResult<U256> {
        self.contracts()?.minter.inflation().await
    }

    pub async fn inflation_change(&self) -> ClientResult<U256> {
        self.contracts()?.minter.inflation_change().await
    }

    pub async fn target_bonding_rate(&self) -> ClientResult<U256> {
        self.contracts()?.minter.target_bonding_rate().await
    }

    pub async fn paused(&self) -> ClientResult<bool> {
        self.contracts()?.controller.paused().await
    }

    // Governance

    pub async fn vote(&self, poll: Address, choice_id: U256) -> ClientResult<SubmittedTx> {
        let c = self.contracts()?;
        let session = self.binder.poll(poll, Some(&c.opts))?;
        self.submit(&OperationContext::new("vote"), session.vote(choice_id))
            .await
    }
}

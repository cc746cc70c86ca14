//! Collaborators the client is built on
//!
//! Account management, gas pricing, the receipt event stream and the contract
//! bindings all live outside this crate. The client receives them as trait
//! objects at construction time.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::contracts::{
    BondingManager, Controller, Faucet, Minter, Poll, RoundsManager, ServiceRegistry,
    TicketBroker, Token,
};
use crate::errors::ClientResult;
use crate::types::{MinedReceipt, TransactOpts};

/// Stream of receipts for transactions sent from the client's account
pub type ReceiptStream = BoxStream<'static, ClientResult<MinedReceipt>>;

/// Active account and signing
#[async_trait]
pub trait AccountManager: Send + Sync {
    fn account(&self) -> Address;

    /// Produce transact options for the active account
    async fn create_transact_opts(
        &self,
        gas_limit: u64,
        gas_price: U256,
    ) -> ClientResult<TransactOpts>;

    async fn sign(&self, msg: &[u8]) -> ClientResult<Vec<u8>>;
}

#[async_trait]
pub trait GasPriceMonitor: Send + Sync {
    async fn gas_price(&self) -> ClientResult<U256>;
}

/// Chain RPC surface
pub trait Backend: Send + Sync {
    /// Open the receipt event stream consumed by the confirmation broadcaster
    fn receipts(&self) -> ClientResult<ReceiptStream>;
}

/// Binds typed contract sessions at a deployed address
///
/// Sessions bound with `Some(opts)` may transact; `None` yields a call-only
/// session.
pub trait ContractBinder: Send + Sync {
    fn controller(
        &self,
        addr: Address,
        opts: Option<&TransactOpts>,
    ) -> ClientResult<Arc<dyn Controller>>;
    fn token(&self, addr: Address, opts: Option<&TransactOpts>) -> ClientResult<Arc<dyn Token>>;
    fn service_registry(
        &self,
        addr: Address,
        opts: Option<&TransactOpts>,
    ) -> ClientResult<Arc<dyn ServiceRegistry>>;
    fn bonding_manager(
        &self,
        addr: Address,
        opts: Option<&TransactOpts>,
    ) -> ClientResult<Arc<dyn BondingManager>>;
    fn ticket_broker(
        &self,
        addr: Address,
        opts: Option<&TransactOpts>,
    ) -> ClientResult<Arc<dyn TicketBroker>>;
    fn rounds_manager(
        &self,
        addr: Address,
        opts: Option<&TransactOpts>,
    ) -> ClientResult<Arc<dyn RoundsManager>>;
    fn minter(&self, addr: Address, opts: Option<&TransactOpts>) -> ClientResult<Arc<dyn Minter>>;
    fn faucet(&self, addr: Address, opts: Option<&TransactOpts>) -> ClientResult<Arc<dyn Faucet>>;
    fn poll(&self, addr: Address, opts: Option<&TransactOpts>) -> ClientResult<Arc<dyn Poll>>;
}

//! Probabilistic payment tickets
//!
//! Types shared with the ticket broker contract plus the persistence boundary
//! for winning tickets awaiting redemption.

use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::errors::ClientResult;

/// A payment ticket as understood by the ticket broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub recipient: Address,
    pub sender: Address,
    pub face_value: U256,
    pub win_prob: U256,
    pub sender_nonce: U256,
    pub recipient_rand_hash: B256,
    pub creation_round: U256,
    pub creation_round_block_hash: B256,
}

impl Ticket {
    /// Auxiliary data committed to by the ticket: creation round and its block hash
    pub fn aux_data(&self) -> Vec<u8> {
        let mut aux = Vec::with_capacity(64);
        aux.extend_from_slice(&self.creation_round.to_be_bytes::<32>());
        aux.extend_from_slice(self.creation_round_block_hash.as_slice());
        aux
    }

    /// Tightly packed encoding of the ticket fields
    pub fn flatten(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(20 + 20 + 32 * 4 + 64);
        buf.extend_from_slice(self.recipient.as_slice());
        buf.extend_from_slice(self.sender.as_slice());
        buf.extend_from_slice(&self.face_value.to_be_bytes::<32>());
        buf.extend_from_slice(&self.win_prob.to_be_bytes::<32>());
        buf.extend_from_slice(&self.sender_nonce.to_be_bytes::<32>());
        buf.extend_from_slice(self.recipient_rand_hash.as_slice());
        buf.extend_from_slice(&self.aux_data());
        buf
    }

    /// Hash the broker uses to mark the ticket as used
    pub fn hash(&self) -> B256 {
        keccak256(self.flatten())
    }
}

/// A ticket together with the sender's signature and the recipient's revealed random value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTicket {
    pub ticket: Ticket,
    pub sig: Vec<u8>,
    pub recipient_rand: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveInfo {
    pub funds_remaining: U256,
    pub claimed_in_current_round: U256,
}

/// A sender's funds held by the ticket broker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub deposit: U256,
    pub withdraw_round: U256,
    pub reserve: ReserveInfo,
}

/// Persistence for winning tickets
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Most recently stored ticket for `sender`, if any
    async fn load_latest(&self, sender: Address) -> ClientResult<Option<SignedTicket>>;

    async fn remove(&self, ticket: &SignedTicket) -> ClientResult<()>;

    async fn store(&self, ticket: SignedTicket) -> ClientResult<()>;

    async fn count(&self, sender: Address) -> ClientResult<usize>;
}

/// In-memory `TicketStore`; tickets are lost on restart
#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    tickets: DashMap<Address, Vec<SignedTicket>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn load_latest(&self, sender: Address) -> ClientResult<Option<SignedTicket>> {
        Ok(self
            .tickets
            .get(&sender)
            .and_then(|tickets| tickets.last().cloned()))
    }

    async fn remove(&self, ticket: &SignedTicket) -> ClientResult<()> {
        let hash = ticket.ticket.hash();
        if let Some(mut tickets) = self.tickets.get_mut(&ticket.ticket.sender) {
            tickets.retain(|t| t.ticket.hash() != hash || t.sig != ticket.sig);
        }
        self.tickets.remove_if(&ticket.ticket.sender, |_, v| v.is_empty());
        Ok(())
    }

    async fn store(&self, ticket: SignedTicket) -> ClientResult<()> {
        self.tickets
            .entry(ticket.ticket.sender)
            .or_default()
            .push(ticket);
        Ok(())
    }

    async fn count(&self, sender: Address) -> ClientResult<usize> {
        Ok(self.tickets.get(&sender).map_or(0, |t| t.len()))
    }
}

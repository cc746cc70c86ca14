//! Transaction confirmation tracking
//!
//! One broadcaster task consumes the backend's receipt stream for the client's
//! account and pushes every receipt to every registered subscriber. Each
//! waiter filters for its own origin hash, so concurrent operations never
//! consume each other's receipts.
//!
//! Subscriber channels are unbounded: a slow waiter never stalls the
//! broadcaster and never misses a receipt broadcast after it registered.

use alloy_primitives::B256;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::ReceiptStream;
use crate::errors::{ClientError, ClientResult};
use crate::metrics::recorder;
use crate::observability::OperationContext;
use crate::types::{MinedReceipt, PendingTransaction, Receipt, SubmittedTx, TxStatus};

/// Default number of mined transactions remembered for late waiters and
/// replacement checks
pub const DEFAULT_MINED_HISTORY: usize = 1024;

struct SubscriberChannels {
    receipts: mpsc::UnboundedSender<Receipt>,
    errors: mpsc::UnboundedSender<ClientError>,
}

#[derive(Default)]
struct Ledger {
    pending: HashMap<B256, PendingTransaction>,
    /// replacement hash -> origin hash
    replacements: HashMap<B256, B256>,
    mined: HashMap<B256, Receipt>,
    mined_order: VecDeque<B256>,
}

impl Ledger {
    fn origin_of(&self, hash: B256) -> B256 {
        self.replacements.get(&hash).copied().unwrap_or(hash)
    }

    /// Remember a mined transaction; `capacity` counts transactions, so a
    /// replaced one is evicted together with its mined-hash alias
    fn record_mined(&mut self, receipt: Receipt, capacity: usize) {
        let origin = receipt.origin_tx_hash;
        self.pending.remove(&origin);
        self.replacements.retain(|_, o| *o != origin);
        if receipt.tx_hash != origin {
            self.mined.insert(receipt.tx_hash, receipt.clone());
        }
        match self.mined.insert(origin, receipt) {
            None => self.mined_order.push_back(origin),
            Some(prev) => self.forget_alias(&prev),
        }
        while self.mined_order.len() > capacity {
            let Some(old) = self.mined_order.pop_front() else {
                break;
            };
            if let Some(prev) = self.mined.remove(&old) {
                self.forget_alias(&prev);
            }
        }
    }

    fn forget_alias(&mut self, prev: &Receipt) {
        if prev.tx_hash == prev.origin_tx_hash {
            return;
        }
        let stale = self
            .mined
            .get(&prev.tx_hash)
            .is_some_and(|r| r.origin_tx_hash == prev.origin_tx_hash && r.tx_hash == prev.tx_hash);
        // a newer receipt for the same origin may reuse the key
        let current = self.mined.get(&prev.origin_tx_hash).map(|r| r.tx_hash);
        if stale && current != Some(prev.tx_hash) {
            self.mined.remove(&prev.tx_hash);
        }
    }
}

struct Inner {
    subscribers: DashMap<u64, SubscriberChannels>,
    next_id: AtomicU64,
    attached: AtomicBool,
    stopped: AtomicBool,
    ledger: Mutex<Ledger>,
    mined_history: usize,
}

impl Inner {
    fn dispatch(&self, raw: MinedReceipt) {
        let receipt = {
            let mut ledger = self.ledger.lock();
            let receipt = Receipt {
                origin_tx_hash: ledger.origin_of(raw.tx_hash),
                tx_hash: raw.tx_hash,
                status: raw.status,
                error: raw.error,
            };
            ledger.record_mined(receipt.clone(), self.mined_history);
            if let Some(m) = recorder() {
                m.pending_txs.set(ledger.pending.len() as i64);
            }
            receipt
        };

        if let Some(m) = recorder() {
            match receipt.status {
                TxStatus::Success => m.txs_confirmed.inc(),
                TxStatus::Failed => m.txs_failed.inc(),
            }
        }
        debug!(
            origin = %receipt.origin_tx_hash,
            mined = %receipt.tx_hash,
            status = ?receipt.status,
            subscribers = self.subscribers.len(),
            "broadcasting receipt"
        );

        for sub in self.subscribers.iter() {
            // a closed receiver is a waiter that is about to unsubscribe
            let _ = sub.receipts.send(receipt.clone());
        }
    }

    fn fail(&self, err: ClientError) {
        self.stopped.store(true, Ordering::SeqCst);
        warn!(error = %err, subscribers = self.subscribers.len(), "receipt broadcaster stopped");
        {
            let mut ledger = self.ledger.lock();
            ledger.pending.clear();
            ledger.replacements.clear();
        }
        if let Some(m) = recorder() {
            m.pending_txs.set(0);
        }
        for sub in self.subscribers.iter() {
            let _ = sub.errors.send(err.clone());
        }
    }

    fn remove_subscriber(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            if let Some(m) = recorder() {
                m.receipt_subscribers.dec();
            }
        }
    }
}

/// Fan-out of transaction receipts to concurrent waiters
#[derive(Clone)]
pub struct ConfirmationTracker {
    inner: Arc<Inner>,
}

impl ConfirmationTracker {
    /// Tracker with no receipt stream attached; subscriptions fail with `MissingBackend`
    pub fn new() -> Self {
        Self::with_history(DEFAULT_MINED_HISTORY)
    }

    pub fn with_history(mined_history: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(0),
                attached: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                ledger: Mutex::new(Ledger::default()),
                mined_history: mined_history.max(1),
            }),
        }
    }

    /// Create a tracker and spawn its broadcaster over `stream`
    pub fn start(stream: ReceiptStream, mined_history: usize) -> Self {
        let tracker = Self::with_history(mined_history);
        // a fresh tracker cannot already be attached
        let _ = tracker.attach(stream);
        tracker
    }

    /// Spawn the broadcaster task over `stream`; only one stream may ever be attached
    pub fn attach(&self, mut stream: ReceiptStream) -> ClientResult<JoinHandle<()>> {
        if self.inner.attached.swap(true, Ordering::SeqCst) {
            return Err(ClientError::internal("receipt stream already attached"));
        }
        let inner = Arc::clone(&self.inner);
        Ok(tokio::spawn(async move {
            info!("receipt broadcaster started");
            while let Some(item) = stream.next().await {
                match item {
                    Ok(raw) => inner.dispatch(raw),
                    Err(err) => {
                        inner.fail(err);
                        return;
                    }
                }
            }
            inner.fail(ClientError::Stream("receipt stream ended".to_string()));
        }))
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::SeqCst)
    }

    /// Register a new receipt subscriber
    pub fn subscribe(&self) -> ClientResult<Subscription> {
        if !self.is_attached() {
            return Err(ClientError::MissingBackend);
        }
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(ClientError::BroadcasterStopped);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (receipts_tx, receipts_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        self.inner.subscribers.insert(
            id,
            SubscriberChannels {
                receipts: receipts_tx,
                errors: errors_tx,
            },
        );
        if let Some(m) = recorder() {
            m.receipt_subscribers.inc();
        }

        // the broadcaster may have stopped between the check and the insert
        if self.inner.stopped.load(Ordering::SeqCst) {
            self.inner.remove_subscriber(id);
            return Err(ClientError::BroadcasterStopped);
        }

        Ok(Subscription {
            id,
            receipts: receipts_rx,
            errors: errors_rx,
            inner: Arc::clone(&self.inner),
            active: true,
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Record a submitted transaction as pending
    pub fn track(&self, tx: &SubmittedTx, ctx: &OperationContext) {
        let mut ledger = self.inner.ledger.lock();
        // the receipt can beat the submitter back
        if ledger.mined.contains_key(&tx.hash) {
            return;
        }
        ledger.pending.insert(
            tx.hash,
            PendingTransaction {
                origin_tx_hash: tx.hash,
                operation: ctx.operation,
                correlation_id: ctx.correlation_id.clone(),
                submitted_at: Instant::now(),
            },
        );
        if let Some(m) = recorder() {
            m.pending_txs.set(ledger.pending.len() as i64);
        }
    }

    pub fn pending(&self) -> Vec<PendingTransaction> {
        self.inner.ledger.lock().pending.values().cloned().collect()
    }

    pub fn is_pending(&self, origin: B256) -> bool {
        self.inner.ledger.lock().pending.contains_key(&origin)
    }

    /// Point a pending transaction at its replacement (e.g. a gas-price bump)
    ///
    /// Receipts for `new_hash` are then delivered under the first submitted
    /// hash. Fails when the transaction being replaced has already been mined.
    pub fn replace(&self, old_hash: B256, new_hash: B256) -> ClientResult<()> {
        let mut ledger = self.inner.ledger.lock();
        let origin = ledger.origin_of(old_hash);
        if ledger.mined.contains_key(&origin) {
            return Err(ClientError::ReplacingMinedTx { hash: old_hash });
        }
        ledger.replacements.insert(new_hash, origin);
        debug!(origin = %origin, replacement = %new_hash, "transaction replaced");
        Ok(())
    }

    /// Block until the transaction submitted as `origin` is observed mined
    pub async fn wait_for(&self, origin: B256) -> ClientResult<()> {
        let mut sub = self.subscribe()?;

        // mined before we registered
        let already = self.inner.ledger.lock().mined.get(&origin).cloned();
        if let Some(receipt) = already {
            sub.unsubscribe();
            return receipt_outcome(receipt);
        }

        loop {
            tokio::select! {
                biased;
                Some(err) = sub.errors.recv() => {
                    sub.unsubscribe();
                    return Err(err);
                }
                receipt = sub.receipts.recv() => {
                    let Some(receipt) = receipt else {
                        return Err(ClientError::BroadcasterStopped);
                    };
                    if receipt.origin_tx_hash != origin {
                        continue;
                    }
                    sub.unsubscribe();
                    return receipt_outcome(receipt);
                }
            }
        }
    }

    /// `wait_for` bounded by `timeout`; the subscription is released on expiry
    pub async fn wait_for_timeout(&self, origin: B256, timeout: Duration) -> ClientResult<()> {
        match tokio::time::timeout(timeout, self.wait_for(origin)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::ConfirmationTimeout {
                hash: origin,
                waited_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

impl Default for ConfirmationTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn receipt_outcome(receipt: Receipt) -> ClientResult<()> {
    if let Some(err) = receipt.error {
        return Err(err);
    }
    match receipt.status {
        TxStatus::Success => Ok(()),
        TxStatus::Failed => Err(ClientError::TransactionFailed {
            hash: receipt.tx_hash,
        }),
    }
}

/// A registered receipt subscriber; dropping it unsubscribes
pub struct Subscription {
    id: u64,
    receipts: mpsc::UnboundedReceiver<Receipt>,
    errors: mpsc::UnboundedReceiver<ClientError>,
    inner: Arc<Inner>,
    active: bool,
}

impl Subscription {
    /// Next broadcast receipt; `None` once unsubscribed and drained
    pub async fn recv_receipt(&mut self) -> Option<Receipt> {
        self.receipts.recv().await
    }

    /// Broadcaster-level failure; `None` once unsubscribed
    pub async fn recv_error(&mut self) -> Option<ClientError> {
        self.errors.recv().await
    }

    pub fn try_recv_receipt(&mut self) -> Option<Receipt> {
        self.receipts.try_recv().ok()
    }

    /// Stop delivery to this subscriber
    pub fn unsubscribe(&mut self) {
        if self.active {
            self.active = false;
            self.inner.remove_subscriber(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

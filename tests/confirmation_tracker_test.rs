//! Integration tests for concurrent confirmation waits

use alloy_primitives::{Address, B256, U256};
use futures::channel::mpsc;
use std::time::Duration;

use stake_client::observability::OperationContext;
use stake_client::{
    ClientError, ClientResult, ConfirmationTracker, MinedReceipt, SubmittedTx, TxStatus,
};

type Feed = mpsc::UnboundedSender<ClientResult<MinedReceipt>>;

fn hash(b: u8) -> B256 {
    B256::repeat_byte(b)
}

fn started() -> (ConfirmationTracker, Feed) {
    let (tx, rx) = mpsc::unbounded();
    (ConfirmationTracker::start(Box::pin(rx), 64), tx)
}

fn mine(feed: &Feed, b: u8, status: TxStatus) {
    feed.unbounded_send(Ok(MinedReceipt {
        tx_hash: hash(b),
        status,
        error: None,
    }))
    .unwrap();
}

fn submitted(b: u8) -> SubmittedTx {
    SubmittedTx {
        hash: hash(b),
        from: Address::repeat_byte(0x5e),
        nonce: b as u64,
        gas_limit: 500_000,
        gas_price: U256::from(1u64),
    }
}

async fn wait_until_subscribed(tracker: &ConfirmationTracker, n: usize) {
    while tracker.subscriber_count() < n {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_concurrent_waiters_receive_only_their_outcome() {
    let (tracker, feed) = started();

    let first = tokio::spawn({
        let tracker = tracker.clone();
        async move { tracker.wait_for(hash(0x11)).await }
    });
    let second = tokio::spawn({
        let tracker = tracker.clone();
        async move { tracker.wait_for(hash(0x22)).await }
    });
    wait_until_subscribed(&tracker, 2).await;

    // mined in the opposite order of submission
    mine(&feed, 0x22, TxStatus::Failed);
    mine(&feed, 0x11, TxStatus::Success);

    assert_eq!(first.await.unwrap(), Ok(()));
    assert_eq!(
        second.await.unwrap(),
        Err(ClientError::TransactionFailed { hash: hash(0x22) })
    );
    assert_eq!(tracker.subscriber_count(), 0);
}

#[tokio::test]
async fn test_every_subscriber_sees_every_receipt() {
    let (tracker, feed) = started();
    let mut a = tracker.subscribe().unwrap();
    let mut b = tracker.subscribe().unwrap();

    mine(&feed, 1, TxStatus::Success);
    mine(&feed, 2, TxStatus::Success);

    for sub in [&mut a, &mut b] {
        assert_eq!(sub.recv_receipt().await.unwrap().tx_hash, hash(1));
        assert_eq!(sub.recv_receipt().await.unwrap().tx_hash, hash(2));
    }
}

#[tokio::test]
async fn test_unsubscribed_receives_nothing_further() {
    let (tracker, feed) = started();
    let mut gone = tracker.subscribe().unwrap();
    let mut stays = tracker.subscribe().unwrap();

    gone.unsubscribe();
    assert_eq!(tracker.subscriber_count(), 1);

    mine(&feed, 3, TxStatus::Success);
    assert_eq!(stays.recv_receipt().await.unwrap().tx_hash, hash(3));
    assert!(gone.try_recv_receipt().is_none());
}

#[tokio::test]
async fn test_dropped_subscription_unsubscribes() {
    let (tracker, _feed) = started();
    {
        let _sub = tracker.subscribe().unwrap();
        assert_eq!(tracker.subscriber_count(), 1);
    }
    assert_eq!(tracker.subscriber_count(), 0);
}

#[tokio::test]
async fn test_stream_failure_reaches_all_waiters() {
    let (tracker, feed) = started();
    let ctx = OperationContext::new("bond");
    tracker.track(&submitted(0x31), &ctx);

    let waiters: Vec<_> = [0x31u8, 0x32]
        .into_iter()
        .map(|b| {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_for(hash(b)).await })
        })
        .collect();
    wait_until_subscribed(&tracker, 2).await;

    feed.unbounded_send(Err(ClientError::Stream("connection dropped".into())))
        .unwrap();

    for waiter in waiters {
        assert_eq!(
            waiter.await.unwrap(),
            Err(ClientError::Stream("connection dropped".into()))
        );
    }
    assert!(tracker.pending().is_empty());
    assert!(matches!(
        tracker.subscribe(),
        Err(ClientError::BroadcasterStopped)
    ));
}

#[tokio::test]
async fn test_wait_timeout_releases_subscription() {
    let (tracker, _feed) = started();

    let result = tracker
        .wait_for_timeout(hash(0x44), Duration::from_millis(20))
        .await;

    assert_eq!(
        result,
        Err(ClientError::ConfirmationTimeout {
            hash: hash(0x44),
            waited_ms: 20,
        })
    );
    assert_eq!(tracker.subscriber_count(), 0);
}

#[tokio::test]
async fn test_receipt_error_is_surfaced() {
    let (tracker, feed) = started();
    let waiter = tokio::spawn({
        let tracker = tracker.clone();
        async move { tracker.wait_for(hash(0x55)).await }
    });
    wait_until_subscribed(&tracker, 1).await;

    feed.unbounded_send(Ok(MinedReceipt {
        tx_hash: hash(0x55),
        status: TxStatus::Success,
        error: Some(ClientError::rpc("receipt lookup failed")),
    }))
    .unwrap();

    assert_eq!(
        waiter.await.unwrap(),
        Err(ClientError::rpc("receipt lookup failed"))
    );
}

#[tokio::test]
async fn test_no_backend() {
    let tracker = ConfirmationTracker::new();
    assert!(!tracker.is_attached());
    assert_eq!(
        tracker.wait_for(hash(1)).await,
        Err(ClientError::MissingBackend)
    );
}

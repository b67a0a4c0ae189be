//! Tests for the pending operation pool.

use std::sync::Arc;

use tsscore_core::mock::MockChain;
use tsscore_core::ChainClient;
use tsscore_pool::{CatchupScanner, Pool, PoolError};
use tsscore_types::{ChainParams, OperationStatus, OperationType};

fn setup(ids: &[&str]) -> (Arc<MockChain>, Pool) {
    let chain = Arc::new(MockChain::new(ChainParams::default()));
    for id in ids {
        chain.insert_operation(MockChain::approved(id, &format!("content-{id}")));
    }
    let pool = Pool::new(chain.clone() as Arc<dyn ChainClient>, 16);
    (chain, pool)
}

#[tokio::test]
async fn test_add_is_idempotent() {
    let (_, pool) = setup(&["op1"]);
    assert!(pool.add("op1").await.unwrap());
    assert!(!pool.add("op1").await.unwrap());
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.get_next(10).await, vec!["op1".to_string()]);
    assert!(pool.is_empty());
}

#[tokio::test]
async fn test_add_rejects_unapproved_and_signed() {
    let (chain, pool) = setup(&["op1", "op2"]);
    chain.set_status("op1", OperationStatus::Initialized);
    let mut signed = MockChain::approved("op2", "x");
    signed.signed = true;
    chain.insert_operation(signed);

    assert!(matches!(
        pool.add("op1").await,
        Err(PoolError::OperationNotApprovable(id)) if id == "op1"
    ));
    assert!(matches!(
        pool.add("op2").await,
        Err(PoolError::OperationNotApprovable(_))
    ));
    assert!(matches!(pool.add("missing").await, Err(PoolError::Chain(_))));
    assert!(pool.is_empty());
}

#[tokio::test]
async fn test_get_next_preserves_fifo_and_limit() {
    let (_, pool) = setup(&["a", "b", "c"]);
    for id in ["c", "a", "b"] {
        pool.add(id).await.unwrap();
    }
    assert_eq!(pool.get_next(2).await, vec!["c".to_string(), "a".to_string()]);
    assert_eq!(pool.get_next(2).await, vec!["b".to_string()]);
    assert!(pool.get_next(2).await.is_empty());
}

#[tokio::test]
async fn test_get_next_drops_no_longer_approved() {
    let (chain, pool) = setup(&["op1", "op2", "op3"]);
    for id in ["op1", "op2", "op3"] {
        pool.add(id).await.unwrap();
    }
    chain.set_status("op2", OperationStatus::NotApproved);

    assert_eq!(pool.get_next(10).await, vec!["op1".to_string(), "op3".to_string()]);
    assert!(!pool.contains("op2"));
}

#[tokio::test]
async fn test_transient_error_requeues_at_tail() {
    let (chain, pool) = setup(&["op1", "op2", "op3"]);
    for id in ["op1", "op2", "op3"] {
        pool.add(id).await.unwrap();
    }
    chain.set_failing("op2", true);

    assert_eq!(pool.get_next(10).await, vec!["op1".to_string()]);
    assert!(pool.contains("op2"));

    chain.set_failing("op2", false);
    assert_eq!(pool.get_next(10).await, vec!["op3".to_string(), "op2".to_string()]);
}

#[tokio::test]
async fn test_readd_after_dequeue() {
    let (_, pool) = setup(&["op1"]);
    pool.add("op1").await.unwrap();
    let batch = pool.get_next(1).await;
    assert_eq!(pool.requeue(&batch).await, 1);
    assert!(pool.contains("op1"));
}

#[tokio::test]
async fn test_catchup_pages_through_signable_operations() {
    let chain = Arc::new(MockChain::new(ChainParams::default()).with_page_size(2));
    for i in 0..5 {
        chain.insert_operation(MockChain::approved(&format!("op{i}"), "x"));
    }
    let mut other = MockChain::approved("op5", "x");
    other.operation_type = OperationType::Unsupported;
    chain.insert_operation(other);
    chain.set_status("op0", OperationStatus::Initialized);

    let pool = Arc::new(Pool::new(chain.clone() as Arc<dyn ChainClient>, 16));
    let scanner = CatchupScanner::new(chain.clone() as Arc<dyn ChainClient>, pool.clone());
    assert_eq!(scanner.run().await.unwrap(), 4);
    assert_eq!(pool.len(), 4);
    assert!(!pool.contains("op0"));
    assert!(!pool.contains("op5"));
}

#[tokio::test]
async fn test_add_waits_when_full() {
    let chain = Arc::new(MockChain::new(ChainParams::default()));
    chain.insert_operation(MockChain::approved("a", "x"));
    chain.insert_operation(MockChain::approved("b", "x"));
    let pool = Arc::new(Pool::new(chain as Arc<dyn ChainClient>, 1));

    pool.add("a").await.unwrap();
    let blocked = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.add("b").await })
    };
    tokio::task::yield_now().await;
    assert!(!blocked.is_finished());

    assert_eq!(pool.get_next(1).await, vec!["a".to_string()]);
    assert!(blocked.await.unwrap().unwrap());
    assert_eq!(pool.len(), 1);
}

#[tokio::test]
async fn test_requeue_does_not_wait_when_full() {
    let (chain, _) = setup(&[]);
    for id in ["op0", "op1", "op2"] {
        chain.insert_operation(MockChain::approved(id, "x"));
    }
    let pool = Pool::new(chain as Arc<dyn ChainClient>, 2);
    pool.add("op0").await.unwrap();
    pool.add("op1").await.unwrap();
    assert_eq!(pool.get_next(1).await, vec!["op0".to_string()]);
    pool.add("op2").await.unwrap();

    let requeued = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        pool.requeue(&["op0".to_string()]),
    )
    .await
    .expect("requeue must not wait for room");
    assert_eq!(requeued, 0);
    assert!(!pool.contains("op0"));
    assert_eq!(pool.len(), 2);
}

//! Tests for authentication and peer delivery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tsscore_core::mock::LoopbackNetwork;
use tsscore_core::{PeerDialer, SubmitHandler};
use tsscore_crypto::PrivateKey;
use tsscore_p2p::{
    AuthError, AuthGate, BroadcastConnector, ConnectionCache, RequestSigner, SubmitConnector,
};
use tsscore_types::{Party, Payload, RequestType, SessionType, SubmitRequest};

#[derive(Default)]
struct Counter {
    received: AtomicUsize,
    reject: bool,
}

#[async_trait]
impl SubmitHandler for Counter {
    async fn handle_submit(&self, _request: SubmitRequest) -> Result<(), String> {
        self.received.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            Err("unknown session".into())
        } else {
            Ok(())
        }
    }
}

fn roster(keys: &[PrivateKey]) -> Vec<Party> {
    keys.iter()
        .enumerate()
        .map(|(i, k)| Party::new(format!("p{i}"), k.public_key().to_hex(), format!("node{i}")))
        .collect()
}

fn request(signer: &RequestSigner) -> SubmitRequest {
    signer
        .build(
            3,
            SessionType::Default,
            RequestType::Acceptance,
            true,
            &Payload::Acceptance { root: "aa".into() },
        )
        .unwrap()
}

fn network(parties: &[Party]) -> (LoopbackNetwork, Vec<Arc<Counter>>) {
    let net = LoopbackNetwork::new();
    let counters: Vec<Arc<Counter>> = parties.iter().map(|_| Arc::new(Counter::default())).collect();
    for (party, counter) in parties.iter().zip(&counters) {
        net.register(&party.address, counter.clone());
    }
    (net, counters)
}

#[test]
fn test_auth_identifies_signer() {
    let keys: Vec<_> = (0..3).map(|_| PrivateKey::random()).collect();
    let parties = roster(&keys);
    let req = request(&RequestSigner::new(keys[1].clone()));
    assert_eq!(AuthGate::new(&parties).auth(&req).unwrap().account, "p1");
}

#[test]
fn test_auth_rejects_outsider_and_garbage() {
    let keys: Vec<_> = (0..3).map(|_| PrivateKey::random()).collect();
    let parties = roster(&keys);
    let gate = AuthGate::new(&parties);

    let outsider = request(&RequestSigner::new(PrivateKey::random()));
    assert_eq!(gate.auth(&outsider), Err(AuthError::SignerNotAParty));

    let mut garbled = request(&RequestSigner::new(keys[0].clone()));
    garbled.signature = "zz".into();
    assert!(matches!(gate.auth(&garbled), Err(AuthError::InvalidSignature(_))));

    let mut tampered = request(&RequestSigner::new(keys[0].clone()));
    tampered.payload = Payload::Acceptance { root: "bb".into() }.to_bytes().unwrap();
    assert!(gate.auth(&tampered).map(|p| p.account != "p0").unwrap_or(true));
}

#[tokio::test]
async fn test_broadcast_skips_self_and_reuses_connections() {
    let keys: Vec<_> = (0..4).map(|_| PrivateKey::random()).collect();
    let parties = roster(&keys);
    let (net, counters) = network(&parties);
    let cache = Arc::new(ConnectionCache::new(
        Arc::new(net.clone()) as Arc<dyn PeerDialer>,
        Duration::from_secs(1),
    ));
    let connector = BroadcastConnector::new(cache.clone(), "p0");
    let req = request(&RequestSigner::new(keys[0].clone()));

    let first = connector.broadcast(&parties, &req).await;
    let second = connector.broadcast(&parties, &req).await;

    assert!(first.is_complete() && second.is_complete());
    assert_eq!(first.delivered.len(), 3);
    assert_eq!(counters[0].received.load(Ordering::SeqCst), 0);
    assert_eq!(counters[1].received.load(Ordering::SeqCst), 2);
    assert_eq!(net.dial_count(), 3);
    assert_eq!(cache.len(), 3);
}

#[tokio::test]
async fn test_broadcast_retries_once_then_reports_unreachable() {
    let keys: Vec<_> = (0..4).map(|_| PrivateKey::random()).collect();
    let parties = roster(&keys);
    let (net, counters) = network(&parties);
    net.fail_next("node1", 1);
    net.set_down("node2", true);

    let cache = Arc::new(ConnectionCache::new(
        Arc::new(net.clone()) as Arc<dyn PeerDialer>,
        Duration::from_secs(1),
    ));
    let connector = BroadcastConnector::new(cache, "p0");
    let delivery = connector
        .broadcast(&parties, &request(&RequestSigner::new(keys[0].clone())))
        .await;

    assert_eq!(counters[1].received.load(Ordering::SeqCst), 1);
    let unreachable: Vec<_> = delivery.unreachable.iter().map(|p| p.account.as_str()).collect();
    assert_eq!(unreachable, vec!["p2"]);
    assert!(delivery.delivered.contains(&"p1".to_string()));
    assert!(delivery.delivered.contains(&"p3".to_string()));
}

#[tokio::test]
async fn test_rejection_is_not_unreachable() {
    let keys: Vec<_> = (0..2).map(|_| PrivateKey::random()).collect();
    let parties = roster(&keys);
    let net = LoopbackNetwork::new();
    let rejecting = Arc::new(Counter {
        reject: true,
        ..Counter::default()
    });
    net.register("node1", rejecting.clone());

    let cache = Arc::new(ConnectionCache::new(
        Arc::new(net) as Arc<dyn PeerDialer>,
        Duration::from_secs(1),
    ));
    let delivery = BroadcastConnector::new(cache, "p0")
        .broadcast(&parties, &request(&RequestSigner::new(keys[0].clone())))
        .await;
    assert_eq!(delivery.rejected, vec!["p1".to_string()]);
    assert!(delivery.unreachable.is_empty());
    assert_eq!(rejecting.received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_submit_retries_until_delivered() {
    let keys: Vec<_> = (0..2).map(|_| PrivateKey::random()).collect();
    let parties = roster(&keys);
    let (net, counters) = network(&parties);
    net.fail_next("node1", 3);

    let cache = Arc::new(ConnectionCache::new(
        Arc::new(net) as Arc<dyn PeerDialer>,
        Duration::from_secs(1),
    ));
    let connector = SubmitConnector::new(cache, Duration::from_millis(5));
    let ok = connector
        .submit(
            &parties[1],
            &request(&RequestSigner::new(keys[0].clone())),
            &CancellationToken::new(),
        )
        .await;
    assert!(ok);
    assert_eq!(counters[1].received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_submit_stops_on_cancel() {
    let keys: Vec<_> = (0..2).map(|_| PrivateKey::random()).collect();
    let parties = roster(&keys);
    let (net, _) = network(&parties);
    net.set_down("node1", true);

    let cache = Arc::new(ConnectionCache::new(
        Arc::new(net) as Arc<dyn PeerDialer>,
        Duration::from_secs(1),
    ));
    let connector = SubmitConnector::new(cache, Duration::from_millis(5));
    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        })
    };
    let ok = connector
        .submit(&parties[1], &request(&RequestSigner::new(keys[0].clone())), &cancel)
        .await;
    assert!(!ok);
    canceller.await.unwrap();
}

//! End-to-end tests of the tss_* API over HTTP.

use jsonrpsee::core::client::Error as ClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use std::sync::Arc;
use std::time::Duration;
use tsscore_core::memory::{MemorySecretStore, MemorySessionStore};
use tsscore_core::mock::{LoopbackNetwork, MockChain, MockEngineFactory};
use tsscore_core::{PeerDialer, TransportError};
use tsscore_crypto::PrivateKey;
use tsscore_p2p::{BroadcastConnector, ConnectionCache, RequestSigner, SubmitConnector};
use tsscore_pool::Pool;
use tsscore_rpc::{
    HttpPeerDialer, RpcServer, RpcServerBuilder, RpcServerConfig, SessionBackend, TssApiClient,
};
use tsscore_session::{SessionEnv, SessionManager, SessionSettings};
use tsscore_types::{
    ChainParams, Party, Payload, PhaseDurations, RequestType, SessionStatus, SessionType,
};

struct Fixture {
    server: RpcServer<SessionBackend>,
    client: HttpClient,
    chain: Arc<MockChain>,
    peer_key: PrivateKey,
    local_pub_key: String,
}

async fn fixture() -> Fixture {
    let local_key = PrivateKey::random();
    let peer_key = PrivateKey::random();
    let parties = vec![
        Party::new("node0", local_key.public_key().to_hex(), "peer-0"),
        Party::new("node1", peer_key.public_key().to_hex(), "peer-1"),
    ];
    let chain = Arc::new(MockChain::new(ChainParams {
        parties,
        threshold: 1,
        global_pub_key: Some("02".repeat(33)),
        last_signature: None,
        is_update_required: false,
        durations: PhaseDurations::default(),
    }));

    let cache = Arc::new(ConnectionCache::new(
        Arc::new(LoopbackNetwork::new()),
        Duration::from_millis(200),
    ));
    let pool = Arc::new(Pool::new(chain.clone(), 16));
    let env = SessionEnv {
        chain: chain.clone(),
        engines: Arc::new(MockEngineFactory::new()),
        secrets: Arc::new(MemorySecretStore::new(Some(b"share".to_vec()))),
        store: Arc::new(MemorySessionStore::new()),
        pool: pool.clone(),
        broadcaster: BroadcastConnector::new(cache.clone(), "node0"),
        submitter: SubmitConnector::new(cache, Duration::from_millis(20)),
        signer: Arc::new(RequestSigner::new(local_key.clone())),
        settings: SessionSettings {
            local_account: "node0".into(),
            seed_signature: "0x01".into(),
            max_operations_per_proposal: 8,
            mailbox_capacity: 16,
        },
    };
    let manager = SessionManager::bootstrap(Arc::new(env), &[SessionType::Default], 100, 1)
        .await
        .unwrap();

    let local_pub_key = local_key.public_key().to_hex();
    let backend = SessionBackend::new(Arc::new(manager), pool, "node0", local_pub_key.clone());
    let mut server = RpcServerBuilder::new()
        .listen_addr("127.0.0.1:0".parse().unwrap())
        .backend(Arc::new(backend))
        .build()
        .unwrap();
    server.start().await.unwrap();

    let addr = server.local_addr().unwrap();
    let client = HttpClientBuilder::default()
        .build(format!("http://{addr}"))
        .unwrap();

    Fixture {
        server,
        client,
        chain,
        peer_key,
        local_pub_key,
    }
}

fn error_code(err: ClientError) -> i32 {
    match err {
        ClientError::Call(obj) => obj.code(),
        other => panic!("expected a call error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_info() {
    let f = fixture().await;
    let info = f.client.info().await.unwrap();
    assert_eq!(info.account, "node0");
    assert_eq!(info.pub_key, f.local_pub_key);
    assert_eq!(info.sessions.len(), 1);
    assert_eq!(info.sessions[0].session_type, SessionType::Default);
    assert_eq!(info.sessions[0].start, 100);
    assert_eq!(info.sessions[0].status, SessionStatus::Pending);
}

#[tokio::test]
async fn test_add_operation() {
    let f = fixture().await;
    f.chain.insert_operation(MockChain::approved("op1", "transfer"));

    assert!(f.client.add_operation("op1".into()).await.unwrap());
    assert!(!f.client.add_operation("op1".into()).await.unwrap());

    let missing = f.client.add_operation("op9".into()).await.unwrap_err();
    assert_eq!(error_code(missing), -32001);

    let mut signed = MockChain::approved("op2", "transfer");
    signed.signed = true;
    f.chain.insert_operation(signed);
    let refused = f.client.add_operation("op2".into()).await.unwrap_err();
    assert_eq!(error_code(refused), -32602);
}

#[tokio::test]
async fn test_session_lookup() {
    let f = fixture().await;
    let record = f.client.session(SessionType::Default, 0).await.unwrap();
    assert_eq!(record.id, 0);
    assert_eq!(record.parties, vec!["node0".to_string(), "node1".to_string()]);

    let err = f.client.session(SessionType::Default, 9).await.unwrap_err();
    assert_eq!(error_code(err), -32001);
}

#[tokio::test]
async fn test_submit_authenticates() {
    let f = fixture().await;
    let payload = Payload::Acceptance { root: "ab".into() };

    let from_peer = RequestSigner::new(f.peer_key.clone())
        .build(0, SessionType::Default, RequestType::Acceptance, true, &payload)
        .unwrap();
    f.client.submit(from_peer).await.unwrap();

    let from_stranger = RequestSigner::new(PrivateKey::random())
        .build(0, SessionType::Default, RequestType::Acceptance, true, &payload)
        .unwrap();
    let err = f.client.submit(from_stranger).await.unwrap_err();
    assert_eq!(error_code(err), -32602);
}

#[tokio::test]
async fn test_http_peer_dialer_delivers() {
    let mut f = fixture().await;
    let addr = f.server.local_addr().unwrap().to_string();
    let dialer = HttpPeerDialer::new(Duration::from_secs(2));
    let peer = dialer.dial(&addr).await.unwrap();

    let payload = Payload::Acceptance { root: "ab".into() };
    let ok = RequestSigner::new(f.peer_key.clone())
        .build(1, SessionType::Default, RequestType::Acceptance, true, &payload)
        .unwrap();
    peer.submit(&ok).await.unwrap();

    let unknown = RequestSigner::new(f.peer_key.clone())
        .build(7, SessionType::Default, RequestType::Acceptance, true, &payload)
        .unwrap();
    assert!(matches!(
        peer.submit(&unknown).await,
        Err(TransportError::Rejected(_))
    ));

    f.server.stop().await;
    assert!(peer.submit(&ok).await.is_err());
}

#[test]
fn test_default_config() {
    let config = RpcServerConfig::default();
    assert_eq!(config.listen_addr, "127.0.0.1:26660".parse().unwrap());
    assert!(config.max_connections > 0);
}

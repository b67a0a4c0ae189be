//! In-process cluster used by the session scenario tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tsscore_core::memory::{MemorySecretStore, MemorySessionStore};
use tsscore_core::mock::{LoopbackNetwork, MockChain, MockEngineFactory};
use tsscore_crypto::PrivateKey;
use tsscore_p2p::{BroadcastConnector, ConnectionCache, RequestSigner, SubmitConnector};
use tsscore_pool::Pool;
use tsscore_session::{ProposerProvider, SessionEnv, SessionManager, SessionSettings};
use tsscore_types::{ChainParams, Party, PhaseDurations, SessionType};

pub const SEED: &str = "0x1234";

pub struct TestNode {
    pub account: String,
    pub address: String,
    pub key: PrivateKey,
    pub manager: Arc<SessionManager>,
    pub pool: Arc<Pool>,
    pub secrets: Arc<MemorySecretStore>,
    pub store: Arc<MemorySessionStore>,
}

pub struct Cluster {
    pub chain: Arc<MockChain>,
    pub network: LoopbackNetwork,
    pub engines: Arc<MockEngineFactory>,
    pub parties: Vec<Party>,
    pub nodes: Vec<TestNode>,
}

pub fn durations() -> PhaseDurations {
    PhaseDurations {
        proposal: 2,
        acceptance: 2,
        sign: 3,
        reshare: 3,
        keygen: 3,
        finish: 2,
    }
}

pub struct ClusterBuilder {
    n: usize,
    t: usize,
    types: Vec<SessionType>,
    start_block: u64,
    is_update_required: bool,
    with_shares: bool,
}

impl ClusterBuilder {
    pub fn new(n: usize, t: usize) -> Self {
        Self {
            n,
            t,
            types: vec![SessionType::Default],
            start_block: 10,
            is_update_required: false,
            with_shares: true,
        }
    }

    pub fn types(mut self, types: &[SessionType]) -> Self {
        self.types = types.to_vec();
        self
    }

    pub fn update_required(mut self) -> Self {
        self.is_update_required = true;
        self
    }

    pub fn without_shares(mut self) -> Self {
        self.with_shares = false;
        self
    }

    pub async fn build(self) -> Cluster {
        let keys: Vec<PrivateKey> = (0..self.n).map(|_| PrivateKey::random()).collect();
        let parties: Vec<Party> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| Party::new(format!("node{i}"), k.public_key().to_hex(), format!("peer-{i}")))
            .collect();

        let chain = Arc::new(MockChain::new(ChainParams {
            parties: parties.clone(),
            threshold: self.t,
            global_pub_key: self.with_shares.then(|| "02".repeat(33)),
            last_signature: None,
            is_update_required: self.is_update_required,
            durations: durations(),
        }));
        let network = LoopbackNetwork::new();
        let engines = Arc::new(MockEngineFactory::new());

        let mut nodes = Vec::with_capacity(self.n);
        for (i, key) in keys.into_iter().enumerate() {
            let account = parties[i].account.clone();
            let address = parties[i].address.clone();
            let cache = Arc::new(ConnectionCache::new(
                Arc::new(network.clone()),
                Duration::from_millis(500),
            ));
            let pool = Arc::new(Pool::new(chain.clone(), 1_000));
            let secrets = Arc::new(MemorySecretStore::new(
                self.with_shares.then(|| format!("share:{account}").into_bytes()),
            ));
            let store = Arc::new(MemorySessionStore::new());

            let env = SessionEnv {
                chain: chain.clone(),
                engines: engines.clone(),
                secrets: secrets.clone(),
                store: store.clone(),
                pool: pool.clone(),
                broadcaster: BroadcastConnector::new(cache.clone(), account.clone()),
                submitter: SubmitConnector::new(cache, Duration::from_millis(20)),
                signer: Arc::new(RequestSigner::new(key.clone())),
                settings: SessionSettings {
                    local_account: account.clone(),
                    seed_signature: SEED.to_string(),
                    max_operations_per_proposal: 16,
                    mailbox_capacity: 256,
                },
            };

            let manager = Arc::new(
                SessionManager::bootstrap(Arc::new(env), &self.types, self.start_block, self.start_block)
                    .await
                    .unwrap(),
            );
            network.register(&address, manager.clone());

            nodes.push(TestNode {
                account,
                address,
                key,
                manager,
                pool,
                secrets,
                store,
            });
        }

        Cluster {
            chain,
            network,
            engines,
            parties,
            nodes,
        }
    }
}

impl Cluster {
    /// Tick every node through `from..=to`, pausing between blocks so
    /// spawned phase tasks can exchange messages.
    pub async fn run_blocks(&self, from: u64, to: u64) {
        self.run_blocks_without(from, to, &[]).await;
    }

    /// Like `run_blocks`, but the nodes in `stopped` are never ticked.
    pub async fn run_blocks_without(&self, from: u64, to: u64, stopped: &[usize]) {
        for height in from..=to {
            for (i, node) in self.nodes.iter().enumerate() {
                if stopped.contains(&i) {
                    continue;
                }
                node.manager.new_block(height).await.unwrap();
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
    }

    /// Index of the proposer of the first session, given the bootstrap seed.
    pub fn first_proposer(&self, id: u64) -> usize {
        let seed = tsscore_crypto::decode_hex(SEED).unwrap();
        let provider = ProposerProvider::new(self.parties.clone(), seed);
        let proposer = provider.next_proposer(id).unwrap();
        self.parties.iter().position(|p| p == proposer).unwrap()
    }

    /// Put operations on chain and in every node's pool.
    pub async fn add_operations(&self, ops: &[(&str, &str)]) {
        for (index, content) in ops {
            self.chain.insert_operation(MockChain::approved(index, content));
        }
        for node in &self.nodes {
            for (index, _) in ops {
                assert!(node.pool.add(index).await.unwrap());
            }
        }
    }
}

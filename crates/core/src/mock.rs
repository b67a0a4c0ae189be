//! Deterministic in-process doubles for the chain, the MPC engine and the
//! peer network. Used by tests across the workspace.

use crate::{
    ChainClient, ChainError, ChainResult, EngineChannels, EngineError, EngineFactory, EngineKind,
    EngineMessage, EngineOutput, EngineParams, EngineResult, PartyEngine, PeerClient, PeerDialer,
    SubmitHandler, TransportError, TransportResult,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use tsscore_crypto::keccak256_concat;
use tsscore_types::{
    ChainMsg, ChainParams, Operation, OperationStatus, OperationType, OperationsPage,
    SubmitRequest,
};

// ============================================================================
// Chain
// ============================================================================

/// In-memory chain.
///
/// Submitted messages are recorded and applied: confirmations mark their
/// operations signed, roster changes replace the roster and key.
pub struct MockChain {
    operations: RwLock<BTreeMap<String, Operation>>,
    params: RwLock<ChainParams>,
    submitted: Mutex<Vec<ChainMsg>>,
    failing: RwLock<HashSet<String>>,
    params_failures: AtomicUsize,
    submit_failures: AtomicUsize,
    page_size: usize,
}

impl MockChain {
    /// Create a chain with the given parameters.
    pub fn new(params: ChainParams) -> Self {
        Self {
            operations: RwLock::new(BTreeMap::new()),
            params: RwLock::new(params),
            submitted: Mutex::new(Vec::new()),
            failing: RwLock::new(HashSet::new()),
            params_failures: AtomicUsize::new(0),
            submit_failures: AtomicUsize::new(0),
            page_size: 100,
        }
    }

    /// Set the page size of [`ChainClient::operations`].
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// An approved, unsigned transfer whose content is `content`.
    pub fn approved(index: &str, content: &str) -> Operation {
        Operation {
            index: index.to_string(),
            signed: false,
            status: OperationStatus::Approved,
            operation_type: OperationType::Transfer,
            content: content.as_bytes().to_vec(),
        }
    }

    /// Insert or replace an operation.
    pub fn insert_operation(&self, op: Operation) {
        self.operations.write().insert(op.index.clone(), op);
    }

    /// Change the status of an existing operation.
    pub fn set_status(&self, index: &str, status: OperationStatus) {
        if let Some(op) = self.operations.write().get_mut(index) {
            op.status = status;
        }
    }

    /// Make lookups of `index` fail with an RPC error.
    pub fn set_failing(&self, index: &str, failing: bool) {
        let mut set = self.failing.write();
        if failing {
            set.insert(index.to_string());
        } else {
            set.remove(index);
        }
    }

    /// Make the next `n` calls to [`ChainClient::params`] fail.
    pub fn fail_next_params(&self, n: usize) {
        self.params_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` calls to [`ChainClient::submit`] fail without
    /// applying anything.
    pub fn fail_next_submits(&self, n: usize) {
        self.submit_failures.store(n, Ordering::SeqCst);
    }

    /// Replace the parameters.
    pub fn set_params(&self, params: ChainParams) {
        *self.params.write() = params;
    }

    /// Current parameters.
    pub fn params_snapshot(&self) -> ChainParams {
        self.params.read().clone()
    }

    /// Every message submitted so far.
    pub fn submitted(&self) -> Vec<ChainMsg> {
        self.submitted.lock().clone()
    }

    /// Whether `index` was marked signed by a confirmation.
    pub fn is_signed(&self, index: &str) -> bool {
        self.operations
            .read()
            .get(index)
            .map(|op| op.signed)
            .unwrap_or(false)
    }

    fn apply(&self, msg: &ChainMsg) {
        match msg {
            ChainMsg::Confirmation {
                indexes, signature, ..
            } => {
                let mut ops = self.operations.write();
                for index in indexes {
                    if let Some(op) = ops.get_mut(index) {
                        op.signed = true;
                    }
                }
                self.params.write().last_signature = Some(signature.clone());
            }
            ChainMsg::ChangeParties {
                parties,
                new_key,
                signature,
            } => {
                let mut params = self.params.write();
                params.parties = parties.clone();
                params.global_pub_key = Some(new_key.clone());
                params.last_signature = Some(signature.clone());
                params.is_update_required = false;
            }
            ChainMsg::SetupInitial { new_key, .. } => {
                self.params.write().global_pub_key = Some(new_key.clone());
            }
            ChainMsg::ViolationReport { .. } => {}
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn operation(&self, index: &str) -> ChainResult<Operation> {
        if self.failing.read().contains(index) {
            return Err(ChainError::Rpc(format!("lookup of {index} failed")));
        }
        self.operations
            .read()
            .get(index)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(index.to_string()))
    }

    async fn operations(&self, cursor: &[u8]) -> ChainResult<OperationsPage> {
        let start = String::from_utf8(cursor.to_vec())
            .map_err(|e| ChainError::Rpc(format!("bad cursor: {e}")))?;
        let ops = self.operations.read();
        let mut iter = ops.range(start..).map(|(_, op)| op.clone());
        let operations: Vec<Operation> = iter.by_ref().take(self.page_size).collect();
        let next_key = iter
            .next()
            .map(|op| op.index.into_bytes())
            .unwrap_or_default();
        Ok(OperationsPage {
            operations,
            next_key,
        })
    }

    async fn params(&self) -> ChainResult<ChainParams> {
        let pending = self.params_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.params_failures.store(pending - 1, Ordering::SeqCst);
            return Err(ChainError::Rpc("params unavailable".into()));
        }
        Ok(self.params.read().clone())
    }

    async fn submit(&self, msgs: Vec<ChainMsg>) -> ChainResult<()> {
        let pending = self.submit_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.submit_failures.store(pending - 1, Ordering::SeqCst);
            return Err(ChainError::Rejected("simulation failed".into()));
        }
        for msg in &msgs {
            self.apply(msg);
        }
        self.submitted.lock().extend(msgs);
        Ok(())
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Builds [`MockEngine`]s.
///
/// Accounts marked silent run an engine that never emits its message, so no
/// other participant can finish.
#[derive(Default)]
pub struct MockEngineFactory {
    silent: RwLock<HashSet<String>>,
}

impl MockEngineFactory {
    /// Create a factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make engines created for `account` silent.
    pub fn set_silent(&self, account: &str) {
        self.silent.write().insert(account.to_string());
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(&self, kind: EngineKind, params: EngineParams) -> EngineResult<Arc<dyn PartyEngine>> {
        if !params
            .participants
            .iter()
            .any(|p| p.account == params.local_account)
        {
            return Err(EngineError::NotParticipant);
        }
        let silent = self.silent.read().contains(&params.local_account);
        Ok(Arc::new(MockEngine::new(kind, params, silent)))
    }
}

/// One-round engine: broadcasts its own account and finishes once every other
/// participant's account has been received. Every participant derives the
/// same output from the participant set and the engine kind.
pub struct MockEngine {
    kind: EngineKind,
    params: EngineParams,
    silent: bool,
    inbox_tx: mpsc::UnboundedSender<String>,
    inbox_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl MockEngine {
    fn new(kind: EngineKind, params: EngineParams, silent: bool) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            kind,
            params,
            silent,
            inbox_tx,
            inbox_rx: Mutex::new(Some(inbox_rx)),
        }
    }

    fn others(&self) -> HashSet<String> {
        self.params
            .participants
            .iter()
            .filter(|p| p.account != self.params.local_account)
            .map(|p| p.account.clone())
            .collect()
    }

    /// Output every participant of this engine agrees on.
    pub fn output(kind: &EngineKind, params: &EngineParams) -> EngineOutput {
        let mut accounts: Vec<&str> = params
            .participants
            .iter()
            .map(|p| p.account.as_str())
            .collect();
        accounts.sort_unstable();
        let joined = accounts.join(",");
        let id = params.session_id.to_be_bytes();

        match kind {
            EngineKind::Sign { digest } => {
                let a = keccak256_concat(&[digest.as_slice(), joined.as_bytes()]);
                let b = keccak256_concat(&[a.as_slice(), digest.as_slice()]);
                let mut sig = Vec::with_capacity(65);
                sig.extend_from_slice(&a);
                sig.extend_from_slice(&b);
                sig.push(0);
                EngineOutput::Signature(hex::encode(sig))
            }
            EngineKind::Keygen => EngineOutput::Key {
                global_pub_key: hex::encode(keccak256_concat(&[
                    b"keygen".as_slice(),
                    &id,
                    joined.as_bytes(),
                ])),
                share: format!("share:{}", params.local_account).into_bytes(),
            },
            EngineKind::Reshare { new_parties } => {
                let targets: Vec<&str> = new_parties.iter().map(|p| p.account.as_str()).collect();
                let share = if targets.contains(&params.local_account.as_str()) {
                    format!("share:{}:{}", params.session_id, params.local_account).into_bytes()
                } else {
                    Vec::new()
                };
                EngineOutput::Key {
                    global_pub_key: hex::encode(keccak256_concat(&[
                        b"reshare".as_slice(),
                        &id,
                        targets.join(",").as_bytes(),
                    ])),
                    share,
                }
            }
        }
    }
}

#[async_trait]
impl PartyEngine for MockEngine {
    fn start(&self, cancel: CancellationToken) -> EngineResult<EngineChannels> {
        let mut inbox = self
            .inbox_rx
            .lock()
            .take()
            .ok_or_else(|| EngineError::InvalidState("already started".into()))?;
        let (out_tx, out_rx) = mpsc::channel(64);
        let (result_tx, result_rx) = oneshot::channel();

        let expected = self.others();
        let local = self.params.local_account.clone();
        let silent = self.silent;
        let output = Self::output(&self.kind, &self.params);

        tokio::spawn(async move {
            if !silent {
                let msg = EngineMessage {
                    to: expected.iter().cloned().collect(),
                    is_broadcast: true,
                    data: local.clone().into_bytes(),
                };
                if out_tx.send(msg).await.is_err() {
                    return;
                }
            }

            let mut heard = HashSet::new();
            while heard.len() < expected.len() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(account = %local, heard = heard.len(), "mock engine cancelled");
                        return;
                    }
                    sender = inbox.recv() => match sender {
                        Some(sender) if expected.contains(&sender) => {
                            heard.insert(sender);
                        }
                        Some(_) => {}
                        None => return,
                    },
                }
            }

            trace!(account = %local, "mock engine finished");
            let _ = result_tx.send(Ok(output));
            // Keep the outbound side open until the phase ends.
            cancel.cancelled().await;
        });

        Ok(EngineChannels {
            outbound: out_rx,
            result: result_rx,
        })
    }

    async fn receive(&self, sender: &str, _is_broadcast: bool, data: &[u8]) -> EngineResult<()> {
        if data != sender.as_bytes() {
            return Err(EngineError::Protocol(format!("unexpected data from {sender}")));
        }
        self.inbox_tx
            .send(sender.to_string())
            .map_err(|_| EngineError::InvalidState("engine stopped".into()))
    }
}

// ============================================================================
// Network
// ============================================================================

#[derive(Default)]
struct LoopbackInner {
    handlers: RwLock<HashMap<String, Arc<dyn SubmitHandler>>>,
    down: RwLock<HashSet<String>>,
    failures: Mutex<HashMap<String, usize>>,
    dials: AtomicUsize,
    delivered: AtomicUsize,
}

/// In-memory network delivering requests straight to registered handlers.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<LoopbackInner>,
}

impl LoopbackNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route requests for `address` to `handler`.
    pub fn register(&self, address: &str, handler: Arc<dyn SubmitHandler>) {
        self.inner
            .handlers
            .write()
            .insert(address.to_string(), handler);
    }

    /// Make `address` unreachable (or reachable again).
    pub fn set_down(&self, address: &str, down: bool) {
        let mut set = self.inner.down.write();
        if down {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    /// Fail the next `n` deliveries to `address`.
    pub fn fail_next(&self, address: &str, n: usize) {
        self.inner.failures.lock().insert(address.to_string(), n);
    }

    /// Number of successful dials.
    pub fn dial_count(&self) -> usize {
        self.inner.dials.load(Ordering::SeqCst)
    }

    /// Number of delivered requests.
    pub fn delivered(&self) -> usize {
        self.inner.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerDialer for LoopbackNetwork {
    async fn dial(&self, address: &str) -> TransportResult<Arc<dyn PeerClient>> {
        if !self.inner.handlers.read().contains_key(address) {
            return Err(TransportError::ConnectionFailed(format!("no route to {address}")));
        }
        self.inner.dials.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(LoopbackClient {
            inner: self.inner.clone(),
            address: address.to_string(),
        }))
    }
}

struct LoopbackClient {
    inner: Arc<LoopbackInner>,
    address: String,
}

#[async_trait]
impl PeerClient for LoopbackClient {
    async fn submit(&self, request: &SubmitRequest) -> TransportResult<()> {
        if self.inner.down.read().contains(&self.address) {
            return Err(TransportError::ConnectionFailed(self.address.clone()));
        }
        {
            let mut failures = self.inner.failures.lock();
            if let Some(left) = failures.get_mut(&self.address) {
                if *left > 0 {
                    *left -= 1;
                    return Err(TransportError::SendFailed(self.address.clone()));
                }
            }
        }
        let handler = self
            .inner
            .handlers
            .read()
            .get(&self.address)
            .cloned()
            .ok_or_else(|| TransportError::ConnectionFailed(self.address.clone()))?;

        handler
            .handle_submit(request.clone())
            .await
            .map_err(TransportError::Rejected)?;
        self.inner.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsscore_types::Party;

    fn params(local: &str, accounts: &[&str]) -> EngineParams {
        EngineParams {
            session_id: 1,
            local_account: local.to_string(),
            participants: accounts.iter().map(|a| Party::new(*a, "", "")).collect(),
            threshold: 1,
            share: None,
        }
    }

    #[tokio::test]
    async fn test_operations_pagination() {
        let chain = MockChain::new(ChainParams::default()).with_page_size(2);
        for i in 0..5 {
            chain.insert_operation(MockChain::approved(&format!("op{i}"), "x"));
        }
        let first = chain.operations(&[]).await.unwrap();
        assert_eq!(first.operations.len(), 2);
        assert_eq!(first.next_key, b"op2".to_vec());
        let second = chain.operations(&first.next_key).await.unwrap();
        let third = chain.operations(&second.next_key).await.unwrap();
        assert_eq!(third.operations.len(), 1);
        assert!(third.next_key.is_empty());
    }

    #[tokio::test]
    async fn test_confirmation_marks_signed() {
        let chain = MockChain::new(ChainParams::default());
        chain.insert_operation(MockChain::approved("op1", "x"));
        chain
            .submit(vec![ChainMsg::Confirmation {
                indexes: vec!["op1".into()],
                root: "r".into(),
                signature: "ab".into(),
            }])
            .await
            .unwrap();
        assert!(chain.is_signed("op1"));
        assert_eq!(chain.params_snapshot().last_signature.as_deref(), Some("ab"));
    }

    #[tokio::test]
    async fn test_params_failures_are_transient() {
        let chain = MockChain::new(ChainParams::default());
        chain.fail_next_params(1);
        assert!(chain.params().await.is_err());
        assert!(chain.params().await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_submit_applies_nothing() {
        let chain = MockChain::new(ChainParams::default());
        chain.insert_operation(MockChain::approved("op1", "x"));
        let confirm = vec![ChainMsg::Confirmation {
            indexes: vec!["op1".into()],
            root: "ab".into(),
            signature: "cd".into(),
        }];
        chain.fail_next_submits(1);
        assert!(chain.submit(confirm.clone()).await.is_err());
        assert!(!chain.is_signed("op1"));
        assert!(chain.submitted().is_empty());

        chain.submit(confirm).await.unwrap();
        assert!(chain.is_signed("op1"));
    }

    #[tokio::test]
    async fn test_mock_engine_completes_when_all_heard() {
        let factory = MockEngineFactory::new();
        let kind = EngineKind::Sign { digest: [7u8; 32] };
        let engine = factory.create(kind.clone(), params("a", &["a", "b"])).unwrap();

        let cancel = CancellationToken::new();
        let mut channels = engine.start(cancel.clone()).unwrap();
        let msg = channels.outbound.recv().await.unwrap();
        assert!(msg.is_broadcast);
        assert_eq!(msg.data, b"a".to_vec());

        engine.receive("b", true, b"b").await.unwrap();
        let output = (&mut channels.result).await.unwrap().unwrap();
        assert_eq!(output, MockEngine::output(&kind, &params("b", &["b", "a"])));
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_mock_engine_rejects_non_participant() {
        let factory = MockEngineFactory::new();
        assert!(matches!(
            factory.create(EngineKind::Keygen, params("z", &["a", "b"])),
            Err(EngineError::NotParticipant)
        ));
    }

    #[tokio::test]
    async fn test_mock_engine_unfinished_on_cancel() {
        let factory = MockEngineFactory::new();
        let engine = factory.create(EngineKind::Keygen, params("a", &["a", "b"])).unwrap();
        let cancel = CancellationToken::new();
        let mut channels = engine.start(cancel.clone()).unwrap();
        assert!(matches!(
            channels.result.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        ));
        cancel.cancel();
        assert!(engine.start(CancellationToken::new()).is_err());
    }
}

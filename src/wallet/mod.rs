// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Bridge
//!
//! Wires the negotiator, correlator, risk pipeline and dispatcher into one
//! event-driven service for the wallet role.
//!
//! ## Event flow
//!
//! ```text
//! relay ──mpsc──▶ run() ──▶ per-topic lane ──▶ negotiator / correlator
//!                   │                               │
//!                   └── sweep tick                  └── risk pipeline ──▶ EventBus
//! ```
//!
//! Events for the same topic are handled in arrival order by a dedicated
//! lane task; lanes for different topics run concurrently. A lane is
//! dropped when its topic closes or turns out to have no session. The approval
//! layer subscribes to the [`EventBus`] and answers through
//! [`WalletBridge::approve_request`] / [`WalletBridge::reject_request`].
//!
//! ## Shutdown
//!
//! [`WalletBridge::run`] returns when the inbound channel closes or the
//! `CancellationToken` is triggered.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy::primitives::Address;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blockchain::ChainRpc;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult, ProtocolError};
use crate::models::{AccountId, Namespaces, Proposal, Request, Session};
use crate::relay::{PairingUri, RelayEvent, SessionRequestEvent, WalletRelay};
use crate::requests::{BridgeEvent, Correlator, EventBus, EventReceiver, Intake};
use crate::risk::{RiskAssessment, RiskPipeline, TransactionIntent};
use crate::session::{wallet_namespaces, Negotiator, RestoreReport};
use crate::signing::{Dispatcher, UnlockedKey};
use crate::storage::{BridgeDatabase, SessionStore};

type Lane = mpsc::UnboundedSender<RelayEvent>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    negotiator: Negotiator,
    correlator: Correlator,
    pipeline: Arc<RiskPipeline>,
    dispatcher: Dispatcher,
    events: EventBus,
    accounts: Vec<AccountId>,
    lanes: Mutex<HashMap<String, Lane>>,
    sweep_interval: Duration,
}

/// Wallet-role bridge. Cheap to clone.
#[derive(Clone)]
pub struct WalletBridge {
    inner: Arc<Inner>,
}

impl WalletBridge {
    /// Assemble a bridge from its capabilities.
    ///
    /// `accounts` are the CAIP-10 accounts the wallet is willing to expose.
    pub fn new(
        relay: Arc<dyn WalletRelay>,
        rpc: Arc<dyn ChainRpc>,
        db: Arc<BridgeDatabase>,
        pipeline: RiskPipeline,
        accounts: Vec<AccountId>,
        config: &BridgeConfig,
    ) -> Self {
        let store = SessionStore::new(db);
        let events = EventBus::new();
        Self {
            inner: Arc::new(Inner {
                negotiator: Negotiator::new(relay.clone(), store.clone()),
                correlator: Correlator::new(relay, store, events.clone(), config.request_timeout),
                pipeline: Arc::new(pipeline),
                dispatcher: Dispatcher::new(rpc),
                events,
                accounts,
                lanes: Mutex::new(HashMap::new()),
                sweep_interval: config.sweep_interval,
            }),
        }
    }

    /// Open the database under `config.data_dir` and build the full pipeline.
    pub fn open(
        config: &BridgeConfig,
        relay: Arc<dyn WalletRelay>,
        rpc: Arc<dyn ChainRpc>,
        accounts: Vec<AccountId>,
    ) -> BridgeResult<Self> {
        let db = Arc::new(BridgeDatabase::open(&config.database_path())?);
        let pipeline = RiskPipeline::from_config(config, Some(db.clone()), Some(rpc.clone()))?;
        Ok(Self::new(relay, rpc, db, pipeline, accounts, config))
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    pub fn pipeline(&self) -> &RiskPipeline {
        &self.inner.pipeline
    }

    /// Reconcile persisted sessions and refresh the phishing list.
    pub async fn start(&self) -> BridgeResult<RestoreReport> {
        let source = self.inner.pipeline.refresh_phishing_list().await;
        info!(source = ?source, "Phishing list loaded");
        self.inner.restore().await
    }

    /// Run the event loop until `inbound` closes or `shutdown` fires.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(bridge.clone().run(inbound, shutdown.clone()));
    /// ```
    pub async fn run(self, mut inbound: mpsc::Receiver<RelayEvent>, shutdown: CancellationToken) {
        info!(
            sweep_interval_secs = self.inner.sweep_interval.as_secs(),
            "Wallet bridge starting"
        );
        let mut sweep = tokio::time::interval(self.inner.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = inbound.recv() => match event {
                    Some(event) => self.inner.route(event),
                    None => {
                        info!("Relay channel closed, wallet bridge stopping");
                        break;
                    }
                },
                _ = sweep.tick() => {
                    let expired = self.inner.correlator.sweep_expired(Utc::now()).await;
                    if !expired.is_empty() {
                        info!(count = expired.len(), "Expired overdue requests");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Wallet bridge shutting down");
                    break;
                }
            }
        }
        // closing the senders lets every lane drain and exit
        lock(&self.inner.lanes).clear();
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub async fn pair(&self, uri: &str) -> BridgeResult<PairingUri> {
        self.inner.negotiator.pair(uri).await
    }

    pub fn pending_proposals(&self) -> Vec<Proposal> {
        self.inner.negotiator.pending_proposals()
    }

    /// Approve with every configured account on the default namespace.
    pub async fn approve_session(&self, proposal_id: u64) -> BridgeResult<Session> {
        let supported = wallet_namespaces(&self.inner.accounts);
        self.approve_session_with(proposal_id, &self.inner.accounts, &supported)
            .await
    }

    pub async fn approve_session_with(
        &self,
        proposal_id: u64,
        accounts: &[AccountId],
        supported: &Namespaces,
    ) -> BridgeResult<Session> {
        let session = self
            .inner
            .negotiator
            .approve(proposal_id, accounts, supported)
            .await?;
        self.inner
            .events
            .publish(BridgeEvent::SessionSettled(session.clone()));
        Ok(session)
    }

    pub async fn reject_session(&self, proposal_id: u64) -> BridgeResult<()> {
        self.inner
            .negotiator
            .reject(proposal_id, &ProtocolError::user_rejected())
            .await
    }

    pub async fn update_session(&self, topic: &str, namespaces: Namespaces) -> BridgeResult<Session> {
        let session = self.inner.negotiator.update(topic, namespaces).await?;
        self.inner
            .events
            .publish(BridgeEvent::SessionUpdated(session.clone()));
        Ok(session)
    }

    /// Disconnect locally first; pending requests of the session expire.
    pub async fn disconnect(&self, topic: &str) -> BridgeResult<bool> {
        let existed = self
            .inner
            .negotiator
            .disconnect(topic, &ProtocolError::user_disconnected())
            .await?;
        self.inner.close_topic(topic).await;
        Ok(existed)
    }

    pub async fn disconnect_all(&self) -> BridgeResult<Vec<String>> {
        let topics = self
            .inner
            .negotiator
            .disconnect_all(&ProtocolError::user_disconnected())
            .await?;
        for topic in &topics {
            self.inner.close_topic(topic).await;
        }
        Ok(topics)
    }

    pub fn sessions(&self) -> BridgeResult<Vec<Session>> {
        self.inner.negotiator.sessions()
    }

    // =========================================================================
    // Requests
    // =========================================================================

    pub fn request(&self, topic: &str, id: u64) -> Option<Request> {
        self.inner.correlator.get(topic, id)
    }

    pub fn live_requests(&self) -> Vec<Request> {
        self.inner.correlator.live()
    }

    /// Execute a risk-checked request with a freshly unlocked key.
    ///
    /// The key is consumed; it does not outlive this call. The key's account
    /// must be one the session exposed. Any dispatch failure has already been
    /// answered on the wire when it is returned.
    pub async fn approve_request(
        &self,
        topic: &str,
        id: u64,
        key: UnlockedKey,
    ) -> BridgeResult<Value> {
        let correlator = &self.inner.correlator;
        let request = correlator.approve(topic, id)?;

        let outcome = match correlator.authorize_signer(&request, key.address()) {
            Ok(()) => {
                let request = correlator.mark_dispatched(topic, id)?;
                self.inner.dispatcher.dispatch(&request, key).await
            }
            Err(e) => Err(e),
        };
        correlator.complete(topic, id, &outcome).await?;
        outcome
    }

    pub async fn reject_request(&self, topic: &str, id: u64) -> BridgeResult<Request> {
        self.inner.correlator.reject(topic, id).await
    }

    /// Assess a local send before the user confirms it.
    pub async fn assess_intent(&self, intent: &TransactionIntent) -> RiskAssessment {
        self.inner.pipeline.assess_intent(intent).await
    }

    #[cfg(test)]
    fn lane_count(&self) -> usize {
        lock(&self.inner.lanes).len()
    }
}

impl Inner {
    fn route(self: &Arc<Self>, event: RelayEvent) {
        let topic = match &event {
            RelayEvent::SessionProposal(_) | RelayEvent::Reconnected => None,
            other => other.topic().map(str::to_string),
        };
        let Some(topic) = topic else {
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.handle(event).await });
            return;
        };

        let closing = matches!(event, RelayEvent::SessionDelete { .. });
        let mut lanes = lock(&self.lanes);
        let lane = lanes
            .entry(topic.clone())
            .or_insert_with(|| self.spawn_lane(&topic));
        if let Err(mpsc::error::SendError(event)) = lane.send(event) {
            let fresh = self.spawn_lane(&topic);
            if fresh.send(event).is_err() {
                warn!(topic = %topic, "Lane unavailable, event dropped");
            }
            *lane = fresh;
        }
        if closing {
            lanes.remove(&topic);
        }
    }

    /// Close the topic's lane; it drains what is queued and exits.
    fn drop_lane(&self, topic: &str) {
        if lock(&self.lanes).remove(topic).is_some() {
            debug!(topic = %topic, "Lane dropped");
        }
    }

    fn spawn_lane(self: &Arc<Self>, topic: &str) -> Lane {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let inner = Arc::clone(self);
        let topic = topic.to_string();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                inner.handle(event).await;
            }
            debug!(topic = %topic, "Lane closed");
        });
        tx
    }

    async fn handle(&self, event: RelayEvent) {
        let result = match event {
            RelayEvent::SessionProposal(proposal) => {
                self.on_proposal(proposal).await;
                Ok(())
            }
            RelayEvent::SessionRequest(request) => self.on_request(request).await,
            RelayEvent::SessionDelete { topic } => self.on_session_deleted(&topic).await,
            RelayEvent::SessionAcknowledged { topic } => {
                self.negotiator.on_acknowledged(&topic).map(|session| {
                    if let Some(session) = session {
                        self.events.publish(BridgeEvent::SessionUpdated(session));
                    }
                })
            }
            RelayEvent::SessionUpdate { topic, namespaces } => self
                .negotiator
                .on_session_update(&topic, &namespaces)
                .map(|session| {
                    if let Some(session) = session {
                        self.events.publish(BridgeEvent::SessionUpdated(session));
                    }
                }),
            RelayEvent::SessionEvent { topic, name, data } => {
                self.on_peer_event(topic, name, data)
            }
            RelayEvent::Reconnected => self.restore().await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to handle relay event");
        }
    }

    async fn on_proposal(&self, proposal: Proposal) {
        if !self.negotiator.on_proposal(proposal.clone()) {
            return;
        }
        let risk = self.pipeline.assess_proposal(&proposal).await;
        self.events
            .publish(BridgeEvent::ProposalReceived { proposal, risk });
    }

    async fn on_request(&self, event: SessionRequestEvent) -> BridgeResult<()> {
        let topic = event.topic.clone();
        let request = match self.correlator.on_request(event).await? {
            Intake::Enqueued(request) => request,
            Intake::Rejected(BridgeError::NotConnected(_)) => {
                self.drop_lane(&topic);
                return Ok(());
            }
            Intake::Rejected(_) | Intake::Duplicate => return Ok(()),
        };
        let account = self.account_for(&request);
        let risk = self.pipeline.assess_request(&request, account).await;
        if let Err(e) = self.correlator.attach_risk(&request.topic, request.id, risk) {
            // decided or expired while the checks ran
            debug!(request_id = request.id, error = %e, "Risk result discarded");
        }
        Ok(())
    }

    /// Forward a `session_event` the session negotiated; anything else is
    /// dropped.
    fn on_peer_event(&self, topic: String, name: String, data: Value) -> BridgeResult<()> {
        let allowed = self
            .negotiator
            .usable_session(&topic)?
            .is_some_and(|session| session.allows_event(&name));
        if !allowed {
            debug!(topic = %topic, event = %name, "Peer event not negotiated, dropped");
            return Ok(());
        }
        self.events.publish(BridgeEvent::PeerEvent { topic, name, data });
        Ok(())
    }

    async fn on_session_deleted(&self, topic: &str) -> BridgeResult<()> {
        self.negotiator.on_session_deleted(topic)?;
        self.close_topic(topic).await;
        Ok(())
    }

    /// Expire the topic's undispatched requests, drop its lane and announce
    /// the closure.
    async fn close_topic(&self, topic: &str) {
        self.drop_lane(topic);
        let expired = self.correlator.on_session_deleted(topic).await;
        if !expired.is_empty() {
            info!(topic = %topic, count = expired.len(), "Pending requests expired with session");
        }
        self.events.publish(BridgeEvent::SessionClosed {
            topic: topic.to_string(),
        });
    }

    async fn restore(&self) -> BridgeResult<RestoreReport> {
        let report = self.negotiator.restore_sessions().await?;
        for topic in &report.dropped {
            self.close_topic(topic).await;
        }
        Ok(report)
    }

    /// The configured account exposed on the request's chain.
    fn account_for(&self, request: &Request) -> Option<Address> {
        self.accounts
            .iter()
            .find(|a| a.chain == request.chain)
            .and_then(|a| Address::from_str(&a.address).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::testing::MockRpc;
    use crate::config::RiskThresholds;
    use crate::models::{ChainRef, PeerMetadata, ProposalNamespace, RequestStatus, EIP155};
    use crate::relay::testing::MockRelay;
    use crate::relay::{RpcOutcome, RpcRequest};
    use crate::signing::key::tests::{test_key, TEST_ADDRESS};
    use crate::storage::database::tests::temp_db;
    use alloy::primitives::Signature;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tokio::task::JoinHandle;

    const URI: &str = "wc:7f6e504bfad60b485450578e05678ed3e8e8c4751d3c6160be17160d63ec90f9@2?relay-protocol=irn&symKey=587d5484ce2a2a6ee3ba1962fdd7e8588e06200c46823bd18fbd67def96ad303";

    struct Harness {
        bridge: WalletBridge,
        relay: Arc<MockRelay>,
        events: EventReceiver,
        inbound: mpsc::Sender<RelayEvent>,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
        _dir: tempfile::TempDir,
    }

    fn harness(request_timeout: Duration) -> Harness {
        harness_with(request_timeout, MockRpc::new(&[56]))
    }

    fn harness_with(request_timeout: Duration, rpc: MockRpc) -> Harness {
        let (db, dir) = temp_db();
        let relay = Arc::new(MockRelay::new());
        let config = BridgeConfig {
            request_timeout,
            sweep_interval: Duration::from_millis(20),
            ..BridgeConfig::default()
        };
        let bridge = WalletBridge::new(
            relay.clone(),
            Arc::new(rpc),
            Arc::new(db),
            RiskPipeline::new(RiskThresholds::default()),
            vec![AccountId::new(ChainRef::evm(56), TEST_ADDRESS.to_string())],
            &config,
        );
        let events = bridge.subscribe();
        let (inbound, rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(bridge.clone().run(rx, shutdown.clone()));
        Harness {
            bridge,
            relay,
            events,
            inbound,
            shutdown,
            task,
            _dir: dir,
        }
    }

    fn proposal(id: u64) -> Proposal {
        Proposal {
            id,
            pairing_topic: "7f6e504bfad60b485450578e05678ed3e8e8c4751d3c6160be17160d63ec90f9".into(),
            proposer: PeerMetadata {
                name: "Example dApp".into(),
                url: "https://app.example".into(),
                ..Default::default()
            },
            required_namespaces: BTreeMap::from([(
                EIP155.to_string(),
                ProposalNamespace {
                    chains: vec![ChainRef::evm(56)],
                    methods: vec!["personal_sign".into(), "eth_sendTransaction".into()],
                    events: vec!["chainChanged".into()],
                },
            )]),
            optional_namespaces: BTreeMap::new(),
            expiry: None,
        }
    }

    fn sign_request(id: u64, topic: &str, account: &str) -> RelayEvent {
        rpc_request(id, topic, "personal_sign", json!(["0x68656c6c6f", account]))
    }

    fn rpc_request(id: u64, topic: &str, method: &str, params: Value) -> RelayEvent {
        RelayEvent::SessionRequest(SessionRequestEvent {
            id,
            topic: topic.into(),
            chain_id: "eip155:56".into(),
            request: RpcRequest {
                method: method.into(),
                params,
            },
        })
    }

    fn error_code(response: &crate::relay::RpcResponse) -> Option<i64> {
        match &response.outcome {
            RpcOutcome::Error(e) => Some(e.code),
            RpcOutcome::Result(_) => None,
        }
    }

    async fn eventually(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time")
    }

    async fn wait_for<F>(rx: &mut EventReceiver, mut matches: F) -> BridgeEvent
    where
        F: FnMut(&BridgeEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = rx.recv().await.unwrap();
                if matches(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event not published in time")
    }

    /// Pair, receive the proposal and approve it; returns the session topic.
    async fn connect(h: &mut Harness) -> String {
        h.bridge.pair(URI).await.unwrap();
        h.inbound
            .send(RelayEvent::SessionProposal(proposal(1)))
            .await
            .unwrap();
        wait_for(&mut h.events, |e| matches!(e, BridgeEvent::ProposalReceived { .. })).await;
        h.bridge.approve_session(1).await.unwrap().topic
    }

    async fn assessed(h: &mut Harness, id: u64) -> Request {
        match wait_for(&mut h.events, |e| {
            matches!(e, BridgeEvent::RequestAssessed(r) if r.id == id)
        })
        .await
        {
            BridgeEvent::RequestAssessed(request) => request,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn approved_request_is_signed_and_answered_once() {
        let mut h = harness(Duration::from_secs(300));
        let topic = connect(&mut h).await;

        h.inbound
            .send(sign_request(42, &topic, &TEST_ADDRESS.to_string()))
            .await
            .unwrap();
        let request = assessed(&mut h, 42).await;
        assert_eq!(request.status, RequestStatus::RiskChecked);
        assert!(request.risk.is_some());

        let result = h.bridge.approve_request(&topic, 42, test_key()).await.unwrap();
        let bytes = alloy::hex::decode(result.as_str().unwrap()).unwrap();
        let signature = Signature::try_from(bytes.as_slice()).unwrap();
        assert_eq!(
            signature.recover_address_from_msg(b"hello").unwrap(),
            TEST_ADDRESS
        );

        let responses = h.relay.responses_for(42);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].outcome, RpcOutcome::Result(result));
        assert!(h.bridge.request(&topic, 42).is_none());
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn dispatch_failure_is_answered_with_protocol_error() {
        let mut h = harness_with(
            Duration::from_secs(300),
            MockRpc::reverting(&[56], "insufficient funds"),
        );
        let topic = connect(&mut h).await;

        h.inbound
            .send(rpc_request(
                7,
                &topic,
                "eth_sendTransaction",
                json!([{
                    "from": TEST_ADDRESS.to_string(),
                    "to": "0x000000000000000000000000000000000000dEaD",
                    "value": "0x1"
                }]),
            ))
            .await
            .unwrap();
        assessed(&mut h, 7).await;

        let err = h.bridge.approve_request(&topic, 7, test_key()).await.unwrap_err();
        assert!(matches!(err, BridgeError::SimulationFailed(_)));
        let responses = h.relay.responses_for(7);
        assert_eq!(responses.len(), 1);
        assert_eq!(error_code(&responses[0]), Some(ProtocolError::SERVER_ERROR));
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn request_for_unexposed_account_is_refused() {
        let mut h = harness(Duration::from_secs(300));
        let topic = connect(&mut h).await;

        h.inbound
            .send(sign_request(8, &topic, "0x1111111111111111111111111111111111111111"))
            .await
            .unwrap();
        eventually(|| !h.relay.responses_for(8).is_empty()).await;

        assert_eq!(
            error_code(&h.relay.responses_for(8)[0]),
            Some(ProtocolError::UNSUPPORTED_ACCOUNTS)
        );
        assert!(h.bridge.request(&topic, 8).is_none());
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn key_outside_session_cannot_sign() {
        let mut h = harness(Duration::from_secs(300));
        let topic = connect(&mut h).await;

        // no `from`: the unlocked key decides the account
        h.inbound
            .send(rpc_request(
                21,
                &topic,
                "eth_signTransaction",
                json!([{ "to": "0x000000000000000000000000000000000000dEaD", "value": "0x1" }]),
            ))
            .await
            .unwrap();
        assessed(&mut h, 21).await;

        let other = UnlockedKey::from_hex(
            "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        )
        .unwrap();
        let err = h.bridge.approve_request(&topic, 21, other).await.unwrap_err();
        assert!(matches!(err, BridgeError::UnauthorizedAccount(_)));

        let responses = h.relay.responses_for(21);
        assert_eq!(responses.len(), 1);
        assert_eq!(error_code(&responses[0]), Some(ProtocolError::UNSUPPORTED_ACCOUNTS));
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn lanes_are_dropped_with_their_topic() {
        let mut h = harness(Duration::from_secs(300));

        h.inbound
            .send(sign_request(30, "unknown", &TEST_ADDRESS.to_string()))
            .await
            .unwrap();
        eventually(|| !h.relay.responses_for(30).is_empty() && h.bridge.lane_count() == 0).await;

        let topic = connect(&mut h).await;
        h.inbound
            .send(sign_request(31, &topic, &TEST_ADDRESS.to_string()))
            .await
            .unwrap();
        assessed(&mut h, 31).await;
        assert_eq!(h.bridge.lane_count(), 1);

        h.bridge.disconnect(&topic).await.unwrap();
        assert_eq!(h.bridge.lane_count(), 0);
        assert_eq!(
            error_code(&h.relay.responses_for(31)[0]),
            Some(ProtocolError::REQUEST_EXPIRED)
        );
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn only_negotiated_peer_events_are_forwarded() {
        let mut h = harness(Duration::from_secs(300));
        let topic = connect(&mut h).await;

        for name in ["message", "chainChanged"] {
            h.inbound
                .send(RelayEvent::SessionEvent {
                    topic: topic.clone(),
                    name: name.into(),
                    data: json!("0x38"),
                })
                .await
                .unwrap();
        }
        match wait_for(&mut h.events, |e| matches!(e, BridgeEvent::PeerEvent { .. })).await {
            BridgeEvent::PeerEvent { name, .. } => assert_eq!(name, "chainChanged"),
            _ => unreachable!(),
        }
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn session_delete_expires_pending_request() {
        let mut h = harness(Duration::from_secs(300));
        let topic = connect(&mut h).await;

        h.inbound
            .send(sign_request(3, &topic, &TEST_ADDRESS.to_string()))
            .await
            .unwrap();
        assessed(&mut h, 3).await;
        h.inbound
            .send(RelayEvent::SessionDelete {
                topic: topic.clone(),
            })
            .await
            .unwrap();
        wait_for(&mut h.events, |e| matches!(e, BridgeEvent::SessionClosed { .. })).await;

        let responses = h.relay.responses_for(3);
        assert_eq!(responses.len(), 1);
        match &responses[0].outcome {
            RpcOutcome::Error(e) => assert_eq!(e.code, ProtocolError::REQUEST_EXPIRED),
            other => panic!("expected an expiry, got {other:?}"),
        }
        assert!(h.bridge.sessions().unwrap().is_empty());
        assert!(matches!(
            h.bridge.approve_request(&topic, 3, test_key()).await,
            Err(BridgeError::UnknownRequest(3))
        ));
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn request_without_session_is_refused() {
        let h = harness(Duration::from_secs(300));
        h.inbound
            .send(sign_request(9, "unknown", &TEST_ADDRESS.to_string()))
            .await
            .unwrap();

        eventually(|| !h.relay.responses_for(9).is_empty()).await;
        assert_eq!(
            error_code(&h.relay.responses_for(9)[0]),
            Some(ProtocolError::NO_MATCHING_SESSION)
        );
        assert!(h.bridge.live_requests().is_empty());
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn requests_on_one_topic_keep_arrival_order() {
        let mut h = harness(Duration::from_secs(300));
        let topic = connect(&mut h).await;

        for id in 10..15 {
            h.inbound
                .send(sign_request(id, &topic, &TEST_ADDRESS.to_string()))
                .await
                .unwrap();
        }
        let mut order = Vec::new();
        while order.len() < 5 {
            if let BridgeEvent::RequestPending(r) =
                wait_for(&mut h.events, |e| matches!(e, BridgeEvent::RequestPending(_))).await
            {
                order.push(r.id);
            }
        }
        assert_eq!(order, vec![10, 11, 12, 13, 14]);
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn undecided_request_times_out() {
        let mut h = harness(Duration::from_millis(50));
        let topic = connect(&mut h).await;

        h.inbound
            .send(sign_request(5, &topic, &TEST_ADDRESS.to_string()))
            .await
            .unwrap();
        let resolved = wait_for(&mut h.events, |e| {
            matches!(e, BridgeEvent::RequestResolved { id: 5, .. })
        })
        .await;
        assert!(matches!(
            resolved,
            BridgeEvent::RequestResolved {
                status: RequestStatus::Expired,
                ..
            }
        ));
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn rejected_proposal_is_not_pending() {
        let mut h = harness(Duration::from_secs(300));
        h.inbound
            .send(RelayEvent::SessionProposal(proposal(4)))
            .await
            .unwrap();
        wait_for(&mut h.events, |e| matches!(e, BridgeEvent::ProposalReceived { .. })).await;

        h.bridge.reject_session(4).await.unwrap();
        assert!(h.bridge.pending_proposals().is_empty());
        assert!(h.relay.calls().iter().any(|c| matches!(
            c,
            crate::relay::testing::RelayCall::Reject { proposal_id: 4, code: 5000 }
        )));
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let h = harness(Duration::from_secs(300));
        h.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), h.task)
            .await
            .unwrap()
            .unwrap();
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory relay double used by unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{
    ClientRelay, ConnectHandle, PairingUri, RpcOutcome, RpcRequest, RpcResponse, Settlement,
    TransportError, WalletRelay,
};
use crate::error::ProtocolError;
use crate::models::{Namespaces, PeerMetadata, ProposalNamespace, Session};

/// Every outbound call the bridge made.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayCall {
    Pair(String),
    Approve { proposal_id: u64, namespaces: Namespaces },
    Reject { proposal_id: u64, code: i64 },
    Respond { topic: String, response: RpcResponse },
    Update { topic: String },
    Disconnect { topic: String, code: i64 },
    Connect,
    Request { topic: String, chain_id: String, request: RpcRequest },
}

pub struct MockRelay {
    calls: Mutex<Vec<RelayCall>>,
    live_topics: Mutex<Vec<String>>,
    next_topic: AtomicU64,
    pub acknowledge: AtomicBool,
    pub fail_pair: AtomicBool,
    pub fail_disconnect: AtomicBool,
    pub fail_respond: AtomicBool,
    pub fail_active_topics: AtomicBool,
    pending_approval: Mutex<Option<oneshot::Sender<Result<Session, TransportError>>>>,
    client_outcomes: Mutex<VecDeque<RpcOutcome>>,
    client_sessions: Mutex<Vec<Session>>,
}

impl Default for MockRelay {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            live_topics: Mutex::new(Vec::new()),
            next_topic: AtomicU64::new(1),
            acknowledge: AtomicBool::new(true),
            fail_pair: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
            fail_respond: AtomicBool::new(false),
            fail_active_topics: AtomicBool::new(false),
            pending_approval: Mutex::new(None),
            client_outcomes: Mutex::new(VecDeque::new()),
            client_sessions: Mutex::new(Vec::new()),
        }
    }
}

impl MockRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: RelayCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<RelayCall> {
        self.calls.lock().unwrap().clone()
    }

    /// All responses sent for the given request id.
    pub fn responses_for(&self, id: u64) -> Vec<RpcResponse> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RelayCall::Respond { response, .. } if response.id == id => Some(response),
                _ => None,
            })
            .collect()
    }

    /// Responses sent on `topic` for request `id`.
    pub fn responses_on(&self, topic: &str, id: u64) -> Vec<RpcResponse> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RelayCall::Respond { topic: t, response } if t == topic && response.id == id => {
                    Some(response)
                }
                _ => None,
            })
            .collect()
    }

    pub fn set_live_topics(&self, topics: &[&str]) {
        *self.live_topics.lock().unwrap() = topics.iter().map(|t| t.to_string()).collect();
    }

    pub fn set_client_sessions(&self, sessions: Vec<Session>) {
        *self.client_sessions.lock().unwrap() = sessions;
    }

    pub fn push_client_outcome(&self, outcome: RpcOutcome) {
        self.client_outcomes.lock().unwrap().push_back(outcome);
    }

    /// Resolve the approval future handed out by the last `connect`.
    pub fn complete_approval(&self, result: Result<Session, TransportError>) -> bool {
        match self.pending_approval.lock().unwrap().take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl WalletRelay for MockRelay {
    async fn pair(&self, uri: &PairingUri) -> Result<(), TransportError> {
        if self.fail_pair.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("pairing refused".into()));
        }
        self.record(RelayCall::Pair(uri.topic.clone()));
        Ok(())
    }

    async fn approve_session(
        &self,
        proposal_id: u64,
        namespaces: &Namespaces,
    ) -> Result<Settlement, TransportError> {
        self.record(RelayCall::Approve {
            proposal_id,
            namespaces: namespaces.clone(),
        });
        let topic = format!("session-{}", self.next_topic.fetch_add(1, Ordering::SeqCst));
        self.live_topics.lock().unwrap().push(topic.clone());
        Ok(Settlement {
            topic,
            expiry: None,
            acknowledged: self.acknowledge.load(Ordering::SeqCst),
        })
    }

    async fn reject_session(
        &self,
        proposal_id: u64,
        reason: &ProtocolError,
    ) -> Result<(), TransportError> {
        self.record(RelayCall::Reject {
            proposal_id,
            code: reason.code,
        });
        Ok(())
    }

    async fn respond(&self, topic: &str, response: RpcResponse) -> Result<(), TransportError> {
        self.record(RelayCall::Respond {
            topic: topic.to_string(),
            response,
        });
        if self.fail_respond.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn update_session(
        &self,
        topic: &str,
        _namespaces: &Namespaces,
    ) -> Result<(), TransportError> {
        self.record(RelayCall::Update {
            topic: topic.to_string(),
        });
        Ok(())
    }

    async fn disconnect(&self, topic: &str, reason: &ProtocolError) -> Result<(), TransportError> {
        self.record(RelayCall::Disconnect {
            topic: topic.to_string(),
            code: reason.code,
        });
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("relay down".into()));
        }
        self.live_topics.lock().unwrap().retain(|t| t != topic);
        Ok(())
    }

    async fn active_topics(&self) -> Result<Vec<String>, TransportError> {
        if self.fail_active_topics.load(Ordering::SeqCst) {
            return Err(TransportError::Timeout);
        }
        Ok(self.live_topics.lock().unwrap().clone())
    }
}

#[async_trait]
impl ClientRelay for MockRelay {
    async fn connect(
        &self,
        _required: &BTreeMap<String, ProposalNamespace>,
        _metadata: &PeerMetadata,
    ) -> Result<ConnectHandle, TransportError> {
        self.record(RelayCall::Connect);
        let (tx, rx) = oneshot::channel();
        *self.pending_approval.lock().unwrap() = Some(tx);
        Ok(ConnectHandle {
            uri: "wc:abc123@2?relay-protocol=irn&symKey=587d5484ce2a2a6ee3ba1962fdd7e8588e06200c46823bd18fbd67def96ad303".into(),
            approval: rx,
        })
    }

    async fn request(
        &self,
        topic: &str,
        chain_id: &str,
        request: RpcRequest,
    ) -> Result<RpcOutcome, TransportError> {
        self.record(RelayCall::Request {
            topic: topic.to_string(),
            chain_id: chain_id.to_string(),
            request,
        });
        self.client_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::Timeout)
    }

    async fn disconnect(&self, topic: &str, reason: &ProtocolError) -> Result<(), TransportError> {
        WalletRelay::disconnect(self, topic, reason).await
    }

    async fn active_sessions(&self) -> Result<Vec<Session>, TransportError> {
        Ok(self.client_sessions.lock().unwrap().clone())
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request correlation: intake, decisions and the single outbound response.
//!
//! ## Status transitions
//!
//! | From | To | Trigger |
//! |---|---|---|
//! | `pending` | `risk_checked` | [`Correlator::attach_risk`] |
//! | `risk_checked` | `approved` | [`Correlator::approve`] |
//! | `approved` | `dispatched` | [`Correlator::mark_dispatched`] |
//! | `dispatched` | `completed` / `failed` | [`Correlator::complete`] |
//! | `pending`, `risk_checked` | `rejected` | [`Correlator::reject`] |
//! | `pending`, `risk_checked`, `approved` | `expired` | session deleted, timeout sweep |
//!
//! Every move into a terminal state happens under the book lock before the
//! response is sent, so a request gets exactly one response no matter how
//! user rejection, session deletion and the sweeper interleave.
//!
//! JSON-RPC ids are chosen by the peer and only unique within a topic, so
//! live requests are addressed by `(topic, id)`.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde_json::Value;

use super::events::{BridgeEvent, EventBus};
use crate::error::{BridgeError, BridgeResult, ProtocolError};
use crate::models::{ChainRef, Request, RequestStatus, Session, SigningMethod};
use crate::relay::{RpcResponse, SessionRequestEvent, WalletRelay};
use crate::risk::RiskAssessment;
use crate::signing::params::requested_account;
use crate::storage::SessionStore;

/// Request ids remembered for de-duplication.
const SEEN_CAPACITY: usize = 4096;

/// What happened to an inbound request.
#[derive(Debug)]
pub enum Intake {
    /// Validated and enqueued as `pending`
    Enqueued(Request),
    /// Rejected on the wire, never enqueued
    Rejected(BridgeError),
    /// Same `(topic, id)` seen before; dropped silently
    Duplicate,
}

/// `(topic, id)` of a request.
type RequestKey = (String, u64);

fn key(topic: &str, id: u64) -> RequestKey {
    (topic.to_string(), id)
}

struct RequestBook {
    live: HashMap<RequestKey, Request>,
    seen: LruCache<RequestKey, ()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Correlator {
    relay: Arc<dyn WalletRelay>,
    sessions: SessionStore,
    events: EventBus,
    book: Mutex<RequestBook>,
    request_timeout: chrono::Duration,
}

impl Correlator {
    pub fn new(
        relay: Arc<dyn WalletRelay>,
        sessions: SessionStore,
        events: EventBus,
        request_timeout: Duration,
    ) -> Self {
        let capacity = NonZeroUsize::new(SEEN_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            relay,
            sessions,
            events,
            book: Mutex::new(RequestBook {
                live: HashMap::new(),
                seen: LruCache::new(capacity),
            }),
            request_timeout: chrono::Duration::from_std(request_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // =========================================================================
    // Intake
    // =========================================================================

    /// Validate an inbound `session_request` against its session.
    ///
    /// Checks, in order: session usable, method allowed and known, chain
    /// allowed, requested account exposed by the session. The first failure
    /// is answered on the wire immediately.
    pub async fn on_request(&self, event: SessionRequestEvent) -> BridgeResult<Intake> {
        {
            let mut book = lock(&self.book);
            let key = (event.topic.clone(), event.id);
            if book.seen.put(key, ()).is_some() {
                tracing::debug!(request_id = event.id, topic = %event.topic, "Duplicate request dropped");
                return Ok(Intake::Duplicate);
            }
        }

        let now = Utc::now();
        match self.validate(&event, now) {
            Ok((method, chain, origin)) => {
                let request = Request {
                    id: event.id,
                    topic: event.topic,
                    chain,
                    method,
                    params: event.request.params,
                    status: RequestStatus::Pending,
                    origin,
                    received_at: now,
                    expires_at: now + self.request_timeout,
                    risk: None,
                };
                lock(&self.book)
                    .live
                    .insert(key(&request.topic, request.id), request.clone());
                tracing::info!(
                    request_id = request.id,
                    topic = %request.topic,
                    method = %request.method,
                    chain = %request.chain,
                    "Request pending"
                );
                self.events.publish(BridgeEvent::RequestPending(request.clone()));
                Ok(Intake::Enqueued(request))
            }
            Err(e @ BridgeError::Storage(_)) => Err(e),
            Err(e) => {
                tracing::info!(
                    request_id = event.id,
                    topic = %event.topic,
                    method = %event.request.method,
                    error = %e,
                    "Request rejected on intake"
                );
                self.send(&event.topic, RpcResponse::error(event.id, e.to_protocol()))
                    .await;
                Ok(Intake::Rejected(e))
            }
        }
    }

    fn validate(
        &self,
        event: &SessionRequestEvent,
        now: DateTime<Utc>,
    ) -> BridgeResult<(SigningMethod, ChainRef, String)> {
        let session = self
            .sessions
            .get_usable(&event.topic, now)?
            .ok_or_else(|| BridgeError::NotConnected(event.topic.clone()))?;

        let method_name = event.request.method.as_str();
        if !session.allows_method(method_name) {
            return Err(BridgeError::UnsupportedMethod(method_name.to_string()));
        }
        let method: SigningMethod = method_name
            .parse()
            .map_err(BridgeError::UnsupportedMethod)?;

        let chain: ChainRef = event
            .chain_id
            .parse()
            .map_err(|_| BridgeError::UnsupportedChain(event.chain_id.clone()))?;
        if !session.allows_chain(&chain) {
            return Err(BridgeError::UnsupportedChain(event.chain_id.clone()));
        }

        // malformed params are flagged by the risk checks and fail at dispatch;
        // a transaction without `from` is checked against the key instead
        if let Ok(Some(account)) = requested_account(method, &event.request.params) {
            ensure_exposed(&session, &chain, account)?;
        }

        Ok((method, chain, session.peer.url))
    }

    /// Check that `signer` is an account the request's session exposed on
    /// the request's chain.
    pub fn authorize_signer(&self, request: &Request, signer: Address) -> BridgeResult<()> {
        let session = self
            .sessions
            .get_usable(&request.topic, Utc::now())?
            .ok_or_else(|| BridgeError::NotConnected(request.topic.clone()))?;
        ensure_exposed(&session, &request.chain, signer)
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    /// Apply `f` to a live request if its status is in `from`.
    fn transition(
        &self,
        topic: &str,
        id: u64,
        from: &[RequestStatus],
        to: RequestStatus,
        f: impl FnOnce(&mut Request),
    ) -> BridgeResult<Request> {
        let key = key(topic, id);
        let mut book = lock(&self.book);
        let request = book
            .live
            .get_mut(&key)
            .ok_or(BridgeError::UnknownRequest(id))?;
        if !from.contains(&request.status) {
            return Err(BridgeError::InvalidRequestState {
                id,
                status: request.status.to_string(),
            });
        }
        request.status = to;
        f(request);
        let snapshot = request.clone();
        if to.is_terminal() {
            book.live.remove(&key);
        }
        Ok(snapshot)
    }

    /// `pending → risk_checked`.
    pub fn attach_risk(&self, topic: &str, id: u64, risk: RiskAssessment) -> BridgeResult<Request> {
        let request = self.transition(
            topic,
            id,
            &[RequestStatus::Pending],
            RequestStatus::RiskChecked,
            |r| r.risk = Some(risk),
        )?;
        if let Some(risk) = &request.risk {
            tracing::info!(request_id = id, topic = %topic, level = %risk.level, "Request risk checked");
        }
        self.events.publish(BridgeEvent::RequestAssessed(request.clone()));
        Ok(request)
    }

    /// `risk_checked → approved`. Requests without an assessment cannot be
    /// approved.
    pub fn approve(&self, topic: &str, id: u64) -> BridgeResult<Request> {
        let request = self.transition(
            topic,
            id,
            &[RequestStatus::RiskChecked],
            RequestStatus::Approved,
            |_| {},
        )?;
        tracing::info!(request_id = id, topic = %topic, "Request approved");
        Ok(request)
    }

    /// `approved → dispatched`.
    pub fn mark_dispatched(&self, topic: &str, id: u64) -> BridgeResult<Request> {
        self.transition(
            topic,
            id,
            &[RequestStatus::Approved],
            RequestStatus::Dispatched,
            |_| {},
        )
    }

    /// Send the dispatch outcome: a result, or the error as a protocol error.
    pub async fn complete(
        &self,
        topic: &str,
        id: u64,
        outcome: &BridgeResult<Value>,
    ) -> BridgeResult<Request> {
        let status = if outcome.is_ok() {
            RequestStatus::Completed
        } else {
            RequestStatus::Failed
        };
        let request = self.transition(
            topic,
            id,
            &[RequestStatus::Approved, RequestStatus::Dispatched],
            status,
            |_| {},
        )?;

        let response = match outcome {
            Ok(value) => RpcResponse::result(id, value.clone()),
            Err(e) => {
                tracing::warn!(request_id = id, topic = %topic, error = %e, "Request failed");
                RpcResponse::error(id, e.to_protocol())
            }
        };
        self.resolve(&request, response).await;
        Ok(request)
    }

    /// The user declined the request.
    pub async fn reject(&self, topic: &str, id: u64) -> BridgeResult<Request> {
        let request = self.transition(
            topic,
            id,
            &[RequestStatus::Pending, RequestStatus::RiskChecked],
            RequestStatus::Rejected,
            |_| {},
        )?;
        self.resolve(&request, RpcResponse::error(id, ProtocolError::user_rejected()))
            .await;
        Ok(request)
    }

    /// Expire every undispatched request of `topic`. In-flight dispatches are
    /// left alone.
    pub async fn on_session_deleted(&self, topic: &str) -> Vec<u64> {
        let keys: Vec<RequestKey> = lock(&self.book)
            .live
            .iter()
            .filter(|(_, r)| r.topic == topic && Self::expirable(r.status))
            .map(|(key, _)| key.clone())
            .collect();
        self.expire_all(keys).await
    }

    /// Expire requests whose decision deadline passed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<u64> {
        let keys: Vec<RequestKey> = lock(&self.book)
            .live
            .iter()
            .filter(|(_, r)| r.status.awaiting_decision() && r.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        self.expire_all(keys).await
    }

    fn expirable(status: RequestStatus) -> bool {
        status.awaiting_decision() || status == RequestStatus::Approved
    }

    async fn expire_all(&self, keys: Vec<RequestKey>) -> Vec<u64> {
        let expirable = [
            RequestStatus::Pending,
            RequestStatus::RiskChecked,
            RequestStatus::Approved,
        ];
        let mut expired = Vec::new();
        for (topic, id) in keys {
            // lost a race with a decision: that path already responded
            let Ok(request) =
                self.transition(&topic, id, &expirable, RequestStatus::Expired, |_| {})
            else {
                continue;
            };
            self.resolve(&request, RpcResponse::error(id, BridgeError::RequestExpired.to_protocol()))
                .await;
            expired.push(id);
        }
        expired
    }

    async fn resolve(&self, request: &Request, response: RpcResponse) {
        tracing::info!(
            request_id = request.id,
            topic = %request.topic,
            status = %request.status,
            "Request resolved"
        );
        self.send(&request.topic, response).await;
        self.events.publish(BridgeEvent::RequestResolved {
            id: request.id,
            topic: request.topic.clone(),
            status: request.status,
        });
    }

    async fn send(&self, topic: &str, response: RpcResponse) {
        let id = response.id;
        if let Err(e) = self.relay.respond(topic, response).await {
            tracing::warn!(request_id = id, topic = %topic, error = %e, "Failed to send response");
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get(&self, topic: &str, id: u64) -> Option<Request> {
        lock(&self.book).live.get(&key(topic, id)).cloned()
    }

    /// Live requests, oldest first.
    pub fn live(&self) -> Vec<Request> {
        let mut requests: Vec<Request> = lock(&self.book).live.values().cloned().collect();
        requests.sort_by_key(|r| (r.received_at, r.id));
        requests
    }
}

fn ensure_exposed(session: &Session, chain: &ChainRef, account: Address) -> BridgeResult<()> {
    if session.exposes(chain, &account.to_string()) {
        Ok(())
    } else {
        Err(BridgeError::UnauthorizedAccount(format!("{chain}:{account}")))
    }
}

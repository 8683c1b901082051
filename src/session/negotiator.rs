// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pairing and session negotiation for the wallet role.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use super::namespaces::negotiate;
use crate::error::{BridgeError, BridgeResult, ProtocolError};
use crate::models::{AccountId, Namespaces, Proposal, Session, SessionState};
use crate::relay::{PairingUri, WalletRelay};
use crate::storage::SessionStore;

/// Outcome of [`Negotiator::restore_sessions`].
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Sessions the relay still knows, now active
    pub restored: Vec<Session>,
    /// Persisted topics the relay no longer knows, now disconnected
    pub dropped: Vec<String>,
}

#[derive(Default)]
struct ProposalBook {
    pending: HashMap<u64, Proposal>,
    resolved: HashSet<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Negotiator {
    relay: Arc<dyn WalletRelay>,
    store: SessionStore,
    proposals: Mutex<ProposalBook>,
}

impl Negotiator {
    pub fn new(relay: Arc<dyn WalletRelay>, store: SessionStore) -> Self {
        Self {
            relay,
            store,
            proposals: Mutex::new(ProposalBook::default()),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    // =========================================================================
    // Pairing & proposals
    // =========================================================================

    /// Parse `raw` and pair over the relay. The proposal that follows is
    /// delivered as a relay event and handed to [`Self::on_proposal`].
    pub async fn pair(&self, raw: &str) -> BridgeResult<PairingUri> {
        let uri = PairingUri::parse(raw)?;
        uri.ensure_fresh(Utc::now())?;
        self.relay.pair(&uri).await?;
        tracing::info!(pairing_topic = %uri.topic, "Paired");
        Ok(uri)
    }

    /// Record an inbound proposal. Returns `false` for duplicates, already
    /// resolved ids and expired proposals, which must not be surfaced.
    pub fn on_proposal(&self, proposal: Proposal) -> bool {
        if proposal.is_expired(Utc::now()) {
            tracing::warn!(proposal_id = proposal.id, "Ignoring expired proposal");
            return false;
        }
        let mut book = lock(&self.proposals);
        if book.resolved.contains(&proposal.id) || book.pending.contains_key(&proposal.id) {
            tracing::debug!(proposal_id = proposal.id, "Duplicate proposal");
            return false;
        }
        tracing::info!(
            proposal_id = proposal.id,
            pairing_topic = %proposal.pairing_topic,
            peer = %proposal.proposer.name,
            "Session proposed"
        );
        book.pending.insert(proposal.id, proposal);
        true
    }

    pub fn pending_proposals(&self) -> Vec<Proposal> {
        let mut pending: Vec<Proposal> = lock(&self.proposals).pending.values().cloned().collect();
        pending.sort_by_key(|p| p.id);
        pending
    }

    pub fn proposal(&self, id: u64) -> Option<Proposal> {
        lock(&self.proposals).pending.get(&id).cloned()
    }

    fn resolve(&self, id: u64) -> Option<Proposal> {
        let mut book = lock(&self.proposals);
        let proposal = book.pending.remove(&id);
        book.resolved.insert(id);
        proposal
    }

    /// Approve a proposal, exposing `accounts` within `supported`.
    ///
    /// Fails with `NamespaceMismatch` when a required namespace has no usable
    /// intersection; the proposal then stays pending so it can be rejected.
    pub async fn approve(
        &self,
        proposal_id: u64,
        accounts: &[AccountId],
        supported: &Namespaces,
    ) -> BridgeResult<Session> {
        let proposal = self
            .proposal(proposal_id)
            .ok_or(BridgeError::UnknownProposal(proposal_id))?;

        if proposal.is_expired(Utc::now()) {
            self.resolve(proposal_id);
            return Err(BridgeError::PairingExpired);
        }

        let namespaces = negotiate(
            &proposal.required_namespaces,
            &proposal.optional_namespaces,
            accounts,
            supported,
        )?;

        let settlement = self.relay.approve_session(proposal_id, &namespaces).await?;
        let Some(proposal) = self.resolve(proposal_id) else {
            // resolved concurrently while the relay call was in flight
            return Err(BridgeError::UnknownProposal(proposal_id));
        };

        let mut session = Session::new(
            settlement.topic,
            proposal.pairing_topic,
            proposal.proposer,
            namespaces,
            settlement.expiry,
        );
        if settlement.acknowledged {
            session.state = SessionState::Active;
        }
        self.store.save(&session)?;

        tracing::info!(
            proposal_id,
            topic = %session.topic,
            state = ?session.state,
            accounts = session.accounts().len(),
            "Session approved"
        );
        Ok(session)
    }

    /// Reject a proposal. Rejecting an already resolved proposal is a no-op.
    pub async fn reject(&self, proposal_id: u64, reason: &ProtocolError) -> BridgeResult<()> {
        {
            let book = lock(&self.proposals);
            if book.resolved.contains(&proposal_id) {
                return Ok(());
            }
            if !book.pending.contains_key(&proposal_id) {
                return Err(BridgeError::UnknownProposal(proposal_id));
            }
        }
        self.resolve(proposal_id);

        if let Err(e) = self.relay.reject_session(proposal_id, reason).await {
            tracing::warn!(proposal_id, error = %e, "Failed to deliver proposal rejection");
        }
        tracing::info!(proposal_id, code = reason.code, "Session proposal rejected");
        Ok(())
    }

    /// The peer acknowledged a settlement: `approved → active`.
    pub fn on_acknowledged(&self, topic: &str) -> BridgeResult<Option<Session>> {
        let session = self.store.set_state(topic, SessionState::Active)?;
        if session.is_some() {
            tracing::info!(topic = %topic, "Session active");
        }
        Ok(session)
    }

    // =========================================================================
    // Established sessions
    // =========================================================================

    /// Reconcile persisted sessions with the relay's live list.
    ///
    /// Sessions the relay no longer knows are disconnected locally. If the
    /// relay cannot be asked, nothing is restored and nothing is dropped.
    pub async fn restore_sessions(&self) -> BridgeResult<RestoreReport> {
        let persisted = self.store.load_live(Utc::now())?;
        let live: HashSet<String> = self.relay.active_topics().await?.into_iter().collect();

        let mut report = RestoreReport::default();
        for mut session in persisted {
            if live.contains(&session.topic) {
                session.state = SessionState::Active;
                self.store.save(&session)?;
                report.restored.push(session);
            } else {
                session.state = SessionState::Disconnected;
                self.store.save(&session)?;
                tracing::info!(topic = %session.topic, "Persisted session unknown to relay, disconnected");
                report.dropped.push(session.topic);
            }
        }

        tracing::info!(
            restored = report.restored.len(),
            dropped = report.dropped.len(),
            "Sessions restored"
        );
        Ok(report)
    }

    /// Remove the session locally, then tell the relay. A relay failure is
    /// logged; the session is gone either way. Returns whether it existed.
    pub async fn disconnect(&self, topic: &str, reason: &ProtocolError) -> BridgeResult<bool> {
        let existed = self.store.remove(topic)?;
        if let Err(e) = self.relay.disconnect(topic, reason).await {
            tracing::warn!(topic = %topic, error = %e, "Relay disconnect failed; session removed locally");
        }
        tracing::info!(topic = %topic, existed, "Session disconnected");
        Ok(existed)
    }

    /// Disconnect every persisted session. Returns the topics removed.
    pub async fn disconnect_all(&self, reason: &ProtocolError) -> BridgeResult<Vec<String>> {
        let mut topics = Vec::new();
        for session in self.store.list()? {
            if self.disconnect(&session.topic, reason).await? {
                topics.push(session.topic);
            }
        }
        Ok(topics)
    }

    /// Change the namespaces of a usable session.
    pub async fn update(&self, topic: &str, namespaces: Namespaces) -> BridgeResult<Session> {
        self.store
            .get_usable(topic, Utc::now())?
            .ok_or_else(|| BridgeError::NotConnected(topic.to_string()))?;

        self.relay.update_session(topic, &namespaces).await?;
        let session = self
            .store
            .set_namespaces(topic, &namespaces)?
            .ok_or_else(|| BridgeError::NotConnected(topic.to_string()))?;
        tracing::info!(topic = %topic, "Session namespaces updated");
        Ok(session)
    }

    /// The peer announced new namespaces.
    pub fn on_session_update(&self, topic: &str, namespaces: &Namespaces) -> BridgeResult<Option<Session>> {
        self.store.set_namespaces(topic, namespaces).map_err(Into::into)
    }

    /// The peer deleted the session.
    pub fn on_session_deleted(&self, topic: &str) -> BridgeResult<bool> {
        let existed = self.store.remove(topic)?;
        tracing::info!(topic = %topic, existed, "Session deleted by peer");
        Ok(existed)
    }

    pub fn usable_session(&self, topic: &str) -> BridgeResult<Option<Session>> {
        self.store.get_usable(topic, Utc::now()).map_err(Into::into)
    }

    pub fn sessions(&self) -> BridgeResult<Vec<Session>> {
        self.store.list().map_err(Into::into)
    }
}

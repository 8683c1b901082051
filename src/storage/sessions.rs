// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable session records.
//!
//! Only `approved` and `active` sessions are persisted. Expiry is lazy:
//! an expired record is deleted the next time it is read through
//! [`SessionStore::get_usable`] or [`SessionStore::load_live`].

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::database::{BridgeDatabase, StoreResult, CLIENT_SESSION, SESSIONS};
use crate::models::{Namespaces, Session, SessionState};

const CLIENT_SESSION_KEY: &str = "current";

/// Session table for the wallet role plus the client-role singleton.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<BridgeDatabase>,
}

impl SessionStore {
    pub fn new(db: Arc<BridgeDatabase>) -> Self {
        Self { db }
    }

    /// Persist an approved or active session. Other states remove the record.
    pub fn save(&self, session: &Session) -> StoreResult<()> {
        match session.state {
            SessionState::Approved | SessionState::Active => {
                self.db.put_json(SESSIONS, &session.topic, session)
            }
            SessionState::Proposed | SessionState::Disconnected => {
                self.db.remove(SESSIONS, &session.topic).map(|_| ())
            }
        }
    }

    /// Raw record, expired or not.
    pub fn get(&self, topic: &str) -> StoreResult<Option<Session>> {
        self.db.get_json(SESSIONS, topic)
    }

    /// Active, unexpired session for `topic`. Expired records are dropped.
    pub fn get_usable(&self, topic: &str, now: DateTime<Utc>) -> StoreResult<Option<Session>> {
        let Some(session) = self.get(topic)? else {
            return Ok(None);
        };
        if session.is_expired(now) {
            tracing::info!(topic = %topic, "Session expired, removing");
            self.db.remove(SESSIONS, topic)?;
            return Ok(None);
        }
        Ok(session.is_usable(now).then_some(session))
    }

    pub fn remove(&self, topic: &str) -> StoreResult<bool> {
        self.db.remove(SESSIONS, topic)
    }

    pub fn list(&self) -> StoreResult<Vec<Session>> {
        self.db.list_json(SESSIONS)
    }

    /// All unexpired sessions; expired ones are removed on the way.
    pub fn load_live(&self, now: DateTime<Utc>) -> StoreResult<Vec<Session>> {
        let mut live = Vec::new();
        for session in self.list()? {
            if session.is_expired(now) {
                tracing::info!(topic = %session.topic, "Dropping expired session");
                self.db.remove(SESSIONS, &session.topic)?;
            } else {
                live.push(session);
            }
        }
        Ok(live)
    }

    /// Move a stored session to `state` in one write transaction.
    pub fn set_state(&self, topic: &str, state: SessionState) -> StoreResult<Option<Session>> {
        self.db
            .update_json::<Session, _>(SESSIONS, topic, |s| s.state = state)
    }

    /// Replace the negotiated namespaces of a stored session.
    pub fn set_namespaces(
        &self,
        topic: &str,
        namespaces: &Namespaces,
    ) -> StoreResult<Option<Session>> {
        self.db.update_json::<Session, _>(SESSIONS, topic, |s| {
            s.namespaces = namespaces.clone()
        })
    }

    // =========================================================================
    // Client role
    // =========================================================================

    pub fn save_client_session(&self, session: &Session) -> StoreResult<()> {
        self.db.put_json(CLIENT_SESSION, CLIENT_SESSION_KEY, session)
    }

    pub fn client_session(&self) -> StoreResult<Option<Session>> {
        self.db.get_json(CLIENT_SESSION, CLIENT_SESSION_KEY)
    }

    pub fn clear_client_session(&self) -> StoreResult<()> {
        self.db.remove(CLIENT_SESSION, CLIENT_SESSION_KEY).map(|_| ())
    }
}

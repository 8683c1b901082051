// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay transport boundary.
//!
//! The encrypted relay connection is an external capability. This module
//! only defines what the bridge needs from it:
//!
//! - [`WalletRelay`]: outbound calls of the wallet role
//! - [`ClientRelay`]: outbound calls of the client (dApp) role
//! - [`RelayEvent`]: inbound events, delivered over an `mpsc` channel owned
//!   by the transport implementation
//!
//! Wire payloads follow JSON-RPC 2.0.

pub mod uri;

#[cfg(test)]
pub mod testing;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::ProtocolError;
use crate::models::{Namespaces, PeerMetadata, Proposal, ProposalNamespace, Session};

pub use uri::PairingUri;

/// Errors reported by a relay transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Relay unavailable: {0}")]
    Unavailable(String),

    #[error("Peer returned error {}: {}", .0.code, .0.message)]
    Peer(ProtocolError),

    #[error("Relay timed out")]
    Timeout,

    #[error("Relay connection closed")]
    Closed,
}

// =============================================================================
// Wire payloads
// =============================================================================

/// JSON-RPC request body carried inside a session request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Result or error half of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcOutcome {
    Result(serde_json::Value),
    Error(ProtocolError),
}

/// JSON-RPC response sent back to the counterparty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    pub jsonrpc: String,
    #[serde(flatten)]
    pub outcome: RpcOutcome,
}

impl RpcResponse {
    pub fn result(id: u64, value: serde_json::Value) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_string(),
            outcome: RpcOutcome::Result(value),
        }
    }

    pub fn error(id: u64, error: ProtocolError) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_string(),
            outcome: RpcOutcome::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, RpcOutcome::Error(_))
    }
}

/// Inbound `session_request` as delivered by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequestEvent {
    pub id: u64,
    pub topic: String,
    /// CAIP-2 chain id the request targets
    pub chain_id: String,
    pub request: RpcRequest,
}

/// Inbound relay events.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// `session_proposal`
    SessionProposal(Proposal),
    /// `session_request`
    SessionRequest(SessionRequestEvent),
    /// `session_delete`
    SessionDelete { topic: String },
    /// Settlement acknowledged by the peer
    SessionAcknowledged { topic: String },
    /// `session_update`
    SessionUpdate { topic: String, namespaces: Namespaces },
    /// `session_event` (chainChanged, accountsChanged, …)
    SessionEvent {
        topic: String,
        name: String,
        data: serde_json::Value,
    },
    /// Relay socket re-established
    Reconnected,
}

impl RelayEvent {
    /// Topic the event belongs to, if any.
    pub fn topic(&self) -> Option<&str> {
        match self {
            RelayEvent::SessionRequest(req) => Some(&req.topic),
            RelayEvent::SessionDelete { topic }
            | RelayEvent::SessionAcknowledged { topic }
            | RelayEvent::SessionUpdate { topic, .. }
            | RelayEvent::SessionEvent { topic, .. } => Some(topic),
            RelayEvent::SessionProposal(p) => Some(&p.pairing_topic),
            RelayEvent::Reconnected => None,
        }
    }
}

/// Result of approving a proposal on the relay.
#[derive(Debug, Clone)]
pub struct Settlement {
    /// Newly created session topic
    pub topic: String,
    pub expiry: Option<DateTime<Utc>>,
    /// Whether the peer already acknowledged the settlement
    pub acknowledged: bool,
}

/// Pending client-side connection: the URI to show and the approval future.
pub struct ConnectHandle {
    pub uri: String,
    pub approval: oneshot::Receiver<Result<Session, TransportError>>,
}

// =============================================================================
// Transport traits
// =============================================================================

/// Outbound relay operations of the wallet role.
#[async_trait]
pub trait WalletRelay: Send + Sync {
    /// Establish a pairing; the resulting proposal arrives as a [`RelayEvent`].
    async fn pair(&self, uri: &PairingUri) -> Result<(), TransportError>;

    async fn approve_session(
        &self,
        proposal_id: u64,
        namespaces: &Namespaces,
    ) -> Result<Settlement, TransportError>;

    async fn reject_session(
        &self,
        proposal_id: u64,
        reason: &ProtocolError,
    ) -> Result<(), TransportError>;

    async fn respond(&self, topic: &str, response: RpcResponse) -> Result<(), TransportError>;

    async fn update_session(
        &self,
        topic: &str,
        namespaces: &Namespaces,
    ) -> Result<(), TransportError>;

    async fn disconnect(&self, topic: &str, reason: &ProtocolError) -> Result<(), TransportError>;

    /// Topics of sessions the relay still considers live.
    async fn active_topics(&self) -> Result<Vec<String>, TransportError>;
}

/// Outbound relay operations of the client (dApp) role.
#[async_trait]
pub trait ClientRelay: Send + Sync {
    /// Create a pairing and propose a session with the given requirements.
    async fn connect(
        &self,
        required: &BTreeMap<String, ProposalNamespace>,
        metadata: &PeerMetadata,
    ) -> Result<ConnectHandle, TransportError>;

    /// Send a request over an established session and wait for the answer.
    async fn request(
        &self,
        topic: &str,
        chain_id: &str,
        request: RpcRequest,
    ) -> Result<RpcOutcome, TransportError>;

    async fn disconnect(&self, topic: &str, reason: &ProtocolError) -> Result<(), TransportError>;

    /// Sessions the relay still considers live.
    async fn active_sessions(&self) -> Result<Vec<Session>, TransportError>;
}

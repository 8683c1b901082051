// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bridge error taxonomy and its wire representation.
//!
//! Every failure names which kind occurred. Failures that must reach the
//! counterparty are converted with [`BridgeError::to_protocol`] into a
//! JSON-RPC error object.

use serde::{Deserialize, Serialize};

use crate::relay::TransportError;
use crate::storage::StoreError;

/// Wire error object sent to the counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
}

impl ProtocolError {
    pub const USER_REJECTED: i64 = 5000;
    pub const UNSUPPORTED_CHAINS: i64 = 5100;
    pub const UNSUPPORTED_METHODS: i64 = 5101;
    pub const UNSUPPORTED_ACCOUNTS: i64 = 5103;
    pub const USER_DISCONNECTED: i64 = 6000;
    pub const NO_MATCHING_SESSION: i64 = 7001;
    pub const REQUEST_EXPIRED: i64 = 8000;
    pub const SERVER_ERROR: i64 = -32000;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(Self::USER_REJECTED, "User rejected.")
    }

    pub fn user_disconnected() -> Self {
        Self::new(Self::USER_DISCONNECTED, "User disconnected.")
    }
}

/// Errors surfaced by the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid pairing URI: {0}")]
    InvalidUri(String),

    #[error("Pairing expired")]
    PairingExpired,

    #[error("Namespace mismatch: {0}")]
    NamespaceMismatch(String),

    #[error("No active session for topic {0}")]
    NotConnected(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Account not exposed to this session: {0}")]
    UnauthorizedAccount(String),

    #[error("User rejected the request")]
    UserRejected,

    #[error("Request expired")]
    RequestExpired,

    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("Simulation failed: {0}")]
    SimulationFailed(String),

    #[error("Unknown proposal: {0}")]
    UnknownProposal(u64),

    #[error("Unknown request: {0}")]
    UnknownRequest(u64),

    #[error("Request {id} is not awaiting a decision (status: {status})")]
    InvalidRequestState { id: u64, status: String },

    #[error("Invalid request parameters: {0}")]
    InvalidParams(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BridgeError {
    /// Wire representation sent back to the counterparty.
    pub fn to_protocol(&self) -> ProtocolError {
        match self {
            BridgeError::UserRejected => ProtocolError::user_rejected(),
            BridgeError::NamespaceMismatch(msg) => {
                ProtocolError::new(ProtocolError::UNSUPPORTED_CHAINS, msg.clone())
            }
            BridgeError::UnsupportedChain(chain) => ProtocolError::new(
                ProtocolError::UNSUPPORTED_CHAINS,
                format!("Unsupported chain: {chain}"),
            ),
            BridgeError::UnsupportedMethod(method) => ProtocolError::new(
                ProtocolError::UNSUPPORTED_METHODS,
                format!("Unsupported method: {method}"),
            ),
            BridgeError::UnauthorizedAccount(account) => ProtocolError::new(
                ProtocolError::UNSUPPORTED_ACCOUNTS,
                format!("Unsupported account: {account}"),
            ),
            BridgeError::NotConnected(topic) => ProtocolError::new(
                ProtocolError::NO_MATCHING_SESSION,
                format!("No matching session for topic {topic}"),
            ),
            BridgeError::RequestExpired => {
                ProtocolError::new(ProtocolError::REQUEST_EXPIRED, "Request expired.")
            }
            other => ProtocolError::new(ProtocolError::SERVER_ERROR, other.to_string()),
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

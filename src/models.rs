// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Bridge Data Model
//!
//! Sessions, proposals, namespaces and signing requests shared by the
//! negotiator, correlator, dispatcher and risk pipeline.
//!
//! ## Identifiers
//!
//! Chains and accounts use CAIP-2 / CAIP-10 notation:
//! `eip155:56` is a chain, `eip155:56:0xAbC…` is an account on it.
//!
//! ## Lifecycles
//!
//! - Session: `proposed → approved → active → disconnected`
//! - Request: `pending → risk_checked → approved → dispatched → completed`,
//!   or one of the terminal `rejected | expired | failed`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::risk::RiskAssessment;

/// Namespace key for EVM chains.
pub const EIP155: &str = "eip155";

/// Default lifetime of an approved session.
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

// =============================================================================
// CAIP identifiers
// =============================================================================

/// CAIP-2 chain reference, e.g. `eip155:56`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainRef {
    pub namespace: String,
    pub reference: String,
}

impl ChainRef {
    pub fn evm(chain_id: u64) -> Self {
        Self {
            namespace: EIP155.to_string(),
            reference: chain_id.to_string(),
        }
    }

    /// Numeric chain id for `eip155` chains.
    pub fn evm_id(&self) -> Option<u64> {
        if self.namespace == EIP155 {
            self.reference.parse().ok()
        } else {
            None
        }
    }
}

impl fmt::Display for ChainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl FromStr for ChainRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s
            .split_once(':')
            .ok_or_else(|| format!("`{s}` is not a CAIP-2 chain id"))?;
        if namespace.is_empty() || reference.is_empty() || reference.contains(':') {
            return Err(format!("`{s}` is not a CAIP-2 chain id"));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            reference: reference.to_string(),
        })
    }
}

impl Serialize for ChainRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChainRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// CAIP-10 account, e.g. `eip155:56:0xAbC…`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId {
    pub chain: ChainRef,
    pub address: String,
}

impl AccountId {
    pub fn new(chain: ChainRef, address: impl Into<String>) -> Self {
        Self {
            chain,
            address: address.into(),
        }
    }

    /// Case-insensitive address comparison.
    pub fn same_address(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.address)
    }
}

impl FromStr for AccountId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(ns), Some(reference), Some(address))
                if !ns.is_empty() && !reference.is_empty() && !address.is_empty() =>
            {
                Ok(Self {
                    chain: ChainRef {
                        namespace: ns.to_string(),
                        reference: reference.to_string(),
                    },
                    address: address.to_string(),
                })
            }
            _ => Err(format!("`{s}` is not a CAIP-10 account id")),
        }
    }
}

impl Serialize for AccountId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Peer metadata & namespaces
// =============================================================================

/// Counterparty metadata. Untrusted: supplied by the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

/// What a proposal asks for within one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalNamespace {
    #[serde(default)]
    pub chains: Vec<ChainRef>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

/// What a wallet exposes (or has agreed to expose) within one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(default)]
    pub chains: Vec<ChainRef>,
    #[serde(default)]
    pub accounts: Vec<AccountId>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

/// Namespace key → namespace.
pub type Namespaces = BTreeMap<String, Namespace>;

// =============================================================================
// Proposal
// =============================================================================

/// Unresolved offer to open a session. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub pairing_topic: String,
    pub proposer: PeerMetadata,
    #[serde(default)]
    pub required_namespaces: BTreeMap<String, ProposalNamespace>,
    #[serde(default)]
    pub optional_namespaces: BTreeMap<String, ProposalNamespace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|e| e <= now)
    }
}

// =============================================================================
// Session
// =============================================================================

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Proposed,
    Approved,
    Active,
    Disconnected,
}

/// An authorized relationship between the wallet and one remote application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Relay topic (primary key)
    pub topic: String,
    /// Pairing the session was negotiated over
    #[serde(default)]
    pub pairing_topic: String,
    /// Counterparty metadata (untrusted)
    pub peer: PeerMetadata,
    /// Negotiated namespaces
    pub namespaces: Namespaces,
    pub state: SessionState,
    pub expiry: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        topic: impl Into<String>,
        pairing_topic: impl Into<String>,
        peer: PeerMetadata,
        namespaces: Namespaces,
        expiry: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            topic: topic.into(),
            pairing_topic: pairing_topic.into(),
            peer,
            namespaces,
            state: SessionState::Approved,
            expiry: expiry.unwrap_or(now + Duration::days(DEFAULT_SESSION_TTL_DAYS)),
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }

    /// Whether requests may be accepted on this session right now.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.state == SessionState::Active && !self.is_expired(now)
    }

    /// Exposed accounts across namespaces, in negotiated order.
    pub fn accounts(&self) -> Vec<AccountId> {
        self.namespaces
            .values()
            .flat_map(|ns| ns.accounts.iter().cloned())
            .collect()
    }

    pub fn allows_method(&self, method: &str) -> bool {
        self.namespaces
            .values()
            .any(|ns| ns.methods.iter().any(|m| m == method))
    }

    pub fn allows_event(&self, event: &str) -> bool {
        self.namespaces
            .values()
            .any(|ns| ns.events.iter().any(|e| e == event))
    }

    pub fn allows_chain(&self, chain: &ChainRef) -> bool {
        self.namespaces.values().any(|ns| {
            ns.chains.contains(chain) || ns.accounts.iter().any(|a| &a.chain == chain)
        })
    }

    /// Whether `address` is exposed on `chain`.
    pub fn exposes(&self, chain: &ChainRef, address: &str) -> bool {
        self.namespaces.values().any(|ns| {
            ns.accounts
                .iter()
                .any(|a| &a.chain == chain && a.same_address(address))
        })
    }
}

// =============================================================================
// Signing methods & requests
// =============================================================================

/// Signing operations the dispatcher knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningMethod {
    #[serde(rename = "personal_sign")]
    PersonalSign,
    #[serde(rename = "eth_sign")]
    EthSign,
    #[serde(rename = "eth_signTypedData")]
    SignTypedData,
    #[serde(rename = "eth_signTypedData_v4")]
    SignTypedDataV4,
    #[serde(rename = "eth_sendTransaction")]
    SendTransaction,
    #[serde(rename = "eth_signTransaction")]
    SignTransaction,
}

impl SigningMethod {
    pub const ALL: [SigningMethod; 6] = [
        SigningMethod::SendTransaction,
        SigningMethod::SignTransaction,
        SigningMethod::EthSign,
        SigningMethod::PersonalSign,
        SigningMethod::SignTypedData,
        SigningMethod::SignTypedDataV4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SigningMethod::PersonalSign => "personal_sign",
            SigningMethod::EthSign => "eth_sign",
            SigningMethod::SignTypedData => "eth_signTypedData",
            SigningMethod::SignTypedDataV4 => "eth_signTypedData_v4",
            SigningMethod::SendTransaction => "eth_sendTransaction",
            SigningMethod::SignTransaction => "eth_signTransaction",
        }
    }

    pub fn is_transaction(&self) -> bool {
        matches!(
            self,
            SigningMethod::SendTransaction | SigningMethod::SignTransaction
        )
    }

    pub fn is_typed_data(&self) -> bool {
        matches!(
            self,
            SigningMethod::SignTypedData | SigningMethod::SignTypedDataV4
        )
    }
}

impl fmt::Display for SigningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal_sign" => Ok(SigningMethod::PersonalSign),
            "eth_sign" => Ok(SigningMethod::EthSign),
            "eth_signTypedData" => Ok(SigningMethod::SignTypedData),
            "eth_signTypedData_v4" => Ok(SigningMethod::SignTypedDataV4),
            "eth_sendTransaction" => Ok(SigningMethod::SendTransaction),
            "eth_signTransaction" => Ok(SigningMethod::SignTransaction),
            other => Err(other.to_string()),
        }
    }
}

/// Request lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    RiskChecked,
    Approved,
    Dispatched,
    Completed,
    Rejected,
    Expired,
    Failed,
}

impl RequestStatus {
    /// Still waiting on a human or policy decision.
    pub fn awaiting_decision(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::RiskChecked)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed
                | RequestStatus::Rejected
                | RequestStatus::Expired
                | RequestStatus::Failed
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::RiskChecked => "risk_checked",
            RequestStatus::Approved => "approved",
            RequestStatus::Dispatched => "dispatched",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Expired => "expired",
            RequestStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One signing or transaction ask tied to an active session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub topic: String,
    pub chain: ChainRef,
    pub method: SigningMethod,
    pub params: serde_json::Value,
    pub status: RequestStatus,
    /// Origin URL claimed by the session peer
    pub origin: String,
    pub received_at: DateTime<Utc>,
    /// Protocol-side deadline for a decision
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAssessment>,
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Risk Pipeline
//!
//! Every pending request, ad-hoc transaction intent and session proposal
//! gets a [`RiskAssessment`] before anything can be approved.
//!
//! ## Checks
//!
//! | Check | Kind | Escalates to |
//! |---|---|---|
//! | Recipient sanity (burn, self, known malicious) | sync | warning / danger |
//! | Value magnitude (`RISK_WARN_VALUE`, `RISK_DANGER_VALUE`) | sync | warning / danger |
//! | Payload inspection (`setApprovalForAll`, unlimited `approve`, unverified contract, …) | sync | warning / danger |
//! | Typed data (`Permit*` primary types, max-uint values) | sync | danger |
//! | Blind `eth_sign` over a 32-byte digest | sync | danger |
//! | Phishing list (exact, typosquat, drainer keywords) | sync | warning / danger |
//! | External reputation lookup | async, best effort | danger |
//! | Simulation (gas estimate) | async, best effort | danger on revert |
//!
//! ## Aggregation
//!
//! The overall level is the maximum finding level (`danger > warning > safe`).
//! Reasons are concatenated in the order checks ran, synchronous checks
//! first. A check that cannot run (reputation API down, RPC error, stale
//! phishing list) adds a note and never changes the level.

pub mod checks;
pub mod domain;
pub mod pipeline;
pub mod reputation;
pub mod simulation;

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use domain::{ListSource, PhishingFeed, PhishingList};
pub use pipeline::{RiskPipeline, TransactionIntent};
pub use reputation::{Reputation, ReputationClient};

/// Risk level, totally ordered: `Safe < Warning < Danger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Warning,
    Danger,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Warning => "warning",
            RiskLevel::Danger => "danger",
        })
    }
}

/// What a finding is about. Drives the security score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    BurnAddress,
    SelfTransfer,
    MaliciousAddress,
    HighValue,
    UnlimitedApproval,
    ApprovalForAll,
    UnverifiedContract,
    ContractCreation,
    LargePayload,
    MalformedPayload,
    PermitSignature,
    ChainMismatch,
    BlindSignature,
    PhishingDomain,
    SuspiciousDomain,
    ReputationFlagged,
    SimulationReverted,
}

/// One check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub level: RiskLevel,
    pub reason: String,
}

impl Finding {
    pub fn warning(kind: FindingKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            level: RiskLevel::Warning,
            reason: reason.into(),
        }
    }

    pub fn danger(kind: FindingKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            level: RiskLevel::Danger,
            reason: reason.into(),
        }
    }
}

/// Aggregated verdict attached to a request, intent or proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// Human-readable findings; never empty unless `level` is `Safe`
    pub reasons: Vec<String>,
    pub findings: Vec<Finding>,
    /// Degraded or skipped checks; informational only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// Aggregate findings in the order the checks ran.
    pub fn from_findings(findings: Vec<Finding>, notes: Vec<String>) -> Self {
        let level = findings
            .iter()
            .map(|f| f.level)
            .max()
            .unwrap_or(RiskLevel::Safe);
        let reasons = findings
            .iter()
            .filter(|f| !f.reason.is_empty())
            .map(|f| f.reason.clone())
            .collect();
        Self {
            level,
            reasons,
            findings,
            notes,
            assessed_at: Utc::now(),
        }
    }

    pub fn safe() -> Self {
        Self::from_findings(Vec::new(), Vec::new())
    }

    pub fn is_danger(&self) -> bool {
        self.level == RiskLevel::Danger
    }

    pub fn has(&self, kind: FindingKind) -> bool {
        self.findings.iter().any(|f| f.kind == kind)
    }

    /// 0 (certainly unsafe) to 100 (nothing found), for UI badges.
    pub fn security_score(&self) -> u8 {
        let kinds: HashSet<FindingKind> = self.findings.iter().map(|f| f.kind).collect();
        let mut score: i32 = 100;
        for kind in kinds {
            score -= match kind {
                FindingKind::PhishingDomain
                | FindingKind::MaliciousAddress
                | FindingKind::ReputationFlagged => 100,
                FindingKind::BurnAddress | FindingKind::SimulationReverted => 50,
                FindingKind::BlindSignature | FindingKind::SuspiciousDomain => 40,
                FindingKind::UnverifiedContract => 30,
                FindingKind::UnlimitedApproval
                | FindingKind::ApprovalForAll
                | FindingKind::PermitSignature => 25,
                FindingKind::ContractCreation => 20,
                FindingKind::HighValue | FindingKind::SelfTransfer | FindingKind::ChainMismatch => {
                    10
                }
                FindingKind::LargePayload | FindingKind::MalformedPayload => 5,
            };
        }
        score.clamp(0, 100) as u8
    }
}

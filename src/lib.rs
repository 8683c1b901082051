// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! dApp Bridge - Connection and Transaction Authorization
//!
//! Lets external applications pair with a wallet over an encrypted relay and
//! ask it to sign messages or send transactions. Every request is validated
//! against its session and risk-scored before a human approves it, and only
//! then touches a private key.
//!
//! ## Modules
//!
//! - `wallet` - Wallet-role service: event loop, approval gate, expiry sweeper
//! - `client` - dApp-role client: pair, then request signatures
//! - `session` - Pairing, proposal negotiation, session lifecycle
//! - `requests` - Request correlation and lifecycle events
//! - `risk` - Risk pipeline (static checks, phishing list, reputation, simulation)
//! - `signing` - Signing dispatch with a per-request unlocked key
//! - `relay` - Relay transport capability and wire types
//! - `blockchain` - Chain RPC capability (alloy), network table, ABI helpers
//! - `storage` - Embedded redb database
//! - `alerts` - Price alerts
//! - `tokens` - Discovered-token cache

pub mod alerts;
pub mod blockchain;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod relay;
pub mod requests;
pub mod risk;
pub mod session;
pub mod signing;
pub mod storage;
pub mod telemetry;
pub mod tokens;
pub mod wallet;

pub use client::DappClient;
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult, ProtocolError};
pub use requests::BridgeEvent;
pub use risk::{RiskAssessment, RiskLevel, RiskPipeline};
pub use wallet::WalletBridge;

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Negotiation
//!
//! Wallet-side pairing and session lifecycle:
//!
//! ```text
//! pair(uri) ──relay──▶ proposal ──approve──▶ approved ──ack──▶ active
//!                          │                                    │
//!                          └──reject                disconnect / delete
//! ```
//!
//! Proposals live in memory only. Sessions are persisted through
//! [`crate::storage::SessionStore`] as soon as they are approved.

pub mod namespaces;
pub mod negotiator;

pub use namespaces::{negotiate, wallet_namespaces, WALLET_EVENTS};
pub use negotiator::{Negotiator, RestoreReport};

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Durable state of the bridge, kept in a single redb file under `DATA_DIR`.
//!
//! ## Layout
//!
//! ```text
//! $DATA_DIR/
//!   bridge.redb
//!     sessions          topic → Session (approved / active)
//!     client_session    "current" → Session
//!     alerts            id → PriceAlert
//!     triggered_alerts  !triggered_at|id → PriceAlert (last 50)
//!     token_metadata    chainId:address → discovered tokens
//!     meta              phishing list snapshot
//! ```
//!
//! The session table is the only store shared across relay events. Each
//! mutation commits in one write transaction, so no half-written state is
//! observable across an `.await`.

pub mod alerts;
pub mod database;
pub mod sessions;
pub mod tokens;

pub use alerts::AlertStore;
pub use database::{BridgeDatabase, StoreError, StoreResult};
pub use sessions::SessionStore;
pub use tokens::TokenStore;

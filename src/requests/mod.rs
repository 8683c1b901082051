// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Request Correlation
//!
//! Inbound `session_request`s are validated against their session, enqueued
//! as [`crate::models::Request`]s and published on the [`EventBus`]. Each
//! request ends with exactly one response on the wire.

pub mod correlator;
pub mod events;

pub use correlator::{Correlator, Intake};
pub use events::{BridgeEvent, EventBus, EventReceiver};

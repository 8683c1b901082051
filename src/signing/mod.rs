// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing dispatcher and its inputs.
//!
//! - [`UnlockedKey`]: per-dispatch signing context
//! - [`params`]: method-specific parameter parsing, shared with risk checks
//! - [`typed_data`]: EIP-712 preparation (`EIP712Domain` stripping, hashing)
//! - [`Dispatcher`]: executes an approved request

pub mod dispatcher;
pub mod key;
pub mod params;
pub mod typed_data;

pub use dispatcher::Dispatcher;
pub use key::{KeyError, UnlockedKey};
pub use params::{MessageParams, TxParams, TypedDataParams};

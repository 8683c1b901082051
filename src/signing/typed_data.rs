// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EIP-712 typed-data preparation.

use alloy::{dyn_abi::TypedData, primitives::B256};
use serde_json::Value;

use crate::error::BridgeError;

/// Name of the synthetic domain type dApps include in `types`.
pub const DOMAIN_TYPE: &str = "EIP712Domain";

/// Remove the synthetic `EIP712Domain` entry from `types`, if present.
pub fn strip_domain_type(mut data: Value) -> Value {
    if let Some(types) = data.get_mut("types").and_then(Value::as_object_mut) {
        types.remove(DOMAIN_TYPE);
    }
    data
}

/// Strip, parse and hash a typed-data payload.
pub fn signing_hash(data: &Value) -> Result<B256, BridgeError> {
    let stripped = strip_domain_type(data.clone());
    let typed: TypedData = serde_json::from_value(stripped)
        .map_err(|e| BridgeError::InvalidParams(format!("typed data: {e}")))?;
    typed
        .eip712_signing_hash()
        .map_err(|e| BridgeError::InvalidParams(format!("typed data: {e}")))
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Method-specific request parameter parsing.
//!
//! | Method | `params` |
//! |---|---|
//! | `personal_sign` | `[message, address]` |
//! | `eth_sign` | `[address, message]` |
//! | `eth_signTypedData`, `eth_signTypedData_v4` | `[address, typedData]` (JSON string or object) |
//! | `eth_sendTransaction`, `eth_signTransaction` | `[{from, to, value, data, gas, …}]` |
//!
//! Some dApps swap the message/address order; when exactly one of the two
//! entries is an address it is taken as the account.

use std::str::FromStr;

use alloy::{
    network::TransactionBuilder,
    primitives::{Address, Bytes, U256},
    rpc::types::TransactionRequest,
};
use serde::Deserialize;
use serde_json::Value;

use crate::blockchain::parse_quantity;
use crate::error::BridgeError;
use crate::models::SigningMethod;

fn invalid(reason: impl Into<String>) -> BridgeError {
    BridgeError::InvalidParams(reason.into())
}

fn as_address(value: &Value) -> Option<Address> {
    value
        .as_str()
        .filter(|s| s.len() == 42)
        .and_then(|s| Address::from_str(s).ok())
}

fn positional(params: &Value) -> Result<&Vec<Value>, BridgeError> {
    params
        .as_array()
        .filter(|a| a.len() >= 2)
        .ok_or_else(|| invalid("expected at least two positional params"))
}

/// Decode a message parameter: valid `0x` hex is decoded, anything else is
/// taken as UTF-8 text.
pub fn decode_message(raw: &str) -> Vec<u8> {
    if let Some(hex) = raw.strip_prefix("0x") {
        if let Ok(bytes) = alloy::hex::decode(hex) {
            return bytes;
        }
    }
    raw.as_bytes().to_vec()
}

// =============================================================================
// Messages
// =============================================================================

/// `personal_sign` / `eth_sign` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageParams {
    pub address: Address,
    pub message: Vec<u8>,
}

pub fn message_params(method: SigningMethod, params: &Value) -> Result<MessageParams, BridgeError> {
    let items = positional(params)?;
    let (mut msg_idx, mut addr_idx) = match method {
        SigningMethod::EthSign => (1, 0),
        _ => (0, 1),
    };
    if as_address(&items[addr_idx]).is_none() && as_address(&items[msg_idx]).is_some() {
        std::mem::swap(&mut msg_idx, &mut addr_idx);
    }

    let address =
        as_address(&items[addr_idx]).ok_or_else(|| invalid("missing signer address"))?;
    let message = items[msg_idx]
        .as_str()
        .ok_or_else(|| invalid("message must be a string"))?;

    Ok(MessageParams {
        address,
        message: decode_message(message),
    })
}

// =============================================================================
// Typed data
// =============================================================================

/// Typed-data parameters with the payload as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedDataParams {
    pub address: Address,
    pub data: Value,
}

pub fn typed_data_params(params: &Value) -> Result<TypedDataParams, BridgeError> {
    let items = positional(params)?;
    let (address, payload) = match (as_address(&items[0]), as_address(&items[1])) {
        (Some(address), _) => (address, &items[1]),
        (None, Some(address)) => (address, &items[0]),
        (None, None) => return Err(invalid("missing signer address")),
    };

    let data = match payload {
        Value::String(raw) => serde_json::from_str(raw)
            .map_err(|e| invalid(format!("typed data is not valid JSON: {e}")))?,
        Value::Object(_) => payload.clone(),
        _ => return Err(invalid("typed data must be a JSON string or object")),
    };
    Ok(TypedDataParams { address, data })
}

// =============================================================================
// Transactions
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTx {
    from: Option<String>,
    to: Option<String>,
    value: Option<Value>,
    data: Option<String>,
    input: Option<String>,
    gas: Option<Value>,
    gas_limit: Option<Value>,
    gas_price: Option<Value>,
    max_fee_per_gas: Option<Value>,
    max_priority_fee_per_gas: Option<Value>,
    nonce: Option<Value>,
}

/// Parsed `eth_sendTransaction` / `eth_signTransaction` object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxParams {
    pub from: Option<Address>,
    /// `None` for contract creation
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub gas: Option<u64>,
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub nonce: Option<u64>,
}

fn quantity(field: &str, value: Option<&Value>) -> Result<Option<U256>, BridgeError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_quantity(s)
            .map(Some)
            .map_err(|e| invalid(format!("{field}: {e}"))),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| Some(U256::from(n)))
            .ok_or_else(|| invalid(format!("{field}: not an unsigned integer"))),
        Some(_) => Err(invalid(format!("{field}: expected a quantity"))),
    }
}

fn narrow<T: TryFrom<U256>>(field: &str, value: Option<U256>) -> Result<Option<T>, BridgeError> {
    value
        .map(|v| T::try_from(v).map_err(|_| invalid(format!("{field}: out of range"))))
        .transpose()
}

fn address_field(field: &str, value: Option<&str>) -> Result<Option<Address>, BridgeError> {
    match value {
        None | Some("") => Ok(None),
        Some(raw) => Address::from_str(raw)
            .map(Some)
            .map_err(|e| invalid(format!("{field}: {e}"))),
    }
}

impl TxParams {
    /// Parse the first positional parameter.
    pub fn parse(params: &Value) -> Result<Self, BridgeError> {
        let object = match params {
            Value::Array(items) => items.first(),
            Value::Object(_) => Some(params),
            _ => None,
        }
        .ok_or_else(|| invalid("missing transaction object"))?;

        let raw: RawTx = serde_json::from_value(object.clone())
            .map_err(|e| invalid(format!("transaction object: {e}")))?;

        let data_hex = raw.data.as_deref().or(raw.input.as_deref()).unwrap_or("");
        let data = if data_hex.is_empty() || data_hex == "0x" {
            Bytes::new()
        } else {
            Bytes::from(
                alloy::hex::decode(data_hex).map_err(|e| invalid(format!("data: {e}")))?,
            )
        };

        Ok(Self {
            from: address_field("from", raw.from.as_deref())?,
            to: address_field("to", raw.to.as_deref())?,
            value: quantity("value", raw.value.as_ref())?.unwrap_or(U256::ZERO),
            data,
            gas: narrow("gas", quantity("gas", raw.gas.as_ref().or(raw.gas_limit.as_ref()))?)?,
            gas_price: narrow("gasPrice", quantity("gasPrice", raw.gas_price.as_ref())?)?,
            max_fee_per_gas: narrow(
                "maxFeePerGas",
                quantity("maxFeePerGas", raw.max_fee_per_gas.as_ref())?,
            )?,
            max_priority_fee_per_gas: narrow(
                "maxPriorityFeePerGas",
                quantity("maxPriorityFeePerGas", raw.max_priority_fee_per_gas.as_ref())?,
            )?,
            nonce: narrow("nonce", quantity("nonce", raw.nonce.as_ref())?)?,
        })
    }

    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    /// Unsigned call from `from` on `chain_id`, without nonce, gas or fees.
    pub fn call_request(&self, from: Address, chain_id: u64) -> TransactionRequest {
        let tx = TransactionRequest::default()
            .from(from)
            .value(self.value)
            .input(self.data.clone().into())
            .with_chain_id(chain_id);
        match self.to {
            Some(to) => tx.to(to),
            None => tx.into_create(),
        }
    }
}

// =============================================================================
// Account
// =============================================================================

/// The account a request acts for. `None` for a transaction that leaves
/// `from` to the signing key.
pub fn requested_account(
    method: SigningMethod,
    params: &Value,
) -> Result<Option<Address>, BridgeError> {
    match method {
        SigningMethod::PersonalSign | SigningMethod::EthSign => {
            message_params(method, params).map(|p| Some(p.address))
        }
        SigningMethod::SignTypedData | SigningMethod::SignTypedDataV4 => {
            typed_data_params(params).map(|p| Some(p.address))
        }
        SigningMethod::SendTransaction | SigningMethod::SignTransaction => {
            TxParams::parse(params).map(|p| p.from)
        }
    }
}

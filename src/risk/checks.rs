// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Synchronous, pure risk checks.

use std::collections::HashSet;

use alloy::primitives::{address, Address, U256};
use serde_json::Value;

use super::{Finding, FindingKind};
use crate::blockchain::abi::near_max_threshold;
use crate::blockchain::{decode_call, format_amount, parse_quantity, DecodedCall, TokenCall};
use crate::config::RiskThresholds;
use crate::models::SigningMethod;
use crate::signing::TxParams;

/// Addresses that destroy whatever is sent to them.
pub const BURN_ADDRESSES: [Address; 3] = [
    Address::ZERO,
    address!("0000000000000000000000000000000000000001"),
    address!("000000000000000000000000000000000000dEaD"),
];

/// Calldata above this size is unusual for a user-facing interaction.
pub const LARGE_PAYLOAD_BYTES: usize = 5000;

/// Message fields that carry an allowance in permit-style typed data.
const ALLOWANCE_FIELDS: [&str; 3] = ["value", "amount", "allowed"];

const MAX_TYPED_DATA_DEPTH: usize = 8;

/// Static inputs of the synchronous checks.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub thresholds: &'a RiskThresholds,
    pub verified_contracts: &'a HashSet<Address>,
    pub malicious_addresses: &'a HashSet<Address>,
    pub native_symbol: &'a str,
}

// =============================================================================
// Recipient & value
// =============================================================================

pub fn check_recipient(
    to: Option<Address>,
    from: Option<Address>,
    malicious: &HashSet<Address>,
) -> Vec<Finding> {
    let Some(to) = to else {
        return Vec::new();
    };
    let mut findings = Vec::new();

    if BURN_ADDRESSES.contains(&to) {
        findings.push(Finding::danger(
            FindingKind::BurnAddress,
            format!("Recipient {to} is a burn address; funds sent there are lost"),
        ));
    }
    if malicious.contains(&to) {
        findings.push(Finding::danger(
            FindingKind::MaliciousAddress,
            format!("Recipient {to} is a known malicious address"),
        ));
    }
    if from == Some(to) {
        findings.push(Finding::warning(
            FindingKind::SelfTransfer,
            "Sending to your own address",
        ));
    }
    findings
}

pub fn check_value(value: U256, thresholds: &RiskThresholds, symbol: &str) -> Vec<Finding> {
    let amount = format_amount(value, 18);
    if value > thresholds.danger_value {
        vec![Finding::danger(
            FindingKind::HighValue,
            format!("Very high value: {amount} {symbol}"),
        )]
    } else if value > thresholds.warn_value {
        vec![Finding::warning(
            FindingKind::HighValue,
            format!("High value: {amount} {symbol}, double-check the amount"),
        )]
    } else {
        Vec::new()
    }
}

// =============================================================================
// Payload
// =============================================================================

/// Inspect calldata. Findings are additive.
pub fn check_payload(tx: &TxParams, ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    let limit = near_max_threshold();

    match decode_call(&tx.data) {
        DecodedCall::Known(TokenCall::SetApprovalForAll { operator, approved }) => {
            let reason = if approved {
                format!("setApprovalForAll grants {operator} control of every NFT in this collection")
            } else {
                format!("setApprovalForAll call for operator {operator} (revocation); confirm the operator and contract")
            };
            findings.push(Finding::danger(FindingKind::ApprovalForAll, reason));
        }
        DecodedCall::Known(TokenCall::Approve { spender, amount }) if amount > limit => {
            findings.push(Finding::danger(
                FindingKind::UnlimitedApproval,
                format!("Unlimited token approval: {spender} could spend all of this token"),
            ));
        }
        DecodedCall::Known(TokenCall::IncreaseAllowance { spender, added }) if added > limit => {
            findings.push(Finding::danger(
                FindingKind::UnlimitedApproval,
                format!("Unlimited allowance increase: {spender} could spend all of this token"),
            ));
        }
        DecodedCall::Known(TokenCall::Transfer { to, .. })
        | DecodedCall::Known(TokenCall::TransferFrom { to, .. }) => {
            findings.extend(check_recipient(Some(to), tx.from, ctx.malicious_addresses));
        }
        DecodedCall::Malformed { selector } => {
            findings.push(Finding::warning(
                FindingKind::MalformedPayload,
                format!(
                    "Payload uses known selector {} but its arguments do not decode",
                    alloy::hex::encode_prefixed(selector)
                ),
            ));
        }
        DecodedCall::Truncated => {
            findings.push(Finding::warning(
                FindingKind::MalformedPayload,
                "Payload is shorter than a function selector",
            ));
        }
        _ => {}
    }

    if !tx.data.is_empty() {
        match tx.to {
            Some(to) if !ctx.verified_contracts.contains(&to) => {
                findings.push(Finding::warning(
                    FindingKind::UnverifiedContract,
                    format!("Unverified contract interaction with {to}, verify the address"),
                ));
            }
            None => {
                findings.push(Finding::warning(
                    FindingKind::ContractCreation,
                    "Transaction deploys a new contract",
                ));
            }
            _ => {}
        }
    }

    if tx.data.len() > LARGE_PAYLOAD_BYTES {
        findings.push(Finding::warning(
            FindingKind::LargePayload,
            format!("Unusually large payload ({} bytes)", tx.data.len()),
        ));
    }
    findings
}

/// Recipient, value and payload checks for a transaction.
pub fn check_transaction(tx: &TxParams, ctx: &CheckContext<'_>) -> Vec<Finding> {
    let mut findings = check_recipient(tx.to, tx.from, ctx.malicious_addresses);
    findings.extend(check_value(tx.value, ctx.thresholds, ctx.native_symbol));
    findings.extend(check_payload(tx, ctx));
    findings
}

// =============================================================================
// Typed data & messages
// =============================================================================

fn is_unlimited(value: &Value, limit: U256) -> bool {
    match value {
        Value::Bool(allowed) => *allowed,
        Value::String(s) => parse_quantity(s).is_ok_and(|v| v > limit),
        Value::Number(n) => n.as_f64().is_some_and(|f| f > 5.19e33),
        _ => false,
    }
}

fn find_unlimited(value: &Value, limit: U256, depth: usize) -> Option<String> {
    if depth > MAX_TYPED_DATA_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => {
            for (key, field) in map {
                if ALLOWANCE_FIELDS.contains(&key.as_str()) && is_unlimited(field, limit) {
                    return Some(key.clone());
                }
                if let Some(found) = find_unlimited(field, limit, depth + 1) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items
            .iter()
            .find_map(|item| find_unlimited(item, limit, depth + 1)),
        _ => None,
    }
}

fn json_chain_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => parse_quantity(s).ok().and_then(|v| u64::try_from(v).ok()),
        _ => None,
    }
}

/// Decode `domain` / `primaryType` / `message` of a typed-data payload.
pub fn check_typed_data(data: &Value, request_chain: Option<u64>) -> Vec<Finding> {
    let primary_type = data.get("primaryType").and_then(Value::as_str);
    let message = data.get("message").filter(|m| m.is_object());
    let (Some(primary_type), Some(message)) = (primary_type, message) else {
        return vec![Finding::warning(
            FindingKind::MalformedPayload,
            "Typed data has no primaryType or message; its meaning cannot be shown",
        )];
    };

    let mut findings = Vec::new();

    if primary_type.contains("Permit") {
        let spender = message
            .get("spender")
            .and_then(Value::as_str)
            .map(|s| format!(" to {s}"))
            .unwrap_or_default();
        findings.push(Finding::danger(
            FindingKind::PermitSignature,
            format!(
                "{primary_type} signature grants spending rights{spender} without any on-chain transaction"
            ),
        ));
    }

    if let Some(field) = find_unlimited(message, near_max_threshold(), 0) {
        findings.push(Finding::danger(
            FindingKind::UnlimitedApproval,
            format!("Signed message carries an unlimited `{field}`"),
        ));
    }

    let domain_chain = data
        .get("domain")
        .and_then(|d| d.get("chainId"))
        .and_then(json_chain_id);
    if let (Some(domain_chain), Some(request_chain)) = (domain_chain, request_chain) {
        if domain_chain != request_chain {
            findings.push(Finding::warning(
                FindingKind::ChainMismatch,
                format!("Typed data is bound to chain {domain_chain}, request targets chain {request_chain}"),
            ));
        }
    }
    findings
}

/// Message-signing heuristics.
pub fn check_message(method: SigningMethod, message: &[u8]) -> Vec<Finding> {
    if method == SigningMethod::EthSign && message.len() == 32 {
        return vec![Finding::danger(
            FindingKind::BlindSignature,
            "Blind signature over a 32-byte hash; it could authorize a transaction",
        )];
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::abi::{IERC20, IERC721};
    use crate::risk::RiskLevel;
    use alloy::primitives::Bytes;
    use alloy::sol_types::SolCall;
    use serde_json::json;

    const TOKEN: Address = address!("5555555555555555555555555555555555555555");
    const SPENDER: Address = address!("1111111111111111111111111111111111111111");
    const ME: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

    fn thresholds() -> RiskThresholds {
        RiskThresholds::default()
    }

    fn with_ctx<R>(verified: &[Address], f: impl FnOnce(&CheckContext<'_>) -> R) -> R {
        let thresholds = thresholds();
        let verified: HashSet<Address> = verified.iter().copied().collect();
        let malicious = HashSet::new();
        let ctx = CheckContext {
            thresholds: &thresholds,
            verified_contracts: &verified,
            malicious_addresses: &malicious,
            native_symbol: "BNB",
        };
        f(&ctx)
    }

    fn call_to(to: Address, data: Vec<u8>) -> TxParams {
        TxParams {
            from: Some(ME),
            to: Some(to),
            data: Bytes::from(data),
            ..Default::default()
        }
    }

    fn max_level(findings: &[Finding]) -> RiskLevel {
        findings.iter().map(|f| f.level).max().unwrap_or(RiskLevel::Safe)
    }

    #[test]
    fn burn_address_is_danger() {
        let tx = TxParams {
            to: Some(address!("000000000000000000000000000000000000dEaD")),
            value: U256::from(50u64),
            ..Default::default()
        };
        let findings = with_ctx(&[], |ctx| check_transaction(&tx, ctx));
        assert_eq!(max_level(&findings), RiskLevel::Danger);
        assert!(findings.iter().any(|f| f.kind == FindingKind::BurnAddress));
        assert!(findings.iter().any(|f| f.reason.contains("burn address")));
    }

    #[test]
    fn self_transfer_and_malicious_recipient() {
        let findings = check_recipient(Some(ME), Some(ME), &HashSet::new());
        assert_eq!(findings[0].kind, FindingKind::SelfTransfer);
        assert_eq!(findings[0].level, RiskLevel::Warning);

        let malicious: HashSet<Address> = [SPENDER].into_iter().collect();
        let findings = check_recipient(Some(SPENDER), Some(ME), &malicious);
        assert_eq!(max_level(&findings), RiskLevel::Danger);
    }

    #[test]
    fn value_thresholds() {
        let t = thresholds();
        assert!(check_value(t.warn_value, &t, "ETH").is_empty());
        assert_eq!(
            max_level(&check_value(t.warn_value + U256::from(1u8), &t, "ETH")),
            RiskLevel::Warning
        );
        assert_eq!(
            max_level(&check_value(t.danger_value + U256::from(1u8), &t, "ETH")),
            RiskLevel::Danger
        );
    }

    #[test]
    fn set_approval_for_all_is_always_danger() {
        for approved in [true, false] {
            let data = IERC721::setApprovalForAllCall {
                operator: SPENDER,
                approved,
            }
            .abi_encode();
            // even for a contract the wallet has verified
            let findings = with_ctx(&[TOKEN], |ctx| check_payload(&call_to(TOKEN, data), ctx));
            assert_eq!(max_level(&findings), RiskLevel::Danger, "approved = {approved}");
        }
    }

    #[test]
    fn max_approve_is_danger_bounded_is_not() {
        let unlimited = IERC20::approveCall {
            spender: SPENDER,
            amount: U256::MAX,
        }
        .abi_encode();
        let findings = with_ctx(&[TOKEN], |ctx| check_payload(&call_to(TOKEN, unlimited), ctx));
        assert_eq!(max_level(&findings), RiskLevel::Danger);
        assert!(findings.iter().any(|f| f.kind == FindingKind::UnlimitedApproval));

        let bounded = IERC20::approveCall {
            spender: SPENDER,
            amount: U256::from(1_000_000u64),
        }
        .abi_encode();
        let findings = with_ctx(&[TOKEN], |ctx| check_payload(&call_to(TOKEN, bounded), ctx));
        assert_eq!(max_level(&findings), RiskLevel::Safe);
    }

    #[test]
    fn max_increase_allowance_is_danger() {
        let data = IERC20::increaseAllowanceCall {
            spender: SPENDER,
            addedValue: U256::MAX,
        }
        .abi_encode();
        let findings = with_ctx(&[TOKEN], |ctx| check_payload(&call_to(TOKEN, data), ctx));
        assert_eq!(max_level(&findings), RiskLevel::Danger);
    }

    #[test]
    fn unverified_contract_warning_is_additive() {
        let data = IERC20::approveCall {
            spender: SPENDER,
            amount: U256::MAX,
        }
        .abi_encode();
        let findings = with_ctx(&[], |ctx| check_payload(&call_to(TOKEN, data), ctx));
        let kinds: Vec<_> = findings.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![FindingKind::UnlimitedApproval, FindingKind::UnverifiedContract]
        );
    }

    #[test]
    fn token_transfer_to_burn_address_is_danger() {
        let data = IERC20::transferCall {
            to: Address::ZERO,
            amount: U256::from(1u8),
        }
        .abi_encode();
        let findings = with_ctx(&[TOKEN], |ctx| check_payload(&call_to(TOKEN, data), ctx));
        assert!(findings.iter().any(|f| f.kind == FindingKind::BurnAddress));
    }

    #[test]
    fn creation_and_large_payload_warnings() {
        let tx = TxParams {
            data: Bytes::from(vec![0x60; LARGE_PAYLOAD_BYTES + 1]),
            ..Default::default()
        };
        let findings = with_ctx(&[], |ctx| check_payload(&tx, ctx));
        let kinds: Vec<_> = findings.iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&FindingKind::ContractCreation));
        assert!(kinds.contains(&FindingKind::LargePayload));
        assert_eq!(max_level(&findings), RiskLevel::Warning);
    }

    #[test]
    fn permit_typed_data_is_danger() {
        let permit = json!({
            "primaryType": "Permit",
            "domain": {"name": "USD Coin", "chainId": 56},
            "message": {
                "owner": ME.to_string(),
                "spender": SPENDER.to_string(),
                "value": "1000",
                "nonce": 0,
                "deadline": 9999999999u64
            }
        });
        let findings = check_typed_data(&permit, Some(56));
        assert_eq!(max_level(&findings), RiskLevel::Danger);
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn nested_max_uint_amount_is_danger() {
        let permit2 = json!({
            "primaryType": "Order",
            "domain": {"chainId": "0x1"},
            "message": {
                "details": {
                    "token": TOKEN.to_string(),
                    "amount": "0xffffffffffffffffffffffffffffffffffffffff"
                }
            }
        });
        let findings = check_typed_data(&permit2, Some(56));
        let kinds: Vec<_> = findings.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![FindingKind::UnlimitedApproval, FindingKind::ChainMismatch]
        );
    }

    #[test]
    fn benign_typed_data_is_safe_and_malformed_is_warning() {
        let mail = json!({"primaryType": "Mail", "domain": {"chainId": 1}, "message": {"contents": "hi"}});
        assert!(check_typed_data(&mail, Some(1)).is_empty());

        let malformed = check_typed_data(&json!({"foo": 1}), None);
        assert_eq!(max_level(&malformed), RiskLevel::Warning);
    }

    #[test]
    fn blind_eth_sign_is_danger() {
        assert_eq!(
            max_level(&check_message(SigningMethod::EthSign, &[0u8; 32])),
            RiskLevel::Danger
        );
        assert!(check_message(SigningMethod::PersonalSign, &[0u8; 32]).is_empty());
        assert!(check_message(SigningMethod::EthSign, b"hello").is_empty());
    }
}

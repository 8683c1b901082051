// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token contract interfaces and calldata decoding.
//!
//! The risk pipeline only needs to know *what* a payload asks the token
//! contract to do. [`decode_call`] maps the leading 4-byte selector to a
//! [`TokenCall`] and decodes its arguments.

use alloy::{
    primitives::{Address, U256},
    sol,
    sol_types::SolCall,
};

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function increaseAllowance(address spender, uint256 addedValue) external returns (bool);
    }

    interface IERC20Permit {
        function permit(
            address owner,
            address spender,
            uint256 value,
            uint256 deadline,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
    }

    interface IERC721 {
        function setApprovalForAll(address operator, bool approved) external;
    }
}

/// Largest allowance still considered bounded: `2^112 - 1`.
///
/// Wallet UIs and drainers commonly use values far above any realistic
/// balance instead of exactly `U256::MAX`.
pub fn near_max_threshold() -> U256 {
    (U256::from(1u8) << 112) - U256::from(1u8)
}

/// A recognised token-contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCall {
    Transfer { to: Address, amount: U256 },
    TransferFrom { from: Address, to: Address, amount: U256 },
    Approve { spender: Address, amount: U256 },
    IncreaseAllowance { spender: Address, added: U256 },
    Permit { owner: Address, spender: Address, value: U256 },
    SetApprovalForAll { operator: Address, approved: bool },
}

/// Outcome of selector decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedCall {
    /// No calldata
    Empty,
    Known(TokenCall),
    /// Selector matched but the arguments did not decode
    Malformed { selector: [u8; 4] },
    Unknown { selector: [u8; 4] },
    /// Fewer than four bytes of calldata
    Truncated,
}

/// Decode transaction calldata against the known token interfaces.
pub fn decode_call(data: &[u8]) -> DecodedCall {
    if data.is_empty() {
        return DecodedCall::Empty;
    }
    if data.len() < 4 {
        return DecodedCall::Truncated;
    }
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&data[..4]);

    let decoded = match selector {
        IERC20::transferCall::SELECTOR => IERC20::transferCall::abi_decode(data)
            .map(|c| TokenCall::Transfer {
                to: c.to,
                amount: c.amount,
            }),
        IERC20::transferFromCall::SELECTOR => IERC20::transferFromCall::abi_decode(data)
            .map(|c| TokenCall::TransferFrom {
                from: c.from,
                to: c.to,
                amount: c.amount,
            }),
        IERC20::approveCall::SELECTOR => IERC20::approveCall::abi_decode(data).map(|c| {
            TokenCall::Approve {
                spender: c.spender,
                amount: c.amount,
            }
        }),
        IERC20::increaseAllowanceCall::SELECTOR => {
            IERC20::increaseAllowanceCall::abi_decode(data).map(|c| {
                TokenCall::IncreaseAllowance {
                    spender: c.spender,
                    added: c.addedValue,
                }
            })
        }
        IERC20Permit::permitCall::SELECTOR => IERC20Permit::permitCall::abi_decode(data)
            .map(|c| TokenCall::Permit {
                owner: c.owner,
                spender: c.spender,
                value: c.value,
            }),
        IERC721::setApprovalForAllCall::SELECTOR => {
            IERC721::setApprovalForAllCall::abi_decode(data).map(|c| {
                TokenCall::SetApprovalForAll {
                    operator: c.operator,
                    approved: c.approved,
                }
            })
        }
        _ => return DecodedCall::Unknown { selector },
    };

    match decoded {
        Ok(call) => DecodedCall::Known(call),
        Err(e) => {
            tracing::debug!(selector = %alloy::hex::encode(selector), error = %e, "Calldata did not decode");
            DecodedCall::Malformed { selector }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const SPENDER: Address = address!("1111111111111111111111111111111111111111");

    #[test]
    fn selectors_match_known_values() {
        assert_eq!(IERC20::approveCall::SELECTOR, [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(IERC721::setApprovalForAllCall::SELECTOR, [0xa2, 0x2c, 0xb4, 0x65]);
        assert_eq!(IERC20::transferCall::SELECTOR, [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn decodes_approve() {
        let data = IERC20::approveCall {
            spender: SPENDER,
            amount: U256::MAX,
        }
        .abi_encode();
        assert_eq!(
            decode_call(&data),
            DecodedCall::Known(TokenCall::Approve {
                spender: SPENDER,
                amount: U256::MAX
            })
        );
    }

    #[test]
    fn decodes_set_approval_for_all() {
        let data = IERC721::setApprovalForAllCall {
            operator: SPENDER,
            approved: true,
        }
        .abi_encode();
        assert!(matches!(
            decode_call(&data),
            DecodedCall::Known(TokenCall::SetApprovalForAll { approved: true, .. })
        ));
    }

    #[test]
    fn classifies_odd_payloads() {
        assert_eq!(decode_call(&[]), DecodedCall::Empty);
        assert_eq!(decode_call(&[0x09, 0x5e]), DecodedCall::Truncated);
        assert_eq!(
            decode_call(&[0xde, 0xad, 0xbe, 0xef, 0x00]),
            DecodedCall::Unknown {
                selector: [0xde, 0xad, 0xbe, 0xef]
            }
        );
        // approve selector without arguments
        assert_eq!(
            decode_call(&[0x09, 0x5e, 0xa7, 0xb3]),
            DecodedCall::Malformed {
                selector: [0x09, 0x5e, 0xa7, 0xb3]
            }
        );
    }

    #[test]
    fn near_max_threshold_is_2_pow_112_minus_1() {
        let t = near_max_threshold();
        assert!(t < U256::MAX);
        assert_eq!(t + U256::from(1u8), U256::from(1u8) << 112);
    }
}

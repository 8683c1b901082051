// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM chain integration.
//!
//! This module provides:
//! - The [`ChainRpc`] capability (nonce, fees, gas estimation, broadcast)
//!   and its alloy HTTP implementation
//! - The supported network table (BSC, Ethereum, Polygon, Arbitrum,
//!   Avalanche, Base)
//! - Token interface definitions and calldata decoding for risk checks
//! - Amount and RPC quantity conversions

pub mod abi;
pub mod network;
pub mod rpc;
pub mod units;

#[cfg(test)]
pub mod testing;

pub use abi::{decode_call, DecodedCall, TokenCall};
pub use network::{network_for, supported_chain_ids, NetworkConfig};
pub use rpc::{AlloyRpc, ChainRpc, FeeQuote, RpcError};
pub use units::{format_amount, parse_amount, parse_quantity, AmountError};

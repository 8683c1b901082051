// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain RPC capability.
//!
//! The bridge does not implement an RPC client; it consumes one through
//! [`ChainRpc`]. [`AlloyRpc`] is the HTTP implementation over alloy
//! providers, one per configured chain.

use std::collections::HashMap;

use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    sol_types::decode_revert_reason,
};
use async_trait::async_trait;

use super::network::rpc_endpoints;
use crate::config::BridgeConfig;

/// Fallback base fee when the latest block carries none (25 gwei).
const DEFAULT_BASE_FEE: u128 = 25_000_000_000;

/// Priority fee offered on every EIP-1559 transaction (1.5 gwei).
const DEFAULT_PRIORITY_FEE: u128 = 1_500_000_000;

/// Errors from the chain RPC capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("No RPC endpoint for chain {0}")]
    UnsupportedChain(u64),

    #[error("Execution reverted: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Reverted { reason: Option<String> },

    #[error("RPC error: {0}")]
    Rpc(String),
}

/// EIP-1559 fee parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl FeeQuote {
    /// Max fee = 2 * base fee + priority fee, leaving room for base fee growth.
    pub fn from_base_fee(base_fee: Option<u128>) -> Self {
        let base_fee = base_fee.unwrap_or(DEFAULT_BASE_FEE);
        Self {
            max_fee_per_gas: base_fee
                .saturating_mul(2)
                .saturating_add(DEFAULT_PRIORITY_FEE),
            max_priority_fee_per_gas: DEFAULT_PRIORITY_FEE,
        }
    }
}

/// What the dispatcher and the simulation check need from a chain.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    fn supports(&self, chain_id: u64) -> bool;

    /// Pending nonce of `from`.
    async fn nonce(&self, chain_id: u64, from: Address) -> Result<u64, RpcError>;

    async fn fee_quote(&self, chain_id: u64) -> Result<FeeQuote, RpcError>;

    /// Dry-run gas estimate. A revert is reported as [`RpcError::Reverted`].
    async fn estimate_gas(&self, chain_id: u64, tx: &TransactionRequest)
        -> Result<u64, RpcError>;

    /// Broadcast a signed EIP-2718 envelope, returning its hash.
    async fn send_raw_transaction(&self, chain_id: u64, raw: &[u8]) -> Result<B256, RpcError>;
}

/// HTTP JSON-RPC over alloy, one provider per chain.
pub struct AlloyRpc {
    providers: HashMap<u64, DynProvider>,
}

impl AlloyRpc {
    /// Build providers for the given `chain_id → url` table.
    pub fn new(endpoints: &HashMap<u64, String>) -> Result<Self, RpcError> {
        let mut providers = HashMap::with_capacity(endpoints.len());
        for (chain_id, raw) in endpoints {
            let url: url::Url = raw
                .parse()
                .map_err(|e: url::ParseError| RpcError::InvalidRpcUrl(format!("{raw}: {e}")))?;
            let provider = ProviderBuilder::new().connect_http(url).erased();
            providers.insert(*chain_id, provider);
        }
        Ok(Self { providers })
    }

    /// Built-in networks overlaid with `RPC_URL_<chainId>` overrides.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, RpcError> {
        Self::new(&rpc_endpoints(&config.rpc_overrides))
    }

    fn provider(&self, chain_id: u64) -> Result<&DynProvider, RpcError> {
        self.providers
            .get(&chain_id)
            .ok_or(RpcError::UnsupportedChain(chain_id))
    }
}

#[async_trait]
impl ChainRpc for AlloyRpc {
    fn supports(&self, chain_id: u64) -> bool {
        self.providers.contains_key(&chain_id)
    }

    async fn nonce(&self, chain_id: u64, from: Address) -> Result<u64, RpcError> {
        self.provider(chain_id)?
            .get_transaction_count(from)
            .pending()
            .await
            .map_err(|e| RpcError::Rpc(format!("Failed to get nonce: {e}")))
    }

    async fn fee_quote(&self, chain_id: u64) -> Result<FeeQuote, RpcError> {
        let block = self
            .provider(chain_id)?
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| RpcError::Rpc(format!("Failed to get block: {e}")))?
            .ok_or_else(|| RpcError::Rpc("No latest block".to_string()))?;

        Ok(FeeQuote::from_base_fee(
            block.header.base_fee_per_gas.map(|f| f as u128),
        ))
    }

    async fn estimate_gas(
        &self,
        chain_id: u64,
        tx: &TransactionRequest,
    ) -> Result<u64, RpcError> {
        let provider = self.provider(chain_id)?;
        match provider.estimate_gas(tx.clone()).await {
            Ok(gas) => Ok(gas),
            Err(e) => {
                if let Some(payload) = e.as_error_resp() {
                    let message = payload.message.to_string();
                    if let Some(data) = payload.as_revert_data() {
                        return Err(RpcError::Reverted {
                            reason: decode_revert_reason(&data).or(Some(message)),
                        });
                    }
                    if message.contains("revert") {
                        return Err(RpcError::Reverted {
                            reason: Some(message),
                        });
                    }
                }
                Err(RpcError::Rpc(format!("Gas estimation failed: {e}")))
            }
        }
    }

    async fn send_raw_transaction(&self, chain_id: u64, raw: &[u8]) -> Result<B256, RpcError> {
        let pending = self
            .provider(chain_id)?
            .send_raw_transaction(raw)
            .await
            .map_err(|e| RpcError::Rpc(format!("Failed to send: {e}")))?;
        Ok(*pending.tx_hash())
    }
}

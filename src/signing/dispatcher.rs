// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing dispatcher.
//!
//! Executes an approved request with a freshly unlocked key and produces
//! the JSON-RPC `result` value:
//!
//! | Method | Result |
//! |---|---|
//! | `personal_sign`, `eth_sign` | 65-byte signature, `0x` hex |
//! | `eth_signTypedData`, `eth_signTypedData_v4` | 65-byte signature, `0x` hex |
//! | `eth_sendTransaction` | transaction hash |
//! | `eth_signTransaction` | signed EIP-2718 envelope, `0x` hex |
//!
//! Transactions always use the chain id of the request, never a chain the
//! wallet happens to display.

use std::sync::Arc;

use alloy::{
    eips::eip2718::Encodable2718,
    network::{Ethereum, EthereumWallet, TransactionBuilder},
    primitives::{Address, Signature},
    rpc::types::TransactionRequest,
    signers::Signer,
};
use serde_json::Value;

use super::key::UnlockedKey;
use super::params::{message_params, typed_data_params, TxParams};
use super::typed_data::signing_hash;
use crate::blockchain::{ChainRpc, RpcError};
use crate::error::BridgeError;
use crate::models::{Request, SigningMethod};

pub struct Dispatcher {
    rpc: Arc<dyn ChainRpc>,
}

fn signature_hex(signature: &Signature) -> Value {
    Value::String(alloy::hex::encode_prefixed(signature.as_bytes()))
}

fn ensure_signer(expected: Address, key: &UnlockedKey) -> Result<(), BridgeError> {
    if expected != key.address() {
        return Err(BridgeError::DispatchFailed(format!(
            "Requested account {expected} is not the unlocked key"
        )));
    }
    Ok(())
}

fn rpc_failure(e: RpcError) -> BridgeError {
    match e {
        RpcError::Reverted { .. } => BridgeError::SimulationFailed(e.to_string()),
        RpcError::UnsupportedChain(chain_id) => {
            BridgeError::UnsupportedChain(format!("eip155:{chain_id}"))
        }
        other => BridgeError::DispatchFailed(other.to_string()),
    }
}

impl Dispatcher {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self { rpc }
    }

    /// Execute `request` with `key`. The key is dropped when this returns.
    pub async fn dispatch(&self, request: &Request, key: UnlockedKey) -> Result<Value, BridgeError> {
        tracing::info!(
            request_id = request.id,
            topic = %request.topic,
            method = %request.method,
            chain = %request.chain,
            "Dispatching request"
        );

        match request.method {
            SigningMethod::PersonalSign | SigningMethod::EthSign => {
                let params = message_params(request.method, &request.params)?;
                ensure_signer(params.address, &key)?;
                let signature = key
                    .signer()
                    .sign_message(&params.message)
                    .await
                    .map_err(|e| BridgeError::DispatchFailed(e.to_string()))?;
                Ok(signature_hex(&signature))
            }
            SigningMethod::SignTypedData | SigningMethod::SignTypedDataV4 => {
                let params = typed_data_params(&request.params)?;
                ensure_signer(params.address, &key)?;
                let hash = signing_hash(&params.data)?;
                let signature = key
                    .signer()
                    .sign_hash(&hash)
                    .await
                    .map_err(|e| BridgeError::DispatchFailed(e.to_string()))?;
                Ok(signature_hex(&signature))
            }
            SigningMethod::SendTransaction => {
                let (chain_id, raw) = self.sign_transaction(request, key).await?;
                let hash = self
                    .rpc
                    .send_raw_transaction(chain_id, &raw)
                    .await
                    .map_err(rpc_failure)?;
                tracing::info!(request_id = request.id, tx_hash = %hash, "Transaction broadcast");
                Ok(Value::String(hash.to_string()))
            }
            SigningMethod::SignTransaction => {
                let (_, raw) = self.sign_transaction(request, key).await?;
                Ok(Value::String(alloy::hex::encode_prefixed(raw)))
            }
        }
    }

    /// Fill, sign and encode a transaction on the request's chain.
    async fn sign_transaction(
        &self,
        request: &Request,
        key: UnlockedKey,
    ) -> Result<(u64, Vec<u8>), BridgeError> {
        let chain_id = request
            .chain
            .evm_id()
            .ok_or_else(|| BridgeError::UnsupportedChain(request.chain.to_string()))?;
        if !self.rpc.supports(chain_id) {
            return Err(BridgeError::UnsupportedChain(request.chain.to_string()));
        }

        let params = TxParams::parse(&request.params)?;
        let from = key.address();
        if let Some(requested) = params.from {
            ensure_signer(requested, &key)?;
        }

        let mut tx = params.call_request(from, chain_id);

        let nonce = match params.nonce {
            Some(nonce) => nonce,
            None => self.rpc.nonce(chain_id, from).await.map_err(rpc_failure)?,
        };
        tx = tx.nonce(nonce);

        tx = match params.gas_price {
            Some(gas_price) => tx.gas_price(gas_price),
            None => {
                let quote = match (params.max_fee_per_gas, params.max_priority_fee_per_gas) {
                    (Some(max_fee), Some(priority)) => crate::blockchain::FeeQuote {
                        max_fee_per_gas: max_fee,
                        max_priority_fee_per_gas: priority,
                    },
                    _ => self.rpc.fee_quote(chain_id).await.map_err(rpc_failure)?,
                };
                tx.max_fee_per_gas(quote.max_fee_per_gas)
                    .max_priority_fee_per_gas(quote.max_priority_fee_per_gas)
            }
        };

        let gas_limit = match params.gas {
            Some(gas) => gas,
            None => self
                .rpc
                .estimate_gas(chain_id, &tx)
                .await
                .map_err(rpc_failure)?,
        };
        tx = tx.gas_limit(gas_limit);

        let wallet = EthereumWallet::from(key.into_signer());
        let envelope = <TransactionRequest as TransactionBuilder<Ethereum>>::build(tx, &wallet)
            .await
            .map_err(|e| BridgeError::DispatchFailed(format!("Failed to sign transaction: {e}")))?;

        Ok((chain_id, envelope.encoded_2718()))
    }
}

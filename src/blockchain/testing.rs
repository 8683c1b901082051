// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scripted chain double used by unit tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use alloy::{
    primitives::{keccak256, Address, B256},
    rpc::types::TransactionRequest,
};
use async_trait::async_trait;

use super::rpc::{ChainRpc, FeeQuote, RpcError};

pub struct MockRpc {
    chains: Vec<u64>,
    nonce: AtomicU64,
    /// Result of the next `estimate_gas` calls (default: 21000)
    pub estimate: Mutex<Result<u64, RpcError>>,
    /// Raw transactions broadcast, with their chain id
    pub sent: Mutex<Vec<(u64, Vec<u8>)>>,
    pub estimates: Mutex<Vec<(u64, TransactionRequest)>>,
}

impl MockRpc {
    pub fn new(chains: &[u64]) -> Self {
        Self {
            chains: chains.to_vec(),
            nonce: AtomicU64::new(0),
            estimate: Mutex::new(Ok(21_000)),
            sent: Mutex::new(Vec::new()),
            estimates: Mutex::new(Vec::new()),
        }
    }

    pub fn reverting(chains: &[u64], reason: &str) -> Self {
        let rpc = Self::new(chains);
        *rpc.estimate.lock().unwrap() = Err(RpcError::Reverted {
            reason: Some(reason.to_string()),
        });
        rpc
    }

    fn check(&self, chain_id: u64) -> Result<(), RpcError> {
        if self.chains.contains(&chain_id) {
            Ok(())
        } else {
            Err(RpcError::UnsupportedChain(chain_id))
        }
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    fn supports(&self, chain_id: u64) -> bool {
        self.chains.contains(&chain_id)
    }

    async fn nonce(&self, chain_id: u64, _from: Address) -> Result<u64, RpcError> {
        self.check(chain_id)?;
        Ok(self.nonce.load(Ordering::SeqCst))
    }

    async fn fee_quote(&self, chain_id: u64) -> Result<FeeQuote, RpcError> {
        self.check(chain_id)?;
        Ok(FeeQuote::from_base_fee(Some(1_000_000_000)))
    }

    async fn estimate_gas(
        &self,
        chain_id: u64,
        tx: &TransactionRequest,
    ) -> Result<u64, RpcError> {
        self.check(chain_id)?;
        self.estimates.lock().unwrap().push((chain_id, tx.clone()));
        self.estimate.lock().unwrap().clone()
    }

    async fn send_raw_transaction(&self, chain_id: u64, raw: &[u8]) -> Result<B256, RpcError> {
        self.check(chain_id)?;
        self.sent.lock().unwrap().push((chain_id, raw.to_vec()));
        self.nonce.fetch_add(1, Ordering::SeqCst);
        Ok(keccak256(raw))
    }
}

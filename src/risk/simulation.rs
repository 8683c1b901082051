// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Dry-run of a transaction against current chain state.

use std::time::Duration;

use alloy::primitives::Address;

use super::{Finding, FindingKind};
use crate::blockchain::{ChainRpc, RpcError};
use crate::signing::TxParams;

/// Outcome of a simulation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Simulation {
    Passed { gas: u64 },
    /// The call would revert; decoded reason when available
    Reverted(Option<String>),
    /// Could not simulate (no RPC for the chain, network error, timeout)
    Unavailable(String),
}

impl Simulation {
    /// Danger finding for a revert, nothing otherwise.
    pub fn finding(&self) -> Option<Finding> {
        match self {
            Simulation::Reverted(reason) => Some(Finding::danger(
                FindingKind::SimulationReverted,
                match reason {
                    Some(reason) => format!("Transaction would fail: {reason}"),
                    None => "Transaction would fail (reverted without a reason)".to_string(),
                },
            )),
            _ => None,
        }
    }

    pub fn note(&self) -> Option<String> {
        match self {
            Simulation::Unavailable(why) => Some(format!("Simulation skipped: {why}")),
            _ => None,
        }
    }
}

/// Estimate gas for `tx` as sent by `from` on `chain_id`.
pub async fn simulate(
    rpc: &dyn ChainRpc,
    chain_id: u64,
    from: Address,
    tx: &TxParams,
    timeout: Duration,
) -> Simulation {
    if !rpc.supports(chain_id) {
        return Simulation::Unavailable(format!("no RPC endpoint for chain {chain_id}"));
    }

    let request = tx.call_request(from, chain_id);
    match tokio::time::timeout(timeout, rpc.estimate_gas(chain_id, &request)).await {
        Ok(Ok(gas)) => Simulation::Passed { gas },
        Ok(Err(RpcError::Reverted { reason })) => {
            tracing::info!(chain_id, ?reason, "Simulation reverted");
            Simulation::Reverted(reason)
        }
        Ok(Err(e)) => {
            tracing::warn!(chain_id, error = %e, "Simulation failed");
            Simulation::Unavailable(e.to_string())
        }
        Err(_) => {
            tracing::warn!(chain_id, timeout_ms = timeout.as_millis() as u64, "Simulation timed out");
            Simulation::Unavailable("timed out".to_string())
        }
    }
}

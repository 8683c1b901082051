// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM networks the bridge can dispatch to.

use std::collections::HashMap;

/// Static network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    pub chain_id: u64,
    pub native_symbol: &'static str,
    /// Default public RPC endpoint
    pub rpc_url: &'static str,
    pub explorer_url: &'static str,
    /// Etherscan-compatible API used for token discovery
    pub explorer_api_url: &'static str,
}

pub const BSC: NetworkConfig = NetworkConfig {
    name: "BNB Smart Chain",
    chain_id: 56,
    native_symbol: "BNB",
    rpc_url: "https://bsc-dataseed.binance.org",
    explorer_url: "https://bscscan.com",
    explorer_api_url: "https://api.bscscan.com/api",
};

pub const ETHEREUM: NetworkConfig = NetworkConfig {
    name: "Ethereum",
    chain_id: 1,
    native_symbol: "ETH",
    rpc_url: "https://eth.llamarpc.com",
    explorer_url: "https://etherscan.io",
    explorer_api_url: "https://api.etherscan.io/api",
};

pub const POLYGON: NetworkConfig = NetworkConfig {
    name: "Polygon",
    chain_id: 137,
    native_symbol: "POL",
    rpc_url: "https://polygon-rpc.com",
    explorer_url: "https://polygonscan.com",
    explorer_api_url: "https://api.polygonscan.com/api",
};

pub const ARBITRUM: NetworkConfig = NetworkConfig {
    name: "Arbitrum One",
    chain_id: 42161,
    native_symbol: "ETH",
    rpc_url: "https://arb1.arbitrum.io/rpc",
    explorer_url: "https://arbiscan.io",
    explorer_api_url: "https://api.arbiscan.io/api",
};

pub const AVALANCHE: NetworkConfig = NetworkConfig {
    name: "Avalanche C-Chain",
    chain_id: 43114,
    native_symbol: "AVAX",
    rpc_url: "https://api.avax.network/ext/bc/C/rpc",
    explorer_url: "https://snowtrace.io",
    explorer_api_url: "https://api.snowtrace.io/api",
};

pub const BASE: NetworkConfig = NetworkConfig {
    name: "Base",
    chain_id: 8453,
    native_symbol: "ETH",
    rpc_url: "https://mainnet.base.org",
    explorer_url: "https://basescan.org",
    explorer_api_url: "https://api.basescan.org/api",
};

/// Networks in the order the client role requests them.
pub const SUPPORTED_NETWORKS: [NetworkConfig; 6] =
    [BSC, ETHEREUM, POLYGON, ARBITRUM, AVALANCHE, BASE];

pub fn network_for(chain_id: u64) -> Option<&'static NetworkConfig> {
    SUPPORTED_NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

pub fn supported_chain_ids() -> Vec<u64> {
    SUPPORTED_NETWORKS.iter().map(|n| n.chain_id).collect()
}

/// RPC URL per chain: built-in defaults overlaid with `RPC_URL_<chainId>`.
pub fn rpc_endpoints(overrides: &HashMap<u64, String>) -> HashMap<u64, String> {
    let mut endpoints: HashMap<u64, String> = SUPPORTED_NETWORKS
        .iter()
        .map(|n| (n.chain_id, n.rpc_url.to_string()))
        .collect();
    for (chain_id, url) in overrides {
        endpoints.insert(*chain_id, url.clone());
    }
    endpoints
}

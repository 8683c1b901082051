// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Token Discovery
//!
//! ERC-20 tokens an address has interacted with, found through the chain's
//! Etherscan-compatible explorer (`module=account&action=tokentx`).
//!
//! - Results are persisted per `chainId:address` with the refresh time.
//! - A given `chainId:address` is refreshed at most once per
//!   [`DISCOVERY_COOLDOWN`]; within it the stored list is returned.
//! - Tokens with spam-looking names are dropped; at most
//!   [`MAX_DISCOVERED`] are kept.
//! - A failed fetch falls back to the stored list.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blockchain::network_for;
use crate::error::BridgeResult;
use crate::storage::tokens::TokenEntry;
use crate::storage::TokenStore;

/// Minimum time between two explorer fetches for one `chainId:address`.
pub const DISCOVERY_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Tokens kept per `chainId:address`.
pub const MAX_DISCOVERED: usize = 50;

/// Cooldown entries tracked in memory.
const COOLDOWN_CAPACITY: usize = 1024;

/// Transfers requested from the explorer per fetch.
const TRANSFER_PAGE_SIZE: u32 = 100;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const SPAM_WORDS: [&str; 6] = ["visit", "claim", "airdrop", "free", "bonus", "reward"];

const SPAM_TLDS: [&str; 4] = [".com", ".io", ".org", ".net"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredToken {
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub chain_id: u64,
    pub discovered_at: DateTime<Utc>,
}

/// One row of an explorer `tokentx` listing. Numbers arrive as strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub token_name: String,
    #[serde(default)]
    pub token_symbol: String,
    #[serde(default)]
    pub token_decimal: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenSourceError {
    #[error("No explorer API for chain {0}")]
    UnsupportedChain(u64),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Explorer error: {0}")]
    Explorer(String),
}

/// Where token transfers come from.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Most recent token transfers involving `owner`, newest first.
    async fn token_transfers(
        &self,
        chain_id: u64,
        owner: &str,
    ) -> Result<Vec<TokenTransfer>, TokenSourceError>;
}

#[derive(Debug, Deserialize)]
struct ExplorerBody {
    status: String,
    #[serde(default)]
    message: String,
    result: Value,
}

/// Etherscan-compatible explorer API, resolved from the network table.
pub struct ExplorerTokenSource {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl ExplorerTokenSource {
    pub fn new(api_key: Option<String>) -> Result<Self, TokenSourceError> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { client, api_key })
    }
}

#[async_trait]
impl TokenSource for ExplorerTokenSource {
    async fn token_transfers(
        &self,
        chain_id: u64,
        owner: &str,
    ) -> Result<Vec<TokenTransfer>, TokenSourceError> {
        let network = network_for(chain_id).ok_or(TokenSourceError::UnsupportedChain(chain_id))?;
        let page_size = TRANSFER_PAGE_SIZE.to_string();
        let mut query = vec![
            ("module", "account"),
            ("action", "tokentx"),
            ("address", owner),
            ("startblock", "0"),
            ("endblock", "99999999"),
            ("page", "1"),
            ("offset", page_size.as_str()),
            ("sort", "desc"),
        ];
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.as_str()));
        }

        let body: ExplorerBody = self
            .client
            .get(network.explorer_api_url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_transfers(body)
    }
}

fn parse_transfers(body: ExplorerBody) -> Result<Vec<TokenTransfer>, TokenSourceError> {
    if body.status == "1" {
        return serde_json::from_value(body.result)
            .map_err(|e| TokenSourceError::Explorer(e.to_string()));
    }
    // "0" with an empty listing is not an error
    if body.message.starts_with("No transactions found") {
        return Ok(Vec::new());
    }
    let detail = match body.result {
        Value::String(s) => s,
        _ => body.message,
    };
    Err(TokenSourceError::Explorer(detail))
}

/// Name/symbol heuristics for airdropped scam tokens.
pub fn is_likely_spam(name: &str, symbol: &str) -> bool {
    let combined = format!("{name} {symbol}").to_lowercase();
    combined.contains("http://")
        || combined.contains("https://")
        || SPAM_TLDS.iter().any(|tld| combined.contains(tld))
        || SPAM_WORDS.iter().any(|word| combined.contains(word))
        || combined.starts_with('$')
        || combined
            .as_bytes()
            .windows(2)
            .any(|w| w[0] == b'$' && w[1].is_ascii_digit())
        || combined.ends_with(".eth")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Persistent discovered-token cache.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    store: TokenStore,
    last_fetch: Mutex<LruCache<String, Instant>>,
    cooldown: Duration,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>, store: TokenStore) -> Self {
        let capacity = NonZeroUsize::new(COOLDOWN_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            store,
            last_fetch: Mutex::new(LruCache::new(capacity)),
            cooldown: DISCOVERY_COOLDOWN,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Stored tokens without touching the explorer.
    pub fn tokens(&self, chain_id: u64, owner: &str) -> BridgeResult<Vec<DiscoveredToken>> {
        Ok(self.store.get(chain_id, owner)?.tokens)
    }

    /// Refresh from the explorer unless cooling down, then return the list.
    ///
    /// `known` are addresses the caller already tracks (default tokens);
    /// they are never reported as discovered.
    pub async fn discover(
        &self,
        chain_id: u64,
        owner: &str,
        known: &[String],
    ) -> BridgeResult<Vec<DiscoveredToken>> {
        let key = format!("{chain_id}:{}", owner.to_lowercase());
        {
            let mut last_fetch = lock(&self.last_fetch);
            if let Some(at) = last_fetch.get(&key) {
                if at.elapsed() < self.cooldown {
                    tracing::debug!(key = %key, "Token discovery cooling down");
                    drop(last_fetch);
                    return self.tokens(chain_id, owner);
                }
            }
            last_fetch.put(key.clone(), Instant::now());
        }

        let transfers = match self.source.token_transfers(chain_id, owner).await {
            Ok(transfers) => transfers,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Token discovery failed");
                return self.tokens(chain_id, owner);
            }
        };

        let mut entry = self.store.get(chain_id, owner)?;
        let before = entry.tokens.len();
        merge(&mut entry, chain_id, transfers, known);
        entry.refreshed_at = Some(Utc::now());
        self.store.put(chain_id, owner, &entry)?;

        tracing::info!(
            key = %key,
            new = entry.tokens.len().saturating_sub(before),
            total = entry.tokens.len(),
            "Token discovery refreshed"
        );
        Ok(entry.tokens)
    }

    /// The user dismissed a token.
    pub fn remove(&self, chain_id: u64, owner: &str, token: &str) -> BridgeResult<Vec<DiscoveredToken>> {
        Ok(self.store.remove_token(chain_id, owner, token)?)
    }

    pub fn clear(&self, chain_id: u64, owner: &str) -> BridgeResult<()> {
        self.store.clear(chain_id, owner)?;
        lock(&self.last_fetch).pop(&format!("{chain_id}:{}", owner.to_lowercase()));
        Ok(())
    }
}

/// Append unseen, non-spam tokens after the existing ones and cap the list.
fn merge(entry: &mut TokenEntry, chain_id: u64, transfers: Vec<TokenTransfer>, known: &[String]) {
    let now = Utc::now();
    for transfer in transfers {
        if entry.tokens.len() >= MAX_DISCOVERED {
            break;
        }
        let address = transfer.contract_address.trim();
        if address.is_empty()
            || known.iter().any(|k| k.eq_ignore_ascii_case(address))
            || entry.tokens.iter().any(|t| t.address.eq_ignore_ascii_case(address))
            || is_likely_spam(&transfer.token_name, &transfer.token_symbol)
        {
            continue;
        }
        entry.tokens.push(DiscoveredToken {
            address: address.to_string(),
            name: non_empty(transfer.token_name, "Unknown"),
            symbol: non_empty(transfer.token_symbol, "???"),
            decimals: transfer.token_decimal.parse().unwrap_or(18),
            chain_id,
            discovered_at: now,
        });
    }
    entry.tokens.truncate(MAX_DISCOVERED);
}

fn non_empty(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

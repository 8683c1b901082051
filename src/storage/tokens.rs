// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Discovered-token lists, one row per `chainId:address`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::database::{BridgeDatabase, StoreResult, TOKEN_METADATA};
use crate::tokens::DiscoveredToken;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEntry {
    pub tokens: Vec<DiscoveredToken>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TokenStore {
    db: Arc<BridgeDatabase>,
}

fn entry_key(chain_id: u64, owner: &str) -> String {
    format!("{chain_id}:{}", owner.to_lowercase())
}

impl TokenStore {
    pub fn new(db: Arc<BridgeDatabase>) -> Self {
        Self { db }
    }

    pub fn get(&self, chain_id: u64, owner: &str) -> StoreResult<TokenEntry> {
        Ok(self
            .db
            .get_json(TOKEN_METADATA, &entry_key(chain_id, owner))?
            .unwrap_or_default())
    }

    pub fn put(&self, chain_id: u64, owner: &str, entry: &TokenEntry) -> StoreResult<()> {
        self.db.put_json(TOKEN_METADATA, &entry_key(chain_id, owner), entry)
    }

    /// Drop one token from the list. Returns the remaining tokens.
    pub fn remove_token(
        &self,
        chain_id: u64,
        owner: &str,
        token: &str,
    ) -> StoreResult<Vec<DiscoveredToken>> {
        let updated = self.db.update_json::<TokenEntry, _>(
            TOKEN_METADATA,
            &entry_key(chain_id, owner),
            |entry| entry.tokens.retain(|t| !t.address.eq_ignore_ascii_case(token)),
        )?;
        Ok(updated.map(|e| e.tokens).unwrap_or_default())
    }

    pub fn clear(&self, chain_id: u64, owner: &str) -> StoreResult<bool> {
        self.db.remove(TOKEN_METADATA, &entry_key(chain_id, owner))
    }
}

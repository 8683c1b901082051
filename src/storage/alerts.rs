// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Standing price alerts and the history of fired ones.

use std::sync::Arc;

use super::database::{
    newest_first_key, BridgeDatabase, StoreResult, TableOps, ALERTS, TRIGGERED_ALERTS,
};
use crate::alerts::PriceAlert;

/// Fired alerts kept in history; older entries are dropped.
pub const HISTORY_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AlertStore {
    db: Arc<BridgeDatabase>,
}

impl AlertStore {
    pub fn new(db: Arc<BridgeDatabase>) -> Self {
        Self { db }
    }

    pub fn put(&self, alert: &PriceAlert) -> StoreResult<()> {
        self.db.put_json(ALERTS, &alert.id.to_string(), alert)
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<PriceAlert>> {
        self.db.get_json(ALERTS, id)
    }

    pub fn remove(&self, id: &str) -> StoreResult<bool> {
        self.db.remove(ALERTS, id)
    }

    /// Every standing alert, oldest first.
    pub fn list(&self) -> StoreResult<Vec<PriceAlert>> {
        let mut alerts: Vec<PriceAlert> = self.db.list_json(ALERTS)?;
        alerts.sort_by_key(|a| a.created_at);
        Ok(alerts)
    }

    pub fn update<F>(&self, id: &str, mutate: F) -> StoreResult<Option<PriceAlert>>
    where
        F: FnOnce(&mut PriceAlert),
    {
        self.db.update_json(ALERTS, id, mutate)
    }

    /// Persist fired alerts: the standing rows are rewritten (now inactive)
    /// and each is prepended to the history, which is trimmed to
    /// [`HISTORY_LIMIT`]. Both land in one commit.
    pub fn record_triggered(&self, fired: &[PriceAlert]) -> StoreResult<()> {
        if fired.is_empty() {
            return Ok(());
        }

        let mut standing = Vec::with_capacity(fired.len());
        let mut history = Vec::with_capacity(fired.len());
        for alert in fired {
            let json = serde_json::to_vec(alert)?;
            let at = alert.triggered_at.unwrap_or(alert.created_at);
            history.push((newest_first_key(at.timestamp_millis(), &alert.id.to_string()), json.clone()));
            standing.push((alert.id.to_string(), json));
        }
        let mut keys = self.db.keys(TRIGGERED_ALERTS)?;
        keys.extend(history.iter().map(|(k, _)| k.clone()));
        keys.sort();
        keys.dedup();
        let overflow: Vec<String> = keys.into_iter().skip(HISTORY_LIMIT).collect();
        history.retain(|(k, _)| !overflow.contains(k));
        self.db.batch_all(&[
            TableOps {
                table: ALERTS,
                puts: &standing,
                removes: &[],
            },
            TableOps {
                table: TRIGGERED_ALERTS,
                puts: &history,
                removes: &overflow,
            },
        ])
    }

    /// Fired alerts, newest first.
    pub fn history(&self) -> StoreResult<Vec<PriceAlert>> {
        self.db.list_json(TRIGGERED_ALERTS)
    }
}

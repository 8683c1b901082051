// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Price Alerts
//!
//! A standing alert fires once when its token crosses the target price and
//! is then deactivated. [`AlertBook::toggle`] re-arms it.
//!
//! Prices are matched by lowercase symbol first, then by lowercase token
//! address. Fetching the prices is the caller's job.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BridgeError, BridgeResult};
use crate::storage::AlertStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    /// Fires when the price is at or above the target
    Above,
    /// Fires when the price is at or below the target
    Below,
}

impl AlertCondition {
    fn is_met(self, price: f64, target: f64) -> bool {
        match self {
            AlertCondition::Above => price >= target,
            AlertCondition::Below => price <= target,
        }
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertCondition::Above => write!(f, "above"),
            AlertCondition::Below => write!(f, "below"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAlert {
    pub id: Uuid,
    pub token_symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    pub condition: AlertCondition,
    pub target_price: f64,
    /// Price when the alert was created, for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_price: Option<f64>,
}

impl PriceAlert {
    fn matches(&self, key: &str) -> bool {
        self.token_symbol.eq_ignore_ascii_case(key)
            || self
                .token_address
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(key))
    }

    fn current_price(&self, prices: &HashMap<String, f64>) -> Option<f64> {
        prices
            .get(&self.token_symbol.to_lowercase())
            .or_else(|| {
                self.token_address
                    .as_ref()
                    .and_then(|a| prices.get(&a.to_lowercase()))
            })
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
    }
}

/// Input of [`AlertBook::add`].
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub token_symbol: String,
    pub token_address: Option<String>,
    pub chain_id: Option<u64>,
    pub condition: AlertCondition,
    pub target_price: f64,
    pub current_price: Option<f64>,
}

pub struct AlertBook {
    store: AlertStore,
}

impl AlertBook {
    pub fn new(store: AlertStore) -> Self {
        Self { store }
    }

    pub fn add(&self, new: NewAlert) -> BridgeResult<PriceAlert> {
        if new.token_symbol.trim().is_empty() {
            return Err(BridgeError::InvalidParams("token symbol is empty".into()));
        }
        if !new.target_price.is_finite() || new.target_price <= 0.0 {
            return Err(BridgeError::InvalidParams(format!(
                "target price must be positive, got {}",
                new.target_price
            )));
        }

        let alert = PriceAlert {
            id: Uuid::new_v4(),
            token_symbol: new.token_symbol.trim().to_string(),
            token_address: new.token_address,
            chain_id: new.chain_id,
            condition: new.condition,
            target_price: new.target_price,
            created_price: new.current_price,
            created_at: Utc::now(),
            active: true,
            triggered_at: None,
            triggered_price: None,
        };
        self.store.put(&alert)?;
        tracing::info!(
            alert_id = %alert.id,
            symbol = %alert.token_symbol,
            condition = %alert.condition,
            target = alert.target_price,
            "Price alert added"
        );
        Ok(alert)
    }

    pub fn remove(&self, id: Uuid) -> BridgeResult<bool> {
        Ok(self.store.remove(&id.to_string())?)
    }

    /// Flip `active`. Re-arming clears the last trigger.
    pub fn toggle(&self, id: Uuid) -> BridgeResult<Option<PriceAlert>> {
        Ok(self.store.update(&id.to_string(), |alert| {
            alert.active = !alert.active;
            if alert.active {
                alert.triggered_at = None;
                alert.triggered_price = None;
            }
        })?)
    }

    pub fn list(&self) -> BridgeResult<Vec<PriceAlert>> {
        Ok(self.store.list()?)
    }

    pub fn active_count(&self) -> BridgeResult<usize> {
        Ok(self.store.list()?.iter().filter(|a| a.active).count())
    }

    /// Alerts for a token, by symbol or contract address.
    pub fn find(&self, symbol_or_address: &str) -> BridgeResult<Vec<PriceAlert>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|a| a.matches(symbol_or_address))
            .collect())
    }

    /// Evaluate active alerts against `prices` (keys lowercase). Returns the
    /// alerts that fired; each is deactivated and added to the history.
    pub fn check(&self, prices: &HashMap<String, f64>) -> BridgeResult<Vec<PriceAlert>> {
        let now = Utc::now();
        let mut fired = Vec::new();
        for mut alert in self.store.list()? {
            if !alert.active {
                continue;
            }
            let Some(price) = alert.current_price(prices) else {
                continue;
            };
            if !alert.condition.is_met(price, alert.target_price) {
                continue;
            }
            alert.active = false;
            alert.triggered_at = Some(now);
            alert.triggered_price = Some(price);
            tracing::info!(
                alert_id = %alert.id,
                symbol = %alert.token_symbol,
                condition = %alert.condition,
                target = alert.target_price,
                price,
                "Price alert triggered"
            );
            fired.push(alert);
        }
        self.store.record_triggered(&fired)?;
        Ok(fired)
    }

    /// Fired alerts, newest first.
    pub fn history(&self) -> BridgeResult<Vec<PriceAlert>> {
        Ok(self.store.history()?)
    }
}

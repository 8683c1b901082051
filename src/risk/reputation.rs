// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External domain reputation lookup.
//!
//! Best effort: any failure (timeout, HTTP error, unparsable body) yields
//! [`Reputation::Unknown`], never an error. Conclusive verdicts are cached
//! per host for a short TTL.
//!
//! ## Wire format
//!
//! `GET {base_url}?domain={host}` → `{"malicious": bool, "reason": "…"}`

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Deserialize;
use tokio::sync::Mutex;

/// Verdict cache TTL (10 minutes).
const CACHE_TTL: Duration = Duration::from_secs(600);

const CACHE_CAPACITY: usize = 512;

/// Outcome of a reputation query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reputation {
    Malicious(String),
    Clean,
    /// The lookup could not complete
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ReputationBody {
    malicious: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Client for an optional external reputation endpoint.
#[derive(Clone)]
pub struct ReputationClient {
    base_url: String,
    client: reqwest::Client,
    cache: Arc<Mutex<LruCache<String, (Reputation, Instant)>>>,
}

impl ReputationClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        })
    }

    async fn query(&self, host: &str) -> Result<Reputation, String> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("domain", host)])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {} from reputation endpoint", response.status()));
        }

        let body: ReputationBody = response.json().await.map_err(|e| e.to_string())?;
        Ok(if body.malicious {
            Reputation::Malicious(body.reason.unwrap_or_else(|| "flagged".to_string()))
        } else {
            Reputation::Clean
        })
    }

    /// Look up `host`. Never fails.
    pub async fn lookup(&self, host: &str) -> Reputation {
        let host = host.to_ascii_lowercase();
        {
            let mut cache = self.cache.lock().await;
            if let Some((verdict, at)) = cache.get(&host) {
                if at.elapsed() < CACHE_TTL {
                    return verdict.clone();
                }
            }
        }

        match self.query(&host).await {
            Ok(verdict) => {
                self.cache
                    .lock()
                    .await
                    .put(host, (verdict.clone(), Instant::now()));
                verdict
            }
            Err(e) => {
                tracing::warn!(host = %host, error = %e, "Reputation lookup failed");
                Reputation::Unknown
            }
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Phishing-domain detection.
//!
//! ## Matching
//!
//! 1. Exact: the host, or any parent domain of it, is on the blocklist.
//! 2. Typosquat: the host contains a protected brand name but is neither
//!    the brand's real domain nor a subdomain of it.
//! 3. Drainer keywords and punycode hosts: warning only.
//!
//! ## Refresh
//!
//! [`PhishingFeed::refresh`] tries, in order: the live list, the community
//! list, the snapshot stored in the `meta` table, then the built-in list.
//! The resulting [`PhishingList`] records where it came from and when, so
//! a stale list can be reported instead of silently used.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Finding, FindingKind};
use crate::storage::BridgeDatabase;

/// A list older than this is reported as stale.
pub const STALE_AFTER_HOURS: i64 = 24;

const SNAPSHOT_KEY: &str = "phishing_list";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Known phishing hosts shipped with the bridge.
const BUILTIN_BLOCKLIST: [&str; 7] = [
    "metamask-wallet.org",
    "metamask-io.org",
    "pancakeswap-v3.com",
    "uniswap-v4.org",
    "airdrop-claim.org",
    "free-tokens.xyz",
    "nft-airdrop.xyz",
];

/// Protected brand → its legitimate domain.
const PROTECTED_BRANDS: [(&str, &str); 7] = [
    ("metamask", "metamask.io"),
    ("pancakeswap", "pancakeswap.finance"),
    ("uniswap", "uniswap.org"),
    ("opensea", "opensea.io"),
    ("binance", "binance.com"),
    ("coinbase", "coinbase.com"),
    ("trustwallet", "trustwallet.com"),
];

const DRAINER_KEYWORDS: [&str; 7] = [
    "airdrop", "claim", "drainer", "giveaway", "free-mint", "reward", "bonus",
];

/// Where a list was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListSource {
    Live,
    Community,
    Snapshot,
    Static,
}

/// Blocklist plus allowlist, with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhishingList {
    pub blocklist: HashSet<String>,
    #[serde(default)]
    pub allowlist: HashSet<String>,
    pub source: ListSource,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Lowercased hostname of an origin URL or bare host.
pub(crate) fn host_of(origin: &str) -> Option<String> {
    let origin = origin.trim();
    // bare hosts like `localhost:3000` parse as a scheme with no host
    let host = Url::parse(origin)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .or_else(|| {
            Url::parse(&format!("https://{origin}"))
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
        })?;
    Some(host.trim_end_matches('.').to_ascii_lowercase())
}

/// `host` equals `domain` or is a subdomain of it.
fn is_within(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

impl PhishingList {
    /// Built-in list only.
    pub fn builtin() -> Self {
        Self {
            blocklist: BUILTIN_BLOCKLIST.iter().map(|d| d.to_string()).collect(),
            allowlist: HashSet::new(),
            source: ListSource::Static,
            fetched_at: None,
        }
    }

    /// Merge a remote list on top of the built-in entries.
    fn from_remote(remote: RemoteList, source: ListSource) -> Self {
        let mut list = Self::builtin();
        list.blocklist.extend(remote.blocklist);
        list.allowlist.extend(remote.allowlist);
        list.source = source;
        list.fetched_at = Some(Utc::now());
        list
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match (self.source, self.fetched_at) {
            (ListSource::Static, _) | (_, None) => true,
            (_, Some(fetched)) => now - fetched > chrono::Duration::hours(STALE_AFTER_HOURS),
        }
    }

    /// Human-readable staleness note, if any.
    pub fn staleness_note(&self, now: DateTime<Utc>) -> Option<String> {
        if !self.is_stale(now) {
            return None;
        }
        let age = match self.fetched_at {
            Some(at) => format!("fetched {at}"),
            None => "never fetched".to_string(),
        };
        Some(format!(
            "Phishing list may be out of date (source: {:?}, {age})",
            self.source
        ))
    }

    /// Check an origin URL (or bare host) against the list.
    pub fn check_origin(&self, origin: &str) -> Vec<Finding> {
        let Some(host) = host_of(origin) else {
            return vec![Finding::warning(
                FindingKind::SuspiciousDomain,
                format!("Origin `{origin}` is not a valid URL"),
            )];
        };

        if self.allowlist.iter().any(|d| is_within(&host, d)) {
            return Vec::new();
        }

        if let Some(listed) = self.blocklist.iter().find(|d| is_within(&host, d)) {
            return vec![Finding::danger(
                FindingKind::PhishingDomain,
                format!("{host} is a known phishing site ({listed})"),
            )];
        }

        let mut findings = Vec::new();
        for (brand, legit) in PROTECTED_BRANDS {
            if host.contains(brand) && !is_within(&host, legit) {
                findings.push(Finding::danger(
                    FindingKind::PhishingDomain,
                    format!("{host} imitates {brand} but is not {legit}"),
                ));
                break;
            }
        }

        let keywords: Vec<&str> = DRAINER_KEYWORDS
            .iter()
            .copied()
            .filter(|k| host.contains(k))
            .collect();
        if !keywords.is_empty() {
            findings.push(Finding::warning(
                FindingKind::SuspiciousDomain,
                format!("{host} uses drainer-style wording ({})", keywords.join(", ")),
            ));
        }

        if host.split('.').any(|label| label.starts_with("xn--")) {
            findings.push(Finding::warning(
                FindingKind::SuspiciousDomain,
                format!("{host} uses internationalized characters that can imitate other sites"),
            ));
        }
        findings
    }
}

// =============================================================================
// Remote feeds
// =============================================================================

/// Accepted feed shapes: a plain array of hosts, or an object with
/// `blacklist` / `whitelist` arrays.
#[derive(Debug, Default)]
struct RemoteList {
    blocklist: Vec<String>,
    allowlist: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeedBody {
    Hosts(Vec<String>),
    Config {
        #[serde(default)]
        blacklist: Vec<String>,
        #[serde(default)]
        whitelist: Vec<String>,
    },
}

impl From<FeedBody> for RemoteList {
    fn from(body: FeedBody) -> Self {
        let normalize = |v: Vec<String>| -> Vec<String> {
            v.into_iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect()
        };
        match body {
            FeedBody::Hosts(hosts) => Self {
                blocklist: normalize(hosts),
                allowlist: Vec::new(),
            },
            FeedBody::Config {
                blacklist,
                whitelist,
            } => Self {
                blocklist: normalize(blacklist),
                allowlist: normalize(whitelist),
            },
        }
    }
}

/// Fetches the phishing list with fallbacks.
#[derive(Clone)]
pub struct PhishingFeed {
    live_url: String,
    community_url: String,
    db: Option<Arc<BridgeDatabase>>,
    client: reqwest::Client,
}

impl PhishingFeed {
    pub fn new(
        live_url: impl Into<String>,
        community_url: impl Into<String>,
        db: Option<Arc<BridgeDatabase>>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            live_url: live_url.into(),
            community_url: community_url.into(),
            db,
            client,
        })
    }

    async fn fetch(&self, url: &str) -> Result<RemoteList, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {} from {url}", response.status()));
        }
        let body: FeedBody = response.json().await.map_err(|e| e.to_string())?;
        Ok(body.into())
    }

    fn load_snapshot(&self) -> Option<PhishingList> {
        let db = self.db.as_ref()?;
        match db.get_meta(SNAPSHOT_KEY) {
            Ok(Some(bytes)) => match serde_json::from_slice::<PhishingList>(&bytes) {
                Ok(mut list) => {
                    list.source = ListSource::Snapshot;
                    Some(list)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stored phishing list is unreadable");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read phishing list snapshot");
                None
            }
        }
    }

    fn store_snapshot(&self, list: &PhishingList) {
        let Some(db) = &self.db else { return };
        let result = serde_json::to_vec(list)
            .map_err(crate::storage::StoreError::from)
            .and_then(|bytes| db.put_meta(SNAPSHOT_KEY, &bytes));
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to store phishing list snapshot");
        }
    }

    /// Live → community → stored snapshot → built-in. Never fails.
    pub async fn refresh(&self) -> PhishingList {
        for (url, source) in [
            (self.live_url.as_str(), ListSource::Live),
            (self.community_url.as_str(), ListSource::Community),
        ] {
            match self.fetch(url).await {
                Ok(remote) => {
                    let list = PhishingList::from_remote(remote, source);
                    tracing::info!(
                        source = ?source,
                        entries = list.blocklist.len(),
                        "Phishing list refreshed"
                    );
                    self.store_snapshot(&list);
                    return list;
                }
                Err(e) => tracing::warn!(url = %url, error = %e, "Phishing list fetch failed"),
            }
        }

        if let Some(snapshot) = self.load_snapshot() {
            tracing::warn!(fetched_at = ?snapshot.fetched_at, "Using stored phishing list snapshot");
            return snapshot;
        }

        tracing::warn!("Using built-in phishing list");
        PhishingList::builtin()
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pairing URI parsing.
//!
//! Format: `wc:{topic}@{version}?relay-protocol={p}&symKey={hex}[&expiryTimestamp={unix}]`

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use url::Url;

use crate::error::BridgeError;

/// Only protocol version 2 pairings are accepted.
const SUPPORTED_VERSION: &str = "2";

/// Parsed pairing URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingUri {
    pub topic: String,
    pub version: String,
    pub relay_protocol: String,
    /// 32-byte symmetric key, hex encoded
    pub sym_key: String,
    pub expiry: Option<DateTime<Utc>>,
    /// Methods advertised by the pairing, if any
    pub methods: Vec<String>,
}

impl PairingUri {
    /// Parse and validate a pairing string.
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let invalid = |reason: &str| BridgeError::InvalidUri(reason.to_string());

        let url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "wc" {
            return Err(invalid("scheme must be `wc`"));
        }

        let (topic, version) = url
            .path()
            .split_once('@')
            .ok_or_else(|| invalid("missing `@version`"))?;
        if topic.is_empty() || !topic.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid("topic must be non-empty and alphanumeric"));
        }
        if version != SUPPORTED_VERSION {
            return Err(invalid(&format!("unsupported version `{version}`")));
        }

        let mut relay_protocol = None;
        let mut sym_key = None;
        let mut expiry = None;
        let mut methods = Vec::new();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "relay-protocol" => relay_protocol = Some(value.into_owned()),
                "symKey" => sym_key = Some(value.into_owned()),
                "expiryTimestamp" => {
                    let secs: i64 = value
                        .parse()
                        .map_err(|_| invalid("expiryTimestamp must be a unix timestamp"))?;
                    expiry = Some(
                        Utc.timestamp_opt(secs, 0)
                            .single()
                            .ok_or_else(|| invalid("expiryTimestamp out of range"))?,
                    );
                }
                "methods" => {
                    methods = value
                        .split(',')
                        .map(|m| m.trim().trim_matches(|c| c == '[' || c == ']').to_string())
                        .filter(|m| !m.is_empty())
                        .collect();
                }
                _ => {}
            }
        }

        let relay_protocol = relay_protocol
            .filter(|p| !p.is_empty())
            .ok_or_else(|| invalid("missing relay-protocol"))?;
        let sym_key = sym_key.ok_or_else(|| invalid("missing symKey"))?;
        if sym_key.len() != 64 || !sym_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid("symKey must be 32 bytes of hex"));
        }

        Ok(Self {
            topic: topic.to_string(),
            version: version.to_string(),
            relay_protocol,
            sym_key,
            expiry,
            methods,
        })
    }

    /// Fail with `PairingExpired` if the pairing is past its expiry.
    pub fn ensure_fresh(&self, now: DateTime<Utc>) -> Result<(), BridgeError> {
        match self.expiry {
            Some(expiry) if expiry <= now => Err(BridgeError::PairingExpired),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for PairingUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wc:{}@{}?relay-protocol={}&symKey={}",
            self.topic, self.version, self.relay_protocol, self.sym_key
        )?;
        if let Some(expiry) = self.expiry {
            write!(f, "&expiryTimestamp={}", expiry.timestamp())?;
        }
        Ok(())
    }
}

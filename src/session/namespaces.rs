// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Namespace negotiation.
//!
//! The approved namespaces are the intersection of what the proposal asks
//! for and what the wallet supports:
//!
//! - chains: requested ∩ supported; empty for a required namespace is a
//!   mismatch
//! - methods: requested ∩ supported; empty for a required namespace is a
//!   mismatch
//! - events: requested ∩ supported (may be empty)
//! - accounts: the wallet's accounts on the negotiated chains; none for a
//!   required namespace is a mismatch
//!
//! Optional namespaces are included when their intersection is usable and
//! silently dropped otherwise.

use std::collections::BTreeMap;

use crate::error::BridgeError;
use crate::models::{AccountId, ChainRef, Namespace, Namespaces, ProposalNamespace, SigningMethod, EIP155};

/// Events the wallet emits on every session.
pub const WALLET_EVENTS: [&str; 2] = ["chainChanged", "accountsChanged"];

/// Everything the wallet can expose for the given accounts.
pub fn wallet_namespaces(accounts: &[AccountId]) -> Namespaces {
    let mut chains: Vec<ChainRef> = Vec::new();
    for account in accounts {
        if !chains.contains(&account.chain) {
            chains.push(account.chain.clone());
        }
    }

    let mut namespaces = Namespaces::new();
    namespaces.insert(
        EIP155.to_string(),
        Namespace {
            chains,
            accounts: accounts.to_vec(),
            methods: SigningMethod::ALL.iter().map(|m| m.as_str().to_string()).collect(),
            events: WALLET_EVENTS.iter().map(|e| e.to_string()).collect(),
        },
    );
    namespaces
}

fn intersect<T: Clone + PartialEq>(requested: &[T], supported: &[T]) -> Vec<T> {
    requested
        .iter()
        .filter(|item| supported.contains(item))
        .cloned()
        .collect()
}

/// Intersect one namespace. `Err` carries the human-readable shortfall.
fn negotiate_one(
    key: &str,
    requested: &ProposalNamespace,
    supported: Option<&Namespace>,
    accounts: &[AccountId],
) -> Result<Namespace, String> {
    let supported = supported.ok_or_else(|| format!("namespace `{key}` is not supported"))?;

    let chains = intersect(&requested.chains, &supported.chains);
    if chains.is_empty() {
        let wanted: Vec<String> = requested.chains.iter().map(ToString::to_string).collect();
        return Err(format!("none of the chains [{}] are supported", wanted.join(", ")));
    }

    let methods = intersect(&requested.methods, &supported.methods);
    if methods.is_empty() && !requested.methods.is_empty() {
        return Err(format!(
            "none of the methods [{}] are supported",
            requested.methods.join(", ")
        ));
    }

    let accounts: Vec<AccountId> = accounts
        .iter()
        .filter(|a| chains.contains(&a.chain))
        .cloned()
        .collect();
    if accounts.is_empty() {
        return Err(format!("no account is exposed on namespace `{key}`"));
    }

    Ok(Namespace {
        chains,
        accounts,
        methods,
        events: intersect(&requested.events, &supported.events),
    })
}

/// Build the namespaces to approve for a proposal.
pub fn negotiate(
    required: &BTreeMap<String, ProposalNamespace>,
    optional: &BTreeMap<String, ProposalNamespace>,
    accounts: &[AccountId],
    supported: &Namespaces,
) -> Result<Namespaces, BridgeError> {
    let mut approved = Namespaces::new();

    for (key, requested) in required {
        let namespace = negotiate_one(key, requested, supported.get(key), accounts)
            .map_err(BridgeError::NamespaceMismatch)?;
        approved.insert(key.clone(), namespace);
    }

    for (key, requested) in optional {
        match negotiate_one(key, requested, supported.get(key), accounts) {
            Ok(namespace) => merge(approved.entry(key.clone()).or_default(), namespace),
            Err(reason) => tracing::debug!(namespace = %key, %reason, "Optional namespace skipped"),
        }
    }

    if approved.is_empty() {
        return Err(BridgeError::NamespaceMismatch(
            "proposal shares no namespace with the wallet".to_string(),
        ));
    }
    Ok(approved)
}

fn merge(into: &mut Namespace, from: Namespace) {
    fn extend<T: PartialEq>(into: &mut Vec<T>, from: Vec<T>) {
        for item in from {
            if !into.contains(&item) {
                into.push(item);
            }
        }
    }
    extend(&mut into.chains, from.chains);
    extend(&mut into.accounts, from.accounts);
    extend(&mut into.methods, from.methods);
    extend(&mut into.events, from.events);
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # dApp Client
//!
//! The client role: pair with an external wallet and ask it to sign.
//!
//! ```rust,ignore
//! let client = DappClient::new(relay, store, metadata);
//! let pending = client.pair().await?;
//! show_qr(&pending.uri);
//! let session = pending.wait_for_approval().await?;
//! let hash = client.send_transaction(56, tx).await?;
//! ```
//!
//! One session at a time. It is persisted so a restart can pick it up
//! again through [`DappClient::restore`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::error::{BridgeError, BridgeResult, ProtocolError};
use crate::models::{
    ChainRef, Namespaces, PeerMetadata, ProposalNamespace, Session, SessionState, SigningMethod,
    EIP155,
};
use crate::relay::{ClientRelay, RpcOutcome, RpcRequest, TransportError};
use crate::session::WALLET_EVENTS;
use crate::storage::SessionStore;

/// Chains requested from the wallet, in preference order.
pub const CLIENT_CHAINS: [u64; 6] = [56, 1, 137, 42161, 43114, 8453];

const CLIENT_METHODS: [SigningMethod; 3] = [
    SigningMethod::SendTransaction,
    SigningMethod::PersonalSign,
    SigningMethod::SignTypedDataV4,
];

/// Fallback label when the wallet did not describe itself.
const UNNAMED_PEER: &str = "External Wallet";

/// Namespace requirements sent with every connect.
pub fn required_namespaces() -> BTreeMap<String, ProposalNamespace> {
    BTreeMap::from([(
        EIP155.to_string(),
        ProposalNamespace {
            chains: CLIENT_CHAINS.iter().copied().map(ChainRef::evm).collect(),
            methods: CLIENT_METHODS.iter().map(|m| m.as_str().to_string()).collect(),
            events: WALLET_EVENTS.iter().map(|e| e.to_string()).collect(),
        },
    )])
}

/// Summary of the connected wallet for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedAccount {
    pub address: String,
    pub chain_id: u64,
    /// Distinct chains the wallet exposed accounts on
    pub chains: Vec<u64>,
    pub peer_name: String,
    pub peer_icon: Option<String>,
}

/// A connect in progress. Show `uri` to the user, then await approval.
pub struct PendingPairing {
    pub uri: String,
    approval: oneshot::Receiver<Result<Session, TransportError>>,
    store: SessionStore,
}

impl PendingPairing {
    /// Wait for the wallet to settle the session, then persist it.
    pub async fn wait_for_approval(self) -> BridgeResult<Session> {
        let mut session = self.approval.await.map_err(|_| TransportError::Closed)??;
        session.state = SessionState::Active;
        self.store.save_client_session(&session)?;
        info!(
            topic = %session.topic,
            peer = %session.peer.name,
            "Wallet connected"
        );
        Ok(session)
    }
}

/// Client-role bridge over a [`ClientRelay`].
pub struct DappClient {
    relay: Arc<dyn ClientRelay>,
    store: SessionStore,
    metadata: PeerMetadata,
}

impl DappClient {
    pub fn new(relay: Arc<dyn ClientRelay>, store: SessionStore, metadata: PeerMetadata) -> Self {
        Self {
            relay,
            store,
            metadata,
        }
    }

    /// Propose a session. The returned URI is handed to the wallet out of band.
    pub async fn pair(&self) -> BridgeResult<PendingPairing> {
        let handle = self
            .relay
            .connect(&required_namespaces(), &self.metadata)
            .await?;
        Ok(PendingPairing {
            uri: handle.uri,
            approval: handle.approval,
            store: self.store.clone(),
        })
    }

    /// Pick up the persisted session if the relay still knows it.
    ///
    /// A saved session the relay no longer lists is cleared, never revived.
    pub async fn restore(&self) -> BridgeResult<Option<Session>> {
        let Some(saved) = self.store.client_session()? else {
            return Ok(None);
        };
        let live = match self.relay.active_sessions().await {
            Ok(live) => live,
            Err(e) => {
                warn!(error = %e, "Could not list relay sessions, dropping saved session");
                self.store.clear_client_session()?;
                return Ok(None);
            }
        };
        match live.into_iter().find(|s| s.topic == saved.topic) {
            Some(mut session) if !session.is_expired(Utc::now()) => {
                session.state = SessionState::Active;
                self.store.save_client_session(&session)?;
                info!(topic = %session.topic, "Wallet session restored");
                Ok(Some(session))
            }
            _ => {
                info!(topic = %saved.topic, "Saved wallet session is gone");
                self.store.clear_client_session()?;
                Ok(None)
            }
        }
    }

    pub fn session(&self) -> BridgeResult<Option<Session>> {
        Ok(self
            .store
            .client_session()?
            .filter(|s| s.is_usable(Utc::now())))
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.session(), Ok(Some(_)))
    }

    /// Drop the session locally; the relay is told on a best-effort basis.
    pub async fn disconnect(&self) -> BridgeResult<()> {
        let Some(session) = self.store.client_session()? else {
            return Ok(());
        };
        self.store.clear_client_session()?;
        if let Err(e) = self
            .relay
            .disconnect(&session.topic, &ProtocolError::user_disconnected())
            .await
        {
            warn!(topic = %session.topic, error = %e, "Relay disconnect failed");
        }
        info!(topic = %session.topic, "Wallet disconnected");
        Ok(())
    }

    /// The wallet deleted the session.
    pub fn on_session_deleted(&self, topic: &str) -> BridgeResult<bool> {
        match self.store.client_session()? {
            Some(session) if session.topic == topic => {
                self.store.clear_client_session()?;
                info!(topic = %topic, "Wallet closed the session");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// The wallet changed the exposed namespaces.
    pub fn on_session_update(&self, topic: &str, namespaces: Namespaces) -> BridgeResult<Option<Session>> {
        match self.store.client_session()? {
            Some(mut session) if session.topic == topic => {
                session.namespaces = namespaces;
                self.store.save_client_session(&session)?;
                Ok(Some(session))
            }
            _ => Ok(None),
        }
    }

    /// First exposed account plus the distinct chain list.
    pub fn connected_account(&self) -> BridgeResult<Option<ConnectedAccount>> {
        let Some(session) = self.session()? else {
            return Ok(None);
        };
        let accounts = session
            .namespaces
            .get(EIP155)
            .map(|ns| ns.accounts.clone())
            .unwrap_or_default();
        let Some(first) = accounts.first() else {
            return Ok(None);
        };
        let Some(chain_id) = first.chain.evm_id() else {
            return Ok(None);
        };

        let mut seen = BTreeSet::new();
        let chains = accounts
            .iter()
            .filter_map(|a| a.chain.evm_id())
            .filter(|id| seen.insert(*id))
            .collect();

        let peer_name = if session.peer.name.is_empty() {
            UNNAMED_PEER.to_string()
        } else {
            session.peer.name.clone()
        };
        Ok(Some(ConnectedAccount {
            address: first.address.clone(),
            chain_id,
            chains,
            peer_name,
            peer_icon: session.peer.icons.first().cloned(),
        }))
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// `eth_sendTransaction`; resolves to the transaction hash.
    pub async fn send_transaction(&self, chain_id: u64, tx: Value) -> BridgeResult<Value> {
        let session = self.require_session()?;
        self.request(
            &session,
            &ChainRef::evm(chain_id),
            SigningMethod::SendTransaction,
            json!([tx]),
        )
        .await
    }

    /// `personal_sign` on the chain the wallet exposes `address` on.
    pub async fn sign_message(&self, address: &str, message: &str) -> BridgeResult<Value> {
        let session = self.require_session()?;
        let chain = chain_for(&session, address)?;
        self.request(
            &session,
            &chain,
            SigningMethod::PersonalSign,
            json!([message, address]),
        )
        .await
    }

    /// `eth_signTypedData_v4`. Objects are sent as their JSON string.
    pub async fn sign_typed_data(&self, address: &str, typed_data: Value) -> BridgeResult<Value> {
        let session = self.require_session()?;
        let chain = chain_for(&session, address)?;
        let payload = match typed_data {
            Value::String(raw) => raw,
            other => other.to_string(),
        };
        self.request(
            &session,
            &chain,
            SigningMethod::SignTypedDataV4,
            json!([address, payload]),
        )
        .await
    }

    fn require_session(&self) -> BridgeResult<Session> {
        self.session()?
            .ok_or_else(|| BridgeError::NotConnected("client".into()))
    }

    async fn request(
        &self,
        session: &Session,
        chain: &ChainRef,
        method: SigningMethod,
        params: Value,
    ) -> BridgeResult<Value> {
        let outcome = self
            .relay
            .request(
                &session.topic,
                &chain.to_string(),
                RpcRequest {
                    method: method.as_str().to_string(),
                    params,
                },
            )
            .await?;
        match outcome {
            RpcOutcome::Result(value) => Ok(value),
            RpcOutcome::Error(e) => {
                info!(topic = %session.topic, method = %method, code = e.code, "Wallet refused request");
                Err(peer_error(e))
            }
        }
    }
}

/// Chain of the account matching `address`, else the first exposed chain.
fn chain_for(session: &Session, address: &str) -> BridgeResult<ChainRef> {
    let accounts = session.accounts();
    accounts
        .iter()
        .find(|a| a.same_address(address))
        .or_else(|| accounts.first())
        .map(|a| a.chain.clone())
        .ok_or_else(|| BridgeError::NotConnected(session.topic.clone()))
}

fn peer_error(error: ProtocolError) -> BridgeError {
    match error.code {
        ProtocolError::USER_REJECTED => BridgeError::UserRejected,
        ProtocolError::REQUEST_EXPIRED => BridgeError::RequestExpired,
        _ => BridgeError::Transport(TransportError::Peer(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountId, Namespace};
    use crate::relay::testing::{MockRelay, RelayCall};
    use crate::storage::database::tests::temp_db;

    const WALLET: &str = "0xAAAaaAAaAAaaaAAAaaaAAAaaAAaAAaAAAaaAAAaa";

    fn setup() -> (DappClient, Arc<MockRelay>, tempfile::TempDir) {
        let (db, dir) = temp_db();
        let relay = Arc::new(MockRelay::new());
        let client = DappClient::new(
            relay.clone(),
            SessionStore::new(Arc::new(db)),
            PeerMetadata {
                name: "Trade".into(),
                ..Default::default()
            },
        );
        (client, relay, dir)
    }

    fn wallet_session(topic: &str) -> Session {
        let accounts = vec![
            AccountId::new(ChainRef::evm(56), WALLET),
            AccountId::new(ChainRef::evm(1), WALLET),
            AccountId::new(ChainRef::evm(56), "0xBbbBbbbBbbbbBbbbBbbBBbBbBbbbbBBBbbbbbBBb"),
        ];
        let namespaces = Namespaces::from([(
            EIP155.to_string(),
            Namespace {
                chains: vec![ChainRef::evm(56), ChainRef::evm(1)],
                accounts,
                methods: CLIENT_METHODS.iter().map(|m| m.as_str().to_string()).collect(),
                events: vec![],
            },
        )]);
        Session::new(
            topic,
            "pairing",
            PeerMetadata {
                name: "Kairos Wallet".into(),
                icons: vec!["https://wallet.example/icon.png".into()],
                ..Default::default()
            },
            namespaces,
            None,
        )
    }

    async fn connected(client: &DappClient, relay: &MockRelay, topic: &str) -> Session {
        let pending = client.pair().await.unwrap();
        assert!(pending.uri.starts_with("wc:"));
        assert!(relay.complete_approval(Ok(wallet_session(topic))));
        pending.wait_for_approval().await.unwrap()
    }

    #[test]
    fn required_namespace_lists_client_chains() {
        let required = required_namespaces();
        let ns = &required[EIP155];
        assert_eq!(ns.chains.len(), 6);
        assert_eq!(ns.chains[0], ChainRef::evm(56));
        assert!(ns.methods.contains(&"eth_signTypedData_v4".to_string()));
        assert_eq!(ns.events, vec!["chainChanged", "accountsChanged"]);
    }

    #[tokio::test]
    async fn approval_persists_active_session() {
        let (client, relay, _dir) = setup();
        let session = connected(&client, &relay, "s1").await;

        assert_eq!(session.state, SessionState::Active);
        assert!(client.is_connected());
        assert_eq!(client.session().unwrap().unwrap().topic, "s1");
    }

    #[tokio::test]
    async fn dropped_approval_is_a_transport_error() {
        let (client, relay, _dir) = setup();
        let pending = client.pair().await.unwrap();
        assert!(relay.complete_approval(Err(TransportError::Timeout)));

        let err = pending.wait_for_approval().await.unwrap_err();
        assert!(matches!(err, BridgeError::Transport(TransportError::Timeout)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn requests_without_session_fail_not_connected() {
        let (client, relay, _dir) = setup();

        let err = client.send_transaction(56, json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected(_)));
        let err = client.sign_message(WALLET, "hi").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected(_)));
        assert!(relay.calls().is_empty());
    }

    #[tokio::test]
    async fn send_transaction_targets_requested_chain() {
        let (client, relay, _dir) = setup();
        connected(&client, &relay, "s1").await;
        relay.push_client_outcome(RpcOutcome::Result(json!("0xhash")));

        let tx = json!({"from": WALLET, "to": WALLET, "value": "0x1"});
        let hash = client.send_transaction(137, tx.clone()).await.unwrap();
        assert_eq!(hash, json!("0xhash"));

        let last = relay.calls().pop().unwrap();
        assert_eq!(
            last,
            RelayCall::Request {
                topic: "s1".into(),
                chain_id: "eip155:137".into(),
                request: RpcRequest {
                    method: "eth_sendTransaction".into(),
                    params: json!([tx]),
                },
            }
        );
    }

    #[tokio::test]
    async fn sign_typed_data_stringifies_objects() {
        let (client, relay, _dir) = setup();
        connected(&client, &relay, "s1").await;
        relay.push_client_outcome(RpcOutcome::Result(json!("0xsig")));

        let data = json!({"primaryType": "Mail"});
        client.sign_typed_data(WALLET, data.clone()).await.unwrap();

        match relay.calls().pop().unwrap() {
            RelayCall::Request { request, chain_id, .. } => {
                assert_eq!(chain_id, "eip155:56");
                assert_eq!(request.params, json!([WALLET, data.to_string()]));
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn user_rejection_maps_to_user_rejected() {
        let (client, relay, _dir) = setup();
        connected(&client, &relay, "s1").await;
        relay.push_client_outcome(RpcOutcome::Error(ProtocolError::user_rejected()));

        let err = client.sign_message(WALLET, "hi").await.unwrap_err();
        assert!(matches!(err, BridgeError::UserRejected));
    }

    #[tokio::test]
    async fn restore_keeps_live_session_and_clears_missing_one() {
        let (client, relay, _dir) = setup();
        connected(&client, &relay, "s1").await;

        relay.set_client_sessions(vec![wallet_session("s1")]);
        assert_eq!(client.restore().await.unwrap().unwrap().topic, "s1");

        relay.set_client_sessions(vec![wallet_session("other")]);
        assert!(client.restore().await.unwrap().is_none());
        assert!(client.session().unwrap().is_none());
    }

    #[tokio::test]
    async fn session_delete_and_update_touch_only_own_topic() {
        let (client, relay, _dir) = setup();
        connected(&client, &relay, "s1").await;

        assert!(client.on_session_update("s2", Namespaces::new()).unwrap().is_none());
        assert!(!client.on_session_deleted("s2").unwrap());

        let updated = client.on_session_update("s1", Namespaces::new()).unwrap().unwrap();
        assert!(updated.namespaces.is_empty());
        assert!(client.on_session_deleted("s1").unwrap());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn connected_account_summarises_session() {
        let (client, relay, _dir) = setup();
        connected(&client, &relay, "s1").await;

        let account = client.connected_account().unwrap().unwrap();
        assert_eq!(account.address, WALLET);
        assert_eq!(account.chain_id, 56);
        assert_eq!(account.chains, vec![56, 1]);
        assert_eq!(account.peer_name, "Kairos Wallet");
        assert_eq!(account.peer_icon.as_deref(), Some("https://wallet.example/icon.png"));
    }

    #[tokio::test]
    async fn disconnect_clears_even_when_relay_fails() {
        let (client, relay, _dir) = setup();
        connected(&client, &relay, "s1").await;
        relay
            .fail_disconnect
            .store(true, std::sync::atomic::Ordering::SeqCst);

        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
    }
}

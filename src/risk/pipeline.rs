// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Risk pipeline: runs every applicable check and aggregates the result.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::Utc;
use tokio::sync::RwLock;

use super::checks::{check_message, check_transaction, check_typed_data, CheckContext};
use super::domain::{host_of, ListSource, PhishingFeed, PhishingList};
use super::reputation::{Reputation, ReputationClient};
use super::simulation::{simulate, Simulation};
use super::{Finding, FindingKind, RiskAssessment};
use crate::blockchain::{network_for, ChainRpc};
use crate::config::{BridgeConfig, RiskThresholds};
use crate::models::{Proposal, Request, SigningMethod};
use crate::signing::params::{message_params, typed_data_params};
use crate::signing::TxParams;
use crate::storage::BridgeDatabase;

const DEFAULT_NATIVE_SYMBOL: &str = "ETH";
const DEFAULT_SIMULATION_TIMEOUT: Duration = Duration::from_secs(5);

/// An outbound transaction the local user is about to confirm.
#[derive(Debug, Clone)]
pub struct TransactionIntent {
    pub chain_id: u64,
    pub tx: TxParams,
    /// Site that initiated the send, if any
    pub origin: Option<String>,
}

/// Inputs of the async stage, collected while the sync checks run.
#[derive(Default)]
struct AsyncPlan {
    host: Option<String>,
    simulation: Option<(u64, Address, TxParams)>,
}

pub struct RiskPipeline {
    thresholds: RiskThresholds,
    phishing: RwLock<Arc<PhishingList>>,
    feed: Option<PhishingFeed>,
    reputation: Option<ReputationClient>,
    rpc: Option<Arc<dyn ChainRpc>>,
    simulation_timeout: Duration,
    verified_contracts: RwLock<HashSet<Address>>,
    malicious_addresses: RwLock<HashSet<Address>>,
}

impl RiskPipeline {
    /// Offline pipeline: built-in phishing list, no reputation, no simulation.
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self {
            thresholds,
            phishing: RwLock::new(Arc::new(PhishingList::builtin())),
            feed: None,
            reputation: None,
            rpc: None,
            simulation_timeout: DEFAULT_SIMULATION_TIMEOUT,
            verified_contracts: RwLock::new(HashSet::new()),
            malicious_addresses: RwLock::new(HashSet::new()),
        }
    }

    pub fn from_config(
        config: &BridgeConfig,
        db: Option<Arc<BridgeDatabase>>,
        rpc: Option<Arc<dyn ChainRpc>>,
    ) -> Result<Self, reqwest::Error> {
        let mut pipeline = Self::new(config.thresholds.clone()).with_feed(PhishingFeed::new(
            config.phishing_list_url.clone(),
            config.phishing_community_url.clone(),
            db,
        )?);
        if let Some(url) = &config.reputation_api_url {
            pipeline = pipeline.with_reputation(ReputationClient::new(
                url.clone(),
                config.reputation_timeout,
            )?);
        }
        if let Some(rpc) = rpc {
            pipeline = pipeline.with_simulation(rpc, config.simulation_timeout);
        }
        Ok(pipeline)
    }

    pub fn with_feed(mut self, feed: PhishingFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_reputation(mut self, client: ReputationClient) -> Self {
        self.reputation = Some(client);
        self
    }

    pub fn with_simulation(mut self, rpc: Arc<dyn ChainRpc>, timeout: Duration) -> Self {
        self.rpc = Some(rpc);
        self.simulation_timeout = timeout;
        self
    }

    pub fn with_phishing_list(self, list: PhishingList) -> Self {
        Self {
            phishing: RwLock::new(Arc::new(list)),
            ..self
        }
    }

    /// Reload the phishing list through the feed's fallback chain.
    pub async fn refresh_phishing_list(&self) -> ListSource {
        let Some(feed) = &self.feed else {
            return self.phishing.read().await.source;
        };
        let list = feed.refresh().await;
        let source = list.source;
        *self.phishing.write().await = Arc::new(list);
        source
    }

    /// Mark a contract as verified; payloads to it no longer warn.
    pub async fn verify_contract(&self, address: Address) {
        self.verified_contracts.write().await.insert(address);
    }

    pub async fn flag_malicious(&self, address: Address) {
        self.malicious_addresses.write().await.insert(address);
    }

    pub async fn phishing_source(&self) -> ListSource {
        self.phishing.read().await.source
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Assess a pending request. `account` is the wallet account the request
    /// would be signed with, used as the sender when simulating.
    pub async fn assess_request(&self, request: &Request, account: Option<Address>) -> RiskAssessment {
        let chain_id = request.chain.evm_id();
        let mut findings = Vec::new();
        let mut plan = AsyncPlan::default();

        match request.method {
            SigningMethod::PersonalSign | SigningMethod::EthSign => {
                match message_params(request.method, &request.params) {
                    Ok(params) => findings.extend(check_message(request.method, &params.message)),
                    Err(e) => findings.push(malformed(e)),
                }
            }
            SigningMethod::SignTypedData | SigningMethod::SignTypedDataV4 => {
                match typed_data_params(&request.params) {
                    Ok(params) => findings.extend(check_typed_data(&params.data, chain_id)),
                    Err(e) => findings.push(malformed(e)),
                }
            }
            SigningMethod::SendTransaction | SigningMethod::SignTransaction => {
                match TxParams::parse(&request.params) {
                    Ok(tx) => {
                        findings.extend(self.transaction_findings(&tx, chain_id).await);
                        if let (Some(chain_id), Some(from)) = (chain_id, tx.from.or(account)) {
                            plan.simulation = Some((chain_id, from, tx));
                        }
                    }
                    Err(e) => findings.push(malformed(e)),
                }
            }
        }

        let mut notes = Vec::new();
        self.origin_findings(&request.origin, &mut findings, &mut notes, &mut plan)
            .await;
        self.finish(request.id, findings, notes, plan).await
    }

    /// Assess a transaction the local user is about to send.
    pub async fn assess_intent(&self, intent: &TransactionIntent) -> RiskAssessment {
        let mut findings = self
            .transaction_findings(&intent.tx, Some(intent.chain_id))
            .await;
        let mut notes = Vec::new();
        let mut plan = AsyncPlan::default();

        if let Some(origin) = &intent.origin {
            self.origin_findings(origin, &mut findings, &mut notes, &mut plan)
                .await;
        }
        if let Some(from) = intent.tx.from {
            plan.simulation = Some((intent.chain_id, from, intent.tx.clone()));
        } else {
            notes.push("Simulation skipped: sender unknown".to_string());
        }
        self.finish(0, findings, notes, plan).await
    }

    /// Assess the site behind a session proposal.
    pub async fn assess_proposal(&self, proposal: &Proposal) -> RiskAssessment {
        let mut findings = Vec::new();
        let mut notes = Vec::new();
        let mut plan = AsyncPlan::default();
        self.origin_findings(&proposal.proposer.url, &mut findings, &mut notes, &mut plan)
            .await;
        self.finish(proposal.id, findings, notes, plan).await
    }

    // =========================================================================
    // Stages
    // =========================================================================

    async fn transaction_findings(&self, tx: &TxParams, chain_id: Option<u64>) -> Vec<Finding> {
        let verified = self.verified_contracts.read().await;
        let malicious = self.malicious_addresses.read().await;
        let native_symbol = chain_id
            .and_then(network_for)
            .map(|n| n.native_symbol)
            .unwrap_or(DEFAULT_NATIVE_SYMBOL);
        let ctx = CheckContext {
            thresholds: &self.thresholds,
            verified_contracts: &verified,
            malicious_addresses: &malicious,
            native_symbol,
        };
        check_transaction(tx, &ctx)
    }

    async fn origin_findings(
        &self,
        origin: &str,
        findings: &mut Vec<Finding>,
        notes: &mut Vec<String>,
        plan: &mut AsyncPlan,
    ) {
        let list = self.phishing.read().await.clone();
        findings.extend(list.check_origin(origin));
        if let Some(note) = list.staleness_note(Utc::now()) {
            tracing::warn!(source = ?list.source, "Risk check ran against a stale phishing list");
            notes.push(note);
        }
        plan.host = host_of(origin);
    }

    /// Run the async checks concurrently and aggregate in a fixed order.
    async fn finish(
        &self,
        subject_id: u64,
        mut findings: Vec<Finding>,
        mut notes: Vec<String>,
        plan: AsyncPlan,
    ) -> RiskAssessment {
        let reputation = async {
            match (&self.reputation, &plan.host) {
                (Some(client), Some(host)) => Some((host.clone(), client.lookup(host).await)),
                _ => None,
            }
        };
        let simulation = async {
            match (&self.rpc, &plan.simulation) {
                (Some(rpc), Some((chain_id, from, tx))) => Some(
                    simulate(rpc.as_ref(), *chain_id, *from, tx, self.simulation_timeout).await,
                ),
                _ => None,
            }
        };
        let (reputation, simulation) = tokio::join!(reputation, simulation);

        match reputation {
            Some((host, Reputation::Malicious(reason))) => findings.push(Finding::danger(
                FindingKind::ReputationFlagged,
                format!("{host} is flagged by the reputation service: {reason}"),
            )),
            Some((_, Reputation::Unknown)) => {
                notes.push("Domain reputation unknown: lookup failed".to_string())
            }
            _ => {}
        }

        if let Some(outcome) = simulation {
            findings.extend(outcome.finding());
            notes.extend(outcome.note());
            if let Simulation::Passed { gas } = outcome {
                tracing::debug!(subject_id, gas, "Simulation passed");
            }
        }

        let assessment = RiskAssessment::from_findings(findings, notes);
        tracing::info!(
            subject_id,
            level = %assessment.level,
            findings = assessment.findings.len(),
            "Risk assessed"
        );
        assessment
    }
}

fn malformed(e: crate::error::BridgeError) -> Finding {
    Finding::warning(
        FindingKind::MalformedPayload,
        format!("Request parameters could not be decoded: {e}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::abi::IERC721;
    use crate::blockchain::testing::MockRpc;
    use crate::models::{ChainRef, PeerMetadata, RequestStatus};
    use crate::risk::RiskLevel;
    use alloy::primitives::address;
    use alloy::sol_types::SolCall;
    use serde_json::{json, Value};

    const ME: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    const NFT: Address = address!("5555555555555555555555555555555555555555");

    fn request(method: SigningMethod, origin: &str, params: Value) -> Request {
        let now = Utc::now();
        Request {
            id: 9,
            topic: "t1".into(),
            chain: ChainRef::evm(56),
            method,
            params,
            status: RequestStatus::Pending,
            origin: origin.into(),
            received_at: now,
            expires_at: now,
            risk: None,
        }
    }

    fn fresh_list() -> PhishingList {
        let mut list = PhishingList::builtin();
        list.source = ListSource::Live;
        list.fetched_at = Some(Utc::now());
        list
    }

    fn pipeline() -> RiskPipeline {
        RiskPipeline::new(RiskThresholds::default()).with_phishing_list(fresh_list())
    }

    #[tokio::test]
    async fn burn_address_transfer_is_danger() {
        let intent = TransactionIntent {
            chain_id: 56,
            tx: TxParams {
                to: Some(address!("000000000000000000000000000000000000dEaD")),
                value: alloy::primitives::U256::from(50u64),
                ..Default::default()
            },
            origin: None,
        };
        let assessment = pipeline().assess_intent(&intent).await;
        assert_eq!(assessment.level, RiskLevel::Danger);
        assert!(assessment.has(FindingKind::BurnAddress));
        assert!(assessment.reasons.iter().any(|r| r.contains("burn address")));
    }

    #[tokio::test]
    async fn approval_for_all_request_is_danger() {
        let data = IERC721::setApprovalForAllCall {
            operator: address!("1111111111111111111111111111111111111111"),
            approved: true,
        }
        .abi_encode();
        let req = request(
            SigningMethod::SendTransaction,
            "https://app.example",
            json!([{"from": ME.to_string(), "to": NFT.to_string(), "data": alloy::hex::encode_prefixed(data)}]),
        );
        let assessment = pipeline().assess_request(&req, Some(ME)).await;
        assert_eq!(assessment.level, RiskLevel::Danger);
        assert!(assessment.has(FindingKind::ApprovalForAll));
        assert!(assessment.has(FindingKind::UnverifiedContract));
    }

    #[tokio::test]
    async fn verified_contracts_do_not_warn() {
        let p = pipeline();
        p.verify_contract(NFT).await;
        let req = request(
            SigningMethod::SendTransaction,
            "https://app.example",
            json!([{"to": NFT.to_string(), "data": "0x12345678"}]),
        );
        let assessment = p.assess_request(&req, Some(ME)).await;
        assert_eq!(assessment.level, RiskLevel::Safe);
    }

    #[tokio::test]
    async fn plain_message_from_clean_site_is_safe() {
        let req = request(
            SigningMethod::PersonalSign,
            "https://app.example",
            json!(["0x68656c6c6f", ME.to_string()]),
        );
        let assessment = pipeline().assess_request(&req, None).await;
        assert_eq!(assessment.level, RiskLevel::Safe);
        assert!(assessment.notes.is_empty());
    }

    #[tokio::test]
    async fn phishing_origin_dominates() {
        let req = request(
            SigningMethod::PersonalSign,
            "https://metamask-wallet.org",
            json!(["hello", ME.to_string()]),
        );
        let assessment = pipeline().assess_request(&req, None).await;
        assert_eq!(assessment.level, RiskLevel::Danger);
        assert!(assessment.has(FindingKind::PhishingDomain));
    }

    #[tokio::test]
    async fn stale_list_adds_note_without_escalating() {
        let p = RiskPipeline::new(RiskThresholds::default());
        let req = request(
            SigningMethod::PersonalSign,
            "https://app.example",
            json!(["hello", ME.to_string()]),
        );
        let assessment = p.assess_request(&req, None).await;
        assert_eq!(assessment.level, RiskLevel::Safe);
        assert_eq!(assessment.notes.len(), 1);
    }

    #[test]
    fn from_config_builds_http_clients() {
        let config = crate::config::BridgeConfig {
            reputation_api_url: Some("http://127.0.0.1:9/check".into()),
            ..crate::config::BridgeConfig::default()
        };
        assert!(RiskPipeline::from_config(&config, None, None).is_ok());
    }

    #[tokio::test]
    async fn unreachable_reputation_is_unknown_not_unsafe() {
        let p = pipeline().with_reputation(
            ReputationClient::new("http://127.0.0.1:9/check", Duration::from_millis(200))
                .unwrap(),
        );
        let req = request(
            SigningMethod::PersonalSign,
            "https://app.example",
            json!(["hello", ME.to_string()]),
        );
        let assessment = p.assess_request(&req, None).await;
        assert_eq!(assessment.level, RiskLevel::Safe);
        assert!(assessment.notes.iter().any(|n| n.contains("reputation")));
    }

    #[tokio::test]
    async fn simulation_revert_follows_sync_findings() {
        let rpc = Arc::new(MockRpc::reverting(&[56], "ERC20: transfer amount exceeds balance"));
        let p = pipeline().with_simulation(rpc, Duration::from_secs(1));
        let req = request(
            SigningMethod::SendTransaction,
            "https://app.example",
            json!([{"to": NFT.to_string(), "data": "0x12345678"}]),
        );
        let assessment = p.assess_request(&req, Some(ME)).await;
        assert_eq!(assessment.level, RiskLevel::Danger);
        let last = assessment.findings.last().unwrap();
        assert_eq!(last.kind, FindingKind::SimulationReverted);
        assert!(last.reason.contains("exceeds balance"));
        assert_eq!(assessment.findings[0].kind, FindingKind::UnverifiedContract);
    }

    #[tokio::test]
    async fn malformed_params_warn() {
        let req = request(SigningMethod::SendTransaction, "https://app.example", json!([]));
        let assessment = pipeline().assess_request(&req, None).await;
        assert_eq!(assessment.level, RiskLevel::Warning);
        assert!(assessment.has(FindingKind::MalformedPayload));
    }

    #[tokio::test]
    async fn permit_typed_data_is_danger() {
        let typed = json!({
            "types": {"Permit": [{"name": "spender", "type": "address"}]},
            "primaryType": "Permit",
            "domain": {"name": "Token", "chainId": 56},
            "message": {"spender": "0x1111111111111111111111111111111111111111", "value": "1"}
        });
        let req = request(
            SigningMethod::SignTypedDataV4,
            "https://app.example",
            json!([ME.to_string(), typed]),
        );
        let assessment = pipeline().assess_request(&req, None).await;
        assert!(assessment.has(FindingKind::PermitSignature));
        assert!(assessment.is_danger());
    }

    #[tokio::test]
    async fn proposal_from_typosquat_is_danger() {
        let proposal = Proposal {
            id: 1,
            pairing_topic: "p1".into(),
            proposer: PeerMetadata {
                name: "PancakeSwap".into(),
                url: "https://pancakeswap-finance.net".into(),
                ..Default::default()
            },
            required_namespaces: Default::default(),
            optional_namespaces: Default::default(),
            expiry: None,
        };
        let assessment = pipeline().assess_proposal(&proposal).await;
        assert!(assessment.is_danger());
    }
}

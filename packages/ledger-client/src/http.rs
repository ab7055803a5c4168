//! REST gateway implementation of [`LedgerClient`].
//!
//! The gateway exposes each contract under
//! `{base}/contract/{chain}/{address}/...` and wraps every payload in a
//! `{"result": ...}` envelope. Writes name the signing wallet in the
//! `x-backend-wallet-address` header.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::provision::{Deployment, DropMetadata, NftMetadata, Provisioner, TokenMetadata};
use crate::types::{
    Choice, ContractAddresses, Identity, PendingTx, Proposal, ProposalId, Session, TokenAmount,
    TokenId, TxHash,
};
use crate::LedgerClient;

const SIGNER_HEADER: &str = "x-backend-wallet-address";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxSubmitted {
    tx_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxStatus {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HolderBalance {
    holder: String,
    balance: TokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposalWire {
    proposal_id: String,
    description: String,
    #[serde(default)]
    votes: Vec<ProposalVoteWire>,
}

#[derive(Debug, Deserialize)]
struct ProposalVoteWire {
    #[serde(rename = "type")]
    kind: u8,
    label: String,
    count: TokenAmount,
}

impl From<ProposalWire> for Proposal {
    fn from(wire: ProposalWire) -> Self {
        let mut vote_counts = HashMap::with_capacity(wire.votes.len());
        let mut choices = Vec::with_capacity(wire.votes.len());
        for vote in wire.votes {
            vote_counts.insert(vote.label.clone(), vote.count);
            choices.push(Choice::new(vote.kind, vote.label));
        }
        Proposal {
            id: ProposalId::new(wire.proposal_id),
            description: wire.description,
            choices,
            vote_counts,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WalletChain {
    chain: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimRequest<'a> {
    token_id: &'a str,
    quantity: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoteRequest<'a> {
    proposal_id: &'a str,
    vote_type: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataWire<'a> {
    name: &'a str,
    description: &'a str,
    /// Base64-encoded image bytes.
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    primary_sale_recipient: Option<&'a str>,
}

/// Ledger client backed by the REST gateway.
#[derive(Clone)]
pub struct HttpLedger {
    client: Client,
    base_url: String,
    chain: String,
    access_token: Option<String>,
    contracts: ContractAddresses,
    poll_interval: Duration,
}

impl HttpLedger {
    pub fn new(
        base_url: impl Into<String>,
        chain: impl Into<String>,
        contracts: ContractAddresses,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            chain: chain.into(),
            access_token: None,
            contracts,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Send a bearer token with every request.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// How often `wait_for_confirmation` polls the transaction status.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn contracts(&self) -> &ContractAddresses {
        &self.contracts
    }

    /// Network the given wallet is currently connected to.
    pub async fn wallet_chain(&self, wallet: &Identity) -> Result<String> {
        let url = format!("{}/backend-wallet/{}/chain", self.base_url, wallet);
        let chain: WalletChain = self.execute(self.client.get(&url)).await?;
        Ok(chain.chain)
    }

    fn contract_url(&self, address: &str, path: &str) -> String {
        format!(
            "{}/contract/{}/{}/{}",
            self.base_url, self.chain, address, path
        )
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        debug!(url, "ledger read");
        self.execute(self.client.get(url).query(query)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        signer: Option<&Identity>,
        body: &B,
    ) -> Result<T> {
        debug!(url, signer = ?signer.map(Identity::as_str), "ledger write");
        let mut request = self.client.post(url).json(body);
        if let Some(signer) = signer {
            request = request.header(SIGNER_HEADER, signer.as_str());
        }
        self.execute(request).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let request = match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LedgerError::from_status(status.as_u16(), body));
        }

        let envelope: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| LedgerError::network(format!("malformed gateway response: {}", e)))?;
        Ok(envelope.result)
    }

    async fn submit<B: Serialize + ?Sized>(
        &self,
        url: &str,
        session: &Session,
        body: &B,
    ) -> Result<PendingTx> {
        let submitted: TxSubmitted = self.post(url, Some(session.signer()), body).await?;
        Ok(PendingTx {
            hash: TxHash::new(submitted.tx_hash),
            signer: session.signer().clone(),
        })
    }

    async fn deploy(&self, kind: &str, body: &impl Serialize) -> Result<Deployment> {
        let url = format!("{}/deploy/{}/prebuilts/{}", self.base_url, self.chain, kind);
        self.post(&url, None, body).await
    }
}

#[async_trait]
impl LedgerClient for HttpLedger {
    async fn holder_addresses(&self, token_id: &TokenId) -> Result<Vec<Identity>> {
        let url = self.contract_url(&self.contracts.drop, "erc1155/claimers");
        self.get(&url, &[("tokenId", token_id.as_str())]).await
    }

    async fn balance(&self, identity: &Identity) -> Result<TokenAmount> {
        let url = self.contract_url(&self.contracts.token, "erc20/balance-of");
        self.get(&url, &[("walletAddress", identity.as_str())]).await
    }

    async fn all_balances(&self) -> Result<HashMap<Identity, TokenAmount>> {
        let url = self.contract_url(&self.contracts.token, "erc20/holder-balances");
        let rows: Vec<HolderBalance> = self.get(&url, &[]).await?;
        Ok(rows
            .into_iter()
            .map(|row| (Identity::new(row.holder), row.balance))
            .collect())
    }

    async fn owned_count(&self, identity: &Identity, token_id: &TokenId) -> Result<u64> {
        let url = self.contract_url(&self.contracts.drop, "erc1155/balance-of");
        let count: TokenAmount = self
            .get(
                &url,
                &[
                    ("walletAddress", identity.as_str()),
                    ("tokenId", token_id.as_str()),
                ],
            )
            .await?;
        Ok(u64::try_from(count.base_units()).unwrap_or(u64::MAX))
    }

    async fn claim(
        &self,
        session: &Session,
        token_id: &TokenId,
        quantity: u64,
    ) -> Result<PendingTx> {
        let url = self.contract_url(&self.contracts.drop, "erc1155/claim");
        let body = ClaimRequest {
            token_id: token_id.as_str(),
            quantity,
        };
        self.submit(&url, session, &body).await
    }

    async fn list_proposals(&self) -> Result<Vec<Proposal>> {
        let url = self.contract_url(&self.contracts.vote, "vote/proposals");
        let wire: Vec<ProposalWire> = self.get(&url, &[]).await?;
        Ok(wire.into_iter().map(Proposal::from).collect())
    }

    async fn has_voted(&self, proposal_id: &ProposalId, identity: &Identity) -> Result<bool> {
        let url = self.contract_url(&self.contracts.vote, "vote/has-voted");
        self.get(
            &url,
            &[
                ("proposalId", proposal_id.as_str()),
                ("walletAddress", identity.as_str()),
            ],
        )
        .await
    }

    async fn cast_vote(
        &self,
        session: &Session,
        proposal_id: &ProposalId,
        choice: &Choice,
    ) -> Result<PendingTx> {
        let url = self.contract_url(&self.contracts.vote, "vote/cast");
        let body = VoteRequest {
            proposal_id: proposal_id.as_str(),
            vote_type: choice.kind,
        };
        self.submit(&url, session, &body).await
    }

    async fn wait_for_confirmation(&self, tx: &PendingTx) -> Result<()> {
        let url = format!("{}/transaction/{}/{}", self.base_url, self.chain, tx.hash);
        loop {
            let status: TxStatus = self.get(&url, &[]).await?;
            match status.status.as_str() {
                "mined" => return Ok(()),
                "reverted" | "errored" | "cancelled" => {
                    let reason = status
                        .error_message
                        .unwrap_or_else(|| format!("transaction {}", status.status));
                    return Err(LedgerError::reverted(reason));
                }
                _ => {
                    debug!(tx = %tx.hash, status = %status.status, "transaction still pending");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl Provisioner for HttpLedger {
    async fn deploy_drop(&self, metadata: DropMetadata) -> Result<Deployment> {
        let body = MetadataWire {
            name: &metadata.name,
            description: &metadata.description,
            image: STANDARD.encode(&metadata.image),
            primary_sale_recipient: Some(&metadata.primary_sale_recipient),
        };
        self.deploy("edition-drop", &body).await
    }

    async fn create_batch(
        &self,
        drop_address: &str,
        nfts: Vec<NftMetadata>,
    ) -> Result<Deployment> {
        let url = self.contract_url(drop_address, "erc1155/lazy-mint");
        let body: Vec<MetadataWire<'_>> = nfts
            .iter()
            .map(|nft| MetadataWire {
                name: &nft.name,
                description: &nft.description,
                image: STANDARD.encode(&nft.image),
                primary_sale_recipient: None,
            })
            .collect();
        self.post(&url, None, &body).await
    }

    async fn deploy_token(&self, metadata: TokenMetadata) -> Result<Deployment> {
        self.deploy("token", &metadata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> HttpLedger {
        HttpLedger::new(
            "https://gateway.example/",
            "rinkeby",
            ContractAddresses {
                drop: "0xdrop".into(),
                token: "0xtoken".into(),
                vote: "0xvote".into(),
            },
        )
    }

    #[test]
    fn test_contract_url_strips_trailing_slash() {
        assert_eq!(
            ledger().contract_url("0xdrop", "erc1155/claimers"),
            "https://gateway.example/contract/rinkeby/0xdrop/erc1155/claimers"
        );
    }

    #[test]
    fn test_proposal_wire_keeps_choice_order_and_counts() {
        let json = r#"{
            "proposalId": "42",
            "description": "Should the DAO mint an additional 420,000 tokens?",
            "votes": [
                {"type": 0, "label": "Against", "count": "0"},
                {"type": 1, "label": "For", "count": "5000000000000000000"},
                {"type": 2, "label": "Abstain", "count": 0}
            ]
        }"#;
        let wire: ProposalWire = serde_json::from_str(json).unwrap();
        let proposal = Proposal::from(wire);

        assert_eq!(proposal.id, ProposalId::new("42"));
        let labels: Vec<_> = proposal.choices.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Against", "For", "Abstain"]);
        assert_eq!(proposal.votes_for("For"), TokenAmount::from_tokens(5));
    }

    #[test]
    fn test_proposal_without_votes_is_valid() {
        let wire: ProposalWire =
            serde_json::from_str(r#"{"proposalId": "7", "description": "empty"}"#).unwrap();
        let proposal = Proposal::from(wire);
        assert!(proposal.choices.is_empty());
    }

    #[test]
    fn test_tx_status_parses_error_message() {
        let status: ApiResponse<TxStatus> = serde_json::from_str(
            r#"{"result": {"status": "reverted", "errorMessage": "already claimed"}}"#,
        )
        .unwrap();
        assert_eq!(status.result.status, "reverted");
        assert_eq!(status.result.error_message.as_deref(), Some("already claimed"));
    }

    #[test]
    fn test_metadata_wire_uses_camel_case() {
        let body = MetadataWire {
            name: "DAO Member",
            description: "Membership NFT",
            image: String::new(),
            primary_sale_recipient: Some("0x0000000000000000000000000000000000000000"),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("primarySaleRecipient").is_some());
        assert!(json.get("primary_sale_recipient").is_none());
    }
}

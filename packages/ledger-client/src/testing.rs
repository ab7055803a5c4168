//! In-memory ledger for tests.
//!
//! [`MemoryLedger`] keeps holders, balances, proposals and votes in memory,
//! applies writes only when their confirmation succeeds, and lets tests
//! inject failures and latency per operation.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{LedgerError, Result};
use crate::provision::{Deployment, DropMetadata, NftMetadata, Provisioner, TokenMetadata};
use crate::types::{
    Choice, Identity, PendingTx, Proposal, ProposalId, Session, TokenAmount, TokenId, TxHash,
};
use crate::LedgerClient;

/// Operations that can be counted, delayed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    HolderAddresses,
    Balance,
    AllBalances,
    OwnedCount,
    Claim,
    ListProposals,
    HasVoted,
    CastVote,
    Confirm,
    Provision,
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Claim {
        signer: Identity,
        token_id: TokenId,
        quantity: u64,
    },
    Vote {
        signer: Identity,
        proposal_id: ProposalId,
        label: String,
    },
}

#[derive(Default)]
struct State {
    holders: HashMap<TokenId, Vec<Identity>>,
    balances: HashMap<Identity, TokenAmount>,
    owned: HashMap<(Identity, TokenId), u64>,
    proposals: Vec<Proposal>,
    votes: HashSet<(ProposalId, Identity)>,
    pending: HashMap<TxHash, PendingWrite>,
    failures: HashMap<LedgerOp, VecDeque<LedgerError>>,
    latency: HashMap<LedgerOp, Duration>,
    calls: HashMap<LedgerOp, usize>,
    deployments: Vec<Deployment>,
    next_tx: u64,
}

/// Mock ledger with configurable state, failures and latency.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the code under test owns another.
///
/// # Example
///
/// ```rust,ignore
/// let ledger = MemoryLedger::new()
///     .with_holder("0xA")
///     .with_holder("0xB")
///     .with_balance("0xA", TokenAmount::from_tokens(10));
///
/// ledger.fail_next(LedgerOp::OwnedCount, LedgerError::network("reset"));
/// ```
#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<State>>,
    default_latency: Duration,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    /// Delay one kind of call, overriding the default latency.
    pub fn with_op_latency(self, op: LedgerOp, latency: Duration) -> Self {
        self.set_op_latency(op, latency);
        self
    }

    /// Add a claimer of the gating token `0` who owns one copy.
    pub fn with_holder(self, address: &str) -> Self {
        self.add_holder(&TokenId::default(), Identity::new(address));
        self
    }

    /// Add a claimer to the holder list without giving them ownership.
    pub fn with_listed_holder(self, address: &str) -> Self {
        let mut state = self.state.lock().unwrap();
        state
            .holders
            .entry(TokenId::default())
            .or_default()
            .push(Identity::new(address));
        drop(state);
        self
    }

    pub fn with_balance(self, address: &str, amount: TokenAmount) -> Self {
        self.set_balance(Identity::new(address), amount);
        self
    }

    pub fn with_proposal(self, proposal: Proposal) -> Self {
        self.state.lock().unwrap().proposals.push(proposal);
        self
    }

    pub fn with_vote(self, proposal_id: &str, voter: &str) -> Self {
        self.record_vote(ProposalId::new(proposal_id), Identity::new(voter));
        self
    }

    pub fn set_op_latency(&self, op: LedgerOp, latency: Duration) {
        self.state.lock().unwrap().latency.insert(op, latency);
    }

    pub fn add_holder(&self, token_id: &TokenId, identity: Identity) {
        let mut state = self.state.lock().unwrap();
        *state
            .owned
            .entry((identity.clone(), token_id.clone()))
            .or_default() += 1;
        let holders = state.holders.entry(token_id.clone()).or_default();
        if !holders.contains(&identity) {
            holders.push(identity);
        }
    }

    pub fn set_owned(&self, identity: Identity, token_id: &TokenId, count: u64) {
        self.state
            .lock()
            .unwrap()
            .owned
            .insert((identity, token_id.clone()), count);
    }

    pub fn set_balance(&self, identity: Identity, amount: TokenAmount) {
        self.state.lock().unwrap().balances.insert(identity, amount);
    }

    pub fn record_vote(&self, proposal_id: ProposalId, voter: Identity) {
        self.state.lock().unwrap().votes.insert((proposal_id, voter));
    }

    /// Make the next call of `op` fail with `err`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, op: LedgerOp, err: LedgerError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Number of times `op` was called, including failed calls.
    pub fn call_count(&self, op: LedgerOp) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    pub fn owned(&self, identity: &Identity, token_id: &TokenId) -> u64 {
        self.state
            .lock()
            .unwrap()
            .owned
            .get(&(identity.clone(), token_id.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn has_vote(&self, proposal_id: &ProposalId, voter: &Identity) -> bool {
        self.state
            .lock()
            .unwrap()
            .votes
            .contains(&(proposal_id.clone(), voter.clone()))
    }

    pub fn deployments(&self) -> Vec<Deployment> {
        self.state.lock().unwrap().deployments.clone()
    }

    /// Count the call, wait out the configured latency, then pop a queued
    /// failure if there is one.
    async fn enter(&self, op: LedgerOp) -> Result<()> {
        let latency = {
            let mut state = self.state.lock().unwrap();
            *state.calls.entry(op).or_default() += 1;
            state
                .latency
                .get(&op)
                .copied()
                .unwrap_or(self.default_latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().unwrap();
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn submit(&self, signer: &Identity, write: PendingWrite) -> PendingTx {
        let mut state = self.state.lock().unwrap();
        state.next_tx += 1;
        let hash = TxHash::new(format!("0xtx{:04}", state.next_tx));
        state.pending.insert(hash.clone(), write);
        PendingTx {
            hash,
            signer: signer.clone(),
        }
    }

    fn apply(state: &mut State, write: PendingWrite) {
        match write {
            PendingWrite::Claim {
                signer,
                token_id,
                quantity,
            } => {
                *state
                    .owned
                    .entry((signer.clone(), token_id.clone()))
                    .or_default() += quantity;
                let holders = state.holders.entry(token_id).or_default();
                if !holders.contains(&signer) {
                    holders.push(signer);
                }
            }
            PendingWrite::Vote {
                signer,
                proposal_id,
                label,
            } => {
                let weight = state.balances.get(&signer).copied().unwrap_or_default();
                if let Some(proposal) = state.proposals.iter_mut().find(|p| p.id == proposal_id) {
                    let count = proposal.vote_counts.entry(label).or_default();
                    *count = count.saturating_add(weight);
                }
                state.votes.insert((proposal_id, signer));
            }
        }
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn holder_addresses(&self, token_id: &TokenId) -> Result<Vec<Identity>> {
        self.enter(LedgerOp::HolderAddresses).await?;
        let state = self.state.lock().unwrap();
        Ok(state.holders.get(token_id).cloned().unwrap_or_default())
    }

    async fn balance(&self, identity: &Identity) -> Result<TokenAmount> {
        self.enter(LedgerOp::Balance).await?;
        let state = self.state.lock().unwrap();
        Ok(state.balances.get(identity).copied().unwrap_or_default())
    }

    async fn all_balances(&self) -> Result<HashMap<Identity, TokenAmount>> {
        self.enter(LedgerOp::AllBalances).await?;
        Ok(self.state.lock().unwrap().balances.clone())
    }

    async fn owned_count(&self, identity: &Identity, token_id: &TokenId) -> Result<u64> {
        self.enter(LedgerOp::OwnedCount).await?;
        Ok(self.owned(identity, token_id))
    }

    async fn claim(
        &self,
        session: &Session,
        token_id: &TokenId,
        quantity: u64,
    ) -> Result<PendingTx> {
        self.enter(LedgerOp::Claim).await?;
        Ok(self.submit(
            session.signer(),
            PendingWrite::Claim {
                signer: session.signer().clone(),
                token_id: token_id.clone(),
                quantity,
            },
        ))
    }

    async fn list_proposals(&self) -> Result<Vec<Proposal>> {
        self.enter(LedgerOp::ListProposals).await?;
        Ok(self.state.lock().unwrap().proposals.clone())
    }

    async fn has_voted(&self, proposal_id: &ProposalId, identity: &Identity) -> Result<bool> {
        self.enter(LedgerOp::HasVoted).await?;
        Ok(self.has_vote(proposal_id, identity))
    }

    async fn cast_vote(
        &self,
        session: &Session,
        proposal_id: &ProposalId,
        choice: &Choice,
    ) -> Result<PendingTx> {
        self.enter(LedgerOp::CastVote).await?;
        if self.has_vote(proposal_id, session.signer()) {
            return Err(LedgerError::reverted("Governor: vote already cast"));
        }
        Ok(self.submit(
            session.signer(),
            PendingWrite::Vote {
                signer: session.signer().clone(),
                proposal_id: proposal_id.clone(),
                label: choice.label.clone(),
            },
        ))
    }

    async fn wait_for_confirmation(&self, tx: &PendingTx) -> Result<()> {
        let outcome = self.enter(LedgerOp::Confirm).await;
        let mut state = self.state.lock().unwrap();
        let write = state
            .pending
            .remove(&tx.hash)
            .ok_or_else(|| LedgerError::reverted(format!("unknown transaction {}", tx.hash)))?;
        outcome?;
        Self::apply(&mut state, write);
        Ok(())
    }
}

#[async_trait]
impl Provisioner for MemoryLedger {
    async fn deploy_drop(&self, metadata: DropMetadata) -> Result<Deployment> {
        self.enter(LedgerOp::Provision).await?;
        let mut state = self.state.lock().unwrap();
        let deployment = Deployment {
            address: format!("0xdrop{:02}", state.deployments.len() + 1),
            metadata: serde_json::json!({
                "name": metadata.name,
                "description": metadata.description,
                "primary_sale_recipient": metadata.primary_sale_recipient,
            }),
        };
        state.deployments.push(deployment.clone());
        Ok(deployment)
    }

    async fn create_batch(
        &self,
        drop_address: &str,
        nfts: Vec<NftMetadata>,
    ) -> Result<Deployment> {
        self.enter(LedgerOp::Provision).await?;
        let names: Vec<_> = nfts.iter().map(|nft| nft.name.clone()).collect();
        Ok(Deployment {
            address: drop_address.to_string(),
            metadata: serde_json::json!({ "created": names }),
        })
    }

    async fn deploy_token(&self, metadata: TokenMetadata) -> Result<Deployment> {
        self.enter(LedgerOp::Provision).await?;
        let mut state = self.state.lock().unwrap();
        let deployment = Deployment {
            address: format!("0xtoken{:02}", state.deployments.len() + 1),
            metadata: serde_json::json!({ "name": metadata.name, "symbol": metadata.symbol }),
        };
        state.deployments.push(deployment.clone());
        Ok(deployment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(address: &str) -> Session {
        Session::new(Identity::new(address), 1)
    }

    #[tokio::test]
    async fn test_claim_applies_only_after_confirmation() {
        let ledger = MemoryLedger::new();
        let me = Identity::new("0xA");
        let token = TokenId::default();

        let tx = ledger.claim(&session("0xA"), &token, 1).await.unwrap();
        assert_eq!(ledger.owned_count(&me, &token).await.unwrap(), 0);

        ledger.wait_for_confirmation(&tx).await.unwrap();
        assert_eq!(ledger.owned_count(&me, &token).await.unwrap(), 1);
        assert_eq!(ledger.holder_addresses(&token).await.unwrap(), vec![me]);
    }

    #[tokio::test]
    async fn test_reverted_confirmation_drops_the_write() {
        let ledger = MemoryLedger::new();
        ledger.fail_next(LedgerOp::Confirm, LedgerError::reverted("out of gas"));

        let tx = ledger
            .claim(&session("0xA"), &TokenId::default(), 1)
            .await
            .unwrap();
        let err = ledger.wait_for_confirmation(&tx).await.unwrap_err();

        assert!(matches!(err, LedgerError::Reverted { .. }));
        assert_eq!(ledger.owned(&Identity::new("0xA"), &TokenId::default()), 0);
    }

    #[tokio::test]
    async fn test_confirmed_vote_adds_weight() {
        let ledger = MemoryLedger::new()
            .with_balance("0xA", TokenAmount::from_tokens(7))
            .with_proposal(Proposal::new("1", "Fund the treasury").with_standard_choices());
        let proposal_id = ProposalId::new("1");

        let tx = ledger
            .cast_vote(&session("0xA"), &proposal_id, &Choice::new(1, "For"))
            .await
            .unwrap();
        ledger.wait_for_confirmation(&tx).await.unwrap();

        let proposals = ledger.list_proposals().await.unwrap();
        assert_eq!(proposals[0].votes_for("For"), TokenAmount::from_tokens(7));
        assert!(ledger
            .has_voted(&proposal_id, &Identity::new("0xA"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_queued_failures_are_consumed_in_order() {
        let ledger = MemoryLedger::new();
        ledger.fail_next(LedgerOp::ListProposals, LedgerError::network("first"));

        assert!(ledger.list_proposals().await.is_err());
        assert!(ledger.list_proposals().await.unwrap().is_empty());
        assert_eq!(ledger.call_count(LedgerOp::ListProposals), 2);
    }

    #[tokio::test]
    async fn test_provisioning_records_deployments() {
        let ledger = MemoryLedger::new();
        let drop = ledger
            .deploy_drop(DropMetadata::free("SecretDAO Membership", "ask", vec![1, 2, 3]))
            .await
            .unwrap();
        let token = ledger
            .deploy_token(TokenMetadata {
                name: "SecretDAO Governance Token".into(),
                symbol: "SHH".into(),
            })
            .await
            .unwrap();

        assert_ne!(drop.address, token.address);
        assert_eq!(ledger.deployments().len(), 2);
    }
}

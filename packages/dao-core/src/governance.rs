//! Proposals and per-identity vote status.
//!
//! Each (identity, proposal) pair runs its own state machine:
//!
//! ```text
//! NotVoted ──cast_vote──► Pending ──confirmed──► Confirmed
//!     ▲                      │
//!     └──────reverted────────┘
//! ```
//!
//! `Pending` is taken atomically before any ledger call, so a second vote
//! racing the first one is rejected without another write.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::try_join_all;
use ledger_client::{
    Identity, LedgerClient, LedgerError, PendingTx, Proposal, ProposalId, Session,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::error::VoteError;
use crate::membership::MembershipStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VoteState {
    NotVoted,
    /// Submitted, not yet confirmed.
    Pending,
    Confirmed,
}

impl VoteState {
    pub fn has_voted(self) -> bool {
        self != Self::NotVoted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteStatus {
    pub proposal_id: ProposalId,
    pub has_voted: bool,
}

type VoteKey = (Identity, ProposalId);

#[derive(Default)]
pub struct GovernanceView {
    proposals: RwLock<Vec<Proposal>>,
    votes: DashMap<VoteKey, VoteState>,
}

impl GovernanceView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the proposal list and replace the cached one.
    pub async fn load_proposals(
        &self,
        ledger: &dyn LedgerClient,
    ) -> Result<Vec<Proposal>, LedgerError> {
        let proposals = Self::fetch_proposals(ledger).await?;
        self.install_proposals(proposals.clone());
        Ok(proposals)
    }

    /// Fetch the proposal list without touching the cache.
    ///
    /// Repeated ids keep their first occurrence.
    pub async fn fetch_proposals(ledger: &dyn LedgerClient) -> Result<Vec<Proposal>, LedgerError> {
        let fetched = ledger.list_proposals().await?;
        let mut seen = HashSet::with_capacity(fetched.len());
        let mut proposals = Vec::with_capacity(fetched.len());
        for proposal in fetched {
            if seen.insert(proposal.id.clone()) {
                proposals.push(proposal);
            } else {
                warn!(proposal_id = %proposal.id, "dropping proposal with duplicate id");
            }
        }

        debug!(count = proposals.len(), "proposals fetched");
        Ok(proposals)
    }

    /// Replace the cached proposals.
    ///
    /// Cached vote states are dropped, since they are recomputed against the
    /// new set, except for votes still pending.
    pub fn install_proposals(&self, proposals: Vec<Proposal>) {
        *self.proposals.write() = proposals;
        self.votes.retain(|_, state| *state == VoteState::Pending);
    }

    pub fn proposals(&self) -> Vec<Proposal> {
        self.proposals.read().clone()
    }

    pub fn proposal(&self, proposal_id: &ProposalId) -> Option<Proposal> {
        self.proposals
            .read()
            .iter()
            .find(|p| &p.id == proposal_id)
            .cloned()
    }

    /// Locally known state, without touching the ledger.
    pub fn cached_state(&self, identity: &Identity, proposal_id: &ProposalId) -> Option<VoteState> {
        self.votes
            .get(&(identity.clone(), proposal_id.clone()))
            .map(|s| *s)
    }

    /// Vote status for one proposal.
    ///
    /// Pending and confirmed votes answer from the cache; otherwise the
    /// ledger is asked and the answer cached.
    pub async fn vote_status(
        &self,
        ledger: &dyn LedgerClient,
        identity: &Identity,
        proposal_id: &ProposalId,
    ) -> Result<VoteStatus, LedgerError> {
        if let Some(state) = self.cached_state(identity, proposal_id) {
            if state.has_voted() {
                return Ok(VoteStatus {
                    proposal_id: proposal_id.clone(),
                    has_voted: true,
                });
            }
        }

        let has_voted = ledger.has_voted(proposal_id, identity).await?;
        let key = (identity.clone(), proposal_id.clone());
        let mut state = self.votes.entry(key).or_insert(VoteState::NotVoted);
        // A vote submitted while we were reading wins over the read.
        if *state != VoteState::Pending {
            *state = if has_voted {
                VoteState::Confirmed
            } else {
                VoteState::NotVoted
            };
        }
        let has_voted = state.has_voted();
        drop(state);

        Ok(VoteStatus {
            proposal_id: proposal_id.clone(),
            has_voted,
        })
    }

    /// Vote status for every loaded proposal, queried concurrently.
    pub async fn vote_statuses(
        &self,
        ledger: &dyn LedgerClient,
        identity: &Identity,
    ) -> Result<Vec<VoteStatus>, LedgerError> {
        let ids: Vec<ProposalId> = self.proposals.read().iter().map(|p| p.id.clone()).collect();
        try_join_all(
            ids.iter()
                .map(|proposal_id| self.vote_status(ledger, identity, proposal_id)),
        )
        .await
    }

    /// Vote status for the first proposal only, `None` when there are none.
    pub async fn current_vote_status(
        &self,
        ledger: &dyn LedgerClient,
        identity: &Identity,
    ) -> Result<Option<VoteStatus>, LedgerError> {
        let first = self.proposals.read().first().map(|p| p.id.clone());
        match first {
            Some(proposal_id) => self
                .vote_status(ledger, identity, &proposal_id)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// Submit a vote from the session signer.
    ///
    /// On success the pair is left `Pending`; call [`Self::confirm_vote`]
    /// with the returned transaction to settle it.
    pub async fn cast_vote(
        &self,
        ledger: &dyn LedgerClient,
        session: &Session,
        membership: MembershipStatus,
        proposal_id: &ProposalId,
        choice: &str,
    ) -> Result<PendingTx, VoteError> {
        if !membership.is_member() {
            return Err(VoteError::NotAMember);
        }
        let proposal = self
            .proposal(proposal_id)
            .ok_or_else(|| VoteError::UnknownProposal(proposal_id.clone()))?;
        let choice = proposal
            .choice(choice)
            .cloned()
            .ok_or_else(|| VoteError::UnknownChoice {
                proposal_id: proposal_id.clone(),
                choice: choice.to_string(),
            })?;

        let identity = session.signer();
        let key = (identity.clone(), proposal_id.clone());
        self.reserve(&key)?;

        match ledger.has_voted(proposal_id, identity).await {
            Ok(true) => {
                self.votes.insert(key, VoteState::Confirmed);
                return Err(VoteError::AlreadyVoted);
            }
            Ok(false) => {}
            Err(err) => {
                self.votes.insert(key, VoteState::NotVoted);
                return Err(err.into());
            }
        }

        match ledger.cast_vote(session, proposal_id, &choice).await {
            Ok(tx) => {
                info!(
                    identity = %identity,
                    proposal_id = %proposal_id,
                    choice = %choice.label,
                    tx = %tx.hash,
                    "vote submitted"
                );
                Ok(tx)
            }
            Err(err) => {
                warn!(identity = %identity, proposal_id = %proposal_id, error = %err, "vote submit failed");
                self.votes.insert(key, VoteState::NotVoted);
                Err(err.into())
            }
        }
    }

    /// Wait for a submitted vote and settle its state.
    ///
    /// When the transaction fails, the ledger is asked again whether the vote
    /// landed; only if it did not is the optimistic `Pending` rolled back.
    pub async fn confirm_vote(
        &self,
        ledger: &dyn LedgerClient,
        proposal_id: &ProposalId,
        tx: &PendingTx,
    ) -> Result<(), VoteError> {
        let identity = &tx.signer;
        let key = (identity.clone(), proposal_id.clone());

        let err = match ledger.wait_for_confirmation(tx).await {
            Ok(()) => {
                info!(identity = %identity, proposal_id = %proposal_id, "vote confirmed");
                self.votes.insert(key, VoteState::Confirmed);
                return Ok(());
            }
            Err(err) => err,
        };

        match ledger.has_voted(proposal_id, identity).await {
            Ok(true) => {
                info!(identity = %identity, proposal_id = %proposal_id, "vote landed despite failed confirmation");
                self.votes.insert(key, VoteState::Confirmed);
                Ok(())
            }
            Ok(false) => {
                warn!(identity = %identity, proposal_id = %proposal_id, error = %err, "vote failed, rolling back");
                self.votes.insert(key, VoteState::NotVoted);
                Err(err.into())
            }
            Err(read_err) => {
                warn!(
                    identity = %identity,
                    proposal_id = %proposal_id,
                    error = %err,
                    read_error = %read_err,
                    "vote failed and could not be re-checked, rolling back"
                );
                self.votes.insert(key, VoteState::NotVoted);
                Err(err.into())
            }
        }
    }

    /// Forget proposals and vote states (new session), keeping votes still
    /// pending so they cannot be cast twice.
    pub fn reset(&self) {
        self.proposals.write().clear();
        self.votes.retain(|_, state| *state == VoteState::Pending);
    }

    fn reserve(&self, key: &VoteKey) -> Result<(), VoteError> {
        match self.votes.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().has_voted() {
                    return Err(VoteError::AlreadyVoted);
                }
                entry.insert(VoteState::Pending);
            }
            Entry::Vacant(entry) => {
                entry.insert(VoteState::Pending);
            }
        }
        Ok(())
    }
}

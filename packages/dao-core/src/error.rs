//! Typed failures of the DAO workflows.
//!
//! Every workflow error is `Clone` so the controller can keep the latest one
//! as observable state and broadcast it to subscribers.

use ledger_client::{LedgerError, ProposalId};
use thiserror::Error;

/// Building the member roster failed; wraps the first ledger failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to build member roster: {0}")]
pub struct AggregationError(#[from] pub LedgerError);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    /// A claim for this identity is already outstanding.
    #[error("a claim is already in progress")]
    AlreadyInProgress,

    #[error("membership NFT already claimed")]
    AlreadyClaimed,

    #[error("no wallet connected")]
    NotConnected,

    #[error("claim transaction reverted: {reason}")]
    Reverted { reason: String },

    #[error("claim failed: {reason}")]
    NetworkFailure { reason: String },
}

impl From<LedgerError> for ClaimError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Reverted { reason } => Self::Reverted { reason },
            other => Self::NetworkFailure {
                reason: other.reason(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("already voted on this proposal")]
    AlreadyVoted,

    #[error("only members can vote")]
    NotAMember,

    #[error("no wallet connected")]
    NotConnected,

    #[error("unknown proposal {0}")]
    UnknownProposal(ProposalId),

    #[error("proposal {proposal_id} has no choice named {choice:?}")]
    UnknownChoice {
        proposal_id: ProposalId,
        choice: String,
    },

    #[error("vote transaction reverted: {reason}")]
    Reverted { reason: String },

    #[error("vote failed: {reason}")]
    NetworkFailure { reason: String },
}

impl From<LedgerError> for VoteError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Reverted { reason } => Self::Reverted { reason },
            other => Self::NetworkFailure {
                reason: other.reason(),
            },
        }
    }
}

/// Failures of the wallet connection collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The wallet is on a different network than the contracts.
    #[error("please connect to {expected}; wallet is on {actual}")]
    UnsupportedNetwork { expected: String, actual: String },

    #[error("wallet connection failed: {0}")]
    Failed(String),
}

/// The latest failure the UI should know about, tagged by where it happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfacedError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Roster(#[from] AggregationError),

    #[error("failed to load proposals: {0}")]
    Proposals(LedgerError),

    #[error("failed to check vote status: {0}")]
    VoteStatus(LedgerError),

    #[error("failed to load token balance: {0}")]
    Balance(LedgerError),

    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error(transparent)]
    Vote(#[from] VoteError),
}

impl SurfacedError {
    /// Read failures keep the previous value on screen and can be retried
    /// with a refresh; write failures already rolled their state back.
    pub fn is_read_failure(&self) -> bool {
        matches!(
            self,
            Self::Roster(_) | Self::Proposals(_) | Self::VoteStatus(_) | Self::Balance(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_errors_map_onto_write_errors() {
        assert_eq!(
            ClaimError::from(LedgerError::reverted("sold out")),
            ClaimError::Reverted {
                reason: "sold out".into()
            }
        );
        assert!(matches!(
            ClaimError::from(LedgerError::rate_limited("429")),
            ClaimError::NetworkFailure { .. }
        ));
        assert!(matches!(
            VoteError::from(LedgerError::network("reset")),
            VoteError::NetworkFailure { .. }
        ));
    }

    #[test]
    fn test_read_failures_are_flagged() {
        let roster = SurfacedError::from(AggregationError(LedgerError::network("reset")));
        assert!(roster.is_read_failure());
        assert!(!SurfacedError::from(VoteError::AlreadyVoted).is_read_failure());
    }
}

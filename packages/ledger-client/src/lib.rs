//! Async client for the contracts behind a token-gated DAO.
//!
//! Three contracts are involved: the membership drop (an ERC-1155 whose
//! token `0` gates access), the governance token (ERC-20) and the vote
//! contract. [`LedgerClient`] is the read/write surface the rest of the
//! workspace depends on.
//!
//! # Implementations
//!
//! - [`HttpLedger`] talks to a REST gateway in front of the chain
//! - [`RetryingLedger`] adds per-call timeouts and bounded read retries
//! - `testing::MemoryLedger` (feature `testing`) keeps everything in memory
//!
//! # Example
//!
//! ```rust,ignore
//! use ledger_client::{ContractAddresses, HttpLedger, LedgerClient, RetryPolicy, RetryingLedger};
//!
//! let http = HttpLedger::new("https://gateway.example", "rinkeby", contracts);
//! let ledger = RetryingLedger::new(http, RetryPolicy::default());
//!
//! let proposals = ledger.list_proposals().await?;
//! ```

pub mod error;
pub mod http;
pub mod provision;
pub mod retry;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{LedgerError, Result};
pub use http::HttpLedger;
pub use provision::{
    Deployment, DropMetadata, NftMetadata, Provisioner, TokenMetadata, ZERO_ADDRESS,
};
pub use retry::{RetryPolicy, RetryingLedger};
pub use types::{
    Choice, ContractAddresses, Identity, PendingTx, Proposal, ProposalId, Session, TokenAmount,
    TokenId, TxHash, TOKEN_DECIMALS,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Read and write calls against the drop, token and vote contracts.
///
/// Every call is a suspension point and may fail with [`LedgerError`].
/// Implementations never return partial data: a call either yields the
/// complete answer or an error.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Addresses that claimed `token_id` from the drop, in ledger order.
    async fn holder_addresses(&self, token_id: &TokenId) -> Result<Vec<Identity>>;

    /// Governance token balance of one account.
    async fn balance(&self, identity: &Identity) -> Result<TokenAmount>;

    /// Governance token balance of every holder.
    async fn all_balances(&self) -> Result<HashMap<Identity, TokenAmount>>;

    /// How many copies of `token_id` the account owns.
    async fn owned_count(&self, identity: &Identity, token_id: &TokenId) -> Result<u64>;

    /// Submit a mint of `quantity` copies of `token_id` to the session signer.
    async fn claim(&self, session: &Session, token_id: &TokenId, quantity: u64)
        -> Result<PendingTx>;

    async fn list_proposals(&self) -> Result<Vec<Proposal>>;

    async fn has_voted(&self, proposal_id: &ProposalId, identity: &Identity) -> Result<bool>;

    /// Submit a vote from the session signer.
    async fn cast_vote(
        &self,
        session: &Session,
        proposal_id: &ProposalId,
        choice: &Choice,
    ) -> Result<PendingTx>;

    /// Wait until a submitted transaction is mined.
    ///
    /// Returns `LedgerError::Reverted` when the transaction failed on chain.
    async fn wait_for_confirmation(&self, tx: &PendingTx) -> Result<()>;
}

#[async_trait]
impl<L: LedgerClient + ?Sized> LedgerClient for Arc<L> {
    async fn holder_addresses(&self, token_id: &TokenId) -> Result<Vec<Identity>> {
        (**self).holder_addresses(token_id).await
    }

    async fn balance(&self, identity: &Identity) -> Result<TokenAmount> {
        (**self).balance(identity).await
    }

    async fn all_balances(&self) -> Result<HashMap<Identity, TokenAmount>> {
        (**self).all_balances().await
    }

    async fn owned_count(&self, identity: &Identity, token_id: &TokenId) -> Result<u64> {
        (**self).owned_count(identity, token_id).await
    }

    async fn claim(
        &self,
        session: &Session,
        token_id: &TokenId,
        quantity: u64,
    ) -> Result<PendingTx> {
        (**self).claim(session, token_id, quantity).await
    }

    async fn list_proposals(&self) -> Result<Vec<Proposal>> {
        (**self).list_proposals().await
    }

    async fn has_voted(&self, proposal_id: &ProposalId, identity: &Identity) -> Result<bool> {
        (**self).has_voted(proposal_id, identity).await
    }

    async fn cast_vote(
        &self,
        session: &Session,
        proposal_id: &ProposalId,
        choice: &Choice,
    ) -> Result<PendingTx> {
        (**self).cast_vote(session, proposal_id, choice).await
    }

    async fn wait_for_confirmation(&self, tx: &PendingTx) -> Result<()> {
        (**self).wait_for_confirmation(tx).await
    }
}

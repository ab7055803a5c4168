//! Test fixtures: a small DAO on an in-memory ledger.

use async_trait::async_trait;
use dao_core::{ConnectError, WalletConnector};
use ledger_client::testing::MemoryLedger;
use ledger_client::{
    Choice, Identity, LedgerClient, PendingTx, Proposal, ProposalId, Result as LedgerResult,
    Session, TokenAmount, TokenId,
};
use std::collections::HashMap;
use std::time::Duration;

/// Member with 10 governance tokens.
pub const ALICE: &str = "0xA11CE";
/// Member without governance tokens.
pub const BOB: &str = "0xB0B";
/// Not a member.
pub const CAROL: &str = "0xCA401";

/// Two members, one funded, and two open proposals.
pub fn dao_ledger() -> MemoryLedger {
    MemoryLedger::new()
        .with_holder(ALICE)
        .with_holder(BOB)
        .with_balance(ALICE, TokenAmount::from_tokens(10))
        .with_proposal(
            Proposal::new("P1", "Should the DAO mint an additional 420000 tokens into the treasury?")
                .with_choice(0, "no")
                .with_choice(1, "yes"),
        )
        .with_proposal(
            Proposal::new("P2", "Should the DAO transfer 1000 tokens to the founder?")
                .with_standard_choices(),
        )
}

/// Wallet that always answers the same way.
pub struct StaticWallet {
    result: Result<Identity, ConnectError>,
}

impl StaticWallet {
    pub fn connected(address: &str) -> Self {
        Self {
            result: Ok(Identity::new(address)),
        }
    }

    pub fn wrong_network(expected: &str, actual: &str) -> Self {
        Self {
            result: Err(ConnectError::UnsupportedNetwork {
                expected: expected.to_string(),
                actual: actual.to_string(),
            }),
        }
    }
}

#[async_trait]
impl WalletConnector for StaticWallet {
    async fn connect(&self) -> Result<Identity, ConnectError> {
        self.result.clone()
    }
}

/// Ledger whose ownership reads return the value seen at dispatch, after a
/// delay, like a lagging indexer. Everything else goes straight through.
pub struct StaleReadLedger {
    inner: MemoryLedger,
    delay: Duration,
}

impl StaleReadLedger {
    pub fn new(inner: MemoryLedger, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl LedgerClient for StaleReadLedger {
    async fn holder_addresses(&self, token_id: &TokenId) -> LedgerResult<Vec<Identity>> {
        self.inner.holder_addresses(token_id).await
    }

    async fn balance(&self, identity: &Identity) -> LedgerResult<TokenAmount> {
        self.inner.balance(identity).await
    }

    async fn all_balances(&self) -> LedgerResult<HashMap<Identity, TokenAmount>> {
        self.inner.all_balances().await
    }

    async fn owned_count(&self, identity: &Identity, token_id: &TokenId) -> LedgerResult<u64> {
        let count = self.inner.owned_count(identity, token_id).await;
        tokio::time::sleep(self.delay).await;
        count
    }

    async fn claim(
        &self,
        session: &Session,
        token_id: &TokenId,
        quantity: u64,
    ) -> LedgerResult<PendingTx> {
        self.inner.claim(session, token_id, quantity).await
    }

    async fn list_proposals(&self) -> LedgerResult<Vec<Proposal>> {
        self.inner.list_proposals().await
    }

    async fn has_voted(&self, proposal_id: &ProposalId, identity: &Identity) -> LedgerResult<bool> {
        self.inner.has_voted(proposal_id, identity).await
    }

    async fn cast_vote(
        &self,
        session: &Session,
        proposal_id: &ProposalId,
        choice: &Choice,
    ) -> LedgerResult<PendingTx> {
        self.inner.cast_vote(session, proposal_id, choice).await
    }

    async fn wait_for_confirmation(&self, tx: &PendingTx) -> LedgerResult<()> {
        self.inner.wait_for_confirmation(tx).await
    }
}

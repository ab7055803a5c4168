//! Timeout and retry wrapper.
//!
//! Wraps any [`LedgerClient`] so that no call can hang forever. Reads that
//! fail transiently are retried a bounded number of times; writes are never
//! retried, since a repeated submit could mint or vote twice.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{LedgerError, Result};
use crate::types::{
    Choice, Identity, PendingTx, Proposal, ProposalId, Session, TokenAmount, TokenId,
};
use crate::LedgerClient;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Upper bound for a single read or submit.
    pub call_timeout: Duration,
    /// Upper bound for waiting on a transaction to be mined.
    pub confirmation_timeout: Duration,
    /// Extra attempts for reads that failed with a retryable error.
    pub max_retries: u32,
    /// Delay before the first retry; grows linearly per attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(15),
            confirmation_timeout: Duration::from_secs(120),
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// A ledger wrapper that enforces timeouts and bounded read retries.
pub struct RetryingLedger<L: LedgerClient> {
    inner: L,
    policy: RetryPolicy,
}

impl<L: LedgerClient> RetryingLedger<L> {
    pub fn new(inner: L, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn read<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match with_timeout(op, self.policy.call_timeout, call()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    warn!(op, attempt, error = %err, "ledger read failed, retrying");
                    tokio::time::sleep(self.policy.backoff * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

async fn with_timeout<T>(
    op: &'static str,
    limit: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::network(format!(
            "{} timed out after {:?}",
            op, limit
        ))),
    }
}

#[async_trait]
impl<L: LedgerClient> LedgerClient for RetryingLedger<L> {
    async fn holder_addresses(&self, token_id: &TokenId) -> Result<Vec<Identity>> {
        self.read("holder_addresses", || self.inner.holder_addresses(token_id))
            .await
    }

    async fn balance(&self, identity: &Identity) -> Result<TokenAmount> {
        self.read("balance", || self.inner.balance(identity)).await
    }

    async fn all_balances(&self) -> Result<HashMap<Identity, TokenAmount>> {
        self.read("all_balances", || self.inner.all_balances()).await
    }

    async fn owned_count(&self, identity: &Identity, token_id: &TokenId) -> Result<u64> {
        self.read("owned_count", || self.inner.owned_count(identity, token_id))
            .await
    }

    async fn claim(
        &self,
        session: &Session,
        token_id: &TokenId,
        quantity: u64,
    ) -> Result<PendingTx> {
        with_timeout(
            "claim",
            self.policy.call_timeout,
            self.inner.claim(session, token_id, quantity),
        )
        .await
    }

    async fn list_proposals(&self) -> Result<Vec<Proposal>> {
        self.read("list_proposals", || self.inner.list_proposals()).await
    }

    async fn has_voted(&self, proposal_id: &ProposalId, identity: &Identity) -> Result<bool> {
        self.read("has_voted", || self.inner.has_voted(proposal_id, identity))
            .await
    }

    async fn cast_vote(
        &self,
        session: &Session,
        proposal_id: &ProposalId,
        choice: &Choice,
    ) -> Result<PendingTx> {
        with_timeout(
            "cast_vote",
            self.policy.call_timeout,
            self.inner.cast_vote(session, proposal_id, choice),
        )
        .await
    }

    async fn wait_for_confirmation(&self, tx: &PendingTx) -> Result<()> {
        with_timeout(
            "wait_for_confirmation",
            self.policy.confirmation_timeout,
            self.inner.wait_for_confirmation(tx),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LedgerOp, MemoryLedger};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_backoff(Duration::from_millis(1))
            .with_call_timeout(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_transient_read_failure_is_retried() {
        let mock = MemoryLedger::new().with_balance("0xA", TokenAmount::from_tokens(3));
        mock.fail_next(LedgerOp::Balance, LedgerError::network("connection reset"));
        let ledger = RetryingLedger::new(mock.clone(), fast_policy());

        let balance = ledger.balance(&Identity::new("0xA")).await.unwrap();

        assert_eq!(balance, TokenAmount::from_tokens(3));
        assert_eq!(mock.call_count(LedgerOp::Balance), 2);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mock = MemoryLedger::new();
        for _ in 0..5 {
            mock.fail_next(LedgerOp::ListProposals, LedgerError::rate_limited("429"));
        }
        let ledger = RetryingLedger::new(mock.clone(), fast_policy().with_max_retries(2));

        let err = ledger.list_proposals().await.unwrap_err();

        assert!(matches!(err, LedgerError::RateLimited { .. }));
        assert_eq!(mock.call_count(LedgerOp::ListProposals), 3);
    }

    #[tokio::test]
    async fn test_reverted_read_is_not_retried() {
        let mock = MemoryLedger::new();
        mock.fail_next(LedgerOp::AllBalances, LedgerError::reverted("bad call"));
        let ledger = RetryingLedger::new(mock.clone(), fast_policy());

        assert!(ledger.all_balances().await.is_err());
        assert_eq!(mock.call_count(LedgerOp::AllBalances), 1);
    }

    #[tokio::test]
    async fn test_writes_are_never_retried() {
        let mock = MemoryLedger::new();
        mock.fail_next(LedgerOp::Claim, LedgerError::network("connection reset"));
        let ledger = RetryingLedger::new(mock.clone(), fast_policy());
        let session = Session::new(Identity::new("0xA"), 1);

        let err = ledger
            .claim(&session, &TokenId::default(), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::NetworkFailure { .. }));
        assert_eq!(mock.call_count(LedgerOp::Claim), 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out_as_network_failure() {
        let mock = MemoryLedger::new().with_latency(Duration::from_millis(100));
        let ledger = RetryingLedger::new(
            mock,
            fast_policy()
                .with_call_timeout(Duration::from_millis(10))
                .with_max_retries(0),
        );

        let err = ledger.list_proposals().await.unwrap_err();

        assert!(matches!(err, LedgerError::NetworkFailure { .. }));
        assert!(err.reason().contains("timed out"));
    }
}

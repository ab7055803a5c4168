//! Membership status per identity.
//!
//! Ownership of the gating NFT decides membership. The resolver caches the
//! last known status for every identity and only moves it on evidence: a
//! failed read keeps what was known before.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ledger_client::{Identity, LedgerClient, TokenId};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ClaimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MembershipStatus {
    Unknown,
    NotClaimed,
    Claiming,
    Claimed,
    ClaimFailed,
}

impl MembershipStatus {
    pub fn is_member(self) -> bool {
        self == Self::Claimed
    }

    /// Whether a new claim may start from this status.
    pub fn can_claim(self) -> bool {
        matches!(self, Self::Unknown | Self::NotClaimed | Self::ClaimFailed)
    }
}

/// Resolves and caches gating-NFT ownership.
pub struct MembershipResolver {
    gating_token: TokenId,
    statuses: DashMap<Identity, MembershipStatus>,
}

impl MembershipResolver {
    pub fn new(gating_token: TokenId) -> Self {
        Self {
            gating_token,
            statuses: DashMap::new(),
        }
    }

    pub fn gating_token(&self) -> &TokenId {
        &self.gating_token
    }

    /// Last known status, `Unknown` if never resolved.
    pub fn status(&self, identity: &Identity) -> MembershipStatus {
        self.statuses
            .get(identity)
            .map(|s| *s)
            .unwrap_or(MembershipStatus::Unknown)
    }

    /// Read ownership from the ledger and update the cached status.
    ///
    /// On a failed read the previous status is returned unchanged, so a
    /// transient outage never revokes a member. A zero count does not
    /// overwrite an outstanding claim, nor a status that changed while the
    /// read was in flight.
    pub async fn resolve(&self, ledger: &dyn LedgerClient, identity: &Identity) -> MembershipStatus {
        let dispatched = self.status(identity);
        let count = match ledger.owned_count(identity, &self.gating_token).await {
            Ok(count) => count,
            Err(err) => {
                let previous = self.status(identity);
                warn!(
                    identity = %identity,
                    error = %err,
                    status = ?previous,
                    "membership check failed, keeping last known status"
                );
                return previous;
            }
        };

        let mut entry = self
            .statuses
            .entry(identity.clone())
            .or_insert(MembershipStatus::Unknown);
        let previous = *entry;
        let next = match (count, previous) {
            (n, _) if n > 0 => MembershipStatus::Claimed,
            (_, MembershipStatus::Claiming) => MembershipStatus::Claiming,
            (_, current) if current != dispatched => {
                debug!(identity = %identity, from = ?dispatched, to = ?current, "ignoring zero count read before a transition");
                current
            }
            _ => MembershipStatus::NotClaimed,
        };
        *entry = next;
        drop(entry);

        if previous != next {
            info!(identity = %identity, from = ?previous, to = ?next, count, "membership resolved");
        } else {
            debug!(identity = %identity, status = ?next, count, "membership unchanged");
        }
        next
    }

    /// Atomically move to `Claiming`.
    ///
    /// At most one claim per identity can be outstanding; the check and the
    /// transition happen under the same map shard lock.
    pub fn begin_claim(&self, identity: &Identity) -> Result<(), ClaimError> {
        match self.statuses.entry(identity.clone()) {
            Entry::Occupied(mut entry) => match *entry.get() {
                MembershipStatus::Claiming => Err(ClaimError::AlreadyInProgress),
                MembershipStatus::Claimed => Err(ClaimError::AlreadyClaimed),
                _ => {
                    entry.insert(MembershipStatus::Claiming);
                    Ok(())
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(MembershipStatus::Claiming);
                Ok(())
            }
        }
    }

    /// Optimistic transition after a confirmed mint, without a ledger read.
    pub fn mark_claimed(&self, identity: &Identity) {
        self.statuses
            .insert(identity.clone(), MembershipStatus::Claimed);
    }

    pub fn mark_claim_failed(&self, identity: &Identity) {
        self.statuses
            .insert(identity.clone(), MembershipStatus::ClaimFailed);
    }

    /// Drop cached statuses (new session), keeping claims still in flight.
    pub fn clear_settled(&self) {
        self.statuses
            .retain(|_, status| *status == MembershipStatus::Claiming);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_client::testing::{LedgerOp, MemoryLedger};
    use ledger_client::LedgerError;
    use std::time::Duration;

    fn resolver() -> MembershipResolver {
        MembershipResolver::new(TokenId::default())
    }

    #[tokio::test]
    async fn test_holder_resolves_to_claimed() {
        let ledger = MemoryLedger::new().with_holder("0xA");
        let status = resolver().resolve(&ledger, &Identity::new("0xA")).await;
        assert_eq!(status, MembershipStatus::Claimed);
    }

    #[tokio::test]
    async fn test_non_holder_resolves_to_not_claimed() {
        let ledger = MemoryLedger::new().with_holder("0xA");
        let status = resolver().resolve(&ledger, &Identity::new("0xB")).await;
        assert_eq!(status, MembershipStatus::NotClaimed);
    }

    #[tokio::test]
    async fn test_failed_read_keeps_claimed() {
        let ledger = MemoryLedger::new().with_holder("0xX");
        let resolver = resolver();
        let x = Identity::new("0xX");
        assert_eq!(resolver.resolve(&ledger, &x).await, MembershipStatus::Claimed);

        ledger.fail_next(LedgerOp::OwnedCount, LedgerError::network("connection reset"));

        assert_eq!(resolver.resolve(&ledger, &x).await, MembershipStatus::Claimed);
        assert_eq!(resolver.status(&x), MembershipStatus::Claimed);
    }

    #[tokio::test]
    async fn test_failed_first_read_stays_unknown() {
        let ledger = MemoryLedger::new();
        ledger.fail_next(LedgerOp::OwnedCount, LedgerError::rate_limited("429"));

        let status = resolver().resolve(&ledger, &Identity::new("0xA")).await;

        assert_eq!(status, MembershipStatus::Unknown);
    }

    #[tokio::test]
    async fn test_zero_count_does_not_cancel_outstanding_claim() {
        let ledger = MemoryLedger::new();
        let resolver = resolver();
        let me = Identity::new("0xA");
        resolver.begin_claim(&me).unwrap();

        assert_eq!(resolver.resolve(&ledger, &me).await, MembershipStatus::Claiming);
    }

    #[tokio::test]
    async fn test_successful_zero_read_corrects_optimistic_claim() {
        let ledger = MemoryLedger::new();
        let resolver = resolver();
        let me = Identity::new("0xA");
        resolver.mark_claimed(&me);

        assert_eq!(resolver.resolve(&ledger, &me).await, MembershipStatus::NotClaimed);
    }

    #[tokio::test]
    async fn test_zero_read_dispatched_before_a_confirmed_claim_is_ignored() {
        let ledger = MemoryLedger::new().with_op_latency(LedgerOp::OwnedCount, Duration::from_millis(50));
        let resolver = resolver();
        let me = Identity::new("0xA");
        resolver.begin_claim(&me).unwrap();

        let (status, ()) = tokio::join!(resolver.resolve(&ledger, &me), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resolver.mark_claimed(&me);
        });

        assert_eq!(status, MembershipStatus::Claimed);
        assert_eq!(resolver.status(&me), MembershipStatus::Claimed);
    }

    #[test]
    fn test_clear_settled_keeps_outstanding_claims() {
        let resolver = resolver();
        let claiming = Identity::new("0xA");
        let claimed = Identity::new("0xB");
        resolver.begin_claim(&claiming).unwrap();
        resolver.mark_claimed(&claimed);

        resolver.clear_settled();

        assert_eq!(resolver.status(&claiming), MembershipStatus::Claiming);
        assert_eq!(resolver.status(&claimed), MembershipStatus::Unknown);
        assert_eq!(resolver.begin_claim(&claiming), Err(ClaimError::AlreadyInProgress));
    }

    #[test]
    fn test_begin_claim_allows_one_outstanding_claim() {
        let resolver = resolver();
        let me = Identity::new("0xA");

        assert!(resolver.begin_claim(&me).is_ok());
        assert_eq!(resolver.begin_claim(&me), Err(ClaimError::AlreadyInProgress));

        resolver.mark_claim_failed(&me);
        assert!(resolver.begin_claim(&me).is_ok());

        resolver.mark_claimed(&me);
        assert_eq!(resolver.begin_claim(&me), Err(ClaimError::AlreadyClaimed));
    }
}

//! Membership NFT claim workflow.
//!
//! ```text
//! NotClaimed ──claim──► Claiming ──confirmed──► Claimed
//!                          │
//!                          └────failed────► ClaimFailed
//! ```
//!
//! A claim counts as done only once its transaction is confirmed. When the
//! confirmation fails, ownership is read again before giving up, since the
//! transaction may have been mined anyway.

use ledger_client::{Identity, LedgerClient, LedgerError, Session};
use tracing::{info, warn};

use crate::bus::{DaoEvent, EventBus};
use crate::error::ClaimError;
use crate::membership::{MembershipResolver, MembershipStatus};

/// Copies of the gating token minted per claim.
pub const DEFAULT_CLAIM_QUANTITY: u64 = 1;

pub struct ClaimWorkflow {
    quantity: u64,
    bus: EventBus,
}

impl ClaimWorkflow {
    pub fn new(quantity: u64, bus: EventBus) -> Self {
        Self { quantity, bus }
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    /// Claim the gating NFT for the session signer and wait for it to land.
    pub async fn claim(
        &self,
        ledger: &dyn LedgerClient,
        resolver: &MembershipResolver,
        session: &Session,
    ) -> Result<MembershipStatus, ClaimError> {
        let identity = session.signer();
        resolver.begin_claim(identity)?;
        self.announce(identity, MembershipStatus::Claiming);

        let tx = match ledger
            .claim(session, resolver.gating_token(), self.quantity)
            .await
        {
            Ok(tx) => tx,
            Err(err) => return Err(self.fail(resolver, identity, err)),
        };
        info!(identity = %identity, tx = %tx.hash, "claim submitted");

        let err = match ledger.wait_for_confirmation(&tx).await {
            Ok(()) => {
                info!(identity = %identity, "claim confirmed");
                return Ok(self.succeed(resolver, identity));
            }
            Err(err) => err,
        };

        // The transaction may still have been mined.
        match ledger.owned_count(identity, resolver.gating_token()).await {
            Ok(count) if count > 0 => {
                info!(identity = %identity, count, error = %err, "claim landed despite failed confirmation");
                Ok(self.succeed(resolver, identity))
            }
            Ok(_) => Err(self.fail(resolver, identity, err)),
            Err(read_err) => {
                warn!(identity = %identity, read_error = %read_err, "could not re-check ownership after failed claim");
                Err(self.fail(resolver, identity, err))
            }
        }
    }

    fn succeed(&self, resolver: &MembershipResolver, identity: &Identity) -> MembershipStatus {
        resolver.mark_claimed(identity);
        self.announce(identity, MembershipStatus::Claimed);
        MembershipStatus::Claimed
    }

    fn fail(&self, resolver: &MembershipResolver, identity: &Identity, err: LedgerError) -> ClaimError {
        warn!(identity = %identity, error = %err, "claim failed");
        resolver.mark_claim_failed(identity);
        self.announce(identity, MembershipStatus::ClaimFailed);
        err.into()
    }

    /// Re-read ownership after a claim to replace the optimistic status.
    pub async fn reconcile(
        &self,
        ledger: &dyn LedgerClient,
        resolver: &MembershipResolver,
        identity: &Identity,
    ) -> MembershipStatus {
        let before = resolver.status(identity);
        let after = resolver.resolve(ledger, identity).await;
        if before != after {
            self.announce(identity, after);
        }
        after
    }

    fn announce(&self, identity: &Identity, status: MembershipStatus) {
        self.bus.emit(DaoEvent::MembershipChanged {
            identity: identity.clone(),
            status,
        });
    }
}

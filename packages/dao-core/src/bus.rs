//! Broadcast bus for view-state notifications.
//!
//! # Guarantees
//!
//! - **At-most-once delivery**: Slow receivers may miss events
//! - **In-memory only**: Events are not persisted
//! - **No replay**: Lagged receivers get `RecvError::Lagged`
//!
//! Events only say *that* something changed. Subscribers read the current
//! value back from the controller, so a missed event is recovered by the
//! next one.

use ledger_client::{Identity, ProposalId, TokenAmount};
use tokio::sync::broadcast;

use crate::connection::ConnectionState;
use crate::error::SurfacedError;
use crate::governance::VoteState;
use crate::membership::MembershipStatus;

/// Default channel capacity for the event bus.
const DEFAULT_CAPACITY: usize = 256;

/// Something in the member view changed.
#[derive(Debug, Clone, PartialEq)]
pub enum DaoEvent {
    ConnectionChanged(ConnectionState),
    MembershipChanged {
        identity: Identity,
        status: MembershipStatus,
    },
    RosterUpdated {
        members: usize,
    },
    ProposalsUpdated {
        proposals: usize,
    },
    VoteStatusChanged {
        identity: Identity,
        proposal_id: ProposalId,
        state: VoteState,
    },
    BalanceUpdated {
        identity: Identity,
        balance: TokenAmount,
    },
    OperationFailed(SurfacedError),
}

/// Broadcast channel carrying [`DaoEvent`]s to every subscriber.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DaoEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with the specified capacity.
    ///
    /// The capacity determines how many events can be buffered before
    /// slow receivers start lagging.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers (fire-and-forget).
    ///
    /// Returns the number of receivers that received the event.
    pub fn emit(&self, event: DaoEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DaoEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(DaoEvent::RosterUpdated { members: 2 });

        assert_eq!(
            receiver.recv().await.unwrap(),
            DaoEvent::RosterUpdated { members: 2 }
        );
    }

    #[tokio::test]
    async fn test_emit_returns_receiver_count() {
        let bus = EventBus::new();
        assert_eq!(bus.emit(DaoEvent::ProposalsUpdated { proposals: 0 }), 0);

        let _r1 = bus.subscribe();
        let _r2 = bus.subscribe();
        assert_eq!(bus.emit(DaoEvent::ProposalsUpdated { proposals: 1 }), 2);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_events() {
        let bus = EventBus::new();
        bus.emit(DaoEvent::ConnectionChanged(ConnectionState::Disconnected));

        let mut receiver = bus.subscribe();
        bus.emit(DaoEvent::RosterUpdated { members: 1 });

        assert_eq!(
            receiver.recv().await.unwrap(),
            DaoEvent::RosterUpdated { members: 1 }
        );
    }

    #[tokio::test]
    async fn test_controller_announces_rebinds_on_its_bus() {
        use crate::controller::AppController;
        use ledger_client::testing::MemoryLedger;
        use ledger_client::{Identity, TokenId};
        use std::sync::Arc;

        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        let controller =
            AppController::with_bus(Arc::new(MemoryLedger::new()), TokenId::default(), bus.clone());

        controller.set_identity(Some(Identity::new("0xA")));
        controller.disconnect();

        assert_eq!(
            receiver.recv().await.unwrap(),
            DaoEvent::ConnectionChanged(ConnectionState::Connected {
                identity: Identity::new("0xA")
            })
        );
        assert_eq!(
            receiver.recv().await.unwrap(),
            DaoEvent::ConnectionChanged(ConnectionState::Disconnected)
        );
    }
}

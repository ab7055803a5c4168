//! Application controller: the single surface a UI or CLI talks to.
//!
//! The controller owns the ledger session, drives the membership, roster,
//! governance and claim components, and keeps their latest results as
//! cached view state.
//!
//! # Architecture
//!
//! ```text
//! AppController
//!     │
//!     ├─► connect / set_identity   (rebind session, bump epoch)
//!     ├─► refresh
//!     │     ├─► MembershipResolver::resolve
//!     │     └─► if member, concurrently:
//!     │           ├─► RosterAggregator::build_roster
//!     │           ├─► GovernanceView (proposals, then vote statuses)
//!     │           └─► own token balance
//!     ├─► claim      (ClaimWorkflow, then background reconcile)
//!     └─► cast_vote  (GovernanceView, then background confirm)
//! ```
//!
//! Queries return cached state immediately. Changes are announced on the
//! [`EventBus`].
//!
//! # Stale responses
//!
//! Every rebind bumps a session epoch. Background work captures the epoch at
//! dispatch and its results are discarded if the epoch has moved on, so
//! answers for a previous identity never land in the current view.
//!
//! # Example
//!
//! ```ignore
//! let controller = AppController::new(ledger, TokenId::default());
//! let mut events = controller.subscribe();
//!
//! controller.connect(&wallet).await?;
//! for member in controller.roster() {
//!     println!("{} {}", member.address, member.token_balance);
//! }
//! ```

use chrono::{DateTime, Utc};
use ledger_client::{
    Identity, LedgerClient, PendingTx, Proposal, ProposalId, Session, TokenAmount,
    TokenId,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{DaoEvent, EventBus};
use crate::claim::{ClaimWorkflow, DEFAULT_CLAIM_QUANTITY};
use crate::connection::{ConnectionState, WalletConnector};
use crate::error::{ClaimError, ConnectError, SurfacedError, VoteError};
use crate::governance::{GovernanceView, VoteState, VoteStatus};
use crate::membership::{MembershipResolver, MembershipStatus};
use crate::roster::{MemberRecord, RosterAggregator};

/// Everything a member view renders, read in one go.
#[derive(Debug, Clone, Serialize)]
pub struct MemberSnapshot {
    pub connection: ConnectionState,
    pub membership: MembershipStatus,
    pub own_balance: Option<TokenAmount>,
    pub roster: Vec<MemberRecord>,
    pub roster_updated_at: Option<DateTime<Utc>>,
    pub proposals: Vec<Proposal>,
    pub proposals_updated_at: Option<DateTime<Utc>>,
    pub votes: Vec<VoteStatus>,
    pub last_error: Option<String>,
}

struct Binding {
    connection: ConnectionState,
    session: Option<Arc<Session>>,
}

#[derive(Default)]
struct ViewState {
    roster: Vec<MemberRecord>,
    roster_updated_at: Option<DateTime<Utc>>,
    proposals_updated_at: Option<DateTime<Utc>>,
    own_balance: Option<TokenAmount>,
    last_error: Option<SurfacedError>,
}

struct Inner {
    ledger: Arc<dyn LedgerClient>,
    bus: EventBus,
    resolver: MembershipResolver,
    roster: RosterAggregator,
    governance: GovernanceView,
    claims: ClaimWorkflow,
    binding: RwLock<Binding>,
    epoch: AtomicU64,
    view: RwLock<ViewState>,
}

/// Cheap-to-clone handle; clones share all state.
#[derive(Clone)]
pub struct AppController {
    inner: Arc<Inner>,
}

impl AppController {
    pub fn new(ledger: Arc<dyn LedgerClient>, gating_token: TokenId) -> Self {
        Self::with_bus(ledger, gating_token, EventBus::new())
    }

    pub fn with_bus(ledger: Arc<dyn LedgerClient>, gating_token: TokenId, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                resolver: MembershipResolver::new(gating_token.clone()),
                roster: RosterAggregator::new(gating_token),
                governance: GovernanceView::new(),
                claims: ClaimWorkflow::new(DEFAULT_CLAIM_QUANTITY, bus.clone()),
                bus,
                binding: RwLock::new(Binding {
                    connection: ConnectionState::Disconnected,
                    session: None,
                }),
                epoch: AtomicU64::new(0),
                view: RwLock::new(ViewState::default()),
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaoEvent> {
        self.inner.bus.subscribe()
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Ask the wallet for an identity, bind it and load the member view.
    pub async fn connect(&self, wallet: &dyn WalletConnector) -> Result<Identity, ConnectError> {
        match wallet.connect().await {
            Ok(identity) => {
                self.set_identity(Some(identity.clone()));
                self.refresh().await;
                Ok(identity)
            }
            Err(err) => {
                let state = match &err {
                    ConnectError::UnsupportedNetwork { expected, actual } => {
                        ConnectionState::WrongNetwork {
                            expected: expected.clone(),
                            actual: actual.clone(),
                        }
                    }
                    ConnectError::Failed(_) => ConnectionState::Disconnected,
                };
                self.rebind(state);
                self.record_error(err.clone().into());
                Err(err)
            }
        }
    }

    /// Bind a new signer, or none.
    ///
    /// Always starts a new session: in-flight work for the previous one keeps
    /// its own session and its read results are discarded. Outstanding
    /// claims and pending votes stay reserved.
    pub fn set_identity(&self, identity: Option<Identity>) {
        let state = match identity {
            Some(identity) => ConnectionState::Connected { identity },
            None => ConnectionState::Disconnected,
        };
        self.rebind(state);
    }

    pub fn disconnect(&self) {
        self.set_identity(None);
    }

    /// Current signer binding, if connected.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.inner.binding.read().session.clone()
    }

    fn rebind(&self, connection: ConnectionState) {
        let mut binding = self.inner.binding.write();
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        binding.session = connection
            .identity()
            .map(|identity| Arc::new(Session::new(identity.clone(), epoch)));
        binding.connection = connection.clone();
        drop(binding);

        // Claims and votes still in flight stay reserved across sessions.
        self.inner.resolver.clear_settled();
        self.inner.governance.reset();
        *self.inner.view.write() = ViewState::default();

        info!(epoch, connection = ?connection, "session rebound");
        self.inner.bus.emit(DaoEvent::ConnectionChanged(connection));
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.epoch.load(Ordering::SeqCst) == epoch
    }

    // =========================================================================
    // Background loading
    // =========================================================================

    /// Resolve membership and, for members, reload the member view.
    ///
    /// Read failures are recorded as [`Self::last_error`]; the previous values
    /// stay in place.
    pub async fn refresh(&self) {
        let Some(session) = self.session() else {
            debug!("refresh skipped, not connected");
            return;
        };
        let epoch = session.epoch();
        let identity = session.signer();

        let before = self.inner.resolver.status(identity);
        let status = self
            .inner
            .resolver
            .resolve(self.inner.ledger.as_ref(), identity)
            .await;
        if !self.is_current(epoch) {
            debug!(epoch, identity = %identity, "discarding stale membership");
            return;
        }
        if before != status {
            self.inner.bus.emit(DaoEvent::MembershipChanged {
                identity: identity.clone(),
                status,
            });
        }
        if !status.is_member() {
            return;
        }

        tokio::join!(
            self.refresh_roster(epoch),
            self.refresh_governance(&session),
            self.refresh_balance(&session),
        );
    }

    /// Run [`Self::refresh`] on a background task.
    pub fn spawn_refresh(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.refresh().await })
    }

    async fn refresh_roster(&self, epoch: u64) {
        let result = self
            .inner
            .roster
            .build_roster(self.inner.ledger.as_ref())
            .await;
        if !self.is_current(epoch) {
            debug!(epoch, "discarding stale roster");
            return;
        }
        match result {
            Ok(members) => {
                let count = members.len();
                {
                    let mut view = self.inner.view.write();
                    view.roster = members;
                    view.roster_updated_at = Some(Utc::now());
                }
                self.inner.bus.emit(DaoEvent::RosterUpdated { members: count });
            }
            Err(err) => self.record_error(err.into()),
        }
    }

    async fn refresh_governance(&self, session: &Session) {
        let epoch = session.epoch();
        let ledger = self.inner.ledger.as_ref();
        let result = GovernanceView::fetch_proposals(ledger).await;
        if !self.is_current(epoch) {
            debug!(epoch, "discarding stale proposals");
            return;
        }
        let proposals = match result {
            Ok(proposals) => proposals,
            Err(err) => return self.record_error(SurfacedError::Proposals(err)),
        };

        let count = proposals.len();
        self.inner.governance.install_proposals(proposals);
        self.inner.view.write().proposals_updated_at = Some(Utc::now());
        self.inner
            .bus
            .emit(DaoEvent::ProposalsUpdated { proposals: count });

        let identity = session.signer();
        let result = self.inner.governance.vote_statuses(ledger, identity).await;
        if !self.is_current(epoch) {
            debug!(epoch, "discarding stale vote statuses");
            return;
        }
        match result {
            Ok(statuses) => {
                for status in statuses {
                    let state = self
                        .inner
                        .governance
                        .cached_state(identity, &status.proposal_id)
                        .unwrap_or(VoteState::NotVoted);
                    self.inner.bus.emit(DaoEvent::VoteStatusChanged {
                        identity: identity.clone(),
                        proposal_id: status.proposal_id,
                        state,
                    });
                }
            }
            Err(err) => self.record_error(SurfacedError::VoteStatus(err)),
        }
    }

    async fn refresh_balance(&self, session: &Session) {
        let identity = session.signer();
        let result = self.inner.ledger.balance(identity).await;
        if !self.is_current(session.epoch()) {
            debug!(epoch = session.epoch(), "discarding stale balance");
            return;
        }
        match result {
            Ok(balance) => {
                self.inner.view.write().own_balance = Some(balance);
                self.inner.bus.emit(DaoEvent::BalanceUpdated {
                    identity: identity.clone(),
                    balance,
                });
            }
            Err(err) => self.record_error(SurfacedError::Balance(err)),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Claim the membership NFT for the connected identity.
    ///
    /// Returns once the mint is confirmed. A reconciliation read and a view
    /// reload then run in the background.
    pub async fn claim(&self) -> Result<MembershipStatus, ClaimError> {
        let session = match self.session() {
            Some(session) => session,
            None => {
                self.record_error(ClaimError::NotConnected.into());
                return Err(ClaimError::NotConnected);
            }
        };

        let result = self
            .inner
            .claims
            .claim(self.inner.ledger.as_ref(), &self.inner.resolver, &session)
            .await;
        match result {
            Ok(status) => {
                if self.is_current(session.epoch()) {
                    self.spawn_refresh();
                }
                Ok(status)
            }
            Err(err) => {
                if self.is_current(session.epoch()) {
                    self.record_error(err.clone().into());
                }
                Err(err)
            }
        }
    }

    /// Re-read ownership for the connected identity.
    pub async fn reconcile_membership(&self) -> MembershipStatus {
        match self.session() {
            Some(session) => {
                self.inner
                    .claims
                    .reconcile(
                        self.inner.ledger.as_ref(),
                        &self.inner.resolver,
                        session.signer(),
                    )
                    .await
            }
            None => MembershipStatus::Unknown,
        }
    }

    /// Submit a vote; confirmation is awaited on a background task.
    ///
    /// Returns once the transaction is submitted, with the vote `Pending`.
    pub async fn cast_vote(&self, proposal_id: &ProposalId, choice: &str) -> Result<PendingTx, VoteError> {
        let (session, tx) = self.submit_vote(proposal_id, choice).await?;

        let this = self.clone();
        let proposal_id = proposal_id.clone();
        let pending = tx.clone();
        tokio::spawn(async move {
            let _ = this.confirm_vote(&session, &proposal_id, &pending).await;
        });
        Ok(tx)
    }

    /// Submit a vote and wait until it is confirmed or rolled back.
    pub async fn cast_vote_and_confirm(
        &self,
        proposal_id: &ProposalId,
        choice: &str,
    ) -> Result<(), VoteError> {
        let (session, tx) = self.submit_vote(proposal_id, choice).await?;
        self.confirm_vote(&session, proposal_id, &tx).await
    }

    async fn submit_vote(
        &self,
        proposal_id: &ProposalId,
        choice: &str,
    ) -> Result<(Arc<Session>, PendingTx), VoteError> {
        let session = match self.session() {
            Some(session) => session,
            None => {
                self.record_error(VoteError::NotConnected.into());
                return Err(VoteError::NotConnected);
            }
        };
        let membership = self.inner.resolver.status(session.signer());

        let result = self
            .inner
            .governance
            .cast_vote(
                self.inner.ledger.as_ref(),
                &session,
                membership,
                proposal_id,
                choice,
            )
            .await;
        match result {
            Ok(tx) => {
                self.inner.bus.emit(DaoEvent::VoteStatusChanged {
                    identity: session.signer().clone(),
                    proposal_id: proposal_id.clone(),
                    state: VoteState::Pending,
                });
                Ok((session, tx))
            }
            Err(err) => {
                if self.is_current(session.epoch()) {
                    self.record_error(err.clone().into());
                }
                Err(err)
            }
        }
    }

    async fn confirm_vote(
        &self,
        session: &Session,
        proposal_id: &ProposalId,
        tx: &PendingTx,
    ) -> Result<(), VoteError> {
        let result = self
            .inner
            .governance
            .confirm_vote(self.inner.ledger.as_ref(), proposal_id, tx)
            .await;

        let state = if result.is_ok() {
            VoteState::Confirmed
        } else {
            VoteState::NotVoted
        };
        self.inner.bus.emit(DaoEvent::VoteStatusChanged {
            identity: session.signer().clone(),
            proposal_id: proposal_id.clone(),
            state,
        });
        if let Err(err) = &result {
            if self.is_current(session.epoch()) {
                self.record_error(err.clone().into());
            }
        }
        result
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.binding.read().connection.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.session().map(|session| session.signer().clone())
    }

    pub fn membership_state(&self) -> MembershipStatus {
        match self.identity() {
            Some(identity) => self.inner.resolver.status(&identity),
            None => MembershipStatus::Unknown,
        }
    }

    pub fn roster(&self) -> Vec<MemberRecord> {
        self.inner.view.read().roster.clone()
    }

    pub fn proposals(&self) -> Vec<Proposal> {
        self.inner.governance.proposals()
    }

    /// Cached vote status of the connected identity, `None` if not yet known.
    pub fn vote_status(&self, proposal_id: &ProposalId) -> Option<VoteStatus> {
        self.vote_state(proposal_id).map(|state| VoteStatus {
            proposal_id: proposal_id.clone(),
            has_voted: state.has_voted(),
        })
    }

    pub fn vote_state(&self, proposal_id: &ProposalId) -> Option<VoteState> {
        let identity = self.identity()?;
        self.inner.governance.cached_state(&identity, proposal_id)
    }

    pub fn own_balance(&self) -> Option<TokenAmount> {
        self.inner.view.read().own_balance
    }

    pub fn last_error(&self) -> Option<SurfacedError> {
        self.inner.view.read().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.inner.view.write().last_error = None;
    }

    pub fn snapshot(&self) -> MemberSnapshot {
        let proposals = self.proposals();
        let votes = proposals
            .iter()
            .filter_map(|p| self.vote_status(&p.id))
            .collect();
        let view = self.inner.view.read();
        MemberSnapshot {
            connection: self.connection_state(),
            membership: self.membership_state(),
            own_balance: view.own_balance,
            roster: view.roster.clone(),
            roster_updated_at: view.roster_updated_at,
            proposals,
            proposals_updated_at: view.proposals_updated_at,
            votes,
            last_error: view.last_error.as_ref().map(ToString::to_string),
        }
    }

    fn record_error(&self, err: SurfacedError) {
        if err.is_read_failure() {
            warn!(error = %err, "read failed, keeping previous view");
        } else {
            warn!(error = %err, "operation failed");
        }
        self.inner.view.write().last_error = Some(err.clone());
        self.inner.bus.emit(DaoEvent::OperationFailed(err));
    }
}

impl std::fmt::Debug for AppController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppController")
            .field("connection", &self.connection_state())
            .field("epoch", &self.inner.epoch.load(Ordering::SeqCst))
            .finish()
    }
}

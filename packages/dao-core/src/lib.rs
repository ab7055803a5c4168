//! Membership and governance workflows for a token-gated DAO.
//!
//! Owning the gating NFT makes an identity a member. Members see a roster of
//! all holders with their governance token balance, and can vote on
//! proposals. Non-members can claim the NFT.
//!
//! # Components
//!
//! - [`MembershipResolver`] - does the identity own the gating NFT
//! - [`RosterAggregator`] - holders joined with token balances
//! - [`GovernanceView`] - proposals, vote status and vote casting
//! - [`ClaimWorkflow`] - the NFT claim state machine
//! - [`AppController`] - orchestrates the above for a UI or CLI
//!
//! All ledger access goes through [`ledger_client::LedgerClient`].

pub mod bus;
pub mod claim;
pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod governance;
pub mod membership;
pub mod roster;

pub use bus::{DaoEvent, EventBus};
pub use claim::{ClaimWorkflow, DEFAULT_CLAIM_QUANTITY};
pub use config::DaoConfig;
pub use connection::{ConnectionState, GatewayWallet, WalletConnector};
pub use controller::{AppController, MemberSnapshot};
pub use error::{AggregationError, ClaimError, ConnectError, SurfacedError, VoteError};
pub use governance::{GovernanceView, VoteState, VoteStatus};
pub use membership::{MembershipResolver, MembershipStatus};
pub use roster::{merge_roster, MemberRecord, RosterAggregator};

//! Wallet connection collaborator.
//!
//! The core never talks to a wallet directly. A [`WalletConnector`] hands it
//! the identity to act as, or explains why it cannot.

use async_trait::async_trait;
use ledger_client::{HttpLedger, Identity};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ConnectError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected { identity: Identity },
    WrongNetwork { expected: String, actual: String },
}

impl ConnectionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Connected { identity } => Some(identity),
            _ => None,
        }
    }
}

#[async_trait]
pub trait WalletConnector: Send + Sync {
    /// Resolve the identity to act as.
    async fn connect(&self) -> Result<Identity, ConnectError>;
}

/// A backend wallet managed by the ledger gateway.
///
/// Connecting checks that the wallet is configured for the same chain as
/// the contracts.
pub struct GatewayWallet {
    ledger: HttpLedger,
    address: Identity,
}

impl GatewayWallet {
    pub fn new(ledger: HttpLedger, address: Identity) -> Self {
        Self { ledger, address }
    }
}

#[async_trait]
impl WalletConnector for GatewayWallet {
    async fn connect(&self) -> Result<Identity, ConnectError> {
        let actual = self
            .ledger
            .wallet_chain(&self.address)
            .await
            .map_err(|e| ConnectError::Failed(e.to_string()))?;
        let expected = self.ledger.chain();

        if !actual.eq_ignore_ascii_case(expected) {
            warn!(wallet = %self.address, expected, actual = %actual, "wallet on unsupported network");
            return Err(ConnectError::UnsupportedNetwork {
                expected: expected.to_string(),
                actual,
            });
        }

        info!(wallet = %self.address, chain = %actual, "wallet connected");
        Ok(self.address.clone())
    }
}

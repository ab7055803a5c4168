//! Test harness wiring an [`AppController`] to an in-memory ledger.

use dao_core::{AppController, DaoEvent};
use ledger_client::testing::MemoryLedger;
use ledger_client::{LedgerClient, TokenId};
use std::sync::Arc;
use std::time::Duration;
use test_context::AsyncTestContext;
use tokio::sync::broadcast;

use super::fixtures::dao_ledger;

/// How long a test waits for a background event before failing.
const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TestHarness {
    pub ledger: MemoryLedger,
    pub controller: AppController,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::with_ledger(dao_ledger())
    }

    async fn teardown(self) {}
}

impl TestHarness {
    pub fn with_ledger(ledger: MemoryLedger) -> Self {
        let client = Arc::new(ledger.clone());
        Self::with_client(ledger, client)
    }

    /// Drive the controller through `client`, keeping `ledger` for
    /// assertions and setup.
    pub fn with_client(ledger: MemoryLedger, client: Arc<dyn LedgerClient>) -> Self {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let controller = AppController::new(client, TokenId::default());
        Self { ledger, controller }
    }
}

/// Receive events until one matches, or panic after [`EVENT_TIMEOUT`].
pub async fn wait_for(
    events: &mut broadcast::Receiver<DaoEvent>,
    matches: impl Fn(&DaoEvent) -> bool,
) -> DaoEvent {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

//! Member roster: NFT holders joined with their governance token balance.

use ledger_client::{Identity, LedgerClient, TokenAmount, TokenId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::AggregationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRecord {
    pub address: Identity,
    pub token_balance: TokenAmount,
}

pub struct RosterAggregator {
    gating_token: TokenId,
}

impl RosterAggregator {
    pub fn new(gating_token: TokenId) -> Self {
        Self { gating_token }
    }

    /// Fetch holders and balances concurrently and merge them.
    ///
    /// Both fetches must succeed; the first failure fails the whole roster.
    pub async fn build_roster(
        &self,
        ledger: &dyn LedgerClient,
    ) -> Result<Vec<MemberRecord>, AggregationError> {
        let (holders, balances) = tokio::try_join!(
            ledger.holder_addresses(&self.gating_token),
            ledger.all_balances(),
        )?;
        debug!(
            holders = holders.len(),
            balances = balances.len(),
            "merging roster"
        );
        Ok(merge_roster(holders, &balances))
    }
}

/// One record per distinct holder, in holder order. Holders without a
/// balance entry hold zero tokens.
pub fn merge_roster(
    holders: Vec<Identity>,
    balances: &HashMap<Identity, TokenAmount>,
) -> Vec<MemberRecord> {
    let mut seen = HashSet::with_capacity(holders.len());
    holders
        .into_iter()
        .filter(|address| seen.insert(address.clone()))
        .map(|address| MemberRecord {
            token_balance: balances.get(&address).copied().unwrap_or_default(),
            address,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_client::testing::{LedgerOp, MemoryLedger};
    use ledger_client::LedgerError;
    use std::time::Duration;

    fn ids(addresses: &[&str]) -> Vec<Identity> {
        addresses.iter().map(|a| Identity::new(*a)).collect()
    }

    #[tokio::test]
    async fn test_missing_balance_defaults_to_zero() {
        let ledger = MemoryLedger::new()
            .with_holder("A")
            .with_holder("B")
            .with_balance("A", TokenAmount::from_base_units(10));

        let roster = RosterAggregator::new(TokenId::default())
            .build_roster(&ledger)
            .await
            .unwrap();

        assert_eq!(
            roster,
            vec![
                MemberRecord {
                    address: Identity::new("A"),
                    token_balance: TokenAmount::from_base_units(10),
                },
                MemberRecord {
                    address: Identity::new("B"),
                    token_balance: TokenAmount::ZERO,
                },
            ]
        );
    }

    #[test]
    fn test_merge_keeps_holder_order_and_ignores_non_holders() {
        let balances = HashMap::from([
            (Identity::new("C"), TokenAmount::from_tokens(1)),
            (Identity::new("Z"), TokenAmount::from_tokens(99)),
        ]);

        let roster = merge_roster(ids(&["C", "A", "B"]), &balances);

        let addresses: Vec<_> = roster.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addresses, vec!["C", "A", "B"]);
        assert!(roster.iter().all(|r| r.address.as_str() != "Z"));
    }

    #[test]
    fn test_merge_drops_duplicate_holders() {
        let roster = merge_roster(ids(&["A", "B", "A"]), &HashMap::new());
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].address.as_str(), "A");
        assert_eq!(roster[1].address.as_str(), "B");
    }

    #[test]
    fn test_merge_matches_balances_for_many_holder_sets() {
        let cases: Vec<(Vec<&str>, Vec<(&str, u128)>)> = vec![
            (vec![], vec![("A", 5)]),
            (vec!["A"], vec![]),
            (vec!["A", "B", "C"], vec![("B", 7), ("D", 1)]),
            (vec!["B", "B", "A", "B"], vec![("A", 3), ("B", 4)]),
        ];

        for (holders, balances) in cases {
            let balances: HashMap<_, _> = balances
                .into_iter()
                .map(|(a, n)| (Identity::new(a), TokenAmount::from_base_units(n)))
                .collect();
            let holders = ids(&holders);
            let roster = merge_roster(holders.clone(), &balances);

            let distinct: HashSet<_> = holders.iter().collect();
            assert_eq!(roster.len(), distinct.len());
            for record in &roster {
                assert!(holders.contains(&record.address));
                assert_eq!(
                    record.token_balance,
                    balances.get(&record.address).copied().unwrap_or_default()
                );
            }
        }
    }

    #[tokio::test]
    async fn test_failure_in_either_fetch_fails_the_roster() {
        let ledger = MemoryLedger::new().with_holder("A");
        ledger.fail_next(LedgerOp::AllBalances, LedgerError::rate_limited("429"));

        let err = RosterAggregator::new(TokenId::default())
            .build_roster(&ledger)
            .await
            .unwrap_err();

        assert!(matches!(err.0, LedgerError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_fetches_run_concurrently() {
        let ledger = MemoryLedger::new()
            .with_holder("A")
            .with_op_latency(LedgerOp::HolderAddresses, Duration::from_millis(100))
            .with_op_latency(LedgerOp::AllBalances, Duration::from_millis(100));

        let started = std::time::Instant::now();
        let roster = RosterAggregator::new(TokenId::default())
            .build_roster(&ledger)
            .await
            .unwrap();

        assert_eq!(roster.len(), 1);
        assert!(started.elapsed() < Duration::from_millis(190));
    }
}

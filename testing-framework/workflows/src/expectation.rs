use std::{collections::HashMap, fmt, sync::Arc};

use futures::future::try_join_all;
use interchain_testing_core::chain::{ChainError, NetworkHandle};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BalanceKey {
    pub chain_id: String,
    pub address: String,
    pub denom: String,
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.chain_id, self.address, self.denom)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expected {
    Exact(u128),
    /// Signed change against the baseline snapshot.
    Delta(i128),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceMismatch {
    pub key: BalanceKey,
    pub expected: Expected,
    pub baseline: Option<u128>,
    pub actual: u128,
}

impl fmt::Display for BalanceMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.expected, self.baseline) {
            (Expected::Exact(amount), _) => {
                write!(f, "{}: expected {amount}, found {}", self.key, self.actual)
            }
            (Expected::Delta(delta), Some(baseline)) => write!(
                f,
                "{}: expected {baseline} {delta:+}, found {}",
                self.key, self.actual
            ),
            (Expected::Delta(delta), None) => write!(
                f,
                "{}: expected change {delta:+} but no baseline was captured, found {}",
                self.key, self.actual
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExpectationError {
    #[error("failed to read balance {key}: {source}")]
    Query {
        key: BalanceKey,
        #[source]
        source: ChainError,
    },
    #[error("{} balance expectation(s) failed:\n{}", .0.len(), render(.0))]
    Mismatches(Vec<BalanceMismatch>),
}

fn render(mismatches: &[BalanceMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| format!("  {m}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Balances read at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BalanceSnapshot {
    balances: HashMap<BalanceKey, u128>,
}

impl BalanceSnapshot {
    #[must_use]
    pub fn get(&self, chain_id: &str, address: &str, denom: &str) -> Option<u128> {
        self.balances
            .get(&BalanceKey {
                chain_id: chain_id.to_owned(),
                address: address.to_owned(),
                denom: denom.to_owned(),
            })
            .copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

struct Check {
    network: Arc<dyn NetworkHandle>,
    key: BalanceKey,
    expected: Expected,
}

/// Post-conditions on balances, checked together so that one report lists
/// every mismatch.
#[derive(Default)]
pub struct BalanceExpectation {
    checks: Vec<Check>,
}

impl BalanceExpectation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn exact(
        self,
        network: &Arc<dyn NetworkHandle>,
        address: impl Into<String>,
        denom: impl Into<String>,
        amount: u128,
    ) -> Self {
        self.push(network, address, denom, Expected::Exact(amount))
    }

    #[must_use]
    pub fn delta(
        self,
        network: &Arc<dyn NetworkHandle>,
        address: impl Into<String>,
        denom: impl Into<String>,
        delta: i128,
    ) -> Self {
        self.push(network, address, denom, Expected::Delta(delta))
    }

    fn push(
        mut self,
        network: &Arc<dyn NetworkHandle>,
        address: impl Into<String>,
        denom: impl Into<String>,
        expected: Expected,
    ) -> Self {
        self.checks.push(Check {
            key: BalanceKey {
                chain_id: network.chain_id().to_owned(),
                address: address.into(),
                denom: denom.into(),
            },
            network: Arc::clone(network),
            expected,
        });
        self
    }

    /// Reads every balance this expectation covers.
    pub async fn snapshot(&self) -> Result<BalanceSnapshot, ExpectationError> {
        let read = try_join_all(self.checks.iter().map(|check| async move {
            read_balance(check).await.map(|amount| (check.key.clone(), amount))
        }))
        .await?;
        debug!(balances = read.len(), "balance snapshot captured");
        Ok(BalanceSnapshot {
            balances: read.into_iter().collect(),
        })
    }

    /// Reads current balances and compares them against the expectations,
    /// resolving deltas against `baseline`.
    pub async fn verify(&self, baseline: &BalanceSnapshot) -> Result<(), ExpectationError> {
        let current = self.snapshot().await?;
        let mismatches: Vec<BalanceMismatch> = self
            .checks
            .iter()
            .filter_map(|check| {
                let actual = current.balances.get(&check.key).copied().unwrap_or_default();
                let base = baseline.balances.get(&check.key).copied();
                let holds = match (check.expected, base) {
                    (Expected::Exact(amount), _) => actual == amount,
                    (Expected::Delta(delta), Some(base)) => {
                        i128::try_from(base).ok().and_then(|b| b.checked_add(delta))
                            == i128::try_from(actual).ok()
                    }
                    (Expected::Delta(_), None) => false,
                };
                (!holds).then(|| BalanceMismatch {
                    key: check.key.clone(),
                    expected: check.expected,
                    baseline: base,
                    actual,
                })
            })
            .collect();

        if mismatches.is_empty() {
            info!(checks = self.checks.len(), "balance expectations hold");
            Ok(())
        } else {
            Err(ExpectationError::Mismatches(mismatches))
        }
    }
}

async fn read_balance(check: &Check) -> Result<u128, ExpectationError> {
    check
        .network
        .balance(&check.key.address, &check.key.denom)
        .await
        .map_err(|source| ExpectationError::Query {
            key: check.key.clone(),
            source,
        })
}

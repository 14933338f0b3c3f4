use super::{ClassificationTier, Classifier};
use crate::config::OracleConfig;
use crate::error::{Result, TransformError};
use crate::schema::{Category, LineItem};
use crate::synonyms::SynonymTable;
use crate::taxonomy::{LeafKey, Term};
use crate::utils::normalize_text;
use async_trait::async_trait;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// What the oracle is told about a line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub name: String,
    pub code: String,
    pub category: Category,
    pub amount: Decimal,
}

impl From<&LineItem> for OracleRequest {
    fn from(item: &LineItem) -> Self {
        Self {
            name: item.account_name.clone(),
            code: item.account_code.clone(),
            category: item.category,
            amount: item.amount,
        }
    }
}

/// Candidate leaf path proposed by the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OracleAnswer {
    #[schemars(description = "Top-level group: 'Assets' or 'Equity and Liabilities'")]
    pub category: String,

    #[schemars(
        description = "Section: 'Non-Current Assets', 'Current Assets', 'Equity', 'Non-Current Liabilities' or 'Current Liabilities'"
    )]
    pub subcategory_1: String,

    #[schemars(
        description = "Line within the section, e.g. 'Intangible Assets', 'Trade Receivables', 'Share Capital', 'Provisions' or 'Other'"
    )]
    pub subcategory_2: String,
}

impl OracleAnswer {
    pub fn resolve(&self) -> Option<LeafKey> {
        LeafKey::from_oracle_labels(&self.category, &self.subcategory_1, &self.subcategory_2)
    }
}

/// External semantic classifier.
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    async fn classify(&self, request: &OracleRequest) -> Result<OracleAnswer>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen { trial_in_flight: bool },
}

/// Skips the oracle after `failure_threshold` consecutive failures, for
/// `cooldown`. After the cooldown a single trial call is let through; its
/// outcome closes or re-opens the breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a call may be issued now.
    pub fn allow(&self) -> bool {
        let mut state = self.lock();
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { until } => {
                if Instant::now() >= until {
                    info!("Oracle circuit breaker half-open; allowing a trial call");
                    *state = BreakerState::HalfOpen {
                        trial_in_flight: true,
                    };
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen { trial_in_flight } => {
                if trial_in_flight {
                    false
                } else {
                    *state = BreakerState::HalfOpen {
                        trial_in_flight: true,
                    };
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.lock();
        if matches!(*state, BreakerState::HalfOpen { .. }) {
            info!("Oracle circuit breaker closed");
        }
        *state = BreakerState::Closed {
            consecutive_failures: 0,
        };
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        let next = match *state {
            BreakerState::Closed {
                consecutive_failures,
            } if consecutive_failures + 1 < self.failure_threshold => BreakerState::Closed {
                consecutive_failures: consecutive_failures + 1,
            },
            BreakerState::Open { until } => BreakerState::Open { until },
            _ => {
                warn!(
                    "Oracle circuit breaker open for {:?} after repeated failures",
                    self.cooldown
                );
                BreakerState::Open {
                    until: Instant::now() + self.cooldown,
                }
            }
        };
        *state = next;
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lock(), BreakerState::Open { until } if Instant::now() < until)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    name: String,
    code: String,
    category: Category,
    term: Term,
}

/// Oracle tier: wraps a [`ClassificationOracle`] with a hard timeout, a circuit
/// breaker and a memo of accepted answers, so a retried transform does not ask
/// again for items that were already resolved.
pub struct OracleClassifier {
    oracle: Arc<dyn ClassificationOracle>,
    synonyms: Arc<SynonymTable>,
    timeout: Duration,
    breaker: CircuitBreaker,
    memo: Mutex<HashMap<MemoKey, LeafKey>>,
}

impl OracleClassifier {
    pub fn new(
        oracle: Arc<dyn ClassificationOracle>,
        synonyms: Arc<SynonymTable>,
        config: &OracleConfig,
    ) -> Self {
        Self {
            oracle,
            synonyms,
            timeout: config.timeout(),
            breaker: CircuitBreaker::new(config.failure_threshold, config.cooldown()),
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn memoized(&self) -> usize {
        self.memo.lock().map(|m| m.len()).unwrap_or(0)
    }

    fn memo_key(&self, item: &LineItem) -> MemoKey {
        MemoKey {
            name: normalize_text(&item.account_name),
            code: item.account_code.trim().to_string(),
            category: item.category,
            term: self.synonyms.term_signal(item.subcategory_text()),
        }
    }

    fn degraded(item: &LineItem, reason: impl Into<String>) -> TransformError {
        TransformError::ClassificationDegraded {
            item: item.account_name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Classifier for OracleClassifier {
    fn tier(&self) -> ClassificationTier {
        ClassificationTier::Oracle
    }

    async fn classify(&self, item: &LineItem) -> Result<Option<LeafKey>> {
        let key = self.memo_key(item);
        let cached = self
            .memo
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .copied();
        if let Some(leaf) = cached {
            debug!("Oracle memo hit for '{}' -> {}", item.account_name, leaf);
            return Ok(Some(leaf));
        }

        if !self.breaker.allow() {
            return Err(Self::degraded(item, "oracle circuit breaker is open"));
        }

        let request = OracleRequest::from(item);
        let answer = match tokio::time::timeout(self.timeout, self.oracle.classify(&request)).await
        {
            Err(_) => {
                self.breaker.record_failure();
                return Err(Self::degraded(
                    item,
                    format!("oracle timed out after {:?}", self.timeout),
                ));
            }
            Ok(Err(e)) => {
                self.breaker.record_failure();
                return Err(Self::degraded(item, format!("oracle call failed: {}", e)));
            }
            Ok(Ok(answer)) => {
                self.breaker.record_success();
                answer
            }
        };

        let leaf = answer.resolve().ok_or_else(|| {
            Self::degraded(
                item,
                format!(
                    "oracle returned unknown leaf '{} / {} / {}'",
                    answer.category, answer.subcategory_1, answer.subcategory_2
                ),
            )
        })?;

        if leaf.category() != item.category {
            return Err(Self::degraded(
                item,
                format!(
                    "oracle placed a {} item under {} ({})",
                    item.category,
                    leaf.category(),
                    leaf
                ),
            ));
        }

        self.memo
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, leaf);

        Ok(Some(leaf))
    }
}

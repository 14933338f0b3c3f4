use crate::balance::DEFAULT_BALANCE_EPSILON;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Hard timeout for one oracle call.
    pub timeout_ms: u64,
    /// Consecutive failures that open the circuit breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before a trial call.
    pub cooldown_secs: u64,
    /// Items classified concurrently.
    pub max_concurrency: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3_000,
            failure_threshold: 3,
            cooldown_secs: 30,
            max_concurrency: 8,
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub oracle: OracleConfig,
    /// Tolerance for `assets = liabilities + equity`.
    pub balance_epsilon: Decimal,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            balance_epsilon: DEFAULT_BALANCE_EPSILON,
        }
    }
}

impl TransformConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

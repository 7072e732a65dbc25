use serde::{Deserialize, Serialize};

use crate::driver::RetryPolicy;
use crate::selection::SelectionThresholds;
use crate::swapper::SwapperConfig;

/// Tunables a harness may load from JSON. Every section and field is optional.
///
/// ```rust
/// let config = visbug::EngineConfig::from_json(r#"{ "retry": { "max_attempts": 10 } }"#).unwrap();
/// assert_eq!(config.retry.max_attempts, 10);
/// assert_eq!(config.selection.major, 0.10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub selection: SelectionThresholds,
    pub retry: RetryPolicy,
    pub swapper: SwapperConfig,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

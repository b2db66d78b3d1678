use serde::{Deserialize, Serialize};

/// Settings for a ping/pong rally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RallyConfig {
    /// Number of ping/pong exchanges.
    #[serde(default = "default_exchanges")]
    pub exchanges: usize,
    /// Capacity of the ball channels. Any value keeps the strokes alternating.
    #[serde(default)]
    pub buffer: usize,
}

impl RallyConfig {
    pub const DEFAULT_EXCHANGES: usize = 1_000;
}

impl Default for RallyConfig {
    fn default() -> Self {
        Self {
            exchanges: default_exchanges(),
            buffer: 0,
        }
    }
}

fn default_exchanges() -> usize {
    RallyConfig::DEFAULT_EXCHANGES
}

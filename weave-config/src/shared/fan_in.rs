use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings for merging many input streams into one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FanInConfig {
    /// Capacity of the merged output channel.
    #[serde(default = "default_out_buffer")]
    pub out_buffer: usize,
    /// Maximum number of inputs relayed at the same time.
    ///
    /// Inputs beyond this bound wait until an earlier input closes.
    #[serde(default = "default_max_relays")]
    pub max_relays: usize,
}

impl FanInConfig {
    pub const DEFAULT_OUT_BUFFER: usize = 16;

    pub const DEFAULT_MAX_RELAYS: usize = 64;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_relays == 0 {
            return Err(ValidationError::must_be_positive("fan_in.max_relays"));
        }

        Ok(())
    }
}

impl Default for FanInConfig {
    fn default() -> Self {
        Self {
            out_buffer: default_out_buffer(),
            max_relays: default_max_relays(),
        }
    }
}

fn default_out_buffer() -> usize {
    FanInConfig::DEFAULT_OUT_BUFFER
}

fn default_max_relays() -> usize {
    FanInConfig::DEFAULT_MAX_RELAYS
}

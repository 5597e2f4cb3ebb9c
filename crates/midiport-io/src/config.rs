//! Port layer configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_QUEUE_SIZE_LIMIT: usize = 100;
pub const DEFAULT_INPUT_CLIENT_NAME: &str = "midiport input client";
pub const DEFAULT_OUTPUT_CLIENT_NAME: &str = "midiport output client";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Report virtual ports as unsupported even when the backend has them.
    pub disallow_virtual_ports: bool,
    /// Hide the JACK API and refuse explicit requests for it.
    pub disallow_jack: bool,
    /// Input queue limit passed to named device creation.
    pub queue_size_limit: usize,
    /// Client name for input devices created with an explicit API.
    pub input_client_name: String,
    /// Client name for output devices created with an explicit API.
    pub output_client_name: String,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            disallow_virtual_ports: false,
            disallow_jack: false,
            queue_size_limit: DEFAULT_QUEUE_SIZE_LIMIT,
            input_client_name: DEFAULT_INPUT_CLIENT_NAME.to_string(),
            output_client_name: DEFAULT_OUTPUT_CLIENT_NAME.to_string(),
        }
    }
}

impl MidiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_size_limit == 0 {
            return Err(Error::InvalidConfig(
                "queue_size_limit must be greater than zero".to_string(),
            ));
        }
        if self.input_client_name.is_empty() || self.output_client_name.is_empty() {
            return Err(Error::InvalidConfig(
                "client names must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

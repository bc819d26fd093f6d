use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{core::channel::check_capacity, error::PipelineError};

/// Settings of a record pipeline.
///
/// Every field has a default, so a configuration file only needs the values
/// it changes:
///
/// ```
/// use xml_record_stream::config::PipelineConfig;
///
/// let config = PipelineConfig::from_json_str(r#"{ "tag": "ClinVarSet", "channel_capacity": 16 }"#).unwrap();
///
/// assert_eq!(config.tag, "ClinVarSet");
/// assert_eq!(config.channel_capacity, 16);
/// assert_eq!(config.consumers, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the element extracted as a record
    pub tag: String,
    /// Maximum number of entries waiting in the channel
    pub channel_capacity: usize,
    /// Buffer size of the document reader, in bytes
    pub read_buffer_capacity: usize,
    /// Number of consumers sharing the channel
    pub consumers: usize,
    /// Give up an insert after this many milliseconds
    pub send_timeout_ms: Option<u64>,
    /// Match the tag against local names, ignoring namespace prefixes
    pub match_local_name: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tag: String::new(),
            channel_capacity: 100,
            read_buffer_capacity: 8 * 1024,
            consumers: 1,
            send_timeout_ms: None,
            match_local_name: false,
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        let config: PipelineConfig = serde_json::from_str(json)
            .map_err(|e| PipelineError::Configuration(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.tag.is_empty() {
            return Err(PipelineError::Configuration(
                "a record tag name is required".to_string(),
            ));
        }
        if self.read_buffer_capacity == 0 {
            return Err(PipelineError::Configuration(
                "read buffer capacity must be greater than zero".to_string(),
            ));
        }
        self.validate_channel()
    }

    /// Checks the settings that do not depend on the document reader.
    pub fn validate_channel(&self) -> Result<(), PipelineError> {
        check_capacity(self.channel_capacity)?;
        if self.consumers == 0 {
            return Err(PipelineError::Configuration(
                "at least one consumer is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }
}

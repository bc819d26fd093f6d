use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Pipeline error
pub enum PipelineError {
    /// The byte stream broke or the document is not well-formed XML.
    #[error("Stream from: {0}")]
    Stream(String),

    /// A blocking insert or remove was cancelled by the owning context.
    #[error("Interrupted while waiting on the record channel")]
    Interrupted,

    #[error("Timed out after {0:?} waiting on the record channel")]
    Timeout(Duration),

    /// Every receiver went away while the producer was inserting.
    #[error("Record channel closed: {0}")]
    ChannelClosed(String),

    /// The channel was closed without an end-of-stream marker.
    #[error("Producer terminated before the end of the stream")]
    ProducerAborted,

    #[error("Configuration from: {0}")]
    Configuration(String),

    #[error("Consumer from: {0}")]
    Consumer(String),

    #[error("Task from: {0}")]
    Task(String),
}

impl PipelineError {
    /// Returns `true` for errors that end a producer run on the abort path
    /// without any reading error, i.e. the run was stopped from outside.
    pub fn is_interruption(&self) -> bool {
        matches!(
            self,
            PipelineError::Interrupted | PipelineError::Timeout(_) | PipelineError::ChannelClosed(_)
        )
    }
}

use std::sync::Arc;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

use super::{channel::RecordReceiver, item::RecordHandler, record::ChannelEntry};

/// Outcome of one consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerReport {
    pub name: String,
    /// Number of records handled successfully
    pub record_count: usize,
    /// Why the consumer stopped before the end of the stream, if it did
    pub error: Option<PipelineError>,
}

impl ConsumerReport {
    /// Returns `true` if the consumer stopped on the end-of-stream marker.
    pub fn reached_end_of_stream(&self) -> bool {
        self.error.is_none()
    }
}

/// Removes records from the channel until the end of the stream and hands
/// each of them to a [`RecordHandler`].
///
/// The only successful way out is [`ChannelEntry::EndOfStream`]. The loop also
/// stops when its token is cancelled, when the producer went away without a
/// marker, or when the handler rejects a record. A rejected record cancels the
/// token while the channel is still open, so the producer sees an interruption
/// rather than a closed channel.
pub struct Consumer {
    name: String,
    receiver: RecordReceiver,
    handler: Arc<dyn RecordHandler>,
    cancel: CancellationToken,
}

impl Consumer {
    pub fn new<S: Into<String>>(
        name: S,
        receiver: RecordReceiver,
        handler: Arc<dyn RecordHandler>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            receiver,
            handler,
            cancel,
        }
    }

    pub async fn run(self) -> ConsumerReport {
        debug!("Start of consumer: {}", self.name);

        let mut record_count = 0;
        let error = loop {
            match self.receiver.recv(&self.cancel).await {
                Ok(ChannelEntry::Record(record)) => {
                    if let Err(err) = self.handler.handle(record) {
                        self.cancel.cancel();
                        break Some(err);
                    }
                    record_count += 1;
                }
                Ok(ChannelEntry::EndOfStream) => break None,
                Err(err) => break Some(err),
            }
        };

        match &error {
            None => info!(
                "End of consumer: {}, records: {}",
                self.name, record_count
            ),
            Some(err) => warn!(
                "Consumer {} stopped after {} record(s): {}",
                self.name, record_count, err
            ),
        }

        ConsumerReport {
            name: self.name,
            record_count,
            error,
        }
    }
}

//! Fixed-capacity FIFO handoff between the producer and its consumers.
//!
//! The channel is a thin contract over [`tokio::sync::mpsc`]:
//! - inserts suspend while the channel is full (backpressure)
//! - removes suspend while the channel is empty
//! - both take a [`CancellationToken`] so neither wait is indefinite
//! - there is exactly one [`RecordSender`]; it is not `Clone`
//! - [`RecordReceiver`] is `Clone` and may be shared by several consumers
//!
//! Dropping the sender without inserting [`ChannelEntry::EndOfStream`] is how
//! an aborted run shows up on the consumer side: once the remaining entries are
//! drained, `recv` fails with [`PipelineError::ProducerAborted`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use log::{debug, warn};
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

use super::record::ChannelEntry;

/// Occupancy counters shared by both ends of a channel.
#[derive(Default)]
struct Gauge {
    inserted: AtomicUsize,
    removed: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn inserted(&self, occupancy: usize) {
        self.inserted.fetch_add(1, Ordering::AcqRel);
        self.peak.fetch_max(occupancy, Ordering::AcqRel);
    }

    fn removed(&self) {
        self.removed.fetch_add(1, Ordering::AcqRel);
    }

    fn len(&self) -> usize {
        let removed = self.removed.load(Ordering::Acquire);
        self.inserted.load(Ordering::Acquire).saturating_sub(removed)
    }
}

/// Largest capacity a record channel supports.
pub const MAX_CAPACITY: usize = Semaphore::MAX_PERMITS;

/// Checks that a channel of `capacity` entries can be created.
///
/// # Errors
/// Returns `PipelineError::Configuration` if `capacity` is zero or above
/// [`MAX_CAPACITY`].
pub fn check_capacity(capacity: usize) -> Result<(), PipelineError> {
    if capacity == 0 {
        return Err(PipelineError::Configuration(
            "channel capacity must be greater than zero".to_string(),
        ));
    }
    if capacity > MAX_CAPACITY {
        return Err(PipelineError::Configuration(format!(
            "channel capacity must not exceed {}, got {}",
            MAX_CAPACITY, capacity
        )));
    }
    Ok(())
}

/// Creates a bounded record channel holding at most `capacity` entries.
///
/// # Errors
/// Returns `PipelineError::Configuration` if `capacity` is zero or above
/// [`MAX_CAPACITY`].
pub fn bounded(capacity: usize) -> Result<(RecordSender, RecordReceiver), PipelineError> {
    check_capacity(capacity)?;

    let (tx, rx) = mpsc::channel(capacity);
    let gauge = Arc::new(Gauge::default());

    let sender = RecordSender {
        tx,
        gauge: gauge.clone(),
    };
    let receiver = RecordReceiver {
        state: Arc::new(Mutex::new(ReceiverState {
            rx,
            finished: false,
        })),
        gauge,
        capacity,
    };

    Ok((sender, receiver))
}

/// The single writing end of a record channel.
pub struct RecordSender {
    tx: mpsc::Sender<ChannelEntry>,
    gauge: Arc<Gauge>,
}

impl RecordSender {
    /// Inserts an entry, suspending while the channel is full.
    ///
    /// Cancellation is checked first, so an already-cancelled token always
    /// interrupts the insert even when there is room left.
    ///
    /// # Errors
    /// - `PipelineError::Interrupted` if `cancel` fires before the entry is placed
    /// - `PipelineError::ChannelClosed` if every receiver was dropped
    pub async fn send(
        &self,
        entry: ChannelEntry,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Insert interrupted by cancellation");
                return Err(PipelineError::Interrupted);
            }
            result = self.tx.send(entry) => result,
        };

        result.map_err(|_| {
            PipelineError::ChannelClosed("every receiver has been dropped".to_string())
        })?;

        let occupancy = self.occupancy();
        self.gauge.inserted(occupancy);
        debug!("Inserted entry, occupancy {}/{}", occupancy, self.capacity());
        Ok(())
    }

    /// Same as [`RecordSender::send`] but gives up after `timeout`.
    ///
    /// # Errors
    /// Additionally returns `PipelineError::Timeout` when no room frees up in time.
    pub async fn send_timeout(
        &self,
        entry: ChannelEntry,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<(), PipelineError> {
        match tokio::time::timeout(timeout, self.send(entry, cancel)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Insert timed out after {:?}", timeout);
                Err(PipelineError::Timeout(timeout))
            }
        }
    }

    /// Number of entries currently in the channel.
    pub fn occupancy(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Returns `true` once every receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct ReceiverState {
    rx: mpsc::Receiver<ChannelEntry>,
    finished: bool,
}

/// The reading end of a record channel, shareable between consumers.
#[derive(Clone)]
pub struct RecordReceiver {
    state: Arc<Mutex<ReceiverState>>,
    gauge: Arc<Gauge>,
    capacity: usize,
}

impl RecordReceiver {
    /// Removes the next entry, suspending while the channel is empty.
    ///
    /// Once any consumer has removed [`ChannelEntry::EndOfStream`], every
    /// later call returns `EndOfStream` as well.
    ///
    /// # Errors
    /// - `PipelineError::Interrupted` if `cancel` fires while waiting
    /// - `PipelineError::ProducerAborted` if the sender went away without
    ///   inserting `EndOfStream`
    pub async fn recv(&self, cancel: &CancellationToken) -> Result<ChannelEntry, PipelineError> {
        let mut state = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Interrupted),
            state = self.state.lock() => state,
        };

        if state.finished {
            return Ok(ChannelEntry::EndOfStream);
        }

        let entry = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Interrupted),
            entry = state.rx.recv() => entry,
        };

        match entry {
            Some(ChannelEntry::EndOfStream) => {
                debug!("Received end of stream");
                self.gauge.removed();
                state.finished = true;
                Ok(ChannelEntry::EndOfStream)
            }
            Some(entry) => {
                self.gauge.removed();
                Ok(entry)
            }
            None => Err(PipelineError::ProducerAborted),
        }
    }

    /// Number of entries waiting in the channel.
    ///
    /// Counts completed inserts minus completed removes, so an insert that is
    /// still returning to the producer may not be counted yet.
    pub fn len(&self) -> usize {
        self.gauge.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Highest occupancy observed right after an insert.
    pub fn peak_occupancy(&self) -> usize {
        self.gauge.peak.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Record;

    fn record(xml: &str) -> ChannelEntry {
        ChannelEntry::Record(Record::new(xml))
    }

    #[test]
    fn should_reject_zero_capacity() {
        let result = bounded(0);

        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn should_reject_capacity_above_maximum() {
        assert!(matches!(
            bounded(MAX_CAPACITY + 1),
            Err(PipelineError::Configuration(_))
        ));
        assert!(matches!(
            bounded(usize::MAX),
            Err(PipelineError::Configuration(_))
        ));
        assert!(check_capacity(MAX_CAPACITY).is_ok());
    }

    #[tokio::test]
    async fn should_preserve_fifo_order() {
        let (sender, receiver) = bounded(4).unwrap();
        let cancel = CancellationToken::new();

        sender.send(record("<a/>"), &cancel).await.unwrap();
        sender.send(record("<b/>"), &cancel).await.unwrap();
        sender.send(ChannelEntry::EndOfStream, &cancel).await.unwrap();

        assert_eq!(sender.occupancy(), 3);
        assert_eq!(receiver.len(), 3);
        assert_eq!(receiver.recv(&cancel).await.unwrap(), record("<a/>"));
        assert_eq!(receiver.recv(&cancel).await.unwrap(), record("<b/>"));
        assert_eq!(
            receiver.recv(&cancel).await.unwrap(),
            ChannelEntry::EndOfStream
        );
        assert_eq!(receiver.peak_occupancy(), 3);
    }

    #[tokio::test]
    async fn end_of_stream_is_sticky_for_every_consumer() {
        let (sender, receiver) = bounded(1).unwrap();
        let other = receiver.clone();
        let cancel = CancellationToken::new();

        sender.send(ChannelEntry::EndOfStream, &cancel).await.unwrap();
        drop(sender);

        assert!(receiver.recv(&cancel).await.unwrap().is_end_of_stream());
        assert!(other.recv(&cancel).await.unwrap().is_end_of_stream());
        assert!(receiver.recv(&cancel).await.unwrap().is_end_of_stream());
    }

    #[tokio::test]
    async fn dropped_sender_without_marker_reports_abort() {
        let (sender, receiver) = bounded(2).unwrap();
        let cancel = CancellationToken::new();

        sender.send(record("<a/>"), &cancel).await.unwrap();
        drop(sender);

        assert_eq!(receiver.recv(&cancel).await.unwrap(), record("<a/>"));
        assert_eq!(
            receiver.recv(&cancel).await,
            Err(PipelineError::ProducerAborted)
        );
    }

    #[tokio::test]
    async fn cancelled_token_interrupts_full_insert() {
        let (sender, _receiver) = bounded(1).unwrap();
        let cancel = CancellationToken::new();

        sender.send(record("<a/>"), &cancel).await.unwrap();
        cancel.cancel();

        let result = sender.send(record("<b/>"), &cancel).await;

        assert_eq!(result, Err(PipelineError::Interrupted));
        assert_eq!(sender.occupancy(), 1);
    }

    #[tokio::test]
    async fn cancelled_token_wins_over_free_room() {
        let (sender, _receiver) = bounded(8).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = sender.send(record("<a/>"), &cancel).await;

        assert_eq!(result, Err(PipelineError::Interrupted));
        assert_eq!(sender.occupancy(), 0);
    }

    #[tokio::test]
    async fn cancelled_token_interrupts_empty_remove() {
        let (_sender, receiver) = bounded(1).unwrap();
        let cancel = CancellationToken::new();

        let waiting = {
            let receiver = receiver.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { receiver.recv(&cancel).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();

        assert_eq!(waiting.await.unwrap(), Err(PipelineError::Interrupted));
    }

    #[tokio::test]
    async fn send_timeout_gives_up_on_full_channel() {
        let (sender, _receiver) = bounded(1).unwrap();
        let cancel = CancellationToken::new();

        sender.send(record("<a/>"), &cancel).await.unwrap();
        let result = sender
            .send_timeout(record("<b/>"), &cancel, Duration::from_millis(50))
            .await;

        assert_eq!(
            result,
            Err(PipelineError::Timeout(Duration::from_millis(50)))
        );
    }

    #[tokio::test]
    async fn send_fails_once_receivers_are_gone() {
        let (sender, receiver) = bounded(1).unwrap();
        let cancel = CancellationToken::new();
        drop(receiver);

        assert!(sender.is_closed());
        assert!(matches!(
            sender.send(record("<a/>"), &cancel).await,
            Err(PipelineError::ChannelClosed(_))
        ));
    }
}

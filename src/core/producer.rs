use std::time::{Duration, Instant};

use log::{debug, error, info};
use tokio::{runtime::Handle, sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PipelineError;

use super::{
    abort::{AbortHook, AbortOnce},
    build_name,
    channel::RecordSender,
    item::RecordReader,
    record::ChannelEntry,
};

/// Lifecycle of a producer run.
///
/// `Idle → Running → {Completed, Aborted}`. Both terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerStatus {
    /// Built but not started yet.
    Idle,
    /// Extracting records and inserting them into the channel.
    Running,
    /// The end-of-stream marker was inserted after the last record.
    Completed,
    /// A reading error or an interrupted insert ended the run; the abort hook fired.
    Aborted,
}

impl ProducerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProducerStatus::Completed | ProducerStatus::Aborted)
    }
}

/// Represents the execution of a producer run.
#[derive(Debug, Clone)]
pub struct ProducerReport {
    /// Unique identifier for this producer instance
    pub id: Uuid,
    /// Human-readable name for the producer
    pub name: String,
    pub status: ProducerStatus,
    pub start_time: Instant,
    pub end_time: Instant,
    pub duration: Duration,
    /// Number of records successfully inserted into the channel
    pub record_count: usize,
    /// The failure that aborted the run, if any
    pub error: Option<PipelineError>,
}

impl ProducerReport {
    pub fn is_completed(&self) -> bool {
        self.status == ProducerStatus::Completed
    }
}

/// Builder for [`ProducerTask`].
///
/// # Examples
///
/// ```
/// use xml_record_stream::core::{
///     channel::bounded,
///     producer::{ProducerBuilder, ProducerStatus},
///     record::ChannelEntry,
/// };
/// use xml_record_stream::item::xml::XmlRecordReaderBuilder;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "multi_thread")]
/// # async fn main() -> Result<(), xml_record_stream::PipelineError> {
/// let xml = "<release><Set>1</Set><Set>2</Set></release>";
/// let reader = XmlRecordReaderBuilder::new().tag("Set").from_reader(xml.as_bytes())?;
/// let (sender, receiver) = bounded(1)?;
/// let shutdown = CancellationToken::new();
///
/// let producer = ProducerBuilder::new()
///     .name("release-reader")
///     .reader(reader)
///     .sender(sender)
///     .abort(shutdown.clone())
///     .cancellation(shutdown.clone())
///     .build()?
///     .spawn();
///
/// let mut records = Vec::new();
/// loop {
///     match receiver.recv(&shutdown).await? {
///         ChannelEntry::Record(record) => records.push(record),
///         ChannelEntry::EndOfStream => break,
///     }
/// }
///
/// let report = producer.join().await?;
/// assert_eq!(report.status, ProducerStatus::Completed);
/// assert_eq!(report.record_count, 2);
/// assert_eq!(records[1].as_str(), "<Set>2</Set>");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ProducerBuilder {
    name: Option<String>,
    reader: Option<Box<dyn RecordReader + Send>>,
    sender: Option<RecordSender>,
    abort: Option<AbortOnce>,
    cancel: Option<CancellationToken>,
    send_timeout: Option<Duration>,
    runtime: Option<Handle>,
}

impl ProducerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the record source. Required.
    pub fn reader<R: RecordReader + Send + 'static>(mut self, reader: R) -> Self {
        self.reader = Some(Box::new(reader));
        self
    }

    /// Sets the channel the records are inserted into. Required.
    pub fn sender(mut self, sender: RecordSender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Sets the hook invoked when the run aborts. Required.
    pub fn abort<H: AbortHook + 'static>(mut self, hook: H) -> Self {
        self.abort = Some(AbortOnce::new(hook));
        self
    }

    /// Sets the token that interrupts a pending insert. Defaults to a token
    /// nobody cancels.
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Gives up an insert after `timeout`; the run is then aborted like an interruption.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Sets the runtime driving the channel. Defaults to the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds the producer in the [`ProducerStatus::Idle`] state.
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` if the reader, sender or abort
    /// hook is missing, or if no runtime was given and none is current.
    pub fn build(self) -> Result<ProducerTask, PipelineError> {
        let reader = self
            .reader
            .ok_or_else(|| missing("a record reader"))?;
        let sender = self.sender.ok_or_else(|| missing("a record sender"))?;
        let abort = self.abort.ok_or_else(|| missing("an abort hook"))?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| {
                PipelineError::Configuration(format!("no tokio runtime available: {}", e))
            })?,
        };
        let (status, _) = watch::channel(ProducerStatus::Idle);

        Ok(ProducerTask {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(build_name),
            reader,
            sender,
            abort,
            cancel: self.cancel.unwrap_or_default(),
            send_timeout: self.send_timeout,
            runtime,
            status,
        })
    }
}

fn missing(what: &str) -> PipelineError {
    PipelineError::Configuration(format!("the producer requires {}", what))
}

/// Drives a [`RecordReader`] and pushes every record into a bounded channel.
///
/// A producer runs once: [`ProducerTask::run`] and [`ProducerTask::spawn`]
/// consume it. On a clean end of input it inserts exactly one
/// [`ChannelEntry::EndOfStream`] after the last record. On a reading error, an
/// interrupted insert or a timed out insert it inserts no marker, logs the
/// error, fires the abort hook once and closes its end of the channel.
pub struct ProducerTask {
    id: Uuid,
    name: String,
    reader: Box<dyn RecordReader + Send>,
    sender: RecordSender,
    abort: AbortOnce,
    cancel: CancellationToken,
    send_timeout: Option<Duration>,
    runtime: Handle,
    status: watch::Sender<ProducerStatus>,
}

impl ProducerTask {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ProducerStatus {
        *self.status.borrow()
    }

    /// Runs the producer on the blocking thread pool of its runtime.
    pub fn spawn(self) -> ProducerHandle {
        let id = self.id;
        let status = self.status.subscribe();
        let runtime = self.runtime.clone();
        let join = runtime.spawn_blocking(move || self.run());

        ProducerHandle { id, join, status }
    }

    /// Runs the producer to completion on the calling thread.
    ///
    /// Inserts wait on the producer's runtime, so this must be called from a
    /// blocking context (a plain thread or `spawn_blocking`), never from
    /// inside an async task.
    pub fn run(self) -> ProducerReport {
        let start_time = Instant::now();
        self.status.send_replace(ProducerStatus::Running);

        info!("Start of producer: {}, id: {}", self.name, self.id);

        let mut record_count = 0;
        let result = self.produce(&mut record_count);

        let (status, error) = match result {
            Ok(()) => (ProducerStatus::Completed, None),
            Err(err) => {
                let cause = if err.is_interruption() { "interrupted" } else { "failed" };
                error!(
                    "Producer {} {} after {} record(s): {}",
                    self.name, cause, record_count, err
                );
                self.abort.fire();
                (ProducerStatus::Aborted, Some(err))
            }
        };

        let ProducerTask {
            id,
            name,
            sender,
            status: status_tx,
            ..
        } = self;
        // Closing our end lets consumers drain and then see the outcome
        drop(sender);
        status_tx.send_replace(status);

        info!(
            "End of producer: {}, id: {}, status: {:?}, records: {}",
            name, id, status, record_count
        );

        let end_time = Instant::now();
        ProducerReport {
            id,
            name,
            status,
            start_time,
            end_time,
            duration: end_time.duration_since(start_time),
            record_count,
            error,
        }
    }

    fn produce(&self, record_count: &mut usize) -> Result<(), PipelineError> {
        loop {
            match self.reader.read()? {
                Some(record) => {
                    debug!("Inserting record #{} ({} bytes)", *record_count + 1, record.len());
                    self.insert(ChannelEntry::Record(record))?;
                    *record_count += 1;
                }
                None => {
                    debug!("End of input, inserting end of stream marker");
                    return self.insert(ChannelEntry::EndOfStream);
                }
            }
        }
    }

    fn insert(&self, entry: ChannelEntry) -> Result<(), PipelineError> {
        match self.send_timeout {
            Some(timeout) => self.runtime.block_on(self.sender.send_timeout(
                entry,
                &self.cancel,
                timeout,
            )),
            None => self.runtime.block_on(self.sender.send(entry, &self.cancel)),
        }
    }
}

/// A handle on a spawned producer.
pub struct ProducerHandle {
    id: Uuid,
    join: JoinHandle<ProducerReport>,
    status: watch::Receiver<ProducerStatus>,
}

impl ProducerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state of the producer.
    pub fn status(&self) -> ProducerStatus {
        *self.status.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits until the producer reaches a terminal state.
    pub async fn terminated(&mut self) -> ProducerStatus {
        let result = self
            .status
            .wait_for(|status| status.is_terminal())
            .await
            .map(|status| *status);
        // The task is gone; report its last known state
        result.unwrap_or_else(|_| *self.status.borrow())
    }

    /// Waits for the producer to finish and returns its report.
    ///
    /// # Errors
    /// Returns `PipelineError::Task` if the producer panicked.
    pub async fn join(self) -> Result<ProducerReport, PipelineError> {
        self.join
            .await
            .map_err(|e| PipelineError::Task(format!("Producer task failed: {}", e)))
    }
}

use std::{
    fs::File,
    io::Read,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use log::{info, warn};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::PipelineConfig, error::PipelineError, item::xml::XmlRecordReaderBuilder,
};

use super::{
    build_name,
    channel::bounded,
    consumer::{Consumer, ConsumerReport},
    item::{DiscardHandler, RecordHandler, RecordReader},
    producer::{ProducerBuilder, ProducerReport, ProducerStatus},
};

/// Type alias for pipeline execution results.
type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    /// The producer completed and every consumer reached the end of the stream.
    Completed,
    /// The producer aborted or a consumer stopped early.
    Failed,
}

/// Represents the execution of a pipeline.
#[derive(Debug)]
pub struct PipelineExecution {
    pub id: Uuid,
    pub name: String,
    pub status: PipelineStatus,
    pub start: Instant,
    pub end: Instant,
    pub duration: Duration,
    pub producer: ProducerReport,
    pub consumers: Vec<ConsumerReport>,
}

impl PipelineExecution {
    /// Number of records the producer handed off.
    pub fn produced_count(&self) -> usize {
        self.producer.record_count
    }

    /// Number of records the consumers handled.
    pub fn consumed_count(&self) -> usize {
        self.consumers.iter().map(|c| c.record_count).sum()
    }

    /// The error that ended the run early: the producer's first, then any consumer's.
    pub fn error(&self) -> Option<&PipelineError> {
        self.producer
            .error
            .as_ref()
            .or_else(|| self.consumers.iter().find_map(|c| c.error.as_ref()))
    }
}

/// The owning execution context of one producer and its consumers.
///
/// A pipeline creates the channel and a shutdown token, runs the producer on
/// the blocking pool and the consumers as async tasks. The shutdown token is
/// the producer's abort hook: when the producer aborts, every consumer is
/// cancelled instead of waiting forever on the channel. A consumer whose
/// handler fails also cancels the token, which interrupts the producer.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use xml_record_stream::core::{
///     item::RecordHandlerResult,
///     pipeline::{PipelineBuilder, PipelineStatus},
///     record::Record,
/// };
/// use xml_record_stream::PipelineError;
///
/// # #[tokio::main(flavor = "multi_thread")]
/// # async fn main() -> Result<(), PipelineError> {
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
///
/// let execution = PipelineBuilder::new()
///     .name("release")
///     .tag("ClinVarSet")
///     .channel_capacity(2)
///     .handler(move |record: Record| -> RecordHandlerResult {
///         sink.lock().unwrap().push(record.into_string());
///         Ok(())
///     })
///     .from_reader("<r><ClinVarSet>a</ClinVarSet><ClinVarSet>b</ClinVarSet></r>".as_bytes())?
///     .run()
///     .await?;
///
/// assert_eq!(execution.status, PipelineStatus::Completed);
/// assert_eq!(execution.produced_count(), 2);
/// assert_eq!(seen.lock().unwrap().len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    id: Uuid,
    name: String,
    config: PipelineConfig,
    reader: Box<dyn RecordReader + Send>,
    handler: Arc<dyn RecordHandler>,
}

impl Pipeline {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the pipeline until the producer and every consumer have finished.
    ///
    /// # Returns
    /// - `Ok(PipelineExecution)` once everything stopped, whether the run
    ///   completed or failed; see [`PipelineExecution::status`]
    /// - `Err(PipelineError)` if the pipeline could not start or a task panicked
    pub async fn run(self) -> PipelineResult<PipelineExecution> {
        let start = Instant::now();
        info!("Start of pipeline: {}, id: {}", self.name, self.id);

        let (sender, receiver) = bounded(self.config.channel_capacity)?;
        let shutdown = CancellationToken::new();

        let mut producer = ProducerBuilder::new()
            .name(format!("{}-producer", self.name))
            .sender(sender)
            .abort(shutdown.clone())
            .cancellation(shutdown.clone());
        if let Some(timeout) = self.config.send_timeout() {
            producer = producer.send_timeout(timeout);
        }
        let producer = producer.reader(self.reader).build()?.spawn();

        let consumers: Vec<_> = (0..self.config.consumers)
            .map(|index| {
                let consumer = Consumer::new(
                    format!("{}-consumer-{}", self.name, index),
                    receiver.clone(),
                    self.handler.clone(),
                    shutdown.clone(),
                );
                // A panicking consumer cancels everyone else while unwinding
                let guard = shutdown.clone().drop_guard();
                tokio::spawn(async move {
                    let report = consumer.run().await;
                    guard.disarm();
                    report
                })
            })
            .collect();
        // Only consumers hold the receiving end from now on
        drop(receiver);

        let producer = producer.join().await;
        if producer.is_err() {
            shutdown.cancel();
        }

        // Await every consumer, even after a failed task
        let mut consumer_reports = Vec::with_capacity(consumers.len());
        let mut task_error = None;
        for consumer in consumers {
            match consumer.await {
                Ok(report) => consumer_reports.push(report),
                Err(e) => {
                    task_error.get_or_insert_with(|| {
                        PipelineError::Task(format!("Consumer task failed: {}", e))
                    });
                }
            }
        }
        let producer = producer?;
        if let Some(err) = task_error {
            return Err(err);
        }

        let status = if producer.status == ProducerStatus::Completed
            && consumer_reports.iter().all(|c| c.reached_end_of_stream())
        {
            PipelineStatus::Completed
        } else {
            PipelineStatus::Failed
        };

        let end = Instant::now();
        let execution = PipelineExecution {
            id: self.id,
            name: self.name,
            status,
            start,
            end,
            duration: end.duration_since(start),
            producer,
            consumers: consumer_reports,
        };

        match execution.error() {
            Some(err) if status == PipelineStatus::Failed => {
                warn!("Pipeline {} failed: {}", execution.name, err)
            }
            _ => info!(
                "End of pipeline: {}, records: {}, duration: {:?}",
                execution.name,
                execution.produced_count(),
                execution.duration
            ),
        }

        Ok(execution)
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    name: Option<String>,
    config: PipelineConfig,
    handler: Arc<dyn RecordHandler>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            name: None,
            config: PipelineConfig::default(),
            handler: Arc::new(DiscardHandler::default()),
        }
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a loaded configuration.
    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.config.tag = tag.into();
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn read_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.read_buffer_capacity = capacity;
        self
    }

    pub fn consumers(mut self, consumers: usize) -> Self {
        self.config.consumers = consumers;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn match_local_name(mut self, match_local_name: bool) -> Self {
        self.config.match_local_name = match_local_name;
        self
    }

    /// Sets the handler shared by every consumer. Defaults to discarding records.
    pub fn handler<H: RecordHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Builds a pipeline reading the document from `reader`.
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` if the configuration is invalid.
    pub fn from_reader<R: Read + Send + 'static>(self, reader: R) -> PipelineResult<Pipeline> {
        self.config.validate()?;

        let reader = XmlRecordReaderBuilder::new()
            .tag(&self.config.tag)
            .capacity(self.config.read_buffer_capacity)
            .match_local_name(self.config.match_local_name)
            .from_reader(reader)?;

        Ok(self.with_reader(Box::new(reader)))
    }

    /// Builds a pipeline reading the document from a file.
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` if the configuration is invalid
    /// and `PipelineError::Stream` if the file cannot be opened.
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> PipelineResult<Pipeline> {
        self.config.validate()?;

        let file_path = path.as_ref();
        let file = File::open(file_path).map_err(|e| {
            PipelineError::Stream(format!(
                "Failed to open XML file {}: {}",
                file_path.display(),
                e
            ))
        })?;

        self.from_reader(file)
    }

    /// Builds a pipeline around any record source.
    pub fn from_record_reader<R: RecordReader + Send + 'static>(
        self,
        reader: R,
    ) -> PipelineResult<Pipeline> {
        self.config.validate_channel()?;
        Ok(self.with_reader(Box::new(reader)))
    }

    fn with_reader(self, reader: Box<dyn RecordReader + Send>) -> Pipeline {
        Pipeline {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(build_name),
            config: self.config,
            reader,
            handler: self.handler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{item::RecordHandlerResult, record::Record};
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    #[tokio::test(flavor = "multi_thread")]
    async fn should_run_with_several_consumers() {
        let xml = format!(
            "<r>{}</r>",
            (0..50)
                .map(|i| format!("<Set n=\"{}\"/>", i))
                .collect::<String>()
        );
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = handled.clone();

        let execution = PipelineBuilder::new()
            .tag("Set")
            .channel_capacity(3)
            .consumers(4)
            .handler(move |_record: Record| -> RecordHandlerResult {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .from_reader(std::io::Cursor::new(xml))
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(execution.status, PipelineStatus::Completed);
        assert_eq!(execution.produced_count(), 50);
        assert_eq!(execution.consumed_count(), 50);
        assert_eq!(execution.consumers.len(), 4);
        assert_eq!(handled.load(Ordering::SeqCst), 50);
        assert!(execution.error().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn should_cancel_consumers_when_producer_aborts() {
        let execution = PipelineBuilder::new()
            .tag("Set")
            .channel_capacity(10)
            .consumers(2)
            .from_reader("<r><Set>1</Set><Set>2</Set><Set>3".as_bytes())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(execution.status, PipelineStatus::Failed);
        assert_eq!(execution.produced_count(), 2);
        assert_eq!(execution.producer.status, ProducerStatus::Aborted);
        assert!(matches!(execution.error(), Some(PipelineError::Stream(_))));
        assert!(
            execution
                .consumers
                .iter()
                .all(|c| !c.reached_end_of_stream())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_handler_interrupts_the_producer() {
        let xml = format!(
            "<r>{}</r>",
            (0..100).map(|_| "<Set/>").collect::<String>()
        );
        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();

        let execution = PipelineBuilder::new()
            .tag("Set")
            .channel_capacity(1)
            .handler(move |_record: Record| {
                let mut seen = sink.lock().unwrap();
                *seen += 1;
                if *seen == 3 {
                    return Err(PipelineError::Consumer("stop".to_string()));
                }
                Ok(())
            })
            .from_reader(std::io::Cursor::new(xml))
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(execution.status, PipelineStatus::Failed);
        assert_eq!(execution.producer.status, ProducerStatus::Aborted);
        assert!(execution.produced_count() < 100);
        assert_eq!(
            execution.consumers[0].error,
            Some(PipelineError::Consumer("stop".to_string()))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_consumer_stops_the_whole_pipeline() {
        let xml = format!(
            "<r>{}</r>",
            (0..200).map(|_| "<Set/>").collect::<String>()
        );
        let panicked = Arc::new(AtomicBool::new(false));
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = handled.clone();

        let pipeline = PipelineBuilder::new()
            .tag("Set")
            .channel_capacity(1)
            .consumers(3)
            .handler(move |_record: Record| -> RecordHandlerResult {
                if !panicked.swap(true, Ordering::SeqCst) {
                    panic!("handler failure");
                }
                std::thread::sleep(Duration::from_millis(1));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .from_reader(std::io::Cursor::new(xml))
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), pipeline.run())
            .await
            .expect("pipeline did not stop");

        assert!(matches!(result, Err(PipelineError::Task(_))));

        // No consumer outlives the run
        let settled = handled.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handled.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn should_validate_configuration() {
        let missing_tag = PipelineBuilder::new().from_reader("<r/>".as_bytes());
        let no_consumers = PipelineBuilder::new()
            .tag("Set")
            .consumers(0)
            .from_reader("<r/>".as_bytes());

        assert!(matches!(missing_tag, Err(PipelineError::Configuration(_))));
        assert!(matches!(no_consumers, Err(PipelineError::Configuration(_))));
    }
}

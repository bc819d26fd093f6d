use crate::error::PipelineError;

use super::record::Record;

/// Represents the result of reading the next record.
///
/// - `Ok(Some(record))` when a complete record was extracted
/// - `Ok(None)` at the end of the input
/// - `Err(PipelineError::Stream(_))` when the input broke or is malformed
pub type RecordReaderResult = Result<Option<Record>, PipelineError>;

/// Represents the result of handling a record on the consumer side.
pub type RecordHandlerResult = Result<(), PipelineError>;

/// A lazy source of records.
///
/// Implementations produce one record per call and keep memory bounded by the
/// size of the largest record, never the whole input. Once `read` has returned
/// an error the reader must keep returning an error.
pub trait RecordReader {
    /// Reads the next record.
    ///
    /// # Returns
    /// - `Ok(Some(record))` if a record was read
    /// - `Ok(None)` if there are no more records
    /// - `Err(PipelineError)` if the input could not be read
    fn read(&self) -> RecordReaderResult;
}

impl<R: RecordReader + ?Sized> RecordReader for Box<R> {
    fn read(&self) -> RecordReaderResult {
        (**self).read()
    }
}

/// Processes records removed from the channel by a consumer.
///
/// Handlers are shared between every consumer of a pipeline, so they take
/// `&self` and must be thread-safe.
pub trait RecordHandler: Send + Sync {
    fn handle(&self, record: Record) -> RecordHandlerResult;
}

/// A handler that accepts every record and does nothing with it.
#[derive(Default)]
pub struct DiscardHandler {}

impl RecordHandler for DiscardHandler {
    fn handle(&self, _record: Record) -> RecordHandlerResult {
        Ok(())
    }
}

impl<F> RecordHandler for F
where
    F: Fn(Record) -> RecordHandlerResult + Send + Sync,
{
    fn handle(&self, record: Record) -> RecordHandlerResult {
        self(record)
    }
}

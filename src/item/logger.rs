use log::info;

use crate::core::{
    item::{RecordHandler, RecordHandlerResult},
    record::Record,
};

/// A record handler that logs every record it receives.
#[derive(Default)]
pub struct LoggerHandler {}

impl RecordHandler for LoggerHandler {
    fn handle(&self, record: Record) -> RecordHandlerResult {
        info!("Record:{}", record);
        Ok(())
    }
}

#![cfg_attr(docsrs, feature(doc_cfg))]

/*!
 # XML record stream

 Extracts large numbers of independent XML records from a single streaming
 document and hands them, one at a time, to consumers through a bounded
 channel, without ever loading the whole document in memory.

 ## Core Concepts

- **RecordReader:** a lazy source of records. [`item::xml::XmlRecordReader`] returns the
  exact text of every occurrence of a target element, at any depth.
- **Bounded channel:** a fixed-capacity FIFO between the producer and its consumers.
  A full channel suspends the producer (backpressure); every wait can be cancelled.
- **Producer:** drives the reader and inserts each record into the channel. A clean run
  ends with exactly one [`core::record::ChannelEntry::EndOfStream`]. A failed run inserts
  no marker, fires its abort hook once and closes the channel.
- **Consumer:** removes records until the end-of-stream marker and hands them to a
  [`core::item::RecordHandler`].
- **Pipeline:** the owning execution context wiring all of the above, tearing everything
  down when the producer cannot continue.

 ## Features

| **Feature**   | **Description**                                               |
|---------------|---------------------------------------------------------------|
| logger        | Enables a logger `RecordHandler`, useful for debugging purposes (default) |

 ## Getting Started

```rust
# use xml_record_stream::{
#     core::pipeline::{PipelineBuilder, PipelineStatus},
#     item::logger::LoggerHandler,
#     PipelineError,
# };
#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), PipelineError> {
    let xml = r#"<?xml version="1.0"?>
    <ReleaseSet>
      <ClinVarSet ID="1"><Title>first</Title></ClinVarSet>
      <ClinVarSet ID="2"><Title>second</Title></ClinVarSet>
    </ReleaseSet>"#;

    let execution = PipelineBuilder::new()
        .tag("ClinVarSet")
        .channel_capacity(100)
        .handler(LoggerHandler::default())
        .from_reader(xml.as_bytes())?
        .run()
        .await?;

    assert_eq!(execution.status, PipelineStatus::Completed);
    assert_eq!(execution.produced_count(), 2);

    Ok(())
}
```

 ## License
 Licensed under either of

 -   Apache License, Version 2.0
     ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
 -   MIT license
     ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)

 at your option.
 */

/// Configuration of record pipelines
pub mod config;

/// Core module: records, channel, producer, consumers and pipeline
pub mod core;

/// Error types for record pipelines
pub mod error;

#[doc(inline)]
pub use error::*;

/// Record readers and handlers
pub mod item;

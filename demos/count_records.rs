use std::{
    env,
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use xml_record_stream::core::{
    item::RecordHandlerResult,
    pipeline::{PipelineBuilder, PipelineStatus},
    record::Record,
};

const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ReleaseSet Dated="2017-01-01">
  <ClinVarSet ID="1"><RecordStatus>current</RecordStatus><Title>NM_007294.3(BRCA1)</Title></ClinVarSet>
  <ClinVarSet ID="2"><RecordStatus>current</RecordStatus><Title>NM_000059.3(BRCA2)</Title></ClinVarSet>
  <ClinVarSet ID="3"><RecordStatus>replaced</RecordStatus><Title>NM_000546.5(TP53)</Title></ClinVarSet>
</ReleaseSet>
"#;

/// Counts the records of an XML release.
///
/// Usage: `cargo run --example count_records -- [FILE] [TAG]`
/// Without a file, a small sample release is used.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let temp_dir = tempfile::tempdir()?;
    let path = match args.next() {
        Some(path) => path.into(),
        None => {
            let path = temp_dir.path().join("release.xml");
            std::fs::File::create(&path)?.write_all(SAMPLE.as_bytes())?;
            path
        }
    };
    let tag = args.next().unwrap_or_else(|| "ClinVarSet".to_string());

    let bytes = Arc::new(AtomicUsize::new(0));
    let total = bytes.clone();

    let execution = PipelineBuilder::new()
        .name("count-records")
        .tag(tag.as_str())
        .consumers(2)
        .handler(move |record: Record| -> RecordHandlerResult {
            total.fetch_add(record.len(), Ordering::Relaxed);
            Ok(())
        })
        .from_path(&path)?
        .run()
        .await?;

    match execution.status {
        PipelineStatus::Completed => println!(
            "{} <{}> record(s), {} bytes, in {:?}",
            execution.produced_count(),
            tag,
            bytes.load(Ordering::Relaxed),
            execution.duration
        ),
        PipelineStatus::Failed => {
            if let Some(err) = execution.error() {
                anyhow::bail!(
                    "stopped after {} record(s): {}",
                    execution.produced_count(),
                    err
                );
            }
        }
    }

    Ok(())
}

mod common;

use std::io::{Cursor, Write};

use common::{clinvar_release, clinvar_set};
use tempfile::NamedTempFile;
use xml_record_stream::{
    PipelineError,
    core::item::RecordReader,
    item::xml::{XmlRecordReader, XmlRecordReaderBuilder},
};

fn read_all<R: RecordReader>(reader: &R) -> Vec<String> {
    let mut records = Vec::new();
    while let Some(record) = reader.read().unwrap() {
        records.push(record.into_string());
    }
    records
}

#[test]
fn should_read_release_file_byte_exact() -> anyhow::Result<()> {
    let count = 42;
    let mut file = NamedTempFile::new()?;
    file.write_all(clinvar_release(count).as_bytes())?;
    file.flush()?;

    let reader = XmlRecordReaderBuilder::new()
        .tag("ClinVarSet")
        .from_path(file.path())?;

    let records = read_all(&reader);

    assert_eq!(records.len(), count);
    for (index, record) in records.iter().enumerate() {
        assert_eq!(record, &clinvar_set(index));
    }
    assert!(reader.read()?.is_none());

    Ok(())
}

#[test]
fn closing_tags_keep_their_whitespace() {
    let xml = "<ReleaseSet><Set><a>1</a  ></Set ></ReleaseSet >";
    let reader = XmlRecordReaderBuilder::new()
        .tag("Set")
        .from_reader(xml.as_bytes())
        .unwrap();

    assert_eq!(read_all(&reader), vec!["<Set><a>1</a  ></Set >"]);
}

#[test]
fn small_read_buffer_does_not_split_records() {
    let count = 12;
    let reader = XmlRecordReaderBuilder::new()
        .tag("ClinVarSet")
        .capacity(7)
        .from_reader(Cursor::new(clinvar_release(count)))
        .unwrap();

    let records = read_all(&reader);

    assert_eq!(records, (0..count).map(clinvar_set).collect::<Vec<_>>());
}

#[test]
fn large_record_is_returned_whole() {
    let body: String = (0..5_000)
        .map(|i| format!("<Citation id=\"{}\">PMID {}</Citation>", i, i * 7))
        .collect();
    let record = format!("<ClinVarSet ID=\"big\">{}</ClinVarSet>", body);
    let xml = format!("<ReleaseSet>{}{}</ReleaseSet>", record, clinvar_set(1));

    let reader: XmlRecordReader<_> = XmlRecordReaderBuilder::new()
        .tag("ClinVarSet")
        .from_reader(xml.as_bytes())
        .unwrap();

    assert_eq!(reader.read().unwrap().unwrap().as_str(), record);
    assert_eq!(reader.read().unwrap().unwrap().as_str(), clinvar_set(1));
    assert_eq!(reader.read().unwrap(), None);
}

#[test]
fn namespaced_records_match_by_local_name() {
    let xml = concat!(
        "<cv:ReleaseSet xmlns:cv=\"urn:clinvar\">",
        "<cv:ClinVarSet ID=\"1\"><cv:Title>a</cv:Title></cv:ClinVarSet>",
        "<ClinVarSet ID=\"2\"/>",
        "</cv:ReleaseSet>"
    );

    let by_qualified_name = XmlRecordReaderBuilder::new()
        .tag("ClinVarSet")
        .from_reader(xml.as_bytes())
        .unwrap();
    assert_eq!(read_all(&by_qualified_name), vec!["<ClinVarSet ID=\"2\"/>"]);

    let by_local_name = XmlRecordReaderBuilder::new()
        .tag("ClinVarSet")
        .match_local_name(true)
        .from_reader(xml.as_bytes())
        .unwrap();
    assert_eq!(
        read_all(&by_local_name),
        vec![
            "<cv:ClinVarSet ID=\"1\"><cv:Title>a</cv:Title></cv:ClinVarSet>",
            "<ClinVarSet ID=\"2\"/>",
        ]
    );
}

#[test]
fn missing_file_is_a_stream_error() {
    let dir = tempfile::tempdir().unwrap();

    let result = XmlRecordReaderBuilder::new()
        .tag("ClinVarSet")
        .from_path(dir.path().join("missing.xml"));

    assert!(matches!(result, Err(PipelineError::Stream(_))));
}

#[test]
fn malformed_tail_keeps_failing() {
    let xml = format!("<ReleaseSet>{}<ClinVarSet><", clinvar_set(0));
    let reader = XmlRecordReaderBuilder::new()
        .tag("ClinVarSet")
        .from_reader(xml.as_bytes())
        .unwrap();

    assert_eq!(reader.read().unwrap().unwrap().as_str(), clinvar_set(0));
    let first = reader.read().unwrap_err();
    let second = reader.read().unwrap_err();

    assert!(matches!(first, PipelineError::Stream(_)));
    assert_eq!(first, second);
}

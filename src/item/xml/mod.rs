/// XML support for extracting records from large documents.
///
/// This module provides the record extractor used by the producer: it walks a
/// document with `quick-xml`, one event at a time, and returns the exact text
/// of every occurrence of a target element. The document is never loaded as a
/// whole; only the record being assembled is kept in memory.
///
/// # Examples
///
/// ```
/// use xml_record_stream::item::xml::XmlRecordReaderBuilder;
/// use xml_record_stream::core::item::RecordReader;
///
/// let xml_data = r#"<?xml version="1.0" encoding="UTF-8"?>
/// <ReleaseSet Dated="2017-01-01">
///   <ClinVarSet ID="1">
///     <RecordStatus>current</RecordStatus>
///   </ClinVarSet>
///   <ClinVarSet ID="2">
///     <RecordStatus>current</RecordStatus>
///   </ClinVarSet>
/// </ReleaseSet>"#;
///
/// let reader = XmlRecordReaderBuilder::new()
///     .tag("ClinVarSet")
///     .from_reader(xml_data.as_bytes())
///     .unwrap();
///
/// let first = reader.read().unwrap().unwrap();
/// assert!(first.as_str().starts_with(r#"<ClinVarSet ID="1">"#));
/// assert!(first.as_str().ends_with("</ClinVarSet>"));
///
/// assert!(reader.read().unwrap().is_some());
/// assert!(reader.read().unwrap().is_none());
/// ```
pub mod xml_reader;

pub use xml_reader::{XmlRecordReader, XmlRecordReaderBuilder};

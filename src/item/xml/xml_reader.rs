use crate::core::item::{RecordReader, RecordReaderResult};
use crate::core::record::Record;
use crate::error::PipelineError;
use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader as XmlReader;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::str;

/// A builder for creating XML record readers.
///
/// This builder helps configure XML readers with:
/// - The tag name identifying records in the document
/// - Buffer capacity for performance tuning
/// - Various input sources (files, in-memory data, etc.)
///
/// # Examples
///
/// ```
/// use xml_record_stream::item::xml::XmlRecordReaderBuilder;
/// use xml_record_stream::core::item::RecordReader;
/// use std::io::Cursor;
///
/// let xml_data = r#"<release>
///   <ClinVarSet ID="1"><Title>first</Title></ClinVarSet>
///   <ClinVarSet ID="2"><Title>second</Title></ClinVarSet>
/// </release>"#;
///
/// let reader = XmlRecordReaderBuilder::new()
///     .tag("ClinVarSet")
///     .from_reader(Cursor::new(xml_data))
///     .unwrap();
///
/// let mut records = Vec::new();
/// while let Some(record) = reader.read().unwrap() {
///     records.push(record);
/// }
///
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[0].as_str(), r#"<ClinVarSet ID="1"><Title>first</Title></ClinVarSet>"#);
/// ```
pub struct XmlRecordReaderBuilder {
    tag_name: Option<String>,
    capacity: usize,
    match_local_name: bool,
}

impl Default for XmlRecordReaderBuilder {
    fn default() -> Self {
        Self {
            tag_name: None,
            capacity: 8 * 1024,
            match_local_name: false,
        }
    }
}

impl XmlRecordReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the buffer capacity of the underlying reader.
    ///
    /// Higher capacity can improve performance for larger documents
    /// but will use more memory.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the XML tag name of the elements to extract.
    ///
    /// Every occurrence of this element, at any depth, becomes one record.
    pub fn tag<S: AsRef<str>>(mut self, tag_name: S) -> Self {
        self.tag_name = Some(tag_name.as_ref().to_string());
        self
    }

    /// Matches the tag against the local name of elements, ignoring any
    /// namespace prefix (`<ns:Set>` matches tag `Set`).
    pub fn match_local_name(mut self, match_local_name: bool) -> Self {
        self.match_local_name = match_local_name;
        self
    }

    /// Creates an XML record reader from any source implementing `Read`.
    ///
    /// # Errors
    /// Returns `PipelineError::Configuration` if no tag, or an empty tag, was set.
    pub fn from_reader<R: Read>(self, reader: R) -> Result<XmlRecordReader<BufReader<R>>, PipelineError> {
        let tag = match self.tag_name {
            Some(tag) if !tag.is_empty() => tag.into_bytes(),
            _ => {
                return Err(PipelineError::Configuration(
                    "a record tag name is required".to_string(),
                ));
            }
        };

        let buf_reader = BufReader::with_capacity(self.capacity, reader);
        Ok(XmlRecordReader::with_tag(buf_reader, tag, self.match_local_name))
    }

    /// Creates an XML record reader from a file path.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use xml_record_stream::item::xml::XmlRecordReaderBuilder;
    /// use xml_record_stream::core::item::RecordReader;
    ///
    /// let reader = XmlRecordReaderBuilder::new()
    ///     .tag("ClinVarSet")
    ///     .from_path("data/ClinVarFullRelease.xml")
    ///     .unwrap();
    ///
    /// while let Some(record) = reader.read().unwrap() {
    ///     println!("Read record of {} bytes", record.len());
    /// }
    /// ```
    pub fn from_path<P: AsRef<Path>>(
        self,
        path: P,
    ) -> Result<XmlRecordReader<BufReader<File>>, PipelineError> {
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
}

/// Reads records from an XML document, one target element at a time.
///
/// Each record is the exact text of one target element, rebuilt from the raw
/// bytes of the parser events: attributes, whitespace, comments, CDATA
/// sections, entity references and whitespace inside closing tags are kept as
/// written.
///
/// Memory use is bounded by the largest record, not the document. The reader
/// is fused on failure: once a read returned an error, every later read
/// returns the same error.
pub struct XmlRecordReader<R> {
    reader: RefCell<XmlReader<R>>,
    buffer: RefCell<Vec<u8>>,
    record_tag_name: Vec<u8>,
    match_local_name: bool,
    /// Names of the ancestors of the current position, outermost first
    open_elements: RefCell<Vec<Vec<u8>>>,
    failure: RefCell<Option<PipelineError>>,
}

impl<R: BufRead> XmlRecordReader<R> {
    fn with_tag<S: AsRef<[u8]>>(rdr: R, tag: S, match_local_name: bool) -> Self {
        let mut xml_reader = XmlReader::from_reader(rdr);
        let config = xml_reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = false;
        // End names are checked against `open_elements`, on the untrimmed bytes
        config.check_end_names = false;
        config.trim_markup_names_in_closing_tags = false;

        Self {
            reader: RefCell::new(xml_reader),
            buffer: RefCell::new(Vec::with_capacity(1024)),
            record_tag_name: tag.as_ref().to_vec(),
            match_local_name,
            open_elements: RefCell::new(Vec::new()),
            failure: RefCell::new(None),
        }
    }

    fn is_record_tag(&self, start: &BytesStart) -> bool {
        if self.match_local_name {
            start.local_name().as_ref() == self.record_tag_name.as_slice()
        } else {
            start.name().as_ref() == self.record_tag_name.as_slice()
        }
    }

    fn tag_name(&self) -> &str {
        str::from_utf8(&self.record_tag_name).unwrap_or("<binary>")
    }

    fn next_record(&self) -> RecordReaderResult {
        let mut reader = self.reader.borrow_mut();
        let mut buffer = self.buffer.borrow_mut();
        let mut open_elements = self.open_elements.borrow_mut();

        // Skip events until we find an element matching our tag
        loop {
            buffer.clear();
            let event = reader
                .read_event_into(&mut buffer)
                .map_err(|e| parse_error(reader.error_position(), e))?;

            match event {
                Event::Start(ref e) if self.is_record_tag(e) => {
                    debug!("Found start tag: '{}'", self.tag_name());

                    let mut xml = Vec::with_capacity(e.len() * 4);
                    push_start(&mut xml, e, false)?;
                    let name = e.name().as_ref().to_vec();
                    read_element_body(&mut reader, &mut buffer, &mut xml, name, self.tag_name())?;

                    return to_record(xml).map(Some);
                }
                Event::Empty(ref e) if self.is_record_tag(e) => {
                    debug!("Found empty tag: '{}'", self.tag_name());

                    let mut xml = Vec::with_capacity(e.len() + 3);
                    push_start(&mut xml, e, true)?;

                    return to_record(xml).map(Some);
                }
                Event::Start(ref e) => open_elements.push(e.name().as_ref().to_vec()),
                Event::End(ref e) => {
                    close_element(&mut open_elements, e, reader.buffer_position())?
                }
                Event::Eof => {
                    let open = open_elements.len();
                    if open > 0 {
                        return Err(PipelineError::Stream(format!(
                            "Unexpected end of document: {} element(s) left open",
                            open
                        )));
                    }
                    debug!("Reached end of document");
                    return Ok(None);
                }
                _ => continue, // Skip other events
            }
        }
    }
}

impl<R: BufRead> RecordReader for XmlRecordReader<R> {
    fn read(&self) -> RecordReaderResult {
        if let Some(failure) = self.failure.borrow().as_ref() {
            return Err(failure.clone());
        }

        let result = self.next_record();
        if let Err(ref err) = result {
            debug!("Reader failed, further reads will fail: {}", err);
            *self.failure.borrow_mut() = Some(err.clone());
        }
        result
    }
}

fn parse_error(position: u64, err: quick_xml::Error) -> PipelineError {
    PipelineError::Stream(format!("XML parsing error at position {}: {}", position, err))
}

fn to_record(xml: Vec<u8>) -> Result<Record, PipelineError> {
    String::from_utf8(xml)
        .map(Record::new)
        .map_err(|e| PipelineError::Stream(format!("Record is not valid UTF-8: {}", e)))
}

/// Appends a start (or empty) tag as written, after checking its attributes
/// are well-formed.
fn push_start(xml: &mut Vec<u8>, start: &BytesStart, empty: bool) -> Result<(), PipelineError> {
    for attr in start.attributes() {
        attr.map_err(|e| PipelineError::Stream(format!("Malformed attribute: {}", e)))?;
    }

    xml.push(b'<');
    xml.extend_from_slice(start);
    if empty {
        xml.extend_from_slice(b"/>");
    } else {
        xml.push(b'>');
    }
    Ok(())
}

/// Pops the innermost open element, which must carry the name of `end`.
fn close_element(
    open_elements: &mut Vec<Vec<u8>>,
    end: &[u8],
    position: u64,
) -> Result<(), PipelineError> {
    let name = end.trim_ascii_end();
    match open_elements.pop() {
        Some(expected) if expected == name => Ok(()),
        Some(expected) => Err(PipelineError::Stream(format!(
            "XML parsing error at position {}: expecting </{}> found </{}>",
            position,
            String::from_utf8_lossy(&expected),
            String::from_utf8_lossy(name)
        ))),
        None => Err(PipelineError::Stream(format!(
            "XML parsing error at position {}: unexpected </{}>",
            position,
            String::from_utf8_lossy(name)
        ))),
    }
}

/// Copies everything up to and including the end tag matching an already
/// consumed start tag named `name`.
fn read_element_body<R: BufRead>(
    reader: &mut XmlReader<R>,
    buffer: &mut Vec<u8>,
    xml: &mut Vec<u8>,
    name: Vec<u8>,
    tag_name: &str,
) -> Result<(), PipelineError> {
    let mut open_elements = vec![name];
    while !open_elements.is_empty() {
        buffer.clear();
        let event = reader
            .read_event_into(buffer)
            .map_err(|e| parse_error(reader.error_position(), e))?;

        match event {
            Event::Start(ref start) => {
                open_elements.push(start.name().as_ref().to_vec());
                push_start(xml, start, false)?;
            }
            Event::Empty(ref empty) => push_start(xml, empty, true)?,
            Event::End(ref end) => {
                close_element(&mut open_elements, end, reader.buffer_position())?;
                xml.extend_from_slice(b"</");
                xml.extend_from_slice(end);
                xml.push(b'>');
            }
            Event::Text(ref text) => xml.extend_from_slice(text),
            Event::GeneralRef(ref reference) => {
                xml.push(b'&');
                xml.extend_from_slice(reference);
                xml.push(b';');
            }
            Event::CData(ref cdata) => {
                xml.extend_from_slice(b"<![CDATA[");
                xml.extend_from_slice(cdata);
                xml.extend_from_slice(b"]]>");
            }
            Event::Comment(ref comment) => {
                xml.extend_from_slice(b"<!--");
                xml.extend_from_slice(comment);
                xml.extend_from_slice(b"-->");
            }
            Event::PI(ref pi) => {
                xml.extend_from_slice(b"<?");
                xml.extend_from_slice(pi);
                xml.extend_from_slice(b"?>");
            }
            Event::Decl(_) | Event::DocType(_) => {
                return Err(PipelineError::Stream(format!(
                    "Unexpected declaration inside <{}> at position {}",
                    tag_name,
                    reader.buffer_position()
                )));
            }
            Event::Eof => {
                return Err(PipelineError::Stream(format!(
                    "Unexpected end of document inside <{}>",
                    tag_name
                )));
            }
        }
    }

    Ok(())
}

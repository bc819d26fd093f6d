use std::fmt;

/// One complete serialization of a target element, exactly as it appeared in
/// the source document.
///
/// A `Record` is immutable once produced: the text is never reformatted or
/// re-encoded. Interpreting the content is left to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record(String);

impl Record {
    pub fn new<S: Into<String>>(xml: S) -> Self {
        Record(xml.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for Record {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Record> for String {
    fn from(record: Record) -> Self {
        record.0
    }
}

/// A value travelling through the record channel.
///
/// A clean run places exactly one [`ChannelEntry::EndOfStream`] after the last
/// record. An aborted run places none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEntry {
    Record(Record),
    EndOfStream,
}

impl ChannelEntry {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, ChannelEntry::EndOfStream)
    }

    /// Returns the record carried by this entry, if any.
    pub fn into_record(self) -> Option<Record> {
        match self {
            ChannelEntry::Record(record) => Some(record),
            ChannelEntry::EndOfStream => None,
        }
    }
}

impl From<Record> for ChannelEntry {
    fn from(record: Record) -> Self {
        ChannelEntry::Record(record)
    }
}

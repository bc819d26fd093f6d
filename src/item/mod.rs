#[cfg(feature = "logger")]
/// This module provides a logger record handler, useful for debugging purposes.
pub mod logger;

/// This module provides the XML record reader.
pub mod xml;

//! Line-level reading and field parsing for D0010 flow files.
//!
//! [`reader::RecordReader`] turns file contents into positional records and
//! [`records`] turns each record's fields into typed values. Failures are
//! scoped to one line and reported as [`RecordError`]; nothing here aborts a
//! whole file.

pub mod reader;
pub mod records;

use std::fmt;

use serde::Serialize;

pub use reader::{RawRecord, RecordReader, RecordType};
pub use records::{HeaderRecord, MeterPointRecord, MeterRecord, ReadingRecord, TrailerRecord};

/// Non-fatal, per-line failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordErrorKind {
    #[serde(rename = "MalformedRecordError")]
    MalformedRecord,
    #[serde(rename = "InvalidMpanError")]
    InvalidMpan,
    #[serde(rename = "InvalidSerialError")]
    InvalidSerial,
    #[serde(rename = "InvalidMeterTypeError")]
    InvalidMeterType,
    #[serde(rename = "InvalidDateError")]
    InvalidDate,
    #[serde(rename = "InvalidReadingValueError")]
    InvalidReadingValue,
    #[serde(rename = "FutureDateError")]
    FutureDate,
    #[serde(rename = "OrphanMeterError")]
    OrphanMeter,
    #[serde(rename = "OrphanReadingError")]
    OrphanReading,
}

impl RecordErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedRecord => "MalformedRecordError",
            Self::InvalidMpan => "InvalidMpanError",
            Self::InvalidSerial => "InvalidSerialError",
            Self::InvalidMeterType => "InvalidMeterTypeError",
            Self::InvalidDate => "InvalidDateError",
            Self::InvalidReadingValue => "InvalidReadingValueError",
            Self::FutureDate => "FutureDateError",
            Self::OrphanMeter => "OrphanMeterError",
            Self::OrphanReading => "OrphanReadingError",
        }
    }
}

impl fmt::Display for RecordErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("line {line}: {kind}: {message}")]
pub struct RecordError {
    pub line: u64,
    pub kind: RecordErrorKind,
    pub message: String,
}

impl RecordError {
    pub fn new(line: u64, kind: RecordErrorKind, message: impl Into<String>) -> Self {
        Self {
            line,
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(line: u64, message: impl Into<String>) -> Self {
        Self::new(line, RecordErrorKind::MalformedRecord, message)
    }
}

/// Conditions worth reporting that never count as record errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WarningKind {
    #[serde(rename = "UnrecognizedRecordTypeWarning")]
    UnrecognizedRecordType,
    #[serde(rename = "TrailerCountMismatchWarning")]
    TrailerCountMismatch,
    #[serde(rename = "MissingHeaderWarning")]
    MissingHeader,
}

impl WarningKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnrecognizedRecordType => "UnrecognizedRecordTypeWarning",
            Self::TrailerCountMismatch => "TrailerCountMismatchWarning",
            Self::MissingHeader => "MissingHeaderWarning",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordWarning {
    /// `None` for file-level conditions such as a missing header.
    pub line: Option<u64>,
    pub kind: WarningKind,
    pub message: String,
}

impl RecordWarning {
    pub fn new(line: Option<u64>, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            line,
            kind,
            message: message.into(),
        }
    }
}

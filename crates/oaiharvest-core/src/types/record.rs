//! Harvested record type.

use crate::error::{Error, UsageError};

use super::RecordHeader;

/// A harvested record: its header and, unless deleted, its metadata payload.
///
/// The payload of a deleted record is never materialized. Asking for it is a
/// usage error rather than an empty result.
///
/// A live record's payload is materialized eagerly, when the `GetRecord`
/// response is parsed. Callers only ever see it through [`Record::metadata`]
/// or [`Record::into_metadata`], so the record stays valid after its
/// connection is closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    header: RecordHeader,
    /// Serialized metadata subtree; always `None` for deleted headers.
    metadata: Option<Vec<u8>>,
}

impl Record {
    /// Create a record with a metadata payload.
    ///
    /// If the header is marked deleted, the payload is discarded.
    pub fn new(header: RecordHeader, metadata: Vec<u8>) -> Self {
        let metadata = (!header.is_deleted()).then_some(metadata);
        Self { header, metadata }
    }

    /// Create a record for a deleted header.
    pub fn deleted(header: RecordHeader) -> Self {
        Self {
            header,
            metadata: None,
        }
    }

    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    /// The serialized metadata document.
    ///
    /// # Errors
    ///
    /// Always fails with [`UsageError::DeletedRecord`] for deleted records.
    pub fn metadata(&self) -> Result<&[u8], Error> {
        match &self.metadata {
            Some(bytes) if !self.header.is_deleted() => Ok(bytes),
            _ => Err(deleted(&self.header)),
        }
    }

    /// Consume the record and return its metadata document.
    pub fn into_metadata(self) -> Result<Vec<u8>, Error> {
        match self.metadata {
            Some(bytes) if !self.header.is_deleted() => Ok(bytes),
            _ => Err(deleted(&self.header)),
        }
    }
}

fn deleted(header: &RecordHeader) -> Error {
    UsageError::DeletedRecord {
        identifier: header.oai_identifier().to_string(),
    }
    .into()
}

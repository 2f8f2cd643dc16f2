//! Record header type.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The protocol envelope of one record.
///
/// Two headers are equal when their identifiers are equal, whatever their
/// datestamps or deletion status.
#[derive(Clone, Debug, Serialize)]
pub struct RecordHeader {
    oai_identifier: String,
    is_deleted: bool,
    datestamp: Option<DateTime<Utc>>,
    set_specs: Vec<String>,
}

impl RecordHeader {
    pub fn new(
        oai_identifier: impl Into<String>,
        is_deleted: bool,
        datestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            oai_identifier: oai_identifier.into(),
            is_deleted,
            datestamp,
            set_specs: Vec::new(),
        }
    }

    /// Attach the sets this record belongs to.
    pub fn with_set_specs(mut self, set_specs: Vec<String>) -> Self {
        self.set_specs = set_specs;
        self
    }

    pub fn oai_identifier(&self) -> &str {
        &self.oai_identifier
    }

    /// Whether the repository reports this record as deleted.
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn datestamp(&self) -> Option<&DateTime<Utc>> {
        self.datestamp.as_ref()
    }

    pub fn set_specs(&self) -> &[String] {
        &self.set_specs
    }
}

impl PartialEq for RecordHeader {
    fn eq(&self, other: &Self) -> bool {
        self.oai_identifier == other.oai_identifier
    }
}

impl Eq for RecordHeader {}

impl Hash for RecordHeader {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.oai_identifier.hash(state);
    }
}

impl fmt::Display for RecordHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.oai_identifier)?;
        if self.is_deleted {
            write!(f, " (deleted)")?;
        }
        Ok(())
    }
}

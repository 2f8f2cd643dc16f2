//! Parsing of OAI-PMH responses.
//!
//! All element paths are compiled once, when the [`RecordParser`] is built,
//! and the parser is then shared (behind an `Arc`) by every harvest of a
//! [`Harvester`](crate::Harvester). Compiled paths are immutable and each
//! call uses its own XML reader, so concurrent parsing needs no lock.

mod xml;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::debug;

use oaiharvest_core::{Error, ProtocolError, Record, RecordHeader, Result};

pub use xml::{Element, ElementPath};

use xml::{select_elements, select_subtrees};

const ROOT: &str = "OAI-PMH";
const ERROR_PATH: &str = "OAI-PMH/error";
const RECORD_HEADER_PATH: &str = "OAI-PMH/GetRecord/record/header";
const RECORD_METADATA_PATH: &str = "OAI-PMH/GetRecord/record/metadata/*";
const LIST_HEADER_PATH: &str = "OAI-PMH/ListIdentifiers/header";
const RESUMPTION_TOKEN_PATH: &str = "OAI-PMH/ListIdentifiers/resumptionToken";

/// OAI-PMH error code for an empty list result.
pub const NO_RECORDS_MATCH: &str = "noRecordsMatch";

/// One page of a `ListIdentifiers` response.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderPage {
    /// Headers in server order.
    pub headers: Vec<RecordHeader>,
    /// Token for the next page; `None` when this is the last page.
    pub resumption_token: Option<String>,
    /// Total list size, if the repository reports it.
    pub complete_list_size: Option<u64>,
}

/// Parser for `GetRecord` and `ListIdentifiers` responses.
#[derive(Debug, Clone)]
pub struct RecordParser {
    error: ElementPath,
    record_header: ElementPath,
    record_metadata: ElementPath,
    list_header: ElementPath,
    resumption_token: ElementPath,
}

impl RecordParser {
    /// Compile the element paths.
    pub fn new() -> Result<Self> {
        Ok(Self {
            error: ElementPath::compile(ERROR_PATH)?,
            record_header: ElementPath::compile(RECORD_HEADER_PATH)?,
            record_metadata: ElementPath::compile(RECORD_METADATA_PATH)?,
            list_header: ElementPath::compile(LIST_HEADER_PATH)?,
            resumption_token: ElementPath::compile(RESUMPTION_TOKEN_PATH)?,
        })
    }

    /// Parse a `GetRecord` response for `identifier`.
    ///
    /// Exactly one header is required. Unless the header is marked deleted,
    /// exactly one element inside `<metadata>` is required as well; it becomes
    /// the record's payload. Metadata of deleted records is not looked at.
    pub fn parse_record(&self, identifier: &str, xml: &[u8]) -> Result<Record> {
        let context = format!("GetRecord response for {identifier}");
        self.check_oai_error(xml, &context)?;

        let headers = select_elements(xml, &self.record_header)
            .map_err(|message| malformed(&context, message))?
            .matches;
        let header = match headers.as_slice() {
            [] => {
                return Err(ProtocolError::EmptyRecordHeader {
                    identifier: identifier.to_string(),
                }
                .into());
            }
            [element] => header_from_element(element, &context)?,
            _ => {
                return Err(ProtocolError::MultipleHeaders {
                    identifier: identifier.to_string(),
                    count: headers.len(),
                }
                .into());
            }
        };

        if header.is_deleted() {
            debug!(identifier = header.oai_identifier(), "Record is deleted");
            return Ok(Record::deleted(header));
        }

        let mut payloads = select_subtrees(xml, &self.record_metadata)
            .map_err(|message| malformed(&context, message))?
            .matches;
        match payloads.len() {
            0 => Err(ProtocolError::EmptyNonDeletedRecord {
                identifier: header.oai_identifier().to_string(),
            }
            .into()),
            1 => {
                let metadata = payloads.remove(0);
                Ok(Record::new(header, metadata))
            }
            count => Err(ProtocolError::MultipleMetadata {
                identifier: header.oai_identifier().to_string(),
                count,
            }
            .into()),
        }
    }

    /// Parse one `ListIdentifiers` page.
    ///
    /// An OAI-PMH error response is returned as [`ProtocolError::Oai`]; the
    /// caller decides whether it means an empty list.
    pub fn parse_header_page(&self, xml: &[u8], context: &str) -> Result<HeaderPage> {
        self.check_oai_error(xml, context)?;

        let headers = select_elements(xml, &self.list_header)
            .map_err(|message| malformed(context, message))?
            .matches
            .iter()
            .map(|element| header_from_element(element, context))
            .collect::<Result<Vec<_>>>()?;

        let (resumption_token, complete_list_size) = match self.resumption_token_element(xml, context)? {
            Some(token) => {
                let value = Some(token.text().to_string()).filter(|t| !t.is_empty());
                (value, complete_list_size(&token))
            }
            None => (None, None),
        };

        Ok(HeaderPage {
            headers,
            resumption_token,
            complete_list_size,
        })
    }

    /// Read `completeListSize` from a `ListIdentifiers` response.
    ///
    /// Returns `None` if the repository does not report a usable value,
    /// including when it answers with an OAI-PMH error.
    pub fn read_complete_list_size(&self, xml: &[u8], context: &str) -> Result<Option<u64>> {
        match self.check_oai_error(xml, context) {
            Ok(()) => {}
            Err(err @ Error::Protocol(ProtocolError::Oai { .. })) => {
                debug!(error = %err, "Cannot read completeListSize from OAI response");
                return Ok(None);
            }
            Err(err) => return Err(err),
        }
        Ok(self
            .resumption_token_element(xml, context)?
            .and_then(|token| complete_list_size(&token)))
    }

    fn resumption_token_element(&self, xml: &[u8], context: &str) -> Result<Option<Element>> {
        let mut tokens = select_elements(xml, &self.resumption_token)
            .map_err(|message| malformed(context, message))?
            .matches;
        if tokens.len() > 1 {
            return Err(ProtocolError::ResumptionToken {
                message: format!("{} resumption tokens in {context}", tokens.len()),
            }
            .into());
        }
        Ok(tokens.pop())
    }

    /// Fail on a missing `OAI-PMH` root or an OAI-PMH `<error>` element.
    fn check_oai_error(&self, xml: &[u8], context: &str) -> Result<()> {
        let selection = select_elements(xml, &self.error).map_err(|message| malformed(context, message))?;
        if selection.root.as_deref() != Some(ROOT) {
            return Err(malformed(
                context,
                format!(
                    "expected <{ROOT}> document element, found <{}>",
                    selection.root.unwrap_or_default()
                ),
            )
            .into());
        }
        match selection.matches.first() {
            Some(error) => Err(ProtocolError::Oai {
                code: error.attribute("code").unwrap_or("unknown").to_string(),
                message: error.text().to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

fn complete_list_size(token: &Element) -> Option<u64> {
    let value = token.attribute("completeListSize")?;
    match value.trim().parse() {
        Ok(size) => Some(size),
        Err(e) => {
            debug!(value, error = %e, "Ignoring unreadable completeListSize");
            None
        }
    }
}

fn header_from_element(element: &Element, context: &str) -> Result<RecordHeader> {
    let identifier = element
        .child("identifier")
        .map(Element::text)
        .filter(|identifier| !identifier.is_empty())
        .ok_or_else(|| ProtocolError::MissingIdentifier {
            context: context.to_string(),
        })?;

    let is_deleted = element.attribute("status") == Some("deleted");
    let datestamp = element
        .child("datestamp")
        .map(Element::text)
        .filter(|value| !value.is_empty())
        .map(|value| parse_datestamp(identifier, value))
        .transpose()?;
    let set_specs = element
        .children_named("setSpec")
        .map(|set| set.text().to_string())
        .collect();

    Ok(RecordHeader::new(identifier, is_deleted, datestamp).with_set_specs(set_specs))
}

/// Parse a datestamp of day or second granularity. Days become midnight UTC.
fn parse_datestamp(identifier: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|instant| instant.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|day| day.and_time(NaiveTime::MIN).and_utc())
        })
        .map_err(|_| {
            ProtocolError::InvalidDatestamp {
                identifier: identifier.to_string(),
                value: value.to_string(),
            }
            .into()
        })
}

fn malformed(context: &str, message: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedXml {
        context: context.to_string(),
        message: message.into(),
    }
}

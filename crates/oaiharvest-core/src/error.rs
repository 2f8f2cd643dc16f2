//! Error types for the oaiharvest toolkit.
//!
//! A single [`Error`] type is returned from every public operation. Its
//! variants separate the four ways a harvest can fail: the transport gave up
//! after retrying, the repository answered with something that is not a
//! usable OAI-PMH response, the caller misused the API, or the harvest could
//! not be set up in the first place.

use thiserror::Error;

/// The unified error type for harvesting operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network or HTTP failure, after retries were exhausted.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed or structurally unexpected OAI-PMH response.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Misuse of the API by the caller.
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),

    /// The harvest session could not be initialized.
    #[error("setup error: {0}")]
    Setup(#[from] SetupError),
}

impl Error {
    /// Returns true if repeating the identical request may succeed.
    ///
    /// Only transport failures qualify. An interruption is
    /// final, as are all protocol and usage errors.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(e) if !matches!(e, TransportError::Interrupted))
    }

    /// Returns true if this error was caused by an interruption of a retry wait.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Interrupted))
    }
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection to the repository could not be established.
    #[error("connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    /// The request did not complete within the configured timeouts.
    #[error("request to {url} timed out: {message}")]
    Timeout { url: String, message: String },

    /// The repository answered with a status other than 200.
    #[error("{url} returned HTTP status {status}")]
    Status { url: String, status: u16 },

    /// Reading the response body failed.
    #[error("failed to read response from {url}: {message}")]
    Body { url: String, message: String },

    /// Any other HTTP client failure.
    #[error("HTTP error for {url}: {message}")]
    Http { url: String, message: String },

    /// The wait between two attempts was interrupted.
    #[error("interrupted while waiting to retry")]
    Interrupted,
}

/// Errors in the content of an OAI-PMH response.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The response is not well-formed XML.
    #[error("malformed XML in {context}: {message}")]
    MalformedXml { context: String, message: String },

    /// The GetRecord response contained no header.
    #[error("empty record header for {identifier}")]
    EmptyRecordHeader { identifier: String },

    /// The GetRecord response contained more than one header.
    #[error("malformed response for {identifier}: multiple headers ({count})")]
    MultipleHeaders { identifier: String, count: usize },

    /// A non-deleted record carried no metadata.
    #[error("empty non-deleted record {identifier}")]
    EmptyNonDeletedRecord { identifier: String },

    /// A record carried more than one metadata element.
    #[error("malformed response for {identifier}: multiple metadata elements ({count})")]
    MultipleMetadata { identifier: String, count: usize },

    /// A header lacked its identifier element.
    #[error("header without identifier in {context}")]
    MissingIdentifier { context: String },

    /// A datestamp could not be parsed.
    #[error("invalid datestamp '{value}' for {identifier}")]
    InvalidDatestamp { identifier: String, value: String },

    /// The repository answered with an OAI-PMH error element.
    #[error("repository reported {code}: {message}")]
    Oai { code: String, message: String },

    /// The resumption token could not be used to continue the list.
    #[error("unusable resumption token: {message}")]
    ResumptionToken { message: String },
}

/// Errors caused by the caller.
#[derive(Debug, Error)]
pub enum UsageError {
    /// The metadata of a deleted record was requested.
    #[error("record {identifier} is deleted and has no metadata")]
    DeletedRecord { identifier: String },

    /// A request was issued on a connection that was already closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// A descriptor was constructed from invalid values.
    #[error("invalid {field} '{value}': {reason}")]
    InvalidInput {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors while initializing a harvest.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The repository rejected the initial request.
    #[error("{url} rejected the harvest with {code}: {message}")]
    Rejected {
        url: String,
        code: String,
        message: String,
    },

    /// An element path expression could not be compiled.
    #[error("invalid element path '{expression}': {reason}")]
    Expression { expression: String, reason: String },

    /// The HTTP client could not be built.
    #[error("cannot build HTTP client: {message}")]
    Client { message: String },

    /// The harvester configuration is invalid.
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl UsageError {
    /// Create an invalid input error.
    pub fn invalid(field: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        UsageError::InvalidInput {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

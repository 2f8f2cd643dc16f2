//! OAI-PMH request model.
//!
//! An [`OaiRequest`] is one verb plus its arguments, ready to be rendered as
//! the query string of an HTTP GET against a repository's base URL.

use std::fmt;
use std::io::{self, Read};

use crate::types::{HarvestRequest, RepositoryRef};

/// The OAI-PMH verbs issued by the harvester.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    ListIdentifiers,
    GetRecord,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::ListIdentifiers => "ListIdentifiers",
            Verb::GetRecord => "GetRecord",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One OAI-PMH request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OaiRequest {
    verb: Verb,
    arguments: Vec<(&'static str, String)>,
}

impl OaiRequest {
    /// The first `ListIdentifiers` request of a harvest.
    pub fn list_identifiers(request: &HarvestRequest) -> Self {
        let granularity = request.granularity();
        let mut arguments = vec![("metadataPrefix", request.metadata_prefix().to_string())];
        if let Some(set_spec) = request.set_spec() {
            arguments.push(("set", set_spec.to_string()));
        }
        if let Some(from) = request.from() {
            arguments.push(("from", granularity.format(from)));
        }
        if let Some(until) = request.until() {
            arguments.push(("until", granularity.format(until)));
        }
        Self {
            verb: Verb::ListIdentifiers,
            arguments,
        }
    }

    /// A follow-up `ListIdentifiers` request.
    ///
    /// The resumption token is exclusive: no other argument may accompany it.
    pub fn resume_list_identifiers(resumption_token: impl Into<String>) -> Self {
        Self {
            verb: Verb::ListIdentifiers,
            arguments: vec![("resumptionToken", resumption_token.into())],
        }
    }

    /// A `GetRecord` request for one identifier.
    pub fn get_record(repository: &RepositoryRef, identifier: impl Into<String>) -> Self {
        Self {
            verb: Verb::GetRecord,
            arguments: vec![
                ("identifier", identifier.into()),
                ("metadataPrefix", repository.metadata_prefix().to_string()),
            ],
        }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Returns the value of one argument, if present.
    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Query pairs in wire order, starting with the verb.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        std::iter::once(("verb", self.verb.as_str()))
            .chain(self.arguments.iter().map(|(key, value)| (*key, value.as_str())))
            .collect()
    }
}

impl fmt::Display for OaiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb)?;
        for (key, value) in &self.arguments {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

/// The body of one successful response.
///
/// Dropping the body releases the underlying connection resources, whether
/// or not it was read to the end.
pub struct ResponseBody {
    source: String,
    reader: Box<dyn Read + Send>,
}

impl ResponseBody {
    /// Wrap a reader. `source` names where the body came from, for errors.
    pub fn new(source: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            source: source.into(),
            reader: Box::new(reader),
        }
    }

    /// A body backed by bytes already in memory.
    pub fn from_bytes(source: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(source, io::Cursor::new(bytes.into()))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Read the whole body, consuming it.
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

//! Repository reference type.

use serde::Serialize;
use std::fmt;
use url::Url;

use crate::error::{Error, UsageError};

/// An OAI-PMH endpoint together with the metadata format to request from it.
///
/// # Example
///
/// ```
/// use oaiharvest_core::RepositoryRef;
///
/// let repository = RepositoryRef::new("http://example.org/oai", "edm").unwrap();
/// assert_eq!(repository.repository_url(), "http://example.org/oai");
/// assert_eq!(repository.metadata_prefix(), "edm");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct RepositoryRef {
    repository_url: Url,
    metadata_prefix: String,
}

impl RepositoryRef {
    /// Create a repository reference, validating both values.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the URL is not an absolute `http`/`https`
    /// URL or the metadata prefix is blank.
    pub fn new(
        repository_url: impl AsRef<str>,
        metadata_prefix: impl Into<String>,
    ) -> Result<Self, Error> {
        let raw = repository_url.as_ref();
        let url = Url::parse(raw)
            .map_err(|e| UsageError::invalid("repository URL", raw, e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UsageError::invalid("repository URL", raw, "scheme must be http or https").into());
        }

        let metadata_prefix = metadata_prefix.into();
        if metadata_prefix.trim().is_empty() {
            return Err(UsageError::invalid("metadata prefix", metadata_prefix, "cannot be empty").into());
        }

        Ok(Self {
            repository_url: url,
            metadata_prefix,
        })
    }

    /// Returns the endpoint URL as given (after normalization by the URL parser).
    pub fn repository_url(&self) -> &str {
        self.repository_url.as_str()
    }

    /// Returns the endpoint URL.
    pub fn as_url(&self) -> &Url {
        &self.repository_url
    }

    /// Returns the requested metadata format.
    pub fn metadata_prefix(&self) -> &str {
        &self.metadata_prefix
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.repository_url, self.metadata_prefix)
    }
}

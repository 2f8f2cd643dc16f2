//! Harvest request type.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, UsageError};

use super::RepositoryRef;

/// Datestamp granularity used when sending `from`/`until` to a repository.
///
/// OAI-PMH repositories advertise either day or second granularity. A
/// repository that only supports days rejects full timestamps with
/// `badArgument`, so the request has to be rendered accordingly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// `YYYY-MM-DD`
    Day,
    /// `YYYY-MM-DDThh:mm:ssZ`
    #[default]
    Second,
}

impl Granularity {
    /// Render an instant in this granularity, in UTC.
    pub fn format(self, instant: &DateTime<Utc>) -> String {
        match self {
            Granularity::Day => instant.format("%Y-%m-%d").to_string(),
            Granularity::Second => instant.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// A selective or incremental harvest of one repository.
///
/// Built through [`HarvestRequest::builder`].
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use oaiharvest_core::{HarvestRequest, RepositoryRef};
///
/// let repository = RepositoryRef::new("http://example.org/oai", "edm").unwrap();
/// let request = HarvestRequest::builder(repository)
///     .set_spec("setA")
///     .from(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
///     .until(Utc.with_ymd_and_hms(2020, 1, 31, 23, 59, 59).unwrap())
///     .build()
///     .unwrap();
/// assert_eq!(request.set_spec(), Some("setA"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HarvestRequest {
    repository: RepositoryRef,
    set_spec: Option<String>,
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    granularity: Granularity,
}

impl HarvestRequest {
    /// Start building a request for the given repository.
    pub fn builder(repository: RepositoryRef) -> HarvestRequestBuilder {
        HarvestRequestBuilder {
            request: HarvestRequest {
                repository,
                set_spec: None,
                from: None,
                until: None,
                granularity: Granularity::default(),
            },
        }
    }

    /// A request for every record of the repository.
    pub fn full(repository: RepositoryRef) -> Self {
        Self::builder(repository).request
    }

    pub fn repository(&self) -> &RepositoryRef {
        &self.repository
    }

    pub fn repository_url(&self) -> &str {
        self.repository.repository_url()
    }

    pub fn metadata_prefix(&self) -> &str {
        self.repository.metadata_prefix()
    }

    pub fn set_spec(&self) -> Option<&str> {
        self.set_spec.as_deref()
    }

    pub fn from(&self) -> Option<&DateTime<Utc>> {
        self.from.as_ref()
    }

    pub fn until(&self) -> Option<&DateTime<Utc>> {
        self.until.as_ref()
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }
}

/// Builder for [`HarvestRequest`].
#[derive(Debug, Clone)]
pub struct HarvestRequestBuilder {
    request: HarvestRequest,
}

impl HarvestRequestBuilder {
    /// Restrict the harvest to one set.
    pub fn set_spec(mut self, set_spec: impl Into<String>) -> Self {
        self.request.set_spec = Some(set_spec.into());
        self
    }

    /// Only harvest records changed at or after this instant.
    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.request.from = Some(from);
        self
    }

    /// Only harvest records changed at or before this instant.
    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.request.until = Some(until);
        self
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.request.granularity = granularity;
        self
    }

    /// Validate and build the request.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the set spec is blank or if `from` is later
    /// than `until`.
    pub fn build(self) -> Result<HarvestRequest, Error> {
        let request = self.request;

        if let Some(set_spec) = &request.set_spec {
            if set_spec.trim().is_empty() {
                return Err(UsageError::invalid("set spec", set_spec.as_str(), "cannot be empty").into());
            }
        }

        if let (Some(from), Some(until)) = (&request.from, &request.until) {
            if from > until {
                return Err(UsageError::invalid(
                    "harvest window",
                    format!("{} .. {}", from.to_rfc3339(), until.to_rfc3339()),
                    "from must not be later than until",
                )
                .into());
            }
        }

        Ok(request)
    }
}

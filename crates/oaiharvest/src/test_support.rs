//! Canned OAI-PMH responses and an in-memory connection for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use oaiharvest_core::{
    Connection, ConnectionFactory, OaiRequest, ResponseBody, Result, TransportError, UsageError,
    Verb,
};

const NAMESPACES: &str = r#"xmlns="http://www.openarchives.org/OAI/2.0/"
         xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:edm="http://www.europeana.eu/schemas/edm/""#;

/// A `ListIdentifiers` response. Headers at `deleted` indices are marked deleted.
pub fn list_page(
    identifiers: &[String],
    deleted: &[usize],
    token: Option<&str>,
    complete_list_size: Option<u64>,
) -> String {
    let mut headers = String::new();
    for (index, identifier) in identifiers.iter().enumerate() {
        let status = if deleted.contains(&index) { r#" status="deleted""# } else { "" };
        headers.push_str(&format!(
            "<header{status}><identifier>{identifier}</identifier><datestamp>2020-01-15T10:00:00Z</datestamp><setSpec>setA</setSpec></header>\n"
        ));
    }
    let token = match (token, complete_list_size) {
        (Some(token), Some(size)) => {
            format!(r#"<resumptionToken completeListSize="{size}" cursor="0">{token}</resumptionToken>"#)
        }
        (Some(token), None) => format!("<resumptionToken>{token}</resumptionToken>"),
        (None, _) => String::new(),
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH {NAMESPACES}>
  <responseDate>2020-02-01T00:00:00Z</responseDate>
  <request verb="ListIdentifiers">http://example.org/oai</request>
  <ListIdentifiers>
{headers}{token}
  </ListIdentifiers>
</OAI-PMH>"#
    )
}

/// A `GetRecord` response.
pub fn record_response(identifier: &str, deleted: bool, metadata: Option<&str>) -> String {
    let status = if deleted { r#" status="deleted""# } else { "" };
    let metadata = metadata
        .map(|payload| format!("<metadata>{payload}</metadata>"))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH {NAMESPACES}>
  <responseDate>2020-02-01T00:00:00Z</responseDate>
  <GetRecord>
    <record>
      <header{status}>
        <identifier>{identifier}</identifier>
        <datestamp>2020-01-15T10:00:00Z</datestamp>
        <setSpec>setA</setSpec>
      </header>
      {metadata}
    </record>
  </GetRecord>
</OAI-PMH>"#
    )
}

/// An OAI-PMH error response.
pub fn oai_error(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <responseDate>2020-02-01T00:00:00Z</responseDate>
  <error code="{code}">{message}</error>
</OAI-PMH>"#
    )
}

#[derive(Debug, Clone)]
pub enum FixtureResponse {
    Body(String),
    Status(u16),
}

/// What a fixture connection saw. Shared between clones.
#[derive(Debug, Clone, Default)]
pub struct FixtureLog {
    requests: Arc<Mutex<Vec<OaiRequest>>>,
    closes: Arc<AtomicUsize>,
}

impl FixtureLog {
    pub fn requests(&self) -> Vec<OaiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Serves canned responses keyed by verb and resumption token or identifier.
#[derive(Debug, Clone)]
pub struct FixtureConnection {
    url: String,
    responses: HashMap<String, FixtureResponse>,
    log: FixtureLog,
    closed: bool,
    fail_close: bool,
}

impl FixtureConnection {
    pub fn new() -> Self {
        Self {
            url: "http://example.org/oai".to_string(),
            responses: HashMap::new(),
            log: FixtureLog::default(),
            closed: false,
            fail_close: false,
        }
    }

    /// A repository listing `sizes.iter().sum()` identifiers over `sizes.len()` pages.
    ///
    /// Every `deleted_every`-th identifier (1-based) is deleted.
    pub fn paged(sizes: &[usize], deleted_every: Option<usize>) -> (Self, Vec<String>) {
        let total: usize = sizes.iter().sum();
        let mut fixture = Self::new();
        let mut all = Vec::new();
        let mut offset = 0;
        for (page, size) in sizes.iter().enumerate() {
            let identifiers: Vec<String> =
                (offset..offset + size).map(|n| format!("oai:example.org:{n}")).collect();
            let deleted: Vec<usize> = (0..*size)
                .filter(|i| deleted_every.is_some_and(|every| (offset + i + 1) % every == 0))
                .collect();
            let token = (page + 1 < sizes.len()).then(|| format!("token-{}", page + 1));
            let body = list_page(&identifiers, &deleted, Some(token.as_deref().unwrap_or("")), Some(total as u64));
            let key = if page == 0 { None } else { Some(format!("token-{page}")) };
            fixture = fixture.with_list_page(key.as_deref(), FixtureResponse::Body(body));
            all.extend(identifiers);
            offset += size;
        }
        (fixture, all)
    }

    pub fn with_list_page(mut self, token: Option<&str>, response: FixtureResponse) -> Self {
        self.responses.insert(list_key(token), response);
        self
    }

    pub fn with_record(mut self, identifier: &str, response: FixtureResponse) -> Self {
        self.responses.insert(format!("GetRecord:{identifier}"), response);
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn log(&self) -> FixtureLog {
        self.log.clone()
    }
}

fn list_key(token: Option<&str>) -> String {
    match token {
        Some(token) => format!("ListIdentifiers:{token}"),
        None => "ListIdentifiers".to_string(),
    }
}

impl Connection for FixtureConnection {
    fn repository_url(&self) -> &str {
        &self.url
    }

    fn execute(&mut self, request: &OaiRequest) -> Result<ResponseBody> {
        if self.closed {
            return Err(UsageError::ConnectionClosed.into());
        }
        self.log.requests.lock().unwrap().push(request.clone());

        let key = match request.verb() {
            Verb::ListIdentifiers => list_key(request.argument("resumptionToken")),
            Verb::GetRecord => format!("GetRecord:{}", request.argument("identifier").unwrap_or_default()),
        };
        match self.responses.get(&key) {
            Some(FixtureResponse::Body(body)) => Ok(ResponseBody::from_bytes(key, body.clone())),
            Some(FixtureResponse::Status(status)) => Err(TransportError::Status {
                url: self.url.clone(),
                status: *status,
            }
            .into()),
            None => Err(TransportError::Status {
                url: self.url.clone(),
                status: 404,
            }
            .into()),
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.log.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(TransportError::Http {
                    url: self.url.clone(),
                    message: "close failed".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Hands out fresh copies of one fixture, all sharing its log.
#[derive(Debug, Clone)]
pub struct FixtureFactory {
    template: FixtureConnection,
}

impl FixtureFactory {
    pub fn new(template: FixtureConnection) -> Self {
        Self { template }
    }
}

impl ConnectionFactory for FixtureFactory {
    type Connection = FixtureConnection;

    fn connect(&self, _repository_url: &str) -> Result<FixtureConnection> {
        Ok(self.template.clone())
    }
}

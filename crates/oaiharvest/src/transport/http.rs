//! Blocking HTTP connection to an OAI-PMH repository.

use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::{debug, instrument, trace};
use url::Url;

use oaiharvest_core::{
    Connection, ConnectionFactory, OaiRequest, ResponseBody, Result, SetupError, TransportError,
    UsageError,
};

use crate::config::HarvesterConfig;

use super::retry::{Interrupter, RetryPolicy};

/// An HTTP session against one repository.
///
/// Owns its own HTTP client, so closing it releases every pooled
/// connection. A closed connection refuses further requests.
#[derive(Debug)]
pub struct HttpConnection {
    base_url: Url,
    client: Option<Client>,
    retry: RetryPolicy,
    interrupter: Interrupter,
}

impl HttpConnection {
    /// Open a connection to `repository_url`.
    pub fn new(repository_url: &str, config: &HarvesterConfig) -> Result<Self> {
        Self::with_interrupter(repository_url, config, Interrupter::new())
    }

    /// Open a connection whose retry waits can be cancelled through `interrupter`.
    pub fn with_interrupter(
        repository_url: &str,
        config: &HarvesterConfig,
        interrupter: Interrupter,
    ) -> Result<Self> {
        config.validate()?;
        let base_url = Url::parse(repository_url)
            .map_err(|e| UsageError::invalid("repository URL", repository_url, e.to_string()))?;

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.effective_connect_timeout())
            .timeout(config.socket_timeout)
            .build()
            .map_err(|e| SetupError::Client {
                message: e.to_string(),
            })?;

        Ok(Self {
            base_url,
            client: Some(client),
            retry: RetryPolicy::new(config.number_of_retries, config.time_between_retries),
            interrupter,
        })
    }

    /// Handle for cancelling this connection's retries from another thread.
    ///
    /// Once interrupted, [`Connection::execute`] fails with
    /// [`TransportError::Interrupted`] instead of sending or retrying.
    pub fn interrupter(&self) -> &Interrupter {
        &self.interrupter
    }

    fn request_url(&self, request: &OaiRequest) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in request.query_pairs() {
                query.append_pair(key, value);
            }
        }
        url
    }

    fn send(client: &Client, url: &Url) -> Result<ResponseBody> {
        let response = client
            .get(url.clone())
            .send()
            .map_err(|e| transport_error(url.as_str(), e))?;

        let status = response.status();
        trace!(status = %status, "OAI-PMH response");
        if status != StatusCode::OK {
            // Dropping the response here returns its connection to the pool.
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        Ok(ResponseBody::new(url.as_str(), response))
    }
}

impl Connection for HttpConnection {
    fn repository_url(&self) -> &str {
        self.base_url.as_str()
    }

    #[instrument(skip(self, request), fields(repository = %self.base_url, request = %request))]
    fn execute(&mut self, request: &OaiRequest) -> Result<ResponseBody> {
        let client = self.client.as_ref().ok_or(UsageError::ConnectionClosed)?;
        let url = self.request_url(request);
        debug!(url = %url, "Executing OAI-PMH request");

        self.retry
            .run(&self.interrupter, |attempt| {
                trace!(attempt, "Sending request");
                Self::send(client, &url)
            })
    }

    fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            debug!(repository = %self.base_url, "Connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.client.is_none()
    }
}

/// Opens [`HttpConnection`]s with a shared configuration.
///
/// Only the configuration is shared. Every connection gets its own client
/// and its own [`Interrupter`].
#[derive(Debug, Clone, Default)]
pub struct HttpConnectionFactory {
    config: HarvesterConfig,
}

impl HttpConnectionFactory {
    pub fn new(config: HarvesterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarvesterConfig {
        &self.config
    }
}

impl ConnectionFactory for HttpConnectionFactory {
    type Connection = HttpConnection;

    fn connect(&self, repository_url: &str) -> Result<HttpConnection> {
        HttpConnection::with_interrupter(repository_url, &self.config, Interrupter::new())
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> TransportError {
    let url = url.to_string();
    let message = err.to_string();
    if err.is_timeout() {
        TransportError::Timeout { url, message }
    } else if err.is_connect() {
        TransportError::Connection { url, message }
    } else if err.is_body() || err.is_decode() {
        TransportError::Body { url, message }
    } else {
        TransportError::Http { url, message }
    }
}

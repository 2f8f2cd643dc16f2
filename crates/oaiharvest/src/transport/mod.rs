//! HTTP transport for OAI-PMH requests.

mod http;
mod retry;

pub use http::{HttpConnection, HttpConnectionFactory};
pub use retry::{Interrupter, RetryPolicy};

use oaiharvest_core::{ResponseBody, Result, TransportError};

/// Read a response body to the end.
pub(crate) fn read_body(body: ResponseBody) -> Result<Vec<u8>> {
    let source = body.source().to_string();
    body.into_bytes().map_err(|e| {
        TransportError::Body {
            url: source,
            message: e.to_string(),
        }
        .into()
    })
}

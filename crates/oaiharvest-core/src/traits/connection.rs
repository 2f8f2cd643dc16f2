//! Connection trait.

use crate::protocol::{OaiRequest, ResponseBody};
use crate::Result;

/// A live session against one OAI-PMH repository.
///
/// A connection belongs to exactly one harvest operation. It is never shared
/// between harvests and never used from two threads at once, hence `&mut self`
/// on every operation.
pub trait Connection: Send {
    /// The base URL requests are sent to.
    fn repository_url(&self) -> &str;

    /// Execute one request and return the raw response body.
    ///
    /// Transient failures are retried internally. An error returned from here
    /// means retrying was exhausted or pointless.
    fn execute(&mut self, request: &OaiRequest) -> Result<ResponseBody>;

    /// Release the connection.
    ///
    /// Closing an already closed connection is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Whether [`close`](Connection::close) has been called.
    fn is_closed(&self) -> bool;
}

/// Creates one connection per harvest operation.
pub trait ConnectionFactory: Send + Sync {
    /// Connection type produced by this factory.
    type Connection: Connection;

    /// Open a connection to the repository at `repository_url`.
    fn connect(&self, repository_url: &str) -> Result<Self::Connection>;
}

//! Resumption-token pagination over `ListIdentifiers`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use oaiharvest_core::{
    Connection, Error, HarvestRequest, HarvestingIterator, IterationResult, OaiRequest,
    ProtocolError, RecordHeader, Result, SetupError, UsageError,
};

use crate::parser::{HeaderPage, NO_RECORDS_MATCH, RecordParser};
use crate::transport::read_body;

/// Turns an accepted header into the item handed to the caller.
///
/// Gets the iterator's own connection, so it may issue further requests
/// (e.g. `GetRecord`) within the same session.
pub type PostProcessing<C, R> =
    Box<dyn FnMut(RecordHeader, &mut C, &HarvestRequest) -> Result<R> + Send>;

enum State {
    Uninitialized,
    HasPage {
        headers: VecDeque<RecordHeader>,
        resumption_token: Option<String>,
    },
    Done,
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Uninitialized => "uninitialized",
            State::HasPage { .. } => "has-page",
            State::Done => "done",
            State::Closed => "closed",
        }
    }
}

/// A lazy, closeable sequence of items derived from the headers of one
/// `ListIdentifiers` harvest.
///
/// Only the current page is held in memory. The next page is requested when
/// the current one is used up, never earlier. The iterator owns its
/// connection and closes it on [`close`](HarvestingIterator::close), on the
/// first error and on drop.
pub struct HeaderIterator<C: Connection, R> {
    connection: C,
    parser: Arc<RecordParser>,
    request: HarvestRequest,
    post_processing: PostProcessing<C, R>,
    state: State,
    headers_seen: u64,
}

impl<C: Connection> HeaderIterator<C, RecordHeader> {
    /// An iterator that yields the headers themselves.
    pub fn headers(connection: C, parser: Arc<RecordParser>, request: HarvestRequest) -> Self {
        Self::new(connection, parser, request, Box::new(|header, _, _| Ok(header)))
    }
}

impl<C: Connection, R> HeaderIterator<C, R> {
    pub fn new(
        connection: C,
        parser: Arc<RecordParser>,
        request: HarvestRequest,
        post_processing: PostProcessing<C, R>,
    ) -> Self {
        Self {
            connection,
            parser,
            request,
            post_processing,
            state: State::Uninitialized,
            headers_seen: 0,
        }
    }

    pub fn request(&self) -> &HarvestRequest {
        &self.request
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Pull the next header, fetching a page if the current one is used up.
    ///
    /// Returns `Ok(None)` once the list is exhausted.
    fn next_header(&mut self) -> Result<Option<RecordHeader>> {
        loop {
            // `None` asks for the first page.
            let resumption_token = match &mut self.state {
                State::Closed => return Err(UsageError::ConnectionClosed.into()),
                State::Done => return Ok(None),
                State::Uninitialized => None,
                State::HasPage {
                    headers,
                    resumption_token,
                } => {
                    if let Some(header) = headers.pop_front() {
                        self.headers_seen += 1;
                        return Ok(Some(header));
                    }
                    match resumption_token.take() {
                        Some(token) => Some(token),
                        None => {
                            info!(
                                repository = self.request.repository_url(),
                                headers = self.headers_seen,
                                "Harvest complete"
                            );
                            self.state = State::Done;
                            continue;
                        }
                    }
                }
            };

            let page = match resumption_token {
                None => self.first_page()?,
                Some(token) => self.next_page(token)?,
            };
            self.state = State::HasPage {
                headers: page.headers.into(),
                resumption_token: page.resumption_token,
            };
        }
    }

    fn first_page(&mut self) -> Result<HeaderPage> {
        info!(
            repository = self.request.repository_url(),
            metadata_prefix = self.request.metadata_prefix(),
            set = self.request.set_spec(),
            "Starting harvest"
        );
        let request = OaiRequest::list_identifiers(&self.request);
        let context = format!("first ListIdentifiers page from {}", self.request.repository_url());
        let bytes = read_body(self.connection.execute(&request)?)?;

        match self.parser.parse_header_page(&bytes, &context) {
            Err(Error::Protocol(ProtocolError::Oai { code, .. })) if code == NO_RECORDS_MATCH => {
                debug!(repository = self.request.repository_url(), "No records match");
                Ok(HeaderPage {
                    headers: Vec::new(),
                    resumption_token: None,
                    complete_list_size: Some(0),
                })
            }
            Err(Error::Protocol(ProtocolError::Oai { code, message })) => Err(SetupError::Rejected {
                url: self.request.repository_url().to_string(),
                code,
                message,
            }
            .into()),
            other => {
                let page = other?;
                debug!(headers = page.headers.len(), more = page.resumption_token.is_some(), "Received first page");
                Ok(page)
            }
        }
    }

    fn next_page(&mut self, token: String) -> Result<HeaderPage> {
        let request = OaiRequest::resume_list_identifiers(token.as_str());
        let context = format!("ListIdentifiers page for token {token}");
        let bytes = read_body(self.connection.execute(&request)?)?;
        let page = self.parser.parse_header_page(&bytes, &context)?;

        if page.resumption_token.as_deref() == Some(token.as_str()) {
            return Err(ProtocolError::ResumptionToken {
                message: format!("repository returned the token {token} it was just given"),
            }
            .into());
        }
        debug!(
            headers = page.headers.len(),
            more = page.resumption_token.is_some(),
            "Received next page"
        );
        Ok(page)
    }

    fn drive<A, F>(&mut self, action: &mut A, filter: &mut F) -> Result<()>
    where
        A: FnMut(R) -> Result<IterationResult>,
        F: FnMut(&RecordHeader) -> bool,
    {
        while let Some(header) = self.next_header()? {
            if !filter(&header) {
                continue;
            }
            let item = (self.post_processing)(header, &mut self.connection, &self.request)?;
            if action(item)? == IterationResult::Terminate {
                debug!(headers = self.headers_seen, "Iteration terminated by action");
                break;
            }
        }
        Ok(())
    }

    fn close_on_error<T>(&mut self, outcome: Result<T>) -> Result<T> {
        if outcome.is_err() {
            self.close();
        }
        outcome
    }
}

impl<C: Connection, R> HarvestingIterator<R> for HeaderIterator<C, R> {
    #[instrument(skip_all, fields(repository = self.request.repository_url()))]
    fn for_each_filtered<A, F>(&mut self, mut action: A, mut filter: F) -> Result<()>
    where
        A: FnMut(R) -> Result<IterationResult>,
        F: FnMut(&RecordHeader) -> bool,
    {
        let outcome = self.drive(&mut action, &mut filter);
        self.close_on_error(outcome)
    }

    #[instrument(skip_all, fields(repository = self.request.repository_url()))]
    fn count_records(&mut self) -> Result<Option<u64>> {
        if self.is_closed() {
            return Err(UsageError::ConnectionClosed.into());
        }
        let request = OaiRequest::list_identifiers(&self.request);
        let context = format!("ListIdentifiers count from {}", self.request.repository_url());
        let outcome = self
            .connection
            .execute(&request)
            .and_then(read_body)
            .and_then(|bytes| self.parser.read_complete_list_size(&bytes, &context));
        let count = self.close_on_error(outcome)?;
        debug!(?count, "Counted records");
        Ok(count)
    }

    fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = State::Closed;
        if let Err(error) = self.connection.close() {
            warn!(%error, repository = self.request.repository_url(), "Failed to close connection");
        }
        debug!(headers = self.headers_seen, "Iterator closed");
    }
}

impl<C: Connection, R> Iterator for HeaderIterator<C, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Result<R>> {
        if self.is_closed() {
            return None;
        }
        let outcome = match self.next_header() {
            Ok(Some(header)) => (self.post_processing)(header, &mut self.connection, &self.request).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(item) => item.map(Ok),
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}

impl<C: Connection, R> Drop for HeaderIterator<C, R> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: Connection, R> fmt::Debug for HeaderIterator<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderIterator")
            .field("repository", &self.request.repository_url())
            .field("state", &self.state.name())
            .field("headers_seen", &self.headers_seen)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{TimeZone, Utc};
    use oaiharvest_core::RepositoryRef;

    use super::*;
    use crate::test_support::{FixtureConnection, FixtureResponse, list_page, oai_error};

    fn request() -> HarvestRequest {
        HarvestRequest::full(RepositoryRef::new("http://example.org/oai", "edm").unwrap())
    }

    fn iterator(fixture: FixtureConnection) -> HeaderIterator<FixtureConnection, RecordHeader> {
        HeaderIterator::headers(fixture, Arc::new(RecordParser::new().unwrap()), request())
    }

    fn collect_all(iter: &mut HeaderIterator<FixtureConnection, RecordHeader>) -> Result<Vec<String>> {
        let mut seen = Vec::new();
        iter.for_each_filtered(
            |header| {
                seen.push(header.oai_identifier().to_string());
                Ok(IterationResult::Continue)
            },
            |_| true,
        )?;
        Ok(seen)
    }

    #[test]
    fn yields_every_header_in_server_order() {
        let (fixture, expected) = FixtureConnection::paged(&[50, 50, 7], None);
        let log = fixture.log();
        let mut iter = iterator(fixture);

        let seen = collect_all(&mut iter).unwrap();

        assert_eq!(seen, expected);
        assert_eq!(log.request_count(), 3);
        let requests = log.requests();
        assert_eq!(requests[0].argument("metadataPrefix"), Some("edm"));
        assert_eq!(requests[1].query_pairs(), vec![("verb", "ListIdentifiers"), ("resumptionToken", "token-1")]);
        assert_eq!(requests[2].argument("resumptionToken"), Some("token-2"));
    }

    #[test]
    fn page_sizes_do_not_change_the_result() {
        for sizes in [&[107][..], &[1, 1, 105], &[10; 10], &[100, 7]] {
            let (fixture, expected) = FixtureConnection::paged(sizes, None);
            let mut iter = iterator(fixture);
            assert_eq!(collect_all(&mut iter).unwrap(), expected, "page sizes {sizes:?}");
        }
    }

    #[test]
    fn for_each_non_deleted_skips_deleted_headers() {
        let (fixture, _) = FixtureConnection::paged(&[50, 50, 7], Some(3));
        let mut iter = iterator(fixture);
        let mut seen = Vec::new();

        iter.for_each_non_deleted(|header| {
            assert!(!header.is_deleted(), "{header} delivered");
            seen.push(header);
            Ok(IterationResult::Continue)
        })
        .unwrap();

        assert_eq!(seen.len(), 107 - 35);
    }

    #[test]
    fn filter_runs_before_post_processing() {
        let (fixture, _) = FixtureConnection::paged(&[50, 50, 7], Some(3));
        let processed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&processed);
        let mut iter = HeaderIterator::new(
            fixture,
            Arc::new(RecordParser::new().unwrap()),
            request(),
            Box::new(move |header: RecordHeader, _: &mut FixtureConnection, _: &HarvestRequest| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(header.oai_identifier().len())
            }),
        );

        iter.for_each_non_deleted(|_| Ok(IterationResult::Continue)).unwrap();

        assert_eq!(processed.load(std::sync::atomic::Ordering::SeqCst), 72);
    }

    #[test]
    fn terminate_stops_fetching_pages() {
        for (accepted, pages) in [(1, 1), (50, 1), (51, 2), (100, 2), (101, 3)] {
            let (fixture, _) = FixtureConnection::paged(&[50, 50, 7], None);
            let log = fixture.log();
            let mut iter = iterator(fixture);
            let mut count = 0;

            iter.for_each_filtered(
                |_| {
                    count += 1;
                    Ok(if count == accepted {
                        IterationResult::Terminate
                    } else {
                        IterationResult::Continue
                    })
                },
                |_| true,
            )
            .unwrap();

            assert_eq!(count, accepted);
            assert_eq!(log.request_count(), pages, "after {accepted} headers");
        }
    }

    #[test]
    fn scenario_request_yields_107_distinct_headers() {
        let repository = RepositoryRef::new("http://example.org/oai", "edm").unwrap();
        let request = HarvestRequest::builder(repository)
            .set_spec("setA")
            .from(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
            .until(Utc.with_ymd_and_hms(2020, 1, 31, 23, 59, 59).unwrap())
            .build()
            .unwrap();
        let (fixture, _) = FixtureConnection::paged(&[50, 50, 7], None);
        let log = fixture.log();
        let mut iter = HeaderIterator::headers(fixture, Arc::new(RecordParser::new().unwrap()), request);

        let headers: Vec<RecordHeader> = iter.by_ref().collect::<Result<_>>().unwrap();

        let distinct: HashSet<&RecordHeader> = headers.iter().collect();
        assert_eq!(headers.len(), 107);
        assert_eq!(distinct.len(), 107);
        let requests = log.requests();
        let first = &requests[0];
        assert_eq!(first.argument("set"), Some("setA"));
        assert_eq!(first.argument("from"), Some("2020-01-01T00:00:00Z"));
        assert_eq!(first.argument("until"), Some("2020-01-31T23:59:59Z"));
    }

    #[test]
    fn count_records_uses_one_request() {
        let (fixture, _) = FixtureConnection::paged(&[50, 50, 7], None);
        let log = fixture.log();
        let mut iter = iterator(fixture);

        assert_eq!(iter.count_records().unwrap(), Some(107));
        assert_eq!(log.request_count(), 1);
    }

    #[test]
    fn count_records_without_list_size() {
        let ids = vec!["oai:example.org:0".to_string()];
        let fixture = FixtureConnection::new()
            .with_list_page(None, FixtureResponse::Body(list_page(&ids, &[], Some("next"), None)));
        let log = fixture.log();
        let mut iter = iterator(fixture);

        assert_eq!(iter.count_records().unwrap(), None);
        assert_eq!(log.request_count(), 1);
    }

    #[test]
    fn count_records_on_oai_error_is_none() {
        let fixture = FixtureConnection::new().with_list_page(
            None,
            FixtureResponse::Body(oai_error("noRecordsMatch", "nothing here")),
        );
        let mut iter = iterator(fixture);

        assert_eq!(iter.count_records().unwrap(), None);
    }

    #[test]
    fn close_twice_closes_connection_once() {
        let (fixture, _) = FixtureConnection::paged(&[50, 50, 7], None);
        let log = fixture.log();
        let mut iter = iterator(fixture);

        iter.close();
        iter.close();
        drop(iter);

        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn drop_closes_connection() {
        let (fixture, _) = FixtureConnection::paged(&[50, 50, 7], None);
        let log = fixture.log();
        let mut iter = iterator(fixture);
        iter.next().unwrap().unwrap();

        drop(iter);

        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn close_failure_is_swallowed() {
        let (fixture, _) = FixtureConnection::paged(&[7], None);
        let log = fixture.log();
        let mut iter = iterator(fixture.failing_close());

        iter.close();

        assert!(iter.is_closed());
        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn iterating_after_close_is_a_usage_error() {
        let (fixture, _) = FixtureConnection::paged(&[7], None);
        let mut iter = iterator(fixture);
        iter.close();

        let err = collect_all(&mut iter).unwrap_err();

        assert!(matches!(err, Error::Usage(UsageError::ConnectionClosed)));
        assert!(iter.next().is_none());
    }

    #[test]
    fn action_error_closes_iterator() {
        let (fixture, _) = FixtureConnection::paged(&[50, 50, 7], None);
        let log = fixture.log();
        let mut iter = iterator(fixture);

        let err = iter
            .for_each_filtered(
                |header| {
                    Err(ProtocolError::MissingIdentifier {
                        context: header.oai_identifier().to_string(),
                    }
                    .into())
                },
                |_| true,
            )
            .unwrap_err();

        assert!(matches!(err, Error::Protocol(ProtocolError::MissingIdentifier { .. })));
        assert!(iter.is_closed());
        assert_eq!(log.closes(), 1);
        assert_eq!(log.request_count(), 1);
    }

    #[test]
    fn transport_failure_mid_harvest_closes_iterator() {
        let ids: Vec<String> = (0..3).map(|n| format!("oai:example.org:{n}")).collect();
        let fixture = FixtureConnection::new()
            .with_list_page(None, FixtureResponse::Body(list_page(&ids, &[], Some("token-1"), None)))
            .with_list_page(Some("token-1"), FixtureResponse::Status(503));
        let log = fixture.log();
        let mut iter = iterator(fixture);
        let mut seen = 0;

        let err = iter
            .for_each_non_deleted(|_| {
                seen += 1;
                Ok(IterationResult::Continue)
            })
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(seen, 3);
        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn no_records_match_is_an_empty_harvest() {
        let fixture = FixtureConnection::new().with_list_page(
            None,
            FixtureResponse::Body(oai_error("noRecordsMatch", "The combination of the values results in an empty list.")),
        );
        let mut iter = iterator(fixture);

        assert!(collect_all(&mut iter).unwrap().is_empty());
        assert!(!iter.is_closed());
    }

    #[test]
    fn other_first_page_errors_reject_the_harvest() {
        let fixture = FixtureConnection::new()
            .with_list_page(None, FixtureResponse::Body(oai_error("cannotDisseminateFormat", "edm")));
        let mut iter = iterator(fixture);

        let err = collect_all(&mut iter).unwrap_err();

        match err {
            Error::Setup(SetupError::Rejected { code, url, .. }) => {
                assert_eq!(code, "cannotDisseminateFormat");
                assert_eq!(url, "http://example.org/oai");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(iter.is_closed());
    }

    #[test]
    fn bad_resumption_token_on_later_page_is_protocol_error() {
        let ids = vec!["oai:example.org:0".to_string()];
        let fixture = FixtureConnection::new()
            .with_list_page(None, FixtureResponse::Body(list_page(&ids, &[], Some("token-1"), None)))
            .with_list_page(Some("token-1"), FixtureResponse::Body(oai_error("badResumptionToken", "expired")));
        let mut iter = iterator(fixture);

        let err = collect_all(&mut iter).unwrap_err();

        assert!(matches!(err, Error::Protocol(ProtocolError::Oai { ref code, .. }) if code == "badResumptionToken"));
    }

    #[test]
    fn repeated_resumption_token_is_protocol_error() {
        let ids = vec!["oai:example.org:0".to_string()];
        let page = list_page(&ids, &[], Some("stuck"), None);
        let fixture = FixtureConnection::new()
            .with_list_page(None, FixtureResponse::Body(page.clone()))
            .with_list_page(Some("stuck"), FixtureResponse::Body(page));
        let log = fixture.log();
        let mut iter = iterator(fixture);

        let err = collect_all(&mut iter).unwrap_err();

        assert!(matches!(err, Error::Protocol(ProtocolError::ResumptionToken { .. })));
        assert_eq!(log.request_count(), 2);
        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn pull_iteration_ends_after_error() {
        let fixture = FixtureConnection::new().with_list_page(None, FixtureResponse::Status(500));
        let mut iter = iterator(fixture);

        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn exhausted_iterator_stays_done() {
        let (fixture, _) = FixtureConnection::paged(&[2], None);
        let log = fixture.log();
        let mut iter = iterator(fixture);

        assert_eq!(collect_all(&mut iter).unwrap().len(), 2);
        assert!(collect_all(&mut iter).unwrap().is_empty());
        assert_eq!(log.request_count(), 1);
    }
}

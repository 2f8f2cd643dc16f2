//! The harvester façade.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use oaiharvest_core::{
    Connection, ConnectionFactory, HarvestRequest, HarvestingIterator, OaiRequest, Record,
    RecordHeader, RepositoryRef, Result,
};

use crate::config::HarvesterConfig;
use crate::iterator::{HeaderIterator, PostProcessing};
use crate::parser::RecordParser;
use crate::transport::{HttpConnectionFactory, read_body};

/// Entry point for harvesting OAI-PMH repositories.
///
/// Every operation opens its own connection through the factory; nothing
/// is shared between operations except the immutable [`RecordParser`].
///
/// # Example
///
/// ```no_run
/// use oaiharvest::{HarvestRequest, Harvester, HarvesterConfig, HarvestingIterator, IterationResult, RepositoryRef};
///
/// # fn main() -> oaiharvest::Result<()> {
/// let harvester = Harvester::with_config(HarvesterConfig::default())?;
/// let repository = RepositoryRef::new("https://example.org/oai", "edm")?;
/// let request = HarvestRequest::builder(repository).set_spec("setA").build()?;
///
/// let mut headers = harvester.harvest_record_headers(request)?;
/// headers.for_each_non_deleted(|header| {
///     println!("{}", header.oai_identifier());
///     Ok(IterationResult::Continue)
/// })?;
/// headers.close();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Harvester<F: ConnectionFactory = HttpConnectionFactory> {
    factory: F,
    parser: Arc<RecordParser>,
}

impl Harvester<HttpConnectionFactory> {
    /// A harvester talking HTTP with the given settings.
    pub fn with_config(config: HarvesterConfig) -> Result<Self> {
        config.validate()?;
        Self::new(HttpConnectionFactory::new(config))
    }
}

impl<F: ConnectionFactory> Harvester<F> {
    /// A harvester using `factory` for its connections.
    ///
    /// # Errors
    ///
    /// Returns a setup error if the parser's element paths fail to compile.
    pub fn new(factory: F) -> Result<Self> {
        Ok(Self::with_parser(factory, Arc::new(RecordParser::new()?)))
    }

    /// A harvester sharing an existing parser.
    pub fn with_parser(factory: F, parser: Arc<RecordParser>) -> Self {
        Self { factory, parser }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn parser(&self) -> &Arc<RecordParser> {
        &self.parser
    }

    /// Start a header harvest. No request is sent until the iterator is used.
    #[instrument(skip_all, fields(repository = request.repository_url()))]
    pub fn harvest_record_headers(
        &self,
        request: HarvestRequest,
    ) -> Result<HeaderIterator<F::Connection, RecordHeader>> {
        let connection = self.factory.connect(request.repository_url())?;
        debug!("Opened connection for header harvest");
        Ok(HeaderIterator::headers(connection, Arc::clone(&self.parser), request))
    }

    /// Start a harvest whose items are built from each accepted header by
    /// `post_processing`.
    #[instrument(skip_all, fields(repository = request.repository_url()))]
    pub fn harvest_records_with<R>(
        &self,
        request: HarvestRequest,
        post_processing: PostProcessing<F::Connection, R>,
    ) -> Result<HeaderIterator<F::Connection, R>> {
        let connection = self.factory.connect(request.repository_url())?;
        debug!("Opened connection for record harvest");
        Ok(HeaderIterator::new(
            connection,
            Arc::clone(&self.parser),
            request,
            post_processing,
        ))
    }

    /// Start a harvest that fetches the full record for every accepted header.
    ///
    /// Records are fetched with `GetRecord` over the iterator's own
    /// connection. Deleted headers become deleted records without a request.
    pub fn harvest_records(&self, request: HarvestRequest) -> Result<HeaderIterator<F::Connection, Record>> {
        let parser = Arc::clone(&self.parser);
        self.harvest_records_with(
            request,
            Box::new(move |header, connection, request| {
                if header.is_deleted() {
                    return Ok(Record::deleted(header));
                }
                fetch_record(&parser, connection, request.repository(), header.oai_identifier())
            }),
        )
    }

    /// Fetch one record over a short-lived connection.
    ///
    /// The connection is closed before this returns, on success and on failure.
    #[instrument(skip(self, repository), fields(repository = repository.repository_url()))]
    pub fn harvest_record(&self, repository: &RepositoryRef, identifier: &str) -> Result<Record> {
        let mut connection = self.factory.connect(repository.repository_url())?;
        let outcome = fetch_record(&self.parser, &mut connection, repository, identifier);
        if let Err(error) = connection.close() {
            warn!(%error, "Failed to close connection");
        }
        outcome
    }

    /// The list size the repository reports for `request`, if any.
    ///
    /// Sends exactly one `ListIdentifiers` request.
    #[instrument(skip_all, fields(repository = request.repository_url()))]
    pub fn count_records(&self, request: HarvestRequest) -> Result<Option<u64>> {
        let mut headers = self.harvest_record_headers(request)?;
        let count = headers.count_records();
        headers.close();
        if let Ok(Some(count)) = count {
            info!(count, "Repository reports list size");
        }
        count
    }
}

fn fetch_record<C: Connection>(
    parser: &RecordParser,
    connection: &mut C,
    repository: &RepositoryRef,
    identifier: &str,
) -> Result<Record> {
    let request = OaiRequest::get_record(repository, identifier);
    let bytes = read_body(connection.execute(&request)?)?;
    parser.parse_record(identifier, &bytes)
}

//! Purpose: Scan a collection for records whose payload contains a query string.
//! Exports: `search`, `browse`, `search_collection`, `SearchOptions`, `SearchOutcome`.
//! Role: Bounded accumulator over `ScrollPager` + `PayloadQuery`.
//! Invariants: Records are evaluated in server order; matches keep that order.
//! Invariants: Result and scan limits are checked per record, never per page.
//! Invariants: An empty query never scans; it returns one page as-is.
use crate::core::error::Error;
use crate::core::gateway::Gateway;
use crate::core::matcher::PayloadQuery;
use crate::core::pager::{DEFAULT_PAGE_SIZE, PagerOptions, RetryPolicy, ScrollPager};
use crate::core::record::Record;

pub const DEFAULT_SCAN_LIMIT: u64 = 10_000;
pub const DEFAULT_RESULT_LIMIT: usize = 10;

#[derive(Clone, Debug)]
pub struct SearchOptions {
    /// `None` keeps every match until the scan limit or the collection end.
    pub limit: Option<usize>,
    pub scan_limit: u64,
    pub page_size: usize,
    pub retry: RetryPolicy,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self {
            limit: Some(DEFAULT_RESULT_LIMIT),
            scan_limit: DEFAULT_SCAN_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::new(),
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_scan_limit(mut self, scan_limit: u64) -> Self {
        self.scan_limit = scan_limit;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn pager_options(&self, page_size: usize) -> PagerOptions {
        PagerOptions {
            page_size,
            with_payload: true,
            with_vector: false,
            retry: self.retry,
        }
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchOutcome {
    pub matches: Vec<Record>,
    pub scanned: u64,
}

pub fn search<G: Gateway + ?Sized>(
    gateway: &G,
    collection: &str,
    query: &PayloadQuery,
    options: &SearchOptions,
) -> Result<SearchOutcome, Error> {
    let mut outcome = SearchOutcome::default();
    let bound_reached = |outcome: &SearchOutcome| {
        outcome.scanned >= options.scan_limit
            || options
                .limit
                .is_some_and(|limit| outcome.matches.len() >= limit)
    };

    let pager_options = options.pager_options(options.page_size);
    let mut pager = ScrollPager::new(gateway, collection, pager_options)?;
    'scan: while !bound_reached(&outcome) {
        let Some(page) = pager.next_page()? else {
            break;
        };
        for record in page.records {
            if bound_reached(&outcome) {
                break 'scan;
            }
            outcome.scanned += 1;
            if query.matches(&record.payload) {
                outcome.matches.push(record);
            }
        }
    }

    tracing::debug!(
        collection,
        scanned = outcome.scanned,
        matches = outcome.matches.len(),
        pages = pager.pages_fetched(),
        "payload search finished"
    );
    Ok(outcome)
}

/// Returns the first `limit` records of a collection from a single request.
pub fn browse<G: Gateway + ?Sized>(
    gateway: &G,
    collection: &str,
    limit: usize,
    retry: RetryPolicy,
) -> Result<Vec<Record>, Error> {
    let options = SearchOptions::new().with_retry(retry);
    let mut pager = ScrollPager::new(gateway, collection, options.pager_options(limit))?;
    let mut records = pager
        .next_page()?
        .map(|page| page.records)
        .unwrap_or_default();
    records.truncate(limit);
    Ok(records)
}

/// Empty `text` degrades to [`browse`]; anything else runs a bounded [`search`].
pub fn search_collection<G: Gateway + ?Sized>(
    gateway: &G,
    collection: &str,
    text: &str,
    field: Option<&str>,
    options: &SearchOptions,
) -> Result<SearchOutcome, Error> {
    if text.is_empty() {
        let limit = options.limit.unwrap_or(options.page_size);
        let matches = browse(gateway, collection, limit, options.retry)?;
        return Ok(SearchOutcome {
            scanned: matches.len() as u64,
            matches,
        });
    }
    let query = match field {
        Some(field) => PayloadQuery::new(text).with_field(field),
        None => PayloadQuery::new(text),
    };
    search(gateway, collection, &query, options)
}

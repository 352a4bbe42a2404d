//! Purpose: Stream collections out of the server as newline-delimited JSON.
//! Exports: `export_collection`, `export_all`, `ExportOptions`, `Projection`, `ExportObserver`,
//! `ExportProgress`, `ExportAllSummary`, `CollectionOutcome`.
//! Role: Export sink driven by `ScrollPager`; one page of records in memory at a time.
//! Invariants: Each record is written as one JSON value followed by `\n`, in server order.
//! Invariants: The result limit is exact; truncation may happen mid-page.
//! Invariants: Collections are exported one at a time in listing order; output never interleaves.
//! Invariants: In all-collections mode only per-collection failures are tolerated; auth and
//! output failures abort the run.
use crate::core::error::{Error, ErrorKind};
use crate::core::gateway::Gateway;
use crate::core::pager::{DEFAULT_PAGE_SIZE, PagerOptions, RetryPolicy, ScrollPager};
use crate::core::record::{Payload, PointId, Record};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    /// Emit the payload mapping only.
    PayloadOnly,
    /// Emit `_collection`, `_id`, `payload` and (when fetched) `vector`.
    Full,
}

#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub page_size: usize,
    pub limit: Option<u64>,
    pub with_vectors: bool,
    pub projection: Projection,
    pub retry: RetryPolicy,
}

impl ExportOptions {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            limit: None,
            with_vectors: false,
            projection: Projection::Full,
            retry: RetryPolicy::new(),
        }
    }

    /// A limit of zero means unbounded.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_vectors(mut self, with_vectors: bool) -> Self {
        self.with_vectors = with_vectors;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn pager_options(&self) -> PagerOptions {
        PagerOptions {
            page_size: self.page_size,
            with_payload: true,
            with_vector: self.with_vectors,
            retry: self.retry,
        }
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportProgress<'a> {
    pub collection: &'a str,
    pub written: u64,
    /// `min(limit, points reported by the server)`.
    pub planned: u64,
}

/// Receives coarse progress; implementations must not block.
pub trait ExportObserver {
    fn collection_started(&mut self, _collection: &str, _total: u64, _planned: u64) {}

    fn collection_skipped_empty(&mut self, _collection: &str) {}

    fn page_written(&mut self, _progress: &ExportProgress<'_>) {}

    fn collection_finished(&mut self, _collection: &str, _written: u64) {}

    fn collection_failed(&mut self, _collection: &str, _err: &Error) {}
}

impl ExportObserver for () {}

#[derive(Debug)]
pub struct CollectionOutcome {
    pub collection: String,
    pub result: Result<u64, Error>,
}

#[derive(Debug, Default)]
pub struct ExportAllSummary {
    pub collections: Vec<CollectionOutcome>,
}

impl ExportAllSummary {
    pub fn total_written(&self) -> u64 {
        self.collections
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.collections
            .iter()
            .filter(|outcome| outcome.result.is_err())
            .count()
    }
}

#[derive(Serialize)]
struct ExportedPoint<'a> {
    #[serde(rename = "_collection")]
    collection: &'a str,
    #[serde(rename = "_id")]
    id: &'a PointId,
    payload: &'a Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    vector: Option<&'a Value>,
}

/// Exports one collection and returns how many records were written.
pub fn export_collection<G, W>(
    gateway: &G,
    collection: &str,
    options: &ExportOptions,
    writer: &mut W,
    observer: &mut dyn ExportObserver,
) -> Result<u64, Error>
where
    G: Gateway + ?Sized,
    W: Write + ?Sized,
{
    stream_collection(gateway, collection, options, writer, observer)
        .map_err(|err| err.with_collection(collection))
}

fn stream_collection<G, W>(
    gateway: &G,
    collection: &str,
    options: &ExportOptions,
    writer: &mut W,
    observer: &mut dyn ExportObserver,
) -> Result<u64, Error>
where
    G: Gateway + ?Sized,
    W: Write + ?Sized,
{
    let info = gateway.collection_info(collection).map_err(|err| {
        let message = err
            .message()
            .map(|message| format!("failed to get collection info: {message}"))
            .unwrap_or_else(|| "failed to get collection info".to_string());
        err.with_message(message)
    })?;
    let total = info.points();
    if total == 0 {
        tracing::debug!(collection, "collection is empty, skipping");
        observer.collection_skipped_empty(collection);
        return Ok(0);
    }
    let planned = options.limit.map_or(total, |limit| limit.min(total));
    observer.collection_started(collection, total, planned);

    let mut pager = ScrollPager::new(gateway, collection, options.pager_options())?;
    let mut written = 0u64;
    while let Some(page) = pager.next_page()? {
        for record in &page.records {
            if options.limit.is_some_and(|limit| written >= limit) {
                break;
            }
            write_record(writer, collection, record, options.projection)?;
            written += 1;
        }
        writer.flush().map_err(write_error)?;
        observer.page_written(&ExportProgress {
            collection,
            written,
            planned,
        });
        if options.limit.is_some_and(|limit| written >= limit) {
            break;
        }
    }

    tracing::debug!(
        collection,
        written,
        pages = pager.pages_fetched(),
        "collection export finished"
    );
    observer.collection_finished(collection, written);
    Ok(written)
}

/// Exports every collection in listing order, tolerating per-collection failures.
pub fn export_all<G, W>(
    gateway: &G,
    options: &ExportOptions,
    writer: &mut W,
    observer: &mut dyn ExportObserver,
) -> Result<ExportAllSummary, Error>
where
    G: Gateway + ?Sized,
    W: Write + ?Sized,
{
    let names = gateway.list_collections()?;
    let mut summary = ExportAllSummary::default();
    for name in names {
        let result = match export_collection(gateway, &name, options, writer, observer) {
            Err(err) if aborts_bulk_export(&err) => return Err(err),
            result => result,
        };
        if let Err(err) = &result {
            tracing::warn!(collection = %name, error = %err, "collection export failed");
            observer.collection_failed(&name, err);
        }
        summary.collections.push(CollectionOutcome {
            collection: name,
            result,
        });
    }
    Ok(summary)
}

fn aborts_bulk_export(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Authentication | ErrorKind::Io | ErrorKind::Encoding
    )
}

fn write_record<W: Write + ?Sized>(
    writer: &mut W,
    collection: &str,
    record: &Record,
    projection: Projection,
) -> Result<(), Error> {
    let encoded = match projection {
        Projection::PayloadOnly => serde_json::to_writer(&mut *writer, &record.payload),
        Projection::Full => serde_json::to_writer(
            &mut *writer,
            &ExportedPoint {
                collection,
                id: &record.id,
                payload: &record.payload,
                vector: record.vector.as_ref(),
            },
        ),
    };
    encoded.map_err(|err| {
        if err.is_io() {
            Error::new(ErrorKind::Io)
                .with_message("failed to write output")
                .with_source(err)
        } else {
            Error::new(ErrorKind::Encoding)
                .with_message(format!("failed to encode point {}", record.id))
                .with_source(err)
        }
    })?;
    writer.write_all(b"\n").map_err(write_error)
}

fn write_error(err: std::io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write output")
        .with_source(err)
}

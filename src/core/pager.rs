//! Purpose: Pull successive pages of a collection through an opaque server cursor.
//! Exports: `ScrollPager`, `PagerOptions`, `RetryPolicy`.
//! Role: Shared page source for the export sink and the search accumulator.
//! Invariants: At most one request in flight; no prefetch. Memory is one page.
//! Invariants: The cursor is echoed verbatim and only ever tested for absence.
//! Invariants: An empty page ends the sequence even when it carries a cursor.
//! Invariants: Only timeouts are retried; every other error ends the sequence.
use crate::core::error::{Error, ErrorKind};
use crate::core::gateway::Gateway;
use crate::core::record::{Page, PageOffset, ScrollRequest};
use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// `None` retries until the call succeeds or fails with a non-timeout error.
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
            max_retries: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    fn allows(&self, retries_so_far: u32) -> bool {
        self.max_retries.is_none_or(|max| retries_so_far < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct PagerOptions {
    pub page_size: usize,
    pub with_payload: bool,
    pub with_vector: bool,
    pub retry: RetryPolicy,
}

impl PagerOptions {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            with_payload: true,
            with_vector: false,
            retry: RetryPolicy::new(),
        }
    }
}

impl Default for PagerOptions {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScrollPager<'a, G: Gateway + ?Sized> {
    gateway: &'a G,
    collection: String,
    options: PagerOptions,
    offset: Option<PageOffset>,
    done: bool,
    pages_fetched: u64,
}

impl<'a, G: Gateway + ?Sized> ScrollPager<'a, G> {
    pub fn new(
        gateway: &'a G,
        collection: impl Into<String>,
        options: PagerOptions,
    ) -> Result<Self, Error> {
        let collection = collection.into();
        if options.page_size == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("page size must be greater than zero")
                .with_hint("Use a positive batch size like 100.")
                .with_collection(collection));
        }
        Ok(Self {
            gateway,
            collection,
            options,
            offset: None,
            done: false,
            pages_fetched: 0,
        })
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Returns the next non-empty page, or `None` once the server reports the end.
    pub fn next_page(&mut self) -> Result<Option<Page>, Error> {
        if self.done {
            return Ok(None);
        }
        let request = ScrollRequest {
            limit: self.options.page_size,
            with_payload: self.options.with_payload,
            with_vector: self.options.with_vector,
            offset: self.offset.take(),
        };
        let page = match self.fetch(&request) {
            Ok(page) => page,
            Err(err) => {
                self.done = true;
                return Err(err.with_collection(self.collection.clone()));
            }
        };
        self.pages_fetched += 1;
        tracing::debug!(
            collection = %self.collection,
            page = self.pages_fetched,
            records = page.records.len(),
            "scroll page received"
        );

        if page.records.is_empty() {
            self.done = true;
            return Ok(None);
        }
        match &page.next_offset {
            Some(offset) => self.offset = Some(offset.clone()),
            None => self.done = true,
        }
        Ok(Some(page))
    }

    fn fetch(&self, request: &ScrollRequest) -> Result<Page, Error> {
        let retry = self.options.retry;
        let mut retries = 0u32;
        let mut waited = Duration::ZERO;
        loop {
            match self.gateway.scroll(&self.collection, request) {
                Ok(page) => return Ok(page),
                Err(err) if err.is_timeout() && retry.allows(retries) => {
                    tracing::warn!(
                        collection = %self.collection,
                        attempt = retries + 1,
                        "timeout, retrying in {}",
                        format_delay(retry.delay)
                    );
                    std::thread::sleep(retry.delay);
                    retries += 1;
                    waited += retry.delay;
                }
                Err(err) if retries > 0 => return Err(add_retry_hint(err, retries, waited)),
                Err(err) => return Err(err),
            }
        }
    }
}

impl<G: Gateway + ?Sized> Iterator for ScrollPager<'_, G> {
    type Item = Result<Page, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_page().transpose()
    }
}

fn add_retry_hint(err: Error, retries: u32, waited: Duration) -> Error {
    let info = format!(
        "Retried {retries} time(s) after timeouts (waited {}ms).",
        waited.as_millis()
    );
    match err.hint().map(str::to_string) {
        Some(hint) => err.with_hint(format!("{hint} {info}")),
        None => err.with_hint(info),
    }
}

fn format_delay(delay: Duration) -> String {
    if delay.subsec_millis() == 0 {
        format!("{}s", delay.as_secs())
    } else {
        format!("{}ms", delay.as_millis())
    }
}

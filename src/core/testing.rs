// In-memory `Gateway` used by the core unit tests.
use crate::core::error::{Error, ErrorKind};
use crate::core::gateway::Gateway;
use crate::core::record::{
    CollectionInfo, Page, PageOffset, Payload, Record, ScrollRequest, Telemetry,
};
use serde_json::{Value, json};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

enum Source {
    Records(Vec<Record>),
    Scripted(RefCell<VecDeque<Page>>),
}

struct FakeCollection {
    name: String,
    source: Source,
    reported_points: Option<u64>,
}

#[derive(Clone, Copy)]
struct Failure {
    kind: ErrorKind,
    status: Option<u16>,
}

impl Failure {
    fn to_error(self) -> Error {
        let err = Error::new(self.kind).with_message("injected failure");
        match self.status {
            Some(status) => err.with_status(status),
            None => err,
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeGateway {
    collections: Vec<FakeCollection>,
    next_scroll_failures: RefCell<VecDeque<Failure>>,
    scroll_failures: HashMap<String, Failure>,
    info_failures: HashMap<String, Failure>,
    requests: RefCell<Vec<(String, ScrollRequest)>>,
    info_calls: Cell<usize>,
    served_records: Cell<u64>,
    largest_page: Cell<usize>,
}

impl FakeGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_collection(mut self, name: &str, records: Vec<Record>) -> Self {
        self.collections.push(FakeCollection {
            name: name.to_string(),
            source: Source::Records(records),
            reported_points: None,
        });
        self
    }

    /// Serves the given pages verbatim, in order, regardless of the requested offset.
    pub(crate) fn with_scripted_pages(mut self, name: &str, pages: Vec<Page>) -> Self {
        let total = pages.iter().map(|page| page.records.len() as u64).sum();
        self.collections.push(FakeCollection {
            name: name.to_string(),
            source: Source::Scripted(RefCell::new(pages.into())),
            reported_points: Some(total),
        });
        self
    }

    pub(crate) fn with_reported_points(mut self, name: &str, points: u64) -> Self {
        if let Some(collection) = self.collections.iter_mut().find(|c| c.name == name) {
            collection.reported_points = Some(points);
        }
        self
    }

    pub(crate) fn fail_next_scroll(self, kind: ErrorKind) -> Self {
        self.next_scroll_failures
            .borrow_mut()
            .push_back(Failure { kind, status: None });
        self
    }

    pub(crate) fn fail_scrolls(mut self, name: &str, kind: ErrorKind, status: Option<u16>) -> Self {
        self.scroll_failures
            .insert(name.to_string(), Failure { kind, status });
        self
    }

    pub(crate) fn fail_info(mut self, name: &str, kind: ErrorKind, status: Option<u16>) -> Self {
        self.info_failures
            .insert(name.to_string(), Failure { kind, status });
        self
    }

    pub(crate) fn requests(&self) -> Vec<(String, ScrollRequest)> {
        self.requests.borrow().clone()
    }

    pub(crate) fn scroll_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub(crate) fn info_calls(&self) -> usize {
        self.info_calls.get()
    }

    /// Records handed out by `scroll` so far, across all pages.
    pub(crate) fn served_records(&self) -> u64 {
        self.served_records.get()
    }

    pub(crate) fn largest_page(&self) -> usize {
        self.largest_page.get()
    }

    fn serve(&self, page: Page) -> Result<Page, Error> {
        let size = page.records.len();
        self.served_records.set(self.served_records.get() + size as u64);
        self.largest_page.set(self.largest_page.get().max(size));
        Ok(page)
    }

    fn find(&self, name: &str) -> Result<&FakeCollection, Error> {
        self.collections
            .iter()
            .find(|collection| collection.name == name)
            .ok_or_else(|| {
                Error::new(ErrorKind::Request)
                    .with_message(format!("Collection `{name}` doesn't exist!"))
                    .with_status(404)
            })
    }
}

impl Gateway for FakeGateway {
    fn list_collections(&self) -> Result<Vec<String>, Error> {
        Ok(self.collections.iter().map(|c| c.name.clone()).collect())
    }

    fn collection_info(&self, collection: &str) -> Result<CollectionInfo, Error> {
        self.info_calls.set(self.info_calls.get() + 1);
        if let Some(failure) = self.info_failures.get(collection) {
            return Err(failure.to_error());
        }
        let found = self.find(collection)?;
        let points = match (&found.source, found.reported_points) {
            (_, Some(points)) => points,
            (Source::Records(records), None) => records.len() as u64,
            (Source::Scripted(_), None) => 0,
        };
        Ok(CollectionInfo {
            status: "green".to_string(),
            points_count: Some(points),
            vectors_count: Some(points),
            ..CollectionInfo::default()
        })
    }

    fn scroll(&self, collection: &str, request: &ScrollRequest) -> Result<Page, Error> {
        self.requests
            .borrow_mut()
            .push((collection.to_string(), request.clone()));
        if let Some(failure) = self.next_scroll_failures.borrow_mut().pop_front() {
            return Err(failure.to_error());
        }
        if let Some(failure) = self.scroll_failures.get(collection) {
            return Err(failure.to_error());
        }
        let found = self.find(collection)?;
        match &found.source {
            Source::Scripted(pages) => {
                let page = pages.borrow_mut().pop_front().unwrap_or(Page {
                    records: Vec::new(),
                    next_offset: None,
                });
                self.serve(page)
            }
            Source::Records(records) => {
                let start = request
                    .offset
                    .as_ref()
                    .map(decode_cursor)
                    .unwrap_or(0)
                    .min(records.len());
                let end = (start + request.limit).min(records.len());
                let next_offset = (end < records.len()).then(|| encode_cursor(end));
                self.serve(Page {
                    records: records[start..end].to_vec(),
                    next_offset,
                })
            }
        }
    }

    fn telemetry(&self) -> Result<Telemetry, Error> {
        Ok(Telemetry::default())
    }
}

// The fake is the issuing server, so it may read its own cursor format.
fn encode_cursor(index: usize) -> PageOffset {
    PageOffset::new(json!(format!("cursor-{index}")))
}

fn decode_cursor(offset: &PageOffset) -> usize {
    let raw = serde_json::to_value(offset).unwrap_or(Value::Null);
    raw.as_str()
        .and_then(|text| text.strip_prefix("cursor-"))
        .and_then(|index| index.parse().ok())
        .unwrap_or(0)
}

pub(crate) fn named_items(count: usize) -> Vec<Record> {
    (1..=count)
        .map(|i| {
            let mut payload = Payload::new();
            payload.insert("name".to_string(), json!(format!("item-{i}")));
            Record::new(i as u64, payload)
        })
        .collect()
}

pub(crate) fn page(ids: &[u64], next: Option<Value>) -> Page {
    Page {
        records: ids
            .iter()
            .map(|id| Record::new(*id, Payload::new()))
            .collect(),
        next_offset: next.map(PageOffset::new),
    }
}

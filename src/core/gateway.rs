//! Purpose: Define the boundary between the core engine and the remote service.
//! Exports: `Gateway`.
//! Role: The pager, sink, and accumulator only ever talk to the server through this trait.
//! Invariants: Each call is one blocking request/response exchange; no retries here.
//! Invariants: Implementations classify failures into `ErrorKind`.
use crate::core::error::Error;
use crate::core::record::{CollectionInfo, Page, ScrollRequest, Telemetry};

pub trait Gateway {
    fn list_collections(&self) -> Result<Vec<String>, Error>;

    fn collection_info(&self, collection: &str) -> Result<CollectionInfo, Error>;

    fn scroll(&self, collection: &str, request: &ScrollRequest) -> Result<Page, Error>;

    fn telemetry(&self) -> Result<Telemetry, Error>;
}

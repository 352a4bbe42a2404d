//! Purpose: Define the public Rust API boundary for qdtk.
//! Exports: The HTTP gateway client plus the core export/search engine types.
//! Role: Single import path for the CLI, integration tests, and library users.
//! Invariants: Core modules stay reachable only through these re-exports or `crate::core`.

mod remote;

pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use crate::core::export::{
    CollectionOutcome, ExportAllSummary, ExportObserver, ExportOptions, ExportProgress,
    Projection, export_all, export_collection,
};
pub use crate::core::gateway::Gateway;
pub use crate::core::matcher::{PayloadQuery, matches};
pub use crate::core::pager::{PagerOptions, RetryPolicy, ScrollPager};
pub use crate::core::record::{
    CollectionInfo, Page, PageOffset, Payload, PointId, Record, ScrollRequest, Telemetry,
};
pub use crate::core::search::{
    DEFAULT_RESULT_LIMIT, DEFAULT_SCAN_LIMIT, SearchOptions, SearchOutcome, browse, search,
    search_collection,
};
pub use remote::{ClientOptions, DEFAULT_TIMEOUT, RemoteClient};

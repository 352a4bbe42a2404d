//! Purpose: Library crate behind the `qdtk` CLI and its tests.
//! Exports: `api` (gateway client + export/search engine), `core`, `notice`.
//! Role: Streams Qdrant collections to JSONL and scans payloads for text, in bounded memory.
//! Invariants: Library code never prints; presentation lives in the binary.
//! Invariants: Core modules take explicit inputs (gateway, writer, options) and keep no globals.
pub mod api;
pub mod core;
pub mod notice;

// Core engine: error model, records, gateway seam, pager, export sink, matcher, search.
pub mod error;
pub mod export;
pub mod gateway;
pub mod matcher;
pub mod pager;
pub mod record;
pub mod search;

#[cfg(test)]
pub(crate) mod testing;

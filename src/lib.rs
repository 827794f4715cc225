//! catsync: incremental channel-to-catalog synchronization
//!
//! Propagates single change events from a source product-information
//! hierarchy into a target catalog without a full re-export.

pub mod cli;
pub mod core;
pub mod sync;
pub mod yaml;

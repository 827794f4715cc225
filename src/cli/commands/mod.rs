//! CLI command implementations

pub mod completions;
pub mod config;
pub mod publish;
pub mod replay;
pub mod structure;

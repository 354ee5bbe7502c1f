//! # Provider
//!
//! Resolves gateway resources from a source of truth and feeds them into the
//! pipeline.

pub mod runner;
pub mod source;

pub use runner::{Config, Runner};
pub use source::{parse_resources, FileSource, ResourceSource};

//! # Gateway API Translation
//!
//! First translation stage: resource bags in, per-gateway IR and statuses out.

pub mod runner;
pub mod translator;

pub use runner::{Config, Runner};
pub use translator::{translate, Translation};

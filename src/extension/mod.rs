//! # Extension Hooks
//!
//! Out-of-process callbacks invoked during translation so deployments can
//! customise generated resources.

pub mod hook;
pub mod manager;

pub use hook::{HookClient, HttpHookClient};
pub use manager::Manager;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Translation points at which hooks are invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// Gateway API translation, with the resolved resource bag as payload
    TranslateResources,
    /// After xDS translation, with the full xDS resource set as payload
    PostTranslateModify,
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPoint::TranslateResources => write!(f, "translate_resources"),
            HookPoint::PostTranslateModify => write!(f, "post_translate_modify"),
        }
    }
}

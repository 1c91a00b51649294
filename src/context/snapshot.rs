//! Immutable context snapshot handed to consumers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Situational facts as of one `get_context` call.
///
/// An owned copy: later tracker mutations never show through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Local hour, 0–23.
    pub hour: u32,
    /// Local day of week, Monday = 0 … Sunday = 6.
    pub day: u32,
    pub workspace: String,
    /// `-1` when unknown.
    pub workspace_id: i64,
    pub monitor: String,
    /// Last launched app while inside the sequence window, else empty.
    pub last_app: String,
    pub is_session_start: bool,
    pub is_resume_from_idle: bool,
    /// Lower-cased, deduplicated application ids.
    pub running_apps: BTreeSet<String>,
}

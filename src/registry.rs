//! Running-app registry: lower-cased, deduplicated application ids.
//!
//! Pulled fresh from the backend on every call; nothing is cached.

use std::collections::BTreeSet;

use crate::compositor::CompositorBackend;

/// Normalize raw identifiers: drop empty ones, lower-case the rest.
pub fn collect_app_ids<'a, I>(ids: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    ids.into_iter()
        .filter(|id| !id.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Application ids of every window the backend knows about.
pub fn running_app_ids(backend: &dyn CompositorBackend) -> BTreeSet<String> {
    collect_app_ids(backend.window_app_ids())
}

//! Fixed fallback work used when scanning and research find nothing.

use crate::backlog::{BacklogItem, Complexity, Priority, SignalSource};
use std::collections::HashSet;

/// Polish work that is worth doing on almost any codebase.
const POLISH: &[(&str, &str, Complexity)] = &[
    (
        "Tighten error messages",
        "Make user-facing error messages name the failing input and the fix",
        Complexity::Small,
    ),
    (
        "Remove dead code",
        "Delete unused functions, imports and feature flags",
        Complexity::Small,
    ),
    (
        "Harden input validation",
        "Reject malformed input at the boundary with a clear error",
        Complexity::Medium,
    ),
    (
        "Add edge-case tests",
        "Cover empty, maximal and malformed inputs of the public API",
        Complexity::Medium,
    ),
    (
        "Improve logging context",
        "Attach identifiers to log lines on the main request path",
        Complexity::Small,
    ),
];

/// Documentation and refactor work; the last tier of the fallback chain.
const UPKEEP: &[(&str, &str, SignalSource, Complexity)] = &[
    (
        "Document public API",
        "Add doc comments to every public item that lacks one",
        SignalSource::Documentation,
        Complexity::Small,
    ),
    (
        "Refresh README usage section",
        "Make the README examples match the current interface",
        SignalSource::Documentation,
        Complexity::Trivial,
    ),
    (
        "Simplify the most complex function",
        "Split the function with the highest branch count into named steps",
        SignalSource::Documentation,
        Complexity::Medium,
    ),
];

/// Polish items whose ids are not already known.
pub fn polish_items(known: &HashSet<String>) -> Vec<BacklogItem> {
    POLISH
        .iter()
        .map(|(title, description, complexity)| {
            BacklogItem::new(
                *title,
                *description,
                Priority::Low,
                *complexity,
                SignalSource::Polish,
            )
        })
        .filter(|item| !known.contains(&item.id))
        .collect()
}

/// Upkeep items. With a generation, titles are stamped so every discovery
/// pass yields fresh ids; without one the list is fixed.
pub fn upkeep_items(generation: Option<u64>) -> Vec<BacklogItem> {
    UPKEEP
        .iter()
        .map(|(title, description, source, complexity)| {
            let title = match generation {
                Some(generation) => format!("{} (pass {})", title, generation),
                None => title.to_string(),
            };
            BacklogItem::new(title, *description, Priority::Low, *complexity, *source)
        })
        .collect()
}

//! Pluggable decisions the orchestrator does not hard-code.
//!
//! | Decision | `RulePolicy` default |
//! |---|---|
//! | next backlog item | first pending item in backlog order |
//! | red failure classification | missing symbol / unimplemented / not found => missing implementation, anything else => unrelated |
//! | priority after block | demote one level, Icebox stays Icebox |

use crate::backlog::{Backlog, BacklogItem, Priority};
use crate::capabilities::ValidationResult;
use crate::lifecycle::FailureClass;
use regex::Regex;
use std::sync::LazyLock;

// Compiler and runtime phrasings for "the thing under test does not exist".
static MISSING_IMPL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(cannot find|not found|undefined|unresolved|unimplemented|not implemented|no method named|no attribute|is not defined|NotImplementedError|todo!)",
    )
    .unwrap()
});

pub trait PolicyProvider: Send + Sync {
    /// Pick the item to promote into the active slot.
    fn select_next<'a>(&self, backlog: &'a Backlog) -> Option<&'a BacklogItem>;

    /// Classify a freshly written test's run.
    fn classify_red(&self, result: &ValidationResult) -> FailureClass;

    /// Priority a blocked item moves to.
    fn priority_after_block(&self, current: Priority) -> Priority;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RulePolicy;

impl RulePolicy {
    pub fn new() -> Self {
        Self
    }
}

impl PolicyProvider for RulePolicy {
    fn select_next<'a>(&self, backlog: &'a Backlog) -> Option<&'a BacklogItem> {
        backlog.pending().into_iter().next()
    }

    fn classify_red(&self, result: &ValidationResult) -> FailureClass {
        if result.passed {
            FailureClass::Passed
        } else if MISSING_IMPL_REGEX.is_match(&result.diagnostics) {
            FailureClass::MissingImplementation
        } else {
            FailureClass::Unrelated
        }
    }

    fn priority_after_block(&self, current: Priority) -> Priority {
        current.demoted()
    }
}

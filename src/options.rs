// Engine options - an explicit, immutable context threaded into the
// root-set builder and the enqueuer, so independent runs cannot interfere.

use serde::{Deserialize, Serialize};

/// Configuration for a single engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShakeOptions {
    /// Escalate recoverable conditions (unresolved references, rules that
    /// match nothing) to fatal errors.
    pub strict: bool,

    /// Emit a warning when a keep rule matches no program element.
    pub warn_on_unmatched_rules: bool,

    /// Upper bound on outer conditional-rule activation sweeps. Exceeding
    /// it means the fixpoint diverged, which is an engine bug.
    pub max_fixpoint_sweeps: usize,
}

impl Default for ShakeOptions {
    fn default() -> Self {
        Self {
            strict: false,
            warn_on_unmatched_rules: true,
            max_fixpoint_sweeps: 10_000,
        }
    }
}

impl ShakeOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }
}

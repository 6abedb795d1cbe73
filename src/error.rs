use miette::Diagnostic;
use thiserror::Error;

/// Non-normal outcomes of an engine run.
///
/// Expected conditions go through the diagnostics sink instead; only
/// cancellation, strict-mode escalation and internal invariant failures
/// cross the public boundary as errors.
#[derive(Debug, Error, Diagnostic)]
pub enum ShakeError {
    /// The run was cancelled cooperatively. Not an error in the program
    /// under analysis; no partial result is exposed.
    #[error("liveness trace cancelled")]
    #[diagnostic(code(treeshake::cancelled))]
    Cancelled,

    /// The two-level fixpoint kept activating past the configured bound.
    /// Signals an engine bug, never a problem with the input program.
    #[error("liveness fixpoint did not converge after {sweeps} activation sweeps")]
    #[diagnostic(code(treeshake::fixpoint_diverged))]
    FixpointDiverged { sweeps: usize },

    /// A reference resolved to nothing in program or library, under strict
    /// mode. The default (non-strict) behavior is a warning diagnostic.
    #[error("unresolved reference to {reference}")]
    #[diagnostic(code(treeshake::unresolved_reference))]
    UnresolvedReference { reference: String },

    /// A rule matched no program element, under strict mode.
    #[error("rule matched nothing: {rule}")]
    #[diagnostic(code(treeshake::rule_matched_nothing))]
    RuleMatchedNothing { rule: String },

    /// A rule pattern failed to compile.
    #[error("malformed pattern `{pattern}`: {source}")]
    #[diagnostic(code(treeshake::bad_pattern))]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

//! treeshake - whole-program reachability analysis for bytecode shrinking
//!
//! This library is the liveness decision core of a bytecode
//! compiler/shrinker. Starting from keep obligations and entry points it
//! decides which classes, methods and fields of a closed program are
//! observably reachable, and which can be pruned.
//!
//! # Architecture
//!
//! One engine run consists of:
//! 1. **Program graph** - an immutable snapshot of class/method/field
//!    definitions with a resolution oracle, handed over by the bytecode
//!    reader
//! 2. **Root-set building** - retention rules compiled into unconditional
//!    seeds, pending conditional rules and an assumption table
//! 3. **Enqueuer** - a worklist fixpoint trace over the graph, with
//!    virtual-dispatch obligations and re-entrant conditional-rule
//!    activation
//! 4. **Provenance** - optional "why is this kept" edge recording
//! 5. **Post-passes** - discard checking and usage reporting
//!
//! The same engine, with narrowed roots and assumptions disabled, computes
//! the main-dex partition of incrementally loading builds.

pub mod cancel;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod options;
pub mod report;
pub mod rules;
pub mod shaking;

pub use cancel::CancellationToken;
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, Severity};
pub use error::ShakeError;
pub use graph::{ProgramGraph, ProgramGraphBuilder, Reference};
pub use options::ShakeOptions;
pub use report::UsageReport;
pub use rules::{Rule, RuleId, RuleKind};
pub use shaking::{
    DiscardChecker, Enqueuer, KeptGraph, LivenessResult, MainDexInfo, MainDexTracer,
    RootSet, RootSetBuilder, Violation,
};

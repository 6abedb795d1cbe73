//! The liveness core: root-set compilation, the fixpoint enqueuer,
//! provenance recording, discard checking and main-dex specialization.

mod conditional;
mod discard;
mod enqueuer;
mod liveness;
mod main_dex;
mod reporter;
mod root_set;
mod worklist;

pub use conditional::{ConditionalRule, ConditionalRuleIndex};
pub use discard::{DiscardChecker, Violation};
pub use enqueuer::{Enqueuer, TraceMode};
pub use liveness::{LivenessResult, LivenessStats};
pub use main_dex::{MainDexInfo, MainDexTracer};
pub use reporter::{EdgeKind, GraphNode, KeptGraph, PathStep, RetentionPath};
pub use root_set::{AssumptionTable, RetentionReason, RootSet, RootSetBuilder};
pub use worklist::{WorkItem, Worklist};

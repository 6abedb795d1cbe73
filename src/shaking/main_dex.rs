//! Main-dex tracing: deciding which classes must land in the first output
//! partition of an incrementally loading build.
//!
//! A thin specialization of the enqueuer: roots come from a separate,
//! narrower rule list, static initializers pull in their dependencies
//! (they run unconditionally at class load), and assumptions are disabled
//! because a main-dex trace must not assume secondary-partition code
//! exists. The caller runs it twice: an initial pass before transformation
//! protects optimizations from moving code across the partition boundary,
//! and a final pass against the transformed graph computes the
//! authoritative list.

use super::enqueuer::Enqueuer;
use super::root_set::RootSetBuilder;
use crate::cancel::CancellationToken;
use crate::diagnostics::DiagnosticSink;
use crate::error::ShakeError;
use crate::graph::{ClassId, ProgramGraph, Reference};
use crate::options::ShakeOptions;
use crate::rules::Rule;
use std::collections::HashSet;
use tracing::info;

/// The ordered set of classes assigned to the first output partition.
#[derive(Debug, Default)]
pub struct MainDexInfo {
    /// Classes matched directly by main-dex rules.
    roots: HashSet<ClassId>,
    /// All main-dex classes, in the order the trace reached them. The
    /// partitioned writer consumes this order.
    classes: Vec<ClassId>,
    members: HashSet<ClassId>,
}

impl MainDexInfo {
    pub(crate) fn new(roots: HashSet<ClassId>, classes: Vec<ClassId>) -> Self {
        let members = classes.iter().copied().collect();
        Self {
            roots,
            classes,
            members,
        }
    }

    pub fn contains(&self, class: ClassId) -> bool {
        self.members.contains(&class)
    }

    pub fn is_root(&self, class: ClassId) -> bool {
        self.roots.contains(&class)
    }

    /// Order-preserving iteration, as the partitioned writer consumes it.
    pub fn iter(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.classes.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Runs the enqueuer in main-dex mode against a narrow rule list.
pub struct MainDexTracer<'a> {
    graph: &'a ProgramGraph,
    options: &'a ShakeOptions,
    cancel: Option<CancellationToken>,
}

impl<'a> MainDexTracer<'a> {
    pub fn new(graph: &'a ProgramGraph, options: &'a ShakeOptions) -> Self {
        Self {
            graph,
            options,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// One tracing pass. Independent of any prior pass; callers rerun it
    /// against the transformed graph for the final list.
    pub fn trace(
        &self,
        rules: &[Rule],
        sink: &mut dyn DiagnosticSink,
    ) -> Result<MainDexInfo, ShakeError> {
        let root_set = RootSetBuilder::new(self.graph, self.options).build(rules, sink)?;

        let mut roots = HashSet::new();
        for (reference, _) in &root_set.roots {
            let class = match *reference {
                Reference::Class(c) => c,
                Reference::Method(m) => self.graph.method_owner(m),
                Reference::Field(f) => self.graph.field_owner(f),
            };
            roots.insert(class);
        }

        let mut enqueuer = Enqueuer::main_dex(self.graph, self.options, sink);
        if let Some(token) = &self.cancel {
            enqueuer = enqueuer.with_cancellation(token.clone());
        }
        let result = enqueuer.trace(&root_set)?;

        let classes = result.live_classes_in_order().to_vec();
        info!(
            "Main-dex trace: {} roots expanded to {} classes",
            roots.len(),
            classes.len()
        );
        Ok(MainDexInfo::new(roots, classes))
    }
}

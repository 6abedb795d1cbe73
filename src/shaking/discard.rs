// Post-pass validation of expected-dead patterns.

use super::liveness::LivenessResult;
use super::root_set::resolve_targets;
use crate::diagnostics::Diagnostic;
use crate::graph::{ProgramGraph, Reference};
use crate::rules::{Rule, RuleId, RuleKind};
use tracing::debug;

/// An item a check-discard rule expected to be gone but which survived the
/// trace.
#[derive(Debug, Clone)]
pub struct Violation {
    pub rule: RuleId,
    pub reference: Reference,
    pub description: String,
    /// Root-to-item retention path, when the trace recorded provenance.
    pub retention_path: Option<Vec<String>>,
}

impl Violation {
    /// The build-breaking diagnostic form, with the retention path
    /// attached when the trace recorded provenance.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(format!(
            "discard check failed for {} ({})",
            self.description, self.rule
        ))
        .with_reference(self.reference);
        match &self.retention_path {
            Some(path) => diagnostic.with_path(path.clone()),
            None => diagnostic,
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "discard check failed for {} ({})", self.description, self.rule)?;
        if let Some(path) = &self.retention_path {
            for line in path {
                write!(f, "\n  {line}")?;
            }
        }
        Ok(())
    }
}

/// Validates check-discard rules against a finished trace. Never mutates
/// the result; surfacing violations as build-breaking is the caller's
/// decision.
pub struct DiscardChecker<'a> {
    graph: &'a ProgramGraph,
}

impl<'a> DiscardChecker<'a> {
    pub fn new(graph: &'a ProgramGraph) -> Self {
        Self { graph }
    }

    pub fn check(&self, liveness: &LivenessResult, rules: &[Rule]) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (index, rule) in rules.iter().enumerate() {
            if rule.kind != RuleKind::CheckDiscard {
                continue;
            }
            let id = RuleId(index);
            for target in resolve_targets(self.graph, rule) {
                if !liveness.is_live(target) {
                    continue;
                }
                debug!(
                    "Discard violation: {} is live",
                    self.graph.describe(target)
                );
                let retention_path = liveness
                    .kept_graph()
                    .and_then(|kept| kept.explain(target))
                    .map(|path| path.render(self.graph, rules));
                violations.push(Violation {
                    rule: id,
                    reference: target,
                    description: self.graph.describe(target),
                    retention_path,
                });
            }
        }
        violations
    }
}

//! Root-set construction: compiling retention rules against the program
//! graph into unconditional seeds, pending conditional rules and the
//! assumption table.

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::ShakeError;
use crate::graph::{ClassDef, ClassId, MethodId, ProgramGraph, Reference};
use crate::options::ShakeOptions;
use crate::rules::{MemberPattern, Rule, RuleId, RuleKind};
use crate::shaking::conditional::ConditionalRule;
use std::collections::HashSet;
use tracing::{debug, info};

/// Why an item was retained. Carried on every liveness transition so that
/// diagnostics and provenance recording can name the responsible rule or
/// referencing item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionReason {
    /// Rooted directly by a keep rule.
    KeepRule(RuleId),
    /// Rooted by an activated conditional rule.
    ConditionalRule(RuleId),
    /// Referenced from a live item.
    ReferencedFrom(Reference),
    /// Instantiated inside a live method.
    InstantiatedIn(MethodId),
    /// Target of a virtual call discovered in a live method.
    DispatchedFrom(MethodId),
    /// A class kept because it holds a live member.
    HolderOfLiveMember(Reference),
    /// A supertype kept because a subtype is live.
    SupertypeOfLiveType(ClassId),
    /// A static initializer kept because its class became live.
    StaticInitializerOf(ClassId),
}

/// Members assumed side-effect-free or constant-valued.
///
/// Assumptions are load-bearing only if referenced; they never root
/// anything. In main-dex mode the table is disabled entirely.
#[derive(Debug, Clone, Default)]
pub struct AssumptionTable {
    no_side_effects: HashSet<Reference>,
    constant_values: HashSet<Reference>,
}

impl AssumptionTable {
    pub fn assume_no_side_effects(&mut self, reference: Reference) {
        self.no_side_effects.insert(reference);
    }

    pub fn assume_constant_value(&mut self, reference: Reference) {
        self.constant_values.insert(reference);
    }

    pub fn is_side_effect_free(&self, reference: Reference) -> bool {
        self.no_side_effects.contains(&reference)
    }

    pub fn is_constant(&self, reference: Reference) -> bool {
        self.constant_values.contains(&reference)
    }

    pub fn is_empty(&self) -> bool {
        self.no_side_effects.is_empty() && self.constant_values.is_empty()
    }

    /// Drop an assumption. Used when an explicit keep wins over it.
    fn remove(&mut self, reference: Reference) -> bool {
        self.no_side_effects.remove(&reference) | self.constant_values.remove(&reference)
    }
}

/// The compiled root set: unconditional seeds plus pending conditional
/// rules and assumptions. Built once per run, consumed by the enqueuer,
/// never mutated by it.
#[derive(Debug, Default)]
pub struct RootSet {
    pub roots: Vec<(Reference, RetentionReason)>,
    pub conditional_rules: Vec<ConditionalRule>,
    pub assumptions: AssumptionTable,
}

impl RootSet {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.conditional_rules.is_empty()
    }
}

/// Compiles a rule list against a program graph into a [`RootSet`].
///
/// Pure with respect to the graph; all effects are the returned root set
/// and diagnostics emitted through the injected sink.
pub struct RootSetBuilder<'a> {
    graph: &'a ProgramGraph,
    options: &'a ShakeOptions,
}

impl<'a> RootSetBuilder<'a> {
    pub fn new(graph: &'a ProgramGraph, options: &'a ShakeOptions) -> Self {
        Self { graph, options }
    }

    pub fn build(
        &self,
        rules: &[Rule],
        sink: &mut dyn DiagnosticSink,
    ) -> Result<RootSet, ShakeError> {
        let mut root_set = RootSet::default();

        for (index, rule) in rules.iter().enumerate() {
            let id = RuleId(index);
            match rule.kind {
                RuleKind::Keep => {
                    let targets = resolve_targets(self.graph, rule);
                    if targets.is_empty() {
                        self.report_unmatched(rule, id, sink)?;
                        continue;
                    }
                    debug!("{} matched {} items", id, targets.len());
                    for target in targets {
                        root_set.roots.push((target, RetentionReason::KeepRule(id)));
                    }
                }
                RuleKind::KeepIf => {
                    let expanded = self.expand_conditional(rule, id, sink)?;
                    root_set.conditional_rules.extend(expanded);
                }
                RuleKind::AssumeNoSideEffects => {
                    let targets = resolve_targets(self.graph, rule);
                    if targets.is_empty() {
                        self.report_unmatched(rule, id, sink)?;
                    }
                    for target in targets {
                        root_set.assumptions.assume_no_side_effects(target);
                    }
                }
                RuleKind::AssumeValues => {
                    let targets = resolve_targets(self.graph, rule);
                    if targets.is_empty() {
                        self.report_unmatched(rule, id, sink)?;
                    }
                    for target in targets {
                        root_set.assumptions.assume_constant_value(target);
                    }
                }
                // Consumed by the DiscardChecker after the trace.
                RuleKind::CheckDiscard => {}
            }
        }

        // Conflicting retention: an explicit keep beats an assumption-based
        // removal for the same item. Logged, never silently dropped.
        for (reference, _) in &root_set.roots {
            if root_set.assumptions.remove(*reference) {
                sink.report(
                    Diagnostic::info(format!(
                        "explicit keep wins over assumption for {}",
                        self.graph.describe(*reference)
                    ))
                    .with_reference(*reference),
                );
            }
        }

        info!(
            "Root set built: {} roots, {} conditional rules",
            root_set.roots.len(),
            root_set.conditional_rules.len()
        );
        Ok(root_set)
    }

    /// Expand a conditional rule: one pending [`ConditionalRule`] per class
    /// matching its precondition pattern, with consequences resolved up
    /// front. Reflective-lookup retention arrives here too: the rule's
    /// precondition is the reflective call site, so activation waits until
    /// that site is itself live.
    fn expand_conditional(
        &self,
        rule: &Rule,
        id: RuleId,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Vec<ConditionalRule>, ShakeError> {
        // A KeepIf without a condition degenerates to an unconditional keep.
        let Some(condition) = rule.condition.as_ref() else {
            return Ok(vec![ConditionalRule {
                rule: id,
                preconditions: Vec::new(),
                consequences: resolve_targets(self.graph, rule),
            }]);
        };

        let consequences = resolve_targets(self.graph, rule);
        if consequences.is_empty() {
            self.report_unmatched(rule, id, sink)?;
            return Ok(Vec::new());
        }

        let mut expanded = Vec::new();
        for class in self.graph.program_classes() {
            let name = self.graph.class_name(class.id);
            if !condition.class_pattern.matches(name) {
                continue;
            }
            let preconditions = if condition.members.is_empty() {
                vec![Reference::Class(class.id)]
            } else {
                let members = resolve_members(self.graph, class, &condition.members);
                if members.is_empty() {
                    continue;
                }
                members
            };
            expanded.push(ConditionalRule {
                rule: id,
                preconditions,
                consequences: consequences.clone(),
            });
        }

        if expanded.is_empty() {
            self.report_unmatched(rule, id, sink)?;
        }
        Ok(expanded)
    }

    fn report_unmatched(
        &self,
        rule: &Rule,
        id: RuleId,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<(), ShakeError> {
        let described = rule.describe(id);
        if self.options.strict {
            sink.report(Diagnostic::error(format!("rule matched nothing: {described}")));
            return Err(ShakeError::RuleMatchedNothing { rule: described });
        }
        if self.options.warn_on_unmatched_rules {
            sink.report(Diagnostic::warning(format!("rule matched nothing: {described}")));
        }
        Ok(())
    }
}

/// Resolve a rule's class and member patterns to concrete references.
///
/// A rule with member patterns retains the matched members and their class;
/// a rule without members retains the class alone. Shared with the
/// DiscardChecker, which resolves check-discard patterns the same way.
pub(crate) fn resolve_targets(graph: &ProgramGraph, rule: &Rule) -> Vec<Reference> {
    let mut targets = Vec::new();
    for class in graph.program_classes() {
        let name = graph.class_name(class.id);
        if !rule.class_pattern.matches(name) {
            continue;
        }
        if rule.members.is_empty() {
            targets.push(Reference::Class(class.id));
            continue;
        }
        let members = resolve_members(graph, class, &rule.members);
        if !members.is_empty() {
            targets.push(Reference::Class(class.id));
            targets.extend(members);
        }
    }
    targets
}

fn resolve_members(
    graph: &ProgramGraph,
    class: &ClassDef,
    patterns: &[MemberPattern],
) -> Vec<Reference> {
    let mut members = Vec::new();
    for pattern in patterns {
        for &method in &class.methods {
            let (name, descriptor) = graph.method_signature(method);
            if pattern.matches_method(name, descriptor) {
                members.push(Reference::Method(method));
            }
        }
        for &field in &class.fields {
            if pattern.matches_field(graph.field_name(field)) {
                members.push(Reference::Field(field));
            }
        }
    }
    members.sort();
    members.dedup();
    members
}

//! The fixpoint worklist engine.
//!
//! Consumes a [`RootSet`] against a frozen [`ProgramGraph`] and produces a
//! [`LivenessResult`]. Two fixpoint levels: the inner worklist drain traces
//! direct reachability; the outer sweep activates conditional rules whose
//! preconditions the last drain made live. The run ends only when the
//! worklist is empty and a full sweep activates nothing.
//!
//! The drain is single-threaded by design: work-item processing mutates
//! the liveness state and the conditional-rule index without
//! synchronization. All parallel preprocessing (the subtype index) happens
//! before the graph is frozen.

use super::conditional::ConditionalRuleIndex;
use super::liveness::LivenessResult;
use super::reporter::{GraphNode, KeptGraph};
use super::root_set::{AssumptionTable, RetentionReason, RootSet};
use super::worklist::{WorkItem, Worklist};
use crate::cancel::CancellationToken;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::ShakeError;
use crate::graph::{ClassId, FieldId, MethodId, ProgramGraph, Reference, SignatureId, TracedReferences};
use crate::options::ShakeOptions;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// What the trace is for. Main-dex mode disables assumptions: a trace that
/// decides the first partition's content must not assume optional code
/// exists or is removable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceMode {
    FullShaking,
    MainDex,
}

/// How often the cancellation token is polled, in work items.
const CANCEL_POLL_INTERVAL: u32 = 256;

pub struct Enqueuer<'a> {
    graph: &'a ProgramGraph,
    options: &'a ShakeOptions,
    sink: &'a mut dyn DiagnosticSink,
    mode: TraceMode,

    worklist: Worklist,
    live_classes: HashSet<ClassId>,
    live_order: Vec<ClassId>,
    live_methods: HashSet<MethodId>,
    live_fields: HashSet<FieldId>,
    instantiated: HashSet<ClassId>,
    live_library: HashSet<Reference>,

    /// Pending virtual-call obligations: declared receiver type ->
    /// signature -> the live method that discovered the call (kept for
    /// provenance). Applied each time a subtype becomes instantiated.
    pending_virtual: HashMap<ClassId, HashMap<SignatureId, MethodId>>,

    conditional: ConditionalRuleIndex,
    assumptions: AssumptionTable,
    kept_graph: Option<KeptGraph>,
    cancel: Option<CancellationToken>,
    unresolved_reported: HashSet<Reference>,
}

impl<'a> Enqueuer<'a> {
    pub fn new(
        graph: &'a ProgramGraph,
        options: &'a ShakeOptions,
        sink: &'a mut dyn DiagnosticSink,
    ) -> Self {
        Self::with_mode(graph, options, sink, TraceMode::FullShaking)
    }

    pub fn main_dex(
        graph: &'a ProgramGraph,
        options: &'a ShakeOptions,
        sink: &'a mut dyn DiagnosticSink,
    ) -> Self {
        Self::with_mode(graph, options, sink, TraceMode::MainDex)
    }

    fn with_mode(
        graph: &'a ProgramGraph,
        options: &'a ShakeOptions,
        sink: &'a mut dyn DiagnosticSink,
        mode: TraceMode,
    ) -> Self {
        Self {
            graph,
            options,
            sink,
            mode,
            worklist: Worklist::new(),
            live_classes: HashSet::new(),
            live_order: Vec::new(),
            live_methods: HashSet::new(),
            live_fields: HashSet::new(),
            instantiated: HashSet::new(),
            live_library: HashSet::new(),
            pending_virtual: HashMap::new(),
            conditional: ConditionalRuleIndex::default(),
            assumptions: AssumptionTable::default(),
            kept_graph: None,
            cancel: None,
            unresolved_reported: HashSet::new(),
        }
    }

    /// Attach provenance recording. Off by default.
    pub fn with_kept_graph(mut self) -> Self {
        self.kept_graph = Some(KeptGraph::new());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run the trace to its fixpoint.
    pub fn trace(mut self, root_set: &RootSet) -> Result<LivenessResult, ShakeError> {
        self.assumptions = match self.mode {
            TraceMode::FullShaking => root_set.assumptions.clone(),
            TraceMode::MainDex => AssumptionTable::default(),
        };
        self.conditional = ConditionalRuleIndex::new(root_set.conditional_rules.clone());
        self.seed(root_set);

        let mut sweeps = 0usize;
        loop {
            self.drain()?;
            let activated = self.activate_conditional_rules();
            sweeps += 1;
            if activated == 0 && self.worklist.is_empty() {
                break;
            }
            if sweeps > self.options.max_fixpoint_sweeps {
                return Err(ShakeError::FixpointDiverged { sweeps });
            }
        }

        debug!(
            "Trace converged after {} sweeps; {} conditional rules never activated",
            sweeps,
            self.conditional.pending_count()
        );
        Ok(self.finish())
    }

    /// Insert every root-set member as initial work.
    fn seed(&mut self, root_set: &RootSet) {
        for (reference, reason) in &root_set.roots {
            self.enqueue_reference(*reference, reason.clone());
        }
        info!("Seeded {} root items", self.worklist.len());
    }

    fn enqueue_reference(&mut self, reference: Reference, reason: RetentionReason) {
        match reference {
            Reference::Class(class) => self.enqueue_class(class, reason),
            Reference::Method(method) => self.enqueue_method(method, reason),
            Reference::Field(field) => self.enqueue_field(field, reason),
        }
    }

    fn enqueue_class(&mut self, class: ClassId, reason: RetentionReason) {
        if self.live_classes.contains(&class) {
            return;
        }
        self.worklist.push(WorkItem::ClassBecomeLive { class, reason });
    }

    fn enqueue_method(&mut self, method: MethodId, reason: RetentionReason) {
        if self.live_methods.contains(&method) {
            return;
        }
        self.worklist.push(WorkItem::MethodBecomeLive { method, reason });
    }

    fn enqueue_field(&mut self, field: FieldId, reason: RetentionReason) {
        if self.live_fields.contains(&field) {
            return;
        }
        self.worklist.push(WorkItem::FieldBecomeLive { field, reason });
    }

    /// Inner fixpoint: drain the worklist.
    fn drain(&mut self) -> Result<(), ShakeError> {
        let mut processed: u32 = 0;
        while let Some(item) = self.worklist.pop() {
            if processed % CANCEL_POLL_INTERVAL == 0 {
                self.check_cancelled()?;
            }
            processed += 1;
            match item {
                WorkItem::ClassBecomeLive { class, reason } => {
                    self.process_class_become_live(class, reason)?;
                }
                WorkItem::MethodBecomeLive { method, reason } => {
                    self.process_method_become_live(method, reason)?;
                }
                WorkItem::FieldBecomeLive { field, reason } => {
                    self.process_field_become_live(field, reason)?;
                }
                WorkItem::VirtualCallDiscovered { method, context } => {
                    self.process_virtual_call(method, context)?;
                }
            }
        }
        Ok(())
    }

    fn check_cancelled(&mut self) -> Result<(), ShakeError> {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                warn!("Liveness trace cancelled");
                return Err(ShakeError::Cancelled);
            }
        }
        Ok(())
    }

    fn process_class_become_live(
        &mut self,
        class: ClassId,
        reason: RetentionReason,
    ) -> Result<(), ShakeError> {
        let graph = self.graph;
        if self.live_classes.contains(&class) {
            return Ok(());
        }
        let Some(def) = graph.class_def(class) else {
            return self.report_unresolved(Reference::Class(class));
        };
        if !def.is_program() {
            self.mark_library_live(Reference::Class(class), reason);
            return Ok(());
        }

        debug!("Class live: {}", graph.class_name(class));
        self.live_classes.insert(class);
        self.live_order.push(class);
        self.record(&reason, Reference::Class(class));
        self.on_become_live(Reference::Class(class));

        // Supertypes of a live type stay live.
        if let Some(superclass) = def.superclass {
            self.enqueue_class(superclass, RetentionReason::SupertypeOfLiveType(class));
        }
        for &interface in &def.interfaces {
            self.enqueue_class(interface, RetentionReason::SupertypeOfLiveType(class));
        }

        // The static initializer runs unconditionally at class load.
        // Conservatively retained unless the assumption table marks it
        // side-effect-free.
        if let Some(clinit) = def.static_initializer {
            if self.assumptions.is_side_effect_free(Reference::Method(clinit)) {
                debug!(
                    "Skipping side-effect-free static initializer of {}",
                    graph.class_name(class)
                );
            } else {
                self.enqueue_method(clinit, RetentionReason::StaticInitializerOf(class));
            }
        }
        Ok(())
    }

    fn process_method_become_live(
        &mut self,
        method: MethodId,
        reason: RetentionReason,
    ) -> Result<(), ShakeError> {
        let graph = self.graph;
        if self.live_methods.contains(&method) {
            return Ok(());
        }
        if graph.is_library_reference(Reference::Method(method)) {
            self.mark_library_live(Reference::Method(method), reason);
            return Ok(());
        }
        let Some(def) = graph.method_def(method) else {
            return self.report_unresolved(Reference::Method(method));
        };

        debug!("Method live: {}", graph.describe(Reference::Method(method)));
        self.live_methods.insert(method);
        self.record(&reason, Reference::Method(method));
        self.on_become_live(Reference::Method(method));

        // A member is never live without its owning class.
        let owner = graph.method_owner(method);
        self.enqueue_class(
            owner,
            RetentionReason::HolderOfLiveMember(Reference::Method(method)),
        );

        if def.access.is_abstract {
            return Ok(());
        }
        self.trace_references(method, &def.references)
    }

    fn process_field_become_live(
        &mut self,
        field: FieldId,
        reason: RetentionReason,
    ) -> Result<(), ShakeError> {
        let graph = self.graph;
        if self.live_fields.contains(&field) {
            return Ok(());
        }
        if graph.is_library_reference(Reference::Field(field)) {
            self.mark_library_live(Reference::Field(field), reason);
            return Ok(());
        }
        let Some(def) = graph.field_def(field) else {
            return self.report_unresolved(Reference::Field(field));
        };

        debug!("Field live: {}", graph.describe(Reference::Field(field)));
        self.live_fields.insert(field);
        self.record(&reason, Reference::Field(field));
        self.on_become_live(Reference::Field(field));

        let owner = graph.field_owner(field);
        self.enqueue_class(
            owner,
            RetentionReason::HolderOfLiveMember(Reference::Field(field)),
        );
        if let Some(type_class) = def.type_class {
            self.enqueue_class(
                type_class,
                RetentionReason::ReferencedFrom(Reference::Field(field)),
            );
        }
        Ok(())
    }

    /// Walk one live method's abstract reference set.
    fn trace_references(
        &mut self,
        context: MethodId,
        references: &TracedReferences,
    ) -> Result<(), ShakeError> {
        let graph = self.graph;
        let from = RetentionReason::ReferencedFrom(Reference::Method(context));

        for &t in &references.types {
            self.enqueue_class(t, from.clone());
        }

        for &field in &references.field_reads {
            self.trace_field_access(field, &from, true)?;
        }
        for &field in &references.field_writes {
            self.trace_field_access(field, &from, false)?;
        }

        for invoke in &references.invokes {
            let target_ref = Reference::Method(invoke.target);
            if self.assumptions.is_side_effect_free(target_ref) {
                debug!(
                    "Not tracing assumed side-effect-free target {}",
                    graph.describe(target_ref)
                );
                continue;
            }
            if invoke.kind.is_dynamic() {
                self.worklist.push(WorkItem::VirtualCallDiscovered {
                    method: invoke.target,
                    context,
                });
            } else {
                // Static and direct invokes have a single deterministic
                // target.
                match graph.resolve_method(invoke.target) {
                    Some(resolved) => self.enqueue_method(resolved, from.clone()),
                    None => {
                        if graph.resolves_into_library(target_ref) {
                            self.mark_library_live(target_ref, from.clone());
                        } else {
                            self.report_unresolved(target_ref)?;
                        }
                    }
                }
            }
        }

        for &class in &references.instantiations {
            self.process_instantiation(class, context);
        }
        Ok(())
    }

    /// One field access site. Reads of assumed-constant fields are not
    /// traced; the optimizer replaces them with the assumed value. Writes
    /// keep the field live regardless.
    fn trace_field_access(
        &mut self,
        field: FieldId,
        from: &RetentionReason,
        is_read: bool,
    ) -> Result<(), ShakeError> {
        let graph = self.graph;
        match graph.resolve_field(field) {
            Some(resolved) => {
                if is_read && self.assumptions.is_constant(Reference::Field(resolved)) {
                    debug!(
                        "Not tracing assumed-constant read of {}",
                        graph.describe(Reference::Field(resolved))
                    );
                    return Ok(());
                }
                self.enqueue_field(resolved, from.clone());
                // The syntactic owner differs from the defining class when
                // the field is inherited; the initial-resolution holder
                // stays live so package-visible access keeps working after
                // pruning.
                let syntactic_owner = graph.field_owner(field);
                if graph.field_owner(resolved) != syntactic_owner {
                    self.enqueue_class(syntactic_owner, from.clone());
                }
            }
            None => {
                if graph.resolves_into_library(Reference::Field(field)) {
                    self.mark_library_live(Reference::Field(field), from.clone());
                } else {
                    self.report_unresolved(Reference::Field(field))?;
                }
            }
        }
        Ok(())
    }

    /// A `new` site: the class becomes live and, separately, instantiated.
    /// Standing virtual-call obligations along its supertype chain resolve
    /// against it now.
    fn process_instantiation(&mut self, class: ClassId, context: MethodId) {
        let graph = self.graph;
        self.enqueue_class(class, RetentionReason::InstantiatedIn(context));
        if !self.instantiated.insert(class) {
            return;
        }
        debug!("Class instantiated: {}", graph.class_name(class));

        for supertype in graph.resolution_order(class) {
            let Some(obligations) = self.pending_virtual.get(&supertype) else {
                continue;
            };
            let obligations: Vec<(SignatureId, MethodId)> =
                obligations.iter().map(|(&sig, &ctx)| (sig, ctx)).collect();
            for (signature, discovered_in) in obligations {
                if let Some(target) = graph.resolve_dispatch(class, signature) {
                    self.enqueue_method(target, RetentionReason::DispatchedFrom(discovered_in));
                }
            }
        }
    }

    /// A virtual/interface call site. Never commits to a single target:
    /// registers an obligation keyed by (signature, declared receiver type)
    /// and applies it to receivers already instantiated. Later
    /// instantiations pick it up in `process_instantiation`.
    fn process_virtual_call(
        &mut self,
        method: MethodId,
        context: MethodId,
    ) -> Result<(), ShakeError> {
        let graph = self.graph;
        let receiver = graph.method_owner(method);
        let signature = graph.signature_of(method);
        let from = RetentionReason::ReferencedFrom(Reference::Method(context));

        // The declared type is referenced regardless of dispatch.
        self.enqueue_class(receiver, from);

        if graph.is_library_reference(Reference::Method(method)) {
            self.mark_library_live(
                Reference::Method(method),
                RetentionReason::ReferencedFrom(Reference::Method(context)),
            );
            return Ok(());
        }
        if graph.resolve_method(method).is_none() {
            // The resolution chain may end on a library supertype whose
            // declarations are invisible; such a call lands in the library.
            if graph.resolves_into_library(Reference::Method(method)) {
                self.mark_library_live(
                    Reference::Method(method),
                    RetentionReason::ReferencedFrom(Reference::Method(context)),
                );
            } else {
                self.report_unresolved(Reference::Method(method))?;
            }
            return Ok(());
        }

        let obligations = self.pending_virtual.entry(receiver).or_default();
        if obligations.contains_key(&signature) {
            return Ok(());
        }
        obligations.insert(signature, context);

        // Receivers instantiated before this call site was discovered.
        let mut candidates = vec![receiver];
        candidates.extend(graph.hierarchy().transitive_subtypes(receiver));
        for candidate in candidates {
            if !self.instantiated.contains(&candidate) {
                continue;
            }
            if let Some(target) = graph.resolve_dispatch(candidate, signature) {
                self.enqueue_method(target, RetentionReason::DispatchedFrom(context));
            }
        }
        Ok(())
    }

    /// Outer fixpoint step: seed the consequences of every conditional rule
    /// whose precondition set the last drain completed.
    fn activate_conditional_rules(&mut self) -> usize {
        let ready = self.conditional.take_ready();
        let activated = ready.len();
        for rule in ready {
            debug!("Conditional {} activated", rule.rule);
            for &consequence in &rule.consequences {
                self.enqueue_reference(consequence, RetentionReason::ConditionalRule(rule.rule));
            }
        }
        activated
    }

    fn mark_library_live(&mut self, reference: Reference, reason: RetentionReason) {
        if self.live_library.insert(reference) {
            debug!("Library reference live: {}", self.graph.describe(reference));
            self.record(&reason, reference);
            self.on_become_live(reference);
        }
    }

    fn on_become_live(&mut self, reference: Reference) {
        let newly_satisfiable = self.conditional.on_become_live(reference);
        if newly_satisfiable > 0 {
            debug!(
                "{newly_satisfiable} conditional rules satisfiable after {}",
                self.graph.describe(reference)
            );
        }
    }

    fn record(&mut self, reason: &RetentionReason, effect: Reference) {
        if let Some(kept) = &mut self.kept_graph {
            let (cause, kind) = reason.edge();
            kept.record(cause, GraphNode::Item(effect), kind);
        }
    }

    /// An unresolved reference is inert with a warning, or fatal in strict
    /// mode. Reported once per reference.
    fn report_unresolved(&mut self, reference: Reference) -> Result<(), ShakeError> {
        if !self.unresolved_reported.insert(reference) {
            return Ok(());
        }
        let name = self.graph.describe(reference);
        if self.options.strict {
            self.sink.report(
                Diagnostic::error(format!("unresolved reference to {name}"))
                    .with_reference(reference),
            );
            return Err(ShakeError::UnresolvedReference { reference: name });
        }
        self.sink.report(
            Diagnostic::warning(format!(
                "unresolved reference to {name}; treated as inert"
            ))
            .with_reference(reference),
        );
        Ok(())
    }

    fn finish(self) -> LivenessResult {
        let mut pruned: Vec<ClassId> = self
            .graph
            .program_classes()
            .map(|c| c.id)
            .filter(|id| !self.live_classes.contains(id))
            .collect();
        pruned.sort_by(|a, b| self.graph.class_name(*a).cmp(self.graph.class_name(*b)));

        info!(
            "Trace complete: {} live classes, {} pruned types, {} live methods",
            self.live_classes.len(),
            pruned.len(),
            self.live_methods.len()
        );
        LivenessResult::new(
            self.live_classes,
            self.live_order,
            self.live_methods,
            self.live_fields,
            self.instantiated,
            self.live_library,
            pruned,
            self.kept_graph,
        )
    }
}

// The terminal snapshot of an engine run.

use super::reporter::KeptGraph;
use crate::graph::{ClassId, FieldId, MethodId, ProgramGraph, Reference};
use serde::Serialize;
use std::collections::HashSet;

/// Immutable result of one liveness trace.
///
/// Rebuilt from scratch for each engine run; a later run (final shaking
/// after optimization, main-dex tracing) never reuses a prior result.
#[derive(Debug)]
pub struct LivenessResult {
    live_classes: HashSet<ClassId>,
    /// Live program classes in the order they became live. Main-dex mode
    /// reads this as the partition content.
    live_order: Vec<ClassId>,
    live_methods: HashSet<MethodId>,
    live_fields: HashSet<FieldId>,
    instantiated: HashSet<ClassId>,
    /// References into the unanalyzed library that became live by
    /// reference.
    live_library: HashSet<Reference>,
    /// Program classes proven dead, sorted by name.
    pruned_types: Vec<ClassId>,
    kept_graph: Option<KeptGraph>,
}

impl LivenessResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        live_classes: HashSet<ClassId>,
        live_order: Vec<ClassId>,
        live_methods: HashSet<MethodId>,
        live_fields: HashSet<FieldId>,
        instantiated: HashSet<ClassId>,
        live_library: HashSet<Reference>,
        pruned_types: Vec<ClassId>,
        kept_graph: Option<KeptGraph>,
    ) -> Self {
        Self {
            live_classes,
            live_order,
            live_methods,
            live_fields,
            instantiated,
            live_library,
            pruned_types,
            kept_graph,
        }
    }

    pub fn is_live(&self, reference: Reference) -> bool {
        match reference {
            Reference::Class(c) => self.is_class_live(c),
            Reference::Method(m) => self.is_method_live(m),
            Reference::Field(f) => self.is_field_live(f),
        }
    }

    pub fn is_class_live(&self, class: ClassId) -> bool {
        self.live_classes.contains(&class)
    }

    pub fn is_method_live(&self, method: MethodId) -> bool {
        self.live_methods.contains(&method)
    }

    pub fn is_field_live(&self, field: FieldId) -> bool {
        self.live_fields.contains(&field)
    }

    /// Whether the class was ever observed being constructed. Downstream
    /// "is this class actually constructible" checks read this flag.
    pub fn is_instantiated(&self, class: ClassId) -> bool {
        self.instantiated.contains(&class)
    }

    pub fn is_library_live(&self, reference: Reference) -> bool {
        self.live_library.contains(&reference)
    }

    pub fn live_classes(&self) -> &HashSet<ClassId> {
        &self.live_classes
    }

    /// Live program classes in becoming-live order.
    pub fn live_classes_in_order(&self) -> &[ClassId] {
        &self.live_order
    }

    pub fn live_methods(&self) -> &HashSet<MethodId> {
        &self.live_methods
    }

    pub fn live_fields(&self) -> &HashSet<FieldId> {
        &self.live_fields
    }

    /// Program classes proven definitely dead.
    pub fn pruned_types(&self) -> &[ClassId] {
        &self.pruned_types
    }

    /// The provenance graph, when recording was enabled for the run.
    pub fn kept_graph(&self) -> Option<&KeptGraph> {
        self.kept_graph.as_ref()
    }

    /// Summary counts against the graph the trace ran on.
    pub fn stats(&self, graph: &ProgramGraph) -> LivenessStats {
        let mut total_methods = 0;
        let mut total_fields = 0;
        for class in graph.program_classes() {
            total_methods += class.methods.len();
            total_fields += class.fields.len();
        }
        let total_classes = graph.program_classes().count();
        LivenessStats {
            live_classes: self.live_classes.len(),
            pruned_classes: total_classes - self.live_classes.len(),
            live_methods: self.live_methods.len(),
            pruned_methods: total_methods - self.live_methods.len(),
            live_fields: self.live_fields.len(),
            pruned_fields: total_fields - self.live_fields.len(),
        }
    }
}

/// Summary counts for one trace.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LivenessStats {
    pub live_classes: usize,
    pub pruned_classes: usize,
    pub live_methods: usize,
    pub pruned_methods: usize,
    pub live_fields: usize,
    pub pruned_fields: usize,
}

impl std::fmt::Display for LivenessStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} live / {} pruned classes, {} live / {} pruned methods, {} live / {} pruned fields",
            self.live_classes,
            self.pruned_classes,
            self.live_methods,
            self.pruned_methods,
            self.live_fields,
            self.pruned_fields
        )
    }
}

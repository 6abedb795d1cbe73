//! The program graph: an immutable snapshot of the closed program handed
//! over by the bytecode-reading layer, plus the resolution oracle the
//! liveness trace runs against.

mod definition;
mod hierarchy;
mod reference;

pub use definition::{
    AccessFlags, ClassDef, ClassOrigin, Definition, FieldDef, Invoke, InvokeKind, MethodDef,
    TracedReferences,
};
pub use hierarchy::TypeHierarchy;
pub use reference::{ClassId, FieldId, FieldKey, MethodId, MethodKey, Reference, SignatureId};

use reference::Interner;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Read-only view of the program under analysis.
///
/// Built once per engine run by a [`ProgramGraphBuilder`] and never mutated
/// afterwards; a transformation pass that changes the program requires a
/// fresh snapshot and a fresh trace.
#[derive(Debug)]
pub struct ProgramGraph {
    interner: Interner,
    class_defs: Vec<Option<ClassDef>>,
    method_defs: Vec<Option<MethodDef>>,
    field_defs: Vec<Option<FieldDef>>,
    /// (declaring class, signature) -> declared method.
    declared_methods: HashMap<(ClassId, SignatureId), MethodId>,
    /// (declaring class, field name) -> declared field.
    declared_fields: HashMap<(ClassId, String), FieldId>,
    hierarchy: TypeHierarchy,
}

impl ProgramGraph {
    pub fn builder() -> ProgramGraphBuilder {
        ProgramGraphBuilder::default()
    }

    /// All defined classes, program and library, in interning order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.class_defs.iter().flatten()
    }

    /// All defined program classes, in interning order.
    pub fn program_classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes().filter(|c| c.is_program())
    }

    pub fn class_def(&self, id: ClassId) -> Option<&ClassDef> {
        self.class_defs.get(id.0 as usize)?.as_ref()
    }

    pub fn method_def(&self, id: MethodId) -> Option<&MethodDef> {
        self.method_defs.get(id.0 as usize)?.as_ref()
    }

    pub fn field_def(&self, id: FieldId) -> Option<&FieldDef> {
        self.field_defs.get(id.0 as usize)?.as_ref()
    }

    /// The resolved declaration behind a reference, if one exists.
    pub fn definition_for(&self, reference: Reference) -> Option<Definition<'_>> {
        match reference {
            Reference::Class(c) => self.class_def(c).map(Definition::Class),
            Reference::Method(m) => self.method_def(m).map(Definition::Method),
            Reference::Field(f) => self.field_def(f).map(Definition::Field),
        }
    }

    /// Whether a reference lands in the open, unanalyzed library.
    pub fn is_library_reference(&self, reference: Reference) -> bool {
        let owner = match reference {
            Reference::Class(c) => c,
            Reference::Method(m) => self.interner.method_key(m).owner,
            Reference::Field(f) => self.interner.field_key(f).owner,
        };
        self.class_def(owner)
            .map(|c| c.origin == ClassOrigin::Library)
            .unwrap_or(false)
    }

    /// Whether resolving a member reference can escape into the unanalyzed
    /// library: true when any class on the syntactic owner's resolution
    /// order is a library class. The library is open, so once the chain
    /// reaches it, absence of a declaration cannot be proven.
    pub fn resolves_into_library(&self, reference: Reference) -> bool {
        let owner = match reference {
            Reference::Class(c) => c,
            Reference::Method(m) => self.interner.method_key(m).owner,
            Reference::Field(f) => self.interner.field_key(f).owner,
        };
        self.resolution_order(owner).into_iter().any(|class| {
            self.class_def(class)
                .map(|def| def.origin == ClassOrigin::Library)
                .unwrap_or(false)
        })
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    /// Superclass and interface edges of a type.
    pub fn supertype_edges(&self, class: ClassId) -> (Option<ClassId>, &[ClassId]) {
        match self.class_def(class) {
            Some(def) => (def.superclass, def.interfaces.as_slice()),
            None => (None, &[]),
        }
    }

    /// Resolution order for member lookup: the class itself, its superclass
    /// chain, then interfaces breadth-first. Iterative, with a visited set,
    /// so deep or cyclic hierarchies cannot overflow the stack.
    pub fn resolution_order(&self, class: ClassId) -> Vec<ClassId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut interfaces = Vec::new();

        let mut current = Some(class);
        while let Some(c) = current {
            if !seen.insert(c) {
                break;
            }
            order.push(c);
            let (superclass, ifaces) = self.supertype_edges(c);
            interfaces.extend_from_slice(ifaces);
            current = superclass;
        }

        let mut i = 0;
        while i < interfaces.len() {
            let iface = interfaces[i];
            i += 1;
            if seen.insert(iface) {
                order.push(iface);
                let (superclass, ifaces) = self.supertype_edges(iface);
                interfaces.extend_from_slice(ifaces);
                if let Some(s) = superclass {
                    interfaces.push(s);
                }
            }
        }
        order
    }

    /// Whether `sub` is `sup` or a transitive subtype of it.
    pub fn is_subtype(&self, sub: ClassId, sup: ClassId) -> bool {
        sub == sup || self.resolution_order(sub).contains(&sup)
    }

    /// The method a class declares for a signature, if any.
    pub fn declared_method(&self, class: ClassId, signature: SignatureId) -> Option<MethodId> {
        self.declared_methods.get(&(class, signature)).copied()
    }

    /// Resolve a symbolic method reference to its defining declaration by
    /// walking up from the syntactic owner. Finds abstract declarations too.
    pub fn resolve_method(&self, method: MethodId) -> Option<MethodId> {
        let key = self.interner.method_key(method);
        let signature = key.signature;
        self.resolution_order(key.owner)
            .into_iter()
            .find_map(|class| self.declared_method(class, signature))
    }

    /// Resolve a symbolic field reference to the defining field, which may
    /// sit on a supertype of the syntactic owner.
    pub fn resolve_field(&self, field: FieldId) -> Option<FieldId> {
        let key = self.interner.field_key(field);
        let name = key.name.clone();
        self.resolution_order(key.owner)
            .into_iter()
            .find_map(|class| self.declared_fields.get(&(class, name.clone())).copied())
    }

    /// The implementation an instance of `receiver` dispatches to for a
    /// signature: first concrete declaration up the superclass chain, then
    /// default methods on interfaces.
    pub fn resolve_dispatch(&self, receiver: ClassId, signature: SignatureId) -> Option<MethodId> {
        self.resolution_order(receiver)
            .into_iter()
            .find_map(|class| {
                let method = self.declared_method(class, signature)?;
                let def = self.method_def(method)?;
                (!def.access.is_abstract).then_some(method)
            })
    }

    /// The resolution oracle: all concrete targets a virtual/interface call
    /// with the given symbolic reference can dispatch to, for receivers that
    /// are `receiver_type` or any subtype of it.
    pub fn resolve_virtual(&self, method: MethodId, receiver_type: ClassId) -> HashSet<MethodId> {
        let signature = self.interner.method_key(method).signature;
        let mut targets = HashSet::new();
        if let Some(target) = self.resolve_dispatch(receiver_type, signature) {
            targets.insert(target);
        }
        for subtype in self.hierarchy.transitive_subtypes(receiver_type) {
            if let Some(target) = self.resolve_dispatch(subtype, signature) {
                targets.insert(target);
            }
        }
        targets
    }

    pub fn lookup_class(&self, name: &str) -> Option<ClassId> {
        self.interner.lookup_class(name)
    }

    pub fn class_name(&self, id: ClassId) -> &str {
        self.interner.class_name(id)
    }

    /// Name and descriptor of a method reference.
    pub fn method_signature(&self, id: MethodId) -> (&str, &str) {
        let key = self.interner.method_key(id);
        self.interner.signature(key.signature)
    }

    pub fn method_owner(&self, id: MethodId) -> ClassId {
        self.interner.method_key(id).owner
    }

    pub fn field_owner(&self, id: FieldId) -> ClassId {
        self.interner.field_key(id).owner
    }

    pub fn field_name(&self, id: FieldId) -> &str {
        &self.interner.field_key(id).name
    }

    pub fn signature_of(&self, id: MethodId) -> SignatureId {
        self.interner.method_key(id).signature
    }

    /// Human-readable form of a reference, for diagnostics and reports.
    pub fn describe(&self, reference: Reference) -> String {
        self.interner.describe(reference)
    }

    pub fn class_count(&self) -> usize {
        self.class_defs.iter().flatten().count()
    }
}

/// Mutable construction side of [`ProgramGraph`].
///
/// The bytecode reader (or a test fixture) interns references and registers
/// definitions, then freezes the graph with [`build`](Self::build). The
/// subtype index is built at freeze time, in parallel.
#[derive(Debug, Default)]
pub struct ProgramGraphBuilder {
    interner: Interner,
    classes: HashMap<ClassId, ClassDef>,
    methods: HashMap<MethodId, MethodDef>,
    fields: HashMap<FieldId, FieldDef>,
}

impl ProgramGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a class name without defining it. References interned but
    /// never defined show up as unresolved during the trace.
    pub fn class_ref(&mut self, name: &str) -> ClassId {
        self.interner.intern_class(name)
    }

    /// Intern a symbolic method reference on a class given by name.
    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> MethodId {
        let owner = self.interner.intern_class(owner);
        let signature = self.interner.intern_signature(name, descriptor);
        self.interner.intern_method(owner, signature)
    }

    /// Intern a symbolic field reference on a class given by name.
    pub fn field_ref(&mut self, owner: &str, name: &str) -> FieldId {
        let owner = self.interner.intern_class(owner);
        self.interner.intern_field(owner, name)
    }

    /// Define a program class.
    pub fn add_class(
        &mut self,
        name: &str,
        access: AccessFlags,
        superclass: Option<&str>,
        interfaces: &[&str],
    ) -> ClassId {
        let id = self.interner.intern_class(name);
        let superclass = superclass.map(|s| self.interner.intern_class(s));
        let interfaces = interfaces
            .iter()
            .map(|i| self.interner.intern_class(i))
            .collect();
        self.classes.insert(
            id,
            ClassDef {
                id,
                origin: ClassOrigin::Program,
                access,
                superclass,
                interfaces,
                methods: Vec::new(),
                fields: Vec::new(),
                static_initializer: None,
            },
        );
        id
    }

    /// Define a library class: known to exist, never traced into.
    pub fn add_library_class(&mut self, name: &str) -> ClassId {
        let id = self.interner.intern_class(name);
        self.classes.insert(
            id,
            ClassDef {
                id,
                origin: ClassOrigin::Library,
                access: AccessFlags::default(),
                superclass: None,
                interfaces: Vec::new(),
                methods: Vec::new(),
                fields: Vec::new(),
                static_initializer: None,
            },
        );
        id
    }

    /// Define a method on a previously defined class. A method named
    /// `<clinit>` becomes the class's static initializer.
    pub fn add_method(
        &mut self,
        owner: ClassId,
        name: &str,
        descriptor: &str,
        access: AccessFlags,
        references: TracedReferences,
    ) -> MethodId {
        let signature = self.interner.intern_signature(name, descriptor);
        let id = self.interner.intern_method(owner, signature);
        self.methods.insert(
            id,
            MethodDef {
                id,
                access,
                references,
            },
        );
        if let Some(class) = self.classes.get_mut(&owner) {
            class.methods.push(id);
            if name == "<clinit>" {
                class.static_initializer = Some(id);
            }
        }
        id
    }

    /// Define a field on a previously defined class.
    pub fn add_field(
        &mut self,
        owner: ClassId,
        name: &str,
        type_class: Option<&str>,
        access: AccessFlags,
    ) -> FieldId {
        let id = self.interner.intern_field(owner, name);
        let type_class = type_class.map(|t| self.interner.intern_class(t));
        self.fields.insert(
            id,
            FieldDef {
                id,
                access,
                type_class,
            },
        );
        if let Some(class) = self.classes.get_mut(&owner) {
            class.fields.push(id);
        }
        id
    }

    /// Freeze the graph. Builds the subtype index and member lookup tables.
    pub fn build(self) -> ProgramGraph {
        let ProgramGraphBuilder {
            interner,
            classes,
            methods,
            fields,
        } = self;

        let mut class_defs: Vec<Option<ClassDef>> = vec![None; interner.class_count()];
        for (id, def) in classes {
            class_defs[id.0 as usize] = Some(def);
        }
        let mut method_defs: Vec<Option<MethodDef>> = vec![None; interner.method_count()];
        for (id, def) in methods {
            method_defs[id.0 as usize] = Some(def);
        }
        let mut field_defs: Vec<Option<FieldDef>> = vec![None; interner.field_count()];
        for (id, def) in fields {
            field_defs[id.0 as usize] = Some(def);
        }

        let mut declared_methods = HashMap::new();
        let mut declared_fields = HashMap::new();
        for def in class_defs.iter().flatten() {
            for &method in &def.methods {
                let key = interner.method_key(method);
                declared_methods.insert((def.id, key.signature), method);
            }
            for &field in &def.fields {
                let key = interner.field_key(field);
                declared_fields.insert((def.id, key.name.clone()), field);
            }
        }

        let defined: Vec<ClassDef> = class_defs.iter().flatten().cloned().collect();
        let hierarchy = TypeHierarchy::build(&defined);

        info!(
            "Program graph frozen: {} classes, {} methods, {} fields",
            defined.len(),
            method_defs.iter().flatten().count(),
            field_defs.iter().flatten().count()
        );

        ProgramGraph {
            interner,
            class_defs,
            method_defs,
            field_defs,
            declared_methods,
            declared_fields,
            hierarchy,
        }
    }
}

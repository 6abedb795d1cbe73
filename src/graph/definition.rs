// Definitions - the resolved declarations behind interned references.
// Code bodies are opaque to the engine; only the per-method reference set
// extracted by the bytecode reader is visible here.

use super::reference::{ClassId, FieldId, MethodId};
use serde::{Deserialize, Serialize};

/// Where a class definition comes from.
///
/// Program classes are fully analyzed. Library classes are known to exist
/// but are never traced into; references to them are recorded and left
/// alone. A reference with no definition at all is an unresolved reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassOrigin {
    Program,
    Library,
}

/// Access flags relevant to the liveness trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessFlags {
    pub is_abstract: bool,
    pub is_static: bool,
    pub is_final: bool,
    pub is_interface: bool,
}

impl AccessFlags {
    pub fn interface() -> Self {
        Self {
            is_abstract: true,
            is_interface: true,
            ..Self::default()
        }
    }

    pub fn abstract_() -> Self {
        Self {
            is_abstract: true,
            ..Self::default()
        }
    }

    pub fn static_() -> Self {
        Self {
            is_static: true,
            ..Self::default()
        }
    }
}

/// A class definition.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub id: ClassId,
    pub origin: ClassOrigin,
    pub access: AccessFlags,
    pub superclass: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub methods: Vec<MethodId>,
    pub fields: Vec<FieldId>,
    /// The static initializer, if the class declares one.
    pub static_initializer: Option<MethodId>,
}

impl ClassDef {
    pub fn is_program(&self) -> bool {
        self.origin == ClassOrigin::Program
    }
}

/// Kind of a method invocation site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvokeKind {
    /// Static invoke: single deterministic target.
    Static,
    /// Direct invoke (constructors, private methods): single target.
    Direct,
    /// Virtual invoke: dispatched on the runtime receiver type.
    Virtual,
    /// Interface invoke: dispatched like virtual, through an interface type.
    Interface,
}

impl InvokeKind {
    /// Whether dispatch depends on the runtime receiver type.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, InvokeKind::Virtual | InvokeKind::Interface)
    }
}

/// One invocation site inside a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invoke {
    /// Symbolic target: owner is the declared static type at the call site,
    /// which may differ from the defining class.
    pub target: MethodId,
    pub kind: InvokeKind,
}

/// The abstract reference set of one method body, as handed over by the
/// bytecode reader. The engine walks this; it never sees instructions.
#[derive(Debug, Clone, Default)]
pub struct TracedReferences {
    /// Plain type references (casts, instance-of, const-class, annotations).
    pub types: Vec<ClassId>,
    /// Field reads, by symbolic owner.
    pub field_reads: Vec<FieldId>,
    /// Field writes, by symbolic owner.
    pub field_writes: Vec<FieldId>,
    /// Invocation sites.
    pub invokes: Vec<Invoke>,
    /// `new` instantiations.
    pub instantiations: Vec<ClassId>,
}

impl TracedReferences {
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
            && self.field_reads.is_empty()
            && self.field_writes.is_empty()
            && self.invokes.is_empty()
            && self.instantiations.is_empty()
    }
}

/// A method definition.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub id: MethodId,
    pub access: AccessFlags,
    /// References made by the body. Empty for abstract and native methods.
    pub references: TracedReferences,
}

/// A field definition.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub id: FieldId,
    pub access: AccessFlags,
    /// The field's declared type, when it names a class the trace cares
    /// about (primitive-typed fields carry `None`).
    pub type_class: Option<ClassId>,
}

/// The resolved declaration behind a reference, if any.
#[derive(Debug, Clone, Copy)]
pub enum Definition<'a> {
    Class(&'a ClassDef),
    Method(&'a MethodDef),
    Field(&'a FieldDef),
}

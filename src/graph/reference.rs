// Interned references - identity comparison is valid after interning

use serde::Serialize;
use std::collections::HashMap;

/// Interned handle to a class type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClassId(pub(crate) u32);

/// Interned handle to a method reference (owner + signature).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MethodId(pub(crate) u32);

/// Interned handle to a field reference (owner + name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FieldId(pub(crate) u32);

/// Interned method signature: name plus descriptor, without the owner.
///
/// Virtual dispatch is keyed by signature, so two methods with the same
/// name and descriptor on different classes share one `SignatureId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SignatureId(pub(crate) u32);

/// A reference to a class, method or field.
///
/// References are identity-comparable handles; the structural data behind
/// them lives in the interner inside [`ProgramGraph`](super::ProgramGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Reference {
    Class(ClassId),
    Method(MethodId),
    Field(FieldId),
}

impl From<ClassId> for Reference {
    fn from(id: ClassId) -> Self {
        Reference::Class(id)
    }
}

impl From<MethodId> for Reference {
    fn from(id: MethodId) -> Self {
        Reference::Method(id)
    }
}

impl From<FieldId> for Reference {
    fn from(id: FieldId) -> Self {
        Reference::Field(id)
    }
}

/// Structural key behind a `MethodId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub owner: ClassId,
    pub signature: SignatureId,
}

/// Structural key behind a `FieldId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub owner: ClassId,
    pub name: String,
}

/// String interner for classes, signatures, methods and fields.
///
/// Owned by the [`ProgramGraphBuilder`](super::ProgramGraphBuilder) during
/// construction and frozen inside the `ProgramGraph` afterwards.
#[derive(Debug, Default)]
pub(crate) struct Interner {
    class_names: Vec<String>,
    class_index: HashMap<String, ClassId>,

    signatures: Vec<(String, String)>,
    signature_index: HashMap<(String, String), SignatureId>,

    methods: Vec<MethodKey>,
    method_index: HashMap<MethodKey, MethodId>,

    fields: Vec<FieldKey>,
    field_index: HashMap<FieldKey, FieldId>,
}

impl Interner {
    pub fn intern_class(&mut self, name: &str) -> ClassId {
        if let Some(&id) = self.class_index.get(name) {
            return id;
        }
        let id = ClassId(self.class_names.len() as u32);
        self.class_names.push(name.to_string());
        self.class_index.insert(name.to_string(), id);
        id
    }

    pub fn intern_signature(&mut self, name: &str, descriptor: &str) -> SignatureId {
        let key = (name.to_string(), descriptor.to_string());
        if let Some(&id) = self.signature_index.get(&key) {
            return id;
        }
        let id = SignatureId(self.signatures.len() as u32);
        self.signatures.push(key.clone());
        self.signature_index.insert(key, id);
        id
    }

    pub fn intern_method(&mut self, owner: ClassId, signature: SignatureId) -> MethodId {
        let key = MethodKey { owner, signature };
        if let Some(&id) = self.method_index.get(&key) {
            return id;
        }
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(key.clone());
        self.method_index.insert(key, id);
        id
    }

    pub fn intern_field(&mut self, owner: ClassId, name: &str) -> FieldId {
        let key = FieldKey {
            owner,
            name: name.to_string(),
        };
        if let Some(&id) = self.field_index.get(&key) {
            return id;
        }
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(key.clone());
        self.field_index.insert(key, id);
        id
    }

    pub fn lookup_class(&self, name: &str) -> Option<ClassId> {
        self.class_index.get(name).copied()
    }

    pub fn class_name(&self, id: ClassId) -> &str {
        &self.class_names[id.0 as usize]
    }

    pub fn class_count(&self) -> usize {
        self.class_names.len()
    }

    pub fn signature(&self, id: SignatureId) -> (&str, &str) {
        let (name, descriptor) = &self.signatures[id.0 as usize];
        (name, descriptor)
    }

    pub fn method_key(&self, id: MethodId) -> &MethodKey {
        &self.methods[id.0 as usize]
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn field_key(&self, id: FieldId) -> &FieldKey {
        &self.fields[id.0 as usize]
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Human-readable form of a reference, for diagnostics.
    pub fn describe(&self, reference: Reference) -> String {
        match reference {
            Reference::Class(c) => self.class_name(c).to_string(),
            Reference::Method(m) => {
                let key = self.method_key(m);
                let (name, descriptor) = self.signature(key.signature);
                format!("{}.{}{}", self.class_name(key.owner), name, descriptor)
            }
            Reference::Field(f) => {
                let key = self.field_key(f);
                format!("{}.{}", self.class_name(key.owner), key.name)
            }
        }
    }
}

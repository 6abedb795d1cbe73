// The enqueuer's worklist. Items are deduplicated by identity before
// insertion; reasons ride along and the first one wins, which keeps
// provenance deterministic for a given seeding order.

use super::root_set::RetentionReason;
use crate::graph::{ClassId, FieldId, MethodId};
use std::collections::HashSet;

/// One unit of pending trace work.
#[derive(Debug, Clone)]
pub enum WorkItem {
    ClassBecomeLive {
        class: ClassId,
        reason: RetentionReason,
    },
    MethodBecomeLive {
        method: MethodId,
        reason: RetentionReason,
    },
    FieldBecomeLive {
        field: FieldId,
        reason: RetentionReason,
    },
    /// A virtual/interface call site was discovered. `method` is the
    /// symbolic reference; its owner is the declared receiver type, so the
    /// (signature, declared type) obligation key is the reference itself.
    VirtualCallDiscovered {
        method: MethodId,
        context: MethodId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DedupKey {
    Class(ClassId),
    Method(MethodId),
    Field(FieldId),
    Virtual(MethodId),
}

impl WorkItem {
    fn dedup_key(&self) -> DedupKey {
        match self {
            WorkItem::ClassBecomeLive { class, .. } => DedupKey::Class(*class),
            WorkItem::MethodBecomeLive { method, .. } => DedupKey::Method(*method),
            WorkItem::FieldBecomeLive { field, .. } => DedupKey::Field(*field),
            WorkItem::VirtualCallDiscovered { method, .. } => DedupKey::Virtual(*method),
        }
    }
}

/// LIFO worklist with identity deduplication.
///
/// Drain order affects provenance path choice, never the final live set;
/// liveness transitions are monotone.
#[derive(Debug, Default)]
pub struct Worklist {
    items: Vec<WorkItem>,
    seen: HashSet<DedupKey>,
}

impl Worklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless an identical item was already inserted. Returns
    /// whether the item was accepted.
    pub fn push(&mut self, item: WorkItem) -> bool {
        if !self.seen.insert(item.dedup_key()) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn pop(&mut self) -> Option<WorkItem> {
        self.items.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

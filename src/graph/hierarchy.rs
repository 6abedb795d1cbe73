// Subtype index built in parallel before the trace starts

use super::definition::ClassDef;
use super::reference::ClassId;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Immutable subtype index over the class hierarchy.
///
/// Built once, in parallel, before the enqueuer is seeded; the engine only
/// reads it afterwards. Supertype edges are read straight off the class
/// definitions, so only the reverse direction needs an index.
#[derive(Debug, Default)]
pub struct TypeHierarchy {
    direct_subtypes: HashMap<ClassId, Vec<ClassId>>,
}

impl TypeHierarchy {
    /// Build the index from all known class definitions.
    pub(crate) fn build(classes: &[ClassDef]) -> Self {
        let edges: Vec<(ClassId, ClassId)> = classes
            .par_iter()
            .flat_map_iter(|class| {
                class
                    .superclass
                    .iter()
                    .copied()
                    .chain(class.interfaces.iter().copied())
                    .map(move |supertype| (supertype, class.id))
            })
            .collect();

        let mut direct_subtypes: HashMap<ClassId, Vec<ClassId>> = HashMap::new();
        for (supertype, subtype) in edges {
            direct_subtypes.entry(supertype).or_default().push(subtype);
        }
        // Deterministic iteration order for obligation application.
        for subtypes in direct_subtypes.values_mut() {
            subtypes.sort();
            subtypes.dedup();
        }

        debug!(
            "Built subtype index: {} supertypes with subtypes",
            direct_subtypes.len()
        );
        Self { direct_subtypes }
    }

    pub fn direct_subtypes(&self, class: ClassId) -> &[ClassId] {
        self.direct_subtypes
            .get(&class)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All transitive subtypes of `class`, excluding `class` itself.
    ///
    /// Worklist traversal with a visited set; interface graphs may contain
    /// diamonds and (in malformed input) cycles, so no recursion.
    pub fn transitive_subtypes(&self, class: ClassId) -> Vec<ClassId> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut worklist = vec![class];
        while let Some(current) = worklist.pop() {
            for &subtype in self.direct_subtypes(current) {
                if seen.insert(subtype) {
                    result.push(subtype);
                    worklist.push(subtype);
                }
            }
        }
        result.sort();
        result
    }
}

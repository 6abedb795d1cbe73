// Conditional-rule index: precondition -> rules, checked incrementally so
// a liveness transition only touches the rules that mention it.

use crate::graph::Reference;
use crate::rules::RuleId;
use std::collections::HashMap;

/// A fully resolved conditional rule: once every precondition is live, the
/// consequences join the root set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalRule {
    pub rule: RuleId,
    pub preconditions: Vec<Reference>,
    pub consequences: Vec<Reference>,
}

#[derive(Debug)]
struct PendingRule {
    rule: ConditionalRule,
    /// Preconditions not yet live. The rule fires at zero.
    remaining: usize,
    satisfied: bool,
}

/// Index from precondition member to the rules mentioning it.
///
/// `on_become_live` is called for every liveness transition; rules whose
/// last precondition just went live queue up in `ready` until the next
/// activation sweep drains them. Activation is re-entrant by construction:
/// consequences seeded by one sweep can satisfy preconditions checked in
/// the next.
#[derive(Debug, Default)]
pub struct ConditionalRuleIndex {
    pending: Vec<PendingRule>,
    by_precondition: HashMap<Reference, Vec<usize>>,
    ready: Vec<usize>,
}

impl ConditionalRuleIndex {
    pub fn new(rules: Vec<ConditionalRule>) -> Self {
        let mut index = Self::default();
        for mut rule in rules {
            rule.preconditions.sort();
            rule.preconditions.dedup();
            let slot = index.pending.len();
            let remaining = rule.preconditions.len();
            for &precondition in &rule.preconditions {
                index.by_precondition.entry(precondition).or_default().push(slot);
            }
            index.pending.push(PendingRule {
                rule,
                remaining,
                satisfied: false,
            });
            if remaining == 0 {
                index.pending[slot].satisfied = true;
                index.ready.push(slot);
            }
        }
        index
    }

    /// Record a liveness transition. Returns how many rules became
    /// satisfiable because of it.
    pub fn on_become_live(&mut self, reference: Reference) -> usize {
        let Some(slots) = self.by_precondition.remove(&reference) else {
            return 0;
        };
        let mut newly_satisfied = 0;
        for slot in slots {
            let pending = &mut self.pending[slot];
            if pending.satisfied {
                continue;
            }
            pending.remaining -= 1;
            if pending.remaining == 0 {
                pending.satisfied = true;
                self.ready.push(slot);
                newly_satisfied += 1;
            }
        }
        newly_satisfied
    }

    /// Drain the rules that became satisfiable since the last sweep.
    pub fn take_ready(&mut self) -> Vec<ConditionalRule> {
        let ready = std::mem::take(&mut self.ready);
        ready
            .into_iter()
            .map(|slot| self.pending[slot].rule.clone())
            .collect()
    }

    /// Rules whose preconditions are still not fully live.
    pub fn pending_count(&self) -> usize {
        self.pending.iter().filter(|p| !p.satisfied).count()
    }
}

//! Binding signals: per-context tokens tying activations to the same input
//! occurrence.

use std::collections::{BTreeMap, BTreeSet};

use super::activation::ActivationId;
use super::schema::Transition;

/// Slot number to token id.
pub type BindingSignalMap = BTreeMap<usize, u64>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSignal {
    token_id: u64,
    activations: BTreeSet<ActivationId>,
}

impl BindingSignal {
    pub(crate) fn new(token_id: u64) -> Self {
        Self {
            token_id,
            activations: BTreeSet::new(),
        }
    }

    pub fn token_id(&self) -> u64 {
        self.token_id
    }

    /// Activations holding this signal in some slot.
    pub fn activations(&self) -> &BTreeSet<ActivationId> {
        &self.activations
    }

    pub(crate) fn attach(&mut self, activation: ActivationId) {
        self.activations.insert(activation);
    }

    pub(crate) fn detach(&mut self, activation: ActivationId) {
        self.activations.remove(&activation);
    }
}

/// True if some slot occupied in both maps holds different signals.
pub fn conflicts(own: &BindingSignalMap, candidate: &BindingSignalMap) -> bool {
    candidate
        .iter()
        .any(|(slot, token)| own.get(slot).is_some_and(|t| t != token))
}

/// True if `candidate` fills a slot `own` leaves empty.
pub fn has_new(own: &BindingSignalMap, candidate: &BindingSignalMap) -> bool {
    candidate.keys().any(|slot| !own.contains_key(slot))
}

/// Union of both maps; `base` wins where both occupy a slot.
pub fn merge(base: &BindingSignalMap, extra: &BindingSignalMap) -> BindingSignalMap {
    let mut merged = extra.clone();
    merged.extend(base.iter().map(|(s, t)| (*s, *t)));
    merged
}

/// Signals carried across a synapse from its input to its output side.
/// Without declared transitions every slot is carried unchanged.
pub fn transition_forward(transitions: &[Transition], signals: &BindingSignalMap) -> BindingSignalMap {
    if transitions.is_empty() {
        return signals.clone();
    }
    transitions
        .iter()
        .filter_map(|t| signals.get(&t.from).map(|token| (t.to, *token)))
        .collect()
}

/// Inverse of [`transition_forward`], for linking from the output side.
pub fn transition_backward(transitions: &[Transition], signals: &BindingSignalMap) -> BindingSignalMap {
    if transitions.is_empty() {
        return signals.clone();
    }
    transitions
        .iter()
        .filter_map(|t| signals.get(&t.to).map(|token| (t.from, *token)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(usize, u64)]) -> BindingSignalMap {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_conflict_only_on_shared_slots() {
        let own = map(&[(0, 10), (1, 11)]);
        assert!(conflicts(&own, &map(&[(0, 11), (1, 10)])));
        assert!(!conflicts(&own, &map(&[(0, 10)])));
        assert!(!conflicts(&own, &map(&[(2, 99)])));
    }

    #[test]
    fn test_merge_prefers_base() {
        let merged = merge(&map(&[(0, 1)]), &map(&[(0, 2), (1, 3)]));
        assert_eq!(merged, map(&[(0, 1), (1, 3)]));
    }

    #[test]
    fn test_transitions_remap_slots() {
        let transitions = [Transition { from: 0, to: 1 }];
        let signals = map(&[(0, 7), (2, 8)]);
        assert_eq!(transition_forward(&transitions, &signals), map(&[(1, 7)]));
        assert_eq!(
            transition_backward(&transitions, &map(&[(1, 7)])),
            map(&[(0, 7)])
        );
        assert_eq!(transition_forward(&[], &signals), signals);
    }
}

use std::collections::BTreeSet;

use super::binding_signal::{self, BindingSignalMap};
use super::link::LinkId;
use super::neuron::NeuronId;
use crate::fields::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivationId(pub(crate) u64);

impl ActivationId {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// A neuron's instance inside one context.
#[derive(Debug, Clone)]
pub struct Activation {
    pub(crate) id: ActivationId,
    pub(crate) type_id: TypeId,
    pub(crate) neuron: NeuronId,
    pub(crate) parent: Option<ActivationId>,
    pub(crate) values: Vec<f64>,
    pub(crate) binding_signals: BindingSignalMap,
    pub(crate) input_links: BTreeSet<LinkId>,
    pub(crate) output_links: BTreeSet<LinkId>,
    pub(crate) fired: bool,
    pub(crate) fire_queued: bool,
}

impl Activation {
    pub fn id(&self) -> ActivationId {
        self.id
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn neuron(&self) -> NeuronId {
        self.neuron
    }

    /// The activation this one was branched from.
    pub fn parent(&self) -> Option<ActivationId> {
        self.parent
    }

    pub fn binding_signals(&self) -> &BindingSignalMap {
        &self.binding_signals
    }

    pub fn binding_signal(&self, slot: usize) -> Option<u64> {
        self.binding_signals.get(&slot).copied()
    }

    pub fn input_links(&self) -> &BTreeSet<LinkId> {
        &self.input_links
    }

    pub fn output_links(&self) -> &BTreeSet<LinkId> {
        &self.output_links
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// True if `candidate` holds a different signal in a slot this activation
    /// already fills.
    pub fn has_conflicting_binding_signals(&self, candidate: &BindingSignalMap) -> bool {
        binding_signal::conflicts(&self.binding_signals, candidate)
    }

    /// True if `candidate` fills a slot this activation leaves empty.
    pub fn has_new_binding_signals(&self, candidate: &BindingSignalMap) -> bool {
        binding_signal::has_new(&self.binding_signals, candidate)
    }
}

use std::collections::BTreeSet;

use super::synapse::SynapseId;
use crate::fields::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NeuronId(pub(crate) u64);

impl NeuronId {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// A neuron instance. Lives for the whole model, across all contexts.
#[derive(Debug, Clone)]
pub struct Neuron {
    pub(crate) id: NeuronId,
    pub(crate) type_id: TypeId,
    pub(crate) values: Vec<f64>,
    pub(crate) input_synapses: BTreeSet<SynapseId>,
    pub(crate) output_synapses: BTreeSet<SynapseId>,
}

impl Neuron {
    pub fn id(&self) -> NeuronId {
        self.id
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn input_synapses(&self) -> &BTreeSet<SynapseId> {
        &self.input_synapses
    }

    pub fn output_synapses(&self) -> &BTreeSet<SynapseId> {
        &self.output_synapses
    }
}

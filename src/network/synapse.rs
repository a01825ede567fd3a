use super::neuron::NeuronId;
use crate::fields::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SynapseId(pub(crate) u64);

impl SynapseId {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// A synapse instance connecting two neurons.
#[derive(Debug, Clone)]
pub struct Synapse {
    pub(crate) id: SynapseId,
    pub(crate) type_id: TypeId,
    pub(crate) values: Vec<f64>,
    pub(crate) input: NeuronId,
    pub(crate) output: NeuronId,
    pub(crate) propagable: bool,
    pub(crate) paired_input_synapse: Option<SynapseId>,
    pub(crate) paired_output_synapse: Option<SynapseId>,
}

impl Synapse {
    pub fn id(&self) -> SynapseId {
        self.id
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn input(&self) -> NeuronId {
        self.input
    }

    pub fn output(&self) -> NeuronId {
        self.output
    }

    /// Whether firing the input side may create a new output activation.
    pub fn is_propagable(&self) -> bool {
        self.propagable
    }

    /// Secondary synapse this one was paired with as primary.
    pub fn paired_input_synapse(&self) -> Option<SynapseId> {
        self.paired_input_synapse
    }

    /// Primary synapse this one was paired with as secondary.
    pub fn paired_output_synapse(&self) -> Option<SynapseId> {
        self.paired_output_synapse
    }

    /// Whether `other` is this synapse's explicit partner on the given side.
    pub(crate) fn is_paired_with(&self, other: SynapseId, as_primary: bool) -> bool {
        if as_primary {
            self.paired_input_synapse == Some(other)
        } else {
            self.paired_output_synapse == Some(other)
        }
    }
}

use super::activation::ActivationId;
use super::synapse::SynapseId;
use crate::fields::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) u64);

impl LinkId {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// A synapse's instance inside one context, connecting two activations.
#[derive(Debug, Clone)]
pub struct Link {
    pub(crate) id: LinkId,
    pub(crate) type_id: TypeId,
    pub(crate) synapse: SynapseId,
    pub(crate) input: ActivationId,
    pub(crate) output: ActivationId,
    pub(crate) values: Vec<f64>,
    /// Partner reached through PAIR_IN (set on the primary).
    pub(crate) paired_input_side: Option<LinkId>,
    /// Partner reached through PAIR_OUT (set on the secondary).
    pub(crate) paired_output_side: Option<LinkId>,
}

impl Link {
    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn synapse(&self) -> SynapseId {
        self.synapse
    }

    pub fn input(&self) -> ActivationId {
        self.input
    }

    pub fn output(&self) -> ActivationId {
        self.output
    }

    pub fn paired_input_side(&self) -> Option<LinkId> {
        self.paired_input_side
    }

    pub fn paired_output_side(&self) -> Option<LinkId> {
        self.paired_output_side
    }

    /// The partner link, whichever side it was paired on.
    pub fn partner(&self) -> Option<LinkId> {
        self.paired_input_side.or(self.paired_output_side)
    }
}

//! The neural network layer on top of the field engine.
//!
//! ## Modules
//!
//! - [`schema`]: Neuron/synapse type builders, pairing and transitions
//! - [`model`]: `Model`, owner of neurons, synapses and contexts
//! - [`context`]: Per-input scope with its activations, links and queue
//! - [`binding_signal`]: Token identity shared by related activations
//! - `linker`: Forward, incoming and latent linking

pub mod activation;
pub mod binding_signal;
pub mod context;
pub mod link;
mod linker;
pub mod model;
pub mod neuron;
pub mod schema;
pub mod synapse;

pub use activation::{Activation, ActivationId};
pub use binding_signal::{BindingSignal, BindingSignalMap};
pub use context::{Context, ContextId, Step};
pub use link::{Link, LinkId};
pub use model::{Model, ObjRef};
pub use neuron::{Neuron, NeuronId};
pub use schema::{
    FiringRule, NeuronTypeBuilder, NeuronTypeInfo, NeuronTypeRef, PairAnchor, PairingConfig,
    PairingKind, Schema, SynapseTypeBuilder, SynapseTypeInfo, SynapseTypeRef, Transition,
};
pub use synapse::{Synapse, SynapseId};

//! Network type schema: neuron/activation and synapse/link type pairs,
//! synapse pairing and binding-signal transitions.
//!
//! A [`Schema`] owns the [`TypeRegistry`] during the build phase. Once
//! flattened it is shared read-only (`Arc<Schema>`) by every [`Model`].
//!
//! [`Model`]: super::Model

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::fields::{FieldId, Role, TypeId, TypeRegistry};

// ============================================================================
// Type handles
// ============================================================================

/// A neuron type and its bound activation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NeuronTypeRef {
    pub neuron: TypeId,
    pub activation: TypeId,
}

/// A synapse type and its bound link type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SynapseTypeRef {
    pub synapse: TypeId,
    pub link: TypeId,
}

// ============================================================================
// Pairing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingKind {
    /// Links pair when their synapse instances were paired explicitly.
    BySynapse,
    /// Links pair when their outer activations carry the same binding
    /// signal at this slot.
    ByBindingSignal(usize),
}

/// Where the partner link sits relative to a link of the configured type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairAnchor {
    /// Both synapse types end on the same neuron type; the partner is another
    /// input link of our output activation.
    SharedOutput,
    /// Both start on the same neuron type; the partner is another output link
    /// of our input activation.
    SharedInput,
    /// Our output neuron type is the partner's input; the partner is an output
    /// link of our output activation.
    SpanOutput,
    /// Our input neuron type is the partner's output; the partner is an input
    /// link of our input activation.
    SpanInput,
    /// The synapse types share no neuron type. Any link of the context can
    /// be the partner; binding signals are compared on the input sides.
    /// Such pairings never allow latent linking.
    Unanchored,
}

impl PairAnchor {
    pub fn is_output_side(self) -> bool {
        matches!(self, PairAnchor::SharedOutput | PairAnchor::SpanOutput)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingConfig {
    pub paired_type: TypeId,
    pub kind: PairingKind,
    pub anchor: PairAnchor,
    /// The primary link reaches its partner through PAIR_IN, the secondary
    /// through PAIR_OUT.
    pub primary: bool,
}

/// Maps the binding signal at `from` on the input side to `to` on the
/// output side of a synapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: usize,
    pub to: usize,
}

/// An activation whose `field` rises above `threshold` is queued to fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiringRule {
    pub field: FieldId,
    pub threshold: f64,
}

// ============================================================================
// Per-type metadata
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct NeuronTypeInfo {
    refs: NeuronTypeRef,
    wildcard_bs_slot: Option<usize>,
    firing_rule: Option<FiringRule>,
}

impl NeuronTypeInfo {
    pub fn refs(&self) -> NeuronTypeRef {
        self.refs
    }

    /// Slot set by the most recent binding-signal pairing spanning this type.
    pub fn wildcard_bs_slot(&self) -> Option<usize> {
        self.wildcard_bs_slot
    }

    pub fn firing_rule(&self) -> Option<FiringRule> {
        self.firing_rule
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynapseTypeInfo {
    refs: SynapseTypeRef,
    input: Option<TypeId>,
    output: Option<TypeId>,
    pairings: Vec<PairingConfig>,
    transitions: Vec<Transition>,
    propagable: bool,
    allow_latent_linking: bool,
}

impl SynapseTypeInfo {
    pub fn refs(&self) -> SynapseTypeRef {
        self.refs
    }

    /// Input neuron type.
    pub fn input(&self) -> Option<TypeId> {
        self.input
    }

    /// Output neuron type.
    pub fn output(&self) -> Option<TypeId> {
        self.output
    }

    pub fn pairings(&self) -> &[PairingConfig] {
        &self.pairings
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Default `propagable` flag of new synapse instances.
    pub fn propagable(&self) -> bool {
        self.propagable
    }

    pub fn allow_latent_linking(&self) -> bool {
        self.allow_latent_linking
    }
}

// ============================================================================
// Schema
// ============================================================================

#[derive(Debug, Default)]
pub struct Schema {
    registry: TypeRegistry,
    neurons: BTreeMap<TypeId, NeuronTypeInfo>,
    synapses: BTreeMap<TypeId, SynapseTypeInfo>,
}

impl Schema {
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry,
            neurons: BTreeMap::new(),
            synapses: BTreeMap::new(),
        }
    }

    /// Empty schema whose activation-function fields default to the
    /// configured tolerance.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(TypeRegistry::with_default_tolerance(config.default_tolerance))
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Mutable registry access for declaring fields.
    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    pub fn flatten_type_hierarchy(&mut self) -> Result<()> {
        self.registry.flatten_type_hierarchy()
    }

    pub fn neuron_type(&self, neuron_type: TypeId) -> Result<&NeuronTypeInfo> {
        self.neurons
            .get(&neuron_type)
            .ok_or_else(|| Error::TypeNotFound(self.registry.type_name(neuron_type).to_string()))
    }

    pub fn synapse_type(&self, synapse_type: TypeId) -> Result<&SynapseTypeInfo> {
        self.synapses
            .get(&synapse_type)
            .ok_or_else(|| Error::TypeNotFound(self.registry.type_name(synapse_type).to_string()))
    }

    pub fn set_firing_rule(&mut self, neuron: NeuronTypeRef, field: FieldId, threshold: f64) -> Result<()> {
        let info = self
            .neurons
            .get_mut(&neuron.neuron)
            .ok_or_else(|| Error::TypeNotFound(format!("#{}", neuron.neuron.0)))?;
        info.firing_rule = Some(FiringRule { field, threshold });
        Ok(())
    }

    /// Firing rule of `neuron_type`, inherited from the nearest ancestor
    /// declaring one.
    pub fn firing_rule(&self, neuron_type: TypeId) -> Option<FiringRule> {
        if let Some(rule) = self.neurons.get(&neuron_type).and_then(|i| i.firing_rule) {
            return Some(rule);
        }
        self.registry
            .ancestors(neuron_type)
            .into_iter()
            .filter_map(|t| self.neurons.get(&t).and_then(|i| i.firing_rule))
            .next()
    }

    /// Pairing configurations of `synapse_type` and all its ancestors.
    pub fn pairings_for(&self, synapse_type: TypeId) -> Vec<PairingConfig> {
        self.registry
            .ancestors(synapse_type)
            .into_iter()
            .filter_map(|t| self.synapses.get(&t))
            .flat_map(|info| info.pairings.iter().copied())
            .collect()
    }

    pub fn allows_latent_linking(&self, synapse_type: TypeId) -> bool {
        self.registry
            .ancestors(synapse_type)
            .into_iter()
            .filter_map(|t| self.synapses.get(&t))
            .any(|info| info.allow_latent_linking)
    }

    /// Attach the pairing to both synapse types on the side where they share
    /// a neuron type.
    fn establish_pairing(&mut self, primary: TypeId, secondary: TypeId, kind: PairingKind) -> Result<()> {
        let a = self.synapse_type(primary)?;
        let b = self.synapse_type(secondary)?;
        let same = |x: Option<TypeId>, y: Option<TypeId>| x.is_some() && x == y;

        let (anchor_a, anchor_b, spanned) = if same(a.output, b.output) {
            (PairAnchor::SharedOutput, PairAnchor::SharedOutput, None)
        } else if same(a.input, b.input) {
            (PairAnchor::SharedInput, PairAnchor::SharedInput, None)
        } else if same(a.output, b.input) {
            (PairAnchor::SpanOutput, PairAnchor::SpanInput, a.output)
        } else if same(a.input, b.output) {
            (PairAnchor::SpanInput, PairAnchor::SpanOutput, a.input)
        } else {
            debug!(
                "Pairing {} with {} without a shared neuron type",
                self.registry.type_name(primary),
                self.registry.type_name(secondary)
            );
            (PairAnchor::Unanchored, PairAnchor::Unanchored, None)
        };
        let latent = anchor_a == PairAnchor::SharedOutput;

        if let Some(info) = self.synapses.get_mut(&primary) {
            info.pairings.push(PairingConfig {
                paired_type: secondary,
                kind,
                anchor: anchor_a,
                primary: true,
            });
            info.allow_latent_linking |= latent;
        }
        if let Some(info) = self.synapses.get_mut(&secondary) {
            info.pairings.push(PairingConfig {
                paired_type: primary,
                kind,
                anchor: anchor_b,
                primary: false,
            });
            info.allow_latent_linking |= latent;
        }

        if let (Some(neuron), PairingKind::ByBindingSignal(slot)) = (spanned, kind) {
            if let Some(info) = self.neurons.get_mut(&neuron) {
                if let Some(previous) = info.wildcard_bs_slot.filter(|p| *p != slot) {
                    // TODO: decide whether several spanning pairings over one
                    // neuron type should keep all their slots
                    warn!(
                        "Wildcard slot of {} overwritten: {} -> {}",
                        self.registry.type_name(neuron),
                        previous,
                        slot
                    );
                }
                info.wildcard_bs_slot = Some(slot);
            }
        }

        debug!(
            "Paired {} with {} ({:?}, {:?})",
            self.registry.type_name(primary),
            self.registry.type_name(secondary),
            kind,
            anchor_a
        );
        Ok(())
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Builds a neuron type together with its activation type.
#[derive(Debug, Clone)]
pub struct NeuronTypeBuilder {
    name: String,
    parents: Vec<NeuronTypeRef>,
}

impl NeuronTypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
        }
    }

    pub fn parent(mut self, parent: NeuronTypeRef) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn build(self, schema: &mut Schema) -> Result<NeuronTypeRef> {
        let registry = &mut schema.registry;
        let neuron = registry.add_type(self.name.clone(), Role::Neuron);
        let activation = registry.add_type(format!("{}_ACTIVATION", self.name), Role::Activation);
        for parent in &self.parents {
            registry.add_parent(neuron, parent.neuron)?;
            registry.add_parent(activation, parent.activation)?;
        }

        let refs = NeuronTypeRef { neuron, activation };
        schema.neurons.insert(
            neuron,
            NeuronTypeInfo {
                refs,
                wildcard_bs_slot: None,
                firing_rule: None,
            },
        );
        debug!("Built neuron type {}", self.name);
        Ok(refs)
    }
}

/// Builds a synapse type together with its link type.
#[derive(Debug, Clone)]
pub struct SynapseTypeBuilder {
    name: String,
    input: Option<NeuronTypeRef>,
    output: Option<NeuronTypeRef>,
    parents: Vec<SynapseTypeRef>,
    pairings: Vec<(SynapseTypeRef, PairingKind)>,
    transitions: Vec<Transition>,
    propagable: bool,
}

impl SynapseTypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: None,
            output: None,
            parents: Vec::new(),
            pairings: Vec::new(),
            transitions: Vec::new(),
            propagable: false,
        }
    }

    pub fn input(mut self, neuron: NeuronTypeRef) -> Self {
        self.input = Some(neuron);
        self
    }

    pub fn output(mut self, neuron: NeuronTypeRef) -> Self {
        self.output = Some(neuron);
        self
    }

    pub fn parent(mut self, parent: SynapseTypeRef) -> Self {
        self.parents.push(parent);
        self
    }

    /// Pair with `other` by synapse identity. This type becomes the primary.
    pub fn pair(mut self, other: SynapseTypeRef) -> Self {
        self.pairings.push((other, PairingKind::BySynapse));
        self
    }

    /// Pair with `other` through the binding signal at `slot`. This type
    /// becomes the primary.
    pub fn pair_by_binding_signal(mut self, other: SynapseTypeRef, slot: usize) -> Self {
        self.pairings.push((other, PairingKind::ByBindingSignal(slot)));
        self
    }

    pub fn transition(mut self, from: usize, to: usize) -> Self {
        self.transitions.push(Transition { from, to });
        self
    }

    pub fn propagable(mut self, propagable: bool) -> Self {
        self.propagable = propagable;
        self
    }

    pub fn build(self, schema: &mut Schema) -> Result<SynapseTypeRef> {
        // nothing is registered unless every referenced synapse type exists
        for other in self.parents.iter().chain(self.pairings.iter().map(|(p, _)| p)) {
            schema.synapse_type(other.synapse)?;
        }
        let registry = &mut schema.registry;
        let synapse = registry.add_type(self.name.clone(), Role::Synapse);
        let link = registry.add_type(format!("{}_LINK", self.name), Role::Link);
        for parent in &self.parents {
            registry.add_parent(synapse, parent.synapse)?;
            registry.add_parent(link, parent.link)?;
        }

        let inherited = |pick: fn(&SynapseTypeInfo) -> Option<TypeId>| {
            self.parents
                .iter()
                .filter_map(|p| schema.synapses.get(&p.synapse))
                .find_map(pick)
        };
        let input = self.input.map(|n| n.neuron).or_else(|| inherited(|i| i.input));
        let output = self.output.map(|n| n.neuron).or_else(|| inherited(|i| i.output));

        let refs = SynapseTypeRef { synapse, link };
        schema.synapses.insert(
            synapse,
            SynapseTypeInfo {
                refs,
                input,
                output,
                pairings: Vec::new(),
                transitions: self.transitions,
                propagable: self.propagable,
                allow_latent_linking: false,
            },
        );
        for (other, kind) in self.pairings {
            schema.establish_pairing(synapse, other.synapse, kind)?;
        }
        debug!("Built synapse type {}", self.name);
        Ok(refs)
    }
}

// ============================================================================
// Tests
// ============================================================================

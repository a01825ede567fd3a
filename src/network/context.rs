//! A processing context: the activations, links and binding signals created
//! while processing one input, plus the queue of pending steps.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::activation::{Activation, ActivationId};
use super::binding_signal::{BindingSignal, BindingSignalMap};
use super::link::{Link, LinkId};
use super::neuron::NeuronId;
use super::synapse::SynapseId;
use crate::error::{Error, Result};
use crate::fields::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub(crate) u64);

impl ContextId {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// A unit of deferred work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Mark the activation fired and link it forward.
    Fire(ActivationId),
    /// Link a new activation to matching activations on its input side.
    LinkIncoming {
        activation: ActivationId,
        excluded: Option<ActivationId>,
    },
}

#[derive(Debug, Clone)]
pub struct Context {
    id: ContextId,
    activations: BTreeMap<ActivationId, Activation>,
    links: BTreeMap<LinkId, Link>,
    binding_signals: BTreeMap<u64, BindingSignal>,
    activations_by_neuron: BTreeMap<NeuronId, BTreeSet<ActivationId>>,
    links_by_synapse: BTreeMap<SynapseId, BTreeSet<LinkId>>,
    queue: VecDeque<Step>,
    next_activation_id: u64,
    next_link_id: u64,
}

impl Context {
    pub(crate) fn new(id: ContextId) -> Self {
        Self {
            id,
            activations: BTreeMap::new(),
            links: BTreeMap::new(),
            binding_signals: BTreeMap::new(),
            activations_by_neuron: BTreeMap::new(),
            links_by_synapse: BTreeMap::new(),
            queue: VecDeque::new(),
            next_activation_id: 0,
            next_link_id: 0,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn activation(&self, id: ActivationId) -> Result<&Activation> {
        self.activations
            .get(&id)
            .ok_or(Error::ActivationNotFound(id.0))
    }

    pub fn link(&self, id: LinkId) -> Result<&Link> {
        self.links.get(&id).ok_or(Error::LinkNotFound(id.0))
    }

    pub fn activations(&self) -> impl Iterator<Item = &Activation> {
        self.activations.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn binding_signal(&self, token_id: u64) -> Result<&BindingSignal> {
        self.binding_signals
            .get(&token_id)
            .ok_or_else(|| Error::BindingSignalNotFound(token_id.to_string()))
    }

    pub fn binding_signals(&self) -> impl Iterator<Item = &BindingSignal> {
        self.binding_signals.values()
    }

    /// The earliest activation of `neuron` in this context.
    pub fn activation_by_neuron(&self, neuron: NeuronId) -> Option<ActivationId> {
        self.activations_by_neuron
            .get(&neuron)
            .and_then(|set| set.iter().next().copied())
    }

    pub fn activations_of(&self, neuron: NeuronId) -> Vec<ActivationId> {
        self.activations_by_neuron
            .get(&neuron)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn links_of(&self, synapse: SynapseId) -> Vec<LinkId> {
        self.links_by_synapse
            .get(&synapse)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Existing link of `synapse` between `input` and `output`.
    pub fn find_link(&self, synapse: SynapseId, input: ActivationId, output: ActivationId) -> Option<LinkId> {
        let out = self.activations.get(&output)?;
        out.input_links.iter().copied().find(|id| {
            self.links
                .get(id)
                .is_some_and(|l| l.synapse == synapse && l.input == input)
        })
    }

    /// Activations of `neuron` reachable through any signal of `signals` and
    /// not conflicting with them.
    pub fn matching_activations(&self, neuron: NeuronId, signals: &BindingSignalMap) -> Vec<ActivationId> {
        let mut found = BTreeSet::new();
        for token in signals.values() {
            let Some(bs) = self.binding_signals.get(token) else {
                continue;
            };
            for id in bs.activations() {
                let Some(act) = self.activations.get(id) else {
                    continue;
                };
                if act.neuron == neuron && !act.has_conflicting_binding_signals(signals) {
                    found.insert(*id);
                }
            }
        }
        found.into_iter().collect()
    }

    pub fn pending_steps(&self) -> usize {
        self.queue.len()
    }

    // ========================================================================
    // Mutation (kept index-consistent; driven by `Model`)
    // ========================================================================

    pub fn get_or_create_binding_signal(&mut self, token_id: u64) -> &mut BindingSignal {
        self.binding_signals
            .entry(token_id)
            .or_insert_with(|| BindingSignal::new(token_id))
    }

    pub(crate) fn activation_mut(&mut self, id: ActivationId) -> Result<&mut Activation> {
        self.activations
            .get_mut(&id)
            .ok_or(Error::ActivationNotFound(id.0))
    }

    pub(crate) fn link_mut(&mut self, id: LinkId) -> Result<&mut Link> {
        self.links.get_mut(&id).ok_or(Error::LinkNotFound(id.0))
    }

    pub(crate) fn insert_activation(
        &mut self,
        type_id: TypeId,
        neuron: NeuronId,
        parent: Option<ActivationId>,
        binding_signals: BindingSignalMap,
        values: Vec<f64>,
    ) -> ActivationId {
        let id = ActivationId(self.next_activation_id);
        self.next_activation_id += 1;

        for token in binding_signals.values() {
            self.get_or_create_binding_signal(*token).attach(id);
        }
        self.activations_by_neuron.entry(neuron).or_default().insert(id);
        self.activations.insert(
            id,
            Activation {
                id,
                type_id,
                neuron,
                parent,
                values,
                binding_signals,
                input_links: BTreeSet::new(),
                output_links: BTreeSet::new(),
                fired: false,
                fire_queued: false,
            },
        );
        id
    }

    pub(crate) fn insert_link(
        &mut self,
        type_id: TypeId,
        synapse: SynapseId,
        input: ActivationId,
        output: ActivationId,
        values: Vec<f64>,
    ) -> Result<LinkId> {
        let id = LinkId(self.next_link_id);
        self.activation_mut(input)?.output_links.insert(id);
        self.activation_mut(output)?.input_links.insert(id);
        self.next_link_id += 1;

        self.links_by_synapse.entry(synapse).or_default().insert(id);
        self.links.insert(
            id,
            Link {
                id,
                type_id,
                synapse,
                input,
                output,
                values,
                paired_input_side: None,
                paired_output_side: None,
            },
        );
        Ok(id)
    }

    /// Pair `primary` (PAIR_IN side) with `secondary` (PAIR_OUT side).
    pub(crate) fn pair_links(&mut self, primary: LinkId, secondary: LinkId) -> Result<()> {
        self.link(secondary)?;
        self.link_mut(primary)?.paired_input_side = Some(secondary);
        self.link_mut(secondary)?.paired_output_side = Some(primary);
        Ok(())
    }

    /// Deregister a link everywhere and clear its partner's back reference.
    pub(crate) fn remove_link(&mut self, id: LinkId) -> Result<Link> {
        let link = self.links.remove(&id).ok_or(Error::LinkNotFound(id.0))?;
        if let Some(act) = self.activations.get_mut(&link.input) {
            act.output_links.remove(&id);
        }
        if let Some(act) = self.activations.get_mut(&link.output) {
            act.input_links.remove(&id);
        }
        if let Some(set) = self.links_by_synapse.get_mut(&link.synapse) {
            set.remove(&id);
            if set.is_empty() {
                self.links_by_synapse.remove(&link.synapse);
            }
        }
        for partner in [link.paired_input_side, link.paired_output_side].into_iter().flatten() {
            if let Some(p) = self.links.get_mut(&partner) {
                if p.paired_input_side == Some(id) {
                    p.paired_input_side = None;
                }
                if p.paired_output_side == Some(id) {
                    p.paired_output_side = None;
                }
            }
        }
        Ok(link)
    }

    /// Deregister an activation that no longer has links.
    pub(crate) fn remove_activation(&mut self, id: ActivationId) -> Result<Activation> {
        let act = self
            .activations
            .remove(&id)
            .ok_or(Error::ActivationNotFound(id.0))?;
        for token in act.binding_signals.values() {
            if let Some(bs) = self.binding_signals.get_mut(token) {
                bs.detach(id);
            }
        }
        if let Some(set) = self.activations_by_neuron.get_mut(&act.neuron) {
            set.remove(&id);
            if set.is_empty() {
                self.activations_by_neuron.remove(&act.neuron);
            }
        }
        for other in self.activations.values_mut() {
            if other.parent == Some(id) {
                other.parent = None;
            }
        }
        self.queue.retain(|step| match step {
            Step::Fire(a) => *a != id,
            Step::LinkIncoming { activation, .. } => *activation != id,
        });
        Ok(act)
    }

    /// Neurons with at least one activation here.
    pub(crate) fn active_neurons(&self) -> Vec<NeuronId> {
        self.activations_by_neuron.keys().copied().collect()
    }

    pub(crate) fn enqueue(&mut self, step: Step) {
        self.queue.push_back(step);
    }

    pub(crate) fn next_step(&mut self) -> Option<Step> {
        self.queue.pop_front()
    }
}

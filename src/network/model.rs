//! The live network: neurons and synapses shared by all contexts, plus the
//! contexts holding activations and links.
//!
//! `Model` is the [`ObjectStore`] the field engine runs against. Every
//! structural change (new activation, new or removed link) re-initialises the
//! fields of the objects whose aggregations it affects.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::activation::{Activation, ActivationId};
use super::binding_signal::{self, BindingSignal, BindingSignalMap};
use super::context::{Context, ContextId, Step};
use super::link::{Link, LinkId};
use super::linker;
use super::neuron::{Neuron, NeuronId};
use super::schema::{NeuronTypeRef, Schema, SynapseTypeRef};
use super::synapse::{Synapse, SynapseId};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::fields::propagation::{self, ObjectStore};
use crate::fields::{FieldId, Relation, TypeId};

/// Handle to any instance the field engine can read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjRef {
    Neuron(NeuronId),
    Synapse(SynapseId),
    Activation(ContextId, ActivationId),
    Link(ContextId, LinkId),
}

#[derive(Debug)]
pub struct Model {
    schema: Arc<Schema>,
    config: EngineConfig,
    neurons: BTreeMap<NeuronId, Neuron>,
    synapses: BTreeMap<SynapseId, Synapse>,
    contexts: BTreeMap<ContextId, Context>,
    next_neuron_id: u64,
    next_synapse_id: u64,
    next_context_id: u64,
}

impl Model {
    pub fn new(schema: Arc<Schema>) -> Result<Self> {
        Self::with_config(schema, EngineConfig::default())
    }

    pub fn with_config(schema: Arc<Schema>, config: EngineConfig) -> Result<Self> {
        if !schema.registry().is_flattened() {
            return Err(Error::NotFlattened);
        }
        Ok(Self {
            schema,
            config,
            neurons: BTreeMap::new(),
            synapses: BTreeMap::new(),
            contexts: BTreeMap::new(),
            next_neuron_id: 0,
            next_synapse_id: 0,
            next_context_id: 0,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Neurons & synapses
    // ========================================================================

    pub fn instantiate_neuron(&mut self, ty: NeuronTypeRef) -> Result<NeuronId> {
        self.schema.neuron_type(ty.neuron)?;
        let values = propagation::allocate(self.schema.registry(), ty.neuron)?;
        let id = NeuronId(self.next_neuron_id);
        self.next_neuron_id += 1;
        self.neurons.insert(
            id,
            Neuron {
                id,
                type_id: ty.neuron,
                values,
                input_synapses: Default::default(),
                output_synapses: Default::default(),
            },
        );
        self.init_fields(ObjRef::Neuron(id))?;
        debug!("Instantiated neuron {} ({})", id.0, self.schema.registry().type_name(ty.neuron));
        Ok(id)
    }

    pub fn instantiate_synapse(&mut self, ty: SynapseTypeRef, input: NeuronId, output: NeuronId) -> Result<SynapseId> {
        let info = self.schema.synapse_type(ty.synapse)?;
        let registry = self.schema.registry();
        let expected = [(input, info.input()), (output, info.output())];
        for (neuron, expected_type) in expected {
            let actual = self.neuron(neuron)?.type_id;
            if let Some(t) = expected_type.filter(|t| !registry.is_a(actual, *t)) {
                return Err(Error::EndpointMismatch(format!(
                    "{} expects {}, got neuron {} of type {}",
                    registry.type_name(ty.synapse),
                    registry.type_name(t),
                    neuron.0,
                    registry.type_name(actual)
                )));
            }
        }

        let propagable = info.propagable();
        let values = propagation::allocate(registry, ty.synapse)?;
        let id = SynapseId(self.next_synapse_id);
        self.next_synapse_id += 1;
        self.synapses.insert(
            id,
            Synapse {
                id,
                type_id: ty.synapse,
                values,
                input,
                output,
                propagable,
                paired_input_synapse: None,
                paired_output_synapse: None,
            },
        );
        self.neuron_mut(input)?.output_synapses.insert(id);
        self.neuron_mut(output)?.input_synapses.insert(id);

        self.init_fields(ObjRef::Synapse(id))?;
        self.init_fields(ObjRef::Neuron(output))?;
        self.init_fields(ObjRef::Neuron(input))?;
        debug!("Instantiated synapse {} ({} -> {})", id.0, input.0, output.0);
        Ok(id)
    }

    /// Pair two synapse instances for `BySynapse` link pairing. `primary`'s
    /// links reach the partner through PAIR_IN.
    pub fn pair_synapses(&mut self, primary: SynapseId, secondary: SynapseId) -> Result<()> {
        self.synapse(secondary)?;
        self.synapse_mut(primary)?.paired_input_synapse = Some(secondary);
        self.synapse_mut(secondary)?.paired_output_synapse = Some(primary);
        Ok(())
    }

    pub fn set_propagable(&mut self, synapse: SynapseId, propagable: bool) -> Result<()> {
        self.synapse_mut(synapse)?.propagable = propagable;
        Ok(())
    }

    pub fn neuron(&self, id: NeuronId) -> Result<&Neuron> {
        self.neurons.get(&id).ok_or(Error::NeuronNotFound(id.0))
    }

    pub fn synapse(&self, id: SynapseId) -> Result<&Synapse> {
        self.synapses.get(&id).ok_or(Error::SynapseNotFound(id.0))
    }

    pub fn neurons(&self) -> impl Iterator<Item = &Neuron> {
        self.neurons.values()
    }

    pub fn synapses(&self) -> impl Iterator<Item = &Synapse> {
        self.synapses.values()
    }

    /// Slot of the spanning binding-signal pairing passing through `neuron`.
    pub fn wildcard_bs_slot(&self, neuron: NeuronId) -> Result<Option<usize>> {
        let ty = self.neuron(neuron)?.type_id;
        Ok(self.schema.neuron_type(ty)?.wildcard_bs_slot())
    }

    fn neuron_mut(&mut self, id: NeuronId) -> Result<&mut Neuron> {
        self.neurons.get_mut(&id).ok_or(Error::NeuronNotFound(id.0))
    }

    fn synapse_mut(&mut self, id: SynapseId) -> Result<&mut Synapse> {
        self.synapses.get_mut(&id).ok_or(Error::SynapseNotFound(id.0))
    }

    // ========================================================================
    // Fields
    // ========================================================================

    pub fn set_field_value(&mut self, obj: ObjRef, field: FieldId, value: f64) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        propagation::set_field_value(schema.registry(), self, obj, field, value)
    }

    pub fn get_field_value(&self, obj: ObjRef, field: FieldId) -> Result<f64> {
        propagation::get_field_value(self.schema.registry(), self, obj, field)
    }

    pub fn init_fields(&mut self, obj: ObjRef) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        propagation::init_fields(schema.registry(), self, obj)
    }

    // ========================================================================
    // Contexts
    // ========================================================================

    pub fn create_context(&mut self) -> ContextId {
        let id = ContextId(self.next_context_id);
        self.next_context_id += 1;
        self.contexts.insert(id, Context::new(id));
        debug!("Created context {}", id.0);
        id
    }

    pub fn context(&self, id: ContextId) -> Result<&Context> {
        self.contexts.get(&id).ok_or(Error::ContextNotFound(id.0))
    }

    pub(crate) fn context_mut(&mut self, id: ContextId) -> Result<&mut Context> {
        self.contexts.get_mut(&id).ok_or(Error::ContextNotFound(id.0))
    }

    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.contexts.values()
    }

    /// Drop a context with everything in it and re-aggregate neuron and
    /// synapse fields that read across contexts.
    pub fn close_context(&mut self, id: ContextId) -> Result<()> {
        let ctx = self.contexts.remove(&id).ok_or(Error::ContextNotFound(id.0))?;
        let touched_synapses: Vec<SynapseId> = ctx.links().map(|l| l.synapse).collect();
        for neuron in ctx.active_neurons() {
            if self.neurons.contains_key(&neuron) {
                self.init_fields(ObjRef::Neuron(neuron))?;
            }
        }
        for synapse in touched_synapses {
            if self.synapses.contains_key(&synapse) {
                self.init_fields(ObjRef::Synapse(synapse))?;
            }
        }
        info!("Closed context {}", id.0);
        Ok(())
    }

    pub fn activation(&self, ctx: ContextId, id: ActivationId) -> Result<&Activation> {
        self.context(ctx)?.activation(id)
    }

    pub fn link(&self, ctx: ContextId, id: LinkId) -> Result<&Link> {
        self.context(ctx)?.link(id)
    }

    pub fn get_or_create_binding_signal(&mut self, ctx: ContextId, token_id: u64) -> Result<&BindingSignal> {
        Ok(self.context_mut(ctx)?.get_or_create_binding_signal(token_id))
    }

    // ========================================================================
    // Activations
    // ========================================================================

    pub fn create_activation(
        &mut self,
        ctx: ContextId,
        neuron: NeuronId,
        binding_signals: BindingSignalMap,
        parent: Option<ActivationId>,
    ) -> Result<ActivationId> {
        let neuron_type = self.neuron(neuron)?.type_id;
        let activation_type = self.schema.neuron_type(neuron_type)?.refs().activation;
        let values = propagation::allocate(self.schema.registry(), activation_type)?;
        let id = self
            .context_mut(ctx)?
            .insert_activation(activation_type, neuron, parent, binding_signals, values);
        debug!("Created activation {} of neuron {} in context {}", id.0, neuron.0, ctx.0);
        self.init_fields(ObjRef::Activation(ctx, id))?;
        self.init_fields(ObjRef::Neuron(neuron))?;
        Ok(id)
    }

    /// Activate `neuron` for an input token bound at `slot`.
    pub fn add_token(&mut self, ctx: ContextId, neuron: NeuronId, slot: usize, token_id: u64) -> Result<ActivationId> {
        let signals = BindingSignalMap::from([(slot, token_id)]);
        self.create_activation(ctx, neuron, signals, None)
    }

    /// New activation of the same neuron whose signals are the parent's plus
    /// `new_signals`; the parent's entries win on shared slots.
    pub fn branch(&mut self, ctx: ContextId, parent: ActivationId, new_signals: &BindingSignalMap) -> Result<ActivationId> {
        let act = self.activation(ctx, parent)?;
        let signals = binding_signal::merge(&act.binding_signals, new_signals);
        let neuron = act.neuron;
        self.create_activation(ctx, neuron, signals, Some(parent))
    }

    /// Queue the activation to fire on the next [`Model::process`].
    pub fn fire(&mut self, ctx: ContextId, act: ActivationId) -> Result<()> {
        let context = self.context_mut(ctx)?;
        let activation = context.activation_mut(act)?;
        if activation.fired || activation.fire_queued {
            return Ok(());
        }
        activation.fire_queued = true;
        context.enqueue(Step::Fire(act));
        Ok(())
    }

    /// Link `act` to every compatible activation on its input side, except
    /// `excluded`.
    pub fn link_incoming(&mut self, ctx: ContextId, act: ActivationId, excluded: Option<ActivationId>) -> Result<()> {
        linker::link_incoming(self, ctx, act, excluded)
    }

    /// Drain the context's queue. A failing step is logged and dropped.
    /// Returns the number of steps handled.
    pub fn process(&mut self, ctx: ContextId) -> Result<usize> {
        let max_steps = self.config.max_process_steps;
        let mut steps = 0;
        loop {
            if steps >= max_steps {
                let pending = self.context(ctx)?.pending_steps();
                if pending > 0 {
                    warn!("Context {} stopped after {} steps, {} pending", ctx.0, steps, pending);
                }
                break;
            }
            let Some(step) = self.context_mut(ctx)?.next_step() else {
                break;
            };
            steps += 1;
            let result = match step {
                Step::Fire(act) => linker::fire(self, ctx, act),
                Step::LinkIncoming { activation, excluded } => {
                    linker::link_incoming(self, ctx, activation, excluded)
                }
            };
            if let Err(e) = result {
                warn!("Dropped {:?} in context {}: {}", step, ctx.0, e);
            }
        }
        debug!("Processed context {}: {} steps", ctx.0, steps);
        Ok(steps)
    }

    /// Remove an activation together with all its links.
    pub fn remove_activation(&mut self, ctx: ContextId, act: ActivationId) -> Result<()> {
        let links: Vec<LinkId> = {
            let a = self.activation(ctx, act)?;
            a.input_links.iter().chain(a.output_links.iter()).copied().collect()
        };
        for link in links {
            self.remove_link(ctx, link)?;
        }
        let removed = self.context_mut(ctx)?.remove_activation(act)?;
        self.init_fields(ObjRef::Neuron(removed.neuron))?;
        debug!("Removed activation {} from context {}", act.0, ctx.0);
        Ok(())
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Link `input` to `output` through `synapse`, pairing the new link with
    /// its partner if one is present. Returns the existing link if the two
    /// activations are already connected through this synapse.
    pub fn create_link(
        &mut self,
        ctx: ContextId,
        synapse: SynapseId,
        input: ActivationId,
        output: ActivationId,
    ) -> Result<LinkId> {
        let syn = self.synapse(synapse)?;
        let (syn_type, in_neuron, out_neuron) = (syn.type_id, syn.input, syn.output);
        let link_type = self.schema.synapse_type(syn_type)?.refs().link;

        let context = self.context(ctx)?;
        let (in_act, out_act) = (context.activation(input)?, context.activation(output)?);
        if in_act.neuron != in_neuron || out_act.neuron != out_neuron {
            return Err(Error::EndpointMismatch(format!(
                "synapse {} connects neurons {} -> {}, activations belong to {} -> {}",
                synapse.0, in_neuron.0, out_neuron.0, in_act.neuron.0, out_act.neuron.0
            )));
        }
        if let Some(existing) = context.find_link(synapse, input, output) {
            return Ok(existing);
        }

        let values = propagation::allocate(self.schema.registry(), link_type)?;
        let id = self
            .context_mut(ctx)?
            .insert_link(link_type, synapse, input, output, values)?;
        let partner = linker::pair_new_link(self, ctx, id)?;
        debug!(
            "Created link {} ({} -> {}) in context {}{}",
            id.0,
            input.0,
            output.0,
            ctx.0,
            partner.map(|p| format!(", paired with {}", p.0)).unwrap_or_default()
        );

        self.init_fields(ObjRef::Link(ctx, id))?;
        if let Some(p) = partner {
            self.init_fields(ObjRef::Link(ctx, p))?;
        }
        self.init_fields(ObjRef::Activation(ctx, output))?;
        self.init_fields(ObjRef::Activation(ctx, input))?;
        self.init_fields(ObjRef::Synapse(synapse))?;
        Ok(id)
    }

    /// Partner link through `PairIn` or `PairOut`.
    pub fn paired_link(&self, ctx: ContextId, link: LinkId, relation: Relation) -> Result<LinkId> {
        let l = self.link(ctx, link)?;
        let partner = match relation {
            Relation::PairIn => l.paired_input_side,
            Relation::PairOut => l.paired_output_side,
            _ => {
                return Err(Error::InvalidRelation {
                    relation,
                    field: "paired link".to_string(),
                })
            }
        };
        partner.ok_or(Error::UnsetPairRelation(relation))
    }

    pub fn remove_link(&mut self, ctx: ContextId, link: LinkId) -> Result<()> {
        let removed = self.context_mut(ctx)?.remove_link(link)?;
        if let Some(p) = removed.partner() {
            self.init_fields(ObjRef::Link(ctx, p))?;
        }
        self.init_fields(ObjRef::Activation(ctx, removed.output))?;
        self.init_fields(ObjRef::Activation(ctx, removed.input))?;
        if self.synapses.contains_key(&removed.synapse) {
            self.init_fields(ObjRef::Synapse(removed.synapse))?;
        }
        debug!("Removed link {} from context {}", link.0, ctx.0);
        Ok(())
    }

    pub(crate) fn enqueue(&mut self, ctx: ContextId, step: Step) -> Result<()> {
        self.context_mut(ctx)?.enqueue(step);
        Ok(())
    }
}

impl ObjectStore for Model {
    type Handle = ObjRef;

    fn type_of(&self, obj: ObjRef) -> Result<TypeId> {
        Ok(match obj {
            ObjRef::Neuron(id) => self.neuron(id)?.type_id,
            ObjRef::Synapse(id) => self.synapse(id)?.type_id,
            ObjRef::Activation(ctx, id) => self.activation(ctx, id)?.type_id,
            ObjRef::Link(ctx, id) => self.link(ctx, id)?.type_id,
        })
    }

    fn values(&self, obj: ObjRef) -> Result<&[f64]> {
        Ok(match obj {
            ObjRef::Neuron(id) => self.neuron(id)?.values.as_slice(),
            ObjRef::Synapse(id) => self.synapse(id)?.values.as_slice(),
            ObjRef::Activation(ctx, id) => self.activation(ctx, id)?.values.as_slice(),
            ObjRef::Link(ctx, id) => self.link(ctx, id)?.values.as_slice(),
        })
    }

    fn values_mut(&mut self, obj: ObjRef) -> Result<&mut [f64]> {
        Ok(match obj {
            ObjRef::Neuron(id) => self.neuron_mut(id)?.values.as_mut_slice(),
            ObjRef::Synapse(id) => self.synapse_mut(id)?.values.as_mut_slice(),
            ObjRef::Activation(ctx, id) => self.context_mut(ctx)?.activation_mut(id)?.values.as_mut_slice(),
            ObjRef::Link(ctx, id) => self.context_mut(ctx)?.link_mut(id)?.values.as_mut_slice(),
        })
    }

    fn follow(&self, obj: ObjRef, relation: Relation) -> Result<Vec<ObjRef>> {
        if relation == Relation::Self_ {
            return Ok(vec![obj]);
        }
        Ok(match obj {
            ObjRef::Neuron(id) => {
                let neuron = self.neuron(id)?;
                match relation {
                    Relation::Input => neuron.input_synapses.iter().map(|s| ObjRef::Synapse(*s)).collect(),
                    Relation::Output => neuron.output_synapses.iter().map(|s| ObjRef::Synapse(*s)).collect(),
                    Relation::Activation => self
                        .contexts
                        .iter()
                        .flat_map(|(cid, c)| c.activations_of(id).into_iter().map(move |a| ObjRef::Activation(*cid, a)))
                        .collect(),
                    _ => Vec::new(),
                }
            }
            ObjRef::Synapse(id) => {
                let synapse = self.synapse(id)?;
                match relation {
                    Relation::Input => vec![ObjRef::Neuron(synapse.input)],
                    Relation::Output => vec![ObjRef::Neuron(synapse.output)],
                    Relation::Link => self
                        .contexts
                        .iter()
                        .flat_map(|(cid, c)| c.links_of(id).into_iter().map(move |l| ObjRef::Link(*cid, l)))
                        .collect(),
                    _ => Vec::new(),
                }
            }
            ObjRef::Activation(ctx, id) => {
                let act = self.activation(ctx, id)?;
                match relation {
                    Relation::Input => act.input_links.iter().map(|l| ObjRef::Link(ctx, *l)).collect(),
                    Relation::Output => act.output_links.iter().map(|l| ObjRef::Link(ctx, *l)).collect(),
                    Relation::Neuron => vec![ObjRef::Neuron(act.neuron)],
                    _ => Vec::new(),
                }
            }
            ObjRef::Link(ctx, id) => {
                let link = self.link(ctx, id)?;
                let to_link = |l: Option<LinkId>| -> Vec<ObjRef> { l.map(|l| ObjRef::Link(ctx, l)).into_iter().collect() };
                match relation {
                    Relation::Input => vec![ObjRef::Activation(ctx, link.input)],
                    Relation::Output => vec![ObjRef::Activation(ctx, link.output)],
                    Relation::Synapse => vec![ObjRef::Synapse(link.synapse)],
                    Relation::PairIn => to_link(link.paired_input_side),
                    Relation::PairOut => to_link(link.paired_output_side),
                    _ => Vec::new(),
                }
            }
        })
    }

    fn on_change(&mut self, obj: ObjRef, slot: usize) {
        let ObjRef::Activation(ctx, act) = obj else {
            return;
        };
        let schema = Arc::clone(&self.schema);
        let Ok(activation) = self.activation(ctx, act) else {
            return;
        };
        let (activation_type, neuron) = (activation.type_id, activation.neuron);
        let Some(rule) = self
            .neuron(neuron)
            .ok()
            .and_then(|n| schema.firing_rule(n.type_id))
        else {
            return;
        };
        let watched = schema
            .registry()
            .flattened(activation_type)
            .ok()
            .and_then(|flat| flat.field_index(rule.field));
        if watched != Some(slot) {
            return;
        }

        let Some(context) = self.contexts.get_mut(&ctx) else {
            return;
        };
        let Ok(activation) = context.activation_mut(act) else {
            return;
        };
        let value = activation.values.get(slot).copied().unwrap_or_default();
        if activation.fired || activation.fire_queued || value <= rule.threshold {
            return;
        }
        activation.fire_queued = true;
        context.enqueue(Step::Fire(act));
        debug!("Queued activation {} to fire ({} > {})", act.0, value, rule.threshold);
    }
}

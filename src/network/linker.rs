//! Linking decisions taken while a context is processed.
//!
//! When an activation fires, each output synapse either links it to
//! compatible activations already on the output neuron, propagates it into a
//! new output activation, or (for synapses paired through a shared output
//! neuron) performs latent linking: both paired input activations are
//! resolved through their binding signals and joined on one output
//! activation in a single step.

use tracing::{debug, trace};

use super::activation::ActivationId;
use super::binding_signal::{self, BindingSignalMap};
use super::context::{ContextId, Step};
use super::link::LinkId;
use super::model::Model;
use super::schema::{PairAnchor, PairingConfig, PairingKind};
use super::synapse::{Synapse, SynapseId};
use crate::error::Result;

pub(crate) fn fire(model: &mut Model, ctx: ContextId, act: ActivationId) -> Result<()> {
    let activation = model.context_mut(ctx)?.activation_mut(act)?;
    activation.fire_queued = false;
    if activation.fired {
        return Ok(());
    }
    activation.fired = true;
    debug!("Fired activation {} in context {}", act.0, ctx.0);
    link_outgoing(model, ctx, act)
}

/// Link a fired activation forward through every output synapse of its
/// neuron.
pub(crate) fn link_outgoing(model: &mut Model, ctx: ContextId, act: ActivationId) -> Result<()> {
    let activation = model.activation(ctx, act)?;
    let signals = activation.binding_signals.clone();
    let synapses: Vec<SynapseId> = model
        .neuron(activation.neuron)?
        .output_synapses
        .iter()
        .copied()
        .collect();

    for synapse_id in synapses {
        let synapse = model.synapse(synapse_id)?;
        let (syn_type, output, propagable) = (synapse.type_id, synapse.output, synapse.propagable);
        let schema = model.schema();
        if schema.allows_latent_linking(syn_type) {
            latent_link(model, ctx, act, synapse_id)?;
            continue;
        }

        let out_signals = binding_signal::transition_forward(schema.synapse_type(syn_type)?.transitions(), &signals);
        let targets: Vec<ActivationId> = model
            .context(ctx)?
            .matching_activations(output, &out_signals)
            .into_iter()
            .filter(|t| *t != act)
            .collect();
        trace!("Synapse {}: {} link targets for activation {}", synapse_id.0, targets.len(), act.0);

        for target in &targets {
            model.create_link(ctx, synapse_id, act, *target)?;
        }
        if targets.is_empty() && propagable {
            propagate(model, ctx, act, synapse_id, out_signals)?;
        }
    }
    Ok(())
}

/// Create a new output activation for `act` through `synapse`.
fn propagate(
    model: &mut Model,
    ctx: ContextId,
    act: ActivationId,
    synapse: SynapseId,
    signals: BindingSignalMap,
) -> Result<ActivationId> {
    let output = model.synapse(synapse)?.output;
    let created = model.create_activation(ctx, output, signals, None)?;
    model.create_link(ctx, synapse, act, created)?;
    model.enqueue(
        ctx,
        Step::LinkIncoming {
            activation: created,
            excluded: Some(act),
        },
    )?;
    debug!(
        "Propagated activation {} through synapse {} into {}",
        act.0, synapse.0, created.0
    );
    Ok(created)
}

/// Link `act` to compatible activations on the input side of each of its
/// neuron's input synapses.
pub(crate) fn link_incoming(
    model: &mut Model,
    ctx: ContextId,
    act: ActivationId,
    excluded: Option<ActivationId>,
) -> Result<()> {
    let activation = model.activation(ctx, act)?;
    let signals = activation.binding_signals.clone();
    let synapses: Vec<SynapseId> = model
        .neuron(activation.neuron)?
        .input_synapses
        .iter()
        .copied()
        .collect();

    for synapse_id in synapses {
        let synapse = model.synapse(synapse_id)?;
        let (syn_type, input) = (synapse.type_id, synapse.input);
        let schema = model.schema();
        // latent pairs are joined from the input side when they fire
        if schema.allows_latent_linking(syn_type) {
            continue;
        }
        let in_signals =
            binding_signal::transition_backward(schema.synapse_type(syn_type)?.transitions(), &signals);
        let sources: Vec<ActivationId> = model
            .context(ctx)?
            .matching_activations(input, &in_signals)
            .into_iter()
            .filter(|s| *s != act && Some(*s) != excluded)
            .collect();

        for source in sources {
            model.create_link(ctx, synapse_id, source, act)?;
        }
    }
    Ok(())
}

/// Join `act` with the input activations of synapses paired to `synapse_id`
/// through their shared output neuron.
fn latent_link(model: &mut Model, ctx: ContextId, act: ActivationId, synapse_id: SynapseId) -> Result<()> {
    let schema = model.schema().clone();
    let synapse = model.synapse(synapse_id)?.clone();
    let signals = model.activation(ctx, act)?.binding_signals.clone();
    let out_signals = binding_signal::transition_forward(schema.synapse_type(synapse.type_id)?.transitions(), &signals);

    let configs: Vec<PairingConfig> = schema
        .pairings_for(synapse.type_id)
        .into_iter()
        .filter(|pc| pc.anchor == PairAnchor::SharedOutput)
        .collect();

    for pc in configs {
        let partners: Vec<Synapse> = model
            .neuron(synapse.output)?
            .input_synapses
            .iter()
            .filter(|s| **s != synapse_id)
            .filter_map(|s| model.synapse(*s).ok())
            .filter(|s| schema.registry().is_a(s.type_id, pc.paired_type))
            .filter(|s| by_synapse_matches(&pc, &synapse, s))
            .cloned()
            .collect();

        for partner in partners {
            let context = model.context(ctx)?;
            let candidates: Vec<ActivationId> = match pc.kind {
                PairingKind::ByBindingSignal(slot) => {
                    let Some(token) = signals.get(&slot) else {
                        continue;
                    };
                    let Ok(bs) = context.binding_signal(*token) else {
                        continue;
                    };
                    bs.activations()
                        .iter()
                        .copied()
                        .filter(|a| context.activation(*a).is_ok_and(|x| x.neuron == partner.input))
                        .collect()
                }
                PairingKind::BySynapse => context.activations_of(partner.input),
            };

            let partner_transitions = schema.synapse_type(partner.type_id)?.transitions().to_vec();
            for candidate in candidates.into_iter().filter(|c| *c != act) {
                let candidate_signals = binding_signal::transition_forward(
                    &partner_transitions,
                    &model.activation(ctx, candidate)?.binding_signals,
                );
                if binding_signal::conflicts(&out_signals, &candidate_signals) {
                    continue;
                }
                let merged = binding_signal::merge(&out_signals, &candidate_signals);

                let existing = model
                    .context(ctx)?
                    .matching_activations(synapse.output, &merged)
                    .into_iter()
                    .next();
                let (target, created) = match existing {
                    Some(t) => (t, false),
                    None if synapse.propagable || partner.propagable => {
                        (model.create_activation(ctx, synapse.output, merged, None)?, true)
                    }
                    None => continue,
                };

                model.create_link(ctx, synapse_id, act, target)?;
                model.create_link(ctx, partner.id, candidate, target)?;
                if created {
                    model.enqueue(
                        ctx,
                        Step::LinkIncoming {
                            activation: target,
                            excluded: Some(act),
                        },
                    )?;
                }
                debug!(
                    "Latent link: {} and {} joined on activation {}",
                    act.0, candidate.0, target.0
                );
            }
        }
    }
    Ok(())
}

/// Find and set the partner of a freshly created link.
pub(crate) fn pair_new_link(model: &mut Model, ctx: ContextId, link_id: LinkId) -> Result<Option<LinkId>> {
    let schema = model.schema().clone();
    let context = model.context(ctx)?;
    let link = context.link(link_id)?.clone();
    let synapse = model.synapse(link.synapse)?;

    for pc in schema.pairings_for(synapse.type_id) {
        let neighbourhood: Vec<LinkId> = match pc.anchor {
            PairAnchor::SharedOutput => context.activation(link.output)?.input_links.iter().copied().collect(),
            PairAnchor::SharedInput => context.activation(link.input)?.output_links.iter().copied().collect(),
            PairAnchor::SpanOutput => context.activation(link.output)?.output_links.iter().copied().collect(),
            PairAnchor::SpanInput => context.activation(link.input)?.input_links.iter().copied().collect(),
            PairAnchor::Unanchored => context.links().map(|l| l.id).collect(),
        };

        for candidate_id in neighbourhood.into_iter().filter(|c| *c != link_id) {
            let candidate = context.link(candidate_id)?;
            let candidate_synapse = model.synapse(candidate.synapse)?;
            if !schema.registry().is_a(candidate_synapse.type_id, pc.paired_type) {
                continue;
            }
            if !by_synapse_matches(&pc, synapse, candidate_synapse) {
                continue;
            }
            if let PairingKind::ByBindingSignal(slot) = pc.kind {
                let (mine, theirs) = match pc.anchor {
                    PairAnchor::SharedOutput => (link.input, candidate.input),
                    PairAnchor::SharedInput => (link.output, candidate.output),
                    PairAnchor::SpanOutput => (link.input, candidate.output),
                    PairAnchor::SpanInput => (link.output, candidate.input),
                    PairAnchor::Unanchored => (link.input, candidate.input),
                };
                let a = context.activation(mine)?.binding_signal(slot);
                let b = context.activation(theirs)?.binding_signal(slot);
                if a.is_none() || a != b {
                    continue;
                }
            }
            let free = if pc.primary {
                link.paired_input_side.is_none() && candidate.paired_output_side.is_none()
            } else {
                link.paired_output_side.is_none() && candidate.paired_input_side.is_none()
            };
            if !free {
                continue;
            }

            let (primary, secondary) = if pc.primary {
                (link_id, candidate_id)
            } else {
                (candidate_id, link_id)
            };
            model.context_mut(ctx)?.pair_links(primary, secondary)?;
            trace!("Paired link {} (PAIR_IN) with {} (PAIR_OUT)", primary.0, secondary.0);
            return Ok(Some(candidate_id));
        }
    }
    Ok(None)
}

/// `BySynapse` pairings only join explicitly paired synapse instances.
fn by_synapse_matches(pc: &PairingConfig, synapse: &Synapse, other: &Synapse) -> bool {
    match pc.kind {
        PairingKind::BySynapse => synapse.is_paired_with(other.id, pc.primary),
        PairingKind::ByBindingSignal(_) => true,
    }
}

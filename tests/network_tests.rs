//! Network processing tests
//!
//! Weighted-sum propagation through firing activations, dot products over
//! paired links and latent linking.
//! Run with: cargo test --test network_tests

use fieldnet::fields::{ActivationFunction, FieldId, Relation};
use fieldnet::network::{
    ActivationId, ContextId, Model, NeuronId, NeuronTypeBuilder, NeuronTypeRef, ObjRef, Schema,
    SynapseTypeBuilder, SynapseTypeRef,
};
use fieldnet::{EngineConfig, Error, ErrorKind};
use std::sync::Arc;

// ============================================================================
// Types
// ============================================================================

struct Standard {
    neuron: NeuronTypeRef,
    input_neuron: NeuronTypeRef,
    synapse: SynapseTypeRef,
    bias: FieldId,
    net: FieldId,
    value: FieldId,
    input_value: FieldId,
    weight: FieldId,
}

/// net = sum(weighted inputs) + bias, value = tanh(net); input neurons take
/// their value from outside.
fn standard_types(schema: &mut Schema) -> Standard {
    let neuron = NeuronTypeBuilder::new("STANDARD").build(schema).unwrap();
    let synapse = SynapseTypeBuilder::new("STANDARD_SYNAPSE")
        .input(neuron)
        .output(neuron)
        .propagable(true)
        .build(schema)
        .unwrap();

    let registry = schema.registry_mut();
    let bias = registry.input_field(neuron.neuron, "bias").id();
    let weight = registry.input_field(synapse.synapse, "weight").id();
    let net = registry
        .sum(neuron.activation, "net")
        .input(Relation::Neuron, bias, 0)
        .id();
    let value = registry
        .field_activation_func(neuron.activation, "value", ActivationFunction::Tanh, None)
        .input(Relation::Self_, net, 0)
        .id();
    let input_value = registry
        .identity(synapse.link, "input_value")
        .input(Relation::Input, value, 0)
        .id();
    let weighted_input = registry
        .mul(synapse.link, "weighted_input")
        .input(Relation::Self_, input_value, 0)
        .input(Relation::Synapse, weight, 1)
        .id();
    registry.field(net).input(Relation::Input, weighted_input, 0);
    schema.set_firing_rule(neuron, value, 0.0).unwrap();

    let input_neuron = NeuronTypeBuilder::new("INPUT")
        .parent(neuron)
        .build(schema)
        .unwrap();
    schema
        .registry_mut()
        .input_field(input_neuron.activation, "value")
        .overrides(value);

    Standard {
        neuron,
        input_neuron,
        synapse,
        bias,
        net,
        value,
        input_value,
        weight,
    }
}

struct Dot {
    schema: Arc<Schema>,
    standard: Standard,
    key: NeuronTypeRef,
    query: NeuronTypeRef,
    comp: NeuronTypeRef,
    key_comp: SynapseTypeRef,
    query_comp: SynapseTypeRef,
    comp_net: FieldId,
    comp_value: FieldId,
}

/// comp.net = sum over query links of (query value * key value), the key
/// value reached through PAIR_IN.
fn dot_product_types() -> Dot {
    let mut schema = Schema::default();
    let standard = standard_types(&mut schema);
    let key = NeuronTypeBuilder::new("KEY")
        .parent(standard.input_neuron)
        .build(&mut schema)
        .unwrap();
    let query = NeuronTypeBuilder::new("QUERY")
        .parent(standard.input_neuron)
        .build(&mut schema)
        .unwrap();
    let comp = NeuronTypeBuilder::new("COMP").build(&mut schema).unwrap();

    let dot = SynapseTypeBuilder::new("DOT").build(&mut schema).unwrap();
    let key_comp = SynapseTypeBuilder::new("KEY_COMP")
        .parent(dot)
        .input(key)
        .output(comp)
        .propagable(true)
        .build(&mut schema)
        .unwrap();
    let query_comp = SynapseTypeBuilder::new("QUERY_COMP")
        .parent(dot)
        .input(query)
        .output(comp)
        .propagable(true)
        .pair_by_binding_signal(key_comp, 0)
        .build(&mut schema)
        .unwrap();

    let registry = schema.registry_mut();
    let dot_input = registry
        .identity(dot.link, "dot_input")
        .input(Relation::Input, standard.value, 0)
        .id();
    let product = registry
        .mul(query_comp.link, "product")
        .input(Relation::Self_, dot_input, 0)
        .input(Relation::PairIn, dot_input, 1)
        .id();
    let comp_net = registry
        .sum(comp.activation, "comp_net")
        .input(Relation::Input, product, 0)
        .id();
    let comp_value = registry
        .identity(comp.activation, "comp_value")
        .input(Relation::Self_, comp_net, 0)
        .id();
    schema.flatten_type_hierarchy().unwrap();

    Dot {
        schema: Arc::new(schema),
        standard,
        key,
        query,
        comp,
        key_comp,
        query_comp,
        comp_net,
        comp_value,
    }
}

fn act(ctx: ContextId, id: ActivationId) -> ObjRef {
    ObjRef::Activation(ctx, id)
}

// ============================================================================
// Weighted sums
// ============================================================================

struct MathNet {
    model: Model,
    types: Standard,
    inputs: [NeuronId; 2],
    middle: NeuronId,
    output: NeuronId,
}

fn math_net(config: EngineConfig) -> MathNet {
    let mut schema = Schema::default();
    let types = standard_types(&mut schema);
    schema.flatten_type_hierarchy().unwrap();
    let mut model = Model::with_config(Arc::new(schema), config).unwrap();

    let input1 = model.instantiate_neuron(types.input_neuron).unwrap();
    let input2 = model.instantiate_neuron(types.input_neuron).unwrap();
    let middle = model.instantiate_neuron(types.neuron).unwrap();
    let output = model.instantiate_neuron(types.neuron).unwrap();
    for n in [input1, input2, middle, output] {
        model.set_field_value(ObjRef::Neuron(n), types.bias, -15.0).unwrap();
    }
    for (from, to) in [(input1, middle), (input2, middle), (middle, output)] {
        let s = model.instantiate_synapse(types.synapse, from, to).unwrap();
        model.set_field_value(ObjRef::Synapse(s), types.weight, 10.0).unwrap();
    }

    MathNet {
        model,
        types,
        inputs: [input1, input2],
        middle,
        output,
    }
}

#[test]
fn test_weighted_sum_propagates_through_network() {
    let mut net = math_net(EngineConfig::default());
    let model = &mut net.model;
    let ctx = model.create_context();

    for input in net.inputs {
        let a = model.add_token(ctx, input, 0, 1).unwrap();
        model.set_field_value(act(ctx, a), net.types.value, 1.0).unwrap();
    }
    let steps = model.process(ctx).unwrap();
    assert!(steps >= 3, "two inputs and the middle activation fire");

    let context = model.context(ctx).unwrap();
    assert_eq!(context.activations().count(), 4);
    assert_eq!(context.links().count(), 3);

    let middle = context.activation_by_neuron(net.middle).unwrap();
    let middle_net = model.get_field_value(act(ctx, middle), net.types.net).unwrap();
    let middle_value = model.get_field_value(act(ctx, middle), net.types.value).unwrap();
    assert!((middle_net - 5.0).abs() < 1e-9, "got {middle_net}");
    assert!((middle_value - 5.0_f64.tanh()).abs() < 1e-9);
    assert!(model.activation(ctx, middle).unwrap().has_fired());

    let output = model.context(ctx).unwrap().activation_by_neuron(net.output).unwrap();
    let output_net = model.get_field_value(act(ctx, output), net.types.net).unwrap();
    let expected = 5.0_f64.tanh() * 10.0 - 15.0;
    assert!((output_net - expected).abs() < 1e-9, "got {output_net}");
    // negative output does not fire
    assert!(!model.activation(ctx, output).unwrap().has_fired());
}

#[test]
fn test_link_input_value_follows_source_activation() {
    let mut net = math_net(EngineConfig::default());
    let model = &mut net.model;
    let ctx = model.create_context();
    let a = model.add_token(ctx, net.inputs[0], 0, 1).unwrap();
    model.set_field_value(act(ctx, a), net.types.value, 1.0).unwrap();
    model.process(ctx).unwrap();

    let link = *model.activation(ctx, a).unwrap().output_links().iter().next().unwrap();
    model.set_field_value(act(ctx, a), net.types.value, 0.5).unwrap();
    assert_eq!(
        model.get_field_value(ObjRef::Link(ctx, link), net.types.input_value).unwrap(),
        0.5
    );

    let middle = model.context(ctx).unwrap().activation_by_neuron(net.middle).unwrap();
    let middle_net = model.get_field_value(act(ctx, middle), net.types.net).unwrap();
    assert!((middle_net - (0.5 * 10.0 - 15.0)).abs() < 1e-9);
}

#[test]
fn test_removing_a_link_reaggregates_net() {
    let mut net = math_net(EngineConfig::default());
    let model = &mut net.model;
    let ctx = model.create_context();
    let mut inputs = Vec::new();
    for input in net.inputs {
        let a = model.add_token(ctx, input, 0, 1).unwrap();
        model.set_field_value(act(ctx, a), net.types.value, 1.0).unwrap();
        inputs.push(a);
    }
    model.process(ctx).unwrap();

    let middle = model.context(ctx).unwrap().activation_by_neuron(net.middle).unwrap();
    let link = *model.activation(ctx, inputs[1]).unwrap().output_links().iter().next().unwrap();
    model.remove_link(ctx, link).unwrap();

    let middle_net = model.get_field_value(act(ctx, middle), net.types.net).unwrap();
    assert!((middle_net - (-5.0)).abs() < 1e-9, "got {middle_net}");
}

#[test]
fn test_bias_change_reaches_live_activations() {
    let mut net = math_net(EngineConfig::default());
    let model = &mut net.model;
    let ctx = model.create_context();
    let a = model.add_token(ctx, net.middle, 0, 1).unwrap();
    assert_eq!(model.get_field_value(act(ctx, a), net.types.net).unwrap(), -15.0);

    model.set_field_value(ObjRef::Neuron(net.middle), net.types.bias, -3.0).unwrap();
    assert_eq!(model.get_field_value(act(ctx, a), net.types.net).unwrap(), -3.0);
}

#[test]
fn test_process_stops_at_step_limit() {
    let config = EngineConfig {
        max_process_steps: 1,
        ..EngineConfig::default()
    };
    let mut net = math_net(config);
    let model = &mut net.model;
    let ctx = model.create_context();
    for input in net.inputs {
        let a = model.add_token(ctx, input, 0, 1).unwrap();
        model.set_field_value(act(ctx, a), net.types.value, 1.0).unwrap();
    }

    assert_eq!(model.process(ctx).unwrap(), 1);
    assert!(model.context(ctx).unwrap().pending_steps() > 0);
    // a later drain picks up where the first one stopped
    assert_eq!(model.process(ctx).unwrap(), 1);
}

#[test]
fn test_conflicting_tokens_are_not_linked() {
    let mut net = math_net(EngineConfig::default());
    let model = &mut net.model;
    let ctx = model.create_context();
    let a1 = model.add_token(ctx, net.inputs[0], 0, 1).unwrap();
    let a2 = model.add_token(ctx, net.inputs[1], 0, 2).unwrap();
    model.set_field_value(act(ctx, a1), net.types.value, 1.0).unwrap();
    model.set_field_value(act(ctx, a2), net.types.value, 1.0).unwrap();
    model.process(ctx).unwrap();

    // each input token gets its own middle activation
    let context = model.context(ctx).unwrap();
    assert_eq!(context.activations_of(net.middle).len(), 2);
}

// ============================================================================
// Dot product
// ============================================================================

#[test]
fn test_dot_product_over_paired_links() -> anyhow::Result<()> {
    let dot = dot_product_types();
    let mut model = Model::new(Arc::clone(&dot.schema))?;
    let key = model.instantiate_neuron(dot.key)?;
    let query = model.instantiate_neuron(dot.query)?;
    let comp = model.instantiate_neuron(dot.comp)?;
    let key_comp = model.instantiate_synapse(dot.key_comp, key, comp)?;
    let query_comp = model.instantiate_synapse(dot.query_comp, query, comp)?;

    let ctx = model.create_context();
    let key_act = model.add_token(ctx, key, 0, 1)?;
    let query_act = model.add_token(ctx, query, 0, 1)?;
    let comp_act = model.add_token(ctx, comp, 0, 1)?;
    model.set_field_value(act(ctx, key_act), dot.standard.value, 2.0)?;
    model.set_field_value(act(ctx, query_act), dot.standard.value, 3.0)?;

    let key_link = model.create_link(ctx, key_comp, key_act, comp_act)?;
    let query_link = model.create_link(ctx, query_comp, query_act, comp_act)?;
    assert_eq!(model.paired_link(ctx, query_link, Relation::PairIn)?, key_link);

    assert_eq!(model.get_field_value(act(ctx, comp_act), dot.comp_net)?, 6.0);
    assert_eq!(model.get_field_value(act(ctx, comp_act), dot.comp_value)?, 6.0);

    // a change on the key side travels across PAIR_OUT into the product
    model.set_field_value(act(ctx, key_act), dot.standard.value, 4.0)?;
    assert_eq!(model.get_field_value(act(ctx, comp_act), dot.comp_net)?, 12.0);
    Ok(())
}

#[test]
fn test_removing_paired_link_resets_product() -> anyhow::Result<()> {
    let dot = dot_product_types();
    let mut model = Model::new(Arc::clone(&dot.schema))?;
    let key = model.instantiate_neuron(dot.key)?;
    let query = model.instantiate_neuron(dot.query)?;
    let comp = model.instantiate_neuron(dot.comp)?;
    let key_comp = model.instantiate_synapse(dot.key_comp, key, comp)?;
    let query_comp = model.instantiate_synapse(dot.query_comp, query, comp)?;

    let ctx = model.create_context();
    let key_act = model.add_token(ctx, key, 0, 1)?;
    let query_act = model.add_token(ctx, query, 0, 1)?;
    let comp_act = model.add_token(ctx, comp, 0, 1)?;
    model.set_field_value(act(ctx, key_act), dot.standard.value, 2.0)?;
    model.set_field_value(act(ctx, query_act), dot.standard.value, 3.0)?;

    let key_link = model.create_link(ctx, key_comp, key_act, comp_act)?;
    let query_link = model.create_link(ctx, query_comp, query_act, comp_act)?;
    assert_eq!(model.get_field_value(act(ctx, comp_act), dot.comp_net)?, 6.0);

    model.remove_link(ctx, key_link)?;
    assert!(matches!(
        model.paired_link(ctx, query_link, Relation::PairIn),
        Err(Error::UnsetPairRelation(Relation::PairIn))
    ));
    // the product lost its PAIR_IN operand and falls back to its default
    assert_eq!(model.get_field_value(act(ctx, comp_act), dot.comp_net)?, 0.0);
    assert_eq!(model.get_field_value(act(ctx, comp_act), dot.comp_value)?, 0.0);

    let err = model
        .set_field_value(act(ctx, query_act), dot.standard.value, 5.0)
        .unwrap_err();
    assert!(matches!(err, Error::UnsetPairRelation(Relation::PairIn)), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::Evaluation);
    assert_eq!(model.get_field_value(act(ctx, comp_act), dot.comp_net)?, 0.0);
    Ok(())
}

#[test]
fn test_latent_linking_joins_key_and_query() {
    let dot = dot_product_types();
    let mut model = Model::new(Arc::clone(&dot.schema)).unwrap();
    let key = model.instantiate_neuron(dot.key).unwrap();
    let query = model.instantiate_neuron(dot.query).unwrap();
    let comp = model.instantiate_neuron(dot.comp).unwrap();
    model.instantiate_synapse(dot.key_comp, key, comp).unwrap();
    model.instantiate_synapse(dot.query_comp, query, comp).unwrap();

    let ctx = model.create_context();
    let key_act = model.add_token(ctx, key, 0, 7).unwrap();
    let query_act = model.add_token(ctx, query, 0, 7).unwrap();
    // setting the values fires both through the inherited firing rule
    model.set_field_value(act(ctx, key_act), dot.standard.value, 2.0).unwrap();
    model.set_field_value(act(ctx, query_act), dot.standard.value, 3.0).unwrap();
    model.process(ctx).unwrap();

    let context = model.context(ctx).unwrap();
    let comps = context.activations_of(comp);
    assert_eq!(comps.len(), 1, "both sides share one comp activation");
    let comp_act = comps[0];
    assert_eq!(context.activation(comp_act).unwrap().binding_signal(0), Some(7));
    assert_eq!(context.activation(comp_act).unwrap().input_links().len(), 2);
    assert_eq!(model.get_field_value(act(ctx, comp_act), dot.comp_net).unwrap(), 6.0);
}

#[test]
fn test_latent_linking_skips_other_tokens() {
    let dot = dot_product_types();
    let mut model = Model::new(Arc::clone(&dot.schema)).unwrap();
    let key = model.instantiate_neuron(dot.key).unwrap();
    let query = model.instantiate_neuron(dot.query).unwrap();
    let comp = model.instantiate_neuron(dot.comp).unwrap();
    model.instantiate_synapse(dot.key_comp, key, comp).unwrap();
    model.instantiate_synapse(dot.query_comp, query, comp).unwrap();

    let ctx = model.create_context();
    let key_act = model.add_token(ctx, key, 0, 1).unwrap();
    let query_act = model.add_token(ctx, query, 0, 2).unwrap();
    model.set_field_value(act(ctx, key_act), dot.standard.value, 2.0).unwrap();
    model.set_field_value(act(ctx, query_act), dot.standard.value, 3.0).unwrap();
    model.process(ctx).unwrap();

    assert!(model.context(ctx).unwrap().activations_of(comp).is_empty());
}

//! Field propagation tests over plain linked objects
//!
//! Order independence of sum/div, overriding and activation functions.
//! Run with: cargo test --test propagation_tests

use fieldnet::fields::{ActivationFunction, FieldId, ObjectGraph, ObjectId, Relation, Role, TypeId, TypeRegistry};
use fieldnet::ErrorKind;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
enum LinkAt {
    BeforeWrites,
    BetweenWrites,
    AfterWrites,
}

const ORDERINGS: [LinkAt; 3] = [LinkAt::BeforeWrites, LinkAt::BetweenWrites, LinkAt::AfterWrites];

struct TwoTypes {
    registry: TypeRegistry,
    type_a: TypeId,
    type_b: TypeId,
    a: FieldId,
    b: FieldId,
}

fn two_types() -> TwoTypes {
    let mut registry = TypeRegistry::new();
    let type_a = registry.add_type("A", Role::Object);
    let type_b = registry.add_type("B", Role::Object);
    let a = registry.input_field(type_a, "a").id();
    let b = registry.input_field(type_a, "b").id();
    TwoTypes {
        registry,
        type_a,
        type_b,
        a,
        b,
    }
}

fn link(graph: &mut ObjectGraph, from: ObjectId, to: ObjectId) {
    graph.link_objects(from, to).unwrap();
    graph.init_fields(to).unwrap();
}

/// Writes a=50, b=2 with the link created at `at`; returns the final c and
/// the results of both writes.
fn run(t: TwoTypes, c: FieldId, at: LinkAt) -> (f64, Vec<fieldnet::Result<()>>) {
    let mut graph = ObjectGraph::new(Arc::new(t.registry)).unwrap();
    let oa = graph.instantiate(t.type_a).unwrap();
    let ob = graph.instantiate(t.type_b).unwrap();
    graph.init_fields(oa).unwrap();
    graph.init_fields(ob).unwrap();

    let mut writes = Vec::new();
    if at == LinkAt::BeforeWrites {
        link(&mut graph, oa, ob);
    }
    writes.push(graph.set_field_value(oa, t.a, 50.0));
    if at == LinkAt::BetweenWrites {
        link(&mut graph, oa, ob);
    }
    writes.push(graph.set_field_value(oa, t.b, 2.0));
    if at == LinkAt::AfterWrites {
        link(&mut graph, oa, ob);
    }
    (graph.get_field_value(ob, c).unwrap(), writes)
}

#[test]
fn test_sum_is_order_independent() {
    for at in ORDERINGS {
        let mut t = two_types();
        let (a, b) = (t.a, t.b);
        let c = t
            .registry
            .sum(t.type_b, "c")
            .input(Relation::From, a, 0)
            .input(Relation::From, b, 1)
            .id();
        t.registry.flatten_type_hierarchy().unwrap();

        let (value, writes) = run(t, c, at);
        assert_eq!(value, 52.0, "link {at:?}");
        assert!(writes.iter().all(Result::is_ok), "link {at:?}");
    }
}

#[test]
fn test_sum_example() {
    let mut t = two_types();
    let (a, b) = (t.a, t.b);
    let c = t
        .registry
        .sum(t.type_b, "c")
        .input(Relation::From, a, 0)
        .input(Relation::From, b, 1)
        .id();
    t.registry.flatten_type_hierarchy().unwrap();

    let mut graph = ObjectGraph::new(Arc::new(t.registry)).unwrap();
    let oa = graph.instantiate(t.type_a).unwrap();
    let ob = graph.instantiate(t.type_b).unwrap();
    link(&mut graph, oa, ob);
    graph.set_field_value(oa, a, 50.0).unwrap();
    graph.set_field_value(oa, b, 20.0).unwrap();

    assert_eq!(graph.get_field_value(ob, c).unwrap(), 70.0);
}

#[test]
fn test_division_is_order_independent() {
    for at in ORDERINGS {
        let mut t = two_types();
        let (a, b) = (t.a, t.b);
        let c = t
            .registry
            .div(t.type_b, "c")
            .input(Relation::From, a, 0)
            .input(Relation::From, b, 1)
            .id();
        t.registry.flatten_type_hierarchy().unwrap();

        let (value, writes) = run(t, c, at);
        assert_eq!(value, 25.0, "link {at:?}");

        if at == LinkAt::BeforeWrites {
            // a=50 over b=0 is reported to the writer; b=2 then settles c
            let err = writes[0].as_ref().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Evaluation);
            assert!(writes[1].is_ok());
        } else {
            assert!(writes.iter().all(Result::is_ok), "link {at:?}");
        }
    }
}

#[test]
fn test_override_without_inheritance_feeds_parent_readers() {
    let mut registry = TypeRegistry::new();
    let input_parent = registry.add_type("inputParent", Role::Object);
    let input_child = registry.add_type("inputChild", Role::Object);
    let output = registry.add_type("output", Role::Object);

    let parent_field = registry.input_field(input_parent, "inputParentField").id();
    let child_field = registry
        .input_field(input_child, "inputChildField")
        .overrides(parent_field)
        .id();
    let product = registry
        .mul(output, "output")
        .input(Relation::From, parent_field, 0)
        .input(Relation::From, parent_field, 1)
        .id();
    registry.flatten_type_hierarchy().unwrap();

    let mut graph = ObjectGraph::new(Arc::new(registry)).unwrap();
    let input = graph.instantiate(input_child).unwrap();
    let out = graph.instantiate(output).unwrap();
    graph.set_field_value(input, child_field, 5.0).unwrap();
    link(&mut graph, input, out);

    assert_eq!(graph.get_field_value(out, product).unwrap(), 25.0);

    // later writes reach the reader through the overridden parent field
    graph.set_field_value(input, child_field, 3.0).unwrap();
    assert_eq!(graph.get_field_value(out, product).unwrap(), 9.0);
}

#[test]
fn test_child_type_reads_parent_field_through_self() {
    let mut registry = TypeRegistry::new();
    let input = registry.add_type("input", Role::Object);
    let output_parent = registry.add_type("outputParent", Role::Object);
    let output_child = registry.add_type("outputChild", Role::Object);
    registry.add_parent(output_child, output_parent).unwrap();

    let input_field = registry.input_field(input, "inputField").id();
    let parent_field = registry
        .sum(output_parent, "outputParentField")
        .input(Relation::From, input_field, 0)
        .input(Relation::From, input_field, 1)
        .id();
    let child_field = registry
        .exp(output_child, "outputChildField")
        .input(Relation::Self_, parent_field, 0)
        .id();
    registry.flatten_type_hierarchy().unwrap();

    for link_first in [true, false] {
        let mut graph = ObjectGraph::new(Arc::new(registry.clone())).unwrap();
        let i = graph.instantiate(input).unwrap();
        let o = graph.instantiate(output_child).unwrap();
        if link_first {
            link(&mut graph, i, o);
        }
        graph.set_field_value(i, input_field, 2.5).unwrap();
        if !link_first {
            link(&mut graph, i, o);
        }

        assert_eq!(graph.get_field_value(o, parent_field).unwrap(), 5.0);
        let value = graph.get_field_value(o, child_field).unwrap();
        assert!((value - 148.4131591025766).abs() < 1e-9, "got {value}");
    }
}

#[test]
fn test_activation_function_tolerance_damps_small_changes() {
    let mut registry = TypeRegistry::new();
    let ty = registry.add_type("T", Role::Object);
    let net = registry.input_field(ty, "net").id();
    let value = registry
        .field_activation_func(ty, "value", ActivationFunction::Tanh, Some(0.1))
        .input(Relation::Self_, net, 0)
        .id();
    registry.flatten_type_hierarchy().unwrap();

    let mut graph = ObjectGraph::new(Arc::new(registry)).unwrap();
    let obj = graph.instantiate(ty).unwrap();
    graph.init_fields(obj).unwrap();

    graph.set_field_value(obj, net, 1.0).unwrap();
    let settled = graph.get_field_value(obj, value).unwrap();
    assert_eq!(settled, 1.0_f64.tanh());

    // tanh(1.01) differs from tanh(1.0) by less than the tolerance
    graph.set_field_value(obj, net, 1.01).unwrap();
    assert_eq!(graph.get_field_value(obj, value).unwrap(), settled);
}

#[test]
fn test_mul_waits_for_both_operands() {
    let mut t = two_types();
    let (a, b) = (t.a, t.b);
    let c = t
        .registry
        .mul(t.type_b, "c")
        .input(Relation::From, a, 0)
        .input(Relation::From, b, 1)
        .default_value(-1.0)
        .id();
    t.registry.flatten_type_hierarchy().unwrap();

    let mut graph = ObjectGraph::new(Arc::new(t.registry)).unwrap();
    let ob = graph.instantiate(t.type_b).unwrap();
    graph.init_fields(ob).unwrap();

    // nothing linked: no operand resolves and the default stays
    assert_eq!(graph.get_field_value(ob, c).unwrap(), -1.0);
}

#[test]
fn test_unlinked_operands_reset_to_default() {
    let mut t = two_types();
    let (a, b) = (t.a, t.b);
    let c = t
        .registry
        .mul(t.type_b, "c")
        .input(Relation::From, a, 0)
        .input(Relation::From, b, 1)
        .default_value(-1.0)
        .id();
    t.registry.flatten_type_hierarchy().unwrap();

    let mut graph = ObjectGraph::new(Arc::new(t.registry)).unwrap();
    let oa = graph.instantiate(t.type_a).unwrap();
    let ob = graph.instantiate(t.type_b).unwrap();
    graph.init_fields(oa).unwrap();
    graph.init_fields(ob).unwrap();
    link(&mut graph, oa, ob);
    graph.set_field_value(oa, a, 3.0).unwrap();
    graph.set_field_value(oa, b, 4.0).unwrap();
    assert_eq!(graph.get_field_value(ob, c).unwrap(), 12.0);

    graph.unlink_objects(oa, ob).unwrap();
    graph.init_fields(ob).unwrap();
    assert_eq!(graph.get_field_value(ob, c).unwrap(), -1.0);
}

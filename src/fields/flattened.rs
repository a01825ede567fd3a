//! Flattening of the type hierarchy into dense per-type field tables.
//!
//! ## Algorithm
//!
//! 1. Build the inheritance DAG (parent → child) and sort it topologically.
//!    A cycle is a build error.
//! 2. Build the same-object field graph (SELF dependencies, proxy aliases,
//!    overrides) and split it into strongly connected components. A cycle
//!    without an activation-function field is a build error. The component
//!    order gives each field a rank used for in-object initialisation.
//! 3. For every type, ancestors first: take the parents' slot layouts in
//!    order (deduplicated by field identity), append the type's own fields,
//!    then map overridden and proxy fields onto the slots they resolve to.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use super::definition::{Combinator, FieldDefinition, FieldId};
use super::registry::{TypeId, TypeRegistry};
use super::relation::Relation;
use crate::error::{Error, Result};

// ============================================================================
// Result type
// ============================================================================

/// The two field tables of one type.
///
/// The input side is the storage layout: one slot per real field, proxies
/// excluded. The output side maps every field definition readable on the type
/// (inherited, overridden and proxy ones included) to its storage slot.
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedType {
    type_id: TypeId,
    ancestors: BTreeSet<TypeId>,
    slots: Vec<FieldId>,
    input_index: HashMap<FieldId, usize>,
    output_index: HashMap<FieldId, usize>,
    aliases: Vec<Vec<FieldId>>,
    by_name: BTreeMap<String, FieldId>,
    init_order: Vec<usize>,
}

impl FlattenedType {
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// This type and all of its ancestors.
    pub fn ancestors(&self) -> &BTreeSet<TypeId> {
        &self.ancestors
    }

    pub fn is_a(&self, ancestor: TypeId) -> bool {
        self.ancestors.contains(&ancestor)
    }

    /// Size of the input side, i.e. of every instance's value array.
    pub fn number_of_fields(&self) -> usize {
        self.slots.len()
    }

    /// Input-side index: only fields that own a slot on this type.
    pub fn input_index(&self, field: FieldId) -> Option<usize> {
        self.input_index.get(&field).copied()
    }

    /// Output-side index: any field readable on this type.
    pub fn field_index(&self, field: FieldId) -> Option<usize> {
        self.output_index.get(&field).copied()
    }

    /// Field that owns `slot`.
    pub fn canonical_field(&self, slot: usize) -> Option<FieldId> {
        self.slots.get(slot).copied()
    }

    /// Every field definition that resolves to `slot`.
    pub fn aliases(&self, slot: usize) -> &[FieldId] {
        self.aliases.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn field_by_name(&self, name: &str) -> Option<FieldId> {
        self.by_name.get(name).copied()
    }

    /// Input side in slot order.
    pub fn fields(&self) -> &[FieldId] {
        &self.slots
    }

    /// Number of distinct field definitions readable on this type.
    pub fn readable_count(&self) -> usize {
        self.output_index.len()
    }

    /// Slots of computed fields, ordered so SELF dependencies come first.
    pub fn init_order(&self) -> &[usize] {
        &self.init_order
    }
}

// ============================================================================
// Flattening
// ============================================================================

pub(crate) fn flatten_all(registry: &TypeRegistry) -> Result<HashMap<TypeId, FlattenedType>> {
    let order = type_order(registry)?;
    validate_fields(registry)?;
    let rank = field_ranks(registry)?;

    let mut done: HashMap<TypeId, FlattenedType> = HashMap::new();
    for ty in order {
        let flat = flatten_type(registry, ty, &done, &rank)?;
        debug!(
            "Flattened {}: {} slots, {} readable fields",
            registry.type_name(ty),
            flat.number_of_fields(),
            flat.readable_count()
        );
        done.insert(ty, flat);
    }
    Ok(done)
}

/// Topological order of the inheritance graph, ancestors first.
fn type_order(registry: &TypeRegistry) -> Result<Vec<TypeId>> {
    let mut graph: DiGraph<TypeId, ()> = DiGraph::new();
    let mut id_to_index: HashMap<TypeId, NodeIndex> = HashMap::new();

    for def in registry.types() {
        let idx = graph.add_node(def.id());
        id_to_index.insert(def.id(), idx);
    }
    for def in registry.types() {
        for parent in def.parents() {
            let (Some(&from), Some(&to)) = (id_to_index.get(parent), id_to_index.get(&def.id()))
            else {
                return Err(Error::TypeNotFound(format!("#{}", parent.0)));
            };
            graph.add_edge(from, to, ());
        }
    }

    toposort(&graph, None)
        .map(|nodes| nodes.into_iter().map(|n| graph[n]).collect())
        .map_err(|cycle| Error::CyclicInheritance(registry.type_name(graph[cycle.node_id()]).into()))
}

/// Per-field checks that do not depend on the type a field ends up on.
fn validate_fields(registry: &TypeRegistry) -> Result<()> {
    for def in registry.field_defs() {
        let role = registry.type_def(def.owner())?.role();
        for input in def.inputs() {
            registry.field_def(input.source)?;
            if input.relation.target_role(role).is_none() {
                return Err(Error::InvalidRelation {
                    relation: input.relation,
                    field: def.name().to_string(),
                });
            }
        }
        if def.proxy_target().is_some() {
            final_target(registry, def)?;
        }
    }
    Ok(())
}

/// Follow a proxy chain to the real field it ends on.
fn final_target(registry: &TypeRegistry, proxy: &FieldDefinition) -> Result<FieldId> {
    let mut seen = HashSet::new();
    let mut current = proxy;
    while let Some(target) = current.proxy_target() {
        if !seen.insert(current.id()) {
            return Err(Error::ProxyCycle(proxy.name().to_string()));
        }
        current = registry
            .field_def(target)
            .map_err(|_| Error::UnresolvedProxy(proxy.name().to_string()))?;
    }
    Ok(current.id())
}

/// Rank every field so that same-object dependencies precede their readers.
fn field_ranks(registry: &TypeRegistry) -> Result<HashMap<FieldId, usize>> {
    let defs = registry.field_defs();
    let mut graph: DiGraph<FieldId, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = defs.iter().map(|d| graph.add_node(d.id())).collect();

    for def in defs {
        let to = nodes[def.id().index()];
        for input in def.inputs() {
            if input.relation == Relation::Self_ {
                graph.add_edge(nodes[input.source.index()], to, ());
            }
        }
        if let Some(target) = def.proxy_target() {
            graph.add_edge(nodes[target.index()], to, ());
        }
        if let Some(parent) = def.overrides() {
            if let Some(&from) = nodes.get(parent.index()) {
                graph.add_edge(to, from, ());
            }
        }
    }

    let mut rank = HashMap::new();
    // tarjan_scc yields components in reverse topological order
    for scc in tarjan_scc(&graph).into_iter().rev() {
        let cyclic = scc.len() > 1 || graph.contains_edge(scc[0], scc[0]);
        if cyclic {
            let damped = scc.iter().any(|n| {
                matches!(
                    defs[graph[*n].index()].combinator(),
                    Combinator::ActivationFunc { .. }
                )
            });
            if !damped {
                let mut names: Vec<&str> = scc.iter().map(|n| registry.field_name(graph[*n])).collect();
                names.sort_unstable();
                return Err(Error::CyclicFieldDependency(names.join(" -> ")));
            }
        }
        let mut members: Vec<FieldId> = scc.iter().map(|n| graph[*n]).collect();
        members.sort();
        for field in members {
            let next = rank.len();
            rank.insert(field, next);
        }
    }
    Ok(rank)
}

fn flatten_type(
    registry: &TypeRegistry,
    ty: TypeId,
    done: &HashMap<TypeId, FlattenedType>,
    rank: &HashMap<FieldId, usize>,
) -> Result<FlattenedType> {
    let def = registry.type_def(ty)?;
    let type_name = def.name().to_string();

    let mut ancestors = BTreeSet::from([ty]);
    for parent in def.parents() {
        if let Some(flat) = done.get(parent) {
            ancestors.extend(flat.ancestors.iter().copied());
        }
    }

    let mut visible: BTreeSet<FieldId> = BTreeSet::new();
    for t in &ancestors {
        visible.extend(registry.type_def(*t)?.fields().iter().copied());
    }

    // Overrides: parent field -> most derived overriding field
    let mut overrider: HashMap<FieldId, FieldId> = HashMap::new();
    for &f in &visible {
        let field = registry.field_def(f)?;
        let Some(parent) = field.overrides() else {
            continue;
        };
        match overrider.get(&parent).copied() {
            None => {
                overrider.insert(parent, f);
            }
            Some(prev) => {
                let prev_owner = registry.field_def(prev)?.owner();
                if registry.is_a(field.owner(), prev_owner) {
                    overrider.insert(parent, f);
                } else if !registry.is_a(prev_owner, field.owner()) {
                    return Err(Error::ConflictingOverride {
                        type_name,
                        field: registry.field_name(parent).to_string(),
                    });
                }
            }
        }
    }
    let resolve = |mut f: FieldId| -> Result<FieldId> {
        for _ in 0..=overrider.len() {
            match overrider.get(&f) {
                Some(&c) => f = c,
                None => return Ok(f),
            }
        }
        Err(Error::ConflictingOverride {
            type_name: type_name.clone(),
            field: registry.field_name(f).to_string(),
        })
    };

    // Storage layout: parents' layouts first, then own fields
    let mut slots: Vec<FieldId> = Vec::new();
    let mut placed: HashSet<FieldId> = HashSet::new();
    for parent in def.parents() {
        if let Some(flat) = done.get(parent) {
            for &f in &flat.slots {
                let r = resolve(f)?;
                if placed.insert(r) {
                    slots.push(r);
                }
            }
        }
    }
    let mut rest: Vec<FieldId> = def.fields().to_vec();
    rest.extend(visible.iter().copied());
    for f in rest {
        if registry.field_def(f)?.proxy_target().is_some() {
            continue;
        }
        let r = resolve(f)?;
        if placed.insert(r) {
            slots.push(r);
        }
    }

    let input_index: HashMap<FieldId, usize> =
        slots.iter().enumerate().map(|(i, f)| (*f, i)).collect();

    // Output side: every visible real field, then overridden ancestors of
    // canonical fields, then proxies whose target is readable here
    let mut output_index: HashMap<FieldId, usize> = HashMap::new();
    for &f in &visible {
        if registry.field_def(f)?.proxy_target().is_none() {
            let canonical = resolve(f)?;
            let slot = input_index
                .get(&canonical)
                .copied()
                .ok_or_else(|| Error::FieldNotFound(registry.field_name(canonical).to_string()))?;
            output_index.insert(f, slot);
        }
    }
    for (slot, &c) in slots.iter().enumerate() {
        let mut parent = registry.field_def(c)?.overrides();
        while let Some(p) = parent {
            if output_index.contains_key(&p) {
                break;
            }
            output_index.insert(p, slot);
            parent = registry.field_def(p)?.overrides();
        }
    }
    let mut by_name: BTreeMap<String, FieldId> = BTreeMap::new();
    for &c in &slots {
        let name = registry.field_name(c);
        if by_name.insert(name.to_string(), c).is_some() {
            return Err(Error::FieldNameConflict {
                type_name,
                field: name.to_string(),
            });
        }
    }
    for &f in &visible {
        let field = registry.field_def(f)?;
        if field.proxy_target().is_none() {
            continue;
        }
        let target = final_target(registry, field)?;
        let Some(&slot) = output_index.get(&target) else {
            continue;
        };
        let resolved = slots[slot];
        match by_name.get(field.name()) {
            Some(&existing) if existing != resolved => {
                return Err(Error::FieldNameConflict {
                    type_name,
                    field: field.name().to_string(),
                });
            }
            Some(_) => {}
            None => {
                by_name.insert(field.name().to_string(), resolved);
            }
        }
        output_index.insert(f, slot);
    }

    let mut aliases: Vec<Vec<FieldId>> = vec![Vec::new(); slots.len()];
    for (&f, &slot) in &output_index {
        aliases[slot].push(f);
    }
    for list in &mut aliases {
        list.sort();
    }

    let mut init_order: Vec<usize> = Vec::new();
    for (slot, &c) in slots.iter().enumerate() {
        if !registry.field_def(c)?.is_input() {
            init_order.push(slot);
        }
    }
    init_order.sort_by_key(|slot| rank.get(&slots[*slot]).copied().unwrap_or(usize::MAX));

    Ok(FlattenedType {
        type_id: ty,
        ancestors,
        slots,
        input_index,
        output_index,
        aliases,
        by_name,
        init_order,
    })
}

// ============================================================================
// Tests
// ============================================================================

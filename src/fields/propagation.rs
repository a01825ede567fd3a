//! Field value propagation.
//!
//! Writes go to an input field's slot and are pushed depth-first to every
//! dependent field reachable through the reverse of the dependent's declared
//! relation. Dependents are always recomputed from scratch from the current
//! values of their inputs, so `sum` re-aggregates over whatever objects the
//! relation reaches at that moment.
//!
//! A derived field whose operands cannot be resolved falls back to its
//! default value. Direct writes report the evaluation error; initialisation
//! only logs it.
//!
//! The engine is generic over [`ObjectStore`], which owns the instances and
//! knows how to follow relations between them.

use std::fmt;

use tracing::{debug, trace};

use super::definition::{Combinator, FieldDefinition, FieldId};
use super::registry::{TypeId, TypeRegistry};
use super::relation::Relation;
use crate::error::{Error, ErrorKind, Result};

/// Storage and navigation for instances whose fields the engine computes.
pub trait ObjectStore {
    type Handle: Copy + Eq + fmt::Debug;

    fn type_of(&self, obj: Self::Handle) -> Result<TypeId>;

    fn values(&self, obj: Self::Handle) -> Result<&[f64]>;

    fn values_mut(&mut self, obj: Self::Handle) -> Result<&mut [f64]>;

    /// Objects reached from `obj` through `relation`. Unset optional
    /// relations (e.g. an unpaired PAIR_IN) yield an empty list.
    fn follow(&self, obj: Self::Handle, relation: Relation) -> Result<Vec<Self::Handle>>;

    /// Called after the value in `slot` of `obj` changed.
    fn on_change(&mut self, _obj: Self::Handle, _slot: usize) {}
}

/// How evaluation errors met during a walk are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Report the first evaluation error to the caller once the walk is done.
    Strict,
    /// Skip the field and keep going; used while initialising.
    Lenient,
}

/// Value array for a fresh instance of `ty`, populated with field defaults.
pub fn allocate(registry: &TypeRegistry, ty: TypeId) -> Result<Vec<f64>> {
    let flat = registry.flattened(ty)?;
    flat.fields()
        .iter()
        .map(|f| registry.field_def(*f).map(FieldDefinition::default_value))
        .collect()
}

pub fn get_field_value<S: ObjectStore>(
    registry: &TypeRegistry,
    store: &S,
    obj: S::Handle,
    field: FieldId,
) -> Result<f64> {
    let ty = store.type_of(obj)?;
    let slot = registry
        .flattened(ty)?
        .field_index(field)
        .ok_or_else(|| not_found(registry, ty, field))?;
    read_slot(store, obj, slot)
}

/// Write an input field and propagate the change. Evaluation errors met on
/// the way are returned after the walk; values already updated stay updated.
pub fn set_field_value<S: ObjectStore>(
    registry: &TypeRegistry,
    store: &mut S,
    obj: S::Handle,
    field: FieldId,
    value: f64,
) -> Result<()> {
    let ty = store.type_of(obj)?;
    let flat = registry.flattened(ty)?;
    let slot = flat
        .field_index(field)
        .ok_or_else(|| not_found(registry, ty, field))?;
    let canonical = flat
        .canonical_field(slot)
        .ok_or_else(|| not_found(registry, ty, field))?;
    if !registry.field_def(canonical)?.is_input() {
        return Err(Error::NotAnInputField(registry.field_name(field).to_string()));
    }

    let old = read_slot(store, obj, slot)?;
    if old == value {
        return Ok(());
    }
    write_slot(store, obj, slot, value)?;
    trace!("{:?}.{} = {}", obj, registry.field_name(field), value);
    store.on_change(obj, slot);
    propagate(registry, store, vec![(obj, slot)], Mode::Strict)
}

/// Compute every derived field of `obj` from its current inputs and push
/// the changes on. Fields whose operands are not available are reset to
/// their default. Safe to call repeatedly, e.g. after the object's relations changed.
pub fn init_fields<S: ObjectStore>(
    registry: &TypeRegistry,
    store: &mut S,
    obj: S::Handle,
) -> Result<()> {
    let flat = registry.flattened(store.type_of(obj)?)?;
    let mut changed = Vec::new();
    for &slot in flat.init_order() {
        let Some(field) = flat.canonical_field(slot) else {
            continue;
        };
        match recompute(registry, store, obj, slot, field) {
            Ok(true) => changed.push((obj, slot)),
            Ok(false) => {}
            Err(e) if e.kind() == ErrorKind::Evaluation => {
                debug!("Deferred {} on {:?}: {}", registry.field_name(field), obj, e);
                if reset(registry, store, obj, slot, field)? {
                    changed.push((obj, slot));
                }
            }
            Err(e) => return Err(e),
        }
    }
    propagate(registry, store, changed, Mode::Lenient)
}

fn propagate<S: ObjectStore>(
    registry: &TypeRegistry,
    store: &mut S,
    start: Vec<(S::Handle, usize)>,
    mode: Mode,
) -> Result<()> {
    let mut stack = start;
    let mut first_error: Option<Error> = None;

    while let Some((obj, slot)) = stack.pop() {
        let flat = registry.flattened(store.type_of(obj)?)?;
        for &source in flat.aliases(slot) {
            for dependent in registry.dependents(source) {
                for target in store.follow(obj, dependent.via)? {
                    let target_flat = registry.flattened(store.type_of(target)?)?;
                    // skip fields that are overridden or absent on the target
                    let Some(target_slot) = target_flat.input_index(dependent.field) else {
                        continue;
                    };
                    match recompute(registry, store, target, target_slot, dependent.field) {
                        Ok(true) => stack.push((target, target_slot)),
                        Ok(false) => {}
                        Err(e) if e.kind() == ErrorKind::Evaluation => {
                            match mode {
                                Mode::Strict => {
                                    debug!("Propagation error at {:?}: {}", target, e);
                                    first_error.get_or_insert(e);
                                }
                                Mode::Lenient => {
                                    debug!(
                                        "Deferred {} on {:?}: {}",
                                        registry.field_name(dependent.field),
                                        target,
                                        e
                                    );
                                }
                            }
                            if reset(registry, store, target, target_slot, dependent.field)? {
                                stack.push((target, target_slot));
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Recompute one slot. Returns whether the stored value changed.
fn recompute<S: ObjectStore>(
    registry: &TypeRegistry,
    store: &mut S,
    obj: S::Handle,
    slot: usize,
    field: FieldId,
) -> Result<bool> {
    let def = registry.field_def(field)?;
    let Some(value) = evaluate(registry, store, obj, def)? else {
        return Ok(false);
    };
    let old = read_slot(store, obj, slot)?;
    let changed = match def.combinator() {
        Combinator::ActivationFunc { tolerance, .. } => {
            value != old && (value - old).abs() >= tolerance
        }
        _ => value != old,
    };
    if changed {
        write_slot(store, obj, slot, value)?;
        trace!("{:?}.{} -> {}", obj, def.name(), value);
        store.on_change(obj, slot);
    }
    Ok(changed)
}

/// Put a slot whose field cannot be evaluated back to the field's default.
/// Returns whether the stored value changed.
fn reset<S: ObjectStore>(
    registry: &TypeRegistry,
    store: &mut S,
    obj: S::Handle,
    slot: usize,
    field: FieldId,
) -> Result<bool> {
    let default = registry.field_def(field)?.default_value();
    if read_slot(store, obj, slot)? == default {
        return Ok(false);
    }
    write_slot(store, obj, slot, default)?;
    trace!("{:?}.{} reset to {}", obj, registry.field_name(field), default);
    store.on_change(obj, slot);
    Ok(true)
}

/// Value of `def` on `obj`. `None` for fields that are never derived.
fn evaluate<S: ObjectStore>(
    registry: &TypeRegistry,
    store: &S,
    obj: S::Handle,
    def: &FieldDefinition,
) -> Result<Option<f64>> {
    let combinator = def.combinator();
    match combinator {
        Combinator::Input | Combinator::Proxy { .. } => Ok(None),
        Combinator::Sum => {
            let mut total = 0.0;
            for input in def.inputs() {
                for related in store.follow(obj, input.relation)? {
                    if let Some(v) = read_field(registry, store, related, input.source)? {
                        total += v;
                    }
                }
            }
            Ok(Some(total))
        }
        Combinator::Identity => required_operand(registry, store, obj, def, 0).map(Some),
        Combinator::Exp => Ok(Some(required_operand(registry, store, obj, def, 0)?.exp())),
        Combinator::ActivationFunc { function, .. } => {
            Ok(Some(function.f(required_operand(registry, store, obj, def, 0)?)))
        }
        Combinator::Mul | Combinator::Sub => {
            let a = required_operand(registry, store, obj, def, 0)?;
            let b = required_operand(registry, store, obj, def, 1)?;
            Ok(Some(if combinator == Combinator::Mul { a * b } else { a - b }))
        }
        Combinator::Div => {
            let dividend = required_operand(registry, store, obj, def, 0)?;
            let divisor = required_operand(registry, store, obj, def, 1)?;
            if divisor == 0.0 {
                return Err(Error::DivisionByZero(def.name().to_string()));
            }
            Ok(Some(dividend / divisor))
        }
    }
}

/// Sum of all values feeding argument position `arg`; `None` if nothing
/// resolves.
fn operand<S: ObjectStore>(
    registry: &TypeRegistry,
    store: &S,
    obj: S::Handle,
    def: &FieldDefinition,
    arg: usize,
) -> Result<Option<f64>> {
    let mut acc: Option<f64> = None;
    for input in def.inputs().iter().filter(|i| i.arg == arg) {
        for related in store.follow(obj, input.relation)? {
            if let Some(v) = read_field(registry, store, related, input.source)? {
                acc = Some(acc.unwrap_or(0.0) + v);
            }
        }
    }
    Ok(acc)
}

/// Like [`operand`], but a missing value is an evaluation error. An unset
/// pair relation is reported as such.
fn required_operand<S: ObjectStore>(
    registry: &TypeRegistry,
    store: &S,
    obj: S::Handle,
    def: &FieldDefinition,
    arg: usize,
) -> Result<f64> {
    if let Some(v) = operand(registry, store, obj, def, arg)? {
        return Ok(v);
    }
    for input in def.inputs().iter().filter(|i| i.arg == arg) {
        if matches!(input.relation, Relation::PairIn | Relation::PairOut)
            && store.follow(obj, input.relation)?.is_empty()
        {
            return Err(Error::UnsetPairRelation(input.relation));
        }
    }
    Err(Error::UnresolvedOperand(def.name().to_string()))
}

/// Value of `field` on `obj`, or `None` if that type has no such field.
fn read_field<S: ObjectStore>(
    registry: &TypeRegistry,
    store: &S,
    obj: S::Handle,
    field: FieldId,
) -> Result<Option<f64>> {
    let flat = registry.flattened(store.type_of(obj)?)?;
    match flat.field_index(field) {
        Some(slot) => read_slot(store, obj, slot).map(Some),
        None => Ok(None),
    }
}

fn read_slot<S: ObjectStore>(store: &S, obj: S::Handle, slot: usize) -> Result<f64> {
    store
        .values(obj)?
        .get(slot)
        .copied()
        .ok_or_else(|| Error::FieldNotFound(format!("slot {slot} on {obj:?}")))
}

fn write_slot<S: ObjectStore>(store: &mut S, obj: S::Handle, slot: usize, value: f64) -> Result<()> {
    let values = store.values_mut(obj)?;
    let cell = values
        .get_mut(slot)
        .ok_or_else(|| Error::FieldNotFound(format!("slot {slot} on {obj:?}")))?;
    *cell = value;
    Ok(())
}

fn not_found(registry: &TypeRegistry, ty: TypeId, field: FieldId) -> Error {
    Error::FieldNotFound(format!(
        "{} on {}",
        registry.field_name(field),
        registry.type_name(ty)
    ))
}

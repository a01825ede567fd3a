//! Plain objects connected through `From`/`To`, for driving the field engine
//! without a network around it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::definition::FieldId;
use super::propagation::{self, ObjectStore};
use super::registry::{TypeId, TypeRegistry};
use super::relation::Relation;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u64);

#[derive(Debug, Clone)]
struct Object {
    type_id: TypeId,
    values: Vec<f64>,
    from: BTreeSet<ObjectId>,
    to: BTreeSet<ObjectId>,
}

/// Owner of a set of plain objects sharing one frozen registry.
#[derive(Debug)]
pub struct ObjectGraph {
    registry: Arc<TypeRegistry>,
    objects: BTreeMap<ObjectId, Object>,
    next_id: u64,
}

impl ObjectGraph {
    pub fn new(registry: Arc<TypeRegistry>) -> Result<Self> {
        if !registry.is_flattened() {
            return Err(Error::NotFlattened);
        }
        Ok(Self {
            registry,
            objects: BTreeMap::new(),
            next_id: 0,
        })
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn instantiate(&mut self, ty: TypeId) -> Result<ObjectId> {
        let values = propagation::allocate(&self.registry, ty)?;
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.insert(
            id,
            Object {
                type_id: ty,
                values,
                from: BTreeSet::new(),
                to: BTreeSet::new(),
            },
        );
        Ok(id)
    }

    /// Connect `from` to `to`: `to` reaches `from` through `From`, `from`
    /// reaches `to` through `To`. Call [`ObjectGraph::init_fields`] on the
    /// side whose fields read across the new edge.
    pub fn link_objects(&mut self, from: ObjectId, to: ObjectId) -> Result<()> {
        self.object(to)?;
        self.object_mut(from)?.to.insert(to);
        self.object_mut(to)?.from.insert(from);
        Ok(())
    }

    /// Remove the edge and re-aggregate the fields of `to`.
    pub fn unlink_objects(&mut self, from: ObjectId, to: ObjectId) -> Result<()> {
        self.object(to)?;
        self.object_mut(from)?.to.remove(&to);
        self.object_mut(to)?.from.remove(&from);
        self.init_fields(to)
    }

    pub fn init_fields(&mut self, obj: ObjectId) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        propagation::init_fields(&registry, self, obj)
    }

    pub fn set_field_value(&mut self, obj: ObjectId, field: FieldId, value: f64) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        propagation::set_field_value(&registry, self, obj, field, value)
    }

    pub fn get_field_value(&self, obj: ObjectId, field: FieldId) -> Result<f64> {
        propagation::get_field_value(&self.registry, self, obj, field)
    }

    fn object(&self, id: ObjectId) -> Result<&Object> {
        self.objects
            .get(&id)
            .ok_or(Error::ObjectNotFound(id.0))
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.objects
            .get_mut(&id)
            .ok_or(Error::ObjectNotFound(id.0))
    }
}

impl ObjectStore for ObjectGraph {
    type Handle = ObjectId;

    fn type_of(&self, obj: ObjectId) -> Result<TypeId> {
        Ok(self.object(obj)?.type_id)
    }

    fn values(&self, obj: ObjectId) -> Result<&[f64]> {
        Ok(&self.object(obj)?.values)
    }

    fn values_mut(&mut self, obj: ObjectId) -> Result<&mut [f64]> {
        Ok(&mut self.object_mut(obj)?.values)
    }

    fn follow(&self, obj: ObjectId, relation: Relation) -> Result<Vec<ObjectId>> {
        let object = self.object(obj)?;
        Ok(match relation {
            Relation::Self_ => vec![obj],
            Relation::From => object.from.iter().copied().collect(),
            Relation::To => object.to.iter().copied().collect(),
            _ => Vec::new(),
        })
    }
}

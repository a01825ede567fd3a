//! The type registry: an arena of types and field definitions that is built
//! up during a build phase and then frozen by
//! [`TypeRegistry::flatten_type_hierarchy`].

use std::collections::{BTreeSet, HashMap};

use tracing::info;

use super::activation_function::ActivationFunction;
use super::definition::{Combinator, FieldBuilder, FieldDefinition, FieldId};
use super::flattened::{self, FlattenedType};
use super::relation::{Relation, Role};
use crate::error::{Error, Result};

/// Arena index of a type inside its [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub(crate) id: TypeId,
    pub(crate) name: String,
    pub(crate) role: Role,
    pub(crate) parents: Vec<TypeId>,
    pub(crate) fields: Vec<FieldId>,
}

impl TypeDef {
    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn parents(&self) -> &[TypeId] {
        &self.parents
    }

    /// Fields declared directly on this type, in declaration order.
    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }
}

/// A field that must be recomputed when its source changes, together with the
/// relation that leads from the source object to the dependent object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dependent {
    pub field: FieldId,
    pub via: Relation,
}

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<TypeDef>,
    fields: Vec<FieldDefinition>,
    flattened: HashMap<TypeId, FlattenedType>,
    dependents: HashMap<FieldId, Vec<Dependent>>,
    default_tolerance: f64,
    frozen: bool,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tolerance used by [`TypeRegistry::field_activation_func`] when none is given.
    pub fn with_default_tolerance(tolerance: f64) -> Self {
        Self {
            default_tolerance: tolerance,
            ..Self::default()
        }
    }

    // ========================================================================
    // Types
    // ========================================================================

    pub fn add_type(&mut self, name: impl Into<String>, role: Role) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeDef {
            id,
            name: name.into(),
            role,
            parents: Vec::new(),
            fields: Vec::new(),
        });
        self.frozen = false;
        id
    }

    pub fn add_parent(&mut self, child: TypeId, parent: TypeId) -> Result<()> {
        let parent_def = self.type_def(parent)?;
        let parent_role = parent_def.role;
        let parent_name = parent_def.name.clone();

        let child_def = self.type_def_mut(child)?;
        if child_def.role != parent_role {
            return Err(Error::RoleMismatch {
                child: child_def.name.clone(),
                parent: parent_name,
            });
        }
        if !child_def.parents.contains(&parent) {
            child_def.parents.push(parent);
        }
        self.frozen = false;
        Ok(())
    }

    pub fn type_def(&self, id: TypeId) -> Result<&TypeDef> {
        self.types
            .get(id.index())
            .ok_or_else(|| Error::TypeNotFound(format!("#{}", id.0)))
    }

    fn type_def_mut(&mut self, id: TypeId) -> Result<&mut TypeDef> {
        self.types
            .get_mut(id.index())
            .ok_or_else(|| Error::TypeNotFound(format!("#{}", id.0)))
    }

    pub fn type_by_name(&self, name: &str) -> Option<TypeId> {
        self.types.iter().find(|t| t.name == name).map(|t| t.id)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.iter()
    }

    pub fn type_name(&self, id: TypeId) -> &str {
        self.types
            .get(id.index())
            .map(|t| t.name.as_str())
            .unwrap_or("<unknown>")
    }

    /// True if `ty` is `ancestor` or inherits from it.
    pub fn is_a(&self, ty: TypeId, ancestor: TypeId) -> bool {
        if ty == ancestor {
            return true;
        }
        if let Some(flat) = self.flattened.get(&ty) {
            return flat.ancestors().contains(&ancestor);
        }
        self.ancestors(ty).contains(&ancestor)
    }

    /// All ancestors of `ty`, including `ty` itself. Tolerates cycles.
    pub fn ancestors(&self, ty: TypeId) -> BTreeSet<TypeId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![ty];
        while let Some(t) = stack.pop() {
            if !seen.insert(t) {
                continue;
            }
            if let Some(def) = self.types.get(t.index()) {
                stack.extend(def.parents.iter().copied());
            }
        }
        seen
    }

    // ========================================================================
    // Field factories
    // ========================================================================

    fn add_field(&mut self, owner: TypeId, name: &str, combinator: Combinator) -> FieldBuilder<'_> {
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(FieldDefinition {
            id,
            owner,
            name: name.to_string(),
            combinator,
            inputs: Vec::new(),
            overrides: None,
            default_value: 0.0,
        });
        if let Some(def) = self.types.get_mut(owner.index()) {
            def.fields.push(id);
        }
        self.frozen = false;
        FieldBuilder::new(self, id)
    }

    pub fn input_field(&mut self, owner: TypeId, name: &str) -> FieldBuilder<'_> {
        self.add_field(owner, name, Combinator::Input)
    }

    pub fn identity(&mut self, owner: TypeId, name: &str) -> FieldBuilder<'_> {
        self.add_field(owner, name, Combinator::Identity)
    }

    pub fn sum(&mut self, owner: TypeId, name: &str) -> FieldBuilder<'_> {
        self.add_field(owner, name, Combinator::Sum)
    }

    pub fn mul(&mut self, owner: TypeId, name: &str) -> FieldBuilder<'_> {
        self.add_field(owner, name, Combinator::Mul)
    }

    pub fn sub(&mut self, owner: TypeId, name: &str) -> FieldBuilder<'_> {
        self.add_field(owner, name, Combinator::Sub)
    }

    pub fn div(&mut self, owner: TypeId, name: &str) -> FieldBuilder<'_> {
        self.add_field(owner, name, Combinator::Div)
    }

    pub fn exp(&mut self, owner: TypeId, name: &str) -> FieldBuilder<'_> {
        self.add_field(owner, name, Combinator::Exp)
    }

    /// `tolerance: None` falls back to the registry's default tolerance.
    pub fn field_activation_func(
        &mut self,
        owner: TypeId,
        name: &str,
        function: ActivationFunction,
        tolerance: Option<f64>,
    ) -> FieldBuilder<'_> {
        let tolerance = tolerance.unwrap_or(self.default_tolerance);
        self.add_field(
            owner,
            name,
            Combinator::ActivationFunc {
                function,
                tolerance,
            },
        )
    }

    pub fn proxy_field(&mut self, owner: TypeId, name: &str, target: FieldId) -> FieldBuilder<'_> {
        self.add_field(owner, name, Combinator::Proxy { target })
    }

    /// Reopen an existing field to declare further dependencies.
    pub fn field(&mut self, id: FieldId) -> FieldBuilder<'_> {
        self.frozen = false;
        FieldBuilder::new(self, id)
    }

    pub fn field_def(&self, id: FieldId) -> Result<&FieldDefinition> {
        self.fields
            .get(id.index())
            .ok_or_else(|| Error::FieldNotFound(format!("#{}", id.0)))
    }

    pub(crate) fn field_def_mut(&mut self, id: FieldId) -> Option<&mut FieldDefinition> {
        self.fields.get_mut(id.index())
    }

    pub fn field_defs(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn field_name(&self, id: FieldId) -> &str {
        self.fields
            .get(id.index())
            .map(|f| f.name.as_str())
            .unwrap_or("<unknown>")
    }

    // ========================================================================
    // Flattening
    // ========================================================================

    /// Compute the flattened field tables of every registered type.
    ///
    /// Idempotent. Registering more types or fields afterwards unfreezes the
    /// registry; calling this again recomputes every table. On error the
    /// registry stays unfrozen and exposes no tables.
    pub fn flatten_type_hierarchy(&mut self) -> Result<()> {
        self.flattened.clear();
        self.dependents.clear();
        self.frozen = false;

        let flattened = flattened::flatten_all(self)?;

        let mut dependents: HashMap<FieldId, Vec<Dependent>> = HashMap::new();
        for def in &self.fields {
            for input in &def.inputs {
                dependents.entry(input.source).or_default().push(Dependent {
                    field: def.id,
                    via: input.relation.reverse(),
                });
            }
        }

        info!(
            "Flattened {} types ({} field definitions)",
            flattened.len(),
            self.fields.len()
        );
        self.flattened = flattened;
        self.dependents = dependents;
        self.frozen = true;
        Ok(())
    }

    pub fn is_flattened(&self) -> bool {
        self.frozen
    }

    pub fn flattened(&self, ty: TypeId) -> Result<&FlattenedType> {
        if !self.frozen {
            return Err(Error::NotFlattened);
        }
        self.flattened
            .get(&ty)
            .ok_or_else(|| Error::TypeNotFound(format!("#{}", ty.0)))
    }

    /// Fields that declared `source` as one of their inputs.
    pub fn dependents(&self, source: FieldId) -> &[Dependent] {
        self.dependents
            .get(&source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

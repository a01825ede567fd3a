//! Field definitions and the builder used to declare their dependencies.

use super::activation_function::ActivationFunction;
use super::registry::{TypeId, TypeRegistry};
use super::relation::Relation;

/// Arena index of a [`FieldDefinition`] inside its [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub(crate) u32);

impl FieldId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a field's value is derived from its inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Combinator {
    /// Externally settable, no formula.
    Input,
    Identity,
    Sum,
    Mul,
    Sub,
    Div,
    Exp,
    ActivationFunc {
        function: ActivationFunction,
        tolerance: f64,
    },
    /// Alias of a field declared on an independently inherited type.
    Proxy { target: FieldId },
}

impl Combinator {
    pub fn name(&self) -> &'static str {
        match self {
            Combinator::Input => "input",
            Combinator::Identity => "identity",
            Combinator::Sum => "sum",
            Combinator::Mul => "mul",
            Combinator::Sub => "sub",
            Combinator::Div => "div",
            Combinator::Exp => "exp",
            Combinator::ActivationFunc { .. } => "fieldActivationFunc",
            Combinator::Proxy { .. } => "proxy",
        }
    }
}

/// One declared dependency: follow `relation` from the owning object and read
/// `source` there, feeding argument position `arg`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldInput {
    pub relation: Relation,
    pub source: FieldId,
    pub arg: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub(crate) id: FieldId,
    pub(crate) owner: TypeId,
    pub(crate) name: String,
    pub(crate) combinator: Combinator,
    pub(crate) inputs: Vec<FieldInput>,
    pub(crate) overrides: Option<FieldId>,
    pub(crate) default_value: f64,
}

impl FieldDefinition {
    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn owner(&self) -> TypeId {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn combinator(&self) -> Combinator {
        self.combinator
    }

    pub fn inputs(&self) -> &[FieldInput] {
        &self.inputs
    }

    pub fn overrides(&self) -> Option<FieldId> {
        self.overrides
    }

    pub fn default_value(&self) -> f64 {
        self.default_value
    }

    pub fn is_input(&self) -> bool {
        matches!(self.combinator, Combinator::Input)
    }

    pub fn proxy_target(&self) -> Option<FieldId> {
        match self.combinator {
            Combinator::Proxy { target } => Some(target),
            _ => None,
        }
    }
}

/// Returned by the registry's field factories. Declares dependencies on a
/// field that already lives in the registry arena.
///
/// ```ignore
/// let net = registry.sum(activation, "net").id();
/// registry
///     .field(net)
///     .input(Relation::Input, weighted_input, 0)
///     .input(Relation::Neuron, bias, 0);
/// ```
pub struct FieldBuilder<'a> {
    registry: &'a mut TypeRegistry,
    id: FieldId,
}

impl<'a> FieldBuilder<'a> {
    pub(crate) fn new(registry: &'a mut TypeRegistry, id: FieldId) -> Self {
        Self { registry, id }
    }

    /// Declare that this field reads `source` on the objects reached through
    /// `relation`, at argument position `arg`.
    pub fn input(self, relation: Relation, source: FieldId, arg: usize) -> Self {
        if let Some(def) = self.registry.field_def_mut(self.id) {
            def.inputs.push(FieldInput {
                relation,
                source,
                arg,
            });
        }
        self
    }

    /// Let this field take the place of `parent` on every type where it is
    /// visible. Reads of `parent` then resolve to this field's slot.
    pub fn overrides(self, parent: FieldId) -> Self {
        if let Some(def) = self.registry.field_def_mut(self.id) {
            def.overrides = Some(parent);
        }
        self
    }

    pub fn default_value(self, value: f64) -> Self {
        if let Some(def) = self.registry.field_def_mut(self.id) {
            def.default_value = value;
        }
        self
    }

    pub fn id(&self) -> FieldId {
        self.id
    }
}

impl From<FieldBuilder<'_>> for FieldId {
    fn from(builder: FieldBuilder<'_>) -> Self {
        builder.id
    }
}

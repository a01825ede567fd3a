//! Navigational relations between object roles.
//!
//! The relation set is closed. What a relation reaches depends on the role of
//! the object it is followed from: `Input` on an activation yields its input
//! links, `Input` on a link yields the single input activation.

use std::fmt;

/// The role a type (and its instances) plays in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Plain objects connected through `From`/`To`.
    Object,
    Neuron,
    Activation,
    Synapse,
    Link,
}

/// Cardinality of a relation as seen from one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    SelfRef,
    One,
    Many,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Relation {
    Self_,
    Input,
    Output,
    Neuron,
    Activation,
    Synapse,
    Link,
    PairIn,
    PairOut,
    From,
    To,
}

impl Relation {
    pub const ALL: [Relation; 11] = [
        Relation::Self_,
        Relation::Input,
        Relation::Output,
        Relation::Neuron,
        Relation::Activation,
        Relation::Synapse,
        Relation::Link,
        Relation::PairIn,
        Relation::PairOut,
        Relation::From,
        Relation::To,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Relation::Self_ => "SELF",
            Relation::Input => "INPUT",
            Relation::Output => "OUTPUT",
            Relation::Neuron => "NEURON",
            Relation::Activation => "ACTIVATION",
            Relation::Synapse => "SYNAPSE",
            Relation::Link => "LINK",
            Relation::PairIn => "PAIR_IN",
            Relation::PairOut => "PAIR_OUT",
            Relation::From => "FROM",
            Relation::To => "TO",
        }
    }

    pub fn reverse(self) -> Relation {
        match self {
            Relation::Self_ => Relation::Self_,
            Relation::Input => Relation::Output,
            Relation::Output => Relation::Input,
            Relation::Neuron => Relation::Activation,
            Relation::Activation => Relation::Neuron,
            Relation::Synapse => Relation::Link,
            Relation::Link => Relation::Synapse,
            Relation::PairIn => Relation::PairOut,
            Relation::PairOut => Relation::PairIn,
            Relation::From => Relation::To,
            Relation::To => Relation::From,
        }
    }

    /// Role reached when following this relation from `from`, or `None` if
    /// the relation is not navigable from that role.
    pub fn target_role(self, from: Role) -> Option<Role> {
        use Relation::*;
        match (from, self) {
            (role, Self_) => Some(role),

            (Role::Object, From | To) => Some(Role::Object),

            (Role::Neuron, Input | Output) => Some(Role::Synapse),
            (Role::Neuron, Activation) => Some(Role::Activation),

            (Role::Activation, Input | Output) => Some(Role::Link),
            (Role::Activation, Neuron) => Some(Role::Neuron),

            (Role::Synapse, Input | Output) => Some(Role::Neuron),
            (Role::Synapse, Link) => Some(Role::Link),

            (Role::Link, Input | Output) => Some(Role::Activation),
            (Role::Link, Synapse) => Some(Role::Synapse),
            (Role::Link, PairIn | PairOut) => Some(Role::Link),

            _ => None,
        }
    }

    /// Cardinality of this relation from `from`, or `None` if not navigable.
    pub fn kind(self, from: Role) -> Option<RelationKind> {
        use Relation::*;
        self.target_role(from)?;
        Some(match (from, self) {
            (_, Self_) => RelationKind::SelfRef,
            (Role::Object, _) => RelationKind::Many,
            (Role::Neuron, _) => RelationKind::Many,
            (Role::Activation, Neuron) => RelationKind::One,
            (Role::Activation, _) => RelationKind::Many,
            (Role::Synapse, Link) => RelationKind::Many,
            (Role::Synapse, _) => RelationKind::One,
            (Role::Link, _) => RelationKind::One,
        })
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

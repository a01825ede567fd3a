//! Error types for the field engine and the network graph.
//!
//! Every variant belongs to one of three classes (see [`ErrorKind`]):
//! build-time type errors, formula-evaluation errors and usage errors.

use thiserror::Error;

use crate::fields::Relation;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised while building or flattening the type hierarchy. Never recovered.
    Build,
    /// Raised while (re)computing a field value.
    Evaluation,
    /// Something that was asked for does not exist.
    Usage,
}

#[derive(Debug, Error)]
pub enum Error {
    // ------------------------------------------------------------------------
    // Build
    // ------------------------------------------------------------------------
    #[error("cyclic inheritance involving type '{0}'")]
    CyclicInheritance(String),

    #[error("cyclic field dependency without damping: {0}")]
    CyclicFieldDependency(String),

    #[error("type '{type_name}' inherits conflicting fields named '{field}'")]
    FieldNameConflict { type_name: String, field: String },

    #[error("proxy field '{0}' has no resolvable target")]
    UnresolvedProxy(String),

    #[error("proxy chain through '{0}' is cyclic")]
    ProxyCycle(String),

    #[error("field '{field}' is overridden twice on type '{type_name}'")]
    ConflictingOverride { type_name: String, field: String },

    #[error("type '{child}' cannot inherit from '{parent}': roles differ")]
    RoleMismatch { child: String, parent: String },

    #[error("relation {relation:?} is not navigable from field '{field}'")]
    InvalidRelation { relation: Relation, field: String },

    #[error("type registry must be flattened before instances are created")]
    NotFlattened,

    // ------------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------------
    #[error("field '{0}' is not an input field")]
    NotAnInputField(String),

    #[error("division by zero while computing '{0}'")]
    DivisionByZero(String),

    #[error("unresolved operand while computing '{0}'")]
    UnresolvedOperand(String),

    #[error("pair relation {0:?} is not set")]
    UnsetPairRelation(Relation),

    // ------------------------------------------------------------------------
    // Usage
    // ------------------------------------------------------------------------
    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("type not found: {0}")]
    TypeNotFound(String),

    #[error("object not found: {0}")]
    ObjectNotFound(u64),

    #[error("neuron not found: {0}")]
    NeuronNotFound(u64),

    #[error("synapse not found: {0}")]
    SynapseNotFound(u64),

    #[error("context not found: {0}")]
    ContextNotFound(u64),

    #[error("activation not found: {0}")]
    ActivationNotFound(u64),

    #[error("link not found: {0}")]
    LinkNotFound(u64),

    #[error("binding signal not found: {0}")]
    BindingSignalNotFound(String),

    #[error("endpoint mismatch: {0}")]
    EndpointMismatch(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CyclicInheritance(_)
            | Error::CyclicFieldDependency(_)
            | Error::FieldNameConflict { .. }
            | Error::UnresolvedProxy(_)
            | Error::ProxyCycle(_)
            | Error::ConflictingOverride { .. }
            | Error::RoleMismatch { .. }
            | Error::InvalidRelation { .. }
            | Error::NotFlattened => ErrorKind::Build,

            Error::NotAnInputField(_)
            | Error::DivisionByZero(_)
            | Error::UnresolvedOperand(_)
            | Error::UnsetPairRelation(_) => ErrorKind::Evaluation,

            Error::FieldNotFound(_)
            | Error::TypeNotFound(_)
            | Error::ObjectNotFound(_)
            | Error::NeuronNotFound(_)
            | Error::SynapseNotFound(_)
            | Error::ContextNotFound(_)
            | Error::ActivationNotFound(_)
            | Error::LinkNotFound(_)
            | Error::BindingSignalNotFound(_)
            | Error::EndpointMismatch(_)
            | Error::Config(_) => ErrorKind::Usage,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::NotFlattened.kind(), ErrorKind::Build);
        assert_eq!(
            Error::DivisionByZero("c".into()).kind(),
            ErrorKind::Evaluation
        );
        assert_eq!(
            Error::UnsetPairRelation(Relation::PairIn).kind(),
            ErrorKind::Evaluation
        );
        assert_eq!(Error::FieldNotFound("x".into()).kind(), ErrorKind::Usage);
    }

    #[test]
    fn test_display_carries_names() {
        let err = Error::FieldNameConflict {
            type_name: "CONCRETE".into(),
            field: "value".into(),
        };
        assert_eq!(
            err.to_string(),
            "type 'CONCRETE' inherits conflicting fields named 'value'"
        );
    }
}

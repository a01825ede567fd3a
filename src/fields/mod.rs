//! Typed fields, inheritance flattening and value propagation.
//!
//! ## Modules
//!
//! - [`relation`]: Closed set of navigational relations and object roles
//! - [`activation_function`]: Unary functions with derivatives
//! - [`definition`]: `FieldDefinition`, combinators and the dependency builder
//! - [`registry`]: `TypeRegistry` arena of types and fields
//! - [`flattened`]: Per-type input-side / output-side field tables
//! - [`propagation`]: `ObjectStore` trait and the recomputation engine
//! - [`object`]: `ObjectGraph`, a store of plain `From`/`To` linked objects

pub mod activation_function;
pub mod definition;
pub mod flattened;
pub mod object;
pub mod propagation;
pub mod registry;
pub mod relation;

pub use activation_function::ActivationFunction;
pub use definition::{Combinator, FieldBuilder, FieldDefinition, FieldId, FieldInput};
pub use flattened::FlattenedType;
pub use object::{ObjectGraph, ObjectId};
pub use propagation::ObjectStore;
pub use registry::{Dependent, TypeDef, TypeId, TypeRegistry};
pub use relation::{Relation, RelationKind, Role};

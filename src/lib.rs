//! fieldnet
//!
//! A typed, inheritance-aware dataflow engine:
//! - Type registry with multiple inheritance, flattened into dense per-type field tables
//! - Field formulas (sum, mul, sub, div, exp, identity, activation functions) over relations
//! - Eager value propagation through a live instance graph
//! - Neuron/activation/synapse/link network with binding signals, pairing and latent linking

pub mod config;
pub mod error;
pub mod fields;
pub mod network;

pub use config::{init_logging, EngineConfig, LoggingConfig};
pub use error::{Error, ErrorKind, Result};
pub use fields::{
    ActivationFunction, FieldId, ObjectGraph, ObjectId, Relation, Role, TypeId, TypeRegistry,
};
pub use network::{Model, ObjRef, Schema};

//! cartograph-core: Shared graph model, configuration, and error handling.
//!
//! This crate provides the foundational types used across all Cartograph components:
//! - Node labels and entities (Project, File, Class, Function, ...) of the code graph
//! - Relationship types (CONTAINS_*, DEFINES, CALLS, ...)
//! - The fact batch produced for one repository snapshot
//! - Layered configuration
//! - Common error types

pub mod config;
pub mod error;
pub mod facts;
pub mod types;

pub use config::CartographConfig;
pub use error::CartographError;
pub use facts::FactBatch;
pub use types::{Edge, EdgeType, Node, NodeKey, NodeLabel, PropertyValue};

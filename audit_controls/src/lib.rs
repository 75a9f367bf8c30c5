//! # Audit Controls
//!
//! Authoritative data model for compliance controls: definitions, assertions,
//! predicates, selectors and run inputs, plus the TOML loader and the built-in
//! CIS GKE benchmark catalog.
//!
//! A control is pure data. The evaluation engine (`audit_engine`) interprets
//! these definitions against fetched cloud and node resources; nothing in this
//! crate performs I/O beyond parsing definition files.

pub mod applicability;
pub mod catalog;
pub mod definition;
pub mod inputs;
pub mod loader;
pub mod predicate;
pub mod selector;
pub mod value;

pub use applicability::Applicability;
pub use definition::{Assertion, ControlDefinition, ControlMetadata, Severity};
pub use inputs::RunInputs;
pub use loader::{load_controls_str, LoadError};
pub use predicate::{NumericOp, Predicate};
pub use selector::{ResourceSelector, Scope};
pub use value::Value;

//! # Audit Engine
//!
//! Generic cloud-resource compliance evaluation engine. Control definitions
//! (`audit_controls`) are interpreted in four stages: resource fetch (through
//! a registry of [`fetch::ResourceFetcher`] implementations, memoized by a
//! per-run singleflight cache), field extraction over normalized value trees,
//! pure predicate matching, and verdict aggregation into per-control results.
//!
//! Controls evaluate independently on a bounded worker pool; one bad resource
//! never aborts sibling assertions, and a cancelled run still accounts for
//! every control in its report.

pub mod context;
pub mod extract;
pub mod fetch;
pub mod matcher;
pub mod report;
pub mod runner;

// Re-export the authoritative definition types alongside the engine surface.
pub use audit_controls::{
    Applicability, Assertion, ControlDefinition, Predicate, ResourceSelector, RunInputs, Scope,
    Severity, Value,
};

pub use context::EvaluationContext;
pub use fetch::{FetchError, FetchErrorKind, FetcherRegistry, ResourceFetcher, ResourceInstance};
pub use report::{ControlOutcome, ControlResult, ReportSink, RunReport, Verdict, VerdictOutcome};
pub use runner::pool::{evaluate_controls, CancelToken, PoolConfig};
pub use runner::{run_audit, ControlRunner};

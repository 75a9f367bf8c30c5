//! # Control Runner
//!
//! Evaluates one control definition: applicability check, per-assertion
//! fetch/extract/match, and verdict aggregation. Faults are contained at the
//! assertion level; one bad resource never aborts sibling assertions or other
//! controls.

pub mod aggregate;
pub mod pool;

use crate::context::EvaluationContext;
use crate::extract::{self, FieldPath};
use crate::fetch::{FetchError, FetcherRegistry, ResourceInstance};
use crate::matcher;
use crate::report::{
    ControlOutcome, ControlResult, ReportSink, RunReport, Verdict, VerdictOutcome,
};
use audit_controls::{Applicability, Assertion, ControlDefinition, Predicate, Value};
use chrono::Utc;
use std::time::Instant;

/// Evaluates controls against a per-run context and fetcher registry.
pub struct ControlRunner<'a> {
    context: &'a EvaluationContext,
    registry: &'a FetcherRegistry,
}

impl<'a> ControlRunner<'a> {
    pub fn new(context: &'a EvaluationContext, registry: &'a FetcherRegistry) -> Self {
        Self { context, registry }
    }

    /// Run one control to completion: `Init -> CheckApplicability ->
    /// {NotApplicable | Evaluating} -> Aggregating -> Done`.
    pub fn run(&self, control: &ControlDefinition) -> ControlResult {
        let start = Instant::now();
        log::debug!("evaluating control {} ({})", control.id, control.title);

        match self.check_applicability(control) {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("control {} not applicable", control.id);
                return ControlResult::not_applicable(
                    control,
                    "prerequisite resources absent, control not applicable",
                );
            }
            Err(err) => {
                return self.finish(
                    control,
                    vec![Verdict::error(
                        control.id.clone(),
                        format!("applicability check failed: {}", err),
                    )],
                    start,
                );
            }
        }

        let mut verdicts = Vec::new();
        for assertion in &control.assertions {
            verdicts.extend(self.evaluate_assertion(assertion));
        }

        self.finish(control, verdicts, start)
    }

    fn finish(
        &self,
        control: &ControlDefinition,
        verdicts: Vec<Verdict>,
        start: Instant,
    ) -> ControlResult {
        let outcome = aggregate::reduce(verdicts.iter().map(|v| v.outcome));
        let severity = if outcome == ControlOutcome::NotApplicable {
            audit_controls::Severity::None
        } else {
            control.severity
        };
        log::debug!("control {} -> {}", control.id, outcome.as_str());

        ControlResult {
            control_id: control.id.clone(),
            title: control.title.clone(),
            severity,
            scored: control.scored,
            outcome,
            verdicts,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Absence of the prerequisite collection is a clean "false"; any other
    /// fetch fault is surfaced to the caller as an error.
    fn check_applicability(&self, control: &ControlDefinition) -> Result<bool, FetchError> {
        match &control.applicability {
            Applicability::Always => Ok(true),
            Applicability::ResourcesPresent { selector, scope } => {
                match self.context.fetch(self.registry, selector, scope) {
                    Ok(instances) => Ok(!instances.is_empty()),
                    Err(err) if err.is_not_applicable() => Ok(false),
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// One verdict per (assertion, resource instance) pair; degraded fetches
    /// contribute a single verdict for the whole assertion.
    fn evaluate_assertion(&self, assertion: &Assertion) -> Vec<Verdict> {
        let assertion_resource = format!("{}:{}", assertion.scope.describe(), assertion.path);

        let path = match FieldPath::parse(&assertion.path) {
            Ok(path) => path,
            Err(err) => {
                return vec![Verdict::error(
                    assertion_resource,
                    format!("invalid field path: {}", err),
                )]
            }
        };

        let instances =
            match self
                .context
                .fetch(self.registry, &assertion.selector, &assertion.scope)
            {
                Ok(instances) => instances,
                Err(err) if err.is_not_applicable() => {
                    return vec![Verdict::not_applicable(assertion_resource, err.to_string())]
                }
                Err(err) => return vec![Verdict::error(assertion_resource, err.to_string())],
            };

        if instances.is_empty() {
            return vec![Verdict::not_applicable(
                assertion_resource,
                format!("selector '{}' produced no instances", assertion.selector),
            )];
        }

        let mut verdicts = Vec::new();
        for instance in instances.iter() {
            verdicts.extend(self.evaluate_instance(assertion, &path, instance));
        }
        verdicts
    }

    fn evaluate_instance(
        &self,
        assertion: &Assertion,
        path: &FieldPath,
        instance: &ResourceInstance,
    ) -> Vec<Verdict> {
        let branches = match extract::extract(&instance.tree, path) {
            Ok(branches) => branches,
            Err(err) => {
                return vec![Verdict::error(
                    format!("{}:{}", instance.id, path.as_str()),
                    err.to_string(),
                )]
            }
        };

        let expected = if assertion.sensitive {
            None
        } else {
            Some(assertion.predicate.describe())
        };

        // A quantified predicate consumes the whole fan-out as one
        // collection; anything else yields one verdict per branch. Without a
        // fan-out the branch value is already the collection to quantify
        // over, so no collapsing happens.
        if path.fans_out()
            && matches!(
                assertion.predicate,
                Predicate::ForAll { .. } | Predicate::ForAny { .. }
            )
        {
            let collected = Value::Array(branches.into_iter().map(|b| b.value).collect());
            let resource = format!("{}:{}", instance.id, path.as_str());
            return vec![self.apply_predicate(assertion, resource, collected, &expected)];
        }

        if branches.is_empty() {
            return vec![Verdict::not_applicable(
                format!("{}:{}", instance.id, path.as_str()),
                "path selected no elements",
            )];
        }

        branches
            .into_iter()
            .map(|branch| {
                let resource = format!("{}:{}", instance.id, branch.at);
                self.apply_predicate(assertion, resource, branch.value, &expected)
            })
            .collect()
    }

    fn apply_predicate(
        &self,
        assertion: &Assertion,
        resource: String,
        actual: Value,
        expected: &Option<String>,
    ) -> Verdict {
        match matcher::matches(&actual, &assertion.predicate) {
            Ok(true) => Verdict::pass(resource, actual, expected.clone()),
            Ok(false) => {
                let message = match expected {
                    Some(expected) => format!("value {} does not satisfy {}", actual, expected),
                    None => "value does not satisfy expectation".to_string(),
                };
                Verdict::fail(resource, actual, expected.clone(), message)
            }
            Err(err) => Verdict::error(resource, err.to_string()),
        }
    }
}

/// Evaluate a control set and wrap the results in a report envelope, feeding
/// each result (and the final report) to the sink as it becomes available.
pub fn run_audit(
    controls: &[ControlDefinition],
    context: &EvaluationContext,
    registry: &FetcherRegistry,
    config: &pool::PoolConfig,
    cancel: &pool::CancelToken,
    sink: &mut dyn ReportSink,
) -> RunReport {
    let started_at = Utc::now();
    let results = pool::evaluate_controls(controls, context, registry, config, cancel);
    for result in &results {
        sink.accept(result);
    }

    let report = RunReport::new(
        context.inputs().project_id.clone(),
        context.inputs().cis_version.clone(),
        started_at,
        results,
    );
    sink.finish(&report);
    report
}

/// Convenience check used by a few tests: did any verdict fail?
pub fn any_failures(verdicts: &[Verdict]) -> bool {
    verdicts.iter().any(|v| v.outcome == VerdictOutcome::Fail)
}

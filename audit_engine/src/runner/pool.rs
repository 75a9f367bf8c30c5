//! Bounded worker pool for control evaluation.
//!
//! Controls are embarrassingly parallel: workers drain a shared queue of
//! control indexes and write results back by index, so output order always
//! matches definition order regardless of scheduling. The pool size respects
//! the external API's rate limits (caller-supplied); cancellation marks
//! not-yet-started controls as skipped instead of omitting them.

use crate::context::EvaluationContext;
use crate::fetch::FetcherRegistry;
use crate::report::ControlResult;
use crate::runner::ControlRunner;
use audit_controls::ControlDefinition;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Cooperative cancellation signal for one run. In-flight controls finish;
/// queued controls report as skipped.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism()
                .map(|n| n.get().min(8))
                .unwrap_or(4),
        }
    }
}

impl PoolConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

/// Evaluate all controls on the pool. Returns one result per control, in
/// definition order.
pub fn evaluate_controls(
    controls: &[ControlDefinition],
    context: &EvaluationContext,
    registry: &FetcherRegistry,
    config: &PoolConfig,
    cancel: &CancelToken,
) -> Vec<ControlResult> {
    if controls.is_empty() {
        return Vec::new();
    }

    let queue: Mutex<VecDeque<usize>> = Mutex::new((0..controls.len()).collect());
    let results: Mutex<Vec<Option<ControlResult>>> =
        Mutex::new((0..controls.len()).map(|_| None).collect());
    let workers = config.workers.max(1).min(controls.len());

    log::debug!(
        "evaluating {} controls on {} workers",
        controls.len(),
        workers
    );

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = {
                    let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
                    queue.pop_front()
                };
                let Some(index) = index else { break };

                let control = &controls[index];
                let result = if cancel.is_cancelled() {
                    log::debug!("run cancelled, skipping control {}", control.id);
                    ControlResult::skipped(control)
                } else {
                    ControlRunner::new(context, registry).run(control)
                };

                let mut results = results.lock().unwrap_or_else(|e| e.into_inner());
                results[index] = Some(result);
            });
        }
    });

    results
        .into_inner()
        .unwrap_or_else(|e| e.into_inner())
        .into_iter()
        .map(|slot| slot.expect("worker pool filled every result slot"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{ResourceInstance, StaticFetcher};
    use crate::report::ControlOutcome;
    use audit_controls::{
        Assertion, Predicate, ResourceSelector, RunInputs, Scope, Severity, Value,
    };

    fn sample_controls(count: usize) -> Vec<ControlDefinition> {
        (0..count)
            .map(|i| {
                ControlDefinition::new(format!("c.{}", i), format!("control {}", i), Severity::Low)
                    .with_assertion(Assertion::new(
                        ResourceSelector::GKE_CLUSTER,
                        Scope::project("p"),
                        "ok",
                        Predicate::equals(true),
                    ))
            })
            .collect()
    }

    fn sample_registry() -> FetcherRegistry {
        let mut registry = FetcherRegistry::new();
        registry
            .register(Arc::new(StaticFetcher::new("static").with_instances(
                "gke-cluster",
                vec![ResourceInstance::new(
                    "us-central1/prod",
                    Value::from(serde_json::json!({ "ok": true })),
                )],
            )))
            .unwrap();
        registry
    }

    #[test]
    fn test_results_keep_definition_order() {
        let controls = sample_controls(17);
        let context = EvaluationContext::new(RunInputs::new("p"));
        let registry = sample_registry();

        let results = evaluate_controls(
            &controls,
            &context,
            &registry,
            &PoolConfig::with_workers(4),
            &CancelToken::new(),
        );

        assert_eq!(results.len(), controls.len());
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.control_id, format!("c.{}", i));
            assert_eq!(result.outcome, ControlOutcome::Pass);
        }
    }

    #[test]
    fn test_cancelled_run_accounts_for_every_control() {
        let controls = sample_controls(5);
        let context = EvaluationContext::new(RunInputs::new("p"));
        let registry = sample_registry();
        let cancel = CancelToken::new();
        cancel.cancel();

        let results = evaluate_controls(
            &controls,
            &context,
            &registry,
            &PoolConfig::default(),
            &cancel,
        );

        assert_eq!(results.len(), 5);
        assert!(results
            .iter()
            .all(|r| r.outcome == ControlOutcome::Skipped));
    }

    #[test]
    fn test_empty_control_set() {
        let context = EvaluationContext::new(RunInputs::new("p"));
        let registry = FetcherRegistry::new();
        let results = evaluate_controls(
            &[],
            &context,
            &registry,
            &PoolConfig::default(),
            &CancelToken::new(),
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_single_worker_matches_parallel_outcomes() {
        let controls = sample_controls(9);
        let registry = sample_registry();

        let serial = evaluate_controls(
            &controls,
            &EvaluationContext::new(RunInputs::new("p")),
            &registry,
            &PoolConfig::with_workers(1),
            &CancelToken::new(),
        );
        let parallel = evaluate_controls(
            &controls,
            &EvaluationContext::new(RunInputs::new("p")),
            &registry,
            &PoolConfig::with_workers(8),
            &CancelToken::new(),
        );

        let outcomes = |results: &[ControlResult]| {
            results
                .iter()
                .map(|r| (r.control_id.clone(), r.outcome, r.verdicts.len()))
                .collect::<Vec<_>>()
        };
        assert_eq!(outcomes(&serial), outcomes(&parallel));
    }
}

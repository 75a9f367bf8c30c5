//! Verdict aggregation.
//!
//! The reduction is a join over the dominance lattice
//! `Error > Fail > NotApplicable > Pass`: associative, commutative and
//! idempotent, so worker scheduling can never change a control's outcome.
//! The empty multiset reduces to not-applicable (no resource instances
//! existed).

use crate::report::{ControlOutcome, VerdictOutcome};

fn rank(outcome: VerdictOutcome) -> u8 {
    match outcome {
        VerdictOutcome::Pass => 0,
        VerdictOutcome::NotApplicable => 1,
        VerdictOutcome::Fail => 2,
        VerdictOutcome::Error => 3,
    }
}

/// Join of two verdict outcomes: the dominant one.
pub fn join(a: VerdictOutcome, b: VerdictOutcome) -> VerdictOutcome {
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

/// Reduce a multiset of verdict outcomes to one control outcome.
pub fn reduce<I>(outcomes: I) -> ControlOutcome
where
    I: IntoIterator<Item = VerdictOutcome>,
{
    let worst = outcomes.into_iter().reduce(join);
    match worst {
        None => ControlOutcome::NotApplicable,
        Some(VerdictOutcome::Pass) => ControlOutcome::Pass,
        Some(VerdictOutcome::Fail) => ControlOutcome::Fail,
        Some(VerdictOutcome::NotApplicable) => ControlOutcome::NotApplicable,
        Some(VerdictOutcome::Error) => ControlOutcome::Error,
    }
}

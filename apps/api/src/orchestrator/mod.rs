//! Fan-out/fan-in over independent fallible subtasks.
//!
//! `run_concurrent` spawns one task per role, waits for all of them, and
//! returns an `AggregatedOutcome` ordered by role. It never short-circuits:
//! partial successes stay visible to the caller even when the round fails.

mod outcome;

pub use outcome::{AggregatedOutcome, SubtaskResult};

use std::collections::BTreeMap;
use std::fmt::Debug;

use futures::future::{join_all, BoxFuture};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::resilience::{ErrorKind, TaskError};

/// A boxed unit of work for one role.
pub type Subtask<T> = BoxFuture<'static, Result<T, TaskError>>;

/// Runs every subtask concurrently and aggregates their results by role.
///
/// Each subtask races the cancellation token; a cancelled subtask reports
/// `ErrorKind::Cancelled` instead of hanging. A panicking subtask is captured
/// as `Unrecoverable`.
pub async fn run_concurrent<R, T>(
    label: &str,
    subtasks: BTreeMap<R, Subtask<T>>,
    cancel: &CancellationToken,
) -> AggregatedOutcome<R, T>
where
    R: Ord + Copy + Debug + Send + 'static,
    T: Send + 'static,
{
    let started = Instant::now();
    let (roles, handles): (Vec<R>, Vec<_>) = subtasks
        .into_iter()
        .map(|(role, task)| {
            let cancel = cancel.clone();
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        Err(TaskError::cancelled(format!("{role:?} cancelled")))
                    }
                    outcome = task => outcome,
                };
                SubtaskResult {
                    outcome,
                    elapsed: started.elapsed(),
                }
            });
            (role, handle)
        })
        .unzip();

    let joined = join_all(handles).await;

    let mut results = BTreeMap::new();
    for (role, joined) in roles.into_iter().zip(joined) {
        let result = joined.unwrap_or_else(|join_err| SubtaskResult {
            outcome: Err(TaskError::unrecoverable(format!(
                "{role:?} task aborted: {join_err}"
            ))),
            elapsed: started.elapsed(),
        });
        record_subtask(label, role, &result);
        results.insert(role, result);
    }

    let outcome = AggregatedOutcome::new(results);
    report_round(label, &outcome, started);
    outcome
}

fn record_subtask<R: Debug, T>(label: &str, role: R, result: &SubtaskResult<T>) {
    let elapsed_ms = result.elapsed.as_millis() as u64;
    match result.error() {
        None => info!(round = label, role = ?role, elapsed_ms, "Subtask succeeded"),
        Some(err) if err.kind == ErrorKind::Cancelled => {
            debug!(round = label, role = ?role, elapsed_ms, "Subtask cancelled")
        }
        Some(err) => warn!(
            round = label,
            role = ?role,
            elapsed_ms,
            kind = %err.kind,
            error = %err.message,
            "Subtask failed"
        ),
    }
}

fn report_round<R, T>(label: &str, outcome: &AggregatedOutcome<R, T>, started: Instant)
where
    R: Ord + Copy + Debug,
{
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let Some((role, primary)) = outcome.first_error() else {
        info!(round = label, subtasks = outcome.subtask_count(), elapsed_ms, "Round completed");
        return;
    };

    for (secondary_role, err) in outcome.secondary_errors() {
        debug!(
            round = label,
            role = ?secondary_role,
            kind = %err.kind,
            error = %err.message,
            "Secondary failure"
        );
    }

    if primary.is_cancelled() {
        info!(round = label, elapsed_ms, "Round cancelled");
    } else {
        warn!(
            round = label,
            role = ?role,
            failures = outcome.failure_count(),
            subtasks = outcome.subtask_count(),
            elapsed_ms,
            "Round failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::FutureExt;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Role {
        Alpha,
        Beta,
        Gamma,
    }

    fn after(delay_ms: u64, outcome: Result<&'static str, TaskError>) -> Subtask<&'static str> {
        async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            outcome
        }
        .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_error_is_independent_of_completion_order() {
        let timings: [[u64; 3]; 6] = [
            [10, 20, 30],
            [10, 30, 20],
            [20, 10, 30],
            [20, 30, 10],
            [30, 10, 20],
            [30, 20, 10],
        ];

        for [alpha, beta, gamma] in timings {
            let cancel = CancellationToken::new();
            let subtasks = BTreeMap::from([
                (Role::Alpha, after(alpha, Ok("alpha"))),
                (Role::Beta, after(beta, Err(TaskError::transient("beta down")))),
                (Role::Gamma, after(gamma, Err(TaskError::unrecoverable("gamma broken")))),
            ]);

            let outcome = run_concurrent("permutation", subtasks, &cancel).await;

            assert_eq!(outcome.subtask_count(), 3);
            assert_eq!(outcome.failure_count(), 2);
            let (role, err) = outcome.first_error().unwrap();
            assert_eq!(role, Role::Beta, "timings {alpha}/{beta}/{gamma}");
            assert_eq!(err.message, "beta down");
            let secondary = outcome.secondary_errors();
            assert_eq!(secondary.len(), 1);
            assert_eq!(secondary[0].0, Role::Gamma);
            assert_eq!(secondary[0].1.message, "gamma broken");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_every_subtask_and_keeps_partial_successes() {
        let cancel = CancellationToken::new();
        let subtasks = BTreeMap::from([
            (Role::Alpha, after(0, Err(TaskError::invalid_input("empty resume")))),
            (Role::Beta, after(500, Ok("job posting text"))),
        ]);

        let started = Instant::now();
        let outcome = run_concurrent("intake", subtasks, &cancel).await;

        assert!(started.elapsed() >= Duration::from_millis(500));
        let beta = &outcome.results()[&Role::Beta];
        assert_eq!(beta.outcome.as_ref().unwrap(), &"job posting text");
        assert_eq!(outcome.first_error().unwrap().0, Role::Alpha);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_successes_have_no_error() {
        let cancel = CancellationToken::new();
        let subtasks = BTreeMap::from([
            (Role::Alpha, after(5, Ok("a"))),
            (Role::Beta, after(1, Ok("b"))),
        ]);

        let outcome = run_concurrent("ok", subtasks, &cancel).await;
        assert!(outcome.is_success());
        let mut values = outcome.into_values().unwrap();
        assert_eq!(values.take(Role::Alpha).unwrap(), "a");
        assert_eq!(values.take(Role::Beta).unwrap(), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_ends_hanging_subtasks() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let subtasks = BTreeMap::from([
            (Role::Alpha, after(10, Ok("fast"))),
            (
                Role::Beta,
                futures::future::pending::<Result<&'static str, TaskError>>().boxed(),
            ),
        ]);

        let outcome = run_concurrent("hang", subtasks, &cancel).await;

        assert!(outcome.results()[&Role::Alpha].outcome.is_ok());
        let (role, err) = outcome.first_error().unwrap();
        assert_eq!(role, Role::Beta);
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_panicking_subtask_is_unrecoverable() {
        let cancel = CancellationToken::new();
        let subtasks: BTreeMap<Role, Subtask<&'static str>> = BTreeMap::from([
            (Role::Alpha, async { Ok("fine") }.boxed()),
            (
                Role::Gamma,
                async {
                    let missing: Option<&'static str> = None;
                    Ok(missing.expect("extractor blew up"))
                }
                .boxed(),
            ),
        ]);

        let outcome = run_concurrent("panic", subtasks, &cancel).await;
        let (role, err) = outcome.first_error().unwrap();
        assert_eq!(role, Role::Gamma);
        assert_eq!(err.kind, ErrorKind::Unrecoverable);
    }
}

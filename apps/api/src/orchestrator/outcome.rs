use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use crate::resilience::TaskError;

/// What one subtask produced, plus how long it ran.
#[derive(Debug)]
pub struct SubtaskResult<T> {
    pub outcome: Result<T, TaskError>,
    pub elapsed: Duration,
}

impl<T> SubtaskResult<T> {
    pub fn error(&self) -> Option<&TaskError> {
        self.outcome.as_ref().err()
    }
}

/// Every subtask's result, keyed and ordered by role.
///
/// The primary error is always taken from the lowest failing role, so the same
/// failure pattern reports the same error no matter which task finished first.
#[derive(Debug)]
pub struct AggregatedOutcome<R: Ord, T> {
    results: BTreeMap<R, SubtaskResult<T>>,
}

impl<R, T> AggregatedOutcome<R, T>
where
    R: Ord + Copy + Debug,
{
    pub(super) fn new(results: BTreeMap<R, SubtaskResult<T>>) -> Self {
        Self { results }
    }

    #[cfg(test)]
    pub fn results(&self) -> &BTreeMap<R, SubtaskResult<T>> {
        &self.results
    }

    pub fn subtask_count(&self) -> usize {
        self.results.len()
    }

    pub fn first_error(&self) -> Option<(R, &TaskError)> {
        self.failures().next()
    }

    /// Failures after the primary one, in role order. Diagnostics only.
    pub fn secondary_errors(&self) -> Vec<(R, &TaskError)> {
        self.failures().skip(1).collect()
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        self.first_error().is_none()
    }

    /// Collapses the round: all values when every subtask succeeded, otherwise
    /// the primary error.
    pub fn into_values(self) -> Result<RoundValues<R, T>, TaskError> {
        if let Some((_, err)) = self.first_error() {
            return Err(err.clone());
        }

        let values = self
            .results
            .into_iter()
            .filter_map(|(role, result)| result.outcome.ok().map(|value| (role, value)))
            .collect();
        Ok(RoundValues(values))
    }

    fn failures(&self) -> impl Iterator<Item = (R, &TaskError)> + '_ {
        self.results
            .iter()
            .filter_map(|(role, result)| result.error().map(|err| (*role, err)))
    }
}

/// Successful values of a round, taken out one role at a time.
#[derive(Debug)]
pub struct RoundValues<R: Ord, T>(BTreeMap<R, T>);

impl<R, T> RoundValues<R, T>
where
    R: Ord + Copy + Debug,
{
    pub fn take(&mut self, role: R) -> Result<T, TaskError> {
        self.0
            .remove(&role)
            .ok_or_else(|| TaskError::unrecoverable(format!("no result recorded for {role:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Role {
        First,
        Second,
        Third,
    }

    fn result(outcome: Result<u32, TaskError>) -> SubtaskResult<u32> {
        SubtaskResult {
            outcome,
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_first_error_follows_role_order() {
        let outcome = AggregatedOutcome::new(BTreeMap::from([
            (Role::Third, result(Err(TaskError::transient("third")))),
            (Role::First, result(Ok(1))),
            (Role::Second, result(Err(TaskError::unrecoverable("second")))),
        ]));

        let (role, err) = outcome.first_error().unwrap();
        assert_eq!(role, Role::Second);
        assert_eq!(err.message, "second");
        assert_eq!(outcome.failure_count(), 2);
        assert_eq!(outcome.secondary_errors()[0].0, Role::Third);
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_into_values_when_all_succeed() {
        let outcome = AggregatedOutcome::new(BTreeMap::from([
            (Role::First, result(Ok(1))),
            (Role::Second, result(Ok(2))),
        ]));

        let mut values = outcome.into_values().unwrap();
        assert_eq!(values.take(Role::Second).unwrap(), 2);
        assert_eq!(values.take(Role::First).unwrap(), 1);
        assert!(values.take(Role::First).is_err());
    }

    #[test]
    fn test_into_values_returns_primary_error() {
        let outcome = AggregatedOutcome::new(BTreeMap::from([
            (Role::First, result(Err(TaskError::invalid_input("empty file")))),
            (Role::Second, result(Ok(2))),
        ]));

        let err = outcome.into_values().unwrap_err();
        assert_eq!(err, TaskError::invalid_input("empty file"));
    }
}

//! Bounded generate, validate, fix loop.

use crate::core::{Metered, UsageAccountant, ValidationResult};
use crate::errors::DeckflowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which artifact a loop returns when it runs out of fix rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Return the last produced artifact, even if it scored worse.
    LastWins,
    /// Return the highest scoring artifact. Ties keep the earlier one.
    BestWins,
}

/// Configuration for one loop run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Minimum accepted score.
    pub threshold: i64,
    /// Fix rounds allowed after the first validation.
    pub max_fix_rounds: usize,
    /// Selection policy on exhaustion.
    pub retention: RetentionPolicy,
    /// When false the loop only generates.
    pub validation_enabled: bool,
}

impl LoopConfig {
    /// Creates a validating loop config.
    #[must_use]
    pub const fn new(threshold: i64, max_fix_rounds: usize, retention: RetentionPolicy) -> Self {
        Self {
            threshold,
            max_fix_rounds,
            retention,
            validation_enabled: true,
        }
    }

    /// A loop that generates once and never validates.
    #[must_use]
    pub const fn single_shot() -> Self {
        Self {
            threshold: 0,
            max_fix_rounds: 0,
            retention: RetentionPolicy::LastWins,
            validation_enabled: false,
        }
    }

    /// Enables or disables validation.
    #[must_use]
    pub const fn with_validation(mut self, enabled: bool) -> Self {
        self.validation_enabled = enabled;
        self
    }
}

/// One validated attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<A> {
    /// The artifact.
    pub artifact: A,
    /// Its score.
    pub score: i64,
    /// 1-based attempt index.
    pub attempt_index: usize,
    /// The validation that produced the score.
    pub validation: ValidationResult,
}

/// Result of a loop run.
#[derive(Debug, Clone)]
pub struct LoopOutcome<A> {
    /// The selected artifact.
    pub artifact: A,
    /// Validation of the selected artifact, absent when validation is off.
    pub validation: Option<ValidationResult>,
    /// 1-based attempt index of the selected artifact.
    pub selected_attempt: usize,
    /// Number of artifacts produced (initial plus fixes).
    pub attempts: usize,
    /// Score of each validated attempt, in order.
    pub scores: Vec<i64>,
    /// True when rounds ran out without reaching the threshold.
    pub exhausted: bool,
    /// Artifacts produced but not selected. Only collected under `BestWins`.
    pub discarded: Vec<Candidate<A>>,
}

impl<A> LoopOutcome<A> {
    /// Returns true if the selected artifact met the threshold or was not validated.
    #[must_use]
    pub fn accepted(&self) -> bool {
        !self.exhausted
    }
}

/// An artifact producer driven by [`FixLoop`].
#[async_trait]
pub trait Refiner: Send + Sync {
    /// The artifact being refined.
    type Artifact: Clone + Send + Sync;

    /// Produces the initial artifact.
    async fn generate(&self) -> Result<Metered<Self::Artifact>, DeckflowError>;

    /// Scores an artifact.
    async fn validate(
        &self,
        artifact: &Self::Artifact,
    ) -> Result<Metered<ValidationResult>, DeckflowError>;

    /// Produces a replacement artifact from feedback.
    ///
    /// A fix may take several collaborator calls. Each call's usage goes into
    /// `usage` as soon as it returns, so a later failing call loses nothing.
    async fn fix(
        &self,
        artifact: &Self::Artifact,
        feedback: &ValidationResult,
        usage: &mut UsageAccountant,
    ) -> Result<Self::Artifact, DeckflowError>;

    /// Checks a freshly produced artifact after its usage was recorded.
    ///
    /// Stages use this to enforce artifact invariants. The default accepts as is.
    fn accept(&self, artifact: Self::Artifact) -> Result<Self::Artifact, DeckflowError> {
        Ok(artifact)
    }
}

/// Hooks invoked as the loop moves between phases.
pub trait LoopObserver: Send + Sync {
    /// Called before validating the given attempt.
    fn on_validating(&self, _attempt: usize) {}

    /// Called after an attempt is scored.
    fn on_validated(&self, _attempt: usize, _result: &ValidationResult) {}

    /// Called before a fix round. `round` is 1-based.
    fn on_fixing(&self, _round: usize, _feedback: &ValidationResult) {}
}

/// Observer that ignores every phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl LoopObserver for NoOpObserver {}

/// The bounded retry engine shared by every validated stage.
#[derive(Debug, Clone, Copy)]
pub struct FixLoop {
    config: LoopConfig,
}

impl FixLoop {
    /// Creates a loop with the given config.
    #[must_use]
    pub const fn new(config: LoopConfig) -> Self {
        Self { config }
    }

    /// Returns the loop config.
    #[must_use]
    pub const fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Runs the loop. Every collaborator call's usage is folded into `usage`.
    ///
    /// Any collaborator error aborts the loop immediately.
    pub async fn run<R>(
        &self,
        refiner: &R,
        usage: &mut UsageAccountant,
        observer: &dyn LoopObserver,
    ) -> Result<LoopOutcome<R::Artifact>, DeckflowError>
    where
        R: Refiner + ?Sized,
    {
        let config = self.config;
        let mut artifact = refiner.accept(usage.record(refiner.generate().await?))?;
        let mut attempt = 1;

        if !config.validation_enabled {
            return Ok(LoopOutcome {
                artifact,
                validation: None,
                selected_attempt: 1,
                attempts: 1,
                scores: Vec::new(),
                exhausted: false,
                discarded: Vec::new(),
            });
        }

        observer.on_validating(attempt);
        let mut result = usage.record(refiner.validate(&artifact).await?);
        observer.on_validated(attempt, &result);

        let mut scores = vec![result.score];
        let mut tracker = match config.retention {
            RetentionPolicy::BestWins => Some(BestTracker::new(Candidate {
                artifact: artifact.clone(),
                score: result.score,
                attempt_index: attempt,
                validation: result.clone(),
            })),
            RetentionPolicy::LastWins => None,
        };

        let mut rounds_left = config.max_fix_rounds;
        while !result.meets(config.threshold) && rounds_left > 0 {
            let round = config.max_fix_rounds - rounds_left + 1;
            debug!(
                round,
                score = result.score,
                threshold = config.threshold,
                "Score below threshold, fixing"
            );
            observer.on_fixing(round, &result);
            let fixed = refiner.accept(refiner.fix(&artifact, &result, usage).await?)?;
            attempt += 1;

            observer.on_validating(attempt);
            let fixed_result = usage.record(refiner.validate(&fixed).await?);
            observer.on_validated(attempt, &fixed_result);

            // The fixed version replaces the current one whether or not it scored better.
            artifact = fixed;
            result = fixed_result;
            scores.push(result.score);
            rounds_left -= 1;

            if let Some(tracker) = tracker.as_mut() {
                tracker.offer(Candidate {
                    artifact: artifact.clone(),
                    score: result.score,
                    attempt_index: attempt,
                    validation: result.clone(),
                });
            }
        }

        let exhausted = !result.meets(config.threshold);
        let outcome = match tracker {
            None => LoopOutcome {
                artifact,
                validation: Some(result),
                selected_attempt: attempt,
                attempts: attempt,
                scores,
                exhausted,
                discarded: Vec::new(),
            },
            Some(tracker) => {
                let (best, discarded) = tracker.finish();
                LoopOutcome {
                    artifact: best.artifact,
                    validation: Some(best.validation),
                    selected_attempt: best.attempt_index,
                    attempts: attempt,
                    scores,
                    exhausted,
                    discarded,
                }
            }
        };
        Ok(outcome)
    }
}

/// Keeps every candidate and the index of the strictly best one.
struct BestTracker<A> {
    candidates: Vec<Candidate<A>>,
    best: usize,
}

impl<A> BestTracker<A> {
    fn new(first: Candidate<A>) -> Self {
        Self {
            candidates: vec![first],
            best: 0,
        }
    }

    fn offer(&mut self, candidate: Candidate<A>) {
        if candidate.score > self.candidates[self.best].score {
            self.best = self.candidates.len();
        }
        self.candidates.push(candidate);
    }

    fn finish(mut self) -> (Candidate<A>, Vec<Candidate<A>>) {
        let best = self.candidates.remove(self.best);
        (best, self.candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UsageDelta;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Artifacts are version numbers; scores come from a script.
    struct ScriptedRefiner {
        scores: Mutex<VecDeque<i64>>,
        generated: AtomicUsize,
        validated: AtomicUsize,
        fixed: AtomicUsize,
        fail_fix: bool,
    }

    impl ScriptedRefiner {
        fn new(scores: &[i64]) -> Self {
            Self {
                scores: Mutex::new(scores.iter().copied().collect()),
                generated: AtomicUsize::new(0),
                validated: AtomicUsize::new(0),
                fixed: AtomicUsize::new(0),
                fail_fix: false,
            }
        }

        fn failing_fix(scores: &[i64]) -> Self {
            Self {
                fail_fix: true,
                ..Self::new(scores)
            }
        }
    }

    #[async_trait]
    impl Refiner for ScriptedRefiner {
        type Artifact = usize;

        async fn generate(&self) -> Result<Metered<usize>, DeckflowError> {
            self.generated.fetch_add(1, Ordering::SeqCst);
            Ok(Metered::new(1, UsageDelta::new(10, 1)))
        }

        async fn validate(&self, _artifact: &usize) -> Result<Metered<ValidationResult>, DeckflowError> {
            self.validated.fetch_add(1, Ordering::SeqCst);
            let score = self.scores.lock().pop_front().expect("score script exhausted");
            Ok(Metered::new(
                ValidationResult::new(score, "feedback"),
                UsageDelta::new(2, 2),
            ))
        }

        async fn fix(
            &self,
            artifact: &usize,
            _feedback: &ValidationResult,
            usage: &mut UsageAccountant,
        ) -> Result<usize, DeckflowError> {
            self.fixed.fetch_add(1, Ordering::SeqCst);
            if self.fail_fix {
                return Err(DeckflowError::transport("fixer", "timeout"));
            }
            Ok(usage.record(Metered::new(artifact + 1, UsageDelta::new(5, 5))))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        phases: Mutex<Vec<String>>,
    }

    impl LoopObserver for RecordingObserver {
        fn on_validating(&self, attempt: usize) {
            self.phases.lock().push(format!("validating:{attempt}"));
        }

        fn on_fixing(&self, round: usize, _feedback: &ValidationResult) {
            self.phases.lock().push(format!("fixing:{round}"));
        }
    }

    #[tokio::test]
    async fn test_first_pass_never_fixes() {
        let refiner = ScriptedRefiner::new(&[90]);
        let mut usage = UsageAccountant::new();
        let outcome = FixLoop::new(LoopConfig::new(80, 1, RetentionPolicy::LastWins))
            .run(&refiner, &mut usage, &NoOpObserver)
            .await
            .unwrap();

        assert_eq!(outcome.artifact, 1);
        assert!(outcome.accepted());
        assert_eq!(refiner.fixed.load(Ordering::SeqCst), 0);
        assert_eq!(refiner.validated.load(Ordering::SeqCst), 1);
        assert_eq!(usage.calls(), 2);
    }

    #[tokio::test]
    async fn test_last_wins_returns_fixed_even_if_worse() {
        let refiner = ScriptedRefiner::new(&[50, 20]);
        let mut usage = UsageAccountant::new();
        let outcome = FixLoop::new(LoopConfig::new(80, 1, RetentionPolicy::LastWins))
            .run(&refiner, &mut usage, &NoOpObserver)
            .await
            .unwrap();

        assert_eq!(outcome.artifact, 2);
        assert_eq!(outcome.validation.unwrap().score, 20);
        assert!(outcome.exhausted);
        assert_eq!(refiner.fixed.load(Ordering::SeqCst), 1);
        assert_eq!(refiner.validated.load(Ordering::SeqCst), 2);
        assert!(outcome.discarded.is_empty());
        // generate 10+1, validate 2+2 twice, fix 5+5
        assert_eq!(usage.totals().input_tokens, 10 + 2 + 5 + 2);
        assert_eq!(usage.totals().output_tokens, 1 + 2 + 5 + 2);
    }

    #[tokio::test]
    async fn test_best_wins_adopts_best_candidate() {
        let refiner = ScriptedRefiner::new(&[3, 7, 2, 9, 5]);
        let mut usage = UsageAccountant::new();
        let outcome = FixLoop::new(LoopConfig::new(10, 4, RetentionPolicy::BestWins))
            .run(&refiner, &mut usage, &NoOpObserver)
            .await
            .unwrap();

        assert_eq!(outcome.selected_attempt, 4);
        assert_eq!(outcome.artifact, 4);
        assert_eq!(outcome.validation.as_ref().unwrap().score, 9);
        assert_eq!(outcome.attempts, 5);
        assert_eq!(outcome.scores, vec![3, 7, 2, 9, 5]);
        assert!(outcome.exhausted);
        let discarded: Vec<usize> = outcome.discarded.iter().map(|c| c.attempt_index).collect();
        assert_eq!(discarded, vec![1, 2, 3, 5]);
    }

    #[tokio::test]
    async fn test_best_wins_tie_keeps_earlier() {
        let refiner = ScriptedRefiner::new(&[6, 6, 4]);
        let mut usage = UsageAccountant::new();
        let outcome = FixLoop::new(LoopConfig::new(10, 2, RetentionPolicy::BestWins))
            .run(&refiner, &mut usage, &NoOpObserver)
            .await
            .unwrap();

        assert_eq!(outcome.selected_attempt, 1);
    }

    #[tokio::test]
    async fn test_best_wins_stops_on_acceptance() {
        let refiner = ScriptedRefiner::new(&[12, 3]);
        let mut usage = UsageAccountant::new();
        let outcome = FixLoop::new(LoopConfig::new(10, 4, RetentionPolicy::BestWins))
            .run(&refiner, &mut usage, &NoOpObserver)
            .await
            .unwrap();

        assert_eq!(outcome.selected_attempt, 1);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.accepted());
        assert_eq!(refiner.fixed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_shot_skips_validation() {
        let refiner = ScriptedRefiner::new(&[]);
        let mut usage = UsageAccountant::new();
        let outcome = FixLoop::new(LoopConfig::single_shot())
            .run(&refiner, &mut usage, &NoOpObserver)
            .await
            .unwrap();

        assert!(outcome.validation.is_none());
        assert_eq!(refiner.generated.load(Ordering::SeqCst), 1);
        assert_eq!(refiner.validated.load(Ordering::SeqCst), 0);
        assert_eq!(refiner.fixed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fix_error_aborts_and_keeps_prior_usage() {
        let refiner = ScriptedRefiner::failing_fix(&[1]);
        let mut usage = UsageAccountant::new();
        let err = FixLoop::new(LoopConfig::new(10, 1, RetentionPolicy::LastWins))
            .run(&refiner, &mut usage, &NoOpObserver)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "TransportError");
        assert_eq!(usage.calls(), 2);
    }

    #[tokio::test]
    async fn test_observer_sees_phases_in_order() {
        let refiner = ScriptedRefiner::new(&[1, 2]);
        let observer = RecordingObserver::default();
        let mut usage = UsageAccountant::new();
        FixLoop::new(LoopConfig::new(10, 1, RetentionPolicy::LastWins))
            .run(&refiner, &mut usage, &observer)
            .await
            .unwrap();

        assert_eq!(
            *observer.phases.lock(),
            vec!["validating:1", "fixing:1", "validating:2"]
        );
    }
}

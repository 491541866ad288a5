//! Outline stage.

use crate::capabilities::OutlineService;
use crate::config::StagePolicy;
use crate::core::{Metered, Outline, TopicSpec, UsageAccountant, ValidationResult};
use crate::errors::DeckflowError;
use crate::refine::{FixLoop, LoopConfig, LoopObserver, LoopOutcome, Refiner, RetentionPolicy};
use async_trait::async_trait;

/// Generates the outline and refines it as a unit, keeping the last fix.
#[derive(Debug, Clone, Copy)]
pub struct OutlineStage {
    fix_loop: FixLoop,
}

impl OutlineStage {
    /// Creates the stage. `agentic == false` reduces it to one generate call.
    #[must_use]
    pub fn new(policy: StagePolicy, agentic: bool) -> Self {
        let config = LoopConfig::new(policy.threshold, policy.max_attempts, RetentionPolicy::LastWins)
            .with_validation(agentic);
        Self {
            fix_loop: FixLoop::new(config),
        }
    }

    /// Runs the stage. The returned outline always has `topic.slide_count`
    /// slides numbered in order.
    pub async fn run(
        &self,
        service: &dyn OutlineService,
        topic: &TopicSpec,
        usage: &mut UsageAccountant,
        observer: &dyn LoopObserver,
    ) -> Result<LoopOutcome<Outline>, DeckflowError> {
        let refiner = OutlineRefiner { service, topic };
        self.fix_loop.run(&refiner, usage, observer).await
    }
}

struct OutlineRefiner<'a> {
    service: &'a dyn OutlineService,
    topic: &'a TopicSpec,
}

#[async_trait]
impl<'a> Refiner for OutlineRefiner<'a> {
    type Artifact = Outline;

    async fn generate(&self) -> Result<Metered<Outline>, DeckflowError> {
        self.service.generate_outline(self.topic).await
    }

    async fn validate(&self, outline: &Outline) -> Result<Metered<ValidationResult>, DeckflowError> {
        self.service.validate_outline(self.topic, outline).await
    }

    async fn fix(
        &self,
        outline: &Outline,
        feedback: &ValidationResult,
        usage: &mut UsageAccountant,
    ) -> Result<Outline, DeckflowError> {
        Ok(usage.record(self.service.fix_outline(outline, feedback).await?))
    }

    fn accept(&self, outline: Outline) -> Result<Outline, DeckflowError> {
        outline.normalize(self.topic.slide_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::MockOutlineService;
    use crate::core::{SlideOutline, UsageDelta};
    use crate::refine::NoOpObserver;
    use pretty_assertions::assert_eq;

    fn outline(title: &str, count: usize, first_number: usize) -> Outline {
        Outline::new(
            title,
            (0..count)
                .map(|i| SlideOutline::new(format!("Slide {i}"), "focus", first_number + i))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_generated_outline_is_renumbered() {
        let mut service = MockOutlineService::new();
        service
            .expect_generate_outline()
            .times(1)
            .returning(|_| Ok(Metered::new(outline("Bees", 3, 7), UsageDelta::new(100, 50))));
        service.expect_validate_outline().times(0);
        service.expect_fix_outline().times(0);

        let mut usage = UsageAccountant::new();
        let outcome = OutlineStage::new(StagePolicy::new(80, 1), false)
            .run(&service, &TopicSpec::new("Bees", 3), &mut usage, &NoOpObserver)
            .await
            .unwrap();

        let numbers: Vec<usize> = outcome.artifact.slides.iter().map(|s| s.slide_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(usage.totals().input_tokens, 100);
    }

    #[tokio::test]
    async fn test_fixed_outline_kept_even_when_worse() {
        let mut service = MockOutlineService::new();
        service
            .expect_generate_outline()
            .returning(|_| Ok(Metered::new(outline("Draft", 2, 1), UsageDelta::new(1, 1))));
        let mut scores = vec![40, 60].into_iter();
        service
            .expect_validate_outline()
            .times(2)
            .returning(move |_, _| {
                Ok(Metered::new(
                    ValidationResult::new(scores.next().unwrap_or(0), "weak"),
                    UsageDelta::new(1, 1),
                ))
            });
        service
            .expect_fix_outline()
            .times(1)
            .returning(|_, _| Ok(Metered::new(outline("Fixed", 2, 1), UsageDelta::new(1, 1))));

        let mut usage = UsageAccountant::new();
        let outcome = OutlineStage::new(StagePolicy::new(80, 1), true)
            .run(&service, &TopicSpec::new("Bees", 2), &mut usage, &NoOpObserver)
            .await
            .unwrap();

        assert_eq!(outcome.artifact.title, "Fixed");
        assert!(outcome.exhausted);
        assert_eq!(usage.calls(), 4);
    }

    #[tokio::test]
    async fn test_fixer_changing_slide_count_is_rejected() {
        let mut service = MockOutlineService::new();
        service
            .expect_generate_outline()
            .returning(|_| Ok(Metered::new(outline("Draft", 2, 1), UsageDelta::new(1, 1))));
        service
            .expect_validate_outline()
            .returning(|_, _| Ok(Metered::new(ValidationResult::new(0, "bad"), UsageDelta::zero())));
        service
            .expect_fix_outline()
            .returning(|_, _| Ok(Metered::new(outline("Fixed", 3, 1), UsageDelta::new(9, 9))));

        let mut usage = UsageAccountant::new();
        let err = OutlineStage::new(StagePolicy::new(80, 1), true)
            .run(&service, &TopicSpec::new("Bees", 2), &mut usage, &NoOpObserver)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "ValidationError");
        // The rejected fix was still billed.
        assert_eq!(usage.totals().input_tokens, 10);
    }
}

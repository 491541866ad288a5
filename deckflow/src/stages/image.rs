//! Per-slide image stage with best-of-N retention.

use crate::capabilities::ImageService;
use crate::config::StagePolicy;
use crate::core::{ImageHandle, Metered, SlideContent, UsageAccountant, ValidationResult};
use crate::errors::DeckflowError;
use crate::refine::{FixLoop, LoopConfig, LoopObserver, Refiner, RetentionPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One generated image and the content whose prompt produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttempt {
    /// Content carrying the prompt used for this attempt.
    pub content: SlideContent,
    /// Where the generated image lives.
    pub image: ImageHandle,
}

/// One entry in the image candidate trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCandidate {
    /// 1-based attempt index.
    pub attempt_index: usize,
    /// Validator score, absent when validation is off.
    pub score: Option<i64>,
    /// The generated image.
    pub image: ImageHandle,
}

/// Result of the image stage for one slide.
#[derive(Debug, Clone)]
pub struct ImageOutcome {
    /// Content of the selected attempt. Its prompt is the one that produced `image`.
    pub content: SlideContent,
    /// The selected image.
    pub image: ImageHandle,
    /// Validation of the selected image.
    pub validation: Option<ValidationResult>,
    /// 1-based attempt index of the selected image.
    pub selected_attempt: usize,
    /// True when the attempt bound was hit below threshold.
    pub exhausted: bool,
    /// Every attempt in order, the selected one included.
    pub candidates: Vec<ImageCandidate>,
}

impl ImageOutcome {
    /// Images that were generated but not selected.
    #[must_use]
    pub fn discarded(&self) -> Vec<ImageHandle> {
        self.candidates
            .iter()
            .filter(|c| c.attempt_index != self.selected_attempt)
            .map(|c| c.image.clone())
            .collect()
    }
}

/// Generates and refines one slide's image, adopting the best scoring attempt.
#[derive(Debug, Clone)]
pub struct ImageStage {
    fix_loop: FixLoop,
    model: String,
}

impl ImageStage {
    /// Creates the stage.
    ///
    /// `policy.max_attempts` bounds the total number of images generated.
    #[must_use]
    pub fn new(policy: StagePolicy, agentic: bool, model: impl Into<String>) -> Self {
        let config = LoopConfig::new(
            policy.threshold,
            policy.max_attempts.saturating_sub(1),
            RetentionPolicy::BestWins,
        )
        .with_validation(agentic);
        Self {
            fix_loop: FixLoop::new(config),
            model: model.into(),
        }
    }

    /// Returns the image model this stage generates with.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Runs the stage starting from the content stage's image prompt.
    pub async fn run(
        &self,
        service: &dyn ImageService,
        content: &SlideContent,
        usage: &mut UsageAccountant,
        observer: &dyn LoopObserver,
    ) -> Result<ImageOutcome, DeckflowError> {
        let refiner = ImageRefiner {
            service,
            model: &self.model,
            initial: content,
        };
        let outcome = self.fix_loop.run(&refiner, usage, observer).await?;

        let mut candidates: Vec<ImageCandidate> = outcome
            .discarded
            .iter()
            .map(|c| ImageCandidate {
                attempt_index: c.attempt_index,
                score: Some(c.score),
                image: c.artifact.image.clone(),
            })
            .collect();
        candidates.push(ImageCandidate {
            attempt_index: outcome.selected_attempt,
            score: outcome.validation.as_ref().map(|v| v.score),
            image: outcome.artifact.image.clone(),
        });
        candidates.sort_by_key(|c| c.attempt_index);

        debug!(
            model = %self.model,
            attempts = outcome.attempts,
            selected = outcome.selected_attempt,
            exhausted = outcome.exhausted,
            "Image stage finished"
        );

        Ok(ImageOutcome {
            content: outcome.artifact.content,
            image: outcome.artifact.image,
            validation: outcome.validation,
            selected_attempt: outcome.selected_attempt,
            exhausted: outcome.exhausted,
            candidates,
        })
    }
}

struct ImageRefiner<'a> {
    service: &'a dyn ImageService,
    model: &'a str,
    initial: &'a SlideContent,
}

#[async_trait]
impl<'a> Refiner for ImageRefiner<'a> {
    type Artifact = ImageAttempt;

    async fn generate(&self) -> Result<Metered<ImageAttempt>, DeckflowError> {
        let image = self
            .service
            .generate_image(&self.initial.image_prompt, self.model)
            .await?;
        Ok(Metered::free(ImageAttempt {
            content: self.initial.clone(),
            image,
        }))
    }

    async fn validate(
        &self,
        attempt: &ImageAttempt,
    ) -> Result<Metered<ValidationResult>, DeckflowError> {
        self.service
            .validate_image(&attempt.image, &attempt.content)
            .await
    }

    async fn fix(
        &self,
        attempt: &ImageAttempt,
        feedback: &ValidationResult,
        usage: &mut UsageAccountant,
    ) -> Result<ImageAttempt, DeckflowError> {
        let content = usage.record(
            self.service
                .fix_image_prompt(&attempt.content, feedback)
                .await?,
        );
        let image = usage.record(Metered::free(
            self.service
                .generate_image(&content.image_prompt, self.model)
                .await?,
        ));
        Ok(ImageAttempt { content, image })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::MockImageService;
    use crate::core::UsageDelta;
    use crate::refine::NoOpObserver;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Arc;

    fn scripted_service(scores: &[i64]) -> MockImageService {
        let mut service = MockImageService::new();
        let generated = Arc::new(Mutex::new(0_usize));
        service.expect_generate_image().returning(move |prompt, model| {
            let count = {
                let mut count = generated.lock();
                *count += 1;
                *count
            };
            Ok(ImageHandle::new(format!("{model}/{prompt}/{count}")))
        });
        let scores = Arc::new(Mutex::new(scores.iter().copied().collect::<VecDeque<_>>()));
        service.expect_validate_image().returning(move |_, _| {
            let score = scores.lock().pop_front().unwrap_or(0);
            Ok(Metered::new(ValidationResult::new(score, "meh"), UsageDelta::new(3, 1)))
        });
        service.expect_fix_image_prompt().returning(|content, _| {
            let prompt = format!("{}+", content.image_prompt);
            Ok(Metered::new(content.with_image_prompt(prompt), UsageDelta::new(2, 2)))
        });
        service
    }

    fn content() -> SlideContent {
        SlideContent::new(vec!["Bees dance".into()], "Bees dance to talk", "bee")
    }

    #[tokio::test]
    async fn test_exhausted_search_adopts_best_attempt() {
        let service = scripted_service(&[3, 7, 2, 9, 5]);
        let mut usage = UsageAccountant::new();
        let outcome = ImageStage::new(StagePolicy::new(10, 5), true, "fal-ai/recraft-20b")
            .run(&service, &content(), &mut usage, &NoOpObserver)
            .await
            .unwrap();

        assert_eq!(outcome.selected_attempt, 4);
        assert_eq!(outcome.validation.as_ref().unwrap().score, 9);
        assert_eq!(outcome.image.location(), "fal-ai/recraft-20b/bee+++/4");
        assert_eq!(outcome.content.image_prompt, "bee+++");
        assert!(outcome.exhausted);
        assert_eq!(outcome.candidates.len(), 5);
        assert_eq!(outcome.discarded().len(), 4);
        // 5 images, 5 validations and 4 prompt fixes. Images carry no tokens.
        assert_eq!(usage.calls(), 14);
        assert_eq!(usage.totals().input_tokens, 5 * 3 + 4 * 2);
    }

    #[tokio::test]
    async fn test_failed_regeneration_keeps_fixer_usage() {
        let mut service = MockImageService::new();
        let generated = Arc::new(Mutex::new(0_usize));
        service.expect_generate_image().times(2).returning(move |_, _| {
            let mut count = generated.lock();
            *count += 1;
            if *count == 1 {
                Ok(ImageHandle::new("img/1"))
            } else {
                Err(DeckflowError::transport("image", "timeout"))
            }
        });
        service
            .expect_validate_image()
            .times(1)
            .returning(|_, _| Ok(Metered::new(ValidationResult::new(1, "blurry"), UsageDelta::new(3, 1))));
        service.expect_fix_image_prompt().times(1).returning(|content, _| {
            Ok(Metered::new(
                content.with_image_prompt("sharper bee"),
                UsageDelta::new(100, 100),
            ))
        });

        let mut usage = UsageAccountant::new();
        let err = ImageStage::new(StagePolicy::new(10, 5), true, "m")
            .run(&service, &content(), &mut usage, &NoOpObserver)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "TransportError");
        assert_eq!(usage.totals().input_tokens, 103);
        assert_eq!(usage.totals().output_tokens, 101);
        // First image, validation and prompt fix; the failed image is not counted.
        assert_eq!(usage.calls(), 3);
    }

    #[tokio::test]
    async fn test_accepted_first_attempt_skips_fixer() {
        let mut service = MockImageService::new();
        service
            .expect_generate_image()
            .times(1)
            .returning(|_, _| Ok(ImageHandle::new("img/1")));
        service
            .expect_validate_image()
            .times(1)
            .returning(|_, _| Ok(Metered::new(ValidationResult::new(12, "good"), UsageDelta::zero())));
        service.expect_fix_image_prompt().times(0);

        let mut usage = UsageAccountant::new();
        let outcome = ImageStage::new(StagePolicy::new(10, 5), true, "m")
            .run(&service, &content(), &mut usage, &NoOpObserver)
            .await
            .unwrap();

        assert_eq!(outcome.selected_attempt, 1);
        assert!(!outcome.exhausted);
        assert!(outcome.discarded().is_empty());
    }

    #[tokio::test]
    async fn test_non_agentic_generates_once() {
        let mut service = MockImageService::new();
        service
            .expect_generate_image()
            .times(1)
            .returning(|_, _| Ok(ImageHandle::new("img/only")));
        service.expect_validate_image().times(0);
        service.expect_fix_image_prompt().times(0);

        let mut usage = UsageAccountant::new();
        let outcome = ImageStage::new(StagePolicy::new(10, 5), false, "m")
            .run(&service, &content(), &mut usage, &NoOpObserver)
            .await
            .unwrap();

        assert_eq!(outcome.image.location(), "img/only");
        assert_eq!(
            outcome.candidates,
            vec![ImageCandidate {
                attempt_index: 1,
                score: None,
                image: ImageHandle::new("img/only"),
            }]
        );
    }
}

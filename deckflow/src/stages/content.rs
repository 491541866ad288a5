//! Per-slide content stage.

use crate::capabilities::ContentService;
use crate::config::StagePolicy;
use crate::core::{Metered, SlideContent, SlideOutline, UsageAccountant, ValidationResult};
use crate::errors::DeckflowError;
use crate::refine::{FixLoop, LoopConfig, LoopObserver, LoopOutcome, Refiner, RetentionPolicy};
use async_trait::async_trait;

/// Generates one slide's text and refines it, keeping the last fix.
#[derive(Debug, Clone, Copy)]
pub struct ContentStage {
    fix_loop: FixLoop,
}

impl ContentStage {
    /// Creates the stage. `agentic == false` reduces it to one generate call.
    #[must_use]
    pub fn new(policy: StagePolicy, agentic: bool) -> Self {
        let config = LoopConfig::new(policy.threshold, policy.max_attempts, RetentionPolicy::LastWins)
            .with_validation(agentic);
        Self {
            fix_loop: FixLoop::new(config),
        }
    }

    /// Runs the stage for one slide with the presentation title as context.
    pub async fn run(
        &self,
        service: &dyn ContentService,
        title: &str,
        slide: &SlideOutline,
        usage: &mut UsageAccountant,
        observer: &dyn LoopObserver,
    ) -> Result<LoopOutcome<SlideContent>, DeckflowError> {
        let refiner = ContentRefiner {
            service,
            title,
            slide,
        };
        self.fix_loop.run(&refiner, usage, observer).await
    }
}

struct ContentRefiner<'a> {
    service: &'a dyn ContentService,
    title: &'a str,
    slide: &'a SlideOutline,
}

#[async_trait]
impl<'a> Refiner for ContentRefiner<'a> {
    type Artifact = SlideContent;

    async fn generate(&self) -> Result<Metered<SlideContent>, DeckflowError> {
        self.service.generate_content(self.title, self.slide).await
    }

    async fn validate(
        &self,
        content: &SlideContent,
    ) -> Result<Metered<ValidationResult>, DeckflowError> {
        self.service
            .validate_content(self.title, self.slide, content)
            .await
    }

    async fn fix(
        &self,
        content: &SlideContent,
        feedback: &ValidationResult,
        usage: &mut UsageAccountant,
    ) -> Result<SlideContent, DeckflowError> {
        let fixed = self
            .service
            .fix_content(self.title, self.slide, content, feedback)
            .await?;
        Ok(usage.record(fixed))
    }
}

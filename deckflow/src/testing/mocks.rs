//! Scripted collaborators for tests and benches.
//!
//! Every scripted service records its calls in a shared [`CallLog`], which
//! also injects failures and holds, and sums the usage it reported.

use crate::capabilities::{
    ContentService, DeckExporter, ImageService, JobRecord, OutlineService, PresentationStore,
    SpeechRequest, SpeechService,
};
use crate::core::{
    AudioHandle, ImageHandle, Metered, Outline, Presentation, SlideContent, SlideOutline,
    SlideRecord, TopicSpec, UsageCounters, UsageDelta, ValidationResult,
};
use crate::errors::DeckflowError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

/// A collaborator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    /// `generate_outline`
    GenerateOutline,
    /// `validate_outline`
    ValidateOutline,
    /// `fix_outline`
    FixOutline,
    /// `generate_content`
    GenerateContent,
    /// `validate_content`
    ValidateContent,
    /// `fix_content`
    FixContent,
    /// `generate_image`
    GenerateImage,
    /// `validate_image`
    ValidateImage,
    /// `fix_image_prompt`
    FixImagePrompt,
    /// `synthesize`
    Synthesize,
    /// `persist_job`
    PersistJob,
    /// `persist_slides`
    PersistSlides,
    /// `export_deck`
    ExportDeck,
}

impl Call {
    /// Returns true for validate and fix operations.
    #[must_use]
    pub fn is_refinement(self) -> bool {
        matches!(
            self,
            Self::ValidateOutline
                | Self::FixOutline
                | Self::ValidateContent
                | Self::FixContent
                | Self::ValidateImage
                | Self::FixImagePrompt
        )
    }
}

/// A pause point: the call signals `reached` and waits for `release`.
#[derive(Debug, Default)]
pub struct Hold {
    /// Notified when the held call starts.
    pub reached: Notify,
    /// Notify once to let the held call continue.
    pub release: Notify,
}

/// Shared record of collaborator calls.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<Call, (usize, DeckflowError)>>,
    holds: Mutex<HashMap<(Call, usize), Arc<Hold>>>,
    reported: Mutex<UsageCounters>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the `nth` (1-based) call of `call` fail with a transport error.
    pub fn fail_on(&self, call: Call, nth: usize) {
        self.fail_with(
            call,
            nth,
            DeckflowError::transport(format!("{call:?}"), "connection refused"),
        );
    }

    /// Makes the `nth` (1-based) call of `call` fail with `error`.
    pub fn fail_with(&self, call: Call, nth: usize, error: DeckflowError) {
        self.failures.lock().insert(call, (nth, error));
    }

    /// Pauses the `nth` (1-based) call of `call` until released.
    pub fn hold_on(&self, call: Call, nth: usize) -> Arc<Hold> {
        let hold = Arc::new(Hold::default());
        self.holds.lock().insert((call, nth), hold.clone());
        hold
    }

    /// Returns how often `call` was made, failed calls included.
    #[must_use]
    pub fn count(&self, call: Call) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    /// Returns all calls in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls made.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the number of validate and fix calls made.
    #[must_use]
    pub fn refinement_calls(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.is_refinement()).count()
    }

    /// Returns the sum of all usage the scripted services reported.
    #[must_use]
    pub fn reported_usage(&self) -> UsageCounters {
        *self.reported.lock()
    }

    /// Records a call, waits on its hold and applies its failure.
    async fn enter(&self, call: Call) -> Result<usize, DeckflowError> {
        let (seq, nth) = {
            let mut calls = self.calls.lock();
            calls.push(call);
            let nth = calls.iter().filter(|c| **c == call).count();
            (calls.len(), nth)
        };
        let hold = self.holds.lock().get(&(call, nth)).cloned();
        if let Some(hold) = hold {
            hold.reached.notify_one();
            hold.release.notified().await;
        }
        let failure = self
            .failures
            .lock()
            .get(&call)
            .filter(|(at, _)| *at == nth)
            .map(|(_, err)| err.clone());
        match failure {
            Some(err) => Err(err),
            None => Ok(seq),
        }
    }

    /// Produces a deterministic, call-dependent usage delta and records it.
    fn bill(&self, seq: usize) -> UsageDelta {
        let seq = u64::try_from(seq).unwrap_or(u64::MAX);
        let delta = UsageDelta::new(100 + seq, 10 + seq % 7);
        *self.reported.lock() += delta;
        delta
    }
}

/// Validator scores popped in order, then a fallback score forever.
#[derive(Debug)]
pub struct ScoreScript {
    scores: Mutex<VecDeque<i64>>,
    fallback: i64,
}

impl ScoreScript {
    /// Creates a script.
    #[must_use]
    pub fn new(scores: impl IntoIterator<Item = i64>, fallback: i64) -> Self {
        Self {
            scores: Mutex::new(scores.into_iter().collect()),
            fallback,
        }
    }

    /// Always returns `score`.
    #[must_use]
    pub fn constant(score: i64) -> Self {
        Self::new([], score)
    }

    /// Replaces the scripted scores.
    pub fn set(&self, scores: impl IntoIterator<Item = i64>) {
        *self.scores.lock() = scores.into_iter().collect();
    }

    fn next(&self) -> i64 {
        self.scores.lock().pop_front().unwrap_or(self.fallback)
    }
}

impl Default for ScoreScript {
    fn default() -> Self {
        Self::constant(100)
    }
}

/// Outline service producing one slide per requested slide.
#[derive(Debug)]
pub struct ScriptedOutlineService {
    log: Arc<CallLog>,
    /// Scores returned by `validate_outline`.
    pub scores: ScoreScript,
}

impl ScriptedOutlineService {
    /// Creates the service.
    #[must_use]
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            scores: ScoreScript::default(),
        }
    }
}

#[async_trait]
impl OutlineService for ScriptedOutlineService {
    async fn generate_outline(&self, topic: &TopicSpec) -> Result<Metered<Outline>, DeckflowError> {
        let seq = self.log.enter(Call::GenerateOutline).await?;
        let slides = (1..=topic.slide_count)
            .map(|n| SlideOutline::new(format!("{} part {n}", topic.topic), format!("Aspect {n}"), n))
            .collect();
        Ok(Metered::new(
            Outline::new(format!("All About {}", topic.topic), slides),
            self.log.bill(seq),
        ))
    }

    async fn validate_outline(
        &self,
        _topic: &TopicSpec,
        _outline: &Outline,
    ) -> Result<Metered<ValidationResult>, DeckflowError> {
        let seq = self.log.enter(Call::ValidateOutline).await?;
        Ok(Metered::new(
            ValidationResult::new(self.scores.next(), "outline feedback"),
            self.log.bill(seq),
        ))
    }

    async fn fix_outline(
        &self,
        outline: &Outline,
        _feedback: &ValidationResult,
    ) -> Result<Metered<Outline>, DeckflowError> {
        let seq = self.log.enter(Call::FixOutline).await?;
        let mut fixed = outline.clone();
        fixed.title = format!("{} (revised)", outline.title);
        Ok(Metered::new(fixed, self.log.bill(seq)))
    }
}

/// Content service producing content derived from the slide outline.
#[derive(Debug)]
pub struct ScriptedContentService {
    log: Arc<CallLog>,
    /// Scores returned by `validate_content`.
    pub scores: ScoreScript,
}

impl ScriptedContentService {
    /// Creates the service.
    #[must_use]
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            scores: ScoreScript::default(),
        }
    }
}

#[async_trait]
impl ContentService for ScriptedContentService {
    async fn generate_content(
        &self,
        title: &str,
        slide: &SlideOutline,
    ) -> Result<Metered<SlideContent>, DeckflowError> {
        let seq = self.log.enter(Call::GenerateContent).await?;
        let content = SlideContent::new(
            vec![format!("{title}: {}", slide.title), slide.focus.clone()],
            format!("Narration for slide {}", slide.slide_number),
            format!("illustration of {}", slide.title),
        );
        Ok(Metered::new(content, self.log.bill(seq)))
    }

    async fn validate_content(
        &self,
        _title: &str,
        _slide: &SlideOutline,
        _content: &SlideContent,
    ) -> Result<Metered<ValidationResult>, DeckflowError> {
        let seq = self.log.enter(Call::ValidateContent).await?;
        Ok(Metered::new(
            ValidationResult::new(self.scores.next(), "content feedback"),
            self.log.bill(seq),
        ))
    }

    async fn fix_content(
        &self,
        _title: &str,
        _slide: &SlideOutline,
        content: &SlideContent,
        _feedback: &ValidationResult,
    ) -> Result<Metered<SlideContent>, DeckflowError> {
        let seq = self.log.enter(Call::FixContent).await?;
        let mut fixed = content.clone();
        fixed.voiceover_text = format!("{} (revised)", content.voiceover_text);
        Ok(Metered::new(fixed, self.log.bill(seq)))
    }
}

/// Image service naming images after the model and a running counter.
#[derive(Debug)]
pub struct ScriptedImageService {
    log: Arc<CallLog>,
    /// Scores returned by `validate_image`.
    pub scores: ScoreScript,
    models: Mutex<Vec<String>>,
}

impl ScriptedImageService {
    /// Creates the service.
    #[must_use]
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            scores: ScoreScript::default(),
            models: Mutex::new(Vec::new()),
        }
    }

    /// Returns the model of every `generate_image` call.
    #[must_use]
    pub fn models_used(&self) -> Vec<String> {
        self.models.lock().clone()
    }
}

#[async_trait]
impl ImageService for ScriptedImageService {
    async fn generate_image(&self, _prompt: &str, model: &str) -> Result<ImageHandle, DeckflowError> {
        self.log.enter(Call::GenerateImage).await?;
        let index = {
            let mut models = self.models.lock();
            models.push(model.to_string());
            models.len()
        };
        Ok(ImageHandle::new(format!("images/{model}/{index}.png")))
    }

    async fn validate_image(
        &self,
        _image: &ImageHandle,
        _content: &SlideContent,
    ) -> Result<Metered<ValidationResult>, DeckflowError> {
        let seq = self.log.enter(Call::ValidateImage).await?;
        Ok(Metered::new(
            ValidationResult::new(self.scores.next(), "image feedback"),
            self.log.bill(seq),
        ))
    }

    async fn fix_image_prompt(
        &self,
        content: &SlideContent,
        _feedback: &ValidationResult,
    ) -> Result<Metered<SlideContent>, DeckflowError> {
        let seq = self.log.enter(Call::FixImagePrompt).await?;
        let prompt = format!("{}, refined", content.image_prompt);
        Ok(Metered::new(content.with_image_prompt(prompt), self.log.bill(seq)))
    }
}

/// Speech service returning one audio file per slide.
#[derive(Debug)]
pub struct ScriptedSpeechService {
    log: Arc<CallLog>,
    requests: Mutex<Vec<SpeechRequest>>,
}

impl ScriptedSpeechService {
    /// Creates the service.
    #[must_use]
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns every synthesis request received.
    #[must_use]
    pub fn requests(&self) -> Vec<SpeechRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SpeechService for ScriptedSpeechService {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<AudioHandle, DeckflowError> {
        self.requests.lock().push(request.clone());
        self.log.enter(Call::Synthesize).await.map_err(|e| {
            DeckflowError::synthesis(request.slide_number, e.to_string())
        })?;
        Ok(AudioHandle::new(format!(
            "audio/{}/slide_{}.mp3",
            request.job_id, request.slide_number
        )))
    }
}

/// Storage collaborator keeping everything it is given.
#[derive(Debug)]
pub struct RecordingStore {
    log: Arc<CallLog>,
    jobs: Mutex<Vec<JobRecord>>,
    slides: Mutex<HashMap<Uuid, Vec<SlideRecord>>>,
}

impl RecordingStore {
    /// Creates the store.
    #[must_use]
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            jobs: Mutex::new(Vec::new()),
            slides: Mutex::new(HashMap::new()),
        }
    }

    /// Returns all persisted job records.
    #[must_use]
    pub fn job_records(&self) -> Vec<JobRecord> {
        self.jobs.lock().clone()
    }

    /// Returns the slides persisted for a job.
    #[must_use]
    pub fn slides_for(&self, job_id: Uuid) -> Option<Vec<SlideRecord>> {
        self.slides.lock().get(&job_id).cloned()
    }
}

#[async_trait]
impl PresentationStore for RecordingStore {
    async fn persist_job(&self, record: &JobRecord) -> Result<(), DeckflowError> {
        self.log
            .enter(Call::PersistJob)
            .await
            .map_err(|e| DeckflowError::File(e.to_string()))?;
        self.jobs.lock().push(record.clone());
        Ok(())
    }

    async fn persist_slides(&self, job_id: Uuid, slides: &[SlideRecord]) -> Result<(), DeckflowError> {
        self.log
            .enter(Call::PersistSlides)
            .await
            .map_err(|e| DeckflowError::File(e.to_string()))?;
        self.slides.lock().insert(job_id, slides.to_vec());
        Ok(())
    }
}

/// Exporter remembering what it exported.
#[derive(Debug)]
pub struct RecordingExporter {
    log: Arc<CallLog>,
    exported: Mutex<Vec<Uuid>>,
}

impl RecordingExporter {
    /// Creates the exporter.
    #[must_use]
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            exported: Mutex::new(Vec::new()),
        }
    }

    /// Returns the ids of exported presentations.
    #[must_use]
    pub fn exported(&self) -> Vec<Uuid> {
        self.exported.lock().clone()
    }
}

#[async_trait]
impl DeckExporter for RecordingExporter {
    async fn export_deck(&self, presentation: &Presentation) -> Result<PathBuf, DeckflowError> {
        self.log
            .enter(Call::ExportDeck)
            .await
            .map_err(|e| DeckflowError::File(e.to_string()))?;
        self.exported.lock().push(presentation.id());
        Ok(PathBuf::from(format!("exports/presentation_{}.json", presentation.id())))
    }
}

//! Fixtures wiring scripted collaborators into an orchestrator.

use super::mocks::{
    CallLog, RecordingExporter, RecordingStore, ScriptedContentService, ScriptedImageService,
    ScriptedOutlineService, ScriptedSpeechService,
};
use crate::capabilities::Collaborators;
use crate::jobs::JobStatusView;
use crate::orchestrator::Orchestrator;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A full set of scripted collaborators sharing one [`CallLog`].
#[derive(Debug, Clone)]
pub struct ScriptedCollaborators {
    /// The shared call log.
    pub log: Arc<CallLog>,
    /// Outline port.
    pub outline: Arc<ScriptedOutlineService>,
    /// Content port.
    pub content: Arc<ScriptedContentService>,
    /// Image port.
    pub image: Arc<ScriptedImageService>,
    /// Speech port.
    pub speech: Arc<ScriptedSpeechService>,
    /// Storage port.
    pub store: Arc<RecordingStore>,
    /// Export port.
    pub exporter: Arc<RecordingExporter>,
}

impl ScriptedCollaborators {
    /// Creates collaborators whose validators accept everything.
    #[must_use]
    pub fn new() -> Self {
        let log = CallLog::new();
        Self {
            outline: Arc::new(ScriptedOutlineService::new(log.clone())),
            content: Arc::new(ScriptedContentService::new(log.clone())),
            image: Arc::new(ScriptedImageService::new(log.clone())),
            speech: Arc::new(ScriptedSpeechService::new(log.clone())),
            store: Arc::new(RecordingStore::new(log.clone())),
            exporter: Arc::new(RecordingExporter::new(log.clone())),
            log,
        }
    }

    /// Returns the collaborator set, every port included.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(self.outline.clone(), self.content.clone(), self.image.clone())
            .with_speech(self.speech.clone())
            .with_store(self.store.clone())
            .with_exporter(self.exporter.clone())
    }
}

impl Default for ScriptedCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls until the job is terminal. Panics after ten seconds.
pub async fn wait_for_terminal(orchestrator: &Orchestrator, job_id: Uuid) -> JobStatusView {
    let poll = async {
        loop {
            let view = orchestrator
                .get_status(job_id)
                .expect("job must exist while polling");
            if view.status.is_terminal() {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), poll)
        .await
        .expect("job did not finish in time")
}

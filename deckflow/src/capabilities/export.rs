//! JSON file exporter.

use super::DeckExporter;
use crate::core::Presentation;
use crate::errors::DeckflowError;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Writes each presentation as `presentation_<id>.json` under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileExporter {
    directory: PathBuf,
}

impl JsonFileExporter {
    /// Creates an exporter writing into `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Returns the path a presentation would be written to.
    #[must_use]
    pub fn path_for(&self, presentation: &Presentation) -> PathBuf {
        self.directory
            .join(format!("presentation_{}.json", presentation.id()))
    }
}

#[async_trait]
impl DeckExporter for JsonFileExporter {
    async fn export_deck(&self, presentation: &Presentation) -> Result<PathBuf, DeckflowError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.path_for(presentation);
        let body = serde_json::to_vec_pretty(presentation)?;
        tokio::fs::write(&path, body).await?;
        debug!(path = %path.display(), "Exported presentation");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        ImageHandle, PresentationBuilder, SlideContent, SlideOutline, TopicSpec, UsageCounters,
    };
    use uuid::Uuid;

    fn presentation() -> Presentation {
        let mut builder =
            PresentationBuilder::new(Uuid::new_v4(), TopicSpec::new("Bees", 2), "All About Bees");
        for n in 1..=2 {
            builder
                .push_slide(
                    &SlideOutline::new(format!("S{n}"), "focus", n),
                    SlideContent::new(vec!["line".into()], "voice", "prompt"),
                    &ImageHandle::new(format!("img/{n}.png")),
                    None,
                )
                .unwrap();
        }
        builder.build(UsageCounters::default(), 42).unwrap()
    }

    #[tokio::test]
    async fn test_export_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonFileExporter::new(dir.path().join("outputs"));
        let presentation = presentation();

        let path = exporter.export_deck(&presentation).await.unwrap();

        assert!(path.ends_with(format!("presentation_{}.json", presentation.id())));
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["title"], "All About Bees");
        assert_eq!(written["slides"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_export_into_file_path_fails_as_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();

        let exporter = JsonFileExporter::new(&blocker);
        let err = exporter.export_deck(&presentation()).await.unwrap_err();
        assert_eq!(err.kind(), "FileError");
    }
}

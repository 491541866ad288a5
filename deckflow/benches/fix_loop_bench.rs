//! Benchmarks for the fix loop and whole-job orchestration.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use deckflow::config::{PipelineConfig, StagePolicy};
use deckflow::core::{SlideContent, TopicSpec, UsageAccountant};
use deckflow::jobs::JobOptions;
use deckflow::orchestrator::Orchestrator;
use deckflow::refine::NoOpObserver;
use deckflow::stages::ImageStage;
use deckflow::testing::{CallLog, ScriptedCollaborators, ScriptedImageService};
use tokio::runtime::Runtime;

fn image_search_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let content = SlideContent::new(vec!["Tides".into()], "Narration", "illustration of tides");
    let stage = ImageStage::new(StagePolicy::new(10, 5), true, "fal-ai/recraft-20b");

    c.bench_function("image_search_exhausted", |b| {
        b.iter(|| {
            let service = ScriptedImageService::new(CallLog::new());
            service.scores.set([3, 7, 2, 9, 5]);
            rt.block_on(async {
                let mut usage = UsageAccountant::new();
                let outcome = stage
                    .run(&service, &content, &mut usage, &NoOpObserver)
                    .await
                    .expect("image search");
                black_box(outcome.selected_attempt)
            })
        });
    });
}

fn job_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    c.bench_function("agentic_job_10_slides", |b| {
        b.iter(|| {
            let fixture = ScriptedCollaborators::new();
            fixture.content.scores.set([0, 0]);
            let orchestrator =
                Orchestrator::new(PipelineConfig::strict(), fixture.collaborators())
                    .expect("config");
            rt.block_on(async {
                let handle = orchestrator
                    .submit(
                        TopicSpec::new("Ocean tides", 10),
                        JobOptions::new().with_agentic(true),
                    )
                    .await
                    .expect("submit");
                black_box(handle.wait().await.expect("job"))
            })
        });
    });
}

criterion_group!(benches, image_search_benchmark, job_benchmark);
criterion_main!(benches);

use std::{
    collections::VecDeque,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use reelsmith_core::{
    AcquisitionError, Pipeline, ReelsmithError, Result, SnapshotStore, Stage, Target,
    analysis::{
        AnnotationPayload, SpeechToText, TranscriptionNormalizer, TranscriptionResponse,
        VideoAnnotator, VisionInsightNormalizer,
    },
    generation::{
        CompletionRequest, ConstrainedGenerator, GenerativeModel, ScenarioSynthesizer,
        StoryboardPlanner,
    },
    media::{FetchedMedia, MediaFetcher, Transcoder, TransientMediaAcquirer},
};
use serde_json::{Value, json};

struct Fetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl MediaFetcher for Fetcher {
    async fn fetch(&self, _url: &str, work_dir: &Path) -> std::result::Result<FetchedMedia, AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = work_dir.join("source.mp4");
        tokio::fs::write(&path, vec![0u8; 16 * 1024]).await?;
        Ok(FetchedMedia { path })
    }
}

struct Transcode;

#[async_trait]
impl Transcoder for Transcode {
    async fn extract_audio(
        &self,
        _input: &Path,
        output: &Path,
        _max_seconds: u32,
    ) -> std::result::Result<(), AcquisitionError> {
        tokio::fs::write(output, vec![0u8; 16 * 1024]).await?;
        Ok(())
    }
}

struct Stt {
    fail: bool,
}

#[async_trait]
impl SpeechToText for Stt {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResponse> {
        assert!(audio_path.exists());
        if self.fail {
            return Err(ReelsmithError::UpstreamStatus {
                service: "openai-transcription",
                status: 500,
                body: "overloaded".into(),
            });
        }
        let Value::Object(map) = json!({
            "language": "english",
            "segments": [
                {"text": "Three ways to brew coffee", "start": 0.0, "end": 2.5},
                {"text": "Number one: the pour-over", "start": 2.5, "end": 5.0}
            ]
        }) else {
            unreachable!()
        };
        Ok(TranscriptionResponse::Mapping(map))
    }
}

struct Annotator;

#[async_trait]
impl VideoAnnotator for Annotator {
    async fn annotate(&self, video_path: &Path) -> Result<AnnotationPayload> {
        assert!(video_path.exists());
        Ok(AnnotationPayload::Mapping(json!({
            "annotationResults": [{
                "shotAnnotations": [{"startTimeOffset": "0s", "endTimeOffset": "5s"}],
                "shotLabelAnnotations": [{
                    "entity": {"description": "Car"},
                    "categoryEntities": [{"description": "Vehicle"}],
                    "segments": [{
                        "segment": {"startTimeOffset": {"seconds": 1}, "endTimeOffset": {"seconds": 4, "nanos": 500000000}},
                        "confidence": 0.95
                    }]
                }]
            }]
        })))
    }
}

struct Model {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl Model {
    fn new(replies: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|v| v.to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GenerativeModel for Model {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ReelsmithError::Config("no scripted reply left".into()))
    }
}

fn scenario_reply() -> Value {
    json!({
        "scenes": [
            {"duration_sec": 25, "visual_description": "Чашка на столе", "voice_lines": [{"role": "ведущий", "text": "Три способа заварить кофе"}]},
            {"duration_sec": 25, "visual_description": "Пуровер крупным планом", "voice_lines": []}
        ],
        "meta": {"topic": "кофе", "source": "abc123"}
    })
}

fn storyboard_reply(total: u32) -> Value {
    json!({
        "scenes": [{
            "duration_sec": total,
            "visual_description": "Чашка на столе",
            "voice_lines": [],
            "broll_hints": ["зерна"],
            "tempo": "быстрый",
            "transitions": "склейка"
        }],
        "total_duration_sec": total,
        "target": "shorts"
    })
}

struct Harness {
    pipeline: Pipeline,
    fetcher: Arc<Fetcher>,
    model: Arc<Model>,
    work: tempfile::TempDir,
    data: tempfile::TempDir,
}

fn harness(stt_fails: bool, replies: Vec<Value>) -> Harness {
    let work = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(Fetcher {
        calls: AtomicUsize::new(0),
    });
    let model = Model::new(replies);
    let generator = Arc::new(ConstrainedGenerator::new(model.clone()));

    let pipeline = Pipeline::new(
        TransientMediaAcquirer::new(fetcher.clone(), Arc::new(Transcode), work.path()),
        TranscriptionNormalizer::new(Arc::new(Stt { fail: stt_fails })),
        VisionInsightNormalizer::new(Arc::new(Annotator)),
        ScenarioSynthesizer::new(generator.clone()),
        StoryboardPlanner::new(generator),
    )
    .with_snapshots(SnapshotStore::new(data.path()));

    Harness {
        pipeline,
        fetcher,
        model,
        work,
        data,
    }
}

#[tokio::test]
async fn full_run_produces_all_artifacts() {
    let h = harness(false, vec![scenario_reply(), storyboard_reply(30), storyboard_reply(50)]);

    let output = h.pipeline.run("abc123", "кофе", Target::Shorts).await.unwrap();

    assert_eq!(output.video_id, "abc123");
    assert_eq!(output.analysis.transcript.segments.len(), 2);
    assert_eq!(output.analysis.shots.len(), 1);
    assert_eq!(output.analysis.key_objects[0].description, "Car");
    assert_eq!(output.analysis.key_objects[0].end_sec, 4.5);
    assert_eq!(output.scenario.scenes.len(), 2);
    assert_eq!(output.storyboard.total_duration_sec, 50);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 3);

    assert!(h.data.path().join("abc123/transcript.json").exists());
    assert!(h.data.path().join("abc123/vision.json").exists());
    assert_eq!(std::fs::read_dir(h.work.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn stored_analysis_is_reused() {
    let h = harness(false, vec![scenario_reply(), scenario_reply()]);

    h.pipeline.scenario("abc123", "кофе", true).await.unwrap();
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);

    h.pipeline.scenario("abc123", "кофе", true).await.unwrap();
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failures_name_their_stage() {
    let h = harness(true, vec![]);

    let err = h.pipeline.run("abc123", "кофе", Target::Shorts).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Transcribe));
    assert!(err.to_string().contains("abc123"));
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read_dir(h.work.path()).unwrap().count(), 0);
    assert!(!h.data.path().join("abc123").exists());
}

#[tokio::test]
async fn exhausted_storyboard_aborts_the_run() {
    let h = harness(
        false,
        vec![scenario_reply(), storyboard_reply(30), storyboard_reply(90)],
    );

    let err = h.pipeline.run("abc123", "кофе", Target::Shorts).await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Storyboard));
    match err {
        ReelsmithError::Stage { source, .. } => {
            assert!(matches!(*source, ReelsmithError::Generation { attempts: 2, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

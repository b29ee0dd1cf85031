//! In-process stand-ins for the camera, tracking and remote services.
//!
//! They behave like the real collaborators from the coordinator's point of view: the camera
//! is empty for a few polls, every service answers after a random delay, and the loader
//! parents a `LoadedModel` node under the anchor.

use crate::common::{
    AssetReference, CapturedFrame, LandmarkId, NarrationText, RawCameraImage, ViewerPose,
};
use crate::config::Configuration;
use crate::error::{AppError, ServiceError};
use crate::narration::NarrationPrompt;
use crate::pipeline::{PipelineCoordinator, RunStatsMonitor};
use crate::ports::{
    AssetLoader, AssetLookupService, FrameSource, NarrationService, RecognitionService,
    SpeechService, ViewerTracker,
};
use crate::spatial::{AnchorHandle, AttachedContent, SingleAnchorPlacer, LOADED_MODEL_NODE};
use crate::speech::{SpeechClip, SPEECH_SAMPLE_RATE};
use async_trait::async_trait;
use chrono::Utc;
use nalgebra::{Point3, Vector3};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;

/// Random service latency within a configured range
#[derive(Debug, Clone, Copy)]
pub struct Latency {
    min_ms: u64,
    max_ms: u64,
}

impl Latency {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: max_ms.max(min_ms),
        }
    }

    pub async fn wait(&self) {
        let millis = rand::rng().random_range(self.min_ms..=self.max_ms);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

/// Camera that has no image for the first `warmup_polls` requests.
pub struct WarmingCamera {
    warmup_polls: u32,
    polls: AtomicU32,
}

impl WarmingCamera {
    pub fn new(warmup_polls: u32) -> Self {
        Self {
            warmup_polls,
            polls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl FrameSource for WarmingCamera {
    async fn acquire(&self) -> Option<CapturedFrame> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        if poll < self.warmup_polls {
            return None;
        }
        let raw = RawCameraImage {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            rgba: vec![128; (FRAME_WIDTH * FRAME_HEIGHT * 4) as usize],
        };
        raw.into_frame(true).map(|frame| {
            frame.with_release_hook(|id| debug!("Camera buffer for frame {} returned", id))
        })
    }
}

/// Viewer standing still at eye height, looking down +Z.
pub struct StandingViewer;

impl ViewerTracker for StandingViewer {
    fn viewer_pose(&self) -> ViewerPose {
        ViewerPose::new(Point3::new(0.0, 1.6, 0.0), Vector3::z())
    }
}

/// Recognizer that always sees the same landmark
pub struct ScriptedRecognizer {
    answer: String,
    latency: Latency,
}

impl ScriptedRecognizer {
    pub fn new(answer: impl Into<String>, latency: Latency) -> Self {
        Self {
            answer: answer.into(),
            latency,
        }
    }
}

#[async_trait]
impl RecognitionService for ScriptedRecognizer {
    async fn identify(&self, frame: &CapturedFrame) -> Result<LandmarkId, ServiceError> {
        debug!("Recognizing frame {}", frame.id());
        self.latency.wait().await;
        Ok(LandmarkId::from_raw(&self.answer))
    }
}

/// Asset catalogue keyed by landmark name (case-insensitive)
pub struct AssetCatalog {
    entries: HashMap<String, String>,
    latency: Latency,
}

impl AssetCatalog {
    pub fn new(latency: Latency) -> Self {
        Self {
            entries: HashMap::new(),
            latency,
        }
    }

    pub fn with_entry(mut self, landmark: &str, url: &str) -> Self {
        self.entries.insert(landmark.to_lowercase(), url.to_string());
        self
    }
}

#[async_trait]
impl AssetLookupService for AssetCatalog {
    async fn search(&self, landmark: &LandmarkId) -> Result<Option<AssetReference>, ServiceError> {
        self.latency.wait().await;
        Ok(landmark
            .name()
            .and_then(|name| self.entries.get(&name.to_lowercase()))
            .and_then(AssetReference::parse))
    }
}

/// Loader that "downloads" for a while, then parents a model node under the anchor
pub struct SimulatedLoader {
    latency: Latency,
}

impl SimulatedLoader {
    pub fn new(latency: Latency) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl AssetLoader for SimulatedLoader {
    async fn load(
        &self,
        reference: AssetReference,
        anchor: AnchorHandle,
    ) -> Result<(), ServiceError> {
        self.latency.wait().await;
        anchor.attach(AttachedContent {
            name: LOADED_MODEL_NODE.to_string(),
            source: reference,
            attached_at: Utc::now(),
        })
    }
}

/// Narrator that answers the narration prompt with a canned paragraph
pub struct TemplateNarrator {
    min_words: u32,
    max_words: u32,
    latency: Latency,
}

impl TemplateNarrator {
    pub fn new(min_words: u32, max_words: u32, latency: Latency) -> Self {
        Self {
            min_words,
            max_words,
            latency,
        }
    }
}

#[async_trait]
impl NarrationService for TemplateNarrator {
    async fn narrate(&self, landmark: &LandmarkId) -> Result<NarrationText, ServiceError> {
        let Some(prompt) = NarrationPrompt::for_landmark(landmark, self.min_words, self.max_words)
        else {
            return Ok(NarrationText::empty());
        };
        debug!("Narration prompt: {}", prompt.render());
        self.latency.wait().await;
        Ok(NarrationText::new(format!(
            "You are standing before {}. Generations of travellers have stopped at this very spot \
             to take in its scale and the stories carved into its stone.",
            prompt.landmark()
        )))
    }
}

/// Speech that synthesizes a silent clip and "plays" it at a fixed speed-up
pub struct SilentSpeaker {
    words_per_second: f32,
    playback_speedup: u32,
}

impl SilentSpeaker {
    pub fn new(words_per_second: f32, playback_speedup: u32) -> Self {
        Self {
            words_per_second,
            playback_speedup: playback_speedup.max(1),
        }
    }
}

#[async_trait]
impl SpeechService for SilentSpeaker {
    async fn speak(&self, text: &NarrationText) -> Result<(), ServiceError> {
        if self.words_per_second <= 0.0 {
            return Err(ServiceError::Rejected("speaking rate must be positive".into()));
        }
        let seconds = text.word_count() as f32 / self.words_per_second;
        let sample_count = (seconds * SPEECH_SAMPLE_RATE as f32) as usize;
        let clip = SpeechClip::from_linear16(&vec![0u8; sample_count * 2], SPEECH_SAMPLE_RATE);
        debug!("Playing {:?} of narration audio", clip.duration());
        tokio::time::sleep(clip.duration() / self.playback_speedup).await;
        Ok(())
    }
}

/// Wire a coordinator to the simulated collaborators described by `configuration.demo`.
pub fn demo_coordinator(
    configuration: &Configuration,
) -> Result<(PipelineCoordinator, RunStatsMonitor), AppError> {
    let demo = &configuration.demo;
    let latency = Latency::new(demo.min_latency_ms, demo.max_latency_ms);
    let monitor = RunStatsMonitor::new();

    let coordinator = PipelineCoordinator::builder(configuration.clone())
        .frame_source(Arc::new(WarmingCamera::new(demo.failed_polls)))
        .viewer_tracker(Arc::new(StandingViewer))
        .recognition(Arc::new(ScriptedRecognizer::new(demo.landmark.clone(), latency)))
        .asset_lookup(Arc::new(
            AssetCatalog::new(latency).with_entry(&demo.landmark, &demo.asset_url),
        ))
        .spatial_placer(Arc::new(SingleAnchorPlacer::new()))
        .asset_loader(Arc::new(SimulatedLoader::new(latency)))
        .narration(Arc::new(TemplateNarrator::new(
            configuration.narration_min_words,
            configuration.narration_max_words,
            latency,
        )))
        .speech(Arc::new(SilentSpeaker::new(2.5, 10)))
        .observer(Box::new(monitor.clone()))
        .build()?;

    Ok((coordinator, monitor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Outcome;

    #[tokio::test(start_paused = true)]
    async fn warming_camera_needs_warmup_polls() {
        let camera = WarmingCamera::new(2);
        assert!(camera.acquire().await.is_none());
        assert!(camera.acquire().await.is_none());
        let frame = camera.acquire().await.expect("frame after warmup");
        assert_eq!((frame.width(), frame.height()), (FRAME_WIDTH, FRAME_HEIGHT));
    }

    #[tokio::test(start_paused = true)]
    async fn catalog_lookup_ignores_case() {
        let catalog = AssetCatalog::new(Latency::new(0, 0))
            .with_entry("India Gate", "https://example.com/gate.glb");
        let found = catalog
            .search(&LandmarkId::from_raw("india gate"))
            .await
            .unwrap();
        assert_eq!(found.unwrap().as_str(), "https://example.com/gate.glb");
        assert!(catalog
            .search(&LandmarkId::from_raw("Unknown Ruins"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn demo_coordinator_completes_a_run() {
        let (coordinator, monitor) = demo_coordinator(&Configuration::default()).expect("demo");
        let report = coordinator.trigger().into_handle().expect("started").wait().await;

        assert_eq!(report.outcome, Outcome::Success);
        assert_eq!(report.landmark.as_deref(), Some("India Gate"));
        assert_eq!(monitor.stats().successes, 1);
    }
}

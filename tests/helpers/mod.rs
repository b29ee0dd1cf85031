#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use image::RgbaImage;
use landmark_narrator::common::{
    AssetReference, CapturedFrame, FrameId, LandmarkId, NarrationText, Placement, ViewerPose,
};
use landmark_narrator::config::Configuration;
use landmark_narrator::error::ServiceError;
use landmark_narrator::pipeline::{PipelineCoordinator, RunStatsMonitor};
use landmark_narrator::ports::{
    AssetLoader, AssetLookupService, FrameSource, NarrationService, RecognitionService,
    SpatialPlacer, SpeechService, ViewerTracker,
};
use landmark_narrator::spatial::{
    AnchorHandle, AttachedContent, SingleAnchorPlacer, LOADED_MODEL_NODE,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

/// Every collaborator call, in the order the coordinator made it.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Acquire,
    Released(FrameId),
    Identify(FrameId),
    Search(String),
    Place(Placement),
    Load { asset: String, anchor: Uuid },
    Narrate(String),
    Speak(String),
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(|call| predicate(call))
    }

    pub fn identified_frames(&self) -> Vec<FrameId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Identify(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn released_frames(&self) -> Vec<FrameId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Released(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

pub fn is_search(call: &Call) -> bool {
    matches!(call, Call::Search(_))
}

pub fn is_place(call: &Call) -> bool {
    matches!(call, Call::Place(_))
}

pub fn is_narrate(call: &Call) -> bool {
    matches!(call, Call::Narrate(_))
}

pub fn is_speak(call: &Call) -> bool {
    matches!(call, Call::Speak(_))
}

pub fn is_identify(call: &Call) -> bool {
    matches!(call, Call::Identify(_))
}

struct MockCamera {
    empty_polls: Option<u32>,
    polls: AtomicU32,
    log: CallLog,
}

#[async_trait]
impl FrameSource for MockCamera {
    async fn acquire(&self) -> Option<CapturedFrame> {
        self.log.push(Call::Acquire);
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        let empty_polls = self.empty_polls?;
        if poll < empty_polls {
            return None;
        }
        let log = self.log.clone();
        Some(
            CapturedFrame::new(RgbaImage::new(8, 6))
                .with_release_hook(move |id| log.push(Call::Released(id))),
        )
    }
}

struct MockViewer(ViewerPose);

impl ViewerTracker for MockViewer {
    fn viewer_pose(&self) -> ViewerPose {
        self.0
    }
}

struct MockRecognizer {
    answer: Result<String, ServiceError>,
    delay: Duration,
    gate: Option<Arc<Notify>>,
    log: CallLog,
}

#[async_trait]
impl RecognitionService for MockRecognizer {
    async fn identify(&self, frame: &CapturedFrame) -> Result<LandmarkId, ServiceError> {
        self.log.push(Call::Identify(frame.id()));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answer.clone().map(LandmarkId::from_raw)
    }
}

struct MockCatalog {
    answer: Result<Option<String>, ServiceError>,
    log: CallLog,
}

#[async_trait]
impl AssetLookupService for MockCatalog {
    async fn search(&self, landmark: &LandmarkId) -> Result<Option<AssetReference>, ServiceError> {
        self.log.push(Call::Search(landmark.to_string()));
        self.answer
            .clone()
            .map(|answer| answer.and_then(AssetReference::parse))
    }
}

/// Real single-anchor placer with the placement requests logged
pub struct RecordingPlacer {
    inner: SingleAnchorPlacer,
    log: CallLog,
}

impl RecordingPlacer {
    pub fn current(&self) -> Option<AnchorHandle> {
        self.inner.current()
    }

    pub fn anchors_created(&self) -> usize {
        self.inner.anchors_created()
    }
}

impl SpatialPlacer for RecordingPlacer {
    fn place(&self, placement: Placement) -> AnchorHandle {
        self.log.push(Call::Place(placement));
        self.inner.place(placement)
    }

    fn clear(&self) {
        self.inner.clear();
    }
}

struct MockLoader {
    result: Result<(), ServiceError>,
    delay: Duration,
    log: CallLog,
}

#[async_trait]
impl AssetLoader for MockLoader {
    async fn load(
        &self,
        reference: AssetReference,
        anchor: AnchorHandle,
    ) -> Result<(), ServiceError> {
        self.log.push(Call::Load {
            asset: reference.as_str().to_string(),
            anchor: anchor.id(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()?;
        anchor.attach(AttachedContent {
            name: LOADED_MODEL_NODE.to_string(),
            source: reference,
            attached_at: Utc::now(),
        })
    }
}

struct MockNarrator {
    answer: Result<String, ServiceError>,
    delay: Duration,
    log: CallLog,
}

#[async_trait]
impl NarrationService for MockNarrator {
    async fn narrate(&self, landmark: &LandmarkId) -> Result<NarrationText, ServiceError> {
        self.log.push(Call::Narrate(landmark.to_string()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answer.clone().map(NarrationText::new)
    }
}

struct MockSpeaker {
    result: Result<(), ServiceError>,
    log: CallLog,
}

#[async_trait]
impl SpeechService for MockSpeaker {
    async fn speak(&self, text: &NarrationText) -> Result<(), ServiceError> {
        self.log.push(Call::Speak(text.as_str().to_string()));
        self.result.clone()
    }
}

pub const INDIA_GATE_ASSET: &str = "https://assets.example.com/india-gate.glb";
pub const INDIA_GATE_NARRATION: &str =
    "India Gate is a war memorial on the Rajpath in New Delhi, completed in 1931.";

/// Collaborator behaviour for one test
pub struct Scenario {
    /// `None` keeps the camera empty forever
    pub empty_polls: Option<u32>,
    pub viewer: ViewerPose,
    pub landmark: Result<String, ServiceError>,
    pub recognition_delay: Duration,
    pub recognition_gate: Option<Arc<Notify>>,
    pub asset: Result<Option<String>, ServiceError>,
    pub load_result: Result<(), ServiceError>,
    pub load_delay: Duration,
    pub narration: Result<String, ServiceError>,
    pub narration_delay: Duration,
    pub speech_result: Result<(), ServiceError>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            empty_polls: Some(0),
            viewer: ViewerPose::default(),
            landmark: Ok("India Gate".to_string()),
            recognition_delay: Duration::ZERO,
            recognition_gate: None,
            asset: Ok(Some(INDIA_GATE_ASSET.to_string())),
            load_result: Ok(()),
            load_delay: Duration::ZERO,
            narration: Ok(INDIA_GATE_NARRATION.to_string()),
            narration_delay: Duration::ZERO,
            speech_result: Ok(()),
        }
    }
}

pub struct Harness {
    pub coordinator: PipelineCoordinator,
    pub log: CallLog,
    pub placer: Arc<RecordingPlacer>,
    pub monitor: RunStatsMonitor,
}

impl Scenario {
    pub fn build(self) -> Harness {
        self.build_with(Configuration::default())
    }

    pub fn build_with(self, configuration: Configuration) -> Harness {
        let log = CallLog::default();
        let monitor = RunStatsMonitor::new();
        let placer = Arc::new(RecordingPlacer {
            inner: SingleAnchorPlacer::new(),
            log: log.clone(),
        });

        let coordinator = PipelineCoordinator::builder(configuration)
            .frame_source(Arc::new(MockCamera {
                empty_polls: self.empty_polls,
                polls: AtomicU32::new(0),
                log: log.clone(),
            }))
            .viewer_tracker(Arc::new(MockViewer(self.viewer)))
            .recognition(Arc::new(MockRecognizer {
                answer: self.landmark,
                delay: self.recognition_delay,
                gate: self.recognition_gate,
                log: log.clone(),
            }))
            .asset_lookup(Arc::new(MockCatalog {
                answer: self.asset,
                log: log.clone(),
            }))
            .spatial_placer(placer.clone())
            .asset_loader(Arc::new(MockLoader {
                result: self.load_result,
                delay: self.load_delay,
                log: log.clone(),
            }))
            .narration(Arc::new(MockNarrator {
                answer: self.narration,
                delay: self.narration_delay,
                log: log.clone(),
            }))
            .speech(Arc::new(MockSpeaker {
                result: self.speech_result,
                log: log.clone(),
            }))
            .observer(Box::new(monitor.clone()))
            .build()
            .expect("coordinator builds");

        Harness {
            coordinator,
            log,
            placer,
            monitor,
        }
    }
}

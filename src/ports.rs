//! Collaborators consumed by the pipeline coordinator.
//!
//! Each trait is the narrow contract the coordinator needs from one external subsystem.
//! Remote-service failures come back as [`ServiceError`]; the coordinator folds them into
//! the same early exits it uses for empty answers.

use crate::common::{
    AssetReference, CapturedFrame, LandmarkId, NarrationText, Placement, ViewerPose,
};
use crate::error::ServiceError;
use crate::spatial::AnchorHandle;
use async_trait::async_trait;
use std::sync::Arc;

/// Produces the latest camera image, or `None` while the camera has nothing yet.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn acquire(&self) -> Option<CapturedFrame>;
}

/// Reports where the viewer is and where they are looking.
pub trait ViewerTracker: Send + Sync {
    fn viewer_pose(&self) -> ViewerPose;
}

#[async_trait]
pub trait RecognitionService: Send + Sync {
    async fn identify(&self, frame: &CapturedFrame) -> Result<LandmarkId, ServiceError>;
}

#[async_trait]
pub trait AssetLookupService: Send + Sync {
    async fn search(&self, landmark: &LandmarkId) -> Result<Option<AssetReference>, ServiceError>;
}

/// Owns the anchor. Placement either succeeds or is fatal to the process.
pub trait SpatialPlacer: Send + Sync {
    fn place(&self, placement: Placement) -> AnchorHandle;
    fn clear(&self);
}

/// Loads an asset and parents it under the anchor.
#[async_trait]
pub trait AssetLoader: Send + Sync {
    async fn load(
        &self,
        reference: AssetReference,
        anchor: AnchorHandle,
    ) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait NarrationService: Send + Sync {
    async fn narrate(&self, landmark: &LandmarkId) -> Result<NarrationText, ServiceError>;
}

/// Synthesizes and plays narration; resolves once playback has completed.
#[async_trait]
pub trait SpeechService: Send + Sync {
    async fn speak(&self, text: &NarrationText) -> Result<(), ServiceError>;
}

/// The full set of collaborators a coordinator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub frames: Arc<dyn FrameSource>,
    pub viewer: Arc<dyn ViewerTracker>,
    pub recognition: Arc<dyn RecognitionService>,
    pub lookup: Arc<dyn AssetLookupService>,
    pub placer: Arc<dyn SpatialPlacer>,
    pub loader: Arc<dyn AssetLoader>,
    pub narration: Arc<dyn NarrationService>,
    pub speech: Arc<dyn SpeechService>,
}

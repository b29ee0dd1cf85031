pub mod frame;
pub mod geometry;
pub mod landmark;

pub use frame::{CapturedFrame, FrameId, RawCameraImage};
pub use geometry::{Placement, PlacementPolicy, ViewerPose};
pub use landmark::{AssetReference, LandmarkId, NarrationText};

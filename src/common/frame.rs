use chrono::{DateTime, Utc};
use image::{imageops, RgbaImage};
use std::fmt;
use uuid::Uuid;

pub type FrameId = Uuid;

type ReleaseHook = Box<dyn FnOnce(FrameId) + Send + Sync>;

/// A camera image owned by a single pipeline run.
///
/// The frame is released exactly once: either through [`CapturedFrame::release`] or when it
/// is dropped on an early exit. A release hook registered by the frame source observes that
/// moment, which is where platform buffers get returned.
pub struct CapturedFrame {
    id: FrameId,
    image: RgbaImage,
    captured_at: DateTime<Utc>,
    on_release: Option<ReleaseHook>,
}

impl CapturedFrame {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            image,
            captured_at: Utc::now(),
            on_release: None,
        }
    }

    pub fn with_release_hook(mut self, hook: impl FnOnce(FrameId) + Send + Sync + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Dispose of the frame. Consuming `self` makes a second release impossible.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for CapturedFrame {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook(self.id);
        }
    }
}

impl fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("id", &self.id)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// Pixel data as handed over by the camera, RGBA32 at native resolution.
#[derive(Debug, Clone)]
pub struct RawCameraImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl RawCameraImage {
    /// Convert into a frame. Camera CPU images arrive bottom-up, so `mirror_y` flips rows.
    /// Returns `None` when the buffer does not match the dimensions.
    pub fn into_frame(self, mirror_y: bool) -> Option<CapturedFrame> {
        let mut image = RgbaImage::from_raw(self.width, self.height, self.rgba)?;
        if mirror_y {
            imageops::flip_vertical_in_place(&mut image);
        }
        Some(CapturedFrame::new(image))
    }
}

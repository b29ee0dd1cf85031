use nalgebra::{Point3, UnitQuaternion, Vector3};

const DEGENERATE_EPSILON: f32 = 1e-4;

/// Viewer position and viewing direction in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewerPose {
    pub position: Point3<f32>,
    pub forward: Vector3<f32>,
}

impl ViewerPose {
    pub fn new(position: Point3<f32>, forward: Vector3<f32>) -> Self {
        Self { position, forward }
    }
}

impl Default for ViewerPose {
    fn default() -> Self {
        Self {
            position: Point3::origin(),
            forward: Vector3::z(),
        }
    }
}

/// World pose for an anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Placement {
    pub fn new(position: Point3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self { position, rotation }
    }

    /// Direction the placed content's local +Z axis points to.
    pub fn facing(&self) -> Vector3<f32> {
        self.rotation * Vector3::z()
    }
}

/// Places content a fixed distance in front of the viewer, turned to face them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementPolicy {
    distance: f32,
}

impl PlacementPolicy {
    pub fn new(distance: f32) -> Self {
        Self { distance }
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn place_in_front(&self, viewer: &ViewerPose) -> Placement {
        let forward = viewer
            .forward
            .try_normalize(DEGENERATE_EPSILON)
            .unwrap_or_else(Vector3::z);
        let position = viewer.position + forward * self.distance;

        let back = -forward;
        // looking straight up or down leaves +Y unusable as the up hint
        let up = if back.cross(&Vector3::y()).norm() < DEGENERATE_EPSILON {
            Vector3::z()
        } else {
            Vector3::y()
        };

        Placement::new(position, UnitQuaternion::face_towards(&back, &up))
    }
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self::new(2.0)
    }
}

//! Camera placement and the per-frame view update.
//!
//! Camera input is handled outside of this crate and reaches the viewer
//! through a [`CameraSource`]. The viewer only places the camera once per
//! scene load and keeps the sky backdrop centred on it every frame.

use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector3};

use crate::{
    data_structures::{bounds::Aabb, manifest::ViewDefinition},
    resources::sky::Backdrop,
};

/// Direction from the scene centre to the default eye position.
const FIT_DIRECTION: [f32; 3] = [1.0, -1.0, 0.75];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CameraMode {
    #[default]
    Orbit,
    FirstPerson,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub mode: CameraMode,
    pub position: Point3<f32>,
    pub target: Point3<f32>,
}

/// Camera placement computed once per scene load.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraDefaults {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub fovy: Rad<f32>,
    pub znear: f32,
    pub zfar: f32,
}

impl CameraDefaults {
    /// Places the camera so that the bounding sphere of `bounds` fills the
    /// vertical field of view.
    pub fn fit(bounds: &Aabb, fov_degrees: f32) -> Self {
        let fovy: Rad<f32> = cgmath::Deg(fov_degrees.clamp(1.0, 179.0)).into();
        let (center, radius) = if bounds.is_empty() {
            (Point3::new(0.0, 0.0, 0.0), 1.0)
        } else {
            let c = bounds.center();
            (Point3::new(c.x, c.y, c.z), bounds.radius())
        };
        let distance = (radius / (fovy.0 * 0.5).sin()).max(1.0);
        let position = center + Vector3::from(FIT_DIRECTION).normalize() * distance;

        Self {
            position,
            target: center,
            fovy,
            znear: (radius * 0.001).max(0.01),
            zfar: (distance + radius) * 4.0,
        }
    }

    /// Uses an authored view for position and target while keeping the
    /// clipping planes fitted to `bounds`.
    pub fn from_view(view: &ViewDefinition, bounds: &Aabb, fov_degrees: f32) -> Self {
        let fitted = Self::fit(bounds, fov_degrees);
        let position = Point3::from(view.position);
        let target = Point3::from(view.target);
        let reach = (position - fitted.target).magnitude() + bounds_radius(bounds);
        Self {
            position,
            target,
            zfar: fitted.zfar.max(reach * 2.0),
            ..fitted
        }
    }

    pub fn state(&self, mode: CameraMode) -> CameraState {
        CameraState {
            mode,
            position: self.position,
            target: self.target,
        }
    }
}

fn bounds_radius(bounds: &Aabb) -> f32 {
    if bounds.is_empty() { 1.0 } else { bounds.radius() }
}

/// External camera input.
pub trait CameraSource {
    /// Called once after every scene load.
    fn reset(&mut self, defaults: &CameraDefaults);
    /// Current camera, polled once per frame.
    fn current(&mut self, dt: std::time::Duration) -> CameraState;
}

/// Camera that stays where the scene placed it.
#[derive(Clone, Debug)]
pub struct FixedCamera {
    mode: CameraMode,
    state: Option<CameraState>,
}

impl FixedCamera {
    pub fn new(mode: CameraMode) -> Self {
        Self { mode, state: None }
    }
}

impl CameraSource for FixedCamera {
    fn reset(&mut self, defaults: &CameraDefaults) {
        self.state = Some(defaults.state(self.mode));
    }

    fn current(&mut self, _dt: std::time::Duration) -> CameraState {
        self.state.unwrap_or(CameraState {
            mode: self.mode,
            position: Point3::new(0.0, -1.0, 0.0),
            target: Point3::new(0.0, 0.0, 0.0),
        })
    }
}

/// What a single `advance` changed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameUpdate {
    pub frame: u64,
    pub mode: CameraMode,
    pub mode_changed: bool,
    /// Model matrix of the backdrop sphere, centred on the camera.
    pub backdrop: Option<Matrix4<f32>>,
    pub redraw: bool,
}

/// Per-frame view state of the viewer.
#[derive(Clone, Debug, Default)]
pub struct ViewLoop {
    frame: u64,
    mode: CameraMode,
    backdrop_center: [f32; 3],
}

impl ViewLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn backdrop_center(&self) -> [f32; 3] {
        self.backdrop_center
    }

    pub fn advance(&mut self, camera: &CameraState, backdrop: Option<&Backdrop>) -> FrameUpdate {
        self.frame += 1;
        let mode_changed = camera.mode != self.mode;
        if mode_changed {
            log::debug!("camera mode {:?}", camera.mode);
        }
        self.mode = camera.mode;
        self.backdrop_center = camera.position.into();

        FrameUpdate {
            frame: self.frame,
            mode: self.mode,
            mode_changed,
            backdrop: backdrop.map(|b| b.model_matrix(self.backdrop_center)),
            redraw: true,
        }
    }
}

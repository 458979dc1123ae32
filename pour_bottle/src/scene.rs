//! The render loop's scene: one model, its camera framing, and the idle
//! animation driven by the stillness accessor.
//!
//! The scene knows nothing about the classifier beyond a `Fn() -> bool`
//! it calls once per frame.

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};

use glam::{Mat4, Vec3};
use log::{info, warn};

use crate::error::{PourError, PourResult};
use crate::model::{Framing, Mesh};

/// Idle spin, applied per rendered frame (so it is framerate dependent).
pub const ROTATE_PER_FRAME: f32 = 0.01;
/// Idle bob height in framed units.
pub const BOB_AMPLITUDE:    f32 = 0.05;
/// Idle bob angular rate, radians per second.
pub const BOB_RATE:         f32 = 2.0;
pub const FOV_Y_DEG:        f32 = 45.0;
/// Camera height above the model's centre, in framed units.
const EYE_LIFT:             f32 = 0.6;

/// Where the displayed model came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    /// The real model (procedural or loaded) is shown.
    Ready,
    /// Placeholder shown; load in flight.
    Loading,
    /// Placeholder shown for good; load failed.
    Failed,
}

struct PendingModel {
    path: PathBuf,
    rx:   Receiver<PourResult<Mesh>>,
}

pub struct Scene {
    model:    Mesh,
    state:    ModelState,
    pending:  Option<PendingModel>,
    framing:  Framing,
    reframes: u32,
    yaw:      f32,
    offset_y: f32,
    still:    Box<dyn Fn() -> bool>,
}

impl Scene {
    /// Scene around a model that is already available.
    pub fn new(model: Mesh, still: Box<dyn Fn() -> bool>) -> Self {
        let framing = Framing::fit(&model.bounds(), FOV_Y_DEG);
        Scene {
            model,
            state:    ModelState::Ready,
            pending:  None,
            framing,
            reframes: 0,
            yaw:      0.0,
            offset_y: 0.0,
            still,
        }
    }

    /// Scene showing the placeholder until `rx` yields the loaded model.
    pub fn loading(
        path:  PathBuf,
        rx:    Receiver<PourResult<Mesh>>,
        still: Box<dyn Fn() -> bool>,
    ) -> Self {
        let mut scene = Scene::new(Mesh::placeholder(), still);
        scene.state   = ModelState::Loading;
        scene.pending = Some(PendingModel { path, rx });
        scene
    }

    // ── per frame ────────────────────────────────────────────────────────

    /// Advance one frame.  `elapsed_secs` is time since the loop started.
    pub fn frame(&mut self, elapsed_secs: f32) {
        self.poll_loader();

        if (self.still)() {
            self.yaw = (self.yaw + ROTATE_PER_FRAME) % std::f32::consts::TAU;
            self.offset_y = BOB_AMPLITUDE * (elapsed_secs * BOB_RATE).sin();
        } else {
            self.offset_y = 0.0;
        }
    }

    fn poll_loader(&mut self) {
        let pending = match &self.pending {
            Some(p) => p,
            None    => return,
        };
        let result = match pending.rx.try_recv() {
            Ok(r) => r,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => {
                Err(PourError::asset(&pending.path, "loader exited without a result"))
            }
        };
        self.pending = None;

        match result {
            Ok(mesh) => {
                self.model   = mesh;
                self.state   = ModelState::Ready;
                self.framing = Framing::fit(&self.model.bounds(), FOV_Y_DEG);
                self.reframes += 1;
                info!("model ready; camera distance {:.2}", self.framing.distance);
            }
            Err(e) => {
                self.state = ModelState::Failed;
                warn!("{}; keeping placeholder", e);
            }
        }
    }

    // ── accessors for the rasteriser ─────────────────────────────────────

    pub fn mesh(&self)         -> &Mesh      { &self.model }
    pub fn state(&self)        -> ModelState { self.state }
    pub fn yaw(&self)          -> f32        { self.yaw }
    pub fn offset_y(&self)     -> f32        { self.offset_y }
    pub fn framing(&self)      -> &Framing   { &self.framing }
    pub fn reframe_count(&self) -> u32       { self.reframes }

    pub fn is_placeholder(&self) -> bool { self.state != ModelState::Ready }

    /// Framing, then idle spin, then idle bob.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, self.offset_y, 0.0))
            * Mat4::from_rotation_y(self.yaw)
            * Mat4::from_scale(Vec3::splat(self.framing.scale))
            * Mat4::from_translation(-self.framing.center)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        let eye = Vec3::new(0.0, EYE_LIFT, self.framing.distance);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(FOV_Y_DEG.to_radians(), aspect, 0.05, 100.0);
        proj * view
    }

    /// Drop geometry and any pending load.
    pub fn release(&mut self) {
        self.pending = None;
        self.model.release();
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

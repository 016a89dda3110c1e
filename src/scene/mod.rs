//! Scene collaborator interface for the detector
//!
//! The detector never owns target entities or surface geometry. It sees the
//! world through [`SceneQuery`]: a probe point, a position lookup for opaque
//! target handles, and a bounded downward raycast used by calibration.
//!
//! [`SimScene`] is the in-process implementation used by the binary and the
//! tests; a host embedding the detector into a real physics engine provides
//! its own implementation instead.

use glam::Vec3;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Opaque handle identifying a target entity.
///
/// The detector stores this handle while a target is tracked but never
/// manages the entity behind it; positions are resolved per query through
/// [`SceneQuery::position_of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub u64);

/// Result of a calibration raycast: the surface tag under the probe point.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceHit {
    pub tag: String,
    pub distance: f32,
}

/// Read-only window into the host world.
///
/// All queries are synchronous pure computations over externally supplied
/// geometry; none of them block or mutate scene state.
pub trait SceneQuery {
    /// The spatial reference point distances and the calibration ray
    /// originate from.
    fn probe_point(&self) -> Vec3;

    /// Current position of a target, or `None` if the handle is unknown
    /// to the scene.
    fn position_of(&self, id: TargetId) -> Option<Vec3>;

    /// Casts a ray straight down from `origin`, bounded by `max_distance`.
    /// Returns at most one hit classified by a surface tag.
    fn raycast_down(&self, origin: Vec3, max_distance: f32) -> Option<SurfaceHit>;
}

#[derive(Debug, Default)]
struct SceneState {
    probe_point: Vec3,
    targets: HashMap<TargetId, Vec3>,
    // Surface directly below the probe: tag and vertical drop to it.
    surface_below: Option<(String, f32)>,
}

/// In-process scene with mutable target positions and a single surface
/// under the probe point.
///
/// Cloning is cheap and shares state, so a host task can move targets while
/// the detector task holds its own handle.
#[derive(Debug, Clone, Default)]
pub struct SimScene {
    inner: Arc<RwLock<SceneState>>,
}

impl SimScene {
    pub fn new(probe_point: Vec3) -> Self {
        let scene = Self::default();
        scene.set_probe_point(probe_point);
        scene
    }

    pub fn set_probe_point(&self, point: Vec3) {
        if let Ok(mut state) = self.inner.write() {
            state.probe_point = point;
        }
    }

    /// Places or moves a target. Inserting an existing id updates its
    /// position.
    pub fn place_target(&self, id: TargetId, position: Vec3) {
        match self.inner.write() {
            Ok(mut state) => {
                debug!("Placing target {:?} at {:?}", id, position);
                state.targets.insert(id, position);
            }
            Err(e) => warn!("Scene lock poisoned, dropping placement: {}", e),
        }
    }

    pub fn remove_target(&self, id: TargetId) {
        if let Ok(mut state) = self.inner.write() {
            state.targets.remove(&id);
        }
    }

    /// Sets the surface under the probe point: tag plus the vertical drop
    /// a downward ray travels before hitting it. `None` clears the surface.
    pub fn set_surface_below(&self, surface: Option<(String, f32)>) {
        if let Ok(mut state) = self.inner.write() {
            state.surface_below = surface;
        }
    }
}

impl SceneQuery for SimScene {
    fn probe_point(&self) -> Vec3 {
        match self.inner.read() {
            Ok(state) => state.probe_point,
            Err(e) => {
                warn!("Scene lock poisoned, returning origin: {}", e);
                Vec3::ZERO
            }
        }
    }

    fn position_of(&self, id: TargetId) -> Option<Vec3> {
        match self.inner.read() {
            Ok(state) => state.targets.get(&id).copied(),
            Err(e) => {
                warn!("Scene lock poisoned, position unavailable: {}", e);
                None
            }
        }
    }

    fn raycast_down(&self, _origin: Vec3, max_distance: f32) -> Option<SurfaceHit> {
        let state = self.inner.read().ok()?;
        let (tag, drop) = state.surface_below.clone()?;
        if drop > max_distance {
            debug!("Surface {} at {:.2} beyond ray length {:.2}", tag, drop, max_distance);
            return None;
        }
        Some(SurfaceHit {
            tag,
            distance: drop,
        })
    }
}

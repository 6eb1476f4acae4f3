//! Ground sensing and slope filtering.
//!
//! Works on the hit lists collected by the backend for the ground, ground-close
//! and coyote probes. Vectors are in world space.

use bevy::prelude::*;

use crate::collision::{CollisionData, SensorReadings};
use crate::events::LocomotionObserver;

/// Keep the hits that count as walkable ground.
///
/// Excluded entities are dropped, as is any hit whose normal deviates from
/// `up` by more than `max_angle`. When at least two steep hits remain and their
/// summed normal is within `max_angle` (a V-notch between two steep faces),
/// the steep hits are re-admitted.
pub fn filter_walkable(
    hits: &[CollisionData],
    readings: &SensorReadings,
    up: Vec3,
    max_angle: f32,
) -> Vec<CollisionData> {
    let (mut walkable, steep): (Vec<CollisionData>, Vec<CollisionData>) = hits
        .iter()
        .filter(|hit| !readings.is_excluded(hit))
        .copied()
        .partition(|hit| within_angle(hit.normal, up, max_angle));

    if steep.len() >= 2 {
        let summed: Vec3 = steep.iter().map(|hit| hit.normal.normalize_or_zero()).sum();
        if within_angle(summed, up, max_angle) {
            walkable.extend(steep);
        }
    }

    walkable
}

fn within_angle(normal: Vec3, up: Vec3, max_angle: f32) -> bool {
    normal.length_squared() > f32::EPSILON && normal.angle_between(up) <= max_angle
}

/// Ground contact state for one character.
#[derive(Reflect, Debug, Clone)]
pub struct GroundState {
    pub grounded: bool,
    pub ground_close: bool,
    pub ground_close_coyote: bool,
    /// Seconds since the character was last grounded.
    pub air_time: f32,
    pub grounded_normals: Vec<Vec3>,
    pub ground_close_normals: Vec<Vec3>,
    pub ground_close_coyote_normals: Vec<Vec3>,
    /// Averaged normal of the surface below (falls back to up).
    pub ground_normal: Vec3,
    /// Averaged friction of the grounded contacts, when reported.
    pub ground_friction: Option<f32>,
    /// Set by a jump (or upward impulse) until the character is rising no more.
    pub ungrounded_due_to_jump: bool,
    /// Height along up where vertical velocity last turned non-positive.
    fall_reference_height: f32,
    coyote_probed: bool,
    override_grounded: Option<bool>,
    initialized: bool,
}

impl Default for GroundState {
    fn default() -> Self {
        Self {
            grounded: false,
            ground_close: false,
            ground_close_coyote: false,
            air_time: 0.0,
            grounded_normals: Vec::new(),
            ground_close_normals: Vec::new(),
            ground_close_coyote_normals: Vec::new(),
            ground_normal: Vec3::Y,
            ground_friction: None,
            ungrounded_due_to_jump: false,
            fall_reference_height: 0.0,
            coyote_probed: false,
            override_grounded: None,
            initialized: false,
        }
    }
}

impl GroundState {
    /// Force the grounded result of the next update.
    pub fn override_grounded(&mut self, grounded: bool) {
        self.override_grounded = Some(grounded);
    }

    /// The coyote probe was cast this step and found no walkable ground.
    pub fn coyote_ground_lost(&self) -> bool {
        self.coyote_probed && !self.ground_close_coyote
    }

    /// Mark the character as leaving the ground on purpose.
    pub fn mark_ungrounded(&mut self) {
        self.ungrounded_due_to_jump = true;
    }

    /// Classify this step's probe results.
    ///
    /// `velocity_up` is the vertical velocity applied during the previous step.
    pub fn update(
        &mut self,
        dt: f32,
        readings: &SensorReadings,
        up: Vec3,
        max_angle: f32,
        velocity_up: f32,
        observer: &mut impl LocomotionObserver,
    ) {
        let grounded_hits = filter_walkable(&readings.ground, readings, up, max_angle);
        let close_hits = filter_walkable(&readings.ground_close, readings, up, max_angle);
        let coyote_hits = readings
            .ground_close_coyote
            .as_deref()
            .map(|hits| filter_walkable(hits, readings, up, max_angle));

        let raw_grounded = self
            .override_grounded
            .take()
            .unwrap_or(!grounded_hits.is_empty());

        if self.ungrounded_due_to_jump && raw_grounded && velocity_up <= 0.0 {
            self.ungrounded_due_to_jump = false;
        }
        let grounded = raw_grounded && !self.ungrounded_due_to_jump;
        let ground_close = grounded || !close_hits.is_empty();

        let height = readings.position.dot(up);
        if self.grounded || velocity_up > 0.0 || !self.initialized {
            self.fall_reference_height = height;
        }

        if self.initialized {
            if grounded && !self.grounded {
                observer.on_ground_hit((self.fall_reference_height - height).max(0.0));
            } else if !grounded && self.grounded {
                observer.on_ungrounded();
            }
            if ground_close && !self.ground_close && !grounded && velocity_up <= 0.0 {
                observer.on_ground_soon_hit();
            }
        }

        self.air_time = if grounded { 0.0 } else { self.air_time + dt };
        self.grounded = grounded;
        self.ground_close = ground_close;
        self.coyote_probed = coyote_hits.is_some();
        self.ground_close_coyote = coyote_hits.as_ref().is_some_and(|hits| !hits.is_empty());
        self.ground_normal = average_normal(&grounded_hits)
            .or_else(|| average_normal(&close_hits))
            .unwrap_or(up);
        self.ground_friction = average_friction(&grounded_hits);
        self.grounded_normals = grounded_hits.iter().map(|hit| hit.normal).collect();
        self.ground_close_normals = close_hits.iter().map(|hit| hit.normal).collect();
        self.ground_close_coyote_normals = coyote_hits
            .unwrap_or_default()
            .iter()
            .map(|hit| hit.normal)
            .collect();
        self.initialized = true;
    }
}

fn average_normal(hits: &[CollisionData]) -> Option<Vec3> {
    let summed: Vec3 = hits.iter().map(|hit| hit.normal).sum();
    let normal = summed.normalize_or_zero();
    (normal != Vec3::ZERO).then_some(normal)
}

fn average_friction(hits: &[CollisionData]) -> Option<f32> {
    let frictions: Vec<f32> = hits.iter().filter_map(|hit| hit.friction).collect();
    if frictions.is_empty() {
        None
    } else {
        Some(frictions.iter().sum::<f32>() / frictions.len() as f32)
    }
}

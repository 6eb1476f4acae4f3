//! Horizontal (local XY) velocity blending.
//!
//! Input intensities become a target velocity through an elliptical
//! per-direction scale. The applied velocity then blends toward the target with
//! asymmetric acceleration: speeding up uses the configured acceleration,
//! slowing down or reversing uses a faster deceleration rate.

use bevy::prelude::*;

use crate::config::WalkingConfig;
use crate::events::LocomotionObserver;

const TARGET_EPSILON: f32 = 1e-6;
const SPEED_EPSILON: f32 = 1e-4;
const MOVING_EPSILON: f32 = 1e-3;
const TOP_SPEED_TOLERANCE: f32 = 1e-3;

/// Per-direction speed scales.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct DirectionScales {
    pub forward: f32,
    pub back: f32,
    pub left: f32,
    pub right: f32,
}

impl From<&WalkingConfig> for DirectionScales {
    fn from(walking: &WalkingConfig) -> Self {
        Self {
            forward: walking.forward_scale,
            back: walking.back_scale,
            left: walking.left_scale,
            right: walking.right_scale,
        }
    }
}

/// Scale a direction by the ellipse spanned by the per-direction scales.
///
/// The semi-axes are picked from the quadrant of `input` (`right`/`left` on x,
/// `forward`/`back` on y) and the radius along `input` is evaluated from
/// `tan(angle)`, so axis-aligned input gets exactly that axis's scale and the
/// result is continuous across quadrant boundaries. The ellipse is scaled by
/// the length of `input`, so non-unit input is accepted.
pub fn ellipse_scale(input: Vec2, scales: DirectionScales) -> Vec2 {
    let length = input.length();
    if length <= f32::EPSILON {
        return Vec2::ZERO;
    }

    let a = if input.x >= 0.0 { scales.right } else { scales.left } * length;
    let c = if input.y >= 0.0 { scales.forward } else { scales.back } * length;

    let radius = if input.x.abs() <= 1e-6 * length {
        c
    } else {
        let tan = input.y / input.x;
        let denominator = (c * c + a * a * tan * tan).sqrt();
        if denominator <= f32::EPSILON {
            0.0
        } else {
            a * c * (1.0 + tan * tan).sqrt() / denominator
        }
    };

    input / length * radius
}

/// Target velocity for a raw movement vector.
pub fn target_velocity(move_vector: Vec2, walking: &WalkingConfig, speed_factor: f32) -> Vec2 {
    ellipse_scale(move_vector, DirectionScales::from(walking)) * walking.top_speed * speed_factor
}

/// Top speed reachable along the direction of `velocity`.
pub fn top_speed_along(velocity: Vec2, walking: &WalkingConfig, speed_factor: f32) -> f32 {
    target_velocity(velocity.normalize_or_zero(), walking, speed_factor).length()
}

/// Speed multiplier for moving in `direction` across ground with `normal`.
///
/// Only uphill motion is scaled, proportionally to how close the slope is to
/// `max_angle`.
pub fn incline_factor(direction: Vec2, normal: Vec3, max_angle: f32, uphill_factor: f32) -> f32 {
    let direction = direction.normalize_or_zero();
    let normal = normal.normalize_or_zero();
    let downhill = normal.truncate();
    if direction == Vec2::ZERO || downhill.dot(direction) >= 0.0 || max_angle <= 0.0 {
        return 1.0;
    }

    let slope = normal.angle_between(Vec3::Z);
    let steepness = (slope / max_angle).clamp(0.0, 1.0);
    1.0 + (uphill_factor - 1.0) * steepness
}

/// Rates used for one blend step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendRates {
    pub acceleration: f32,
    pub deceleration_factor: f32,
    pub opposing_deceleration_factor: f32,
}

impl From<&WalkingConfig> for BlendRates {
    fn from(walking: &WalkingConfig) -> Self {
        Self {
            acceleration: walking.acceleration,
            deceleration_factor: walking.deceleration_factor,
            opposing_deceleration_factor: walking.opposing_deceleration_factor,
        }
    }
}

impl BlendRates {
    fn deceleration(&self, current: Vec2, target: Vec2) -> f32 {
        let mut rate = self.acceleration * self.deceleration_factor;
        if current.dot(target) < 0.0 {
            rate *= self.opposing_deceleration_factor;
        }
        rate
    }
}

/// Horizontal velocity state in the character's local frame.
///
/// Invariant: `0 <= lerp_time <= total_lerp_time`.
#[derive(Reflect, Debug, Clone, Default)]
pub struct HorizontalVelocity {
    pub target_velocity_xy: Vec2,
    pub applied_velocity_xy: Vec2,
    pub previous_applied_velocity_xy: Vec2,
    pub lerp_time: f32,
    pub total_lerp_time: f32,
    pub accelerating: bool,
    pub decelerating: bool,
    lerp_start: Vec2,
    restart: bool,
    moving: bool,
    target_reached: bool,
    at_top_walk_speed: bool,
    at_top_sprint_speed: bool,
}

impl HorizontalVelocity {
    /// Replace the applied velocity and restart the blend from it.
    ///
    /// Used when the physically realized velocity differs from what was
    /// requested, and when taking off from an incline.
    pub fn correct(&mut self, velocity: Vec2) {
        self.applied_velocity_xy = velocity;
        self.restart = true;
    }

    /// Blend one step toward `target` and return the velocity to emit.
    ///
    /// The step is split in two halves; the velocity at the midpoint is the
    /// one emitted, the state ends at the end of the step.
    pub fn update(
        &mut self,
        target: Vec2,
        dt: f32,
        rates: BlendRates,
        observer: &mut impl LocomotionObserver,
    ) -> Vec2 {
        self.previous_applied_velocity_xy = self.applied_velocity_xy;

        if self.restart || (target - self.target_velocity_xy).length_squared() > TARGET_EPSILON {
            self.begin(target, rates.acceleration);
        }

        let half = dt * 0.5;
        self.half_step(half, rates);
        let emitted = self.applied_velocity_xy;
        self.half_step(half, rates);

        self.report_movement(observer);
        emitted
    }

    /// Fire top-speed notifications for the current applied speed.
    pub fn report_top_speed(
        &mut self,
        top_walk_speed: f32,
        top_sprint_speed: Option<f32>,
        observer: &mut impl LocomotionObserver,
    ) {
        let speed = self.applied_velocity_xy.length();

        // Walk top speed is only reported while not sprinting.
        let at_walk = top_sprint_speed.is_none()
            && top_walk_speed > 0.0
            && speed >= top_walk_speed - TOP_SPEED_TOLERANCE;
        if at_walk && !self.at_top_walk_speed {
            observer.on_top_walk_speed_reached();
        }
        self.at_top_walk_speed = at_walk;

        let at_sprint = top_sprint_speed
            .is_some_and(|top| top > 0.0 && speed >= top - TOP_SPEED_TOLERANCE);
        if at_sprint && !self.at_top_sprint_speed {
            observer.on_top_sprint_speed_reached();
        }
        self.at_top_sprint_speed = at_sprint;
    }

    fn begin(&mut self, target: Vec2, acceleration: f32) {
        self.target_velocity_xy = target;
        self.lerp_start = self.applied_velocity_xy;
        self.lerp_time = 0.0;
        self.total_lerp_time = if acceleration > 0.0 {
            (target - self.applied_velocity_xy).length() / acceleration
        } else {
            0.0
        };
        self.accelerating = true;
        self.decelerating = false;
        self.restart = false;
        self.target_reached = false;
    }

    fn sample(&self) -> Vec2 {
        if self.total_lerp_time <= 0.0 {
            return self.target_velocity_xy;
        }
        self.lerp_start
            .lerp(self.target_velocity_xy, self.lerp_time / self.total_lerp_time)
    }

    fn half_step(&mut self, h: f32, rates: BlendRates) {
        if self.total_lerp_time <= 0.0 || self.lerp_time >= self.total_lerp_time {
            self.applied_velocity_xy = self.target_velocity_xy;
            return;
        }

        let speed_before = self.applied_velocity_xy.length();
        let progress_before = self.lerp_time / self.total_lerp_time;
        self.lerp_time = (self.lerp_time + h).min(self.total_lerp_time);
        let mut candidate = self.sample();

        if !self.decelerating && candidate.length() < speed_before - SPEED_EPSILON {
            let rate = rates.deceleration(self.applied_velocity_xy, self.target_velocity_xy);
            let distance = (self.target_velocity_xy - self.lerp_start).length();
            self.accelerating = false;
            self.decelerating = true;
            if rate > 0.0 {
                self.total_lerp_time = distance / rate;
                self.lerp_time = (progress_before * self.total_lerp_time + h).min(self.total_lerp_time);
            } else {
                self.total_lerp_time = 0.0;
                self.lerp_time = 0.0;
            }
            candidate = self.sample();
        }

        self.applied_velocity_xy = candidate;
    }

    fn report_movement(&mut self, observer: &mut impl LocomotionObserver) {
        let moving = self.applied_velocity_xy.length() > MOVING_EPSILON;
        if moving && !self.moving {
            observer.on_started_moving();
        } else if !moving && self.moving {
            observer.on_stopped();
        }
        self.moving = moving;

        let reached = self.lerp_time >= self.total_lerp_time
            && (self.applied_velocity_xy - self.target_velocity_xy).length() <= SPEED_EPSILON;
        if reached && !self.target_reached && self.target_velocity_xy != Vec2::ZERO {
            observer.on_target_velocity_reached();
        }
        self.target_reached = reached;
    }
}

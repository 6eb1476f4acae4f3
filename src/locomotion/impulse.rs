//! Decay of externally applied impulses.

use bevy::prelude::*;

use crate::config::ImpulseConfig;

const SNAP_FRACTION: f32 = 1e-4;
const REST_SPEED_SQ: f32 = 1e-8;

/// Impulse-driven velocity for one character, in world space.
///
/// The persistent part never has a component along the character's up axis;
/// vertical impulses are handed to the vertical controller once.
#[derive(Reflect, Debug, Clone)]
pub struct ImpulseState {
    /// Impulse waiting to be consumed by the next step.
    pub linear_impulse: Vec3,
    pub velocity_from_impulse: Vec3,
    pub init_velocity_from_impulse: Vec3,
    pub lerp_time: f32,
    pub total_lerp_time: f32,
    /// Deceleration the current ramp was built with.
    pub deceleration: f32,
    damp_scale: f32,
}

impl Default for ImpulseState {
    fn default() -> Self {
        Self {
            linear_impulse: Vec3::ZERO,
            velocity_from_impulse: Vec3::ZERO,
            init_velocity_from_impulse: Vec3::ZERO,
            lerp_time: 0.0,
            total_lerp_time: 0.0,
            deceleration: 0.0,
            damp_scale: 1.0,
        }
    }
}

impl ImpulseState {
    /// Queue an impulse for the next step. Impulses within one step add up.
    pub fn apply(&mut self, impulse: Vec3) {
        self.linear_impulse += impulse;
    }

    /// Advance one step and return the vertical velocity to add once.
    pub fn update(
        &mut self,
        dt: f32,
        mass: f32,
        up: Vec3,
        config: &ImpulseConfig,
        ground_friction: Option<f32>,
    ) -> f32 {
        let mut vertical = 0.0;
        let mut restart = false;

        if self.linear_impulse != Vec3::ZERO && mass > 0.0 {
            let delta = self.linear_impulse / mass;
            vertical = delta.dot(up);
            self.velocity_from_impulse += delta - up * vertical;
            restart = true;
        }
        self.linear_impulse = Vec3::ZERO;

        if self.velocity_from_impulse.length_squared() < REST_SPEED_SQ {
            self.settle();
            return vertical;
        }

        let mut deceleration = config.constant_deceleration.max(0.0);
        if config.deceleration_uses_ground_friction {
            deceleration *= ground_friction.unwrap_or(1.0).max(0.0);
        }

        if restart || (deceleration - self.deceleration).abs() > f32::EPSILON {
            self.init_velocity_from_impulse = self.velocity_from_impulse;
            self.damp_scale = 1.0;
            self.lerp_time = 0.0;
            self.deceleration = deceleration;
            self.total_lerp_time = if deceleration > 0.0 {
                self.init_velocity_from_impulse.length() / deceleration
            } else {
                0.0
            };
        }

        if config.linear_damp > 0.0 {
            self.damp_scale *= (1.0 - config.linear_damp * dt).max(0.0);
        }

        let ramp = if self.total_lerp_time > 0.0 {
            self.lerp_time = (self.lerp_time + dt).min(self.total_lerp_time);
            if self.total_lerp_time - self.lerp_time <= self.total_lerp_time * SNAP_FRACTION {
                self.lerp_time = self.total_lerp_time;
            }
            1.0 - self.lerp_time / self.total_lerp_time
        } else {
            1.0
        };

        self.velocity_from_impulse = self.init_velocity_from_impulse * ramp * self.damp_scale;
        if self.velocity_from_impulse.length_squared() < REST_SPEED_SQ {
            self.settle();
        }

        vertical
    }

    fn settle(&mut self) {
        self.velocity_from_impulse = Vec3::ZERO;
        self.init_velocity_from_impulse = Vec3::ZERO;
        self.lerp_time = 0.0;
        self.total_lerp_time = 0.0;
        self.damp_scale = 1.0;
    }
}

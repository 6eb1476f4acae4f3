//! Reconciling requested velocity with what the physics engine realized.

use bevy::prelude::*;

use super::incline::untilt_xy;
use crate::config::LocalFrame;
use crate::events::LocomotionObserver;

/// Consecutive stalled steps before gravity counts as blocked.
const GRAVITY_STALL_STEPS: u32 = 2;

/// What was sent to the physics backend last step.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct VelocityRequest {
    /// Full world-space velocity.
    pub velocity: Vec3,
    /// Vertical controller velocity along up.
    pub vertical: f32,
    /// Impulse part of `velocity`.
    pub impulse: Vec3,
    /// Local-frame normal the planar velocity was tilted onto.
    pub tilt_normal: Vec3,
    pub frame: LocalFrame,
}

#[derive(Reflect, Debug, Clone, Default)]
pub struct ObstructionState {
    pub xy_obstructed: bool,
    pub gravity_blocked: bool,
    stall_steps: u32,
    request: Option<VelocityRequest>,
}

impl ObstructionState {
    pub fn record_request(&mut self, request: VelocityRequest) {
        self.request = Some(request);
    }

    pub fn last_request(&self) -> Option<&VelocityRequest> {
        self.request.as_ref()
    }

    /// Compare last step's request with the realized `physics_velocity`.
    ///
    /// Returns the realized planar velocity (in the request's local frame) when
    /// the horizontal move was obstructed.
    ///
    /// The gravity block is only judged away from the ground. Once raised it
    /// holds until the character gets close to the ground or downward motion
    /// is realized again.
    pub fn update(
        &mut self,
        physics_velocity: Vec3,
        ground_close: bool,
        tolerance: f32,
        observer: &mut impl LocomotionObserver,
    ) -> Option<Vec2> {
        let request = self.request?;
        let frame = request.frame;

        let requested_local = frame.to_local(request.velocity - request.impulse);
        let realized_local = frame.to_local(physics_velocity - request.impulse);

        let requested_xy = untilt_xy(
            requested_local - Vec3::Z * request.vertical,
            request.tilt_normal,
        );
        let realized_xy = untilt_xy(
            realized_local - Vec3::Z * request.vertical,
            request.tilt_normal,
        );

        let was_obstructed = self.xy_obstructed;
        self.xy_obstructed = (requested_xy - realized_xy).length() > tolerance;
        if self.xy_obstructed && !was_obstructed {
            observer.on_velocity_xy_obstructed();
        }

        let was_blocked = self.gravity_blocked;
        if ground_close {
            self.stall_steps = 0;
            self.gravity_blocked = false;
        } else if request.vertical < -tolerance {
            let arrested = realized_local.z >= -tolerance;
            self.stall_steps = if arrested { self.stall_steps + 1 } else { 0 };
            self.gravity_blocked = self.stall_steps >= GRAVITY_STALL_STEPS;
        }
        if self.gravity_blocked && !was_blocked {
            observer.on_character_gravity_obstructed();
        }

        self.xy_obstructed.then_some(realized_xy)
    }
}

//! Controller state components.
//!
//! [`FpsController`] owns the locomotion core of one character. The marker
//! components and [`LocomotionStatus`] are derived from it after every step so
//! other systems (camera, animation, audio) can read the state without
//! reaching into the core.

use bevy::prelude::*;

use crate::config::{ControllerConfig, DerivedTuning};
use crate::locomotion::vertical::VerticalPhase;
use crate::locomotion::Locomotion;

/// Marker component indicating the character is grounded.
///
/// Added automatically when the ground probe finds walkable ground. Removed
/// when the character becomes airborne.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use msg_fps_controller::prelude::*;
///
/// // Grounded is a marker component - just use it in queries
/// fn check_grounded(grounded: Option<&Grounded>) -> bool {
///     grounded.is_some()
/// }
/// ```
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grounded;

/// Marker component indicating the character is airborne.
///
/// Mutually exclusive with [`Grounded`].
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Airborne;

/// Marker component present while the character is crouching or crouched.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Crouched;

/// Marker component present while the character is sprinting.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Sprinting;

/// The locomotion core of one character.
///
/// Spawn it next to a [`ControllerConfig`], a [`MovementInput`] and the
/// backend's physics components. The state is created fresh and initialized
/// by the first ground probe.
///
/// [`MovementInput`]: crate::intent::MovementInput
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct FpsController {
    pub(crate) locomotion: Locomotion,
    pub(crate) derived: DerivedTuning,
    /// Capsule half height at full standing height, captured at activation.
    pub(crate) standing_half_height: Option<f32>,
    pub(crate) activated: bool,
}

impl FpsController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: start facing `heading` radians around up.
    pub fn with_heading(mut self, heading: f32) -> Self {
        self.locomotion.look.heading = heading;
        self
    }

    /// Read-only access to the locomotion core.
    pub fn locomotion(&self) -> &Locomotion {
        &self.locomotion
    }

    /// Tuning derived from the current config.
    pub fn derived(&self) -> &DerivedTuning {
        &self.derived
    }

    /// Apply an impulse (world space) on the next velocity step.
    pub fn apply_linear_impulse(&mut self, impulse: Vec3) {
        self.locomotion.apply_linear_impulse(impulse);
    }

    /// Force the grounded result of the next velocity step.
    pub fn override_grounded(&mut self, grounded: bool) {
        self.locomotion.override_grounded(grounded);
    }

    pub fn heading(&self) -> f32 {
        self.locomotion.look.heading
    }

    pub fn pitch(&self) -> f32 {
        self.locomotion.look.pitch
    }

    pub fn is_grounded(&self) -> bool {
        self.locomotion.ground.grounded
    }

    /// World-space velocity requested by the last velocity step.
    pub fn velocity(&self) -> Vec3 {
        self.locomotion.velocity()
    }

    /// Whether the last available jump has been used since landing.
    pub fn final_jump_performed(&self) -> bool {
        self.locomotion.vertical.final_jump_performed()
    }

    pub fn stamina_percentage(&self) -> f32 {
        self.locomotion.sprint.stamina_percentage
    }
}

/// Read-only snapshot of a character's locomotion, refreshed every step.
///
/// This is what cameras, view models and animation should consume.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct LocomotionStatus {
    /// Eye height above the capsule bottom, including crouch travel.
    pub eye_height: f32,
    /// Configured crouch distance.
    pub crouch_distance: f32,
    /// Current crouch offset, in `[-crouch_distance, 0]`.
    pub local_z_travel: f32,
    pub heading: f32,
    pub pitch: f32,
    pub grounded: bool,
    pub ground_close: bool,
    pub air_time: f32,
    pub stamina_percentage: f32,
    pub sprinting: bool,
    pub crouching: bool,
    pub stand_prevented: bool,
    pub vertical_phase: VerticalPhase,
    pub velocity: Vec3,
}

impl LocomotionStatus {
    pub fn from_controller(controller: &FpsController, config: &ControllerConfig) -> Self {
        let locomotion = &controller.locomotion;
        Self {
            eye_height: config.eye_height + locomotion.crouch.local_z_travel,
            crouch_distance: config.crouch.distance,
            local_z_travel: locomotion.crouch.local_z_travel,
            heading: locomotion.look.heading,
            pitch: locomotion.look.pitch,
            grounded: locomotion.ground.grounded,
            ground_close: locomotion.ground.ground_close,
            air_time: locomotion.ground.air_time,
            stamina_percentage: locomotion.sprint.stamina_percentage,
            sprinting: locomotion.sprint.sprinting,
            crouching: locomotion.crouch.is_low(),
            stand_prevented: locomotion.crouch.stand_prevented,
            vertical_phase: locomotion.vertical.phase,
            velocity: locomotion.velocity(),
        }
    }
}

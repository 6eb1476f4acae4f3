//! Controller configuration components.
//!
//! This module defines the tuning surface of the controller (walking, sprint,
//! jumping, crouching, impulses, sensing and look), the character's reference
//! frame, and the values derived from the tuning once per change.

use std::f32::consts::FRAC_PI_4;

use bevy::prelude::*;

use crate::error::ConfigIssue;
use crate::locomotion::crouch::Ramp;
use crate::locomotion::vertical::solve_jump_max_hold_time;

/// Defines the "up" direction of a character controller.
///
/// Everything the controller computes happens in a local frame built from this
/// vector and the current heading. Changing `up` lets characters walk on
/// rotated platforms or planets.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct CharacterOrientation {
    up: Vec3,
}

impl Default for CharacterOrientation {
    fn default() -> Self {
        Self { up: Vec3::Y }
    }
}

impl CharacterOrientation {
    /// Create a new orientation with the given up direction.
    ///
    /// The vector will be normalized. If zero-length, defaults to `Vec3::Y`.
    pub fn new(up: Vec3) -> Self {
        let normalized = up.normalize_or_zero();
        Self {
            up: if normalized == Vec3::ZERO {
                Vec3::Y
            } else {
                normalized
            },
        }
    }

    /// Get the "up" direction.
    #[inline]
    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Get the "down" direction (opposite of up).
    #[inline]
    pub fn down(&self) -> Vec3 {
        -self.up
    }

    /// Set the "up" direction. Zero vectors are ignored.
    pub fn set_up(&mut self, up: Vec3) {
        let normalized = up.normalize_or_zero();
        if normalized != Vec3::ZERO {
            self.up = normalized;
        }
    }

    /// Rotation of a character facing `heading` radians around `up`.
    pub fn rotation(&self, heading: f32) -> Quat {
        Quat::from_rotation_arc(Vec3::Y, self.up) * Quat::from_rotation_y(heading)
    }

    /// Local frame of a character facing `heading`.
    pub fn frame(&self, heading: f32) -> LocalFrame {
        let rotation = self.rotation(heading);
        LocalFrame {
            right: rotation * Vec3::X,
            forward: rotation * Vec3::NEG_Z,
            up: self.up,
        }
    }
}

/// Orthonormal basis the locomotion core works in.
///
/// Local coordinates are `x = right`, `y = forward`, `z = up`.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct LocalFrame {
    pub right: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Default for LocalFrame {
    fn default() -> Self {
        CharacterOrientation::default().frame(0.0)
    }
}

impl LocalFrame {
    /// Project a world-space vector into local coordinates.
    pub fn to_local(&self, world_vec: Vec3) -> Vec3 {
        Vec3::new(
            world_vec.dot(self.right),
            world_vec.dot(self.forward),
            world_vec.dot(self.up),
        )
    }

    /// Convert local coordinates to a world-space vector.
    pub fn to_world(&self, local_vec: Vec3) -> Vec3 {
        self.right * local_vec.x + self.forward * local_vec.y + self.up * local_vec.z
    }
}

/// The two schedules that can drive a controller.
///
/// Exactly one of them runs velocity logic for a given character; the other
/// only updates look and heading.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StepKind {
    /// Variable-rate frame tick (`Update`).
    Frame,
    /// Fixed-rate physics timestep (`FixedUpdate`).
    #[default]
    Fixed,
}

/// How the crouch input is interpreted.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrouchMode {
    /// Crouch while the input is held.
    #[default]
    Hold,
    /// Each press flips between crouching and standing.
    Toggle,
}

/// Horizontal walking parameters.
#[derive(Reflect, Debug, Clone, Copy)]
pub struct WalkingConfig {
    /// Top speed for full forward input (units/second).
    pub top_speed: f32,
    /// Acceleration toward the target velocity (units/second^2).
    pub acceleration: f32,
    /// Multiplier on `acceleration` when the applied speed is dropping.
    pub deceleration_factor: f32,
    /// Extra multiplier on deceleration when reversing direction (angle > 90 degrees).
    pub opposing_deceleration_factor: f32,
    pub forward_scale: f32,
    pub back_scale: f32,
    pub left_scale: f32,
    pub right_scale: f32,
    /// Speed multiplier at the steepest walkable incline when moving uphill.
    pub moving_up_incline_factor: f32,
}

impl Default for WalkingConfig {
    fn default() -> Self {
        Self {
            top_speed: 5.0,
            acceleration: 30.0,
            deceleration_factor: 1.5,
            opposing_deceleration_factor: 1.5,
            forward_scale: 1.0,
            back_scale: 0.75,
            left_scale: 1.0,
            right_scale: 1.0,
            moving_up_incline_factor: 1.0,
        }
    }
}

/// Sprint and stamina parameters.
#[derive(Reflect, Debug, Clone, Copy)]
pub struct SprintConfig {
    pub enabled: bool,
    /// Velocity multiplier at full sprint input.
    pub velocity_scale: f32,
    /// Acceleration multiplier at full sprint input.
    pub acceleration_scale: f32,
    /// Seconds of full sprint before the cooldown starts. Zero or less means unlimited.
    pub max_time: f32,
    pub cooldown_time: f32,
    /// Delay after a sprint ends before it can restart or stamina regenerates.
    pub pause_time: f32,
    pub regenerate: bool,
    /// Held seconds recovered per second of rest.
    pub regeneration_rate: f32,
    pub sprint_backwards: bool,
    pub sprint_while_crouched: bool,
}

impl Default for SprintConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            velocity_scale: 1.5,
            acceleration_scale: 1.5,
            max_time: 3.0,
            cooldown_time: 2.0,
            pause_time: 0.1,
            regenerate: true,
            regeneration_rate: 1.0,
            sprint_backwards: false,
            sprint_while_crouched: false,
        }
    }
}

/// Gravity, jump and air control parameters.
#[derive(Reflect, Debug, Clone, Copy)]
pub struct JumpingConfig {
    /// Signed gravity along the character's up axis (negative pulls down).
    pub gravity: f32,
    pub initial_velocity: f32,
    pub double_jump_initial_velocity: f32,
    /// Gravity multiplier while the jump input is held.
    pub held_gravity_factor: f32,
    /// Gravity multiplier after the hold ends while still rising.
    pub falling_gravity_factor: f32,
    /// Gravity multiplier after the apogee of a jump.
    pub secondary_falling_gravity_factor: f32,
    /// Height gained under held gravity before the hold is cut.
    pub hold_distance: f32,
    /// Grace window after walking off a ledge where a ground jump is still allowed.
    pub coyote_time: f32,
    /// Hold gravity back during the grace window and release it gradually afterwards.
    pub suppress_gravity_during_coyote: bool,
    pub requires_repress: bool,
    pub double_jump: bool,
    pub head_hit_sets_apogee: bool,
    pub air_control: bool,
    /// Multiplier on the blend time step while airborne with air control,
    /// away from the ground.
    pub air_acceleration_factor: f32,
    /// Keep the take-off velocity, scaled by the incline left from, as the
    /// target for the whole time in the air. Takes precedence over air control.
    pub inclines_affect_air_velocity: bool,
}

impl Default for JumpingConfig {
    fn default() -> Self {
        Self {
            gravity: -20.0,
            initial_velocity: 6.0,
            double_jump_initial_velocity: 5.0,
            held_gravity_factor: 0.25,
            falling_gravity_factor: 2.0,
            secondary_falling_gravity_factor: 1.5,
            hold_distance: 0.8,
            coyote_time: 0.1,
            suppress_gravity_during_coyote: false,
            requires_repress: true,
            double_jump: false,
            head_hit_sets_apogee: true,
            air_control: true,
            air_acceleration_factor: 0.3,
            inclines_affect_air_velocity: true,
        }
    }
}

/// Crouch and stand transition parameters.
#[derive(Reflect, Debug, Clone, Copy)]
pub struct CrouchConfig {
    pub enabled: bool,
    pub mode: CrouchMode,
    /// Capsule height removed when fully crouched.
    pub distance: f32,
    pub crouch_time: f32,
    pub crouch_initial_speed: f32,
    pub stand_time: f32,
    pub stand_initial_speed: f32,
    /// Horizontal speed multiplier while crouching.
    pub speed_factor: f32,
    pub jump_causes_standing: bool,
    pub sprint_causes_standing: bool,
    pub crouch_priority_over_sprint: bool,
    /// Dynamic bodies above the head do not prevent standing.
    pub stand_ignores_dynamic: bool,
}

impl Default for CrouchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: CrouchMode::Hold,
            distance: 0.5,
            crouch_time: 0.2,
            crouch_initial_speed: 4.0,
            stand_time: 0.25,
            stand_initial_speed: 3.0,
            speed_factor: 0.5,
            jump_causes_standing: true,
            sprint_causes_standing: true,
            crouch_priority_over_sprint: true,
            stand_ignores_dynamic: false,
        }
    }
}

/// External impulse parameters.
#[derive(Reflect, Debug, Clone, Copy)]
pub struct ImpulseConfig {
    /// Mass used to turn impulses into velocity.
    ///
    /// When `None` the backend's reported mass is used.
    pub mass: Option<f32>,
    /// Linear damping coefficient (`v *= 1 - damp * dt`).
    pub linear_damp: f32,
    /// Constant deceleration of impulse velocity (units/second^2). Zero disables it.
    pub constant_deceleration: f32,
    /// Scale the constant deceleration by the friction of the ground below.
    pub deceleration_uses_ground_friction: bool,
}

impl Default for ImpulseConfig {
    fn default() -> Self {
        Self {
            mass: None,
            linear_damp: 0.0,
            constant_deceleration: 8.0,
            deceleration_uses_ground_friction: false,
        }
    }
}

/// Shape-cast sensor parameters.
///
/// Radius changes are percentages of the capsule radius (`-10.0` casts a
/// sphere 10% narrower than the capsule).
#[derive(Reflect, Debug, Clone, Copy)]
pub struct SensorConfig {
    /// Casts start this far inside the capsule so resting contacts are found.
    pub cast_lift: f32,
    pub ground_offset: f32,
    pub ground_radius_percent: f32,
    pub ground_close_offset: f32,
    pub ground_close_radius_percent: f32,
    pub coyote_offset: f32,
    /// At `-100.0` or below the coyote probe is a ray.
    pub coyote_radius_percent: f32,
    pub head_offset: f32,
    pub head_radius_percent: f32,
    pub stand_radius_percent: f32,
    /// Steepest walkable surface (radians from up).
    pub max_grounded_angle: f32,
    /// Difference between requested and realized velocity tolerated before a
    /// move counts as obstructed.
    pub velocity_tolerance: f32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            cast_lift: 0.05,
            ground_offset: 0.02,
            ground_radius_percent: -10.0,
            ground_close_offset: 0.5,
            ground_close_radius_percent: -10.0,
            coyote_offset: 1.0,
            coyote_radius_percent: -10.0,
            head_offset: 0.05,
            head_radius_percent: -10.0,
            stand_radius_percent: -10.0,
            max_grounded_angle: FRAC_PI_4,
            velocity_tolerance: 0.05,
        }
    }
}

impl SensorConfig {
    /// Effective probe radius for a capsule radius and a percentage change.
    pub fn probe_radius(capsule_radius: f32, percent: f32) -> f32 {
        (capsule_radius * (1.0 + percent / 100.0)).max(0.0)
    }
}

/// Look parameters (heading and pitch).
#[derive(Reflect, Debug, Clone, Copy)]
pub struct LookConfig {
    /// Yaw rate at full input (radians/second).
    pub yaw_rate: f32,
    /// Pitch rate at full input (radians/second).
    pub pitch_rate: f32,
    /// Pitch limit in both directions (radians).
    pub max_pitch: f32,
    pub invert_pitch: bool,
}

impl Default for LookConfig {
    fn default() -> Self {
        Self {
            yaw_rate: 3.0,
            pitch_rate: 3.0,
            max_pitch: 89f32.to_radians(),
            invert_pitch: false,
        }
    }
}

/// Configuration parameters for the character controller.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct ControllerConfig {
    /// Which schedule runs velocity logic. The other one only drives look.
    pub velocity_step: StepKind,
    /// Eye height above the capsule bottom while standing.
    pub eye_height: f32,
    pub walking: WalkingConfig,
    pub sprint: SprintConfig,
    pub jumping: JumpingConfig,
    pub crouch: CrouchConfig,
    pub impulse: ImpulseConfig,
    pub sensors: SensorConfig,
    pub look: LookConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            velocity_step: StepKind::Fixed,
            eye_height: 1.6,
            walking: WalkingConfig::default(),
            sprint: SprintConfig::default(),
            jumping: JumpingConfig::default(),
            crouch: CrouchConfig::default(),
            impulse: ImpulseConfig::default(),
            sensors: SensorConfig::default(),
            look: LookConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Create a config tuned for a grounded, deliberate player character.
    pub fn player() -> Self {
        Self {
            walking: WalkingConfig {
                deceleration_factor: 2.0,
                opposing_deceleration_factor: 2.0,
                ..default()
            },
            ..default()
        }
    }

    /// Create a config with snappy movement, double jump and unlimited sprint.
    pub fn arcade() -> Self {
        Self {
            walking: WalkingConfig {
                top_speed: 7.0,
                acceleration: 60.0,
                back_scale: 1.0,
                ..default()
            },
            sprint: SprintConfig {
                max_time: 0.0,
                sprint_backwards: true,
                ..default()
            },
            jumping: JumpingConfig {
                double_jump: true,
                coyote_time: 0.15,
                air_acceleration_factor: 0.8,
                inclines_affect_air_velocity: false,
                ..default()
            },
            ..default()
        }
    }

    /// Builder: set which schedule runs velocity logic.
    pub fn with_velocity_step(mut self, kind: StepKind) -> Self {
        self.velocity_step = kind;
        self
    }

    /// Builder: set walking speed and acceleration.
    pub fn with_movement(mut self, top_speed: f32, acceleration: f32) -> Self {
        self.walking.top_speed = top_speed;
        self.walking.acceleration = acceleration;
        self
    }

    /// Builder: set the per-direction speed scales.
    pub fn with_direction_scales(mut self, forward: f32, back: f32, left: f32, right: f32) -> Self {
        self.walking.forward_scale = forward;
        self.walking.back_scale = back;
        self.walking.left_scale = left;
        self.walking.right_scale = right;
        self
    }

    /// Builder: set gravity.
    pub fn with_gravity(mut self, gravity: f32) -> Self {
        self.jumping.gravity = gravity;
        self
    }

    /// Builder: set jump initial velocity and hold distance.
    pub fn with_jump(mut self, initial_velocity: f32, hold_distance: f32) -> Self {
        self.jumping.initial_velocity = initial_velocity;
        self.jumping.hold_distance = hold_distance;
        self
    }

    /// Builder: enable or disable the double jump.
    pub fn with_double_jump(mut self, enabled: bool) -> Self {
        self.jumping.double_jump = enabled;
        self
    }

    /// Builder: set coyote time.
    pub fn with_coyote_time(mut self, time: f32) -> Self {
        self.jumping.coyote_time = time;
        self
    }

    /// Builder: set sprint duration and cooldown.
    pub fn with_sprint_times(mut self, max_time: f32, cooldown_time: f32) -> Self {
        self.sprint.max_time = max_time;
        self.sprint.cooldown_time = cooldown_time;
        self
    }

    /// Builder: set the crouch input mode.
    pub fn with_crouch_mode(mut self, mode: CrouchMode) -> Self {
        self.crouch.mode = mode;
        self
    }

    /// Builder: set crouch travel distance and durations.
    pub fn with_crouch(mut self, distance: f32, crouch_time: f32, stand_time: f32) -> Self {
        self.crouch.distance = distance;
        self.crouch.crouch_time = crouch_time;
        self.crouch.stand_time = stand_time;
        self
    }

    /// Builder: set the reference mass used for impulses.
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.impulse.mass = Some(mass);
        self
    }

    /// Builder: set the walkable slope limit (radians).
    pub fn with_max_grounded_angle(mut self, angle: f32) -> Self {
        self.sensors.max_grounded_angle = angle;
        self
    }

    /// Compute the derived tuning, correcting infeasible values.
    ///
    /// Every correction is reported so callers can surface it as a warning.
    pub fn derive(&self) -> (DerivedTuning, Vec<ConfigIssue>) {
        let mut issues = Vec::new();

        let (crouch_ramp, issue) = Ramp::solve(
            "crouch",
            self.crouch.distance,
            self.crouch.crouch_time,
            self.crouch.crouch_initial_speed,
        );
        issues.extend(issue);

        let (stand_ramp, issue) = Ramp::solve(
            "stand",
            self.crouch.distance,
            self.crouch.stand_time,
            self.crouch.stand_initial_speed,
        );
        issues.extend(issue);

        let jumping = &self.jumping;
        let (jump_max_hold_time, issue) = solve_jump_max_hold_time(
            jumping.initial_velocity,
            jumping.gravity,
            jumping.held_gravity_factor,
            jumping.hold_distance,
        );
        issues.extend(issue);

        let (double_jump_max_hold_time, issue) = solve_jump_max_hold_time(
            jumping.double_jump_initial_velocity,
            jumping.gravity,
            jumping.held_gravity_factor,
            jumping.hold_distance,
        );
        if jumping.double_jump {
            issues.extend(issue);
        }

        let mass = match self.impulse.mass {
            Some(mass) if mass.is_nan() || mass <= 0.0 => {
                issues.push(ConfigIssue::NotPositive {
                    field: "mass",
                    value: mass,
                    applied: 1.0,
                });
                Some(1.0)
            }
            other => other,
        };

        (
            DerivedTuning {
                crouch_ramp,
                stand_ramp,
                jump_max_hold_time,
                double_jump_max_hold_time,
                mass,
            },
            issues,
        )
    }
}

/// Values computed from a [`ControllerConfig`] whenever it changes.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct DerivedTuning {
    pub crouch_ramp: Ramp,
    pub stand_ramp: Ramp,
    pub jump_max_hold_time: f32,
    pub double_jump_max_hold_time: f32,
    /// Corrected mass override, if one is configured.
    pub mass: Option<f32>,
}

impl Default for DerivedTuning {
    fn default() -> Self {
        ControllerConfig::default().derive().0
    }
}

//! The per-character locomotion core.
//!
//! [`Locomotion`] owns every sub-controller and runs them in a fixed order each
//! step: ground sensing, obstruction correction, crouch, sprint, horizontal
//! blending, vertical motion, impulse decay and finally the incline tilt that
//! composes the world-space velocity.
//!
//! Nothing here touches the ECS. The plugin systems feed a [`StepContext`] in
//! and apply the returned [`StepOutput`] through the physics backend.

pub mod crouch;
pub mod ground;
pub mod horizontal;
pub mod impulse;
pub mod incline;
pub mod obstruction;
pub mod sprint;
pub mod vertical;

use std::f32::consts::{PI, TAU};

use bevy::prelude::*;

use crate::collision::SensorReadings;
use crate::config::{CharacterOrientation, ControllerConfig, DerivedTuning, LookConfig, StepKind};
use crate::events::LocomotionObserver;
use crate::intent::MovementInput;

use crouch::{CrouchInputs, CrouchState};
use ground::GroundState;
use horizontal::{incline_factor, target_velocity, top_speed_along, BlendRates, HorizontalVelocity};
use impulse::ImpulseState;
use incline::tilt_xy;
use obstruction::{ObstructionState, VelocityRequest};
use sprint::{SprintRequest, SprintState};
use vertical::{VerticalInputs, VerticalState};

/// Heading and pitch of the character's view.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct LookState {
    /// Radians around up, wrapped into `[-PI, PI)`. Positive turns left.
    pub heading: f32,
    /// Radians, positive looks up.
    pub pitch: f32,
}

impl LookState {
    pub fn update(&mut self, dt: f32, input: &MovementInput, config: &LookConfig) {
        self.heading = wrap_angle(self.heading - input.yaw * config.yaw_rate * dt);

        let pitch_input = if config.invert_pitch {
            -input.pitch
        } else {
            input.pitch
        };
        let limit = config.max_pitch.abs();
        self.pitch = (self.pitch + pitch_input * config.pitch_rate * dt).clamp(-limit, limit);
    }
}

fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// Everything one step reads from outside the core.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub config: &'a ControllerConfig,
    pub derived: &'a DerivedTuning,
    pub input: &'a MovementInput,
    pub readings: &'a SensorReadings,
    pub orientation: CharacterOrientation,
    /// Mass used to turn impulses into velocity.
    pub mass: f32,
}

/// Result of one step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepOutput {
    /// World-space velocity to apply, `None` when this step does not drive velocity.
    pub velocity: Option<Vec3>,
    /// Crouch offset along up, in `[-crouch distance, 0]`.
    pub local_z_travel: f32,
}

/// Complete locomotion state for one character.
#[derive(Reflect, Debug, Clone, Default)]
pub struct Locomotion {
    pub ground: GroundState,
    pub horizontal: HorizontalVelocity,
    pub vertical: VerticalState,
    pub crouch: CrouchState,
    pub sprint: SprintState,
    pub impulse: ImpulseState,
    pub obstruction: ObstructionState,
    pub look: LookState,
    prev_jump: bool,
    prev_sprint: bool,
    /// Planar velocity captured when leaving the ground, local frame.
    takeoff_velocity_xy: Vec2,
    velocity: Vec3,
}

impl Locomotion {
    /// World-space velocity requested by the last velocity step.
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Queue an impulse for the next velocity step.
    pub fn apply_linear_impulse(&mut self, impulse: Vec3) {
        self.impulse.apply(impulse);
    }

    /// Force the grounded result of the next velocity step.
    pub fn override_grounded(&mut self, grounded: bool) {
        self.ground.override_grounded(grounded);
    }

    /// Advance the core by `dt` for the step source `kind`.
    ///
    /// Only the configured velocity step runs the movement pipeline. The other
    /// step source updates look only.
    pub fn advance(
        &mut self,
        dt: f32,
        kind: StepKind,
        ctx: StepContext,
        observer: &mut impl LocomotionObserver,
    ) -> StepOutput {
        let idle = StepOutput {
            velocity: None,
            local_z_travel: self.crouch.local_z_travel,
        };
        if dt.is_nan() || dt <= 0.0 {
            return idle;
        }
        if kind != ctx.config.velocity_step {
            self.look.update(dt, ctx.input, &ctx.config.look);
            return idle;
        }

        let config = ctx.config;
        let input = ctx.input;
        let readings = ctx.readings;
        let up = ctx.orientation.up();
        let frame = ctx.orientation.frame(self.look.heading);
        let max_angle = config.sensors.max_grounded_angle;

        let was_grounded = self.ground.grounded;
        let takeoff_normal = frame.to_local(self.ground.ground_normal);
        self.ground.update(
            dt,
            readings,
            up,
            max_angle,
            self.vertical.applied_velocity_z,
            observer,
        );
        let grounded = self.ground.grounded;
        let ground_close = self.ground.ground_close;
        let normal_local = frame.to_local(self.ground.ground_normal);

        if let Some(realized) = self.obstruction.update(
            readings.physics_velocity,
            ground_close,
            config.sensors.velocity_tolerance,
            observer,
        ) {
            self.horizontal.correct(realized);
            if !grounded {
                // Momentum lost against a wall stays lost for the rest of the flight.
                self.takeoff_velocity_xy = realized;
            }
        }

        let jump_held = input.jump_held();
        let sprint_held = input.sprint_held();
        let jump_pressed = jump_held && !self.prev_jump;
        let sprint_pressed = sprint_held && !self.prev_sprint;
        self.prev_jump = jump_held;
        self.prev_sprint = sprint_held;

        let stand_blocked = readings.stand.iter().any(|hit| {
            !readings.is_excluded(hit) && !(config.crouch.stand_ignores_dynamic && hit.dynamic)
        });
        let crouch = self.crouch.update(
            dt,
            CrouchInputs {
                crouch_held: input.crouch_held(),
                jump_pressed,
                sprint_pressed,
                sprint_held,
                stand_blocked,
            },
            &config.crouch,
            &ctx.derived.crouch_ramp,
            &ctx.derived.stand_ramp,
            observer,
        );

        let move_vector = input.move_vector();
        self.sprint.update(
            dt,
            SprintRequest {
                intensity: input.sprint,
                moving: move_vector.length_squared() > f32::EPSILON,
                moving_backwards: move_vector.y < 0.0,
                grounded,
                crouching: self.crouch.is_low(),
            },
            &config.sprint,
            observer,
        );

        if was_grounded && !grounded {
            let takeoff = self.horizontal.applied_velocity_xy;
            self.takeoff_velocity_xy = takeoff
                * incline_factor(
                    takeoff,
                    takeoff_normal,
                    max_angle,
                    config.walking.moving_up_incline_factor,
                );
            if config.jumping.inclines_affect_air_velocity {
                self.horizontal.correct(self.takeoff_velocity_xy);
            }
        }

        let crouch_factor = self.crouch.speed_factor(&config.crouch);
        let airborne = !grounded;
        let target = if airborne && config.jumping.inclines_affect_air_velocity {
            self.takeoff_velocity_xy
        } else if airborne && !config.jumping.air_control {
            self.horizontal.applied_velocity_xy
        } else {
            let incline = if grounded {
                incline_factor(
                    move_vector,
                    normal_local,
                    max_angle,
                    config.walking.moving_up_incline_factor,
                )
            } else {
                1.0
            };
            let speed_factor = self.sprint.velocity_adjust_factor * crouch_factor * incline;
            target_velocity(move_vector, &config.walking, speed_factor)
        };

        let mut blend_dt = dt * self.sprint.accel_adjust_factor;
        if airborne && !ground_close {
            blend_dt *= config.jumping.air_acceleration_factor;
        }
        let planar = self.horizontal.update(
            target,
            blend_dt,
            BlendRates::from(&config.walking),
            observer,
        );

        let heading_velocity = self.horizontal.applied_velocity_xy;
        let top_walk = top_speed_along(heading_velocity, &config.walking, crouch_factor);
        let top_sprint = self.sprint.sprinting.then(|| {
            top_speed_along(
                heading_velocity,
                &config.walking,
                crouch_factor * config.sprint.velocity_scale,
            )
        });
        self.horizontal
            .report_top_speed(top_walk, top_sprint, observer);

        let jumped = self.vertical.update(
            dt,
            VerticalInputs {
                jump: jump_held && !crouch.jump_consumed,
                grounded,
                air_time: self.ground.air_time,
                ungrounded_due_to_jump: self.ground.ungrounded_due_to_jump,
                head_blocked: readings.head.iter().any(|hit| !readings.is_excluded(hit)),
                gravity_blocked: self.obstruction.gravity_blocked,
                coyote_ground_lost: self.ground.coyote_ground_lost(),
            },
            &config.jumping,
            ctx.derived,
            observer,
        );
        if crouch.jump_consumed {
            self.vertical.jump_requires_repress = true;
        }
        if jumped {
            self.ground.mark_ungrounded();
        }

        let vertical_impulse = self.impulse.update(
            dt,
            ctx.mass,
            up,
            &config.impulse,
            self.ground.ground_friction,
        );
        if vertical_impulse != 0.0 {
            self.vertical.add_velocity(vertical_impulse);
            if vertical_impulse > 0.0 {
                self.ground.mark_ungrounded();
            }
        }

        let tilt_normal = if grounded && !jumped {
            normal_local
        } else {
            Vec3::Z
        };
        let planar_world = frame.to_world(tilt_xy(planar, tilt_normal));
        let vertical = self.vertical.applied_velocity_z;
        let impulse = self.impulse.velocity_from_impulse;
        let velocity = planar_world + up * vertical + impulse;

        self.velocity = velocity;
        self.obstruction.record_request(VelocityRequest {
            velocity,
            vertical,
            impulse,
            tilt_normal,
            frame,
        });

        StepOutput {
            velocity: Some(velocity),
            local_z_travel: self.crouch.local_z_travel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::CollisionData;
    use crate::events::{EventQueue, LocomotionEvent};

    const DT: f32 = 1.0 / 60.0;

    struct Rig {
        locomotion: Locomotion,
        config: ControllerConfig,
        derived: DerivedTuning,
        input: MovementInput,
        readings: SensorReadings,
        events: EventQueue,
    }

    impl Rig {
        fn new(config: ControllerConfig) -> Self {
            Self {
                locomotion: Locomotion::default(),
                derived: config.derive().0,
                config,
                input: MovementInput::default(),
                readings: on_flat_ground(),
                events: EventQueue::new(),
            }
        }

        fn step_kind(&mut self, kind: StepKind) -> StepOutput {
            // A perfectly compliant body realizes last step's request.
            let realized = self.locomotion.velocity();
            self.step_realizing(kind, realized)
        }

        fn step_realizing(&mut self, kind: StepKind, realized: Vec3) -> StepOutput {
            self.readings.physics_velocity = realized;
            let ctx = StepContext {
                config: &self.config,
                derived: &self.derived,
                input: &self.input,
                readings: &self.readings,
                orientation: CharacterOrientation::default(),
                mass: 1.0,
            };
            self.locomotion.advance(DT, kind, ctx, &mut self.events)
        }

        fn step(&mut self) -> StepOutput {
            self.step_kind(StepKind::Fixed)
        }

        fn steps(&mut self, count: usize) {
            for _ in 0..count {
                self.step();
            }
        }
    }

    fn on_flat_ground() -> SensorReadings {
        SensorReadings {
            ground: vec![CollisionData::new(0.01, Vec3::Y, Vec3::ZERO, None)],
            ground_close: vec![CollisionData::new(0.01, Vec3::Y, Vec3::ZERO, None)],
            ..default()
        }
    }

    #[test]
    fn first_step_emits_midpoint_velocity() {
        let mut rig = Rig::new(ControllerConfig::default());
        rig.input.set_forward(1.0);

        let output = rig.step();
        let velocity = output.velocity.unwrap_or_default();

        assert!((rig.locomotion.horizontal.total_lerp_time - 1.0 / 6.0).abs() < 0.001);
        assert!((rig.locomotion.horizontal.lerp_time - 1.0 / 60.0).abs() < 0.0001);
        assert!((rig.locomotion.horizontal.applied_velocity_xy - Vec2::new(0.0, 0.5)).length() < 0.001);
        // Forward is -Z at zero heading.
        assert!((velocity - Vec3::new(0.0, 0.0, -0.25)).length() < 0.001);
    }

    #[test]
    fn reaches_top_speed() {
        let mut rig = Rig::new(ControllerConfig::default());
        rig.input.set_forward(1.0);
        rig.steps(30);

        assert!((rig.locomotion.velocity().length() - 5.0).abs() < 0.001);
        assert!(rig.events.contains(LocomotionEvent::StartedMoving));
        assert!(rig.events.contains(LocomotionEvent::TopWalkSpeedReached));
        assert!(rig.events.contains(LocomotionEvent::TargetVelocityReached));
    }

    #[test]
    fn other_step_kind_only_turns() {
        let mut rig = Rig::new(ControllerConfig::default());
        rig.input.set_forward(1.0);
        rig.input.set_yaw(1.0);

        let output = rig.step_kind(StepKind::Frame);
        assert!(output.velocity.is_none());
        assert!((rig.locomotion.look.heading + 3.0 * DT).abs() < 0.0001);
        assert_eq!(rig.locomotion.horizontal.applied_velocity_xy, Vec2::ZERO);
    }

    #[test]
    fn non_positive_dt_is_idle() {
        let mut rig = Rig::new(ControllerConfig::default());
        let ctx = StepContext {
            config: &rig.config,
            derived: &rig.derived,
            input: &rig.input,
            readings: &rig.readings,
            orientation: CharacterOrientation::default(),
            mass: 1.0,
        };
        let output = rig.locomotion.advance(0.0, StepKind::Fixed, ctx, &mut ());
        assert!(output.velocity.is_none());
    }

    #[test]
    fn heading_wraps() {
        let mut look = LookState {
            heading: 3.1,
            pitch: 0.0,
        };
        let input = MovementInput {
            yaw: -1.0,
            ..default()
        };
        look.update(0.1, &input, &LookConfig::default());
        assert!(look.heading < 0.0);
        assert!(look.heading >= -PI);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut look = LookState::default();
        let input = MovementInput {
            pitch: 1.0,
            ..default()
        };
        let config = LookConfig::default();
        for _ in 0..100 {
            look.update(0.1, &input, &config);
        }
        assert!((look.pitch - config.max_pitch).abs() < 0.0001);
    }

    #[test]
    fn jump_leaves_the_ground() {
        let mut rig = Rig::new(ControllerConfig::default());
        rig.step();
        rig.input.set_jump(true);

        let velocity = rig.step().velocity.unwrap_or_default();
        assert!((velocity.y - (6.0 - 5.0 * DT)).abs() < 0.001);
        assert!(rig.locomotion.ground.ungrounded_due_to_jump);
        assert!(rig.events.contains(LocomotionEvent::FirstJump));

        // Still touching the ground next step, but rising.
        rig.step();
        assert!(!rig.locomotion.ground.grounded);
    }

    #[test]
    fn jump_while_crouched_stands_instead() {
        let mut rig = Rig::new(ControllerConfig::default());
        rig.input.set_crouch(true);
        rig.steps(20);
        assert!(rig.locomotion.crouch.crouched);

        rig.input.set_jump(true);
        rig.step();
        assert!(!rig.events.contains(LocomotionEvent::FirstJump));
        assert!(rig.locomotion.crouch.standing_up_in_progress);

        rig.steps(5);
        assert!(!rig.events.contains(LocomotionEvent::FirstJump), "jump needs a re-press");
    }

    #[test]
    fn crouching_slows_target() {
        let mut rig = Rig::new(ControllerConfig::default());
        rig.input.set_crouch(true);
        rig.input.set_forward(1.0);
        rig.steps(60);
        assert!((rig.locomotion.velocity().length() - 2.5).abs() < 0.001);
    }

    #[test]
    fn sprint_raises_top_speed() {
        let mut rig = Rig::new(ControllerConfig::default());
        rig.input.set_forward(1.0);
        rig.input.set_sprint(true);
        rig.steps(60);
        assert!(rig.locomotion.sprint.sprinting);
        assert!((rig.locomotion.velocity().length() - 7.5).abs() < 0.001);
        assert!(rig.events.contains(LocomotionEvent::TopSprintSpeedReached));
    }

    #[test]
    fn upward_impulse_ungrounds() {
        let mut rig = Rig::new(ControllerConfig::default());
        rig.step();
        rig.locomotion.apply_linear_impulse(Vec3::new(0.0, 4.0, 0.0));

        let velocity = rig.step().velocity.unwrap_or_default();
        assert!((velocity.y - 4.0).abs() < 0.001);
        assert!(rig.locomotion.ground.ungrounded_due_to_jump);
    }

    #[test]
    fn without_air_control_velocity_is_frozen() {
        let config = ControllerConfig {
            jumping: crate::config::JumpingConfig {
                air_control: false,
                ..default()
            },
            ..default()
        };
        let mut rig = Rig::new(config);
        rig.input.set_forward(1.0);
        rig.steps(30);

        rig.readings = SensorReadings::default();
        rig.input.set_forward(0.0);
        rig.input.set_left(1.0);
        rig.steps(10);

        let planar = rig.locomotion.horizontal.applied_velocity_xy;
        assert!((planar - Vec2::new(0.0, 5.0)).length() < 0.001);
    }

    #[test]
    fn grounded_override_lasts_one_step() {
        let mut rig = Rig::new(ControllerConfig::default());
        rig.step();
        rig.locomotion.override_grounded(false);
        rig.step();
        assert!(!rig.locomotion.ground.grounded);
        rig.step();
        assert!(rig.locomotion.ground.grounded);
    }

    fn count(events: &EventQueue, event: LocomotionEvent) -> usize {
        events.events().iter().filter(|e| **e == event).count()
    }

    #[test]
    fn arrested_fall_stays_blocked() {
        let mut rig = Rig::new(ControllerConfig::default());
        rig.readings = SensorReadings::default();

        let mut blocked = Vec::new();
        for _ in 0..12 {
            rig.step_realizing(StepKind::Fixed, Vec3::ZERO);
            blocked.push(rig.locomotion.obstruction.gravity_blocked);
        }

        assert!(!blocked[0] && !blocked[1]);
        assert!(blocked[2..].iter().all(|b| *b), "{blocked:?}");
        assert_eq!(count(&rig.events, LocomotionEvent::CharacterGravityObstructed), 1);
        // Still asking for a little gravity, never building up a fall.
        let vertical = rig.locomotion.velocity().y;
        assert!(vertical < 0.0 && vertical > -1.0);

        // The ledge disappears and the body falls again.
        rig.step();
        rig.step();
        assert!(!rig.locomotion.obstruction.gravity_blocked);
    }

    #[test]
    fn airborne_keeps_takeoff_velocity() {
        let mut rig = Rig::new(ControllerConfig::default());
        rig.input.set_forward(1.0);
        rig.steps(30);

        rig.readings = SensorReadings::default();
        rig.input.set_forward(0.0);
        rig.input.set_left(1.0);
        rig.steps(20);

        let planar = rig.locomotion.horizontal.applied_velocity_xy;
        assert!((planar - Vec2::new(0.0, 5.0)).length() < 0.001, "{planar}");

        // A wall ahead stops the carried velocity for good.
        rig.step_realizing(StepKind::Fixed, Vec3::ZERO);
        rig.steps(5);
        let planar = rig.locomotion.horizontal.applied_velocity_xy;
        assert!(planar.length() < 0.001, "{planar}");
    }

    #[test]
    fn uphill_takeoff_is_scaled_by_incline() {
        let config = ControllerConfig {
            walking: crate::config::WalkingConfig {
                moving_up_incline_factor: 0.5,
                ..default()
            },
            ..default()
        };
        let mut rig = Rig::new(config);
        // Rising toward -Z, which is forward at zero heading.
        let angle = 20f32.to_radians();
        let slope = Vec3::new(0.0, angle.cos(), angle.sin());
        rig.readings = SensorReadings {
            ground: vec![CollisionData::new(0.01, slope, Vec3::ZERO, None)],
            ground_close: vec![CollisionData::new(0.01, slope, Vec3::ZERO, None)],
            ..default()
        };
        rig.input.set_forward(1.0);
        rig.steps(60);
        let on_slope = rig.locomotion.horizontal.applied_velocity_xy;

        rig.readings = SensorReadings::default();
        rig.step();

        let local_normal = Vec3::new(0.0, -angle.sin(), angle.cos());
        let factor = incline_factor(
            Vec2::Y,
            local_normal,
            rig.config.sensors.max_grounded_angle,
            0.5,
        );
        assert!(factor < 1.0);
        let takeoff = rig.locomotion.horizontal.applied_velocity_xy;
        assert!((takeoff - on_slope * factor).length() < 0.001, "{takeoff} vs {on_slope}");
    }

    #[test]
    fn coyote_jump_needs_ground_past_the_ledge() {
        let mut over_pit = Rig::new(ControllerConfig::default());
        over_pit.step();
        over_pit.readings = SensorReadings {
            ground_close_coyote: Some(Vec::new()),
            ..default()
        };
        over_pit.input.set_jump(true);
        over_pit.step();
        assert!(!over_pit.events.contains(LocomotionEvent::FirstJump));

        let mut over_step = Rig::new(ControllerConfig::default());
        over_step.step();
        over_step.readings = SensorReadings {
            ground_close_coyote: Some(vec![CollisionData::new(0.2, Vec3::Y, Vec3::ZERO, None)]),
            ..default()
        };
        over_step.input.set_jump(true);
        over_step.step();
        assert!(over_step.events.contains(LocomotionEvent::FirstJump));
    }

    #[test]
    fn air_acceleration_applies_away_from_ground_only() {
        let config = ControllerConfig {
            jumping: crate::config::JumpingConfig {
                inclines_affect_air_velocity: false,
                ..default()
            },
            ..default()
        };
        let mut near = Rig::new(config);
        let mut far = Rig::new(config);
        for rig in [&mut near, &mut far] {
            rig.input.set_forward(1.0);
            rig.steps(30);
            rig.input.set_forward(0.0);
            rig.input.set_left(1.0);
        }

        near.readings = SensorReadings {
            ground_close: vec![CollisionData::new(0.3, Vec3::Y, Vec3::ZERO, None)],
            ..default()
        };
        far.readings = SensorReadings::default();
        near.steps(5);
        far.steps(5);

        let gap = |rig: &Rig| {
            (rig.locomotion.horizontal.applied_velocity_xy
                - rig.locomotion.horizontal.target_velocity_xy)
                .length()
        };
        assert!(!near.locomotion.ground.grounded && near.locomotion.ground.ground_close);
        assert!(gap(&near) < gap(&far));
    }
}

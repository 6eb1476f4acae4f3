//! Vertical (local Z) motion: gravity integration and the jump state machine.

use bevy::prelude::*;

use crate::config::{DerivedTuning, JumpingConfig};
use crate::error::ConfigIssue;
use crate::events::LocomotionObserver;

/// Solve the longest a jump may be held.
///
/// Under held gravity `g * held_factor` the character reaches `hold_distance`
/// after `t` where `hold_distance = t * (v0 + v_at) / 2` and
/// `v_at = sqrt(v0^2 + 2 * g * held_factor * hold_distance)`. When the held
/// trajectory peaks below `hold_distance` the hold is capped at the time to
/// apogee, `v0 / |g * held_factor|`, and an issue is reported.
pub fn solve_jump_max_hold_time(
    initial_velocity: f32,
    gravity: f32,
    held_factor: f32,
    hold_distance: f32,
) -> (f32, Option<ConfigIssue>) {
    if hold_distance <= 0.0 {
        return (0.0, None);
    }

    let held_gravity = gravity * held_factor;
    let at_distance_sq = initial_velocity * initial_velocity + 2.0 * held_gravity * hold_distance;
    if at_distance_sq >= 0.0 {
        let sum = initial_velocity + at_distance_sq.sqrt();
        if sum > 0.0 {
            return (2.0 * hold_distance / sum, None);
        }
    }

    let (hold_time, apogee) = if held_gravity.abs() > f32::EPSILON {
        let rise = initial_velocity.max(0.0);
        (rise / held_gravity.abs(), rise * rise / (2.0 * held_gravity.abs()))
    } else {
        (0.0, 0.0)
    };

    (
        hold_time,
        Some(ConfigIssue::JumpHoldDistanceUnreachable {
            hold_distance,
            apogee,
            hold_time,
        }),
    )
}

/// Phase of the vertical state machine.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalPhase {
    #[default]
    Grounded,
    /// Walked off a ledge, ground jumps are still allowed.
    CoyoteGrace,
    /// Airborne without having jumped.
    Falling,
    JumpHeld,
    /// Hold released (or timed out) while still rising.
    JumpFallingFast,
    /// Past the apogee of a jump.
    JumpFallingSlow,
    DoubleJumpHeld,
}

impl VerticalPhase {
    fn gravity_factor(self, config: &JumpingConfig) -> f32 {
        match self {
            Self::Grounded => 0.0,
            Self::CoyoteGrace | Self::Falling => 1.0,
            Self::JumpHeld | Self::DoubleJumpHeld => config.held_gravity_factor,
            Self::JumpFallingFast => config.falling_gravity_factor,
            Self::JumpFallingSlow => config.secondary_falling_gravity_factor,
        }
    }

    fn rising(self) -> bool {
        matches!(
            self,
            Self::JumpHeld | Self::DoubleJumpHeld | Self::JumpFallingFast
        )
    }
}

/// Per-step inputs of the vertical controller.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VerticalInputs {
    pub jump: bool,
    pub grounded: bool,
    pub air_time: f32,
    pub ungrounded_due_to_jump: bool,
    pub head_blocked: bool,
    pub gravity_blocked: bool,
    /// The coyote probe was cast and found no ground below.
    pub coyote_ground_lost: bool,
}

/// Vertical velocity state along the character's up axis.
///
/// Invariant: `jump_timer <= jump_max_hold_time` while the jump is held.
#[derive(Reflect, Debug, Clone, Default)]
pub struct VerticalState {
    pub phase: VerticalPhase,
    pub applied_velocity_z: f32,
    pub current_delta: f32,
    pub previous_delta: f32,
    pub jump_held: bool,
    pub jump_requires_repress: bool,
    pub double_jump_final_jump_used: bool,
    pub jump_timer: f32,
    pub jump_max_hold_time: f32,
    coyote_gravity_debt: f32,
    coyote_release_rate: f32,
}

impl VerticalState {
    /// Whether the last available jump has been used.
    pub fn final_jump_performed(&self) -> bool {
        self.double_jump_final_jump_used
    }

    /// Add velocity once, outside of the integration (vertical impulses).
    pub fn add_velocity(&mut self, velocity: f32) {
        self.applied_velocity_z += velocity;
        if velocity > 0.0 && self.phase == VerticalPhase::Grounded {
            self.phase = VerticalPhase::Falling;
        }
    }

    /// Advance one step. Returns `true` when a jump started this step.
    pub fn update(
        &mut self,
        dt: f32,
        inputs: VerticalInputs,
        config: &JumpingConfig,
        derived: &DerivedTuning,
        observer: &mut impl LocomotionObserver,
    ) -> bool {
        if !inputs.jump {
            self.jump_requires_repress = false;
        }
        let fresh_press = inputs.jump && !self.jump_requires_repress;
        let ground_press = if config.requires_repress {
            fresh_press
        } else {
            inputs.jump && !self.jump_held
        };

        let coyote = !inputs.grounded
            && !inputs.ungrounded_due_to_jump
            && config.coyote_time > 0.0
            && inputs.air_time < config.coyote_time
            && !inputs.coyote_ground_lost
            && matches!(self.phase, VerticalPhase::Grounded | VerticalPhase::CoyoteGrace);

        if inputs.grounded {
            self.land();
        }

        if (inputs.grounded || coyote) && ground_press {
            self.start_jump(
                dt,
                config.initial_velocity,
                VerticalPhase::JumpHeld,
                derived.jump_max_hold_time,
                config,
            );
            observer.on_first_jump();
            if !config.double_jump {
                observer.on_final_jump();
            }
            return true;
        }

        if !inputs.grounded
            && !coyote
            && config.double_jump
            && !self.double_jump_final_jump_used
            && fresh_press
        {
            self.start_jump(
                dt,
                config.double_jump_initial_velocity,
                VerticalPhase::DoubleJumpHeld,
                derived.double_jump_max_hold_time,
                config,
            );
            self.double_jump_final_jump_used = true;
            observer.on_final_jump();
            return true;
        }

        if inputs.grounded {
            return false;
        }

        if self.jump_held {
            self.jump_timer = (self.jump_timer + dt).min(self.jump_max_hold_time);
            if !inputs.jump || self.jump_timer >= self.jump_max_hold_time {
                self.jump_held = false;
                if self.applied_velocity_z > 0.0 {
                    self.phase = VerticalPhase::JumpFallingFast;
                }
            }
        }

        if inputs.head_blocked && config.head_hit_sets_apogee && self.applied_velocity_z > 0.0 {
            self.applied_velocity_z = 0.0;
            self.previous_delta = 0.0;
            self.jump_held = false;
            self.phase = VerticalPhase::JumpFallingSlow;
        }

        if coyote {
            self.phase = VerticalPhase::CoyoteGrace;
        } else if matches!(self.phase, VerticalPhase::Grounded | VerticalPhase::CoyoteGrace) {
            self.phase = VerticalPhase::Falling;
            if self.coyote_gravity_debt != 0.0 {
                self.coyote_release_rate = self.coyote_gravity_debt.abs() / config.coyote_time.max(dt);
            }
        }

        if self.phase.rising() && self.applied_velocity_z <= 0.0 {
            self.phase = VerticalPhase::JumpFallingSlow;
            self.jump_held = false;
        }

        let mut delta = config.gravity * self.phase.gravity_factor(config) * dt;
        if self.phase == VerticalPhase::CoyoteGrace && config.suppress_gravity_during_coyote {
            self.coyote_gravity_debt += delta;
            delta = 0.0;
        } else if self.coyote_gravity_debt != 0.0 {
            let release = (self.coyote_release_rate * dt).min(self.coyote_gravity_debt.abs())
                * self.coyote_gravity_debt.signum();
            delta += release;
            self.coyote_gravity_debt -= release;
        }

        self.current_delta = delta;
        self.applied_velocity_z += (self.current_delta + self.previous_delta) * 0.5;
        self.previous_delta = self.current_delta;

        // Blocked falls keep requesting one step of gravity, so a cleared
        // obstruction shows up as realized downward motion again.
        if inputs.gravity_blocked && self.applied_velocity_z < 0.0 {
            self.applied_velocity_z = self.current_delta.min(0.0);
            self.previous_delta = 0.0;
        }

        false
    }

    fn land(&mut self) {
        self.phase = VerticalPhase::Grounded;
        self.applied_velocity_z = 0.0;
        self.current_delta = 0.0;
        self.previous_delta = 0.0;
        self.jump_held = false;
        self.jump_timer = 0.0;
        self.double_jump_final_jump_used = false;
        self.coyote_gravity_debt = 0.0;
        self.coyote_release_rate = 0.0;
    }

    fn start_jump(
        &mut self,
        dt: f32,
        initial_velocity: f32,
        phase: VerticalPhase,
        max_hold_time: f32,
        config: &JumpingConfig,
    ) {
        // The first frame applies its own delta only, no blend with the
        // pre-jump gravity sample.
        let delta = config.gravity * config.held_gravity_factor * dt;
        self.applied_velocity_z = initial_velocity + delta;
        self.current_delta = delta;
        self.previous_delta = delta;
        self.phase = phase;
        self.jump_held = true;
        self.jump_timer = 0.0;
        self.jump_max_hold_time = max_hold_time;
        self.jump_requires_repress = true;
        self.coyote_gravity_debt = 0.0;
        self.coyote_release_rate = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::events::{EventQueue, LocomotionEvent};

    const DT: f32 = 1.0 / 60.0;

    fn jumping() -> JumpingConfig {
        JumpingConfig {
            gravity: -30.0,
            initial_velocity: 6.0,
            double_jump_initial_velocity: 5.0,
            held_gravity_factor: 0.1,
            falling_gravity_factor: 2.0,
            secondary_falling_gravity_factor: 1.5,
            hold_distance: 0.8,
            coyote_time: 0.1,
            ..default()
        }
    }

    fn derived_for(jumping: JumpingConfig) -> DerivedTuning {
        ControllerConfig {
            jumping,
            ..default()
        }
        .derive()
        .0
    }

    fn grounded(jump: bool) -> VerticalInputs {
        VerticalInputs {
            jump,
            grounded: true,
            ..default()
        }
    }

    fn airborne(jump: bool, air_time: f32, after_jump: bool) -> VerticalInputs {
        VerticalInputs {
            jump,
            grounded: false,
            air_time,
            ungrounded_due_to_jump: after_jump,
            ..default()
        }
    }

    #[test]
    fn max_hold_time_is_positive_root() {
        let (time, issue) = solve_jump_max_hold_time(6.0, -30.0, 0.1, 0.8);
        let at_distance = (36.0f32 + 2.0 * -30.0 * 0.1 * 0.8).sqrt();

        assert!(issue.is_none());
        assert!(time > 0.0);
        assert!((0.8 - time * (6.0 + at_distance) / 2.0).abs() < 1e-5);
    }

    #[test]
    fn unreachable_hold_distance_falls_back() {
        let (time, issue) = solve_jump_max_hold_time(6.0, -30.0, 1.0, 10.0);
        assert!((time - 0.2).abs() < 1e-5);
        assert!(matches!(
            issue,
            Some(ConfigIssue::JumpHoldDistanceUnreachable { .. })
        ));
    }

    #[test]
    fn jump_first_frame_applies_delta_directly() {
        let config = jumping();
        let derived = derived_for(config);
        let mut state = VerticalState::default();
        let mut events = EventQueue::new();

        let jumped = state.update(DT, grounded(true), &config, &derived, &mut events);

        assert!(jumped);
        assert_eq!(state.phase, VerticalPhase::JumpHeld);
        assert!((state.applied_velocity_z - (6.0 - 3.0 * DT)).abs() < 1e-5);
        assert_eq!(
            events.events(),
            &[LocomotionEvent::FirstJump, LocomotionEvent::FinalJump]
        );
    }

    #[test]
    fn trapezoidal_fall() {
        let config = jumping();
        let derived = derived_for(config);
        let mut state = VerticalState::default();
        state.update(DT, grounded(false), &config, &derived, &mut ());

        state.update(DT, airborne(false, 0.5, false), &config, &derived, &mut ());
        assert!((state.applied_velocity_z - (-30.0 * DT * 0.5)).abs() < 1e-5);

        state.update(DT, airborne(false, 0.6, false), &config, &derived, &mut ());
        assert!((state.applied_velocity_z - (-30.0 * DT * 1.5)).abs() < 1e-5);
        assert_eq!(state.phase, VerticalPhase::Falling);
    }

    #[test]
    fn holding_jump_requires_repress() {
        let config = jumping();
        let derived = derived_for(config);
        let mut state = VerticalState::default();

        assert!(state.update(DT, grounded(true), &config, &derived, &mut ()));
        // Land while still holding.
        assert!(!state.update(DT, grounded(true), &config, &derived, &mut ()));
        state.update(DT, grounded(false), &config, &derived, &mut ());
        assert!(state.update(DT, grounded(true), &config, &derived, &mut ()));
    }

    #[test]
    fn hold_timer_is_capped() {
        let config = jumping();
        let derived = derived_for(config);
        let mut state = VerticalState::default();
        state.update(DT, grounded(true), &config, &derived, &mut ());

        for step in 0..30 {
            state.update(DT, airborne(true, DT * step as f32, true), &config, &derived, &mut ());
            assert!(state.jump_timer <= state.jump_max_hold_time);
        }
        assert!(!state.jump_held);
        assert_ne!(state.phase, VerticalPhase::JumpHeld);
    }

    #[test]
    fn releasing_jump_cuts_the_rise() {
        let config = jumping();
        let derived = derived_for(config);
        let mut state = VerticalState::default();
        state.update(DT, grounded(true), &config, &derived, &mut ());

        state.update(DT, airborne(false, DT, true), &config, &derived, &mut ());
        assert_eq!(state.phase, VerticalPhase::JumpFallingFast);
        assert!((state.current_delta - (-30.0 * 2.0 * DT)).abs() < 1e-5);
    }

    #[test]
    fn apogee_switches_to_secondary_gravity() {
        let config = jumping();
        let derived = derived_for(config);
        let mut state = VerticalState::default();
        state.update(DT, grounded(true), &config, &derived, &mut ());

        let mut step = 1;
        while state.applied_velocity_z > 0.0 && step < 200 {
            state.update(DT, airborne(false, DT * step as f32, true), &config, &derived, &mut ());
            step += 1;
        }
        state.update(DT, airborne(false, DT * step as f32, true), &config, &derived, &mut ());
        assert_eq!(state.phase, VerticalPhase::JumpFallingSlow);
        assert!((state.current_delta - (-30.0 * 1.5 * DT)).abs() < 1e-5);
    }

    #[test]
    fn head_hit_sets_apogee() {
        let config = jumping();
        let derived = derived_for(config);
        let mut state = VerticalState::default();
        state.update(DT, grounded(true), &config, &derived, &mut ());

        let inputs = VerticalInputs {
            head_blocked: true,
            ..airborne(true, DT, true)
        };
        state.update(DT, inputs, &config, &derived, &mut ());

        assert_eq!(state.phase, VerticalPhase::JumpFallingSlow);
        assert!(state.applied_velocity_z <= 0.0);
        assert!(!state.jump_held);
    }

    #[test]
    fn coyote_jump_within_window_only() {
        let config = jumping();
        let derived = derived_for(config);

        let mut late = VerticalState::default();
        late.update(DT, grounded(false), &config, &derived, &mut ());
        late.update(DT, airborne(false, 0.05, false), &config, &derived, &mut ());
        late.update(DT, airborne(false, 0.15, false), &config, &derived, &mut ());
        assert!(!late.update(DT, airborne(true, 0.2, false), &config, &derived, &mut ()));

        let mut early = VerticalState::default();
        early.update(DT, grounded(false), &config, &derived, &mut ());
        early.update(DT, airborne(false, 0.03, false), &config, &derived, &mut ());
        assert_eq!(early.phase, VerticalPhase::CoyoteGrace);
        assert!(early.update(DT, airborne(true, 0.05, false), &config, &derived, &mut ()));
        assert_eq!(early.phase, VerticalPhase::JumpHeld);
    }

    #[test]
    fn double_jump_happens_once() {
        let config = JumpingConfig {
            double_jump: true,
            ..jumping()
        };
        let derived = derived_for(config);
        let mut state = VerticalState::default();
        let mut events = EventQueue::new();

        state.update(DT, grounded(true), &config, &derived, &mut events);
        state.update(DT, airborne(false, DT, true), &config, &derived, &mut events);
        assert!(!state.final_jump_performed());

        assert!(state.update(DT, airborne(true, 2.0 * DT, true), &config, &derived, &mut events));
        assert_eq!(state.phase, VerticalPhase::DoubleJumpHeld);
        assert!(state.final_jump_performed());
        assert!((state.applied_velocity_z - (5.0 - 3.0 * DT)).abs() < 1e-5);

        state.update(DT, airborne(false, 3.0 * DT, true), &config, &derived, &mut events);
        assert!(!state.update(DT, airborne(true, 4.0 * DT, true), &config, &derived, &mut events));

        assert_eq!(
            events.events(),
            &[LocomotionEvent::FirstJump, LocomotionEvent::FinalJump]
        );

        state.update(DT, grounded(false), &config, &derived, &mut events);
        assert!(!state.final_jump_performed(), "landing restores the double jump");
    }

    #[test]
    fn suppressed_coyote_gravity_is_released_later() {
        let config = JumpingConfig {
            suppress_gravity_during_coyote: true,
            ..jumping()
        };
        let derived = derived_for(config);
        let mut state = VerticalState::default();
        state.update(DT, grounded(false), &config, &derived, &mut ());

        let mut air_time = 0.0;
        for _ in 0..3 {
            air_time += DT;
            state.update(DT, airborne(false, air_time, false), &config, &derived, &mut ());
        }
        assert_eq!(state.phase, VerticalPhase::CoyoteGrace);
        assert_eq!(state.applied_velocity_z, 0.0);
        let debt = state.coyote_gravity_debt;
        assert!(debt < 0.0);

        state.update(DT, airborne(false, 0.2, false), &config, &derived, &mut ());
        assert_eq!(state.phase, VerticalPhase::Falling);
        assert!(state.coyote_gravity_debt > debt, "release is gradual");
        for _ in 0..20 {
            state.update(DT, airborne(false, 0.3, false), &config, &derived, &mut ());
        }
        assert_eq!(state.coyote_gravity_debt, 0.0);
    }

    #[test]
    fn gravity_block_stops_falling() {
        let config = jumping();
        let derived = derived_for(config);
        let mut state = VerticalState::default();
        state.update(DT, grounded(false), &config, &derived, &mut ());
        state.update(DT, airborne(false, 0.5, false), &config, &derived, &mut ());

        let blocked = VerticalInputs {
            gravity_blocked: true,
            ..airborne(false, 0.6, false)
        };
        state.update(DT, blocked, &config, &derived, &mut ());
        assert!((state.applied_velocity_z + 0.5).abs() < 1e-5);

        // The request stays at a single step of gravity instead of building up.
        for _ in 0..10 {
            state.update(DT, blocked, &config, &derived, &mut ());
        }
        assert!((state.applied_velocity_z + 0.5).abs() < 1e-5);
    }

    #[test]
    fn coyote_jump_needs_ground_below() {
        let config = jumping();
        let derived = derived_for(config);
        let mut state = VerticalState::default();
        state.update(DT, grounded(false), &config, &derived, &mut ());

        let over_pit = VerticalInputs {
            coyote_ground_lost: true,
            ..airborne(false, 0.03, false)
        };
        state.update(DT, over_pit, &config, &derived, &mut ());
        assert_eq!(state.phase, VerticalPhase::Falling);

        let jump = VerticalInputs {
            coyote_ground_lost: true,
            ..airborne(true, 0.05, false)
        };
        assert!(!state.update(DT, jump, &config, &derived, &mut ()));
    }
}

//! Crouch and stand transitions.
//!
//! Both directions follow a [`Ramp`]: a linear velocity profile from an initial
//! speed to a back-solved final speed that covers the crouch distance in the
//! configured time.

use bevy::prelude::*;

use crate::config::{CrouchConfig, CrouchMode};
use crate::error::ConfigIssue;
use crate::events::LocomotionObserver;

const EPSILON: f32 = 1e-6;

/// A time-bounded travel with linearly changing speed.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Default)]
pub struct Ramp {
    pub distance: f32,
    pub time: f32,
    pub initial_speed: f32,
    pub final_speed: f32,
}

impl Ramp {
    /// Build a ramp covering `distance` in `time`, starting at `initial_speed`.
    ///
    /// The final speed is `2 * distance / time - initial_speed`. A negative
    /// final speed lowers the start speed so the ramp ends at rest; a final
    /// speed above the start speed turns the ramp into constant motion.
    pub fn solve(
        name: &'static str,
        distance: f32,
        time: f32,
        initial_speed: f32,
    ) -> (Self, Option<ConfigIssue>) {
        let distance = distance.max(0.0);
        if time.is_nan() || time <= 0.0 {
            let ramp = Self {
                distance,
                ..default()
            };
            return (ramp, Some(ConfigIssue::RampTimeNotPositive { ramp: name, time }));
        }
        if distance <= 0.0 {
            return (
                Self {
                    time,
                    ..default()
                },
                None,
            );
        }

        let average = 2.0 * distance / time;
        let final_speed = average - initial_speed;

        if final_speed < 0.0 {
            let ramp = Self {
                distance,
                time,
                initial_speed: average,
                final_speed: 0.0,
            };
            let issue = ConfigIssue::RampStartTooFast {
                ramp: name,
                requested: initial_speed,
                applied: average,
                distance,
                time,
            };
            return (ramp, Some(issue));
        }

        if final_speed > initial_speed {
            let constant = distance / time;
            let ramp = Self {
                distance,
                time,
                initial_speed: constant,
                final_speed: constant,
            };
            let issue = ConfigIssue::RampStartTooSlow {
                ramp: name,
                requested: initial_speed,
                applied: constant,
                distance,
                time,
            };
            return (ramp, Some(issue));
        }

        (
            Self {
                distance,
                time,
                initial_speed,
                final_speed,
            },
            None,
        )
    }

    pub fn acceleration(&self) -> f32 {
        if self.time > 0.0 {
            (self.final_speed - self.initial_speed) / self.time
        } else {
            0.0
        }
    }

    /// Distance travelled `elapsed` seconds into the ramp.
    pub fn travel_at(&self, elapsed: f32) -> f32 {
        if self.time <= 0.0 {
            return self.distance;
        }
        let t = elapsed.clamp(0.0, self.time);
        (self.initial_speed * t + 0.5 * self.acceleration() * t * t).min(self.distance)
    }

    /// Elapsed ramp time at which `travel` has been covered, in `[0, time]`.
    pub fn time_for_travel(&self, travel: f32) -> f32 {
        if self.time <= 0.0 || travel <= 0.0 {
            return 0.0;
        }
        if travel >= self.distance {
            return self.time;
        }

        let a = self.acceleration();
        let v0 = self.initial_speed;
        let t = if a.abs() < EPSILON {
            if v0 > EPSILON {
                travel / v0
            } else {
                self.time
            }
        } else {
            let discriminant = v0 * v0 + 2.0 * a * travel;
            if discriminant < 0.0 {
                self.time
            } else {
                (discriminant.sqrt() - v0) / a
            }
        };

        if t.is_finite() {
            t.clamp(0.0, self.time)
        } else {
            self.time
        }
    }
}

/// Per-step inputs of the crouch controller.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CrouchInputs {
    pub crouch_held: bool,
    /// Jump was pressed this step.
    pub jump_pressed: bool,
    /// Sprint was pressed this step.
    pub sprint_pressed: bool,
    pub sprint_held: bool,
    /// The stand probe found something in the way.
    pub stand_blocked: bool,
}

/// Result of one crouch update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CrouchOutcome {
    /// The jump press was used to stand up and must not also jump.
    pub jump_consumed: bool,
}

/// Crouch state for one character.
///
/// `local_z_travel` is in `[-distance, 0]`; at most one of the two
/// in-progress flags is set.
#[derive(Reflect, Debug, Clone)]
pub struct CrouchState {
    /// Heading down or fully down.
    pub crouching: bool,
    pub crouched: bool,
    pub standing: bool,
    pub crouching_down_in_progress: bool,
    pub standing_up_in_progress: bool,
    pub local_z_travel: f32,
    pub up_down_timer: f32,
    pub stand_prevented: bool,
    toggle_latched: bool,
    crouch_requires_repress: bool,
    crouch_input_prev: bool,
}

impl Default for CrouchState {
    fn default() -> Self {
        Self {
            crouching: false,
            crouched: false,
            standing: true,
            crouching_down_in_progress: false,
            standing_up_in_progress: false,
            local_z_travel: 0.0,
            up_down_timer: 0.0,
            stand_prevented: false,
            toggle_latched: false,
            crouch_requires_repress: false,
            crouch_input_prev: false,
        }
    }
}

impl CrouchState {
    /// Lower than standing height, or on the way down.
    pub fn is_low(&self) -> bool {
        self.crouching || self.local_z_travel < 0.0
    }

    /// Horizontal speed multiplier for the current crouch state.
    pub fn speed_factor(&self, config: &CrouchConfig) -> f32 {
        if self.is_low() {
            config.speed_factor
        } else {
            1.0
        }
    }

    pub fn update(
        &mut self,
        dt: f32,
        inputs: CrouchInputs,
        config: &CrouchConfig,
        crouch_ramp: &Ramp,
        stand_ramp: &Ramp,
        observer: &mut impl LocomotionObserver,
    ) -> CrouchOutcome {
        let mut outcome = CrouchOutcome::default();
        let wants_low = self.wants_low(inputs, config, &mut outcome);
        let distance = crouch_ramp.distance;

        if wants_low {
            self.stand_prevented = false;
            if !self.crouching {
                self.crouching = true;
                self.standing = false;
                self.standing_up_in_progress = false;
                self.crouching_down_in_progress = true;
                self.up_down_timer = crouch_ramp.time_for_travel(-self.local_z_travel);
            }
            if self.crouching_down_in_progress {
                self.up_down_timer += dt;
                if self.up_down_timer >= crouch_ramp.time {
                    self.up_down_timer = crouch_ramp.time;
                    self.local_z_travel = -distance;
                    self.crouching_down_in_progress = false;
                    self.crouched = true;
                    observer.on_crouched();
                } else {
                    self.local_z_travel = -crouch_ramp.travel_at(self.up_down_timer);
                }
            }
        } else if self.crouching || self.standing_up_in_progress {
            if inputs.stand_blocked {
                if !self.stand_prevented {
                    observer.on_stand_prevented();
                }
                self.stand_prevented = true;
                return outcome;
            }
            self.stand_prevented = false;

            if self.crouching {
                self.crouching = false;
                self.crouched = false;
                self.crouching_down_in_progress = false;
                self.standing_up_in_progress = true;
                self.up_down_timer = stand_ramp.time_for_travel(distance + self.local_z_travel);
            }
            self.up_down_timer += dt;
            if self.up_down_timer >= stand_ramp.time {
                self.up_down_timer = stand_ramp.time;
                self.local_z_travel = 0.0;
                self.standing_up_in_progress = false;
                self.standing = true;
                observer.on_stood_up();
            } else {
                self.local_z_travel = -(distance - stand_ramp.travel_at(self.up_down_timer));
            }
        }

        self.local_z_travel = self.local_z_travel.clamp(-distance, 0.0);
        outcome
    }

    fn wants_low(
        &mut self,
        inputs: CrouchInputs,
        config: &CrouchConfig,
        outcome: &mut CrouchOutcome,
    ) -> bool {
        let pressed = inputs.crouch_held && !self.crouch_input_prev;
        self.crouch_input_prev = inputs.crouch_held;
        if !inputs.crouch_held {
            self.crouch_requires_repress = false;
        }

        if !config.enabled {
            self.toggle_latched = false;
            return false;
        }

        if config.mode == CrouchMode::Toggle && pressed {
            self.toggle_latched = !self.toggle_latched;
        }

        if self.is_low() && inputs.jump_pressed && config.jump_causes_standing {
            outcome.jump_consumed = true;
            self.force_stand();
            return false;
        }
        if self.is_low() && inputs.sprint_pressed && config.sprint_causes_standing {
            self.force_stand();
            return false;
        }

        let requested = match config.mode {
            CrouchMode::Hold => inputs.crouch_held && !self.crouch_requires_repress,
            CrouchMode::Toggle => self.toggle_latched,
        };
        if requested && inputs.sprint_held && !config.crouch_priority_over_sprint {
            return false;
        }
        requested
    }

    fn force_stand(&mut self) {
        self.toggle_latched = false;
        self.crouch_requires_repress = true;
    }
}

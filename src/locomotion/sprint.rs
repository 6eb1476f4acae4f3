//! Sprint gating and the stamina economy.

use bevy::prelude::*;

use crate::config::SprintConfig;
use crate::events::LocomotionObserver;

/// What the rest of the step tells the sprint controller.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SprintRequest {
    /// Sprint input intensity in `[0, 1]`.
    pub intensity: f32,
    pub moving: bool,
    pub moving_backwards: bool,
    pub grounded: bool,
    pub crouching: bool,
}

/// Sprint state for one character.
///
/// `held_duration` stays within `[0, max_time]` and `stamina_percentage`
/// within `[0, 100]`.
#[derive(Reflect, Debug, Clone)]
pub struct SprintState {
    pub sprinting: bool,
    pub held_duration: f32,
    pub cooldown_timer: f32,
    pub pause_timer: f32,
    pub stamina_percentage: f32,
    pub velocity_adjust_factor: f32,
    pub accel_adjust_factor: f32,
}

impl Default for SprintState {
    fn default() -> Self {
        Self {
            sprinting: false,
            held_duration: 0.0,
            cooldown_timer: 0.0,
            pause_timer: 0.0,
            stamina_percentage: 100.0,
            velocity_adjust_factor: 1.0,
            accel_adjust_factor: 1.0,
        }
    }
}

impl SprintState {
    pub fn in_cooldown(&self) -> bool {
        self.cooldown_timer > 0.0
    }

    pub fn update(
        &mut self,
        dt: f32,
        request: SprintRequest,
        config: &SprintConfig,
        observer: &mut impl LocomotionObserver,
    ) {
        let unlimited = config.max_time <= 0.0;

        if self.cooldown_timer > 0.0 {
            self.cooldown_timer -= dt;
            if self.cooldown_timer <= 0.0 {
                self.cooldown_timer = 0.0;
                self.finish_cooldown(config, observer);
            }
        }
        self.pause_timer = (self.pause_timer - dt).max(0.0);

        let exhausted = !unlimited && self.held_duration >= config.max_time;
        let allowed = config.enabled
            && request.intensity > 0.0
            && request.moving
            && (request.grounded || self.sprinting)
            && (config.sprint_backwards || !request.moving_backwards)
            && (config.sprint_while_crouched || !request.crouching)
            && !self.in_cooldown()
            && !exhausted
            && (self.sprinting || self.pause_timer <= 0.0);

        if allowed && !self.sprinting {
            observer.on_sprint_started();
        } else if !allowed && self.sprinting {
            observer.on_sprint_stopped();
            self.pause_timer = config.pause_time;
        }
        self.sprinting = allowed;

        if self.sprinting {
            let intensity = request.intensity.min(1.0);
            self.velocity_adjust_factor = 1.0 + (config.velocity_scale - 1.0) * intensity;
            self.accel_adjust_factor = 1.0 + (config.acceleration_scale - 1.0) * intensity;

            if !unlimited {
                let rate = if config.velocity_scale.abs() > f32::EPSILON {
                    self.velocity_adjust_factor / config.velocity_scale
                } else {
                    1.0
                };
                self.held_duration = (self.held_duration + dt * rate).min(config.max_time);
                if self.held_duration >= config.max_time {
                    self.exhaust(config, observer);
                }
            }
        } else {
            self.velocity_adjust_factor = 1.0;
            self.accel_adjust_factor = 1.0;
            self.regenerate(dt, config, observer);
        }

        self.stamina_percentage = if unlimited {
            100.0
        } else {
            (100.0 * (config.max_time - self.held_duration) / config.max_time).clamp(0.0, 100.0)
        };
    }

    fn exhaust(&mut self, config: &SprintConfig, observer: &mut impl LocomotionObserver) {
        self.sprinting = false;
        self.velocity_adjust_factor = 1.0;
        self.accel_adjust_factor = 1.0;
        self.pause_timer = config.pause_time;
        observer.on_stamina_reached_zero();
        observer.on_sprint_stopped();

        if config.cooldown_time > 0.0 {
            self.cooldown_timer = config.cooldown_time;
            observer.on_cooldown_started();
        } else {
            self.finish_cooldown(config, observer);
        }
    }

    fn finish_cooldown(&mut self, config: &SprintConfig, observer: &mut impl LocomotionObserver) {
        observer.on_cooldown_done();
        // Without regeneration the cooldown is the only way back to full stamina.
        if !config.regenerate && self.held_duration > 0.0 {
            self.held_duration = 0.0;
            observer.on_stamina_capped();
        }
    }

    fn regenerate(&mut self, dt: f32, config: &SprintConfig, observer: &mut impl LocomotionObserver) {
        if !config.regenerate
            || self.held_duration <= 0.0
            || self.pause_timer > 0.0
            || self.in_cooldown()
        {
            return;
        }

        self.held_duration = (self.held_duration - dt * config.regeneration_rate).max(0.0);
        if self.held_duration <= 0.0 {
            observer.on_stamina_capped();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventQueue, LocomotionEvent};

    fn sprinting() -> SprintRequest {
        SprintRequest {
            intensity: 1.0,
            moving: true,
            moving_backwards: false,
            grounded: true,
            crouching: false,
        }
    }

    fn resting() -> SprintRequest {
        SprintRequest {
            intensity: 0.0,
            ..sprinting()
        }
    }

    fn config() -> SprintConfig {
        SprintConfig {
            max_time: 1.0,
            cooldown_time: 0.5,
            pause_time: 0.2,
            regeneration_rate: 1.0,
            ..default()
        }
    }

    #[test]
    fn sprint_scales_velocity() {
        let mut state = SprintState::default();
        let mut events = EventQueue::new();
        state.update(0.1, sprinting(), &config(), &mut events);

        assert!(state.sprinting);
        assert!((state.velocity_adjust_factor - 1.5).abs() < 0.001);
        assert!((state.stamina_percentage - 90.0).abs() < 0.01);
        assert_eq!(events.events(), &[LocomotionEvent::SprintStarted]);
    }

    #[test]
    fn partial_intensity_drains_slower() {
        let mut state = SprintState::default();
        let request = SprintRequest {
            intensity: 0.5,
            ..sprinting()
        };
        state.update(0.3, request, &config(), &mut ());

        // factor 1.25 out of a maximum of 1.5
        assert!((state.held_duration - 0.25).abs() < 0.001);
    }

    #[test]
    fn exhaustion_starts_cooldown() {
        let mut state = SprintState::default();
        let mut events = EventQueue::new();
        for _ in 0..12 {
            state.update(0.1, sprinting(), &config(), &mut events);
        }

        assert!(!state.sprinting);
        assert!(state.in_cooldown() || events.contains(LocomotionEvent::CooldownDone));
        assert!(events.contains(LocomotionEvent::StaminaReachedZero));
        assert!(events.contains(LocomotionEvent::CooldownStarted));
        assert_eq!(state.held_duration, 1.0);
    }

    #[test]
    fn stamina_stays_in_bounds() {
        let mut state = SprintState::default();
        for step in 0..200 {
            let request = if (step / 25) % 2 == 0 { sprinting() } else { resting() };
            state.update(1.0 / 30.0, request, &config(), &mut ());
            assert!((0.0..=100.0).contains(&state.stamina_percentage));
            assert!((0.0..=1.0).contains(&state.held_duration));
        }
    }

    #[test]
    fn pause_blocks_quick_retrigger() {
        let mut state = SprintState::default();
        state.update(0.1, sprinting(), &config(), &mut ());
        state.update(0.1, resting(), &config(), &mut ());
        assert!(state.pause_timer > 0.0);

        state.update(0.05, sprinting(), &config(), &mut ());
        assert!(!state.sprinting, "pause should block re-trigger");

        state.update(0.2, sprinting(), &config(), &mut ());
        assert!(state.sprinting);
    }

    #[test]
    fn regeneration_caps_stamina() {
        let mut state = SprintState::default();
        let mut events = EventQueue::new();
        state.update(0.5, sprinting(), &config(), &mut events);
        for _ in 0..20 {
            state.update(0.1, resting(), &config(), &mut events);
        }

        assert_eq!(state.held_duration, 0.0);
        assert_eq!(state.stamina_percentage, 100.0);
        assert!(events.contains(LocomotionEvent::StaminaCapped));
    }

    #[test]
    fn no_regeneration_restores_after_cooldown() {
        let config = SprintConfig {
            regenerate: false,
            ..config()
        };
        let mut state = SprintState::default();
        state.update(0.5, sprinting(), &config, &mut ());
        for _ in 0..10 {
            state.update(0.1, resting(), &config, &mut ());
        }
        assert_eq!(state.held_duration, 0.5, "no regeneration without cooldown");

        state.update(0.6, sprinting(), &config, &mut ());
        assert!(state.in_cooldown());
        state.update(0.6, resting(), &config, &mut ());
        assert_eq!(state.held_duration, 0.0);
    }

    #[test]
    fn backwards_and_crouched_gating() {
        let mut state = SprintState::default();
        let backwards = SprintRequest {
            moving_backwards: true,
            ..sprinting()
        };
        state.update(0.1, backwards, &config(), &mut ());
        assert!(!state.sprinting);

        let crouched = SprintRequest {
            crouching: true,
            ..sprinting()
        };
        state.update(0.1, crouched, &config(), &mut ());
        assert!(!state.sprinting);
    }

    #[test]
    fn cannot_start_sprint_in_air() {
        let mut state = SprintState::default();
        let airborne = SprintRequest {
            grounded: false,
            ..sprinting()
        };
        state.update(0.1, airborne, &config(), &mut ());
        assert!(!state.sprinting);

        state.update(0.1, sprinting(), &config(), &mut ());
        state.update(0.1, airborne, &config(), &mut ());
        assert!(state.sprinting, "an active sprint continues through the air");
    }

    #[test]
    fn unlimited_sprint_never_drains() {
        let config = SprintConfig {
            max_time: 0.0,
            ..config()
        };
        let mut state = SprintState::default();
        for _ in 0..100 {
            state.update(0.1, sprinting(), &config, &mut ());
        }
        assert!(state.sprinting);
        assert_eq!(state.stamina_percentage, 100.0);
    }
}

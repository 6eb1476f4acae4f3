//! Locomotion notifications.
//!
//! The core reports transitions through [`LocomotionObserver`], one method per
//! notification. [`EventQueue`] records them as [`LocomotionEvent`] values,
//! which the plugin forwards to Bevy as [`ControllerEvent`]s.

use bevy::prelude::*;

/// A single locomotion notification.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub enum LocomotionEvent {
    /// Landed, carrying the distance fallen since the last apogee.
    GroundHit(f32),
    GroundSoonHit,
    Ungrounded,
    FirstJump,
    FinalJump,
    Crouched,
    StoodUp,
    StandPrevented,
    SprintStarted,
    SprintStopped,
    CooldownStarted,
    CooldownDone,
    StaminaCapped,
    StaminaReachedZero,
    VelocityXYObstructed,
    CharacterGravityObstructed,
    TopWalkSpeedReached,
    TopSprintSpeedReached,
    StartedMoving,
    Stopped,
    TargetVelocityReached,
}

/// Receiver of locomotion notifications.
///
/// Every method defaults to doing nothing, so implementors only override what
/// they care about. Each fires at most once per qualifying transition per step.
pub trait LocomotionObserver {
    fn on_ground_hit(&mut self, _fell_distance: f32) {}
    fn on_ground_soon_hit(&mut self) {}
    fn on_ungrounded(&mut self) {}
    fn on_first_jump(&mut self) {}
    fn on_final_jump(&mut self) {}
    fn on_crouched(&mut self) {}
    fn on_stood_up(&mut self) {}
    fn on_stand_prevented(&mut self) {}
    fn on_sprint_started(&mut self) {}
    fn on_sprint_stopped(&mut self) {}
    fn on_cooldown_started(&mut self) {}
    fn on_cooldown_done(&mut self) {}
    fn on_stamina_capped(&mut self) {}
    fn on_stamina_reached_zero(&mut self) {}
    fn on_velocity_xy_obstructed(&mut self) {}
    fn on_character_gravity_obstructed(&mut self) {}
    fn on_top_walk_speed_reached(&mut self) {}
    fn on_top_sprint_speed_reached(&mut self) {}
    fn on_started_moving(&mut self) {}
    fn on_stopped(&mut self) {}
    fn on_target_velocity_reached(&mut self) {}
}

/// Observer that ignores everything.
impl LocomotionObserver for () {}

/// Observer that records notifications in order.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: Vec<LocomotionEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[LocomotionEvent] {
        &self.events
    }

    pub fn contains(&self, event: LocomotionEvent) -> bool {
        self.events.contains(&event)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take all recorded events, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<LocomotionEvent> {
        std::mem::take(&mut self.events)
    }

    fn push(&mut self, event: LocomotionEvent) {
        self.events.push(event);
    }
}

impl LocomotionObserver for EventQueue {
    fn on_ground_hit(&mut self, fell_distance: f32) {
        self.push(LocomotionEvent::GroundHit(fell_distance));
    }
    fn on_ground_soon_hit(&mut self) {
        self.push(LocomotionEvent::GroundSoonHit);
    }
    fn on_ungrounded(&mut self) {
        self.push(LocomotionEvent::Ungrounded);
    }
    fn on_first_jump(&mut self) {
        self.push(LocomotionEvent::FirstJump);
    }
    fn on_final_jump(&mut self) {
        self.push(LocomotionEvent::FinalJump);
    }
    fn on_crouched(&mut self) {
        self.push(LocomotionEvent::Crouched);
    }
    fn on_stood_up(&mut self) {
        self.push(LocomotionEvent::StoodUp);
    }
    fn on_stand_prevented(&mut self) {
        self.push(LocomotionEvent::StandPrevented);
    }
    fn on_sprint_started(&mut self) {
        self.push(LocomotionEvent::SprintStarted);
    }
    fn on_sprint_stopped(&mut self) {
        self.push(LocomotionEvent::SprintStopped);
    }
    fn on_cooldown_started(&mut self) {
        self.push(LocomotionEvent::CooldownStarted);
    }
    fn on_cooldown_done(&mut self) {
        self.push(LocomotionEvent::CooldownDone);
    }
    fn on_stamina_capped(&mut self) {
        self.push(LocomotionEvent::StaminaCapped);
    }
    fn on_stamina_reached_zero(&mut self) {
        self.push(LocomotionEvent::StaminaReachedZero);
    }
    fn on_velocity_xy_obstructed(&mut self) {
        self.push(LocomotionEvent::VelocityXYObstructed);
    }
    fn on_character_gravity_obstructed(&mut self) {
        self.push(LocomotionEvent::CharacterGravityObstructed);
    }
    fn on_top_walk_speed_reached(&mut self) {
        self.push(LocomotionEvent::TopWalkSpeedReached);
    }
    fn on_top_sprint_speed_reached(&mut self) {
        self.push(LocomotionEvent::TopSprintSpeedReached);
    }
    fn on_started_moving(&mut self) {
        self.push(LocomotionEvent::StartedMoving);
    }
    fn on_stopped(&mut self) {
        self.push(LocomotionEvent::Stopped);
    }
    fn on_target_velocity_reached(&mut self) {
        self.push(LocomotionEvent::TargetVelocityReached);
    }
}

/// Bevy event carrying a notification for one character.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ControllerEvent {
    pub entity: Entity,
    pub event: LocomotionEvent,
}

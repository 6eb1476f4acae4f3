//! Movement input component.
//!
//! The controller never reads devices directly. Whatever drives the character
//! (keyboard, gamepad, AI, network) writes action intensities into
//! [`MovementInput`], and the controller reads them each step.

use bevy::prelude::*;

/// Per-action input intensities for one character.
///
/// Movement, sprint, crouch and jump are in `[0, 1]`; yaw and pitch are in
/// `[-1, 1]`. Values persist until changed, so an input source only needs to
/// write on press/release.
///
/// # Example
///
/// ```rust
/// use msg_fps_controller::prelude::*;
///
/// let mut input = MovementInput::default();
/// input.set_forward(1.0);
/// input.set_sprint(true);
/// assert!(input.is_moving());
/// assert!(input.sprint_held());
///
/// input.clear();
/// assert!(!input.is_moving());
/// ```
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct MovementInput {
    pub forward: f32,
    pub back: f32,
    pub left: f32,
    pub right: f32,
    /// Turn rate intensity (positive turns right).
    pub yaw: f32,
    /// Look rate intensity (positive looks up).
    pub pitch: f32,
    pub sprint: f32,
    pub crouch: f32,
    pub jump: f32,
}

impl MovementInput {
    /// Create a new empty input.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_forward(&mut self, value: f32) {
        self.forward = value.clamp(0.0, 1.0);
    }

    pub fn set_back(&mut self, value: f32) {
        self.back = value.clamp(0.0, 1.0);
    }

    pub fn set_left(&mut self, value: f32) {
        self.left = value.clamp(0.0, 1.0);
    }

    pub fn set_right(&mut self, value: f32) {
        self.right = value.clamp(0.0, 1.0);
    }

    /// Set movement from a stick-style vector (`x` = right, `y` = forward).
    pub fn set_move_axis(&mut self, axis: Vec2) {
        self.set_right(axis.x.max(0.0));
        self.set_left((-axis.x).max(0.0));
        self.set_forward(axis.y.max(0.0));
        self.set_back((-axis.y).max(0.0));
    }

    pub fn set_yaw(&mut self, value: f32) {
        self.yaw = value.clamp(-1.0, 1.0);
    }

    pub fn set_pitch(&mut self, value: f32) {
        self.pitch = value.clamp(-1.0, 1.0);
    }

    pub fn set_sprint(&mut self, held: bool) {
        self.sprint = if held { 1.0 } else { 0.0 };
    }

    pub fn set_crouch(&mut self, held: bool) {
        self.crouch = if held { 1.0 } else { 0.0 };
    }

    pub fn set_jump(&mut self, held: bool) {
        self.jump = if held { 1.0 } else { 0.0 };
    }

    /// Raw movement vector (`x` = right, `y` = forward), normalized when longer than 1.
    pub fn move_vector(&self) -> Vec2 {
        let raw = Vec2::new(self.right - self.left, self.forward - self.back);
        if raw.length_squared() > 1.0 {
            raw.normalize()
        } else {
            raw
        }
    }

    /// Whether any movement direction is active.
    pub fn is_moving(&self) -> bool {
        self.move_vector() != Vec2::ZERO
    }

    pub fn sprint_held(&self) -> bool {
        self.sprint > 0.0
    }

    pub fn crouch_held(&self) -> bool {
        self.crouch > 0.0
    }

    pub fn jump_held(&self) -> bool {
        self.jump > 0.0
    }

    /// Clear movement, look and action inputs.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

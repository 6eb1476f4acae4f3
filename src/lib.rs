//! # `msg_fps_controller`
//!
//! A first-person kinematic character controller with physics backend abstraction.
//!
//! This crate provides a responsive, tuneable locomotion core that:
//! - Senses ground, head room and stand-up room with sphere casts
//! - Blends horizontal velocity with per-direction scaling and incline handling
//! - Supports variable-height jumps, coyote time and an optional double jump
//! - Crouches with time-exact ramps and refuses to stand under obstacles
//! - Sprints with a stamina budget, cooldown and regeneration
//! - Decays external impulses and corrects velocity after obstructions
//! - Abstracts the physics backend for easy swapping (Rapier3D included)
//!
//! ## Architecture
//!
//! Every step runs four phases, both in `FixedUpdate` and `Update`:
//! 1. **Preparation** plans the sensor casts for each character
//! 2. **Sensors** lets the backend answer the casts
//! 3. **Locomotion** advances the core and applies velocity and capsule height
//! 4. **StateSync** refreshes markers and [`LocomotionStatus`]
//!
//! [`ControllerConfig::velocity_step`] picks which schedule drives velocity.
//! The other one only updates heading and pitch.
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use msg_fps_controller::prelude::*;
//!
//! // Create controller components for a player character
//! let controller = FpsController::new();
//! let config = ControllerConfig::player();
//! let input = MovementInput::default();
//!
//! // These can be spawned with the backend's physics components
//! ```
//!
//! [`LocomotionStatus`]: state::LocomotionStatus
//! [`ControllerConfig::velocity_step`]: config::ControllerConfig::velocity_step

use bevy::ecs::schedule::ScheduleLabel;
use bevy::prelude::*;

pub mod backend;
pub mod collision;
pub mod config;
pub mod error;
pub mod events;
pub mod intent;
pub mod locomotion;
pub mod state;
pub mod systems;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::backend::CharacterPhysicsBackend;
    pub use crate::collision::{CapsuleShape, CollisionData, SensorProbes, SensorReadings};
    pub use crate::config::{
        CharacterOrientation, ControllerConfig, CrouchConfig, CrouchMode, ImpulseConfig,
        JumpingConfig, LookConfig, SensorConfig, SprintConfig, StepKind, WalkingConfig,
    };
    pub use crate::error::ConfigIssue;
    pub use crate::events::{ControllerEvent, LocomotionEvent, LocomotionObserver};
    pub use crate::intent::MovementInput;
    pub use crate::locomotion::vertical::VerticalPhase;
    pub use crate::state::{
        Airborne, Crouched, FpsController, Grounded, LocomotionStatus, Sprinting,
    };
    pub use crate::{FpsControllerPlugin, FpsControllerSet};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dBackend, Rapier3dCharacterBundle};
}

/// System sets for the controller, run in order in both `FixedUpdate` and `Update`.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum FpsControllerSet {
    /// Activation and sensor planning.
    Preparation,
    /// Backend cast systems fill `SensorReadings`.
    Sensors,
    /// The locomotion step itself.
    Locomotion,
    /// Markers and status components.
    StateSync,
}

/// Main plugin for the character controller system.
///
/// This plugin is generic over a physics backend `B` which provides the actual
/// physics operations (shape casts, velocity, capsule resizing, etc.).
///
/// # Type Parameters
/// - `B`: The physics backend implementation (e.g., `Rapier3dBackend`)
///
/// # Examples
///
/// With Rapier3D backend:
/// ```rust,ignore
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use msg_fps_controller::prelude::*;
///
/// App::new()
///     .add_plugins(DefaultPlugins)
///     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default())
///     .add_plugins(FpsControllerPlugin::<Rapier3dBackend>::default())
///     .run();
/// ```
pub struct FpsControllerPlugin<B: backend::CharacterPhysicsBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::CharacterPhysicsBackend> Default for FpsControllerPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::CharacterPhysicsBackend> Plugin for FpsControllerPlugin<B> {
    fn build(&self, app: &mut App) {
        // Register core types
        app.register_type::<config::CharacterOrientation>();
        app.register_type::<config::ControllerConfig>();
        app.register_type::<intent::MovementInput>();
        app.register_type::<state::FpsController>();
        app.register_type::<state::LocomotionStatus>();
        app.register_type::<state::Grounded>();
        app.register_type::<state::Airborne>();
        app.register_type::<state::Crouched>();
        app.register_type::<state::Sprinting>();

        app.add_event::<events::ControllerEvent>();

        // Add the physics backend plugin
        app.add_plugins(B::plugin());

        app.add_systems(PreUpdate, systems::refresh_derived_tuning);

        configure_step_sets(app, FixedUpdate);
        configure_step_sets(app, Update);

        add_step_systems::<B, systems::FixedStep>(app, FixedUpdate);
        add_step_systems::<B, systems::FrameStep>(app, Update);
    }
}

fn configure_step_sets(app: &mut App, schedule: impl ScheduleLabel) {
    app.configure_sets(
        schedule,
        (
            FpsControllerSet::Preparation,
            FpsControllerSet::Sensors,
            FpsControllerSet::Locomotion,
            FpsControllerSet::StateSync,
        )
            .chain(),
    );
}

fn add_step_systems<B: backend::CharacterPhysicsBackend, K: systems::StepSource>(
    app: &mut App,
    schedule: impl ScheduleLabel,
) {
    app.add_systems(
        schedule,
        (
            systems::prepare_sensors::<B, K>.in_set(FpsControllerSet::Preparation),
            systems::advance_controllers::<B, K>.in_set(FpsControllerSet::Locomotion),
            systems::sync_state.in_set(FpsControllerSet::StateSync),
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CharacterPhysicsBackend, NoOpBackendPlugin};
    use crate::collision::CapsuleShape;

    struct StaticBackend;

    impl CharacterPhysicsBackend for StaticBackend {
        type VelocityComponent = Transform;

        fn plugin() -> impl Plugin {
            NoOpBackendPlugin
        }

        fn get_velocity(_world: &World, _entity: Entity) -> Vec3 {
            Vec3::ZERO
        }

        fn set_velocity(_world: &mut World, _entity: Entity, _velocity: Vec3) {}

        fn get_position(world: &World, entity: Entity) -> Vec3 {
            world
                .get::<Transform>(entity)
                .map(|t| t.translation)
                .unwrap_or(Vec3::ZERO)
        }

        fn get_capsule(_world: &World, _entity: Entity) -> Option<CapsuleShape> {
            Some(CapsuleShape::new(0.5, 0.5))
        }

        fn set_capsule(_world: &mut World, _entity: Entity, _capsule: CapsuleShape) {}

        fn get_fixed_timestep(_world: &World) -> f32 {
            1.0 / 60.0
        }
    }

    fn create_test_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(FpsControllerPlugin::<StaticBackend>::default());
        app.finish();
        app.cleanup();
        app
    }

    #[test]
    fn plugin_activates_controllers() {
        let mut app = create_test_app();
        let entity = app
            .world_mut()
            .spawn((
                Transform::default(),
                state::FpsController::new(),
                config::ControllerConfig::default(),
            ))
            .id();

        app.world_mut().run_schedule(FixedUpdate);

        let world = app.world();
        let controller = world.get::<state::FpsController>(entity);
        assert!(controller.is_some_and(|c| c.activated));
        assert_eq!(controller.and_then(|c| c.standing_half_height), Some(0.5));
        assert!(world.get::<collision::SensorProbes>(entity).is_some());
        assert!(world.get::<intent::MovementInput>(entity).is_some());
        assert!(world.get::<state::LocomotionStatus>(entity).is_some());
        // No ground was reported, so the character is airborne.
        assert!(world.get::<state::Airborne>(entity).is_some());
    }

    #[test]
    fn probes_are_planned_for_the_velocity_step_only() {
        let mut app = create_test_app();
        let entity = app
            .world_mut()
            .spawn((
                Transform::from_xyz(0.0, 1.0, 0.0),
                state::FpsController::new(),
                config::ControllerConfig::default(),
            ))
            .id();

        app.world_mut().run_schedule(Update);
        let probes = app.world().get::<collision::SensorProbes>(entity);
        assert!(probes.is_some_and(|p| p.requests.is_empty()));

        app.world_mut().run_schedule(FixedUpdate);
        let probes = app.world().get::<collision::SensorProbes>(entity);
        // Nothing answers in this backend, so the plan is still there.
        assert!(probes.is_some_and(|p| p.requests.len() == 4));
        assert!(probes.is_some_and(|p| p.exclude == vec![entity]));
    }
}

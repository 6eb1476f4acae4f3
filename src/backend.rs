//! Physics backend abstraction.
//!
//! This module defines the trait that physics backends must implement
//! to work with the controller. Shape casts are not part of the trait:
//! a backend's plugin adds a system to [`FpsControllerSet::Sensors`] that
//! answers every entity's [`SensorProbes`] by filling its [`SensorReadings`].
//!
//! [`FpsControllerSet::Sensors`]: crate::FpsControllerSet::Sensors
//! [`SensorProbes`]: crate::collision::SensorProbes
//! [`SensorReadings`]: crate::collision::SensorReadings

use bevy::prelude::*;

use crate::collision::CapsuleShape;

/// Trait for physics backend implementations.
///
/// Implement this trait to integrate a physics engine with the controller.
/// Every method is a static function over the ECS world, so backends keep
/// their own components and the controller never stores engine handles.
///
/// # Example
///
/// For an example implementation, see the `rapier` module's `Rapier3dBackend`
/// which implements this trait for Bevy Rapier3D.
pub trait CharacterPhysicsBackend: 'static + Send + Sync {
    /// The velocity component type used by this backend.
    type VelocityComponent: Component;

    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;

    /// Get the velocity the physics engine realized for an entity.
    fn get_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the velocity of an entity.
    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3);

    /// Get the current position (capsule center) of an entity.
    fn get_position(world: &World, entity: Entity) -> Vec3;

    /// Get the entity's capsule, if its collider is one.
    fn get_capsule(world: &World, entity: Entity) -> Option<CapsuleShape>;

    /// Replace the entity's capsule. Called when crouching changes its height.
    fn set_capsule(world: &mut World, entity: Entity, capsule: CapsuleShape);

    /// Get the fixed timestep delta time.
    fn get_fixed_timestep(world: &World) -> f32;

    /// Get the walkable slope limit of the engine's own character logic, if any.
    fn get_slope_limit(_world: &World, _entity: Entity) -> Option<f32> {
        None
    }

    /// Set the walkable slope limit (radians) of the engine's own character logic.
    fn set_slope_limit(_world: &mut World, _entity: Entity, _angle: f32) {}

    /// Get the mass of an entity.
    ///
    /// Used to turn impulses into velocity when the config has no mass override.
    fn get_mass(_world: &World, _entity: Entity) -> f32 {
        // Default implementation returns 1.0 (impulse equals velocity change)
        1.0
    }
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}

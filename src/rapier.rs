//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature.
//!
//! Characters are dynamic bodies without gravity whose velocity is written by
//! the controller every step. Run Rapier in the same schedule as the
//! controller's velocity step (`RapierPhysicsPlugin::in_fixed_schedule` for the
//! default [`StepKind::Fixed`]) so the realized velocity read back each step
//! belongs to the previous request.
//!
//! [`StepKind::Fixed`]: crate::config::StepKind::Fixed

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::backend::CharacterPhysicsBackend;
use crate::collision::{
    CapsuleShape, CollisionData, ProbeRequest, ProbeShape, SensorProbes, SensorReadings,
};
use crate::FpsControllerSet;

/// Upper bound on hits collected per probe.
const MAX_HITS_PER_PROBE: usize = 4;

/// Rapier3D physics backend for the character controller.
///
/// This backend uses `bevy_rapier3d` for velocity, capsule and mass access.
/// Sensor casts are answered by a dedicated system that receives the Rapier
/// context as a system parameter.
pub struct Rapier3dBackend;

impl CharacterPhysicsBackend for Rapier3dBackend {
    type VelocityComponent = Velocity;

    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }

    fn get_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.linvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel = velocity;
        }
    }

    fn get_position(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Transform>(entity)
            .map(|t| t.translation)
            .or_else(|| {
                world
                    .get::<GlobalTransform>(entity)
                    .map(|t| t.translation())
            })
            .unwrap_or(Vec3::ZERO)
    }

    fn get_capsule(world: &World, entity: Entity) -> Option<CapsuleShape> {
        world.get::<Collider>(entity).and_then(capsule_of)
    }

    fn set_capsule(world: &mut World, entity: Entity, capsule: CapsuleShape) {
        if let Some(mut collider) = world.get_mut::<Collider>(entity) {
            *collider = Collider::capsule_y(capsule.half_height, capsule.radius);
        }
    }

    fn get_fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.delta_secs())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 60.0)
    }

    fn get_slope_limit(world: &World, entity: Entity) -> Option<f32> {
        world
            .get::<KinematicCharacterController>(entity)
            .map(|kcc| kcc.max_slope_climb_angle)
    }

    fn set_slope_limit(world: &mut World, entity: Entity, angle: f32) {
        if let Some(mut kcc) = world.get_mut::<KinematicCharacterController>(entity) {
            kcc.max_slope_climb_angle = angle;
        }
    }

    fn get_mass(world: &World, entity: Entity) -> f32 {
        // Rapier fills this after the first physics step.
        world
            .get::<ReadMassProperties>(entity)
            .map(|props| props.mass)
            .filter(|mass| mass.is_finite() && *mass > 0.0)
            .unwrap_or(1.0)
    }
}

/// Capsule dimensions of a y-aligned capsule collider.
pub fn capsule_of(collider: &Collider) -> Option<CapsuleShape> {
    collider.as_capsule().map(|capsule| {
        let segment = capsule.segment();
        let half_height = (segment.a() - segment.b()).length() / 2.0;
        CapsuleShape::new(capsule.radius(), half_height)
    })
}

/// Plugin that sets up Rapier3D-specific systems for the character controller.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        // Casts are answered in whichever schedule planned them.
        app.add_systems(
            FixedUpdate,
            rapier_sensor_casts.in_set(FpsControllerSet::Sensors),
        );
        app.add_systems(
            Update,
            rapier_sensor_casts.in_set(FpsControllerSet::Sensors),
        );
    }
}

/// One cast against the Rapier world.
fn rapier_cast(
    context: &RapierContext,
    probe: &ProbeRequest,
    filter: QueryFilter,
) -> Option<(Entity, CollisionData)> {
    match probe.shape {
        ProbeShape::Sphere { radius } => {
            let shape = Collider::ball(radius);
            context
                .cast_shape(
                    probe.origin,
                    Quat::IDENTITY,
                    probe.direction,
                    &shape,
                    ShapeCastOptions {
                        max_time_of_impact: probe.max_distance,
                        stop_at_penetration: false,
                        ..default()
                    },
                    filter,
                )
                .map(|(hit_entity, hit)| {
                    let travelled = probe.origin + probe.direction * hit.time_of_impact;
                    let normal = hit
                        .details
                        .as_ref()
                        .map(|d| d.normal1)
                        .unwrap_or(-probe.direction);
                    let point = hit
                        .details
                        .as_ref()
                        .map(|d| d.witness1)
                        .unwrap_or(travelled + probe.direction * radius);
                    (
                        hit_entity,
                        CollisionData::new(hit.time_of_impact, normal, point, Some(hit_entity)),
                    )
                })
        }
        ProbeShape::Ray => context
            .cast_ray_and_get_normal(probe.origin, probe.direction, probe.max_distance, true, filter)
            .map(|(hit_entity, hit)| {
                (
                    hit_entity,
                    CollisionData::new(hit.time_of_impact, hit.normal, hit.point, Some(hit_entity)),
                )
            }),
    }
}

/// Cast `probe` repeatedly, skipping previous hits, to collect every contact.
fn rapier_cast_all(
    context: &RapierContext,
    probe: &ProbeRequest,
    exclude: &[Entity],
    groups: Option<CollisionGroups>,
) -> Vec<(Entity, CollisionData)> {
    let mut hits: Vec<(Entity, CollisionData)> = Vec::new();

    while hits.len() < MAX_HITS_PER_PROBE {
        let predicate =
            |e: Entity| !exclude.contains(&e) && !hits.iter().any(|(hit, _)| *hit == e);
        let mut filter = QueryFilter::default().exclude_sensors().predicate(&predicate);
        if let Some(groups) = groups {
            filter = filter.groups(groups);
        }

        let Some(hit) = rapier_cast(context, probe, filter) else {
            break;
        };
        hits.push(hit);
    }

    hits
}

/// Whether the body owning `entity` (or its parent) is simulated dynamically.
fn is_dynamic(entity: Entity, q_bodies: &Query<&RigidBody>, q_parents: &Query<&ChildOf>) -> bool {
    let body = q_bodies.get(entity).ok().or_else(|| {
        q_parents
            .get(entity)
            .ok()
            .and_then(|child_of| q_bodies.get(child_of.parent()).ok())
    });
    matches!(body, Some(RigidBody::Dynamic))
}

/// Answer every pending [`SensorProbes`] request with Rapier casts.
fn rapier_sensor_casts(
    rapier_context: ReadRapierContext,
    mut q_controllers: Query<(&mut SensorProbes, &mut SensorReadings, Option<&CollisionGroups>)>,
    q_bodies: Query<&RigidBody>,
    q_parents: Query<&ChildOf>,
    q_friction: Query<&Friction>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (mut probes, mut readings, collision_groups) in &mut q_controllers {
        if probes.requests.is_empty() {
            continue;
        }
        let requests = std::mem::take(&mut probes.requests);

        for probe in &requests {
            let hits = rapier_cast_all(&context, probe, &probes.exclude, collision_groups.copied())
                .into_iter()
                .map(|(entity, mut hit)| {
                    hit.dynamic = is_dynamic(entity, &q_bodies, &q_parents);
                    hit.friction = q_friction.get(entity).ok().map(|f| f.coefficient);
                    hit
                })
                .collect();
            readings.record(probe.kind, hits);
        }
    }
}

/// Bundle of Rapier components for a character controller entity.
///
/// This bundle provides the Rapier3D physics components a controlled character
/// needs: a dynamic body whose velocity the controller owns, no Rapier gravity
/// (the controller integrates its own), locked rotation and frictionless
/// contact so walls slide instead of sticking.
///
/// # Example
///
/// ```ignore
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use msg_fps_controller::prelude::*;
///
/// fn spawn_player(mut commands: Commands) {
///     commands.spawn((
///         Transform::from_xyz(0.0, 1.0, 0.0),
///         FpsController::new(),
///         ControllerConfig::player(),
///         MovementInput::default(),
///         Rapier3dCharacterBundle::new(),
///         Collider::capsule_y(0.5, 0.4),
///     ));
/// }
/// ```
#[derive(Bundle)]
pub struct Rapier3dCharacterBundle {
    pub rigid_body: RigidBody,
    /// Written by the controller every velocity step.
    pub velocity: Velocity,
    pub gravity_scale: GravityScale,
    pub locked_axes: LockedAxes,
    pub friction: Friction,
    /// Computed mass properties, used to turn impulses into velocity.
    pub mass_properties: ReadMassProperties,
    /// Carries the slope limit synced from the controller config.
    pub character_controller: KinematicCharacterController,
}

impl Default for Rapier3dCharacterBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl Rapier3dCharacterBundle {
    pub fn new() -> Self {
        Self {
            rigid_body: RigidBody::Dynamic,
            velocity: Velocity::default(),
            gravity_scale: GravityScale(0.0),
            locked_axes: LockedAxes::ROTATION_LOCKED,
            friction: Friction {
                coefficient: 0.0,
                combine_rule: CoefficientCombineRule::Min,
            },
            mass_properties: ReadMassProperties::default(),
            character_controller: KinematicCharacterController::default(),
        }
    }

    /// Set the rigid body type for the character.
    ///
    /// ```ignore
    /// let bundle = Rapier3dCharacterBundle::new().with_body(RigidBody::KinematicVelocityBased);
    /// ```
    pub fn with_body(mut self, body: RigidBody) -> Self {
        self.rigid_body = body;
        self
    }

    /// Set the contact friction of the character's own collider.
    pub fn with_friction(mut self, coefficient: f32) -> Self {
        self.friction.coefficient = coefficient;
        self
    }
}

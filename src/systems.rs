//! Core controller systems.
//!
//! These systems move data between the ECS and the locomotion core. They are
//! generic over the physics backend `B` and over the step source `K`, so the
//! same pipeline runs in `FixedUpdate` and `Update`. Only the step source that
//! matches a character's [`ControllerConfig::velocity_step`] drives velocity;
//! the other one only turns the view.

use bevy::prelude::*;

use crate::backend::CharacterPhysicsBackend;
use crate::collision::{CapsuleShape, SensorProbes, SensorReadings};
use crate::config::{CharacterOrientation, ControllerConfig, StepKind};
use crate::events::{ControllerEvent, EventQueue};
use crate::intent::MovementInput;
use crate::locomotion::StepContext;
use crate::state::{Airborne, Crouched, FpsController, Grounded, LocomotionStatus, Sprinting};

/// A schedule that can advance controllers.
pub trait StepSource: 'static + Send + Sync {
    const KIND: StepKind;

    /// Seconds elapsed since the previous step of this source.
    fn delta<B: CharacterPhysicsBackend>(world: &World) -> f32;
}

/// Fixed physics timestep (`FixedUpdate`).
pub struct FixedStep;

impl StepSource for FixedStep {
    const KIND: StepKind = StepKind::Fixed;

    fn delta<B: CharacterPhysicsBackend>(world: &World) -> f32 {
        B::get_fixed_timestep(world)
    }
}

/// Variable frame tick (`Update`).
pub struct FrameStep;

impl StepSource for FrameStep {
    const KIND: StepKind = StepKind::Frame;

    fn delta<B: CharacterPhysicsBackend>(world: &World) -> f32 {
        world
            .get_resource::<Time>()
            .map(|t| t.delta_secs())
            .unwrap_or(0.0)
    }
}

/// Recompute derived tuning when a controller's config changes.
///
/// Newly spawned controllers are handled by activation in [`prepare_sensors`].
pub fn refresh_derived_tuning(
    mut q_controllers: Query<(Entity, &ControllerConfig, &mut FpsController), Changed<ControllerConfig>>,
) {
    for (entity, config, mut controller) in &mut q_controllers {
        if !controller.activated {
            continue;
        }
        let (derived, issues) = config.derive();
        for issue in &issues {
            warn!("Controller {entity}: {issue}");
        }
        controller.derived = derived;
    }
}

/// First-step setup of a controller.
///
/// Derives the tuning, captures the standing capsule, syncs the backend's
/// slope limit and inserts the sensor and status components.
fn activate_controllers<B: CharacterPhysicsBackend>(world: &mut World) {
    let pending: Vec<(Entity, ControllerConfig)> = world
        .query::<(Entity, &FpsController, &ControllerConfig)>()
        .iter(world)
        .filter(|(_, controller, _)| !controller.activated)
        .map(|(e, _, config)| (e, *config))
        .collect();

    for (entity, config) in pending {
        let (derived, issues) = config.derive();
        for issue in &issues {
            warn!("Controller {entity}: {issue}");
        }

        let standing_half_height = B::get_capsule(world, entity).map(|c| c.half_height);
        if standing_half_height.is_none() {
            warn!("Controller {entity} has no capsule collider, crouching will not resize it");
        }

        let slope_limit = config.sensors.max_grounded_angle;
        if let Some(previous) = B::get_slope_limit(world, entity) {
            debug!("Controller {entity}: slope limit {previous} -> {slope_limit}");
        }
        B::set_slope_limit(world, entity, slope_limit);

        world.entity_mut(entity).insert_if_new((
            MovementInput::default(),
            CharacterOrientation::default(),
            SensorProbes::default(),
            SensorReadings::default(),
            LocomotionStatus::default(),
        ));

        if let Some(mut controller) = world.get_mut::<FpsController>(entity) {
            controller.derived = derived;
            controller.standing_half_height = standing_half_height;
            controller.activated = true;
        }
    }
}

/// The entity and all of its descendants.
fn self_and_descendants(world: &World, entity: Entity) -> Vec<Entity> {
    let mut result = vec![entity];
    let mut index = 0;
    while index < result.len() {
        if let Some(children) = world.get::<Children>(result[index]) {
            result.extend(children.to_vec());
        }
        index += 1;
    }
    result
}

/// Plan this step's sensor casts for every controller driven by `K`.
///
/// Also records the realized velocity and position the core will read.
pub fn prepare_sensors<B: CharacterPhysicsBackend, K: StepSource>(world: &mut World) {
    activate_controllers::<B>(world);

    let entities: Vec<(Entity, ControllerConfig, CharacterOrientation, f32)> = world
        .query::<(
            Entity,
            &FpsController,
            &ControllerConfig,
            Option<&CharacterOrientation>,
        )>()
        .iter(world)
        .filter(|(_, controller, config, _)| {
            controller.activated && config.velocity_step == K::KIND
        })
        .map(|(e, controller, config, orientation)| {
            (
                e,
                *config,
                orientation.copied().unwrap_or_default(),
                controller.locomotion.crouch.local_z_travel,
            )
        })
        .collect();

    for (entity, config, orientation, local_z_travel) in entities {
        let position = B::get_position(world, entity);
        let physics_velocity = B::get_velocity(world, entity);
        let exclude = self_and_descendants(world, entity);

        let requests = B::get_capsule(world, entity)
            .map(|capsule| {
                SensorProbes::plan(
                    position,
                    orientation.up(),
                    capsule,
                    -local_z_travel,
                    &config.sensors,
                    config.jumping.coyote_time > 0.0,
                )
            })
            .unwrap_or_default();

        if let Some(mut probes) = world.get_mut::<SensorProbes>(entity) {
            probes.requests = requests;
            probes.exclude = exclude.clone();
        }

        if let Some(mut readings) = world.get_mut::<SensorReadings>(entity) {
            readings.clear_hits();
            readings.exclude = exclude;
            readings.position = position;
            readings.physics_velocity = physics_velocity;
        }
    }
}

/// Advance every controller by one step of `K` and apply the result.
///
/// Velocity goes to the backend, crouch travel resizes the capsule with the
/// feet kept in place, heading becomes the entity rotation, and notifications
/// are sent as [`ControllerEvent`]s.
pub fn advance_controllers<B: CharacterPhysicsBackend, K: StepSource>(world: &mut World) {
    let dt = K::delta::<B>(world);

    let entities: Vec<(
        Entity,
        ControllerConfig,
        MovementInput,
        CharacterOrientation,
        SensorReadings,
    )> = world
        .query::<(
            Entity,
            &FpsController,
            &ControllerConfig,
            Option<&MovementInput>,
            Option<&CharacterOrientation>,
            Option<&SensorReadings>,
        )>()
        .iter(world)
        .filter(|(_, controller, ..)| controller.activated)
        .map(|(e, _, config, input, orientation, readings)| {
            (
                e,
                *config,
                input.copied().unwrap_or_default(),
                orientation.copied().unwrap_or_default(),
                readings.cloned().unwrap_or_default(),
            )
        })
        .collect();

    for (entity, config, input, orientation, readings) in entities {
        let mass_override = world
            .get::<FpsController>(entity)
            .and_then(|controller| controller.derived.mass);
        let mass = mass_override.unwrap_or_else(|| B::get_mass(world, entity));

        let mut events = EventQueue::new();
        let Some(mut controller) = world.get_mut::<FpsController>(entity) else {
            continue;
        };
        let derived = controller.derived;
        let phase_before = controller.locomotion.vertical.phase;

        let ctx = StepContext {
            config: &config,
            derived: &derived,
            input: &input,
            readings: &readings,
            orientation,
            mass,
        };
        let output = controller.locomotion.advance(dt, K::KIND, ctx, &mut events);

        let heading = controller.locomotion.look.heading;
        let phase_after = controller.locomotion.vertical.phase;
        let standing_half_height = controller.standing_half_height;

        if phase_before != phase_after {
            debug!("Controller {entity}: {phase_before:?} -> {phase_after:?}");
        }

        if let Some(velocity) = output.velocity {
            B::set_velocity(world, entity, velocity);
        }

        if let (Some(standing), Some(current)) =
            (standing_half_height, B::get_capsule(world, entity))
        {
            let target = CapsuleShape::new(current.radius, standing).resized(output.local_z_travel);
            let shift = target.half_height - current.half_height;
            if shift.abs() > f32::EPSILON {
                B::set_capsule(world, entity, target);
                if let Some(mut transform) = world.get_mut::<Transform>(entity) {
                    transform.translation += orientation.up() * shift;
                }
            }
        }

        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            let rotation = orientation.rotation(heading);
            if transform.rotation != rotation {
                transform.rotation = rotation;
            }
        }

        for event in events.drain() {
            world.send_event(ControllerEvent { entity, event });
        }
    }
}

/// Sync marker components and [`LocomotionStatus`] with the controller state.
#[allow(clippy::type_complexity)]
pub fn sync_state(
    mut commands: Commands,
    mut q_controllers: Query<(
        Entity,
        &FpsController,
        &ControllerConfig,
        Option<&mut LocomotionStatus>,
        Has<Grounded>,
        Has<Airborne>,
        Has<Crouched>,
        Has<Sprinting>,
    )>,
) {
    for (entity, controller, config, status, has_grounded, has_airborne, has_crouched, has_sprinting) in
        &mut q_controllers
    {
        if !controller.activated {
            continue;
        }

        let snapshot = LocomotionStatus::from_controller(controller, config);
        match status {
            Some(mut status) => {
                status.set_if_neq(snapshot);
            }
            None => {
                commands.entity(entity).insert(snapshot);
            }
        }

        // Sync Grounded/Airborne
        let grounded = controller.is_grounded();
        if grounded && !has_grounded {
            commands.entity(entity).insert(Grounded);
            commands.entity(entity).remove::<Airborne>();
        } else if !grounded && !has_airborne {
            commands.entity(entity).insert(Airborne);
            commands.entity(entity).remove::<Grounded>();
        }

        if snapshot.crouching && !has_crouched {
            commands.entity(entity).insert(Crouched);
        } else if !snapshot.crouching && has_crouched {
            commands.entity(entity).remove::<Crouched>();
        }

        if snapshot.sprinting && !has_sprinting {
            commands.entity(entity).insert(Sprinting);
        } else if !snapshot.sprinting && has_sprinting {
            commands.entity(entity).remove::<Sprinting>();
        }
    }
}

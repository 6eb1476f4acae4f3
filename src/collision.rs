//! Shape-cast requests and results exchanged with the physics backend.
//!
//! Each step the controller plans a set of [`ProbeRequest`]s in
//! [`SensorProbes`]. The backend answers them synchronously by filling
//! [`SensorReadings`] before the locomotion step runs.

use bevy::prelude::*;

use crate::config::SensorConfig;

/// Information about a single raycast/shapecast hit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CollisionData {
    /// Distance travelled by the cast before the hit.
    pub distance: f32,
    /// Surface normal at the hit point (world space, pointing away from the surface).
    pub normal: Vec3,
    /// World position of the hit point.
    pub point: Vec3,
    /// Entity that was hit (if any).
    pub entity: Option<Entity>,
    /// Whether the hit body is dynamic (can be pushed around by the simulation).
    pub dynamic: bool,
    /// Friction coefficient of the hit surface, when the backend knows it.
    pub friction: Option<f32>,
}

impl CollisionData {
    /// Create a collision result against a static body.
    pub fn new(distance: f32, normal: Vec3, point: Vec3, entity: Option<Entity>) -> Self {
        Self {
            distance,
            normal,
            point,
            entity,
            dynamic: false,
            friction: None,
        }
    }

    /// Builder: mark the hit body as dynamic.
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Builder: attach the surface friction.
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = Some(friction);
        self
    }
}

/// Which sensor a probe feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum ProbeKind {
    /// Near-zero offset below the capsule bottom.
    Ground,
    /// Larger offset below the capsule bottom.
    GroundClose,
    /// Grace-window probe, only planned when coyote time is configured.
    GroundCloseCoyote,
    /// Above the capsule top, for jump apogee capping.
    Head,
    /// Above the capsule top, covering the remaining stand-up travel.
    Stand,
}

/// Cast geometry.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub enum ProbeShape {
    Sphere { radius: f32 },
    Ray,
}

/// A single cast the backend must perform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeRequest {
    pub kind: ProbeKind,
    pub shape: ProbeShape,
    /// Cast origin (sphere center for sphere casts), world space.
    pub origin: Vec3,
    /// Normalized cast direction, world space.
    pub direction: Vec3,
    pub max_distance: f32,
}

impl ProbeRequest {
    /// Sphere cast request.
    pub fn sphere(
        kind: ProbeKind,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
    ) -> Self {
        Self {
            kind,
            shape: ProbeShape::Sphere { radius },
            origin,
            direction: direction.normalize_or_zero(),
            max_distance,
        }
    }

    /// Ray cast request.
    pub fn ray(kind: ProbeKind, origin: Vec3, direction: Vec3, max_distance: f32) -> Self {
        Self {
            kind,
            shape: ProbeShape::Ray,
            origin,
            direction: direction.normalize_or_zero(),
            max_distance,
        }
    }
}

/// Capsule collider dimensions, aligned with the character's up axis.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct CapsuleShape {
    pub radius: f32,
    /// Half the distance between the two cap centers.
    pub half_height: f32,
}

impl CapsuleShape {
    pub fn new(radius: f32, half_height: f32) -> Self {
        Self {
            radius,
            half_height,
        }
    }

    /// Distance from the center to either tip.
    pub fn half_extent(&self) -> f32 {
        self.half_height + self.radius
    }

    /// Full tip-to-tip height.
    pub fn height(&self) -> f32 {
        2.0 * self.half_extent()
    }

    /// This capsule with its height changed by `travel` (negative shrinks).
    pub fn resized(&self, travel: f32) -> Self {
        Self {
            radius: self.radius,
            half_height: (self.half_height + travel * 0.5).max(0.0),
        }
    }
}

/// Casts planned for the current step. Drained by the backend's sensor system.
#[derive(Component, Debug, Clone, Default)]
pub struct SensorProbes {
    pub requests: Vec<ProbeRequest>,
    /// The casting entity and its descendants, which backends should skip.
    pub exclude: Vec<Entity>,
}

impl SensorProbes {
    /// Plan this step's casts for a capsule centered at `position`.
    ///
    /// Ground probes start just above the capsule bottom and sweep along
    /// `-up`; head probes start just below the top and sweep along `up`. The
    /// stand probe is only planned while crouched (`crouch_depth > 0`) and
    /// covers the remaining stand-up travel.
    pub fn plan(
        position: Vec3,
        up: Vec3,
        capsule: CapsuleShape,
        crouch_depth: f32,
        config: &SensorConfig,
        coyote: bool,
    ) -> Vec<ProbeRequest> {
        let lift = config.cast_lift.max(0.0);
        let bottom = position - up * capsule.half_extent();
        let top = position + up * capsule.half_extent();
        let radius = |percent: f32| SensorConfig::probe_radius(capsule.radius, percent);

        let below = |kind: ProbeKind, percent: f32, offset: f32| {
            let r = radius(percent);
            ProbeRequest::sphere(kind, bottom + up * (r + lift), r, -up, lift + offset)
        };
        let above = |kind: ProbeKind, percent: f32, reach: f32| {
            let r = radius(percent);
            ProbeRequest::sphere(kind, top - up * (r + lift), r, up, lift + reach)
        };

        let mut requests = vec![
            below(ProbeKind::Ground, config.ground_radius_percent, config.ground_offset),
            below(
                ProbeKind::GroundClose,
                config.ground_close_radius_percent,
                config.ground_close_offset,
            ),
            above(ProbeKind::Head, config.head_radius_percent, config.head_offset),
        ];

        if coyote {
            requests.push(if config.coyote_radius_percent <= -100.0 {
                ProbeRequest::ray(
                    ProbeKind::GroundCloseCoyote,
                    bottom + up * lift,
                    -up,
                    lift + config.coyote_offset,
                )
            } else {
                below(
                    ProbeKind::GroundCloseCoyote,
                    config.coyote_radius_percent,
                    config.coyote_offset,
                )
            });
        }

        if crouch_depth > 0.0 {
            requests.push(above(
                ProbeKind::Stand,
                config.stand_radius_percent,
                crouch_depth + config.head_offset,
            ));
        }

        requests
    }
}

/// Everything the locomotion step reads from the outside world.
///
/// Hit lists are unfiltered: the ground sensor applies self/child exclusion and
/// slope filtering itself.
#[derive(Component, Debug, Clone, Default)]
pub struct SensorReadings {
    pub ground: Vec<CollisionData>,
    pub ground_close: Vec<CollisionData>,
    /// `None` when no coyote probe was planned.
    pub ground_close_coyote: Option<Vec<CollisionData>>,
    pub head: Vec<CollisionData>,
    pub stand: Vec<CollisionData>,
    /// Entities that never count as contacts (self and children).
    pub exclude: Vec<Entity>,
    /// Velocity the physics backend actually realized during the previous step.
    pub physics_velocity: Vec3,
    /// Character position, world space.
    pub position: Vec3,
}

impl SensorReadings {
    /// Store the hits of a probe under its kind.
    pub fn record(&mut self, kind: ProbeKind, hits: Vec<CollisionData>) {
        match kind {
            ProbeKind::Ground => self.ground = hits,
            ProbeKind::GroundClose => self.ground_close = hits,
            ProbeKind::GroundCloseCoyote => self.ground_close_coyote = Some(hits),
            ProbeKind::Head => self.head = hits,
            ProbeKind::Stand => self.stand = hits,
        }
    }

    /// Clear hit lists before a new round of probes.
    pub fn clear_hits(&mut self) {
        self.ground.clear();
        self.ground_close.clear();
        self.ground_close_coyote = None;
        self.head.clear();
        self.stand.clear();
    }

    /// Whether a hit refers to an excluded entity.
    pub fn is_excluded(&self, hit: &CollisionData) -> bool {
        hit.entity.is_some_and(|e| self.exclude.contains(&e))
    }
}

use avian3d::prelude::*;
use bevy::ecs::entity::EntityHashSet;
use bevy::prelude::*;

/// What gets swept through space by a cast
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub enum CastShape {
    /// An infinitely thin ray
    #[default]
    Ray,
    /// A sphere of `radius`
    Sphere {
        /// Sphere radius
        radius: f32,
    },
    /// A box with `half_extents`
    Cuboid {
        /// Half size along each axis
        half_extents: Vec3,
    },
    /// A capsule along local Y
    Capsule {
        /// Cap radius
        radius:      f32,
        /// Half the length of the cylindrical part
        half_height: f32,
    },
}

impl CastShape {
    /// The shape after passing through a portal that scales lengths by `factor`
    #[must_use]
    pub fn scaled(self, factor: f32) -> Self {
        match self {
            Self::Ray => Self::Ray,
            Self::Sphere { radius } => Self::Sphere {
                radius: radius * factor,
            },
            Self::Cuboid { half_extents } => Self::Cuboid {
                half_extents: half_extents * factor,
            },
            Self::Capsule {
                radius,
                half_height,
            } => Self::Capsule {
                radius:      radius * factor,
                half_height: half_height * factor,
            },
        }
    }

    /// Collider for shape casts; `None` for rays
    pub fn collider(&self) -> Option<Collider> {
        match *self {
            Self::Ray => None,
            Self::Sphere { radius } => Some(Collider::sphere(radius)),
            Self::Cuboid { half_extents } => {
                let size = half_extents * 2.0;
                Some(Collider::cuboid(size.x, size.y, size.z))
            },
            Self::Capsule {
                radius,
                half_height,
            } => Some(Collider::capsule(radius, half_height * 2.0)),
        }
    }

    /// Distance from the shape's center to its furthest point
    pub fn bounding_radius(&self) -> f32 {
        match *self {
            Self::Ray => 0.0,
            Self::Sphere { radius } => radius,
            Self::Cuboid { half_extents } => half_extents.length(),
            Self::Capsule {
                radius,
                half_height,
            } => radius + half_height,
        }
    }
}

/// Whether sensor colliders can be hit
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TriggerQuery {
    /// Sensors are passed through
    #[default]
    Ignore,
    /// Sensors are hit like solid colliders
    Collide,
}

/// Which colliders a query may report
#[derive(Debug, Clone, Default)]
pub struct CastFilter {
    /// Only colliders whose memberships intersect this mask
    pub mask:     LayerMask,
    /// Never reported
    pub excluded: EntityHashSet,
    /// Sensor handling
    pub triggers: TriggerQuery,
}

impl CastFilter {
    /// A filter over `mask` that ignores sensors
    pub fn from_mask(mask: impl Into<LayerMask>) -> Self {
        Self {
            mask: mask.into(),
            ..default()
        }
    }

    /// Adds entities that are never reported
    #[must_use]
    pub fn with_excluded(mut self, entities: impl IntoIterator<Item = Entity>) -> Self {
        self.excluded.extend(entities);
        self
    }

    /// Sets sensor handling
    #[must_use]
    pub const fn with_triggers(mut self, triggers: TriggerQuery) -> Self {
        self.triggers = triggers;
        self
    }
}

/// Closest contact found by a cast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastHit {
    /// Collider that was hit
    pub entity:   Entity,
    /// Contact point
    pub point:    Vec3,
    /// Surface normal at the contact
    pub normal:   Vec3,
    /// Distance travelled along the cast direction
    pub distance: f32,
}

/// The physics queries the portal algorithms need. Implemented for avian3d by
/// `AvianCaster`; tests use an in-memory scene.
pub trait PhysicsCaster {
    /// Sweeps `shape` from `origin` along `direction`, returning the nearest hit
    fn cast(
        &self,
        shape: &CastShape,
        origin: Vec3,
        rotation: Quat,
        direction: Dir3,
        max_distance: f32,
        filter: &CastFilter,
    ) -> Option<CastHit>;

    /// Every collider overlapping `shape` placed at `position`
    fn overlap(
        &self,
        shape: &CastShape,
        position: Vec3,
        rotation: Quat,
        filter: &CastFilter,
    ) -> Vec<Entity>;

    /// `true` when anything overlaps `shape` placed at `position`
    fn check(
        &self,
        shape: &CastShape,
        position: Vec3,
        rotation: Quat,
        filter: &CastFilter,
    ) -> bool {
        !self.overlap(shape, position, rotation, filter).is_empty()
    }
}

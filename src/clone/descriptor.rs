use avian3d::prelude::*;
use bevy::prelude::*;

use crate::portal::PortalTrace;
use crate::portal::PortalTransform;
use crate::portal::PortalWorld;

/// Component categories a clone can mirror
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyKind {
    /// `Transform`, through the portal for the root and local for parts
    Transform,
    /// Body type, velocities, mass and damping
    RigidBody,
    /// Collider shape and collision layers
    Collider,
    /// Mesh and material handles
    Renderer,
}

/// The copy table consulted when a clone is built and synchronised.
///
/// Registered once at startup; kinds that are not in the table are neither
/// spawned on clones nor synchronised.
#[derive(Resource, Reflect, Debug, Clone, PartialEq, Eq)]
#[reflect(Resource)]
pub struct CopyDescriptors {
    kinds: Vec<CopyKind>,
}

impl Default for CopyDescriptors {
    fn default() -> Self {
        Self {
            kinds: vec![
                CopyKind::Transform,
                CopyKind::RigidBody,
                CopyKind::Collider,
                CopyKind::Renderer,
            ],
        }
    }
}

impl CopyDescriptors {
    /// A table copying only `kinds`
    pub fn only(kinds: impl IntoIterator<Item = CopyKind>) -> Self {
        let mut descriptors = Self { kinds: Vec::new() };
        for kind in kinds {
            descriptors.register(kind);
        }
        descriptors
    }

    /// Adds `kind` to the table
    pub fn register(&mut self, kind: CopyKind) {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
        }
    }

    /// `true` when clones mirror `kind`
    pub fn copies(&self, kind: CopyKind) -> bool { self.kinds.contains(&kind) }

    /// `true` when clones carry physics
    pub fn copies_physics(&self) -> bool {
        self.copies(CopyKind::RigidBody) || self.copies(CopyKind::Collider)
    }
}

/// The physics side of one part of an object, read from the original and
/// written to the clone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartState {
    /// World transform for the root, local transform for descendants
    pub transform:        Transform,
    /// Body type
    pub body:             Option<RigidBody>,
    /// World linear velocity
    pub linear_velocity:  Vec3,
    /// World angular velocity
    pub angular_velocity: Vec3,
    /// Mass
    pub mass:             Option<f32>,
    /// Linear damping
    pub linear_damping:   Option<f32>,
    /// Angular damping
    pub angular_damping:  Option<f32>,
    /// Collision layers
    pub collision_layers: Option<CollisionLayers>,
}

impl PartState {
    /// A part with nothing but a transform
    pub fn at(transform: Transform) -> Self {
        Self {
            transform,
            body: None,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            mass: None,
            linear_damping: None,
            angular_damping: None,
            collision_layers: None,
        }
    }

    /// The state seen on the far side of `path`.
    ///
    /// Only the root moves through the portal, descendants keep their local
    /// transform. Velocities are carried through for dynamic bodies only;
    /// kinematic and static bodies keep theirs as they are.
    pub fn through(&self, path: &PortalTrace, world: &PortalWorld, is_root: bool) -> Self {
        let teleport = path.transform(world);
        let mut state = *self;
        if is_root {
            state.transform = teleport.modify_transform(&self.transform);
        }
        if self.body == Some(RigidBody::Dynamic) {
            state.linear_velocity = teleport.modify_vector(self.linear_velocity);
            state.angular_velocity = spin_through(&teleport, self.angular_velocity);
        }
        state.collision_layers = self.collision_layers.map(|layers| {
            path.as_slice()
                .iter()
                .filter_map(|portal| world.get(*portal))
                .fold(layers, |layers, record| record.layers.modify_collision_layers(layers))
        });
        state
    }
}

fn spin_through(teleport: &PortalTransform, angular_velocity: Vec3) -> Vec3 {
    teleport.modify_direction(angular_velocity) * angular_velocity.length()
}

//! Portalspace - linked portals for Bevy
//!
//! - Portal transform algebra and crossing traces
//! - Casts that continue through portals
//! - Recursive portal render trees with culling windows
//! - Trigger tracking, collision layer handoff and teleports on the fixed tick
//! - Physics and render clones of objects near a portal
//!
//! Add [`PortalSpacePlugin`] next to avian's `PhysicsPlugins`.

mod aabb;
mod caster;
mod clone;
mod constants;
mod physics;
mod portal;
mod render;
mod schedule;
mod traits;

use bevy::prelude::*;

pub use crate::aabb::Aabb;
pub use crate::caster::AvianCaster;
pub use crate::caster::CastFilter;
pub use crate::caster::CastHit;
pub use crate::caster::CastShape;
pub use crate::caster::CasterPlugin;
pub use crate::caster::PhysicsCaster;
pub use crate::caster::PortalPointer;
pub use crate::caster::PortalRay;
pub use crate::caster::RayLimits;
pub use crate::caster::TriggerQuery;
pub use crate::caster::cast;
pub use crate::caster::get_rays;
pub use crate::clone::CloneCandidate;
pub use crate::clone::CloneChanges;
pub use crate::clone::CloneCollision;
pub use crate::clone::CloneHandle;
pub use crate::clone::CloneHandler;
pub use crate::clone::ClonePart;
pub use crate::clone::ClonePlugin;
pub use crate::clone::ClonePool;
pub use crate::clone::CloneSet;
pub use crate::clone::CloneSettings;
pub use crate::clone::CopyDescriptors;
pub use crate::clone::CopyKind;
pub use crate::clone::PartState;
pub use crate::clone::PortalClone;
pub use crate::clone::PortalClones;
pub use crate::physics::LayerMode;
pub use crate::physics::LayerState;
pub use crate::physics::LayerTransition;
pub use crate::physics::Portable;
pub use crate::physics::PortableBody;
pub use crate::physics::PortableOrigin;
pub use crate::physics::PortableTag;
pub use crate::physics::PortalLayer;
pub use crate::physics::PortalLayerVolume;
pub use crate::physics::PortalPhysicsConfig;
pub use crate::physics::PortalPhysicsPlugin;
pub use crate::physics::PortalPreTeleport;
pub use crate::physics::PortalTeleported;
pub use crate::physics::PortalTracker;
pub use crate::physics::PortalTransitionVolume;
pub use crate::physics::TeleportOutcome;
pub use crate::physics::TriggerEvent;
pub use crate::physics::TriggerHandler;
pub use crate::physics::pending_teleport;
pub use crate::physics::teleport_tag;
pub use crate::physics::teleport_tracked;
pub use crate::physics::try_teleport_portable;
pub use crate::portal::LayerTable;
pub use crate::portal::Portal;
pub use crate::portal::PortalPlugin;
pub use crate::portal::PortalRecord;
pub use crate::portal::PortalSurface;
pub use crate::portal::PortalSurfaceCollider;
pub use crate::portal::PortalTarget;
pub use crate::portal::PortalTrace;
pub use crate::portal::PortalTransform;
pub use crate::portal::PortalWorld;
pub use crate::portal::TagTable;
pub use crate::portal::look_rotation;
pub use crate::render::CullingWindow;
pub use crate::render::EyeView;
pub use crate::render::Eyes;
pub use crate::render::NodeId;
pub use crate::render::PortalCamera;
pub use crate::render::PortalRenderConfig;
pub use crate::render::PortalRenderTree;
pub use crate::render::PortalRenderer;
pub use crate::render::RenderAlgorithm;
pub use crate::render::RenderBudget;
pub use crate::render::RenderNode;
pub use crate::render::RenderPlugin;
pub use crate::render::RenderTree;
pub use crate::render::build_render_tree;
pub use crate::render::walk_render_tree;
pub use crate::schedule::PortalSet;
pub use crate::schedule::SchedulePlugin;
pub use crate::traits::AffineExt;
pub use crate::traits::UsizeExt;

/// Every portal plugin, ordered by `PortalSet`
pub struct PortalSpacePlugin;

impl Plugin for PortalSpacePlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            SchedulePlugin,
            PortalPlugin,
            CasterPlugin,
            RenderPlugin,
            PortalPhysicsPlugin,
            ClonePlugin,
        ));
    }
}

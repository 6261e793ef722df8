mod avian;
mod rays;
mod shape;

use avian3d::prelude::LayerMask;
use bevy::prelude::*;

pub use avian::AvianCaster;
pub use rays::PortalRay;
pub use rays::RayLimits;
pub use rays::cast;
pub use rays::get_rays;
pub use shape::CastFilter;
pub use shape::CastHit;
pub use shape::CastShape;
pub use shape::PhysicsCaster;
pub use shape::TriggerQuery;

use crate::constants::CASTER_MAX_DISTANCE;
use crate::constants::CASTER_MAX_RECURSIONS;
use crate::physics::PortalPhysicsConfig;
use crate::portal::PortalWorld;
use crate::schedule::PortalSet;

/// Keeps every `PortalPointer` up to date and draws it
pub struct CasterPlugin;

impl Plugin for CasterPlugin {
    fn build(&self, app: &mut App) {
        app.init_gizmo_group::<PointerGizmo>()
            .register_type::<PortalPointer>()
            .add_systems(
                PostUpdate,
                (update_portal_pointers, draw_portal_pointers)
                    .chain()
                    .after(PortalSet::SyncPortals)
                    .before(PortalSet::RenderTree),
            );
    }
}

#[derive(Debug, Default, Reflect, GizmoConfigGroup)]
struct PointerGizmo {}

/// Casts forward from the entity every frame, following portals
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct PortalPointer {
    /// Swept shape
    pub shape:          CastShape,
    /// Total reach in the pointer's own space
    pub max_distance:   f32,
    /// Portal crossings followed
    pub max_recursions: usize,
    /// Collision layer bits that block the pointer
    pub layer_mask:     u32,
    /// Whether sensors stop the pointer
    pub triggers:       TriggerQuery,
    /// Line color
    pub color:          Color,
    /// Segments from the last update
    #[reflect(ignore)]
    pub rays:           Vec<PortalRay>,
    /// Hit from the last update and the segment it happened on
    #[reflect(ignore)]
    pub hit:            Option<(CastHit, usize)>,
}

impl Default for PortalPointer {
    fn default() -> Self {
        Self {
            shape:          CastShape::Ray,
            max_distance:   CASTER_MAX_DISTANCE,
            max_recursions: CASTER_MAX_RECURSIONS,
            layer_mask:     LayerMask::ALL.0,
            triggers:       TriggerQuery::Ignore,
            color:          Color::WHITE,
            rays:           Vec::new(),
            hit:            None,
        }
    }
}

fn update_portal_pointers(
    caster: AvianCaster,
    world: Res<PortalWorld>,
    config: Res<PortalPhysicsConfig>,
    mut q_pointers: Query<(&GlobalTransform, &mut PortalPointer)>,
) {
    for (global_transform, mut pointer) in &mut q_pointers {
        let limits = RayLimits {
            max_distance:   pointer.max_distance.min(config.caster_max_distance),
            max_recursions: pointer.max_recursions.min(config.caster_max_recursions),
            layer_mask:     LayerMask(pointer.layer_mask),
        };
        let mut rays = std::mem::take(&mut pointer.rays);
        get_rays(
            &caster,
            &world,
            pointer.shape,
            &global_transform.affine(),
            &limits,
            &mut rays,
        );
        pointer.hit = cast(&caster, &world, &rays, limits.layer_mask, pointer.triggers);
        pointer.rays = rays;
    }
}

fn draw_portal_pointers(mut gizmos: Gizmos<PointerGizmo>, q_pointers: Query<&PortalPointer>) {
    for pointer in &q_pointers {
        let last = pointer.hit.map_or(pointer.rays.len(), |(_, segment)| segment + 1);
        for (index, ray) in pointer.rays.iter().take(last).enumerate() {
            let end = match pointer.hit {
                Some((hit, segment)) if segment == index => hit.point,
                _ => ray.end(),
            };
            gizmos.line(ray.start(), end, pointer.color);
        }
        if let Some((hit, _)) = pointer.hit {
            gizmos.sphere(
                Isometry3d::from_translation(hit.point),
                0.1,
                pointer.color,
            );
        }
    }
}

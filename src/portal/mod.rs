mod component;
mod trace;
mod transform;
mod world;

use bevy::prelude::*;

pub use component::LayerTable;
pub use component::Portal;
pub use component::PortalSurface;
pub use component::PortalSurfaceCollider;
pub use component::TagTable;
pub use trace::PortalTarget;
pub use trace::PortalTrace;
pub use transform::PortalTransform;
pub use transform::look_rotation;
pub use world::PortalRecord;
pub use world::PortalWorld;

use crate::schedule::PortalSet;

#[cfg(test)]
pub(crate) mod test_support {
    pub(crate) use super::transform::tests::approx_eq;
    pub(crate) use super::transform::tests::yaw_portal;
    pub(crate) use super::world::tests::linked_pair;
}

/// Keeps the `PortalWorld` in step with `Portal` entities
pub struct PortalPlugin;

impl Plugin for PortalPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PortalWorld>()
            .register_type::<Portal>()
            .register_type::<PortalSurface>()
            .register_type::<PortalSurfaceCollider>()
            .add_observer(on_portal_removed)
            .add_observer(on_surface_collider_removed)
            .add_systems(FixedUpdate, sync_portal_world.in_set(PortalSet::SyncPortals))
            .add_systems(PostUpdate, sync_portal_world.in_set(PortalSet::SyncPortals));
    }
}

/// Mirrors every `Portal` into the `PortalWorld` so the portal algorithms
/// never touch the ECS directly
fn sync_portal_world(
    mut world: ResMut<PortalWorld>,
    q_portals: Query<(Entity, &Portal, &GlobalTransform, &PortalSurface)>,
    q_colliders: Query<(Entity, &PortalSurfaceCollider), Added<PortalSurfaceCollider>>,
) {
    for (entity, portal, global_transform, surface) in &q_portals {
        let previous = world.get(entity).map(|record| record.connected);

        let mut record = PortalRecord::new(entity, global_transform.affine());
        record.connected = portal.connected;
        record.uses_teleport = portal.uses_teleport;
        record.uses_layers = portal.uses_layers;
        record.layers = portal.layers.clone();
        record.tags = portal.tags.clone();
        record.surface = surface.bounds;
        world.insert(record);

        if previous != Some(portal.connected) && let Some(connected) = portal.connected {
            if world.teleport(entity).is_some_and(|teleport| teleport.is_degenerate()) {
                warn!("portal {entity} linked to {connected} through a degenerate teleport matrix");
            } else if world.is_linked(entity) {
                info!("portal {entity} linked to {connected}");
            } else {
                debug!("portal {entity} waiting for {connected} to link back");
            }
        }
    }

    for (collider, surface_collider) in &q_colliders {
        world.register_collider(collider, surface_collider.portal);
    }
}

fn on_portal_removed(remove: On<Remove, Portal>, mut world: ResMut<PortalWorld>) {
    if world.remove(remove.entity).is_some() {
        debug!("portal {} removed", remove.entity);
    }
}

fn on_surface_collider_removed(
    remove: On<Remove, PortalSurfaceCollider>,
    mut world: ResMut<PortalWorld>,
) {
    world.unregister_collider(remove.entity);
}

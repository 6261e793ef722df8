use bevy::ecs::entity::EntityHashMap;
use bevy::math::Affine3A;
use bevy::prelude::*;

use super::component::LayerTable;
use super::component::TagTable;
use super::transform::PortalTransform;
use crate::aabb::Aabb;
use crate::constants::TRANSITION_PLANE_OFFSET;

/// Everything the portal algorithms need to know about one portal, captured
/// from the ECS once per tick
#[derive(Debug, Clone)]
pub struct PortalRecord {
    /// The portal entity
    pub entity:         Entity,
    /// Portal frame
    pub local_to_world: Affine3A,
    /// Inverse of `local_to_world`
    pub world_to_local: Affine3A,
    /// The other half of the pair, as configured
    pub connected:      Option<Entity>,
    /// Teleport matrix into `connected`; identity while unlinked
    pub teleport:       PortalTransform,
    /// Whether crossing teleports portables
    pub uses_teleport:  bool,
    /// Whether collision layers are remapped around this portal
    pub uses_layers:    bool,
    /// Layer remapping
    pub layers:         LayerTable,
    /// Tag remapping
    pub tags:           TagTable,
    /// Visible surface bounds in portal space
    pub surface:        Aabb,
}

impl PortalRecord {
    /// An unlinked portal placed at `local_to_world`
    pub fn new(entity: Entity, local_to_world: Affine3A) -> Self {
        Self {
            entity,
            local_to_world,
            world_to_local: PortalTransform::new(local_to_world).inverse().matrix(),
            connected: None,
            teleport: PortalTransform::IDENTITY,
            uses_teleport: true,
            uses_layers: true,
            layers: LayerTable::default(),
            tags: TagTable::default(),
            surface: Aabb::default(),
        }
    }

    /// `point` expressed in the portal's local space
    pub fn local_point(&self, point: Vec3) -> Vec3 { self.world_to_local.transform_point3(point) }

    /// `true` once `point` is on the far side of the transition plane
    pub fn has_crossed(&self, point: Vec3) -> bool {
        self.local_point(point).z < TRANSITION_PLANE_OFFSET
    }

    /// Outward facing normal of the portal plane
    pub fn normal(&self) -> Vec3 {
        self.local_to_world
            .transform_vector3(Vec3::Z)
            .normalize_or_zero()
    }

    /// World position of the portal plane's origin
    pub fn origin(&self) -> Vec3 { self.local_to_world.translation.into() }

    /// Signed distance of `point` in front of the portal plane
    pub fn signed_distance(&self, point: Vec3) -> f32 { (point - self.origin()).dot(self.normal()) }
}

/// The explicit context owning every portal for the session. Systems read
/// portal data from here instead of chasing component references, so a
/// despawned portal simply stops being found.
#[derive(Resource, Debug, Default)]
pub struct PortalWorld {
    portals:   EntityHashMap<PortalRecord>,
    colliders: EntityHashMap<Entity>,
}

impl PortalWorld {
    /// Adds or replaces a portal and refreshes the teleport matrices of its pair
    pub fn insert(&mut self, record: PortalRecord) {
        let entity = record.entity;
        self.portals.insert(entity, record);
        self.refresh_pair(entity);
    }

    /// Forgets a portal; its partner becomes unlinked but keeps its configured link
    pub fn remove(&mut self, portal: Entity) -> Option<PortalRecord> {
        self.colliders.retain(|_, owner| *owner != portal);
        let removed = self.portals.remove(&portal)?;
        if let Some(connected) = removed.connected {
            self.refresh_pair(connected);
        }
        Some(removed)
    }

    /// Looks up a portal that still exists
    pub fn get(&self, portal: Entity) -> Option<&PortalRecord> { self.portals.get(&portal) }

    /// The partner of `portal`, only when both exist and point at each other
    pub fn connected(&self, portal: Entity) -> Option<&PortalRecord> {
        let record = self.portals.get(&portal)?;
        let connected = self.portals.get(&record.connected?)?;
        (connected.connected == Some(portal)).then_some(connected)
    }

    /// `true` when `portal` has a live symmetric partner
    pub fn is_linked(&self, portal: Entity) -> bool { self.connected(portal).is_some() }

    /// Teleport transform of a linked portal
    pub fn teleport(&self, portal: Entity) -> Option<PortalTransform> {
        self.connected(portal)?;
        self.get(portal).map(|record| record.teleport)
    }

    /// Links two portals symmetrically, dropping any previous partners' links
    pub fn link(&mut self, a: Entity, b: Entity) {
        for (portal, partner) in [(a, b), (b, a)] {
            let previous = self
                .portals
                .get(&portal)
                .and_then(|record| record.connected)
                .filter(|previous| *previous != partner);
            if let Some(previous) = previous
                && let Some(record) = self.portals.get_mut(&previous)
                && record.connected == Some(portal)
            {
                record.connected = None;
                record.teleport = PortalTransform::IDENTITY;
            }
            if let Some(record) = self.portals.get_mut(&portal) {
                record.connected = Some(partner);
            }
        }
        self.refresh_pair(a);
        info!("portals {a} and {b} linked");
    }

    /// Breaks the link on both sides
    pub fn unlink(&mut self, portal: Entity) {
        let Some(connected) = self.portals.get(&portal).and_then(|record| record.connected) else {
            return;
        };
        for entity in [portal, connected] {
            if let Some(record) = self.portals.get_mut(&entity) {
                record.connected = None;
                record.teleport = PortalTransform::IDENTITY;
            }
        }
        info!("portals {portal} and {connected} unlinked");
    }

    /// Moves a portal, keeping both teleport matrices of the pair in step
    pub fn set_local_to_world(&mut self, portal: Entity, local_to_world: Affine3A) {
        let Some(record) = self.portals.get_mut(&portal) else {
            return;
        };
        record.local_to_world = local_to_world;
        record.world_to_local = PortalTransform::new(local_to_world).inverse().matrix();
        self.refresh_pair(portal);
    }

    /// Declares `collider` to be part of `portal`'s surface
    pub fn register_collider(&mut self, collider: Entity, portal: Entity) {
        self.colliders.insert(collider, portal);
    }

    /// Forgets a surface collider
    pub fn unregister_collider(&mut self, collider: Entity) { self.colliders.remove(&collider); }

    /// Surface colliders of one portal, including the portal entity itself
    pub fn colliders_of(&self, portal: Entity) -> impl Iterator<Item = Entity> + '_ {
        self.colliders
            .iter()
            .filter(move |(_, owner)| **owner == portal)
            .map(|(collider, _)| *collider)
            .chain(std::iter::once(portal))
    }

    /// The portal owning a surface collider
    pub fn portal_for_collider(&self, collider: Entity) -> Option<Entity> {
        self.colliders
            .get(&collider)
            .copied()
            .or_else(|| self.portals.contains_key(&collider).then_some(collider))
            .filter(|portal| self.portals.contains_key(portal))
    }

    /// Every surface collider, for excluding portals from object casts
    pub fn surface_colliders(&self) -> impl Iterator<Item = Entity> + '_ {
        self.colliders
            .keys()
            .copied()
            .chain(self.portals.keys().copied())
    }

    /// Every live portal
    pub fn iter(&self) -> impl Iterator<Item = &PortalRecord> { self.portals.values() }

    /// Number of live portals
    pub fn len(&self) -> usize { self.portals.len() }

    /// `true` when no portal is registered
    pub fn is_empty(&self) -> bool { self.portals.is_empty() }

    fn refresh_pair(&mut self, portal: Entity) {
        let linked = self.connected(portal).map(|connected| connected.entity);
        let Some(connected) = linked else {
            if let Some(record) = self.portals.get_mut(&portal) {
                record.teleport = PortalTransform::IDENTITY;
            }
            return;
        };

        let (Some(a), Some(b)) = (self.portals.get(&portal), self.portals.get(&connected)) else {
            return;
        };
        let forward = PortalTransform::between(&a.local_to_world, &b.local_to_world);
        let backward = PortalTransform::between(&b.local_to_world, &a.local_to_world);

        if let Some(record) = self.portals.get_mut(&portal) {
            record.teleport = forward;
        }
        if let Some(record) = self.portals.get_mut(&connected) {
            record.teleport = backward;
        }
    }

    /// Overrides the teleport matrix of a linked pair directly. The partner gets the inverse.
    pub fn set_teleport(&mut self, portal: Entity, teleport: PortalTransform) {
        let Some(connected) = self.connected(portal).map(|connected| connected.entity) else {
            return;
        };
        if let Some(record) = self.portals.get_mut(&portal) {
            record.teleport = teleport;
        }
        if let Some(record) = self.portals.get_mut(&connected) {
            record.teleport = teleport.inverse();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::portal::transform::tests::approx_eq;

    /// A world with portal `a` at the origin and `b` at +10 X, linked
    pub(crate) fn linked_pair() -> (World, PortalWorld, Entity, Entity) {
        let mut ecs = World::new();
        let a = ecs.spawn_empty().id();
        let b = ecs.spawn_empty().id();

        let mut world = PortalWorld::default();
        world.insert(PortalRecord::new(a, Affine3A::IDENTITY));
        world.insert(PortalRecord::new(
            b,
            Affine3A::from_translation(Vec3::new(10.0, 0.0, 0.0)),
        ));
        world.link(a, b);
        (ecs, world, a, b)
    }

    #[test]
    fn test_link_is_symmetric() {
        let (_ecs, world, a, b) = linked_pair();

        assert_eq!(world.connected(a).map(|p| p.entity), Some(b));
        assert_eq!(world.connected(b).map(|p| p.entity), Some(a));
    }

    #[test]
    fn test_pair_matrices_are_inverse() {
        let (_ecs, world, a, b) = linked_pair();
        let there = world.teleport(a).unwrap();
        let back = world.teleport(b).unwrap();
        let point = Vec3::new(0.3, 1.0, -0.2);

        assert!(approx_eq(there.modify_point(point), Vec3::new(9.7, 1.0, 0.2)));
        assert!(approx_eq(back.modify_point(there.modify_point(point)), point));
    }

    #[test]
    fn test_removed_partner_unlinks() {
        let (_ecs, mut world, a, b) = linked_pair();

        world.remove(b);

        assert!(world.connected(a).is_none());
        assert!(world.teleport(a).is_none());
        assert_eq!(world.get(a).map(|p| p.teleport), Some(PortalTransform::IDENTITY));
    }

    #[test]
    fn test_relinking_drops_old_partner() {
        let (mut ecs, mut world, a, b) = linked_pair();
        let c = ecs.spawn_empty().id();
        world.insert(PortalRecord::new(c, Affine3A::IDENTITY));

        world.link(a, c);

        assert!(world.connected(b).is_none());
        assert_eq!(world.connected(c).map(|p| p.entity), Some(a));
    }

    #[test]
    fn test_crossing_is_local_negative_z() {
        let (_ecs, world, a, _b) = linked_pair();
        let portal = world.get(a).unwrap();

        assert!(!portal.has_crossed(Vec3::new(0.0, 0.0, 0.5)));
        assert!(portal.has_crossed(Vec3::new(0.0, 0.0, -0.01)));
    }

    #[test]
    fn test_collider_lookup() {
        let (mut ecs, mut world, a, _b) = linked_pair();
        let collider = ecs.spawn_empty().id();
        world.register_collider(collider, a);

        assert_eq!(world.portal_for_collider(collider), Some(a));
        assert_eq!(world.portal_for_collider(a), Some(a));

        world.remove(a);
        assert_eq!(world.portal_for_collider(collider), None);
    }
}

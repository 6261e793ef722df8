use bevy::math::Affine3A;
use bevy::prelude::*;

use super::transform::PortalTransform;
use super::world::PortalRecord;
use super::world::PortalWorld;

/// Anything that can be carried through a portal by a `PortalTrace`
pub trait PortalTarget {
    /// Applies `portal`'s teleport to `self`
    fn teleport(&mut self, portal: &PortalRecord);
}

impl PortalTarget for Transform {
    fn teleport(&mut self, portal: &PortalRecord) {
        *self = portal.teleport.modify_transform(self);
    }
}

impl PortalTarget for Affine3A {
    fn teleport(&mut self, portal: &PortalRecord) { *self = portal.teleport.modify_matrix(self); }
}

/// Ordered portals crossed on the way from one space to another.
///
/// Crossing back through the partner of the last (or first) portal cancels
/// that entry instead of growing the trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortalTrace {
    portals: Vec<Entity>,
}

impl PortalTrace {
    /// A trace over `portals`, taken as-is
    pub fn from_portals(portals: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            portals: portals.into_iter().collect(),
        }
    }

    /// Portals in crossing order
    pub fn as_slice(&self) -> &[Entity] { &self.portals }

    /// Number of crossings
    pub fn len(&self) -> usize { self.portals.len() }

    /// `true` when start and end are the same space
    pub fn is_empty(&self) -> bool { self.portals.is_empty() }

    /// First crossing
    pub fn first(&self) -> Option<Entity> { self.portals.first().copied() }

    /// Last crossing
    pub fn last(&self) -> Option<Entity> { self.portals.last().copied() }

    /// Forgets every crossing without teleporting anything
    pub fn clear(&mut self) { self.portals.clear(); }

    /// Records a crossing at the end of the trace
    pub fn add_end_teleport(&mut self, portal: Entity, world: &PortalWorld) {
        let connected = world.get(portal).and_then(|record| record.connected);
        if connected.is_some() && self.portals.last().copied() == connected {
            self.portals.pop();
        } else {
            self.portals.push(portal);
        }
    }

    /// Records a crossing at the start of the trace
    pub fn add_start_teleport(&mut self, portal: Entity, world: &PortalWorld) {
        let connected = world.get(portal).and_then(|record| record.connected);
        if connected.is_some() && self.portals.first().copied() == connected {
            self.portals.remove(0);
        } else {
            self.portals.insert(0, portal);
        }
    }

    /// Moves `target` from where this trace leaves it to where `new_path` would.
    ///
    /// The shared prefix is left alone, the rest of the old trace is undone in
    /// reverse through each partner and the rest of `new_path` is applied going
    /// forward. The new path is followed only up to its first missing or
    /// unlinked portal, so the trace always stays a prefix of `new_path` and a
    /// repeated call changes nothing.
    pub fn teleport_difference(
        &mut self,
        target: &mut impl PortalTarget,
        new_path: &[Entity],
        world: &PortalWorld,
    ) {
        let common = self
            .portals
            .iter()
            .zip(new_path)
            .take_while(|(old, new)| old == new)
            .count();

        self.undo_from(common, target, world);

        for &portal in &new_path[common..] {
            let Some(record) = world.get(portal).filter(|_| world.is_linked(portal)) else {
                warn!("path stops at missing or unlinked portal {portal}");
                break;
            };
            target.teleport(record);
            self.portals.push(portal);
        }
    }

    /// Undoes every crossing on `target` and empties the trace
    pub fn undo(&mut self, target: &mut impl PortalTarget, world: &PortalWorld) {
        self.undo_from(0, target, world);
    }

    fn undo_from(&mut self, start: usize, target: &mut impl PortalTarget, world: &PortalWorld) {
        for &portal in self.portals[start..].iter().rev() {
            match world.connected(portal) {
                Some(back) => target.teleport(back),
                None => warn!("cannot undo teleport through missing or unlinked portal {portal}"),
            }
        }
        self.portals.truncate(start);
    }

    /// The single transform equivalent to crossing every portal in order.
    /// Missing or unlinked portals contribute nothing.
    pub fn transform(&self, world: &PortalWorld) -> PortalTransform {
        self.portals
            .iter()
            .filter_map(|portal| world.teleport(*portal))
            .fold(PortalTransform::IDENTITY, |total, next| next.after(&total))
    }

    /// The trace walked backwards through each partner
    pub fn reversed(&self, world: &PortalWorld) -> Self {
        Self {
            portals: self
                .portals
                .iter()
                .rev()
                .filter_map(|portal| world.connected(*portal).map(|back| back.entity))
                .collect(),
        }
    }

    /// Carries a point from the start space to the end space
    pub fn modify_point(&self, point: Vec3, world: &PortalWorld) -> Vec3 {
        self.transform(world).modify_point(point)
    }

    /// Carries a vector from the start space to the end space
    pub fn modify_vector(&self, vector: Vec3, world: &PortalWorld) -> Vec3 {
        self.transform(world).modify_vector(vector)
    }

    /// Carries a direction from the start space to the end space
    pub fn modify_direction(&self, direction: Vec3, world: &PortalWorld) -> Vec3 {
        self.transform(world).modify_direction(direction)
    }

    /// Carries a rotation from the start space to the end space
    pub fn modify_rotation(&self, rotation: Quat, world: &PortalWorld) -> Quat {
        self.portals
            .iter()
            .filter_map(|portal| world.teleport(*portal))
            .fold(rotation, |rotation, portal| portal.modify_rotation(rotation))
    }

    /// Carries a frame from the start space to the end space
    pub fn modify_matrix(&self, local_to_world: &Affine3A, world: &PortalWorld) -> Affine3A {
        self.transform(world).modify_matrix(local_to_world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::transform::tests::approx_eq;
    use crate::portal::world::tests::linked_pair;

    fn second_pair(ecs: &mut World, world: &mut PortalWorld) -> (Entity, Entity) {
        let c = ecs.spawn_empty().id();
        let d = ecs.spawn_empty().id();
        world.insert(PortalRecord::new(
            c,
            Affine3A::from_translation(Vec3::new(0.0, 20.0, 0.0)),
        ));
        world.insert(PortalRecord::new(
            d,
            Affine3A::from_rotation_translation(
                Quat::from_rotation_y(1.0),
                Vec3::new(0.0, -20.0, 5.0),
            ),
        ));
        world.link(c, d);
        (c, d)
    }

    #[test]
    fn test_crossing_back_cancels() {
        let (mut ecs, world, a, b) = linked_pair();
        let mut trace = PortalTrace::from_portals([ecs.spawn_empty().id()]);
        let before = trace.clone();

        trace.add_end_teleport(a, &world);
        trace.add_end_teleport(b, &world);

        assert_eq!(trace, before);
    }

    #[test]
    fn test_prepend_cancels() {
        let (_ecs, world, a, b) = linked_pair();
        let mut trace = PortalTrace::default();

        trace.add_start_teleport(a, &world);
        assert_eq!(trace.as_slice(), &[a]);
        trace.add_start_teleport(b, &world);
        assert!(trace.is_empty());
    }

    #[test]
    fn test_same_portal_twice_grows() {
        let (_ecs, world, a, _b) = linked_pair();
        let mut trace = PortalTrace::default();

        trace.add_end_teleport(a, &world);
        trace.add_end_teleport(a, &world);

        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn test_teleport_difference_applies_new_suffix() {
        let (mut ecs, mut world, a, _b) = linked_pair();
        let (c, _d) = second_pair(&mut ecs, &mut world);
        let start = Transform::from_translation(Vec3::new(1.0, 2.0, 3.0));

        let mut target = start;
        let mut trace = PortalTrace::default();
        trace.teleport_difference(&mut target, &[a, c], &world);

        let expected = PortalTrace::from_portals([a, c]).transform(&world).modify_transform(&start);
        assert_eq!(trace.as_slice(), &[a, c]);
        assert!(approx_eq(target.translation, expected.translation));
    }

    #[test]
    fn test_teleport_difference_is_idempotent() {
        let (mut ecs, mut world, a, _b) = linked_pair();
        let (c, _d) = second_pair(&mut ecs, &mut world);

        let mut target = Transform::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let mut trace = PortalTrace::default();
        trace.teleport_difference(&mut target, &[a, c], &world);
        let after_first = target;

        trace.teleport_difference(&mut target, &[a, c], &world);

        assert_eq!(target, after_first);
        assert_eq!(trace.as_slice(), &[a, c]);
    }

    #[test]
    fn test_teleport_difference_backtracks_mismatch() {
        let (mut ecs, mut world, a, _b) = linked_pair();
        let (c, d) = second_pair(&mut ecs, &mut world);
        let start = Transform::from_translation(Vec3::new(1.0, 2.0, 3.0));

        let mut target = start;
        let mut trace = PortalTrace::default();
        trace.teleport_difference(&mut target, &[a, c], &world);
        trace.teleport_difference(&mut target, &[a, d], &world);

        let expected = PortalTrace::from_portals([a, d]).transform(&world).modify_transform(&start);
        assert_eq!(trace.as_slice(), &[a, d]);
        assert!(approx_eq(target.translation, expected.translation));

        trace.undo(&mut target, &world);
        assert!(trace.is_empty());
        assert!(approx_eq(target.translation, start.translation));
    }

    #[test]
    fn test_destroyed_portal_is_dropped() {
        let (mut ecs, mut world, a, _b) = linked_pair();
        let (c, _d) = second_pair(&mut ecs, &mut world);

        let mut target = Transform::default();
        let mut trace = PortalTrace::default();
        trace.teleport_difference(&mut target, &[a, c], &world);
        world.remove(c);

        let before = target;
        trace.teleport_difference(&mut target, &[a], &world);

        // nothing to undo through a destroyed portal
        assert_eq!(trace.as_slice(), &[a]);
        assert_eq!(target, before);
    }

    #[test]
    fn test_path_stops_at_destroyed_portal() {
        let (mut ecs, mut world, a, _b) = linked_pair();
        let (c, _d) = second_pair(&mut ecs, &mut world);
        world.remove(c);
        let start = Transform::from_translation(Vec3::new(1.0, 2.0, 3.0));

        let mut target = start;
        let mut trace = PortalTrace::default();
        trace.teleport_difference(&mut target, &[a, c, a], &world);
        let after_first = target;

        let expected = PortalTrace::from_portals([a]).transform(&world).modify_transform(&start);
        assert_eq!(trace.as_slice(), &[a]);
        assert!(approx_eq(target.translation, expected.translation));

        trace.teleport_difference(&mut target, &[a, c, a], &world);
        assert_eq!(trace.as_slice(), &[a]);
        assert_eq!(target, after_first);
    }

    #[test]
    fn test_reversed_trace_undoes_transform() {
        let (mut ecs, mut world, a, _b) = linked_pair();
        let (c, _d) = second_pair(&mut ecs, &mut world);
        let trace = PortalTrace::from_portals([a, c]);
        let point = Vec3::new(-3.0, 0.5, 2.0);

        let there = trace.modify_point(point, &world);
        let back = trace.reversed(&world).modify_point(there, &world);

        assert!(approx_eq(back, point));
    }
}

use bevy::prelude::*;

use super::layer::PortalTracker;
use crate::portal::PortalRecord;
use crate::portal::PortalTarget;
use crate::portal::PortalWorld;

/// Something that teleports when its origin crosses a portal's transition plane
pub trait Portable: PortalTarget {
    /// The tracked point tested against the transition plane
    fn origin(&self) -> Vec3;
}

/// Offset of the point tested against transition planes, in the entity's
/// local space. Without it the entity's translation is used.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct PortableOrigin(pub Vec3);

/// Gameplay tag of a portable, remapped through the tag tables of every
/// portal it crosses
#[derive(Component, Reflect, Debug, Clone, Default, PartialEq, Eq)]
#[reflect(Component)]
pub struct PortableTag(pub String);

/// Everything that moves with a rigid body through a portal, teleported in
/// one step so position and velocity never disagree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortableBody {
    /// World transform
    pub transform:        Transform,
    /// World linear velocity
    pub linear_velocity:  Vec3,
    /// World angular velocity
    pub angular_velocity: Vec3,
    /// Local offset of the tracked origin
    pub origin_offset:    Vec3,
}

impl PortableBody {
    /// A body at rest
    pub fn at(transform: Transform) -> Self {
        Self {
            transform,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            origin_offset: Vec3::ZERO,
        }
    }
}

impl PortalTarget for PortableBody {
    fn teleport(&mut self, portal: &PortalRecord) {
        let teleport = &portal.teleport;
        self.transform = teleport.modify_transform(&self.transform);
        self.linear_velocity = teleport.modify_vector(self.linear_velocity);
        // spin rate is independent of portal scale
        self.angular_velocity =
            teleport.modify_direction(self.angular_velocity) * self.angular_velocity.length();
    }
}

impl Portable for PortableBody {
    fn origin(&self) -> Vec3 { self.transform.transform_point(self.origin_offset) }
}

/// A crossing about to happen or just done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeleportOutcome {
    /// Portal entered
    pub from_portal: Entity,
    /// Portal exited
    pub to_portal:   Entity,
}

/// Teleports `portable` through `portal` if its origin has crossed the
/// transition plane. Unlinked portals and portals with teleporting turned off
/// never teleport.
pub fn try_teleport_portable(
    portal: &PortalRecord,
    world: &PortalWorld,
    portable: &mut impl Portable,
) -> bool {
    if !portal.uses_teleport
        || !world.is_linked(portal.entity)
        || !portal.has_crossed(portable.origin())
    {
        return false;
    }
    portable.teleport(portal);
    true
}

/// Tag carried out of `from` into its partner `to`. The entered portal's
/// table applies first; without an entry the exit's table is read backwards.
pub fn teleport_tag(from: &PortalRecord, to: &PortalRecord, tag: &str) -> String {
    let forward = from.tags.modify_tag(tag);
    let mapped = if forward == tag {
        to.tags.inverse_tag(tag)
    } else {
        forward
    };
    mapped.to_owned()
}

/// The crossing `portable` is due for this tick, without applying it
pub fn pending_teleport(
    tracker: &PortalTracker,
    world: &PortalWorld,
    portable: &impl Portable,
) -> Option<TeleportOutcome> {
    let portal = world.get(tracker.teleport_candidate()?)?;
    let exit = world.connected(portal.entity)?;
    (portal.uses_teleport && portal.has_crossed(portable.origin())).then_some(TeleportOutcome {
        from_portal: portal.entity,
        to_portal:   exit.entity,
    })
}

/// Checks and performs the crossing of a tracked portable. The body and the
/// tracker change together: tracking moves to the exit portal in the same
/// call, so the next tick cannot lose or double count the object.
pub fn teleport_tracked(
    tracker: &mut PortalTracker,
    world: &PortalWorld,
    portable: &mut impl Portable,
) -> Option<TeleportOutcome> {
    let outcome = pending_teleport(tracker, world, portable)?;
    let portal = world.get(outcome.from_portal)?;
    if !try_teleport_portable(portal, world, portable) {
        return None;
    }
    debug!(
        "teleported through {} into {}",
        outcome.from_portal, outcome.to_portal
    );
    Some(outcome)
}

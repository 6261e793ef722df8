mod config;
mod layer;
mod teleport;
mod trigger;

use avian3d::prelude::*;
use bevy::prelude::*;

pub use config::PortalPhysicsConfig;
pub use layer::LayerMode;
pub use layer::LayerState;
pub use layer::LayerTransition;
pub use layer::PortalLayer;
pub use layer::PortalLayerVolume;
pub use layer::PortalTracker;
pub use layer::PortalTransitionVolume;
pub use teleport::Portable;
pub use teleport::PortableBody;
pub use teleport::PortableOrigin;
pub use teleport::PortableTag;
pub use teleport::TeleportOutcome;
pub use teleport::pending_teleport;
pub use teleport::teleport_tag;
pub use teleport::teleport_tracked;
pub use teleport::try_teleport_portable;
pub use trigger::TriggerEvent;
pub use trigger::TriggerHandler;

use crate::portal::PortalWorld;
use crate::schedule::PortalSet;

/// Trigger reconciliation and teleports, once per fixed tick
pub struct PortalPhysicsPlugin;

impl Plugin for PortalPhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PortalPhysicsConfig>()
            .register_type::<PortalPhysicsConfig>()
            .register_type::<PortalLayer>()
            .register_type::<PortalLayerVolume>()
            .register_type::<PortalTransitionVolume>()
            .register_type::<PortableOrigin>()
            .register_type::<PortableTag>()
            .add_observer(on_tracker_removed)
            .add_systems(
                FixedUpdate,
                reconcile_portal_triggers.in_set(PortalSet::TriggerReconcile),
            )
            .add_systems(FixedUpdate, teleport_portables.in_set(PortalSet::Teleport));
    }
}

/// Triggered on an object right before it is carried through a portal
#[derive(EntityEvent, Debug, Clone, Copy)]
pub struct PortalPreTeleport {
    /// The object
    pub entity:      Entity,
    /// Portal entered
    pub from_portal: Entity,
    /// Portal exited
    pub to_portal:   Entity,
    /// Transform before the teleport
    pub transform:   Transform,
}

/// Triggered on an object once it has been carried through a portal
#[derive(EntityEvent, Debug, Clone, Copy)]
pub struct PortalTeleported {
    /// The object
    pub entity:      Entity,
    /// Portal entered
    pub from_portal: Entity,
    /// Portal exited
    pub to_portal:   Entity,
}

/// Layer mapping of a portal, if it remaps layers at all
fn layer_mapping<'a>(
    world: &'a PortalWorld,
    q_layers: &'a Query<&PortalLayer>,
) -> impl Fn(Entity) -> Option<PortalLayer> + 'a {
    move |portal| {
        world
            .get(portal)
            .filter(|record| record.uses_layers)
            .and_then(|_| q_layers.get(portal).ok())
            .cloned()
    }
}

fn apply_transitions(
    entity: Entity,
    transitions: &[LayerTransition],
    layers: Option<&mut CollisionLayers>,
) {
    for transition in transitions {
        debug!(
            "{entity} {:?} -> {:?} at portal {}",
            transition.from, transition.to, transition.layer
        );
    }
    if let Some(layers) = layers
        && let Some(last) = transitions
            .iter()
            .rev()
            .find_map(|transition| transition.collision_layers)
    {
        *layers = last;
    }
}

fn reconcile_portal_triggers(
    world: Res<PortalWorld>,
    q_layer_volumes: Query<&PortalLayerVolume>,
    q_transition_volumes: Query<&PortalTransitionVolume>,
    q_layers: Query<&PortalLayer>,
    mut q_trackers: Query<(
        Entity,
        &CollidingEntities,
        &mut PortalTracker,
        Option<&mut CollisionLayers>,
    )>,
) {
    let mapping = layer_mapping(&world, &q_layers);
    let owner = |portal: Entity| world.get(portal).map(|record| record.entity);

    for (entity, colliding, mut tracker, mut layers) in &mut q_trackers {
        let layer_overlaps = colliding.iter().filter_map(|collider| {
            q_layer_volumes
                .get(*collider)
                .ok()
                .map(|volume| (*collider, owner(volume.portal)))
        });
        let transition_overlaps = colliding.iter().filter_map(|collider| {
            q_transition_volumes
                .get(*collider)
                .ok()
                .map(|volume| (*collider, owner(volume.portal)))
        });
        for event in tracker.reconcile(layer_overlaps, transition_overlaps) {
            trace!("{entity} trigger {event:?}");
        }

        let current = layers.as_deref().copied().unwrap_or_default();
        let transitions = tracker.update_state(current, &mapping);
        apply_transitions(entity, &transitions, layers.as_deref_mut());
    }
}

fn teleport_portables(
    mut commands: Commands,
    world: Res<PortalWorld>,
    config: Res<PortalPhysicsConfig>,
    q_layers: Query<&PortalLayer>,
    mut q_portables: Query<(
        Entity,
        &mut PortalTracker,
        &mut Transform,
        Option<&mut LinearVelocity>,
        Option<&mut AngularVelocity>,
        Option<&PortableOrigin>,
        Option<&mut CollisionLayers>,
        Option<&mut PortableTag>,
    )>,
) {
    if !config.teleport_enabled {
        return;
    }
    let mapping = layer_mapping(&world, &q_layers);

    for (entity, mut tracker, mut transform, linear, angular, origin, mut layers, tag) in
        &mut q_portables
    {
        let mut body = PortableBody {
            transform:        *transform,
            linear_velocity:  linear.as_deref().map_or(Vec3::ZERO, |velocity| velocity.0),
            angular_velocity: angular.as_deref().map_or(Vec3::ZERO, |velocity| velocity.0),
            origin_offset:    origin.map_or(Vec3::ZERO, |origin| origin.0),
        };
        let Some(pending) = pending_teleport(&tracker, &world, &body) else {
            continue;
        };
        commands.trigger(PortalPreTeleport {
            entity,
            from_portal: pending.from_portal,
            to_portal: pending.to_portal,
            transform: *transform,
        });

        let Some(outcome) = teleport_tracked(&mut tracker, &world, &mut body) else {
            continue;
        };
        *transform = body.transform;
        if let Some(mut linear) = linear {
            linear.0 = body.linear_velocity;
        }
        if let Some(mut angular) = angular {
            angular.0 = body.angular_velocity;
        }
        if let Some(mut tag) = tag
            && let (Some(from), Some(to)) =
                (world.get(outcome.from_portal), world.get(outcome.to_portal))
        {
            let mapped = teleport_tag(from, to, &tag.0);
            if mapped != tag.0 {
                debug!("{entity} tag {} -> {mapped}", tag.0);
                tag.0 = mapped;
            }
        }

        let current = layers.as_deref().copied().unwrap_or_default();
        let handoff = tracker.on_teleported(outcome.to_portal, current, &mapping);
        apply_transitions(entity, &[handoff], layers.as_deref_mut());

        commands.trigger(PortalTeleported {
            entity,
            from_portal: outcome.from_portal,
            to_portal: outcome.to_portal,
        });
    }
}

/// Removing a tracker restores the layers the object had before it met a portal
fn on_tracker_removed(
    remove: On<Remove, PortalTracker>,
    mut q_trackers: Query<(&mut PortalTracker, Option<&mut CollisionLayers>)>,
) {
    let Ok((mut tracker, layers)) = q_trackers.get_mut(remove.entity) else {
        return;
    };
    let current = layers.as_deref().copied().unwrap_or_default();
    if let Some(restore) = tracker.release(current)
        && let Some(mut layers) = layers
    {
        *layers = restore;
    }
    debug!("portal tracking released for {}", remove.entity);
}

#[cfg(test)]
mod tests {
    use bevy::ecs::system::RunSystemOnce;

    use super::*;
    use crate::portal::TagTable;
    use crate::portal::test_support::approx_eq;
    use crate::portal::test_support::linked_pair;

    #[derive(Resource, Default)]
    struct Teleports(Vec<PortalTeleported>);

    fn create_test_world() -> (World, Entity, Entity, Entity) {
        let (mut ecs, world, a, b) = linked_pair();
        ecs.insert_resource(world);
        ecs.init_resource::<PortalPhysicsConfig>();
        ecs.init_resource::<Teleports>();
        ecs.add_observer(|teleported: On<PortalTeleported>, mut teleports: ResMut<Teleports>| {
            teleports.0.push(*teleported);
        });

        let volume = ecs.spawn(PortalTransitionVolume { portal: a }).id();
        let layer_volume = ecs.spawn(PortalLayerVolume { portal: a }).id();
        let mut colliding = CollidingEntities::default();
        colliding.insert(volume);
        colliding.insert(layer_volume);

        let ball = ecs
            .spawn((
                PortalTracker::default(),
                colliding,
                Transform::from_xyz(0.0, 0.0, -0.001),
                LinearVelocity(Vec3::X),
                AngularVelocity::ZERO,
                CollisionLayers::default(),
            ))
            .id();
        (ecs, a, b, ball)
    }

    #[test]
    fn test_fixed_tick_teleports_once() {
        let (mut ecs, a, b, ball) = create_test_world();

        for _ in 0..2 {
            ecs.run_system_once(reconcile_portal_triggers).unwrap();
            ecs.run_system_once(teleport_portables).unwrap();
        }

        let transform = ecs.get::<Transform>(ball).unwrap();
        let velocity = ecs.get::<LinearVelocity>(ball).unwrap();
        let tracker = ecs.get::<PortalTracker>(ball).unwrap();
        let teleports = &ecs.resource::<Teleports>().0;

        assert!(approx_eq(transform.translation, Vec3::new(10.0, 0.0, 0.001)));
        assert!(approx_eq(velocity.0, Vec3::NEG_X));
        assert_eq!(tracker.tracked(), Some(b));
        assert_eq!(tracker.state(), LayerState::Inside);
        assert_eq!(teleports.len(), 1);
        assert_eq!(teleports[0].from_portal, a);
        assert_eq!(teleports[0].to_portal, b);
    }

    #[test]
    fn test_tag_remapped_there_and_back() {
        let (mut ecs, a, b, ball) = create_test_world();
        let mut world = ecs.resource_mut::<PortalWorld>();
        let mut record = world.get(a).unwrap().clone();
        record.tags = TagTable::default().with("Player", "PlayerMirror");
        world.insert(record);
        ecs.entity_mut(ball).insert(PortableTag("Player".to_owned()));

        for _ in 0..2 {
            ecs.run_system_once(reconcile_portal_triggers).unwrap();
            ecs.run_system_once(teleport_portables).unwrap();
        }
        assert_eq!(ecs.get::<PortableTag>(ball).unwrap().0, "PlayerMirror");

        let world = ecs.resource::<PortalWorld>();
        let back = teleport_tag(world.get(b).unwrap(), world.get(a).unwrap(), "PlayerMirror");
        assert_eq!(back, "Player");
        let other = teleport_tag(world.get(a).unwrap(), world.get(b).unwrap(), "Enemy");
        assert_eq!(other, "Enemy");
    }

    #[test]
    fn test_layers_restored_when_tracker_removed() {
        let (mut ecs, a, _b, ball) = create_test_world();
        let inside = CollisionLayers::new(0b100, LayerMask::ALL);
        ecs.entity_mut(a).insert(PortalLayer {
            inside: Some(inside),
            ..default()
        });
        ecs.resource_mut::<PortalPhysicsConfig>().teleport_enabled = false;

        ecs.run_system_once(reconcile_portal_triggers).unwrap();
        assert_eq!(ecs.get::<CollisionLayers>(ball), Some(&inside));

        ecs.entity_mut(ball).remove::<PortalTracker>();
        assert_eq!(ecs.get::<CollisionLayers>(ball), Some(&CollisionLayers::default()));
    }
}

mod assign;
mod descriptor;
mod pool;
mod sync;

use avian3d::prelude::*;
use bevy::prelude::*;

pub use assign::CloneCandidate;
pub use assign::CloneChanges;
pub use assign::CloneSet;
pub use descriptor::CopyDescriptors;
pub use descriptor::CopyKind;
pub use descriptor::PartState;
pub use pool::CloneHandle;
pub use pool::CloneHandler;
pub use pool::ClonePart;
pub use pool::ClonePool;

use self::sync::OriginalPart;
use self::sync::SpawnablePart;
use crate::physics::PortalPhysicsConfig;
use crate::physics::PortalTeleported;
use crate::physics::PortalTracker;
use crate::physics::PortableOrigin;
use crate::portal::PortalWorld;
use crate::schedule::PortalSet;

/// Mirrors tracked objects behind the portals they approach
pub struct ClonePlugin;

impl Plugin for ClonePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CopyDescriptors>()
            .register_type::<CopyDescriptors>()
            .register_type::<CloneSettings>()
            .register_type::<PortalClone>()
            .add_observer(on_clones_teleported)
            .add_observer(on_tracker_removed)
            .add_observer(on_clones_removed)
            .add_systems(
                FixedUpdate,
                (assign_clones, sync::sync_physics_clones, forward_clone_collisions)
                    .chain()
                    .in_set(PortalSet::CloneSync),
            )
            .add_systems(
                PostUpdate,
                sync::sync_render_clones.in_set(PortalSet::RenderCloneSync),
            );
    }
}

/// Opts a tracked object into cloning
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[reflect(Component)]
#[require(PortalClones)]
pub struct CloneSettings {
    /// Clones alive at once, `PortalPhysicsConfig::clone_max_count` when `None`
    pub max_clone_count: Option<usize>,
    /// Entity cloned for each clone instead of mirroring the hierarchy
    pub template:        Option<Entity>,
}

/// The clone handlers of one object
#[derive(Component, Debug, Default)]
pub struct PortalClones {
    set: CloneSet,
}

impl PortalClones {
    /// Assigned clones and their pool
    pub const fn set(&self) -> &CloneSet { &self.set }

    /// Clone entity shown behind `portal`
    pub fn clone_behind(&self, portal: Entity) -> Option<Entity> {
        let handle = self.set.handle_for(portal)?;
        self.set.pool().get_handler(handle)?.root
    }
}

/// Marks an entity that belongs to a clone
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq, Eq)]
#[reflect(Component)]
pub struct PortalClone {
    /// Part of the original this entity mirrors
    pub original: Entity,
    /// Root of the original object
    pub owner:    Entity,
}

/// Triggered on an original when one of its clones starts or stops touching
/// another collider
#[derive(EntityEvent, Debug, Clone, Copy)]
pub struct CloneCollision {
    /// The original object
    pub entity:  Entity,
    /// Clone collider involved
    pub clone:   Entity,
    /// The other collider
    pub other:   Entity,
    /// `true` on contact start, `false` on contact end
    pub started: bool,
}

fn apply_changes(
    commands: &mut Commands,
    owner: Entity,
    clones: &PortalClones,
    changes: &CloneChanges,
) {
    for handle in &changes.released {
        if let Some(handler) = clones.set.pool().get_handler(*handle) {
            sync::set_clone_active(commands, handler, false);
        }
    }
    for handle in changes.acquired.iter().chain(&changes.retargeted) {
        if let Some(handler) = clones.set.pool().get_handler(*handle) {
            sync::set_clone_active(commands, handler, true);
        }
    }
    if !changes.is_empty() {
        debug!(
            "clones of {owner}: {} acquired, {} retargeted, {} released",
            changes.acquired.len(),
            changes.retargeted.len(),
            changes.released.len()
        );
    }
}

fn assign_clones(
    mut commands: Commands,
    world: Res<PortalWorld>,
    config: Res<PortalPhysicsConfig>,
    descriptors: Res<CopyDescriptors>,
    mut q_owners: Query<(
        Entity,
        &CloneSettings,
        &mut PortalClones,
        &PortalTracker,
        &Transform,
        Option<&PortableOrigin>,
    )>,
    q_children: Query<&Children>,
    q_originals: Query<OriginalPart, Without<PortalClone>>,
    q_spawnable: Query<SpawnablePart, Without<PortalClone>>,
) {
    for (owner, settings, mut clones, tracker, transform, origin) in &mut q_owners {
        let origin = transform.transform_point(origin.map_or(Vec3::ZERO, |origin| origin.0));
        let candidates = sync::clone_candidates(tracker, &world, origin);

        clones
            .set
            .set_max_clone_count(settings.max_clone_count.unwrap_or(config.clone_max_count));
        let changes = clones.set.assign(&candidates);

        for handle in &changes.acquired {
            let Some(handler) = clones.set.pool_mut().get_handler_mut(*handle) else {
                continue;
            };
            if handler.root.is_some() {
                continue;
            }
            let (root, parts) = sync::spawn_clone(
                &mut commands,
                owner,
                settings.template,
                &descriptors,
                &q_children,
                &q_originals,
                &q_spawnable,
            );
            debug!("spawned clone {root} of {owner} with {} parts", parts.len());
            handler.root = Some(root);
            handler.parts = parts;
        }

        apply_changes(&mut commands, owner, &clones, &changes);
    }
}

fn on_clones_teleported(
    teleported: On<PortalTeleported>,
    mut commands: Commands,
    mut q_clones: Query<&mut PortalClones>,
) {
    let Ok(mut clones) = q_clones.get_mut(teleported.entity) else {
        return;
    };
    let changes = clones
        .set
        .on_teleported(teleported.from_portal, teleported.to_portal);
    apply_changes(&mut commands, teleported.entity, &clones, &changes);
}

/// An object that stops being tracked gives up its clones in the same tick
fn on_tracker_removed(
    remove: On<Remove, PortalTracker>,
    mut commands: Commands,
    mut q_clones: Query<&mut PortalClones>,
) {
    let Ok(mut clones) = q_clones.get_mut(remove.entity) else {
        return;
    };
    let released = clones.set.release_all();
    let changes = CloneChanges {
        released,
        ..default()
    };
    apply_changes(&mut commands, remove.entity, &clones, &changes);
}

fn on_clones_removed(
    remove: On<Remove, PortalClones>,
    mut commands: Commands,
    q_clones: Query<&PortalClones>,
) {
    let Ok(clones) = q_clones.get(remove.entity) else {
        return;
    };
    for (_, handler) in clones.set.pool().iter() {
        if let Some(root) = handler.root {
            commands.entity(root).try_despawn();
        }
    }
}

fn forward_clone_collisions(
    mut commands: Commands,
    mut started: MessageReader<CollisionStart>,
    mut ended: MessageReader<CollisionEnd>,
    q_clone_parts: Query<&PortalClone>,
) {
    let contacts = started
        .read()
        .map(|event| (event.collider1, event.collider2, true))
        .chain(ended.read().map(|event| (event.collider1, event.collider2, false)));

    for (collider1, collider2, is_start) in contacts {
        for (clone, other) in [(collider1, collider2), (collider2, collider1)] {
            let Ok(part) = q_clone_parts.get(clone) else {
                continue;
            };
            commands.trigger(CloneCollision {
                entity: part.owner,
                clone,
                other,
                started: is_start,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use bevy::ecs::system::RunSystemOnce;

    use bevy::mesh::skinning::SkinnedMesh;

    use super::*;
    use crate::physics::PortalLayerVolume;
    use crate::physics::PortalTransitionVolume;
    use crate::portal::test_support::approx_eq;
    use crate::portal::test_support::linked_pair;

    fn create_test_world(max_clone_count: usize) -> (World, Entity, Entity, Entity) {
        let (mut ecs, world, a, b) = linked_pair();
        ecs.insert_resource(world);
        ecs.init_resource::<PortalPhysicsConfig>();
        ecs.init_resource::<CopyDescriptors>();
        ecs.add_observer(on_clones_teleported);
        ecs.add_observer(on_tracker_removed);
        ecs.add_observer(on_clones_removed);

        let layer_volume = ecs.spawn(PortalLayerVolume { portal: a }).id();
        let transition_volume = ecs.spawn(PortalTransitionVolume { portal: a }).id();
        let mut tracker = PortalTracker::default();
        tracker.reconcile([(layer_volume, Some(a))], [(transition_volume, Some(a))]);

        let ball = ecs
            .spawn((
                tracker,
                CloneSettings {
                    max_clone_count: Some(max_clone_count),
                    template:        None,
                },
                Transform::from_xyz(0.0, 0.0, 0.5),
                RigidBody::Dynamic,
                LinearVelocity(Vec3::new(0.0, 0.0, -1.0)),
                AngularVelocity::ZERO,
            ))
            .id();
        (ecs, a, b, ball)
    }

    fn clone_of(ecs: &World, ball: Entity, portal: Entity) -> Option<Entity> {
        ecs.get::<PortalClones>(ball)?.clone_behind(portal)
    }

    #[test]
    fn test_clone_spawned_and_synced() {
        let (mut ecs, a, _b, ball) = create_test_world(1);

        ecs.run_system_once(assign_clones).unwrap();
        ecs.run_system_once(sync::sync_physics_clones).unwrap();

        let clone = clone_of(&ecs, ball, a).unwrap();
        let transform = ecs.get::<Transform>(clone).unwrap();
        let velocity = ecs.get::<LinearVelocity>(clone).unwrap();
        assert!(approx_eq(transform.translation, Vec3::new(10.0, 0.0, -0.5)));
        assert!(approx_eq(velocity.0, Vec3::new(0.0, 0.0, 1.0)));
        assert_eq!(ecs.get::<Visibility>(clone), Some(&Visibility::Inherited));
        assert!(ecs.get::<RigidBodyDisabled>(clone).is_none());
    }

    #[test]
    fn test_zero_cap_spawns_nothing() {
        let (mut ecs, a, _b, ball) = create_test_world(0);

        ecs.run_system_once(assign_clones).unwrap();

        assert!(clone_of(&ecs, ball, a).is_none());
        assert_eq!(ecs.query::<&PortalClone>().iter(&ecs).count(), 0);
    }

    #[test]
    fn test_teleport_moves_clone_to_exit() {
        let (mut ecs, a, b, ball) = create_test_world(1);
        ecs.run_system_once(assign_clones).unwrap();
        let clone = clone_of(&ecs, ball, a);

        ecs.trigger(PortalTeleported {
            entity:      ball,
            from_portal: a,
            to_portal:   b,
        });

        assert_eq!(clone_of(&ecs, ball, b), clone);
        assert!(clone_of(&ecs, ball, a).is_none());
    }

    #[test]
    fn test_reassign_after_teleport_keeps_promoted_clone() {
        let (mut ecs, a, b, ball) = create_test_world(1);
        ecs.get_mut::<PortalTracker>(ball)
            .unwrap()
            .update_state(CollisionLayers::default(), |_| None);
        ecs.run_system_once(assign_clones).unwrap();
        let clone = clone_of(&ecs, ball, a);

        ecs.get_mut::<PortalTracker>(ball)
            .unwrap()
            .on_teleported(b, CollisionLayers::default(), |_| None);
        ecs.trigger(PortalTeleported {
            entity:      ball,
            from_portal: a,
            to_portal:   b,
        });
        // same tick, before the triggers are reconciled again
        ecs.run_system_once(assign_clones).unwrap();

        let clones = ecs.get::<PortalClones>(ball).unwrap();
        assert_eq!(clone_of(&ecs, ball, b), clone);
        assert!(clone_of(&ecs, ball, a).is_none());
        assert_eq!(clones.set().pool().gets(), 1);
        assert_eq!(clones.set().pool().releases(), 0);
    }

    fn clone_part(ecs: &mut World, original: Entity) -> Option<Entity> {
        ecs.query::<(Entity, &PortalClone)>()
            .iter(ecs)
            .find(|(_, part)| part.original == original)
            .map(|(entity, _)| entity)
    }

    #[test]
    fn test_skinned_clone_binds_cloned_joints() {
        let (mut ecs, _a, _b, ball) = create_test_world(1);
        let joint = ecs.spawn((Transform::default(), ChildOf(ball))).id();
        let outside = ecs.spawn(Transform::default()).id();
        let skin = ecs
            .spawn((
                Transform::default(),
                SkinnedMesh {
                    inverse_bindposes: Handle::default(),
                    joints:            vec![joint, outside],
                },
                ChildOf(ball),
            ))
            .id();

        ecs.run_system_once(assign_clones).unwrap();

        let cloned_joint = clone_part(&mut ecs, joint).unwrap();
        let cloned_skin = clone_part(&mut ecs, skin).unwrap();
        let skinned = ecs.get::<SkinnedMesh>(cloned_skin).unwrap();
        assert_ne!(cloned_joint, joint);
        assert_eq!(skinned.joints, vec![cloned_joint, outside]);
        assert_eq!(ecs.get::<SkinnedMesh>(skin).unwrap().joints, vec![joint, outside]);
    }

    #[test]
    fn test_untracking_hides_clones_and_despawn_removes_them() {
        let (mut ecs, a, _b, ball) = create_test_world(1);
        ecs.run_system_once(assign_clones).unwrap();
        let clone = clone_of(&ecs, ball, a).unwrap();

        ecs.entity_mut(ball).remove::<PortalTracker>();
        ecs.flush();
        assert_eq!(ecs.get::<Visibility>(clone), Some(&Visibility::Hidden));
        assert!(ecs.get::<RigidBodyDisabled>(clone).is_some());
        assert_eq!(ecs.get::<PortalClones>(ball).unwrap().set().pool().active(), 0);

        ecs.entity_mut(ball).despawn();
        ecs.flush();
        assert!(ecs.get_entity(clone).is_err());
    }
}

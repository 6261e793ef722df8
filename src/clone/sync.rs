use avian3d::prelude::*;
use bevy::mesh::morph::MeshMorphWeights;
use bevy::mesh::morph::MorphWeights;
use bevy::mesh::skinning::SkinnedMesh;
use bevy::prelude::*;

use super::PortalClone;
use super::descriptor::CopyDescriptors;
use super::descriptor::CopyKind;
use super::descriptor::PartState;
use super::pool::CloneHandler;
use super::pool::ClonePart;
use crate::physics::PortalTracker;
use crate::portal::PortalWorld;

pub(super) type OriginalPart = (
    &'static Transform,
    Option<&'static RigidBody>,
    Option<&'static LinearVelocity>,
    Option<&'static AngularVelocity>,
    Option<&'static Mass>,
    Option<&'static LinearDamping>,
    Option<&'static AngularDamping>,
    Option<&'static CollisionLayers>,
);

type OriginalPartItem<'a> = (
    &'a Transform,
    Option<&'a RigidBody>,
    Option<&'a LinearVelocity>,
    Option<&'a AngularVelocity>,
    Option<&'a Mass>,
    Option<&'a LinearDamping>,
    Option<&'a AngularDamping>,
    Option<&'a CollisionLayers>,
);

pub(super) type ClonePartData = (
    &'static mut Transform,
    Option<&'static mut RigidBody>,
    Option<&'static mut LinearVelocity>,
    Option<&'static mut AngularVelocity>,
    Option<&'static mut Mass>,
    Option<&'static mut LinearDamping>,
    Option<&'static mut AngularDamping>,
    Option<&'static mut CollisionLayers>,
);

type ClonePartItem<'a> = (
    Mut<'a, Transform>,
    Option<Mut<'a, RigidBody>>,
    Option<Mut<'a, LinearVelocity>>,
    Option<Mut<'a, AngularVelocity>>,
    Option<Mut<'a, Mass>>,
    Option<Mut<'a, LinearDamping>>,
    Option<Mut<'a, AngularDamping>>,
    Option<Mut<'a, CollisionLayers>>,
);

pub(super) type SpawnablePart = (
    Option<&'static Collider>,
    Option<&'static Mesh3d>,
    Option<&'static MeshMaterial3d<StandardMaterial>>,
    Option<&'static SkinnedMesh>,
    Option<&'static MorphWeights>,
    Option<&'static MeshMorphWeights>,
);

type RenderOriginal = (
    &'static GlobalTransform,
    Option<&'static Mesh3d>,
    Option<&'static MeshMaterial3d<StandardMaterial>>,
    Option<&'static MorphWeights>,
    Option<&'static MeshMorphWeights>,
);

type RenderClone = (
    &'static mut GlobalTransform,
    Option<&'static mut Mesh3d>,
    Option<&'static mut MeshMaterial3d<StandardMaterial>>,
    Option<&'static mut MorphWeights>,
    Option<&'static mut MeshMorphWeights>,
);

/// Snapshot of one original part, limited to what the table copies
fn read_part(part: OriginalPartItem<'_>, descriptors: &CopyDescriptors) -> PartState {
    let (transform, body, linear, angular, mass, linear_damping, angular_damping, layers) = part;
    let mut state = PartState::at(*transform);
    if descriptors.copies(CopyKind::RigidBody) {
        state.body = body.copied();
        state.linear_velocity = linear.map_or(Vec3::ZERO, |velocity| velocity.0);
        state.angular_velocity = angular.map_or(Vec3::ZERO, |velocity| velocity.0);
        state.mass = mass.map(|mass| mass.0);
        state.linear_damping = linear_damping.map(|damping| damping.0);
        state.angular_damping = angular_damping.map(|damping| damping.0);
    }
    if descriptors.copies(CopyKind::Collider) {
        state.collision_layers = layers.copied();
    }
    state
}

fn write_part(state: &PartState, part: ClonePartItem<'_>, descriptors: &CopyDescriptors) {
    let (mut transform, body, linear, angular, mass, linear_damping, angular_damping, layers) =
        part;
    if descriptors.copies(CopyKind::Transform) {
        transform.set_if_neq(state.transform);
    }
    if descriptors.copies(CopyKind::RigidBody) {
        if let (Some(mut body), Some(state_body)) = (body, state.body) {
            body.set_if_neq(state_body);
        }
        if let Some(mut linear) = linear {
            linear.0 = state.linear_velocity;
        }
        if let Some(mut angular) = angular {
            angular.0 = state.angular_velocity;
        }
        if let (Some(mut mass), Some(state_mass)) = (mass, state.mass) {
            mass.0 = state_mass;
        }
        if let (Some(mut damping), Some(state_damping)) = (linear_damping, state.linear_damping) {
            damping.0 = state_damping;
        }
        if let (Some(mut damping), Some(state_damping)) = (angular_damping, state.angular_damping) {
            damping.0 = state_damping;
        }
    }
    if descriptors.copies(CopyKind::Collider)
        && let (Some(mut layers), Some(state_layers)) = (layers, state.collision_layers)
    {
        layers.set_if_neq(state_layers);
    }
}

/// Spawns a clone of `owner`, starting inactive.
///
/// With a template the template entity is cloned and only the root is
/// mirrored. Otherwise a minimal hierarchy is built part by part, carrying
/// only the components the table copies. Skinned meshes are bound to the
/// cloned joints; joints outside the hierarchy stay shared.
pub(super) fn spawn_clone(
    commands: &mut Commands,
    owner: Entity,
    template: Option<Entity>,
    descriptors: &CopyDescriptors,
    q_children: &Query<&Children>,
    q_originals: &Query<OriginalPart, Without<PortalClone>>,
    q_spawnable: &Query<SpawnablePart, Without<PortalClone>>,
) -> (Entity, Vec<ClonePart>) {
    if let Some(template) = template {
        let root = commands
            .entity(template)
            .clone_and_spawn()
            .insert((
                PortalClone {
                    original: owner,
                    owner,
                },
                Visibility::Hidden,
            ))
            .id();
        let part = ClonePart {
            original: owner,
            clone:    root,
            is_root:  true,
        };
        return (root, vec![part]);
    }

    let mut parts = Vec::new();
    let root = spawn_part(
        commands,
        owner,
        owner,
        descriptors,
        q_children,
        q_originals,
        q_spawnable,
        &mut parts,
    );
    if descriptors.copies(CopyKind::Renderer) {
        bind_cloned_skins(commands, &parts, q_spawnable);
    }
    (root, parts)
}

fn bind_cloned_skins(
    commands: &mut Commands,
    parts: &[ClonePart],
    q_spawnable: &Query<SpawnablePart, Without<PortalClone>>,
) {
    let clone_of = |original: Entity| {
        parts
            .iter()
            .find(|part| part.original == original)
            .map_or(original, |part| part.clone)
    };
    for part in parts {
        let Ok((_, _, _, Some(skin), _, _)) = q_spawnable.get(part.original) else {
            continue;
        };
        commands.entity(part.clone).insert(SkinnedMesh {
            inverse_bindposes: skin.inverse_bindposes.clone(),
            joints:            skin.joints.iter().map(|joint| clone_of(*joint)).collect(),
        });
    }
}

fn spawn_part(
    commands: &mut Commands,
    original: Entity,
    owner: Entity,
    descriptors: &CopyDescriptors,
    q_children: &Query<&Children>,
    q_originals: &Query<OriginalPart, Without<PortalClone>>,
    q_spawnable: &Query<SpawnablePart, Without<PortalClone>>,
    parts: &mut Vec<ClonePart>,
) -> Entity {
    let mut entity = commands.spawn((
        Name::new("Portal Clone"),
        PortalClone { original, owner },
        Visibility::Hidden,
    ));

    if let Ok(part) = q_originals.get(original) {
        let (transform, body, _, _, mass, linear_damping, angular_damping, layers) = part;
        entity.insert(*transform);
        if descriptors.copies(CopyKind::RigidBody)
            && let Some(body) = body
        {
            entity.insert((
                *body,
                LinearVelocity::ZERO,
                AngularVelocity::ZERO,
                RigidBodyDisabled,
            ));
            if let Some(mass) = mass {
                entity.insert(*mass);
            }
            if let Some(damping) = linear_damping {
                entity.insert(*damping);
            }
            if let Some(damping) = angular_damping {
                entity.insert(*damping);
            }
        }
        if descriptors.copies(CopyKind::Collider)
            && let Some(layers) = layers
        {
            entity.insert(*layers);
        }
    }

    if let Ok((collider, mesh, material, _, morph_weights, mesh_morph_weights)) =
        q_spawnable.get(original)
    {
        if descriptors.copies(CopyKind::Collider)
            && let Some(collider) = collider
        {
            entity.insert((collider.clone(), CollisionEventsEnabled, ColliderDisabled));
        }
        if descriptors.copies(CopyKind::Renderer) {
            if let Some(mesh) = mesh {
                entity.insert(mesh.clone());
            }
            if let Some(material) = material {
                entity.insert(material.clone());
            }
            if let Some(weights) = morph_weights {
                entity.insert(weights.clone());
            }
            if let Some(weights) = mesh_morph_weights {
                entity.insert(weights.clone());
            }
        }
    }

    let clone = entity.id();
    parts.push(ClonePart {
        original,
        clone,
        is_root: original == owner,
    });

    if let Ok(children) = q_children.get(original) {
        for child in children.iter() {
            let child_clone = spawn_part(
                commands,
                child,
                owner,
                descriptors,
                q_children,
                q_originals,
                q_spawnable,
                parts,
            );
            commands.entity(clone).add_child(child_clone);
        }
    }
    clone
}

/// Shows or hides a clone and switches its physics on or off
pub(super) fn set_clone_active(commands: &mut Commands, handler: &CloneHandler, active: bool) {
    for part in &handler.parts {
        let mut entity = commands.entity(part.clone);
        if active {
            entity
                .try_remove::<(RigidBodyDisabled, ColliderDisabled)>()
                .try_insert(Visibility::Inherited);
        } else {
            entity.try_insert((RigidBodyDisabled, ColliderDisabled, Visibility::Hidden));
        }
    }
}

/// Copies physics state from every original onto its active clones
pub(super) fn sync_physics_clones(
    world: Res<PortalWorld>,
    descriptors: Res<CopyDescriptors>,
    q_owners: Query<&super::PortalClones>,
    q_originals: Query<OriginalPart, Without<PortalClone>>,
    mut q_clones: Query<ClonePartData, With<PortalClone>>,
) {
    for clones in &q_owners {
        for (_, handler) in clones.set().pool().iter() {
            if !handler.is_active() {
                continue;
            }
            for part in &handler.parts {
                let Ok(original) = q_originals.get(part.original) else {
                    continue;
                };
                let state =
                    read_part(original, &descriptors).through(&handler.path, &world, part.is_root);
                let Ok(clone) = q_clones.get_mut(part.clone) else {
                    continue;
                };
                write_part(&state, clone, &descriptors);
            }
        }
    }
}

/// Moves every active clone to where its original renders this frame and
/// refreshes mesh and material handles and morph weights
pub(super) fn sync_render_clones(
    world: Res<PortalWorld>,
    descriptors: Res<CopyDescriptors>,
    q_owners: Query<&super::PortalClones>,
    q_originals: Query<RenderOriginal, Without<PortalClone>>,
    mut q_clones: Query<RenderClone, With<PortalClone>>,
) {
    for clones in &q_owners {
        for (_, handler) in clones.set().pool().iter() {
            if !handler.is_active() {
                continue;
            }
            let teleport = handler.path.transform(&world);
            for part in &handler.parts {
                let Ok((
                    original_global,
                    original_mesh,
                    original_material,
                    original_morph,
                    original_mesh_morph,
                )) = q_originals.get(part.original)
                else {
                    continue;
                };
                let Ok((mut global, mesh, material, morph, mesh_morph)) =
                    q_clones.get_mut(part.clone)
                else {
                    continue;
                };
                if descriptors.copies(CopyKind::Transform) {
                    *global =
                        GlobalTransform::from(teleport.modify_matrix(&original_global.affine()));
                }
                if !descriptors.copies(CopyKind::Renderer) {
                    continue;
                }
                if let (Some(mut mesh), Some(original_mesh)) = (mesh, original_mesh)
                    && mesh.0 != original_mesh.0
                {
                    mesh.0 = original_mesh.0.clone();
                }
                if let (Some(mut material), Some(original_material)) = (material, original_material)
                    && material.0 != original_material.0
                {
                    material.0 = original_material.0.clone();
                }
                if let (Some(mut morph), Some(original_morph)) = (morph, original_morph)
                    && morph.weights() != original_morph.weights()
                {
                    *morph = original_morph.clone();
                }
                if let (Some(mut mesh_morph), Some(original_mesh_morph)) =
                    (mesh_morph, original_mesh_morph)
                    && mesh_morph.weights() != original_mesh_morph.weights()
                {
                    *mesh_morph = original_mesh_morph.clone();
                }
            }
        }
    }
}

/// Portals near enough to `origin` to want a clone: every linked portal
/// whose volumes the tracker overlaps, with its distance to `origin`. Right
/// after a teleport the exit portal stands in for the crossed one.
pub(super) fn clone_candidates(
    tracker: &PortalTracker,
    world: &PortalWorld,
    origin: Vec3,
) -> Vec<super::CloneCandidate> {
    let mut candidates: Vec<super::CloneCandidate> = Vec::new();
    for portal in tracker.overlapped_portals() {
        if !world.is_linked(portal) {
            continue;
        }
        let Some(record) = world.get(portal) else {
            continue;
        };
        candidates.push(super::CloneCandidate {
            portal,
            distance: record.origin().distance(origin),
        });
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::test_support::linked_pair;

    #[test]
    fn test_candidates_skip_unlinked_portals() {
        let (mut ecs, mut world, a, b) = linked_pair();
        let lone = ecs.spawn_empty().id();
        world.insert(crate::portal::PortalRecord::new(
            lone,
            bevy::math::Affine3A::from_translation(Vec3::new(0.0, 0.0, 20.0)),
        ));
        let volume_a = ecs.spawn_empty().id();
        let volume_b = ecs.spawn_empty().id();
        let volume_lone = ecs.spawn_empty().id();
        let mut tracker = PortalTracker::default();
        tracker.reconcile(
            [(volume_a, Some(a)), (volume_b, Some(b)), (volume_lone, Some(lone))],
            [(volume_a, Some(a))],
        );

        let mut candidates = clone_candidates(&tracker, &world, Vec3::new(1.0, 0.0, 0.0));
        candidates.sort_by(|x, y| x.distance.total_cmp(&y.distance));

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].portal, a);
        assert_eq!(candidates[1].portal, b);
        assert!((candidates[1].distance - 9.0).abs() < 1e-4);
    }

    #[test]
    fn test_write_respects_table() {
        let mut ecs = World::new();
        let clone = ecs
            .spawn((
                PortalClone {
                    original: Entity::PLACEHOLDER,
                    owner:    Entity::PLACEHOLDER,
                },
                Transform::IDENTITY,
                RigidBody::Dynamic,
                LinearVelocity::ZERO,
            ))
            .id();
        let state = PartState {
            body: Some(RigidBody::Dynamic),
            linear_velocity: Vec3::Y,
            ..PartState::at(Transform::from_xyz(1.0, 2.0, 3.0))
        };
        let descriptors = CopyDescriptors::only([CopyKind::Transform]);

        let mut query = ecs.query_filtered::<ClonePartData, With<PortalClone>>();
        if let Ok(part) = query.get_mut(&mut ecs, clone) {
            write_part(&state, part, &descriptors);
        }

        assert_eq!(ecs.get::<Transform>(clone), Some(&Transform::from_xyz(1.0, 2.0, 3.0)));
        assert_eq!(ecs.get::<LinearVelocity>(clone).map(|velocity| velocity.0), Some(Vec3::ZERO));
    }
}

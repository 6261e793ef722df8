use avian3d::prelude::*;
use bevy::prelude::*;
use portalspace::Aabb;
use portalspace::CastShape;
use portalspace::CloneCollision;
use portalspace::CloneSettings;
use portalspace::Portal;
use portalspace::PortalCamera;
use portalspace::PortalLayer;
use portalspace::PortalLayerVolume;
use portalspace::PortalPointer;
use portalspace::PortalPreTeleport;
use portalspace::PortalSurface;
use portalspace::PortalSurfaceCollider;
use portalspace::PortalTracker;
use portalspace::PortalTransitionVolume;
use rand::Rng;

use super::constants::*;

pub struct ScenePlugin;

impl Plugin for ScenePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(BallSpawnTimer(Timer::from_seconds(
            BALL_SPAWN_SECONDS,
            TimerMode::Repeating,
        )))
        .add_observer(log_pre_teleport)
        .add_observer(log_clone_collision)
        .add_systems(Startup, (load_ball_assets, spawn_scene, spawn_portals))
        .add_systems(Update, (spawn_balls, despawn_expired_balls, sweep_pointer));
    }
}

#[derive(PhysicsLayer, Default, Clone, Copy, Debug)]
enum DemoLayer {
    #[default]
    Default,
    Ball,
    Wall,
    Surface,
    Volume,
}

/// A ball fired at the entry portal
#[derive(Component, Debug)]
pub struct Ball;

#[derive(Component, Debug)]
struct BallLifetime(Timer);

#[derive(Component, Debug)]
struct PointerSweep {
    base: Quat,
}

#[derive(Resource, Debug)]
struct BallSpawnTimer(Timer);

#[derive(Resource, Debug)]
struct BallAssets {
    mesh:     Handle<Mesh>,
    material: Handle<StandardMaterial>,
}

fn ball_layers() -> CollisionLayers {
    CollisionLayers::new(
        DemoLayer::Ball,
        [
            DemoLayer::Default,
            DemoLayer::Ball,
            DemoLayer::Wall,
            DemoLayer::Volume,
        ],
    )
}

/// Balls inside a portal's volumes pass through the wall it sits in
fn through_wall_layers() -> CollisionLayers {
    CollisionLayers::new(
        DemoLayer::Ball,
        [DemoLayer::Default, DemoLayer::Ball, DemoLayer::Volume],
    )
}

fn load_ball_assets(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.insert_resource(BallAssets {
        mesh:     meshes.add(Sphere::new(BALL_RADIUS)),
        material: materials.add(StandardMaterial {
            base_color: Color::srgb(0.9, 0.9, 0.95),
            ..default()
        }),
    });
}

fn spawn_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        Name::new("Camera"),
        Camera3d::default(),
        Transform::from_translation(CAMERA_POSITION).looking_at(CAMERA_TARGET, Vec3::Y),
        PortalCamera::default(),
    ));

    commands.spawn((
        Name::new("Sun"),
        DirectionalLight {
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(4.0, 10.0, 6.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    commands.spawn((
        Name::new("Ground"),
        RigidBody::Static,
        Collider::cuboid(40.0, 0.2, 40.0),
        CollisionLayers::new(DemoLayer::Default, LayerMask::ALL),
        Mesh3d(meshes.add(Cuboid::new(40.0, 0.2, 40.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.15, 0.17, 0.2))),
        Transform::from_xyz(0.0, GROUND_HEIGHT, 0.0),
    ));

    let pointer_position = ENTRY_PORTAL_POSITION + Vec3::new(0.0, 0.5, BALL_SPAWN_DISTANCE);
    let pointer_rotation = Transform::from_translation(pointer_position)
        .looking_at(ENTRY_PORTAL_POSITION, Vec3::Y)
        .rotation;
    commands.spawn((
        Name::new("Pointer"),
        PortalPointer {
            shape: CastShape::Sphere { radius: 0.05 },
            layer_mask: LayerMask::from([
                DemoLayer::Default,
                DemoLayer::Ball,
                DemoLayer::Wall,
                DemoLayer::Surface,
            ])
            .0,
            color: Color::srgb(1.0, 0.3, 0.3),
            ..default()
        },
        PointerSweep {
            base: pointer_rotation,
        },
        Transform::from_translation(pointer_position).with_rotation(pointer_rotation),
    ));
}

fn spawn_portals(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let entry = commands.spawn_empty().id();
    let exit = commands.spawn_empty().id();
    for (portal, connected, position, color) in [
        (entry, exit, ENTRY_PORTAL_POSITION, ENTRY_PORTAL_COLOR),
        (exit, entry, EXIT_PORTAL_POSITION, EXIT_PORTAL_COLOR),
    ] {
        spawn_portal(
            &mut commands,
            &mut meshes,
            &mut materials,
            portal,
            connected,
            position,
            color,
        );
    }
}

fn spawn_portal(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    portal: Entity,
    connected: Entity,
    position: Vec3,
    color: Color,
) {
    let size = PORTAL_HALF_SIZE * 2.0;
    let wall_size = WALL_HALF_SIZE * 2.0;

    commands
        .entity(portal)
        .insert((
            Name::new("Portal"),
            Portal::linked_to(connected),
            PortalSurface {
                bounds: Aabb::from_half_extents(PORTAL_HALF_SIZE.extend(0.0)),
                ..default()
            },
            PortalLayer {
                outside: None,
                between: Some(through_wall_layers()),
                inside:  Some(through_wall_layers()),
            },
            Transform::from_translation(position),
            Visibility::default(),
            Mesh3d(meshes.add(Rectangle::from_size(size))),
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: color.with_alpha(0.35),
                alpha_mode: AlphaMode::Blend,
                unlit: true,
                ..default()
            })),
        ))
        .with_children(|parent| {
            parent.spawn((
                Name::new("Portal Surface"),
                PortalSurfaceCollider { portal },
                Collider::cuboid(size.x, size.y, 0.01),
                CollisionLayers::new(DemoLayer::Surface, DemoLayer::Surface),
            ));
            parent.spawn((
                Name::new("Portal Layer Volume"),
                PortalLayerVolume { portal },
                Collider::cuboid(size.x, size.y, LAYER_VOLUME_DEPTH * 2.0),
                CollisionLayers::new(DemoLayer::Volume, DemoLayer::Ball),
            ));
            parent.spawn((
                Name::new("Portal Transition Volume"),
                PortalTransitionVolume { portal },
                Collider::cuboid(size.x, size.y, TRANSITION_VOLUME_DEPTH * 2.0),
                CollisionLayers::new(DemoLayer::Volume, DemoLayer::Ball),
            ));
            parent.spawn((
                Name::new("Wall"),
                RigidBody::Static,
                Collider::cuboid(wall_size.x, wall_size.y, WALL_THICKNESS),
                CollisionLayers::new(DemoLayer::Wall, [DemoLayer::Default, DemoLayer::Ball]),
                Mesh3d(meshes.add(Cuboid::new(wall_size.x, wall_size.y, WALL_THICKNESS))),
                MeshMaterial3d(materials.add(Color::srgb(0.35, 0.35, 0.4))),
                Transform::from_xyz(0.0, 0.0, -WALL_THICKNESS),
            ));
        });
}

fn spawn_balls(
    mut commands: Commands,
    time: Res<Time>,
    mut timer: ResMut<BallSpawnTimer>,
    assets: Option<Res<BallAssets>>,
) {
    let Some(assets) = assets else {
        return;
    };
    if !timer.0.tick(time.delta()).just_finished() {
        return;
    }

    let mut rng = rand::rng();
    let offset = Vec3::new(
        rng.random_range(-BALL_SPAWN_SPREAD..BALL_SPAWN_SPREAD),
        rng.random_range(-BALL_SPAWN_SPREAD..BALL_SPAWN_SPREAD),
        BALL_SPAWN_DISTANCE,
    );

    commands.spawn((
        Name::new("Ball"),
        Ball,
        BallLifetime(Timer::from_seconds(BALL_LIFETIME_SECONDS, TimerMode::Once)),
        RigidBody::Dynamic,
        Collider::sphere(BALL_RADIUS),
        ball_layers(),
        CollisionEventsEnabled,
        GravityScale(0.1),
        LinearVelocity(Vec3::NEG_Z * BALL_SPEED),
        Transform::from_translation(ENTRY_PORTAL_POSITION + offset),
        Mesh3d(assets.mesh.clone()),
        MeshMaterial3d(assets.material.clone()),
        PortalTracker::default(),
        CloneSettings {
            max_clone_count: Some(BALL_CLONE_COUNT),
            template:        None,
        },
    ));
}

/// Uses `try_despawn` because a ball can expire in the same frame its owner despawns it
fn despawn_expired_balls(
    mut commands: Commands,
    time: Res<Time>,
    mut q_balls: Query<(Entity, &mut BallLifetime)>,
) {
    for (entity, mut lifetime) in &mut q_balls {
        if lifetime.0.tick(time.delta()).just_finished() {
            commands.entity(entity).try_despawn();
        }
    }
}

fn sweep_pointer(time: Res<Time>, mut q_pointers: Query<(&PointerSweep, &mut Transform)>) {
    let yaw = Quat::from_rotation_y(time.elapsed_secs().sin() * 0.3);
    for (sweep, mut transform) in &mut q_pointers {
        transform.rotation = yaw * sweep.base;
    }
}

fn log_pre_teleport(pre_teleport: On<PortalPreTeleport>) {
    debug!(
        "{} entering {} at {}",
        pre_teleport.entity, pre_teleport.from_portal, pre_teleport.transform.translation
    );
}

fn log_clone_collision(collision: On<CloneCollision>) {
    if collision.started {
        debug!(
            "clone {} of {} touched {}",
            collision.clone, collision.entity, collision.other
        );
    }
}

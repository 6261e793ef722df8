use avian3d::prelude::*;
use bevy::diagnostic::DiagnosticsStore;
use bevy::diagnostic::FrameTimeDiagnosticsPlugin;
use bevy::prelude::*;
use portalspace::PortalTeleported;
use portalspace::UsizeExt;

use super::constants::MONITOR_MIN_BALLS;
use super::scene::Ball;

pub struct MonitorPlugin;

impl Plugin for MonitorPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(PhysicsPlugins::default())
            .add_plugins(PhysicsDebugPlugin)
            .add_plugins(FrameTimeDiagnosticsPlugin::default())
            .init_resource::<PhysicsMonitorState>()
            .add_observer(count_teleports)
            .add_systems(Startup, init_physics_debug)
            .add_systems(Update, toggle_physics_debug)
            .add_systems(FixedUpdate, monitor_physics_health);
    }
}

#[derive(Resource, Default)]
struct PhysicsMonitorState {
    is_stressed:       bool,
    last_stress_log:   f64,
    logged_unstressed: bool,
    teleports:         usize,
}

fn init_physics_debug(mut config_store: ResMut<GizmoConfigStore>) {
    let (config, _) = config_store.config_mut::<PhysicsGizmos>();
    config.enabled = false;
}

fn toggle_physics_debug(
    keys: Res<ButtonInput<KeyCode>>,
    mut config_store: ResMut<GizmoConfigStore>,
) {
    if keys.just_pressed(KeyCode::F3) {
        let (config, _) = config_store.config_mut::<PhysicsGizmos>();
        config.enabled = !config.enabled;
        info!("Physics debug: {}", config.enabled);
    }
}

fn count_teleports(_teleported: On<PortalTeleported>, mut state: ResMut<PhysicsMonitorState>) {
    state.teleports += 1;
}

fn monitor_physics_health(
    balls: Query<&LinearVelocity, With<Ball>>,
    time: Res<Time<Fixed>>,
    diagnostics: Res<DiagnosticsStore>,
    mut state: ResMut<PhysicsMonitorState>,
) {
    let ball_count = balls.iter().len();
    if ball_count < MONITOR_MIN_BALLS {
        return;
    }

    let total_speed: f32 = balls.iter().map(|velocity| velocity.length()).sum();
    let avg_speed = total_speed / ball_count.to_f32();

    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|fps| fps.smoothed())
        .unwrap_or(0.0);

    // hysteresis: enter below 35 FPS, leave above 45
    let physics_struggling = if state.is_stressed {
        fps < 45.0 || avg_speed > 200.0
    } else {
        fps < 35.0 || avg_speed > 200.0
    };

    let current_time = time.elapsed_secs_f64();

    if physics_struggling {
        let should_log = !state.is_stressed || (current_time - state.last_stress_log >= 1.0);
        if should_log {
            warn!(
                "physics stress: {ball_count} balls | {} teleports | avg_speed: {avg_speed:.1} | FPS: {fps:.1} | timestep: {:.3}ms",
                state.teleports,
                time.delta_secs() * 1000.0
            );
            state.is_stressed = true;
            state.last_stress_log = current_time;
            state.logged_unstressed = false;
        }
    } else if !state.logged_unstressed {
        info!(
            "physics healthy: {ball_count} balls | {} teleports | avg_speed: {avg_speed:.1} | FPS: {fps:.1}",
            state.teleports
        );
        state.logged_unstressed = true;
        state.is_stressed = false;
    }
}

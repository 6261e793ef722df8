mod constants;
mod monitor;
mod scene;

use bevy::input::common_conditions::input_toggle_active;
use bevy::prelude::*;
use bevy_inspector_egui::quick::ResourceInspectorPlugin;
use portalspace::PortalPhysicsConfig;
use portalspace::PortalRenderConfig;

use self::monitor::MonitorPlugin;
use self::scene::ScenePlugin;

pub struct DemoPlugin;

impl Plugin for DemoPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(
            ResourceInspectorPlugin::<PortalRenderConfig>::default()
                .run_if(input_toggle_active(false, KeyCode::F1)),
        )
        .add_plugins(
            ResourceInspectorPlugin::<PortalPhysicsConfig>::default()
                .run_if(input_toggle_active(false, KeyCode::F2)),
        )
        .add_plugins((MonitorPlugin, ScenePlugin));
    }
}

//! Portalspace demo - balls fired through a linked pair of portals
//!
//! - F1 / F2 toggle the render and physics config inspectors
//! - F3 toggles physics debug gizmos
//! - Bevy Remote Protocol (BRP) support for debugging

mod demo;

use bevy::prelude::*;
use bevy_brp_extras::BrpExtrasPlugin;
use bevy_inspector_egui::bevy_egui::EguiPlugin;
use portalspace::PortalSpacePlugin;

use crate::demo::DemoPlugin;

fn main() {
    let mut app = App::new();

    // Get effective port from BrpExtrasPlugin to include in window title if non-default
    let brp_plugin = BrpExtrasPlugin::default();
    let (effective_port, _) = brp_plugin.get_effective_port();
    let window_title = if effective_port == bevy_brp_extras::DEFAULT_REMOTE_PORT {
        "portalspace".to_string()
    } else {
        format!("portalspace - {effective_port}")
    };

    app.add_plugins(DefaultPlugins.set(WindowPlugin {
        primary_window: Some(Window {
            title: window_title,
            ..default()
        }),
        ..default()
    }))
    .add_plugins((EguiPlugin::default(), brp_plugin, PortalSpacePlugin, DemoPlugin))
    .run();
}

mod builder;
mod config;
mod node;
mod renderer;
mod window;

use bevy::math::Affine3A;
use bevy::prelude::*;

pub use builder::RenderAlgorithm;
pub use builder::RenderBudget;
pub use builder::build_render_tree;
pub use config::PortalRenderConfig;
pub use node::EyeView;
pub use node::Eyes;
pub use node::NodeId;
pub use node::RenderNode;
pub use node::RenderTree;
pub use renderer::PortalRenderer;
pub use renderer::walk_render_tree;
pub use window::CullingWindow;

use crate::constants::RENDER_GIZMO_DEPTH;
use crate::portal::Portal;
use crate::portal::PortalSurface;
use crate::portal::PortalWorld;
use crate::schedule::PortalSet;

/// Builds a view tree for every `PortalCamera` each frame and draws the
/// culling windows
pub struct RenderPlugin;

impl Plugin for RenderPlugin {
    fn build(&self, app: &mut App) {
        app.init_gizmo_group::<PortalWindowGizmo>()
            .init_resource::<PortalRenderConfig>()
            .register_type::<PortalRenderConfig>()
            .register_type::<PortalCamera>()
            .add_systems(
                PostUpdate,
                (
                    build_render_trees,
                    (update_window_gizmo_config, draw_portal_windows).chain(),
                )
                    .chain()
                    .in_set(PortalSet::RenderTree),
            );
    }
}

#[derive(Debug, Default, Reflect, GizmoConfigGroup)]
struct PortalWindowGizmo {}

/// A camera that sees through portals
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
#[require(PortalRenderTree)]
pub struct PortalCamera {
    /// Distance between the eyes; `None` renders mono
    pub stereo_separation: Option<f32>,
}

impl PortalCamera {
    /// Eye state for a camera at `camera_to_world`
    pub fn eyes(&self, camera_to_world: Affine3A, clip_from_view: Mat4) -> Eyes {
        let Some(separation) = self.stereo_separation else {
            return Eyes::Mono(EyeView::new(camera_to_world, clip_from_view));
        };
        let offset =
            camera_to_world.transform_vector3(Vec3::X).normalize_or_zero() * separation / 2.0;
        let eye = |offset: Vec3| {
            let mut frame = camera_to_world;
            frame.translation += offset.to_vec3a();
            EyeView::new(frame, clip_from_view)
        };
        Eyes::Stereo {
            left:  eye(-offset),
            right: eye(offset),
        }
    }
}

/// The view tree of one `PortalCamera`, rebuilt every frame
#[derive(Component, Debug, Default)]
pub struct PortalRenderTree {
    tree:         RenderTree,
    last_visited: usize,
}

impl PortalRenderTree {
    /// The latest build
    pub const fn tree(&self) -> &RenderTree { &self.tree }
}

/// Surface geometry as registered on the portal entity; draws nothing
struct SurfaceRenderer {
    portal:             Entity,
    render_layer:       usize,
    max_depth_override: Option<usize>,
}

impl PortalRenderer for SurfaceRenderer {
    fn portal(&self) -> Entity { self.portal }

    fn render_layer(&self) -> usize { self.render_layer }

    fn max_depth_override(&self) -> Option<usize> { self.max_depth_override }
}

fn build_render_trees(
    world: Res<PortalWorld>,
    config: Res<PortalRenderConfig>,
    q_surfaces: Query<(Entity, &PortalSurface), With<Portal>>,
    mut q_cameras: Query<(Entity, &Camera, &GlobalTransform, &PortalCamera, &mut PortalRenderTree)>,
) {
    let renderers: Vec<SurfaceRenderer> = q_surfaces
        .iter()
        .map(|(portal, surface)| SurfaceRenderer {
            portal,
            render_layer: surface.render_layer,
            max_depth_override: surface.max_depth_override,
        })
        .collect();
    let budget = config.budget();

    for (entity, camera, global_transform, portal_camera, mut render_tree) in &mut q_cameras {
        if !camera.is_active {
            continue;
        }
        let eyes = portal_camera.eyes(global_transform.affine(), camera.clip_from_view());
        build_render_tree(&mut render_tree.tree, eyes, &renderers, &world, &budget);

        let visited = render_tree.tree.visited_count();
        if visited != render_tree.last_visited {
            debug!("camera {entity} sees {visited} portal views");
            render_tree.last_visited = visited;
        }
    }
}

fn update_window_gizmo_config(
    mut config_store: ResMut<GizmoConfigStore>,
    render_config: Res<PortalRenderConfig>,
) {
    let (config, _) = config_store.config_mut::<PortalWindowGizmo>();
    config.enabled = render_config.draw_windows;
    config.line.width = render_config.line_width;
}

/// Records the windows the walker hands it, to be drawn as gizmos
struct WindowRecorder {
    portal:  Entity,
    windows: Vec<(CullingWindow, bool)>,
}

impl PortalRenderer for WindowRecorder {
    fn portal(&self) -> Entity { self.portal }

    fn render(&mut self, node: &RenderNode) { self.windows.push((node.window, true)); }

    fn render_default(&mut self, node: &RenderNode) { self.windows.push((node.window, false)); }
}

fn draw_portal_windows(
    mut gizmos: Gizmos<PortalWindowGizmo>,
    config: Res<PortalRenderConfig>,
    q_cameras: Query<&PortalRenderTree>,
) {
    if !config.draw_windows {
        return;
    }
    for render_tree in &q_cameras {
        let tree = render_tree.tree();
        let Some(Eyes::Mono(view) | Eyes::Stereo { left: view, .. }) =
            tree.root().map(|root| root.eyes)
        else {
            continue;
        };

        let mut recorders: Vec<WindowRecorder> = Vec::new();
        for portal in tree.iter().filter_map(|(_, node)| node.portal) {
            if recorders.iter().all(|recorder| recorder.portal != portal) {
                recorders.push(WindowRecorder {
                    portal,
                    windows: Vec::new(),
                });
            }
        }
        walk_render_tree(tree, &mut recorders);

        for (window, rendered) in recorders.iter().flat_map(|recorder| recorder.windows.iter()) {
            let color = if *rendered {
                config.window_color
            } else {
                config.window_color.with_alpha(0.3)
            };
            let corners = [
                Vec2::new(window.x_min, window.y_min),
                Vec2::new(window.x_max, window.y_min),
                Vec2::new(window.x_max, window.y_max),
                Vec2::new(window.x_min, window.y_max),
                Vec2::new(window.x_min, window.y_min),
            ];
            gizmos.linestrip(
                corners.map(|corner| unproject(&view, corner, RENDER_GIZMO_DEPTH)),
                color,
            );
        }
    }
}

/// World point at view `depth` behind a screen point
fn unproject(view: &EyeView, ndc: Vec2, depth: f32) -> Vec3 {
    let near = view.clip_from_view.inverse() * ndc.extend(1.0).extend(1.0);
    let near = near.truncate() / near.w;
    let local = if near.z < 0.0 { near * (depth / -near.z) } else { near };
    view.camera_to_world.transform_point3(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::test_support::approx_eq;

    #[test]
    fn test_stereo_eyes_straddle_camera() {
        let camera = PortalCamera {
            stereo_separation: Some(0.2),
        };
        let frame = Affine3A::from_translation(Vec3::new(1.0, 2.0, 3.0));

        let Eyes::Stereo { left, right } = camera.eyes(frame, Mat4::IDENTITY) else {
            panic!("expected stereo eyes");
        };

        assert!(approx_eq(left.position(), Vec3::new(0.9, 2.0, 3.0)));
        assert!(approx_eq(right.position(), Vec3::new(1.1, 2.0, 3.0)));
    }

    #[test]
    fn test_unproject_center_lies_ahead() {
        let projection =
            Mat4::perspective_infinite_reverse_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1);
        let view = EyeView::new(Affine3A::IDENTITY, projection);

        assert!(approx_eq(unproject(&view, Vec2::ZERO, 2.0), Vec3::new(0.0, 0.0, -2.0)));
        assert!(approx_eq(unproject(&view, Vec2::X, 2.0), Vec3::new(2.0, 0.0, -2.0)));
    }
}

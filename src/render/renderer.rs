use bevy::prelude::*;

use super::node::Eyes;
use super::node::NodeId;
use super::node::RenderNode;
use super::node::RenderTree;
use super::window::CullingWindow;
use crate::portal::PortalWorld;

/// A drawable portal surface. The tree builder asks it where the portal
/// appears, the walker calls back into it to draw each view.
///
/// The window and clipping plane default to the geometry registered in the
/// `PortalWorld`; the draw callbacks default to doing nothing.
pub trait PortalRenderer {
    /// The portal this surface shows
    fn portal(&self) -> Entity;

    /// Render layer the surface draws on
    fn render_layer(&self) -> usize { 0 }

    /// Caps recursion through this surface below the global maximum
    fn max_depth_override(&self) -> Option<usize> { None }

    /// Screen region of the surface seen by `eyes`, the union of both eyes in
    /// stereo. `None` when no eye is in front of the portal or it is off screen.
    fn try_get_window(&self, world: &PortalWorld, eyes: &Eyes) -> Option<CullingWindow> {
        let record = world.get(self.portal())?;
        let corners = record.surface.world_corners(&record.local_to_world);
        eyes.views()
            .filter(|view| record.signed_distance(view.position()) > 0.0)
            .filter_map(|view| {
                CullingWindow::from_corners(&corners, &view.world_to_camera, &view.clip_from_view)
            })
            .reduce(|union, window| union.union(&window))
    }

    /// World plane of the exit portal as `(normal, d)`, positive in front of it
    fn try_get_clipping_plane(&self, world: &PortalWorld) -> Option<Vec4> {
        let exit = world.connected(self.portal())?;
        let normal = exit.normal();
        (normal != Vec3::ZERO).then(|| normal.extend(-normal.dot(exit.origin())))
    }

    /// Before the view's visibility is computed
    fn pre_cull(&mut self, _node: &RenderNode) {}

    /// After the view's visibility is computed
    fn post_cull(&mut self, _node: &RenderNode) {}

    /// Draws the view through the portal
    fn render(&mut self, _node: &RenderNode) {}

    /// Draws the surface without a view, for portals cut off by the budget
    fn render_default(&mut self, _node: &RenderNode) {}

    /// After the view is drawn
    fn post_render(&mut self, _node: &RenderNode) {}
}

/// Walks a built tree children first, so every nested view is drawn before
/// the view containing it. Valid nodes get `render`, truncated ones
/// `render_default`; the root belongs to the real camera and gets no calls.
pub fn walk_render_tree<R: PortalRenderer>(tree: &RenderTree, renderers: &mut [R]) {
    let Some(root) = tree.root() else {
        return;
    };
    let mut stack: Vec<(NodeId, bool)> =
        root.children.iter().rev().map(|child| (*child, false)).collect();

    while let Some((id, expanded)) = stack.pop() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        if !expanded && node.is_valid {
            stack.push((id, true));
            stack.extend(node.children.iter().rev().map(|child| (*child, false)));
            continue;
        }
        if !node.is_valid && !node.truncated {
            continue;
        }

        let Some(renderer) = node
            .portal
            .and_then(|portal| renderers.iter_mut().find(|renderer| renderer.portal() == portal))
        else {
            continue;
        };
        renderer.pre_cull(node);
        renderer.post_cull(node);
        if node.is_valid {
            renderer.render(node);
        } else {
            renderer.render_default(node);
        }
        renderer.post_render(node);
    }
}

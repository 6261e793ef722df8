use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy::prelude::*;

use super::node::Eyes;
use super::node::NodeId;
use super::node::RenderNode;
use super::node::RenderTree;
use super::renderer::PortalRenderer;
use crate::constants::RENDER_MAX_DEPTH;
use crate::constants::RENDER_MAX_RENDERS;
use crate::constants::RENDER_MIN_DEPTH;
use crate::portal::PortalWorld;

/// Order in which discovered portal views are visited
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderAlgorithm {
    /// Shallower views first
    BreadthFirst,
    /// Every view down to `min_depth` first, then predictive
    RequiredDepth,
    /// Nearest views first, endless corridors last
    #[default]
    Predictive,
}

/// Limits on one tree build
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderBudget {
    /// Visit order
    pub algorithm:   RenderAlgorithm,
    /// Deepest chain of portal views
    pub max_depth:   usize,
    /// Depth forced by `RequiredDepth`
    pub min_depth:   usize,
    /// Virtual views per build, root excluded
    pub max_renders: usize,
    /// Screen point whose views win ties
    pub focus:       Option<Vec2>,
}

impl Default for RenderBudget {
    fn default() -> Self {
        Self {
            algorithm:   RenderAlgorithm::default(),
            max_depth:   RENDER_MAX_DEPTH,
            min_depth:   RENDER_MIN_DEPTH,
            max_renders: RENDER_MAX_RENDERS,
            focus:       None,
        }
    }
}

/// A discovered view waiting for a visit. Smaller keys are visited first.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    node:         NodeId,
    tier:         u8,
    repeating:    bool,
    z_min:        f32,
    out_of_focus: bool,
    depth:        usize,
    sequence:     usize,
}

impl Candidate {
    fn key_cmp(&self, other: &Self) -> Ordering {
        self.tier
            .cmp(&other.tier)
            .then(self.repeating.cmp(&other.repeating))
            .then(self.z_min.total_cmp(&other.z_min))
            .then(self.out_of_focus.cmp(&other.out_of_focus))
            .then(self.depth.cmp(&other.depth))
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool { self.key_cmp(other) == Ordering::Equal }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Candidate {
    // reversed so the max-heap pops the smallest key
    fn cmp(&self, other: &Self) -> Ordering { other.key_cmp(self) }
}

/// Builds the tree of portal views seen from `eyes`.
///
/// Every visited view discovers the surfaces visible through its window;
/// discoveries queue up in the order `budget.algorithm` dictates and are
/// visited until `max_renders` views exist. Views past `max_depth` (or a
/// surface's own override) and views left over when the budget runs out stay
/// in the tree as truncated leaves.
pub fn build_render_tree<R: PortalRenderer>(
    tree: &mut RenderTree,
    eyes: Eyes,
    renderers: &[R],
    world: &PortalWorld,
    budget: &RenderBudget,
) {
    tree.reset(eyes);
    let mut queue = BinaryHeap::new();
    let mut sequence = 0;
    let mut renders = 0;

    discover(tree, NodeId::ROOT, renderers, world, budget, &mut queue, &mut sequence);

    while let Some(candidate) = queue.pop() {
        let limit = tree
            .get(candidate.node)
            .and_then(|node| node.portal)
            .and_then(|portal| renderers.iter().find(|renderer| renderer.portal() == portal))
            .and_then(PortalRenderer::max_depth_override)
            .map_or(budget.max_depth, |limit| limit.min(budget.max_depth));

        if renders >= budget.max_renders || candidate.depth > limit {
            if let Some(node) = tree.get_mut(candidate.node) {
                node.truncated = true;
            }
            continue;
        }

        if visit(tree, candidate.node, renderers, world) {
            renders += 1;
            discover(tree, candidate.node, renderers, world, budget, &mut queue, &mut sequence);
        }
    }

    debug_assert!(tree.iter().all(|(_, node)| {
        node.parent.and_then(|parent| tree.get(parent)).is_none_or(|parent| {
            parent.depth < node.depth && (!node.is_valid || parent.window.contains(&node.window))
        })
    }));
}

/// Queues every surface visible from a visited node as a child candidate
fn discover<R: PortalRenderer>(
    tree: &mut RenderTree,
    parent: NodeId,
    renderers: &[R],
    world: &PortalWorld,
    budget: &RenderBudget,
    queue: &mut BinaryHeap<Candidate>,
    sequence: &mut usize,
) {
    let Some(node) = tree.get(parent) else {
        return;
    };
    let (eyes, outer, depth) = (node.eyes, node.window, node.depth + 1);
    let exit = node.portal.and_then(|portal| world.connected(portal)).map(|exit| exit.entity);

    for renderer in renderers {
        let portal = renderer.portal();
        if Some(portal) == exit || !world.is_linked(portal) {
            continue;
        }
        let Some(window) = renderer.try_get_window(world, &eyes) else {
            continue;
        };
        if !window.is_visible_through(&outer) {
            continue;
        }
        let window = window.clamped(&outer);
        if !window.is_valid() {
            continue;
        }

        let repeating = tree.is_repeating(parent, portal);
        let out_of_focus = budget.focus.is_some_and(|focus| !window.contains_point(focus));
        let id = tree.add_child(parent, RenderNode {
            depth,
            portal: Some(portal),
            window,
            eyes,
            ..default()
        });

        let predictive = match budget.algorithm {
            RenderAlgorithm::BreadthFirst => false,
            RenderAlgorithm::RequiredDepth => depth > budget.min_depth,
            RenderAlgorithm::Predictive => true,
        };
        let candidate = if predictive {
            Candidate {
                node: id,
                tier: u8::from(budget.algorithm == RenderAlgorithm::RequiredDepth),
                repeating,
                z_min: window.z_min,
                out_of_focus,
                depth,
                sequence: *sequence,
            }
        } else {
            Candidate {
                node: id,
                tier: 0,
                repeating: false,
                z_min: 0.0,
                out_of_focus: false,
                depth,
                sequence: *sequence,
            }
        };
        *sequence += 1;
        queue.push(candidate);
    }
}

/// Computes a node's virtual camera and clipping plane, marking it valid when
/// the portal can still be seen through
fn visit<R: PortalRenderer>(
    tree: &mut RenderTree,
    id: NodeId,
    renderers: &[R],
    world: &PortalWorld,
) -> bool {
    let Some((parent, portal)) = tree.get(id).and_then(|node| node.parent.zip(node.portal)) else {
        return false;
    };
    let Some(parent_teleport) = tree.get(parent).map(|parent| parent.teleport) else {
        return false;
    };
    let teleport = world.teleport(portal);
    let clip_plane = renderers
        .iter()
        .find(|renderer| renderer.portal() == portal)
        .and_then(|renderer| renderer.try_get_clipping_plane(world));

    let Some(node) = tree.get_mut(id) else {
        return false;
    };
    node.visited = true;
    let Some(teleport) = teleport.filter(|teleport| !teleport.is_degenerate()) else {
        debug!("portal {portal} is unlinked or degenerate, not rendering through it");
        return false;
    };
    node.eyes = node.eyes.through(&teleport);
    node.teleport = teleport.after(&parent_teleport);
    node.clip_plane = clip_plane;
    node.is_valid = node.window.is_valid();
    node.is_valid
}

#[cfg(test)]
mod tests {
    use bevy::math::Affine3A;

    use super::*;
    use crate::portal::PortalRecord;
    use crate::render::node::EyeView;
    use crate::render::renderer::walk_render_tree;

    struct Surface {
        portal: Entity,
        calls:  Vec<(&'static str, usize)>,
        limit:  Option<usize>,
    }

    impl Surface {
        fn new(portal: Entity) -> Self {
            Self {
                portal,
                calls: Vec::new(),
                limit: None,
            }
        }
    }

    impl PortalRenderer for Surface {
        fn portal(&self) -> Entity { self.portal }

        fn max_depth_override(&self) -> Option<usize> { self.limit }

        fn render(&mut self, node: &RenderNode) { self.calls.push(("render", node.depth)); }

        fn render_default(&mut self, node: &RenderNode) {
            self.calls.push(("default", node.depth));
        }
    }

    fn projection() -> Mat4 {
        Mat4::perspective_infinite_reverse_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1)
    }

    /// Two portals facing each other 10 apart along Z: an endless corridor.
    /// The camera sits between them looking at `a`.
    fn corridor() -> (PortalWorld, Entity, Entity, Eyes) {
        let mut ecs = World::new();
        let a = ecs.spawn_empty().id();
        let b = ecs.spawn_empty().id();
        let mut world = PortalWorld::default();
        world.insert(PortalRecord::new(a, Affine3A::IDENTITY));
        world.insert(PortalRecord::new(
            b,
            Affine3A::from_rotation_translation(
                Quat::from_rotation_y(std::f32::consts::PI),
                Vec3::new(0.0, 0.0, 10.0),
            ),
        ));
        world.link(a, b);

        let camera = Affine3A::from_translation(Vec3::new(0.0, 0.0, 5.0));
        (world, a, b, Eyes::Mono(EyeView::new(camera, projection())))
    }

    fn budget(algorithm: RenderAlgorithm) -> RenderBudget {
        RenderBudget {
            algorithm,
            max_depth: 3,
            min_depth: 1,
            max_renders: 16,
            focus: None,
        }
    }

    #[test]
    fn test_windows_nest_and_depth_grows() {
        let (world, a, b, eyes) = corridor();
        let renderers = [Surface::new(a), Surface::new(b)];
        let mut tree = RenderTree::default();

        for algorithm in [
            RenderAlgorithm::BreadthFirst,
            RenderAlgorithm::RequiredDepth,
            RenderAlgorithm::Predictive,
        ] {
            build_render_tree(&mut tree, eyes, &renderers, &world, &budget(algorithm));

            for (_, node) in tree.iter() {
                let Some(parent) = node.parent.and_then(|parent| tree.get(parent)) else {
                    continue;
                };
                assert_eq!(node.depth, parent.depth + 1);
                assert!(parent.window.contains(&node.window));
                if node.is_valid {
                    assert!(node.window.is_valid());
                }
            }
            assert!(tree.iter().any(|(_, node)| node.depth == 3 && node.is_valid));
            assert!(tree.iter().all(|(_, node)| node.depth <= 4));
        }
    }

    #[test]
    fn test_corridor_looks_through_a_again() {
        let (world, a, _b, eyes) = corridor();
        let renderers = [Surface::new(a)];
        let mut tree = RenderTree::default();

        let budget = budget(RenderAlgorithm::BreadthFirst);
        build_render_tree(&mut tree, eyes, &renderers, &world, &budget);

        let first = tree.child_for(NodeId::ROOT, a).unwrap();
        let second = tree.child_for(first, a).unwrap();
        let node = tree.get(second).unwrap();
        assert!(node.is_valid);
        // each crossing pushes the portal 10 further away
        assert!(node.window.z_min > tree.get(first).unwrap().window.z_min);
    }

    #[test]
    fn test_max_renders_truncates() {
        let (world, a, b, eyes) = corridor();
        let renderers = [Surface::new(a), Surface::new(b)];
        let mut tree = RenderTree::default();
        let budget = RenderBudget {
            max_renders: 2,
            max_depth: 8,
            ..budget(RenderAlgorithm::Predictive)
        };

        build_render_tree(&mut tree, eyes, &renderers, &world, &budget);

        let visited = tree
            .iter()
            .filter(|(id, node)| *id != NodeId::ROOT && node.is_valid)
            .count();
        assert_eq!(visited, 2);
        assert!(tree.iter().any(|(_, node)| node.truncated));
    }

    #[test]
    fn test_depth_override_caps_one_surface() {
        let (world, a, _b, eyes) = corridor();
        let mut surface = Surface::new(a);
        surface.limit = Some(1);
        let mut tree = RenderTree::default();

        let budget = budget(RenderAlgorithm::BreadthFirst);
        build_render_tree(&mut tree, eyes, &[surface], &world, &budget);

        assert!(tree.iter().all(|(_, node)| !node.is_valid || node.depth <= 1));
    }

    #[test]
    fn test_portal_behind_camera_is_not_discovered() {
        let (world, _a, b, eyes) = corridor();
        let renderers = [Surface::new(b)];
        let mut tree = RenderTree::default();

        let budget = budget(RenderAlgorithm::Predictive);
        build_render_tree(&mut tree, eyes, &renderers, &world, &budget);

        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_walker_renders_children_first() {
        let (world, a, _b, eyes) = corridor();
        let mut renderers = [Surface::new(a)];
        let mut tree = RenderTree::default();
        let budget = budget(RenderAlgorithm::BreadthFirst);
        build_render_tree(&mut tree, eyes, &renderers, &world, &budget);

        walk_render_tree(&tree, &mut renderers);

        assert_eq!(
            renderers[0].calls,
            vec![("default", 4), ("render", 3), ("render", 2), ("render", 1)]
        );
    }

    fn candidate(sequence: usize) -> Candidate {
        Candidate {
            node: NodeId::ROOT,
            tier: 0,
            repeating: false,
            z_min: 1.0,
            out_of_focus: false,
            depth: 1,
            sequence,
        }
    }

    /// Sequence of the candidate a build with one render left would visit
    fn visited_first(candidates: [Candidate; 2]) -> Option<usize> {
        let mut queue: BinaryHeap<Candidate> = candidates.into_iter().collect();
        queue.pop().map(|candidate| candidate.sequence)
    }

    #[test]
    fn test_repeating_view_yields_to_farther_view() {
        let corridor = Candidate {
            repeating: true,
            z_min: 1.0,
            ..candidate(0)
        };
        let far = Candidate {
            z_min: 5.0,
            depth: 3,
            ..candidate(1)
        };

        assert_eq!(visited_first([corridor, far]), Some(1));
    }

    #[test]
    fn test_focus_breaks_distance_ties_only() {
        let out_of_focus = Candidate {
            out_of_focus: true,
            z_min: 2.0,
            ..candidate(0)
        };
        let deeper_in_focus = Candidate {
            z_min: 2.0,
            depth: 2,
            ..candidate(1)
        };
        assert_eq!(visited_first([out_of_focus, deeper_in_focus]), Some(1));

        let closer_out_of_focus = Candidate {
            z_min: 1.0,
            ..out_of_focus
        };
        assert_eq!(visited_first([closer_out_of_focus, deeper_in_focus]), Some(0));
    }

    #[test]
    fn test_required_depth_beats_closer_view() {
        let required = Candidate {
            z_min: 8.0,
            depth: 2,
            ..candidate(0)
        };
        let closer = Candidate {
            tier: 1,
            z_min: 1.0,
            depth: 3,
            ..candidate(1)
        };

        assert_eq!(visited_first([required, closer]), Some(0));
    }

    #[test]
    fn test_required_depth_tiers_follow_min_depth() {
        let (world, a, _b, eyes) = corridor();
        let renderers = [Surface::new(a)];
        let mut tree = RenderTree::default();
        let budget = RenderBudget {
            min_depth: 2,
            max_renders: 2,
            ..budget(RenderAlgorithm::RequiredDepth)
        };

        build_render_tree(&mut tree, eyes, &renderers, &world, &budget);

        let first = tree.child_for(NodeId::ROOT, a).unwrap();
        let second = tree.child_for(first, a).unwrap();
        let third = tree.child_for(second, a).unwrap();
        assert!(tree.get(first).unwrap().is_valid);
        assert!(tree.get(second).unwrap().is_valid);
        assert!(tree.get(third).unwrap().truncated);
    }
}

use bevy::math::Affine3A;
use bevy::prelude::*;

use super::window::CullingWindow;
use crate::portal::PortalTransform;

/// Handle to a node inside one `RenderTree`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// The synthesized root view
    pub const ROOT: Self = Self(0);

    /// Position in the arena
    pub const fn index(self) -> usize { self.0 as usize }
}

/// One eye's camera state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeView {
    /// Camera frame
    pub camera_to_world: Affine3A,
    /// View matrix
    pub world_to_camera: Affine3A,
    /// Projection
    pub clip_from_view:  Mat4,
}

impl EyeView {
    /// An eye at `camera_to_world`
    pub fn new(camera_to_world: Affine3A, clip_from_view: Mat4) -> Self {
        Self {
            camera_to_world,
            world_to_camera: PortalTransform::new(camera_to_world).inverse().matrix(),
            clip_from_view,
        }
    }

    /// Eye position
    pub fn position(&self) -> Vec3 { self.camera_to_world.translation.into() }

    /// The same eye seen through a portal
    #[must_use]
    pub fn through(&self, teleport: &PortalTransform) -> Self {
        Self::new(teleport.modify_matrix(&self.camera_to_world), self.clip_from_view)
    }
}

/// Mono or stereo camera state of a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eyes {
    /// A single camera
    Mono(EyeView),
    /// A head mounted pair
    Stereo {
        /// Left eye
        left:  EyeView,
        /// Right eye
        right: EyeView,
    },
}

impl Default for Eyes {
    fn default() -> Self { Self::Mono(EyeView::new(Affine3A::IDENTITY, Mat4::IDENTITY)) }
}

impl Eyes {
    /// Every eye
    pub fn views(&self) -> impl Iterator<Item = &EyeView> {
        let (first, second) = match self {
            Self::Mono(view) => (view, None),
            Self::Stereo { left, right } => (left, Some(right)),
        };
        std::iter::once(first).chain(second)
    }

    /// Center between the eyes
    pub fn position(&self) -> Vec3 {
        match self {
            Self::Mono(view) => view.position(),
            Self::Stereo { left, right } => (left.position() + right.position()) * 0.5,
        }
    }

    /// Every eye seen through a portal
    #[must_use]
    pub fn through(&self, teleport: &PortalTransform) -> Self {
        match self {
            Self::Mono(view) => Self::Mono(view.through(teleport)),
            Self::Stereo { left, right } => Self::Stereo {
                left:  left.through(teleport),
                right: right.through(teleport),
            },
        }
    }
}

/// One virtual viewpoint: the camera as seen after a chain of portal crossings
#[derive(Debug, Clone, Default)]
pub struct RenderNode {
    /// `None` only for the root
    pub parent:     Option<NodeId>,
    /// Discovered children, one per portal visible from this view
    pub children:   Vec<NodeId>,
    /// Portal crossings from the real camera
    pub depth:      usize,
    /// Portal whose view this node is; `None` for the root
    pub portal:     Option<Entity>,
    /// Screen region, clamped to the parent's
    pub window:     CullingWindow,
    /// Virtual camera state, set once visited
    pub eyes:       Eyes,
    /// Accumulated transform from the real camera's space into this view's
    pub teleport:   PortalTransform,
    /// World plane `(normal, d)` hiding everything between the virtual camera and the exit portal
    pub clip_plane: Option<Vec4>,
    /// Visited with a usable window and matrices
    pub is_valid:   bool,
    /// Matrices computed
    pub visited:    bool,
    /// Discovered but cut off by the depth or render budget
    pub truncated:  bool,
}

/// Arena of render nodes, reused frame after frame.
///
/// Nodes are addressed by `NodeId`; resetting keeps every slot and its child
/// list allocation for the next build.
#[derive(Debug, Default)]
pub struct RenderTree {
    nodes:     Vec<RenderNode>,
    len:       usize,
    allocated: usize,
    reused:    usize,
}

impl RenderTree {
    /// Drops every node and synthesizes a root for `eyes`
    pub fn reset(&mut self, eyes: Eyes) {
        self.len = 0;
        self.alloc(RenderNode {
            eyes,
            visited: true,
            is_valid: true,
            ..default()
        });
    }

    /// Adds `node` under `parent`
    pub fn add_child(&mut self, parent: NodeId, mut node: RenderNode) -> NodeId {
        node.parent = Some(parent);
        let id = self.alloc(node);
        if let Some(parent) = self.nodes.get_mut(parent.index()) {
            parent.children.push(id);
        }
        id
    }

    fn alloc(&mut self, mut node: RenderNode) -> NodeId {
        #[allow(clippy::cast_possible_truncation, reason = "trees stay far below u32::MAX nodes")]
        let id = NodeId(self.len as u32);
        if let Some(slot) = self.nodes.get_mut(self.len) {
            let mut children = std::mem::take(&mut slot.children);
            children.clear();
            node.children = children;
            *slot = node;
            self.reused += 1;
        } else {
            self.nodes.push(node);
            self.allocated += 1;
        }
        self.len += 1;
        id
    }

    /// Looks up a node of the current build
    pub fn get(&self, id: NodeId) -> Option<&RenderNode> { self.nodes[..self.len].get(id.index()) }

    /// Mutable lookup
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut RenderNode> {
        self.nodes[..self.len].get_mut(id.index())
    }

    /// The root view, when built
    pub fn root(&self) -> Option<&RenderNode> { self.get(NodeId::ROOT) }

    /// Child of `parent` through `portal`
    pub fn child_for(&self, parent: NodeId, portal: Entity) -> Option<NodeId> {
        self.get(parent)?
            .children
            .iter()
            .copied()
            .find(|child| self.get(*child).is_some_and(|node| node.portal == Some(portal)))
    }

    /// Nodes of the current build with their ids
    #[allow(clippy::cast_possible_truncation, reason = "indices came from u32 ids")]
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &RenderNode)> {
        self.nodes[..self.len]
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId(index as u32), node))
    }

    /// Nodes in the current build
    pub const fn len(&self) -> usize { self.len }

    /// `true` before the first build
    pub const fn is_empty(&self) -> bool { self.len == 0 }

    /// Visited nodes other than the root
    pub fn visited_count(&self) -> usize {
        self.iter().filter(|(id, node)| *id != NodeId::ROOT && node.visited).count()
    }

    /// Slots created since the tree was made
    pub const fn allocated(&self) -> usize { self.allocated }

    /// Slots handed out again after a reset
    pub const fn reused(&self) -> usize { self.reused }

    /// `true` when the portal pair `parent.portal → portal` already occurs
    /// above `parent`, the signature of an endless corridor
    pub fn is_repeating(&self, parent: NodeId, portal: Entity) -> bool {
        let Some(parent_portal) = self.get(parent).and_then(|node| node.portal) else {
            return false;
        };
        let mut current = self
            .get(parent)
            .and_then(|node| node.parent.map(|up| (up, parent_portal)));
        while let Some((ancestor, child_portal)) = current {
            let Some(node) = self.get(ancestor) else {
                break;
            };
            if node.portal == Some(parent_portal) && child_portal == portal {
                return true;
            }
            current = node.portal.and_then(|own| node.parent.map(|up| (up, own)));
        }
        false
    }
}

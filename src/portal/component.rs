use avian3d::prelude::*;
use bevy::platform::collections::HashMap;
use bevy::prelude::*;

use crate::aabb::Aabb;

/// One half of a linked pair. Anything crossing the transition plane (local
/// `-Z` side) of this portal comes out of `connected`.
///
/// Links must be symmetric; a one-sided link is treated as unlinked.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
#[require(Transform, PortalSurface)]
pub struct Portal {
    /// The other half of the pair
    pub connected:     Option<Entity>,
    /// Whether crossing the transition plane teleports portables
    pub uses_teleport: bool,
    /// Whether the portal's `PortalLayer` remaps collision layers
    pub uses_layers:   bool,
    /// Collision layer remapping for things passing through
    pub layers:        LayerTable,
    /// Tag remapping for things passing through
    pub tags:          TagTable,
}

impl Default for Portal {
    fn default() -> Self {
        Self {
            connected:     None,
            uses_teleport: true,
            uses_layers:   true,
            layers:        LayerTable::default(),
            tags:          TagTable::default(),
        }
    }
}

impl Portal {
    /// A portal linked to `connected`; the other side must link back
    pub fn linked_to(connected: Entity) -> Self {
        Self {
            connected: Some(connected),
            ..default()
        }
    }
}

/// The visible surface of a portal in its local space, used for culling
/// windows and as the clipping plane of views through it
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct PortalSurface {
    /// Local bounds of the surface; `z = 0` is the transition plane
    pub bounds:             Aabb,
    /// Render layer the surface draws on
    pub render_layer:       usize,
    /// Caps recursion through this portal below the global maximum
    pub max_depth_override: Option<usize>,
}

/// Marks a collider whose hits count as hitting a portal surface
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct PortalSurfaceCollider {
    /// The portal this collider belongs to
    pub portal: Entity,
}

/// Collision layer index remapping. Layers without an entry pass through unchanged.
#[derive(Reflect, Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerTable {
    entries: HashMap<u32, u32>,
}

impl LayerTable {
    /// Adds a mapping, builder style
    #[must_use]
    pub fn with(mut self, from: u32, to: u32) -> Self {
        self.entries.insert(from, to);
        self
    }

    /// Layer index on the far side
    pub fn modify_layer(&self, layer: u32) -> u32 {
        self.entries.get(&layer).copied().unwrap_or(layer)
    }

    /// Layer index on the near side, the reverse lookup of `modify_layer`
    pub fn inverse_layer(&self, layer: u32) -> u32 {
        self.entries
            .iter()
            .filter(|(_, to)| **to == layer)
            .map(|(from, _)| *from)
            .min()
            .unwrap_or(layer)
    }

    /// Remaps every set bit of `mask`
    pub fn modify_mask(&self, mask: LayerMask) -> LayerMask {
        self.remap_bits(mask, |layer| self.modify_layer(layer))
    }

    /// Remaps every set bit of `mask` in reverse
    pub fn inverse_mask(&self, mask: LayerMask) -> LayerMask {
        self.remap_bits(mask, |layer| self.inverse_layer(layer))
    }

    /// Remaps both memberships and filters
    pub fn modify_collision_layers(&self, layers: CollisionLayers) -> CollisionLayers {
        if self.entries.is_empty() {
            return layers;
        }
        CollisionLayers {
            memberships: self.modify_mask(layers.memberships),
            filters:     self.modify_mask(layers.filters),
        }
    }

    fn remap_bits(&self, mask: LayerMask, map: impl Fn(u32) -> u32) -> LayerMask {
        if self.entries.is_empty() {
            return mask;
        }
        let bits = (0..32)
            .filter(|layer| mask.0 & (1 << layer) != 0)
            .map(map)
            .filter(|layer| *layer < 32)
            .fold(0_u32, |bits, layer| bits | (1 << layer));
        LayerMask(bits)
    }
}

/// Tag remapping. Tags without an entry pass through unchanged.
#[derive(Reflect, Debug, Clone, Default, PartialEq, Eq)]
pub struct TagTable {
    entries: HashMap<String, String>,
}

impl TagTable {
    /// Adds a mapping, builder style
    #[must_use]
    pub fn with(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.entries.insert(from.into(), to.into());
        self
    }

    /// Tag on the far side
    pub fn modify_tag<'a>(&'a self, tag: &'a str) -> &'a str {
        self.entries.get(tag).map_or(tag, String::as_str)
    }

    /// Tag on the near side, the reverse lookup of `modify_tag`
    pub fn inverse_tag<'a>(&'a self, tag: &'a str) -> &'a str {
        self.entries
            .iter()
            .filter(|(_, to)| to.as_str() == tag)
            .map(|(from, _)| from.as_str())
            .min()
            .unwrap_or(tag)
    }
}

use bevy::math::Affine3A;
use bevy::prelude::*;

use crate::constants::RENDER_BEHIND_EPSILON;
use crate::constants::RENDER_NEAR_DEPTH;

/// Screen region a portal covers: x/y in normalized device coordinates,
/// z as linear view depth in front of the camera.
///
/// Windows of nested views are clamped to their parent. Depth is only bounded
/// from the near side: a nested portal may lie further away than its parent
/// but never nearer.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct CullingWindow {
    /// Left edge
    pub x_min: f32,
    /// Right edge
    pub x_max: f32,
    /// Bottom edge
    pub y_min: f32,
    /// Top edge
    pub y_max: f32,
    /// Nearest view depth
    pub z_min: f32,
    /// Furthest view depth
    pub z_max: f32,
}

impl Default for CullingWindow {
    fn default() -> Self { Self::FULL }
}

impl CullingWindow {
    /// The whole screen at every depth
    pub const FULL: Self = Self {
        x_min: -1.0,
        x_max: 1.0,
        y_min: -1.0,
        y_max: 1.0,
        z_min: 0.0,
        z_max: f32::INFINITY,
    };

    /// `false` for empty windows
    pub fn is_valid(&self) -> bool {
        self.x_min <= self.x_max && self.y_min <= self.y_max && self.z_min <= self.z_max
    }

    /// Whether anything inside `self` can be seen through `outer`
    pub fn is_visible_through(&self, outer: &Self) -> bool {
        self.x_min <= outer.x_max
            && self.x_max >= outer.x_min
            && self.y_min <= outer.y_max
            && self.y_max >= outer.y_min
            && self.z_max >= outer.z_min
    }

    /// The part of `self` seen through `outer`
    #[must_use]
    pub fn clamped(&self, outer: &Self) -> Self {
        Self {
            x_min: self.x_min.max(outer.x_min),
            x_max: self.x_max.min(outer.x_max),
            y_min: self.y_min.max(outer.y_min),
            y_max: self.y_max.min(outer.y_max),
            z_min: self.z_min.max(outer.z_min),
            z_max: self.z_max,
        }
    }

    /// Smallest window covering both
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            x_min: self.x_min.min(other.x_min),
            x_max: self.x_max.max(other.x_max),
            y_min: self.y_min.min(other.y_min),
            y_max: self.y_max.max(other.y_max),
            z_min: self.z_min.min(other.z_min),
            z_max: self.z_max.max(other.z_max),
        }
    }

    /// `true` when `inner` lies within `self` on screen and no nearer
    pub fn contains(&self, inner: &Self) -> bool {
        inner.x_min >= self.x_min
            && inner.x_max <= self.x_max
            && inner.y_min >= self.y_min
            && inner.y_max <= self.y_max
            && inner.z_min >= self.z_min
    }

    /// `true` when the screen point lies inside the window
    pub fn contains_point(&self, point: Vec2) -> bool {
        (self.x_min..=self.x_max).contains(&point.x) && (self.y_min..=self.y_max).contains(&point.y)
    }

    /// Window of `corners` seen by a camera.
    ///
    /// Corners behind the camera cannot be projected, so any such corner
    /// widens the window to the full screen starting at the near plane. All
    /// corners behind, or a projection entirely off screen, gives `None`.
    pub fn from_corners(
        corners: &[Vec3],
        world_to_camera: &Affine3A,
        clip_from_view: &Mat4,
    ) -> Option<Self> {
        let mut window = Self {
            x_min: f32::INFINITY,
            x_max: f32::NEG_INFINITY,
            y_min: f32::INFINITY,
            y_max: f32::NEG_INFINITY,
            z_min: f32::INFINITY,
            z_max: f32::NEG_INFINITY,
        };
        let mut behind = 0;

        for corner in corners {
            let view = world_to_camera.transform_point3(*corner);
            let clip = *clip_from_view * view.extend(1.0);
            let depth = -view.z;
            window.z_max = window.z_max.max(depth);

            if clip.w <= RENDER_BEHIND_EPSILON {
                behind += 1;
                continue;
            }
            let ndc = clip.truncate().truncate() / clip.w;
            window.x_min = window.x_min.min(ndc.x);
            window.x_max = window.x_max.max(ndc.x);
            window.y_min = window.y_min.min(ndc.y);
            window.y_max = window.y_max.max(ndc.y);
            window.z_min = window.z_min.min(depth);
        }

        if behind == corners.len() {
            return None;
        }
        if behind > 0 {
            window.x_min = -1.0;
            window.x_max = 1.0;
            window.y_min = -1.0;
            window.y_max = 1.0;
            window.z_min = RENDER_NEAR_DEPTH;
        }

        let window = window.clamped(&Self {
            z_min: RENDER_NEAR_DEPTH,
            ..Self::FULL
        });
        window.is_valid().then_some(window)
    }
}

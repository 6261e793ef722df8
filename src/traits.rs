use bevy::math::Affine3A;
use bevy::prelude::*;

use crate::portal::look_rotation;

/// Decomposition helpers that never produce NaN, even for collapsed frames
pub trait AffineExt {
    /// Bevy's forward, `-Z`
    fn forward(&self) -> Vec3;
    /// Rotation of the frame with scale removed, identity when it cannot be recovered
    fn rotation(&self) -> Quat;
}

impl AffineExt for Affine3A {
    fn forward(&self) -> Vec3 { self.transform_vector3(Vec3::NEG_Z).normalize_or_zero() }

    fn rotation(&self) -> Quat {
        look_rotation(
            self.transform_vector3(Vec3::Z),
            self.transform_vector3(Vec3::Y),
        )
        .unwrap_or(Quat::IDENTITY)
    }
}

/// Extension trait for `usize` to provide safe f32 conversion for small counts
pub trait UsizeExt {
    /// Converts `usize` to `f32` (safe for values < 16 million)
    fn to_f32(self) -> f32;
}

impl UsizeExt for usize {
    #[inline]
    #[allow(clippy::cast_precision_loss, reason = "counts stay tiny")]
    fn to_f32(self) -> f32 { self as f32 }
}

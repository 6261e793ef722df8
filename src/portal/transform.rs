use std::f32::consts::PI;

use bevy::math::Affine3A;
use bevy::math::Mat3;
use bevy::math::Quat;
use bevy::math::Vec3;
use bevy::prelude::Transform;

use crate::constants::DEGENERATE_DETERMINANT_EPSILON;

/// The affine map a portal applies to anything passing through it.
///
/// `matrix` carries values from the portal's side into the connected portal's
/// side, `inverse` carries them back. A singular `matrix` gets a zero `inverse`
/// so degenerate portals produce meaningless but finite results instead of NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalTransform {
    matrix:  Affine3A,
    inverse: Affine3A,
}

impl Default for PortalTransform {
    fn default() -> Self { Self::IDENTITY }
}

impl PortalTransform {
    /// The transform of an unlinked portal - every modification is a no-op
    pub const IDENTITY: Self = Self {
        matrix:  Affine3A::IDENTITY,
        inverse: Affine3A::IDENTITY,
    };

    /// Wraps a teleport matrix, computing its inverse once
    pub fn new(matrix: Affine3A) -> Self {
        Self {
            matrix,
            inverse: safe_inverse(&matrix),
        }
    }

    /// Teleport matrix from `source` portal frame into `destination` portal frame.
    ///
    /// Entering the front of `source` means leaving through the front of
    /// `destination`, so the source-local frame is turned half way round Y
    /// before being placed at the destination.
    pub fn between(source: &Affine3A, destination: &Affine3A) -> Self {
        Self::new(*destination * Affine3A::from_rotation_y(PI) * safe_inverse(source))
    }

    /// The forward teleport matrix
    pub const fn matrix(&self) -> Affine3A { self.matrix }

    /// The transform going the other way through the portal
    #[must_use]
    pub const fn inverse(&self) -> Self {
        Self {
            matrix:  self.inverse,
            inverse: self.matrix,
        }
    }

    /// `true` when the matrix collapses at least one axis
    pub fn is_degenerate(&self) -> bool {
        self.matrix.matrix3.determinant().abs() <= DEGENERATE_DETERMINANT_EPSILON
    }

    /// Composes `self` after `first`: the result teleports through `first`, then `self`
    #[must_use]
    pub fn after(&self, first: &Self) -> Self {
        Self {
            matrix:  self.matrix * first.matrix,
            inverse: first.inverse * self.inverse,
        }
    }

    /// Homogeneous point transform
    pub fn modify_point(&self, point: Vec3) -> Vec3 { self.matrix.transform_point3(point) }

    /// Linear part only, no translation
    pub fn modify_vector(&self, vector: Vec3) -> Vec3 { self.matrix.transform_vector3(vector) }

    /// Like `modify_vector` but renormalized; zero when the matrix collapses it
    pub fn modify_direction(&self, direction: Vec3) -> Vec3 {
        self.modify_vector(direction).normalize_or_zero()
    }

    /// Rotates `rotation` through the portal by re-deriving it from its
    /// transformed forward and up axes. Scale in the matrix is discarded and
    /// the result is always a proper rotation. Falls back to the input when
    /// the matrix flattens either axis.
    pub fn modify_rotation(&self, rotation: Quat) -> Quat {
        let forward = self.modify_vector(rotation * Vec3::Z);
        let up = self.modify_vector(rotation * Vec3::Y);
        look_rotation(forward, up).unwrap_or(rotation)
    }

    /// Per-axis scale factor of the teleport matrix
    pub fn scale_factor(&self) -> Vec3 {
        Vec3::new(
            self.matrix.matrix3.x_axis.length(),
            self.matrix.matrix3.y_axis.length(),
            self.matrix.matrix3.z_axis.length(),
        )
    }

    /// Object scale after passing through
    pub fn modify_scale(&self, scale: Vec3) -> Vec3 { scale * self.scale_factor() }

    /// How much a length measured along `direction` grows passing through
    pub fn length_scale(&self, direction: Vec3) -> f32 {
        self.modify_vector(direction.normalize_or_zero()).length()
    }

    /// Places a whole local-to-world frame on the far side
    pub fn modify_matrix(&self, local_to_world: &Affine3A) -> Affine3A {
        self.matrix * *local_to_world
    }

    /// Teleports a whole `Transform`, keeping translation, rotation and scale consistent
    pub fn modify_transform(&self, transform: &Transform) -> Transform {
        Transform {
            translation: self.modify_point(transform.translation),
            rotation:    self.modify_rotation(transform.rotation),
            scale:       self.modify_scale(transform.scale),
        }
    }
}

/// Rotation whose +Z points along `forward` with +Y as close to `up` as possible
pub fn look_rotation(forward: Vec3, up: Vec3) -> Option<Quat> {
    let forward = forward.try_normalize()?;
    let right = up.cross(forward).try_normalize()?;
    let up = forward.cross(right);
    Some(Quat::from_mat3(&Mat3::from_cols(right, up, forward)).normalize())
}

fn safe_inverse(matrix: &Affine3A) -> Affine3A {
    if matrix.matrix3.determinant().abs() <= DEGENERATE_DETERMINANT_EPSILON {
        Affine3A::ZERO
    } else {
        matrix.inverse()
    }
}

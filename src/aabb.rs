use bevy::math::Affine3A;
use bevy::prelude::*;

/// Axis aligned bounds in some local space
#[derive(Component, Debug, Clone, Copy, Reflect, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Default for Aabb {
    /// A 2x2 quad lying in the local XY plane - the usual shape of a portal surface
    fn default() -> Self {
        Self {
            min: Vec3::new(-1.0, -1.0, 0.0),
            max: Vec3::new(1.0, 1.0, 0.0),
        }
    }
}

impl Aabb {
    /// Bounds spanning `half_extents` either side of the origin
    pub fn from_half_extents(half_extents: Vec3) -> Self {
        Self {
            min: -half_extents,
            max: half_extents,
        }
    }

    /// Edge lengths
    pub fn size(&self) -> Vec3 { self.max - self.min }

    /// Midpoint
    pub fn center(&self) -> Vec3 { (self.min + self.max) / 2.0 }

    /// Longest edge
    pub fn max_dimension(&self) -> f32 {
        let size = self.size();
        size.x.max(size.y).max(size.z)
    }

    /// `true` when `point` lies inside or on the bounds
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// All eight corners; flat bounds repeat corners, which callers tolerate
    pub fn corners(&self) -> [Vec3; 8] {
        let (min, max) = (self.min, self.max);
        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ]
    }

    /// Corners carried into another space by `local_to_world`
    pub fn world_corners(&self, local_to_world: &Affine3A) -> [Vec3; 8] {
        self.corners()
            .map(|corner| local_to_world.transform_point3(corner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_flat_quad() {
        let aabb = Aabb::default();

        assert_eq!(aabb.size(), Vec3::new(2.0, 2.0, 0.0));
        assert_eq!(aabb.max_dimension(), 2.0);
        assert!(aabb.contains(Vec3::new(0.5, -0.5, 0.0)));
        assert!(!aabb.contains(Vec3::new(0.5, -0.5, 0.1)));
    }

    #[test]
    fn test_world_corners_follow_transform() {
        let aabb = Aabb::from_half_extents(Vec3::ONE);
        let corners = aabb.world_corners(&Affine3A::from_translation(Vec3::new(5.0, 0.0, 0.0)));

        assert_eq!(corners[0], Vec3::new(4.0, -1.0, -1.0));
        assert_eq!(corners[7], Vec3::new(6.0, 1.0, 1.0));
    }
}

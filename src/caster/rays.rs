use avian3d::prelude::LayerMask;
use bevy::math::Affine3A;
use bevy::prelude::*;

use super::shape::CastFilter;
use super::shape::CastHit;
use super::shape::CastShape;
use super::shape::PhysicsCaster;
use super::shape::TriggerQuery;
use crate::constants::CASTER_SURFACE_OFFSET;
use crate::portal::PortalWorld;
use crate::traits::AffineExt;

/// One straight segment of a cast that may have bent through portals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalRay {
    /// Frame the segment starts from; its forward is the cast direction
    pub origin:         Affine3A,
    /// Unit cast direction
    pub direction:      Vec3,
    /// Length of this segment in its own space
    pub local_distance: f32,
    /// Shape swept along this segment, already scaled into this space
    pub shape:          CastShape,
    /// The portal the segment ended on, `None` for the last segment
    pub from_portal:    Option<Entity>,
}

impl PortalRay {
    /// Where the segment starts
    pub fn start(&self) -> Vec3 { self.origin.translation.into() }

    /// Where the segment stops
    pub fn end(&self) -> Vec3 { self.start() + self.direction * self.local_distance }
}

/// How far and through which portals a cast may travel
#[derive(Debug, Clone, Copy)]
pub struct RayLimits {
    /// Total distance, measured in the space the cast starts in
    pub max_distance:   f32,
    /// Portal crossings allowed
    pub max_recursions: usize,
    /// Layers that block the cast; portal surfaces must be on one of them
    pub layer_mask:     LayerMask,
}

/// Splits a cast from `origin` along its forward into segments, bending at
/// every linked portal hit from the front.
///
/// Each crossing scales the remaining distance and the shape by the portal's
/// length scale along the cast direction. The exit portal is ignored by the
/// next segment so the cast cannot immediately hit it from behind. Returns the
/// number of segments written into `rays`.
pub fn get_rays(
    caster: &impl PhysicsCaster,
    world: &PortalWorld,
    shape: CastShape,
    origin: &Affine3A,
    limits: &RayLimits,
    rays: &mut Vec<PortalRay>,
) -> usize {
    rays.clear();

    let mut frame = *origin;
    let mut shape = shape;
    let mut remaining = limits.max_distance;
    let mut recursions = limits.max_recursions;
    let mut exit: Option<Entity> = None;

    while remaining > 0.0 {
        let Ok(direction) = Dir3::new(frame.forward()) else {
            break;
        };
        let start: Vec3 = frame.translation.into();
        let filter = CastFilter::from_mask(limits.layer_mask)
            .with_excluded(exit.into_iter().flat_map(|exit| world.colliders_of(exit)));

        let hit = caster.cast(&shape, start, frame.rotation(), direction, remaining, &filter);
        let crossing = hit
            .as_ref()
            .and_then(|hit| world.portal_for_collider(hit.entity))
            .filter(|portal| recursions > 0 && world.is_linked(*portal))
            .and_then(|portal| world.get(portal))
            .filter(|portal| direction.dot(portal.normal()) < 0.0);

        let (Some(hit), Some(portal)) = (hit, crossing) else {
            rays.push(PortalRay {
                origin: frame,
                direction: direction.as_vec3(),
                local_distance: hit.map_or(remaining, |hit| hit.distance),
                shape,
                from_portal: None,
            });
            return rays.len();
        };

        rays.push(PortalRay {
            origin: frame,
            direction: direction.as_vec3(),
            local_distance: hit.distance,
            shape,
            from_portal: Some(portal.entity),
        });

        let mut at_hit = frame;
        at_hit.translation = (start + direction.as_vec3() * hit.distance).into();
        let scale = portal.teleport.length_scale(direction.as_vec3());

        frame = portal.teleport.modify_matrix(&at_hit);
        remaining = (remaining - hit.distance) * scale;
        shape = shape.scaled(scale);
        recursions -= 1;
        exit = world.connected(portal.entity).map(|connected| connected.entity);
    }

    // ran out of distance exactly on a portal
    if rays.last().is_some_and(|ray| ray.from_portal.is_some()) {
        rays.push(PortalRay {
            origin: frame,
            direction: frame.forward(),
            local_distance: 0.0,
            shape,
            from_portal: None,
        });
    }
    rays.len()
}

/// Casts along precomputed `rays`, ignoring portal surfaces, and returns the
/// first hit together with the index of the segment it happened on
pub fn cast(
    caster: &impl PhysicsCaster,
    world: &PortalWorld,
    rays: &[PortalRay],
    layer_mask: LayerMask,
    triggers: TriggerQuery,
) -> Option<(CastHit, usize)> {
    let filter = CastFilter::from_mask(layer_mask)
        .with_excluded(world.surface_colliders())
        .with_triggers(triggers);

    rays.iter().enumerate().find_map(|(index, ray)| {
        let direction = Dir3::new(ray.direction).ok()?;
        caster
            .cast(
                &ray.shape,
                ray.start(),
                ray.origin.rotation(),
                direction,
                ray.local_distance + CASTER_SURFACE_OFFSET,
                &filter,
            )
            .map(|hit| (hit, index))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::portal::test_support::approx_eq;
    use crate::portal::test_support::linked_pair;

    /// An in-memory scene of unit-scale quads and spheres
    #[derive(Default)]
    pub(crate) struct SceneCaster {
        pub(crate) quads:   Vec<(Entity, Affine3A, Vec2)>,
        pub(crate) spheres: Vec<(Entity, Vec3, f32)>,
    }

    impl SceneCaster {
        fn radius(shape: &CastShape) -> f32 { shape.bounding_radius() }
    }

    impl PhysicsCaster for SceneCaster {
        fn cast(
            &self,
            shape: &CastShape,
            origin: Vec3,
            _rotation: Quat,
            direction: Dir3,
            max_distance: f32,
            filter: &CastFilter,
        ) -> Option<CastHit> {
            let direction = direction.as_vec3();
            let quads = self.quads.iter().filter_map(|(entity, frame, half)| {
                let inverse = frame.inverse();
                let local_origin = inverse.transform_point3(origin);
                let local_direction = inverse.transform_vector3(direction);
                if local_direction.z.abs() < f32::EPSILON {
                    return None;
                }
                let distance = -local_origin.z / local_direction.z;
                let local_hit = local_origin + local_direction * distance;
                let inside = local_hit.x.abs() <= half.x && local_hit.y.abs() <= half.y;
                let normal = frame.transform_vector3(Vec3::Z) * -local_direction.z.signum();
                (distance >= 0.0 && inside).then_some(CastHit {
                    entity: *entity,
                    point:  origin + direction * distance,
                    normal,
                    distance,
                })
            });

            let spheres = self.spheres.iter().filter_map(|(entity, center, radius)| {
                let radius = radius + Self::radius(shape);
                let to_center = *center - origin;
                let along = to_center.dot(direction);
                let squared = radius * radius - (to_center.length_squared() - along * along);
                if squared < 0.0 {
                    return None;
                }
                let distance = along - squared.sqrt();
                let point = origin + direction * distance;
                (distance >= 0.0).then_some(CastHit {
                    entity: *entity,
                    point,
                    normal: (point - *center).normalize_or_zero(),
                    distance,
                })
            });

            quads
                .chain(spheres)
                .filter(|hit| {
                    hit.distance <= max_distance && !filter.excluded.contains(&hit.entity)
                })
                .min_by(|a, b| a.distance.total_cmp(&b.distance))
        }

        fn overlap(
            &self,
            shape: &CastShape,
            position: Vec3,
            _rotation: Quat,
            filter: &CastFilter,
        ) -> Vec<Entity> {
            self.spheres
                .iter()
                .filter(|(entity, center, radius)| {
                    !filter.excluded.contains(entity)
                        && center.distance(position) <= radius + Self::radius(shape)
                })
                .map(|(entity, ..)| *entity)
                .collect()
        }
    }

    fn limits() -> RayLimits {
        RayLimits {
            max_distance:   1000.0,
            max_recursions: 8,
            layer_mask:     LayerMask::ALL,
        }
    }

    /// Scene with both portal quads and a ball in front of `b`
    fn scene() -> (World, PortalWorld, SceneCaster, Entity, Entity, Entity) {
        let (mut ecs, world, a, b) = linked_pair();
        let ball = ecs.spawn_empty().id();
        let mut caster = SceneCaster::default();
        for portal in [a, b] {
            if let Some(record) = world.get(portal) {
                caster.quads.push((portal, record.local_to_world, Vec2::ONE));
            }
        }
        caster.spheres.push((ball, Vec3::new(10.0, 0.0, 8.0), 1.0));
        (ecs, world, caster, a, b, ball)
    }

    #[test]
    fn test_ray_bends_through_portal() {
        let (_ecs, world, caster, a, _b, ball) = scene();
        let origin = Affine3A::from_translation(Vec3::new(0.0, 0.0, 5.0));
        let mut rays = Vec::new();

        let count = get_rays(&caster, &world, CastShape::Ray, &origin, &limits(), &mut rays);

        assert_eq!(count, 2);
        assert_eq!(rays[0].from_portal, Some(a));
        assert!((rays[0].local_distance - 5.0).abs() < 1e-4);
        assert!(approx_eq(rays[1].start(), Vec3::new(10.0, 0.0, 0.0)));
        assert!(approx_eq(rays[1].direction, Vec3::Z));
        assert_eq!(rays[1].from_portal, None);

        let (hit, segment) =
            cast(&caster, &world, &rays, LayerMask::ALL, TriggerQuery::Ignore).unwrap();
        assert_eq!(hit.entity, ball);
        assert_eq!(segment, 1);
        assert!(approx_eq(hit.point, Vec3::new(10.0, 0.0, 7.0)));
    }

    #[test]
    fn test_back_of_portal_blocks() {
        let (_ecs, world, caster, a, _b, _ball) = scene();
        let origin = Affine3A::from_rotation_translation(
            Quat::from_rotation_y(std::f32::consts::PI),
            Vec3::new(0.0, 0.0, -5.0),
        );
        let mut rays = Vec::new();

        get_rays(&caster, &world, CastShape::Ray, &origin, &limits(), &mut rays);

        assert_eq!(rays.len(), 1);
        assert_eq!(rays[0].from_portal, None);
        assert!((rays[0].local_distance - 5.0).abs() < 1e-4);
        let (hit, _) = cast(&caster, &world, &rays, LayerMask::ALL, TriggerQuery::Ignore)
            .map_or((None, 0), |(hit, index)| (Some(hit.entity), index));
        assert_ne!(hit, Some(a));
    }

    #[test]
    fn test_no_recursions_stops_at_portal() {
        let (_ecs, world, caster, _a, _b, _ball) = scene();
        let origin = Affine3A::from_translation(Vec3::new(0.0, 0.0, 5.0));
        let mut rays = Vec::new();
        let limits = RayLimits {
            max_recursions: 0,
            ..limits()
        };

        get_rays(&caster, &world, CastShape::Ray, &origin, &limits, &mut rays);

        assert_eq!(rays.len(), 1);
        assert_eq!(rays[0].from_portal, None);
    }

    #[test]
    fn test_distance_budget_spans_segments() {
        let (_ecs, world, caster, _a, _b, ball) = scene();
        let origin = Affine3A::from_translation(Vec3::new(0.0, 0.0, 5.0));
        let mut rays = Vec::new();
        let limits = RayLimits {
            max_distance: 8.0,
            ..limits()
        };

        get_rays(&caster, &world, CastShape::Ray, &origin, &limits, &mut rays);

        assert_eq!(rays.len(), 2);
        assert!((rays[1].local_distance - 3.0).abs() < 1e-4);
        // the ball is 6 past the portal, out of reach
        let hit = cast(&caster, &world, &rays, LayerMask::ALL, TriggerQuery::Ignore);
        assert!(hit.is_none_or(|(hit, _)| hit.entity != ball));
    }
}

use avian3d::prelude::*;
use bevy::ecs::system::SystemParam;
use bevy::prelude::*;

use super::shape::CastFilter;
use super::shape::CastHit;
use super::shape::CastShape;
use super::shape::PhysicsCaster;
use super::shape::TriggerQuery;

/// `PhysicsCaster` backed by avian's spatial query pipeline
#[derive(SystemParam)]
pub struct AvianCaster<'w, 's> {
    spatial: SpatialQuery<'w, 's>,
    sensors: Query<'w, 's, (), With<Sensor>>,
}

impl AvianCaster<'_, '_> {
    fn accepts(&self, entity: Entity, filter: &CastFilter) -> bool {
        filter.triggers == TriggerQuery::Collide || !self.sensors.contains(entity)
    }
}

fn spatial_filter(filter: &CastFilter) -> SpatialQueryFilter {
    SpatialQueryFilter::from_mask(filter.mask)
        .with_excluded_entities(filter.excluded.iter().copied())
}

impl PhysicsCaster for AvianCaster<'_, '_> {
    fn cast(
        &self,
        shape: &CastShape,
        origin: Vec3,
        rotation: Quat,
        direction: Dir3,
        max_distance: f32,
        filter: &CastFilter,
    ) -> Option<CastHit> {
        let query_filter = spatial_filter(filter);
        let predicate = |entity: Entity| self.accepts(entity, filter);

        match shape.collider() {
            None => self
                .spatial
                .cast_ray_predicate(
                    origin,
                    direction,
                    max_distance,
                    true,
                    &query_filter,
                    &predicate,
                )
                .map(|hit| CastHit {
                    entity:   hit.entity,
                    point:    origin + direction.as_vec3() * hit.distance,
                    normal:   hit.normal,
                    distance: hit.distance,
                }),
            Some(collider) => self
                .spatial
                .cast_shape_predicate(
                    &collider,
                    origin,
                    rotation,
                    direction,
                    &ShapeCastConfig::from_max_distance(max_distance),
                    &query_filter,
                    &predicate,
                )
                .map(|hit| CastHit {
                    entity:   hit.entity,
                    point:    hit.point1,
                    normal:   hit.normal1,
                    distance: hit.distance,
                }),
        }
    }

    fn overlap(
        &self,
        shape: &CastShape,
        position: Vec3,
        rotation: Quat,
        filter: &CastFilter,
    ) -> Vec<Entity> {
        let query_filter = spatial_filter(filter);
        let mut hits = match shape.collider() {
            None => self.spatial.point_intersections(position, &query_filter),
            Some(collider) => {
                self.spatial
                    .shape_intersections(&collider, position, rotation, &query_filter)
            },
        };
        hits.retain(|entity| self.accepts(*entity, filter));
        hits
    }
}

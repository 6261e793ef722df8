use std::hash::Hash;

use bevy::ecs::entity::EntityHashMap;
use bevy::ecs::entity::EntityHashSet;
use bevy::platform::collections::HashMap;
use bevy::prelude::*;

/// A logical value gaining its first collider or losing its last one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent<V> {
    /// First collider of the value entered
    Added(V),
    /// Last collider of the value left
    Removed(V),
}

/// Reference counted overlap tracking.
///
/// Many colliders can belong to one logical value (all the volumes of one
/// portal, say). Events fire only when a value goes from zero colliders to one
/// and back. Colliders without a value are only counted.
#[derive(Debug, Clone)]
pub struct TriggerHandler<V> {
    colliders:  EntityHashMap<Option<V>>,
    counts:     HashMap<V, usize>,
    null_count: usize,
}

impl<V> Default for TriggerHandler<V> {
    fn default() -> Self {
        Self {
            colliders:  EntityHashMap::default(),
            counts:     HashMap::default(),
            null_count: 0,
        }
    }
}

impl<V: Copy + Eq + Hash> TriggerHandler<V> {
    /// Starts tracking `collider`. A collider already tracked keeps its
    /// original value and nothing fires.
    pub fn add(&mut self, collider: Entity, value: Option<V>) -> Option<TriggerEvent<V>> {
        if self.colliders.contains_key(&collider) {
            return None;
        }
        self.colliders.insert(collider, value);

        let Some(value) = value else {
            self.null_count += 1;
            return None;
        };
        let count = self.counts.entry(value).or_insert(0);
        *count += 1;
        (*count == 1).then_some(TriggerEvent::Added(value))
    }

    /// Stops tracking `collider`
    pub fn remove(&mut self, collider: Entity) -> Option<TriggerEvent<V>> {
        let value = self.colliders.remove(&collider)?;
        let Some(value) = value else {
            self.null_count = self.null_count.saturating_sub(1);
            return None;
        };
        let count = self.counts.get_mut(&value)?;
        *count -= 1;
        if *count > 0 {
            return None;
        }
        self.counts.remove(&value);
        Some(TriggerEvent::Removed(value))
    }

    /// Brings the handler in line with the colliders overlapping this tick.
    /// Additions are applied before removals, so a value handed from one
    /// collider to another in the same tick never flickers out.
    pub fn reconcile(
        &mut self,
        current: impl IntoIterator<Item = (Entity, Option<V>)>,
    ) -> Vec<TriggerEvent<V>> {
        let mut present = EntityHashSet::default();
        let mut events: Vec<_> = current
            .into_iter()
            .filter_map(|(collider, value)| {
                present.insert(collider);
                self.add(collider, value)
            })
            .collect();

        let stale: Vec<Entity> = self
            .colliders
            .keys()
            .copied()
            .filter(|collider| !present.contains(collider))
            .collect();
        events.extend(stale.into_iter().filter_map(|collider| self.remove(collider)));
        events
    }

    /// Forgets everything, reporting every value as removed
    pub fn clear(&mut self) -> Vec<TriggerEvent<V>> {
        let removed = self.counts.keys().copied().map(TriggerEvent::Removed).collect();
        self.colliders.clear();
        self.counts.clear();
        self.null_count = 0;
        removed
    }

    /// Distinct values with at least one collider
    pub fn count(&self) -> usize { self.counts.len() }

    /// Tracked colliders without a value
    pub const fn null_count(&self) -> usize { self.null_count }

    /// `true` while `value` has at least one collider
    pub fn contains(&self, value: V) -> bool { self.counts.contains_key(&value) }

    /// Every value with at least one collider
    pub fn values(&self) -> impl Iterator<Item = V> + '_ { self.counts.keys().copied() }

    /// `true` when nothing is tracked
    pub fn is_empty(&self) -> bool { self.colliders.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colliders(count: usize) -> (World, Vec<Entity>) {
        let mut world = World::new();
        let entities = (0..count).map(|_| world.spawn_empty().id()).collect();
        (world, entities)
    }

    #[test]
    fn test_value_fires_once_for_two_colliders() {
        let (_world, c) = colliders(2);
        let mut handler = TriggerHandler::default();

        assert_eq!(handler.add(c[0], Some(7)), Some(TriggerEvent::Added(7)));
        assert_eq!(handler.add(c[1], Some(7)), None);
        assert_eq!(handler.count(), 1);

        assert_eq!(handler.remove(c[0]), None);
        assert!(handler.contains(7));
        assert_eq!(handler.remove(c[1]), Some(TriggerEvent::Removed(7)));
        assert_eq!(handler.count(), 0);
    }

    #[test]
    fn test_null_values_are_counted_separately() {
        let (_world, c) = colliders(2);
        let mut handler = TriggerHandler::<u32>::default();

        assert_eq!(handler.add(c[0], None), None);
        handler.add(c[1], Some(1));

        assert_eq!(handler.count(), 1);
        assert_eq!(handler.null_count(), 1);
        assert_eq!(handler.remove(c[0]), None);
        assert_eq!(handler.null_count(), 0);
    }

    #[test]
    fn test_reconcile_drops_missing_colliders() {
        let (_world, c) = colliders(3);
        let mut handler = TriggerHandler::default();
        handler.reconcile([(c[0], Some(1)), (c[1], Some(2))]);

        let events = handler.reconcile([(c[1], Some(2)), (c[2], Some(1))]);

        // value 1 moved from c0 to c2 without being removed
        assert!(events.is_empty());
        assert_eq!(handler.count(), 2);

        let events = handler.reconcile([]);
        assert_eq!(events.len(), 2);
        assert!(handler.is_empty());
    }

    #[test]
    fn test_remove_twice_is_a_no_op() {
        let (_world, c) = colliders(1);
        let mut handler = TriggerHandler::default();
        handler.add(c[0], Some(3));

        assert!(handler.remove(c[0]).is_some());
        assert!(handler.remove(c[0]).is_none());
    }
}

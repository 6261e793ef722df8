use bevy::prelude::*;

use super::pool::CloneHandle;
use super::pool::ClonePool;
use crate::portal::PortalTrace;

/// A portal the original is near enough to need a clone behind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloneCandidate {
    /// Portal the original would cross
    pub portal:   Entity,
    /// Distance from the original to the portal
    pub distance: f32,
}

/// What one `assign` changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneChanges {
    /// Handlers freshly taken from the pool
    pub acquired:   Vec<CloneHandle>,
    /// Handlers kept but pointed at another portal
    pub retargeted: Vec<CloneHandle>,
    /// Handlers given back to the pool
    pub released:   Vec<CloneHandle>,
}

impl CloneChanges {
    /// `true` when nothing changed
    pub const fn is_empty(&self) -> bool {
        self.acquired.is_empty() && self.retargeted.is_empty() && self.released.is_empty()
    }
}

/// The clones of one object, one per nearby portal up to a cap
#[derive(Debug, Clone, Default)]
pub struct CloneSet {
    max_clone_count: usize,
    pool:            ClonePool,
    assigned:        Vec<(Entity, CloneHandle)>,
}

impl CloneSet {
    /// An empty set allowing `max_clone_count` clones at once
    pub fn new(max_clone_count: usize) -> Self {
        Self {
            max_clone_count,
            ..default()
        }
    }

    /// Cap on clones alive at once
    pub const fn max_clone_count(&self) -> usize { self.max_clone_count }

    /// Changes the cap; the next `assign` applies it
    pub const fn set_max_clone_count(&mut self, max_clone_count: usize) {
        self.max_clone_count = max_clone_count;
    }

    /// Backing pool
    pub const fn pool(&self) -> &ClonePool { &self.pool }

    /// Mutable backing pool, for attaching entities to handlers
    pub const fn pool_mut(&mut self) -> &mut ClonePool { &mut self.pool }

    /// Portals with a clone and the handler serving each
    pub fn assigned(&self) -> &[(Entity, CloneHandle)] { &self.assigned }

    /// Handler serving `portal`
    pub fn handle_for(&self, portal: Entity) -> Option<CloneHandle> {
        self.assigned
            .iter()
            .find(|(assigned, _)| *assigned == portal)
            .map(|(_, handle)| *handle)
    }

    /// Gives clones to the closest candidates, up to the cap.
    ///
    /// Portals that keep their clone are untouched. Handlers of portals that
    /// dropped out are pointed at newly wanted portals before anything is
    /// taken from the pool; only the leftovers are released.
    pub fn assign(&mut self, candidates: &[CloneCandidate]) -> CloneChanges {
        let mut ranked = candidates.to_vec();
        ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        let mut wanted: Vec<Entity> = Vec::with_capacity(self.max_clone_count);
        for candidate in ranked {
            if wanted.len() == self.max_clone_count {
                break;
            }
            if !wanted.contains(&candidate.portal) {
                wanted.push(candidate.portal);
            }
        }

        let mut stale = Vec::new();
        self.assigned.retain(|(portal, handle)| {
            let keep = wanted.contains(portal);
            if !keep {
                stale.push(*handle);
            }
            keep
        });

        let mut changes = CloneChanges::default();
        for portal in wanted {
            if self.handle_for(portal).is_some() {
                continue;
            }
            let path = PortalTrace::from_portals([portal]);
            let handle = if let Some(handle) = stale.pop() {
                if let Some(handler) = self.pool.get_handler_mut(handle) {
                    handler.retarget(path);
                }
                changes.retargeted.push(handle);
                handle
            } else {
                let handle = self.pool.get(path);
                changes.acquired.push(handle);
                handle
            };
            self.assigned.push((portal, handle));
        }

        for handle in stale {
            if self.pool.release(handle) {
                changes.released.push(handle);
            }
        }
        changes
    }

    /// Follows the original through `from` into `to`.
    ///
    /// The clone that stood behind `from` already shows the object where it
    /// is now, so it moves to `to` and shows where it came from. Every other
    /// clone is released and reacquired by the next `assign` if still needed.
    pub fn on_teleported(&mut self, from: Entity, to: Entity) -> CloneChanges {
        let mut changes = CloneChanges::default();
        let promoted = self.handle_for(from);

        for (portal, handle) in std::mem::take(&mut self.assigned) {
            if Some(handle) == promoted {
                if let Some(handler) = self.pool.get_handler_mut(handle) {
                    handler.retarget(PortalTrace::from_portals([to]));
                }
                changes.retargeted.push(handle);
                self.assigned.push((to, handle));
            } else if self.pool.release(handle) {
                debug!("clone behind {portal} released after teleport");
                changes.released.push(handle);
            }
        }
        changes
    }

    /// Releases every clone
    pub fn release_all(&mut self) -> Vec<CloneHandle> {
        std::mem::take(&mut self.assigned)
            .into_iter()
            .filter_map(|(_, handle)| self.pool.release(handle).then_some(handle))
            .collect()
    }
}

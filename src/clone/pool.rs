use bevy::prelude::*;

use crate::portal::PortalTrace;

/// Index of a handler in its `ClonePool`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CloneHandle(usize);

impl CloneHandle {
    /// Slot index
    pub const fn index(self) -> usize { self.0 }
}

/// One mirrored part: an entity of the original and its counterpart in the clone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClonePart {
    /// Part of the original object
    pub original: Entity,
    /// Matching part of the clone
    pub clone:    Entity,
    /// `true` for the object root, which moves through the portal
    pub is_root:  bool,
}

/// Owns one clone hierarchy and the portal path it is seen through.
///
/// The entities are created once and kept across releases, so a handler
/// coming back from the pool only needs its path replaced.
#[derive(Debug, Clone, Default)]
pub struct CloneHandler {
    /// Clone root, `None` until the hierarchy has been spawned
    pub root:  Option<Entity>,
    /// Mirrored parts, root first
    pub parts: Vec<ClonePart>,
    /// Portals between the original and the clone
    pub path:  PortalTrace,
    active:    bool,
}

impl CloneHandler {
    /// `true` while the handler is handed out
    pub const fn is_active(&self) -> bool { self.active }

    /// Points the clone through a different path, keeping its entities
    pub fn retarget(&mut self, path: PortalTrace) { self.path = path; }

    /// The first portal of the path, the one the original is near
    pub fn portal(&self) -> Option<Entity> { self.path.first() }
}

/// Free-list pool of clone handlers.
///
/// Releasing a handle that is already free does nothing, so a release that
/// runs twice in one tick cannot hand the same handler out twice.
#[derive(Debug, Clone, Default)]
pub struct ClonePool {
    slots:    Vec<CloneHandler>,
    free:     Vec<usize>,
    gets:     usize,
    releases: usize,
}

impl ClonePool {
    /// Hands out a handler looking through `path`, reusing a released one if any
    pub fn get(&mut self, path: PortalTrace) -> CloneHandle {
        self.gets += 1;
        let index = self.free.pop().unwrap_or_else(|| {
            self.slots.push(CloneHandler::default());
            self.slots.len() - 1
        });
        let handler = &mut self.slots[index];
        handler.path = path;
        handler.active = true;
        CloneHandle(index)
    }

    /// Returns `handle` to the pool; `false` when it was not handed out
    pub fn release(&mut self, handle: CloneHandle) -> bool {
        let Some(handler) = self.slots.get_mut(handle.0).filter(|handler| handler.active) else {
            return false;
        };
        handler.active = false;
        handler.path.clear();
        self.free.push(handle.0);
        self.releases += 1;
        true
    }

    /// The handler behind `handle`, active or not
    pub fn get_handler(&self, handle: CloneHandle) -> Option<&CloneHandler> {
        self.slots.get(handle.0)
    }

    /// Mutable access to the handler behind `handle`
    pub fn get_handler_mut(&mut self, handle: CloneHandle) -> Option<&mut CloneHandler> {
        self.slots.get_mut(handle.0)
    }

    /// Every handler with its handle, active or not
    pub fn iter(&self) -> impl Iterator<Item = (CloneHandle, &CloneHandler)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, handler)| (CloneHandle(index), handler))
    }

    /// Handlers currently handed out
    pub fn active(&self) -> usize { self.slots.len() - self.free.len() }

    /// Handlers ever created
    pub fn allocated(&self) -> usize { self.slots.len() }

    /// Total calls to `get`
    pub const fn gets(&self) -> usize { self.gets }

    /// Total effective releases
    pub const fn releases(&self) -> usize { self.releases }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_is_reentrant() {
        let mut pool = ClonePool::default();
        let handle = pool.get(PortalTrace::default());

        assert!(pool.release(handle));
        assert!(!pool.release(handle));
        assert_eq!(pool.releases(), 1);
        assert_eq!(pool.active(), 0);

        let first = pool.get(PortalTrace::default());
        let second = pool.get(PortalTrace::default());
        assert_ne!(first, second);
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    fn test_reused_handler_keeps_entities() {
        let mut ecs = World::new();
        let portal = ecs.spawn_empty().id();
        let root = ecs.spawn_empty().id();
        let mut pool = ClonePool::default();

        let handle = pool.get(PortalTrace::default());
        if let Some(handler) = pool.get_handler_mut(handle) {
            handler.root = Some(root);
        }
        pool.release(handle);
        let again = pool.get(PortalTrace::from_portals([portal]));

        assert_eq!(again, handle);
        let handler = pool.get_handler(again).unwrap();
        assert_eq!(handler.root, Some(root));
        assert_eq!(handler.portal(), Some(portal));
        assert!(handler.is_active());
        assert_eq!(pool.gets(), 2);
    }
}

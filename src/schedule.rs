use bevy::prelude::*;
use bevy::transform::TransformSystems;

/// Ordering of the portal systems.
///
/// The fixed tick runs `SyncPortals → TriggerReconcile → Teleport → CloneSync`
/// so triggers are settled before teleport detection and clones never copy a
/// pre-teleport transform. The frame runs `SyncPortals → RenderTree →
/// RenderCloneSync` after transforms have propagated.
#[derive(Debug, Hash, PartialEq, Eq, Clone, SystemSet)]
pub enum PortalSet {
    /// Copy portal components into the `PortalWorld`
    SyncPortals,
    /// Reconcile trigger overlaps and layer states
    TriggerReconcile,
    /// Detect plane crossings and teleport
    Teleport,
    /// Assign and synchronize physics clones
    CloneSync,
    /// Build the recursive portal view trees
    RenderTree,
    /// Synchronize render clones
    RenderCloneSync,
}

/// Configures the `PortalSet` ordering
pub struct SchedulePlugin;

impl Plugin for SchedulePlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            FixedUpdate,
            (
                PortalSet::SyncPortals,
                PortalSet::TriggerReconcile,
                PortalSet::Teleport,
                PortalSet::CloneSync,
            )
                .chain(),
        )
        .configure_sets(
            PostUpdate,
            (
                PortalSet::SyncPortals,
                PortalSet::RenderTree,
                PortalSet::RenderCloneSync,
            )
                .chain()
                .after(TransformSystems::Propagate),
        );
    }
}

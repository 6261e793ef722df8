use bevy::prelude::*;
use bevy_inspector_egui::inspector_options::std_options::NumberDisplay;
use bevy_inspector_egui::prelude::*;

use crate::constants::CASTER_MAX_DISTANCE;
use crate::constants::CASTER_MAX_RECURSIONS;
use crate::constants::CLONE_MAX_COUNT;

/// Live tuning of teleports, clones and portal casts
#[derive(Resource, Reflect, InspectorOptions, Debug, PartialEq, Clone, Copy)]
#[reflect(Resource, InspectorOptions)]
pub struct PortalPhysicsConfig {
    /// Objects teleport when crossing transition planes
    pub teleport_enabled:      bool,
    /// Clones per object when its `CloneSettings` does not say
    #[inspector(min = 0, max = 8)]
    pub clone_max_count:       usize,
    /// Upper bound on portal crossings of any `PortalPointer`
    #[inspector(min = 0, max = 32)]
    pub caster_max_recursions: usize,
    /// Upper bound on the reach of any `PortalPointer`
    #[inspector(min = 1.0, max = 5000.0, display = NumberDisplay::Slider)]
    pub caster_max_distance:   f32,
}

impl Default for PortalPhysicsConfig {
    fn default() -> Self {
        Self {
            teleport_enabled:      true,
            clone_max_count:       CLONE_MAX_COUNT,
            caster_max_recursions: CASTER_MAX_RECURSIONS,
            caster_max_distance:   CASTER_MAX_DISTANCE,
        }
    }
}

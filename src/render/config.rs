use bevy::prelude::*;
use bevy_inspector_egui::inspector_options::std_options::NumberDisplay;
use bevy_inspector_egui::prelude::*;

use super::builder::RenderAlgorithm;
use super::builder::RenderBudget;
use crate::constants::RENDER_GIZMO_COLOR;
use crate::constants::RENDER_GIZMO_LINE_WIDTH;
use crate::constants::RENDER_MAX_DEPTH;
use crate::constants::RENDER_MAX_RENDERS;
use crate::constants::RENDER_MIN_DEPTH;

/// Live tuning of the portal view trees
#[derive(Resource, Reflect, InspectorOptions, Debug, PartialEq, Clone, Copy)]
#[reflect(Resource, InspectorOptions)]
pub struct PortalRenderConfig {
    /// Visit order of discovered views
    pub algorithm:    RenderAlgorithm,
    /// Deepest chain of portal views
    #[inspector(min = 1, max = 16)]
    pub max_depth:    usize,
    /// Depth always rendered with `RequiredDepth`
    #[inspector(min = 0, max = 16)]
    pub min_depth:    usize,
    /// Virtual views per camera per frame
    #[inspector(min = 1, max = 64)]
    pub max_renders:  usize,
    /// Screen point whose views win ties, in normalized device coordinates
    pub focus:        Option<Vec2>,
    /// Draw every view's culling window
    pub draw_windows: bool,
    /// Culling-window color
    pub window_color: Color,
    /// Culling-window line width
    #[inspector(min = 0.5, max = 10.0, display = NumberDisplay::Slider)]
    pub line_width:   f32,
}

impl Default for PortalRenderConfig {
    fn default() -> Self {
        Self {
            algorithm:    RenderAlgorithm::default(),
            max_depth:    RENDER_MAX_DEPTH,
            min_depth:    RENDER_MIN_DEPTH,
            max_renders:  RENDER_MAX_RENDERS,
            focus:        None,
            draw_windows: true,
            window_color: RENDER_GIZMO_COLOR,
            line_width:   RENDER_GIZMO_LINE_WIDTH,
        }
    }
}

impl PortalRenderConfig {
    /// The budget one tree build runs under
    pub const fn budget(&self) -> RenderBudget {
        RenderBudget {
            algorithm:   self.algorithm,
            max_depth:   self.max_depth,
            min_depth:   self.min_depth,
            max_renders: self.max_renders,
            focus:       self.focus,
        }
    }
}

//! Constants for portalspace
//! All magic numbers and default configuration values live here.

use bevy::color::Color;

// =============================================================================
// Transform Algebra
// =============================================================================

/// Determinant magnitude below which a teleport matrix is treated as degenerate
pub const DEGENERATE_DETERMINANT_EPSILON: f32 = 1e-12;

/// Tolerance used when comparing transformed values for equality
pub const TRANSFORM_TOLERANCE: f32 = 1e-4;

// =============================================================================
// Teleportation
// =============================================================================

/// Local Z below which a tracked origin counts as having crossed a transition plane
pub const TRANSITION_PLANE_OFFSET: f32 = 0.0;

// =============================================================================
// Recursive Caster
// =============================================================================

/// Default number of portal crossings a single cast may follow
pub const CASTER_MAX_RECURSIONS: usize = 8;

/// Default total cast distance
pub const CASTER_MAX_DISTANCE: f32 = 1000.0;

/// Distance a continued cast is pushed past the exit portal surface
pub const CASTER_SURFACE_OFFSET: f32 = 1e-3;

// =============================================================================
// Render Tree
// =============================================================================

/// Default maximum portal recursion depth for the render tree
pub const RENDER_MAX_DEPTH: usize = 4;

/// Default depth every chain is forced down to by the required-depth policy
pub const RENDER_MIN_DEPTH: usize = 1;

/// Default maximum number of virtual viewpoints rendered per frame
pub const RENDER_MAX_RENDERS: usize = 16;

/// View depth used as the near edge of a window whose corners cross the near plane
pub const RENDER_NEAR_DEPTH: f32 = 0.0;

/// Clip-space `w` below which a projected corner counts as behind the camera
pub const RENDER_BEHIND_EPSILON: f32 = 1e-5;

/// Line width for culling-window gizmos
pub const RENDER_GIZMO_LINE_WIDTH: f32 = 2.0;

/// View depth at which culling-window gizmos are drawn
pub const RENDER_GIZMO_DEPTH: f32 = 1.0;

/// Color for culling-window gizmos
pub const RENDER_GIZMO_COLOR: Color = Color::srgb(0.2, 0.6, 1.0);

// =============================================================================
// Clones
// =============================================================================

/// Default number of clones a tracked object may keep alive at once
pub const CLONE_MAX_COUNT: usize = 2;

//! Demo scene layout and tuning

use bevy::prelude::*;

// =============================================================================
// Portals
// =============================================================================

/// Where the entry portal stands
pub const ENTRY_PORTAL_POSITION: Vec3 = Vec3::new(-5.0, 0.0, 0.0);

/// Where the exit portal stands
pub const EXIT_PORTAL_POSITION: Vec3 = Vec3::new(5.0, 0.0, 0.0);

/// Half size of a portal surface
pub const PORTAL_HALF_SIZE: Vec2 = Vec2::new(1.5, 2.0);

/// Depth of the outer volume on each side of the surface
pub const LAYER_VOLUME_DEPTH: f32 = 1.0;

/// Depth of the transition volume on each side of the surface
pub const TRANSITION_VOLUME_DEPTH: f32 = 0.5;

/// Thickness of the wall a portal sits in
pub const WALL_THICKNESS: f32 = 0.2;

/// Half size of the wall a portal sits in
pub const WALL_HALF_SIZE: Vec2 = Vec2::new(4.0, 3.0);

/// Surface color of the entry portal
pub const ENTRY_PORTAL_COLOR: Color = Color::srgb(0.2, 0.5, 1.0);

/// Surface color of the exit portal
pub const EXIT_PORTAL_COLOR: Color = Color::srgb(1.0, 0.5, 0.1);

// =============================================================================
// Balls
// =============================================================================

/// Seconds between balls
pub const BALL_SPAWN_SECONDS: f32 = 1.5;

/// Seconds a ball lives
pub const BALL_LIFETIME_SECONDS: f32 = 8.0;

/// Ball radius
pub const BALL_RADIUS: f32 = 0.3;

/// Ball launch speed
pub const BALL_SPEED: f32 = 6.0;

/// Distance in front of the entry portal balls start from
pub const BALL_SPAWN_DISTANCE: f32 = 6.0;

/// Random sideways and vertical spread of the launch point
pub const BALL_SPAWN_SPREAD: f32 = 0.8;

/// Clones per ball
pub const BALL_CLONE_COUNT: usize = 2;

/// Balls above which the physics monitor starts watching
pub const MONITOR_MIN_BALLS: usize = 10;

// =============================================================================
// Camera
// =============================================================================

/// Camera position
pub const CAMERA_POSITION: Vec3 = Vec3::new(0.0, 6.0, 16.0);

/// Point the camera looks at
pub const CAMERA_TARGET: Vec3 = Vec3::new(0.0, 0.0, 0.0);

/// Ground height
pub const GROUND_HEIGHT: f32 = -3.0;

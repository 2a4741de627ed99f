//! Rig geometry and the static canvas-to-lens projection every alignment strategy builds on.

/// Canvas-space node grid shared by projection maps and alignment fields.
pub mod grid;
/// Lens and rig descriptions.
pub mod lens;
/// Precomputed equirectangular → fisheye projection maps.
pub mod projection;

//! Alignment engine: per-frame-set warp fields that make overlapping lenses agree.
//!
//! Strategies ([`AlignmentStrategy`](strategy::AlignmentStrategy)) are stateless and run in
//! parallel across frame sets. The [`FieldStabilizer`](stabilizer::FieldStabilizer) then applies
//! the temporal policy (hold-last fallback, flow-state smoothing, direction lock) in sequence
//! order.

/// Trained-model strategy.
pub mod ai_flow;
/// Rig-rotation compensation.
pub mod direction_lock;
/// Field type.
pub mod field;
/// Model artifact format and inference.
pub mod model;
/// Block-matching strategy.
pub mod optical_flow;
/// Overlap sampling and block matching shared by the correspondence strategies.
pub mod overlap;
/// Temporal policy.
pub mod stabilizer;
/// Strategy trait, static template and factory.
pub mod strategy;

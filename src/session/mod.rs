//! Pipeline controller: job lifecycle, stage threads, cancellation and error aggregation.
//!
//! A [`StitchSession`](pipeline::StitchSession) validates its job, acquires sources, model and
//! encoder, then runs the stages as threads joined by bounded channels:
//! readers → synchronizer → alignment pool → stabilizer + fusion → encode scheduler.

pub(crate) mod channel;
/// Process-wide tool probe.
pub mod env;
/// Session and run results.
pub mod pipeline;
/// Sequence reordering after parallel stages.
pub mod reorder;
/// Job lifecycle.
pub mod state;

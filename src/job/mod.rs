//! Job configuration: the immutable [`StitchJob`] value every stage is built from.

/// Job model types.
pub mod model;
/// Synchronous job validation (the `Validating` state's checks).
pub mod validate;

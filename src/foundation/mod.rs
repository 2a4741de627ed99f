pub(crate) mod cancel;
pub(crate) mod core;
pub(crate) mod diagnostics;
pub(crate) mod error;
pub(crate) mod math;

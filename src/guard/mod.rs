//! Engine lifecycle and violation telemetry.

pub mod engine;
pub mod violation;

pub use engine::{Guardify, GuardifyStatus, DRAG_STYLE_CSS, DRAG_STYLE_ID};
pub use violation::{ViolationRecord, ViolationReporter, DEVTOOLS_VIOLATION};

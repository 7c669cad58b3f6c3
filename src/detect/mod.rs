//! Developer tools detection.
//!
//! The [`DevToolsDetector`] polls a set of [`DetectionSignal`]s on one host
//! interval and runs the configured response when a signal fires. Two signals
//! ship with the crate:
//!
//! - [`ConsoleProbeSignal`] logs a value that only a rendering console viewer
//!   formats.
//! - [`WindowChromeSignal`] compares outer and inner window dimensions.

pub mod devtools;
pub mod signals;

pub use devtools::{DevToolsDetector, DevToolsEvent, DevToolsState, RESIZE_THROTTLE_MS};
pub use signals::{
    ConsoleProbe, ConsoleProbeSignal, DetectionSignal, EdgeTrigger, WindowChromeSignal,
    CONSOLE_PROBE, WINDOW_CHROME,
};

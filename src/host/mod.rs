//! Host environment abstraction.
//!
//! Guardify never owns the page it protects. Everything it consumes from the
//! embedding environment (listener registration, timers, the console, window
//! geometry, navigation and style injection) goes through the [`Host`] trait,
//! so the engine can run on top of a wasm shim, a headless browser bridge, or
//! the in-memory [`MockHost`] used by tests and the `simulate` command.
//!
//! # Submodules
//!
//! - [`event`] - Interaction events, key state and the element view used for
//!   selector matching
//! - [`mock`] - Deterministic in-memory host with a virtual clock

pub mod event;
pub mod mock;

pub use event::{DomNode, Element, ElementRef, InteractionEvent, KeyInfo};
pub use mock::{ConsoleLevel, ConsoleLine, MockHost};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Event listener installed on the host.
///
/// Identity is the `Arc` allocation: removing a listener requires the same
/// `Arc` that was passed to [`Host::add_listener`].
pub type Listener = Arc<dyn Fn(&mut InteractionEvent) + Send + Sync>;

/// Callback for a recurring timer.
pub type IntervalCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback for a single-shot timer.
pub type TimeoutCallback = Box<dyn FnOnce() + Send>;

/// Returns true if both listeners are the same allocation.
pub fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Where a listener is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerScope {
    /// The document root (interaction events).
    Document,
    /// The window object (resize).
    Window,
}

impl fmt::Display for ListenerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerScope::Document => write!(f, "document"),
            ListenerScope::Window => write!(f, "window"),
        }
    }
}

/// Opaque handle for a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerHandle(pub u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Outer and inner window dimensions in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub outer_width: f64,
    pub outer_height: f64,
    pub inner_width: f64,
    pub inner_height: f64,
}

impl WindowMetrics {
    /// Creates metrics for a window whose chrome adds `chrome_w` x `chrome_h`
    /// around an inner viewport.
    pub fn new(inner_width: f64, inner_height: f64, chrome_w: f64, chrome_h: f64) -> Self {
        Self {
            outer_width: inner_width + chrome_w,
            outer_height: inner_height + chrome_h,
            inner_width,
            inner_height,
        }
    }

    /// Horizontal space taken by browser chrome or docked panels.
    pub fn width_delta(&self) -> f64 {
        self.outer_width - self.inner_width
    }

    /// Vertical space taken by browser chrome or docked panels.
    pub fn height_delta(&self) -> f64 {
        self.outer_height - self.inner_height
    }
}

/// Faults reported by the host environment.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HostError {
    /// The listener could not be added or removed.
    #[error("listener for '{event}' on {scope} failed: {reason}")]
    Listener {
        event: String,
        scope: ListenerScope,
        reason: String,
    },

    /// The timer could not be scheduled or cleared.
    #[error("timer operation failed for {handle:?}: {reason}")]
    Timer {
        handle: Option<TimerHandle>,
        reason: String,
    },

    /// A host capability is not available in this environment.
    #[error("host capability unavailable: {0}")]
    Unavailable(String),
}

/// Everything Guardify consumes from the embedding environment.
///
/// Implementations must not invoke Guardify callbacks synchronously from
/// inside `add_listener`, `remove_listener`, `set_timeout` or `set_interval`.
/// Callbacks run later, from the host's own dispatch loop.
pub trait Host: Send + Sync {
    /// Installs `listener` for `event` at `scope`.
    fn add_listener(
        &self,
        scope: ListenerScope,
        event: &str,
        listener: Listener,
    ) -> Result<(), HostError>;

    /// Removes the listener previously added with the same identity.
    fn remove_listener(
        &self,
        scope: ListenerScope,
        event: &str,
        listener: &Listener,
    ) -> Result<(), HostError>;

    /// Monotonic clock in milliseconds.
    fn now_ms(&self) -> u64;

    /// Schedules `callback` to run once after `delay_ms`.
    fn set_timeout(&self, delay_ms: u64, callback: TimeoutCallback)
        -> Result<TimerHandle, HostError>;

    /// Cancels a pending single-shot timer.
    fn clear_timeout(&self, handle: TimerHandle) -> Result<(), HostError>;

    /// Schedules `callback` every `period_ms`.
    fn set_interval(
        &self,
        period_ms: u64,
        callback: IntervalCallback,
    ) -> Result<TimerHandle, HostError>;

    /// Cancels a recurring timer.
    fn clear_interval(&self, handle: TimerHandle) -> Result<(), HostError>;

    fn console_log(&self, message: &str);
    fn console_warn(&self, message: &str);
    fn console_error(&self, message: &str);
    fn console_clear(&self);

    /// Logs an arbitrary value. Only a console that is actually rendering
    /// output formats it, which is what the console probe relies on.
    fn console_log_value(&self, value: &dyn fmt::Display);

    /// Current window geometry.
    fn window_metrics(&self) -> Result<WindowMetrics, HostError>;

    /// Navigates the page away to `url`.
    fn navigate(&self, url: &str) -> Result<(), HostError>;

    /// Current page location, used as violation context.
    fn location(&self) -> String;

    /// Adds a stylesheet identified by `id`.
    fn inject_style(&self, id: &str, css: &str) -> Result<(), HostError>;

    /// Removes the stylesheet identified by `id`.
    fn remove_style(&self, id: &str) -> Result<(), HostError>;
}

/// Destination for the engine's own console messages.
///
/// The engine writes lifecycle notices through this sink instead of touching
/// the host console directly, so a silent sink leaves the page's console
/// untouched for other code.
#[derive(Clone)]
pub struct OutputSink {
    host: Option<Arc<dyn Host>>,
}

impl OutputSink {
    /// Writes to the host console.
    pub fn console(host: Arc<dyn Host>) -> Self {
        Self { host: Some(host) }
    }

    /// Discards everything.
    pub fn silent() -> Self {
        Self { host: None }
    }

    pub fn is_silent(&self) -> bool {
        self.host.is_none()
    }

    pub fn log(&self, message: &str) {
        if let Some(host) = &self.host {
            host.console_log(message);
        }
    }

    pub fn warn(&self, message: &str) {
        if let Some(host) = &self.host {
            host.console_warn(message);
        }
    }

    pub fn error(&self, message: &str) {
        if let Some(host) = &self.host {
            host.console_error(message);
        }
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink")
            .field("silent", &self.is_silent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_metrics_deltas() {
        let metrics = WindowMetrics::new(1280.0, 720.0, 200.0, 80.0);
        assert_eq!(metrics.outer_width, 1480.0);
        assert_eq!(metrics.width_delta(), 200.0);
        assert_eq!(metrics.height_delta(), 80.0);
    }

    #[test]
    fn test_same_listener_identity() {
        let a: Listener = Arc::new(|_e: &mut InteractionEvent| {});
        let b: Listener = Arc::new(|_e: &mut InteractionEvent| {});
        let a2 = a.clone();

        assert!(same_listener(&a, &a2));
        assert!(!same_listener(&a, &b));
    }

    #[test]
    fn test_silent_sink_writes_nothing() {
        let host = Arc::new(MockHost::new());
        let sink = OutputSink::silent();
        sink.log("hidden");
        assert!(sink.is_silent());
        assert!(host.console_lines().is_empty());

        let sink = OutputSink::console(host.clone());
        sink.warn("shown");
        assert_eq!(host.console_lines().len(), 1);
        assert_eq!(host.console_lines()[0].level, ConsoleLevel::Warn);
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(ListenerScope::Document.to_string(), "document");
        assert_eq!(ListenerScope::Window.to_string(), "window");
    }
}

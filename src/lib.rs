//! # Guardify
//!
//! An interaction-restriction engine for embedded web pages, written in Rust.
//!
//! Guardify blocks selected user interactions (context menu, text selection,
//! clipboard, drag, keyboard shortcuts), watches for an open developer-tools
//! inspector, and reports every violation to an observer. It never owns the
//! page: everything it touches goes through the [`host::Host`] trait.
//!
//! ## Features
//!
//! - **Interception**: one listener per event name, CSS-selector exemptions,
//!   throttled violation reporting
//! - **Keyboard Matcher**: named shortcut table plus custom predicates
//! - **DevTools Detection**: pluggable signals with edge triggering
//! - **Lifecycle**: idempotent activate/destroy that removes only what it added
//! - **Flexible Configuration**: TOML/JSON files, environment variables, CLI arguments
//!
//! ## Quick Start
//!
//! ```rust
//! use guardify::prelude::*;
//! use std::sync::Arc;
//!
//! let host = Arc::new(MockHost::new());
//! let settings = GuardifySettings::default()
//!     .with_excluded(".copyable")
//!     .with_devtools_action(DevToolsAction::Warn);
//! let config = GuardifyConfig::new(settings)
//!     .on_violation(|record| println!("blocked {}", record.kind));
//!
//! let guard = Guardify::start(host.clone(), config).unwrap();
//! let event = host.dispatch(InteractionEvent::new("copy"));
//! assert!(event.is_default_prevented());
//!
//! guard.destroy();
//! ```
//!
//! ## Module Overview
//!
//! - [`host`]: Host boundary, interaction events, mock host
//! - [`input`]: Interception registry, key matcher, selectors, throttle
//! - [`detect`]: DevTools detector and signal sources
//! - [`guard`]: Engine lifecycle and violation reporting
//! - [`config`]: Configuration loading and management
//! - [`simulate`]: Scripted sessions against the mock host
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Guardify                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐     │
//! │  │ Interception │   │   DevTools   │   │   Violation  │     │
//! │  │   Registry   │──▶│   Detector   │──▶│   Reporter   │     │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘     │
//! │         │                  │                  │             │
//! │         └──────────────────┴──────────────────┘             │
//! │                            │                                │
//! │                      ┌─────┴─────┐                          │
//! │                      │   Host    │                          │
//! │                      └───────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//!
//! Configuration follows a precedence chain:
//! 1. Default values
//! 2. Configuration file (TOML/JSON)
//! 3. Environment variables (`GUARDIFY_*`)
//! 4. CLI arguments
//!
//! See [`config::GuardifySettings`] for all available options.

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Full version string with name
pub const FULL_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Module Exports
// ============================================================================

/// Host boundary: listeners, timers, console, geometry, navigation.
pub mod host;

/// Interaction interception, key matching, selectors and throttling.
pub mod input;

/// Developer tools detection.
pub mod detect;

/// Engine lifecycle and violation telemetry.
pub mod guard;

/// Configuration management for loading settings from files, env, and CLI.
pub mod config;

/// Scripted sessions against the mock host.
pub mod simulate;

// ============================================================================
// Re-exports for Convenience
// ============================================================================

// Host types
pub use host::{
    DomNode, Element, ElementRef, Host, HostError, InteractionEvent, KeyInfo, ListenerScope,
    MockHost, TimerHandle, WindowMetrics,
};

// Input types
pub use input::{
    ExemptionSet, InterceptedEvent, InterceptionRegistry, KeyCombination, KeyMatcher, Throttle,
};

// Detection types
pub use detect::{DetectionSignal, DevToolsDetector, DevToolsEvent, DevToolsState};

// Engine types
pub use guard::{Guardify, GuardifyStatus, ViolationRecord, ViolationReporter};

// Config types
pub use config::{
    CliArgs, ConfigError, DevToolsAction, GuardifyConfig, GuardifySettings, SignalPolicy,
};

// ============================================================================
// Prelude Module
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```rust
/// use guardify::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{DevToolsAction, GuardifyConfig, GuardifySettings, SignalPolicy};
    pub use crate::detect::{DevToolsEvent, DevToolsState};
    pub use crate::guard::{Guardify, GuardifyStatus, ViolationRecord};
    pub use crate::host::{DomNode, Host, InteractionEvent, KeyInfo, MockHost};
    pub use crate::input::{InterceptedEvent, KeyCombination};
    pub use crate::{FULL_VERSION, NAME, VERSION};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert!(!VERSION.is_empty());
        assert!(!NAME.is_empty());
        assert!(FULL_VERSION.contains(VERSION));
        assert!(FULL_VERSION.contains(NAME));
    }

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;
        let _ = GuardifySettings::default();
        let _ = VERSION;
        let _ = NAME;
    }
}

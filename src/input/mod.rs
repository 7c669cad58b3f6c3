//! Interaction interception for Guardify.
//!
//! This module decides which user interactions are blocked and keeps track of
//! the listeners doing the blocking.
//!
//! # Submodules
//!
//! - [`interception`] - Listener registry with exemptions and reporting
//! - [`keys`] - Keyboard shortcut table and matcher
//! - [`selector`] - CSS selectors for exclusion regions
//! - [`throttle`] - Leading-plus-trailing throttle on the host scheduler
//!
//! # Example
//!
//! ```rust
//! use guardify::host::{DomNode, InteractionEvent};
//! use guardify::input::ExemptionSet;
//!
//! let exemptions = ExemptionSet::compile(&["textarea", ".copyable"]).unwrap();
//! let target = DomNode::new("textarea").into_ref();
//! assert!(exemptions.is_exempt(Some(&target)));
//! assert!(!exemptions.is_exempt(None));
//! ```

pub mod interception;
pub mod keys;
pub mod selector;
pub mod throttle;

// Re-export commonly used types for convenience
pub use interception::{InterceptedEvent, InterceptionRegistry, TeardownReport, KEYDOWN};
pub use keys::{KeyCombination, KeyMatch, KeyMatcher, Modifier, UnknownKeyCombination};
pub use selector::{ExemptionSet, SelectorError, SelectorList};
pub use throttle::{Cancellable, Throttle};

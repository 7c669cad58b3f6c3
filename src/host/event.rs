//! Interaction events and the element view used for exemption matching.
//!
//! The host translates its native events into [`InteractionEvent`] before
//! handing them to Guardify listeners, and reads back the
//! `default_prevented` / `propagation_stopped` flags afterwards.
//!
//! # Example
//!
//! ```rust
//! use guardify::host::{DomNode, InteractionEvent, KeyInfo};
//!
//! let editor = DomNode::new("div").with_class("editor").into_ref();
//! let event = InteractionEvent::new("copy").with_target(editor);
//! assert_eq!(event.event_type(), "copy");
//!
//! let key = InteractionEvent::key_down(KeyInfo::new("u").ctrl());
//! assert!(key.key().unwrap().ctrl);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Read-only view of a DOM element.
pub trait Element: Send + Sync + fmt::Debug {
    /// Lowercase tag name.
    fn tag_name(&self) -> String;

    fn id(&self) -> Option<String>;

    fn has_class(&self, class: &str) -> bool;

    fn attribute(&self, name: &str) -> Option<String>;

    /// Parent element, `None` at the root.
    fn parent(&self) -> Option<ElementRef>;

    /// Preceding element sibling.
    fn previous_sibling(&self) -> Option<ElementRef> {
        None
    }

    /// Following element sibling.
    fn next_sibling(&self) -> Option<ElementRef> {
        None
    }

    /// First element child.
    ///
    /// Hosts that only snapshot the target path leave this unset, which makes
    /// every element match `:empty`.
    fn first_child(&self) -> Option<ElementRef> {
        None
    }
}

/// Shared element reference carried by events.
pub type ElementRef = Arc<dyn Element>;

/// Simple owned element tree.
///
/// Used by [`MockHost`](super::MockHost) and by hosts that snapshot the
/// target path before dispatching.
#[derive(Debug, Clone, Default)]
pub struct DomNode {
    tag_name: String,
    id: Option<String>,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    parent: Option<Arc<DomNode>>,
    previous: Option<Arc<DomNode>>,
}

impl DomNode {
    /// Creates a node with the given tag name.
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Places this node under `parent`.
    pub fn with_parent(mut self, parent: Arc<DomNode>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Places this node directly after `sibling` under the same parent.
    pub fn with_previous_sibling(mut self, sibling: Arc<DomNode>) -> Self {
        self.previous = Some(sibling);
        self
    }

    /// Wraps the node for use as an event target.
    pub fn into_ref(self) -> ElementRef {
        Arc::new(self)
    }
}

impl Element for DomNode {
    fn tag_name(&self) -> String {
        self.tag_name.clone()
    }

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match name.to_ascii_lowercase().as_str() {
            "id" => self.id.clone(),
            "class" if !self.classes.is_empty() => Some(self.classes.join(" ")),
            other => self.attributes.get(other).cloned(),
        }
    }

    fn parent(&self) -> Option<ElementRef> {
        self.parent.clone().map(|p| p as ElementRef)
    }

    fn previous_sibling(&self) -> Option<ElementRef> {
        self.previous.clone().map(|p| p as ElementRef)
    }
}

/// Keyboard state attached to `keydown` events.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyInfo {
    /// The `key` value as reported by the host (e.g. `"F12"`, `"I"`, `"u"`).
    pub key: String,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyInfo {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }
}

impl fmt::Display for KeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            write!(f, "Ctrl+")?;
        }
        if self.meta {
            write!(f, "Cmd+")?;
        }
        if self.alt {
            write!(f, "Alt+")?;
        }
        if self.shift {
            write!(f, "Shift+")?;
        }
        write!(f, "{}", self.key)
    }
}

/// A user interaction delivered to a listener.
#[derive(Debug, Clone)]
pub struct InteractionEvent {
    event_type: String,
    target: Option<ElementRef>,
    key: Option<KeyInfo>,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl InteractionEvent {
    /// Creates an event of the given type with no target.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            target: None,
            key: None,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    /// Creates a `keydown` event.
    pub fn key_down(key: KeyInfo) -> Self {
        Self {
            key: Some(key),
            ..Self::new("keydown")
        }
    }

    pub fn with_target(mut self, target: ElementRef) -> Self {
        self.target = Some(target);
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn target(&self) -> Option<&ElementRef> {
        self.target.as_ref()
    }

    pub fn key(&self) -> Option<&KeyInfo> {
        self.key.as_ref()
    }

    /// Cancels the browser's default action.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    /// Stops the event from reaching other nodes.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    /// Short description of the target for violation details.
    pub fn describe_target(&self) -> Option<String> {
        self.target.as_ref().map(|el| {
            let mut out = el.tag_name();
            if let Some(id) = el.id() {
                out.push('#');
                out.push_str(&id);
            }
            out
        })
    }
}

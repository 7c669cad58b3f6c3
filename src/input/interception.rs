//! Listener bookkeeping for intercepted interactions.
//!
//! The [`InterceptionRegistry`] installs at most one listener per event name
//! and remembers where it went, so teardown removes exactly what this
//! registry added and nothing else on the page.
//!
//! Every installed handler runs the same pipeline:
//!
//! 1. Targets inside an excluded region are let through untouched.
//! 2. The default action is prevented and propagation stopped, synchronously.
//! 3. A violation is reported through a per-event [`Throttle`].

use crate::config::invoke_guarded;
use crate::guard::ViolationReporter;
use crate::host::{Host, InteractionEvent, Listener, ListenerScope};
use crate::input::keys::KeyMatcher;
use crate::input::selector::ExemptionSet;
use crate::input::throttle::{Cancellable, Throttle};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Event name used for the keyboard matcher.
pub const KEYDOWN: &str = "keydown";

/// Interactions that can be switched off individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterceptedEvent {
    ContextMenu,
    SelectStart,
    Copy,
    Cut,
    Paste,
    DragStart,
}

impl InterceptedEvent {
    /// Every interception, in install order.
    pub const ALL: [InterceptedEvent; 6] = [
        InterceptedEvent::ContextMenu,
        InterceptedEvent::SelectStart,
        InterceptedEvent::Copy,
        InterceptedEvent::Cut,
        InterceptedEvent::Paste,
        InterceptedEvent::DragStart,
    ];

    /// DOM event name.
    pub fn name(&self) -> &'static str {
        match self {
            InterceptedEvent::ContextMenu => "contextmenu",
            InterceptedEvent::SelectStart => "selectstart",
            InterceptedEvent::Copy => "copy",
            InterceptedEvent::Cut => "cut",
            InterceptedEvent::Paste => "paste",
            InterceptedEvent::DragStart => "dragstart",
        }
    }
}

impl fmt::Display for InterceptedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for InterceptedEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        InterceptedEvent::ALL
            .into_iter()
            .find(|event| event.name() == lowered)
            .ok_or_else(|| {
                format!(
                    "Unknown event: {}. Valid events are: contextmenu, selectstart, copy, cut, paste, dragstart",
                    s
                )
            })
    }
}

struct RegisteredHandler {
    event: String,
    scope: ListenerScope,
    listener: Listener,
    throttle: Option<Arc<dyn Cancellable>>,
}

/// Outcome of [`InterceptionRegistry::teardown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub removed: usize,
    pub failed: usize,
}

/// Installs and removes interception listeners.
///
/// Listeners go inert once [`InterceptionRegistry::teardown`] runs, so one the
/// host failed to remove no longer blocks or reports.
pub struct InterceptionRegistry {
    host: Arc<dyn Host>,
    exemptions: Arc<ExemptionSet>,
    reporter: Arc<ViolationReporter>,
    throttle_ms: u64,
    live: Arc<AtomicBool>,
    handlers: Mutex<Vec<RegisteredHandler>>,
}

impl InterceptionRegistry {
    pub fn new(
        host: Arc<dyn Host>,
        exemptions: Arc<ExemptionSet>,
        reporter: Arc<ViolationReporter>,
        throttle_ms: u64,
    ) -> Self {
        Self {
            host,
            exemptions,
            reporter,
            throttle_ms,
            live: Arc::new(AtomicBool::new(true)),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Blocks `event` at document level.
    ///
    /// Returns false if a listener for this event is already installed.
    pub fn register(&self, event: InterceptedEvent) -> bool {
        let name = event.name();
        if self.is_registered(name) {
            debug!(event = name, "Interception already registered");
            return false;
        }

        let throttle = self.report_throttle(name);
        let exemptions = self.exemptions.clone();
        let live = self.live.clone();
        let reporter_throttle = throttle.clone();
        let listener: Listener = Arc::new(move |e: &mut InteractionEvent| {
            if !live.load(Ordering::SeqCst) {
                return;
            }
            invoke_guarded("interception handler", || {
                if exemptions.is_exempt(e.target()) {
                    trace!(event = name, "Target exempt");
                    return;
                }
                e.prevent_default();
                e.stop_propagation();
                reporter_throttle.call(target_details(e));
            });
        });

        let cancel: Arc<dyn Cancellable> = Arc::new(throttle);
        self.install(name, ListenerScope::Document, listener, Some(cancel))
    }

    /// Blocks keydown events accepted by `matcher`.
    pub fn register_keydown(&self, matcher: KeyMatcher) -> bool {
        if self.is_registered(KEYDOWN) {
            debug!(event = KEYDOWN, "Interception already registered");
            return false;
        }

        let throttle = self.report_throttle(KEYDOWN);
        let exemptions = self.exemptions.clone();
        let live = self.live.clone();
        let reporter_throttle = throttle.clone();
        let listener: Listener = Arc::new(move |e: &mut InteractionEvent| {
            if !live.load(Ordering::SeqCst) {
                return;
            }
            invoke_guarded("keydown handler", || {
                if exemptions.is_exempt(e.target()) {
                    return;
                }
                let Some(rule) = matcher.find_match(e) else {
                    return;
                };
                e.prevent_default();
                e.stop_propagation();

                let mut details = target_details(e);
                details.insert("rule".to_string(), json!(rule.to_string()));
                if let Some(key) = e.key() {
                    details.insert("key".to_string(), json!(key.to_string()));
                }
                reporter_throttle.call(details);
            });
        });

        let cancel: Arc<dyn Cancellable> = Arc::new(throttle);
        self.install(KEYDOWN, ListenerScope::Document, listener, Some(cancel))
    }

    /// Installs a window-level listener owned by this registry.
    ///
    /// `throttle`, if given, is cancelled on teardown.
    pub fn register_window(
        &self,
        event: &str,
        listener: Listener,
        throttle: Option<Arc<dyn Cancellable>>,
    ) -> bool {
        if self.is_registered(event) {
            debug!(event, "Window listener already registered");
            return false;
        }
        self.install(event, ListenerScope::Window, listener, throttle)
    }

    /// True if `event` would be let through because of its target.
    pub fn is_exempt(&self, event: &InteractionEvent) -> bool {
        self.exemptions.is_exempt(event.target())
    }

    pub fn is_registered(&self, event: &str) -> bool {
        self.handlers.lock().iter().any(|h| h.event == event)
    }

    /// Number of listeners currently installed.
    pub fn listener_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Names of installed listeners, in install order.
    pub fn registered_events(&self) -> Vec<String> {
        self.handlers.lock().iter().map(|h| h.event.clone()).collect()
    }

    /// Removes every listener this registry installed.
    ///
    /// A failed removal is logged and skipped. Calling it again is a no-op.
    pub fn teardown(&self) -> TeardownReport {
        self.live.store(false, Ordering::SeqCst);
        let handlers = std::mem::take(&mut *self.handlers.lock());
        let mut report = TeardownReport::default();

        for handler in handlers {
            if let Some(throttle) = &handler.throttle {
                throttle.cancel();
            }
            match self
                .host
                .remove_listener(handler.scope, &handler.event, &handler.listener)
            {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    error!(event = %handler.event, scope = %handler.scope, "Failed to remove listener: {}", e);
                    report.failed += 1;
                }
            }
        }

        debug!(removed = report.removed, failed = report.failed, "Interception teardown");
        report
    }

    fn report_throttle(&self, kind: &'static str) -> Throttle<Map<String, Value>> {
        let reporter = self.reporter.clone();
        Throttle::new(self.host.clone(), self.throttle_ms, move |details| {
            reporter.report(kind, details);
        })
    }

    fn install(
        &self,
        event: &str,
        scope: ListenerScope,
        listener: Listener,
        throttle: Option<Arc<dyn Cancellable>>,
    ) -> bool {
        if let Err(e) = self.host.add_listener(scope, event, listener.clone()) {
            error!(event, %scope, "Failed to install listener: {}", e);
            return false;
        }

        debug!(event, %scope, "Listener installed");
        self.handlers.lock().push(RegisteredHandler {
            event: event.to_string(),
            scope,
            listener,
            throttle,
        });
        true
    }
}

impl fmt::Debug for InterceptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionRegistry")
            .field("events", &self.registered_events())
            .field("exemptions", &self.exemptions.len())
            .field("throttle_ms", &self.throttle_ms)
            .finish()
    }
}

fn target_details(event: &InteractionEvent) -> Map<String, Value> {
    let mut details = Map::new();
    if let Some(target) = event.describe_target() {
        details.insert("target".to_string(), json!(target));
    }
    details
}

//! Integration tests for the Guardify engine lifecycle
//!
//! Tests for interception per event type, exemptions, idempotent activation,
//! teardown under host faults, re-entrant destroy and statistics.

use guardify::config::{ConfigError, GuardifyConfig, GuardifySettings};
use guardify::host::{
    ConsoleLevel, DomNode, Host, HostError, InteractionEvent, IntervalCallback, KeyInfo,
    Listener, ListenerScope, MockHost, TimeoutCallback, TimerHandle, WindowMetrics,
};
use guardify::input::{InterceptedEvent, KeyCombination};
use guardify::Guardify;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn quiet_settings() -> GuardifySettings {
    GuardifySettings::permissive().with_console_output(false)
}

fn start(host: &Arc<MockHost>, config: GuardifyConfig) -> Guardify {
    Guardify::start(host.clone(), config).unwrap()
}

// ============================================================================
// Interception
// ============================================================================

#[test]
fn test_each_enabled_event_is_blocked_and_counted_once() {
    for event in InterceptedEvent::ALL {
        let host = Arc::new(MockHost::new());
        let settings = quiet_settings().with_blocked(event, true);
        let guard = start(&host, GuardifyConfig::new(settings));

        let dispatched = host.dispatch(InteractionEvent::new(event.name()));
        assert!(dispatched.is_default_prevented(), "{} not prevented", event);
        assert!(dispatched.is_propagation_stopped(), "{} still propagating", event);
        assert_eq!(guard.violation_count(), 1, "{} miscounted", event);
    }
}

#[test]
fn test_disabled_events_are_untouched() {
    for event in InterceptedEvent::ALL {
        let host = Arc::new(MockHost::new());
        let guard = start(&host, GuardifyConfig::new(quiet_settings()));

        let dispatched = host.dispatch(InteractionEvent::new(event.name()));
        assert!(!dispatched.is_default_prevented());
        assert_eq!(guard.violation_count(), 0);
    }
}

#[test]
fn test_excluded_target_is_not_intercepted() {
    let host = Arc::new(MockHost::new());
    let settings = GuardifySettings::default()
        .with_excluded(".copyable")
        .with_excluded("textarea, input[type=\"text\"]");
    let guard = start(&host, GuardifyConfig::new(settings));

    let region = Arc::new(DomNode::new("section").with_class("copyable"));
    let nested = DomNode::new("p").with_parent(region).into_ref();
    let field = DomNode::new("input").with_attribute("type", "text").into_ref();

    for target in [nested, field] {
        for name in ["copy", "contextmenu", "selectstart"] {
            let event = host.dispatch(InteractionEvent::new(name).with_target(target.clone()));
            assert!(!event.is_default_prevented());
        }
    }
    assert_eq!(guard.violation_count(), 0);

    let outside = DomNode::new("p").into_ref();
    let event = host.dispatch(InteractionEvent::new("copy").with_target(outside));
    assert!(event.is_default_prevented());
    assert_eq!(guard.violation_count(), 1);
}

#[test]
fn test_invalid_exclusion_selector_fails_construction() {
    let host = Arc::new(MockHost::new());
    let settings = GuardifySettings::default().with_excluded("div > > p");

    match Guardify::new(host.clone(), GuardifyConfig::new(settings)) {
        Err(ConfigError::InvalidSelector { selector, .. }) => assert_eq!(selector, "div > > p"),
        other => panic!("expected selector error, got {:?}", other.map(|g| g.id())),
    }
    assert_eq!(host.listener_count(), 0);
}

#[test]
fn test_keyboard_rules_in_order() {
    let host = Arc::new(MockHost::new());
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = records.clone();
    let settings = quiet_settings().with_keys(vec![KeyCombination::F12, KeyCombination::CtrlU]);
    let config = GuardifyConfig::new(settings)
        .with_custom_key(|e| e.key().is_some_and(|k| k.ctrl && k.key == "u"))
        .with_custom_key(|e| e.key().is_some_and(|k| k.key == "PrintScreen"))
        .on_violation(move |record| sink.lock().push(record.clone()));
    let guard = start(&host, config);

    host.dispatch(InteractionEvent::key_down(KeyInfo::new("u").ctrl()));
    host.dispatch(InteractionEvent::key_down(KeyInfo::new("PrintScreen")));
    let allowed = host.dispatch(InteractionEvent::key_down(KeyInfo::new("a").ctrl()));

    assert!(!allowed.is_default_prevented());
    assert_eq!(guard.violation_count(), 2);

    let rules: Vec<String> = records
        .lock()
        .iter()
        .map(|r| r.details["rule"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(rules, vec!["Ctrl+U", "custom#1"]);
}

#[test]
fn test_shortcut_matches_with_extra_modifiers() {
    let host = Arc::new(MockHost::new());
    let settings = quiet_settings().with_keys(vec![KeyCombination::CtrlShiftI]);
    let guard = start(&host, GuardifyConfig::new(settings));

    let event = host.dispatch(InteractionEvent::key_down(KeyInfo::new("I").ctrl().shift().alt()));
    assert!(event.is_default_prevented());

    let event = host.dispatch(InteractionEvent::key_down(KeyInfo::new("I").ctrl()));
    assert!(!event.is_default_prevented());
    assert_eq!(guard.violation_count(), 1);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_activate_twice_is_idempotent() {
    let host = Arc::new(MockHost::new());
    let activations = Arc::new(AtomicUsize::new(0));
    let counter = activations.clone();
    let config = GuardifyConfig::default().on_activate(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let guard = start(&host, config);
    let before = host.listener_count();

    guard.activate();

    assert_eq!(host.listener_count(), before);
    assert_eq!(host.console_text(ConsoleLevel::Warn), vec!["Guardify is already active."]);
    assert_eq!(host.listener_count_for(ListenerScope::Document, "copy"), 1);
    assert_eq!(activations.load(Ordering::SeqCst), 1);

    host.dispatch(InteractionEvent::new("copy"));
    assert_eq!(guard.violation_count(), 1);
}

#[test]
fn test_activate_destroy_activate_round_trip() {
    let host = Arc::new(MockHost::new());
    let settings = GuardifySettings::default().with_blocked(InterceptedEvent::DragStart, true);
    let guard = start(&host, GuardifyConfig::new(settings));
    let first = guard.status();
    let first_host = (host.listener_count(), host.interval_count(), host.styles().len());

    guard.destroy();
    assert_eq!(host.listener_count(), 0);
    assert_eq!(host.interval_count(), 0);
    assert_eq!(host.timer_count(), 0);
    assert!(host.styles().is_empty());

    guard.activate();
    let second = guard.status();
    assert_eq!(second.listener_count, first.listener_count);
    assert_eq!(second.interval_count, first.interval_count);
    assert_eq!(
        (host.listener_count(), host.interval_count(), host.styles().len()),
        first_host
    );
}

#[test]
fn test_destroy_when_inactive_is_noop() {
    let host = Arc::new(MockHost::new());
    let destroys = Arc::new(AtomicUsize::new(0));
    let counter = destroys.clone();
    let config = GuardifyConfig::default().on_destroy(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let guard = Guardify::new(host.clone(), config).unwrap();

    guard.destroy();
    assert_eq!(destroys.load(Ordering::SeqCst), 0);
    assert_eq!(host.console_text(ConsoleLevel::Warn), vec!["Guardify is not active."]);

    guard.activate();
    guard.destroy();
    guard.destroy();
    assert_eq!(destroys.load(Ordering::SeqCst), 1);
}

#[test]
fn test_destroy_only_removes_own_listeners() {
    let host = Arc::new(MockHost::new());
    let foreign: Listener = Arc::new(|_e: &mut InteractionEvent| {});
    host.add_listener(ListenerScope::Document, "copy", foreign)
        .unwrap();

    let first = start(&host, GuardifyConfig::default());
    let second = start(&host, GuardifyConfig::default());
    first.destroy();

    assert!(second.is_active());
    assert_eq!(host.listener_count_for(ListenerScope::Document, "copy"), 2);
    assert_eq!(host.interval_count(), 1);

    host.dispatch(InteractionEvent::new("copy"));
    assert_eq!(first.violation_count(), 0);
    assert_eq!(second.violation_count(), 1);
}

#[test]
fn test_destroy_survives_host_removal_faults() {
    let host = Arc::new(MockHost::new());
    let destroyed = Arc::new(AtomicUsize::new(0));
    let counter = destroyed.clone();
    let config = GuardifyConfig::default().on_destroy(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let guard = start(&host, config);

    host.set_fail_removals(true);
    guard.destroy();

    assert!(!guard.is_active());
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    let errors = host.console_text(ConsoleLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Guardify could not remove"), "{}", errors[0]);
    assert_eq!(guard.status().listener_count, 0);

    // Listeners the host kept are inert.
    let event = host.dispatch(InteractionEvent::new("copy"));
    assert!(!event.is_default_prevented());
    assert_eq!(guard.violation_count(), 0);
}

#[test]
fn test_destroy_from_inside_handler() {
    let host = Arc::new(MockHost::new());
    let slot: Arc<Mutex<Option<Guardify>>> = Arc::new(Mutex::new(None));
    let handle = slot.clone();
    let config = GuardifyConfig::default().on_violation(move |_| {
        let guard = handle.lock().clone();
        if let Some(guard) = guard {
            guard.destroy();
        }
    });
    let guard = start(&host, config);
    *slot.lock() = Some(guard.clone());

    let event = host.dispatch(InteractionEvent::new("contextmenu"));

    assert!(event.is_default_prevented());
    assert!(!guard.is_active());
    assert_eq!(host.listener_count(), 0);
    assert_eq!(guard.violation_count(), 1);

    host.dispatch(InteractionEvent::new("contextmenu"));
    assert_eq!(guard.violation_count(), 1);
}

/// Host that parks the first `contextmenu` registration until the test
/// releases it, leaving an activation half done.
struct GatedHost {
    inner: Arc<MockHost>,
    armed: AtomicBool,
    reached: Barrier,
    release: Barrier,
}

impl GatedHost {
    fn new(inner: Arc<MockHost>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
            reached: Barrier::new(2),
            release: Barrier::new(2),
        }
    }
}

impl Host for GatedHost {
    fn add_listener(
        &self,
        scope: ListenerScope,
        event: &str,
        listener: Listener,
    ) -> Result<(), HostError> {
        if event == "contextmenu" && self.armed.swap(false, Ordering::SeqCst) {
            self.reached.wait();
            self.release.wait();
        }
        self.inner.add_listener(scope, event, listener)
    }

    fn remove_listener(
        &self,
        scope: ListenerScope,
        event: &str,
        listener: &Listener,
    ) -> Result<(), HostError> {
        self.inner.remove_listener(scope, event, listener)
    }

    fn now_ms(&self) -> u64 {
        self.inner.now_ms()
    }

    fn set_timeout(&self, delay_ms: u64, callback: TimeoutCallback) -> Result<TimerHandle, HostError> {
        self.inner.set_timeout(delay_ms, callback)
    }

    fn clear_timeout(&self, handle: TimerHandle) -> Result<(), HostError> {
        self.inner.clear_timeout(handle)
    }

    fn set_interval(&self, period_ms: u64, callback: IntervalCallback) -> Result<TimerHandle, HostError> {
        self.inner.set_interval(period_ms, callback)
    }

    fn clear_interval(&self, handle: TimerHandle) -> Result<(), HostError> {
        self.inner.clear_interval(handle)
    }

    fn console_log(&self, message: &str) {
        self.inner.console_log(message)
    }

    fn console_warn(&self, message: &str) {
        self.inner.console_warn(message)
    }

    fn console_error(&self, message: &str) {
        self.inner.console_error(message)
    }

    fn console_clear(&self) {
        self.inner.console_clear()
    }

    fn console_log_value(&self, value: &dyn fmt::Display) {
        self.inner.console_log_value(value)
    }

    fn window_metrics(&self) -> Result<WindowMetrics, HostError> {
        self.inner.window_metrics()
    }

    fn navigate(&self, url: &str) -> Result<(), HostError> {
        self.inner.navigate(url)
    }

    fn location(&self) -> String {
        self.inner.location()
    }

    fn inject_style(&self, id: &str, css: &str) -> Result<(), HostError> {
        self.inner.inject_style(id, css)
    }

    fn remove_style(&self, id: &str) -> Result<(), HostError> {
        self.inner.remove_style(id)
    }
}

#[test]
fn test_destroy_during_activation_cancels_it() {
    let mock = Arc::new(MockHost::new());
    let host = Arc::new(GatedHost::new(mock.clone()));
    let hooks = Arc::new(AtomicUsize::new(0));
    let (on_activate, on_destroy) = (hooks.clone(), hooks.clone());
    let settings = GuardifySettings::default()
        .with_blocked(InterceptedEvent::DragStart, true)
        .with_console_output(false);
    let config = GuardifyConfig::new(settings)
        .on_activate(move || {
            on_activate.fetch_add(1, Ordering::SeqCst);
        })
        .on_destroy(move || {
            on_destroy.fetch_add(1, Ordering::SeqCst);
        });
    let guard = Guardify::new(host.clone(), config).unwrap();

    let activating = {
        let guard = guard.clone();
        thread::spawn(move || guard.activate())
    };
    host.reached.wait();
    guard.destroy();
    host.release.wait();
    activating.join().unwrap();

    assert!(!guard.is_active());
    assert_eq!(mock.listener_count(), 0);
    assert_eq!(mock.timer_count(), 0);
    assert!(mock.styles().is_empty());
    assert_eq!(hooks.load(Ordering::SeqCst), 0);

    let event = mock.dispatch(InteractionEvent::new("copy"));
    assert!(!event.is_default_prevented());
    assert_eq!(guard.violation_count(), 0);

    guard.destroy();
    assert_eq!(mock.listener_count(), 0);

    // The next activation is unaffected.
    guard.activate();
    assert!(guard.is_active());
    assert_eq!(mock.interval_count(), 1);
    assert!(mock.dispatch(InteractionEvent::new("copy")).is_default_prevented());
    assert_eq!(hooks.load(Ordering::SeqCst), 1);
}

#[test]
fn test_panicking_callbacks_are_isolated() {
    let host = Arc::new(MockHost::new());
    let config = GuardifyConfig::default()
        .on_activate(|| panic!("activate hook"))
        .on_violation(|_| panic!("violation hook"))
        .with_custom_key(|_| panic!("key predicate"));
    let guard = start(&host, config);
    assert!(guard.is_active());

    let event = host.dispatch(InteractionEvent::new("copy"));
    assert!(event.is_default_prevented());
    assert_eq!(guard.violation_count(), 1);

    let event = host.dispatch(InteractionEvent::key_down(KeyInfo::new("x")));
    assert!(!event.is_default_prevented());
}

// ============================================================================
// Statistics and status
// ============================================================================

#[test]
fn test_observer_sees_updated_counter() {
    let host = Arc::new(MockHost::new());
    let slot: Arc<Mutex<Option<Guardify>>> = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (handle, sink) = (slot.clone(), seen.clone());
    let config = GuardifyConfig::default().on_violation(move |record| {
        let count = handle.lock().as_ref().map(|g| g.violation_count());
        sink.lock().push((record.sequence, count));
    });
    let guard = start(&host, config);
    *slot.lock() = Some(guard.clone());

    host.dispatch(InteractionEvent::new("copy"));
    host.dispatch(InteractionEvent::new("selectstart"));

    assert_eq!(*seen.lock(), vec![(1, Some(1)), (2, Some(2))]);
}

#[test]
fn test_reset_stats_keeps_active_state() {
    let host = Arc::new(MockHost::new());
    let guard = start(&host, GuardifyConfig::default());
    host.dispatch(InteractionEvent::new("copy"));
    host.dispatch(InteractionEvent::new("copy"));
    assert_eq!(guard.violation_count(), 2);

    guard.reset_stats();
    assert_eq!(guard.violation_count(), 0);
    assert!(guard.is_active());

    guard.destroy();
    guard.reset_stats();
    assert!(!guard.is_active());
}

#[test]
fn test_status_snapshot() {
    let host = Arc::new(MockHost::new());
    let guard = start(&host, GuardifyConfig::default());
    host.dispatch(InteractionEvent::new("copy"));

    let status = guard.status();
    assert_eq!(status.version, guardify::VERSION);
    assert_eq!(status.instance_id, guard.id());
    assert!(status.active);
    assert_eq!(status.violation_count, 1);
    assert_eq!(status.listener_count, host.listener_count());
    assert_eq!(status.interval_count, 1);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["devtools_state"], "closed");
    assert_eq!(json["settings"]["devtools_interval_ms"], 1000);
}

#[test]
fn test_interval_below_minimum_fails_construction() {
    let host = Arc::new(MockHost::new());
    let settings = GuardifySettings::default().with_devtools_interval(50);
    let result = Guardify::new(host, GuardifyConfig::new(settings));
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn test_violation_context_is_page_location() {
    let host = Arc::new(MockHost::new());
    host.set_location("https://shop.example/item/7");
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = records.clone();
    let config = GuardifyConfig::default().on_violation(move |r| sink.lock().push(r.clone()));
    let _guard = start(&host, config);

    let target = DomNode::new("img").with_id("hero").into_ref();
    host.dispatch(InteractionEvent::new("contextmenu").with_target(target));

    let records = records.lock();
    assert_eq!(records[0].context, "https://shop.example/item/7");
    assert_eq!(records[0].kind, "contextmenu");
    assert_eq!(records[0].details["target"], "img#hero");
}

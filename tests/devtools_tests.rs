//! Integration tests for devtools detection through the engine
//!
//! Tests for edge-triggered window chrome detection, console probe policies,
//! the resize fast path, response dispatch and teardown of the poll timer.

use guardify::config::{DevToolsAction, GuardifyConfig, GuardifySettings, SignalPolicy};
use guardify::detect::{DevToolsEvent, DevToolsState, WINDOW_CHROME};
use guardify::host::{ConsoleLevel, InteractionEvent, ListenerScope, MockHost, WindowMetrics};
use guardify::Guardify;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const INTERVAL: u64 = 1000;

fn docked(delta: f64) -> WindowMetrics {
    WindowMetrics::new(1080.0, 720.0, delta, 88.0)
}

fn detector_only() -> GuardifySettings {
    GuardifySettings::permissive()
        .with_devtools_detection(true)
        .with_console_output(false)
}

fn start(host: &Arc<MockHost>, config: GuardifyConfig) -> Guardify {
    Guardify::start(host.clone(), config).unwrap()
}

fn resize(host: &MockHost, metrics: WindowMetrics) {
    host.set_window_metrics(metrics);
    host.dispatch_at(ListenerScope::Window, InteractionEvent::new("resize"));
}

// ============================================================================
// Window chrome signal
// ============================================================================

#[test]
fn test_window_delta_reports_once_while_held() {
    let host = Arc::new(MockHost::new());
    let guard = start(&host, GuardifyConfig::new(detector_only()));

    host.set_window_metrics(docked(200.0));
    host.advance(INTERVAL);
    assert_eq!(guard.violation_count(), 1);
    assert_eq!(guard.status().devtools_state, DevToolsState::Open);

    host.advance(5 * INTERVAL);
    assert_eq!(guard.violation_count(), 1);

    host.set_window_metrics(docked(100.0));
    host.advance(INTERVAL);
    assert_eq!(guard.status().devtools_state, DevToolsState::Closed);
    assert_eq!(guard.violation_count(), 1);

    host.set_window_metrics(docked(200.0));
    host.advance(INTERVAL);
    assert_eq!(guard.violation_count(), 2);
}

#[test]
fn test_threshold_is_exclusive() {
    let host = Arc::new(MockHost::new());
    let guard = start(&host, GuardifyConfig::new(detector_only()));

    host.set_window_metrics(docked(160.0));
    host.advance(3 * INTERVAL);
    assert_eq!(guard.violation_count(), 0);
}

#[test]
fn test_resize_fast_path_is_throttled() {
    let host = Arc::new(MockHost::new());
    let guard = start(&host, GuardifyConfig::new(detector_only()));

    resize(&host, docked(300.0));
    assert_eq!(guard.violation_count(), 1);

    // Within the resize window: deferred to the trailing evaluation.
    resize(&host, docked(0.0));
    assert_eq!(guard.status().devtools_state, DevToolsState::Open);
    host.advance(250);
    assert_eq!(guard.status().devtools_state, DevToolsState::Closed);

    // The trailing evaluation restarted the window.
    host.advance(250);
    resize(&host, docked(300.0));
    assert_eq!(guard.violation_count(), 2);
}

#[test]
fn test_metric_faults_do_not_stop_polling() {
    let host = Arc::new(MockHost::new());
    let guard = start(&host, GuardifyConfig::new(detector_only()));

    host.set_fail_metrics(true);
    host.advance(3 * INTERVAL);
    assert_eq!(guard.violation_count(), 0);
    assert_eq!(host.interval_count(), 1);

    host.set_fail_metrics(false);
    host.set_window_metrics(docked(200.0));
    host.advance(INTERVAL);
    assert_eq!(guard.violation_count(), 1);
}

// ============================================================================
// Console probe signal
// ============================================================================

#[test]
fn test_console_probe_edge_policy() {
    let host = Arc::new(MockHost::new());
    host.set_console_viewer_open(true);
    let guard = start(&host, GuardifyConfig::new(detector_only()));

    host.advance(4 * INTERVAL);
    assert_eq!(guard.violation_count(), 1);

    host.set_console_viewer_open(false);
    host.advance(INTERVAL);
    host.set_console_viewer_open(true);
    host.advance(INTERVAL);
    assert_eq!(guard.violation_count(), 2);
}

#[test]
fn test_console_probe_every_tick_policy() {
    let host = Arc::new(MockHost::new());
    host.set_console_viewer_open(true);
    let settings = detector_only().with_console_signal_policy(SignalPolicy::EveryTick);
    let guard = start(&host, GuardifyConfig::new(settings));

    host.advance(4 * INTERVAL);
    assert_eq!(guard.violation_count(), 4);
}

#[test]
fn test_detection_clears_console_then_warns() {
    let host = Arc::new(MockHost::new());
    let settings = detector_only().with_devtools_message("No peeking.");
    let _guard = start(&host, GuardifyConfig::new(settings));

    host.set_window_metrics(docked(200.0));
    host.advance(INTERVAL);

    let lines = host.console_lines();
    let clear = lines.iter().position(|l| l.level == ConsoleLevel::Clear);
    let message = lines.iter().position(|l| l.text == "No peeking.");
    assert!(clear.is_some());
    assert!(clear < message);
}

// ============================================================================
// Response dispatch
// ============================================================================

#[test]
fn test_redirect_navigates() {
    let host = Arc::new(MockHost::new());
    let settings = detector_only()
        .with_devtools_action(DevToolsAction::Redirect)
        .with_redirect_url("https://example.com/blocked");
    let _guard = start(&host, GuardifyConfig::new(settings));

    host.set_window_metrics(docked(200.0));
    host.advance(INTERVAL);
    assert_eq!(host.navigations(), vec!["https://example.com/blocked".to_string()]);
}

#[test]
fn test_custom_action_without_callback_is_skipped() {
    let host = Arc::new(MockHost::new());
    let settings = detector_only().with_devtools_action(DevToolsAction::Custom);
    let guard = start(&host, GuardifyConfig::new(settings));

    host.set_window_metrics(docked(200.0));
    host.advance(INTERVAL);
    assert_eq!(guard.violation_count(), 1);
    assert!(host.navigations().is_empty());
}

#[test]
fn test_custom_callback_receives_detection() {
    let host = Arc::new(MockHost::new());
    let events: Arc<Mutex<Vec<DevToolsEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let settings = detector_only().with_devtools_action(DevToolsAction::Custom);
    let config = GuardifyConfig::new(settings).on_devtools(move |e| sink.lock().push(e.clone()));
    let _guard = start(&host, config);

    host.set_window_metrics(docked(200.0));
    host.advance(INTERVAL);

    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].signal, WINDOW_CHROME);
    assert_eq!(events[0].violation.kind, "devtools");
    assert_eq!(events[0].violation.sequence, 1);
}

#[test]
fn test_callback_may_destroy_engine() {
    let host = Arc::new(MockHost::new());
    let slot: Arc<Mutex<Option<Guardify>>> = Arc::new(Mutex::new(None));
    let handle = slot.clone();
    let settings = detector_only().with_devtools_action(DevToolsAction::Custom);
    let config = GuardifyConfig::new(settings).on_devtools(move |_| {
        let guard = handle.lock().clone();
        if let Some(guard) = guard {
            guard.destroy();
        }
    });
    let guard = start(&host, config);
    *slot.lock() = Some(guard.clone());

    host.set_window_metrics(docked(200.0));
    host.advance(INTERVAL);

    assert!(!guard.is_active());
    assert_eq!(host.interval_count(), 0);
    assert_eq!(host.listener_count(), 0);
}

// ============================================================================
// Teardown
// ============================================================================

#[test]
fn test_destroy_stops_polling() {
    let host = Arc::new(MockHost::new());
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    let config = GuardifyConfig::new(detector_only()).on_violation(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let guard = start(&host, config);

    resize(&host, docked(0.0));
    resize(&host, docked(0.0));
    assert_eq!(host.timer_count(), 2);

    guard.destroy();
    assert_eq!(host.timer_count(), 0);

    host.set_window_metrics(docked(200.0));
    host.advance(10 * INTERVAL);
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
}

#[test]
fn test_uncleared_interval_is_inert_after_destroy() {
    let host = Arc::new(MockHost::new());
    let guard = start(&host, GuardifyConfig::new(detector_only()));

    host.set_fail_removals(true);
    guard.destroy();
    assert_eq!(guard.status().interval_count, 0);
    assert_eq!(host.interval_count(), 1);

    host.set_window_metrics(docked(200.0));
    host.advance(5 * INTERVAL);
    assert_eq!(guard.violation_count(), 0);
}

#[test]
fn test_detection_disabled_installs_nothing() {
    let host = Arc::new(MockHost::new());
    let settings = GuardifySettings::default().with_devtools_detection(false);
    let guard = start(&host, GuardifyConfig::new(settings));

    assert_eq!(host.interval_count(), 0);
    assert_eq!(host.listener_count_for(ListenerScope::Window, "resize"), 0);
    assert_eq!(guard.status().interval_count, 0);
}

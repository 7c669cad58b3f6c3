//! In-memory host with a virtual clock.
//!
//! `MockHost` records everything the engine does to the page and lets tests
//! drive time, dispatch events, resize the window and toggle whether a console
//! viewer is rendering output. Nothing runs until [`MockHost::advance`] or
//! [`MockHost::dispatch`] is called.
//!
//! # Example
//!
//! ```rust
//! use guardify::host::{Host, InteractionEvent, ListenerScope, MockHost};
//! use std::sync::Arc;
//!
//! let host = MockHost::new();
//! host.add_listener(
//!     ListenerScope::Document,
//!     "copy",
//!     Arc::new(|e: &mut InteractionEvent| e.prevent_default()),
//! )
//! .unwrap();
//!
//! let event = host.dispatch(InteractionEvent::new("copy"));
//! assert!(event.is_default_prevented());
//! ```

use super::{
    same_listener, Host, HostError, IntervalCallback, InteractionEvent, Listener, ListenerScope,
    TimeoutCallback, TimerHandle, WindowMetrics,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Console output level recorded by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
    Clear,
}

/// One recorded console call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleLine {
    pub level: ConsoleLevel,
    pub text: String,
}

enum MockTimer {
    Timeout {
        due: u64,
        callback: TimeoutCallback,
    },
    Interval {
        due: u64,
        period: u64,
        callback: IntervalCallback,
    },
}

impl MockTimer {
    fn due(&self) -> u64 {
        match self {
            MockTimer::Timeout { due, .. } | MockTimer::Interval { due, .. } => *due,
        }
    }
}

struct RegisteredListener {
    scope: ListenerScope,
    event: String,
    listener: Listener,
}

struct MockState {
    now: u64,
    next_timer_id: u64,
    listeners: Vec<RegisteredListener>,
    timers: BTreeMap<u64, MockTimer>,
    console: Vec<ConsoleLine>,
    metrics: WindowMetrics,
    navigations: Vec<String>,
    styles: BTreeMap<String, String>,
    location: String,
    console_viewer_open: bool,
    fail_removals: bool,
    fail_metrics: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            now: 0,
            next_timer_id: 1,
            listeners: Vec::new(),
            timers: BTreeMap::new(),
            console: Vec::new(),
            metrics: WindowMetrics::new(1280.0, 720.0, 16.0, 88.0),
            navigations: Vec::new(),
            styles: BTreeMap::new(),
            location: "https://example.com/".to_string(),
            console_viewer_open: false,
            fail_removals: false,
            fail_metrics: false,
        }
    }
}

/// Deterministic [`Host`] implementation for tests and simulation.
pub struct MockHost {
    state: Mutex<MockState>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockHost")
            .field("now", &state.now)
            .field("listeners", &state.listeners.len())
            .field("timers", &state.timers.len())
            .finish()
    }
}

impl MockHost {
    /// Creates a host at time zero with a typical undocked window.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Dispatches an event to every document-level listener for its type.
    pub fn dispatch(&self, event: InteractionEvent) -> InteractionEvent {
        self.dispatch_at(ListenerScope::Document, event)
    }

    /// Dispatches an event to every listener for its type at `scope`.
    ///
    /// Listeners are snapshotted before the first one runs, so a listener may
    /// remove itself or others without disturbing this dispatch.
    pub fn dispatch_at(&self, scope: ListenerScope, mut event: InteractionEvent) -> InteractionEvent {
        let targets: Vec<Listener> = {
            let state = self.state.lock();
            state
                .listeners
                .iter()
                .filter(|l| l.scope == scope && l.event == event.event_type())
                .map(|l| l.listener.clone())
                .collect()
        };

        for listener in targets {
            listener(&mut event);
        }
        event
    }

    /// Advances the virtual clock, firing due timers in order.
    pub fn advance(&self, ms: u64) {
        let target = self.state.lock().now.saturating_add(ms);

        loop {
            let next = {
                let mut state = self.state.lock();
                let due = state
                    .timers
                    .iter()
                    .filter(|(_, t)| t.due() <= target)
                    .min_by_key(|(id, t)| (t.due(), **id))
                    .map(|(id, t)| (*id, t.due()));

                match due {
                    None => {
                        state.now = target;
                        None
                    }
                    Some((id, due)) => {
                        state.now = state.now.max(due);
                        match state.timers.remove(&id) {
                            Some(MockTimer::Timeout { callback, .. }) => Some(Fired::Once(callback)),
                            Some(MockTimer::Interval {
                                due,
                                period,
                                callback,
                            }) => {
                                state.timers.insert(
                                    id,
                                    MockTimer::Interval {
                                        due: due + period,
                                        period,
                                        callback: callback.clone(),
                                    },
                                );
                                Some(Fired::Repeat(callback))
                            }
                            None => None,
                        }
                    }
                }
            };

            match next {
                None => break,
                Some(Fired::Once(callback)) => callback(),
                Some(Fired::Repeat(callback)) => callback(),
            }
        }
    }

    /// Moves the clock without firing anything, like an event loop too busy
    /// to run its timers. Overdue timers fire on the next [`advance`].
    ///
    /// [`advance`]: MockHost::advance
    pub fn stall(&self, ms: u64) {
        let mut state = self.state.lock();
        state.now = state.now.saturating_add(ms);
    }

    /// Current virtual time.
    pub fn now(&self) -> u64 {
        self.state.lock().now
    }

    /// Total number of installed listeners.
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Number of listeners for `event` at `scope`.
    pub fn listener_count_for(&self, scope: ListenerScope, event: &str) -> usize {
        self.state
            .lock()
            .listeners
            .iter()
            .filter(|l| l.scope == scope && l.event == event)
            .count()
    }

    /// Number of pending timers, single-shot and recurring.
    pub fn timer_count(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Number of recurring timers.
    pub fn interval_count(&self) -> usize {
        self.state
            .lock()
            .timers
            .values()
            .filter(|t| matches!(t, MockTimer::Interval { .. }))
            .count()
    }

    pub fn console_lines(&self) -> Vec<ConsoleLine> {
        self.state.lock().console.clone()
    }

    /// Console lines at `level`, in order.
    pub fn console_text(&self, level: ConsoleLevel) -> Vec<String> {
        self.state
            .lock()
            .console
            .iter()
            .filter(|l| l.level == level)
            .map(|l| l.text.clone())
            .collect()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub fn styles(&self) -> BTreeMap<String, String> {
        self.state.lock().styles.clone()
    }

    pub fn set_window_metrics(&self, metrics: WindowMetrics) {
        self.state.lock().metrics = metrics;
    }

    pub fn set_location(&self, location: impl Into<String>) {
        self.state.lock().location = location.into();
    }

    /// Simulates an open console viewer that formats logged values.
    pub fn set_console_viewer_open(&self, open: bool) {
        self.state.lock().console_viewer_open = open;
    }

    /// Makes every listener and timer removal fail.
    pub fn set_fail_removals(&self, fail: bool) {
        self.state.lock().fail_removals = fail;
    }

    /// Makes window metric reads fail.
    pub fn set_fail_metrics(&self, fail: bool) {
        self.state.lock().fail_metrics = fail;
    }

    fn schedule(&self, timer: impl FnOnce(u64) -> MockTimer) -> TimerHandle {
        let mut state = self.state.lock();
        let id = state.next_timer_id;
        state.next_timer_id += 1;
        let timer = timer(state.now);
        state.timers.insert(id, timer);
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if state.fail_removals {
            return Err(HostError::Timer {
                handle: Some(handle),
                reason: "removal rejected by host".to_string(),
            });
        }
        state.timers.remove(&handle.0);
        Ok(())
    }

    fn push_console(&self, level: ConsoleLevel, text: &str) {
        self.state.lock().console.push(ConsoleLine {
            level,
            text: text.to_string(),
        });
    }
}

enum Fired {
    Once(TimeoutCallback),
    Repeat(IntervalCallback),
}

impl Host for MockHost {
    fn add_listener(
        &self,
        scope: ListenerScope,
        event: &str,
        listener: Listener,
    ) -> Result<(), HostError> {
        let mut state = self.state.lock();
        let duplicate = state
            .listeners
            .iter()
            .any(|l| l.scope == scope && l.event == event && same_listener(&l.listener, &listener));
        if !duplicate {
            state.listeners.push(RegisteredListener {
                scope,
                event: event.to_string(),
                listener,
            });
        }
        Ok(())
    }

    fn remove_listener(
        &self,
        scope: ListenerScope,
        event: &str,
        listener: &Listener,
    ) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if state.fail_removals {
            return Err(HostError::Listener {
                event: event.to_string(),
                scope,
                reason: "removal rejected by host".to_string(),
            });
        }
        state
            .listeners
            .retain(|l| !(l.scope == scope && l.event == event && same_listener(&l.listener, listener)));
        Ok(())
    }

    fn now_ms(&self) -> u64 {
        self.state.lock().now
    }

    fn set_timeout(
        &self,
        delay_ms: u64,
        callback: TimeoutCallback,
    ) -> Result<TimerHandle, HostError> {
        Ok(self.schedule(|now| MockTimer::Timeout {
            due: now + delay_ms,
            callback,
        }))
    }

    fn clear_timeout(&self, handle: TimerHandle) -> Result<(), HostError> {
        self.cancel(handle)
    }

    fn set_interval(
        &self,
        period_ms: u64,
        callback: IntervalCallback,
    ) -> Result<TimerHandle, HostError> {
        let period = period_ms.max(1);
        Ok(self.schedule(|now| MockTimer::Interval {
            due: now + period,
            period,
            callback,
        }))
    }

    fn clear_interval(&self, handle: TimerHandle) -> Result<(), HostError> {
        self.cancel(handle)
    }

    fn console_log(&self, message: &str) {
        self.push_console(ConsoleLevel::Log, message);
    }

    fn console_warn(&self, message: &str) {
        self.push_console(ConsoleLevel::Warn, message);
    }

    fn console_error(&self, message: &str) {
        self.push_console(ConsoleLevel::Error, message);
    }

    fn console_clear(&self) {
        self.push_console(ConsoleLevel::Clear, "");
    }

    fn console_log_value(&self, value: &dyn fmt::Display) {
        // Only a rendering viewer formats the value.
        let open = self.state.lock().console_viewer_open;
        if open {
            let rendered = value.to_string();
            self.push_console(ConsoleLevel::Log, &rendered);
        }
    }

    fn window_metrics(&self) -> Result<WindowMetrics, HostError> {
        let state = self.state.lock();
        if state.fail_metrics {
            return Err(HostError::Unavailable("window metrics".to_string()));
        }
        Ok(state.metrics)
    }

    fn navigate(&self, url: &str) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.navigations.push(url.to_string());
        state.location = url.to_string();
        Ok(())
    }

    fn location(&self) -> String {
        self.state.lock().location.clone()
    }

    fn inject_style(&self, id: &str, css: &str) -> Result<(), HostError> {
        self.state.lock().styles.insert(id.to_string(), css.to_string());
        Ok(())
    }

    fn remove_style(&self, id: &str) -> Result<(), HostError> {
        self.state.lock().styles.remove(id);
        Ok(())
    }
}

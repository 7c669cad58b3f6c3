//! Developer tools detection state machine.

use super::signals::{
    ConsoleProbeSignal, DetectionSignal, EdgeTrigger, WindowChromeSignal, WINDOW_CHROME,
};
use crate::config::{invoke_guarded, DevToolsAction, DevToolsCallback, GuardifySettings};
use crate::guard::violation::{ViolationRecord, ViolationReporter, DEVTOOLS_VIOLATION};
use crate::host::{Host, HostError, InteractionEvent, Listener, TimerHandle};
use crate::input::interception::InterceptionRegistry;
use crate::input::throttle::{Cancellable, Throttle};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Window for resize-driven re-evaluation.
pub const RESIZE_THROTTLE_MS: u64 = 250;

/// Detector view of the inspector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevToolsState {
    #[default]
    Closed,
    Open,
}

impl fmt::Display for DevToolsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevToolsState::Closed => write!(f, "closed"),
            DevToolsState::Open => write!(f, "open"),
        }
    }
}

/// Passed to the custom devtools callback.
#[derive(Debug, Clone, Serialize)]
pub struct DevToolsEvent {
    /// Signal that triggered the detection.
    pub signal: String,
    pub detected_at: DateTime<Utc>,
    pub violation: ViolationRecord,
}

/// Detection response settings, copied out of [`GuardifySettings`].
#[derive(Debug, Clone)]
struct Response {
    message: String,
    interval_ms: u64,
    action: DevToolsAction,
    redirect_url: Option<String>,
}

struct SignalSlot {
    signal: Box<dyn DetectionSignal>,
    trigger: EdgeTrigger,
}

struct DetectorInner {
    host: Arc<dyn Host>,
    reporter: Arc<ViolationReporter>,
    response: Response,
    callback: Option<DevToolsCallback>,
    slots: Mutex<Vec<SignalSlot>>,
    state: Mutex<DevToolsState>,
    running: AtomicBool,
    detections: AtomicU64,
}

/// Polls detection signals and runs the configured response.
///
/// A tick triggers the response when any signal fires under its policy.
/// Sampling failures and panics count as "absent this tick" without touching
/// the signal's trigger state.
///
/// # Example
///
/// ```rust
/// use guardify::config::GuardifySettings;
/// use guardify::detect::{DevToolsDetector, DevToolsState};
/// use guardify::guard::ViolationReporter;
/// use guardify::host::{MockHost, WindowMetrics};
/// use std::sync::Arc;
///
/// let host = Arc::new(MockHost::new());
/// let reporter = Arc::new(ViolationReporter::new(host.clone(), None));
/// let detector = DevToolsDetector::new(host.clone(), reporter.clone(), &GuardifySettings::default(), None);
///
/// host.set_window_metrics(WindowMetrics::new(1000.0, 700.0, 300.0, 0.0));
/// detector.tick();
/// assert_eq!(detector.state(), DevToolsState::Open);
/// assert_eq!(reporter.count(), 1);
/// ```
#[derive(Clone)]
pub struct DevToolsDetector {
    inner: Arc<DetectorInner>,
    resize: Arc<Mutex<Option<Throttle<()>>>>,
}

impl DevToolsDetector {
    /// Detector with the console probe and window chrome signals.
    pub fn new(
        host: Arc<dyn Host>,
        reporter: Arc<ViolationReporter>,
        settings: &GuardifySettings,
        callback: Option<DevToolsCallback>,
    ) -> Self {
        let signals: Vec<Box<dyn DetectionSignal>> = vec![
            Box::new(ConsoleProbeSignal::new(settings.console_signal_policy)),
            Box::new(WindowChromeSignal::new(settings.devtools_threshold_px)),
        ];
        Self::with_signals(host, reporter, settings, callback, signals)
    }

    /// Detector over an explicit signal list.
    pub fn with_signals(
        host: Arc<dyn Host>,
        reporter: Arc<ViolationReporter>,
        settings: &GuardifySettings,
        callback: Option<DevToolsCallback>,
        signals: Vec<Box<dyn DetectionSignal>>,
    ) -> Self {
        let slots = signals
            .into_iter()
            .map(|signal| SignalSlot {
                signal,
                trigger: EdgeTrigger::default(),
            })
            .collect();

        Self {
            inner: Arc::new(DetectorInner {
                host,
                reporter,
                response: Response {
                    message: settings.devtools_message.clone(),
                    interval_ms: settings.devtools_interval_ms,
                    action: settings.devtools_action,
                    redirect_url: settings.devtools_redirect_url.clone(),
                },
                callback,
                slots: Mutex::new(slots),
                state: Mutex::new(DevToolsState::Closed),
                running: AtomicBool::new(true),
                detections: AtomicU64::new(0),
            }),
            resize: Arc::new(Mutex::new(None)),
        }
    }

    /// Starts polling and installs the resize fast path through `registry`.
    ///
    /// Returns the interval handle; the caller owns clearing it.
    pub fn start(&self, registry: &InterceptionRegistry) -> Result<TimerHandle, HostError> {
        self.inner.running.store(true, Ordering::SeqCst);

        let weak: Weak<DetectorInner> = Arc::downgrade(&self.inner);
        let handle = self.inner.host.set_interval(
            self.inner.response.interval_ms,
            Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.tick(None);
                }
            }),
        )?;

        let weak: Weak<DetectorInner> = Arc::downgrade(&self.inner);
        let throttle = Throttle::new(self.inner.host.clone(), RESIZE_THROTTLE_MS, move |()| {
            if let Some(inner) = weak.upgrade() {
                inner.tick(Some(WINDOW_CHROME));
            }
        });
        let on_resize = throttle.clone();
        let listener: Listener = Arc::new(move |_e: &mut InteractionEvent| on_resize.call(()));
        let cancel: Arc<dyn Cancellable> = Arc::new(throttle.clone());
        registry.register_window("resize", listener, Some(cancel));
        *self.resize.lock() = Some(throttle);

        info!(
            interval_ms = self.inner.response.interval_ms,
            action = %self.inner.response.action,
            %handle,
            "DevTools detector started"
        );
        Ok(handle)
    }

    /// Evaluates every signal once.
    pub fn tick(&self) {
        self.inner.tick(None);
    }

    /// Stops reacting and forgets signal history.
    ///
    /// Ticks from an interval the host failed to clear are ignored afterwards.
    pub fn halt(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(throttle) = self.resize.lock().take() {
            throttle.cancel();
        }
        for slot in self.inner.slots.lock().iter_mut() {
            slot.trigger.reset();
        }
        *self.inner.state.lock() = DevToolsState::Closed;
        debug!("DevTools detector halted");
    }

    pub fn state(&self) -> DevToolsState {
        *self.inner.state.lock()
    }

    /// Times the detection response has run.
    pub fn detection_count(&self) -> u64 {
        self.inner.detections.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for DevToolsDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&'static str> = self
            .inner
            .slots
            .lock()
            .iter()
            .map(|s| s.signal.name())
            .collect();
        f.debug_struct("DevToolsDetector")
            .field("signals", &names)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .field("detections", &self.detection_count())
            .finish()
    }
}

impl DetectorInner {
    fn tick(&self, only: Option<&str>) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        invoke_guarded("devtools tick", || {
            if let Some(signal) = self.evaluate(only) {
                self.respond(signal);
            }
        });
    }

    /// Samples signals, returning the first one that fired.
    fn evaluate(&self, only: Option<&str>) -> Option<&'static str> {
        let mut slots = self.slots.lock();
        let mut fired = None;

        for slot in slots.iter_mut() {
            let name = slot.signal.name();
            if only.is_some_and(|wanted| wanted != name) {
                continue;
            }

            let sample = invoke_guarded(name, || slot.signal.sample(self.host.as_ref()));
            let present = match sample {
                Some(Ok(present)) => present,
                Some(Err(e)) => {
                    warn!(signal = name, "Signal sampling failed: {}", e);
                    continue;
                }
                None => continue,
            };

            if slot.trigger.update(present, slot.signal.policy()) && fired.is_none() {
                fired = Some(name);
            }
        }

        let open = slots.iter().any(|s| s.trigger.is_present());
        drop(slots);

        *self.state.lock() = if open {
            DevToolsState::Open
        } else {
            DevToolsState::Closed
        };
        fired
    }

    fn respond(&self, signal: &'static str) {
        self.detections.fetch_add(1, Ordering::SeqCst);
        info!(signal, action = %self.response.action, "DevTools detected");

        self.host.console_clear();
        self.host.console_log(&self.response.message);

        let mut details = Map::new();
        details.insert("signal".to_string(), json!(signal));
        details.insert("action".to_string(), json!(self.response.action.to_string()));
        let violation = self.reporter.report(DEVTOOLS_VIOLATION, details);

        match self.response.action {
            DevToolsAction::Warn => {}
            DevToolsAction::Redirect => match &self.response.redirect_url {
                Some(url) => {
                    if let Err(e) = self.host.navigate(url) {
                        error!(url = %url, "Redirect failed: {}", e);
                    }
                }
                None => debug!("Redirect action without a URL"),
            },
            DevToolsAction::Custom => match &self.callback {
                Some(callback) => {
                    let event = DevToolsEvent {
                        signal: signal.to_string(),
                        detected_at: violation.timestamp,
                        violation,
                    };
                    invoke_guarded("devtools_callback", || callback(&event));
                }
                None => debug!("Custom action without a callback"),
            },
        }
    }
}

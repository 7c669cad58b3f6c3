//! Guardify engine: lifecycle, status and statistics.

use super::violation::ViolationReporter;
use crate::config::{invoke_guarded, ConfigError, GuardifyConfig, GuardifySettings};
use crate::detect::{DevToolsDetector, DevToolsState};
use crate::host::{Host, OutputSink, TimerHandle};
use crate::input::interception::InterceptionRegistry;
use crate::input::keys::KeyMatcher;
use crate::input::selector::ExemptionSet;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Identifier of the injected image-drag stylesheet.
pub const DRAG_STYLE_ID: &str = "guardify-drag-style";

/// Stylesheet injected when drag is disabled.
pub const DRAG_STYLE_CSS: &str =
    "img { -webkit-user-drag: none; user-drag: none; -webkit-touch-callout: none; }";

/// Point-in-time copy of engine state.
#[derive(Debug, Clone, Serialize)]
pub struct GuardifyStatus {
    pub version: String,
    pub instance_id: Uuid,
    pub active: bool,
    pub violation_count: u64,
    /// Listeners currently installed by this instance.
    pub listener_count: usize,
    /// Recurring timers currently owned by this instance.
    pub interval_count: usize,
    pub devtools_state: DevToolsState,
    pub settings: GuardifySettings,
}

/// Interval handles started by one activation.
#[derive(Debug, Default)]
struct ActiveIntervalSet {
    handles: Vec<TimerHandle>,
}

impl ActiveIntervalSet {
    fn insert(&mut self, handle: TimerHandle) {
        if !self.handles.contains(&handle) {
            self.handles.push(handle);
        }
    }

    fn len(&self) -> usize {
        self.handles.len()
    }

    fn take(&mut self) -> Vec<TimerHandle> {
        std::mem::take(&mut self.handles)
    }
}

/// Lifecycle phase.
///
/// `Activating` covers the window in which `activate` builds listeners with
/// the lock released; a `destroy` landing there moves the phase back to
/// `Inactive` and the activation unwinds what it built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Inactive,
    Activating,
    Active,
}

/// Everything one activation installed on the host.
#[derive(Default)]
struct Installed {
    registry: Option<Arc<InterceptionRegistry>>,
    detector: Option<DevToolsDetector>,
    intervals: Vec<TimerHandle>,
    style_injected: bool,
}

#[derive(Default)]
struct EngineState {
    phase: Phase,
    /// Bumped by every activation so a stale one can tell it was superseded.
    generation: u64,
    registry: Option<Arc<InterceptionRegistry>>,
    detector: Option<DevToolsDetector>,
    intervals: ActiveIntervalSet,
    style_injected: bool,
}

impl EngineState {
    fn take_installed(&mut self) -> Installed {
        Installed {
            registry: self.registry.take(),
            detector: self.detector.take(),
            intervals: self.intervals.take(),
            style_injected: std::mem::take(&mut self.style_injected),
        }
    }
}

struct EngineInner {
    id: Uuid,
    host: Arc<dyn Host>,
    config: GuardifyConfig,
    exemptions: Arc<ExemptionSet>,
    reporter: Arc<ViolationReporter>,
    output: OutputSink,
    state: Mutex<EngineState>,
}

/// Interaction-restriction engine.
///
/// Cloning yields another handle to the same instance, so a callback can hold
/// one and call [`Guardify::destroy`] from inside a handler.
///
/// # Example
///
/// ```rust
/// use guardify::config::{GuardifyConfig, GuardifySettings};
/// use guardify::host::{InteractionEvent, MockHost};
/// use guardify::Guardify;
/// use std::sync::Arc;
///
/// let host = Arc::new(MockHost::new());
/// let guard = Guardify::start(host.clone(), GuardifyConfig::default()).unwrap();
///
/// let event = host.dispatch(InteractionEvent::new("contextmenu"));
/// assert!(event.is_default_prevented());
/// assert_eq!(guard.violation_count(), 1);
///
/// guard.destroy();
/// assert_eq!(host.listener_count(), 0);
/// ```
#[derive(Clone)]
pub struct Guardify {
    inner: Arc<EngineInner>,
}

impl Guardify {
    /// Validates `config` and builds an inactive engine.
    pub fn new(host: Arc<dyn Host>, config: GuardifyConfig) -> Result<Self, ConfigError> {
        let exemptions = config.validate()?;
        let reporter = Arc::new(ViolationReporter::new(
            host.clone(),
            config.on_violation_detected.clone(),
        ));
        let output = if config.settings.console_output {
            OutputSink::console(host.clone())
        } else {
            OutputSink::silent()
        };

        let id = Uuid::new_v4();
        debug!(instance = %id, "Guardify created");

        Ok(Self {
            inner: Arc::new(EngineInner {
                id,
                host,
                config,
                exemptions: Arc::new(exemptions),
                reporter,
                output,
                state: Mutex::new(EngineState::default()),
            }),
        })
    }

    /// Builds an engine and activates it.
    pub fn start(host: Arc<dyn Host>, config: GuardifyConfig) -> Result<Self, ConfigError> {
        let guard = Self::new(host, config)?;
        guard.activate();
        Ok(guard)
    }

    /// Installs listeners, the keyboard matcher and the detector.
    ///
    /// Does nothing if already active or activating. If [`Guardify::destroy`]
    /// runs before activation finishes, everything built so far is removed
    /// again and `on_activate` is not called.
    pub fn activate(&self) {
        let inner = &self.inner;
        let generation = {
            let mut state = inner.state.lock();
            if state.phase != Phase::Inactive {
                warn!(instance = %inner.id, phase = ?state.phase, "Guardify is already active");
                inner.output.warn("Guardify is already active.");
                return;
            }
            state.phase = Phase::Activating;
            state.generation += 1;
            state.generation
        };

        let settings = &inner.config.settings;
        let registry = Arc::new(InterceptionRegistry::new(
            inner.host.clone(),
            inner.exemptions.clone(),
            inner.reporter.clone(),
            settings.throttle_ms,
        ));

        for event in settings.blocked_events() {
            registry.register(event);
        }

        let matcher = KeyMatcher::new(
            settings.disable_keys.clone(),
            inner.config.custom_keys.clone(),
        );
        if !matcher.is_empty() {
            registry.register_keydown(matcher);
        }

        let mut intervals = ActiveIntervalSet::default();
        let detector = if settings.detect_devtools {
            let detector = DevToolsDetector::new(
                inner.host.clone(),
                inner.reporter.clone(),
                settings,
                inner.config.devtools_callback.clone(),
            );
            match detector.start(&registry) {
                Ok(handle) => intervals.insert(handle),
                Err(e) => error!(instance = %inner.id, "Failed to start devtools detector: {}", e),
            }
            Some(detector)
        } else {
            None
        };

        let style_injected = settings.disable_drag
            && match inner.host.inject_style(DRAG_STYLE_ID, DRAG_STYLE_CSS) {
                Ok(()) => true,
                Err(e) => {
                    error!(instance = %inner.id, "Failed to inject drag style: {}", e);
                    false
                }
            };

        let listeners = registry.listener_count();
        let interval_count = intervals.len();
        let cancelled = {
            let mut state = inner.state.lock();
            if state.phase == Phase::Activating && state.generation == generation {
                state.phase = Phase::Active;
                state.registry = Some(registry);
                state.detector = detector;
                state.intervals = intervals;
                state.style_injected = style_injected;
                None
            } else {
                Some(Installed {
                    registry: Some(registry),
                    detector,
                    intervals: intervals.take(),
                    style_injected,
                })
            }
        };

        if let Some(installed) = cancelled {
            let (removed, failed) = self.uninstall(installed);
            info!(instance = %inner.id, removed, failed, "Activation cancelled by destroy");
            return;
        }

        info!(
            instance = %inner.id,
            listeners,
            intervals = interval_count,
            "Guardify activated"
        );
        inner.output.log("Guardify activated.");

        if let Some(callback) = &inner.config.on_activate {
            invoke_guarded("on_activate", || callback());
        }
    }

    /// Removes everything this instance installed.
    ///
    /// Individual removal failures are logged and skipped. Does nothing if
    /// inactive. Safe to call from inside one of this instance's handlers.
    /// Called while another thread is still activating, it cancels that
    /// activation, which then removes what it installed itself.
    pub fn destroy(&self) {
        let inner = &self.inner;
        let installed = {
            let mut state = inner.state.lock();
            match state.phase {
                Phase::Inactive => {
                    warn!(instance = %inner.id, "Guardify is not active");
                    inner.output.warn("Guardify is not active.");
                    return;
                }
                Phase::Activating => {
                    state.phase = Phase::Inactive;
                    debug!(instance = %inner.id, "Destroy requested during activation");
                    return;
                }
                Phase::Active => {
                    state.phase = Phase::Inactive;
                    state.take_installed()
                }
            }
        };

        let (removed, failed) = self.uninstall(installed);

        info!(instance = %inner.id, removed, failed, "Guardify destroyed");
        if failed > 0 {
            inner
                .output
                .error(&format!("Guardify could not remove {} item(s).", failed));
        }
        inner.output.log("Guardify deactivated.");

        if let Some(callback) = &inner.config.on_destroy {
            invoke_guarded("on_destroy", || callback());
        }
    }

    /// Halts the detector and removes intervals, listeners and the drag style.
    ///
    /// Returns the removed and failed item counts.
    fn uninstall(&self, installed: Installed) -> (usize, usize) {
        let inner = &self.inner;

        if let Some(detector) = installed.detector {
            detector.halt();
        }

        let mut removed = 0;
        let mut failed = 0;
        for handle in installed.intervals {
            match inner.host.clear_interval(handle) {
                Ok(()) => removed += 1,
                Err(e) => {
                    error!(instance = %inner.id, %handle, "Failed to clear interval: {}", e);
                    failed += 1;
                }
            }
        }

        if let Some(registry) = installed.registry {
            let report = registry.teardown();
            removed += report.removed;
            failed += report.failed;
        }

        if installed.style_injected {
            match inner.host.remove_style(DRAG_STYLE_ID) {
                Ok(()) => removed += 1,
                Err(e) => {
                    error!(instance = %inner.id, "Failed to remove drag style: {}", e);
                    failed += 1;
                }
            }
        }

        (removed, failed)
    }

    /// Snapshot of the current state.
    pub fn status(&self) -> GuardifyStatus {
        let inner = &self.inner;
        let state = inner.state.lock();
        GuardifyStatus {
            version: crate::VERSION.to_string(),
            instance_id: inner.id,
            active: state.phase == Phase::Active,
            violation_count: inner.reporter.count(),
            listener_count: state
                .registry
                .as_ref()
                .map_or(0, |r| r.listener_count()),
            interval_count: state.intervals.len(),
            devtools_state: state
                .detector
                .as_ref()
                .map_or(DevToolsState::Closed, |d| d.state()),
            settings: inner.config.settings.clone(),
        }
    }

    /// Zeroes the violation counter.
    pub fn reset_stats(&self) {
        self.inner.reporter.reset();
        info!(instance = %self.inner.id, "Violation statistics reset");
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().phase == Phase::Active
    }

    pub fn violation_count(&self) -> u64 {
        self.inner.reporter.count()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn settings(&self) -> &GuardifySettings {
        &self.inner.config.settings
    }
}

impl fmt::Debug for Guardify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guardify")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .field("violations", &self.violation_count())
            .finish()
    }
}

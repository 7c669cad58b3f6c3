//! Detection signal sources.
//!
//! A [`DetectionSignal`] samples the host once per tick and answers "is the
//! inspector visible right now". Whether a present sample triggers the
//! detection response depends on the signal's [`SignalPolicy`], tracked per
//! signal by an [`EdgeTrigger`].

use crate::config::SignalPolicy;
use crate::host::{Host, HostError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Name of the console probe signal.
pub const CONSOLE_PROBE: &str = "console-probe";

/// Name of the window chrome signal.
pub const WINDOW_CHROME: &str = "window-chrome";

/// One pluggable detection heuristic.
pub trait DetectionSignal: Send + Sync {
    /// Stable identifier, used in records and for targeted re-evaluation.
    fn name(&self) -> &'static str;

    /// Samples the host.
    fn sample(&self, host: &dyn Host) -> Result<bool, HostError>;

    fn policy(&self) -> SignalPolicy;
}

/// Per-signal trigger state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeTrigger {
    present: bool,
}

impl EdgeTrigger {
    /// Feeds a sample, returning true if it triggers under `policy`.
    ///
    /// Under [`SignalPolicy::Edge`] the signal must be seen absent before it
    /// can trigger again.
    pub fn update(&mut self, present: bool, policy: SignalPolicy) -> bool {
        let was_present = self.present;
        self.present = present;
        match policy {
            SignalPolicy::EveryTick => present,
            SignalPolicy::Edge => present && !was_present,
        }
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn reset(&mut self) {
        self.present = false;
    }
}

/// Value whose formatting marks that a console viewer rendered it.
#[derive(Debug, Default)]
pub struct ConsoleProbe {
    rendered: AtomicBool,
}

impl ConsoleProbe {
    /// Returns and clears the rendered flag.
    pub fn take_rendered(&self) -> bool {
        self.rendered.swap(false, Ordering::SeqCst)
    }
}

impl fmt::Display for ConsoleProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.rendered.store(true, Ordering::SeqCst);
        f.write_str("")
    }
}

/// Logs a [`ConsoleProbe`] and reports whether anything formatted it.
#[derive(Debug)]
pub struct ConsoleProbeSignal {
    probe: Arc<ConsoleProbe>,
    policy: SignalPolicy,
}

impl ConsoleProbeSignal {
    pub fn new(policy: SignalPolicy) -> Self {
        Self {
            probe: Arc::new(ConsoleProbe::default()),
            policy,
        }
    }
}

impl DetectionSignal for ConsoleProbeSignal {
    fn name(&self) -> &'static str {
        CONSOLE_PROBE
    }

    fn sample(&self, host: &dyn Host) -> Result<bool, HostError> {
        self.probe.take_rendered();
        host.console_log_value(self.probe.as_ref());
        Ok(self.probe.take_rendered())
    }

    fn policy(&self) -> SignalPolicy {
        self.policy
    }
}

/// Outer/inner window size delta beyond a threshold, as left by a docked
/// inspector panel.
#[derive(Debug, Clone, Copy)]
pub struct WindowChromeSignal {
    threshold_px: f64,
}

impl WindowChromeSignal {
    pub fn new(threshold_px: u32) -> Self {
        Self {
            threshold_px: f64::from(threshold_px),
        }
    }
}

impl DetectionSignal for WindowChromeSignal {
    fn name(&self) -> &'static str {
        WINDOW_CHROME
    }

    fn sample(&self, host: &dyn Host) -> Result<bool, HostError> {
        let metrics = host.window_metrics()?;
        Ok(metrics.width_delta() > self.threshold_px || metrics.height_delta() > self.threshold_px)
    }

    // Always edge-triggered: the delta persists for as long as the panel is docked.
    fn policy(&self) -> SignalPolicy {
        SignalPolicy::Edge
    }
}

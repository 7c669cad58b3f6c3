//! Scripted sessions against [`MockHost`].
//!
//! A script is a JSON array of steps. Each step drives the mock page (dispatch
//! an event, resize the window, open the console viewer, let time pass) or the
//! engine itself, and produces zero or more [`SimulationOutput`]s.
//!
//! ```json
//! [
//!   {"op": "dispatch", "event": "copy", "target": {"tag": "p"}},
//!   {"op": "dispatch", "event": "keydown", "key": {"key": "F12"}},
//!   {"op": "resize", "chrome_width": 320, "chrome_height": 88},
//!   {"op": "advance", "ms": 1000},
//!   {"op": "status"}
//! ]
//! ```

use crate::config::{ConfigError, GuardifyConfig, GuardifySettings};
use crate::guard::{Guardify, GuardifyStatus, ViolationRecord};
use crate::host::{
    DomNode, ElementRef, Host, InteractionEvent, KeyInfo, ListenerScope, MockHost, WindowMetrics,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Element description used in scripts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetDescriptor {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub parent: Option<Box<TargetDescriptor>>,
}

impl TargetDescriptor {
    fn build(&self) -> DomNode {
        let tag = if self.tag.is_empty() { "div" } else { &self.tag };
        let mut node = DomNode::new(tag);
        if let Some(id) = &self.id {
            node = node.with_id(id);
        }
        for class in &self.classes {
            node = node.with_class(class);
        }
        for (name, value) in &self.attributes {
            node = node.with_attribute(name, value);
        }
        if let Some(parent) = &self.parent {
            node = node.with_parent(Arc::new(parent.build()));
        }
        node
    }

    pub fn to_element(&self) -> ElementRef {
        self.build().into_ref()
    }
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SimulationStep {
    /// Dispatches a document-level event.
    Dispatch {
        event: String,
        #[serde(default)]
        target: Option<TargetDescriptor>,
        #[serde(default)]
        key: Option<KeyInfo>,
    },
    /// Changes the window chrome size and fires `resize` on the window.
    Resize { chrome_width: f64, chrome_height: f64 },
    /// Opens or closes the console viewer.
    ConsoleViewer { open: bool },
    /// Advances the virtual clock.
    Advance { ms: u64 },
    Activate,
    Destroy,
    ResetStats,
    Status,
}

/// Something observed while running a script.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimulationOutput {
    Dispatched {
        event: String,
        prevented: bool,
        propagation_stopped: bool,
    },
    Violation {
        record: ViolationRecord,
    },
    Navigated {
        url: String,
    },
    Status {
        status: GuardifyStatus,
    },
}

/// A mock page with an engine attached.
pub struct Simulation {
    host: Arc<MockHost>,
    guard: Guardify,
    violations: Arc<Mutex<Vec<ViolationRecord>>>,
    navigations_seen: usize,
}

impl Simulation {
    /// Builds and activates an engine for `settings`.
    pub fn new(settings: GuardifySettings) -> Result<Self, ConfigError> {
        let host = Arc::new(MockHost::new());
        let violations = Arc::new(Mutex::new(Vec::new()));
        let sink = violations.clone();
        let config = GuardifyConfig::new(settings)
            .on_violation(move |record| sink.lock().push(record.clone()));
        let guard = Guardify::start(host.clone(), config)?;

        Ok(Self {
            host,
            guard,
            violations,
            navigations_seen: 0,
        })
    }

    pub fn host(&self) -> &Arc<MockHost> {
        &self.host
    }

    pub fn guard(&self) -> &Guardify {
        &self.guard
    }

    /// Runs one step.
    pub fn step(&mut self, step: &SimulationStep) -> Vec<SimulationOutput> {
        let mut outputs = Vec::new();

        let dispatched = match step {
            SimulationStep::Dispatch { event, target, key } => {
                let mut e = match key {
                    Some(key) if event == crate::input::KEYDOWN => InteractionEvent::key_down(key.clone()),
                    _ => InteractionEvent::new(event.clone()),
                };
                if let Some(target) = target {
                    e = e.with_target(target.to_element());
                }
                let e = self.host.dispatch(e);
                Some(SimulationOutput::Dispatched {
                    event: event.clone(),
                    prevented: e.is_default_prevented(),
                    propagation_stopped: e.is_propagation_stopped(),
                })
            }
            SimulationStep::Resize {
                chrome_width,
                chrome_height,
            } => {
                let (inner_width, inner_height) = self
                    .host
                    .window_metrics()
                    .map(|m| (m.inner_width, m.inner_height))
                    .unwrap_or((1280.0, 720.0));
                self.host.set_window_metrics(WindowMetrics::new(
                    inner_width,
                    inner_height,
                    *chrome_width,
                    *chrome_height,
                ));
                self.host
                    .dispatch_at(ListenerScope::Window, InteractionEvent::new("resize"));
                None
            }
            SimulationStep::ConsoleViewer { open } => {
                self.host.set_console_viewer_open(*open);
                None
            }
            SimulationStep::Advance { ms } => {
                self.host.advance(*ms);
                None
            }
            SimulationStep::Activate => {
                self.guard.activate();
                None
            }
            SimulationStep::Destroy => {
                self.guard.destroy();
                None
            }
            SimulationStep::ResetStats => {
                self.guard.reset_stats();
                None
            }
            SimulationStep::Status => Some(SimulationOutput::Status {
                status: self.guard.status(),
            }),
        };

        outputs.extend(
            self.violations
                .lock()
                .drain(..)
                .map(|record| SimulationOutput::Violation { record }),
        );

        let navigations = self.host.navigations();
        outputs.extend(
            navigations[self.navigations_seen..]
                .iter()
                .map(|url| SimulationOutput::Navigated { url: url.clone() }),
        );
        self.navigations_seen = navigations.len();

        outputs.extend(dispatched);
        outputs
    }

    /// Runs every step in order.
    pub fn run(&mut self, steps: &[SimulationStep]) -> Vec<SimulationOutput> {
        steps.iter().flat_map(|step| self.step(step)).collect()
    }
}

/// Parses a JSON script.
pub fn parse_script(source: &str) -> Result<Vec<SimulationStep>, serde_json::Error> {
    serde_json::from_str(source)
}

/// Script used when none is supplied.
pub fn demo_script() -> Vec<SimulationStep> {
    vec![
        SimulationStep::Dispatch {
            event: "contextmenu".to_string(),
            target: Some(TargetDescriptor {
                tag: "img".to_string(),
                ..Default::default()
            }),
            key: None,
        },
        SimulationStep::Dispatch {
            event: crate::input::KEYDOWN.to_string(),
            target: None,
            key: Some(KeyInfo::new("I").ctrl().shift()),
        },
        SimulationStep::Dispatch {
            event: "copy".to_string(),
            target: Some(TargetDescriptor {
                tag: "p".to_string(),
                ..Default::default()
            }),
            key: None,
        },
        SimulationStep::Resize {
            chrome_width: 340.0,
            chrome_height: 88.0,
        },
        SimulationStep::Advance { ms: 3000 },
        SimulationStep::Status,
        SimulationStep::Destroy,
        SimulationStep::Status,
    ]
}

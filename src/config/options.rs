//! Settings plus the callbacks that cannot live in a file.

use super::callbacks::{DevToolsCallback, KeyPredicate, LifecycleCallback, ViolationCallback};
use super::settings::{ConfigError, GuardifySettings};
use crate::detect::DevToolsEvent;
use crate::guard::ViolationRecord;
use crate::host::InteractionEvent;
use crate::input::selector::ExemptionSet;
use std::fmt;
use std::sync::Arc;

/// Full engine configuration.
///
/// Fixed once handed to [`crate::Guardify::new`]; the engine keeps its own
/// copy.
#[derive(Clone, Default)]
pub struct GuardifyConfig {
    pub settings: GuardifySettings,
    /// Extra keydown rules, checked after `settings.disable_keys`.
    pub custom_keys: Vec<KeyPredicate>,
    /// Called on detection when the action is `Custom`.
    pub devtools_callback: Option<DevToolsCallback>,
    pub on_violation_detected: Option<ViolationCallback>,
    pub on_activate: Option<LifecycleCallback>,
    pub on_destroy: Option<LifecycleCallback>,
}

impl GuardifyConfig {
    pub fn new(settings: GuardifySettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Adds a keydown predicate.
    pub fn with_custom_key<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&InteractionEvent) -> bool + Send + Sync + 'static,
    {
        self.custom_keys.push(Arc::new(predicate));
        self
    }

    pub fn on_devtools<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DevToolsEvent) + Send + Sync + 'static,
    {
        self.devtools_callback = Some(Arc::new(callback));
        self
    }

    pub fn on_violation<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ViolationRecord) + Send + Sync + 'static,
    {
        self.on_violation_detected = Some(Arc::new(callback));
        self
    }

    pub fn on_activate<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_activate = Some(Arc::new(callback));
        self
    }

    pub fn on_destroy<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_destroy = Some(Arc::new(callback));
        self
    }

    /// Validates settings and compiles the exclusion selectors.
    pub fn validate(&self) -> Result<ExemptionSet, ConfigError> {
        self.settings.validate()?;
        self.settings.compile_exemptions()
    }
}

impl fmt::Debug for GuardifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardifyConfig")
            .field("settings", &self.settings)
            .field("custom_keys", &self.custom_keys.len())
            .field("devtools_callback", &self.devtools_callback.is_some())
            .field("on_violation_detected", &self.on_violation_detected.is_some())
            .field("on_activate", &self.on_activate.is_some())
            .field("on_destroy", &self.on_destroy.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_callbacks() {
        let config = GuardifyConfig::default()
            .with_custom_key(|e| e.event_type() == "keydown")
            .on_activate(|| {})
            .on_violation(|_| {});

        assert_eq!(config.custom_keys.len(), 1);
        assert!(config.on_activate.is_some());
        assert!(config.on_violation_detected.is_some());
        assert!(config.on_destroy.is_none());
        assert!(format!("{:?}", config).contains("custom_keys: 1"));
    }

    #[test]
    fn test_validate_compiles_exemptions() {
        let config = GuardifyConfig::new(
            GuardifySettings::default()
                .with_excluded("input")
                .with_excluded(".copyable"),
        );
        assert_eq!(config.validate().unwrap().len(), 2);

        let config = GuardifyConfig::new(GuardifySettings::default().with_devtools_interval(50));
        assert!(config.validate().is_err());
    }
}

//! Guardify settings and configuration loading.
//!
//! Settings are the plain-data part of the configuration. They can be loaded
//! from files, environment variables and CLI arguments with the usual
//! precedence, and are validated eagerly: an out-of-range interval, an
//! unknown key combination or a malformed exclusion selector is an error, not
//! a silently corrected value.

use crate::input::interception::InterceptedEvent;
use crate::input::keys::{KeyCombination, UnknownKeyCombination};
use crate::input::selector::{ExemptionSet, SelectorError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Smallest accepted devtools polling interval.
pub const MIN_DEVTOOLS_INTERVAL_MS: u64 = 100;

/// Default window-chrome threshold in logical pixels.
pub const DEFAULT_DEVTOOLS_THRESHOLD_PX: u32 = 160;

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// Failed to serialize TOML configuration.
    #[error("Failed to serialize TOML configuration: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// Failed to parse JSON configuration.
    #[error("Failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// A key combination name is not in the table.
    #[error(transparent)]
    UnknownKey(#[from] UnknownKeyCombination),

    /// An exclusion selector could not be parsed.
    #[error("Invalid exclusion selector '{selector}': {source}")]
    InvalidSelector {
        selector: String,
        #[source]
        source: SelectorError,
    },

    /// Unsupported file format.
    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

/// Response once developer tools are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevToolsAction {
    /// Message and violation record only.
    Warn,
    /// Navigate to `devtools_redirect_url`.
    Redirect,
    /// Invoke the configured devtools callback.
    Custom,
}

impl Default for DevToolsAction {
    fn default() -> Self {
        Self::Warn
    }
}

impl std::fmt::Display for DevToolsAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DevToolsAction::Warn => write!(f, "warn"),
            DevToolsAction::Redirect => write!(f, "redirect"),
            DevToolsAction::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for DevToolsAction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "warn" => Ok(DevToolsAction::Warn),
            "redirect" => Ok(DevToolsAction::Redirect),
            "custom" => Ok(DevToolsAction::Custom),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown devtools action: {}. Valid actions are: warn, redirect, custom",
                s
            ))),
        }
    }
}

/// When a detection signal triggers the devtools response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalPolicy {
    /// Every tick on which the signal is present.
    EveryTick,
    /// Only when the signal goes from absent to present.
    Edge,
}

impl Default for SignalPolicy {
    fn default() -> Self {
        Self::Edge
    }
}

impl std::fmt::Display for SignalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalPolicy::EveryTick => write!(f, "every-tick"),
            SignalPolicy::Edge => write!(f, "edge"),
        }
    }
}

impl std::str::FromStr for SignalPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "every-tick" | "every_tick" | "tick" => Ok(SignalPolicy::EveryTick),
            "edge" => Ok(SignalPolicy::Edge),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown signal policy: {}. Valid policies are: every-tick, edge",
                s
            ))),
        }
    }
}

/// Plain-data Guardify settings.
///
/// # Example
///
/// ```rust
/// use guardify::config::{DevToolsAction, GuardifySettings};
///
/// let settings = GuardifySettings::default()
///     .with_devtools_interval(500)
///     .with_devtools_action(DevToolsAction::Redirect)
///     .with_redirect_url("/blocked.html")
///     .with_excluded(".copyable");
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardifySettings {
    /// Block the context menu.
    #[serde(default = "default_true")]
    pub disable_context_menu: bool,

    /// Block text selection.
    #[serde(default = "default_true")]
    pub disable_select_start: bool,

    /// Block copy.
    #[serde(default = "default_true")]
    pub disable_copy: bool,

    /// Block cut.
    #[serde(default)]
    pub disable_cut: bool,

    /// Block paste.
    #[serde(default)]
    pub disable_paste: bool,

    /// Block drag and inject the image-drag style.
    #[serde(default)]
    pub disable_drag: bool,

    /// Shortcuts to suppress, checked in order.
    #[serde(default = "default_disable_keys")]
    pub disable_keys: Vec<KeyCombination>,

    /// Run the devtools detector.
    #[serde(default = "default_true")]
    pub detect_devtools: bool,

    /// Console message emitted on detection.
    #[serde(default = "default_devtools_message")]
    pub devtools_message: String,

    /// Detector polling interval in milliseconds.
    #[serde(default = "default_devtools_interval_ms")]
    pub devtools_interval_ms: u64,

    /// Response once devtools are detected.
    #[serde(default)]
    pub devtools_action: DevToolsAction,

    /// Target for [`DevToolsAction::Redirect`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devtools_redirect_url: Option<String>,

    /// Outer/inner dimension delta that counts as docked devtools.
    #[serde(default = "default_devtools_threshold_px")]
    pub devtools_threshold_px: u32,

    /// Trigger policy for the console probe signal.
    #[serde(default)]
    pub console_signal_policy: SignalPolicy,

    /// Violation reporting window per event type in milliseconds.
    #[serde(default)]
    pub throttle_ms: u64,

    /// Regions excluded from interception.
    #[serde(default)]
    pub exclude_selectors: Vec<String>,

    /// Write lifecycle notices to the page console.
    #[serde(default = "default_true")]
    pub console_output: bool,
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_disable_keys() -> Vec<KeyCombination> {
    vec![
        KeyCombination::F12,
        KeyCombination::CtrlShiftI,
        KeyCombination::CtrlU,
    ]
}

fn default_devtools_message() -> String {
    "Developer tools are not allowed on this site.".to_string()
}

fn default_devtools_interval_ms() -> u64 {
    1000
}

fn default_devtools_threshold_px() -> u32 {
    DEFAULT_DEVTOOLS_THRESHOLD_PX
}

impl Default for GuardifySettings {
    fn default() -> Self {
        Self {
            disable_context_menu: true,
            disable_select_start: true,
            disable_copy: true,
            disable_cut: false,
            disable_paste: false,
            disable_drag: false,
            disable_keys: default_disable_keys(),
            detect_devtools: true,
            devtools_message: default_devtools_message(),
            devtools_interval_ms: default_devtools_interval_ms(),
            devtools_action: DevToolsAction::default(),
            devtools_redirect_url: None,
            devtools_threshold_px: default_devtools_threshold_px(),
            console_signal_policy: SignalPolicy::default(),
            throttle_ms: 0,
            exclude_selectors: Vec::new(),
            console_output: true,
        }
    }
}

impl GuardifySettings {
    /// Creates settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings with every interception and the detector switched off.
    pub fn permissive() -> Self {
        Self {
            disable_context_menu: false,
            disable_select_start: false,
            disable_copy: false,
            disable_keys: Vec::new(),
            detect_devtools: false,
            ..Self::default()
        }
    }

    /// Loads settings from a `.toml` or `.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        match extension_of(path).as_str() {
            "toml" => Ok(toml::from_str(&content)?),
            "json" => Ok(serde_json::from_str(&content)?),
            ext => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Saves settings to a `.toml` or `.json` file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = match extension_of(path).as_str() {
            "toml" => toml::to_string_pretty(self)?,
            "json" => serde_json::to_string_pretty(self)?,
            ext => return Err(ConfigError::UnsupportedFormat(ext.to_string())),
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Loads settings from `GUARDIFY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_with_env()
    }

    /// Applies `GUARDIFY_*` environment overrides.
    ///
    /// Boolean variables accept `true`/`false`/`1`/`0` in any case and reject
    /// anything else; `GUARDIFY_DISABLE_KEYS` is a
    /// comma-separated list and `GUARDIFY_EXCLUDE_SELECTORS` is separated by
    /// semicolons, since selectors may contain commas.
    pub fn merge_with_env(mut self) -> Result<Self, ConfigError> {
        self.apply_overrides(|name| env::var(name).ok())?;
        Ok(self)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| -> Result<Option<bool>, ConfigError> {
            lookup(name)
                .map(|v| match v.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(true),
                    "false" | "0" => Ok(false),
                    _ => Err(ConfigError::ValidationError(format!(
                        "{} must be true, false, 1 or 0, got '{}'",
                        name, v
                    ))),
                })
                .transpose()
        };
        let number = |name: &str| -> Result<Option<u64>, ConfigError> {
            lookup(name)
                .map(|v| {
                    v.trim().parse::<u64>().map_err(|_| {
                        ConfigError::ValidationError(format!("{} must be a non-negative integer, got '{}'", name, v))
                    })
                })
                .transpose()
        };

        if let Some(v) = flag("GUARDIFY_DISABLE_CONTEXT_MENU")? {
            self.disable_context_menu = v;
        }
        if let Some(v) = flag("GUARDIFY_DISABLE_SELECT_START")? {
            self.disable_select_start = v;
        }
        if let Some(v) = flag("GUARDIFY_DISABLE_COPY")? {
            self.disable_copy = v;
        }
        if let Some(v) = flag("GUARDIFY_DISABLE_CUT")? {
            self.disable_cut = v;
        }
        if let Some(v) = flag("GUARDIFY_DISABLE_PASTE")? {
            self.disable_paste = v;
        }
        if let Some(v) = flag("GUARDIFY_DISABLE_DRAG")? {
            self.disable_drag = v;
        }
        if let Some(keys) = lookup("GUARDIFY_DISABLE_KEYS") {
            self.disable_keys = parse_key_list(&keys)?;
        }
        if let Some(v) = flag("GUARDIFY_DETECT_DEVTOOLS")? {
            self.detect_devtools = v;
        }
        if let Some(message) = lookup("GUARDIFY_DEVTOOLS_MESSAGE") {
            self.devtools_message = message;
        }
        if let Some(interval) = number("GUARDIFY_DEVTOOLS_INTERVAL_MS")? {
            self.devtools_interval_ms = interval;
        }
        if let Some(action) = lookup("GUARDIFY_DEVTOOLS_ACTION") {
            self.devtools_action = action.parse()?;
        }
        if let Some(url) = lookup("GUARDIFY_DEVTOOLS_REDIRECT_URL") {
            self.devtools_redirect_url = Some(url);
        }
        if let Some(policy) = lookup("GUARDIFY_CONSOLE_SIGNAL_POLICY") {
            self.console_signal_policy = policy.parse()?;
        }
        if let Some(throttle) = number("GUARDIFY_THROTTLE_MS")? {
            self.throttle_ms = throttle;
        }
        if let Some(selectors) = lookup("GUARDIFY_EXCLUDE_SELECTORS") {
            self.exclude_selectors = selectors
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = flag("GUARDIFY_CONSOLE_OUTPUT")? {
            self.console_output = v;
        }

        Ok(())
    }

    /// Merges settings with CLI arguments.
    pub fn merge_with_args(mut self, args: &CliArgs) -> Result<Self, ConfigError> {
        if let Some(interval) = args.devtools_interval_ms {
            self.devtools_interval_ms = interval;
        }
        if let Some(throttle) = args.throttle_ms {
            self.throttle_ms = throttle;
        }
        if let Some(detect) = args.detect_devtools {
            self.detect_devtools = detect;
        }
        if let Some(ref action) = args.devtools_action {
            self.devtools_action = action.parse()?;
        }
        if let Some(ref url) = args.redirect_url {
            self.devtools_redirect_url = Some(url.clone());
        }
        if let Some(ref message) = args.devtools_message {
            self.devtools_message = message.clone();
        }
        if let Some(ref keys) = args.disable_keys {
            self.disable_keys = parse_key_list(keys)?;
        }
        if let Some(ref policy) = args.console_signal_policy {
            self.console_signal_policy = policy.parse()?;
        }
        if !args.exclude_selectors.is_empty() {
            self.exclude_selectors = args.exclude_selectors.clone();
        }
        if let Some(enabled) = args.console_output {
            self.console_output = enabled;
        }
        for event in &args.allow_events {
            self.set_blocked(*event, false);
        }
        for event in &args.block_events {
            self.set_blocked(*event, true);
        }

        Ok(self)
    }

    /// Validates all settings.
    ///
    /// # Errors
    ///
    /// Returns an error if any setting is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devtools_interval_ms < MIN_DEVTOOLS_INTERVAL_MS {
            return Err(ConfigError::ValidationError(format!(
                "DevTools interval must be at least {}ms, got {}ms",
                MIN_DEVTOOLS_INTERVAL_MS, self.devtools_interval_ms
            )));
        }

        if self.devtools_threshold_px == 0 {
            return Err(ConfigError::ValidationError(
                "DevTools threshold must be at least 1 pixel".to_string(),
            ));
        }

        if let Some(ref url) = self.devtools_redirect_url {
            if url.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "DevTools redirect URL cannot be blank".to_string(),
                ));
            }
        }

        self.compile_exemptions()?;
        Ok(())
    }

    /// Parses the exclusion selectors.
    pub fn compile_exemptions(&self) -> Result<ExemptionSet, ConfigError> {
        ExemptionSet::compile(&self.exclude_selectors)
            .map_err(|(selector, source)| ConfigError::InvalidSelector { selector, source })
    }

    /// Interaction events this configuration intercepts, in install order.
    pub fn blocked_events(&self) -> Vec<InterceptedEvent> {
        InterceptedEvent::ALL
            .into_iter()
            .filter(|event| self.is_blocked(*event))
            .collect()
    }

    /// True if `event` is intercepted.
    pub fn is_blocked(&self, event: InterceptedEvent) -> bool {
        match event {
            InterceptedEvent::ContextMenu => self.disable_context_menu,
            InterceptedEvent::SelectStart => self.disable_select_start,
            InterceptedEvent::Copy => self.disable_copy,
            InterceptedEvent::Cut => self.disable_cut,
            InterceptedEvent::Paste => self.disable_paste,
            InterceptedEvent::DragStart => self.disable_drag,
        }
    }

    /// Switches interception of `event` on or off.
    pub fn set_blocked(&mut self, event: InterceptedEvent, blocked: bool) {
        match event {
            InterceptedEvent::ContextMenu => self.disable_context_menu = blocked,
            InterceptedEvent::SelectStart => self.disable_select_start = blocked,
            InterceptedEvent::Copy => self.disable_copy = blocked,
            InterceptedEvent::Cut => self.disable_cut = blocked,
            InterceptedEvent::Paste => self.disable_paste = blocked,
            InterceptedEvent::DragStart => self.disable_drag = blocked,
        }
    }

    // Builder-style methods for convenient configuration

    /// Switches interception of `event` on or off.
    pub fn with_blocked(mut self, event: InterceptedEvent, blocked: bool) -> Self {
        self.set_blocked(event, blocked);
        self
    }

    /// Replaces the disabled key combinations.
    pub fn with_keys(mut self, keys: Vec<KeyCombination>) -> Self {
        self.disable_keys = keys;
        self
    }

    /// Enables or disables the devtools detector.
    pub fn with_devtools_detection(mut self, enabled: bool) -> Self {
        self.detect_devtools = enabled;
        self
    }

    /// Sets the detector polling interval.
    pub fn with_devtools_interval(mut self, interval_ms: u64) -> Self {
        self.devtools_interval_ms = interval_ms;
        self
    }

    /// Sets the detection message.
    pub fn with_devtools_message(mut self, message: impl Into<String>) -> Self {
        self.devtools_message = message.into();
        self
    }

    /// Sets the detection response.
    pub fn with_devtools_action(mut self, action: DevToolsAction) -> Self {
        self.devtools_action = action;
        self
    }

    /// Sets the redirect target.
    pub fn with_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.devtools_redirect_url = Some(url.into());
        self
    }

    /// Sets the console probe trigger policy.
    pub fn with_console_signal_policy(mut self, policy: SignalPolicy) -> Self {
        self.console_signal_policy = policy;
        self
    }

    /// Sets the violation reporting window.
    pub fn with_throttle(mut self, throttle_ms: u64) -> Self {
        self.throttle_ms = throttle_ms;
        self
    }

    /// Adds an exclusion selector.
    pub fn with_excluded(mut self, selector: impl Into<String>) -> Self {
        self.exclude_selectors.push(selector.into());
        self
    }

    /// Enables or disables lifecycle notices on the page console.
    pub fn with_console_output(mut self, enabled: bool) -> Self {
        self.console_output = enabled;
        self
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Parses a comma-separated list of key combination names.
pub fn parse_key_list(list: &str) -> Result<Vec<KeyCombination>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<KeyCombination>().map_err(ConfigError::from))
        .collect()
}

/// CLI argument structure for parsing command line options.
///
/// All fields are optional to allow partial overrides.
#[derive(Debug, Default, Clone)]
pub struct CliArgs {
    /// Configuration file path.
    pub config_file: Option<PathBuf>,
    /// Detector polling interval.
    pub devtools_interval_ms: Option<u64>,
    /// Violation reporting window.
    pub throttle_ms: Option<u64>,
    /// Enable or disable the detector.
    pub detect_devtools: Option<bool>,
    /// Devtools action (warn, redirect, custom).
    pub devtools_action: Option<String>,
    /// Redirect target.
    pub redirect_url: Option<String>,
    /// Detection message.
    pub devtools_message: Option<String>,
    /// Comma-separated key combinations.
    pub disable_keys: Option<String>,
    /// Console probe trigger policy.
    pub console_signal_policy: Option<String>,
    /// Exclusion selectors; replaces the configured list when non-empty.
    pub exclude_selectors: Vec<String>,
    /// Lifecycle notices on the page console.
    pub console_output: Option<bool>,
    /// Events to stop intercepting.
    pub allow_events: Vec<InterceptedEvent>,
    /// Events to start intercepting.
    pub block_events: Vec<InterceptedEvent>,
}

impl CliArgs {
    /// Creates an empty CliArgs instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the final settings by applying the full configuration chain.
    ///
    /// 1. Default values
    /// 2. Configuration file (if specified)
    /// 3. Environment variables
    /// 4. CLI arguments (self)
    pub fn load_settings(&self) -> Result<GuardifySettings, ConfigError> {
        let settings = match self.config_file {
            Some(ref config_file) => GuardifySettings::from_file(config_file)?,
            None => GuardifySettings::default(),
        };

        let settings = settings.merge_with_env()?.merge_with_args(self)?;
        settings.validate()?;

        Ok(settings)
    }
}

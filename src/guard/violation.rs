//! Violation counting and records.

use crate::config::{invoke_guarded, ViolationCallback};
use crate::host::Host;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Kind used for devtools detections.
pub const DEVTOOLS_VIOLATION: &str = "devtools";

/// A single restricted interaction or detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Event name (`copy`, `keydown`, ...) or `devtools`.
    #[serde(rename = "type")]
    pub kind: String,
    pub details: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    /// Starts at 1 and increases with every record until reset.
    pub sequence: u64,
    /// Page location at the time of the violation.
    pub context: String,
}

impl ViolationRecord {
    /// Looks up a detail field.
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }
}

impl fmt::Display for ViolationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} at {}", self.sequence, self.kind, self.context)
    }
}

/// Counts violations and hands records to the observer.
///
/// The counter is bumped before the observer runs, so an observer reading
/// [`ViolationReporter::count`] sees its own record included.
pub struct ViolationReporter {
    host: Arc<dyn Host>,
    counter: AtomicU64,
    observer: Option<ViolationCallback>,
}

impl ViolationReporter {
    pub fn new(host: Arc<dyn Host>, observer: Option<ViolationCallback>) -> Self {
        Self {
            host,
            counter: AtomicU64::new(0),
            observer,
        }
    }

    /// Records a violation and notifies the observer.
    pub fn report(&self, kind: &str, details: Map<String, Value>) -> ViolationRecord {
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let record = ViolationRecord {
            kind: kind.to_string(),
            details,
            timestamp: Utc::now(),
            sequence,
            context: self.host.location(),
        };

        warn!(
            kind = %record.kind,
            sequence = record.sequence,
            context = %record.context,
            "Violation detected"
        );

        if let Some(observer) = &self.observer {
            invoke_guarded("on_violation_detected", || observer(&record));
        }
        record
    }

    /// Violations since construction or the last reset.
    pub fn count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Zeroes the counter. Already emitted records are unaffected.
    pub fn reset(&self) {
        self.counter.store(0, Ordering::SeqCst);
    }
}

impl fmt::Debug for ViolationReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViolationReporter")
            .field("count", &self.count())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockHost;
    use parking_lot::Mutex;
    use serde_json::json;

    fn details(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn test_sequence_starts_at_one() {
        let host = Arc::new(MockHost::new());
        let reporter = ViolationReporter::new(host, None);

        let first = reporter.report("copy", Map::new());
        let second = reporter.report("paste", Map::new());

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(reporter.count(), 2);
        assert_eq!(first.context, "https://example.com/");
    }

    #[test]
    fn test_observer_sees_updated_counter() {
        let host = Arc::new(MockHost::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: ViolationCallback = Arc::new(move |record: &ViolationRecord| {
            sink.lock().push(record.sequence);
        });
        let reporter = Arc::new(ViolationReporter::new(host, Some(observer)));

        reporter.report("contextmenu", details(&[("target", "img")]));
        reporter.report("contextmenu", Map::new());

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let host = Arc::new(MockHost::new());
        let observer: ViolationCallback = Arc::new(|_: &ViolationRecord| panic!("observer"));
        let reporter = ViolationReporter::new(host, Some(observer));

        reporter.report("copy", Map::new());
        reporter.report("copy", Map::new());
        assert_eq!(reporter.count(), 2);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let host = Arc::new(MockHost::new());
        let reporter = ViolationReporter::new(host, None);

        reporter.report("copy", Map::new());
        reporter.report("copy", Map::new());
        reporter.reset();

        assert_eq!(reporter.count(), 0);
        assert_eq!(reporter.report("cut", Map::new()).sequence, 1);
    }

    #[test]
    fn test_record_serializes_kind_as_type() {
        let host = Arc::new(MockHost::new());
        let reporter = ViolationReporter::new(host, None);
        let record = reporter.report("keydown", details(&[("key", "F12")]));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "keydown");
        assert_eq!(value["details"]["key"], "F12");
        assert_eq!(value["sequence"], 1);

        let parsed: ViolationRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, record);
    }
}

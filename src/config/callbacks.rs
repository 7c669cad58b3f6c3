//! Callback types and panic isolation for user-supplied code.

use crate::detect::DevToolsEvent;
use crate::guard::ViolationRecord;
use crate::host::InteractionEvent;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// Extra keydown rule; returning true suppresses the event.
pub type KeyPredicate = Arc<dyn Fn(&InteractionEvent) -> bool + Send + Sync>;

/// Observer for every recorded violation.
pub type ViolationCallback = Arc<dyn Fn(&ViolationRecord) + Send + Sync>;

/// Fired after `activate` / `destroy`.
pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;

/// Custom devtools response.
pub type DevToolsCallback = Arc<dyn Fn(&DevToolsEvent) + Send + Sync>;

/// Runs user code, turning a panic into `None` and a log line.
///
/// Callbacks run inside host event dispatch and timer ticks; a panic there
/// must not take down the listener or the timer that invoked it.
pub fn invoke_guarded<R>(label: &str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            error!(callback = label, "Callback panicked: {}", panic_message(payload.as_ref()));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_guarded_passes_value_through() {
        assert_eq!(invoke_guarded("ok", || 42), Some(42));
    }

    #[test]
    fn test_invoke_guarded_catches_panic() {
        let result: Option<()> = invoke_guarded("boom", || panic!("boom"));
        assert!(result.is_none());

        let result: Option<u8> = invoke_guarded("formatted", || panic!("code {}", 7));
        assert!(result.is_none());
    }
}

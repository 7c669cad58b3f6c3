//! Leading-plus-trailing throttle driven by the host scheduler.
//!
//! A [`Throttle`] runs its function immediately when the window since the
//! last execution has elapsed. Calls that land inside the window collapse into
//! a single trailing execution at the end of the window, using the arguments
//! of the most recent call. A burst of any size therefore produces at most two
//! executions. When the host runs the trailing timer late, the next call
//! first runs the overdue trailing call and then its own.
//!
//! # Example
//!
//! ```rust
//! use guardify::host::MockHost;
//! use guardify::input::Throttle;
//! use parking_lot::Mutex;
//! use std::sync::Arc;
//!
//! let host = Arc::new(MockHost::new());
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let throttle = Throttle::new(host.clone(), 100, move |n: u32| sink.lock().push(n));
//!
//! for n in 1..=5 {
//!     throttle.call(n);
//! }
//! host.advance(100);
//! assert_eq!(*seen.lock(), vec![1, 5]);
//! ```

use crate::host::{Host, TimerHandle};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{error, trace};

/// Something holding a deferred call that teardown must drop.
pub trait Cancellable: Send + Sync {
    /// Drops any pending deferred call.
    fn cancel(&self);
}

struct ThrottleState<A> {
    last_run: Option<u64>,
    pending: Option<PendingCall<A>>,
    generation: u64,
}

impl<A> Default for ThrottleState<A> {
    fn default() -> Self {
        Self {
            last_run: None,
            pending: None,
            generation: 0,
        }
    }
}

/// The deferred trailing call, holding the arguments it will run with.
struct PendingCall<A> {
    handle: TimerHandle,
    generation: u64,
    args: A,
}

struct ThrottleInner<A> {
    host: Arc<dyn Host>,
    delay_ms: u64,
    func: Box<dyn Fn(A) + Send + Sync>,
    state: Mutex<ThrottleState<A>>,
}

/// Rate-limits a function to one execution per `delay_ms`.
pub struct Throttle<A> {
    inner: Arc<ThrottleInner<A>>,
}

impl<A> Clone for Throttle<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A> fmt::Debug for Throttle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Throttle")
            .field("delay_ms", &self.inner.delay_ms)
            .field("last_run", &state.last_run)
            .field("pending", &state.pending.is_some())
            .finish()
    }
}

impl<A: Send + 'static> Throttle<A> {
    /// Wraps `func` so it runs at most once per `delay_ms`.
    ///
    /// A delay of zero disables throttling: every call runs immediately.
    pub fn new<F>(host: Arc<dyn Host>, delay_ms: u64, func: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ThrottleInner {
                host,
                delay_ms,
                func: Box::new(func),
                state: Mutex::new(ThrottleState::default()),
            }),
        }
    }

    /// Invokes the throttled function.
    pub fn call(&self, args: A) {
        let inner = &self.inner;
        let now = inner.host.now_ms();
        let mut state = inner.state.lock();

        let elapsed = state.last_run.map(|last| now.saturating_sub(last));
        let ready = inner.delay_ms == 0 || elapsed.map_or(true, |e| e >= inner.delay_ms);

        if ready {
            // The window closed but the host has not fired the trailing call
            // yet. It still runs, ahead of this one.
            let overdue = state.pending.take();
            state.last_run = Some(now);
            drop(state);

            if let Some(overdue) = overdue {
                inner.clear(overdue.handle);
                trace!(handle = %overdue.handle, "Running overdue trailing call");
                (inner.func)(overdue.args);
            }
            (inner.func)(args);
            return;
        }

        let remaining = inner.delay_ms - elapsed.unwrap_or(0);
        if let Some(superseded) = state.pending.take() {
            inner.clear(superseded.handle);
        }

        state.generation += 1;
        let generation = state.generation;
        let weak: Weak<ThrottleInner<A>> = Arc::downgrade(inner);

        let scheduled = inner.host.set_timeout(
            remaining,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.fire_trailing(generation);
                }
            }),
        );

        match scheduled {
            Ok(handle) => {
                trace!(remaining, %handle, "Trailing call scheduled");
                state.pending = Some(PendingCall {
                    handle,
                    generation,
                    args,
                });
            }
            Err(e) => error!("Failed to schedule trailing call: {}", e),
        }
    }

    /// True while a trailing call is waiting for its window to close.
    pub fn has_pending(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }

    /// Configured window in milliseconds.
    pub fn delay_ms(&self) -> u64 {
        self.inner.delay_ms
    }
}

impl<A> ThrottleInner<A> {
    fn fire_trailing(&self, generation: u64) {
        let mut state = self.state.lock();
        let pending = match state.pending.take() {
            Some(pending) if pending.generation == generation => pending,
            // Superseded or cancelled, but the host fired it anyway.
            other => {
                state.pending = other;
                return;
            }
        };
        state.last_run = Some(self.host.now_ms());
        drop(state);
        (self.func)(pending.args);
    }

    fn clear(&self, handle: TimerHandle) {
        if let Err(e) = self.host.clear_timeout(handle) {
            error!("Failed to clear trailing call {}: {}", handle, e);
        }
    }
}

impl<A: Send + 'static> Cancellable for Throttle<A> {
    fn cancel(&self) {
        let pending = self.inner.state.lock().pending.take();
        if let Some(pending) = pending {
            self.inner.clear(pending.handle);
        }
    }
}

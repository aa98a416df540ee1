//! One-shot completion handle: a condition-variable-backed result cell with
//! wait/poll/read semantics.
//!
//! The public contract is blocking-with-timeout plus polling — no cooperative task
//! abstraction. The driver is thread-based by design because the transport read is a
//! blocking call, so handles are built on `std::sync::{Mutex, Condvar}` rather than
//! an async notifier.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::DriverError;

enum State<T> {
    Pending,
    Fulfilled(T),
    Failed(DriverError),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    condvar: Condvar,
}

/// A one-shot completable result cell shared between the I/O engine (which
/// transitions it exactly once) and any number of foreground threads (which wait on
/// or poll it).
pub struct Handle<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// The engine-side half of a handle: created alongside the [`Handle`] and held by
/// the registry so the reader loop can finalize it exactly once.
pub struct Completer<T> {
    inner: Arc<Inner<T>>,
}

/// Create a linked (`Handle`, `Completer`) pair, both pending.
pub fn pair<T>() -> (Handle<T>, Completer<T>) {
    let inner = Arc::new(Inner {
        state: Mutex::new(State::Pending),
        condvar: Condvar::new(),
    });
    (
        Handle {
            inner: Arc::clone(&inner),
        },
        Completer { inner },
    )
}

impl<T> Handle<T> {
    /// Block up to `timeout` for a terminal state. `None` blocks indefinitely.
    /// Returns `true` if terminal, `false` on timeout.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let guard = self.inner.state.lock().unwrap();
        let is_terminal = |s: &State<T>| !matches!(s, State::Pending);
        if is_terminal(&guard) {
            return true;
        }
        match timeout {
            None => {
                let guard = self
                    .inner
                    .condvar
                    .wait_while(guard, |s| matches!(s, State::Pending))
                    .unwrap();
                is_terminal(&guard)
            }
            Some(timeout) => {
                let (guard, result) = self
                    .inner
                    .condvar
                    .wait_timeout_while(guard, timeout, |s| matches!(s, State::Pending))
                    .unwrap();
                !result.timed_out() || is_terminal(&guard)
            }
        }
    }

    /// Non-blocking poll.
    pub fn done(&self) -> bool {
        !matches!(*self.inner.state.lock().unwrap(), State::Pending)
    }
}

impl<T: Clone> Handle<T> {
    /// Read the terminal value. Returns [`DriverError::NotReady`] if still pending.
    pub fn result(&self) -> Result<T, DriverError> {
        match &*self.inner.state.lock().unwrap() {
            State::Pending => Err(DriverError::NotReady),
            State::Fulfilled(value) => Ok(value.clone()),
            State::Failed(err) => Err(err.clone()),
        }
    }
}

impl<T> Completer<T> {
    /// Transition to fulfilled. Calling this a second time (on either outcome) is a
    /// programming error in the engine — debug builds assert, release builds just
    /// keep the first terminal value, mirroring the spec's "second attempt is a
    /// programming error" wording without taking down the reader thread in release.
    pub fn set_result(&self, value: T) {
        let mut guard = self.inner.state.lock().unwrap();
        debug_assert!(
            matches!(*guard, State::Pending),
            "completion handle finalized twice"
        );
        if matches!(*guard, State::Pending) {
            *guard = State::Fulfilled(value);
            self.inner.condvar.notify_all();
        }
    }

    /// Transition to failed.
    pub fn set_exception(&self, err: DriverError) {
        let mut guard = self.inner.state.lock().unwrap();
        debug_assert!(
            matches!(*guard, State::Pending),
            "completion handle finalized twice"
        );
        if matches!(*guard, State::Pending) {
            *guard = State::Failed(err);
            self.inner.condvar.notify_all();
        }
    }

    /// Whether this completer's handle is still pending.
    pub fn is_pending(&self) -> bool {
        matches!(*self.inner.state.lock().unwrap(), State::Pending)
    }
}

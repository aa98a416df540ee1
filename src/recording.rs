//! Recording buffer: the growing, terminable sample stream behind a logging
//! subscription.
//!
//! Samples are appended by the I/O engine as they arrive on the wire and are only
//! accepted strictly between the logging-start ack and the recording's terminal
//! transition; anything outside that window is dropped by the engine and reported
//! on the error channel rather than pushed here (see `engine::Engine`'s dispatch).

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::DriverError;
use crate::pin::PinId;

/// A single sample observed from the wire: digital pins report 0/1, analog pins
/// report a wider integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    Digital(bool),
    Analog(i64),
}

impl Sample {
    /// Interpret a raw wire integer as a sample for the given pin kind.
    pub fn from_wire(pin: PinId, raw: i64) -> Self {
        match pin {
            PinId::Digital(_) => Sample::Digital(raw != 0),
            PinId::Analog(_) | PinId::Dac(_) => Sample::Analog(raw),
        }
    }
}

/// A point-in-time read of a recording: the pin it's sampling and every value
/// observed so far.
#[derive(Debug, Clone)]
pub struct RecordingSnapshot {
    pub pin: PinId,
    pub values: Vec<Sample>,
}

enum Terminal {
    None,
    Ok,
    Err(DriverError),
}

struct Inner {
    pin: PinId,
    samples: Mutex<Vec<Sample>>,
    terminal: Mutex<Terminal>,
    condvar: Condvar,
}

/// Handle returned to the caller of [`crate::driver::Driver::log_signal`].
#[derive(Clone)]
pub struct Recording {
    inner: Arc<Inner>,
}

/// Engine-side half, held by the registry entry so the reader loop can append
/// samples and finalize the recording.
pub struct RecordingSink {
    inner: Arc<Inner>,
}

pub fn pair(pin: PinId) -> (Recording, RecordingSink) {
    let inner = Arc::new(Inner {
        pin,
        samples: Mutex::new(Vec::new()),
        terminal: Mutex::new(Terminal::None),
        condvar: Condvar::new(),
    });
    (
        Recording {
            inner: Arc::clone(&inner),
        },
        RecordingSink { inner },
    )
}

impl Recording {
    pub fn pin(&self) -> PinId {
        self.inner.pin
    }

    /// Read the samples accumulated so far without requiring termination — useful
    /// for progress reporting on a still-growing stream.
    pub fn samples_so_far(&self) -> Vec<Sample> {
        self.inner.samples.lock().unwrap().clone()
    }

    /// Block up to `timeout` for termination. `None` blocks indefinitely.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let guard = self.inner.terminal.lock().unwrap();
        let is_terminal = |t: &Terminal| !matches!(t, Terminal::None);
        if is_terminal(&guard) {
            return true;
        }
        match timeout {
            None => {
                let guard = self
                    .inner
                    .condvar
                    .wait_while(guard, |t| matches!(t, Terminal::None))
                    .unwrap();
                is_terminal(&guard)
            }
            Some(timeout) => {
                let (guard, result) = self
                    .inner
                    .condvar
                    .wait_timeout_while(guard, timeout, |t| matches!(t, Terminal::None))
                    .unwrap();
                !result.timed_out() || is_terminal(&guard)
            }
        }
    }

    pub fn done(&self) -> bool {
        !matches!(*self.inner.terminal.lock().unwrap(), Terminal::None)
    }

    /// Valid only after termination: the pin and the full set of samples observed.
    pub fn result(&self) -> Result<RecordingSnapshot, DriverError> {
        match &*self.inner.terminal.lock().unwrap() {
            Terminal::None => Err(DriverError::NotReady),
            Terminal::Ok => Ok(RecordingSnapshot {
                pin: self.inner.pin,
                values: self.inner.samples.lock().unwrap().clone(),
            }),
            Terminal::Err(err) => Err(err.clone()),
        }
    }
}

impl RecordingSink {
    /// Append a sample. Ignored if already terminal — the caller (the engine) is
    /// expected to report the drop on the error channel itself.
    pub fn append(&self, sample: Sample) -> bool {
        if !matches!(*self.inner.terminal.lock().unwrap(), Terminal::None) {
            return false;
        }
        self.inner.samples.lock().unwrap().push(sample);
        true
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(*self.inner.terminal.lock().unwrap(), Terminal::None)
    }

    pub fn finalize_ok(&self) {
        let mut guard = self.inner.terminal.lock().unwrap();
        if matches!(*guard, Terminal::None) {
            *guard = Terminal::Ok;
            self.inner.condvar.notify_all();
        }
    }

    pub fn finalize_err(&self, err: DriverError) {
        let mut guard = self.inner.terminal.lock().unwrap();
        if matches!(*guard, Terminal::None) {
            *guard = Terminal::Err(err);
            self.inner.condvar.notify_all();
        }
    }
}

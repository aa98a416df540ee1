//! In-memory table from outstanding request id to its completion handle /
//! recording buffer / kind / pin, with a pin → id secondary index.
//!
//! `end_log_signal(pin)` needs to find the currently-active logging entry whose pin
//! matches without scanning every outstanding id; the secondary index is updated
//! under the same lock as the primary map to keep that lookup O(1) and race-free
//! (no window where a reader could see the id map and the pin map disagree).

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use crate::command::CommandKind;
use crate::error::DriverError;
use crate::handle::Completer;
use crate::pin::PinId;
use crate::recording::RecordingSink;

/// What the engine needs to dispatch a response or sample for one outstanding id.
pub struct Entry {
    pub completer: Completer<serde_json::Value>,
    pub recording: Option<RecordingSink>,
    pub kind: CommandKind,
    pub pin: Option<PinId>,
    /// Set once the logging-start ack has been applied. Samples for a
    /// `LoggingStart` entry that arrive before this is set are pre-ack and must be
    /// dropped rather than appended.
    pub started: AtomicBool,
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<u64, Entry>,
    by_pin: HashMap<PinId, u64>,
}

/// Mutex-guarded registry of outstanding requests.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh entry for `id`. For `LoggingStart` entries with a pin, also
    /// registers the pin → id secondary index, but only if the pin has no mapping
    /// yet. A caller can submit a duplicate `log_signal` on a pin that already has
    /// an active job before the device has rejected it with
    /// `DUPLICATE_LOGGING_JOB` — that duplicate's id must never clobber the first
    /// job's mapping, or finalizing the rejected duplicate (`remove`, below) would
    /// delete the still-active job's entry in `by_pin` and orphan it.
    pub fn insert(&self, id: u64, entry: Entry) {
        let mut inner = self.inner.lock().unwrap();
        if entry.kind == CommandKind::LoggingStart {
            if let Some(pin) = entry.pin {
                inner.by_pin.entry(pin).or_insert(id);
            }
        }
        inner.by_id.insert(id, entry);
    }

    /// Remove the entry for `id`, clearing its pin mapping if present.
    pub fn remove(&self, id: u64) -> Option<Entry> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.by_id.remove(&id)?;
        if let Some(pin) = entry.pin {
            if inner.by_pin.get(&pin) == Some(&id) {
                inner.by_pin.remove(&pin);
            }
        }
        Some(entry)
    }

    /// Run `f` with a reference to the entry for `id`, if present.
    pub fn with_entry<R>(&self, id: u64, f: impl FnOnce(&Entry) -> R) -> Option<R> {
        let inner = self.inner.lock().unwrap();
        inner.by_id.get(&id).map(f)
    }

    /// Find the id of the active logging subscription on `pin`, if any.
    pub fn id_for_pin(&self, pin: PinId) -> Option<u64> {
        self.inner.lock().unwrap().by_pin.get(&pin).copied()
    }

    /// Remove and return every entry, draining the registry. Used by
    /// `Engine::kill` to finalize anything still pending.
    pub fn drain(&self) -> Vec<Entry> {
        let mut inner = self.inner.lock().unwrap();
        inner.by_pin.clear();
        inner.by_id.drain().map(|(_, entry)| entry).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Finalize every entry drained from the registry as failed with `err`. Shared by
/// `Engine::kill` (shutdown) and the reader loop's transport-error path.
pub fn fail_all(entries: Vec<Entry>, err: &DriverError) {
    for entry in entries {
        if entry.completer.is_pending() {
            entry.completer.set_exception(err.clone());
        }
        if let Some(recording) = &entry.recording {
            if !recording.is_terminal() {
                recording.finalize_err(err.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle;

    fn one_shot_entry() -> (Entry, crate::handle::Handle<serde_json::Value>) {
        let (handle, completer) = handle::pair();
        (
            Entry {
                completer,
                recording: None,
                kind: CommandKind::OneShot,
                pin: None,
                started: AtomicBool::new(false),
            },
            handle,
        )
    }

    #[test]
    fn insert_then_remove_round_trips() {
        let registry = Registry::new();
        let (entry, _handle) = one_shot_entry();
        registry.insert(1, entry);
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(1).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn logging_entry_is_findable_by_pin() {
        let registry = Registry::new();
        let (handle, completer) = handle::pair();
        let (_recording, sink) = crate::recording::pair(PinId::Digital(30));
        registry.insert(
            5,
            Entry {
                completer,
                recording: Some(sink),
                kind: CommandKind::LoggingStart,
                pin: Some(PinId::Digital(30)),
                started: AtomicBool::new(false),
            },
        );
        assert_eq!(registry.id_for_pin(PinId::Digital(30)), Some(5));
        drop(handle);
        registry.remove(5);
        assert_eq!(registry.id_for_pin(PinId::Digital(30)), None);
    }

    #[test]
    fn rejected_duplicate_start_does_not_clobber_the_active_jobs_pin_mapping() {
        let registry = Registry::new();
        let (first_handle, first_completer) = handle::pair();
        let (_first_recording, first_sink) = crate::recording::pair(PinId::Digital(30));
        registry.insert(
            1,
            Entry {
                completer: first_completer,
                recording: Some(first_sink),
                kind: CommandKind::LoggingStart,
                pin: Some(PinId::Digital(30)),
                started: AtomicBool::new(true),
            },
        );

        // A second `log_signal` on the same pin is inserted locally before the
        // device's `DUPLICATE_LOGGING_JOB` rejection is known.
        let (_second_handle, second_completer) = handle::pair();
        let (_second_recording, second_sink) = crate::recording::pair(PinId::Digital(30));
        registry.insert(
            2,
            Entry {
                completer: second_completer,
                recording: Some(second_sink),
                kind: CommandKind::LoggingStart,
                pin: Some(PinId::Digital(30)),
                started: AtomicBool::new(false),
            },
        );
        assert_eq!(registry.id_for_pin(PinId::Digital(30)), Some(1));

        // The device rejects the duplicate; the dispatcher removes its id.
        registry.remove(2);

        // The first job's pin mapping must still be intact.
        assert_eq!(registry.id_for_pin(PinId::Digital(30)), Some(1));
        drop(first_handle);
    }

    #[test]
    fn drain_fails_every_outstanding_entry() {
        let registry = Registry::new();
        let (entry, handle) = one_shot_entry();
        registry.insert(1, entry);
        let drained = registry.drain();
        assert!(registry.is_empty());
        fail_all(drained, &DriverError::ShuttingDown);
        assert!(matches!(handle.result(), Err(DriverError::ShuttingDown)));
    }
}

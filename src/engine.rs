//! The background I/O engine: owns the serial transport for the session, runs the
//! reader thread, and accepts outbound submissions.
//!
//! Grounded on the teacher's `modem.rs` I/O thread (a dedicated `std::thread` owns
//! the fd, blocking reads happen there and nowhere else), generalized from "one
//! command in flight at a time" to "many commands multiplexed by id, including
//! long-lived streaming subscriptions," the way
//! `examples/other_examples/73ad9235_timboldt-sphero-rvr-rs__src-transport-dispatcher.rs.rs`
//! keys pending responses in a `Mutex<HashMap<seq, ..>>` under a dedicated RX thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::command::{Command, CommandKind};
use crate::error::{DeviceErrorKind, DriverError, ErrorChannel, ProtocolErrorKind};
use crate::frame::{self, FrameError, InboundFrame, OutboundFrame};
use crate::handle::{self, Handle};
use crate::recording::{self, Recording, Sample};
use crate::registry::{self, Entry, Registry};
use crate::transport::{LineReader, SerialPort};

/// Result of [`Engine::submit`]: always a handle, plus a recording for
/// logging-start commands.
pub struct Submitted {
    pub handle: Handle<Value>,
    pub recording: Option<Recording>,
}

/// Owns the transport and the background reader thread.
pub struct Engine {
    writer: Mutex<Box<dyn SerialPort>>,
    next_id: AtomicU64,
    registry: Arc<Registry>,
    errors: Arc<ErrorChannel>,
    shutdown: Arc<AtomicBool>,
    reader_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Start the engine: spawn the reader thread over a second handle to the same
    /// transport. `transport` must be cheaply cloneable into two independent
    /// read/write halves — callers typically hand in one value for the writer and
    /// a `try_clone`'d one for the reader (mirroring how `modem.rs` keeps a single
    /// fd and splits read/write access by discipline, not by duplicating the fd
    /// here — the reader owns the only read side).
    pub fn start<R, W>(reader_half: R, writer_half: W, max_line_len: usize) -> Self
    where
        R: SerialPort + 'static,
        W: SerialPort + 'static,
    {
        let registry = Arc::new(Registry::new());
        let errors = Arc::new(ErrorChannel::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let reader_registry = Arc::clone(&registry);
        let reader_errors = Arc::clone(&errors);
        let reader_shutdown = Arc::clone(&shutdown);

        let reader_thread = thread::Builder::new()
            .name("boardctl-reader".to_string())
            .spawn(move || {
                reader_loop(
                    reader_half,
                    &reader_registry,
                    &reader_errors,
                    &reader_shutdown,
                    max_line_len,
                );
            })
            .expect("spawn boardctl-reader thread");

        Self {
            writer: Mutex::new(Box::new(writer_half)),
            next_id: AtomicU64::new(1),
            registry,
            errors,
            shutdown,
            reader_thread: Mutex::new(Some(reader_thread)),
        }
    }

    pub fn errors(&self) -> &ErrorChannel {
        &self.errors
    }

    /// Assign an id, register the entry, encode and write the frame.
    pub fn submit(&self, command: Command) -> Result<Submitted, DriverError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(DriverError::ShuttingDown);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if id == u64::MAX {
            return Err(DriverError::IdSpaceExhausted);
        }

        let (handle, completer) = handle::pair::<Value>();
        let recording = match command.kind {
            CommandKind::LoggingStart => {
                let pin = command.pin.expect("logging-start command carries a pin");
                let (recording, sink) = recording::pair(pin);
                self.registry.insert(
                    id,
                    Entry {
                        completer,
                        recording: Some(sink),
                        kind: command.kind,
                        pin: command.pin,
                        started: AtomicBool::new(false),
                    },
                );
                Some(recording)
            }
            CommandKind::OneShot | CommandKind::LoggingEnd => {
                self.registry.insert(
                    id,
                    Entry {
                        completer,
                        recording: None,
                        kind: command.kind,
                        pin: command.pin,
                        started: AtomicBool::new(false),
                    },
                );
                None
            }
        };

        let frame = OutboundFrame {
            id,
            command: command.name,
            args: command.args,
        };
        let bytes = frame.encode();

        let write_result = {
            let mut writer = self.writer.lock().unwrap();
            crate::transport::write_frame(&mut **writer, &bytes)
        };

        if let Err(io_err) = write_result {
            // Write errors fail the current operation; the entry is removed so it
            // doesn't linger in the registry waiting for a reply that will never
            // come.
            if let Some(entry) = self.registry.remove(id) {
                let err = DriverError::Transport(io_err.to_string());
                entry.completer.set_exception(err.clone());
                if let Some(recording) = entry.recording {
                    recording.finalize_err(err);
                }
            }
            return Err(DriverError::Transport(io_err.to_string()));
        }

        Ok(Submitted { handle, recording })
    }

    /// Find the id of the currently active logging subscription on `pin`.
    pub fn id_for_pin(&self, pin: crate::pin::PinId) -> Option<u64> {
        self.registry.id_for_pin(pin)
    }

    /// Idempotent shutdown: mark the engine dead, unblock and join the reader, fail
    /// everything still outstanding.
    pub fn kill(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return; // already killed
        }

        if let Some(thread) = self.reader_thread.lock().unwrap().take() {
            // The reader unblocks on its own once the transport reports EOF/error,
            // or once it notices `shutdown` between reads. Joining here is safe
            // because the flag is already set above.
            let _ = thread.join();
        }

        let remaining = self.registry.drain();
        registry::fail_all(remaining, &DriverError::ShuttingDown);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.kill();
    }
}

fn reader_loop<R: SerialPort>(
    port: R,
    registry: &Registry,
    errors: &ErrorChannel,
    shutdown: &AtomicBool,
    max_line_len: usize,
) {
    let mut reader = LineReader::new(port);

    loop {
        if shutdown.load(Ordering::SeqCst) {
            debug!("boardctl-reader: shutdown flag set, exiting");
            break;
        }

        let line = match reader.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => {
                // Idle timeout, no complete line yet — re-check shutdown and retry.
                continue;
            }
            Err(e) => {
                error!("boardctl-reader: transport error: {e}");
                errors.push(DriverError::Transport(e.to_string()));
                fail_everything_with(registry, DriverError::Transport(e.to_string()));
                break;
            }
        };

        match frame::decode(&line, max_line_len) {
            Ok(frame) => dispatch(frame, registry, errors),
            Err(e) => {
                warn!("boardctl-reader: {e}");
                errors.push(DriverError::Protocol(ProtocolErrorKind::Parse, e.to_string()));
            }
        }
    }
}

fn fail_everything_with(registry: &Registry, err: DriverError) {
    let remaining = registry.drain();
    registry::fail_all(remaining, &err);
}

fn dispatch(frame: InboundFrame, registry: &Registry, errors: &ErrorChannel) {
    match frame {
        InboundFrame::Response {
            id,
            ok,
            value,
            error,
        } => dispatch_response(id, ok, value, error, registry, errors),
        InboundFrame::Sample { id, value } => dispatch_sample(id, value, registry, errors),
        InboundFrame::Event { fields } => {
            debug!("boardctl-reader: event frame {fields:?}");
        }
    }
}

fn dispatch_response(
    id: u64,
    ok: bool,
    value: Option<Value>,
    error: Option<String>,
    registry: &Registry,
    errors: &ErrorChannel,
) {
    let Some(kind) = registry.with_entry(id, |e| e.kind) else {
        errors.push(DriverError::Protocol(
            ProtocolErrorKind::UnknownId,
            format!("response for unregistered id {id}"),
        ));
        return;
    };

    match kind {
        CommandKind::OneShot => {
            let Some(entry) = registry.remove(id) else {
                return;
            };
            finalize_response(&entry.completer, ok, value, error, errors);
        }
        CommandKind::LoggingEnd => {
            let Some(entry) = registry.remove(id) else {
                return;
            };
            let pin = entry.pin;
            finalize_response(&entry.completer, ok, value, error, errors);
            // The logging-end command carries the pin it's terminating. Per the
            // data model, the *original* logging-start entry (a different id, the
            // one still receiving samples) is only removed once this completes —
            // not when the start was acked. Find it via the pin secondary index
            // and finalize it now.
            if ok {
                if let Some(pin) = pin {
                    if let Some(start_id) = registry.id_for_pin(pin) {
                        if let Some(start_entry) = registry.remove(start_id) {
                            if start_entry.completer.is_pending() {
                                // Should already be fulfilled by the start ack;
                                // guard defensively rather than leave it pending.
                                start_entry.completer.set_result(Value::Null);
                            }
                            if let Some(recording) = start_entry.recording {
                                if !recording.is_terminal() {
                                    recording.finalize_ok();
                                }
                            }
                        }
                    }
                }
            }
        }
        CommandKind::LoggingStart => {
            if ok {
                registry.with_entry(id, |entry| {
                    entry.started.store(true, Ordering::SeqCst);
                    if entry.completer.is_pending() {
                        entry
                            .completer
                            .set_result(value.clone().unwrap_or(Value::Null));
                    }
                });
                // Entry is retained — it keeps receiving samples until the
                // matching logging-end completes.
            } else if let Some(entry) = registry.remove(id) {
                let err = device_error(error, errors, id);
                if entry.completer.is_pending() {
                    entry.completer.set_exception(err.clone());
                }
                if let Some(recording) = entry.recording {
                    recording.finalize_err(err);
                }
            }
        }
    }
}

fn finalize_response(
    completer: &crate::handle::Completer<Value>,
    ok: bool,
    value: Option<Value>,
    error: Option<String>,
    errors: &ErrorChannel,
) {
    if !completer.is_pending() {
        errors.push(DriverError::Protocol(
            ProtocolErrorKind::DuplicateTerminalTransition,
            "response for an already-terminal id".to_string(),
        ));
        return;
    }
    if ok {
        completer.set_result(value.unwrap_or(Value::Null));
    } else {
        completer.set_exception(device_error_from(error));
    }
}

fn device_error(error: Option<String>, errors: &ErrorChannel, id: u64) -> DriverError {
    match &error {
        Some(_) => device_error_from(error),
        None => {
            errors.push(DriverError::Protocol(
                ProtocolErrorKind::Parse,
                format!("error response for id {id} missing `error` field"),
            ));
            DriverError::Device(DeviceErrorKind::Other("UNKNOWN".to_string()), None)
        }
    }
}

fn device_error_from(error: Option<String>) -> DriverError {
    let name = error.unwrap_or_else(|| "UNKNOWN".to_string());
    DriverError::Device(DeviceErrorKind::from_wire(&name), None)
}

fn dispatch_sample(id: u64, value: i64, registry: &Registry, errors: &ErrorChannel) {
    let appended = registry.with_entry(id, |entry| {
        if entry.kind != CommandKind::LoggingStart {
            return false;
        }
        let Some(recording) = &entry.recording else {
            return false;
        };
        if recording.is_terminal() {
            return false;
        }
        if !entry.started.load(Ordering::SeqCst) {
            // Arrived before the logging-start ack was applied — drop it rather
            // than append to a recording the caller hasn't been told has started.
            return false;
        }
        let Some(pin) = entry.pin else { return false };
        recording.append(Sample::from_wire(pin, value))
    });

    if appended != Some(true) {
        errors.push(DriverError::Protocol(
            ProtocolErrorKind::UnsolicitedSample,
            format!("sample for id {id} with no active (or not yet started) logging subscription"),
        ));
    }
}

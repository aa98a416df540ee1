//! The user-facing facade: composes the engine, config, and typed pin operations
//! into the single object callers construct and hold for the life of a session.
//!
//! Grounded on `state.rs::AppState` (one struct wiring together every subsystem) and
//! the `routes/*.rs` handlers, which are thin, single-purpose wrappers that build a
//! request and delegate — `Driver`'s typed helpers below follow the same shape, just
//! building a `Command` and delegating to `Engine::submit` instead of building an
//! HTTP response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use crate::command::Command;
use crate::config::Config;
use crate::engine::{Engine, Submitted};
use crate::error::DriverError;
use crate::frame::arg_value;
use crate::handle::Handle;
use crate::pin::PinId;
use crate::recording::Recording;
use crate::transport::SerialPort;

/// A digital or analog signal value.
///
/// Digital pins only ever report/accept `High`/`Low`; analog/DAC pins carry a raw
/// integer level. Both shapes are represented here since `get_signal`/`set_signal`
/// are shared entry points across pin kinds, matching the device's own command
/// vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalLevel {
    High,
    Low,
    /// Raw analog level (0-255 for DAC output, a wider range for analog input).
    Analog(i64),
}

impl SignalLevel {
    fn to_wire(self) -> Value {
        match self {
            Self::High => Value::from("HIGH"),
            Self::Low => Value::from("LOW"),
            Self::Analog(v) => arg_value(v),
        }
    }

    /// Interpret a device response value for the pin kind it was read from.
    fn from_wire(pin: PinId, value: &Value) -> Self {
        match pin {
            PinId::Digital(_) => {
                if value.as_str() == Some("LOW") {
                    Self::Low
                } else {
                    Self::High
                }
            }
            PinId::Analog(_) | PinId::Dac(_) => Self::Analog(value.as_i64().unwrap_or(0)),
        }
    }
}

/// Pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

impl PinMode {
    fn to_wire(self) -> Value {
        match self {
            Self::Input => Value::from("INPUT"),
            Self::Output => Value::from("OUTPUT"),
        }
    }

    fn from_wire(value: &Value) -> Self {
        if value.as_str() == Some("INPUT") {
            Self::Input
        } else {
            Self::Output
        }
    }
}

/// The driver facade: one per serial session. Construct with [`Driver::new`], call
/// [`Driver::open`] once before issuing any other command, and [`Driver::kill`] (or
/// just drop it) when done.
pub struct Driver {
    engine: Engine,
    config: Config,
    opened: AtomicBool,
}

impl Driver {
    /// Build a driver over an already-started transport. `reader_half` and
    /// `writer_half` are typically two handles to the same underlying serial port
    /// (see [`Engine::start`]).
    pub fn new<R, W>(reader_half: R, writer_half: W, config: Config) -> Self
    where
        R: SerialPort + 'static,
        W: SerialPort + 'static,
    {
        Self {
            engine: Engine::start(reader_half, writer_half, config.io.max_line_len),
            config,
            opened: AtomicBool::new(false),
        }
    }

    /// Flush stale input, then perform the device handshake. Must complete
    /// (successfully or not) before any other command is submitted.
    pub fn open<T: SerialPort>(&self, input_flush: &mut T) -> Result<Handle<Value>, DriverError> {
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(DriverError::AlreadyOpened);
        }
        let _ = input_flush.flush_input();
        info!("boardctl: opening session");
        let submitted = self.engine.submit(Command::one_shot("open"))?;
        Ok(submitted.handle)
    }

    /// Convenience wrapper around [`Driver::open`] that blocks for the configured
    /// open timeout and surfaces the handshake's outcome directly.
    pub fn open_blocking<T: SerialPort>(&self, input_flush: &mut T) -> Result<(), DriverError> {
        let handle = self.open(input_flush)?;
        let timeout = Duration::from_millis(self.config.io.open_timeout_ms);
        if !handle.wait(Some(timeout)) {
            return Err(DriverError::NotReady);
        }
        handle.result().map(|_| ())
    }

    fn ensure_opened(&self) -> Result<(), DriverError> {
        if self.opened.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DriverError::NotOpened)
        }
    }

    /// Terminate the engine. Idempotent.
    pub fn kill(&self) {
        self.engine.kill();
    }

    /// Drain the background error channel, surfacing only the first record (callers
    /// who want the full backlog can loop until this returns `Ok(())`).
    pub fn process_errors(&self) -> Result<(), DriverError> {
        let mut drained = self.engine.errors().drain();
        match drained.drain(..).next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Low-level escape hatch: submit an arbitrary command.
    pub fn submit(&self, command: Command) -> Result<Submitted, DriverError> {
        self.ensure_opened()?;
        self.engine.submit(command)
    }

    /// Write a digital level or DAC value to `pin`.
    pub fn set_signal(&self, pin: PinId, level: SignalLevel) -> Result<Handle<Value>, DriverError> {
        self.ensure_opened()?;
        let command = Command::one_shot("set_signal")
            .with_arg("pin", pin.to_string())
            .with_arg("level", level.to_wire());
        Ok(self.engine.submit(command)?.handle)
    }

    /// Read the current level of `pin`. The returned handle's value still needs to
    /// be interpreted with [`SignalLevel::from_wire`]-equivalent logic; use
    /// [`Driver::get_signal_blocking`] for the common case of wanting a typed result
    /// synchronously.
    pub fn get_signal(&self, pin: PinId) -> Result<Handle<Value>, DriverError> {
        self.ensure_opened()?;
        let command = Command::one_shot("get_signal").with_arg("pin", pin.to_string());
        Ok(self.engine.submit(command)?.handle)
    }

    /// Read `pin` and block for the result, decoded into a [`SignalLevel`].
    pub fn get_signal_blocking(
        &self,
        pin: PinId,
        timeout: Option<Duration>,
    ) -> Result<SignalLevel, DriverError> {
        let handle = self.get_signal(pin)?;
        if !handle.wait(timeout) {
            return Err(DriverError::NotReady);
        }
        handle.result().map(|v| SignalLevel::from_wire(pin, &v))
    }

    /// Configure `pin`'s direction.
    pub fn set_pin_mode(&self, pin: PinId, mode: PinMode) -> Result<Handle<Value>, DriverError> {
        self.ensure_opened()?;
        let command = Command::one_shot("set_pin_mode")
            .with_arg("pin", pin.to_string())
            .with_arg("mode", mode.to_wire());
        Ok(self.engine.submit(command)?.handle)
    }

    /// Read `pin`'s configured direction.
    pub fn get_pin_mode(&self, pin: PinId) -> Result<Handle<Value>, DriverError> {
        self.ensure_opened()?;
        let command = Command::one_shot("get_pin_mode").with_arg("pin", pin.to_string());
        Ok(self.engine.submit(command)?.handle)
    }

    pub fn get_pin_mode_blocking(
        &self,
        pin: PinId,
        timeout: Option<Duration>,
    ) -> Result<PinMode, DriverError> {
        let handle = self.get_pin_mode(pin)?;
        if !handle.wait(timeout) {
            return Err(DriverError::NotReady);
        }
        handle.result().map(|v| PinMode::from_wire(&v))
    }

    /// Persist the device's current pin mode configuration to its non-volatile
    /// storage. Round-trip semantics are device-side behavior this driver does not
    /// replicate or validate.
    pub fn save_pin_modes(&self) -> Result<Handle<Value>, DriverError> {
        self.ensure_opened()?;
        Ok(self.engine.submit(Command::one_shot("save_pin_modes"))?.handle)
    }

    /// Load the device's previously saved pin mode configuration.
    pub fn load_pin_modes(&self) -> Result<Handle<Value>, DriverError> {
        self.ensure_opened()?;
        Ok(self.engine.submit(Command::one_shot("load_pin_modes"))?.handle)
    }

    /// Reset pin modes to the device's firmware default.
    pub fn reset_pin_modes(&self) -> Result<Handle<Value>, DriverError> {
        self.ensure_opened()?;
        Ok(self.engine.submit(Command::one_shot("reset_pin_modes"))?.handle)
    }

    /// Trigger a momentary pulse on an output pin.
    ///
    /// The firmware sleeps for the pulse duration, so issuing this while a logging
    /// subscription is active on the same or another pin is not serialized around
    /// on the host side — samples may show a gap or delay during the pulse. Callers
    /// that care about sample timing during a pulse should account for this
    /// themselves.
    pub fn trigger_pulse(&self, pin: PinId) -> Result<Handle<Value>, DriverError> {
        self.ensure_opened()?;
        let command = Command::one_shot("trigger_pulse").with_arg("pin", pin.to_string());
        Ok(self.engine.submit(command)?.handle)
    }

    /// Start a periodic logging subscription on `pin`. The device is the sole
    /// authority on how many concurrent logging jobs it can sustain; a request
    /// past that limit is always written to the wire and comes back as a device
    /// error (`TOO_MANY_LOGGING_JOBS`) on the returned handle, the driver does no
    /// local counting or fail-fast.
    pub fn log_signal(
        &self,
        pin: PinId,
        period_ms: u64,
    ) -> Result<(Handle<Value>, Recording), DriverError> {
        self.ensure_opened()?;
        let command = Command::logging_start("log_signal", pin).with_arg("period_ms", period_ms);
        let submitted = self.engine.submit(command)?;
        let recording = submitted
            .recording
            .expect("logging_start submission always yields a recording");
        Ok((submitted.handle, recording))
    }

    /// Terminate the logging subscription on `pin`, if one is active.
    pub fn end_log_signal(&self, pin: PinId) -> Result<Handle<Value>, DriverError> {
        self.ensure_opened()?;
        let command = Command::logging_end("end_log_signal", pin);
        Ok(self.engine.submit(command)?.handle)
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.kill();
    }
}

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]

//! boardctl — host driver for a serial-attached digital/analog I/O board.
//!
//! This library exposes the core building blocks:
//! - `frame` — line-delimited JSON wire framing
//! - `handle` — one-shot completion handles
//! - `recording` — growing sample streams for logging subscriptions
//! - `registry` — in-flight request bookkeeping
//! - `transport` — the serial byte-stream abstraction, plus an in-memory loopback
//!   double behind the `loopback` feature
//! - `engine` — the background I/O engine that owns the transport
//! - `pin` — pin identifier parsing
//! - `command` — typed command construction
//! - `driver` — the user-facing facade
//! - `config` — session configuration
//! - `error` — error types and the asynchronous error channel

pub mod command;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod frame;
pub mod handle;
pub mod pin;
pub mod recording;
pub mod registry;
pub mod transport;

pub use command::{Command, CommandKind};
pub use config::Config;
pub use driver::{Driver, PinMode, SignalLevel};
pub use error::{DeviceErrorKind, DriverError, ErrorChannel, ProtocolErrorKind};
pub use pin::PinId;
pub use recording::{Recording, RecordingSnapshot, Sample};

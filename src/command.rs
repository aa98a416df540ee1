//! Typed command descriptions submitted to the [`crate::engine::Engine`].
//!
//! A `Command` carries everything [`crate::engine::Engine::submit`] needs except the
//! request id, which the engine assigns at submit time so that id allocation stays
//! centralized and monotonic.

use serde_json::{Map, Value};

use crate::pin::PinId;

/// What kind of registry lifecycle a command expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// A single request/reply exchange; the registry entry is removed once the
    /// response is applied.
    OneShot,
    /// Starts a logging subscription. The registry entry survives the start-ack
    /// to keep receiving streamed samples, and is only removed when the matching
    /// `logging-end` completes.
    LoggingStart,
    /// Terminates a logging subscription.
    LoggingEnd,
}

/// A command ready to be handed to the engine.
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub args: Map<String, Value>,
    pub kind: CommandKind,
    /// The pin this command targets, if any — used by `LoggingStart`/`LoggingEnd`
    /// to maintain the registry's pin secondary index, and by `end_log_signal` to
    /// find the id of an already-running subscription.
    pub pin: Option<PinId>,
}

impl Command {
    pub fn one_shot(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Map::new(),
            kind: CommandKind::OneShot,
            pin: None,
        }
    }

    pub fn logging_start(name: impl Into<String>, pin: PinId) -> Self {
        Self {
            name: name.into(),
            args: Map::new(),
            kind: CommandKind::LoggingStart,
            pin: Some(pin),
        }
    }

    pub fn logging_end(name: impl Into<String>, pin: PinId) -> Self {
        Self {
            name: name.into(),
            args: Map::new(),
            kind: CommandKind::LoggingEnd,
            pin: Some(pin),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

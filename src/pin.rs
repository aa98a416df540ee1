//! Pin identifier parsing: `D<n>` (digital), `A<n>` (analog input), `DAC<n>`
//! (analog output).

use std::fmt;

/// A validated pin identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinId {
    Digital(u32),
    Analog(u32),
    Dac(u32),
}

impl PinId {
    /// Parse a textual pin id. Returns `None` for anything that doesn't match the
    /// `D<n>` / `A<n>` / `DAC<n>` shapes — callers that want the device's
    /// `INVALID_PIN` error instead of a host-side rejection can skip this and send
    /// the raw string through [`crate::command::Command`] directly.
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(rest) = s.strip_prefix("DAC") {
            return rest.parse().ok().map(Self::Dac);
        }
        if let Some(rest) = s.strip_prefix('D') {
            return rest.parse().ok().map(Self::Digital);
        }
        if let Some(rest) = s.strip_prefix('A') {
            return rest.parse().ok().map(Self::Analog);
        }
        None
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digital(n) => write!(f, "D{n}"),
            Self::Analog(n) => write!(f, "A{n}"),
            Self::Dac(n) => write!(f, "DAC{n}"),
        }
    }
}

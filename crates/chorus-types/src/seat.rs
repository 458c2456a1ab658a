//! Seat identifiers and the seat definition table.
//!
//! A seat is a named role (coding, creative, conversational) bound to a
//! specific backend model. The [`SeatTable`] is built once from configuration
//! and is read-only afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A role that one backend model plays in a batch.
///
/// Variant declaration order is the fixed synthesis order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    Coding,
    Creative,
    Conversational,
}

impl Seat {
    /// Every seat, in synthesis order.
    pub const ALL: [Seat; 3] = [Seat::Coding, Seat::Creative, Seat::Conversational];

    /// Lowercase identifier used in config files and placeholders.
    pub fn as_str(&self) -> &'static str {
        match self {
            Seat::Coding => "coding",
            Seat::Creative => "creative",
            Seat::Conversational => "conversational",
        }
    }

    /// Heading used for this seat's section in the synthesis prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Seat::Coding => "Coding expert",
            Seat::Creative => "Creative expert",
            Seat::Conversational => "Conversational expert",
        }
    }

    /// Text substituted for this seat's section when it failed.
    pub fn failure_placeholder(&self) -> String {
        format!("[{} expert failed to respond]", self.as_str())
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Seat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "coding" => Ok(Seat::Coding),
            "creative" => Ok(Seat::Creative),
            "conversational" => Ok(Seat::Conversational),
            other => Err(format!("invalid seat: '{other}'")),
        }
    }
}

/// Backend parameters for one seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatDefinition {
    pub seat: Seat,
    /// Backend model identifier (e.g. "deepseek-coder").
    pub model: String,
    /// Per-call timeout used when neither the request nor the batch sets one.
    pub default_timeout: Duration,
    /// Seat-specific backend host; `None` uses the table default.
    pub host: Option<String>,
}

/// The loaded, validated seat definitions.
#[derive(Debug, Clone)]
pub struct SeatTable {
    default_host: String,
    synthesis_seat: Seat,
    seats: BTreeMap<Seat, SeatDefinition>,
}

impl SeatTable {
    pub fn new(
        default_host: impl Into<String>,
        synthesis_seat: Seat,
        definitions: impl IntoIterator<Item = SeatDefinition>,
    ) -> Self {
        Self {
            default_host: default_host.into(),
            synthesis_seat,
            seats: definitions.into_iter().map(|d| (d.seat, d)).collect(),
        }
    }

    pub fn get(&self, seat: Seat) -> Option<&SeatDefinition> {
        self.seats.get(&seat)
    }

    /// Seat whose backend performs the synthesis call.
    pub fn synthesis_seat(&self) -> Seat {
        self.synthesis_seat
    }

    pub fn default_host(&self) -> &str {
        &self.default_host
    }

    /// Resolve the backend host for a call: explicit override, then the
    /// seat's own host, then the table default.
    pub fn host_for<'a>(&'a self, seat: Seat, override_host: Option<&'a str>) -> &'a str {
        override_host
            .or_else(|| self.get(seat).and_then(|d| d.host.as_deref()))
            .unwrap_or(&self.default_host)
    }

    /// Definitions in synthesis order.
    pub fn iter(&self) -> impl Iterator<Item = &SeatDefinition> {
        self.seats.values()
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }
}

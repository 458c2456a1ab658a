//! Seat configuration file schema.
//!
//! `SeatConfigFile` is the deserialized form of `seats.toml`. It is validated
//! into a [`SeatTable`] plus the default [`BatchOptions`] by
//! [`SeatConfigFile::into_parts`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::{BackoffPolicy, BatchOptions};
use crate::error::ConfigError;
use crate::seat::{Seat, SeatDefinition, SeatTable};

/// Starter `seats.toml` written by `chorus seats init`.
pub const DEFAULT_SEATS_TOML: &str = r#"# Chorus seat definitions.
default_host = "http://127.0.0.1:11434"
synthesis_seat = "conversational"

[batch]
max_concurrency = 3
retries = 2
# deadline_ms = 120000
backoff = { kind = "exponential", base_ms = 250, max_ms = 4000 }

[seats.coding]
model = "deepseek-coder"
timeout_ms = 60000

[seats.creative]
model = "mistral"
timeout_ms = 60000

[seats.conversational]
model = "phi3"
timeout_ms = 60000
"#;

/// Top-level seat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatConfigFile {
    /// Host used by seats that do not set their own.
    #[serde(default = "default_host")]
    pub default_host: String,

    /// Seat whose backend produces the final answer.
    #[serde(default = "default_synthesis_seat")]
    pub synthesis_seat: Seat,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub seats: BTreeMap<Seat, SeatEntry>,
}

fn default_host() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_synthesis_seat() -> Seat {
    Seat::Conversational
}

/// One `[seats.<name>]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatEntry {
    pub model: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub host: Option<String>,
}

fn default_timeout_ms() -> u64 {
    60_000
}

/// The `[batch]` table: defaults for every batch the orchestrator runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Per-call timeout applied to every seat; unset uses each seat's own.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    #[serde(default)]
    pub backoff: BackoffPolicy,
}

fn default_max_concurrency() -> usize {
    Seat::ALL.len()
}

fn default_retries() -> u32 {
    2
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            retries: default_retries(),
            timeout_ms: None,
            deadline_ms: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl BatchConfig {
    pub fn to_options(&self) -> BatchOptions {
        BatchOptions {
            max_concurrency: self.max_concurrency,
            timeout: self.timeout_ms.map(Duration::from_millis),
            retries: self.retries,
            deadline: self.deadline_ms.map(Duration::from_millis),
            backoff: self.backoff,
        }
    }
}

impl SeatConfigFile {
    /// Validate and split into the seat table and default batch options.
    pub fn into_parts(self) -> Result<(SeatTable, BatchOptions), ConfigError> {
        if !is_http_url(&self.default_host) {
            return Err(ConfigError::Invalid(format!(
                "default_host '{}' is not an http(s) URL",
                self.default_host
            )));
        }
        if self.batch.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "batch.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.batch.timeout_ms == Some(0) || self.batch.deadline_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "batch timeouts must be positive".to_string(),
            ));
        }

        let mut definitions = Vec::with_capacity(Seat::ALL.len());
        for seat in Seat::ALL {
            let entry = self.seats.get(&seat).ok_or(ConfigError::MissingSeat(seat))?;
            if entry.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("seat '{seat}' has an empty model")));
            }
            if entry.timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "seat '{seat}' timeout_ms must be positive"
                )));
            }
            if let Some(host) = &entry.host {
                if !is_http_url(host) {
                    return Err(ConfigError::Invalid(format!(
                        "seat '{seat}' host '{host}' is not an http(s) URL"
                    )));
                }
            }
            definitions.push(SeatDefinition {
                seat,
                model: entry.model.clone(),
                default_timeout: Duration::from_millis(entry.timeout_ms),
                host: entry.host.clone(),
            });
        }

        let options = self.batch.to_options();
        let table = SeatTable::new(self.default_host, self.synthesis_seat, definitions);
        Ok((table, options))
    }
}

impl Default for SeatConfigFile {
    /// Mirrors [`DEFAULT_SEATS_TOML`].
    fn default() -> Self {
        let entry = |model: &str| SeatEntry {
            model: model.to_string(),
            timeout_ms: default_timeout_ms(),
            host: None,
        };
        Self {
            default_host: default_host(),
            synthesis_seat: default_synthesis_seat(),
            batch: BatchConfig::default(),
            seats: BTreeMap::from([
                (Seat::Coding, entry("deepseek-coder")),
                (Seat::Creative, entry("mistral")),
                (Seat::Conversational, entry("phi3")),
            ]),
        }
    }
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

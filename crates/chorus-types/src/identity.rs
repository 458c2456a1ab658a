//! Caller-supplied identity conditioning.
//!
//! The orchestrator treats identity text as an opaque prefix. Callers pass a
//! JSON context document; this module only knows where the prefix lives in it.

use serde::Deserialize;

/// JSON context accompanying a message.
///
/// Accepted shapes:
/// - `{"identity": {"prompt": "..."}}`
/// - `{"identity_prefix": "..."}`
///
/// Unknown keys (user ids, thread ids) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityContext {
    #[serde(default)]
    pub identity: Option<IdentityBlock>,
    #[serde(default)]
    pub identity_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityBlock {
    #[serde(default)]
    pub prompt: Option<String>,
}

impl IdentityContext {
    /// Parse a context document. Blank input yields an empty context.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(input)
    }

    /// The prefix to prepend to every model call. An explicit
    /// `identity_prefix` wins over `identity.prompt`.
    pub fn prefix(&self) -> &str {
        self.identity_prefix
            .as_deref()
            .or_else(|| self.identity.as_ref().and_then(|i| i.prompt.as_deref()))
            .unwrap_or("")
    }
}

//! API key capability
//!
//! The orchestrator only checks whether a key has been selected and, when it
//! hasn't (or a call came back permission-denied), asks for one. Both
//! operations are best-effort; a run proceeds regardless of the outcome.

use tracing::warn;

/// Injected key-management capability
pub trait KeyProvider: Send + Sync {
    /// Whether an API key has been selected
    fn has_key(&self) -> bool;

    /// Prompt for key selection (fire-and-forget)
    fn request_key(&self);
}

/// Key provider backed by an environment variable
#[derive(Debug, Clone)]
pub struct EnvKeyProvider {
    var: String,
}

impl EnvKeyProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvKeyProvider {
    fn default() -> Self {
        Self::new("GEMINI_API_KEY")
    }
}

impl KeyProvider for EnvKeyProvider {
    fn has_key(&self) -> bool {
        std::env::var(&self.var).map(|v| !v.is_empty()).unwrap_or(false)
    }

    fn request_key(&self) {
        // Headless daemon: the only selection flow available is the operator.
        warn!(
            "no usable API key; set {} or configure gemini.api_key and restart",
            self.var
        );
    }
}

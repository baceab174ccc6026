//! Registry session: where to talk to and with which credential.
//!
//! Passed explicitly into every registry call; there is no ambient login
//! state.

use crate::config::QuiltConfig;

/// Environment variable that overrides the configured token
pub const TOKEN_ENV: &str = "QUILT_TOKEN";

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub registry_url: String,
    pub token: Option<String>,
}

impl Session {
    pub fn new(registry_url: impl Into<String>, token: Option<String>) -> Self {
        let mut registry_url = registry_url.into();
        while registry_url.ends_with('/') {
            registry_url.pop();
        }
        Self {
            registry_url,
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn anonymous(registry_url: impl Into<String>) -> Self {
        Self::new(registry_url, None)
    }

    pub fn from_config(config: &QuiltConfig) -> Self {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .or_else(|| config.registry.token.clone());
        Self::new(config.registry.url.clone(), token)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

// Keep tokens out of logs and panic messages.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("registry_url", &self.registry_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

//! Authentication/session precondition bundles.
//!
//! Some flows require a signed-in session. The bundle is produced by
//! external tooling and serialized to JSON; this module only loads and
//! inspects it before handing it to the driver boundary. The core never
//! creates or refreshes credentials.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::result::TenazResult;

/// A single cookie in a captured session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain the cookie applies to
    pub domain: String,
    /// Path the cookie applies to
    #[serde(default = "default_path")]
    pub path: String,
    /// Secure flag
    #[serde(default)]
    pub secure: bool,
    /// HttpOnly flag
    #[serde(default)]
    pub http_only: bool,
    /// Expiry as a unix timestamp, if not a session cookie
    #[serde(default)]
    pub expires: Option<i64>,
}

fn default_path() -> String {
    "/".to_string()
}

impl Cookie {
    /// Create a session cookie
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            secure: false,
            http_only: false,
            expires: None,
        }
    }
}

/// A captured session/credential bundle: cookies plus per-origin local
/// and session storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthState {
    /// Cookies
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    /// Local storage keyed by origin
    #[serde(default)]
    pub local_storage: HashMap<String, HashMap<String, String>>,
    /// Session storage keyed by origin
    #[serde(default)]
    pub session_storage: HashMap<String, HashMap<String, String>>,
}

impl AuthState {
    /// Create an empty bundle (useful for unauthenticated flows)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a bundle from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or not a valid bundle.
    pub fn load_json(path: &Path) -> TenazResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&json)?;
        Ok(state)
    }

    /// Whether the bundle carries no credentials at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.local_storage.is_empty() && self.session_storage.is_empty()
    }

    /// Look up a cookie by name
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    /// Origins with stored local-storage state
    #[must_use]
    pub fn origins(&self) -> Vec<&str> {
        self.local_storage.keys().map(String::as_str).collect()
    }
}

use std::time::Duration;

use parking_lot::Mutex;

use crate::errors::WalletResult;
use crate::session::AuthSession;

const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Destination for `Set-Cookie`-style strings (e.g. `document.cookie`).
pub trait CookieSink: Send + Sync {
    fn write_cookie(&self, cookie: &str) -> WalletResult<()>;
}

/// Projects the current session into a cookie for server-side middleware.
///
/// One-way: the cookie is written on every session change and never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    name: String,
    max_age: Duration,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, max_age: Duration) -> Self {
        Self {
            name: name.into(),
            max_age,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie string for `session`, or an expired cookie when there is none.
    pub fn render(&self, session: Option<&AuthSession>) -> WalletResult<String> {
        match session {
            Some(session) => Ok(format!(
                "{}={}; path=/; max-age={}; samesite=strict",
                self.name,
                serde_json::to_string(session)?,
                self.max_age.as_secs()
            )),
            None => Ok(format!("{}=; path=/; expires={}", self.name, EXPIRED)),
        }
    }
}

/// Sink that remembers what was written. Used on native targets and in tests.
#[derive(Debug, Default)]
pub struct RecordingCookieSink {
    written: Mutex<Vec<String>>,
}

impl RecordingCookieSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.written.lock().last().cloned()
    }
}

impl CookieSink for RecordingCookieSink {
    fn write_cookie(&self, cookie: &str) -> WalletResult<()> {
        self.written.lock().push(cookie.to_string());
        Ok(())
    }
}

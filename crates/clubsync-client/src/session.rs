//! Session context shared between callers and the reconnect path.
//!
//! Written by explicit calls (login, logout, group switch); the only other
//! reader is the supervisor, which re-applies the selected group when it
//! rebuilds the connection endpoint.

use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// Opaque credential obtained via login.
    pub token: Option<String>,
    /// Id of the group whose domain data this connection is scoped to.
    pub group_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SessionCell {
    inner: Mutex<SessionContext>,
}

impl SessionCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionContext {
        self.lock().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    pub fn group_id(&self) -> Option<String> {
        self.lock().group_id.clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        self.lock().token = token;
    }

    pub fn set_group(&self, group_id: Option<String>) {
        self.lock().group_id = group_id;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionContext> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

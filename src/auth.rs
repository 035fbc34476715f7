//! Explicit authentication context.
//!
//! The shell owns one [`AuthSession`] and hands it to the data clients.
//! Nothing below the shell reads ambient storage: the credential is loaded
//! once at startup, updated on login, and cleared on logout.

use std::cell::RefCell;
use std::rc::Rc;

const TOKEN_KEY: &str = "token";
const USERNAME_KEY: &str = "username";

/// A bearer credential plus the display name it was issued to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub username: String,
}

/// Shared handle on the signed-in state. Cloning is cheap; every clone
/// observes the same session.
#[derive(Clone, Default, Debug)]
pub struct AuthSession {
    inner: Rc<RefCell<Option<Credentials>>>,
}

impl AuthSession {
    /// An empty, signed-out session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session without touching persistent storage.
    pub fn with_credentials(token: impl Into<String>, username: impl Into<String>) -> Self {
        let session = Self::new();
        *session.inner.borrow_mut() = Some(Credentials {
            token: token.into(),
            username: username.into(),
        });
        session
    }

    /// Restore the persisted credential, if any. Browser-only.
    pub fn load() -> Self {
        let session = Self::new();
        if let Some(storage) = local_storage() {
            let token = storage.get_item(TOKEN_KEY).ok().flatten();
            let username = storage.get_item(USERNAME_KEY).ok().flatten();
            if let (Some(token), Some(username)) = (token, username) {
                *session.inner.borrow_mut() = Some(Credentials { token, username });
            }
        }
        session
    }

    /// Install a fresh credential and persist it.
    pub fn login(&self, token: impl Into<String>, username: impl Into<String>) {
        let creds = Credentials {
            token: token.into(),
            username: username.into(),
        };
        if let Some(storage) = local_storage() {
            let _ = storage.set_item(TOKEN_KEY, &creds.token);
            let _ = storage.set_item(USERNAME_KEY, &creds.username);
        }
        *self.inner.borrow_mut() = Some(creds);
    }

    /// Clear the credential everywhere. Invalidates all in-flight work
    /// that depended on it.
    pub fn logout(&self) {
        if let Some(storage) = local_storage() {
            let _ = storage.remove_item(TOKEN_KEY);
            let _ = storage.remove_item(USERNAME_KEY);
        }
        *self.inner.borrow_mut() = None;
    }

    pub fn token(&self) -> Option<String> {
        self.inner.borrow().as_ref().map(|c| c.token.clone())
    }

    pub fn username(&self) -> Option<String> {
        self.inner.borrow().as_ref().map(|c| c.username.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.borrow().is_some()
    }
}

// Handle identity, not contents: two clones of one session compare equal.
impl PartialEq for AuthSession {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

fn local_storage() -> Option<web_sys::Storage> {
    web_sys::window().and_then(|w| w.local_storage().ok().flatten())
}

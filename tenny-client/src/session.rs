//! Explicit auth context handed to the API client.
//!
//! The bearer token lives behind a `TokenStore` so the CLI can persist it on
//! disk while tests keep it in memory. Front-ends watch `subscribe()` to learn
//! when the backend rejected the token and the user has to log in again.

use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Where the bearer token is kept between runs
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str);
    fn clear(&self);
}

/// Process-local store; forgets the token on exit
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }

    fn save(&self, token: &str) {
        if let Ok(mut t) = self.token.lock() {
            *t = Some(token.to_string());
        }
    }

    fn clear(&self) {
        if let Ok(mut t) = self.token.lock() {
            *t = None;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    SignedOut,
    SignedIn,
    /// The backend answered 401; credentials were dropped
    LoginRequired,
}

struct Inner {
    store: Box<dyn TokenStore>,
    status: watch::Sender<AuthStatus>,
}

/// Cloneable handle to the current credentials
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status())
            .finish()
    }
}

impl Session {
    pub fn new(store: impl TokenStore + 'static) -> Self {
        let initial = if store.load().is_some() {
            AuthStatus::SignedIn
        } else {
            AuthStatus::SignedOut
        };
        let (status, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner {
                store: Box::new(store),
                status,
            }),
        }
    }

    /// Session with nothing persisted
    pub fn in_memory() -> Self {
        Self::new(MemoryTokenStore::new())
    }

    pub fn token(&self) -> Option<String> {
        self.inner.store.load()
    }

    pub fn is_signed_in(&self) -> bool {
        self.token().is_some()
    }

    pub fn set_token(&self, token: &str) {
        self.inner.store.save(token);
        self.inner.status.send_replace(AuthStatus::SignedIn);
        debug!("session token stored");
    }

    /// Explicit logout
    pub fn clear(&self) {
        self.inner.store.clear();
        self.inner.status.send_replace(AuthStatus::SignedOut);
    }

    /// Token rejected by the backend: drop it and ask for a new login
    pub fn expire(&self) {
        warn!("backend rejected credentials; login required");
        self.inner.store.clear();
        self.inner.status.send_replace(AuthStatus::LoginRequired);
    }

    pub fn status(&self) -> AuthStatus {
        *self.inner.status.borrow()
    }

    pub fn login_required(&self) -> bool {
        self.status() == AuthStatus::LoginRequired
    }

    /// Notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.inner.status.subscribe()
    }
}

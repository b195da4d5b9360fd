//! Credentials and authentication state for one remote account.
//!
//! The session is an explicit two-state machine:
//!
//! ```text
//!   Unauthenticated ──login ok (uid != 0)──► Authenticated(uid)
//!          ▲                                        │
//!          └────────── set_credentials / logout ────┘
//! ```
//!
//! # Concurrency
//!
//! [`SharedSession`] only makes the state safe to touch from several tasks.
//! It does not serialize the check-then-login sequence: two callers racing on
//! a fresh session can both log in. Callers sharing one session across tasks
//! must hold their own lock around the first authenticated call.

use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;

/// Session shared by the auth and object services.
pub type SharedSession = Arc<RwLock<Session>>;

/// Database, login and password for one account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Whether the stored credentials have been accepted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    /// Holds the non-zero user id the server assigned.
    Authenticated(i64),
}

#[derive(Debug, Clone)]
pub struct Session {
    credentials: Credentials,
    state: AuthState,
}

impl Session {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: AuthState::Unauthenticated,
        }
    }

    /// Wrap a new session for sharing between services.
    pub fn shared(credentials: Credentials) -> SharedSession {
        Arc::new(RwLock::new(Self::new(credentials)))
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, AuthState::Authenticated(_))
    }

    pub fn user_id(&self) -> Option<i64> {
        match self.state {
            AuthState::Authenticated(uid) => Some(uid),
            AuthState::Unauthenticated => None,
        }
    }

    /// Record a successful login. A zero id is never a valid login and
    /// leaves the session unauthenticated.
    pub fn mark_authenticated(&mut self, user_id: i64) -> bool {
        if user_id == 0 {
            self.state = AuthState::Unauthenticated;
            return false;
        }
        self.state = AuthState::Authenticated(user_id);
        true
    }

    pub fn logout(&mut self) {
        self.state = AuthState::Unauthenticated;
    }

    /// Swap in new credentials. Drops any existing authentication.
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
        self.state = AuthState::Unauthenticated;
    }
}

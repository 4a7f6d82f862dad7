//! Authentication seam for the ledger store

use tokio::sync::watch;
use uuid::Uuid;

/// Supplies the current user identity and a feed of session transitions
///
/// The ledger treats "no user" as "clear all local state", so a provider
/// must emit `None` on sign-out.
pub trait AuthProvider: Send + Sync {
    /// Currently signed-in user, if any
    fn current_user(&self) -> Option<Uuid>;

    /// Follow sign-in/sign-out transitions
    fn watch_sessions(&self) -> watch::Receiver<Option<Uuid>>;
}

/// Session-backed auth provider driven by explicit sign-in/sign-out calls
pub struct SessionAuth {
    session: watch::Sender<Option<Uuid>>,
}

impl SessionAuth {
    /// Create a provider with no active session
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self { session }
    }

    /// Create a provider that is already signed in
    pub fn signed_in(user_id: Uuid) -> Self {
        let (session, _) = watch::channel(Some(user_id));
        Self { session }
    }

    pub fn sign_in(&self, user_id: Uuid) {
        self.session.send_replace(Some(user_id));
    }

    pub fn sign_out(&self) {
        self.session.send_replace(None);
    }
}

impl Default for SessionAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthProvider for SessionAuth {
    fn current_user(&self) -> Option<Uuid> {
        *self.session.borrow()
    }

    fn watch_sessions(&self) -> watch::Receiver<Option<Uuid>> {
        self.session.subscribe()
    }
}

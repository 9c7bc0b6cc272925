use std::sync::{PoisonError, RwLock};

use tracing::{debug, info};

/// Read side of the auth token: every REST call site and the connection
/// manager go through this instead of a global slot.
pub trait CredentialProvider: Send + Sync {
    /// Current bearer token, if signed in
    fn token(&self) -> Option<String>;

    /// Whether the signed-in user may mutate the shared radio
    fn is_admin(&self) -> bool;
}

// Type alias for the optional token refresh callback for clarity
pub type TokenCallback = Option<Box<dyn Fn(&str) + Send + Sync + 'static>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub is_admin: bool,
}

struct AuthSession {
    token: String,
    user: UserProfile,
}

/// In-memory credential slot with a single write path
/// (`sign_in` / `refresh_token` / `sign_out`) and many readers.
pub struct SessionCredentials {
    session: RwLock<Option<AuthSession>>,
    token_refresh_callback: RwLock<TokenCallback>,
}

impl Default for SessionCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCredentials {
    pub fn new() -> Self {
        Self {
            session: RwLock::new(None),
            token_refresh_callback: RwLock::new(None),
        }
    }

    pub fn set_token_refresh_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut guard = self
            .token_refresh_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Box::new(callback));
        debug!("Token refresh callback set.");
    }

    pub fn sign_in(&self, token: &str, user: UserProfile) {
        info!(user = %user.username, admin = user.is_admin, "Signed in");
        let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(AuthSession {
            token: token.to_string(),
            user,
        });
    }

    /// Swap the token of the current session. Does nothing when signed out.
    pub fn refresh_token(&self, token: &str) -> bool {
        {
            let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
            match guard.as_mut() {
                Some(session) => session.token = token.to_string(),
                None => {
                    debug!("Ignoring token refresh while signed out.");
                    return false;
                }
            }
        }
        let callback = self
            .token_refresh_callback
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(ref callback) = *callback {
            debug!("Calling token refresh callback.");
            callback(token);
        }
        true
    }

    pub fn sign_out(&self) {
        let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            info!("Signed out");
        }
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.user.clone())
    }
}

impl CredentialProvider for SessionCredentials {
    fn token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.token.clone())
            .filter(|t| !t.is_empty())
    }

    fn is_admin(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| s.user.is_admin && !s.token.is_empty())
    }
}

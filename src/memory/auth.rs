//! In-process auth backend.

use crate::backend::{AuthBackend, Listener};
use crate::broadcast::Broadcaster;
use crate::error::{LinkError, Result};
use crate::types::{IdToken, Identity, Provider};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shortest accepted password on sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    password: String,
    identity: Identity,
}

struct AuthInner {
    accounts: RwLock<HashMap<String, Account>>,
    federated: RwLock<HashMap<Provider, Identity>>,
    /// Held while broadcasting so listeners see transitions in order.
    current: RwLock<Option<Identity>>,
    auth_state: Broadcaster<Option<Identity>>,
    id_token: Broadcaster<Option<Identity>>,
    token_error: RwLock<Option<LinkError>>,
    tokens_issued: AtomicU64,
    next_uid: AtomicU64,
}

/// Auth backend held in memory.
///
/// Tokens are issued as `tok-<uid>-<n>`, with `n` counting every issued
/// token. Cloning shares the same backend.
#[derive(Clone)]
pub struct MemoryAuthBackend {
    inner: Arc<AuthInner>,
}

impl MemoryAuthBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AuthInner {
                accounts: RwLock::new(HashMap::new()),
                federated: RwLock::new(HashMap::new()),
                current: RwLock::new(None),
                auth_state: Broadcaster::new(),
                id_token: Broadcaster::new(),
                token_error: RwLock::new(None),
                tokens_issued: AtomicU64::new(0),
                next_uid: AtomicU64::new(1),
            }),
        }
    }

    /// Register an email/password account without signing in.
    pub fn with_account(self, email: &str, password: &str, uid: &str) -> Self {
        let identity = Identity::new(uid).with_email(email);
        self.inner.accounts.write().insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity,
            },
        );
        self
    }

    /// Identity returned by a federated sign-in with `provider`.
    pub fn with_provider_identity(self, provider: Provider, identity: Identity) -> Self {
        self.inner.federated.write().insert(provider, identity);
        self
    }

    /// Simulate a silent token refresh for the signed-in identity.
    /// Returns false if nobody is signed in.
    pub fn refresh_token(&self) -> bool {
        let current = self.inner.current.read();
        match current.as_ref() {
            Some(identity) => {
                self.inner.id_token.broadcast(Some(identity.clone()));
                true
            }
            None => false,
        }
    }

    /// Make `id_token` fail until cleared.
    pub fn set_token_error(&self, error: Option<LinkError>) {
        *self.inner.token_error.write() = error;
    }

    pub fn tokens_issued(&self) -> u64 {
        self.inner.tokens_issued.load(Ordering::SeqCst)
    }

    fn set_current(&self, identity: Option<Identity>) {
        let mut current = self.inner.current.write();
        *current = identity.clone();
        self.inner.auth_state.broadcast(identity.clone());
        self.inner.id_token.broadcast(identity);
    }

    /// Subscribe and deliver the current state first, as the real backend does.
    fn listen_with_current(
        &self,
        broadcaster: &Broadcaster<Option<Identity>>,
    ) -> Listener<Option<Identity>> {
        let current = self.inner.current.read();
        let listener = broadcaster.subscribe();
        broadcaster.send_to(listener.id(), current.clone());
        listener
    }
}

impl Default for MemoryAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthBackend for MemoryAuthBackend {
    fn sign_in_with_provider(&self, provider: Provider) -> Result<Identity> {
        let identity = self
            .inner
            .federated
            .read()
            .get(&provider)
            .cloned()
            .ok_or_else(|| LinkError::Auth(format!("{} sign-in was cancelled", provider)))?;
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    fn sign_in_with_email_and_password(&self, email: &str, password: &str) -> Result<Identity> {
        let identity = {
            let accounts = self.inner.accounts.read();
            match accounts.get(email) {
                Some(account) if account.password == password => account.identity.clone(),
                _ => return Err(LinkError::InvalidCredentials),
            }
        };
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity> {
        if !email.contains('@') {
            return Err(LinkError::Auth(format!("invalid email: {}", email)));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(LinkError::Auth(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let identity = {
            let mut accounts = self.inner.accounts.write();
            if accounts.contains_key(email) {
                return Err(LinkError::AccountExists(email.to_string()));
            }
            let uid = format!("user-{}", self.inner.next_uid.fetch_add(1, Ordering::SeqCst));
            let identity = Identity::new(uid).with_email(email);
            accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    identity: identity.clone(),
                },
            );
            identity
        };

        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    fn sign_out(&self) -> Result<()> {
        self.set_current(None);
        Ok(())
    }

    fn current_user(&self) -> Option<Identity> {
        self.inner.current.read().clone()
    }

    fn on_auth_state_changed(&self) -> Listener<Option<Identity>> {
        self.listen_with_current(&self.inner.auth_state)
    }

    fn on_id_token_changed(&self) -> Listener<Option<Identity>> {
        self.listen_with_current(&self.inner.id_token)
    }

    fn id_token(&self, identity: &Identity) -> Result<IdToken> {
        if let Some(error) = self.inner.token_error.read().clone() {
            return Err(error);
        }
        let n = self.inner.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(IdToken(format!("tok-{}-{}", identity.uid, n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_millis(200);

    #[test]
    fn test_email_sign_in() {
        let auth = MemoryAuthBackend::new().with_account("ada@example.com", "hunter22", "ada");

        assert_eq!(
            auth.sign_in_with_email_and_password("ada@example.com", "wrong"),
            Err(LinkError::InvalidCredentials)
        );
        assert!(auth.current_user().is_none());

        let identity = auth
            .sign_in_with_email_and_password("ada@example.com", "hunter22")
            .unwrap();
        assert_eq!(identity.uid.as_str(), "ada");
        assert_eq!(auth.current_user(), Some(identity));
    }

    #[test]
    fn test_sign_up_rules() {
        let auth = MemoryAuthBackend::new();

        assert!(matches!(
            auth.create_user_with_email_and_password("grace@example.com", "123"),
            Err(LinkError::Auth(_))
        ));

        let identity = auth
            .create_user_with_email_and_password("grace@example.com", "longenough")
            .unwrap();
        assert_eq!(identity.email.as_deref(), Some("grace@example.com"));

        assert_eq!(
            auth.create_user_with_email_and_password("grace@example.com", "longenough"),
            Err(LinkError::AccountExists("grace@example.com".into()))
        );
    }

    #[test]
    fn test_state_listener_gets_current_then_changes() {
        let auth = MemoryAuthBackend::new()
            .with_provider_identity(Provider::Google, Identity::new("g-1"));

        let listener = auth.on_auth_state_changed();
        assert_eq!(listener.recv_timeout(WAIT).unwrap(), None);

        auth.sign_in_with_provider(Provider::Google).unwrap();
        assert_eq!(
            listener.recv_timeout(WAIT).unwrap(),
            Some(Identity::new("g-1"))
        );

        auth.sign_out().unwrap();
        assert_eq!(listener.recv_timeout(WAIT).unwrap(), None);
    }

    #[test]
    fn test_unconfigured_provider_fails() {
        let auth = MemoryAuthBackend::new();
        assert!(matches!(
            auth.sign_in_with_provider(Provider::Apple),
            Err(LinkError::Auth(_))
        ));
    }

    #[test]
    fn test_token_refresh_and_issue() {
        let auth = MemoryAuthBackend::new().with_account("a@b.c", "secret1", "u1");
        assert!(!auth.refresh_token());

        let identity = auth.sign_in_with_email_and_password("a@b.c", "secret1").unwrap();
        let tokens = auth.on_id_token_changed();
        assert_eq!(tokens.recv_timeout(WAIT).unwrap(), Some(identity.clone()));

        assert!(auth.refresh_token());
        assert_eq!(tokens.recv_timeout(WAIT).unwrap(), Some(identity.clone()));

        assert_eq!(auth.id_token(&identity).unwrap().as_str(), "tok-u1-1");
        assert_eq!(auth.id_token(&identity).unwrap().as_str(), "tok-u1-2");

        auth.set_token_error(Some(LinkError::Auth("network".into())));
        assert!(auth.id_token(&identity).is_err());
        assert_eq!(auth.tokens_issued(), 2);
    }
}

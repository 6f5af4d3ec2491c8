//! Identity session: the signed-in identity, kept current from the backend.
//!
//! The session seeds itself from [`AuthBackend::current_user`] and then
//! follows the auth-state stream on a listener thread. Stream events are
//! treated as change notifications: on each one the session re-reads
//! `current_user()`, so a stale queued event can never resurrect an identity
//! that has already signed out.

use crate::backend::{AuthBackend, Listener, Navigator};
use crate::broadcast::Broadcaster;
use crate::config::LinkConfig;
use crate::error::Result;
use crate::types::{Identity, Provider, Uid};
use crate::worker::Worker;
use crossbeam_channel::select;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

struct SessionInner {
    auth: Arc<dyn AuthBackend>,
    navigator: Arc<dyn Navigator>,
    landing_route: String,
    current: RwLock<Option<Identity>>,
    watchers: Broadcaster<Option<Identity>>,
}

impl SessionInner {
    /// Store `identity` and notify watchers if it changed.
    fn apply(&self, identity: Option<Identity>) -> bool {
        let mut current = self.current.write();
        if *current == identity {
            return false;
        }
        tracing::debug!(
            uid = identity.as_ref().map(|i| i.uid.as_str()).unwrap_or("<none>"),
            "identity changed"
        );
        *current = identity.clone();
        self.watchers.broadcast(identity);
        true
    }

    fn reconcile(&self) -> bool {
        self.apply(self.auth.current_user())
    }
}

/// Current identity plus a stream of its later changes.
///
/// The stream is subscribed before `current` is read, so no change between
/// the two is lost.
pub struct IdentityFeed {
    pub current: Option<Identity>,
    pub changes: Listener<Option<Identity>>,
}

/// Holds the current identity and wraps the auth operations.
pub struct IdentitySession {
    inner: Arc<SessionInner>,
    worker: Mutex<Option<Worker>>,
}

impl IdentitySession {
    /// Seed from the backend and start following auth-state changes.
    pub fn start(
        auth: Arc<dyn AuthBackend>,
        navigator: Arc<dyn Navigator>,
        config: &LinkConfig,
    ) -> Result<Self> {
        let inner = Arc::new(SessionInner {
            current: RwLock::new(auth.current_user()),
            auth,
            navigator,
            landing_route: config.landing_route.clone(),
            watchers: Broadcaster::with_buffer_size(config.watch_buffer),
        });

        let listener = inner.auth.on_auth_state_changed();
        let state = Arc::clone(&inner);
        let worker = Worker::spawn("livedoc-session", move |stop| loop {
            select! {
                recv(listener.receiver()) -> msg => match msg {
                    Ok(event) => {
                        tracing::debug!(signed_in = event.is_some(), "auth state changed");
                        state.reconcile();
                    }
                    Err(_) => {
                        tracing::warn!("auth state stream closed");
                        break;
                    }
                },
                recv(stop) -> _ => break,
            }
        })?;

        Ok(Self {
            inner,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn current(&self) -> Option<Identity> {
        self.inner.current.read().clone()
    }

    pub fn uid(&self) -> Option<Uid> {
        self.inner.current.read().as_ref().map(|i| i.uid.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.current.read().is_some()
    }

    /// Receive every identity transition from now on.
    pub fn watch(&self) -> Listener<Option<Identity>> {
        self.inner.watchers.subscribe()
    }

    pub fn feed(&self) -> IdentityFeed {
        let changes = self.watch();
        IdentityFeed {
            current: self.current(),
            changes,
        }
    }

    pub fn auth(&self) -> &Arc<dyn AuthBackend> {
        &self.inner.auth
    }

    // --- Auth operations ---

    pub fn sign_in_with_provider(&self, provider: Provider) -> Result<Identity> {
        let identity = self.inner.auth.sign_in_with_provider(provider)?;
        tracing::info!(provider = %provider, uid = %identity.uid, "signed in");
        self.inner.reconcile();
        Ok(identity)
    }

    pub fn sign_in_with_email_and_password(&self, email: &str, password: &str) -> Result<Identity> {
        let identity = self
            .inner
            .auth
            .sign_in_with_email_and_password(email, password)?;
        tracing::info!(uid = %identity.uid, "signed in with email");
        self.inner.reconcile();
        Ok(identity)
    }

    pub fn sign_up_with_email_and_password(&self, email: &str, password: &str) -> Result<Identity> {
        let identity = self
            .inner
            .auth
            .create_user_with_email_and_password(email, password)?;
        tracing::info!(uid = %identity.uid, "signed up with email");
        self.inner.reconcile();
        Ok(identity)
    }

    /// Sign out, clear the local identity, then go to the landing route.
    pub fn sign_out(&self) -> Result<()> {
        self.inner.auth.sign_out()?;
        self.inner.apply(None);
        self.inner.navigator.navigate(&self.inner.landing_route);
        tracing::info!(route = %self.inner.landing_route, "signed out");
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(Worker::is_running)
            .unwrap_or(false)
    }

    /// Stop following the backend and disconnect all watchers.
    pub fn shutdown(&self) {
        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            worker.stop();
        }
        self.inner.watchers.close_all();
    }
}

impl Drop for IdentitySession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryAuthBackend, RecordingNavigator};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_millis(500);

    fn start(auth: &MemoryAuthBackend, nav: &RecordingNavigator) -> IdentitySession {
        IdentitySession::start(
            Arc::new(auth.clone()),
            Arc::new(nav.clone()),
            &LinkConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_seeds_from_current_user() {
        let auth = MemoryAuthBackend::new().with_account("a@b.c", "secret1", "u1");
        auth.sign_in_with_email_and_password("a@b.c", "secret1").unwrap();

        let session = start(&auth, &RecordingNavigator::new());
        assert_eq!(session.uid(), Some(Uid::new("u1")));
        assert!(session.is_listening());
    }

    #[test]
    fn test_follows_backend_changes() {
        let auth = MemoryAuthBackend::new().with_account("a@b.c", "secret1", "u1");
        let session = start(&auth, &RecordingNavigator::new());
        let watch = session.watch();

        // Signed in behind the session's back.
        auth.sign_in_with_email_and_password("a@b.c", "secret1").unwrap();
        let change = watch.recv_timeout(WAIT).unwrap();
        assert_eq!(change.map(|i| i.uid), Some(Uid::new("u1")));
        assert!(session.is_signed_in());
    }

    #[test]
    fn test_sign_in_updates_immediately() {
        let auth = MemoryAuthBackend::new()
            .with_provider_identity(Provider::Microsoft, Identity::new("ms-7"));
        let session = start(&auth, &RecordingNavigator::new());

        session.sign_in_with_provider(Provider::Microsoft).unwrap();
        assert_eq!(session.uid(), Some(Uid::new("ms-7")));
    }

    #[test]
    fn test_sign_in_error_propagates() {
        let auth = MemoryAuthBackend::new();
        let session = start(&auth, &RecordingNavigator::new());

        assert!(session
            .sign_in_with_email_and_password("nobody@example.com", "x")
            .is_err());
        assert!(session.current().is_none());
    }

    #[test]
    fn test_sign_out_clears_and_navigates() {
        let auth = MemoryAuthBackend::new().with_account("a@b.c", "secret1", "u1");
        let nav = RecordingNavigator::new();
        let session = start(&auth, &nav);
        session
            .sign_in_with_email_and_password("a@b.c", "secret1")
            .unwrap();

        session.sign_out().unwrap();
        assert!(session.current().is_none());
        assert_eq!(nav.routes(), vec!["/".to_string()]);
    }

    #[test]
    fn test_shutdown_disconnects_watchers() {
        let auth = MemoryAuthBackend::new();
        let session = start(&auth, &RecordingNavigator::new());
        let watch = session.watch();

        session.shutdown();
        assert!(!session.is_listening());
        assert!(watch.recv_timeout(Duration::from_millis(50)).is_err());
    }
}

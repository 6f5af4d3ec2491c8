//! Interfaces to the external collaborators.
//!
//! Authentication, document subscriptions, the outbound API client and
//! routing are all owned by external libraries. The link layer only talks
//! to them through these traits; the `memory` module has in-process
//! implementations.

use crate::error::Result;
use crate::types::{IdToken, Identity, Provider, Query, SnapshotEvent};
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::fmt;
use std::time::Duration;

/// Unique identifier for a listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a push subscription.
///
/// Events arrive on the wrapped channel in the order the backend emits
/// them. Closing the handle (explicitly or by dropping it) runs the
/// backend's unsubscribe hook exactly once.
pub struct Listener<T> {
    id: ListenerId,
    receiver: Receiver<T>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Listener<T> {
    pub fn new<F>(id: ListenerId, receiver: Receiver<T>, unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id,
            receiver,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A listener with no unsubscribe hook.
    pub fn detached(id: ListenerId, receiver: Receiver<T>) -> Self {
        Self {
            id,
            receiver,
            unsubscribe: None,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn receiver(&self) -> &Receiver<T> {
        &self.receiver
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> std::result::Result<T, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<T, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> std::result::Result<T, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Unsubscribe now.
    pub fn close(mut self) {
        self.run_unsubscribe();
    }

    fn run_unsubscribe(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl<T> Drop for Listener<T> {
    fn drop(&mut self) {
        self.run_unsubscribe();
    }
}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("open", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Auth backend operations.
///
/// Every method may block on the network; callers that must not block run
/// them on their own thread.
pub trait AuthBackend: Send + Sync {
    /// Federated sign-in (popup flow on web backends).
    fn sign_in_with_provider(&self, provider: Provider) -> Result<Identity>;

    fn sign_in_with_email_and_password(&self, email: &str, password: &str) -> Result<Identity>;

    fn create_user_with_email_and_password(&self, email: &str, password: &str)
        -> Result<Identity>;

    fn sign_out(&self) -> Result<()>;

    /// The identity the backend currently considers signed in.
    fn current_user(&self) -> Option<Identity>;

    /// Fires on sign-in and sign-out.
    fn on_auth_state_changed(&self) -> Listener<Option<Identity>>;

    /// Fires on sign-in, sign-out and every silent token refresh.
    fn on_id_token_changed(&self) -> Listener<Option<Identity>>;

    fn id_token(&self, identity: &Identity) -> Result<IdToken>;
}

/// Document store with push subscriptions.
pub trait DocumentStore: Send + Sync {
    /// Open a subscription that yields a full snapshot on every change,
    /// or an error. An error is terminal for the subscription.
    fn listen(&self, query: &Query) -> Result<Listener<SnapshotEvent>>;
}

/// Outbound API client.
pub trait ApiClient: Send + Sync {
    /// Install (or clear) the default `Authorization: Bearer` header.
    fn set_bearer_token(&self, token: Option<&IdToken>);

    /// Invalidate cached results for a logical query name.
    fn invalidate_queries(&self, key: &str) -> Result<()>;
}

/// Application routing.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigator for hosts without routing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, route: &str) {
        tracing::debug!(route, "navigation ignored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_unsubscribe_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = unbounded::<u32>();

        let counter = Arc::clone(&calls);
        let listener = Listener::new(ListenerId(1), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(7).unwrap();
        assert_eq!(listener.try_recv().unwrap(), 7);

        listener.close();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = unbounded::<u32>();

        let counter = Arc::clone(&calls);
        {
            let _listener = Listener::new(ListenerId(2), rx, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! Live query adapter: a push subscription republished as query state.
//!
//! Each [`LiveQuery`] owns one worker thread and at most one open
//! subscription. The worker multiplexes three inputs:
//! - control messages (refetch, shutdown)
//! - snapshot events from the open subscription
//! - identity changes, when the query follows a session
//!
//! State transitions:
//! - mount / re-subscribe: `loading = true`
//! - snapshot: `data` replaced wholesale, `loading = false`, `error` cleared
//! - error: `error` set, `loading = false`, `data` kept; the subscription
//!   is closed and stays closed until a refetch
//! - `refetch()`: `loading = true`, `error` cleared, `data` kept
//!
//! The old subscription is always closed before its replacement opens.

use crate::backend::{DocumentStore, Listener};
use crate::broadcast::{Broadcaster, DEFAULT_BUFFER_SIZE};
use crate::error::{LinkError, Result};
use crate::registry::{RefetchGuard, RefetchRegistry, RegistrationId};
use crate::session::IdentityFeed;
use crate::types::{Identity, Query, Record, SnapshotEvent};
use crate::worker::Worker;
use crossbeam_channel::{never, select, unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Observable state of a live query.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryState {
    pub data: Option<Vec<Record>>,
    pub loading: bool,
    pub error: Option<LinkError>,
}

impl QueryState {
    /// Mounted, waiting for the first snapshot.
    pub fn pending() -> Self {
        Self {
            data: None,
            loading: true,
            error: None,
        }
    }

    /// Nothing to subscribe to (no identity for a scoped query).
    pub fn idle() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !self.loading
    }

    pub fn records(&self) -> &[Record] {
        self.data.as_deref().unwrap_or(&[])
    }
}

/// Builds the query to subscribe to.
#[derive(Clone)]
pub enum QuerySource {
    /// Same query regardless of identity.
    Fixed(Query),
    /// Query derived from the signed-in identity. No identity, no query.
    Scoped(Arc<dyn Fn(&Identity) -> Result<Query> + Send + Sync>),
}

impl QuerySource {
    pub fn scoped<F>(build: F) -> Self
    where
        F: Fn(&Identity) -> Result<Query> + Send + Sync + 'static,
    {
        QuerySource::Scoped(Arc::new(build))
    }

    fn resolve(&self, identity: Option<&Identity>) -> Option<Result<Query>> {
        match self {
            QuerySource::Fixed(query) => Some(Ok(query.clone())),
            QuerySource::Scoped(build) => identity.map(|i| build(i)),
        }
    }

    fn is_scoped(&self) -> bool {
        matches!(self, QuerySource::Scoped(_))
    }
}

impl fmt::Debug for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuerySource::Fixed(query) => f.debug_tuple("Fixed").field(&query.path).finish(),
            QuerySource::Scoped(_) => f.write_str("Scoped(..)"),
        }
    }
}

enum Control {
    Resubscribe,
}

/// State shared between the handle, the worker and refetch callbacks.
struct Shared {
    label: String,
    state: RwLock<QueryState>,
    query: RwLock<Option<Query>>,
    watchers: Broadcaster<QueryState>,
    /// Bumped by every refetch. Events from a subscription opened under an
    /// older generation are discarded.
    generation: AtomicU64,
}

impl Shared {
    fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut QueryState),
    {
        let mut state = self.state.write();
        change(&mut state);
        self.watchers.broadcast(state.clone());
    }

    fn replace(&self, next: QueryState) {
        self.update(|state| *state = next);
    }

    /// Apply `change` only if no refetch happened since `generation`.
    /// Checked under the state lock, so it cannot interleave with a refetch.
    fn update_current<F>(&self, generation: u64, change: F) -> bool
    where
        F: FnOnce(&mut QueryState),
    {
        let mut state = self.state.write();
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        change(&mut state);
        self.watchers.broadcast(state.clone());
        true
    }

    fn request_refetch(&self, control: &Sender<Control>) {
        tracing::debug!(query = %self.label, "refetch requested");
        self.update(|state| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            state.loading = true;
            state.error = None;
        });
        let _ = control.send(Control::Resubscribe);
    }
}

struct ActiveSubscription {
    listener: Listener<SnapshotEvent>,
    generation: u64,
}

/// Options for mounting a [`LiveQuery`].
pub struct LiveQueryBuilder {
    store: Arc<dyn DocumentStore>,
    source: QuerySource,
    registry: Option<RefetchRegistry>,
    identity: Option<IdentityFeed>,
    watch_buffer: usize,
    label: Option<String>,
}

impl LiveQueryBuilder {
    /// Register with `registry` so `refetch_all` reaches this query.
    pub fn registry(mut self, registry: &RefetchRegistry) -> Self {
        self.registry = Some(registry.clone());
        self
    }

    /// Re-subscribe whenever the identity changes.
    pub fn follow(mut self, feed: IdentityFeed) -> Self {
        self.identity = Some(feed);
        self
    }

    pub fn watch_buffer(mut self, size: usize) -> Self {
        self.watch_buffer = size;
        self
    }

    /// Name used in logs and the worker thread name.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn mount(self) -> Result<LiveQuery> {
        LiveQuery::mount(self)
    }
}

/// Handle to a mounted live query. Dropping it unmounts.
pub struct LiveQuery {
    shared: Arc<Shared>,
    control: Sender<Control>,
    registration: Option<RefetchGuard>,
    worker: Option<Worker>,
}

impl LiveQuery {
    pub fn builder(store: Arc<dyn DocumentStore>, source: QuerySource) -> LiveQueryBuilder {
        LiveQueryBuilder {
            store,
            source,
            registry: None,
            identity: None,
            watch_buffer: DEFAULT_BUFFER_SIZE,
            label: None,
        }
    }

    fn mount(options: LiveQueryBuilder) -> Result<Self> {
        let LiveQueryBuilder {
            store,
            source,
            registry,
            identity,
            watch_buffer,
            label,
        } = options;

        let label = label.unwrap_or_else(|| match &source {
            QuerySource::Fixed(query) => query.path.to_string(),
            QuerySource::Scoped(_) => "scoped".to_string(),
        });

        let shared = Arc::new(Shared {
            label: label.clone(),
            state: RwLock::new(QueryState::pending()),
            query: RwLock::new(None),
            watchers: Broadcaster::with_buffer_size(watch_buffer),
            generation: AtomicU64::new(0),
        });
        let (control, control_rx) = unbounded();

        let registration = registry.map(|registry| {
            let shared = Arc::downgrade(&shared);
            let control = control.clone();
            registry.register(move || {
                if let Some(shared) = shared.upgrade() {
                    shared.request_refetch(&control);
                }
            })
        });

        let task = QueryTask {
            shared: Arc::clone(&shared),
            store,
            source,
            identity: identity.as_ref().and_then(|feed| feed.current.clone()),
            active: None,
        };
        let changes = identity.map(|feed| feed.changes);

        let worker = Worker::spawn(&format!("livedoc-query:{}", label), move |stop| {
            task.run(control_rx, changes, stop)
        })?;

        Ok(Self {
            shared,
            control,
            registration,
            worker: Some(worker),
        })
    }

    /// Current state.
    pub fn state(&self) -> QueryState {
        self.shared.state.read().clone()
    }

    pub fn data(&self) -> Option<Vec<Record>> {
        self.shared.state.read().data.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state.read().loading
    }

    pub fn error(&self) -> Option<LinkError> {
        self.shared.state.read().error.clone()
    }

    /// The query of the open (or last opened) subscription.
    pub fn current_query(&self) -> Option<Query> {
        self.shared.query.read().clone()
    }

    /// Receive every state transition from now on.
    pub fn watch(&self) -> Listener<QueryState> {
        self.shared.watchers.subscribe()
    }

    /// Mark loading, clear the error and re-subscribe. Data is kept.
    pub fn refetch(&self) {
        self.shared.request_refetch(&self.control);
    }

    pub fn registration_id(&self) -> Option<RegistrationId> {
        self.registration.as_ref().map(RefetchGuard::id)
    }

    /// Block until the state satisfies `predicate`, or the timeout passes.
    pub fn wait_for<P>(&self, timeout: Duration, mut predicate: P) -> Option<QueryState>
    where
        P: FnMut(&QueryState) -> bool,
    {
        let watch = self.watch();
        let state = self.state();
        if predicate(&state) {
            return Some(state);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match watch.recv_timeout(remaining) {
                Ok(state) if predicate(&state) => return Some(state),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Wait until neither loading nor pending.
    pub fn wait_settled(&self, timeout: Duration) -> Option<QueryState> {
        self.wait_for(timeout, QueryState::is_settled)
    }

    /// Close the subscription and deregister. Same as dropping.
    pub fn unmount(self) {}
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.registration.take();
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        self.shared.watchers.close_all();
        tracing::debug!(query = %self.shared.label, "live query unmounted");
    }
}

impl fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveQuery")
            .field("label", &self.shared.label)
            .field("state", &*self.shared.state.read())
            .finish()
    }
}

/// Worker-side half of a live query.
struct QueryTask {
    shared: Arc<Shared>,
    store: Arc<dyn DocumentStore>,
    source: QuerySource,
    identity: Option<Identity>,
    active: Option<ActiveSubscription>,
}

impl QueryTask {
    fn run(
        mut self,
        control: Receiver<Control>,
        mut changes: Option<Listener<Option<Identity>>>,
        stop: Receiver<()>,
    ) {
        self.resubscribe();

        loop {
            let snapshots = self
                .active
                .as_ref()
                .map(|a| a.listener.receiver().clone())
                .unwrap_or_else(never);
            let identities = changes
                .as_ref()
                .map(|l| l.receiver().clone())
                .unwrap_or_else(never);

            select! {
                recv(stop) -> _ => break,
                recv(control) -> msg => match msg {
                    Ok(Control::Resubscribe) => {
                        let current = self.shared.generation.load(Ordering::SeqCst);
                        let fresh = self
                            .active
                            .as_ref()
                            .map_or(false, |a| a.generation == current);
                        if !fresh {
                            self.resubscribe();
                        }
                    }
                    Err(_) => break,
                },
                recv(snapshots) -> event => self.on_event(event.ok()),
                recv(identities) -> msg => match msg {
                    Ok(identity) => self.on_identity(identity),
                    Err(_) => changes = None,
                },
            }
        }

        self.close();
    }

    fn close(&mut self) {
        if let Some(active) = self.active.take() {
            active.listener.close();
        }
    }

    /// Close the current subscription, then open a new one.
    fn resubscribe(&mut self) {
        self.close();
        let generation = self.shared.generation.load(Ordering::SeqCst);

        let query = match self.source.resolve(self.identity.as_ref()) {
            None => {
                tracing::debug!(query = %self.shared.label, "no identity, query idle");
                *self.shared.query.write() = None;
                self.shared.replace(QueryState::idle());
                return;
            }
            Some(Err(e)) => {
                self.fail(e);
                return;
            }
            Some(Ok(query)) => query,
        };

        self.shared.update(|state| state.loading = true);
        *self.shared.query.write() = Some(query.clone());

        match self.store.listen(&query) {
            Ok(listener) => {
                tracing::debug!(query = %self.shared.label, path = %query.path, "subscribed");
                self.active = Some(ActiveSubscription {
                    listener,
                    generation,
                });
            }
            Err(e) => self.fail(e),
        }
    }

    /// `None` means the backend dropped the stream.
    fn on_event(&mut self, event: Option<SnapshotEvent>) {
        let Some(generation) = self.active.as_ref().map(|a| a.generation) else {
            return;
        };

        match event {
            Some(Ok(snapshot)) => {
                tracing::debug!(
                    query = %self.shared.label,
                    documents = snapshot.len(),
                    "snapshot received"
                );
                let records = snapshot.to_records();
                self.shared.update_current(generation, |state| {
                    state.data = Some(records);
                    state.loading = false;
                    state.error = None;
                });
            }
            // Terminal either way. A stale failure is superseded by the
            // pending re-subscribe.
            Some(Err(e)) => {
                self.close();
                self.fail_current(generation, e);
            }
            None => {
                self.close();
                self.fail_current(generation, LinkError::SubscriptionClosed);
            }
        }
    }

    fn on_identity(&mut self, identity: Option<Identity>) {
        if identity == self.identity {
            return;
        }
        self.identity = identity;

        // A different user's records must not stay visible.
        if self.source.is_scoped() {
            self.shared.replace(QueryState::pending());
        } else {
            self.shared.update(|state| {
                state.loading = true;
                state.error = None;
            });
        }
        self.resubscribe();
    }

    /// Errors are stored, never returned. Data is kept.
    fn fail(&self, error: LinkError) {
        let generation = self.shared.generation.load(Ordering::SeqCst);
        self.fail_current(generation, error);
    }

    fn fail_current(&self, generation: u64, error: LinkError) {
        tracing::error!(query = %self.shared.label, error = %error, "live query error");
        self.shared.update_current(generation, |state| {
            state.error = Some(error);
            state.loading = false;
        });
    }
}

//! Recording API client and navigator.

use crate::backend::{ApiClient, Navigator};
use crate::error::{LinkError, Result};
use crate::types::IdToken;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct ApiInner {
    bearer: RwLock<Option<IdToken>>,
    bearer_history: Mutex<Vec<Option<IdToken>>>,
    invalidations: Mutex<Vec<String>>,
    failing_keys: RwLock<HashSet<String>>,
    latency: RwLock<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// API client that records header changes and invalidations.
#[derive(Clone, Default)]
pub struct RecordingApiClient {
    inner: Arc<ApiInner>,
}

impl RecordingApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make invalidations of `key` fail.
    pub fn fail_key(&self, key: &str) {
        self.inner.failing_keys.write().insert(key.to_string());
    }

    /// Delay every invalidation.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.write() = latency;
    }

    /// The currently installed bearer token.
    pub fn bearer_token(&self) -> Option<IdToken> {
        self.inner.bearer.read().clone()
    }

    /// Every `set_bearer_token` call, in order.
    pub fn bearer_history(&self) -> Vec<Option<IdToken>> {
        self.inner.bearer_history.lock().clone()
    }

    /// Invalidated keys, in completion order.
    pub fn invalidations(&self) -> Vec<String> {
        self.inner.invalidations.lock().clone()
    }

    /// Highest number of invalidations that were running at once.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ApiClient for RecordingApiClient {
    fn set_bearer_token(&self, token: Option<&IdToken>) {
        *self.inner.bearer.write() = token.cloned();
        self.inner.bearer_history.lock().push(token.cloned());
    }

    fn invalidate_queries(&self, key: &str) -> Result<()> {
        let running = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let latency = *self.inner.latency.read();
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }

        let result = if self.inner.failing_keys.read().contains(key) {
            Err(LinkError::Invalidation {
                key: key.to_string(),
                message: "refetch failed".to_string(),
            })
        } else {
            self.inner.invalidations.lock().push(key.to_string());
            Ok(())
        };

        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Navigator that records every route.
#[derive(Clone, Default)]
pub struct RecordingNavigator {
    routes: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        self.routes.lock().push(route.to_string());
    }
}

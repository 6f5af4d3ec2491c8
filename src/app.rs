//! Application root: wires the session, token relay, registry and queries.

use crate::api::{invalidate_balance_related_queries, InvalidationReport};
use crate::backend::{ApiClient, AuthBackend, DocumentStore, Navigator, NoopNavigator};
use crate::config::{BackendConfig, LinkConfig};
use crate::error::{LinkError, Result};
use crate::live_query::LiveQuery;
use crate::queries::DomainQueries;
use crate::registry::RefetchRegistry;
use crate::session::IdentitySession;
use crate::token_relay::TokenRelay;
use crate::types::{Identity, Provider};
use std::sync::Arc;

/// Collaborators for a [`LinkContext`].
#[derive(Default)]
pub struct LinkContextBuilder {
    config: LinkConfig,
    auth: Option<Arc<dyn AuthBackend>>,
    store: Option<Arc<dyn DocumentStore>>,
    api: Option<Arc<dyn ApiClient>>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl LinkContextBuilder {
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn auth(mut self, auth: Arc<dyn AuthBackend>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn api(mut self, api: Arc<dyn ApiClient>) -> Self {
        self.api = Some(api);
        self
    }

    /// Optional; defaults to [`NoopNavigator`].
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Start the session and token relay.
    pub fn start(self) -> Result<LinkContext> {
        let auth = self
            .auth
            .ok_or_else(|| LinkError::Config("auth backend not set".into()))?;
        let store = self
            .store
            .ok_or_else(|| LinkError::Config("document store not set".into()))?;
        let api = self
            .api
            .ok_or_else(|| LinkError::Config("api client not set".into()))?;
        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(NoopNavigator));

        let session = Arc::new(IdentitySession::start(
            Arc::clone(&auth),
            navigator,
            &self.config,
        )?);
        let relay = TokenRelay::start(Arc::clone(&auth), Arc::clone(&api))?;
        let registry = RefetchRegistry::new();
        let queries = DomainQueries::new(
            store,
            registry.clone(),
            Arc::clone(&session),
            self.config.watch_buffer,
        );

        tracing::info!(project = %self.config.backend.project_id, "link context started");

        Ok(LinkContext {
            config: self.config,
            auth,
            api,
            session,
            relay,
            registry,
            queries,
        })
    }
}

/// Process-wide link state, created at application start.
///
/// Holds what the UI reads as `{ user, auth }` plus the refetch registry.
/// Live queries mounted from it stay valid after it is dropped, but stop
/// following identity changes.
pub struct LinkContext {
    config: LinkConfig,
    auth: Arc<dyn AuthBackend>,
    api: Arc<dyn ApiClient>,
    session: Arc<IdentitySession>,
    relay: TokenRelay,
    registry: RefetchRegistry,
    queries: DomainQueries,
}

impl LinkContext {
    pub fn builder() -> LinkContextBuilder {
        LinkContextBuilder::default()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn backend_config(&self) -> &BackendConfig {
        &self.config.backend
    }

    /// The signed-in identity, if any.
    pub fn user(&self) -> Option<Identity> {
        self.session.current()
    }

    pub fn auth(&self) -> &Arc<dyn AuthBackend> {
        &self.auth
    }

    pub fn session(&self) -> &Arc<IdentitySession> {
        &self.session
    }

    pub fn registry(&self) -> &RefetchRegistry {
        &self.registry
    }

    /// Force every mounted live query to re-subscribe.
    pub fn refetch_all(&self) -> usize {
        self.registry.refetch_all()
    }

    // --- Queries ---

    pub fn transactions(&self) -> Result<LiveQuery> {
        self.queries.transactions()
    }

    pub fn balance(&self) -> Result<LiveQuery> {
        self.queries.balance()
    }

    pub fn assets(&self) -> Result<LiveQuery> {
        self.queries.assets()
    }

    pub fn invalidate_balance_related_queries(&self) -> InvalidationReport {
        invalidate_balance_related_queries(self.api.as_ref())
    }

    // --- Auth ---

    pub fn sign_in_with_provider(&self, provider: Provider) -> Result<Identity> {
        self.session.sign_in_with_provider(provider)
    }

    pub fn sign_in_with_email_and_password(&self, email: &str, password: &str) -> Result<Identity> {
        self.session.sign_in_with_email_and_password(email, password)
    }

    pub fn sign_up_with_email_and_password(&self, email: &str, password: &str) -> Result<Identity> {
        self.session.sign_up_with_email_and_password(email, password)
    }

    pub fn sign_out(&self) -> Result<()> {
        self.session.sign_out()
    }

    /// Stop both listeners and clear the registry.
    pub fn shutdown(&mut self) {
        self.relay.shutdown();
        self.session.shutdown();
        self.registry.clear();
    }
}

impl Drop for LinkContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! # livedoc
//!
//! Client-side glue between an application and a managed auth and
//! document-sync backend.
//!
//! ## Core Concepts
//!
//! - **Identity Session**: the signed-in identity, following the backend's
//!   auth-state stream
//! - **Token Relay**: every refreshed id token becomes the API client's
//!   bearer header
//! - **Live Queries**: a push subscription republished as
//!   `{data, loading, error}` with manual `refetch`
//! - **Refetch Registry**: one call re-subscribes every mounted live query
//!
//! The backend itself (auth, documents, outbound API, routing) is reached
//! only through the traits in [`backend`]. With the `testing` feature,
//! `memory` implements them in process.
//!
//! ## Example
//!
//! ```ignore
//! use livedoc::{LinkContext, Provider};
//!
//! let ctx = LinkContext::builder()
//!     .auth(auth)
//!     .store(store)
//!     .api(api)
//!     .start()?;
//!
//! ctx.sign_in_with_provider(Provider::Google)?;
//!
//! let transactions = ctx.transactions()?;
//! let state = transactions.wait_settled(Duration::from_secs(5));
//!
//! // After a mutation:
//! ctx.invalidate_balance_related_queries();
//! ctx.refetch_all();
//! ```

pub mod api;
pub mod app;
pub mod backend;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod live_query;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod queries;
pub mod registry;
pub mod session;
pub mod token_relay;
pub mod types;
mod worker;

// Re-exports
pub use api::{
    invalidate_all, invalidate_balance_related_queries, InvalidationReport, BALANCE_QUERY_KEY,
    TRANSACTIONS_QUERY_KEY,
};
pub use app::{LinkContext, LinkContextBuilder};
pub use backend::{
    ApiClient, AuthBackend, DocumentStore, Listener, ListenerId, Navigator, NoopNavigator,
};
pub use broadcast::Broadcaster;
pub use config::{BackendConfig, LinkConfig};
pub use error::{LinkError, Result};
pub use live_query::{LiveQuery, LiveQueryBuilder, QuerySource, QueryState};
pub use queries::{assets_query, balance_query, transactions_query, DomainQueries};
pub use registry::{RefetchCallback, RefetchGuard, RefetchRegistry, RegistrationId};
pub use session::{IdentityFeed, IdentitySession};
pub use token_relay::TokenRelay;
pub use types::*;

//! Domain query facades: transactions, balance and the asset catalogue.
//!
//! Each facade is a fixed query plus [`LiveQuery`] mounting. The per-user
//! facades need a signed-in identity: without one they fail with
//! [`LinkError::NotSignedIn`] rather than subscribing to a malformed path.

use crate::backend::DocumentStore;
use crate::error::{LinkError, Result};
use crate::live_query::{LiveQuery, QuerySource};
use crate::registry::RefetchRegistry;
use crate::session::IdentitySession;
use crate::types::{CollectionPath, Direction, Query, Uid};
use std::sync::Arc;

/// Most recent transactions shown per user.
pub const TRANSACTIONS_LIMIT: usize = 10;

/// `users/<uid>/transactions`, newest first, at most ten.
pub fn transactions_query(uid: &Uid) -> Result<Query> {
    let path = CollectionPath::from_segments(&["users", uid.as_str(), "transactions"])?;
    Ok(Query::new(path)
        .order_by("createdAt", Direction::Desc)
        .limit(TRANSACTIONS_LIMIT))
}

/// `users/<uid>/assets`, by symbol descending.
pub fn balance_query(uid: &Uid) -> Result<Query> {
    let path = CollectionPath::from_segments(&["users", uid.as_str(), "assets"])?;
    Ok(Query::new(path).order_by("symbol", Direction::Desc))
}

/// `assets`, by symbol descending.
pub fn assets_query() -> Result<Query> {
    Ok(Query::collection("assets")?.order_by("symbol", Direction::Desc))
}

/// Mounts the domain queries against one store, registry and session.
pub struct DomainQueries {
    store: Arc<dyn DocumentStore>,
    registry: RefetchRegistry,
    session: Arc<IdentitySession>,
    watch_buffer: usize,
}

impl DomainQueries {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: RefetchRegistry,
        session: Arc<IdentitySession>,
        watch_buffer: usize,
    ) -> Self {
        Self {
            store,
            registry,
            session,
            watch_buffer,
        }
    }

    pub fn transactions(&self) -> Result<LiveQuery> {
        self.scoped("transactions", transactions_query)
    }

    pub fn balance(&self) -> Result<LiveQuery> {
        self.scoped("balance", balance_query)
    }

    /// The asset catalogue is not per-user, but still re-subscribes on
    /// identity change.
    pub fn assets(&self) -> Result<LiveQuery> {
        self.mount("assets", QuerySource::Fixed(assets_query()?))
    }

    fn scoped(&self, label: &str, build: fn(&Uid) -> Result<Query>) -> Result<LiveQuery> {
        let uid = self.session.uid().ok_or(LinkError::NotSignedIn)?;
        // Surface a bad uid to the caller instead of as query state.
        build(&uid)?;
        tracing::debug!(query = label, uid = %uid, "mounting user query");
        self.mount(label, QuerySource::scoped(move |identity| build(&identity.uid)))
    }

    fn mount(&self, label: &str, source: QuerySource) -> Result<LiveQuery> {
        LiveQuery::builder(Arc::clone(&self.store), source)
            .registry(&self.registry)
            .follow(self.session.feed())
            .watch_buffer(self.watch_buffer)
            .label(label)
            .mount()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueryConstraint;

    #[test]
    fn test_transactions_query_shape() {
        let query = transactions_query(&Uid::new("abc123")).unwrap();
        assert_eq!(query.path.as_str(), "users/abc123/transactions");
        assert_eq!(
            query.constraints,
            vec![
                QueryConstraint::order_by("createdAt", Direction::Desc),
                QueryConstraint::limit(10),
            ]
        );
    }

    #[test]
    fn test_balance_and_assets_paths() {
        let balance = balance_query(&Uid::new("abc123")).unwrap();
        assert_eq!(balance.path.as_str(), "users/abc123/assets");
        assert_eq!(
            balance.constraints,
            vec![QueryConstraint::order_by("symbol", Direction::Desc)]
        );

        assert_eq!(assets_query().unwrap().path.as_str(), "assets");
    }

    #[test]
    fn test_empty_uid_rejected() {
        assert!(matches!(
            transactions_query(&Uid::new("")),
            Err(LinkError::InvalidPath(_))
        ));
        assert!(balance_query(&Uid::new("a/b")).is_err());
    }
}

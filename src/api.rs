//! Cache invalidation on the outbound API client.

use crate::backend::ApiClient;
use crate::error::{LinkError, Result};
use std::thread;

/// Query key for cached balances.
pub const BALANCE_QUERY_KEY: &str = "balance";

/// Query key for cached transactions.
pub const TRANSACTIONS_QUERY_KEY: &str = "transactions";

/// Settled outcome of each invalidation.
#[derive(Debug)]
pub struct InvalidationReport {
    pub outcomes: Vec<(String, Result<()>)>,
}

impl InvalidationReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|(_, r)| r.is_ok())
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

/// Invalidate `keys` concurrently and wait for all of them to settle.
/// Never fails; failures are reported per key.
pub fn invalidate_all(api: &dyn ApiClient, keys: &[&str]) -> InvalidationReport {
    let outcomes = thread::scope(|scope| {
        let handles: Vec<_> = keys
            .iter()
            .map(|key| (*key, scope.spawn(move || api.invalidate_queries(key))))
            .collect();

        handles
            .into_iter()
            .map(|(key, handle)| {
                let result = handle.join().unwrap_or_else(|_| {
                    Err(LinkError::Invalidation {
                        key: key.to_string(),
                        message: "invalidation panicked".to_string(),
                    })
                });
                if let Err(ref e) = result {
                    tracing::warn!(key, error = %e, "query invalidation failed");
                }
                (key.to_string(), result)
            })
            .collect()
    });

    InvalidationReport { outcomes }
}

/// Invalidate the `balance` and `transactions` caches together.
pub fn invalidate_balance_related_queries(api: &dyn ApiClient) -> InvalidationReport {
    invalidate_all(api, &[BALANCE_QUERY_KEY, TRANSACTIONS_QUERY_KEY])
}

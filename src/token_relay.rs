//! Forwards identity tokens to the outbound API client.

use crate::backend::{ApiClient, AuthBackend};
use crate::error::Result;
use crate::types::Identity;
use crate::worker::Worker;
use crossbeam_channel::select;
use std::sync::Arc;

/// Follows the id-token stream. Each refreshed token is installed as the API
/// client's bearer header. Sign-out clears the header.
///
/// Independent of [`IdentitySession`](crate::session::IdentitySession): its
/// own subscription, its own thread.
pub struct TokenRelay {
    worker: Option<Worker>,
}

impl TokenRelay {
    pub fn start(auth: Arc<dyn AuthBackend>, api: Arc<dyn ApiClient>) -> Result<Self> {
        let listener = auth.on_id_token_changed();
        let worker = Worker::spawn("livedoc-token-relay", move |stop| loop {
            select! {
                recv(listener.receiver()) -> msg => match msg {
                    Ok(identity) => relay(auth.as_ref(), api.as_ref(), identity.as_ref()),
                    Err(_) => {
                        tracing::warn!("id token stream closed");
                        break;
                    }
                },
                recv(stop) -> _ => break,
            }
        })?;

        Ok(Self {
            worker: Some(worker),
        })
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn shutdown(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

impl Drop for TokenRelay {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn relay(auth: &dyn AuthBackend, api: &dyn ApiClient, identity: Option<&Identity>) {
    let Some(identity) = identity else {
        tracing::debug!("signed out, clearing bearer token");
        api.set_bearer_token(None);
        return;
    };

    match auth.id_token(identity) {
        Ok(token) => {
            tracing::debug!(uid = %identity.uid, "relaying refreshed id token");
            api.set_bearer_token(Some(&token));
        }
        // The previous header stays until the next refresh.
        Err(e) => tracing::warn!(uid = %identity.uid, error = %e, "failed to fetch id token"),
    }
}

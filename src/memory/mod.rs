//! In-process implementations of the backend traits.
//!
//! These stand in for the managed backend's client libraries:
//! - [`MemoryAuthBackend`]: accounts, federated identities, auth-state and
//!   token streams
//! - [`MemoryDocumentStore`]: collections with query evaluation and push
//!   snapshots, plus fault injection
//! - [`RecordingApiClient`] / [`RecordingNavigator`]: record what the link
//!   layer asked for
//!
//! # Example
//!
//! ```ignore
//! let store = MemoryDocumentStore::new();
//! store.set_document("assets", "btc", json!({"symbol": "BTC"}))?;
//!
//! let listener = store.listen(&Query::collection("assets")?)?;
//! let snapshot = listener.recv()??;
//! assert_eq!(snapshot.len(), 1);
//! ```

mod api;
mod auth;
mod documents;
mod eval;

pub use api::{RecordingApiClient, RecordingNavigator};
pub use auth::{MemoryAuthBackend, MIN_PASSWORD_LEN};
pub use documents::{ListenerEvent, MemoryDocumentStore};
pub use eval::{compare_values, evaluate};

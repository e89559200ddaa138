pub mod client;
pub mod outcome;
pub mod stub;

pub use client::HttpRemote;
pub use outcome::*;
pub use stub::StubRemote;

use serde_json::Value;

/// Read and partial-update access to collections owned by other services.
///
/// Implementations never fail: every call resolves to a classified [`Outcome`].
#[async_trait::async_trait]
pub trait RemoteCollections: Send + Sync + 'static {
    /// `GET /{collection}/{id}`; a Found snapshot is always a JSON object with
    /// [`BLOCKED_FIELDS`] removed.
    async fn fetch(&self, collection: &str, id: &str) -> LookupOutcome;

    /// `GET /{collection}?params`; Found requires a JSON array.
    async fn query(&self, collection: &str, params: &[(String, String)]) -> ListOutcome;

    /// `PATCH /{collection}/{id}` with a partial body.
    async fn patch(&self, collection: &str, id: &str, body: Value) -> MutationOutcome;
}

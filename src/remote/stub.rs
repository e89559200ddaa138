use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

use crate::remote::{
    strip_blocked, ListOutcome, LookupOutcome, MutationOutcome, Outcome, RemoteCollections,
};

/// Canned remote collections for tests and local runs without peer services.
///
/// Unknown lookups resolve to `NotFound`, unknown queries to an empty list.
#[derive(Debug, Default)]
pub struct StubRemote {
    lookups: HashMap<(String, String), LookupOutcome>,
    listings: HashMap<String, ListOutcome>,
    mutations: HashMap<(String, String), MutationOutcome>,
    fetches: Mutex<HashMap<(String, String), usize>>,
    patches: Mutex<Vec<(String, String, Value)>>,
}

impl StubRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `snapshot` (a JSON object) for `collection/id`.
    pub fn with_snapshot(self, collection: &str, id: &str, snapshot: Value) -> Self {
        let outcome = match snapshot {
            Value::Object(mut map) => {
                strip_blocked(&mut map);
                Outcome::Found(map)
            }
            other => Outcome::Malformed(format!("expected a JSON object, got {}", other)),
        };
        self.with_lookup(collection, id, outcome)
    }

    pub fn with_lookup(mut self, collection: &str, id: &str, outcome: LookupOutcome) -> Self {
        self.lookups
            .insert((collection.to_string(), id.to_string()), outcome);
        self
    }

    pub fn with_listing(mut self, collection: &str, outcome: ListOutcome) -> Self {
        self.listings.insert(collection.to_string(), outcome);
        self
    }

    pub fn with_mutation(mut self, collection: &str, id: &str, outcome: MutationOutcome) -> Self {
        self.mutations
            .insert((collection.to_string(), id.to_string()), outcome);
        self
    }

    /// How many times `collection/id` was fetched.
    pub fn fetch_count(&self, collection: &str, id: &str) -> usize {
        self.fetches
            .lock()
            .get(&(collection.to_string(), id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Every patch body received, in order.
    pub fn patches(&self) -> Vec<(String, String, Value)> {
        self.patches.lock().clone()
    }
}

#[async_trait::async_trait]
impl RemoteCollections for StubRemote {
    async fn fetch(&self, collection: &str, id: &str) -> LookupOutcome {
        let key = (collection.to_string(), id.to_string());
        *self.fetches.lock().entry(key.clone()).or_insert(0) += 1;
        self.lookups.get(&key).cloned().unwrap_or(Outcome::NotFound)
    }

    async fn query(&self, collection: &str, _params: &[(String, String)]) -> ListOutcome {
        self.listings
            .get(collection)
            .cloned()
            .unwrap_or(Outcome::Found(Vec::new()))
    }

    async fn patch(&self, collection: &str, id: &str, body: Value) -> MutationOutcome {
        self.patches
            .lock()
            .push((collection.to_string(), id.to_string(), body));
        self.mutations
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
            .unwrap_or(Outcome::NotFound)
    }
}

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::RemoteConfig;
use crate::remote::{
    strip_blocked, ListOutcome, LookupOutcome, MutationOutcome, Outcome, RemoteCollections,
};

/// Lookup and mutation client over HTTP. Each collection resolves to the base URL of
/// the service that owns it.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    endpoints: HashMap<String, String>,
    timeout: Duration,
    trailing_slash: bool,
}

impl HttpRemote {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("clinic-mesh/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for remote collections")?;

        let endpoints = config
            .collections
            .iter()
            .map(|(name, base)| (name.clone(), base.trim_end_matches('/').to_string()))
            .collect();

        Ok(Self {
            client,
            endpoints,
            timeout,
            trailing_slash: config.trailing_slash,
        })
    }

    fn url(&self, collection: &str, id: Option<&str>) -> Option<String> {
        let base = self.endpoints.get(collection)?;
        let mut url = match id {
            Some(id) => format!("{}/{}/{}", base, collection, id),
            None => format!("{}/{}", base, collection),
        };
        if self.trailing_slash {
            url.push('/');
        }
        Some(url)
    }

    /// Send and classify, bounded by the call deadline.
    async fn exchange(&self, request: RequestBuilder) -> Outcome<Value> {
        match tokio::time::timeout(self.timeout, classify(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::NetworkError(format!("timed out after {}ms", self.timeout.as_millis())),
        }
    }

    fn unconfigured<T>(collection: &str) -> Outcome<T> {
        Outcome::NetworkError(format!("no endpoint configured for collection '{}'", collection))
    }
}

async fn classify(request: RequestBuilder) -> Outcome<Value> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => return Outcome::NetworkError(e.to_string()),
    };

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Outcome::NotFound;
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Outcome::RemoteError {
            status: status.as_u16(),
            body,
        };
    }

    match response.json::<Value>().await {
        Ok(value) => Outcome::Found(value),
        Err(e) => Outcome::Malformed(e.to_string()),
    }
}

fn log_outcome<T>(method: &str, collection: &str, target: &str, outcome: &Outcome<T>) {
    match outcome.reason(collection, target) {
        None => log::debug!("{} {}/{} ok", method, collection, target),
        Some(reason) => log::warn!("{} {}/{} failed: {}", method, collection, target, reason),
    }
}

#[async_trait::async_trait]
impl RemoteCollections for HttpRemote {
    async fn fetch(&self, collection: &str, id: &str) -> LookupOutcome {
        let Some(url) = self.url(collection, Some(id)) else {
            return Self::unconfigured(collection);
        };
        log::debug!("GET {}", url);

        let outcome = self.exchange(self.client.get(&url)).await.and_then(|value| match value {
            Value::Object(mut snapshot) => {
                strip_blocked(&mut snapshot);
                Outcome::Found(snapshot)
            }
            _ => Outcome::Malformed("expected a JSON object".to_string()),
        });
        log_outcome("GET", collection, id, &outcome);
        outcome
    }

    async fn query(&self, collection: &str, params: &[(String, String)]) -> ListOutcome {
        let Some(url) = self.url(collection, None) else {
            return Self::unconfigured(collection);
        };
        log::debug!("GET {} {:?}", url, params);

        let request = self.client.get(&url).query(params);
        let outcome = self.exchange(request).await.and_then(|value| match value {
            Value::Array(items) => Outcome::Found(items.into_iter().map(strip_value).collect()),
            _ => Outcome::Malformed("expected a JSON array".to_string()),
        });
        log_outcome("GET", collection, "query", &outcome);
        outcome
    }

    async fn patch(&self, collection: &str, id: &str, body: Value) -> MutationOutcome {
        let Some(url) = self.url(collection, Some(id)) else {
            return Self::unconfigured(collection);
        };
        log::debug!("PATCH {}", url);

        let outcome = self
            .exchange(self.client.patch(&url).json(&body))
            .await
            .map(strip_value);
        log_outcome("PATCH", collection, id, &outcome);
        outcome
    }
}

fn strip_value(value: Value) -> Value {
    match value {
        Value::Object(mut snapshot) => {
            strip_blocked(&mut snapshot);
            Value::Object(snapshot)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn remote_for(server: &MockServer, timeout_ms: u64) -> HttpRemote {
        let config = RemoteConfig {
            timeout_ms,
            collections: HashMap::from([
                ("users".to_string(), server.uri()),
                ("vitals".to_string(), server.uri()),
                ("prescriptions".to_string(), server.uri()),
            ]),
            ..RemoteConfig::default()
        };
        HttpRemote::new(&config).unwrap()
    }

    #[tokio::test]
    async fn fetch_strips_blocked_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/u-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u-1",
                "first_name": "Ada",
                "password": "pbkdf2$...",
                "is_superuser": false,
            })))
            .mount(&server)
            .await;

        let outcome = remote_for(&server, 2_000).fetch("users", "u-1").await;
        let Outcome::Found(snapshot) = outcome else {
            panic!("expected a snapshot");
        };
        assert_eq!(snapshot["first_name"], "Ada");
        assert!(!snapshot.contains_key("password"));
        assert!(!snapshot.contains_key("is_superuser"));
    }

    #[tokio::test]
    async fn fetch_classifies_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/garbled"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"first_name": "Late"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let remote = remote_for(&server, 100);
        assert_eq!(remote.fetch("users", "missing").await, Outcome::NotFound);
        assert_eq!(
            remote.fetch("users", "broken").await,
            Outcome::RemoteError {
                status: 500,
                body: "database down".to_string()
            }
        );
        assert!(matches!(remote.fetch("users", "garbled").await, Outcome::Malformed(_)));
        assert!(matches!(remote.fetch("users", "slow").await, Outcome::NetworkError(_)));
        assert!(matches!(remote.fetch("patients", "p-1").await, Outcome::NetworkError(_)));
    }

    #[tokio::test]
    async fn query_requires_array_and_forwards_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vitals"))
            .and(query_param("patient_user_id", "P1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "v-1", "heart_rate": 72}
            ])))
            .mount(&server)
            .await;

        let remote = remote_for(&server, 2_000);
        let params = vec![("patient_user_id".to_string(), "P1".to_string())];
        let Outcome::Found(items) = remote.query("vitals", &params).await else {
            panic!("expected vitals");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["heart_rate"], 72);
    }

    #[tokio::test]
    async fn patch_sends_body_and_returns_remote_record() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/prescriptions/rx-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "rx-1",
                "status": "filled",
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/prescriptions/rx-2"))
            .respond_with(ResponseTemplate::new(409).set_body_string("already filled"))
            .mount(&server)
            .await;

        let remote = remote_for(&server, 2_000);
        let outcome = remote
            .patch("prescriptions", "rx-1", json!({"status": "filled"}))
            .await;
        assert_eq!(outcome, Outcome::Found(json!({"id": "rx-1", "status": "filled"})));

        let outcome = remote
            .patch("prescriptions", "rx-2", json!({"status": "filled"}))
            .await;
        assert!(matches!(outcome, Outcome::RemoteError { status: 409, .. }));
    }
}

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::net::{OutboundRequest, Response, Transport};
use crate::store::{RequestKey, StoreBackend, StoredEntry};

use super::StoreView;

const OFFLINE_MESSAGE: &str = "You are offline and no cached data is available for this request";

/// Network-first strategy for idempotent API reads.
///
/// Answers served from the store are marked with `_cached: true` and
/// `_cachedAt`, so callers can always tell live data from stale data.
pub struct ApiReadStrategy<S: StoreBackend, T: Transport> {
  store: StoreView<S>,
  transport: Arc<T>,
}

impl<S: StoreBackend, T: Transport> ApiReadStrategy<S, T> {
  pub fn new(storage: Arc<S>, store: String, transport: Arc<T>) -> Self {
    Self {
      store: StoreView::new(storage, store),
      transport,
    }
  }

  pub async fn handle(&self, request: &OutboundRequest) -> Response {
    match self.transport.send(request).await {
      Ok(response) => {
        self.store.remember(request, &response);
        response
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network unavailable for API read");

        self
          .store
          .lookup(&RequestKey::for_request(request))
          .and_then(|entry| annotate_cached(entry, request))
          .unwrap_or_else(|| Response::offline_error(OFFLINE_MESSAGE))
      }
    }
  }
}

/// Rebuild a stored API response with the cache markers attached.
///
/// Bodies that are not JSON count as a miss. JSON that is not an object is
/// wrapped under `data`.
fn annotate_cached(entry: StoredEntry, request: &OutboundRequest) -> Option<Response> {
  let value: Value = match serde_json::from_slice(&entry.body) {
    Ok(value) => value,
    Err(e) => {
      warn!(url = %request.url, error = %e, "Cached API response is not JSON, ignoring");
      return None;
    }
  };

  let mut object = match value {
    Value::Object(object) => object,
    other => {
      let mut object = Map::new();
      object.insert("data".to_string(), other);
      object
    }
  };
  object.insert("_cached".to_string(), json!(true));
  object.insert("_cachedAt".to_string(), json!(iso_timestamp(entry.cached_at)));

  let mut response = Response::json(entry.status, &Value::Object(object));
  for (name, value) in entry.headers {
    if name != "content-length" {
      response.headers.entry(name).or_insert(value);
    }
  }

  Some(response)
}

fn iso_timestamp(at: DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::testing::ScriptedTransport;
  use crate::store::SqliteStorage;
  use url::Url;

  const STORE: &str = "nexusos-api-v1";
  const PEERS: &str = "http://localhost:5000/api/mesh/peers";

  fn setup() -> (ApiReadStrategy<SqliteStorage, ScriptedTransport>, Arc<ScriptedTransport>) {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let transport = Arc::new(ScriptedTransport::new());
    let strategy = ApiReadStrategy::new(storage, STORE.to_string(), Arc::clone(&transport));
    (strategy, transport)
  }

  fn get(url: &str) -> OutboundRequest {
    OutboundRequest::get(Url::parse(url).unwrap())
  }

  #[tokio::test]
  async fn test_live_response_is_unmodified() {
    let (strategy, transport) = setup();
    let live = Response::json(200, &json!({ "peers": 3 }));
    transport.route("GET", PEERS, live.clone());

    assert_eq!(strategy.handle(&get(PEERS)).await, live);
  }

  #[tokio::test]
  async fn test_offline_repeat_is_marked_cached() {
    let (strategy, transport) = setup();
    transport.route("GET", PEERS, Response::json(200, &json!({ "peers": 3 })));
    strategy.handle(&get(PEERS)).await;

    transport.set_offline(true);
    let response = strategy.handle(&get(PEERS)).await;

    assert_eq!(response.status, 200);
    let body = response.body_json().unwrap();
    assert_eq!(body["peers"], 3);
    assert_eq!(body["_cached"], true);
    let cached_at = body["_cachedAt"].as_str().unwrap();
    assert!(DateTime::parse_from_rfc3339(cached_at).is_ok());
  }

  #[tokio::test]
  async fn test_offline_array_body_is_wrapped() {
    let (strategy, transport) = setup();
    transport.route("GET", PEERS, Response::json(200, &json!(["a", "b"])));
    strategy.handle(&get(PEERS)).await;

    transport.set_offline(true);
    let body = strategy.handle(&get(PEERS)).await.body_json().unwrap();

    assert_eq!(body["data"], json!(["a", "b"]));
    assert_eq!(body["_cached"], true);
  }

  #[tokio::test]
  async fn test_offline_miss_is_offline_error() {
    let (strategy, transport) = setup();
    transport.set_offline(true);

    let response = strategy.handle(&get(PEERS)).await;

    assert_eq!(response.status, 503);
    let body = response.body_json().unwrap();
    assert_eq!(body["error"], "offline");
    assert!(body["message"].is_string());
  }

  #[tokio::test]
  async fn test_non_json_cache_entry_is_a_miss() {
    let (strategy, transport) = setup();
    transport.route("GET", PEERS, Response::new(200, "plain text"));
    strategy.handle(&get(PEERS)).await;

    transport.set_offline(true);
    let response = strategy.handle(&get(PEERS)).await;

    assert_eq!(response.status, 503);
  }

  #[tokio::test]
  async fn test_unreadable_cache_entry_is_a_miss() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let transport = Arc::new(ScriptedTransport::new());
    let strategy =
      ApiReadStrategy::new(Arc::clone(&storage), STORE.to_string(), Arc::clone(&transport));
    transport.route("GET", PEERS, Response::json(200, &json!({ "peers": 3 })));
    strategy.handle(&get(PEERS)).await;

    storage
      .execute_raw("UPDATE store_entries SET headers = 'not json'")
      .unwrap();
    transport.set_offline(true);
    let response = strategy.handle(&get(PEERS)).await;

    assert_eq!(response.status, 503);
    assert_eq!(response.body_json().unwrap()["error"], "offline");
  }
}

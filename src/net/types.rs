use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use url::Url;

const CONTENT_TYPE: &str = "content-type";
const JSON_CONTENT_TYPE: &str = "application/json";

/// A request intercepted on its way to the network.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
  /// Upper-cased HTTP method
  pub method: String,
  pub url: Url,
  /// Lower-cased header names
  pub headers: BTreeMap<String, String>,
  pub body: Option<Vec<u8>>,
  /// Top-level page navigation (eligible for the app shell fallback)
  pub navigation: bool,
}

impl OutboundRequest {
  pub fn new(method: &str, url: Url) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url,
      headers: BTreeMap::new(),
      body: None,
      navigation: false,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new("GET", url)
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self
      .headers
      .insert(name.to_ascii_lowercase(), value.to_string());
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = Some(body.into());
    self
  }

  pub fn as_navigation(mut self) -> Self {
    self.navigation = true;
    self
  }

  /// GET and HEAD never change server state and may be answered from a store.
  pub fn is_read(&self) -> bool {
    matches!(self.method.as_str(), "GET" | "HEAD")
  }
}

/// An HTTP response, live or synthetic.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
  pub status: u16,
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: body.into(),
    }
  }

  /// JSON response with the matching content type.
  pub fn json(status: u16, value: &Value) -> Self {
    let mut response = Self::new(status, value.to_string());
    response
      .headers
      .insert(CONTENT_TYPE.to_string(), JSON_CONTENT_TYPE.to_string());
    response
  }

  /// Offline read with nothing in the store.
  pub fn offline_error(message: &str) -> Self {
    Self::json(
      StatusCode::SERVICE_UNAVAILABLE.as_u16(),
      &json!({ "error": "offline", "message": message }),
    )
  }

  /// Static asset that is neither reachable nor stored.
  pub fn unavailable() -> Self {
    let mut response = Self::new(StatusCode::SERVICE_UNAVAILABLE.as_u16(), "Offline");
    response
      .headers
      .insert(CONTENT_TYPE.to_string(), "text/plain".to_string());
    response
  }

  /// Optimistic acknowledgement of a write that was queued instead of delivered.
  pub fn queued(message: &str) -> Self {
    Self::json(
      StatusCode::OK.as_u16(),
      &json!({ "success": true, "queued": true, "message": message }),
    )
  }

  /// 2xx status
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(&name.to_ascii_lowercase())
      .map(String::as_str)
  }

  pub fn body_json(&self) -> Result<Value> {
    serde_json::from_slice(&self.body).map_err(|e| eyre!("Response body is not JSON: {}", e))
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_request_normalizes_method_and_headers() {
    let request = OutboundRequest::new("post", Url::parse("http://localhost/api/x").unwrap())
      .with_header("Content-Type", "application/json");

    assert_eq!(request.method, "POST");
    assert_eq!(
      request.headers.get("content-type").map(String::as_str),
      Some("application/json")
    );
    assert!(!request.is_read());
    assert!(OutboundRequest::get(request.url.clone()).is_read());
  }

  #[test]
  fn test_offline_error_shape() {
    let response = Response::offline_error("No cached data available");
    assert_eq!(response.status, 503);
    assert_eq!(response.header("Content-Type"), Some("application/json"));

    let body = response.body_json().unwrap();
    assert_eq!(body["error"], "offline");
    assert_eq!(body["message"], "No cached data available");
  }

  #[test]
  fn test_queued_ack_shape() {
    let response = Response::queued("Saved offline");
    assert!(response.is_success());

    let body = response.body_json().unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["queued"], true);
  }

  #[test]
  fn test_unavailable_is_503() {
    let response = Response::unavailable();
    assert_eq!(response.status, 503);
    assert!(!response.is_success());
  }
}

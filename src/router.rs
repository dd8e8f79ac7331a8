//! Classification of intercepted requests.

use crate::config::Config;
use crate::net::OutboundRequest;

/// Which strategy answers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Application shell and other non-API resources
  Static,
  /// Idempotent API read (GET/HEAD)
  ApiRead,
  /// Mutating API request
  ApiWrite,
}

#[derive(Debug, Clone)]
pub struct Router {
  api_prefixes: Vec<String>,
}

impl Router {
  pub fn new(api_prefixes: Vec<String>) -> Self {
    Self { api_prefixes }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(config.api_prefixes.clone())
  }

  pub fn is_api_path(&self, path: &str) -> bool {
    self.api_prefixes.iter().any(|prefix| path.starts_with(prefix))
  }

  pub fn classify(&self, request: &OutboundRequest) -> RequestClass {
    if !self.is_api_path(request.url.path()) {
      RequestClass::Static
    } else if request.is_read() {
      RequestClass::ApiRead
    } else {
      RequestClass::ApiWrite
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn request(method: &str, url: &str) -> OutboundRequest {
    OutboundRequest::new(method, Url::parse(url).unwrap())
  }

  #[test]
  fn test_classify() {
    let router = Router::from_config(&Config::default());

    assert_eq!(
      router.classify(&request("GET", "http://localhost:5000/index.html")),
      RequestClass::Static
    );
    assert_eq!(
      router.classify(&request("GET", "http://localhost:5000/api/mesh/peers")),
      RequestClass::ApiRead
    );
    assert_eq!(
      router.classify(&request("HEAD", "http://localhost:5000/api/status")),
      RequestClass::ApiRead
    );
    assert_eq!(
      router.classify(&request("POST", "http://localhost:5000/api/mesh/message")),
      RequestClass::ApiWrite
    );
    // Writes outside the API namespace still go to the static strategy
    assert_eq!(
      router.classify(&request("POST", "http://localhost:5000/upload")),
      RequestClass::Static
    );
  }

  #[test]
  fn test_prefix_matches_path_not_query() {
    let router = Router::new(vec!["/api/".to_string()]);

    assert!(!router.is_api_path("/apiary"));
    assert_eq!(
      router.classify(&request("GET", "http://localhost:5000/page?next=/api/x")),
      RequestClass::Static
    );
  }
}

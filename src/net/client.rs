use color_eyre::{eyre::eyre, Result};
use reqwest::{Client, Method};
use std::future::Future;

use crate::config::Config;

use super::types::{OutboundRequest, Response};

/// Something that can deliver a request to the network.
///
/// An `Err` means the network could not be reached at all. A response with an
/// error status is still `Ok`.
pub trait Transport: Send + Sync + 'static {
  fn send(&self, request: &OutboundRequest) -> impl Future<Output = Result<Response>> + Send;
}

/// reqwest-backed transport.
/// Clone is cheap, the underlying client shares its connection pool.
#[derive(Clone)]
pub struct HttpTransport {
  client: Client,
}

impl HttpTransport {
  pub fn new(config: &Config) -> Result<Self> {
    let mut builder = Client::builder();
    if let Some(timeout) = config.request_timeout() {
      builder = builder.timeout(timeout);
    }

    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Transport for HttpTransport {
  async fn send(&self, request: &OutboundRequest) -> Result<Response> {
    let method = Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid HTTP method '{}': {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(ref body) = request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await.map_err(|e| {
      eyre!(
        "Failed to send {} request to {}: {}",
        request.method,
        request.url,
        e
      )
    })?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", request.url, e))?
      .to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

//! Network fetch seam and the reqwest-backed client.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::http::{Method, Request, Response};

/// Trait for the network side of the proxy.
#[async_trait]
pub trait NetworkFetch: Send + Sync {
  /// Issue the request to the network and return the full response.
  ///
  /// Returns an error only when no response was obtained at all (offline,
  /// DNS failure, timeout); non-success statuses come back as `Ok`.
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

#[async_trait]
impl<T: NetworkFetch + ?Sized> NetworkFetch for Arc<T> {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    (**self).fetch(request).await
  }
}

/// Network client backed by reqwest.
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
}

impl HttpClient {
  /// Create a client enforcing the configured whole-request timeout.
  pub fn new(config: &NetworkConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create network client: {}", e))?;

    Ok(Self { client })
  }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Head => reqwest::Method::HEAD,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
  }
}

#[async_trait]
impl NetworkFetch for HttpClient {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(to_reqwest_method(request.method), &request.url);

    if let Some(accept) = &request.accept {
      builder = builder.header(reqwest::header::ACCEPT, accept);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Request {} failed: {}", request.description(), e))?;

    let status = response.status().as_u16();
    let headers: HashMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body for {}: {}", request.description(), e))?
      .to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

//! Request and response model for the interception layer.

use color_eyre::{eyre::eyre, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use url::Url;

/// Request methods the proxy distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  /// Read methods are intercepted; everything else bypasses the cache.
  pub fn is_read(&self) -> bool {
    matches!(self, Method::Get | Method::Head)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }
}

impl std::fmt::Display for Method {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A request as issued by the application.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: String,
  /// Content-negotiation dimension; part of the cache key when present.
  pub accept: Option<String>,
}

impl Request {
  pub fn new(method: Method, url: impl Into<String>) -> Self {
    Self {
      method,
      url: url.into(),
      accept: None,
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new(Method::Get, url)
  }

  pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
    self.accept = Some(accept.into());
    self
  }

  /// Resolve a manifest locator against the application origin.
  ///
  /// Absolute URLs pass through; relative paths join the origin.
  pub fn from_locator(origin: &Url, locator: &str) -> Result<Self> {
    let url = match Url::parse(locator) {
      Ok(absolute) => absolute,
      Err(url::ParseError::RelativeUrlWithoutBase) => origin
        .join(locator)
        .map_err(|e| eyre!("Invalid manifest locator {}: {}", locator, e))?,
      Err(e) => return Err(eyre!("Invalid manifest locator {}: {}", locator, e)),
    };

    Ok(Self::get(url.to_string()))
  }

  /// Full identity of the request as a stable fixed-length key:
  /// method, normalized URL and Accept, hashed together.
  pub fn cache_key(&self) -> String {
    let input = format!(
      "{}:{}:{}",
      self.method,
      normalize_url(&self.url),
      self.accept.as_deref().unwrap_or("")
    );

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Short human-readable form for log lines.
  pub fn description(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

/// Normalize a URL for consistent keying.
///
/// Parsing drops default ports and fixes percent-encoding case; strings
/// that don't parse as URLs key on their trimmed form.
fn normalize_url(raw: &str) -> String {
  match Url::parse(raw.trim()) {
    Ok(url) => url.to_string(),
    Err(_) => raw.trim().to_string(),
  }
}

/// A response as observed by the caller.
#[derive(Debug, Clone)]
pub struct Response {
  pub status: u16,
  pub headers: HashMap<String, String>,
  pub body: Vec<u8>,
}

impl Response {
  /// Only success statuses are cached; redirects and error statuses pass
  /// through uncached.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cache_key_is_stable() {
    let a = Request::get("https://example.com/app.js");
    let b = Request::get("https://example.com/app.js");
    assert_eq!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_cache_key_distinguishes_method() {
    let get = Request::get("https://example.com/app.js");
    let head = Request::new(Method::Head, "https://example.com/app.js");
    assert_ne!(get.cache_key(), head.cache_key());
  }

  #[test]
  fn test_cache_key_distinguishes_accept() {
    let plain = Request::get("https://example.com/data");
    let json = Request::get("https://example.com/data").with_accept("application/json");
    assert_ne!(plain.cache_key(), json.cache_key());
  }

  #[test]
  fn test_cache_key_normalizes_default_port() {
    let explicit = Request::get("https://example.com:443/app.js");
    let implicit = Request::get("https://example.com/app.js");
    assert_eq!(explicit.cache_key(), implicit.cache_key());
  }

  #[test]
  fn test_locator_resolution() {
    let origin = Url::parse("https://app.example.com/").unwrap();

    let relative = Request::from_locator(&origin, "./index.html").unwrap();
    assert_eq!(relative.url, "https://app.example.com/index.html");

    let absolute = Request::from_locator(&origin, "https://cdn.example.com/inter.css").unwrap();
    assert_eq!(absolute.url, "https://cdn.example.com/inter.css");
  }

  #[test]
  fn test_read_methods() {
    assert!(Method::Get.is_read());
    assert!(Method::Head.is_read());
    assert!(!Method::Post.is_read());
    assert!(!Method::Put.is_read());
    assert!(!Method::Delete.is_read());
  }
}

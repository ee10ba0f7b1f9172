//! Entry value types for the caching system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::http::Response;

/// A response copy held by a cache store.
///
/// The stored copy and the copy returned to the caller are independent
/// values; a live network response is consumed exactly once, so callers
/// duplicate it explicitly before handing one side to storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResponse {
  pub status: u16,
  pub headers: HashMap<String, String>,
  pub body: Vec<u8>,
}

impl StoredResponse {
  /// Duplicate a live response into a storable value.
  pub fn duplicate(response: &Response) -> Self {
    Self {
      status: response.status,
      headers: response.headers.clone(),
      body: response.body.clone(),
    }
  }

  /// Rehydrate into the response form callers observe.
  pub fn into_response(self) -> Response {
    Response {
      status: self.status,
      headers: self.headers,
      body: self.body,
    }
  }
}

/// A stored response together with its storage metadata.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: StoredResponse,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_duplicate_is_independent() {
    let live = Response {
      status: 200,
      headers: HashMap::from([("content-type".to_string(), "text/html".to_string())]),
      body: b"<html></html>".to_vec(),
    };

    let stored = StoredResponse::duplicate(&live);
    drop(live);

    let rehydrated = stored.into_response();
    assert_eq!(rehydrated.status, 200);
    assert_eq!(rehydrated.body, b"<html></html>");
    assert_eq!(
      rehydrated.headers.get("content-type").map(String::as_str),
      Some("text/html")
    );
  }
}

//! Generational offline cache proxy for web application assets.
//!
//! Sits between an application and the network: read requests are answered
//! from a named cache generation when present and forwarded to the network
//! otherwise, with successful responses stored opportunistically. On
//! install a manifest of core assets is populated eagerly into the current
//! generation, all-or-nothing; on activation every other generation is
//! swept away before the proxy begins intercepting.

pub mod cache;
pub mod config;
pub mod event;
pub mod http;
pub mod network;
pub mod proxy;

pub use cache::{
  CacheStorage, CachedResponse, MemoryStorage, NoopStorage, SqliteStorage, StoreManager,
  StoredResponse,
};
pub use config::Config;
pub use event::ProxyEvent;
pub use http::{Method, Request, Response};
pub use network::{HttpClient, NetworkFetch};
pub use proxy::{OfflineProxy, ProxyHandle, ProxyState};

//! Generation-scoped store manager.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{info, warn};

use super::storage::CacheStorage;
use super::traits::{CachedResponse, StoredResponse};
use crate::http::Request;

/// Routes all cache-store access through one object bound to the current
/// generation name.
///
/// The manager owns the stores it creates: it writes only into the current
/// generation and deletes only stores whose name fails the
/// current-generation check during the sweep.
pub struct StoreManager<S: CacheStorage> {
  storage: Arc<S>,
  generation: String,
}

impl<S: CacheStorage> StoreManager<S> {
  /// Create a manager for the given generation name.
  pub fn new(storage: S, generation: impl Into<String>) -> Self {
    Self {
      storage: Arc::new(storage),
      generation: generation.into(),
    }
  }

  /// Name of the current generation.
  pub fn generation(&self) -> &str {
    &self.generation
  }

  /// Look up a request's exact key in the current generation.
  pub fn lookup(&self, request: &Request) -> Result<Option<CachedResponse>> {
    self.storage.get(&self.generation, &request.cache_key())
  }

  /// Write a stored response under the request's key, overwriting any
  /// prior entry for that key.
  pub fn store(&self, request: &Request, response: &StoredResponse) -> Result<()> {
    self
      .storage
      .put(&self.generation, &request.cache_key(), response)
  }

  /// Write a batch of manifest responses into the current generation.
  pub fn populate(&self, entries: &[(Request, StoredResponse)]) -> Result<()> {
    for (request, response) in entries {
      self.store(request, response)?;
    }

    info!(
      generation = %self.generation,
      entries = entries.len(),
      "populated cache generation"
    );
    Ok(())
  }

  /// Delete every store whose name is not the current generation.
  ///
  /// Individual deletion failures are logged and skipped; an unremoved
  /// stale store is retried at the next activation. Returns the number of
  /// stores deleted.
  pub fn sweep_stale(&self) -> Result<usize> {
    let names = self.storage.store_names()?;
    let mut deleted = 0;

    for name in names {
      if name == self.generation {
        continue;
      }

      match self.storage.delete_store(&name) {
        Ok(()) => {
          info!(store = %name, "deleted stale cache generation");
          deleted += 1;
        }
        Err(e) => {
          warn!(store = %name, error = %e, "failed to delete stale cache generation");
        }
      }
    }

    Ok(deleted)
  }

  /// Number of entries in the current generation.
  pub fn entry_count(&self) -> Result<u64> {
    self.storage.entry_count(&self.generation)
  }
}

impl<S: CacheStorage> Clone for StoreManager<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      generation: self.generation.clone(),
    }
  }
}

//! Offline cache proxy: lifecycle state machine and request interception.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cache::{CacheStorage, StoreManager, StoredResponse};
use crate::config::Config;
use crate::event::ProxyEvent;
use crate::http::{Request, Response};
use crate::network::NetworkFetch;

/// Lifecycle states for one proxy generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
  Uninstalled,
  Installing,
  Installed,
  Activating,
  Active,
}

/// The offline cache proxy for one application generation.
///
/// Lifecycle transitions and request dispatch run through a single driving
/// loop, so install-before-activate-before-serve is enforced by event
/// ordering rather than convention. Requests dispatched before activation
/// pass through to the network uncached.
pub struct OfflineProxy<S: CacheStorage, N: NetworkFetch> {
  manager: StoreManager<S>,
  network: Arc<N>,
  manifest: Vec<Request>,
  state: ProxyState,
}

impl<S, N> OfflineProxy<S, N>
where
  S: CacheStorage + 'static,
  N: NetworkFetch + 'static,
{
  /// Create a proxy from configuration, storage and network backends.
  pub fn new(config: &Config, storage: S, network: N) -> Result<Self> {
    let origin = config.origin_url()?;
    let manifest = config
      .cache
      .manifest
      .iter()
      .map(|locator| Request::from_locator(&origin, locator))
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      manager: StoreManager::new(storage, config.cache.generation.clone()),
      network: Arc::new(network),
      manifest,
      state: ProxyState::Uninstalled,
    })
  }

  pub fn state(&self) -> ProxyState {
    self.state
  }

  /// The generation-scoped store manager.
  pub fn manager(&self) -> &StoreManager<S> {
    &self.manager
  }

  /// Fetch every manifest entry and write it into the current generation.
  ///
  /// All-or-nothing: every entry is fetched and checked before the first
  /// write, so a failed install leaves no partial generation behind and
  /// the state returns to what it was before the attempt.
  pub async fn install(&mut self) -> Result<()> {
    let prior = self.state;
    self.state = ProxyState::Installing;

    match self.populate_manifest().await {
      Ok(()) => {
        self.state = ProxyState::Installed;
        info!(generation = %self.manager.generation(), "install complete");
        Ok(())
      }
      Err(e) => {
        self.state = prior;
        error!(generation = %self.manager.generation(), error = %e, "install failed");
        Err(e)
      }
    }
  }

  async fn populate_manifest(&self) -> Result<()> {
    let fetches = self.manifest.iter().map(|request| {
      let network = Arc::clone(&self.network);
      async move {
        let response = network.fetch(request).await?;

        if !response.is_success() {
          return Err(eyre!(
            "Manifest fetch {} returned status {}",
            request.description(),
            response.status
          ));
        }

        Ok((request.clone(), StoredResponse::duplicate(&response)))
      }
    });

    let entries = try_join_all(fetches).await?;
    self.manager.populate(&entries)
  }

  /// Sweep stale generations and begin intercepting.
  ///
  /// Requires a completed install. Sweep failures never block activation;
  /// an unremoved stale store is retried at the next activation.
  pub fn activate(&mut self) -> Result<()> {
    if self.state != ProxyState::Installed {
      return Err(eyre!(
        "Cannot activate from state {:?}; install must complete first",
        self.state
      ));
    }

    self.state = ProxyState::Activating;

    match self.manager.sweep_stale() {
      Ok(deleted) => {
        info!(generation = %self.manager.generation(), deleted, "activated");
      }
      Err(e) => {
        warn!(generation = %self.manager.generation(), error = %e, "stale sweep failed");
      }
    }

    self.state = ProxyState::Active;
    Ok(())
  }

  /// Handle one read-or-write request against an active generation:
  /// cache-first, then network, with an opportunistic write on success.
  async fn intercept(
    manager: StoreManager<S>,
    network: Arc<N>,
    request: Request,
  ) -> Result<Response> {
    // Mutating requests always bypass the cache
    if !request.method.is_read() {
      return network.fetch(&request).await;
    }

    match manager.lookup(&request) {
      Ok(Some(cached)) => {
        return Ok(cached.response.into_response());
      }
      Ok(None) => {}
      Err(e) => {
        // Degrade to a miss; caching is never a precondition for answering
        warn!(request = %request.description(), error = %e, "cache lookup failed");
      }
    }

    let response = match network.fetch(&request).await {
      Ok(response) => response,
      Err(e) => {
        error!(request = %request.description(), error = %e, "network fetch failed");
        return Err(e);
      }
    };

    if response.is_success() {
      // The caller consumes one copy, storage the other; the write is
      // awaited, and a failed write still answers the request
      let duplicate = StoredResponse::duplicate(&response);
      if let Err(e) = manager.store(&request, &duplicate) {
        warn!(request = %request.description(), error = %e, "opportunistic cache write failed");
      }
    }

    Ok(response)
  }

  /// Run the driving loop until the queue closes or a Shutdown event.
  ///
  /// Lifecycle events run inline on the loop; each request is spawned as
  /// an independent task against a snapshot of the current state, so a
  /// slow network fetch never blocks other requests or the lifecycle.
  pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ProxyEvent>) {
    while let Some(event) = events.recv().await {
      match event {
        ProxyEvent::Install => {
          // Failure leaves the prior state serving; already logged
          let _ = self.install().await;
        }
        ProxyEvent::Activate => {
          if let Err(e) = self.activate() {
            error!(error = %e, "activation skipped");
          }
        }
        ProxyEvent::Fetch {
          request,
          respond_to,
        } => {
          let manager = self.manager.clone();
          let network = Arc::clone(&self.network);
          let state = self.state;

          tokio::spawn(async move {
            let result = if state == ProxyState::Active {
              Self::intercept(manager, network, request).await
            } else {
              // Not yet active: pass through uncached
              network.fetch(&request).await
            };

            let _ = respond_to.send(result);
          });
        }
        ProxyEvent::Shutdown => break,
      }
    }
  }

  /// Spawn the proxy onto its own task, queueing install and activation
  /// ahead of any request so the new generation takes over immediately.
  pub fn spawn(self) -> (ProxyHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let _ = tx.send(ProxyEvent::Install);
    let _ = tx.send(ProxyEvent::Activate);

    let join = tokio::spawn(self.run(rx));

    (ProxyHandle { tx }, join)
  }
}

/// Caller-facing handle submitting requests and lifecycle events to the
/// proxy's driving loop.
#[derive(Clone)]
pub struct ProxyHandle {
  tx: mpsc::UnboundedSender<ProxyEvent>,
}

impl ProxyHandle {
  /// Issue a request through the proxy and await its response.
  pub async fn fetch(&self, request: Request) -> Result<Response> {
    let (respond_to, response) = oneshot::channel();

    self
      .tx
      .send(ProxyEvent::Fetch {
        request,
        respond_to,
      })
      .map_err(|_| eyre!("Proxy is no longer running"))?;

    response
      .await
      .map_err(|_| eyre!("Proxy dropped the request"))?
  }

  /// Queue another install of the current generation.
  pub fn install(&self) -> Result<()> {
    self
      .tx
      .send(ProxyEvent::Install)
      .map_err(|_| eyre!("Proxy is no longer running"))
  }

  /// Queue an activation.
  pub fn activate(&self) -> Result<()> {
    self
      .tx
      .send(ProxyEvent::Activate)
      .map_err(|_| eyre!("Proxy is no longer running"))
  }

  /// Stop the driving loop.
  pub fn shutdown(&self) -> Result<()> {
    self
      .tx
      .send(ProxyEvent::Shutdown)
      .map_err(|_| eyre!("Proxy is no longer running"))
  }
}

use color_eyre::Result;
use tokio::sync::oneshot;

use crate::http::{Request, Response};

/// Events consumed by the proxy's driving loop.
#[derive(Debug)]
pub enum ProxyEvent {
  /// Populate the current generation from the manifest
  Install,
  /// Sweep stale generations and begin intercepting
  Activate,
  /// A request issued by the application
  Fetch {
    request: Request,
    respond_to: oneshot::Sender<Result<Response>>,
  },
  /// Stop the driving loop
  Shutdown,
}

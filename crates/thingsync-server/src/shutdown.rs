//! Server-wide stop signal.
//!
//! The HTTP server watches the root token; every WebSocket connection holds a
//! child of it, so one `shutdown` ends all of them.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Token for one connection; cancelled with the root but not vice versa.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown and give the server task `grace` to finish. A task
    /// still running after that is aborted. Returns whether it finished on
    /// its own.
    pub async fn stop_server(&self, mut server: JoinHandle<()>, grace: Duration) -> bool {
        self.shutdown();
        info!(grace_ms = grace.as_millis(), "stopping server");

        if tokio::time::timeout(grace, &mut server).await.is_ok() {
            true
        } else {
            warn!(grace_ms = grace.as_millis(), "server did not stop in time, aborting");
            server.abort();
            false
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

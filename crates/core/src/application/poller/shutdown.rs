// Poller Shutdown Token

use tokio_util::sync::CancellationToken;

/// Shutdown signal observed by pollers between jobs
#[derive(Clone)]
pub struct ShutdownToken {
    token: CancellationToken,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for shutdown signal
    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    token: CancellationToken,
}

impl ShutdownSender {
    /// Signal shutdown to every poller holding a token (fire-and-forget)
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let token = CancellationToken::new();
    (
        ShutdownSender {
            token: token.clone(),
        },
        ShutdownToken { token },
    )
}

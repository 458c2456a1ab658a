//! Shared HTTP resources for backend calls.
//!
//! [`ResourceManager`] owns the one `reqwest::Client` (and therefore the
//! connection pool) used by every seat call. The client is built on first
//! use. `shutdown` is idempotent: it closes the manager, cancels in-flight
//! calls, and drops the pool. Calls made after shutdown fail with
//! [`DispatchError::ManagerClosed`].

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chorus_types::error::DispatchError;
use tokio_util::sync::CancellationToken;

/// Connection pool tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Idle keep-alive connections kept per backend host.
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_idle_per_host: 8,
            idle_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

pub struct ResourceManager {
    settings: PoolSettings,
    client: Mutex<Option<reqwest::Client>>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new(PoolSettings::default())
    }
}

impl ResourceManager {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            client: Mutex::new(None),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// The shared client, created on first call.
    pub fn client(&self) -> Result<reqwest::Client, DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::ManagerClosed);
        }

        let mut slot = self.client.lock().unwrap_or_else(|p| p.into_inner());
        // Re-check under the lock so a concurrent shutdown cannot leave a
        // fresh client behind.
        if self.is_closed() {
            return Err(DispatchError::ManagerClosed);
        }
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(self.settings.max_idle_per_host)
            .pool_idle_timeout(self.settings.idle_timeout)
            .connect_timeout(self.settings.connect_timeout)
            .build()
            .map_err(|e| DispatchError::Network {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        tracing::debug!(
            max_idle_per_host = self.settings.max_idle_per_host,
            "http client created"
        );
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Token cancelled when the manager shuts down.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether a client has been created and not yet released.
    pub fn has_client(&self) -> bool {
        self.client
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Close the manager. Returns `true` for the call that actually closed
    /// it, `false` if it was already closed.
    pub fn shutdown(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        let released = self
            .client
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .is_some();
        tracing::info!(released_client = released, "resource manager shut down");
        true
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_is_lazy_and_shared() {
        let manager = ResourceManager::default();
        assert!(!manager.has_client());

        manager.client().unwrap();
        assert!(manager.has_client());
        manager.client().unwrap();
        assert!(manager.has_client());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let manager = ResourceManager::default();
        manager.client().unwrap();

        assert!(manager.shutdown());
        assert!(!manager.shutdown());
        assert!(manager.is_closed());
        assert!(!manager.has_client());
    }

    #[test]
    fn test_client_after_shutdown_is_manager_closed() {
        let manager = ResourceManager::default();
        manager.shutdown();
        assert_eq!(manager.client().unwrap_err(), DispatchError::ManagerClosed);
    }

    #[test]
    fn test_shutdown_cancels_tokens() {
        let manager = ResourceManager::default();
        let token = manager.cancellation();
        assert!(!token.is_cancelled());
        manager.shutdown();
        assert!(token.is_cancelled());
    }
}

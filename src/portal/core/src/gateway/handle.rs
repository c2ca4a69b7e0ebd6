//! Memoized gateway handle.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::{GatewayConnector, IdentityGateway};
use crate::error::GatewayError;

/// Lazily connects to the gateway and keeps the handle.
///
/// Concurrent [`acquire`](Self::acquire) calls share one connection attempt.
/// A failed attempt is not cached and not retried here: the next call makes
/// a fresh attempt.
pub struct GatewayHandle {
    connector: Arc<dyn GatewayConnector>,
    cell: OnceCell<Arc<dyn IdentityGateway>>,
    attempts: AtomicU32,
}

impl GatewayHandle {
    pub fn new(connector: Arc<dyn GatewayConnector>) -> Self {
        Self {
            connector,
            cell: OnceCell::new(),
            attempts: AtomicU32::new(0),
        }
    }

    /// Connected handle, connecting first if needed.
    pub async fn acquire(&self) -> Result<Arc<dyn IdentityGateway>, GatewayError> {
        let gateway = self
            .cell
            .get_or_try_init(|| async {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                match self.connector.connect().await {
                    Ok(gateway) => {
                        info!(attempt, "Identity gateway connected");
                        Ok(gateway)
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "Identity gateway connection failed");
                        Err(e)
                    }
                }
            })
            .await?;
        Ok(gateway.clone())
    }

    /// Handle if already connected.
    pub fn get(&self) -> Option<Arc<dyn IdentityGateway>> {
        self.cell.get().cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.cell.initialized()
    }

    /// Number of connection attempts made so far.
    pub fn connect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for GatewayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayHandle")
            .field("connected", &self.is_connected())
            .field("attempts", &self.connect_attempts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InMemoryConnector, InMemoryGateway};

    #[tokio::test]
    async fn test_acquire_is_memoized() {
        let gateway = Arc::new(InMemoryGateway::new());
        let connector = Arc::new(InMemoryConnector::new(gateway));
        let handle = GatewayHandle::new(connector.clone());

        assert!(handle.get().is_none());
        handle.acquire().await.unwrap();
        handle.acquire().await.unwrap();
        assert!(handle.is_connected());
        assert_eq!(handle.connect_attempts(), 1);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let gateway = Arc::new(InMemoryGateway::new());
        let connector = Arc::new(InMemoryConnector::new(gateway).failing_first(1));
        let handle = GatewayHandle::new(connector);

        let err = handle.acquire().await.err().unwrap();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert!(!handle.is_connected());

        handle.acquire().await.unwrap();
        assert_eq!(handle.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_shares_one_attempt() {
        let gateway = Arc::new(InMemoryGateway::new());
        let connector = Arc::new(
            InMemoryConnector::new(gateway).with_delay(std::time::Duration::from_millis(20)),
        );
        let handle = Arc::new(GatewayHandle::new(connector.clone()));

        let (a, b) = tokio::join!(handle.acquire(), handle.acquire());
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(connector.attempts(), 1);
    }
}

use async_trait::async_trait;

use crate::valley::error::ValleyError;

/// Gateway managing a valley's network surface. Opaque to this crate: the
/// valley only drives its lifecycle.
#[async_trait]
pub trait DockPort: Send + Sync {
    async fn start_gateway(&self) -> Result<(), ValleyError>;

    async fn stop_gateway(&self) -> Result<(), ValleyError>;
}

/// Default dock used when auto-creation is enabled but no gateway
/// implementation was injected.
#[derive(Default)]
pub struct NoopDock;

#[async_trait]
impl DockPort for NoopDock {
    async fn start_gateway(&self) -> Result<(), ValleyError> {
        tracing::debug!(target: "valley", "noop_dock_gateway_started");
        Ok(())
    }

    async fn stop_gateway(&self) -> Result<(), ValleyError> {
        tracing::debug!(target: "valley", "noop_dock_gateway_stopped");
        Ok(())
    }
}

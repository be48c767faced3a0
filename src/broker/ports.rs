use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::broker::error::BrokerError;

/// Receives messages for one subscribed channel.
///
/// The broker invokes handlers asynchronously and one at a time per
/// subscription; a handler must contain its own failures, nothing may
/// escape back into the broker.
#[async_trait]
pub trait ChannelHandlerPort: Send + Sync {
    async fn on_message(&self, channel: &str, message: Value);
}

#[async_trait]
pub trait BrokerPort: Send + Sync {
    async fn connect(&self) -> Result<(), BrokerError>;

    async fn disconnect(&self) -> Result<(), BrokerError>;

    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn ChannelHandlerPort>,
    ) -> Result<(), BrokerError>;

    /// Removes one registration, identified by the handler that made it.
    /// Other subscribers on the same channel are unaffected.
    async fn unsubscribe(
        &self,
        channel: &str,
        handler: &Arc<dyn ChannelHandlerPort>,
    ) -> Result<(), BrokerError>;

    async fn publish(&self, channel: &str, message: Value) -> Result<(), BrokerError>;
}

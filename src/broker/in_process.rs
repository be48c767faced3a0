use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde_json::Value;

use crate::broker::{
    error::{BrokerError, not_connected},
    ports::{BrokerPort, ChannelHandlerPort},
};

#[derive(Default)]
struct BrokerState {
    connected: bool,
    by_channel: BTreeMap<String, Vec<Arc<dyn ChannelHandlerPort>>>,
}

/// In-process broker: delivery is an awaited handler call on the publisher's
/// task, so handlers for one channel never run concurrently with the publish
/// that triggered them.
#[derive(Default)]
pub struct InProcessBroker {
    state: RwLock<BrokerState>,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscription_count(&self) -> usize {
        self.state
            .read()
            .expect("lock poisoned")
            .by_channel
            .values()
            .map(Vec::len)
            .sum()
    }

    fn require_connected(&self, operation: &str) -> Result<(), BrokerError> {
        if self.state.read().expect("lock poisoned").connected {
            Ok(())
        } else {
            Err(not_connected(format!(
                "broker is not connected, cannot {operation}"
            )))
        }
    }
}

#[async_trait]
impl BrokerPort for InProcessBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        let mut guard = self.state.write().expect("lock poisoned");
        if guard.connected {
            tracing::debug!(target: "broker", "broker_already_connected");
        }
        guard.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        let mut guard = self.state.write().expect("lock poisoned");
        guard.connected = false;
        guard.by_channel.clear();
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn ChannelHandlerPort>,
    ) -> Result<(), BrokerError> {
        self.require_connected("subscribe")?;
        let mut guard = self.state.write().expect("lock poisoned");
        guard
            .by_channel
            .entry(channel.to_string())
            .or_default()
            .push(handler);
        tracing::debug!(target: "broker", channel = %channel, "channel_subscribed");
        Ok(())
    }

    async fn unsubscribe(
        &self,
        channel: &str,
        handler: &Arc<dyn ChannelHandlerPort>,
    ) -> Result<(), BrokerError> {
        self.require_connected("unsubscribe")?;
        let mut guard = self.state.write().expect("lock poisoned");
        let Some(handlers) = guard.by_channel.get_mut(channel) else {
            tracing::debug!(target: "broker", channel = %channel, "unsubscribe_unknown_channel");
            return Ok(());
        };

        let before = handlers.len();
        handlers.retain(|registered| !Arc::ptr_eq(registered, handler));
        if handlers.len() == before {
            tracing::debug!(target: "broker", channel = %channel, "unsubscribe_unknown_handler");
        }
        if handlers.is_empty() {
            guard.by_channel.remove(channel);
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, message: Value) -> Result<(), BrokerError> {
        self.require_connected("publish")?;
        let handlers = self
            .state
            .read()
            .expect("lock poisoned")
            .by_channel
            .get(channel)
            .cloned()
            .unwrap_or_default();

        tracing::trace!(
            target: "broker",
            channel = %channel,
            subscriber_count = handlers.len(),
            "publish"
        );
        for handler in handlers {
            handler.on_message(channel, message.clone()).await;
        }
        Ok(())
    }
}

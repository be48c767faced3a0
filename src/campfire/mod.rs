//! Campfire: a named processing unit running an ordered, conditionally
//! gated pipeline of steps against inbound torches.

pub mod camper;
pub mod condition;
pub mod error;
pub mod pipeline;

pub use camper::{CamperFactory, CamperPort, CamperRegistry, NoopCamper};
pub use condition::{AlwaysTrueEvaluator, ConditionEvaluatorPort};
pub use error::{CampfireError, CampfireErrorKind};
pub use pipeline::{PipelineContext, StepOutput};

use std::{
    collections::BTreeMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    broker::{BrokerPort, ChannelHandlerPort},
    campfire::error::{broker_failure, not_found},
    config::CampfireConfig,
    torch::{PlaceholderSigner, Torch, TorchAddress, TorchSignerPort},
};

pub struct Campfire {
    config: Arc<CampfireConfig>,
    broker: Arc<dyn BrokerPort>,
    registry: Arc<CamperRegistry>,
    conditions: Arc<dyn ConditionEvaluatorPort>,
    signer: Arc<dyn TorchSignerPort>,
    running: AtomicBool,
    // Handlers are kept so stop can unsubscribe exactly the registrations
    // this campfire made on a shared broker.
    subscriptions: RwLock<Vec<(String, Arc<dyn ChannelHandlerPort>)>>,
    campers: RwLock<BTreeMap<String, Arc<dyn CamperPort>>>,
}

impl Campfire {
    pub fn new(
        config: CampfireConfig,
        broker: Arc<dyn BrokerPort>,
        registry: Arc<CamperRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            broker,
            registry,
            conditions: Arc::new(AlwaysTrueEvaluator),
            signer: Arc::new(PlaceholderSigner),
            running: AtomicBool::new(false),
            subscriptions: RwLock::new(Vec::new()),
            campers: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_conditions(mut self, conditions: Arc<dyn ConditionEvaluatorPort>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn TorchSignerPort>) -> Self {
        self.signer = signer;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CampfireConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Channels this campfire is currently subscribed to.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(channel, _)| channel.clone())
            .collect()
    }

    fn direct_channel(&self) -> String {
        format!("campfire:{}", self.config.name)
    }

    /// Subscribes each distinct configured channel plus the direct channel
    /// and initializes one camper per distinct `uses` identifier. All or
    /// nothing: any failure rolls back the subscriptions and campers made
    /// so far, then propagates.
    pub async fn start(self: &Arc<Self>) -> Result<(), CampfireError> {
        if self.is_running() {
            tracing::warn!(
                target: "campfire",
                campfire = %self.config.name,
                "campfire_already_running"
            );
            return Ok(());
        }

        tracing::info!(target: "campfire", campfire = %self.config.name, "campfire_starting");

        let direct_channel = self.direct_channel();
        // A configured channel may repeat or name the direct channel; each
        // channel is subscribed once.
        let mut channels: Vec<String> = Vec::new();
        for channel in self
            .config
            .channels
            .iter()
            .cloned()
            .chain(std::iter::once(direct_channel.clone()))
        {
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }

        let mut subscribed: Vec<(String, Arc<dyn ChannelHandlerPort>)> = Vec::new();
        for channel in channels {
            let handler: Arc<dyn ChannelHandlerPort> = if channel == direct_channel {
                Arc::new(DirectTorchHandler {
                    campfire: Arc::clone(self),
                })
            } else {
                Arc::new(BroadcastChannelHandler {
                    campfire_name: self.config.name.clone(),
                })
            };

            if let Err(err) = self.broker.subscribe(&channel, Arc::clone(&handler)).await {
                self.rollback_start(&subscribed, &BTreeMap::new()).await;
                return Err(broker_failure(format!(
                    "failed to subscribe campfire '{}' to '{channel}': {err}",
                    self.config.name
                )));
            }
            subscribed.push((channel, handler));
        }

        let mut campers: BTreeMap<String, Arc<dyn CamperPort>> = BTreeMap::new();
        for step in &self.config.steps {
            if campers.contains_key(&step.uses) {
                continue;
            }
            let Some(factory) = self.registry.resolve(&step.uses) else {
                self.rollback_start(&subscribed, &campers).await;
                return Err(not_found(format!(
                    "no camper registered for '{}' (step '{}')",
                    step.uses, step.name
                )));
            };
            let camper = factory(step);
            if let Err(err) = camper.start().await {
                self.rollback_start(&subscribed, &campers).await;
                return Err(err);
            }
            campers.insert(step.uses.clone(), camper);
        }

        *self.subscriptions.write().expect("lock poisoned") = subscribed;
        *self.campers.write().expect("lock poisoned") = campers;
        self.running.store(true, Ordering::SeqCst);

        tracing::info!(target: "campfire", campfire = %self.config.name, "campfire_started");
        Ok(())
    }

    async fn rollback_start(
        &self,
        subscribed: &[(String, Arc<dyn ChannelHandlerPort>)],
        campers: &BTreeMap<String, Arc<dyn CamperPort>>,
    ) {
        for (uses, camper) in campers {
            if let Err(err) = camper.stop().await {
                tracing::warn!(
                    target: "campfire",
                    campfire = %self.config.name,
                    camper = %uses,
                    error = %err,
                    "camper_stop_failed_during_rollback"
                );
            }
        }
        for (channel, handler) in subscribed {
            if let Err(err) = self.broker.unsubscribe(channel, handler).await {
                tracing::warn!(
                    target: "campfire",
                    campfire = %self.config.name,
                    channel = %channel,
                    error = %err,
                    "unsubscribe_failed_during_rollback"
                );
            }
        }
    }

    /// Best-effort teardown: every camper is stopped and every channel
    /// unsubscribed even when individual steps fail. Idempotent.
    pub async fn stop(&self) {
        if !self.is_running() {
            return;
        }

        tracing::info!(target: "campfire", campfire = %self.config.name, "campfire_stopping");

        let campers = std::mem::take(&mut *self.campers.write().expect("lock poisoned"));
        for (uses, camper) in campers {
            if let Err(err) = camper.stop().await {
                tracing::warn!(
                    target: "campfire",
                    campfire = %self.config.name,
                    camper = %uses,
                    error = %err,
                    "camper_stop_failed"
                );
            }
        }

        let subscriptions =
            std::mem::take(&mut *self.subscriptions.write().expect("lock poisoned"));
        for (channel, handler) in subscriptions {
            if let Err(err) = self.broker.unsubscribe(&channel, &handler).await {
                tracing::warn!(
                    target: "campfire",
                    campfire = %self.config.name,
                    channel = %channel,
                    error = %err,
                    "unsubscribe_failed"
                );
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!(target: "campfire", campfire = %self.config.name, "campfire_stopped");
    }

    /// Runs the step pipeline against one torch. Returns the response torch
    /// when any step produced output, `None` otherwise. Step failures stop
    /// the remaining pipeline but leave the campfire running.
    pub async fn process_torch(&self, torch: &Torch) -> Option<Torch> {
        if !self.is_running() {
            tracing::warn!(
                target: "campfire",
                campfire = %self.config.name,
                torch_id = %torch.id,
                "torch_ignored_campfire_not_running"
            );
            return None;
        }

        tracing::debug!(
            target: "campfire",
            campfire = %self.config.name,
            torch_id = %torch.id,
            "torch_processing"
        );

        let context = self.run_pipeline(torch).await;
        if context.outputs.is_empty() {
            return None;
        }

        let response = torch.respond(context.payload(), self.signer.as_ref());
        if response.is_none() {
            tracing::warn!(
                target: "campfire",
                campfire = %self.config.name,
                torch_id = %torch.id,
                target_address = %torch.target_address,
                "response_dropped_unresolvable_inbound_target"
            );
        }
        response
    }

    async fn run_pipeline(&self, torch: &Torch) -> PipelineContext {
        let mut context = PipelineContext::new(torch.clone());

        for step in &self.config.steps {
            if let Some(condition) = &step.condition {
                match self.conditions.evaluate(condition, &context) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(
                            target: "campfire",
                            campfire = %self.config.name,
                            step = %step.name,
                            "step_skipped_by_condition"
                        );
                        continue;
                    }
                    // An unevaluable condition must not lock the pipeline up.
                    Err(err) => {
                        tracing::warn!(
                            target: "campfire",
                            campfire = %self.config.name,
                            step = %step.name,
                            error = %err,
                            "condition_unevaluable_step_runs"
                        );
                    }
                }
            }

            let camper = self
                .campers
                .read()
                .expect("lock poisoned")
                .get(&step.uses)
                .cloned();
            let Some(camper) = camper else {
                tracing::error!(
                    target: "campfire",
                    campfire = %self.config.name,
                    step = %step.name,
                    uses = %step.uses,
                    "step_camper_missing_pipeline_stopped"
                );
                break;
            };

            match camper.process(&context.torch, &step.with, &context.outputs).await {
                Ok(output) => {
                    if !output.is_null() {
                        context.outputs.push(StepOutput {
                            step: step.name.clone(),
                            output,
                        });
                    }
                    tracing::debug!(
                        target: "campfire",
                        campfire = %self.config.name,
                        step = %step.name,
                        "step_executed"
                    );
                }
                Err(err) => {
                    tracing::error!(
                        target: "campfire",
                        campfire = %self.config.name,
                        step = %step.name,
                        error = %err,
                        "step_failed_pipeline_stopped"
                    );
                    break;
                }
            }
        }

        context
    }
}

/// Handler for the campfire's direct channel: deserializes torches and runs
/// the pipeline. Responses are published back toward the sender; every
/// failure is contained here, nothing escapes into the broker callback.
struct DirectTorchHandler {
    campfire: Arc<Campfire>,
}

#[async_trait]
impl ChannelHandlerPort for DirectTorchHandler {
    async fn on_message(&self, channel: &str, message: Value) {
        let torch: Torch = match serde_json::from_value(message) {
            Ok(torch) => torch,
            Err(err) => {
                tracing::error!(
                    target: "campfire",
                    campfire = %self.campfire.config.name,
                    channel = %channel,
                    error = %err,
                    "malformed_torch_dropped"
                );
                return;
            }
        };

        let Some(response) = self.campfire.process_torch(&torch).await else {
            return;
        };

        let Some(target) = TorchAddress::parse(&response.target_address) else {
            tracing::warn!(
                target: "campfire",
                campfire = %self.campfire.config.name,
                target_address = %response.target_address,
                "response_dropped_no_destination"
            );
            return;
        };
        let message = match serde_json::to_value(&response) {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(
                    target: "campfire",
                    campfire = %self.campfire.config.name,
                    error = %err,
                    "response_serialization_failed"
                );
                return;
            }
        };
        if let Err(err) = self.campfire.broker.publish(&target.channel(), message).await {
            tracing::error!(
                target: "campfire",
                campfire = %self.campfire.config.name,
                channel = %target.channel(),
                error = %err,
                "response_publish_failed"
            );
        }
    }
}

/// Handler for configured topic channels. Currently a pass-through hook
/// kept as the seam for channel-specific handling.
struct BroadcastChannelHandler {
    campfire_name: String,
}

#[async_trait]
impl ChannelHandlerPort for BroadcastChannelHandler {
    async fn on_message(&self, channel: &str, _message: Value) {
        tracing::debug!(
            target: "campfire",
            campfire = %self.campfire_name,
            channel = %channel,
            "channel_message_received"
        );
    }
}

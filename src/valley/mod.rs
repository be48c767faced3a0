//! Valley: the per-node orchestrator owning campfires, community
//! memberships and shared infrastructure (broker, party box, dock).

pub mod dock;
pub mod error;

pub use dock::{DockPort, NoopDock};
pub use error::{ValleyError, ValleyErrorKind};

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    broker::{BrokerPort, InProcessBroker},
    campfire::{AlwaysTrueEvaluator, Campfire, CamperRegistry, ConditionEvaluatorPort},
    config::{CampfireConfig, ValleyConfig},
    party_box::{FileSystemPartyBox, PartyBoxPort},
    torch::{PlaceholderSigner, Torch, TorchAddress, TorchSignerPort},
    valley::error::{broker_failure, campfire_failure, internal_error, invalid_state, party_box_failure},
};

/// Trust relationship with a community; created on join, removed on leave.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommunityMembership {
    pub community_name: String,
    pub alias: String,
    pub key_hash: String,
}

#[derive(Default)]
struct ValleyState {
    running: bool,
    broker: Option<Arc<dyn BrokerPort>>,
    party_box: Option<Arc<dyn PartyBoxPort>>,
    dock: Option<Arc<dyn DockPort>>,
    // Vec keeps provisioning order; shutdown stops campfires in this order.
    campfires: Vec<(String, Arc<Campfire>)>,
    communities: BTreeMap<String, CommunityMembership>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Valley {
    name: String,
    config: ValleyConfig,
    registry: Arc<CamperRegistry>,
    conditions: Arc<dyn ConditionEvaluatorPort>,
    signer: Arc<dyn TorchSignerPort>,
    injected_broker: Option<Arc<dyn BrokerPort>>,
    injected_party_box: Option<Arc<dyn PartyBoxPort>>,
    injected_dock: Option<Arc<dyn DockPort>>,
    state: Mutex<ValleyState>,
}

impl Valley {
    pub fn new(config: ValleyConfig) -> Self {
        Self {
            name: config.name.clone(),
            config,
            registry: Arc::new(CamperRegistry::new()),
            conditions: Arc::new(AlwaysTrueEvaluator),
            signer: Arc::new(PlaceholderSigner),
            injected_broker: None,
            injected_party_box: None,
            injected_dock: None,
            state: Mutex::new(ValleyState::default()),
        }
    }

    pub fn with_camper_registry(mut self, registry: Arc<CamperRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_conditions(mut self, conditions: Arc<dyn ConditionEvaluatorPort>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn TorchSignerPort>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_broker(mut self, broker: Arc<dyn BrokerPort>) -> Self {
        self.injected_broker = Some(broker);
        self
    }

    pub fn with_party_box(mut self, party_box: Arc<dyn PartyBoxPort>) -> Self {
        self.injected_party_box = Some(party_box);
        self
    }

    pub fn with_dock(mut self, dock: Arc<dyn DockPort>) -> Self {
        self.injected_dock = Some(dock);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ValleyConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    pub async fn party_box(&self) -> Option<Arc<dyn PartyBoxPort>> {
        self.state.lock().await.party_box.clone()
    }

    /// Brings up shared infrastructure in order: broker, party box, dock,
    /// retention task. A failure anywhere undoes the partial initialization
    /// through the stop path, then propagates.
    pub async fn start(&self) -> Result<(), ValleyError> {
        let mut state = self.state.lock().await;
        if state.running {
            tracing::warn!(target: "valley", valley = %self.name, "valley_already_running");
            return Ok(());
        }

        tracing::info!(target: "valley", valley = %self.name, "valley_starting");
        match self.start_inner(&mut state).await {
            Ok(()) => {
                state.running = true;
                tracing::info!(target: "valley", valley = %self.name, "valley_started");
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    target: "valley",
                    valley = %self.name,
                    error = %err,
                    "valley_start_failed"
                );
                self.stop_inner(&mut state).await;
                Err(err)
            }
        }
    }

    async fn start_inner(&self, state: &mut ValleyState) -> Result<(), ValleyError> {
        let broker = self
            .injected_broker
            .clone()
            .unwrap_or_else(|| Arc::new(InProcessBroker::new()) as Arc<dyn BrokerPort>);
        broker
            .connect()
            .await
            .map_err(|err| broker_failure(format!("failed to connect broker: {err}")))?;
        state.broker = Some(broker);

        let party_box = match self.injected_party_box.clone() {
            Some(party_box) => party_box,
            None => {
                let base_path = self
                    .config
                    .party_box
                    .path
                    .clone()
                    .unwrap_or_else(|| format!("./party_box_{}", self.name).into());
                Arc::new(FileSystemPartyBox::new(base_path).map_err(|err| {
                    party_box_failure(format!("failed to initialize party box: {err}"))
                })?) as Arc<dyn PartyBoxPort>
            }
        };
        state.party_box = Some(Arc::clone(&party_box));

        if self.config.auto_create_dock {
            let dock = self
                .injected_dock
                .clone()
                .unwrap_or_else(|| Arc::new(NoopDock) as Arc<dyn DockPort>);
            dock.start_gateway().await?;
            state.dock = Some(dock);
        }

        let retention = &self.config.party_box.retention;
        if retention.enabled {
            state.tasks.push(spawn_retention_sweep(
                self.name.clone(),
                party_box,
                retention.max_age_days,
                Duration::from_secs(retention.sweep_interval_secs.max(1)),
            ));
        }

        Ok(())
    }

    /// Idempotent shutdown: background tasks, dock, campfires in
    /// provisioning order, then the broker. Per-item failures are logged
    /// and never abort the remaining teardown.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if !state.running {
            return;
        }

        tracing::info!(target: "valley", valley = %self.name, "valley_stopping");
        self.stop_inner(&mut state).await;
        state.running = false;
        tracing::info!(target: "valley", valley = %self.name, "valley_stopped");
    }

    async fn stop_inner(&self, state: &mut ValleyState) {
        for task in state.tasks.drain(..) {
            task.abort();
            // Cancellation errors are expected here and suppressed.
            let _ = task.await;
        }

        if let Some(dock) = state.dock.take()
            && let Err(err) = dock.stop_gateway().await
        {
            tracing::warn!(
                target: "valley",
                valley = %self.name,
                error = %err,
                "dock_stop_failed"
            );
        }

        for (name, campfire) in state.campfires.drain(..) {
            tracing::debug!(
                target: "valley",
                valley = %self.name,
                campfire = %name,
                "stopping_campfire"
            );
            campfire.stop().await;
        }

        if let Some(broker) = state.broker.take()
            && let Err(err) = broker.disconnect().await
        {
            tracing::warn!(
                target: "valley",
                valley = %self.name,
                error = %err,
                "broker_disconnect_failed"
            );
        }

        state.party_box = None;
    }

    /// Builds, starts and registers a campfire. Duplicate names are
    /// rejected without mutating state; a start failure propagates and
    /// leaves no half-registered entry.
    pub async fn provision_campfire(
        &self,
        campfire_config: CampfireConfig,
    ) -> Result<bool, ValleyError> {
        let mut state = self.state.lock().await;
        if !state.running {
            return Err(invalid_state(
                "valley must be started before provisioning campfires",
            ));
        }

        let campfire_name = campfire_config.name.clone();
        if state.campfires.iter().any(|(name, _)| *name == campfire_name) {
            tracing::warn!(
                target: "valley",
                valley = %self.name,
                campfire = %campfire_name,
                "campfire_already_exists"
            );
            return Ok(false);
        }

        let broker = state
            .broker
            .clone()
            .ok_or_else(|| internal_error("running valley has no broker"))?;
        let campfire = Arc::new(
            Campfire::new(campfire_config, broker, Arc::clone(&self.registry))
                .with_conditions(Arc::clone(&self.conditions))
                .with_signer(Arc::clone(&self.signer)),
        );
        campfire.start().await.map_err(|err| {
            campfire_failure(format!(
                "failed to start campfire '{campfire_name}': {err}"
            ))
        })?;

        state.campfires.push((campfire_name.clone(), campfire));
        tracing::info!(
            target: "valley",
            valley = %self.name,
            campfire = %campfire_name,
            "campfire_provisioned"
        );
        Ok(true)
    }

    /// Publishes a torch onto the channel its target address resolves to.
    /// A malformed address drops the torch with a log record (`Ok(false)`).
    pub async fn send_torch(&self, torch: &Torch) -> Result<bool, ValleyError> {
        let state = self.state.lock().await;
        if !state.running {
            return Err(invalid_state("valley must be started before sending torches"));
        }

        let Some(target) = TorchAddress::parse(&torch.target_address) else {
            tracing::warn!(
                target: "valley",
                valley = %self.name,
                torch_id = %torch.id,
                target_address = %torch.target_address,
                "torch_dropped_no_destination"
            );
            return Ok(false);
        };

        let broker = state
            .broker
            .clone()
            .ok_or_else(|| internal_error("running valley has no broker"))?;
        let message = serde_json::to_value(torch)
            .map_err(|err| internal_error(format!("failed to serialize torch: {err}")))?;
        broker
            .publish(&target.channel(), message)
            .await
            .map_err(|err| {
                broker_failure(format!(
                    "failed to publish torch '{}' to '{}': {err}",
                    torch.id,
                    target.channel()
                ))
            })?;
        Ok(true)
    }

    /// Records a community membership keyed by a one-way digest of `key`.
    /// No network handshake happens here.
    pub async fn join_community(
        &self,
        community_name: &str,
        key: &str,
    ) -> Result<bool, ValleyError> {
        let mut state = self.state.lock().await;
        if !state.running {
            return Err(invalid_state(
                "valley must be started before joining communities",
            ));
        }

        let membership = CommunityMembership {
            community_name: community_name.to_string(),
            alias: self.name.clone(),
            key_hash: hash_key(key),
        };
        state
            .communities
            .insert(community_name.to_string(), membership);
        tracing::info!(
            target: "valley",
            valley = %self.name,
            community = %community_name,
            "community_joined"
        );
        Ok(true)
    }

    /// Removes a membership; `false` when the valley is not a member.
    pub async fn leave_community(&self, community_name: &str) -> Result<bool, ValleyError> {
        let mut state = self.state.lock().await;
        if state.communities.remove(community_name).is_none() {
            tracing::warn!(
                target: "valley",
                valley = %self.name,
                community = %community_name,
                "not_a_community_member"
            );
            return Ok(false);
        }

        tracing::info!(
            target: "valley",
            valley = %self.name,
            community = %community_name,
            "community_left"
        );
        Ok(true)
    }

    /// Defensive copy of the campfires, in provisioning order.
    pub async fn get_campfires(&self) -> Vec<(String, Arc<Campfire>)> {
        self.state.lock().await.campfires.clone()
    }

    /// Defensive copy of the community memberships.
    pub async fn get_communities(&self) -> BTreeMap<String, CommunityMembership> {
        self.state.lock().await.communities.clone()
    }
}

fn spawn_retention_sweep(
    valley_name: String,
    party_box: Arc<dyn PartyBoxPort>,
    max_age_days: u64,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick of an interval completes immediately; skip it so
        // the sweep runs one interval after startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match party_box.cleanup(max_age_days).await {
                Ok(removed) => {
                    tracing::debug!(
                        target: "valley",
                        valley = %valley_name,
                        removed = removed,
                        "retention_sweep_ran"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        target: "valley",
                        valley = %valley_name,
                        error = %err,
                        "retention_sweep_failed"
                    );
                }
            }
        }
    })
}

fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde_json::json;

use campfire_valley::{
    campfire::{CamperRegistry, NoopCamper},
    config::{CampfireConfig, ValleyConfig},
    party_box::PartyBoxPort,
    torch::Torch,
    valley::{Valley, ValleyErrorKind},
};

fn valley_config(name: &str, dir: &tempfile::TempDir) -> ValleyConfig {
    let mut config = ValleyConfig::default_for(name);
    config.party_box.path = Some(dir.path().join("party_box"));
    config
}

fn noop_registry() -> Arc<CamperRegistry> {
    let registry = Arc::new(CamperRegistry::new());
    registry
        .register("camper/noop@v1", NoopCamper::factory())
        .expect("registration should succeed");
    registry
}

fn campfire_config(name: &str) -> CampfireConfig {
    CampfireConfig {
        name: name.to_string(),
        channels: vec!["tech".to_string()],
        steps: vec![campfire_valley::config::Step {
            name: "ack".to_string(),
            uses: "camper/noop@v1".to_string(),
            with: BTreeMap::new(),
            condition: None,
        }],
        env: BTreeMap::new(),
    }
}

async fn started_valley(dir: &tempfile::TempDir) -> Valley {
    let valley =
        Valley::new(valley_config("summit", dir)).with_camper_registry(noop_registry());
    valley.start().await.expect("valley start should succeed");
    valley
}

#[tokio::test]
async fn stop_is_idempotent() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let valley = started_valley(&dir).await;
    assert!(valley.is_running().await);

    valley.stop().await;
    valley.stop().await;
    assert!(!valley.is_running().await);

    // Stopping a never-started valley is equally harmless.
    let fresh = Valley::new(valley_config("quiet", &dir));
    fresh.stop().await;
    assert!(!fresh.is_running().await);
}

#[tokio::test]
async fn valley_can_restart_after_stop() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let valley = started_valley(&dir).await;
    valley.stop().await;

    valley.start().await.expect("restart should succeed");
    assert!(valley.is_running().await);
    valley.stop().await;
}

#[tokio::test]
async fn provisioning_requires_a_running_valley() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let valley =
        Valley::new(valley_config("summit", &dir)).with_camper_registry(noop_registry());

    let err = valley
        .provision_campfire(campfire_config("lookout"))
        .await
        .expect_err("provisioning before start must be rejected");
    assert_eq!(err.kind, ValleyErrorKind::InvalidState);
}

#[tokio::test]
async fn duplicate_provision_is_rejected_without_mutation() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let valley = started_valley(&dir).await;

    assert!(
        valley
            .provision_campfire(campfire_config("lookout"))
            .await
            .expect("first provision should succeed")
    );
    assert!(
        !valley
            .provision_campfire(campfire_config("lookout"))
            .await
            .expect("duplicate provision reports failure, not an error")
    );

    let campfires = valley.get_campfires().await;
    assert_eq!(campfires.len(), 1);
    assert_eq!(campfires[0].0, "lookout");
    assert!(campfires[0].1.is_running());

    valley.stop().await;
    assert!(
        !campfires[0].1.is_running(),
        "valley shutdown stops owned campfires"
    );
}

#[tokio::test]
async fn provision_failure_leaves_no_half_registered_entry() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let valley = started_valley(&dir).await;

    let mut config = campfire_config("ghost");
    config.steps[0].uses = "camper/unregistered@v1".to_string();
    let err = valley
        .provision_campfire(config)
        .await
        .expect_err("a campfire start failure must propagate");
    assert_eq!(err.kind, ValleyErrorKind::Campfire);
    assert!(valley.get_campfires().await.is_empty());

    // The process entry point stops the valley on exactly this error path.
    valley.stop().await;
    assert!(!valley.is_running().await);
}

#[tokio::test]
async fn retention_sweep_runs_in_the_background_and_stop_cancels_it() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let mut config = valley_config("summit", &dir);
    config.party_box.retention.enabled = true;
    // Zero-day age: every stored file is past the cutoff at the next sweep.
    config.party_box.retention.max_age_days = 0;
    config.party_box.retention.sweep_interval_secs = 1;

    let valley = Valley::new(config).with_camper_registry(noop_registry());
    valley.start().await.expect("valley start should succeed");

    let party_box = valley
        .party_box()
        .await
        .expect("a running valley has a party box");
    party_box
        .store("att-stale", b"payload")
        .await
        .expect("store should succeed");

    let mut swept = false;
    for _ in 0..50 {
        if party_box
            .retrieve("att-stale")
            .await
            .expect("retrieve should succeed")
            .is_none()
        {
            swept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(swept, "the background sweep removes attachments past the age limit");

    tokio::time::timeout(Duration::from_secs(1), valley.stop())
        .await
        .expect("stop must cancel the sweep task promptly");
    assert!(!valley.is_running().await);
}

#[tokio::test]
async fn communities_are_joined_and_left_through_membership_records() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let valley = started_valley(&dir).await;

    assert!(
        valley
            .join_community("northern-lights", "shared-secret")
            .await
            .expect("join should succeed")
    );
    let communities = valley.get_communities().await;
    let membership = &communities["northern-lights"];
    assert_eq!(membership.alias, "summit");
    assert_eq!(membership.key_hash.len(), 64);
    assert_ne!(membership.key_hash, "shared-secret", "keys are stored hashed");

    assert!(
        valley
            .leave_community("northern-lights")
            .await
            .expect("leave should succeed")
    );
    assert!(
        !valley
            .leave_community("northern-lights")
            .await
            .expect("leaving twice reports failure, not an error")
    );
    assert!(valley.get_communities().await.is_empty());

    valley.stop().await;
}

#[tokio::test]
async fn join_community_requires_a_running_valley() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let valley = Valley::new(valley_config("summit", &dir));

    let err = valley
        .join_community("northern-lights", "key")
        .await
        .expect_err("joining before start must be rejected");
    assert_eq!(err.kind, ValleyErrorKind::InvalidState);
}

#[tokio::test]
async fn send_torch_delivers_to_provisioned_campfires() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let valley = started_valley(&dir).await;
    valley
        .provision_campfire(campfire_config("lookout"))
        .await
        .expect("provision should succeed");

    let torch = Torch::new("elsewhere", "valley:summit/campfire:lookout", json!({"n": 1}));
    assert!(
        valley
            .send_torch(&torch)
            .await
            .expect("send should succeed"),
        "an addressed torch is published"
    );

    let dropped = Torch::new("elsewhere", "not-an-address", json!({}));
    assert!(
        !valley
            .send_torch(&dropped)
            .await
            .expect("send of a malformed address still succeeds"),
        "a torch without a destination is dropped"
    );

    valley.stop().await;
}

#[tokio::test]
async fn accessors_return_defensive_copies() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let valley = started_valley(&dir).await;
    valley
        .join_community("northern-lights", "key")
        .await
        .expect("join should succeed");

    let mut communities = valley.get_communities().await;
    communities.clear();
    assert_eq!(
        valley.get_communities().await.len(),
        1,
        "mutating the returned collection must not touch valley state"
    );

    valley.stop().await;
}

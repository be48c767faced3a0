use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::{Value, json};

use campfire_valley::{
    broker::{BrokerPort, ChannelHandlerPort, InProcessBroker},
    campfire::{
        Campfire, CampfireError, CamperPort, CamperRegistry, ConditionEvaluatorPort,
        PipelineContext, StepOutput,
        error::step_failure,
    },
    config::{CampfireConfig, Step},
    torch::Torch,
};

type InvocationLog = Arc<Mutex<Vec<String>>>;

fn label(params: &BTreeMap<String, Value>) -> String {
    params
        .get("label")
        .and_then(|value| value.as_str())
        .unwrap_or("?")
        .to_string()
}

struct RecordingCamper {
    log: InvocationLog,
}

#[async_trait]
impl CamperPort for RecordingCamper {
    async fn start(&self) -> Result<(), CampfireError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), CampfireError> {
        Ok(())
    }

    async fn process(
        &self,
        _torch: &Torch,
        params: &BTreeMap<String, Value>,
        _outputs: &[StepOutput],
    ) -> Result<Value, CampfireError> {
        let label = label(params);
        self.log.lock().expect("lock poisoned").push(label.clone());
        Ok(json!({"ran": label}))
    }
}

struct FailingCamper {
    log: InvocationLog,
}

#[async_trait]
impl CamperPort for FailingCamper {
    async fn start(&self) -> Result<(), CampfireError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), CampfireError> {
        Ok(())
    }

    async fn process(
        &self,
        _torch: &Torch,
        params: &BTreeMap<String, Value>,
        _outputs: &[StepOutput],
    ) -> Result<Value, CampfireError> {
        self.log.lock().expect("lock poisoned").push(label(params));
        Err(step_failure("scripted step failure"))
    }
}

struct FailingStartCamper;

#[async_trait]
impl CamperPort for FailingStartCamper {
    async fn start(&self) -> Result<(), CampfireError> {
        Err(step_failure("scripted camper start failure"))
    }

    async fn stop(&self) -> Result<(), CampfireError> {
        Ok(())
    }

    async fn process(
        &self,
        _torch: &Torch,
        _params: &BTreeMap<String, Value>,
        _outputs: &[StepOutput],
    ) -> Result<Value, CampfireError> {
        Ok(Value::Null)
    }
}

/// Treats the literal condition string `"skip"` as false, everything else
/// as true.
struct SkipEvaluator;

impl ConditionEvaluatorPort for SkipEvaluator {
    fn evaluate(
        &self,
        condition: &str,
        _context: &PipelineContext,
    ) -> Result<bool, CampfireError> {
        Ok(condition != "skip")
    }
}

fn test_registry(log: InvocationLog) -> Arc<CamperRegistry> {
    let registry = Arc::new(CamperRegistry::new());

    let recording_log = Arc::clone(&log);
    registry
        .register(
            "camper/recorder@v1",
            Arc::new(move |_step: &Step| {
                Arc::new(RecordingCamper {
                    log: Arc::clone(&recording_log),
                }) as Arc<dyn CamperPort>
            }),
        )
        .expect("recorder registration should succeed");

    let failing_log = Arc::clone(&log);
    registry
        .register(
            "camper/failing@v1",
            Arc::new(move |_step: &Step| {
                Arc::new(FailingCamper {
                    log: Arc::clone(&failing_log),
                }) as Arc<dyn CamperPort>
            }),
        )
        .expect("failing registration should succeed");

    registry
        .register(
            "camper/broken-start@v1",
            Arc::new(|_step: &Step| Arc::new(FailingStartCamper) as Arc<dyn CamperPort>),
        )
        .expect("broken-start registration should succeed");

    registry
}

fn step(name: &str, uses: &str, condition: Option<&str>) -> Step {
    Step {
        name: name.to_string(),
        uses: uses.to_string(),
        with: BTreeMap::from([("label".to_string(), json!(name))]),
        condition: condition.map(str::to_string),
    }
}

fn campfire_config(steps: Vec<Step>) -> CampfireConfig {
    CampfireConfig {
        name: "lookout".to_string(),
        channels: vec!["tech".to_string()],
        steps,
        env: BTreeMap::new(),
    }
}

async fn started_campfire(
    steps: Vec<Step>,
    log: InvocationLog,
) -> (Arc<InProcessBroker>, Arc<Campfire>) {
    let broker = Arc::new(InProcessBroker::new());
    broker.connect().await.expect("broker connect should succeed");
    let campfire = Arc::new(
        Campfire::new(
            campfire_config(steps),
            Arc::clone(&broker) as Arc<dyn BrokerPort>,
            test_registry(log),
        )
        .with_conditions(Arc::new(SkipEvaluator)),
    );
    campfire.start().await.expect("campfire start should succeed");
    (broker, campfire)
}

fn inbound_torch() -> Torch {
    Torch::new("A", "valley:B/campfire:lookout", json!({"task": "review"}))
}

#[tokio::test]
async fn steps_run_in_configured_order_and_false_conditions_skip() {
    let log: InvocationLog = Arc::default();
    let (_broker, campfire) = started_campfire(
        vec![
            step("first", "camper/recorder@v1", None),
            step("second", "camper/recorder@v1", Some("skip")),
            step("third", "camper/recorder@v1", None),
        ],
        Arc::clone(&log),
    )
    .await;

    let response = campfire
        .process_torch(&inbound_torch())
        .await
        .expect("pipeline with outputs should respond");

    assert_eq!(
        *log.lock().expect("lock poisoned"),
        vec!["first".to_string(), "third".to_string()],
        "skipped step must not run, order must be the configured one"
    );
    assert_eq!(
        response.payload,
        json!({"first": {"ran": "first"}, "third": {"ran": "third"}})
    );
}

#[tokio::test]
async fn step_failure_stops_the_remaining_pipeline() {
    let log: InvocationLog = Arc::default();
    let (_broker, campfire) = started_campfire(
        vec![
            step("first", "camper/recorder@v1", None),
            step("boom", "camper/failing@v1", None),
            step("third", "camper/recorder@v1", None),
        ],
        Arc::clone(&log),
    )
    .await;

    let response = campfire
        .process_torch(&inbound_torch())
        .await
        .expect("outputs before the failure still produce a response");

    assert_eq!(
        *log.lock().expect("lock poisoned"),
        vec!["first".to_string(), "boom".to_string()],
        "steps after the failing one must never be invoked"
    );
    assert_eq!(response.payload, json!({"first": {"ran": "first"}}));

    assert!(campfire.is_running(), "a step failure must not stop the campfire");
    assert!(
        campfire.process_torch(&inbound_torch()).await.is_some(),
        "subsequent torches are still processed"
    );
}

#[tokio::test]
async fn failed_start_leaves_no_subscriptions_behind() {
    let log: InvocationLog = Arc::default();
    let broker = Arc::new(InProcessBroker::new());
    broker.connect().await.expect("broker connect should succeed");
    let campfire = Arc::new(Campfire::new(
        campfire_config(vec![
            step("first", "camper/recorder@v1", None),
            step("boom", "camper/broken-start@v1", None),
        ]),
        Arc::clone(&broker) as Arc<dyn BrokerPort>,
        test_registry(log),
    ));

    campfire
        .start()
        .await
        .expect_err("camper start failure must propagate");

    assert!(!campfire.is_running());
    assert!(campfire.subscriptions().is_empty());
    assert_eq!(
        broker.subscription_count(),
        0,
        "all-or-nothing start must roll every subscription back"
    );
}

#[tokio::test]
async fn unregistered_camper_fails_start_with_rollback() {
    let log: InvocationLog = Arc::default();
    let broker = Arc::new(InProcessBroker::new());
    broker.connect().await.expect("broker connect should succeed");
    let campfire = Arc::new(Campfire::new(
        campfire_config(vec![step("ghost", "camper/unknown@v1", None)]),
        Arc::clone(&broker) as Arc<dyn BrokerPort>,
        test_registry(log),
    ));

    campfire
        .start()
        .await
        .expect_err("unknown camper identifier must fail start");
    assert_eq!(broker.subscription_count(), 0);
}

#[tokio::test]
async fn stop_is_idempotent_and_torches_are_ignored_after() {
    let log: InvocationLog = Arc::default();
    let (broker, campfire) = started_campfire(
        vec![step("first", "camper/recorder@v1", None)],
        Arc::clone(&log),
    )
    .await;

    campfire.stop().await;
    campfire.stop().await;

    assert!(!campfire.is_running());
    assert!(campfire.subscriptions().is_empty());
    assert_eq!(broker.subscription_count(), 0);
    assert!(
        campfire.process_torch(&inbound_torch()).await.is_none(),
        "a stopped campfire processes nothing"
    );
}

#[tokio::test]
async fn starting_twice_is_a_warning_not_an_error() {
    let log: InvocationLog = Arc::default();
    let (broker, campfire) = started_campfire(
        vec![step("first", "camper/recorder@v1", None)],
        Arc::clone(&log),
    )
    .await;

    campfire.start().await.expect("second start should be a no-op");
    // One configured channel plus the direct channel.
    assert_eq!(broker.subscription_count(), 2);
}

#[tokio::test]
async fn duplicate_and_direct_channels_are_subscribed_once() {
    let log: InvocationLog = Arc::default();
    let broker = Arc::new(InProcessBroker::new());
    broker.connect().await.expect("broker connect should succeed");

    let mut config = campfire_config(vec![step("first", "camper/recorder@v1", None)]);
    config.channels = vec![
        "campfire:lookout".to_string(),
        "tech".to_string(),
        "tech".to_string(),
    ];
    let campfire = Arc::new(Campfire::new(
        config,
        Arc::clone(&broker) as Arc<dyn BrokerPort>,
        test_registry(Arc::clone(&log)),
    ));
    campfire.start().await.expect("campfire start should succeed");

    assert_eq!(
        broker.subscription_count(),
        2,
        "the direct channel and 'tech' are each subscribed once"
    );

    broker
        .publish(
            "campfire:lookout",
            serde_json::to_value(&inbound_torch()).expect("torch should serialize"),
        )
        .await
        .expect("publish should succeed");
    assert_eq!(
        log.lock().expect("lock poisoned").len(),
        1,
        "a torch on the direct channel runs the pipeline exactly once"
    );
}

#[tokio::test]
async fn stopping_one_campfire_leaves_shared_channels_subscribed() {
    let log: InvocationLog = Arc::default();
    let broker = Arc::new(InProcessBroker::new());
    broker.connect().await.expect("broker connect should succeed");
    let registry = test_registry(Arc::clone(&log));

    let first = Arc::new(Campfire::new(
        campfire_config(vec![step("first", "camper/recorder@v1", None)]),
        Arc::clone(&broker) as Arc<dyn BrokerPort>,
        Arc::clone(&registry),
    ));
    let mut beacon_config = campfire_config(vec![step("first", "camper/recorder@v1", None)]);
    beacon_config.name = "beacon".to_string();
    let second = Arc::new(Campfire::new(
        beacon_config,
        Arc::clone(&broker) as Arc<dyn BrokerPort>,
        registry,
    ));

    first.start().await.expect("first campfire should start");
    second.start().await.expect("second campfire should start");
    assert_eq!(broker.subscription_count(), 4);

    first.stop().await;
    assert_eq!(
        broker.subscription_count(),
        2,
        "stopping one campfire must not tear down the other's 'tech' subscription"
    );
    assert_eq!(second.subscriptions().len(), 2);
    assert!(second.is_running());
}

struct CapturingHandler {
    seen: Mutex<Vec<Value>>,
}

#[async_trait]
impl ChannelHandlerPort for CapturingHandler {
    async fn on_message(&self, _channel: &str, message: Value) {
        self.seen.lock().expect("lock poisoned").push(message);
    }
}

#[tokio::test]
async fn direct_channel_delivery_routes_a_response_back_to_the_sender() {
    let log: InvocationLog = Arc::default();
    let (broker, _campfire) = started_campfire(
        vec![step("first", "camper/recorder@v1", None)],
        Arc::clone(&log),
    )
    .await;

    let capture = Arc::new(CapturingHandler {
        seen: Mutex::new(Vec::new()),
    });
    broker
        .subscribe("valley:A", Arc::clone(&capture) as Arc<dyn ChannelHandlerPort>)
        .await
        .expect("subscribe should succeed");

    // A malformed message on the direct channel is dropped without harm.
    broker
        .publish("campfire:lookout", json!({"not": "a torch"}))
        .await
        .expect("publish should succeed");

    let inbound = inbound_torch();
    broker
        .publish(
            "campfire:lookout",
            serde_json::to_value(&inbound).expect("torch should serialize"),
        )
        .await
        .expect("publish should succeed");

    let seen = capture.seen.lock().expect("lock poisoned");
    assert_eq!(seen.len(), 1, "exactly the valid torch produced a response");
    let response: Torch =
        serde_json::from_value(seen[0].clone()).expect("response should deserialize");
    assert_eq!(response.id, format!("response_{}", inbound.id));
    assert_eq!(response.sender_valley, "B");
    assert_eq!(response.target_address, "valley:A");
    assert_eq!(response.payload, json!({"first": {"ran": "first"}}));
}

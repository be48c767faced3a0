use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    campfire::{
        error::{CampfireError, registration_invalid},
        pipeline::StepOutput,
    },
    config::Step,
    torch::Torch,
};

/// Step-level worker invoked by the pipeline. One camper instance is
/// created per distinct `uses` identifier when the campfire starts.
#[async_trait]
pub trait CamperPort: Send + Sync {
    async fn start(&self) -> Result<(), CampfireError>;

    async fn stop(&self) -> Result<(), CampfireError>;

    async fn process(
        &self,
        torch: &Torch,
        params: &BTreeMap<String, Value>,
        outputs: &[StepOutput],
    ) -> Result<Value, CampfireError>;
}

pub type CamperFactory = Arc<dyn Fn(&Step) -> Arc<dyn CamperPort> + Send + Sync>;

/// Closed mapping from a step's `uses` identifier (e.g. `camper/loader@v1`)
/// to the factory producing its worker. Registration happens at valley or
/// campfire construction; the pipeline never parses identifier strings.
#[derive(Default)]
pub struct CamperRegistry {
    factories: RwLock<BTreeMap<String, CamperFactory>>,
}

impl CamperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        uses: impl Into<String>,
        factory: CamperFactory,
    ) -> Result<(), CampfireError> {
        let uses = uses.into();
        if uses.trim().is_empty() {
            return Err(registration_invalid("camper identifier cannot be empty"));
        }

        let mut guard = self.factories.write().expect("lock poisoned");
        if guard.contains_key(&uses) {
            return Err(registration_invalid(format!(
                "camper already registered: {uses}"
            )));
        }
        guard.insert(uses, factory);
        Ok(())
    }

    pub fn resolve(&self, uses: &str) -> Option<CamperFactory> {
        self.factories
            .read()
            .expect("lock poisoned")
            .get(uses)
            .cloned()
    }

    pub fn registered(&self) -> Vec<String> {
        self.factories
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

/// Worker that acknowledges every step without doing any work. Useful as a
/// stand-in while a pipeline is wired up.
#[derive(Default)]
pub struct NoopCamper;

impl NoopCamper {
    pub fn factory() -> CamperFactory {
        Arc::new(|_step: &Step| Arc::new(NoopCamper) as Arc<dyn CamperPort>)
    }
}

#[async_trait]
impl CamperPort for NoopCamper {
    async fn start(&self) -> Result<(), CampfireError> {
        Ok(())
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
        Ok(json!({"status": "completed"}))
    }
}

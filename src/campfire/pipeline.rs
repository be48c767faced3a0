use serde_json::{Map, Value};

use crate::torch::Torch;

/// Output recorded for one executed step, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub step: String,
    pub output: Value,
}

/// Context threaded through one pipeline run: the inbound torch plus the
/// outputs of the steps executed so far.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub torch: Torch,
    pub outputs: Vec<StepOutput>,
}

impl PipelineContext {
    pub fn new(torch: Torch) -> Self {
        Self {
            torch,
            outputs: Vec::new(),
        }
    }

    /// Collapses the recorded outputs into the response payload, keyed by
    /// step name. Later steps win when a name repeats (steps are addressed
    /// by position, names need not be unique).
    pub fn payload(&self) -> Value {
        let mut object = Map::new();
        for entry in &self.outputs {
            object.insert(entry.step.clone(), entry.output.clone());
        }
        Value::Object(object)
    }
}

use crate::campfire::{error::CampfireError, pipeline::PipelineContext};

/// Evaluates a step's `if` expression against the pipeline context.
///
/// The condition language itself is an external concern. The pipeline
/// treats an absent condition, and any evaluation error, as "execute the
/// step" so that a bad expression cannot lock a pipeline up.
pub trait ConditionEvaluatorPort: Send + Sync {
    fn evaluate(
        &self,
        condition: &str,
        context: &PipelineContext,
    ) -> Result<bool, CampfireError>;
}

/// Default evaluator preserving the historical behavior: every condition
/// passes.
#[derive(Default)]
pub struct AlwaysTrueEvaluator;

impl ConditionEvaluatorPort for AlwaysTrueEvaluator {
    fn evaluate(
        &self,
        _condition: &str,
        _context: &PipelineContext,
    ) -> Result<bool, CampfireError> {
        Ok(true)
    }
}

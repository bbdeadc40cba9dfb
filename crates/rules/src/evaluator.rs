//! The seam between the engine and whatever decides which rules fire.

use vigil_core::FiredRuleRecord;

use crate::facts::FactSnapshot;

/// Errors an evaluator may report for one cycle.
///
/// The engine logs them and carries on; they never reach the caller of
/// `evaluate`.
#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("Evaluation failed: {0}")]
    Failed(String),
}

/// Consumes the full current fact snapshot and returns the rules that fired.
///
/// Called with the engine's working memory locked; implementations must not
/// block on I/O.
pub trait RuleEvaluator: Send + Sync {
    fn evaluate(&self, snapshot: &FactSnapshot<'_>) -> Result<Vec<FiredRuleRecord>, EvaluatorError>;
}

impl<T: RuleEvaluator + ?Sized> RuleEvaluator for std::sync::Arc<T> {
    fn evaluate(&self, snapshot: &FactSnapshot<'_>) -> Result<Vec<FiredRuleRecord>, EvaluatorError> {
        (**self).evaluate(snapshot)
    }
}

/// Adapts a closure into a [`RuleEvaluator`].
pub struct FnEvaluator<F>(F);

/// Wrap a closure as an evaluator.
pub fn from_fn<F>(f: F) -> FnEvaluator<F>
where
    F: Fn(&FactSnapshot<'_>) -> Result<Vec<FiredRuleRecord>, EvaluatorError> + Send + Sync,
{
    FnEvaluator(f)
}

impl<F> RuleEvaluator for FnEvaluator<F>
where
    F: Fn(&FactSnapshot<'_>) -> Result<Vec<FiredRuleRecord>, EvaluatorError> + Send + Sync,
{
    fn evaluate(&self, snapshot: &FactSnapshot<'_>) -> Result<Vec<FiredRuleRecord>, EvaluatorError> {
        (self.0)(snapshot)
    }
}

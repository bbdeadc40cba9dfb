//! Routes fired rules to their action handlers.
//!
//! The router receives an action request and runs every handler
//! configured for the fired rule. Individual handler failures don't
//! block other handlers.

use std::collections::HashMap;
use std::sync::Arc;

use vigil_core::{ActionRequest, RuleId};

use crate::traits::{ActionHandler, ExecutionResult};

/// Runs action handlers, organized per-rule.
#[derive(Default)]
pub struct ActionRouter {
    /// Rule ID → handlers for that rule.
    rule_handlers: HashMap<RuleId, Vec<Arc<dyn ActionHandler>>>,
    /// Fallback handlers used when no rule-specific handlers exist.
    default_handlers: Vec<Arc<dyn ActionHandler>>,
}

impl ActionRouter {
    /// Create a router with per-rule handler mapping.
    pub fn new(rule_handlers: HashMap<RuleId, Vec<Arc<dyn ActionHandler>>>) -> Self {
        Self {
            rule_handlers,
            default_handlers: Vec::new(),
        }
    }

    /// Create an empty router. Every fired rule is dropped with a debug log.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a router with handlers shared across all rules.
    pub fn with_defaults(handlers: Vec<Arc<dyn ActionHandler>>) -> Self {
        Self {
            rule_handlers: HashMap::new(),
            default_handlers: handlers,
        }
    }

    /// Replace all handlers for a specific rule.
    pub fn set_rule_handlers(&mut self, rule_id: RuleId, handlers: Vec<Arc<dyn ActionHandler>>) {
        self.rule_handlers.insert(rule_id, handlers);
    }

    /// Remove handlers for a rule; it falls back to the defaults afterwards.
    pub fn remove_rule(&mut self, rule_id: &RuleId) {
        self.rule_handlers.remove(rule_id);
    }

    fn handlers_for(&self, rule_id: &RuleId) -> &[Arc<dyn ActionHandler>] {
        self.rule_handlers
            .get(rule_id)
            .map(Vec::as_slice)
            .unwrap_or(&self.default_handlers)
    }

    /// Run every handler configured for the request's rule, in order.
    pub async fn route(&self, request: &ActionRequest) -> Vec<ExecutionResult> {
        let rule_id = request.rule_id();
        let handlers = self.handlers_for(rule_id);

        if handlers.is_empty() {
            tracing::debug!(rule_id = %rule_id, "No action handlers configured");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(handlers.len());

        for handler in handlers {
            let start = std::time::Instant::now();
            let result = handler.execute(request).await;
            let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            let (success, error) = match result {
                Ok(()) => {
                    tracing::debug!(
                        rule_id = %rule_id,
                        handler = handler.handler_name(),
                        duration_ms,
                        "Action executed"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        rule_id = %rule_id,
                        tenant = %request.tenant_id,
                        handler = handler.handler_name(),
                        error = %e,
                        duration_ms,
                        "Action execution failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(ExecutionResult {
                handler: handler.handler_name().to_string(),
                rule_id: rule_id.clone(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }
}

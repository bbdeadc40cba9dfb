//! Handler that records fired rules in the log stream.

use vigil_core::ActionRequest;

use crate::traits::{ActionError, ActionHandler};

/// Logs every fired rule at `info` level. Used as the default action
/// channel when nothing else is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogActionHandler;

#[async_trait::async_trait]
impl ActionHandler for LogActionHandler {
    async fn execute(&self, request: &ActionRequest) -> Result<(), ActionError> {
        let Some(trigger) = &request.trigger else {
            tracing::info!(
                tenant = %request.tenant_id,
                rule_id = %request.record.rule_id,
                fired_at = %request.record.fired_at.to_rfc3339(),
                "rule fired"
            );
            return Ok(());
        };

        let reading = serde_json::to_string(&trigger.reading)
            .map_err(|e| ActionError::Delivery(format!("failed to serialize reading: {e}")))?;
        tracing::info!(
            tenant = %request.tenant_id,
            rule_id = %request.record.rule_id,
            fired_at = %request.record.fired_at.to_rfc3339(),
            source_id = %trigger.source_id,
            arrival_ms = trigger.arrival_millis,
            reading = %reading,
            "rule fired"
        );
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "log"
    }
}

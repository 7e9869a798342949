use super::TransitionStep;
use crate::cancel::cancellable;
use crate::context::TransitionContext;
use async_trait::async_trait;
use segue_core::{FailureCode, TransitionError, TransitionStatus};
use tokio_util::sync::CancellationToken;

/// Waits on the external activation gate, bounded by the request's timeout
#[derive(Debug, Default, Clone, Copy)]
pub struct GateWaitStep;

#[async_trait]
impl TransitionStep for GateWaitStep {
    fn name(&self) -> &'static str {
        "wait-for-gate"
    }

    async fn execute(&self, ctx: &mut TransitionContext, cancel: &CancellationToken) -> Result<(), TransitionError> {
        ctx.emit(TransitionStatus::WaitingForServer);

        let Some(gate) = ctx.gate().cloned() else {
            return Err(TransitionError::new(
                FailureCode::InitializationCrashed,
                "activation gate requested but no gate is configured",
            ));
        };
        let id = ctx.request().gate_id();
        let limit = ctx.request().activation_gate_timeout;
        tracing::debug!("Waiting for gate {} (timeout {:?})", id, limit);

        let wait = gate.wait(&id, limit, cancel);
        let outcome = match limit {
            Some(limit) => cancellable(cancel, format!("gate {id}"), tokio::time::timeout(limit, wait))
                .await?
                .map_err(|elapsed| {
                    TransitionError::new(
                        FailureCode::ServerTimeout,
                        format!("gate '{id}' did not open within {}ms", limit.as_millis()),
                    )
                    .with_cause(elapsed)
                })?,
            None => cancellable(cancel, format!("gate {id}"), wait).await?,
        };

        outcome.map_err(|e| TransitionError::from_collaborator(e, FailureCode::ServerRejected))
    }
}

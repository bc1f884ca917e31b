//! Reaper action execution.

use std::sync::Arc;
use std::time::Duration;

use reaper_policy::ReaperDecision;
use reaper_telemetry::{TraceContext, correlation_span};
use tracing::{Instrument, info, warn};

use crate::adapters::{ActionAdapter, ActionAdapters, ActionTarget, AdapterError, AdapterResult};
use crate::confirmations::Confirmation;
use crate::outcome::ActionOutcome;

/// Executes reaper decisions through the registered adapters.
#[derive(Debug, Clone)]
pub struct ReaperActionExecutor {
    adapters: ActionAdapters,
    timeout: Option<Duration>,
}

impl ReaperActionExecutor {
    /// Creates an executor bounding each adapter call by `timeout`.
    #[must_use]
    pub fn new(adapters: ActionAdapters, timeout: Option<Duration>) -> Self {
        Self { adapters, timeout }
    }

    /// Returns the per-call adapter timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Executes `decision` against `target`.
    ///
    /// Gated decisions without a valid confirmation return an
    /// `awaiting_confirmation` outcome and touch no adapter. Alert and throttle
    /// are retried once on failure; every other action gets a single attempt.
    pub async fn execute(
        &self,
        decision: &ReaperDecision,
        target: &ActionTarget,
        trace: &TraceContext,
        confirmation: Option<&Confirmation>,
    ) -> ActionOutcome {
        let action = decision.action();
        let confirmed = confirmation.is_some_and(Confirmation::is_valid);
        if decision.require_confirmation() && !confirmed {
            info!(
                %action,
                run_id = %target.run_id(),
                scope = %target.scope(),
                trace_id = %trace.trace_id(),
                span_id = %trace.span_id(),
                "reaper action awaiting confirmation"
            );
            return ActionOutcome::awaiting_confirmation(action);
        }

        let adapter = self.adapters.for_action(action);
        let max_attempts = if action.is_retryable() { 2 } else { 1 };
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.invoke(adapter, target, trace).await {
                Ok(()) => {
                    info!(
                        %action,
                        adapter = adapter.name(),
                        run_id = %target.run_id(),
                        scope = %target.scope(),
                        trace_id = %trace.trace_id(),
                        span_id = %trace.span_id(),
                        confirmed_by = confirmation.map(Confirmation::confirmed_by),
                        attempts,
                        "reaper action executed"
                    );
                    return ActionOutcome::completed(action, attempts);
                }
                Err(err) => {
                    warn!(
                        %action,
                        adapter = adapter.name(),
                        run_id = %target.run_id(),
                        scope = %target.scope(),
                        trace_id = %trace.trace_id(),
                        span_id = %trace.span_id(),
                        attempts,
                        error = %err,
                        "reaper action failed"
                    );
                    if attempts >= max_attempts {
                        return ActionOutcome::adapter_error(action, err.to_string(), attempts);
                    }
                }
            }
        }
    }

    async fn invoke(
        &self,
        adapter: &Arc<dyn ActionAdapter>,
        target: &ActionTarget,
        trace: &TraceContext,
    ) -> AdapterResult<()> {
        let call = adapter.apply(target, trace).instrument(correlation_span(trace));
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| AdapterError::TimedOut { limit })?,
            None => call.await,
        }
    }
}


#[cfg(test)]
mod tests {
    use reaper_primitives::{ReaperAction, RunId, Scope};
    use reaper_telemetry::TraceContextManager;

    use super::test_support::{Script, ScriptedAdapter};
    use super::*;

    fn target() -> (ActionTarget, TraceContext) {
        let run = RunId::new("run-1").unwrap();
        let trace = TraceContextManager::new().start(&run, None);
        (ActionTarget::new(run.clone(), Scope::Run(run)), trace)
    }

    fn executor_with(action: ReaperAction, adapter: Arc<ScriptedAdapter>) -> ReaperActionExecutor {
        let adapters = ActionAdapters::logging();
        let adapters = match action {
            ReaperAction::Alert => adapters.with_notifier(adapter),
            ReaperAction::Throttle => adapters.with_throttler(adapter),
            ReaperAction::Pause => adapters.with_pauser(adapter),
            ReaperAction::CancelRun => adapters.with_run_canceller(adapter),
            ReaperAction::TerminateSession => adapters.with_session_terminator(adapter),
        };
        ReaperActionExecutor::new(adapters, Some(Duration::from_millis(50)))
    }

    #[tokio::test]
    async fn executes_unconfirmed_pause_once() {
        let adapter = ScriptedAdapter::new(Script::Succeed);
        let executor = executor_with(ReaperAction::Pause, Arc::clone(&adapter));
        let (target, trace) = target();

        let outcome = executor
            .execute(&ReaperDecision::new(ReaperAction::Pause, false), &target, &trace, None)
            .await;
        assert!(outcome.executed());
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn destructive_actions_wait_for_confirmation() {
        let adapter = ScriptedAdapter::new(Script::Succeed);
        let executor = executor_with(ReaperAction::TerminateSession, Arc::clone(&adapter));
        let (target, trace) = target();
        let decision = ReaperDecision::new(ReaperAction::TerminateSession, false);

        let outcome = executor.execute(&decision, &target, &trace, None).await;
        assert_eq!(outcome.reason(), crate::OutcomeReason::AwaitingConfirmation);
        assert_eq!(adapter.calls(), 0);

        let blank = Confirmation::new("");
        let outcome = executor.execute(&decision, &target, &trace, Some(&blank)).await;
        assert_eq!(outcome.reason(), crate::OutcomeReason::AwaitingConfirmation);
        assert_eq!(adapter.calls(), 0);

        let approval = Confirmation::new("oncall");
        let outcome = executor.execute(&decision, &target, &trace, Some(&approval)).await;
        assert!(outcome.executed());
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn throttle_timeout_is_retried_once() {
        let adapter = ScriptedAdapter::new(Script::Hang);
        let executor = executor_with(ReaperAction::Throttle, Arc::clone(&adapter));
        let (target, trace) = target();

        let outcome = executor
            .execute(&ReaperDecision::new(ReaperAction::Throttle, false), &target, &trace, None)
            .await;
        assert_eq!(outcome.reason(), crate::OutcomeReason::AdapterError);
        assert!(!outcome.executed());
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(adapter.calls(), 2);
        assert!(outcome.detail().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn alert_recovers_on_retry() {
        let adapter = ScriptedAdapter::new(Script::FailOnce);
        let executor = executor_with(ReaperAction::Alert, Arc::clone(&adapter));
        let (target, trace) = target();

        let outcome = executor
            .execute(&ReaperDecision::fallback(), &target, &trace, None)
            .await;
        assert!(outcome.executed());
        assert_eq!(outcome.attempts(), 2);
    }

    #[tokio::test]
    async fn failed_cancel_is_never_retried() {
        let adapter = ScriptedAdapter::new(Script::Fail);
        let executor = executor_with(ReaperAction::CancelRun, Arc::clone(&adapter));
        let (target, trace) = target();

        let outcome = executor
            .execute(
                &ReaperDecision::new(ReaperAction::CancelRun, true),
                &target,
                &trace,
                Some(&Confirmation::new("oncall")),
            )
            .await;
        assert_eq!(outcome.reason(), crate::OutcomeReason::AdapterError);
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn failed_pause_is_not_retried() {
        let adapter = ScriptedAdapter::new(Script::Fail);
        let executor = executor_with(ReaperAction::Pause, Arc::clone(&adapter));
        let (target, trace) = target();

        let outcome = executor
            .execute(&ReaperDecision::new(ReaperAction::Pause, false), &target, &trace, None)
            .await;
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(adapter.calls(), 1);
    }
}

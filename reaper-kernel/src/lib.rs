//! Anomaly reaper kernel.
//!
//! [`ReaperEngine`] is the single entry point: it validates a signal, attaches
//! the run's trace context, consults suppression, and only for admitted
//! signals resolves a policy decision and hands it to the executor.

#![warn(missing_docs, clippy::pedantic)]

pub mod adapters;
mod confirmations;
mod executor;
mod history;
mod outcome;
mod restrictions;

use std::sync::Arc;

use reaper_config::{ConfigError, EngineConfig, ReaperPolicy};
use reaper_policy::{PolicyEngine, StaticPolicyEngine, SuppressionController};
use reaper_primitives::{AnomalySignal, Clock, ConfirmationId, LineageId, RunId, SystemClock};
use reaper_telemetry::{TraceContext, TraceContextManager};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use adapters::{
    ActionAdapter, ActionAdapters, ActionTarget, AdapterError, AdapterResult, LoggingAdapter,
};
pub use confirmations::{Confirmation, ConfirmationError, ConfirmationStore, PendingConfirmation};
pub use executor::ReaperActionExecutor;
pub use history::{ActionHistory, ActionRecord};
pub use outcome::{ActionOutcome, OutcomeReason};
pub use restrictions::SessionRestrictions;

/// Errors surfaced by the engine. Adapter failures are never errors; they are
/// reported as `adapter_error` outcomes.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The signal was malformed and never reached suppression.
    #[error(transparent)]
    InvalidSignal(#[from] reaper_primitives::Error),
    /// The configuration failed validation at construction.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A confirmation id was unknown or expired.
    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
    /// The supplied confirmation does not name an operator.
    #[error("confirmation must name the approving operator")]
    InvalidConfirmation,
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Anomaly-response engine owning its configuration and all mutable state.
#[derive(Debug)]
pub struct ReaperEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    traces: TraceContextManager,
    suppression: SuppressionController,
    policy: Arc<dyn PolicyEngine>,
    executor: ReaperActionExecutor,
    confirmations: ConfirmationStore,
    history: ActionHistory,
}

impl ReaperEngine {
    /// Builds an engine from a configuration and an adapter set.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the configuration is invalid; the
    /// engine refuses to start rather than guess.
    pub fn new(config: EngineConfig, adapters: ActionAdapters) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            clock: Arc::new(SystemClock),
            traces: TraceContextManager::new(),
            suppression: SuppressionController::from_config(&config),
            policy: Arc::new(StaticPolicyEngine::from_config(&config)),
            executor: ReaperActionExecutor::new(adapters, config.adapter_timeout()),
            confirmations: ConfirmationStore::new(config.confirmation_ttl()),
            history: ActionHistory::new(config.history_capacity()),
            config,
        })
    }

    /// Replaces the clock used for validation and confirmation expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the table-driven policy engine.
    #[must_use]
    pub fn with_policy_engine(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the trace context manager.
    #[must_use]
    pub fn traces(&self) -> &TraceContextManager {
        &self.traces
    }

    /// Returns the suppression controller.
    #[must_use]
    pub fn suppression(&self) -> &SuppressionController {
        &self.suppression
    }

    /// Returns the effective policy table.
    #[must_use]
    pub fn policies(&self) -> Vec<ReaperPolicy> {
        self.policy.policies()
    }

    /// Starts (or returns) the trace context for a run.
    pub fn start_run(&self, run_id: &RunId, lineage_id: Option<&LineageId>) -> TraceContext {
        self.traces.start(run_id, lineage_id)
    }

    /// Discards the trace context of a finished run.
    pub fn end_run(&self, run_id: &RunId) {
        self.traces.end(run_id);
    }

    /// Processes one anomaly signal.
    ///
    /// Suppression state is committed before any policy or adapter work, so a
    /// failed adapter call never re-opens the cooldown.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSignal`] for malformed signals. Every
    /// other path yields an [`ActionOutcome`].
    pub async fn handle(&self, signal: AnomalySignal) -> EngineResult<ActionOutcome> {
        signal.validate(self.clock.now(), self.config.max_clock_skew())?;

        let root = self.traces.start(signal.run_id(), signal.lineage_id());
        let verdict = self.suppression.evaluate(&signal);
        if let Some(denial) = verdict.denial() {
            debug!(
                kind = %signal.kind(),
                run_id = %signal.run_id(),
                trace_id = %root.trace_id(),
                %denial,
                "signal suppressed"
            );
            let outcome = ActionOutcome::suppressed(denial.to_string());
            self.record(&signal, &root, outcome.clone()).await;
            return Ok(outcome);
        }

        if !self.config.reaper_enabled() {
            debug!(
                kind = %signal.kind(),
                run_id = %signal.run_id(),
                trace_id = %root.trace_id(),
                "reaper disabled; admission recorded without action"
            );
            let outcome = ActionOutcome::suppressed("reaper disabled");
            self.record(&signal, &root, outcome.clone()).await;
            return Ok(outcome);
        }
        let decision = self.policy.resolve(&signal);

        let trace = match self.traces.child_span(signal.run_id()) {
            Ok(span_id) => root.child(span_id),
            Err(err) => {
                warn!(error = %err, "run ended mid-signal; acting under the root span");
                root
            }
        };
        let target = ActionTarget::new(signal.run_id().clone(), signal.scope());
        info!(
            kind = %signal.kind(),
            severity = ?signal.severity(),
            action = %decision.action(),
            run_id = %target.run_id(),
            scope = %target.scope(),
            trace_id = %trace.trace_id(),
            span_id = %trace.span_id(),
            "signal admitted"
        );

        let mut outcome = self.executor.execute(&decision, &target, &trace, None).await;
        if outcome.reason() == OutcomeReason::AwaitingConfirmation {
            let id = self.confirmations.register(
                signal.kind().clone(),
                signal.severity(),
                decision,
                target,
                trace.clone(),
                self.clock.now(),
            );
            outcome = outcome.with_confirmation_id(id);
        }

        self.record(&signal, &trace, outcome.clone()).await;
        Ok(outcome)
    }

    /// Executes a parked action with operator approval.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfirmation`] for blank approvals (the
    /// entry stays parked), and [`EngineError::Confirmation`] when the id is
    /// unknown or expired.
    pub async fn confirm(
        &self,
        id: ConfirmationId,
        confirmation: &Confirmation,
    ) -> EngineResult<ActionOutcome> {
        if !confirmation.is_valid() {
            return Err(EngineError::InvalidConfirmation);
        }
        let pending = self.confirmations.take(id, self.clock.now())?;
        info!(
            confirmation_id = %id,
            confirmed_by = confirmation.confirmed_by(),
            action = %pending.decision().action(),
            run_id = %pending.target().run_id(),
            trace_id = %pending.trace().trace_id(),
            "executing confirmed reaper action"
        );
        let outcome = self
            .executor
            .execute(
                pending.decision(),
                pending.target(),
                pending.trace(),
                Some(confirmation),
            )
            .await
            .with_confirmation_id(id);

        self.history
            .push(ActionRecord::new(
                pending.kind().clone(),
                pending.severity(),
                pending.target().run_id().clone(),
                pending.target().scope().clone(),
                Some(pending.trace().trace_id().to_owned()),
                outcome.clone(),
                self.clock.now(),
            ))
            .await;
        Ok(outcome)
    }

    /// Discards a parked action.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Confirmation`] when the id is unknown.
    pub fn reject(&self, id: ConfirmationId) -> EngineResult<PendingConfirmation> {
        let pending = self.confirmations.reject(id)?;
        info!(
            confirmation_id = %id,
            action = %pending.decision().action(),
            "parked action rejected"
        );
        Ok(pending)
    }

    /// Returns live parked actions, oldest first.
    #[must_use]
    pub fn pending_confirmations(&self) -> Vec<PendingConfirmation> {
        self.confirmations.pending(self.clock.now())
    }

    /// Returns up to `limit` of the newest action records.
    pub async fn history(&self, run_id: Option<&RunId>, limit: usize) -> Vec<ActionRecord> {
        self.history.recent(run_id, limit).await
    }

    /// Clears traces, suppression state, parked actions, and history.
    pub async fn shutdown(&self) {
        self.traces.clear();
        self.suppression.reset_all();
        self.confirmations.clear();
        self.history.clear().await;
        info!("reaper engine state cleared");
    }

    async fn record(&self, signal: &AnomalySignal, trace: &TraceContext, outcome: ActionOutcome) {
        self.history
            .push(ActionRecord::new(
                signal.kind().clone(),
                signal.severity(),
                signal.run_id().clone(),
                signal.scope(),
                Some(trace.trace_id().to_owned()),
                outcome,
                self.clock.now(),
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use reaper_primitives::{ManualClock, ReaperAction, Scope, Severity, SignalKind};

    use super::executor::test_support::{Script, ScriptedAdapter};
    use super::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap()
    }

    fn run(id: &str) -> RunId {
        RunId::new(id).unwrap()
    }

    fn engine(
        config: EngineConfig,
        adapters: ActionAdapters,
    ) -> (ReaperEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = ReaperEngine::new(config, adapters)
            .unwrap()
            .with_clock(Arc::clone(&clock) as Arc<dyn Clock>);
        (engine, clock)
    }

    fn signal(kind: SignalKind, at: DateTime<Utc>) -> AnomalySignal {
        AnomalySignal::new(kind, Severity::Critical, run("run-1"), at)
    }

    #[tokio::test]
    async fn invalid_signals_are_rejected_before_suppression() {
        let (engine, _) = engine(EngineConfig::default(), ActionAdapters::logging());
        let future = signal(SignalKind::TokenSpike, start() + chrono::Duration::hours(2));

        let err = engine.handle(future.clone()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidSignal(_)));
        assert!(
            engine
                .suppression()
                .snapshot(future.kind(), &future.scope())
                .is_none()
        );
        assert!(engine.history(None, 10).await.is_empty());
    }

    #[tokio::test]
    async fn suppressed_signals_never_reach_adapters() {
        let pauser = ScriptedAdapter::new(Script::Succeed);
        let adapters = ActionAdapters::logging().with_pauser(pauser.clone());
        let (engine, _) = engine(EngineConfig::default(), adapters);

        let first = engine.handle(signal(SignalKind::ErrorBurst, start())).await.unwrap();
        assert!(first.executed());
        let second = engine
            .handle(signal(SignalKind::ErrorBurst, start() + chrono::Duration::minutes(1)))
            .await
            .unwrap();
        assert_eq!(second.reason(), OutcomeReason::Suppressed);
        assert_eq!(second.action(), None);
        assert!(second.detail().unwrap().contains("cooldown"));
        assert_eq!(pauser.calls(), 1);
    }

    #[tokio::test]
    async fn adapter_failure_does_not_reopen_cooldown() {
        let pauser = ScriptedAdapter::new(Script::Fail);
        let adapters = ActionAdapters::logging().with_pauser(pauser.clone());
        let (engine, _) = engine(EngineConfig::default(), adapters);

        let first = engine.handle(signal(SignalKind::ErrorBurst, start())).await.unwrap();
        assert_eq!(first.reason(), OutcomeReason::AdapterError);
        let again = engine.handle(signal(SignalKind::ErrorBurst, start())).await.unwrap();
        assert_eq!(again.reason(), OutcomeReason::Suppressed);
        assert_eq!(pauser.calls(), 1);
    }

    #[tokio::test]
    async fn kill_switch_records_admission_without_acting() {
        let notifier = ScriptedAdapter::new(Script::Succeed);
        let terminator = ScriptedAdapter::new(Script::Succeed);
        let adapters = ActionAdapters::logging()
            .with_notifier(notifier.clone())
            .with_session_terminator(terminator.clone());
        let config = EngineConfig::default().with_reaper_enabled(false);
        let (engine, _) = engine(config, adapters);

        let outcome = engine.handle(signal(SignalKind::CostSpike, start())).await.unwrap();
        assert_eq!(outcome.reason(), OutcomeReason::Suppressed);
        assert_eq!(outcome.action(), None);
        assert_eq!(outcome.detail(), Some("reaper disabled"));
        assert_eq!(notifier.calls(), 0);
        assert_eq!(terminator.calls(), 0);
        assert!(engine.pending_confirmations().is_empty());

        let again = engine.handle(signal(SignalKind::CostSpike, start())).await.unwrap();
        assert_ne!(again.detail(), Some("reaper disabled"));
        assert_eq!(engine.history(None, 10).await.len(), 2);
    }

    #[tokio::test]
    async fn confirmation_lifecycle() {
        let canceller = ScriptedAdapter::new(Script::Succeed);
        let adapters = ActionAdapters::logging().with_run_canceller(canceller.clone());
        let (engine, clock) = engine(EngineConfig::default(), adapters);

        let parked = engine.handle(signal(SignalKind::ToolLoop, start())).await.unwrap();
        assert_eq!(parked.reason(), OutcomeReason::AwaitingConfirmation);
        let id = parked.confirmation_id().unwrap();
        assert_eq!(engine.pending_confirmations().len(), 1);

        let blank = engine.confirm(id, &Confirmation::new(" ")).await;
        assert!(matches!(blank, Err(EngineError::InvalidConfirmation)));
        assert_eq!(canceller.calls(), 0);

        clock.advance(Duration::from_secs(60));
        let outcome = engine.confirm(id, &Confirmation::new("oncall")).await.unwrap();
        assert!(outcome.executed());
        assert_eq!(outcome.confirmation_id(), Some(id));
        assert_eq!(canceller.calls(), 1);

        let replay = engine.confirm(id, &Confirmation::new("oncall")).await;
        assert!(matches!(
            replay,
            Err(EngineError::Confirmation(ConfirmationError::NotFound(_)))
        ));
        assert_eq!(canceller.calls(), 1);
        assert!(engine.pending_confirmations().is_empty());
    }

    #[tokio::test]
    async fn expired_confirmations_cannot_execute() {
        let terminator = ScriptedAdapter::new(Script::Succeed);
        let adapters = ActionAdapters::logging().with_session_terminator(terminator.clone());
        let config = EngineConfig::default().with_confirmation_ttl(Duration::from_secs(300));
        let (engine, clock) = engine(config, adapters);

        let parked = engine.handle(signal(SignalKind::CostSpike, start())).await.unwrap();
        let id = parked.confirmation_id().unwrap();

        clock.advance(Duration::from_secs(301));
        let err = engine.confirm(id, &Confirmation::new("oncall")).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Confirmation(ConfirmationError::Expired { .. })
        ));
        assert!(engine.pending_confirmations().is_empty());
        assert_eq!(terminator.calls(), 0);
    }

    #[tokio::test]
    async fn reject_discards_parked_action() {
        let (engine, _) = engine(EngineConfig::default(), ActionAdapters::logging());
        let parked = engine.handle(signal(SignalKind::ToolLoop, start())).await.unwrap();
        let id = parked.confirmation_id().unwrap();

        let pending = engine.reject(id).unwrap();
        assert_eq!(pending.decision().action(), ReaperAction::CancelRun);
        assert!(engine.reject(id).is_err());
    }

    #[tokio::test]
    async fn adapters_receive_child_span_of_run_trace() {
        let (engine, _) = engine(EngineConfig::default(), ActionAdapters::logging());
        let lineage = LineageId::new("session-7").unwrap();
        let root = engine.start_run(&run("run-1"), Some(&lineage));

        let parked = engine
            .handle(signal(SignalKind::CostSpike, start()).with_lineage(lineage))
            .await
            .unwrap();
        let pending = engine.pending_confirmations();
        let trace = pending[0].trace();
        assert_eq!(pending[0].id(), parked.confirmation_id().unwrap());
        assert_eq!(trace.trace_id(), root.trace_id());
        assert_eq!(trace.parent_span_id(), Some(root.span_id()));

        let history = engine.history(Some(&run("run-1")), 10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].trace_id(), Some(root.trace_id()));
        assert_eq!(history[0].scope(), &Scope::Run(run("run-1")));
    }

    #[tokio::test]
    async fn shutdown_clears_state() {
        let (engine, _) = engine(EngineConfig::default(), ActionAdapters::logging());
        engine.handle(signal(SignalKind::ToolLoop, start())).await.unwrap();
        engine.handle(signal(SignalKind::TokenSpike, start())).await.unwrap();

        engine.shutdown().await;
        assert!(engine.traces().is_empty());
        assert!(engine.pending_confirmations().is_empty());
        assert!(engine.history(None, 10).await.is_empty());
        assert!(
            engine
                .handle(signal(SignalKind::TokenSpike, start()))
                .await
                .unwrap()
                .executed()
        );
    }

    #[test]
    fn invalid_config_refuses_to_start() {
        let config = EngineConfig::default().with_confirmation_ttl(Duration::ZERO);
        assert!(matches!(
            ReaperEngine::new(config, ActionAdapters::logging()),
            Err(EngineError::Config(_))
        ));
    }
}

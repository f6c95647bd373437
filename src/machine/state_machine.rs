// Public authentication state machine
//
// Holds the current AuthState and, for each accepted event, drives the
// matching internal machine to Complete or Cancel before applying the result.
// Concurrent `handle` calls queue on a fair async mutex and run one at a time.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{error, info, warn, Instrument};

use crate::account::{AccountService, DeviceConfig};
use crate::config::{AuthLifecycleConfig, MachineConfig, MAX_NOTIFICATION_CAPACITY};
use crate::machine::error::AuthMachineError;
use crate::machine::executor::StepExecutor;
use crate::machine::internal::{InternalState, InternalTransition};
use crate::machine::table::{TransitionEntry, TransitionTable};
use crate::machine::types::{
    AuthEvent, AuthEventKind, AuthState, CancelReason, Resolution, StateChange,
    StateTransitionRecord, StepFailure, TransitionReport,
};
use crate::observability::{MachineMetrics, OperationTimer};
use crate::telemetry::{create_transition_span, generate_correlation_id};

/// How an internal machine run ended, before cancellation requests are applied
enum RunOutcome {
    Complete(AuthState),
    Cancel(CancelReason),
}

type CancelSlot = Mutex<Option<oneshot::Sender<()>>>;

fn lock_slot(slot: &CancelSlot) -> MutexGuard<'_, Option<oneshot::Sender<()>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cancel sender of the running transition.
///
/// The slot is emptied on drop, so a `handle` future dropped mid-step
/// leaves nothing behind for `cancel()` to find.
struct InFlight<'a> {
    slot: &'a CancelSlot,
}

impl<'a> InFlight<'a> {
    fn install(slot: &'a CancelSlot, cancel_tx: oneshot::Sender<()>) -> Self {
        *lock_slot(slot) = Some(cancel_tx);
        Self { slot }
    }

    /// An empty slot means cancel() took the sender during the run
    fn cancel_requested(&self) -> bool {
        lock_slot(self.slot).take().is_none()
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock_slot(self.slot).take();
    }
}

pub struct AuthStateMachine {
    table: &'static TransitionTable,
    executor: StepExecutor,
    config: MachineConfig,
    state: watch::Sender<AuthState>,
    // Held for the whole of a `handle` call; tokio's mutex is FIFO-fair
    run_lock: tokio::sync::Mutex<()>,
    in_flight: CancelSlot,
    notifier: broadcast::Sender<StateChange>,
    history: Mutex<VecDeque<StateTransitionRecord>>,
    metrics: MachineMetrics,
}

impl AuthStateMachine {
    /// Create a machine in `Uninitialized` with default limits
    pub fn new(service: Arc<dyn AccountService>, device: DeviceConfig) -> Self {
        Self::build(service, device, MachineConfig::default(), true)
    }

    pub fn with_config(service: Arc<dyn AccountService>, config: &AuthLifecycleConfig) -> Self {
        Self::build(
            service,
            config.device.clone(),
            config.machine.clone(),
            config.observability.metrics_enabled,
        )
    }

    fn build(
        service: Arc<dyn AccountService>,
        device: DeviceConfig,
        config: MachineConfig,
        metrics_enabled: bool,
    ) -> Self {
        let executor = StepExecutor::new(service, device).with_step_timeout(config.step_timeout());
        let (notifier, _) = broadcast::channel(
            config
                .notification_capacity
                .clamp(1, MAX_NOTIFICATION_CAPACITY),
        );

        Self {
            table: TransitionTable::standard(),
            executor,
            state: watch::Sender::new(AuthState::Uninitialized),
            run_lock: tokio::sync::Mutex::new(()),
            in_flight: Mutex::new(None),
            notifier,
            history: Mutex::new(VecDeque::with_capacity(config.history_limit.min(64))),
            metrics: MachineMetrics::new(metrics_enabled),
            config,
        }
    }

    /// Snapshot of the current public state. Never waits on a running transition.
    pub fn current_state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receiver that always holds the latest public state
    pub fn watch_state(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Notifications for every change of the public state
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.notifier.subscribe()
    }

    /// Events the current state accepts
    pub fn accepted_events(&self) -> Vec<AuthEventKind> {
        self.table.events_for(self.current_state().kind())
    }

    /// True while a `handle` call holds the machine
    pub fn is_busy(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    pub fn history(&self) -> Vec<StateTransitionRecord> {
        self.lock_history().iter().cloned().collect()
    }

    pub fn metrics(&self) -> &MachineMetrics {
        &self.metrics
    }

    pub fn device(&self) -> &DeviceConfig {
        self.executor.device()
    }

    /// Cancel the transition that is currently running.
    ///
    /// Returns false if nothing was running or it was already cancelled.
    /// Queued `handle` calls are not affected and run once the lock is free.
    pub fn cancel(&self) -> bool {
        match lock_slot(&self.in_flight).take() {
            Some(cancel_tx) => {
                self.metrics.record_cancellation_requested();
                // The run may have just finished; it still sees the empty slot
                let _ = cancel_tx.send(());
                info!("Cancellation requested for in-flight transition");
                true
            }
            None => false,
        }
    }

    /// Process one public event.
    ///
    /// Waits for earlier calls to finish, then drives the internal machine for
    /// (current state, event) to its outcome. Failed account-service calls
    /// are reported through the returned [`TransitionReport`]; `Err` is only
    /// returned for rejected events and internal machine defects, and never
    /// changes the state.
    pub async fn handle(&self, event: AuthEvent) -> Result<TransitionReport, AuthMachineError> {
        let _guard = self.run_lock.lock().await;

        let previous = self.current_state();
        let correlation_id = generate_correlation_id();
        let entry = self.table.lookup(&previous, &event);
        let span = create_transition_span(
            &previous.to_string(),
            &event.to_string(),
            entry.map(|entry| entry.machine),
            &correlation_id,
        );

        self.run(previous, event, entry, correlation_id)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        previous: AuthState,
        event: AuthEvent,
        entry: Option<&TransitionEntry>,
        correlation_id: String,
    ) -> Result<TransitionReport, AuthMachineError> {
        self.metrics.record_event();

        let Some(entry) = entry else {
            self.metrics.record_invalid_transition();
            warn!("Event is not accepted in the current state");
            return Err(AuthMachineError::InvalidTransition {
                state: previous,
                event: event.kind(),
            });
        };

        let timer = OperationTimer::new("auth_transition");

        // Zero-step transitions get no cancel slot and cannot resolve as Requested
        let (result, cancel_requested) = match entry.start(&event) {
            Ok(InternalTransition::Process(first)) => {
                let (cancel_tx, cancel_rx) = oneshot::channel();
                let in_flight = InFlight::install(&self.in_flight, cancel_tx);
                let result = self.drive(entry.machine, first, cancel_rx).await;
                (result, in_flight.cancel_requested())
            }
            Ok(InternalTransition::Complete(next)) => (Ok((RunOutcome::Complete(next), 0)), false),
            Ok(InternalTransition::Cancel) => {
                (Ok((RunOutcome::Cancel(CancelReason::Aborted), 0)), false)
            }
            Err(err) => (Err(err), false),
        };
        let duration = timer.finish();

        let (outcome, steps) = match result {
            Ok(run) => run,
            Err(err) => {
                self.metrics.record_protocol_defect();
                error!(error = %err, "Internal machine defect, state left unchanged");
                return Err(err);
            }
        };

        let outcome = if cancel_requested {
            RunOutcome::Cancel(CancelReason::Requested)
        } else {
            outcome
        };

        let (state, resolution) = match outcome {
            RunOutcome::Complete(next) => (next, Resolution::Completed),
            RunOutcome::Cancel(reason) => (previous.clone(), Resolution::Cancelled(reason)),
        };

        match &resolution {
            Resolution::Completed => {
                self.metrics.record_completed();
                info!(next = %state, steps, "Transition completed");
            }
            Resolution::Cancelled(reason) => {
                self.metrics.record_cancelled();
                match reason {
                    CancelReason::StepFailed(failure) => warn!(
                        step = failure.step,
                        error = %failure.error,
                        steps,
                        "Transition cancelled after failed call"
                    ),
                    CancelReason::Requested => info!(steps, "Transition cancelled on request"),
                    CancelReason::Aborted => info!(steps, "Transition aborted"),
                }
            }
        }

        if state != previous {
            self.apply(&previous, &state, event.kind(), steps, duration.as_millis() as u64);
        }

        Ok(TransitionReport {
            previous,
            state,
            resolution,
            steps,
            correlation_id,
        })
    }

    /// Run the internal machine until it completes or cancels
    async fn drive(
        &self,
        machine: &'static str,
        first: InternalState,
        mut cancel_rx: oneshot::Receiver<()>,
    ) -> Result<(RunOutcome, usize), AuthMachineError> {
        let mut transition = InternalTransition::Process(first);
        let mut steps = 0;
        let mut last_failure: Option<StepFailure> = None;

        loop {
            let internal = match transition {
                InternalTransition::Complete(next) => return Ok((RunOutcome::Complete(next), steps)),
                InternalTransition::Cancel => {
                    let reason = last_failure
                        .map(CancelReason::StepFailed)
                        .unwrap_or(CancelReason::Aborted);
                    return Ok((RunOutcome::Cancel(reason), steps));
                }
                InternalTransition::Process(internal) => internal,
            };

            if steps >= self.config.max_internal_steps {
                return Err(AuthMachineError::StepLimitExceeded {
                    machine,
                    limit: self.config.max_internal_steps,
                });
            }
            steps += 1;

            let step_event = tokio::select! {
                biased;
                _ = &mut cancel_rx => {
                    return Ok((RunOutcome::Cancel(CancelReason::Requested), steps));
                }
                step_event = self.executor.execute(&internal) => step_event,
            };

            last_failure = step_event.error().map(|error| StepFailure {
                step: internal.name(),
                error: error.clone(),
            });
            if let Some(failure) = &last_failure {
                self.metrics.record_step_failure();
                warn!(step = failure.step, error = %failure.error, "Account call failed");
            }

            transition = internal.step(step_event)?;
        }
    }

    fn apply(
        &self,
        previous: &AuthState,
        current: &AuthState,
        event: AuthEventKind,
        steps: usize,
        duration_ms: u64,
    ) {
        self.state.send_replace(current.clone());

        if self.config.history_limit > 0 {
            let mut history = self.lock_history();
            while history.len() >= self.config.history_limit {
                history.pop_front();
            }
            history.push_back(StateTransitionRecord {
                from_state: previous.kind(),
                to_state: current.kind(),
                event,
                steps,
                timestamp: Utc::now(),
                duration_ms,
            });
        }

        // No receivers is not an error
        let _ = self.notifier.send(StateChange {
            previous: previous.clone(),
            current: current.clone(),
            event,
            at: Utc::now(),
        });

        info!(from = %previous, to = %current, "Auth state changed");
    }

    fn lock_history(&self) -> MutexGuard<'_, VecDeque<StateTransitionRecord>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for AuthStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStateMachine")
            .field("state", &self.current_state().kind())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

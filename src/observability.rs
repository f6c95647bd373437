use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Counters for one state machine instance
#[derive(Debug)]
pub struct MachineMetrics {
    enabled: AtomicBool,
    pub events_handled: AtomicU64,
    pub completed: AtomicU64,
    pub cancelled: AtomicU64,
    pub step_failures: AtomicU64,
    pub invalid_transitions: AtomicU64,
    pub protocol_defects: AtomicU64,
    pub cancellations_requested: AtomicU64,
}

impl Default for MachineMetrics {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MachineMetrics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            events_handled: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            step_failures: AtomicU64::new(0),
            invalid_transitions: AtomicU64::new(0),
            protocol_defects: AtomicU64::new(0),
            cancellations_requested: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn bump(&self, counter: &AtomicU64) {
        if self.is_enabled() {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_event(&self) {
        self.bump(&self.events_handled);
    }

    pub fn record_completed(&self) {
        self.bump(&self.completed);
    }

    pub fn record_cancelled(&self) {
        self.bump(&self.cancelled);
    }

    pub fn record_step_failure(&self) {
        self.bump(&self.step_failures);
    }

    pub fn record_invalid_transition(&self) {
        self.bump(&self.invalid_transitions);
    }

    pub fn record_protocol_defect(&self) {
        self.bump(&self.protocol_defects);
    }

    pub fn record_cancellation_requested(&self) {
        self.bump(&self.cancellations_requested);
    }

    pub fn get_stats(&self) -> MachineStats {
        MachineStats {
            events_handled: self.events_handled.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            step_failures: self.step_failures.load(Ordering::Relaxed),
            invalid_transitions: self.invalid_transitions.load(Ordering::Relaxed),
            protocol_defects: self.protocol_defects.load(Ordering::Relaxed),
            cancellations_requested: self.cancellations_requested.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Auth machine metrics: events={}, completed={}, cancelled={}, step_failures={}, invalid={}, defects={}, cancel_requests={}",
            stats.events_handled,
            stats.completed,
            stats.cancelled,
            stats.step_failures,
            stats.invalid_transitions,
            stats.protocol_defects,
            stats.cancellations_requested
        );
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachineStats {
    pub events_handled: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub step_failures: u64,
    pub invalid_transitions: u64,
    pub protocol_defects: u64,
    pub cancellations_requested: u64,
}

/// Time an operation and log its duration
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
        duration
    }
}

// Auth Lifecycle Library - account authentication state tracking
// This exposes the state machine, the account-service boundary and the
// ambient configuration and telemetry setup

pub mod account;
pub mod config;
pub mod machine;
pub mod observability;
pub mod telemetry;

// Re-export key types for easy access
pub use account::{
    AccountError, AccountService, AccountStatus, AuthorizationStatus, CallErrorKind,
    DeviceCapability, DeviceConfig, DeviceType, ScriptedAccountService,
};
pub use config::{AuthLifecycleConfig, MachineConfig, ObservabilityConfig};
pub use machine::{
    AuthEvent, AuthEventKind, AuthMachineError, AuthState, AuthStateKind, AuthStateMachine,
    CancelReason, RedirectError, Resolution, StateChange, StateTransitionRecord, StepFailure,
    TransitionReport, TransitionTable,
};
pub use observability::{MachineMetrics, MachineStats, OperationTimer};
pub use telemetry::{generate_correlation_id, init_telemetry};

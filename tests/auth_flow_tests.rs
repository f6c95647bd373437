// Integration tests for complete sign-in and sign-out flows

use auth_lifecycle::account::AccountCall;
use auth_lifecycle::{
    AccountError, AccountStatus, AuthEvent, AuthEventKind, AuthLifecycleConfig, AuthMachineError,
    AuthState, AuthStateKind, AuthStateMachine, AuthorizationStatus, DeviceCapability,
    DeviceConfig, DeviceType, ScriptedAccountService,
};
use std::sync::Arc;

fn machine_with(service: &Arc<ScriptedAccountService>) -> AuthStateMachine {
    let device = DeviceConfig::new(
        "Integration Phone",
        DeviceType::Mobile,
        vec![DeviceCapability::SendTab, DeviceCapability::CloseTabs],
    );
    AuthStateMachine::new(service.clone(), device)
}

#[tokio::test]
async fn test_full_oauth_sign_in_then_sign_out() {
    let service = Arc::new(ScriptedAccountService::new());
    service.set_oauth_url(Ok(
        "https://accounts.example.com/authorization?client_id=abc&state=xyz".to_string(),
    ));
    let machine = machine_with(&service);

    machine.handle(AuthEvent::GetAuthState).await.unwrap();
    assert_eq!(machine.current_state(), AuthState::NotAuthenticated);

    let report = machine
        .handle(AuthEvent::begin_oauth(&["profile", "sync"], "settings"))
        .await
        .unwrap();
    let oauth_url = report.state.oauth_url().unwrap().to_string();
    assert!(oauth_url.starts_with("https://accounts.example.com/authorization"));

    // The host navigates to oauth_url and is redirected back here
    let event = AuthEvent::from_oauth_redirect(
        "https://app.example.com/oauth/success?code=auth-code&state=xyz",
    )
    .unwrap();
    let report = machine.handle(event).await.unwrap();
    assert_eq!(report.state, AuthState::Authenticated);
    assert!(machine.current_state().is_authenticated());

    machine.handle(AuthEvent::Disconnect).await.unwrap();
    assert_eq!(machine.current_state(), AuthState::NotAuthenticated);

    assert_eq!(
        service.call_names(),
        vec![
            "get_auth_state",
            "begin_oauth_flow",
            "complete_oauth_flow",
            "initialize_device",
            "disconnect",
        ]
    );
    assert!(service.calls().contains(&AccountCall::InitializeDevice {
        name: "Integration Phone".to_string(),
        device_type: DeviceType::Mobile,
        capabilities: vec![DeviceCapability::SendTab, DeviceCapability::CloseTabs],
    }));
    assert!(service.calls().contains(&AccountCall::CompleteOAuthFlow {
        code: "auth-code".to_string(),
        state: "xyz".to_string(),
    }));

    let history: Vec<(AuthStateKind, AuthStateKind)> = machine
        .history()
        .iter()
        .map(|record| (record.from_state, record.to_state))
        .collect();
    assert_eq!(
        history,
        vec![
            (AuthStateKind::Uninitialized, AuthStateKind::NotAuthenticated),
            (AuthStateKind::NotAuthenticated, AuthStateKind::Authenticating),
            (AuthStateKind::Authenticating, AuthStateKind::Authenticated),
            (AuthStateKind::Authenticated, AuthStateKind::NotAuthenticated),
        ]
    );
}

#[tokio::test]
async fn test_restored_account_recovers_from_auth_issues() {
    let service = Arc::new(ScriptedAccountService::new());
    service.set_auth_state(Ok(AccountStatus::Authenticated));
    let machine = machine_with(&service);

    machine.handle(AuthEvent::GetAuthState).await.unwrap();
    assert_eq!(machine.current_state(), AuthState::Authenticated);

    // The host saw a 401 from some other API and asks the machine to check
    service.set_authorization(Ok(AuthorizationStatus { active: false }));
    machine
        .handle(AuthEvent::CheckAuthorizationStatus)
        .await
        .unwrap();
    assert_eq!(machine.current_state(), AuthState::AuthIssues);

    machine
        .handle(AuthEvent::begin_oauth(&["profile"], "reauth"))
        .await
        .unwrap();
    machine
        .handle(AuthEvent::CompleteOAuthFlow {
            code: "code".to_string(),
            state: "state".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(machine.current_state(), AuthState::Authenticated);
}

#[tokio::test]
async fn test_failed_token_exchange_allows_retry() {
    let service = Arc::new(ScriptedAccountService::new());
    let machine = machine_with(&service);
    machine.handle(AuthEvent::GetAuthState).await.unwrap();
    machine
        .handle(AuthEvent::begin_oauth(&["profile"], "menu"))
        .await
        .unwrap();
    let authenticating = machine.current_state();

    service.set_complete_oauth(Err(AccountError::Service {
        status: 400,
        message: "invalid code".to_string(),
    }));
    let complete = AuthEvent::CompleteOAuthFlow {
        code: "bad".to_string(),
        state: "state".to_string(),
    };
    let report = machine.handle(complete.clone()).await.unwrap();
    assert!(report.is_cancelled());
    assert_eq!(report.steps, 1);
    assert_eq!(machine.current_state(), authenticating);

    service.set_complete_oauth(Ok(()));
    let report = machine.handle(complete).await.unwrap();
    assert!(report.is_completed());
    assert_eq!(machine.current_state(), AuthState::Authenticated);
}

#[tokio::test]
async fn test_user_abandons_oauth_flow() {
    let service = Arc::new(ScriptedAccountService::new());
    let machine = machine_with(&service);
    machine.handle(AuthEvent::GetAuthState).await.unwrap();
    machine
        .handle(AuthEvent::begin_oauth(&["profile"], "menu"))
        .await
        .unwrap();

    machine.handle(AuthEvent::CancelOAuthFlow).await.unwrap();
    assert_eq!(machine.current_state(), AuthState::NotAuthenticated);

    // CompleteOAuthFlow arriving after the cancel is rejected
    let err = machine
        .handle(AuthEvent::CompleteOAuthFlow {
            code: "late".to_string(),
            state: "late".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AuthMachineError::InvalidTransition {
            state: AuthState::NotAuthenticated,
            event: AuthEventKind::CompleteOAuthFlow,
        }
    );
}

#[tokio::test]
async fn test_machine_built_from_config() {
    let mut config = AuthLifecycleConfig::default();
    config.device = DeviceConfig::new("Living Room TV", DeviceType::Tv, vec![]);
    config.observability.metrics_enabled = false;

    let service = Arc::new(ScriptedAccountService::new());
    let machine = AuthStateMachine::with_config(service.clone(), &config);

    assert_eq!(machine.device().name, "Living Room TV");
    machine.handle(AuthEvent::GetAuthState).await.unwrap();
    assert_eq!(machine.metrics().get_stats().events_handled, 0);
}

#[tokio::test]
async fn test_every_illegal_event_is_rejected_without_calls() {
    let service = Arc::new(ScriptedAccountService::new());
    let machine = machine_with(&service);
    machine.handle(AuthEvent::GetAuthState).await.unwrap();
    service.clear_calls();

    let illegal = [
        AuthEvent::GetAuthState,
        AuthEvent::CompleteOAuthFlow {
            code: "c".to_string(),
            state: "s".to_string(),
        },
        AuthEvent::CancelOAuthFlow,
        AuthEvent::CheckAuthorizationStatus,
        AuthEvent::Disconnect,
    ];
    for event in illegal {
        let kind = event.kind();
        let result = machine.handle(event).await;
        assert!(
            matches!(result, Err(AuthMachineError::InvalidTransition { .. })),
            "{kind} should be rejected in NotAuthenticated"
        );
    }

    assert_eq!(machine.current_state(), AuthState::NotAuthenticated);
    assert!(service.calls().is_empty());
}

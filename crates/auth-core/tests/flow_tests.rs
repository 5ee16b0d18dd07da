//! Route, login, logout, refresh and username flows against mock collaborators

mod common;

use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use common::{Harness, NOW};
use warden_auth_core::{
    AuthError, Context, Flow, FlowKind, LoginInput, ResponseType, RouteGuard, RouteKind, State,
    StateKind,
};

fn authenticated_subject(state: &State) -> Option<String> {
    match state {
        State::Authorized {
            context: Context::Authenticated { permit, .. },
        } => Some(permit.subject().to_string()),
        _ => None,
    }
}

#[tokio::test]
async fn test_private_route_without_session_redirects_to_login() {
    let harness = Harness::new();

    let response = harness.service.private_route_flow().run().await.unwrap();

    assert_eq!(response.response_type, ResponseType::RedirectToLoginPage);
    assert_eq!(*harness.service.state_manager().state(), State::Unauthorized);
    assert!(harness.service.can_run_flow());
    assert_eq!(harness.service.initial_flow(), Some(FlowKind::PrivateRoute));
}

#[tokio::test]
async fn test_private_route_restores_a_cached_session() {
    let harness = Harness::new();
    harness.seed_session("alice", NOW + 3600);

    let response = harness.service.private_route_flow().run().await.unwrap();

    assert_eq!(response.response_type, ResponseType::PassThroughPrivateRoute);
    let state = harness.service.state_manager().state();
    assert_eq!(authenticated_subject(&state).as_deref(), Some("alice"));
    assert_eq!(response.state.as_deref(), Some(&*state));
}

#[tokio::test]
async fn test_private_route_passes_through_a_committed_context() {
    let harness = Harness::new();
    harness.seed_session("alice", NOW + 3600);

    harness.service.private_route_flow().run().await.unwrap();
    let generation = harness.service.state_manager().generation();

    let response = harness.service.private_route_flow().run().await.unwrap();

    assert_eq!(response.response_type, ResponseType::PassThroughPrivateRoute);
    assert_eq!(harness.signer.calls(), 1);
    assert_eq!(harness.service.state_manager().generation(), generation);
}

#[tokio::test]
async fn test_private_route_does_not_accept_an_anonymous_context() {
    let harness = Harness::new();
    harness.service.state_manager().push_authorized_state(Context::Anonymous);

    let response = harness.service.private_route_flow().run().await.unwrap();

    assert_eq!(response.response_type, ResponseType::RedirectToLoginPage);
    assert_eq!(*harness.service.state_manager().state(), State::Unauthorized);
}

#[tokio::test]
async fn test_public_route_degrades_to_anonymous_on_expired_session() {
    let harness = Harness::new();
    harness.seed_session("alice", NOW - 5);

    let response = harness.service.public_route_flow().run().await.unwrap();

    assert_eq!(response.response_type, ResponseType::PassThroughPublicRoute);
    assert!(response.error.is_none());
    assert_eq!(
        *harness.service.state_manager().state(),
        State::Authorized { context: Context::Anonymous }
    );
}

#[tokio::test]
async fn test_public_route_accepts_any_valid_context() {
    let harness = Harness::new();
    harness.service.state_manager().push_authorized_state(Context::Anonymous);

    let response = harness.service.public_route_flow().run().await.unwrap();

    assert_eq!(response.response_type, ResponseType::PassThroughPublicRoute);
    assert_eq!(harness.signer.calls(), 0);
}

#[tokio::test]
async fn test_auth_route_shows_page_without_session() {
    let harness = Harness::new();

    let response = harness.service.auth_route_flow().run().await.unwrap();

    assert_eq!(response.response_type, ResponseType::PassThroughAuthRoute);
    assert_eq!(*harness.service.state_manager().state(), State::Unauthorized);
}

#[tokio::test]
async fn test_auth_route_sends_authenticated_users_away() {
    let harness = Harness::new();
    harness.seed_session("alice", NOW + 3600);

    let restored = harness.service.auth_route_flow().run().await.unwrap();
    assert_eq!(restored.response_type, ResponseType::RedirectToLastContentRoute);

    let again = harness.service.auth_route_flow().run().await.unwrap();
    assert_eq!(again.response_type, ResponseType::RedirectToLastContentRoute);
    assert_eq!(harness.signer.calls(), 1);
}

#[tokio::test]
async fn test_login_commits_and_persists_the_session() {
    let harness = Harness::new();

    let response = harness
        .service
        .login_flow(LoginInput::new("alice", "wonderland"))
        .run()
        .await
        .unwrap();

    assert_eq!(response.response_type, ResponseType::RedirectToLastContentRoute);
    let state = harness.service.state_manager().state();
    assert_eq!(authenticated_subject(&state).as_deref(), Some("alice"));

    let record = harness.stored_record().unwrap();
    assert_eq!(record.username, "alice");
    assert_eq!(record.expires, NOW + 3600);
    assert_eq!(Some(record.token.as_str()), state.context().and_then(Context::token));
}

#[tokio::test]
async fn test_login_failure_surfaces_the_error() {
    let harness = Harness::new();

    let err = harness
        .service
        .login_flow(LoginInput::new("alice", "looking-glass"))
        .run()
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::InvalidCredentials);
    assert_eq!(*harness.service.state_manager().state(), State::Unauthorized);
    assert!(harness.storage_is_empty());
    assert!(harness.service.can_run_flow());
}

#[tokio::test]
async fn test_logout_clears_storage_and_session() {
    let harness = Harness::new();
    harness
        .service
        .login_flow(LoginInput::new("alice", "wonderland"))
        .run()
        .await
        .unwrap();
    assert!(harness.stored_record().is_some());

    let response = harness.service.logout_flow().run().await.unwrap();

    assert_eq!(response.response_type, ResponseType::AwaitRedirect);
    assert!(harness.storage_is_empty());
    assert_eq!(*harness.service.state_manager().state(), State::Unauthorized);
}

#[tokio::test]
async fn test_refresh_context_success_and_failure() {
    let harness = Harness::new();
    harness.seed_session("alice", NOW + 3600);

    let response = harness.service.refresh_context_flow().run().await.unwrap();
    assert_eq!(response.response_type, ResponseType::Authorized);

    harness.signer.fail_with(AuthError::transport("signing service down"));
    let response = harness.service.refresh_context_flow().run().await.unwrap();

    assert_eq!(response.response_type, ResponseType::RedirectToLoginPage);
    assert_eq!(response.error, Some(AuthError::transport("signing service down")));
    assert_eq!(*harness.service.state_manager().state(), State::Unauthorized);
}

#[tokio::test]
async fn test_refresh_context_is_rejected_while_another_flow_runs() {
    let harness = Harness::new();
    let _running = harness.service.try_begin_flow(FlowKind::Login).unwrap();

    let err = harness.service.refresh_context_flow().run().await.unwrap_err();

    assert_eq!(
        err,
        AuthError::FlowAlreadyExecuting {
            running: FlowKind::Login,
            requested: FlowKind::RefreshContext,
        }
    );
    assert_eq!(harness.signer.calls(), 0);
}

#[tokio::test]
async fn test_check_username_runs_beside_other_flows() {
    let harness = Harness::new();
    let _running = harness.service.try_begin_flow(FlowKind::PrivateRoute).unwrap();

    let taken = harness.service.check_username_flow("alice").run().await.unwrap();
    let free = harness.service.check_username_flow("bob").run().await.unwrap();

    assert_eq!(taken.response_type, ResponseType::DuplicatedUsername);
    assert_eq!(free.response_type, ResponseType::AvailableUsername);
    assert_eq!(harness.service.current_flow(), Some(FlowKind::PrivateRoute));
}

#[tokio::test]
async fn test_a_flow_runs_once() {
    let harness = Harness::new();
    let mut flow = harness.service.auth_route_flow();

    flow.run().await.unwrap();
    let err = flow.run().await.unwrap_err();

    assert_eq!(err.code(), "InternalError");
}

#[tokio::test]
async fn test_concurrent_guards_authorize_once() {
    let harness = Harness::new();
    harness.seed_session("alice", NOW + 3600);
    let release = harness.signer.gate.arm();

    let first = {
        let service = harness.service.clone();
        tokio::spawn(async move { service.private_route_flow().run().await })
    };
    let second = {
        let service = harness.service.clone();
        tokio::spawn(async move { service.public_route_flow().run().await })
    };

    // Let both reach the signer or the flow slot.
    while harness.signer.calls() == 0 {
        tokio::task::yield_now().await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(harness.signer.calls(), 1);

    release.notify_one();

    let first = timeout(Duration::from_secs(5), first).await.unwrap().unwrap().unwrap();
    let second = timeout(Duration::from_secs(5), second).await.unwrap().unwrap().unwrap();

    assert_eq!(first.response_type, ResponseType::PassThroughPrivateRoute);
    assert_eq!(second.response_type, ResponseType::PassThroughPublicRoute);
    assert_eq!(harness.signer.calls(), 1);
}

#[tokio::test]
async fn test_abort_wins_over_recovery() {
    let harness = Harness::new();
    harness.seed_session("alice", NOW + 3600);
    let _release = harness.signer.gate.arm();
    let abort = CancellationToken::new();

    let task = {
        let service = harness.service.clone();
        let abort = abort.clone();
        tokio::spawn(async move { service.public_route_flow().with_abort(abort).run().await })
    };

    while harness.signer.calls() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(harness.service.state_manager().state().kind(), StateKind::Authorizing);

    abort.cancel();
    let err = timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap_err();

    // Public routes would recover to anonymous; an abort must not.
    assert!(err.is_aborted());
    assert_eq!(*harness.service.state_manager().state(), State::Unauthorized);
    assert!(harness.service.can_run_flow());
}

#[tokio::test]
async fn test_detached_guard_cancels_its_flow() {
    let harness = Harness::new();
    harness.seed_session("alice", NOW + 3600);
    let _release = harness.signer.gate.arm();

    let mut guard = RouteGuard::new(harness.service.clone(), RouteKind::Private);
    guard.attach();
    assert!(guard.is_attached());

    while harness.signer.calls() == 0 {
        tokio::task::yield_now().await;
    }

    guard.detach();
    assert!(!guard.is_attached());
    assert!(guard.outcome().await.unwrap_err().is_aborted());

    // The cancelled flow still unwinds the session it was negotiating.
    timeout(Duration::from_secs(5), async {
        while harness.service.state_manager().state().kind() != StateKind::Unauthorized
            || !harness.service.can_run_flow()
        {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(harness.service.initial_flow(), Some(FlowKind::PrivateRoute));
}

#[tokio::test]
async fn test_attached_guard_delivers_the_flow_response() {
    let harness = Harness::new();

    let mut guard = RouteGuard::new(harness.service.clone(), RouteKind::Auth);
    guard.attach();
    let response = timeout(Duration::from_secs(5), guard.outcome()).await.unwrap().unwrap();

    assert_eq!(response.response_type, ResponseType::PassThroughAuthRoute);
    assert!(!guard.is_attached());
}

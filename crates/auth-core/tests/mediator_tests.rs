//! Request gating and retry-after-reauthorization

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use common::{token, Harness, NOW};
use warden_auth_core::{
    AuthError, AuthMode, Context, Flow, FlowKind, LoginInput, Permit, PermitData,
    RequestCredentials, State, StateKind,
};

async fn logged_in() -> Harness {
    let harness = Harness::new();
    harness
        .service
        .login_flow(LoginInput::new("alice", "wonderland"))
        .run()
        .await
        .unwrap();
    harness
}

#[tokio::test]
async fn test_unauthorized_rejects_all_but_authenticator_requests() {
    let harness = Harness::new();
    let mediator = harness.service.mediator();
    let counter = AtomicUsize::new(0);
    let calls = &counter;

    for mode in [AuthMode::Public, AuthMode::Private] {
        let err = mediator
            .run_api_request(mode, move |_credentials| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "Api.NotAuthorized");
    }
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    let credentials = mediator
        .run_api_request(AuthMode::Authenticator, |credentials| async move { Ok(credentials) })
        .await
        .unwrap();
    assert_eq!(credentials, RequestCredentials::anonymous());
}

#[tokio::test]
async fn test_anonymous_context_allows_public_requests_only() {
    let harness = Harness::new();
    harness.service.state_manager().push_authorized_state(Context::Anonymous);
    let mediator = harness.service.mediator();

    let public = mediator
        .run_query("query Articles { articles { id } }", json!({}), AuthMode::Public)
        .await
        .unwrap();
    assert_eq!(public, json!({ "ok": true }));
    assert_eq!(harness.transport.seen()[0].token, None);

    let err = mediator
        .run_query("query Drafts { drafts { id } }", json!({}), AuthMode::Private)
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::NotAuthorized);
    assert_eq!(harness.transport.seen().len(), 1);
}

#[tokio::test]
async fn test_private_request_carries_the_context_token() {
    let harness = logged_in().await;
    let expected = harness
        .service
        .state_manager()
        .context()
        .and_then(|context| context.token().map(str::to_string));

    harness
        .service
        .mediator()
        .run_query("query Drafts { drafts { id } }", json!({}), AuthMode::Private)
        .await
        .unwrap();

    let seen = harness.transport.seen();
    let last = seen.last().unwrap();
    assert_eq!(last.auth_mode, AuthMode::Private);
    assert_eq!(last.token, expected);
}

#[tokio::test]
async fn test_rejected_private_request_is_retried_once_after_reauthorization() {
    let harness = logged_in().await;
    harness.clock.advance(60);
    harness.transport.script(Err(AuthError::ProviderNotAuthorized));
    harness.transport.script(Ok(json!({ "drafts": [] })));

    let result = harness
        .service
        .mediator()
        .run_query("query Drafts { drafts { id } }", json!({}), AuthMode::Private)
        .await
        .unwrap();

    assert_eq!(result, json!({ "drafts": [] }));
    assert_eq!(harness.signer.calls(), 1);

    let drafts: Vec<_> = harness
        .transport
        .seen()
        .into_iter()
        .filter(|request| request.query.contains("Drafts"))
        .collect();
    assert_eq!(drafts.len(), 2);
    assert_ne!(drafts[0].token, drafts[1].token);
    assert_eq!(
        drafts[1].token.as_deref(),
        harness.service.state_manager().context().as_ref().and_then(Context::token)
    );
}

#[tokio::test]
async fn test_second_rejection_is_terminal() {
    let harness = logged_in().await;
    harness.transport.script(Err(AuthError::ProviderNotAuthorized));
    harness.transport.script(Err(AuthError::ProviderNotAuthorized));
    harness.transport.script(Ok(json!({ "never": "reached" })));

    let attempts = Arc::new(AtomicUsize::new(0));
    let counted = attempts.clone();
    let transport = harness.transport.clone();
    let err = harness
        .service
        .mediator()
        .run_api_request(AuthMode::Private, move |credentials| {
            counted.fetch_add(1, Ordering::SeqCst);
            let transport = transport.clone();
            async move {
                use warden_auth_core::{ApiTransport, QueryRequest};
                let request = QueryRequest::new("query Drafts { drafts { id } }", AuthMode::Private)
                    .with_token(credentials.token);
                transport.run_query(request).await
            }
        })
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::ProviderNotAuthorized);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(harness.signer.calls(), 1);
}

#[tokio::test]
async fn test_failed_reauthorization_redirects_and_fails_the_request() {
    let harness = logged_in().await;
    harness.transport.script(Err(AuthError::ProviderNotAuthorized));
    harness.signer.fail_with(AuthError::transport("signing service down"));

    let err = harness
        .service
        .mediator()
        .run_query("query Drafts { drafts { id } }", json!({}), AuthMode::Private)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AuthError::ReauthorizationFailed {
            redirect: "/login".to_string()
        }
    );
    assert_eq!(harness.router.redirects(), vec!["/login".to_string()]);
    assert_eq!(*harness.service.state_manager().state(), State::Unauthorized);
}

#[tokio::test]
async fn test_reauthorize_refuses_to_nest() {
    let harness = logged_in().await;
    let _running = harness.service.try_begin_flow(FlowKind::RefreshContext).unwrap();

    let err = harness.service.mediator().reauthorize().await.unwrap_err();

    assert_eq!(err.code(), "InternalError");
    assert_eq!(harness.signer.calls(), 0);
}

#[tokio::test]
async fn test_requests_wait_while_authorizing() {
    let harness = Harness::new();
    let state_manager = harness.service.state_manager().clone();
    state_manager.push_authorizing_state(None);

    let waiting = {
        let mediator = harness.service.mediator();
        tokio::spawn(async move {
            mediator
                .run_api_request(AuthMode::Public, |credentials| async move { Ok(credentials) })
                .await
        })
    };

    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert!(!waiting.is_finished());

    // Still transient: keeps waiting
    state_manager.push_authorizing_state(None);
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert!(!waiting.is_finished());

    state_manager.push_authorized_state(Context::Anonymous);
    let credentials = timeout(Duration::from_secs(5), waiting)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(credentials.token, None);
}

#[tokio::test]
async fn test_waiting_request_fails_when_authorization_fails() {
    let harness = Harness::new();
    let state_manager = harness.service.state_manager().clone();
    state_manager.push_authorizing_state(None);

    let waiting = {
        let mediator = harness.service.mediator();
        tokio::spawn(async move {
            mediator
                .run_api_request(AuthMode::Private, |_credentials| async { Ok(()) })
                .await
        })
    };
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    state_manager.push_unauthorized_state();
    let err = timeout(Duration::from_secs(5), waiting)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert_eq!(err, AuthError::NotAuthorized);
}

#[tokio::test]
async fn test_authenticator_request_uses_the_transient_permit() {
    let harness = Harness::new();
    let permit = Permit::create(PermitData::new(token("alice", NOW, NOW + 600)), NOW).unwrap();
    harness
        .service
        .state_manager()
        .push_authorizing_state(Some(permit.clone()));

    let credentials = harness
        .service
        .mediator()
        .run_api_request(AuthMode::Authenticator, |credentials| async move { Ok(credentials) })
        .await
        .unwrap();

    assert_eq!(credentials.token.as_deref(), Some(permit.token()));
    assert_eq!(harness.service.state_manager().state().kind(), StateKind::Authorizing);
}

#[tokio::test]
async fn test_mediator_reads_and_awaits_state() {
    let harness = Harness::new();
    let mediator = harness.service.mediator();
    assert_eq!(*mediator.get_state(), State::Unauthorized);
    assert!(mediator.get_context().is_none());

    let waiter = {
        let mediator = mediator.clone();
        tokio::spawn(async move {
            mediator
                .wait_for_next_state(&warden_auth_core::StateFilter::only([StateKind::Authorized]))
                .await
        })
    };
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    harness.service.state_manager().push_authorizing_state(None);
    harness.service.state_manager().push_authorized_state(Context::Anonymous);

    let state = timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap().unwrap();
    assert_eq!(state.kind(), StateKind::Authorized);
    assert_eq!(mediator.get_context(), Some(Context::Anonymous));
}

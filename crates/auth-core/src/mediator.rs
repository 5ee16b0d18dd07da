//! Gate between the API layer and the session
//!
//! Every outbound request checks in through [`RequestMediator::run_api_request`]
//! with its [`AuthMode`]. The mediator decides from the current [`State`]
//! whether the request may go out, holds it while a negotiation is in flight,
//! and repairs the session once when the backend rejects the credential.
//!
//! | State | Public | Private | Authenticator |
//! |-------|--------|---------|---------------|
//! | `Unauthorized` | `NotAuthorized` | `NotAuthorized` | run without token |
//! | `Authorizing` | wait | wait | run with transient permit |
//! | `Authorized` (anonymous) | run | `NotAuthorized` | run |
//! | `Authorized` (authenticated) | run | run, reauthorize once on rejection | run |

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::{AuthError, Result};
use crate::flows::Flow;
use crate::orchestrator::ResponseType;
use crate::service::AuthService;
use crate::state::{State, StateFilter};
use crate::transport::{AuthMode, QueryRequest};

/// Credentials handed to a request attempt
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RequestCredentials {
    pub token: Option<String>,
}

impl RequestCredentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    fn from_context(context: &Context) -> Self {
        Self {
            token: context.token().map(str::to_string),
        }
    }
}

impl std::fmt::Debug for RequestCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = self.token.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("RequestCredentials").field("token", &token).finish()
    }
}

/// Gate consulted before and around every privileged call
#[derive(Debug, Clone)]
pub struct RequestMediator {
    service: Arc<AuthService>,
    abort: CancellationToken,
}

impl RequestMediator {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self {
            service,
            abort: CancellationToken::new(),
        }
    }

    /// Stop waiting requests and any reauthorization started from here
    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }

    pub fn get_state(&self) -> Arc<State> {
        self.service.state_manager().state()
    }

    pub fn get_context(&self) -> Option<Context> {
        self.service.state_manager().context()
    }

    /// Subscribes immediately; see [`StateManager::wait_for_next_state`]
    ///
    /// [`StateManager::wait_for_next_state`]: crate::state_manager::StateManager::wait_for_next_state
    pub fn wait_for_next_state(
        &self,
        filter: &StateFilter,
    ) -> impl Future<Output = Result<Arc<State>>> + Send + 'static {
        self.service.state_manager().wait_for_next_state(filter)
    }

    /// Repair the session from the persisted record
    ///
    /// Fails with `InternalError` when another flow is current. A redirect
    /// response is carried out through the router and reported as
    /// `ReauthorizationFailed`.
    pub async fn reauthorize(&self) -> Result<Arc<State>> {
        if let Some(running) = self.service.current_flow() {
            warn!(running = %running, "Reauthorization requested while a flow is running");
            return Err(AuthError::internal(format!(
                "cannot reauthorize while {} is running",
                running
            )));
        }

        let mut flow = self
            .service
            .refresh_context_flow()
            .with_abort(self.abort.child_token());

        let response = flow.run().await.map_err(|e| match e {
            AuthError::FlowAlreadyExecuting { .. } => AuthError::internal(e.to_string()),
            other => other,
        })?;

        match response.response_type {
            ResponseType::Authorized => {
                info!("Session reauthorized");
                Ok(response
                    .state
                    .unwrap_or_else(|| self.service.state_manager().state()))
            }
            response_type => {
                let redirect = response_type
                    .redirect_path(&self.service.config().routes)
                    .ok_or_else(|| {
                        AuthError::internal(format!(
                            "unexpected reauthorization response {}",
                            response_type
                        ))
                    })?;
                info!(redirect = %redirect, error = ?response.error, "Reauthorization failed");
                self.service.router().execute_redirect(&redirect);
                Err(AuthError::ReauthorizationFailed { redirect })
            }
        }
    }

    /// Run `request` once the session allows it
    ///
    /// `request` is called at most twice: a second time only for a private
    /// request whose first attempt failed with `ProviderNotAuthorized` and
    /// whose reauthorization succeeded.
    pub async fn run_api_request<T, F, Fut>(&self, auth_mode: AuthMode, mut request: F) -> Result<T>
    where
        F: FnMut(RequestCredentials) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let state_manager = self.service.state_manager().clone();
        // Subscribe before reading so no push between the two is missed.
        let mut subscription = state_manager.subscribe();
        let stable = StateFilter::stable();

        loop {
            let state = state_manager.state();
            let context = match (&*state, auth_mode) {
                (State::Unauthorized, AuthMode::Authenticator) => {
                    return request(RequestCredentials::anonymous()).await;
                }
                (State::Unauthorized, _) => return Err(AuthError::NotAuthorized),
                (State::Authorizing { transient_permit }, AuthMode::Authenticator) => {
                    let permit = match transient_permit {
                        Some(permit) => permit,
                        None => panic!("authenticator request while authorizing without a permit"),
                    };
                    return request(RequestCredentials::bearer(permit.token())).await;
                }
                (State::Authorizing { .. }, _) => {
                    debug!(mode = %auth_mode, "Request waiting for authorization to settle");
                    tokio::select! {
                        biased;
                        _ = self.abort.cancelled() => return Err(AuthError::Aborted),
                        next = subscription.next_matching(&stable) => {
                            next?;
                        }
                    }
                    continue;
                }
                (State::Authorized { context }, _) => context.clone(),
            };

            return match auth_mode {
                AuthMode::Public | AuthMode::Authenticator => {
                    request(RequestCredentials::from_context(&context)).await
                }
                AuthMode::Private if context.is_anonymous() => Err(AuthError::NotAuthorized),
                AuthMode::Private => self.run_private(&context, &mut request).await,
            };
        }
    }

    async fn run_private<T, F, Fut>(&self, context: &Context, request: &mut F) -> Result<T>
    where
        F: FnMut(RequestCredentials) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        match request(RequestCredentials::from_context(context)).await {
            Err(AuthError::ProviderNotAuthorized) => {
                info!("Private request rejected by provider, reauthorizing");
            }
            other => return other,
        }

        let state = self.reauthorize().await?;
        let context = match state.context() {
            Some(context) if context.is_authenticated() => context.clone(),
            _ => return Err(AuthError::NotAuthorized),
        };

        // Second attempt is final.
        request(RequestCredentials::from_context(&context)).await
    }

    /// Gate a transport query through [`run_api_request`](Self::run_api_request)
    pub async fn run_query(
        &self,
        query: impl Into<String>,
        variables: Value,
        auth_mode: AuthMode,
    ) -> Result<Value> {
        let query = query.into();
        let transport = self.service.transport().clone();
        let abort = self.abort.clone();

        self.run_api_request(auth_mode, move |credentials| {
            let transport = transport.clone();
            let request = QueryRequest::new(query.clone(), auth_mode)
                .with_variables(variables.clone())
                .with_token(credentials.token)
                .with_abort(abort.clone());
            async move { transport.run_query(request).await }
        })
        .await
    }
}

//! Batch-sequencing engine
//!
//! An [`Orchestrator`] owns one run of a flow: it stages a permit, an
//! identity and a context, publishes states through the [`StateManager`] and
//! produces exactly one terminal [`Response`].
//!
//! The step primitives below are the building blocks of a batch (see
//! [`Step`]). Every primitive mutates shared state synchronously; the only
//! suspension points are the collaborator calls, and those are wrapped so an
//! abort wins the race against them.
//!
//! # Contract violations
//!
//! Producing a second response, fetching an identity without a permit, or
//! publishing an invalid staged context are bugs in the flow composition and
//! panic.
//!
//! [`StateManager`]: crate::state_manager::StateManager

mod batch;
mod response;

pub use batch::{batch_authorize_from_login, batch_authorize_from_session, Step, StepFn};
pub use response::{Response, ResponseType};

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::completion::Completion;
use crate::context::Context;
use crate::error::{AuthError, Result};
use crate::flows::FlowKind;
use crate::identity::Identity;
use crate::permit::{decode_claims, Permit, PermitData};
use crate::provider::{LoginInput, SignRequest};
use crate::service::{AuthService, FlowGuard};
use crate::storage::SessionRecord;
use crate::transport::{AuthMode, QueryRequest};

/// Outcome cell shared with anyone awaiting the flow
pub type Outcome = Arc<Completion<Result<Response>>>;

/// Engine for a single flow execution
pub struct Orchestrator {
    service: Arc<AuthService>,
    abort: CancellationToken,
    flow: Option<FlowKind>,
    flow_guard: Option<FlowGuard>,
    permit: Option<Permit>,
    identity: Option<Identity>,
    context: Option<Context>,
    outcome: Outcome,
    began: bool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("flow", &self.flow)
            .field("owns_session", &self.flow_guard.is_some())
            .field("permit", &self.permit)
            .field("identity", &self.identity)
            .field("context", &self.context)
            .field("settled", &self.outcome.is_settled())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(service: Arc<AuthService>, abort: CancellationToken) -> Self {
        Self {
            service,
            abort,
            flow: None,
            flow_guard: None,
            permit: None,
            identity: None,
            context: None,
            outcome: Arc::new(Completion::new()),
            began: false,
        }
    }

    pub fn service(&self) -> &Arc<AuthService> {
        &self.service
    }

    pub fn abort_token(&self) -> &CancellationToken {
        &self.abort
    }

    /// Replace the abort signal; only meaningful before the flow runs
    pub fn set_abort_token(&mut self, abort: CancellationToken) {
        self.abort = abort;
    }

    pub fn flow(&self) -> Option<FlowKind> {
        self.flow
    }

    pub fn permit(&self) -> Option<&Permit> {
        self.permit.as_ref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome.clone()
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_settled()
    }

    /// Whether this orchestrator holds the single-flight slot
    ///
    /// Only the slot holder may force the session back to `Unauthorized`.
    pub fn owns_session(&self) -> bool {
        self.flow_guard.is_some()
    }

    /// Mark the orchestrator as used; a flow runs at most once
    pub fn begin_run(&mut self) -> Result<()> {
        if self.began {
            return Err(AuthError::internal("flow already ran"));
        }
        self.began = true;
        Ok(())
    }

    /// The settled outcome
    pub fn response(&self) -> Result<Response> {
        self.outcome
            .peek()
            .unwrap_or_else(|| Err(AuthError::internal("flow completed without a response")))
    }

    /// Run a batch and return whatever it settled
    pub async fn run_to_response(
        &mut self,
        steps: Vec<Step>,
        error_steps: Option<Vec<Step>>,
    ) -> Result<Response> {
        // The outcome carries the error, if any.
        let _ = self.run_batch(steps, error_steps).await;
        self.response()
    }

    /// Register as the current flow, failing if another flow runs
    pub fn start(&mut self, kind: FlowKind) -> Result<()> {
        assert!(self.flow_guard.is_none(), "orchestrator started twice");
        self.flow = Some(kind);
        match self.service.try_begin_flow(kind) {
            Ok(guard) => {
                self.flow_guard = Some(guard);
                Ok(())
            }
            Err(e) => {
                self.outcome.settle(Err(e.clone()));
                Err(e)
            }
        }
    }

    /// Register as the current flow once the running one has exited
    pub async fn start_when_idle(&mut self, kind: FlowKind) -> Result<()> {
        assert!(self.flow_guard.is_none(), "orchestrator started twice");
        self.flow = Some(kind);
        let service = self.service.clone();
        match service.begin_flow_when_idle(kind, &self.abort).await {
            Ok(guard) => {
                self.flow_guard = Some(guard);
                Ok(())
            }
            Err(e) => {
                self.outcome.settle(Err(e.clone()));
                Err(e)
            }
        }
    }

    /// Currently committed context, if valid under the configured margin
    pub fn valid_committed_context(&self) -> Option<Context> {
        self.service
            .state_manager()
            .context()
            .filter(|context| self.service.is_context_valid(context))
    }

    fn check_abort(&self) -> Result<()> {
        if self.abort.is_cancelled() {
            return Err(AuthError::Aborted);
        }
        Ok(())
    }

    async fn abortable<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.abort.cancelled() => Err(AuthError::Aborted),
            result = call => result,
        }
    }

    /// Produce a permit from the persisted session
    pub async fn refresh_permit(&mut self) -> Result<()> {
        self.check_abort()?;
        let service = self.service.clone();
        let config = service.config();

        let record = SessionRecord::load(service.storage().as_ref(), &config.storage_keys)
            .ok_or(AuthError::ExistingSessionNotFound)?;

        let now = service.now();
        if record.expires <= now.saturating_add(config.expiry_margin_secs) {
            debug!(username = %record.username, expires = record.expires, "Persisted session expired");
            return Err(AuthError::ExistingSessionExpired);
        }

        if let Err(e) = decode_claims(&record.token) {
            warn!(error = %e, "Ignoring persisted session with unreadable token");
            return Err(AuthError::ExistingSessionNotFound);
        }

        let request = SignRequest {
            subject: record.username.clone(),
            issued_at: now,
            expires_at: record.expires,
        };
        let token = self.abortable(service.signer().sign(request)).await?;
        let permit = Permit::create(PermitData::new(token), service.now())?;

        SessionRecord {
            token: permit.token().to_string(),
            ..record
        }
        .save(service.storage().as_ref(), &config.storage_keys);

        debug!(permit = %permit.id(), "Permit refreshed from persisted session");
        self.permit = Some(permit);
        Ok(())
    }

    /// Exchange credentials for a permit and persist the session
    pub async fn login(&mut self, input: &LoginInput) -> Result<()> {
        self.check_abort()?;
        let service = self.service.clone();

        let token = self.abortable(service.provider().login(input)).await?;
        let permit = Permit::create(PermitData::new(token), service.now())?;

        SessionRecord {
            username: input.username.clone(),
            token: permit.token().to_string(),
            expires: permit.token_expires(),
        }
        .save(service.storage().as_ref(), &service.config().storage_keys);

        debug!(username = %input.username, permit = %permit.id(), "Logged in");
        self.permit = Some(permit);
        Ok(())
    }

    /// Query the identity behind the staged permit
    ///
    /// # Panics
    ///
    /// When no permit is staged.
    pub async fn fetch_identity(&mut self) -> Result<()> {
        self.check_abort()?;
        let permit = match &self.permit {
            Some(permit) => permit.clone(),
            None => panic!("fetch_identity requires a staged permit"),
        };

        let service = self.service.clone();
        let config = service.config();
        if !permit.is_valid(service.clock().as_ref(), config.expiry_margin_secs) {
            return Err(AuthError::InvalidPermit);
        }

        let request = QueryRequest::new(config.identity_query.clone(), AuthMode::Authenticator)
            .with_token(Some(permit.token().to_string()))
            .with_abort(self.abort.clone());

        let value = match self.abortable(service.transport().run_query(request)).await {
            Ok(value) => value,
            Err(AuthError::Aborted) => return Err(AuthError::Aborted),
            Err(e) => return Err(AuthError::FetchIdentityError(e.to_string())),
        };

        let payload = match value.get(&config.identity_field) {
            Some(inner) => inner.clone(),
            None => value,
        };
        let identity: Identity = serde_json::from_value(payload)
            .map_err(|e| AuthError::FetchIdentityError(e.to_string()))?;

        debug!(identity = %identity.id, "Identity fetched");
        self.identity = Some(identity);
        Ok(())
    }

    /// Stage an authenticated context from the staged permit and identity
    ///
    /// # Panics
    ///
    /// When either is missing.
    pub fn create_authenticated_context(&mut self) {
        let (permit, identity) = match (&self.permit, &self.identity) {
            (Some(permit), Some(identity)) => (permit.clone(), identity.clone()),
            _ => panic!("authenticated context requires a permit and an identity"),
        };
        self.context = Some(Context::authenticated(permit, identity));
    }

    pub fn create_anonymous_context(&mut self) {
        self.context = Some(Context::Anonymous);
    }

    /// Commit the staged context
    ///
    /// # Panics
    ///
    /// When no context is staged or it is not valid.
    pub fn push_authorized(&mut self) {
        let context = match &self.context {
            Some(context) => context.clone(),
            None => panic!("push_authorized requires a staged context"),
        };
        assert!(
            self.service.is_context_valid(&context),
            "staged context is not valid"
        );
        self.service.state_manager().push_authorized_state(context);
    }

    /// Enter negotiation, exposing the staged permit if there is one
    pub fn push_authorizing(&mut self) {
        self.service
            .state_manager()
            .push_authorizing_state(self.permit.clone());
    }

    pub fn push_unauthorized(&mut self) {
        self.service.state_manager().push_unauthorized_state();
    }

    /// Drop everything staged and publish `Unauthorized`
    pub fn invalidate(&mut self) {
        self.permit = None;
        self.identity = None;
        self.context = None;
        self.push_unauthorized();
    }

    /// Remove the persisted session and invalidate
    pub fn logout(&mut self) {
        SessionRecord::clear(
            self.service.storage().as_ref(),
            &self.service.config().storage_keys,
        );
        self.invalidate();
    }

    /// Respond with whether `username` is already registered
    pub async fn check_username(&mut self, username: &str) -> Result<()> {
        self.check_abort()?;
        let service = self.service.clone();
        let exists = self
            .abortable(service.provider().username_exists(username))
            .await?;
        if exists {
            self.set_duplicated_username();
        } else {
            self.set_available_username();
        }
        Ok(())
    }

    /// Settle with `response_type`
    pub fn respond(&mut self, response_type: ResponseType, error: Option<AuthError>) {
        assert!(
            !self.outcome.is_settled(),
            "orchestrator already produced a response"
        );

        let mut response =
            Response::new(response_type).with_state(self.service.state_manager().state());
        if let Some(error) = error {
            response = response.with_error(error);
        }

        info!(
            flow = ?self.flow,
            response = %response_type,
            error = ?response.error.as_ref().map(AuthError::code),
            "Flow finished"
        );
        self.settle(Ok(response));
    }

    /// Settle with an error, publishing `Unauthorized` if this flow owns the session
    pub fn set_error(&mut self, error: AuthError) {
        assert!(
            !self.outcome.is_settled(),
            "orchestrator already produced a response"
        );

        if self.owns_session() {
            self.push_unauthorized();
        }

        if error.is_severe() {
            warn!(flow = ?self.flow, error = %error, code = error.code(), "Flow failed");
        } else {
            info!(flow = ?self.flow, error = %error, code = error.code(), "Flow failed");
        }
        self.settle(Err(error));
    }

    pub fn set_success(&mut self) {
        self.respond(ResponseType::Success, None);
    }

    pub fn set_authorized(&mut self) {
        self.respond(ResponseType::Authorized, None);
    }

    pub fn set_redirect_to_login_page(&mut self, error: Option<AuthError>) {
        self.respond(ResponseType::RedirectToLoginPage, error);
    }

    pub fn set_redirect_to_default_page(&mut self) {
        self.respond(ResponseType::RedirectToDefaultPage, None);
    }

    pub fn set_redirect_to_last_private_route(&mut self) {
        self.respond(ResponseType::RedirectToLastContentRoute, None);
    }

    pub fn set_redirect_after_logout(&mut self) {
        self.respond(ResponseType::RedirectAfterLogout, None);
    }

    pub fn set_pass_through_auth_route(&mut self) {
        self.respond(ResponseType::PassThroughAuthRoute, None);
    }

    pub fn set_pass_through_private_route(&mut self) {
        self.respond(ResponseType::PassThroughPrivateRoute, None);
    }

    pub fn set_pass_through_public_route(&mut self) {
        self.respond(ResponseType::PassThroughPublicRoute, None);
    }

    pub fn set_await_redirect(&mut self) {
        self.respond(ResponseType::AwaitRedirect, None);
    }

    pub fn set_duplicated_username(&mut self) {
        self.respond(ResponseType::DuplicatedUsername, None);
    }

    pub fn set_available_username(&mut self) {
        self.respond(ResponseType::AvailableUsername, None);
    }

    /// Settle the outcome and free the flow slot
    fn settle(&mut self, result: Result<Response>) {
        self.outcome.settle(result);
        self.flow_guard = None;
    }

    /// Abort wins: force `Unauthorized` and settle without recovery
    fn abort_flow(&mut self) {
        if self.owns_session() {
            self.push_unauthorized();
        }
        info!(flow = ?self.flow, "Flow aborted");
        if !self.outcome.is_settled() {
            self.outcome.settle(Err(AuthError::Aborted));
        }
        self.flow_guard = None;
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if self.outcome.is_settled() {
            return;
        }
        // A flow dropped mid-negotiation must not leave the session transient.
        if self.owns_session() {
            let state_manager = self.service.state_manager();
            if !state_manager.state().is_stable() {
                debug!(flow = ?self.flow, "Flow dropped while authorizing");
                state_manager.push_unauthorized_state();
            }
        }
        // Waiters on the shared outcome must not hang.
        self.outcome.settle(Err(AuthError::Aborted));
    }
}

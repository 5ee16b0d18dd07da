//! Transactional batch runner
//!
//! A batch is an ordered list of [`Step`]s. Steps run strictly in order and
//! the first failure stops the batch. What happens next depends on the error:
//!
//! - `Aborted` forces `Unauthorized` and propagates; recovery never runs.
//! - With compensating steps, they run seeded with the error and must succeed.
//! - Without them, the error becomes the flow's error response.

use futures::future::BoxFuture;
use tracing::debug;

use super::{Orchestrator, ResponseType};
use crate::error::{AuthError, Result};
use crate::provider::LoginInput;

/// Boxed custom step; receives the seed error when used for recovery
pub type StepFn = Box<
    dyn for<'a> FnOnce(&'a mut Orchestrator, Option<&'a AuthError>) -> BoxFuture<'a, Result<()>>
        + Send,
>;

/// One unit of a batch
pub enum Step {
    PushAuthorizing,
    PushAuthorized,
    PushUnauthorized,
    Login(LoginInput),
    RefreshPermit,
    FetchIdentity,
    CreateAuthenticatedContext,
    CreateAnonymousContext,
    Invalidate,
    Logout,
    CheckUsername(String),
    /// Settle with the given response
    Finish(ResponseType),
    /// Settle with the given response carrying the seed error
    FinishWithError(ResponseType),
    /// Settle with the seed error
    Fail,
    Custom(StepFn),
}

impl Step {
    pub fn custom<F>(step: F) -> Self
    where
        F: for<'a> FnOnce(&'a mut Orchestrator, Option<&'a AuthError>) -> BoxFuture<'a, Result<()>>
            + Send
            + 'static,
    {
        Step::Custom(Box::new(step))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::PushAuthorizing => "push_authorizing",
            Step::PushAuthorized => "push_authorized",
            Step::PushUnauthorized => "push_unauthorized",
            Step::Login(_) => "login",
            Step::RefreshPermit => "refresh_permit",
            Step::FetchIdentity => "fetch_identity",
            Step::CreateAuthenticatedContext => "create_authenticated_context",
            Step::CreateAnonymousContext => "create_anonymous_context",
            Step::Invalidate => "invalidate",
            Step::Logout => "logout",
            Step::CheckUsername(_) => "check_username",
            Step::Finish(_) => "finish",
            Step::FinishWithError(_) => "finish_with_error",
            Step::Fail => "fail",
            Step::Custom(_) => "custom",
        }
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Login(input) => f.debug_tuple("Login").field(input).finish(),
            Step::CheckUsername(name) => f.debug_tuple("CheckUsername").field(name).finish(),
            Step::Finish(response_type) => f.debug_tuple("Finish").field(response_type).finish(),
            Step::FinishWithError(response_type) => {
                f.debug_tuple("FinishWithError").field(response_type).finish()
            }
            other => f.write_str(other.name()),
        }
    }
}

/// Enter negotiation, log in, fetch the identity and commit
pub fn batch_authorize_from_login(input: LoginInput) -> Vec<Step> {
    vec![
        Step::PushAuthorizing,
        Step::Login(input),
        Step::PushAuthorizing,
        Step::FetchIdentity,
        Step::CreateAuthenticatedContext,
        Step::PushAuthorized,
    ]
}

/// Same shape as [`batch_authorize_from_login`], starting from the persisted session
pub fn batch_authorize_from_session() -> Vec<Step> {
    vec![
        Step::PushAuthorizing,
        Step::RefreshPermit,
        Step::PushAuthorizing,
        Step::FetchIdentity,
        Step::CreateAuthenticatedContext,
        Step::PushAuthorized,
    ]
}

impl Orchestrator {
    /// Run `steps`, recovering with `error_steps` on failure
    ///
    /// Returns `Ok` when the steps succeeded or were compensated, the
    /// triggering error otherwise.
    ///
    /// # Panics
    ///
    /// When a compensating step fails.
    pub async fn run_batch(&mut self, steps: Vec<Step>, error_steps: Option<Vec<Step>>) -> Result<()> {
        let failure = match self.run_steps(steps).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if failure.is_aborted() {
            self.abort_flow();
            return Err(AuthError::Aborted);
        }

        let error_steps = match error_steps {
            Some(error_steps) => error_steps,
            None => {
                self.set_error(failure.clone());
                return Err(failure);
            }
        };

        if failure.is_session_recovery() {
            debug!(flow = ?self.flow, code = failure.code(), "Recovering from missing session");
        } else {
            debug!(flow = ?self.flow, error = %failure, "Running compensating steps");
        }

        for step in error_steps {
            let name = step.name();
            if let Err(e) = self.run_step(step, Some(&failure)).await {
                panic!("compensating step {} failed: {}", name, e);
            }
        }
        Ok(())
    }

    async fn run_steps(&mut self, steps: Vec<Step>) -> Result<()> {
        for step in steps {
            self.check_abort()?;
            debug!(flow = ?self.flow, step = step.name(), "Running step");
            self.run_step(step, None).await?;
        }
        Ok(())
    }

    async fn run_step(&mut self, step: Step, seed: Option<&AuthError>) -> Result<()> {
        match step {
            Step::PushAuthorizing => self.push_authorizing(),
            Step::PushAuthorized => self.push_authorized(),
            Step::PushUnauthorized => self.push_unauthorized(),
            Step::Login(input) => self.login(&input).await?,
            Step::RefreshPermit => self.refresh_permit().await?,
            Step::FetchIdentity => self.fetch_identity().await?,
            Step::CreateAuthenticatedContext => self.create_authenticated_context(),
            Step::CreateAnonymousContext => self.create_anonymous_context(),
            Step::Invalidate => self.invalidate(),
            Step::Logout => self.logout(),
            Step::CheckUsername(username) => self.check_username(&username).await?,
            Step::Finish(response_type) => self.respond(response_type, None),
            Step::FinishWithError(response_type) => self.respond(response_type, seed.cloned()),
            Step::Fail => {
                let error = seed
                    .cloned()
                    .unwrap_or_else(|| AuthError::internal("fail step without an error"));
                self.set_error(error);
            }
            Step::Custom(step) => step(self, seed).await?,
        }
        Ok(())
    }
}

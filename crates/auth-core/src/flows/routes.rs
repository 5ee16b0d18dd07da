//! Route guard flows
//!
//! All three queue behind a running flow, so guards rendering at the same
//! time run one after another and the later ones usually find a committed
//! context and pass straight through.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Flow, FlowKind};
use crate::error::Result;
use crate::orchestrator::{batch_authorize_from_session, Orchestrator, Response, ResponseType, Step};
use crate::service::AuthService;

/// Guard for pages that need an authenticated user
#[derive(Debug)]
pub struct PrivateRouteFlow {
    orchestrator: Orchestrator,
}

impl PrivateRouteFlow {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self {
            orchestrator: Orchestrator::new(service, CancellationToken::new()),
        }
    }

    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.orchestrator.set_abort_token(abort);
        self
    }
}

#[async_trait]
impl Flow for PrivateRouteFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::PrivateRoute
    }

    fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    async fn run(&mut self) -> Result<Response> {
        self.orchestrator.begin_run()?;
        self.orchestrator.start_when_idle(FlowKind::PrivateRoute).await?;

        // An anonymous context does not open private routes.
        let authenticated = self
            .orchestrator
            .valid_committed_context()
            .map_or(false, |context| context.is_authenticated());
        if authenticated {
            self.orchestrator.set_pass_through_private_route();
            return self.orchestrator.response();
        }

        let mut steps = batch_authorize_from_session();
        steps.push(Step::Finish(ResponseType::PassThroughPrivateRoute));
        let error_steps = vec![
            Step::PushUnauthorized,
            Step::Finish(ResponseType::RedirectToLoginPage),
        ];
        self.orchestrator
            .run_to_response(steps, Some(error_steps))
            .await
    }
}

/// Guard for pages anyone may see; degrades to an anonymous context
#[derive(Debug)]
pub struct PublicRouteFlow {
    orchestrator: Orchestrator,
}

impl PublicRouteFlow {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self {
            orchestrator: Orchestrator::new(service, CancellationToken::new()),
        }
    }

    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.orchestrator.set_abort_token(abort);
        self
    }
}

#[async_trait]
impl Flow for PublicRouteFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::PublicRoute
    }

    fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    async fn run(&mut self) -> Result<Response> {
        self.orchestrator.begin_run()?;
        self.orchestrator.start_when_idle(FlowKind::PublicRoute).await?;

        if self.orchestrator.valid_committed_context().is_some() {
            self.orchestrator.set_pass_through_public_route();
            return self.orchestrator.response();
        }

        let mut steps = batch_authorize_from_session();
        steps.push(Step::Finish(ResponseType::PassThroughPublicRoute));
        let error_steps = vec![
            Step::CreateAnonymousContext,
            Step::PushAuthorized,
            Step::Finish(ResponseType::PassThroughPublicRoute),
        ];
        self.orchestrator
            .run_to_response(steps, Some(error_steps))
            .await
    }
}

/// Guard for the login and registration pages
///
/// An authenticated user is sent back to the last content route instead.
#[derive(Debug)]
pub struct AuthRouteFlow {
    orchestrator: Orchestrator,
}

impl AuthRouteFlow {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self {
            orchestrator: Orchestrator::new(service, CancellationToken::new()),
        }
    }

    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.orchestrator.set_abort_token(abort);
        self
    }
}

#[async_trait]
impl Flow for AuthRouteFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::AuthRoute
    }

    fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    async fn run(&mut self) -> Result<Response> {
        self.orchestrator.begin_run()?;
        self.orchestrator.start_when_idle(FlowKind::AuthRoute).await?;

        let authenticated = self
            .orchestrator
            .valid_committed_context()
            .map_or(false, |context| context.is_authenticated());
        if authenticated {
            self.orchestrator.set_redirect_to_last_private_route();
            return self.orchestrator.response();
        }

        let mut steps = batch_authorize_from_session();
        steps.push(Step::Finish(ResponseType::RedirectToLastContentRoute));
        let error_steps = vec![
            Step::PushUnauthorized,
            Step::Finish(ResponseType::PassThroughAuthRoute),
        ];
        self.orchestrator
            .run_to_response(steps, Some(error_steps))
            .await
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Flow, FlowKind};
use crate::error::Result;
use crate::orchestrator::{batch_authorize_from_session, Orchestrator, Response, ResponseType, Step};
use crate::service::AuthService;

/// Rebuild the context from the persisted session
///
/// Used by reauthorization, so it never queues: if another flow is current it
/// fails with `FlowAlreadyExecuting`. On failure it responds with a redirect
/// to the login page carrying the triggering error.
#[derive(Debug)]
pub struct RefreshContextFlow {
    orchestrator: Orchestrator,
}

impl RefreshContextFlow {
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
impl Flow for RefreshContextFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::RefreshContext
    }

    fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    async fn run(&mut self) -> Result<Response> {
        self.orchestrator.begin_run()?;
        self.orchestrator.start(FlowKind::RefreshContext)?;

        let mut steps = batch_authorize_from_session();
        steps.push(Step::Finish(ResponseType::Authorized));
        let error_steps = vec![
            Step::PushUnauthorized,
            Step::FinishWithError(ResponseType::RedirectToLoginPage),
        ];
        self.orchestrator
            .run_to_response(steps, Some(error_steps))
            .await
    }
}

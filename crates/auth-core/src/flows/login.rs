use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Flow, FlowKind};
use crate::error::{AuthError, Result};
use crate::orchestrator::{batch_authorize_from_login, Orchestrator, Response, ResponseType, Step};
use crate::provider::LoginInput;
use crate::service::AuthService;

/// Log in with credentials, then return to the last content route
///
/// Failures are returned as-is so the caller can show them next to the form.
#[derive(Debug)]
pub struct LoginFlow {
    orchestrator: Orchestrator,
    input: Option<LoginInput>,
}

impl LoginFlow {
    pub fn new(service: Arc<AuthService>, input: LoginInput) -> Self {
        Self {
            orchestrator: Orchestrator::new(service, CancellationToken::new()),
            input: Some(input),
        }
    }

    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.orchestrator.set_abort_token(abort);
        self
    }
}

#[async_trait]
impl Flow for LoginFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Login
    }

    fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    async fn run(&mut self) -> Result<Response> {
        self.orchestrator.begin_run()?;
        let input = self
            .input
            .take()
            .ok_or_else(|| AuthError::internal("login input already consumed"))?;

        self.orchestrator.start_when_idle(FlowKind::Login).await?;

        let mut steps = batch_authorize_from_login(input);
        steps.push(Step::Finish(ResponseType::RedirectToLastContentRoute));
        self.orchestrator.run_to_response(steps, None).await
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Flow, FlowKind};
use crate::error::Result;
use crate::orchestrator::{Orchestrator, Response, ResponseType, Step};
use crate::service::AuthService;

/// Drop the session and wait for the caller to navigate away
#[derive(Debug)]
pub struct LogoutFlow {
    orchestrator: Orchestrator,
}

impl LogoutFlow {
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
impl Flow for LogoutFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Logout
    }

    fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    async fn run(&mut self) -> Result<Response> {
        self.orchestrator.begin_run()?;
        self.orchestrator.start_when_idle(FlowKind::Logout).await?;

        let steps = vec![
            Step::Invalidate,
            Step::Logout,
            Step::Finish(ResponseType::AwaitRedirect),
        ];
        self.orchestrator.run_to_response(steps, None).await
    }
}

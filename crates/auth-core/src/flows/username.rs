use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Flow, FlowKind};
use crate::error::Result;
use crate::orchestrator::{Orchestrator, Response, Step};
use crate::service::AuthService;

/// Ask the provider whether a username is taken
///
/// Runs beside other flows: it neither takes the single-flight slot nor
/// touches the session state.
#[derive(Debug)]
pub struct CheckUsernameFlow {
    orchestrator: Orchestrator,
    username: String,
}

impl CheckUsernameFlow {
    pub fn new(service: Arc<AuthService>, username: impl Into<String>) -> Self {
        Self {
            orchestrator: Orchestrator::new(service, CancellationToken::new()),
            username: username.into(),
        }
    }

    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.orchestrator.set_abort_token(abort);
        self
    }
}

#[async_trait]
impl Flow for CheckUsernameFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::CheckUsername
    }

    fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    async fn run(&mut self) -> Result<Response> {
        self.orchestrator.begin_run()?;
        let steps = vec![Step::CheckUsername(self.username.clone())];
        self.orchestrator.run_to_response(steps, None).await
    }
}

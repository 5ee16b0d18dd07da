//! Named authentication scenarios
//!
//! Each flow wraps one [`Orchestrator`] and runs one fixed composition of its
//! steps. Flows are single use: a second `run` fails with `InternalError`.
//!
//! | Flow | Single-flight | Recovery |
//! |------|---------------|----------|
//! | [`LoginFlow`] | queued | none, errors surface |
//! | [`LogoutFlow`] | queued | none |
//! | [`PrivateRouteFlow`] | queued | unauthorized, login page |
//! | [`PublicRouteFlow`] | queued | anonymous context |
//! | [`AuthRouteFlow`] | queued | unauthorized, show auth page |
//! | [`RefreshContextFlow`] | rejected when busy | unauthorized, login page with error |
//! | [`CheckUsernameFlow`] | not taken | none |

mod login;
mod logout;
mod refresh;
mod routes;
mod username;

pub use login::LoginFlow;
pub use logout::LogoutFlow;
pub use refresh::RefreshContextFlow;
pub use routes::{AuthRouteFlow, PrivateRouteFlow, PublicRouteFlow};
pub use username::CheckUsernameFlow;

use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::orchestrator::{Orchestrator, Outcome, Response};

/// Identifies a flow for single-flight bookkeeping and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Login,
    Logout,
    PrivateRoute,
    PublicRoute,
    AuthRoute,
    RefreshContext,
    CheckUsername,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowKind::Login => "Login",
            FlowKind::Logout => "Logout",
            FlowKind::PrivateRoute => "PrivateRoute",
            FlowKind::PublicRoute => "PublicRoute",
            FlowKind::AuthRoute => "AuthRoute",
            FlowKind::RefreshContext => "RefreshContext",
            FlowKind::CheckUsername => "CheckUsername",
        };
        f.write_str(name)
    }
}

/// A runnable scenario
#[async_trait]
pub trait Flow: Send {
    fn kind(&self) -> FlowKind;

    fn orchestrator(&self) -> &Orchestrator;

    /// Never panics on ordinary failures; every outcome is a `Result`
    async fn run(&mut self) -> Result<Response>;

    /// Signal the flow to stop at its next step
    fn abort(&self) {
        self.orchestrator().abort_token().cancel();
    }

    fn abort_token(&self) -> CancellationToken {
        self.orchestrator().abort_token().clone()
    }

    /// Await-able outcome, shared with other tasks
    fn outcome(&self) -> Outcome {
        self.orchestrator().outcome()
    }
}

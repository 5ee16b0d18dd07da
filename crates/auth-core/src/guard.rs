//! Route guards driving the route flows from UI components
//!
//! A [`RouteGuard`] belongs to one mounted page. Attaching spawns the
//! matching route flow with the guard's own abort signal; detaching cancels
//! the signal and forgets the task, so a flow that finishes late has nowhere
//! to deliver its response.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{AuthError, Result};
use crate::flows::{Flow, FlowKind};
use crate::orchestrator::Response;
use crate::service::AuthService;

/// Access class of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    Private,
    Public,
    /// Login and registration pages
    Auth,
}

impl RouteKind {
    pub fn flow_kind(self) -> FlowKind {
        match self {
            RouteKind::Private => FlowKind::PrivateRoute,
            RouteKind::Public => FlowKind::PublicRoute,
            RouteKind::Auth => FlowKind::AuthRoute,
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct RouteGuard {
    service: Arc<AuthService>,
    kind: RouteKind,
    abort: CancellationToken,
    task: Option<JoinHandle<Result<Response>>>,
}

impl fmt::Debug for RouteGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteGuard")
            .field("kind", &self.kind)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl RouteGuard {
    pub fn new(service: Arc<AuthService>, kind: RouteKind) -> Self {
        Self {
            service,
            kind,
            abort: CancellationToken::new(),
            task: None,
        }
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    pub fn is_attached(&self) -> bool {
        self.task.is_some()
    }

    /// Spawn the route flow; a previous attachment is detached first
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(&mut self) {
        if self.is_attached() {
            self.detach();
        }

        self.abort = CancellationToken::new();
        let service = self.service.clone();
        let abort = self.abort.clone();
        let kind = self.kind;

        debug!(route = %kind, "Route guard attached");
        self.task = Some(tokio::spawn(async move {
            match kind {
                RouteKind::Private => {
                    let mut flow = service.private_route_flow().with_abort(abort);
                    flow.run().await
                }
                RouteKind::Public => {
                    let mut flow = service.public_route_flow().with_abort(abort);
                    flow.run().await
                }
                RouteKind::Auth => {
                    let mut flow = service.auth_route_flow().with_abort(abort);
                    flow.run().await
                }
            }
        }));
    }

    /// Cancel the flow and drop the task reference
    pub fn detach(&mut self) {
        self.abort.cancel();
        if self.task.take().is_some() {
            debug!(route = %self.kind, "Route guard detached");
        }
    }

    /// Wait for the attached flow's response
    ///
    /// Fails with `Aborted` when nothing is attached, e.g. after
    /// [`detach`](Self::detach).
    pub async fn outcome(&mut self) -> Result<Response> {
        let task = self.task.as_mut().ok_or(AuthError::Aborted)?;
        let joined = task.await;
        self.task = None;

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(AuthError::Aborted),
        }
    }
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        self.abort.cancel();
    }
}

//! Terminal outcome of a flow

use std::fmt;
use std::sync::Arc;

use crate::config::RouteConfig;
use crate::error::AuthError;
use crate::state::State;

/// What the caller of a flow should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    Success,
    Authorized,
    RedirectToLastContentRoute,
    RedirectToLoginPage,
    RedirectToDefaultPage,
    RedirectAfterLogout,
    PassThroughAuthRoute,
    PassThroughPrivateRoute,
    PassThroughPublicRoute,
    AwaitRedirect,
    DuplicatedUsername,
    AvailableUsername,
}

impl ResponseType {
    pub fn is_redirect(self) -> bool {
        matches!(
            self,
            ResponseType::RedirectToLastContentRoute
                | ResponseType::RedirectToLoginPage
                | ResponseType::RedirectToDefaultPage
                | ResponseType::RedirectAfterLogout
        )
    }

    pub fn is_pass_through(self) -> bool {
        matches!(
            self,
            ResponseType::PassThroughAuthRoute
                | ResponseType::PassThroughPrivateRoute
                | ResponseType::PassThroughPublicRoute
        )
    }

    /// Navigation target for redirect responses
    pub fn redirect_path(self, routes: &RouteConfig) -> Option<String> {
        let path = match self {
            ResponseType::RedirectToLastContentRoute => &routes.last_content_route,
            ResponseType::RedirectToLoginPage => &routes.login_page,
            ResponseType::RedirectToDefaultPage => &routes.default_page,
            ResponseType::RedirectAfterLogout => &routes.after_logout,
            _ => return None,
        };
        Some(path.clone())
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The single response an orchestrator produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub response_type: ResponseType,
    /// Set on error responses, e.g. a redirect to the login page caused by a
    /// failed refresh
    pub error: Option<AuthError>,
    /// Session state when the response was produced
    pub state: Option<Arc<State>>,
}

impl Response {
    pub fn new(response_type: ResponseType) -> Self {
        Self {
            response_type,
            error: None,
            state: None,
        }
    }

    pub fn with_error(mut self, error: AuthError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_state(mut self, state: Arc<State>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

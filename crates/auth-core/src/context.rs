//! Who is using the application right now

use crate::clock::Clock;
use crate::identity::Identity;
use crate::permit::{is_token_valid, Permit};

/// An authenticated principal or an anonymous visitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Context {
    Authenticated { permit: Permit, identity: Identity },
    Anonymous,
}

impl Context {
    pub fn authenticated(permit: Permit, identity: Identity) -> Self {
        Context::Authenticated { permit, identity }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Context::Authenticated { .. })
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Context::Anonymous)
    }

    pub fn permit(&self) -> Option<&Permit> {
        match self {
            Context::Authenticated { permit, .. } => Some(permit),
            Context::Anonymous => None,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Context::Authenticated { identity, .. } => Some(identity),
            Context::Anonymous => None,
        }
    }

    /// Bearer token to attach to outgoing requests, if any
    pub fn token(&self) -> Option<&str> {
        self.permit().map(Permit::token)
    }

    /// Anonymous contexts are always valid; authenticated ones while the permit lasts
    pub fn is_valid_at(&self, now: i64, margin_secs: i64) -> bool {
        match self {
            Context::Authenticated { permit, .. } => is_token_valid(permit, now, margin_secs),
            Context::Anonymous => true,
        }
    }

    pub fn is_valid(&self, clock: &dyn Clock, margin_secs: i64) -> bool {
        self.is_valid_at(clock.now(), margin_secs)
    }
}

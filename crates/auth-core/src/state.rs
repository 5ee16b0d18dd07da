//! Session states
//!
//! # State Transitions
//!
//! `Unauthorized` → `Authorizing` → `Authorized` | `Unauthorized`
//!
//! `Authorized` and `Unauthorized` are stable. `Authorizing` is transient and
//! is always followed by one of the stable states. Note that `Authorized` may
//! wrap an anonymous [`Context`]: a public route that could not restore a
//! session still commits a usable (anonymous) context.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::context::Context;
use crate::permit::Permit;

/// Snapshot of the session lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// No context, no permit
    Unauthorized,
    /// Negotiation in progress, possibly with a not yet committed permit
    Authorizing { transient_permit: Option<Permit> },
    /// A context is committed
    Authorized { context: Context },
}

impl State {
    pub fn kind(&self) -> StateKind {
        match self {
            State::Unauthorized => StateKind::Unauthorized,
            State::Authorizing { .. } => StateKind::Authorizing,
            State::Authorized { .. } => StateKind::Authorized,
        }
    }

    pub fn context(&self) -> Option<&Context> {
        match self {
            State::Authorized { context } => Some(context),
            _ => None,
        }
    }

    pub fn transient_permit(&self) -> Option<&Permit> {
        match self {
            State::Authorizing { transient_permit } => transient_permit.as_ref(),
            _ => None,
        }
    }

    pub fn is_stable(&self) -> bool {
        self.kind().is_stable()
    }
}

/// Discriminant of [`State`], used for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Unauthorized,
    Authorizing,
    Authorized,
}

impl StateKind {
    pub fn is_stable(self) -> bool {
        !matches!(self, StateKind::Authorizing)
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKind::Unauthorized => write!(f, "Unauthorized"),
            StateKind::Authorizing => write!(f, "Authorizing"),
            StateKind::Authorized => write!(f, "Authorized"),
        }
    }
}

/// Set of state kinds a waiter is interested in
///
/// An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateFilter {
    kinds: HashSet<StateKind>,
}

impl StateFilter {
    /// Matches every state
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches `Authorized` and `Unauthorized`
    pub fn stable() -> Self {
        Self::only([StateKind::Authorized, StateKind::Unauthorized])
    }

    pub fn only(kinds: impl IntoIterator<Item = StateKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn matches(&self, kind: StateKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

impl From<HashSet<StateKind>> for StateFilter {
    fn from(kinds: HashSet<StateKind>) -> Self {
        Self { kinds }
    }
}

/// One published state, stamped with its position in the stream
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// Strictly increasing, starting at 1 for the first push
    pub generation: u64,
    pub state: Arc<State>,
    pub at: DateTime<Utc>,
}

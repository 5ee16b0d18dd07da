//! Client-side session orchestration
//!
//! This crate governs how an application acquires, validates, refreshes and
//! drops an authenticated session, and how API calls and route guards
//! synchronize with it.
//!
//! # Architecture
//!
//! ```text
//! RouteGuard / UI action
//!        │ creates
//!        ▼
//!      Flow ──owns──▶ Orchestrator ──runs──▶ batch of Steps
//!                          │ pushes
//!                          ▼
//!                    StateManager ◀──reads / awaits── RequestMediator ◀── API layer
//! ```
//!
//! - [`Permit`], [`Identity`] and [`Context`] are immutable values.
//! - [`StateManager`] holds the single current [`State`] and broadcasts every
//!   replacement.
//! - [`Orchestrator`] runs one flow's batch with all-or-nothing semantics and
//!   produces exactly one [`Response`].
//! - The flows in [`flows`] compose orchestrator steps into the product
//!   scenarios.
//! - [`RequestMediator`] gates outbound requests on the current state and
//!   retries once after reauthorization.
//! - [`AuthService`] wires the collaborators together and enforces that only
//!   one flow runs at a time.

pub mod clock;
pub mod completion;
pub mod config;
pub mod context;
pub mod error;
pub mod flows;
pub mod guard;
pub mod identity;
pub mod mediator;
pub mod orchestrator;
pub mod permit;
pub mod provider;
pub mod routing;
pub mod service;
pub mod state;
pub mod state_manager;
pub mod storage;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use completion::Completion;
pub use config::{AuthConfig, RouteConfig, StorageKeys};
pub use context::Context;
pub use error::{AuthError, Result};
pub use flows::{
    AuthRouteFlow, CheckUsernameFlow, Flow, FlowKind, LoginFlow, LogoutFlow, PrivateRouteFlow,
    PublicRouteFlow, RefreshContextFlow,
};
pub use guard::{RouteGuard, RouteKind};
pub use identity::Identity;
pub use mediator::{RequestCredentials, RequestMediator};
pub use orchestrator::{Orchestrator, Outcome, Response, ResponseType, Step};
pub use permit::{is_token_valid, Permit, PermitData, TokenPayload};
pub use provider::{AuthProvider, CredentialSigner, LoginInput, SignRequest};
pub use routing::Router;
pub use service::{AuthService, AuthServiceBuilder, FlowGuard};
pub use state::{State, StateFilter, StateKind, StateTransition};
pub use state_manager::{StateManager, StateSubscription};
pub use storage::{MemoryStorage, SessionRecord, SessionStorage};
pub use transport::{ApiTransport, AuthMode, QueryRequest};

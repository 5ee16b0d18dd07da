//! Explicit dependency wiring and the single-flight slot
//!
//! [`AuthService`] owns everything a flow needs: configuration, the clock, the
//! [`StateManager`] and the collaborators. Flows and the mediator receive an
//! `Arc<AuthService>` instead of looking services up through a global.
//!
//! # Single-flight
//!
//! At most one flow is current at a time. The slot is a `watch` channel so
//! queued flows can wait for it to become free without polling:
//!
//! - [`AuthService::try_begin_flow`] fails with `FlowAlreadyExecuting` when
//!   the slot is taken (used by reauthorization).
//! - [`AuthService::begin_flow_when_idle`] queues until the slot is free (used
//!   by route guards, login and logout).
//!
//! Both return a [`FlowGuard`] which frees the slot when dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::context::Context;
use crate::error::{AuthError, Result};
use crate::flows::{
    AuthRouteFlow, CheckUsernameFlow, FlowKind, LoginFlow, LogoutFlow, PrivateRouteFlow,
    PublicRouteFlow, RefreshContextFlow,
};
use crate::mediator::RequestMediator;
use crate::provider::{AuthProvider, CredentialSigner, LoginInput};
use crate::routing::Router;
use crate::state_manager::StateManager;
use crate::storage::{MemoryStorage, SessionStorage};
use crate::transport::ApiTransport;

/// Shared root of the orchestration layer
pub struct AuthService {
    config: AuthConfig,
    clock: Arc<dyn Clock>,
    state_manager: Arc<StateManager>,
    storage: Arc<dyn SessionStorage>,
    transport: Arc<dyn ApiTransport>,
    router: Arc<dyn Router>,
    provider: Arc<dyn AuthProvider>,
    signer: Arc<dyn CredentialSigner>,
    flight: watch::Sender<Option<FlowKind>>,
    initial_flow: Mutex<Option<FlowKind>>,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("state_manager", &self.state_manager)
            .field("current_flow", &self.current_flow())
            .finish_non_exhaustive()
    }
}

impl AuthService {
    pub fn builder() -> AuthServiceBuilder {
        AuthServiceBuilder::new()
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn state_manager(&self) -> &Arc<StateManager> {
        &self.state_manager
    }

    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    pub fn transport(&self) -> &Arc<dyn ApiTransport> {
        &self.transport
    }

    pub fn router(&self) -> &Arc<dyn Router> {
        &self.router
    }

    pub fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.provider
    }

    pub fn signer(&self) -> &Arc<dyn CredentialSigner> {
        &self.signer
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Validity of `context` under the service clock and configured margin
    pub fn is_context_valid(&self, context: &Context) -> bool {
        context.is_valid(self.clock.as_ref(), self.config.expiry_margin_secs)
    }

    /// Whether no flow is current
    pub fn can_run_flow(&self) -> bool {
        self.flight.borrow().is_none()
    }

    pub fn current_flow(&self) -> Option<FlowKind> {
        *self.flight.borrow()
    }

    /// The first flow that ever took the slot
    pub fn initial_flow(&self) -> Option<FlowKind> {
        *self.initial_flow.lock()
    }

    /// Take the slot or fail with `FlowAlreadyExecuting`
    pub fn try_begin_flow(self: &Arc<Self>, kind: FlowKind) -> Result<FlowGuard> {
        let mut running = None;
        let acquired = self.flight.send_if_modified(|slot| match *slot {
            Some(current) => {
                running = Some(current);
                false
            }
            None => {
                *slot = Some(kind);
                true
            }
        });

        if !acquired {
            let running = running.unwrap_or(kind);
            debug!(flow = %kind, running = %running, "Flow slot is taken");
            return Err(AuthError::FlowAlreadyExecuting {
                running,
                requested: kind,
            });
        }

        {
            let mut initial = self.initial_flow.lock();
            if initial.is_none() {
                *initial = Some(kind);
            }
        }

        debug!(flow = %kind, "Flow started");
        Ok(FlowGuard {
            service: self.clone(),
            kind,
        })
    }

    /// Take the slot, waiting for the current flow to exit first
    ///
    /// Fails with `Aborted` if `abort` fires while waiting.
    pub async fn begin_flow_when_idle(
        self: &Arc<Self>,
        kind: FlowKind,
        abort: &CancellationToken,
    ) -> Result<FlowGuard> {
        let mut rx = self.flight.subscribe();
        loop {
            if abort.is_cancelled() {
                return Err(AuthError::Aborted);
            }

            match self.try_begin_flow(kind) {
                Ok(guard) => return Ok(guard),
                Err(AuthError::FlowAlreadyExecuting { running, .. }) => {
                    debug!(flow = %kind, running = %running, "Queued behind running flow");
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                biased;
                _ = abort.cancelled() => return Err(AuthError::Aborted),
                idle = async { rx.wait_for(|slot| slot.is_none()).await.is_ok() } => {
                    if !idle {
                        return Err(AuthError::internal("flow slot closed"));
                    }
                }
            }
        }
    }

    fn release_flow(&self, kind: FlowKind) {
        let released = self.flight.send_if_modified(|slot| {
            if *slot == Some(kind) {
                *slot = None;
                true
            } else {
                false
            }
        });
        if released {
            debug!(flow = %kind, "Flow exited");
        }
    }

    pub fn login_flow(self: &Arc<Self>, input: LoginInput) -> LoginFlow {
        LoginFlow::new(self.clone(), input)
    }

    pub fn logout_flow(self: &Arc<Self>) -> LogoutFlow {
        LogoutFlow::new(self.clone())
    }

    pub fn private_route_flow(self: &Arc<Self>) -> PrivateRouteFlow {
        PrivateRouteFlow::new(self.clone())
    }

    pub fn public_route_flow(self: &Arc<Self>) -> PublicRouteFlow {
        PublicRouteFlow::new(self.clone())
    }

    pub fn auth_route_flow(self: &Arc<Self>) -> AuthRouteFlow {
        AuthRouteFlow::new(self.clone())
    }

    pub fn refresh_context_flow(self: &Arc<Self>) -> RefreshContextFlow {
        RefreshContextFlow::new(self.clone())
    }

    pub fn check_username_flow(self: &Arc<Self>, username: impl Into<String>) -> CheckUsernameFlow {
        CheckUsernameFlow::new(self.clone(), username)
    }

    pub fn mediator(self: &Arc<Self>) -> RequestMediator {
        RequestMediator::new(self.clone())
    }
}

/// Ownership of the single-flight slot
///
/// Dropping the guard frees the slot.
#[derive(Debug)]
pub struct FlowGuard {
    service: Arc<AuthService>,
    kind: FlowKind,
}

impl FlowGuard {
    pub fn kind(&self) -> FlowKind {
        self.kind
    }
}

impl Drop for FlowGuard {
    fn drop(&mut self) {
        self.service.release_flow(self.kind);
    }
}

/// Builder for [`AuthService`]
///
/// Transport, router, provider and signer are required. Storage defaults to
/// [`MemoryStorage`], the clock to [`SystemClock`], the configuration to
/// [`AuthConfig::default`].
#[derive(Default)]
pub struct AuthServiceBuilder {
    config: Option<AuthConfig>,
    clock: Option<Arc<dyn Clock>>,
    storage: Option<Arc<dyn SessionStorage>>,
    transport: Option<Arc<dyn ApiTransport>>,
    router: Option<Arc<dyn Router>>,
    provider: Option<Arc<dyn AuthProvider>>,
    signer: Option<Arc<dyn CredentialSigner>>,
}

impl AuthServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: AuthConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn ApiTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn CredentialSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn build(self) -> Result<Arc<AuthService>> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let transport = self.transport.ok_or_else(|| missing("transport"))?;
        let router = self.router.ok_or_else(|| missing("router"))?;
        let provider = self.provider.ok_or_else(|| missing("provider"))?;
        let signer = self.signer.ok_or_else(|| missing("signer"))?;

        let state_manager = Arc::new(StateManager::new(
            config.state_channel_capacity,
            config.history_capacity,
        ));
        let (flight, _) = watch::channel(None);

        info!(
            expiry_margin_secs = config.expiry_margin_secs,
            "Auth service ready"
        );

        Ok(Arc::new(AuthService {
            config,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            state_manager,
            storage: self
                .storage
                .unwrap_or_else(|| Arc::new(MemoryStorage::new())),
            transport,
            router,
            provider,
            signer,
            flight,
            initial_flow: Mutex::new(None),
        }))
    }
}

fn missing(collaborator: &str) -> AuthError {
    AuthError::ConfigError(format!("{} is required", collaborator))
}


#[cfg(test)]
mod tests {
    use super::test_support::{service, Unreachable};
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_builder_requires_collaborators() {
        let err = AuthService::builder().build().unwrap_err();
        assert_eq!(err, AuthError::ConfigError("transport is required".to_string()));

        let inert = Arc::new(Unreachable);
        let err = AuthService::builder()
            .transport(inert.clone())
            .router(inert.clone())
            .provider(inert)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "ConfigError");
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let inert = Arc::new(Unreachable);
        let err = AuthService::builder()
            .config(AuthConfig::default().with_expiry_margin(-5))
            .transport(inert.clone())
            .router(inert.clone())
            .provider(inert.clone())
            .signer(inert)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "ConfigError");
    }

    #[test]
    fn test_try_begin_is_exclusive_and_guard_releases() {
        let service = service();
        assert!(service.can_run_flow());

        let guard = service.try_begin_flow(FlowKind::RefreshContext).unwrap();
        assert_eq!(guard.kind(), FlowKind::RefreshContext);
        assert!(!service.can_run_flow());
        assert_eq!(service.current_flow(), Some(FlowKind::RefreshContext));

        let err = service.try_begin_flow(FlowKind::Login).unwrap_err();
        assert_eq!(
            err,
            AuthError::FlowAlreadyExecuting {
                running: FlowKind::RefreshContext,
                requested: FlowKind::Login,
            }
        );

        drop(guard);
        assert!(service.can_run_flow());
        assert!(service.try_begin_flow(FlowKind::Login).is_ok());
    }

    #[test]
    fn test_initial_flow_is_recorded_once() {
        let service = service();
        assert_eq!(service.initial_flow(), None);

        drop(service.try_begin_flow(FlowKind::PublicRoute).unwrap());
        drop(service.try_begin_flow(FlowKind::Login).unwrap());

        assert_eq!(service.initial_flow(), Some(FlowKind::PublicRoute));
    }

    #[test]
    fn test_queued_flow_starts_when_slot_frees() {
        let service = service();
        let abort = CancellationToken::new();
        let running = service.try_begin_flow(FlowKind::PrivateRoute).unwrap();

        let mut queued = task::spawn(service.begin_flow_when_idle(FlowKind::PublicRoute, &abort));
        assert_pending!(queued.poll());

        drop(running);
        assert!(queued.is_woken());
        let guard = assert_ready!(queued.poll()).unwrap();
        assert_eq!(guard.kind(), FlowKind::PublicRoute);
        assert_eq!(service.current_flow(), Some(FlowKind::PublicRoute));
    }

    #[test]
    fn test_queued_flow_can_be_aborted() {
        let service = service();
        let abort = CancellationToken::new();
        let _running = service.try_begin_flow(FlowKind::Login).unwrap();

        let mut queued = task::spawn(service.begin_flow_when_idle(FlowKind::Logout, &abort));
        assert_pending!(queued.poll());

        abort.cancel();
        let err = assert_ready!(queued.poll()).unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(service.current_flow(), Some(FlowKind::Login));
    }
}

//! Mock collaborators shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{encode, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

use warden_auth_core::permit::decode_claims;
use warden_auth_core::{
    ApiTransport, AuthConfig, AuthError, AuthMode, AuthProvider, AuthService, Clock,
    CredentialSigner, LoginInput, ManualClock, MemoryStorage, QueryRequest, Result, Router,
    SessionRecord, SessionStorage, SignRequest, StorageKeys,
};

pub const NOW: i64 = 1_700_000_000;
pub const SECRET: &[u8] = b"integration-test-secret";

pub fn token(subject: &str, issued_at: i64, expiry: i64) -> String {
    encode(
        &Header::default(),
        &json!({ "sub": subject, "iat": issued_at, "exp": expiry }),
        &EncodingKey::from_secret(SECRET),
    )
    .unwrap()
}

/// Blocks calls until released when armed
#[derive(Default)]
pub struct Gate {
    armed: Mutex<Option<Arc<Notify>>>,
}

impl Gate {
    pub fn arm(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.armed.lock() = Some(notify.clone());
        notify
    }

    pub async fn pass(&self) {
        let armed = self.armed.lock().clone();
        if let Some(notify) = armed {
            notify.notified().await;
        }
    }
}

#[derive(Default)]
pub struct MockSigner {
    pub calls: AtomicUsize,
    pub failure: Mutex<Option<AuthError>>,
    pub gate: Gate,
}

impl MockSigner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_with(&self, error: AuthError) {
        *self.failure.lock() = Some(error);
    }
}

#[async_trait]
impl CredentialSigner for MockSigner {
    async fn sign(&self, request: SignRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        Ok(token(&request.subject, request.issued_at, request.expires_at))
    }
}

pub struct MockProvider {
    clock: Arc<ManualClock>,
    users: Mutex<HashMap<String, String>>,
    pub logins: AtomicUsize,
    pub gate: Gate,
}

impl MockProvider {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        let mut users = HashMap::new();
        users.insert("alice".to_string(), "wonderland".to_string());
        Self {
            clock,
            users: Mutex::new(users),
            logins: AtomicUsize::new(0),
            gate: Gate::default(),
        }
    }
}

#[async_trait]
impl AuthProvider for MockProvider {
    async fn login(&self, input: &LoginInput) -> Result<String> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        let known = self.users.lock().get(&input.username).cloned();
        match known {
            Some(password) if password == input.password => {
                let now = self.clock.now();
                Ok(token(&input.username, now, now + 3600))
            }
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        Ok(self.users.lock().contains_key(username))
    }
}

/// What the transport saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub auth_mode: AuthMode,
    pub token: Option<String>,
    pub query: String,
}

#[derive(Default)]
pub struct MockTransport {
    pub seen: Mutex<Vec<SeenRequest>>,
    pub identity_failure: Mutex<Option<AuthError>>,
    /// Scripted results for non-identity queries, consumed in order
    pub scripted: Mutex<VecDeque<Result<Value>>>,
}

impl MockTransport {
    pub fn script(&self, result: Result<Value>) {
        self.scripted.lock().push_back(result);
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl ApiTransport for MockTransport {
    async fn run_query(&self, request: QueryRequest) -> Result<Value> {
        self.seen.lock().push(SeenRequest {
            auth_mode: request.auth_mode,
            token: request.token.clone(),
            query: request.query.clone(),
        });

        if request.query.contains("query Me") {
            if let Some(error) = self.identity_failure.lock().clone() {
                return Err(error);
            }
            let token = request.token.ok_or(AuthError::ProviderNotAuthorized)?;
            let (claims, _) = decode_claims(&token)?;
            return Ok(json!({
                "me": {
                    "id": format!("id-{}", claims.subject),
                    "email": format!("{}@example.com", claims.subject),
                    "firstName": claims.subject,
                }
            }));
        }

        self.scripted
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({ "ok": true })))
    }
}

#[derive(Default)]
pub struct RecordingRouter {
    pub redirects: Mutex<Vec<String>>,
}

impl RecordingRouter {
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().clone()
    }
}

impl Router for RecordingRouter {
    fn execute_redirect(&self, path: &str) {
        self.redirects.lock().push(path.to_string());
    }
}

pub struct Harness {
    pub service: Arc<AuthService>,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<MemoryStorage>,
    pub transport: Arc<MockTransport>,
    pub router: Arc<RecordingRouter>,
    pub provider: Arc<MockProvider>,
    pub signer: Arc<MockSigner>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AuthConfig::default())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        let clock = Arc::new(ManualClock::new(NOW));
        let storage = Arc::new(MemoryStorage::new());
        let transport = Arc::new(MockTransport::default());
        let router = Arc::new(RecordingRouter::default());
        let provider = Arc::new(MockProvider::new(clock.clone()));
        let signer = Arc::new(MockSigner::default());

        let service = AuthService::builder()
            .config(config)
            .clock(clock.clone())
            .storage(storage.clone())
            .transport(transport.clone())
            .router(router.clone())
            .provider(provider.clone())
            .signer(signer.clone())
            .build()
            .unwrap();

        Self {
            service,
            clock,
            storage,
            transport,
            router,
            provider,
            signer,
        }
    }

    pub fn keys(&self) -> StorageKeys {
        self.service.config().storage_keys.clone()
    }

    /// Persist a session for `username` that lasts until `expires`
    pub fn seed_session(&self, username: &str, expires: i64) {
        SessionRecord {
            username: username.to_string(),
            token: token(username, NOW - 60, expires),
            expires,
        }
        .save(self.storage.as_ref(), &self.keys());
    }

    pub fn stored_record(&self) -> Option<SessionRecord> {
        SessionRecord::load(self.storage.as_ref(), &self.keys())
    }

    pub fn storage_is_empty(&self) -> bool {
        let keys = self.keys();
        [keys.token, keys.username, keys.expires]
            .iter()
            .all(|key| self.storage.get(key).is_none())
    }
}

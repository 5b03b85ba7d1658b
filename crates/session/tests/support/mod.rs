#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tokio::sync::oneshot;

use learnhub_auth::{IdentitySnapshot, Permission, Role};
use learnhub_core::{ResourceId, UserId};
use learnhub_session::{
    AuthBackend, AuthMachine, BackendError, Credentials, InMemoryTokenStorage, LoginResponse, ManualClock,
    RegistrationPayload, RegistrationResponse, SessionConfig, StorageError, SwitchRoleResponse, TokenPair,
    TokenStorage,
};

pub type Reply<T> = Result<T, BackendError>;

enum Scripted<T> {
    Ready(Reply<T>),
    Held(oneshot::Receiver<Reply<T>>),
}

/// Queue of replies for one endpoint, consumed in call order.
pub struct Script<T> {
    replies: Mutex<VecDeque<Scripted<T>>>,
    calls: AtomicUsize,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl<T> Script<T> {
    pub fn push(&self, reply: Reply<T>) {
        self.replies.lock().unwrap().push_back(Scripted::Ready(reply));
    }

    /// Queue a reply that is only delivered once the returned sender fires.
    pub fn hold(&self) -> oneshot::Sender<Reply<T>> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().unwrap().push_back(Scripted::Held(rx));
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next(&self) -> Reply<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.replies.lock().unwrap().pop_front();
        match scripted {
            Some(Scripted::Ready(reply)) => reply,
            Some(Scripted::Held(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(BackendError::Transport("held reply dropped".into()))),
            None => Err(BackendError::Transport("no scripted reply".into())),
        }
    }
}

#[derive(Default)]
pub struct ScriptedBackend {
    pub login: Script<LoginResponse>,
    pub register: Script<RegistrationResponse>,
    pub refresh: Script<TokenPair>,
    pub identity: Script<IdentitySnapshot>,
    pub switch: Script<SwitchRoleResponse>,
    pub logout: Script<()>,
    /// Access tokens presented to `current_identity`, in call order.
    pub identity_tokens: Mutex<Vec<String>>,
}

#[async_trait]
impl AuthBackend for ScriptedBackend {
    async fn login(&self, _credentials: &Credentials) -> Result<LoginResponse, BackendError> {
        self.login.next().await
    }

    async fn register(&self, _payload: &RegistrationPayload) -> Result<RegistrationResponse, BackendError> {
        self.register.next().await
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, BackendError> {
        self.refresh.next().await
    }

    async fn current_identity(&self, access_token: &str) -> Result<IdentitySnapshot, BackendError> {
        self.identity_tokens.lock().unwrap().push(access_token.to_string());
        self.identity.next().await
    }

    async fn switch_role(&self, _access_token: &str, _role: Role) -> Result<SwitchRoleResponse, BackendError> {
        self.switch.next().await
    }

    async fn logout(&self, _access_token: &str) -> Result<(), BackendError> {
        self.logout.next().await
    }
}

/// In-memory storage whose saves can be made to fail.
#[derive(Default)]
pub struct FlakyTokenStorage {
    inner: InMemoryTokenStorage,
    fail_saves: AtomicBool,
}

impl FlakyTokenStorage {
    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            inner: InMemoryTokenStorage::with_tokens(tokens),
            fail_saves: AtomicBool::new(false),
        }
    }

    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }
}

impl TokenStorage for FlakyTokenStorage {
    fn load(&self) -> Result<Option<TokenPair>, StorageError> {
        self.inner.load()
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Io("disk full".into()));
        }
        self.inner.save(tokens)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.inner.clear()
    }
}

/// HS256 test token expiring `expires_in` from now.
pub fn mint_token(subject: &str, expires_in: Duration) -> String {
    let now = Utc::now();
    let claims = serde_json::json!({
        "sub": subject,
        "iat": (now - Duration::minutes(1)).timestamp(),
        "exp": (now + expires_in).timestamp(),
    });
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(b"test-secret"))
        .expect("failed to encode jwt")
}

pub fn fresh_pair(tag: &str) -> TokenPair {
    TokenPair::new(mint_token(tag, Duration::minutes(15)), format!("refresh-{tag}"))
}

pub fn expired_pair(tag: &str) -> TokenPair {
    TokenPair::new(mint_token(tag, Duration::minutes(-5)), format!("refresh-{tag}"))
}

/// Identity with each role's dashboard permission granted.
pub fn snapshot(roles: &[&str]) -> IdentitySnapshot {
    let permissions: BTreeMap<String, bool> = roles
        .iter()
        .filter_map(|r| r.parse::<Role>().ok())
        .map(|r| (Permission::dashboard(r).to_string(), true))
        .collect();

    IdentitySnapshot {
        id: UserId::new("u-1").unwrap(),
        email: "ada@example.com".to_string(),
        profile: serde_json::json!({ "display_name": "Ada" }),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        active_role: None,
        permissions,
        qualified_resources: vec![ResourceId::new("course-101").unwrap()],
    }
}

pub fn login_response(roles: &[&str], tokens: TokenPair) -> LoginResponse {
    LoginResponse {
        user: snapshot(roles),
        tokens,
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("ada@example.com", "correct horse")
}

pub fn registration() -> RegistrationPayload {
    RegistrationPayload {
        email: "grace@example.com".to_string(),
        password: "correct horse".to_string(),
        display_name: Some("Grace".to_string()),
        requested_roles: vec![Role::Guardian],
        extra: serde_json::json!({ "children": ["u-7"] }),
    }
}

pub struct Harness {
    pub machine: Arc<AuthMachine>,
    pub backend: Arc<ScriptedBackend>,
    pub storage: Arc<InMemoryTokenStorage>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(InMemoryTokenStorage::new())
    }

    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self::build(InMemoryTokenStorage::with_tokens(tokens))
    }

    fn build(storage: InMemoryTokenStorage) -> Self {
        learnhub_observability::init_for_tests();

        let backend = Arc::new(ScriptedBackend::default());
        let storage = Arc::new(storage);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let machine = AuthMachine::new(SessionConfig::default(), backend.clone(), storage.clone())
            .with_clock(clock.clone());

        Self {
            machine: Arc::new(machine),
            backend,
            storage,
            clock,
        }
    }

    /// Machine that resumed a persisted session with `roles`.
    pub async fn signed_in(roles: &[&str]) -> Self {
        let harness = Self::with_tokens(fresh_pair("initial"));
        harness.backend.identity.push(Ok(snapshot(roles)));
        harness.machine.initialize().await.unwrap();
        harness
    }

    /// Machine settled in `Unauthenticated` with nothing persisted.
    pub async fn signed_out() -> Self {
        let harness = Self::new();
        harness.machine.initialize().await.unwrap();
        harness
    }
}

/// Yield to the runtime until `condition` holds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

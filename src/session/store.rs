//! The session store: single source of truth for who is logged in.

use super::model::{LoginResponse, RegisterBody, RegisterRequest, Role, SessionSnapshot, User};
use super::persist::{PersistedSession, SessionStorage};
use crate::error::{ClientError, Result};
use crate::transport::{ApiRequest, HttpTransport, RequestBody};
use std::sync::Arc;
use tokio::sync::watch;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";

/// Session state container. One per application root.
///
/// Mutations are published through a `watch` channel so UI layers can react
/// without polling. User and token are only ever written together.
pub struct SessionStore {
    state: watch::Sender<SessionSnapshot>,
    transport: Arc<HttpTransport>,
    storage: Arc<dyn SessionStorage>,
}

impl SessionStore {
    pub fn new(transport: Arc<HttpTransport>, storage: Arc<dyn SessionStorage>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            state,
            transport,
            storage,
        }
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    pub fn role(&self) -> Option<Role> {
        self.state.borrow().role()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn hydrated(&self) -> bool {
        self.state.borrow().hydrated
    }

    pub(crate) fn storage(&self) -> Arc<dyn SessionStorage> {
        self.storage.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Resolve once `hydrated` has latched to `true`.
    pub async fn wait_hydrated(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|s| s.hydrated).await;
    }

    // ── Operations ───────────────────────────────────────────

    /// Exchange credentials for a bearer token.
    ///
    /// Credentials go out form-encoded. On failure the store is untouched
    /// and the server's error propagates unchanged. No retries.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ClientError::Validation(
                "username and password are required".into(),
            ));
        }

        let form = RequestBody::Form(vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ]);
        let response = self
            .transport
            .send(ApiRequest::post(LOGIN_PATH).body(form).without_session())
            .await
            .inspect_err(|e| tracing::info!(username, "Login rejected: {e}"))?;

        let LoginResponse { access_token, user } = response.json()?;
        tracing::info!(username = %user.username, role = %user.role, "Logged in");

        self.transport.set_default_authorization(&access_token);
        self.install(user, access_token);
        self.persist_blocking().await;
        Ok(())
    }

    /// Create an account, then log in with the same credentials.
    ///
    /// Registration alone never establishes a session. If the follow-up
    /// login fails, its error is returned even though the account now exists.
    pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
        let student_id = validate_registration(request)?;

        let body = RegisterBody {
            username: &request.username,
            password: &request.password,
            role: request.role,
            invite_code: &request.invite_code,
            student_id,
        };
        self.transport
            .send(
                ApiRequest::post(REGISTER_PATH)
                    .body(RequestBody::json(&body)?)
                    .without_session(),
            )
            .await?;
        tracing::info!(username = %request.username, role = %request.role, "Account registered");

        self.login(&request.username, &request.password)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    username = %request.username,
                    "Account created but automatic login failed: {e}"
                )
            })
    }

    /// Drop the session. Local only; nothing is sent to the server. The
    /// record write is synchronous since logout has no await point.
    pub fn logout(&self) {
        self.transport.clear_default_authorization();
        self.clear_credentials();
        self.persist();
        tracing::info!("Logged out");
    }

    /// One-way hydration latch. Writes after the first `true` are ignored,
    /// and observers are only notified on the transition.
    pub fn set_hydrated(&self, flag: bool) {
        let changed = self.state.send_if_modified(|s| {
            if s.hydrated || !flag {
                return false;
            }
            s.hydrated = true;
            true
        });
        if changed {
            tracing::debug!(authenticated = self.is_authenticated(), "Session hydrated");
        }
    }

    /// Install a user/token pair restored from storage. A record missing
    /// either half is ignored. Returns whether a session was applied.
    pub fn apply_restored(&self, record: &PersistedSession) -> bool {
        let Some((user, token)) = record.credentials() else {
            return false;
        };
        tracing::info!(username = %user.username, "Restored persisted session");
        self.transport.set_default_authorization(&token);
        self.install(user, token);
        true
    }

    /// Forced clear after the server rejected the credential. The persisted
    /// record is the caller's to delete.
    pub(crate) fn evict(&self) {
        self.transport.clear_default_authorization();
        self.clear_credentials();
    }

    // ── Internals ────────────────────────────────────────────

    fn install(&self, user: User, token: String) {
        self.state.send_modify(|s| {
            s.user = Some(user);
            s.token = Some(token);
            s.is_authenticated = true;
        });
    }

    fn clear_credentials(&self) {
        self.state.send_modify(|s| {
            s.user = None;
            s.token = None;
            s.is_authenticated = false;
        });
    }

    fn record(&self) -> PersistedSession {
        PersistedSession::from_snapshot(&self.state.borrow())
    }

    fn persist(&self) {
        if let Err(e) = self.storage.save(&self.record()) {
            tracing::warn!("Failed to persist session: {e}");
        }
    }

    /// Same as [`Self::persist`], with the storage write on the blocking pool.
    async fn persist_blocking(&self) {
        let record = self.record();
        let storage = self.storage.clone();
        match tokio::task::spawn_blocking(move || storage.save(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to persist session: {e}"),
            Err(e) => tracing::warn!("Session persist task failed: {e}"),
        }
    }
}

/// Client-side checks run before any network call. Returns the student id
/// to send, which is always `None` for teachers. Blank checks trim; the id
/// itself goes out as typed.
fn validate_registration(request: &RegisterRequest) -> Result<Option<&str>> {
    if request.username.trim().is_empty() || request.password.is_empty() {
        return Err(ClientError::Validation(
            "username and password are required".into(),
        ));
    }
    if request.invite_code.trim().is_empty() {
        return Err(ClientError::Validation("an invite code is required".into()));
    }
    match request.role {
        Role::Teacher => Ok(None),
        Role::Student => request
            .student_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .map(Some)
            .ok_or_else(|| {
                ClientError::Validation("a student ID is required to register as a student".into())
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::persist::MemorySessionStorage;
    use std::time::Duration;

    fn store() -> (Arc<HttpTransport>, Arc<MemorySessionStorage>, SessionStore) {
        // Port 9 (discard): any accidental network call fails fast.
        let transport =
            Arc::new(HttpTransport::new("http://127.0.0.1:9/api", Duration::from_secs(1)).unwrap());
        let storage = Arc::new(MemorySessionStorage::new());
        let store = SessionStore::new(transport.clone(), storage.clone());
        (transport, storage, store)
    }

    fn alice_record() -> PersistedSession {
        PersistedSession::from_snapshot(&SessionSnapshot {
            user: Some(User {
                id: 1,
                username: "alice".into(),
                role: Role::Teacher,
                class_id: "101".into(),
                student_id: None,
            }),
            token: Some("tok123".into()),
            is_authenticated: true,
            hydrated: false,
        })
    }

    fn assert_consistent(s: &SessionSnapshot) {
        assert_eq!(s.token.is_some(), s.user.is_some());
        assert_eq!(s.token.is_some(), s.is_authenticated);
    }

    fn student(student_id: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            username: "carol".into(),
            password: "pw".into(),
            role: Role::Student,
            invite_code: "student-101".into(),
            student_id: student_id.map(str::to_string),
        }
    }

    #[test]
    fn starts_empty_and_unhydrated() {
        let (_, _, store) = store();
        let s = store.snapshot();
        assert_eq!(s, SessionSnapshot::default());
        assert_consistent(&s);
    }

    #[test]
    fn set_hydrated_latches_once() {
        let (_, _, store) = store();
        let mut rx = store.subscribe();
        rx.mark_unchanged();

        store.set_hydrated(false);
        assert!(!store.hydrated());
        assert!(!rx.has_changed().unwrap());

        store.set_hydrated(true);
        assert!(store.hydrated());
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        store.set_hydrated(true);
        store.set_hydrated(false);
        assert!(store.hydrated());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn apply_restored_installs_user_token_and_default_header() {
        let (transport, _, store) = store();
        assert!(store.apply_restored(&alice_record()));

        let s = store.snapshot();
        assert_consistent(&s);
        assert_eq!(s.token.as_deref(), Some("tok123"));
        assert_eq!(s.role(), Some(Role::Teacher));
        assert_eq!(transport.default_authorization().as_deref(), Some("Bearer tok123"));
    }

    #[test]
    fn apply_restored_ignores_half_records() {
        let (transport, _, store) = store();
        let mut record = alice_record();
        record.state.token = None;

        assert!(!store.apply_restored(&record));
        assert_consistent(&store.snapshot());
        assert!(!store.is_authenticated());
        assert!(transport.default_authorization().is_none());
    }

    #[test]
    fn logout_clears_state_header_and_persists_empty_record() {
        let (transport, storage, store) = store();
        store.apply_restored(&alice_record());

        store.logout();

        let s = store.snapshot();
        assert_consistent(&s);
        assert!(!s.is_authenticated);
        assert!(transport.default_authorization().is_none());
        let persisted = storage.load().unwrap().unwrap();
        assert_eq!(persisted.state, Default::default());
    }

    #[test]
    fn evict_clears_memory_but_not_storage() {
        let (transport, storage, store) = store();
        storage.save(&alice_record()).unwrap();
        store.apply_restored(&alice_record());

        store.evict();

        assert!(!store.is_authenticated());
        assert!(transport.default_authorization().is_none());
        assert!(storage.load().unwrap().is_some());
    }

    #[tokio::test]
    async fn login_rejects_empty_credentials_before_network() {
        let (_, _, store) = store();
        for (username, password) in [("", "pw"), ("   ", "pw"), ("alice", "")] {
            let err = store.login(username, password).await.unwrap_err();
            assert_eq!(err.user_message(""), "username and password are required");
        }
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn register_student_without_id_is_rejected() {
        let (_, _, store) = store();
        for id in [None, Some(""), Some("   ")] {
            let err = store.register(&student(id)).await.unwrap_err();
            assert_eq!(
                err.user_message(""),
                "a student ID is required to register as a student"
            );
        }
    }

    #[tokio::test]
    async fn register_requires_invite_code() {
        let (_, _, store) = store();
        let mut request = student(Some("S-1"));
        request.invite_code = String::new();
        let err = store.register(&request).await.unwrap_err();
        assert_eq!(err.user_message(""), "an invite code is required");
    }

    #[test]
    fn teacher_registration_never_sends_student_id() {
        let request = RegisterRequest {
            username: "bob".into(),
            password: "pw".into(),
            role: Role::Teacher,
            invite_code: "teacher-101".into(),
            student_id: Some("S-9".into()),
        };
        assert_eq!(validate_registration(&request).unwrap(), None);
        assert_eq!(validate_registration(&student(Some(" S-1 "))).unwrap(), Some(" S-1 "));
    }

    #[tokio::test]
    async fn wait_hydrated_resolves_after_latch() {
        let (_, _, store) = store();
        let store = Arc::new(store);
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_hydrated().await })
        };
        store.set_hydrated(true);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}

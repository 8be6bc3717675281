use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::backend::{MemoryBackend, SessionBackend};
use super::cookies::SessionCookies;
use super::session::{AccessToken, RenewalToken, Session};

/// Process-wide owner of the session credentials.
///
/// Clone is cheap and every clone refers to the same slot. All reads and
/// writes go through one mutex, and the backend is written while that mutex
/// is held, so the persisted copy never lags behind or races the in-memory one.
/// Backend failures are logged and otherwise ignored: the in-memory session
/// stays authoritative for the rest of the run.
///
/// The store also owns the cookie jar used by the implicit renewal flow.
/// Cookies received since the last write are saved along with the tokens.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Mutex<StoreInner>>,
    cookies: Arc<SessionCookies>,
}

struct StoreInner {
    session: Session,
    backend: Arc<dyn SessionBackend>,
}

impl StoreInner {
    // Backends may hit the disk, the keychain or a key derivation, so they
    // run on the blocking pool. The store lock stays held until they finish.
    async fn persist(&mut self) {
        self.session.updated_at = Some(Utc::now());
        let backend = Arc::clone(&self.backend);
        let session = self.session.clone();
        match tokio::task::spawn_blocking(move || backend.save(&session)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to persist session"),
            Err(e) => warn!(error = %e, "Session write task failed"),
        }
    }

    async fn erase(&mut self) {
        self.session = Session::default();
        let backend = Arc::clone(&self.backend);
        match tokio::task::spawn_blocking(move || backend.clear()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to clear persisted session"),
            Err(e) => warn!(error = %e, "Session clear task failed"),
        }
    }
}

impl CredentialStore {
    /// Open a store over `backend`, seeding it with whatever the backend holds.
    pub fn new(backend: Box<dyn SessionBackend>) -> Self {
        let session = match backend.load() {
            Ok(Some(session)) => {
                debug!(authenticated = session.is_authenticated(), "Session loaded");
                session
            }
            Ok(None) => Session::default(),
            Err(e) => {
                warn!(error = %e, "Failed to load session, starting anonymous");
                Session::default()
            }
        };

        let cookies = Arc::new(SessionCookies::default());
        cookies.restore(&session.cookies);

        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                session,
                backend: Arc::from(backend),
            })),
            cookies,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend))
    }

    /// Cookie jar to hand to the HTTP client in the implicit renewal flow.
    pub fn cookies(&self) -> Arc<SessionCookies> {
        Arc::clone(&self.cookies)
    }

    /// Snapshot of the current credentials.
    pub async fn get(&self) -> Session {
        self.inner.lock().await.session.clone()
    }

    pub async fn access_token(&self) -> Option<AccessToken> {
        self.inner.lock().await.session.access_token.clone()
    }

    pub async fn refresh_token(&self) -> Option<RenewalToken> {
        self.inner.lock().await.session.refresh_token.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.lock().await.session.is_authenticated()
    }

    /// Replace the access token. `None` leaves the stored value alone.
    pub async fn set_access(&self, token: Option<AccessToken>) {
        self.update(token, None).await;
    }

    /// Replace the renewal token. `None` leaves the stored value alone.
    pub async fn set_renewal(&self, token: Option<RenewalToken>) {
        self.update(None, token).await;
    }

    /// Apply both setters under a single lock acquisition.
    pub async fn update(&self, access: Option<AccessToken>, renewal: Option<RenewalToken>) {
        if access.is_none() && renewal.is_none() {
            return;
        }
        let mut inner = self.inner.lock().await;
        if let Some(token) = access {
            inner.session.access_token = Some(token);
        }
        if let Some(token) = renewal {
            inner.session.refresh_token = Some(token);
        }
        inner.session.cookies = self.cookies.snapshot();
        inner.persist().await;
    }

    /// Erase both credentials and the cookie jar. Safe to call when already empty.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        self.cookies.reset();
        inner.erase().await;
        debug!("Session cleared");
    }
}

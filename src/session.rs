use crate::auth::{AuthProvider, Identity};
use crate::error::ConsoleError;
use crate::store::{self, LiveStore};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;

pub const LOGIN_FAILED: &str = "Error: Email o contraseña incorrectos.";
pub const ACCESS_DENIED: &str = "Error: No tienes permisos de administrador.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    Login { error: Option<String> },
    RoleChecking,
    Admin { identity: Identity },
}

impl Screen {
    pub fn login() -> Self {
        Screen::Login { error: None }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Screen::Admin { .. })
    }
}

struct Session {
    identity: Identity,
    state: watch::Sender<Screen>,
    last_seen: Instant,
}

impl Session {
    /// Sessions with an open console socket are never idle.
    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        self.state.receiver_count() == 0 && now.duration_since(self.last_seen) > ttl
    }
}

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionRegistry {
    fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            ttl,
        }
    }

    fn open(&self, identity: Identity) -> String {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let session = Session {
            identity,
            state: watch::Sender::new(Screen::RoleChecking),
            last_seen: Instant::now(),
        };
        self.sessions
            .write()
            .expect("session registry poisoned")
            .insert(id.clone(), session);
        id
    }

    fn transition(&self, id: &str, screen: Screen) {
        if let Some(session) = self
            .sessions
            .read()
            .expect("session registry poisoned")
            .get(id)
        {
            session.state.send_replace(screen);
        }
    }

    fn close(&self, id: &str, screen: Screen) -> Option<Identity> {
        let session = self
            .sessions
            .write()
            .expect("session registry poisoned")
            .remove(id)?;
        session.state.send_replace(screen);
        Some(session.identity)
    }

    fn touch(&self, id: &str) {
        if let Some(session) = self
            .sessions
            .write()
            .expect("session registry poisoned")
            .get_mut(id)
        {
            session.last_seen = Instant::now();
        }
    }

    fn screen(&self, id: &str) -> Option<Screen> {
        let mut sessions = self.sessions.write().expect("session registry poisoned");
        let session = sessions.get_mut(id)?;
        session.last_seen = Instant::now();
        let screen = session.state.borrow().clone();
        Some(screen)
    }

    fn watch(&self, id: &str) -> Option<watch::Receiver<Screen>> {
        let mut sessions = self.sessions.write().expect("session registry poisoned");
        let session = sessions.get_mut(id)?;
        session.last_seen = Instant::now();
        Some(session.state.subscribe())
    }

    /// Removes idle sessions, sending their watchers back to login.
    fn expire(&self) -> Vec<Identity> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().expect("session registry poisoned");
        let idle: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| session.is_idle(now, self.ttl))
            .map(|(id, _)| id.clone())
            .collect();
        idle.into_iter()
            .filter_map(|id| sessions.remove(&id))
            .map(|session| {
                session.state.send_replace(Screen::login());
                session.identity
            })
            .collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions.read().expect("session registry poisoned").len()
    }
}

#[derive(Debug)]
pub struct SignInOutcome {
    pub session: Option<String>,
    pub screen: Screen,
}

/// Authenticates, checks the admin role once, and owns per-browser session state.
pub struct SessionGate {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn LiveStore>,
    admin_role: String,
    sessions: SessionRegistry,
}

impl SessionGate {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn LiveStore>,
        admin_role: String,
        session_ttl: Duration,
    ) -> Self {
        Self {
            auth,
            store,
            admin_role,
            sessions: SessionRegistry::new(session_ttl),
        }
    }

    /// Drops idle sessions and signs them out with the provider.
    fn reap(&self) {
        let expired = self.sessions.expire();
        if expired.is_empty() {
            return;
        }
        let auth = Arc::clone(&self.auth);
        tokio::spawn(async move {
            for identity in expired {
                tracing::info!("Session expired for {}", identity.uid);
                auth.sign_out(&identity).await;
            }
        });
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> SignInOutcome {
        self.reap();
        let identity = match self.auth.sign_in(email, password).await {
            Ok(identity) => identity,
            Err(source) => {
                let err = ConsoleError::AuthFailure { source };
                tracing::info!("Login rejected for {email}: {err}");
                return SignInOutcome {
                    session: None,
                    screen: Screen::Login {
                        error: Some(LOGIN_FAILED.to_string()),
                    },
                };
            }
        };

        let session = self.sessions.open(identity.clone());
        match self.check_role(&identity).await {
            Ok(()) => {
                tracing::info!("Admin session opened for {}", identity.uid);
                let screen = Screen::Admin { identity };
                self.sessions.transition(&session, screen.clone());
                SignInOutcome {
                    session: Some(session),
                    screen,
                }
            }
            Err(err) => {
                tracing::info!("{err}");
                let screen = Screen::Login {
                    error: Some(ACCESS_DENIED.to_string()),
                };
                self.sessions.close(&session, screen.clone());
                self.auth.sign_out(&identity).await;
                SignInOutcome {
                    session: None,
                    screen,
                }
            }
        }
    }

    async fn check_role(&self, identity: &Identity) -> Result<(), ConsoleError> {
        let denied = || ConsoleError::AuthorizationDenied {
            uid: identity.uid.clone(),
        };
        let role = match self.store.read_once(&store::role_path(&identity.uid)).await {
            Ok(role) => role,
            Err(err) => {
                tracing::warn!("Role lookup for {} failed: {err}", identity.uid);
                return Err(denied());
            }
        };
        if role.as_str() == Some(self.admin_role.as_str()) {
            Ok(())
        } else {
            Err(denied())
        }
    }

    pub async fn sign_out(&self, session: &str) {
        if let Some(identity) = self.sessions.close(session, Screen::login()) {
            self.auth.sign_out(&identity).await;
            tracing::info!("Session closed for {}", identity.uid);
        }
    }

    /// Unknown or expired sessions are on the login screen.
    pub fn screen(&self, session: &str) -> Screen {
        self.reap();
        self.sessions.screen(session).unwrap_or_else(Screen::login)
    }

    /// Current screen and every later transition for `session`.
    pub fn watch(&self, session: &str) -> Option<watch::Receiver<Screen>> {
        self.reap();
        self.sessions.watch(session)
    }

    /// Restarts the idle clock, e.g. when a console socket closes.
    pub fn touch(&self, session: &str) {
        self.sessions.touch(session);
    }
}

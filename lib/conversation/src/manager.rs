//! Registry of live sessions.
//!
//! The registry map is guarded by a plain mutex that is never held across an
//! await; each session sits behind its own async mutex, so events for one
//! user are handled one at a time while different users proceed in parallel.

use crate::menu::DialogOptions;
use crate::session::Session;
use crate::transport::Transport;
use deal_courier_core::ExternalUserId;
use deal_courier_crm::CrmActor;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as SessionLock;
use tracing::{info, warn};

/// A session shared between the registry and the task handling it.
pub type SharedSession = Arc<SessionLock<Session>>;

/// Owns every session in the process.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    options: Arc<DialogOptions>,
    sessions: Mutex<HashMap<ExternalUserId, SharedSession>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, options: DialogOptions) -> Self {
        Self {
            transport,
            options: Arc::new(options),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<ExternalUserId, SharedSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if the user has a session.
    #[must_use]
    pub fn exists(&self, user: ExternalUserId) -> bool {
        self.sessions().contains_key(&user)
    }

    /// Returns the user's session, if any.
    #[must_use]
    pub fn get(&self, user: ExternalUserId) -> Option<SharedSession> {
        self.sessions().get(&user).cloned()
    }

    /// Creates a session for an authenticated user.
    ///
    /// If the user already has one it is returned unchanged and `actor` is
    /// dropped.
    pub fn start(&self, user: ExternalUserId, actor: Arc<dyn CrmActor>) -> SharedSession {
        let mut sessions = self.sessions();
        if let Some(existing) = sessions.get(&user) {
            warn!(%user, "session already exists");
            return Arc::clone(existing);
        }
        let crm_user = actor.profile().id;
        let session = Session::new(
            user,
            actor,
            Arc::clone(&self.transport),
            Arc::clone(&self.options),
        );
        info!(%user, %crm_user, session = %session.id(), "session started");
        let session = Arc::new(SessionLock::new(session));
        sessions.insert(user, Arc::clone(&session));
        session
    }

    /// Ends the user's session.
    pub fn stop(&self, user: ExternalUserId) {
        if self.sessions().remove(&user).is_some() {
            info!(%user, "session stopped");
        } else {
            warn!(%user, "no session to stop");
        }
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

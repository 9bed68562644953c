/// Registry of running listen party sessions
use super::hub::{HubHandle, Outbound};
use crate::config::PartySettings;
use crate::error::{Result, ServerError};
use crate::services::catalog::TrackCatalog;
use orb_core::protocol::{EndReason, ServerMessage};
use orb_core::{GuestToken, ParticipantId, SessionId, UserId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

type Sessions = RwLock<HashMap<SessionId, HubHandle>>;

/// Live sessions by ID
///
/// A session is listed from `create` until its task exits; absence means
/// idle (never existed or already over).
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Sessions>,
    settings: PartySettings,
    catalog: Arc<dyn TrackCatalog>,
}

impl SessionRegistry {
    pub fn new(settings: PartySettings, catalog: Arc<dyn TrackCatalog>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            settings,
            catalog,
        }
    }

    pub fn settings(&self) -> &PartySettings {
        &self.settings
    }

    /// Start a session hosted by `host_id`
    pub fn create(&self, host_id: UserId, host_name: String) -> HubHandle {
        let sessions: Weak<Sessions> = Arc::downgrade(&self.sessions);
        let on_close = Box::new(move |session_id: &SessionId| {
            if let Some(sessions) = sessions.upgrade() {
                sessions.write().remove(session_id);
            }
        });

        let (handle, _task) = HubHandle::spawn(
            host_id,
            host_name,
            self.settings.clone(),
            Arc::clone(&self.catalog),
            on_close,
        );

        tracing::info!(
            session_id = %handle.session_id(),
            host_id = %handle.host_id(),
            "Listen party created"
        );
        self.sessions
            .write()
            .insert(handle.session_id().clone(), handle.clone());
        handle
    }

    /// Running session, `NotFound` if idle
    pub fn get(&self, session_id: &SessionId) -> Result<HubHandle> {
        self.sessions
            .read()
            .get(session_id)
            .filter(|h| !h.is_closed())
            .cloned()
            .ok_or_else(|| ServerError::NotFound(format!("Session {}", session_id)))
    }

    /// End a session on behalf of `user_id`, who must be its host
    pub async fn end(&self, session_id: &SessionId, user_id: &UserId) -> Result<()> {
        let handle = self.get(session_id)?;
        if !handle.is_host(user_id) {
            return Err(ServerError::Forbidden("Not the session host".to_string()));
        }

        self.sessions.write().remove(session_id);
        handle.end(EndReason::HostEnded).await
    }

    /// Participant a guest token belongs to, within one session
    pub async fn validate_guest_token(
        &self,
        session_id: &SessionId,
        token: &GuestToken,
    ) -> Result<ParticipantId> {
        let invalid = || ServerError::Unauthorized("Invalid or expired guest token".to_string());

        let handle = self.get(session_id).map_err(|_| invalid())?;
        handle
            .validate_token(token)
            .await
            .map_err(|_| invalid())?
            .ok_or_else(invalid)
    }

    /// A fresh bounded queue for one connection
    pub fn outbound_channel(&self) -> (Outbound, mpsc::Receiver<ServerMessage>) {
        mpsc::channel(self.settings.outbound_buffer.max(1))
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

//! The single database session of a running client.
//!
//! A [`Session`] owns the collaborator, the live handle (if any) and the
//! profile it was opened with. Nothing else ever holds the handle, so the
//! session is the one place that releases it: on disconnect, on reconnect,
//! after a failed schema scope, and from `Drop` when the session goes away
//! for any other reason (including unwinding out of a command handler).

use crate::error::CatastoError;
use crate::models::{ConnectionProfile, SessionStatus};
use crate::services::collaborator::{BoundGateway, Collaborator};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Connection lifecycle plus the resources it owns.
pub struct Session<C: Collaborator> {
    id: Uuid,
    collaborator: C,
    handle: Option<C::Handle>,
    profile: Option<ConnectionProfile>,
    status: SessionStatus,
    connected_at: Option<DateTime<Utc>>,
}

impl<C: Collaborator> Session<C> {
    /// Create a disconnected session around a collaborator.
    pub fn new(collaborator: C) -> Self {
        Self {
            id: Uuid::new_v4(),
            collaborator,
            handle: None,
            profile: None,
            status: SessionStatus::Disconnected,
            connected_at: None,
        }
    }

    /// Session identifier used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current status.
    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Whether a live, schema-scoped connection is held.
    pub fn is_connected(&self) -> bool {
        self.status.is_connected() && self.handle.is_some()
    }

    /// Whether a handle is currently held.
    pub fn holds_handle(&self) -> bool {
        self.handle.is_some()
    }

    /// Profile of the live connection.
    pub fn profile(&self) -> Option<&ConnectionProfile> {
        self.profile.as_ref()
    }

    /// When the live connection was established.
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    /// The collaborator this session talks to.
    pub fn collaborator(&self) -> &C {
        &self.collaborator
    }

    /// Open a connection for `profile`, replacing any existing one.
    ///
    /// On failure the status is `Failed` and no handle is held.
    pub fn connect(&mut self, profile: ConnectionProfile) -> Result<(), CatastoError> {
        self.teardown();
        if let Err(reason) = profile.validate() {
            self.status = SessionStatus::failed(reason.clone());
            return Err(CatastoError::connection(reason));
        }

        self.status = SessionStatus::Connecting;
        tracing::info!(
            session_id = %self.id,
            url = %profile.display_url(),
            schema = profile.schema(),
            "Connecting"
        );

        let mut handle = match self.collaborator.acquire_connection(&profile) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Connection failed");
                self.status = SessionStatus::failed(e.to_string());
                return Err(e);
            }
        };

        if let Err(e) = self.collaborator.apply_schema_scope(&mut handle, profile.schema()) {
            self.collaborator.release_connection(handle);
            let err = match e {
                CatastoError::SchemaScope { .. } => e,
                other => CatastoError::schema_scope(profile.schema(), other.to_string()),
            };
            tracing::warn!(session_id = %self.id, error = %err, "Schema scope failed");
            self.status = SessionStatus::failed(err.to_string());
            return Err(err);
        }

        self.handle = Some(handle);
        self.profile = Some(profile);
        self.status = SessionStatus::Connected;
        self.connected_at = Some(Utc::now());
        tracing::info!(session_id = %self.id, "Connected");
        Ok(())
    }

    /// Release the connection if one is held. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        let held = self.handle.is_some();
        self.teardown();
        self.status = SessionStatus::Disconnected;
        if held {
            tracing::info!(session_id = %self.id, "Disconnected");
        }
    }

    /// Bind the live handle for one command.
    pub fn gateway(&mut self) -> Result<BoundGateway<'_, C>, CatastoError> {
        if !self.status.is_connected() {
            return Err(CatastoError::NotConnected);
        }
        match self.handle.as_mut() {
            Some(handle) => Ok(BoundGateway::new(&mut self.collaborator, handle)),
            None => Err(CatastoError::NotConnected),
        }
    }

    fn teardown(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.collaborator.release_connection(handle);
        }
        self.profile = None;
        self.connected_at = None;
    }
}

impl<C: Collaborator> Drop for Session<C> {
    fn drop(&mut self) {
        self.teardown();
    }
}

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::RadioBackend;
use crate::credentials::CredentialProvider;
use crate::error::RadioError;

/// Admin-gated mutations of the shared radio.
///
/// Stateless: each call is one REST request, never retried (skip and remove
/// are not idempotent server-side). Refreshing the store afterwards is the
/// caller's job.
#[derive(Clone)]
pub struct QueueGateway {
    backend: Arc<dyn RadioBackend>,
    credentials: Arc<dyn CredentialProvider>,
}

impl QueueGateway {
    pub fn new(backend: Arc<dyn RadioBackend>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            backend,
            credentials,
        }
    }

    fn ensure_admin(&self, operation: &str) -> Result<(), RadioError> {
        if self.credentials.token().is_none() {
            warn!(operation, "Rejected radio mutation: not signed in");
            return Err(RadioError::Unauthorized(format!(
                "{operation} requires a signed-in admin"
            )));
        }
        if !self.credentials.is_admin() {
            warn!(operation, "Rejected radio mutation: admin capability required");
            return Err(RadioError::Unauthorized(format!(
                "{operation} requires admin capability"
            )));
        }
        Ok(())
    }

    pub async fn add_to_queue(&self, track_id: &str) -> Result<(), RadioError> {
        self.ensure_admin("add to queue")?;
        self.backend.add_to_queue(track_id).await?;
        info!(track_id, "Track added to radio queue");
        Ok(())
    }

    pub async fn remove_from_queue(&self, track_id: &str) -> Result<(), RadioError> {
        self.ensure_admin("remove from queue")?;
        self.backend.remove_from_queue(track_id).await?;
        info!(track_id, "Track removed from radio queue");
        Ok(())
    }

    pub async fn skip_track(&self) -> Result<(), RadioError> {
        self.ensure_admin("skip track")?;
        self.backend.skip_track().await?;
        info!("Radio track skipped");
        Ok(())
    }

    /// Flip the radio on or off; returns the status reported by the server.
    pub async fn toggle_radio_status(&self) -> Result<bool, RadioError> {
        self.ensure_admin("toggle radio")?;
        let active = self.backend.toggle_radio().await?;
        info!(active, "Radio status toggled");
        Ok(active)
    }
}

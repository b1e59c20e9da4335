use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::core::errors::HgError;

/// The host's repository model, as seen by this crate.
///
/// The model owns the actual `hg` invocations and the resulting
/// incoming/outgoing counts; updated counts are published by the model to
/// its own observers. This crate only decides when to ask for a recount.
#[async_trait]
pub trait RepositoryModel: Send + Sync {
    /// Recompute incoming/outgoing changeset counts against the configured
    /// remote. Reports success or a classified failure; the counts
    /// themselves stay inside the model.
    async fn count_incoming_outgoing(&self) -> Result<(), HgError>;

    /// Fires when the repository's own configuration changed, e.g. its
    /// `.hg/hgrc` was edited.
    fn subscribe_hgrc_changed(&self) -> broadcast::Receiver<()>;
}

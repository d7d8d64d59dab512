//! Change-set guard
//!
//! A change set is a server-side staging area. [`ChangeSet::run`] opens the
//! scope for a batch of mutations: if the batch fails, the change set is
//! abandoned and the batch's error is returned unchanged.

use crate::error::ConvergeResult;
use chrono::Utc;
use converge_api::{ApiResult, RemoteApi};
use converge_model::ChangeSetId;
use std::future::Future;

/// An open change set
pub struct ChangeSet<'a> {
    api: &'a dyn RemoteApi,
    id: ChangeSetId,
    name: String,
}

impl std::fmt::Debug for ChangeSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSet")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<'a> ChangeSet<'a> {
    /// Open a change set named `"{prefix} {timestamp}"`
    ///
    /// # Errors
    /// Returns an error if the remote refuses to create it.
    pub async fn open(api: &'a dyn RemoteApi, prefix: &str) -> ApiResult<ChangeSet<'a>> {
        let name = change_set_name(prefix);
        let id = api.create_change_set(&name).await?;
        tracing::info!(change_set = %id, name = %name, "opened change set");
        Ok(Self { api, id, name })
    }

    /// Change-set id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &ChangeSetId {
        &self.id
    }

    /// Change-set name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Discard everything staged in the change set
    ///
    /// Best effort: a failure is logged and swallowed.
    pub async fn abandon(self) {
        match self.api.abandon_change_set(&self.id).await {
            Ok(()) => tracing::warn!(change_set = %self.id, "abandoned change set"),
            Err(e) => tracing::error!(
                change_set = %self.id,
                error = %e,
                "failed to abandon change set"
            ),
        }
    }

    /// Run a batch inside the change set
    ///
    /// On success the change set stays open for the remote to commit. On
    /// failure it is abandoned and the batch's error is returned.
    ///
    /// # Errors
    /// Whatever `batch` returns.
    pub async fn run<T, F, Fut>(self, batch: F) -> ConvergeResult<T>
    where
        F: FnOnce(ChangeSetId) -> Fut,
        Fut: Future<Output = ConvergeResult<T>>,
    {
        match batch(self.id.clone()).await {
            Ok(value) => {
                tracing::info!(change_set = %self.id, "change set ready");
                Ok(value)
            }
            Err(e) => {
                tracing::error!(change_set = %self.id, error = %e, "batch failed");
                self.abandon().await;
                Err(e)
            }
        }
    }
}

fn change_set_name(prefix: &str) -> String {
    format!("{prefix} {}", Utc::now().format("%Y-%m-%d %H:%M:%S"))
}

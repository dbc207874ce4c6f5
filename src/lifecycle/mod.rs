//! Photo lifecycle hooks.
//!
//! Keeps the derived moderation fields consistent with `status`: at most one
//! of `approved_at` / (`rejected_at`, `rejection_reason`) is populated, and a
//! pending photo has neither.

use crate::{
    db::PhotoStore,
    models::{Photo, PhotoPatch, PhotoStatus},
    utils::{config::LifecycleConfig, LifecycleError},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rewrite the derived fields of `patch` for a transition to `next`.
pub fn apply_transition(patch: &mut PhotoPatch, next: PhotoStatus, now: DateTime<Utc>) {
    match next {
        PhotoStatus::Approved => {
            patch.approved_at = Some(Some(now));
            patch.rejected_at = Some(None);
            patch.rejection_reason = Some(None);
        }
        PhotoStatus::Rejected => {
            // The reason, if any, comes with the patch.
            patch.rejected_at = Some(Some(now));
            patch.approved_at = Some(None);
        }
        PhotoStatus::Pending => {
            patch.approved_at = Some(None);
            patch.rejected_at = Some(None);
            patch.rejection_reason = Some(None);
        }
    }
    patch.status = Some(next);
}

pub struct PhotoLifecycle {
    store: Arc<dyn PhotoStore>,
    swallow_trigger_errors: bool,
}

impl PhotoLifecycle {
    pub fn new(store: Arc<dyn PhotoStore>, config: &LifecycleConfig) -> Self {
        Self {
            store,
            swallow_trigger_errors: config.swallow_trigger_errors,
        }
    }

    pub async fn before_update(
        &self,
        id: i64,
        patch: &mut PhotoPatch,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let Some(next) = patch.status else {
            debug!(photo_id = id, "No status change in update data");
            return Ok(());
        };

        let current = match self.store.find_photo(id).await {
            Ok(current) => current,
            Err(source) if self.swallow_trigger_errors => {
                warn!(photo_id = id, error = %source, "Photo lookup failed in beforeUpdate, continuing with the update");
                return Ok(());
            }
            Err(source) => return Err(LifecycleError::FetchBeforeWrite { id, source }),
        };

        match current {
            Some(photo) if photo.status != next => {
                info!(photo_id = id, from = %photo.status, to = %next, "Photo status changing");
                apply_transition(patch, next, now);
            }
            Some(_) => debug!(photo_id = id, status = %next, "Photo status unchanged"),
            None => warn!(photo_id = id, "Photo not found before update"),
        }

        Ok(())
    }

    pub fn after_update(&self, photo: &Photo) {
        match photo.status {
            PhotoStatus::Approved => {
                info!(photo_id = photo.id, approved_at = ?photo.approved_at, "Photo approved")
            }
            PhotoStatus::Rejected => info!(
                photo_id = photo.id,
                rejected_at = ?photo.rejected_at,
                reason = photo.rejection_reason.as_deref().unwrap_or("No reason provided"),
                "Photo rejected"
            ),
            PhotoStatus::Pending => info!(photo_id = photo.id, "Photo reset to pending"),
        }
    }

    pub fn before_create(&self, patch: &mut PhotoPatch, now: DateTime<Utc>) {
        if !matches!(patch.uploaded_at, Some(Some(_))) {
            patch.uploaded_at = Some(Some(now));
        }

        // New photos are published immediately unless the client says otherwise.
        if patch.status.is_none() {
            patch.status = Some(PhotoStatus::Approved);
            patch.approved_at = Some(Some(now));
        }
    }

    pub fn after_create(&self, photo: &Photo) {
        info!(
            photo_id = photo.id,
            status = %photo.status,
            uploaded_at = ?photo.uploaded_at,
            author = ?photo.author,
            "Photo created"
        );
    }
}

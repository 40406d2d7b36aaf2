//! Ref resolver: preview override, then the active selection, then the master ref.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::preview::{preview_cookie, RequestLike};
use super::{RefSelection, RefSource};
use crate::error::{ApiFailure, PrismicError};
use crate::http::RequestOptions;
use crate::repository::MetadataCache;

struct RefState {
    selection: RefSelection,
    auto_previews: bool,
    preview_source: Option<Arc<dyn RequestLike>>,
}

/// Holds the ref selection and preview settings, and resolves them against the metadata
/// cache. Switching selection or preview settings is synchronous and never fetches.
pub struct RefResolver {
    state: RwLock<RefState>,
    metadata: Arc<MetadataCache>,
}

impl RefResolver {
    /// Auto-previews start enabled, with no preview source.
    pub fn new(metadata: Arc<MetadataCache>, selection: RefSelection) -> Self {
        Self {
            state: RwLock::new(RefState {
                selection,
                auto_previews: true,
                preview_source: None,
            }),
            metadata,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RefState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RefState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn select(&self, selection: RefSelection) {
        self.write().selection = selection;
    }

    pub fn selection(&self) -> RefSelection {
        self.read().selection.clone()
    }

    pub fn enable_auto_previews(&self) {
        self.write().auto_previews = true;
    }

    /// Enables auto-previews and reads the preview cookie from `source` on each resolution.
    pub fn enable_auto_previews_from(&self, source: Arc<dyn RequestLike>) {
        let mut state = self.write();
        state.auto_previews = true;
        state.preview_source = Some(source);
    }

    pub fn disable_auto_previews(&self) {
        let mut state = self.write();
        state.auto_previews = false;
        state.preview_source = None;
    }

    /// The preview ref that would win the next resolution, if any.
    pub fn preview_override(&self) -> Option<String> {
        let source = {
            let state = self.read();
            if !state.auto_previews {
                return None;
            }
            state.preview_source.clone()?
        };
        preview_cookie(&source.cookie_header()?)
    }

    /// The ref the next query should read.
    pub async fn resolve(&self, options: &RequestOptions) -> Result<String, PrismicError> {
        if let Some(preview) = self.preview_override() {
            tracing::debug!(preview_ref = %preview, "using preview ref");
            return Ok(preview);
        }

        match self.selection() {
            RefSelection::Manual(RefSource::Literal(value)) => return Ok(value),
            RefSelection::Manual(RefSource::Deferred(thunk)) => {
                if let Some(value) = (thunk.as_ref())().await.filter(|v| !v.is_empty()) {
                    return Ok(value);
                }
            }
            RefSelection::ReleaseById(id) => {
                let repository = self.metadata.get(options).await?;
                return repository
                    .release_by_id(&id)
                    .map(|r| r.reference.clone())
                    .ok_or_else(|| {
                        PrismicError::RefNotFound(ApiFailure::local(format!(
                            "A release with ID \"{id}\" could not be found."
                        )))
                    });
            }
            RefSelection::ReleaseByLabel(label) => {
                let repository = self.metadata.get(options).await?;
                return repository
                    .release_by_label(&label)
                    .map(|r| r.reference.clone())
                    .ok_or_else(|| {
                        PrismicError::RefNotFound(ApiFailure::local(format!(
                            "A release with label \"{label}\" could not be found."
                        )))
                    });
            }
            RefSelection::LatestPublished => {}
        }

        let repository = self.metadata.get(options).await?;
        repository
            .master_ref()
            .map(|r| r.reference.clone())
            .ok_or_else(|| {
                PrismicError::Other(ApiFailure::local(
                    "Invalid repository response: master ref could not be found",
                ))
            })
    }
}

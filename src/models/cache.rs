//! Process-wide bundle cache with a guarded one-time load and explicit reload

use crate::error::Result;
use crate::models::bundle::ArtifactBundle;
use crate::models::store::ArtifactStore;
use once_cell::sync::OnceCell;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// Lazily loads the published bundle once, then serves it until reloaded.
///
/// Concurrent first callers block on a single loader and then all observe
/// the same fully built bundle. A failed load leaves the cache empty so the
/// next caller retries. [`BundleCache::reload`] swaps in a newer bundle as a
/// whole; callers already holding the previous `Arc` finish with it.
pub struct BundleCache {
    store: ArtifactStore,
    bundle: OnceCell<RwLock<Arc<ArtifactBundle>>>,
}

impl BundleCache {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            bundle: OnceCell::new(),
        }
    }

    /// Cache pre-populated with an in-memory bundle.
    pub fn with_bundle(store: ArtifactStore, bundle: ArtifactBundle) -> Self {
        Self {
            store,
            bundle: OnceCell::with_value(RwLock::new(Arc::new(bundle))),
        }
    }

    /// Return the cached bundle, loading it on first use.
    pub fn get_or_load(&self) -> Result<Arc<ArtifactBundle>> {
        let slot = self.bundle.get_or_try_init(|| match self.store.load() {
            Ok(bundle) => {
                info!(
                    run_id = %bundle.metadata().run_id,
                    "Artifact bundle cached"
                );
                Ok(RwLock::new(Arc::new(bundle)))
            }
            Err(e) => {
                warn!(error = %e, "Artifact bundle load failed");
                Err(e)
            }
        })?;
        Ok(current(slot))
    }

    /// Swap in the published bundle if `CURRENT` names a different run.
    ///
    /// Returns `true` when a different bundle is now served. A failed load
    /// keeps the cached bundle in place.
    pub fn reload(&self) -> Result<bool> {
        let Some(slot) = self.bundle.get() else {
            return self.get_or_load().map(|_| true);
        };

        let published = self.store.current_dir()?;
        let cached = current(slot);
        if published == self.store.bundle_dir(&cached.metadata().run_id) {
            return Ok(false);
        }

        let bundle = Arc::new(self.store.load_dir(&published)?);
        info!(
            previous = %cached.metadata().run_id,
            run_id = %bundle.metadata().run_id,
            "Artifact bundle reloaded"
        );
        *slot.write().unwrap_or_else(PoisonError::into_inner) = bundle;
        Ok(true)
    }

    pub fn is_loaded(&self) -> bool {
        self.bundle.get().is_some()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }
}

fn current(slot: &RwLock<Arc<ArtifactBundle>>) -> Arc<ArtifactBundle> {
    Arc::clone(&slot.read().unwrap_or_else(PoisonError::into_inner))
}

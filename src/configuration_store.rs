//! A thread-safe in-memory storage for the currently active [`ProjectConfig`] and the runtime
//! forced variations applied on top of it.
use std::sync::{Arc, PoisonError, RwLock};

use crate::{datafile::Variation, ForcedVariationStore, ProjectConfig};

/// `ConfigurationStore` provides a thread-safe (`Sync`) storage for the project configuration that
/// allows concurrent access for readers (e.g., audience evaluation) and writers (e.g., a datafile
/// fetcher).
///
/// `ProjectConfig` itself is always immutable and can only be replaced completely. Forced
/// variations outlive configuration updates; they are resolved against whichever configuration is
/// active when they are read.
#[derive(Debug, Default)]
pub struct ConfigurationStore {
    configuration: RwLock<Option<Arc<ProjectConfig>>>,
    forced_variations: ForcedVariationStore,
}

impl ConfigurationStore {
    /// Create a new empty configuration store.
    pub fn new() -> Self {
        ConfigurationStore::default()
    }

    /// Get currently-active configuration. Returns `None` if no configuration has been stored yet.
    pub fn get_configuration(&self) -> Option<Arc<ProjectConfig>> {
        // The slot is only ever replaced wholesale, so a poisoned lock still holds a valid value.
        let configuration = self
            .configuration
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        configuration.clone()
    }

    /// Set new configuration, returning the previous one.
    pub fn set_configuration(
        &self,
        config: impl Into<Arc<ProjectConfig>>,
    ) -> Option<Arc<ProjectConfig>> {
        // Constructing new value before requesting the lock to minimize lock span.
        let config: Arc<ProjectConfig> = config.into();
        log::info!(target: "ab_core",
            revision = config.revision(),
            version = config.version();
            "updating project configuration");
        let new_value = Some(config);

        let mut configuration_slot = self
            .configuration
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *configuration_slot, new_value)
    }

    /// Force a user into a variation against the active configuration. See
    /// [`ForcedVariationStore::set`].
    ///
    /// Returns `false` if no configuration has been stored yet.
    pub fn set_forced_variation(
        &self,
        experiment_key: &str,
        user_id: &str,
        variation_key: Option<&str>,
    ) -> bool {
        let Some(config) = self.get_configuration() else {
            log::warn!(target: "ab_core", experiment_key, user_id;
                "cannot set forced variation before a project configuration is available");
            return false;
        };
        self.forced_variations
            .set(&config, experiment_key, user_id, variation_key)
    }

    /// Get the variation a user is forced into, resolved against the active configuration. See
    /// [`ForcedVariationStore::get`].
    pub fn get_forced_variation(&self, experiment_key: &str, user_id: &str) -> Option<Variation> {
        let config = self.get_configuration()?;
        self.forced_variations.get(&config, experiment_key, user_id)
    }

    /// Underlying forced variation storage.
    pub fn forced_variations(&self) -> &ForcedVariationStore {
        &self.forced_variations
    }
}

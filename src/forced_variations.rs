//! Runtime forced variations: explicit user-to-variation overrides that take precedence over
//! bucketing.
//!
//! Overrides are transient. They are not part of the datafile and are lost when their owner is
//! dropped.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use crate::{datafile::Variation, ProjectConfig};

/// Experiment id to variation id, for a single user.
type UserOverrides = HashMap<String, String>;

/// Thread-safe (`Sync`) storage of forced variations keyed by user id.
///
/// Each user's overrides live behind their own lock, so writers for different users never wait on
/// each other. The outer map is only write-locked the first time a user is seen.
#[derive(Debug, Default)]
pub struct ForcedVariationStore {
    users: RwLock<HashMap<String, Arc<Mutex<UserOverrides>>>>,
}

impl ForcedVariationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        ForcedVariationStore::default()
    }

    /// Force `user_id` into `variation_key` of the experiment, or remove the override when
    /// `variation_key` is `None`.
    ///
    /// Returns `false` without changing anything if the experiment key is unknown or the variation
    /// does not belong to the experiment. When removing, returns `true` only if an override was
    /// actually removed.
    pub fn set(
        &self,
        config: &ProjectConfig,
        experiment_key: &str,
        user_id: &str,
        variation_key: Option<&str>,
    ) -> bool {
        let Some(experiment) = config.experiment_by_key(experiment_key) else {
            log::error!(target: "ab_core",
                experiment_key,
                project_id = config.project_id();
                "experiment does not exist in the project config");
            return false;
        };

        let Some(variation_key) = variation_key else {
            return self.remove(experiment_key, &experiment.id, user_id);
        };

        let Some(variation) = experiment.variation_by_key(variation_key) else {
            log::error!(target: "ab_core",
                experiment_key,
                variation_key;
                "variation does not exist for the experiment");
            return false;
        };

        let user = self.user_overrides(user_id);
        let previous = lock(&user).insert(experiment.id.clone(), variation.id.clone());
        log::debug!(target: "ab_core",
            experiment_key,
            user_id,
            variation_key;
            "set forced variation");
        if let Some(previous) = previous.and_then(|id| experiment.variation_by_id(&id)) {
            log::debug!(target: "ab_core",
                experiment_key,
                user_id,
                previous_variation_key:display = previous.key;
                "forced variation replaced a previous one");
        }
        true
    }

    /// Get the variation `user_id` is forced into for the experiment.
    ///
    /// Returns `None` if there is no override, or if the experiment or the stored variation no
    /// longer exists in `config` (e.g., after a configuration update).
    pub fn get(
        &self,
        config: &ProjectConfig,
        experiment_key: &str,
        user_id: &str,
    ) -> Option<Variation> {
        if experiment_key.is_empty() {
            log::error!(target: "ab_core", "experiment key is invalid");
            return None;
        }

        let user = self.existing_user_overrides(user_id)?;

        let Some(experiment) = config.experiment_by_key(experiment_key) else {
            log::debug!(target: "ab_core",
                experiment_key,
                user_id;
                "no experiment mapped to user in the forced variation map");
            return None;
        };

        let Some(variation_id) = lock(&user).get(&experiment.id).cloned() else {
            log::debug!(target: "ab_core",
                experiment_key,
                user_id;
                "no variation for experiment mapped to user in the forced variation map");
            return None;
        };

        let variation = experiment.variation_by_id(&variation_id)?;
        log::debug!(target: "ab_core",
            experiment_key,
            user_id,
            variation_key:display = variation.key;
            "found forced variation");
        Some(variation.clone())
    }

    fn remove(&self, experiment_key: &str, experiment_id: &str, user_id: &str) -> bool {
        let removed = self
            .existing_user_overrides(user_id)
            .and_then(|user| lock(&user).remove(experiment_id));
        if removed.is_some() {
            log::debug!(target: "ab_core",
                experiment_key,
                user_id;
                "removed forced variation");
            true
        } else {
            log::debug!(target: "ab_core",
                experiment_key,
                user_id;
                "no forced variation to remove");
            false
        }
    }

    fn existing_user_overrides(&self, user_id: &str) -> Option<Arc<Mutex<UserOverrides>>> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        users.get(user_id).cloned()
    }

    fn user_overrides(&self, user_id: &str) -> Arc<Mutex<UserOverrides>> {
        if let Some(user) = self.existing_user_overrides(user_id) {
            return user;
        }
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        users.entry(user_id.to_owned()).or_default().clone()
    }
}

// Every critical section is a single map insert/remove/get, so a map behind a poisoned lock is
// still consistent.
fn lock(user: &Mutex<UserOverrides>) -> std::sync::MutexGuard<'_, UserOverrides> {
    user.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::ForcedVariationStore;
    use crate::{ProjectConfig, RaiseErrorHandler};

    fn config() -> ProjectConfig {
        let datafile =
            std::fs::read_to_string("tests/data/datafiles/valid-project-config-v2.json").unwrap();
        ProjectConfig::from_json(&datafile, &RaiseErrorHandler).unwrap()
    }

    #[test]
    fn set_get_replace_remove() {
        let config = config();
        let store = ForcedVariationStore::new();

        assert!(store.set(&config, "etag1", "u1", Some("vtag1")));
        assert!(store.set(&config, "etag1", "u1", Some("vtag2")));
        assert_eq!(store.get(&config, "etag1", "u1").unwrap().key, "vtag2");
        assert!(store.set(&config, "etag1", "u1", None));
        assert!(store.get(&config, "etag1", "u1").is_none());
    }

    #[test]
    fn removing_nothing_returns_false() {
        let config = config();
        let store = ForcedVariationStore::new();
        assert!(!store.set(&config, "etag1", "testUser1", None));
        assert!(store.get(&config, "etag1", "testUser1").is_none());

        assert!(store.set(&config, "etag2", "testUser1", Some("vtag3")));
        assert!(!store.set(&config, "etag1", "testUser1", None));
    }

    #[test]
    fn empty_user_id_is_valid() {
        let config = config();
        let store = ForcedVariationStore::new();
        assert!(store.set(&config, "etag1", "", Some("vtag1")));
        assert_eq!(store.get(&config, "etag1", "").unwrap().key, "vtag1");
    }

    #[test]
    fn invalid_experiment_key() {
        let config = config();
        let store = ForcedVariationStore::new();
        assert!(!store.set(&config, "wrongKey", "testUser1", Some("vtag1")));
        assert!(!store.set(&config, "", "testUser1", Some("vtag1")));
        assert!(store.get(&config, "wrongKey", "testUser1").is_none());
        assert!(store.get(&config, "", "testUser1").is_none());
    }

    #[test]
    fn invalid_variation_key_keeps_previous_mapping() {
        let config = config();
        let store = ForcedVariationStore::new();
        assert!(store.set(&config, "etag1", "testUser1", Some("vtag1")));
        assert!(!store.set(&config, "etag1", "testUser1", Some("vtag3")));
        assert!(!store.set(&config, "etag1", "testUser1", Some("")));
        assert_eq!(store.get(&config, "etag1", "testUser1").unwrap().key, "vtag1");
    }

    #[test]
    fn multiple_users_and_experiments() {
        let config = config();
        let store = ForcedVariationStore::new();
        assert!(store.set(&config, "etag1", "testUser1", Some("vtag1")));
        assert!(store.set(&config, "etag1", "testUser2", Some("vtag2")));
        assert!(store.set(&config, "etag2", "testUser1", Some("vtag3")));
        assert!(store.set(&config, "etag2", "testUser2", Some("vtag4")));

        assert_eq!(store.get(&config, "etag1", "testUser1").unwrap().key, "vtag1");
        assert_eq!(store.get(&config, "etag1", "testUser2").unwrap().key, "vtag2");
        assert_eq!(store.get(&config, "etag2", "testUser1").unwrap().key, "vtag3");
        assert_eq!(store.get(&config, "etag2", "testUser2").unwrap().key, "vtag4");

        for (experiment, user) in [
            ("etag1", "testUser1"),
            ("etag1", "testUser2"),
            ("etag2", "testUser1"),
            ("etag2", "testUser2"),
        ] {
            assert!(store.set(&config, experiment, user, None));
            assert!(store.get(&config, experiment, user).is_none());
        }
    }

    #[test]
    fn stale_variation_is_not_returned_after_config_swap() {
        let store = ForcedVariationStore::new();
        assert!(store.set(&config(), "etag1", "testUser1", Some("vtag2")));

        let updated = std::fs::read_to_string("tests/data/datafiles/valid-project-config-v2.json")
            .unwrap()
            .replace("\"277\"", "\"2770\"");
        let updated = ProjectConfig::from_json(&updated, &RaiseErrorHandler).unwrap();
        assert!(store.get(&updated, "etag1", "testUser1").is_none());
        assert_eq!(store.get(&config(), "etag1", "testUser1").unwrap().key, "vtag2");
    }

    #[test]
    fn concurrent_writers() {
        let config = Arc::new(config());
        let store = Arc::new(ForcedVariationStore::new());

        let handles = (0..8)
            .map(|n| {
                let config = config.clone();
                let store = store.clone();
                thread::spawn(move || {
                    let user = format!("user{n}");
                    for i in 0..100 {
                        let variation = if i % 2 == 0 { "vtag1" } else { "vtag2" };
                        assert!(store.set(&config, "etag1", &user, Some(variation)));
                        assert!(store.set(&config, "etag1", "shared", Some(variation)));
                        assert!(store.get(&config, "etag1", &user).is_some());
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        for n in 0..8 {
            assert_eq!(
                store.get(&config, "etag1", &format!("user{n}")).unwrap().key,
                "vtag2"
            );
        }
        let shared = store.get(&config, "etag1", "shared").unwrap().key;
        assert!(shared == "vtag1" || shared == "vtag2");
    }
}

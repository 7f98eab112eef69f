use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

/// Datafile as served by the configuration endpoint.
///
/// Only the schema version is checked before this structure is deserialized, so the remaining
/// fields may change shape between schema versions.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DatafileWire {
    pub account_id: String,
    pub project_id: String,
    pub revision: String,
    pub version: String,
    #[serde(default, rename = "anonymizeIP")]
    pub anonymize_ip: bool,
    #[serde(default)]
    pub bot_filtering: Option<bool>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub audiences: Vec<AudienceWire>,
    #[serde(default)]
    pub typed_audiences: Vec<AudienceWire>,
    #[serde(default)]
    pub events: Vec<EventType>,
    #[serde(default)]
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub feature_flags: Vec<FeatureFlag>,
    #[serde(default)]
    pub groups: Vec<GroupWire>,
    #[serde(default)]
    pub rollouts: Vec<Rollout>,
}

/// Audience before its conditions are compiled.
///
/// `conditions` is a JSON-encoded string for legacy audiences and inline JSON for typed audiences.
#[derive(Debug, Deserialize)]
pub(crate) struct AudienceWire {
    pub id: String,
    pub name: String,
    pub conditions: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GroupWire {
    pub id: String,
    #[serde(default)]
    pub policy: GroupPolicy,
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub traffic_allocation: Vec<TrafficAllocation>,
}

/// User attribute declared in the project.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct Attribute {
    pub id: String,
    pub key: String,
}

/// Conversion event. `key` is the event name used for lookups.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct EventType {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub experiment_ids: Vec<String>,
}

/// Experiment lifecycle status.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum ExperimentStatus {
    Running,
    Launched,
    Paused,
    #[default]
    #[serde(rename = "Not started")]
    NotStarted,
    Archived,
    /// Status introduced by a newer datafile.
    #[serde(other)]
    Unknown,
}

/// Experiment (or rollout rule) with its variations.
///
/// Variations are indexed by key and by id once, when the experiment is deserialized.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(from = "ExperimentWire")]
pub struct Experiment {
    #[allow(missing_docs)]
    pub id: String,
    #[allow(missing_docs)]
    pub key: String,
    #[allow(missing_docs)]
    pub status: ExperimentStatus,
    #[allow(missing_docs)]
    pub layer_id: String,
    /// Id of the mutual-exclusion group, if the experiment was declared inside one.
    pub group_id: Option<String>,
    /// Audiences the user must match (any of them). Empty means everyone is eligible.
    pub audience_ids: Vec<String>,
    #[allow(missing_docs)]
    pub variations: Vec<Variation>,
    /// Whitelist from the datafile: user id to variation key. Not to be confused with the
    /// runtime overrides kept by [`ForcedVariationStore`](crate::ForcedVariationStore).
    pub forced_variations: HashMap<String, String>,
    #[allow(missing_docs)]
    pub traffic_allocation: Vec<TrafficAllocation>,
    variation_key_index: HashMap<String, usize>,
    variation_id_index: HashMap<String, usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExperimentWire {
    id: String,
    key: String,
    #[serde(default)]
    status: ExperimentStatus,
    #[serde(default)]
    layer_id: String,
    #[serde(default)]
    audience_ids: Vec<String>,
    variations: Vec<Variation>,
    #[serde(default)]
    forced_variations: HashMap<String, String>,
    #[serde(default)]
    traffic_allocation: Vec<TrafficAllocation>,
}

impl From<ExperimentWire> for Experiment {
    fn from(wire: ExperimentWire) -> Experiment {
        let variation_key_index = wire
            .variations
            .iter()
            .enumerate()
            .map(|(i, variation)| (variation.key.clone(), i))
            .collect();
        let variation_id_index = wire
            .variations
            .iter()
            .enumerate()
            .map(|(i, variation)| (variation.id.clone(), i))
            .collect();
        Experiment {
            id: wire.id,
            key: wire.key,
            status: wire.status,
            layer_id: wire.layer_id,
            group_id: None,
            audience_ids: wire.audience_ids,
            variations: wire.variations,
            forced_variations: wire.forced_variations,
            traffic_allocation: wire.traffic_allocation,
            variation_key_index,
            variation_id_index,
        }
    }
}

impl Experiment {
    /// Find a variation of this experiment by key.
    pub fn variation_by_key(&self, key: &str) -> Option<&Variation> {
        self.variation_key_index
            .get(key)
            .map(|&i| &self.variations[i])
    }

    /// Find a variation of this experiment by id.
    pub fn variation_by_id(&self, id: &str) -> Option<&Variation> {
        self.variation_id_index.get(id).map(|&i| &self.variations[i])
    }

    /// Whether the experiment is running and accepting new users.
    pub fn is_active(&self) -> bool {
        self.status == ExperimentStatus::Running
    }

    /// Whether the experiment serves variations, either as a running test or as a launched
    /// winner.
    pub fn is_running_or_launched(&self) -> bool {
        matches!(
            self.status,
            ExperimentStatus::Running | ExperimentStatus::Launched
        )
    }

    /// Variation the datafile whitelists for `user_id`, if any.
    pub fn whitelisted_variation(&self, user_id: &str) -> Option<&Variation> {
        let variation_key = self.forced_variations.get(user_id)?;
        let variation = self.variation_by_key(variation_key);
        if variation.is_none() {
            log::error!(target: "ab_core",
                experiment_key:display = self.key,
                variation_key:display = variation_key,
                user_id;
                "whitelisted variation is not part of the experiment");
        }
        variation
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Variation {
    pub id: String,
    pub key: String,
    /// Only set for variations of experiments attached to a feature flag.
    #[serde(default)]
    pub feature_enabled: Option<bool>,
    #[serde(default)]
    pub variables: Vec<VariableUsage>,
}

/// Value a variation assigns to a feature variable.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct VariableUsage {
    pub id: String,
    pub value: String,
}

/// Bucket range boundary: users bucketed below `end_of_range` land in `entity_id`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct TrafficAllocation {
    pub entity_id: String,
    pub end_of_range: u32,
}

/// How experiments of a group share traffic.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum GroupPolicy {
    #[default]
    Random,
    Overlapping,
    #[serde(other)]
    Unknown,
}

/// Mutual-exclusion group. Its experiments also appear in the project's experiment list.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct Group {
    pub id: String,
    pub policy: GroupPolicy,
    pub experiments: Vec<Arc<Experiment>>,
    pub traffic_allocation: Vec<TrafficAllocation>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct FeatureFlag {
    pub id: String,
    pub key: String,
    /// Empty when the feature has no rollout.
    #[serde(default)]
    pub rollout_id: String,
    #[serde(default)]
    pub experiment_ids: Vec<String>,
    #[serde(default)]
    pub variables: Vec<FeatureVariable>,
}

impl FeatureFlag {
    /// Find a feature variable by key.
    pub fn variable_by_key(&self, key: &str) -> Option<&FeatureVariable> {
        self.variables.iter().find(|variable| variable.key == key)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct FeatureVariable {
    pub id: String,
    pub key: String,
    #[serde(rename = "type")]
    pub variable_type: VariableType,
    pub default_value: String,
}

/// Type of a feature variable.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum VariableType {
    Boolean,
    Integer,
    Double,
    String,
    #[serde(other)]
    Unknown,
}

/// Rollout: an ordered list of targeting rules (experiments). Rollout rules are not part of the
/// project's experiment indices.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct Rollout {
    pub id: String,
    pub experiments: Vec<Experiment>,
}

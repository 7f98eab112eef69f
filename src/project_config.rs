use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    audience::Audience,
    datafile::{
        Attribute, AudienceWire, DatafileWire, EventType, Experiment, FeatureFlag, Group, GroupWire, Rollout,
    },
    Attributes, Error, ErrorHandler, Result,
};

/// Attribute keys with this prefix are reserved by the platform and act as their own ids.
pub const RESERVED_ATTRIBUTE_PREFIX: &str = "$opt_";

/// Datafile schema versions this library can read.
pub const SUPPORTED_VERSIONS: [&str; 3] = ["2", "3", "4"];

/// Immutable snapshot of a project's datafile.
///
/// All lookup indices are built once, in [`ProjectConfig::from_json`]. A new datafile revision
/// produces a new `ProjectConfig`; existing instances are never modified, so a `ProjectConfig`
/// can be shared between threads freely (usually behind an `Arc`).
#[derive(Debug)]
pub struct ProjectConfig {
    account_id: String,
    project_id: String,
    revision: String,
    version: String,
    anonymize_ip: bool,
    bot_filtering: Option<bool>,
    parsed_at: DateTime<Utc>,

    attributes: Vec<Attribute>,
    audiences: Vec<Arc<Audience>>,
    typed_audiences: Vec<Arc<Audience>>,
    events: Vec<EventType>,
    /// Top-level experiments followed by experiments of every group.
    experiments: Vec<Arc<Experiment>>,
    feature_flags: Vec<FeatureFlag>,
    groups: Vec<Group>,
    rollouts: Vec<Rollout>,

    // Indices store positions in the collections above.
    attribute_key_index: HashMap<String, usize>,
    event_name_index: HashMap<String, usize>,
    experiment_key_index: HashMap<String, usize>,
    experiment_id_index: HashMap<String, usize>,
    feature_key_index: HashMap<String, usize>,
    group_id_index: HashMap<String, usize>,
    rollout_id_index: HashMap<String, usize>,
    variation_id_to_experiment: HashMap<String, usize>,
    audience_id_index: HashMap<String, Arc<Audience>>,
}

impl ProjectConfig {
    /// Parse a datafile.
    ///
    /// Fails with [`Error::EmptyDatafile`], [`Error::MalformedDatafile`], or
    /// [`Error::UnsupportedVersion`]. Audiences with malformed conditions are passed to
    /// `error_handler`, which decides whether construction fails.
    pub fn from_json(datafile: &str, error_handler: &dyn ErrorHandler) -> Result<ProjectConfig> {
        if datafile.is_empty() {
            return Err(Error::EmptyDatafile);
        }

        let json: serde_json::Value = serde_json::from_str(datafile).map_err(|err| {
            log::warn!(target: "ab_core", "failed to parse datafile: {err:?}");
            Error::from(err)
        })?;

        // Check the version before the rest of the schema, so a datafile from a newer schema is
        // reported as unsupported rather than malformed.
        if let Some(version) = json.get("version").and_then(|v| v.as_str()) {
            if !SUPPORTED_VERSIONS.contains(&version) {
                log::warn!(target: "ab_core", version; "unsupported datafile version");
                return Err(Error::UnsupportedVersion(version.to_owned()));
            }
        }

        let wire: DatafileWire = serde_json::from_value(json).map_err(|err| {
            log::warn!(target: "ab_core", "failed to parse datafile: {err:?}");
            Error::from(err)
        })?;

        ProjectConfig::compile(wire, error_handler)
    }

    fn compile(wire: DatafileWire, error_handler: &dyn ErrorHandler) -> Result<ProjectConfig> {
        let audiences = compile_audiences(wire.audiences, error_handler)?;
        let typed_audiences = compile_audiences(wire.typed_audiences, error_handler)?;

        let mut experiments: Vec<Arc<Experiment>> =
            wire.experiments.into_iter().map(Arc::new).collect();
        let groups: Vec<Group> = wire.groups.into_iter().map(compile_group).collect();
        experiments.extend(
            groups
                .iter()
                .flat_map(|group| group.experiments.iter().cloned()),
        );

        let variation_id_to_experiment = experiments
            .iter()
            .enumerate()
            .flat_map(|(i, experiment)| {
                experiment
                    .variations
                    .iter()
                    .map(move |variation| (variation.id.clone(), i))
            })
            .collect();

        // Typed audiences go last so they take precedence on id collision.
        let audience_id_index = audiences
            .iter()
            .chain(typed_audiences.iter())
            .map(|audience| (audience.id.clone(), audience.clone()))
            .collect();

        Ok(ProjectConfig {
            attribute_key_index: index_by(&wire.attributes, |a| &a.key),
            event_name_index: index_by(&wire.events, |e| &e.key),
            experiment_key_index: index_by(&experiments, |e| &e.key),
            experiment_id_index: index_by(&experiments, |e| &e.id),
            feature_key_index: index_by(&wire.feature_flags, |f| &f.key),
            group_id_index: index_by(&groups, |g| &g.id),
            rollout_id_index: index_by(&wire.rollouts, |r| &r.id),
            variation_id_to_experiment,
            audience_id_index,

            account_id: wire.account_id,
            project_id: wire.project_id,
            revision: wire.revision,
            version: wire.version,
            anonymize_ip: wire.anonymize_ip,
            bot_filtering: wire.bot_filtering,
            parsed_at: Utc::now(),
            attributes: wire.attributes,
            audiences,
            typed_audiences,
            events: wire.events,
            experiments,
            feature_flags: wire.feature_flags,
            groups,
            rollouts: wire.rollouts,
        })
    }

    /// Find an experiment (top-level or grouped) by key.
    pub fn experiment_by_key(&self, key: &str) -> Option<&Experiment> {
        let &i = self.experiment_key_index.get(key)?;
        Some(self.experiments[i].as_ref())
    }

    /// Find an experiment (top-level or grouped) by id.
    pub fn experiment_by_id(&self, id: &str) -> Option<&Experiment> {
        let &i = self.experiment_id_index.get(id)?;
        Some(self.experiments[i].as_ref())
    }

    /// Find the experiment declaring the variation with the given id.
    pub fn experiment_for_variation_id(&self, variation_id: &str) -> Option<&Experiment> {
        let &i = self.variation_id_to_experiment.get(variation_id)?;
        Some(self.experiments[i].as_ref())
    }

    #[allow(missing_docs)]
    pub fn event_by_name(&self, name: &str) -> Option<&EventType> {
        let &i = self.event_name_index.get(name)?;
        Some(&self.events[i])
    }

    /// Find an audience by id. Typed audiences shadow legacy audiences with the same id.
    pub fn audience_by_id(&self, id: &str) -> Option<&Audience> {
        self.audience_id_index.get(id).map(|audience| audience.as_ref())
    }

    #[allow(missing_docs)]
    pub fn attribute_by_key(&self, key: &str) -> Option<&Attribute> {
        let &i = self.attribute_key_index.get(key)?;
        Some(&self.attributes[i])
    }

    #[allow(missing_docs)]
    pub fn feature_by_key(&self, key: &str) -> Option<&FeatureFlag> {
        let &i = self.feature_key_index.get(key)?;
        Some(&self.feature_flags[i])
    }

    #[allow(missing_docs)]
    pub fn group_by_id(&self, id: &str) -> Option<&Group> {
        let &i = self.group_id_index.get(id)?;
        Some(&self.groups[i])
    }

    #[allow(missing_docs)]
    pub fn rollout_by_id(&self, id: &str) -> Option<&Rollout> {
        let &i = self.rollout_id_index.get(id)?;
        Some(&self.rollouts[i])
    }

    /// Experiments an event is attached to, in the order the event declares them.
    ///
    /// Experiment ids that do not resolve are skipped. Returns an empty list for unknown events.
    pub fn experiments_for_event(&self, event_key: &str) -> Vec<&Experiment> {
        let Some(event) = self.event_by_name(event_key) else {
            return Vec::new();
        };
        event
            .experiment_ids
            .iter()
            .filter_map(|id| self.experiment_by_id(id))
            .collect()
    }

    /// Resolve a user-supplied attribute key to the id used in outbound events.
    ///
    /// Known attribute keys resolve to their id. Unknown keys with the reserved `$opt_` prefix
    /// resolve to themselves. Anything else is `None`.
    pub fn attribute_id<'a>(&'a self, attribute_key: &'a str) -> Option<&'a str> {
        let has_reserved_prefix = attribute_key.starts_with(RESERVED_ATTRIBUTE_PREFIX);
        if let Some(attribute) = self.attribute_by_key(attribute_key) {
            if has_reserved_prefix {
                log::warn!(target: "ab_core", attribute_key;
                    "attribute unexpectedly has reserved prefix {RESERVED_ATTRIBUTE_PREFIX}; using attribute id instead of reserved attribute name");
            }
            Some(&attribute.id)
        } else if has_reserved_prefix {
            Some(attribute_key)
        } else {
            log::debug!(target: "ab_core", attribute_key; "unrecognized attribute");
            None
        }
    }

    /// Whether the user passes the experiment's audience targeting.
    ///
    /// Experiments without audiences admit everybody. Otherwise at least one audience must
    /// evaluate to `true`; indeterminate results do not admit the user. Unknown audience ids are
    /// skipped.
    pub fn is_user_in_experiment(&self, experiment: &Experiment, attributes: &Attributes) -> bool {
        if experiment.audience_ids.is_empty() {
            return true;
        }
        let admitted = experiment
            .audience_ids
            .iter()
            .filter_map(|id| self.audience_by_id(id))
            .any(|audience| audience.evaluate(attributes) == Some(true));
        log::debug!(target: "ab_core",
            experiment_key:display = experiment.key,
            admitted;
            "evaluated experiment audiences");
        admitted
    }

    #[allow(missing_docs)]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    #[allow(missing_docs)]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[allow(missing_docs)]
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Datafile schema version.
    pub fn version(&self) -> &str {
        &self.version
    }

    #[allow(missing_docs)]
    pub fn anonymize_ip(&self) -> bool {
        self.anonymize_ip
    }

    /// `None` if the datafile does not set bot filtering.
    pub fn bot_filtering(&self) -> Option<bool> {
        self.bot_filtering
    }

    /// When this snapshot was built.
    pub fn parsed_at(&self) -> DateTime<Utc> {
        self.parsed_at
    }

    #[allow(missing_docs)]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Legacy audiences (conditions encoded as a string in the datafile).
    pub fn audiences(&self) -> &[Arc<Audience>] {
        &self.audiences
    }

    #[allow(missing_docs)]
    pub fn typed_audiences(&self) -> &[Arc<Audience>] {
        &self.typed_audiences
    }

    #[allow(missing_docs)]
    pub fn events(&self) -> &[EventType] {
        &self.events
    }

    /// Top-level experiments followed by experiments declared inside groups.
    pub fn experiments(&self) -> &[Arc<Experiment>] {
        &self.experiments
    }

    #[allow(missing_docs)]
    pub fn feature_flags(&self) -> &[FeatureFlag] {
        &self.feature_flags
    }

    #[allow(missing_docs)]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    #[allow(missing_docs)]
    pub fn rollouts(&self) -> &[Rollout] {
        &self.rollouts
    }
}

fn compile_audiences(
    audiences: Vec<AudienceWire>,
    error_handler: &dyn ErrorHandler,
) -> Result<Vec<Arc<Audience>>> {
    audiences
        .into_iter()
        .map(|wire| {
            let audience = Audience::compile(wire);
            if let Err(err) = &audience.conditions {
                error_handler.handle_error(Error::MalformedCondition {
                    audience_id: audience.id.clone(),
                    source: err.clone(),
                })?;
            }
            Ok(Arc::new(audience))
        })
        .collect()
}

fn compile_group(group: GroupWire) -> Group {
    let experiments = group
        .experiments
        .into_iter()
        .map(|mut experiment| {
            experiment.group_id = Some(group.id.clone());
            Arc::new(experiment)
        })
        .collect();
    Group {
        id: group.id,
        policy: group.policy,
        experiments,
        traffic_allocation: group.traffic_allocation,
    }
}

/// Map each item's key to its position. Later items win on duplicate keys.
fn index_by<T>(items: &[T], key: impl Fn(&T) -> &String) -> HashMap<String, usize> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| (key(item).clone(), i))
        .collect()
}

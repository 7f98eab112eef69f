//! Datafile entities, as they appear in the configuration document.
mod models;

pub use models::{
    Attribute, EventType, Experiment, ExperimentStatus, FeatureFlag, FeatureVariable, Group,
    GroupPolicy, Rollout, TrafficAllocation, VariableType, VariableUsage, Variation,
};
pub(crate) use models::{AudienceWire, DatafileWire, GroupWire};

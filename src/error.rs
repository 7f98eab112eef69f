use std::sync::Arc;

use crate::audience::ConditionError;

/// Represents a result type for operations in this crate.
///
/// The error variant is the crate-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Construction-time errors.
///
/// All of these prevent a usable [`ProjectConfig`](crate::ProjectConfig) from being built. Lookups
/// and audience evaluation never return errors: a miss is `None`, an inapplicable condition is
/// indeterminate.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Datafile was not provided or is an empty string.
    #[error("unable to parse empty datafile")]
    EmptyDatafile,

    /// Datafile is not valid JSON or does not follow the datafile schema.
    #[error("unable to parse datafile")]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    MalformedDatafile(#[source] Arc<serde_json::Error>),

    /// Datafile declares a schema version this library does not support.
    #[error("datafile version {0:?} is not supported")]
    UnsupportedVersion(String),

    /// An audience carries a condition tree that cannot be compiled.
    #[error("audience {audience_id:?} has malformed conditions: {source}")]
    MalformedCondition {
        /// Id of the audience the conditions belong to.
        audience_id: String,
        /// The underlying compile error.
        #[source]
        source: ConditionError,
    },
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::MalformedDatafile(Arc::new(value))
    }
}

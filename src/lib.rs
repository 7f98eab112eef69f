//! Core datafile handling for an experimentation platform: the project configuration model,
//! audience targeting, and runtime forced variations.
//!
//! # Overview
//!
//! A datafile is a JSON document describing a project: its experiments (with variations and traffic
//! allocation), mutual-exclusion groups, feature flags, rollouts, conversion events, user
//! attributes, and audiences. [`ProjectConfig::from_json`] (or the [`ProjectConfigBuilder`]) parses
//! a datafile into an immutable, fully-indexed snapshot that can be shared between threads.
//!
//! Audiences carry boolean condition trees that are compiled once, when the datafile is parsed, and
//! evaluated against user [`Attributes`] with three-valued logic: `Some(true)`, `Some(false)`, or
//! `None` when the outcome cannot be determined (e.g., a required attribute is missing).
//!
//! [`ForcedVariationStore`] keeps runtime overrides that pin a user to a specific variation.
//! [`ConfigurationStore`] holds the active configuration together with these overrides.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. They only happen while building a
//! [`ProjectConfig`]; lookups return `Option` and audience evaluation returns indeterminate results
//! instead of failing.
//!
//! Audiences with malformed conditions are passed to an [`ErrorHandler`], which decides whether
//! the whole datafile is rejected ([`RaiseErrorHandler`]) or the audience is kept and always
//! evaluates to indeterminate ([`NoOpErrorHandler`], the builder's default).
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages, with
//! `ab_core` as the target. Consider integrating a `log`-compatible logger implementation for
//! better visibility into datafile handling and audience evaluation.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod attributes;
pub mod audience;
mod config;
mod configuration_store;
pub mod datafile;
mod error;
mod error_handler;
mod forced_variations;
mod project_config;

pub use attributes::{AttributeValue, Attributes};
pub use config::ProjectConfigBuilder;
pub use configuration_store::ConfigurationStore;
pub use error::{Error, Result};
pub use error_handler::{ErrorHandler, NoOpErrorHandler, RaiseErrorHandler};
pub use forced_variations::ForcedVariationStore;
pub use project_config::{ProjectConfig, RESERVED_ATTRIBUTE_PREFIX, SUPPORTED_VERSIONS};

use crate::{ErrorHandler, NoOpErrorHandler, ProjectConfig, Result};

/// Builder for [`ProjectConfig`].
pub struct ProjectConfigBuilder<'a> {
    pub(crate) datafile: Option<String>,
    pub(crate) error_handler: Box<dyn ErrorHandler + Send + Sync + 'a>,
}

impl<'a> Default for ProjectConfigBuilder<'a> {
    fn default() -> Self {
        ProjectConfigBuilder {
            datafile: None,
            error_handler: Box::new(NoOpErrorHandler),
        }
    }
}

impl<'a> ProjectConfigBuilder<'a> {
    /// Create a builder without a datafile. Malformed audience conditions are logged and ignored
    /// by default.
    pub fn new() -> Self {
        ProjectConfigBuilder::default()
    }

    /// Create a builder for the given datafile.
    ///
    /// ```
    /// # use ab_core::ProjectConfigBuilder;
    /// ProjectConfigBuilder::from_datafile(r#"{"version": "4"}"#);
    /// ```
    pub fn from_datafile(datafile: impl Into<String>) -> Self {
        ProjectConfigBuilder {
            datafile: Some(datafile.into()),
            ..ProjectConfigBuilder::default()
        }
    }

    /// Set the datafile to build from.
    pub fn datafile(&mut self, datafile: impl Into<String>) -> &mut Self {
        self.datafile = Some(datafile.into());
        self
    }

    /// Set the policy for audiences with malformed conditions.
    ///
    /// ```
    /// # use ab_core::{Error, ProjectConfigBuilder, RaiseErrorHandler};
    /// let mut builder = ProjectConfigBuilder::new();
    /// builder.error_handler(RaiseErrorHandler);
    ///
    /// // Closures work too.
    /// builder.error_handler(|error: Error| -> ab_core::Result<()> {
    ///     eprintln!("datafile problem: {error}");
    ///     Ok(())
    /// });
    /// ```
    pub fn error_handler(
        &mut self,
        error_handler: impl ErrorHandler + Send + Sync + 'a,
    ) -> &mut Self {
        self.error_handler = Box::new(error_handler);
        self
    }

    /// Parse the datafile into a new [`ProjectConfig`].
    ///
    /// Fails with [`Error::EmptyDatafile`](crate::Error::EmptyDatafile) if no datafile was set.
    ///
    /// ```
    /// # use ab_core::{Error, ProjectConfigBuilder};
    /// let result = ProjectConfigBuilder::new().build();
    /// assert!(matches!(result, Err(Error::EmptyDatafile)));
    /// ```
    pub fn build(&self) -> Result<ProjectConfig> {
        let datafile = self.datafile.as_deref().unwrap_or_default();
        ProjectConfig::from_json(datafile, self.error_handler.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::ProjectConfigBuilder;
    use crate::{Error, RaiseErrorHandler};

    fn read_datafile(name: &str) -> String {
        std::fs::read_to_string(format!("tests/data/datafiles/{name}")).unwrap()
    }

    #[test]
    fn builds_from_datafile() {
        let config = ProjectConfigBuilder::from_datafile(read_datafile(
            "valid-project-config-v4.json",
        ))
        .build()
        .unwrap();
        assert_eq!(config.revision(), "1480511547");
    }

    #[test]
    fn missing_datafile_is_empty() {
        assert!(matches!(
            ProjectConfigBuilder::new().build(),
            Err(Error::EmptyDatafile)
        ));
        assert!(matches!(
            ProjectConfigBuilder::from_datafile("").build(),
            Err(Error::EmptyDatafile)
        ));
    }

    #[test]
    fn default_handler_tolerates_malformed_conditions() {
        let config = ProjectConfigBuilder::new()
            .datafile(read_datafile("malformed-audience-config.json"))
            .build()
            .unwrap();
        assert!(config.audience_by_id("1").unwrap().conditions.is_err());
    }

    #[test]
    fn custom_error_handler() {
        let datafile = read_datafile("malformed-audience-config.json");

        assert!(matches!(
            ProjectConfigBuilder::from_datafile(datafile.clone())
                .error_handler(RaiseErrorHandler)
                .build(),
            Err(Error::MalformedCondition { .. })
        ));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let config = {
            let seen = seen.clone();
            ProjectConfigBuilder::from_datafile(datafile)
                .error_handler(move |error: Error| -> crate::Result<()> {
                    seen.lock().unwrap().push(error.to_string());
                    Ok(())
                })
                .build()
        };
        assert!(config.is_ok());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}

use crate::{Error, Result};

/// Policy deciding what happens with recoverable construction-time errors (currently: audiences
/// with malformed conditions).
///
/// Returning `Err` aborts construction. Returning `Ok(())` lets construction continue with a
/// degraded entity: an audience that failed to compile always evaluates to indeterminate.
///
/// Datafile-level failures (empty, malformed, unsupported version) are always fatal and never go
/// through the handler.
pub trait ErrorHandler {
    /// Handle `error` raised while building a [`ProjectConfig`](crate::ProjectConfig).
    fn handle_error(&self, error: Error) -> Result<()>;
}

/// Logs the error and lets construction continue.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpErrorHandler;

impl ErrorHandler for NoOpErrorHandler {
    fn handle_error(&self, error: Error) -> Result<()> {
        log::warn!(target: "ab_core", "ignoring construction error: {error}");
        Ok(())
    }
}

/// Fails construction on the first error.
#[derive(Debug, Default, Clone, Copy)]
pub struct RaiseErrorHandler;

impl ErrorHandler for RaiseErrorHandler {
    fn handle_error(&self, error: Error) -> Result<()> {
        Err(error)
    }
}

impl<T: Fn(Error) -> Result<()>> ErrorHandler for T {
    fn handle_error(&self, error: Error) -> Result<()> {
        self(error)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::{ErrorHandler, NoOpErrorHandler, RaiseErrorHandler};
    use crate::Error;

    #[test]
    fn noop_swallows() {
        assert!(NoOpErrorHandler.handle_error(Error::EmptyDatafile).is_ok());
    }

    #[test]
    fn raise_returns_error() {
        assert!(matches!(
            RaiseErrorHandler.handle_error(Error::UnsupportedVersion("1".into())),
            Err(Error::UnsupportedVersion(v)) if v == "1"
        ));
    }

    #[test]
    fn closure_can_collect_errors() {
        let seen = Mutex::new(Vec::new());
        let handler = |error: Error| -> crate::Result<()> {
            seen.lock().unwrap().push(error.to_string());
            Ok(())
        };
        handler.handle_error(Error::EmptyDatafile).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["unable to parse empty datafile"]);
    }
}

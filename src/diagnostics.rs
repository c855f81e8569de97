//! Error-logging collaborator.

use std::error::Error;
use tracing::error;

/// Receives failures the agent absorbs instead of propagating.
pub trait ErrorSink: Send + Sync {
    /// Record a failure originating in `source`.
    fn log_error(&self, source: &str, message: &str, cause: Option<&(dyn Error + 'static)>);
}

/// Default sink: forwards to `tracing::error!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn log_error(&self, source: &str, message: &str, cause: Option<&(dyn Error + 'static)>) {
        match cause {
            Some(cause) => error!(source, cause = %cause, "{}", message),
            None => error!(source, "{}", message),
        }
    }
}

//! Error taxonomy for the delivery engine.

use thiserror::Error;

/// Fatal outcomes of a single delivery run.
///
/// Element absence is not an error inside the waiter (it resolves `None`);
/// the orchestrator is the first layer that decides absence is fatal, based
/// on the configured submit technique. Capability reconciliation failures
/// are logged and never surface here.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A required element never matched its selector before the deadline.
    #[error("required element not found: {0}")]
    NotFound(String),

    /// The page itself never became deliverable in time (navigation stall,
    /// target site unreachable).
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// Transport-level CDP failure underneath the automation run.
    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

impl DeliveryError {
    /// Short machine-readable tag for wire responses.
    pub fn code(&self) -> &'static str {
        match self {
            DeliveryError::NotFound(_) => "not_found",
            DeliveryError::Timeout(_) => "timeout",
            DeliveryError::Driver(_) => "driver",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(DeliveryError::NotFound("#x".into()).code(), "not_found");
        assert_eq!(DeliveryError::Timeout("nav".into()).code(), "timeout");
        assert_eq!(
            DeliveryError::Driver(anyhow::anyhow!("boom")).code(),
            "driver"
        );
    }

    #[test]
    fn test_not_found_display_names_selector() {
        let err = DeliveryError::NotFound("#prompt-textarea".into());
        assert!(err.to_string().contains("#prompt-textarea"));
    }
}

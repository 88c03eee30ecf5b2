use thiserror::Error;

/// Errors raised while validating the inputs of a dynamics run.
///
/// All of them are caller errors detected before the simulation starts, so a
/// failed call never produces a partial result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DynamicsError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl DynamicsError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        DynamicsError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// The name of the offending parameter.
    pub fn parameter(&self) -> &'static str {
        match self {
            DynamicsError::InvalidParameter { name, .. } => name,
        }
    }
}

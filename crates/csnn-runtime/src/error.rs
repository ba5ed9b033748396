//! Error types for the simulation engine

use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur while building or stepping a network
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Invalid network configuration
    #[error("Invalid network configuration: {reason}")]
    InvalidConfiguration {
        /// Reason for invalid configuration
        reason: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// The network was stepped before `initialize` was called
    #[error("Network is not initialized; call initialize(dt) before stepping")]
    NotInitialized,

    /// Population id does not name a registered population
    #[error("Population {index} not found")]
    UnknownPopulation {
        /// Population index that was not found
        index: usize,
    },

    /// Projection id does not name a registered projection
    #[error("Projection {index} not found")]
    UnknownProjection {
        /// Projection index that was not found
        index: usize,
    },

    /// State variable lookup by name failed
    #[error("Variable '{name}' not found in {owner}")]
    UnknownVariable {
        /// Variable name
        name: String,
        /// Name of the population or projection searched
        owner: String,
    },
}

impl RuntimeError {
    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }

    /// Create an unknown variable error
    pub fn unknown_variable(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::UnknownVariable {
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// Whether this error was raised while validating configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration { .. } | Self::InvalidParameter { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RuntimeError::invalid_config("duplicate destination");
        assert!(matches!(err, RuntimeError::InvalidConfiguration { .. }));
        assert!(err.is_configuration());

        let err = RuntimeError::invalid_parameter("dt", "0", "> 0.0");
        assert!(matches!(err, RuntimeError::InvalidParameter { .. }));
        assert!(err.is_configuration());

        assert!(!RuntimeError::NotInitialized.is_configuration());
    }

    #[test]
    fn test_error_display() {
        let err = RuntimeError::UnknownPopulation { index: 42 };
        assert!(err.to_string().contains("Population 42 not found"));

        let err = RuntimeError::unknown_variable("v", "exc");
        assert_eq!(err.to_string(), "Variable 'v' not found in exc");
    }
}

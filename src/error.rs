/*!
# Error Handling

Error types for plan construction and query execution.

## Error Categories

The engine distinguishes three kinds of failure:

- **Validation errors**: raised while constructing or first running a plan
  (ambiguous columns, ungrouped fields, nested aggregates, unsupported join
  kinds). These are terminal for the whole query.
- **Execution errors**: runtime failures while evaluating expressions or
  driving row streams (type mismatches, missing fields, division by zero).
  They propagate up the operator chain and are caught once at the top of
  execution.
- **Resource errors**: missing tables or backing files, translated into
  descriptive messages rather than leaking low-level I/O errors.

Cancellation is modelled as its own variant so operators can unwind cleanly
when a query is terminated.
*/

use std::fmt;

/// Errors raised during plan construction and query execution.
///
/// Each variant carries the context needed for a useful message. Errors are
/// cloneable because a buffered stream failure is replayed to every consumer
/// attached to that stream.
#[derive(Debug, Clone, PartialEq)]
pub enum DbError {
    /// Bind-time validation failure. Terminal for the whole query; there is
    /// no partial-result path for these.
    ValidationError {
        /// Description of the validation failure
        message: String,
    },

    /// Runtime failure while evaluating an expression or pulling rows.
    ExecutionError {
        /// Description of the execution failure
        message: String,
    },

    /// Data type mismatch during evaluation.
    TypeError {
        /// What the operation expected
        expected: String,
        /// What it actually received
        actual: String,
    },

    /// A column reference that matched no field in the row.
    UnknownField {
        /// The name as written in the query
        name: String,
    },

    /// A column reference that matched more than one field in the row.
    AmbiguousField {
        /// The name as written in the query
        name: String,
    },

    /// Function name not present in the registry.
    UnknownFunction {
        /// The name as written in the query
        name: String,
        /// Function category that was searched (scalar, aggregate, ...)
        category: String,
    },

    /// A named feature the engine deliberately does not implement.
    Unsupported {
        /// Description of the unimplemented feature
        message: String,
    },

    /// Missing table or backing storage.
    ResourceError {
        /// Name of the resource that could not be found
        resource: String,
        /// Description of the failure
        message: String,
    },

    /// The query was cancelled while running.
    Cancelled,
}

impl DbError {
    pub fn validation(message: impl Into<String>) -> Self {
        DbError::ValidationError {
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        DbError::ExecutionError {
            message: message.into(),
        }
    }

    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        DbError::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn unknown_function(name: impl Into<String>, category: impl Into<String>) -> Self {
        DbError::UnknownFunction {
            name: name.into(),
            category: category.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        DbError::Unsupported {
            message: message.into(),
        }
    }

    pub fn resource(resource: impl Into<String>, message: impl Into<String>) -> Self {
        DbError::ResourceError {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// True for errors raised while constructing or binding a plan, as
    /// opposed to failures mid-stream.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DbError::ValidationError { .. }
                | DbError::Unsupported { .. }
                | DbError::UnknownFunction { .. }
        )
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::ValidationError { message } => {
                write!(f, "Validation error: {}", message)
            }
            DbError::ExecutionError { message } => {
                write!(f, "Execution error: {}", message)
            }
            DbError::TypeError { expected, actual } => {
                write!(f, "Type error: expected {}, got {}", expected, actual)
            }
            DbError::UnknownField { name } => {
                write!(f, "Unknown field: {}", name)
            }
            DbError::AmbiguousField { name } => {
                write!(f, "Ambiguous field reference: {}", name)
            }
            DbError::UnknownFunction { name, category } => {
                write!(f, "Unknown {} function: {}", category, name)
            }
            DbError::Unsupported { message } => {
                write!(f, "Unsupported: {}", message)
            }
            DbError::ResourceError { resource, message } => {
                write!(f, "Resource error for '{}': {}", resource, message)
            }
            DbError::Cancelled => {
                write!(f, "Query was cancelled")
            }
        }
    }
}

impl std::error::Error for DbError {}

/// Convenience alias used throughout the engine.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = DbError::validation("GROUP BY is out of range");
        assert_eq!(err.to_string(), "Validation error: GROUP BY is out of range");

        let err = DbError::type_error("numeric", "TEXT");
        assert_eq!(err.to_string(), "Type error: expected numeric, got TEXT");

        let err = DbError::unknown_function("FROB", "scalar");
        assert_eq!(err.to_string(), "Unknown scalar function: FROB");
    }

    #[test]
    fn test_validation_classification() {
        assert!(DbError::validation("x").is_validation());
        assert!(DbError::unsupported("x").is_validation());
        assert!(!DbError::execution("x").is_validation());
        assert!(!DbError::Cancelled.is_validation());
    }
}

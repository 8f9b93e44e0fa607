//! Error types used by coordinators, tiles and the dependency verifier.
//!
//! - [`CoordinatorError`]: construction and call-site failures (fail fast).
//! - [`HandlerError`]: failures raised by user event-handling code; carried by [`Event::Error`](crate::Event::Error).
//! - [`BatchError`]: a processed batch that ended in an unhandled or escalated error.
//! - [`VerifyError`]: structural violations found by [`DependenciesVerifier`](crate::DependenciesVerifier).
//! - [`ResourceError`]: managed resource creation/release failures.
//! - [`ConfigError`]: configuration parse failures for configuration-aware tiles.
//!
//! Every enum provides `as_label` for logs/metrics.

use std::sync::Arc;

use thiserror::Error;

use crate::core::Name;

/// Boxed error returned by user-supplied resource factories and release actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Errors raised at coordinator call sites.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// Batch size must be at least 1.
    #[error("invalid batch size {batch_size}; must be >= 1")]
    InvalidBatchSize {
        /// The rejected batch size.
        batch_size: usize,
    },

    /// The coordinator was closed; it no longer accepts start/stop/timers/registrations.
    #[error("coordinator {name} is closed")]
    Closed {
        /// Name of the closed coordinator.
        name: Name,
    },

    /// A coordinator tried to follow its own status.
    #[error("coordinator {name} cannot follow its own status")]
    SelfRegistration {
        /// Name of the offending coordinator.
        name: Name,
    },

    /// A name passed to `follow_status_changes_by_name` does not resolve.
    #[error("no coordinator named {name} is registered")]
    UnknownCoordinator {
        /// The unresolved name.
        name: Name,
    },

    /// Another live coordinator already uses this name.
    #[error("a coordinator named {name} already exists")]
    DuplicateName {
        /// The duplicated name.
        name: Name,
    },
}

impl CoordinatorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CoordinatorError::InvalidBatchSize { .. } => "coordinator_invalid_batch_size",
            CoordinatorError::Closed { .. } => "coordinator_closed",
            CoordinatorError::SelfRegistration { .. } => "coordinator_self_registration",
            CoordinatorError::UnknownCoordinator { .. } => "coordinator_unknown",
            CoordinatorError::DuplicateName { .. } => "coordinator_duplicate_name",
        }
    }
}

/// # Failure raised by an event handler.
///
/// The processor turns a failing handler call into an [`Event::Error`](crate::Event::Error)
/// carrying this value, so it is cheap to clone.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    /// Generic handler failure.
    #[error("handler failed: {error}")]
    Fail {
        /// The underlying error message.
        error: Arc<str>,
    },

    /// Configuration could not be applied.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A coordinator call made from inside the handler failed.
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// A managed resource could not be created.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl HandlerError {
    /// Builds a [`HandlerError::Fail`] from any displayable message.
    pub fn fail(error: impl std::fmt::Display) -> Self {
        HandlerError::Fail {
            error: error.to_string().into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Fail { .. } => "handler_failed",
            HandlerError::Config(_) => "handler_config",
            HandlerError::Coordinator(e) => e.as_label(),
            HandlerError::Resource(e) => e.as_label(),
        }
    }
}

impl From<BoxError> for HandlerError {
    fn from(err: BoxError) -> Self {
        HandlerError::fail(err)
    }
}

/// # A batch of events finished with a failure.
///
/// Produced while a coordinator's worker processes a batch and logged there.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum BatchError {
    /// An error event was delivered but the handler never marked it handled.
    #[error("coordinator {name}: unhandled error: {cause}")]
    Unhandled {
        /// Coordinator that processed the batch.
        name: Name,
        /// The original failure.
        cause: HandlerError,
    },

    /// The handler marked an error handled and then failed again.
    #[error("coordinator {name}: handler escalated while handling error: {cause}")]
    Escalated {
        /// Coordinator that processed the batch.
        name: Name,
        /// The failure raised while handling the error event.
        cause: HandlerError,
    },
}

impl BatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BatchError::Unhandled { .. } => "batch_unhandled_error",
            BatchError::Escalated { .. } => "batch_escalated_error",
        }
    }

    /// Returns the failure that caused the batch to fail.
    pub fn cause(&self) -> &HandlerError {
        match self {
            BatchError::Unhandled { cause, .. } | BatchError::Escalated { cause, .. } => cause,
        }
    }
}

/// # Structural violations of a tile tree.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// A tile appears as a managed child of more than one parent.
    #[error("tile {tile} is managed by two parent tiles: {parents:?}")]
    ManagedByMultipleParents {
        /// The over-managed tile.
        tile: Name,
        /// Names of every parent managing it (sorted).
        parents: Vec<Name>,
    },

    /// A non-root tile is reachable but nobody manages its lifecycle.
    #[error("tile {tile} is not being managed by any parent tile")]
    NotManaged {
        /// The orphaned tile.
        tile: Name,
    },
}

impl VerifyError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            VerifyError::ManagedByMultipleParents { .. } => "verify_managed_by_multiple_parents",
            VerifyError::NotManaged { .. } => "verify_not_managed",
        }
    }
}

/// # Managed resource failures.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ResourceError {
    /// The factory failed to create the resource.
    #[error("failed to create resource {name}: {error}")]
    Create {
        /// Resource name.
        name: String,
        /// The underlying error message.
        error: Arc<str>,
    },

    /// The release action failed.
    #[error("failed to release resource {name}: {error}")]
    Release {
        /// Resource name.
        name: String,
        /// The underlying error message.
        error: Arc<str>,
    },
}

impl ResourceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ResourceError::Create { .. } => "resource_create_failed",
            ResourceError::Release { .. } => "resource_release_failed",
        }
    }
}

/// # Configuration parse failures.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The raw value under `key` could not be parsed into the tile's type.
    #[error("invalid configuration for key {key}: {error}")]
    Parse {
        /// The configuration key.
        key: String,
        /// The underlying parser message.
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        let err = CoordinatorError::InvalidBatchSize { batch_size: 0 };
        assert_eq!(err.as_label(), "coordinator_invalid_batch_size");

        let err = HandlerError::fail("boom");
        assert_eq!(err.as_label(), "handler_failed");
        assert_eq!(err.to_string(), "handler failed: boom");
    }

    #[test]
    fn verify_error_messages_name_the_violation() {
        let err = VerifyError::ManagedByMultipleParents {
            tile: Name::new("a"),
            parents: vec![Name::new("b"), Name::new("c")],
        };
        assert!(err.to_string().contains("managed by two parent tiles"));

        let err = VerifyError::NotManaged { tile: Name::new("a") };
        assert!(err.to_string().contains("not being managed by any parent tile"));
    }

    #[test]
    fn coordinator_errors_convert_into_handler_errors() {
        let err: HandlerError = CoordinatorError::Closed { name: Name::new("x") }.into();
        assert_eq!(err.as_label(), "coordinator_closed");
    }
}

//! Error handling module for clustergen
//!
//! Provides the centralized error type used by the asset engine and every
//! asset implementation. Errors carry the asset name and the phase that
//! failed so a caller can tell which step broke without inspecting internals.

use crate::asset::state::AssetTransitionError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Phase of asset resolution an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Probing persisted storage for a previous run's output
    Load,
    /// Running the asset's generation logic
    Generate,
    /// Writing generated files to the asset directory
    Persist,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => write!(f, "load"),
            Self::Generate => write!(f, "generate"),
            Self::Persist => write!(f, "persist"),
        }
    }
}

/// Main error type for asset resolution and generation
///
/// Cloneable so the store can hand a memoized failure to every later request.
/// Wrapper variants render their cause inline and do not expose it as
/// `source()`, so a `{:#}` chain prints each message once.
#[derive(Error, Debug, Clone)]
pub enum AssetError {
    /// IO errors (asset directory, working directory, state read-back)
    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    /// Configuration errors (missing or contradictory input)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The install config selects none of the supported platforms
    #[error("no known platform")]
    NoKnownPlatform,

    /// External provisioning tool failed (init/apply)
    #[error("{context}: {cause}")]
    Tool {
        context: String,
        cause: Box<AssetError>,
    },

    /// A tool process exited unsuccessfully
    #[error("{program} exited with code {code}: {stderr}")]
    ToolExit {
        program: String,
        code: i32,
        stderr: String,
    },

    /// Persisted output of a hazardous asset already exists (unsafe resume)
    #[error("{filename:?} already exists")]
    AlreadyExists { filename: String },

    /// An asset transitively depends on itself
    #[error("dependency cycle detected: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<&'static str> },

    /// The asset already failed earlier in this run; `cause` is that failure
    #[error("asset {asset:?} already failed in this run: {cause}")]
    PreviouslyFailed {
        asset: &'static str,
        cause: Box<AssetError>,
    },

    /// A shutdown signal arrived; running tools were stopped and no new
    /// ones are started
    #[error("interrupted by {signal}")]
    Interrupted { signal: &'static str },

    /// A generating asset asked for a parent it did not declare
    #[error("asset {asset:?} is not a resolved dependency of {requested_by:?}")]
    MissingParent {
        asset: &'static str,
        requested_by: &'static str,
    },

    /// An output filename would escape the asset directory
    #[error("invalid asset filename {0:?}")]
    InvalidFilename(String),

    /// Resolver state machine violation
    #[error("Resolver state error: {0}")]
    State(#[from] AssetTransitionError),

    /// Context wrapper naming the asset and phase that failed
    #[error("failed to {phase} asset {asset:?}: {cause}")]
    Phase {
        asset: &'static str,
        phase: Phase,
        cause: Box<AssetError>,
    },
}

impl From<std::io::Error> for AssetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for AssetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(Arc::new(err))
    }
}

/// Result type alias for asset operations
pub type Result<T> = std::result::Result<T, AssetError>;

impl AssetError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap an external tool failure with descriptive context
    pub fn tool(context: impl Into<String>, cause: AssetError) -> Self {
        Self::Tool {
            context: context.into(),
            cause: Box::new(cause),
        }
    }

    /// Attach the failing asset and phase
    pub fn in_phase(self, asset: &'static str, phase: Phase) -> Self {
        Self::Phase {
            asset,
            phase,
            cause: Box::new(self),
        }
    }

    /// Innermost cause, skipping phase, tool and memoized-failure wrappers
    pub fn root(&self) -> &AssetError {
        match self {
            Self::Phase { cause, .. }
            | Self::Tool { cause, .. }
            | Self::PreviouslyFailed { cause, .. } => cause.root(),
            other => other,
        }
    }

    /// True when the root cause is an unsafe-resume refusal
    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), Self::AlreadyExists { .. })
    }
}

/// Accumulates errors from a sequence of best-effort steps.
///
/// The first recorded error is authoritative; anything recorded afterwards is
/// logged and dropped.
#[derive(Debug, Default)]
pub struct FirstError {
    primary: Option<AssetError>,
}

impl FirstError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the outcome of a main operation
    pub fn from_result(result: Result<()>) -> Self {
        Self {
            primary: result.err(),
        }
    }

    /// Record an error; logged instead when a primary error already exists
    pub fn record(&mut self, err: AssetError) {
        if self.primary.is_none() {
            self.primary = Some(err);
        } else {
            tracing::error!("{}", err);
        }
    }

    pub fn is_set(&self) -> bool {
        self.primary.is_some()
    }

    pub fn into_result(self) -> Result<()> {
        match self.primary {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AssetError::config("cluster name is empty");
        assert_eq!(err.to_string(), "Configuration error: cluster name is empty");

        assert_eq!(AssetError::NoKnownPlatform.to_string(), "no known platform");

        let err = AssetError::AlreadyExists {
            filename: "terraform.tfstate".to_string(),
        };
        assert_eq!(err.to_string(), "\"terraform.tfstate\" already exists");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AssetError = io_err.into();
        assert!(matches!(err, AssetError::Io(_)));
    }

    #[test]
    fn test_phase_wrapper_names_asset_and_phase() {
        let err = AssetError::NoKnownPlatform.in_phase("Cluster", Phase::Generate);
        assert_eq!(
            err.to_string(),
            "failed to generate asset \"Cluster\": no known platform"
        );
        assert!(matches!(err.root(), AssetError::NoKnownPlatform));
    }

    #[test]
    fn test_chain_prints_each_message_once() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no state here");
        let err = AssetError::tool("failed to read terraform state", io_err.into())
            .in_phase("Cluster", Phase::Generate);
        assert!(std::error::Error::source(&err).is_none());

        let report = format!(
            "{:#}",
            anyhow::Error::new(err).context("failed to create cluster")
        );
        assert_eq!(
            report,
            "failed to create cluster: failed to generate asset \"Cluster\": \
             failed to read terraform state: IO error: no state here"
        );
        assert_eq!(report.matches("no state here").count(), 1);
    }

    #[test]
    fn test_previously_failed_keeps_cause() {
        let first = AssetError::config("no install config provided")
            .in_phase("Install Config", Phase::Generate);
        let again = AssetError::PreviouslyFailed {
            asset: "Install Config",
            cause: Box::new(first.clone()),
        };
        assert!(matches!(again.root(), AssetError::Config(_)));
        assert!(again.to_string().ends_with("no install config provided"));
    }

    #[test]
    fn test_root_skips_tool_context() {
        let err = AssetError::tool(
            "failed to run terraform",
            AssetError::ToolExit {
                program: "terraform".to_string(),
                code: 1,
                stderr: "boom".to_string(),
            },
        )
        .in_phase("Cluster", Phase::Generate);
        assert!(matches!(err.root(), AssetError::ToolExit { code: 1, .. }));
        assert!(err.to_string().contains("failed to run terraform"));
    }

    #[test]
    fn test_is_already_exists_through_wrappers() {
        let err = AssetError::AlreadyExists {
            filename: "terraform.tfstate".to_string(),
        }
        .in_phase("Cluster", Phase::Load);
        assert!(err.is_already_exists());
        assert!(!AssetError::NoKnownPlatform.is_already_exists());
    }

    #[test]
    fn test_dependency_cycle_display() {
        let err = AssetError::DependencyCycle {
            chain: vec!["A", "B", "A"],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: A -> B -> A");
    }

    #[test]
    fn test_first_error_keeps_first() {
        let mut errors = FirstError::new();
        assert!(!errors.is_set());
        errors.record(AssetError::config("first"));
        errors.record(AssetError::config("second"));
        let err = errors.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: first");
    }

    #[test]
    fn test_first_error_from_ok_promotes_later_error() {
        let mut errors = FirstError::from_result(Ok(()));
        errors.record(AssetError::config("late"));
        assert!(errors.into_result().is_err());

        assert!(FirstError::from_result(Ok(())).into_result().is_ok());
    }
}

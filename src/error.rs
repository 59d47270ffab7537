//! Error types for compilation sessions, policy enforcement and sandboxed execution.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::compilation::diagnostics::Diagnostic;
use crate::policy::enforcement::PolicyViolation;

/// Errors raised while building the API policy at startup.
///
/// These are never user-recoverable: a correctly packaged deployment never
/// produces them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyBuildError {
    /// An explicit rule names a type that the reference surface does not export.
    #[error("policy names unknown type `{0}`")]
    UnknownType(String),

    /// An explicit rule names a member that the type does not expose.
    #[error("policy names unknown member `{type_name}::{member}`")]
    UnknownMember {
        /// Full name of the type.
        type_name: String,
        /// Member name (getters use the `get_` prefix).
        member: String,
    },

    /// The same node was declared twice with different access levels.
    #[error("conflicting access for `{0}`")]
    ConflictingAccess(String),

    /// A denied node carries children that would widen its decision.
    #[error("`{0}` is denied but declares allowed children")]
    WidenedDenial(String),

    /// A rewriter was attached to a rule that is not `Allowed`.
    #[error("rewriter attached to non-allowed member `{0}`")]
    RewriterOnDenied(String),
}

/// Errors that can occur in a compilation session or sandbox execution.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The underlying compiler reported errors.
    #[error("compilation failed with {} error(s)", .0.len())]
    Compilation(Vec<Diagnostic>),

    /// The compiled code references members the API policy does not allow.
    #[error("{}", ViolationList(.0))]
    PolicyViolation(Vec<PolicyViolation>),

    /// The requested target cannot handle a construct present in the input.
    #[error("{construct} is not supported for target `{target}`")]
    NotSupported {
        /// Description of the construct.
        construct: String,
        /// Target name.
        target: String,
    },

    /// The execution exceeded the configured timeout.
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    /// The execution exceeded memory limits.
    #[error("memory limit exceeded: {0}")]
    MemoryLimitExceeded(String),

    /// Execution ran out of fuel (instruction limit).
    #[error("execution ran out of fuel after {consumed:?} instructions")]
    OutOfFuel {
        /// Number of instructions consumed before running out.
        consumed: Option<u64>,
    },

    /// The owning session was torn down while the request was in flight.
    #[error("request cancelled")]
    Cancelled,

    /// No adapter is registered for the language.
    #[error("unknown language `{0}`")]
    UnknownLanguage(String),

    /// An option carried a value the adapter cannot interpret.
    #[error("invalid value `{value}` for option `{name}`")]
    InvalidOption {
        /// Option name.
        name: String,
        /// Rejected value.
        value: String,
    },

    /// The API policy could not be built.
    #[error("failed to build API policy: {0}")]
    PolicyBuild(#[from] PolicyBuildError),

    /// Failed to initialize the Wasm runtime.
    #[error("failed to initialize runtime: {0}")]
    RuntimeInit(#[source] anyhow::Error),

    /// Failed to compile, link or instantiate the guest module.
    #[error("failed to load module: {0}")]
    ModuleLoad(#[source] anyhow::Error),

    /// The host failed while running the guest.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

struct ViolationList<'a>(&'a [PolicyViolation]);

impl fmt::Display for ViolationList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            [] => f.write_str("policy violation"),
            [single] => write!(f, "{single}"),
            [first, rest @ ..] => write!(f, "{first} (and {} more)", rest.len()),
        }
    }
}

/// Coarse classification of a failed request, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Syntax or semantic errors from the compiler.
    Compilation,
    /// Use of an API the policy denies.
    PolicyViolation,
    /// Target cannot support a construct in the input.
    NotSupported,
    /// Wall-clock timeout during execution.
    Timeout,
    /// Memory or fuel exhausted during execution.
    ResourceExhausted,
    /// Session torn down mid-request.
    Cancelled,
    /// Bad option value or unknown language.
    InvalidRequest,
    /// Anything else; indicates a host-side problem.
    Internal,
}

impl SandboxError {
    /// Classify this error for the session boundary.
    pub fn kind(&self) -> FailureKind {
        match self {
            SandboxError::Compilation(_) => FailureKind::Compilation,
            SandboxError::PolicyViolation(_) => FailureKind::PolicyViolation,
            SandboxError::NotSupported { .. } => FailureKind::NotSupported,
            SandboxError::Timeout(_) => FailureKind::Timeout,
            SandboxError::MemoryLimitExceeded(_) | SandboxError::OutOfFuel { .. } => {
                FailureKind::ResourceExhausted
            }
            SandboxError::Cancelled => FailureKind::Cancelled,
            SandboxError::UnknownLanguage(_) | SandboxError::InvalidOption { .. } => {
                FailureKind::InvalidRequest
            }
            SandboxError::PolicyBuild(_)
            | SandboxError::RuntimeInit(_)
            | SandboxError::ModuleLoad(_)
            | SandboxError::ExecutionFailed(_)
            | SandboxError::Io(_)
            | SandboxError::Config(_) => FailureKind::Internal,
        }
    }

    /// Check if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout(_))
    }

    /// Check if this error represents a memory limit exceeded.
    pub fn is_memory_limit(&self) -> bool {
        matches!(self, SandboxError::MemoryLimitExceeded(_))
    }

    /// Check if this error represents a policy violation.
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, SandboxError::PolicyViolation(_))
    }

    /// Check if this error represents a target incompatibility.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, SandboxError::NotSupported { .. })
    }

    /// Check if this error represents an out-of-fuel condition.
    pub fn is_out_of_fuel(&self) -> bool {
        matches!(self, SandboxError::OutOfFuel { .. })
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

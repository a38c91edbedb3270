//! Structured error kinds for the masterchef engine.
//!
//! Every fallible public entry point in this crate returns a `Result<T,
//! MasterchefError>`. Each pipeline stage (loader, expander, validator,
//! planner, simulator, executor, run store, policy) owns a local error type
//! that carries stage-specific detail; those local types convert into
//! `MasterchefError` at the module boundary so callers further up the
//! pipeline only ever match on one enum.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type returned by the public engine API.
#[derive(Debug, Error)]
pub enum MasterchefError {
    #[error("failed to parse document {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("composition cycle detected: {0}")]
    CompositionCycle(String),

    #[error("document failed validation ({} error(s)): {}", .0.len(), join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("planner could not produce a total order: {0}")]
    PlanCycle(String),

    #[error("simulation error on resource {resource_id}: {message}")]
    Simulation {
        resource_id: String,
        message: String,
    },

    #[error("apply error on resource {resource_id}: {message}")]
    Apply {
        resource_id: String,
        message: String,
    },

    #[error("run store error: {0}")]
    Store(#[from] StoreError),

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while validating and normalizing a composed document.
///
/// `validate` collects every violation it finds rather than stopping at the
/// first one, so a single invocation can report everything wrong with a
/// document in one pass.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("document version must be non-empty")]
    EmptyVersion,

    #[error("execution.strategy '{0}' is not one of linear, free, serial")]
    InvalidStrategy(String),

    #[error("execution.max_fail_percentage must be in [0, 100], got {0}")]
    InvalidMaxFailPercentage(u32),

    #[error("host name must be non-empty")]
    EmptyHostName,

    #[error("duplicate host name '{0}'")]
    DuplicateHost(String),

    #[error("host '{host}' has invalid transport '{transport}'")]
    InvalidTransport { host: String, transport: String },

    #[error("host '{host}' field '{field}' has invalid port {port}")]
    InvalidPort {
        host: String,
        field: String,
        port: u32,
    },

    #[error("resource id must be non-empty")]
    EmptyResourceId,

    #[error("duplicate resource id '{0}'")]
    DuplicateResource(String),

    #[error("resource '{0}' has an empty host")]
    EmptyResourceHost(String),

    #[error("resource '{resource}' references unknown host '{host}'")]
    UnknownHost { resource: String, host: String },

    #[error("resource '{resource}' delegates to unknown host '{host}'")]
    UnknownDelegate { resource: String, host: String },

    #[error("file resource '{0}' requires a non-empty 'path'")]
    FileMissingPath(String),

    #[error("command resource '{0}' requires a non-empty 'command'")]
    CommandMissingCommand(String),

    #[error("command resource '{resource}' has negative or invalid retries: {retries}")]
    InvalidRetries { resource: String, retries: i64 },

    #[error(
        "command resource '{resource}' has negative retry_delay_seconds: {retry_delay_seconds}"
    )]
    InvalidRetryDelay {
        resource: String,
        retry_delay_seconds: i64,
    },

    #[error("resource '{resource}' references unknown dependency '{dep}' via '{relation}'")]
    UnknownDependency {
        resource: String,
        relation: String,
        dep: String,
    },

    #[error("resource '{0}' has unsupported type '{1}'")]
    UnsupportedResourceType(String, String),
}

/// Errors raised while reading or writing the run store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run '{0}' not found")]
    NotFound(String),

    #[error("failed to create run store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write run record {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read run record {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode run record {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to atomically replace run store: {0}")]
    Replace(String),
}

/// Errors raised by the policy signer/verifier boundary.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),

    #[error("signature verification failed for bundle {0}")]
    VerificationFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// src/error.rs
//! Unified error handling for the EMG stream engine
//!
//! Component errors (`IngestError`, `DecodeError`, `ConfigError`, `ServiceError`) stay
//! small and matchable; all of them convert into `EmgError`, which carries an
//! `ErrorContext` describing where the failure was observed.

use std::collections::HashMap;
use std::time::SystemTime;
use thiserror::Error;

/// Reasons a batch is refused by the ingest coordinator. A refused batch leaves
/// all coordinator state untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("batch contains no values")]
    EmptyBatch,

    #[error("non-finite batch timestamp: {0}")]
    NonFiniteTimestamp(f64),

    #[error("batch at {timestamp:.3}s predates reset boundary {boundary:.3}s")]
    StaleBatch { timestamp: f64, boundary: f64 },

    #[error("duplicate delivery of batch at {0:.3}s")]
    DuplicateBatch(f64),
}

/// Payload decoding failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is empty")]
    Empty,

    #[error("payload length {0} is not a multiple of 2")]
    OddLength(usize),
}

/// Configuration loading and validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("failed to serialize configuration: {0}")]
    Serialize(String),

    #[error("configuration validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// Service channel failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("ingestion task has stopped")]
    ChannelClosed,

    #[error("ingestion task dropped the reply")]
    ReplyDropped,
}

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum EmgError {
    #[error("[INGEST] {source} ({})", .context.operation)]
    Ingest {
        #[source]
        source: IngestError,
        context: ErrorContext,
    },

    #[error("[DECODE] {source} ({})", .context.operation)]
    Decode {
        #[source]
        source: DecodeError,
        context: ErrorContext,
    },

    #[error("[CONFIG] Configuration error in {}: {source}", .context.component)]
    Configuration {
        #[source]
        source: ConfigError,
        context: ErrorContext,
    },

    #[error("[SERVICE] {source} ({})", .context.operation)]
    Service {
        #[source]
        source: ServiceError,
        context: ErrorContext,
    },

    #[error("[COMM] reconnect exhausted after {attempts} attempts ({})", .context.operation)]
    ReconnectExhausted { attempts: u32, context: ErrorContext },

    #[error("[TRANSPORT] {reason} ({})", .context.operation)]
    Transport { reason: String, context: ErrorContext },

    #[error("[SYSTEM] {subsystem} error: {reason} ({})", .context.operation)]
    System {
        subsystem: String,
        reason: String,
        context: ErrorContext,
    },
}

/// Error context for debugging and analysis
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    pub thread_id: Option<String>,
    pub component: String,
    pub operation: String,
    pub file: Option<&'static str>,
    pub line: Option<u32>,
    pub additional_info: HashMap<String, String>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            timestamp: SystemTime::now(),
            thread_id: std::thread::current().name().map(|s| s.to_string()),
            component: component.to_string(),
            operation: operation.to_string(),
            file: None,
            line: None,
            additional_info: HashMap::new(),
        }
    }

    /// Create error context with file and line information
    pub fn with_location(component: &str, operation: &str, file: &'static str, line: u32) -> Self {
        let mut context = Self::new(component, operation);
        context.file = Some(file);
        context.line = Some(line);
        context
    }

    /// Add additional information to the context
    pub fn add_info<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.additional_info.insert(key.into(), value.into());
        self
    }
}

/// Macro for creating error context with file and line info
#[macro_export]
macro_rules! error_context {
    ($component:expr, $operation:expr) => {
        $crate::error::ErrorContext::with_location($component, $operation, file!(), line!())
    };
}

impl EmgError {
    /// Context attached to this error
    pub fn context(&self) -> &ErrorContext {
        match self {
            EmgError::Ingest { context, .. }
            | EmgError::Decode { context, .. }
            | EmgError::Configuration { context, .. }
            | EmgError::Service { context, .. }
            | EmgError::ReconnectExhausted { context, .. }
            | EmgError::Transport { context, .. }
            | EmgError::System { context, .. } => context,
        }
    }
}

impl From<IngestError> for EmgError {
    fn from(source: IngestError) -> Self {
        EmgError::Ingest {
            source,
            context: error_context!("coordinator", "ingest"),
        }
    }
}

impl From<DecodeError> for EmgError {
    fn from(source: DecodeError) -> Self {
        EmgError::Decode {
            source,
            context: error_context!("hal", "decode_payload"),
        }
    }
}

impl From<ConfigError> for EmgError {
    fn from(source: ConfigError) -> Self {
        EmgError::Configuration {
            source,
            context: error_context!("config", "load"),
        }
    }
}

impl From<ServiceError> for EmgError {
    fn from(source: ServiceError) -> Self {
        EmgError::Service {
            source,
            context: error_context!("service", "send"),
        }
    }
}

/// Result type alias for EMG operations
pub type EmgResult<T> = Result<T, EmgError>;

/// Error builder for convenient error construction
pub struct EmgErrorBuilder {
    component: String,
    operation: String,
    info: Vec<(String, String)>,
}

impl EmgErrorBuilder {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            info: Vec::new(),
        }
    }

    /// Attach a key/value pair to the context of the built error
    pub fn with_info<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.info.push((key.into(), value.to_string()));
        self
    }

    fn context(&self) -> ErrorContext {
        self.info
            .iter()
            .fold(ErrorContext::new(&self.component, &self.operation), |context, (k, v)| {
                context.add_info(k.as_str(), v.as_str())
            })
    }

    pub fn reconnect_exhausted(self, attempts: u32) -> EmgError {
        EmgError::ReconnectExhausted {
            attempts,
            context: self.context(),
        }
    }

    pub fn transport(self, reason: &str) -> EmgError {
        EmgError::Transport {
            reason: reason.to_string(),
            context: self.context(),
        }
    }
}

/// Convenience trait for error building
pub trait IntoEmgError<T> {
    fn emg_err(self, component: &str, operation: &str) -> EmgResult<T>;
}

impl<T, E> IntoEmgError<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn emg_err(self, component: &str, operation: &str) -> EmgResult<T> {
        self.map_err(|err| EmgError::System {
            subsystem: component.to_string(),
            reason: err.to_string(),
            context: ErrorContext::new(component, operation),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("test_component", "test_operation").add_info("key", "value");
        assert_eq!(context.component, "test_component");
        assert_eq!(context.operation, "test_operation");
        assert_eq!(context.additional_info.get("key").map(String::as_str), Some("value"));
        assert!(context.timestamp <= SystemTime::now());
    }

    #[test]
    fn test_error_context_macro_records_location() {
        let context = error_context!("hal", "decode");
        assert_eq!(context.file, Some(file!()));
        assert!(context.line.is_some());
    }

    #[test]
    fn test_component_errors_convert() {
        let err: EmgError = DecodeError::OddLength(3).into();
        match &err {
            EmgError::Decode { source, .. } => assert_eq!(*source, DecodeError::OddLength(3)),
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(err.source().is_some());
        assert_eq!(err.context().component, "hal");

        let err: EmgError = IngestError::EmptyBatch.into();
        assert!(err.to_string().contains("no values"));
    }

    #[test]
    fn test_builder_reconnect_exhausted() {
        let err = EmgErrorBuilder::new("transport", "reconnect")
            .with_info("delays_ms", "[3000, 4000]")
            .reconnect_exhausted(2);
        match err {
            EmgError::ReconnectExhausted { attempts, context } => {
                assert_eq!(attempts, 2);
                assert_eq!(context.operation, "reconnect");
                assert_eq!(
                    context.additional_info.get("delays_ms").map(String::as_str),
                    Some("[3000, 4000]")
                );
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_validation_error_display_joins_messages() {
        let err = ConfigError::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "configuration validation failed: a; b");
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EmgError>();
    }

    #[test]
    fn test_into_emg_error_trait() {
        let result: Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "test error"));

        match result.emg_err("test_component", "test_operation") {
            Err(EmgError::System { subsystem, reason, .. }) => {
                assert_eq!(subsystem, "test_component");
                assert!(reason.contains("test error"));
            }
            other => panic!("expected system error, got {other:?}"),
        }
    }
}

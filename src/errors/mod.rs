//! # Error Handling
//!
//! Error types for the flowgate control plane using `thiserror`.

/// Custom result type for flowgate operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the flowgate control plane
#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// YAML decoding errors
    #[error("YAML error: {context}")]
    Yaml {
        #[source]
        source: serde_yaml::Error,
        context: String,
    },

    /// Extension hook errors
    #[error("Extension hook '{hook}' failed: {message}")]
    Extension { hook: String, message: String },

    /// A runner failed during setup or processing
    #[error("Runner '{name}' failed: {message}")]
    Runner { name: String, message: String },

    /// Operation attempted against a closed message store
    #[error("Message store '{0}' is closed")]
    StoreClosed(&'static str),

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl GatewayError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Create an extension hook error
    pub fn extension<H: Into<String>, S: Into<String>>(hook: H, message: S) -> Self {
        Self::Extension { hook: hook.into(), message: message.into() }
    }

    /// Create a runner error
    pub fn runner<N: Into<String>, S: Into<String>>(name: N, message: S) -> Self {
        Self::Runner { name: name.into(), message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Add context to an error
    pub fn context<S: Into<String>>(mut self, context: S) -> Self {
        let context = context.into();
        match &mut self {
            GatewayError::Io { context: ctx, .. }
            | GatewayError::Serialization { context: ctx, .. }
            | GatewayError::Yaml { context: ctx, .. } => {
                *ctx = format!("{}: {}", context, ctx);
            }
            _ => {}
        }
        self
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Io { .. } | GatewayError::Extension { .. })
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Yaml { source: error, context: "YAML decoding failed".to_string() }
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for GatewayError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect();
        fields.sort();

        Self::validation(format!("Validation failed: {}", fields.join("; ")))
    }
}

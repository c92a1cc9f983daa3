//! Error types for myorm

use thiserror::Error;

/// Result type alias for myorm operations
pub type DbResult<T> = Result<T, DbError>;

/// MySQL client error code for "MySQL server has gone away".
pub const CR_SERVER_GONE_ERROR: u16 = 2006;

/// MySQL client error code for an unclassified client-side failure.
pub const CR_UNKNOWN_ERROR: u16 = 2000;

/// Error types for query construction and execution
#[derive(Debug, Clone, Error)]
pub enum DbError {
    /// Table alias is not registered in the catalog
    #[error("Unknown table \"{0}\"")]
    UnknownTable(String),

    /// Connection alias has no configuration
    #[error("Unknown connection \"{0}\"")]
    UnknownConnection(String),

    /// Bad operator, unsupported literal type or invalid builder argument
    #[error("[{alias}] Invalid argument: {message}")]
    InvalidArgument { alias: String, message: String },

    /// Builder method not valid for the current operation kind
    #[error("[{alias}] Invalid operation: {message}")]
    InvalidOperation { alias: String, message: String },

    /// Unconditional UPDATE/DELETE or TRUNCATE without disabling the safety check
    #[error("[{alias}] Security error: {message}")]
    Security { alias: String, message: String },

    /// Handshake or session setup failure
    #[error("[{alias}] Connection error ({code}): {message}")]
    Connection {
        alias: String,
        code: u16,
        message: String,
    },

    /// Query execution failure
    #[error("[{alias}] Execution error ({code}): {message}")]
    Execution {
        alias: String,
        code: u16,
        message: String,
        sql: Option<String>,
    },

    /// Row value could not be converted to the requested type
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Configuration could not be loaded or is inconsistent
    #[error("Config error: {0}")]
    Config(String),
}

impl DbError {
    /// Create an invalid argument error for a connection alias
    pub fn invalid_argument(alias: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            alias: alias.into(),
            message: message.into(),
        }
    }

    /// Create an invalid operation error for a connection alias
    pub fn invalid_operation(alias: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            alias: alias.into(),
            message: message.into(),
        }
    }

    /// Create a security error for a connection alias
    pub fn security(alias: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Security {
            alias: alias.into(),
            message: message.into(),
        }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this is a security error
    pub fn is_security(&self) -> bool {
        matches!(self, Self::Security { .. })
    }

    /// Check if this error reports a lost server connection
    pub fn is_server_gone(&self) -> bool {
        matches!(
            self,
            Self::Execution { code, .. } | Self::Connection { code, .. }
                if *code == CR_SERVER_GONE_ERROR
        )
    }

    /// Driver error code, if the error came from the driver
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Connection { code, .. } | Self::Execution { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// SQL text that failed, for execution errors
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Execution { sql, .. } => sql.as_deref(),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for DbError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

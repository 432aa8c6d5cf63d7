//! Error types for stack synthesis.

use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Construct id registered twice
    E001DuplicateConstruct,
    /// E002: Two construct ids map to the same logical id
    E002LogicalIdCollision,
    /// E003: Construct id empty or containing unsupported characters
    E003InvalidConstructId,
    /// E004: Configuration missing or invalid
    E004InvalidConfig,
    /// E005: Ref/GetAtt/Sub target not defined in the stack
    E005DanglingReference,
    /// E006: Network layout cannot be carved from the VPC CIDR
    E006NetworkLayout,
    /// E007: Template could not be encoded or decoded
    E007Encoding,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001DuplicateConstruct => "E001",
            Self::E002LogicalIdCollision => "E002",
            Self::E003InvalidConstructId => "E003",
            Self::E004InvalidConfig => "E004",
            Self::E005DanglingReference => "E005",
            Self::E006NetworkLayout => "E006",
            Self::E007Encoding => "E007",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while building or synthesizing a stack
#[derive(Debug, Error)]
pub enum StackError {
    #[error("[{code}] Construct '{construct_id}' is already defined in this stack")]
    DuplicateConstruct {
        code: ErrorCode,
        construct_id: String,
    },

    #[error(
        "[{code}] Construct '{construct_id}' maps to logical id '{logical_id}', already used by '{existing}'"
    )]
    LogicalIdCollision {
        code: ErrorCode,
        construct_id: String,
        logical_id: String,
        existing: String,
    },

    #[error("[{code}] Invalid construct id '{construct_id}': {message}")]
    InvalidConstructId {
        code: ErrorCode,
        construct_id: String,
        message: String,
    },

    #[error("[{code}] Invalid configuration: {message}")]
    InvalidConfig { code: ErrorCode, message: String },

    #[error("[{code}] Resource '{resource}' references undefined '{target}'")]
    DanglingReference {
        code: ErrorCode,
        resource: String,
        target: String,
    },

    #[error("[{code}] Network layout error: {message}")]
    NetworkLayout { code: ErrorCode, message: String },

    #[error("[{code}] Template encoding failed: {message}")]
    Encoding { code: ErrorCode, message: String },
}

impl StackError {
    pub fn duplicate_construct(construct_id: impl Into<String>) -> Self {
        Self::DuplicateConstruct {
            code: ErrorCode::E001DuplicateConstruct,
            construct_id: construct_id.into(),
        }
    }

    pub fn logical_id_collision(
        construct_id: impl Into<String>,
        logical_id: impl Into<String>,
        existing: impl Into<String>,
    ) -> Self {
        Self::LogicalIdCollision {
            code: ErrorCode::E002LogicalIdCollision,
            construct_id: construct_id.into(),
            logical_id: logical_id.into(),
            existing: existing.into(),
        }
    }

    pub fn invalid_construct_id(construct_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConstructId {
            code: ErrorCode::E003InvalidConstructId,
            construct_id: construct_id.into(),
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            code: ErrorCode::E004InvalidConfig,
            message: message.into(),
        }
    }

    pub fn dangling_reference(resource: impl Into<String>, target: impl Into<String>) -> Self {
        Self::DanglingReference {
            code: ErrorCode::E005DanglingReference,
            resource: resource.into(),
            target: target.into(),
        }
    }

    pub fn network_layout(message: impl Into<String>) -> Self {
        Self::NetworkLayout {
            code: ErrorCode::E006NetworkLayout,
            message: message.into(),
        }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            code: ErrorCode::E007Encoding,
            message: message.into(),
        }
    }

    /// Stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateConstruct { code, .. }
            | Self::LogicalIdCollision { code, .. }
            | Self::InvalidConstructId { code, .. }
            | Self::InvalidConfig { code, .. }
            | Self::DanglingReference { code, .. }
            | Self::NetworkLayout { code, .. }
            | Self::Encoding { code, .. } => *code,
        }
    }
}

/// Result type alias for StackError
pub type Result<T> = std::result::Result<T, StackError>;

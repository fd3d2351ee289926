use crate::protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("Analysis failed for entry '{entry}': {reason}")]
    AnalysisError { entry: String, reason: String },

    #[error("Package \"{name}\" not found in bundle. Available: {}", available.join(", "))]
    UnknownPackageError { name: String, available: Vec<String> },

    #[error("Packages \"{first}\" and \"{second}\" both map to {field} \"{value}\"")]
    NameCollisionError {
        first: String,
        second: String,
        field: &'static str,
        value: String,
    },

    #[error("Protocol error: {0}")]
    ProtocolError(#[from] ProtocolError),

    #[error("Deploy failed for {unit}: {reason}")]
    DeployError { unit: String, reason: String },

    #[error("{tool} failed: {reason}")]
    ToolError { tool: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Bad input from the caller; fixing the command line is enough.
    Medium,
    /// The planning or build phase could not produce a result.
    High,
    /// The environment (filesystem, external tools) is broken.
    Critical,
}

impl SplitError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SplitError::UnknownPackageError { .. }
            | SplitError::ConfigError { .. }
            | SplitError::MissingConfigError { .. }
            | SplitError::InvalidConfigValueError { .. } => ErrorSeverity::Medium,
            SplitError::AnalysisError { .. }
            | SplitError::NameCollisionError { .. }
            | SplitError::ProtocolError(_)
            | SplitError::DeployError { .. } => ErrorSeverity::High,
            SplitError::ToolError { .. }
            | SplitError::IoError(_)
            | SplitError::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            SplitError::AnalysisError { .. } => {
                "Check that --entry points at an existing file and that esbuild is installed".to_string()
            }
            SplitError::UnknownPackageError { .. } => {
                "Run 'overwork analyze' to list the packages present in the bundle".to_string()
            }
            SplitError::NameCollisionError { .. } => {
                "Split only one of the colliding packages, or split them in separate runs".to_string()
            }
            SplitError::DeployError { .. } => {
                "Fix the error reported by wrangler and rerun 'overwork deploy'".to_string()
            }
            SplitError::ProtocolError(_) => "Check the call path and arguments".to_string(),
            SplitError::ConfigError { .. }
            | SplitError::MissingConfigError { .. }
            | SplitError::InvalidConfigValueError { .. } => {
                "Run 'overwork --help' to see the accepted options".to_string()
            }
            SplitError::ToolError { tool, .. } => {
                format!("Make sure '{}' is installed and on PATH", tool)
            }
            SplitError::IoError(_) => "Check file permissions and available disk space".to_string(),
            SplitError::SerializationError(_) => {
                "The plan file may be corrupt; rerun 'overwork build'".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SplitError>;

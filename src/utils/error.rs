use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrepError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("XML parsing error: {0}")]
    XmlError(#[from] roxmltree::Error),

    #[error("GeoJSON error: {0}")]
    GeoJsonError(#[from] geojson::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("OSM PBF error: {0}")]
    OsmError(#[from] osmpbf::Error),

    #[error("Pattern error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Unsupported input '{path}': {reason}")]
    UnsupportedInput { path: String, reason: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Upstream returned {status}: {message}")]
    UpstreamError { status: u16, message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

pub type Result<T> = std::result::Result<T, PrepError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Network,
    Processing,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl PrepError {
    pub fn processing(message: impl Into<String>) -> Self {
        Self::ProcessingError {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::CsvError(_)
            | Self::SerializationError(_)
            | Self::XmlError(_)
            | Self::GeoJsonError(_)
            | Self::ImageError(_)
            | Self::OsmError(_)
            | Self::UnsupportedInput { .. }
            | Self::NotFound { .. } => ErrorCategory::Input,
            Self::HttpError(_) | Self::UpstreamError { .. } => ErrorCategory::Network,
            Self::ProcessingError { .. } | Self::ValidationError { .. } | Self::RegexError(_) => {
                ErrorCategory::Processing
            }
            Self::IoError(_) | Self::ZipError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Input | ErrorCategory::Processing => {
                ErrorSeverity::High
            }
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::IoError(e) if e.kind() == std::io::ErrorKind::NotFound => {
                format!("File or directory not found: {}", e)
            }
            Self::IoError(e) => format!("File system error: {}", e),
            Self::HttpError(e) if e.is_timeout() => "The remote API did not respond in time".to_string(),
            Self::HttpError(e) => format!("Could not reach the remote API: {}", e),
            Self::UpstreamError { status, .. } => {
                format!("The remote API rejected the request (HTTP {})", status)
            }
            Self::MissingConfigError { field } => format!("Missing setting: {}", field),
            Self::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid setting {}: {}", field, reason)
            }
            Self::UnsupportedInput { path, reason } => format!("Cannot read {}: {}", path, reason),
            Self::NotFound { what } => format!("Not found: {}", what),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the command-line flags, mapprep.toml and the required environment variables"
            }
            ErrorCategory::Input => "Check that the input file exists and has the expected format",
            ErrorCategory::Network => {
                "Check network connectivity and API credentials, then run the command again"
            }
            ErrorCategory::Processing => "Re-run with --verbose to see which record failed",
            ErrorCategory::System => "Check disk space and permissions on the output directory",
        }
    }

    /// Process exit code for this error, by severity.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

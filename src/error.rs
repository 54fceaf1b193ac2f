use thiserror::Error;

/// Main error type for the video redactor library
#[derive(Error, Debug)]
pub enum RedactorError {
    #[error("Video processing error: {0}")]
    Video(#[from] VideoError),

    #[error("Detection table error: {0}")]
    Table(#[from] TableError),

    #[error("Redaction error: {0}")]
    Redaction(#[from] RedactionError),

    #[error("Finalize error: {0}")]
    Finalize(#[from] FinalizeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Video decode/encode errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Cannot open or probe source video {path}: {reason}")]
    SourceUnreadable { path: String, reason: String },

    #[error("Failed to open intermediate writer {path}: {reason}")]
    WriterOpenFailed { path: String, reason: String },

    #[error("Failed to read frame {frame_id}: {reason}")]
    FrameReadFailed { frame_id: u64, reason: String },

    #[error("Video encoding failed: {reason}")]
    EncodingFailed { reason: String },

    #[error("Required tool not available: {tool}")]
    ToolMissing { tool: String },
}

/// Detection table errors
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Failed to open detection table {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Detection table is missing required column '{column}'")]
    MissingColumn { column: String },

    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("Failed to write detection table {path}: {reason}")]
    Write { path: String, reason: String },
}

/// Strategy construction and application errors
#[derive(Error, Debug)]
pub enum RedactionError {
    #[error("Overlay image unavailable: {path} ({reason})")]
    OverlayAssetMissing { path: String, reason: String },

    #[error("Degenerate redaction region for detection in frame {frame_id}")]
    DegenerateRegion { frame_id: u64 },

    #[error("Invalid redaction parameters: {details}")]
    InvalidParameters { details: String },
}

/// Audio remux / final container errors
#[derive(Error, Debug)]
pub enum FinalizeError {
    #[error("Remux failed: {reason}")]
    RemuxFailed { reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using RedactorError
pub type Result<T> = std::result::Result<T, RedactorError>;

impl RedactorError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Conditions the pipeline absorbs locally instead of aborting the run
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Video(VideoError::FrameReadFailed { .. })
                | Self::Table(TableError::MalformedRecord { .. })
                | Self::Redaction(RedactionError::DegenerateRegion { .. })
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Video(VideoError::SourceUnreadable { path, .. }) => {
                format!("Could not read video '{}'. Please check the file exists and is a supported format.", path)
            }
            Self::Video(VideoError::ToolMissing { tool }) => {
                format!("'{}' could not be executed. Please install FFmpeg or set its path in the configuration.", tool)
            }
            Self::Redaction(RedactionError::OverlayAssetMissing { path, .. }) => {
                format!("Overlay image '{}' could not be loaded.", path)
            }
            Self::Finalize(FinalizeError::RemuxFailed { reason }) => {
                format!("Could not produce the final video: {}", reason)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

use thiserror::Error;

/// Errors raised by the pipeline. Sample-scoped anomalies (missing images,
/// empty masks) never surface as one of these; they are logged and skipped.
#[derive(Debug, Error)]
pub enum LisaError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model collaborator failed: {0}")]
    Collaborator(String),

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl LisaError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn collaborator<S: Into<String>>(msg: S) -> Self {
        Self::Collaborator(msg.into())
    }

    /// Whether this error came from the run configuration rather than the data or the model.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

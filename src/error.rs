use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkError {
    #[error("Input file does not exist: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Face detection failed: {0}")]
    Detection(String),

    #[error("Watermark embedding failed: {0}")]
    Embed(String),

    #[error("Cannot write output: {0}")]
    Write(String),

    #[error("Image loading error: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl MarkError {
    /// Whether the error comes from a stage that has a lower tier to fall back to.
    ///
    /// Informational only; callers use it to tell a degraded run from an aborted one.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MarkError::Decode(_)
                | MarkError::Detection(_)
                | MarkError::Embed(_)
                | MarkError::ImageLoad(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MarkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(MarkError::Detection("no model".into()).is_recoverable());
        assert!(MarkError::Embed("nan".into()).is_recoverable());
        assert!(!MarkError::InputMissing(PathBuf::from("a.jpg")).is_recoverable());
        assert!(!MarkError::Write("disk full".into()).is_recoverable());
    }

    #[test]
    fn test_input_missing_message_names_path() {
        let err = MarkError::InputMissing(PathBuf::from("/tmp/missing.png"));
        assert!(err.to_string().contains("/tmp/missing.png"));
    }
}

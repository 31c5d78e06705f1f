use thiserror::Error;

/// Errors produced while loading the model or serving a job.
#[derive(Error, Debug)]
pub enum DepthError {
    /// The job carried no usable image URL
    #[error("Missing 'image_url' in input")]
    MissingImageUrl,

    /// The image URL could not be parsed or uses an unsupported scheme
    #[error("Invalid 'image_url' {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Every download attempt failed
    #[error("Failed to download image after {attempts} attempts: {reason}")]
    Retrieval { attempts: u32, reason: String },

    /// The HTTP client could not be set up, so no download was attempted
    #[error("Could not prepare image download: {0}")]
    Client(String),

    /// The model session failed or returned something unusable
    #[error("Depth inference failed: {0}")]
    Model(String),

    /// The depth field could not be turned into an image
    #[error("Depth encoding failed: {0}")]
    Encoding(String),

    /// The job worker stopped before producing a result
    #[error("Job aborted: {0}")]
    Aborted(String),

    /// The model could not be loaded at startup
    #[error("Could not load model from {dir}: {reason}")]
    ModelLoad { dir: String, reason: String },

    /// An environment setting could not be parsed
    #[error("Invalid configuration for {key}: {reason}")]
    Config { key: String, reason: String },
}

impl From<tensorflow::Status> for DepthError {
    fn from(status: tensorflow::Status) -> Self {
        DepthError::Model(status.to_string())
    }
}

impl From<image::ImageError> for DepthError {
    fn from(err: image::ImageError) -> Self {
        DepthError::Encoding(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DepthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_job_contract() {
        assert_eq!(
            DepthError::MissingImageUrl.to_string(),
            "Missing 'image_url' in input"
        );

        let err = DepthError::Retrieval {
            attempts: 3,
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to download image after 3 attempts: connection refused"
        );
    }
}

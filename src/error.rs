use thiserror::Error;

#[derive(Error, Debug)]
pub enum RankerError {
    #[error("Malformed record: {reason}")]
    MalformedRecord { reason: String },

    #[error("Failed to write {artifact} artifact: {source}")]
    Serialization {
        artifact: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Raw artifact unusable: {0}")]
    RawArtifact(String),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RankerError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        RankerError::MalformedRecord {
            reason: reason.into(),
        }
    }

    pub fn serialization<E>(artifact: &str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        RankerError::Serialization {
            artifact: artifact.to_string(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RankerError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid reading: {0}")]
    InvalidReading(String),
}

use thiserror::Error;

/// Errors surfaced by the photo ingestion pipeline and travel queries
#[derive(Error, Debug)]
pub enum AlbumError {
    #[error("Failed to extract photo metadata: {0}")]
    MetadataExtraction(String),

    #[error("Invalid photo path: {0}")]
    PathConstruction(String),

    #[error("Failed to upload {key} to object store: {message}")]
    StorageUpload { key: String, message: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Invalid upload batch: {0}")]
    InvalidBatch(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Object store error: {0}")]
    Storage(String),
}

impl AlbumError {
    pub fn travel_not_found(id: i64) -> Self {
        Self::NotFound { entity: "Travel", id }
    }

    pub fn user_not_found(id: i64) -> Self {
        Self::NotFound { entity: "User", id }
    }

    pub fn photo_not_found(id: i64) -> Self {
        Self::NotFound { entity: "Photo", id }
    }

    /// Wrap an infrastructure failure from the repository layer
    pub fn repository(err: anyhow::Error) -> Self {
        Self::Repository(format!("{err:#}"))
    }

    /// Stable machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::MetadataExtraction(_) => "METADATA_EXTRACTION_ERROR",
            Self::PathConstruction(_) => "PATH_CONSTRUCTION_ERROR",
            Self::StorageUpload { .. } => "STORAGE_UPLOAD_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidBatch(_) => "INVALID_BATCH",
            Self::Repository(_) => "REPOSITORY_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AlbumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = AlbumError::travel_not_found(42);
        assert_eq!(err.to_string(), "Travel 42 not found");
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_repository_keeps_context_chain() {
        let source = anyhow::anyhow!("connection refused").context("Failed to query travel");
        let err = AlbumError::repository(source);
        assert_eq!(
            err.to_string(),
            "Repository error: Failed to query travel: connection refused"
        );
    }
}

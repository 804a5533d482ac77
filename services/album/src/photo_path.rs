use crate::error::{AlbumError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage location of one photo inside the album bucket.
///
/// The object key is `{trip_id}/{display_name}.{extension}`. Display names
/// are not checked for collisions: uploading the same name twice to one
/// trip overwrites the stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoPath {
    bucket: String,
    trip_id: String,
    display_name: String,
    extension: String,
}

impl PhotoPath {
    /// Build a path from its identifying components.
    ///
    /// Rejects empty components and separators inside a component, so two
    /// distinct `(trip_id, display_name, extension)` tuples never share a key.
    pub fn create(
        bucket: impl Into<String>,
        trip_id: impl Into<String>,
        display_name: impl Into<String>,
        extension: impl Into<String>,
    ) -> Result<Self> {
        let path = Self {
            bucket: bucket.into(),
            trip_id: trip_id.into(),
            display_name: display_name.into(),
            extension: extension.into(),
        };

        require_component("bucket", &path.bucket, &[])?;
        require_component("trip id", &path.trip_id, &['/'])?;
        require_component("display name", &path.display_name, &['/'])?;
        require_component("extension", &path.extension, &['/', '.'])?;

        Ok(path)
    }

    /// Object key within the bucket
    pub fn key(&self) -> String {
        format!("{}/{}.{}", self.trip_id, self.display_name, self.extension)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl fmt::Display for PhotoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key())
    }
}

fn require_component(name: &str, value: &str, forbidden: &[char]) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AlbumError::PathConstruction(format!("{name} must not be empty")));
    }
    if let Some(c) = value.chars().find(|c| forbidden.contains(c)) {
        return Err(AlbumError::PathConstruction(format!(
            "{name} {value:?} must not contain {c:?}"
        )));
    }
    Ok(())
}

//! Travel use cases, including the photo upload pipeline.
//!
//! An upload batch runs in two phases. Preparation reads every file's
//! metadata and builds its storage path without touching the network, so a
//! bad image or name rejects the batch before anything is stored. The
//! upload phase then stores files one by one, in request order, and stops
//! at the first failure. Objects stored earlier in a failed batch are
//! deleted again on a best-effort basis.

use crate::adventure::aggregate;
use crate::error::{AlbumError, Result};
use crate::object_store::{content_type_for_extension, ObjectStore, StoredObject};
use crate::photo_meta::{extract_meta_data, extract_provider_metadata, PhotoMeta, UploadedFile};
use crate::photo_path::PhotoPath;
use crate::travel::{
    unique_tags, AdventureSummary, Photo, Tag, Travel, TravelDetail, TravelSummary, User,
};
use crate::travel_store::TravelRepository;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, instrument, warn};

/// Request to create a travel
#[derive(Debug, Clone, Deserialize)]
pub struct NewTravel {
    pub title: String,
    /// Users tagged on the travel
    #[serde(default)]
    pub members: Vec<Tag>,
}

/// One write lock per travel id.
///
/// Uploads to the same travel are serialized so that thumbnail and
/// adventure decisions always see the previous batch's result.
#[derive(Default)]
struct TripLocks {
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl TripLocks {
    async fn acquire(&self, travel_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // Entries only referenced by the map are idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(travel_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// A file that passed preparation and is ready to be stored
struct PreparedUpload {
    meta: PhotoMeta,
    path: PhotoPath,
    content_type: String,
    provider_metadata: HashMap<String, String>,
    bytes: Vec<u8>,
}

pub struct TravelService {
    repository: Arc<dyn TravelRepository>,
    store: Arc<dyn ObjectStore>,
    bucket: String,
    locks: TripLocks,
}

impl TravelService {
    pub fn new(
        repository: Arc<dyn TravelRepository>,
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            store,
            bucket: bucket.into(),
            locks: TripLocks::default(),
        }
    }

    /// Create a travel and tag its members
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create(&self, request: NewTravel) -> Result<TravelSummary> {
        let members = unique_tags(request.members);
        for member in &members {
            self.find_user(member.user_id).await?;
        }

        let travel_id = self
            .repository
            .create_travel(&request.title, &members)
            .await
            .map_err(AlbumError::repository)?;

        let mut travel = Travel::new(travel_id, request.title);
        travel.add_tags(members);

        info!(travel_id = travel_id, "Travel created");

        Ok(TravelSummary::new(&travel, Vec::new()))
    }

    /// Upload a batch of photos to a travel.
    ///
    /// `names[i]` is the display name of `files[i]`. The batch is all or
    /// nothing: any failure leaves the travel as it was.
    #[instrument(skip(self, files, names), fields(travel_id = travel_id, file_count = files.len()))]
    pub async fn update_photos(
        &self,
        travel_id: i64,
        files: Vec<UploadedFile>,
        names: Vec<String>,
    ) -> Result<TravelSummary> {
        if files.is_empty() {
            return Err(AlbumError::InvalidBatch("no files in upload".to_string()));
        }
        if files.len() != names.len() {
            return Err(AlbumError::InvalidBatch(format!(
                "{} files but {} display names",
                files.len(),
                names.len()
            )));
        }

        let _guard = self.locks.acquire(travel_id).await;
        let mut travel = self.find_one(travel_id).await?;

        let prepared = files
            .into_iter()
            .zip(names)
            .map(|(file, name)| self.prepare(travel_id, file, name))
            .collect::<Result<Vec<_>>>()?;

        let photos = self.upload_all(prepared).await?;
        let uploaded_keys: Vec<String> = photos.iter().map(|p| p.path().key()).collect();

        if let Some(first) = photos.first() {
            travel.set_thumbnail_if_absent(first.url());
        }
        let adventures = aggregate(&photos);
        travel.add_photos(photos.clone());
        let new_adventures = travel.add_adventures(adventures);

        if let Err(e) = self
            .repository
            .save_batch(&travel, &photos, &new_adventures)
            .await
        {
            error!(error = %e, "Failed to persist upload batch");
            self.discard(&uploaded_keys).await;
            return Err(AlbumError::repository(e));
        }

        metrics::counter!("album.photos.uploaded").increment(photos.len() as u64);
        info!(
            photo_count = photos.len(),
            adventure_count = new_adventures.len(),
            "Upload batch stored"
        );

        let duration = self
            .repository
            .travel_duration(travel_id)
            .await
            .map_err(AlbumError::repository)?;

        Ok(TravelSummary::new(&travel, duration))
    }

    fn prepare(&self, travel_id: i64, file: UploadedFile, name: String) -> Result<PreparedUpload> {
        let meta = extract_meta_data(&file.bytes)?;
        let path = PhotoPath::create(
            self.bucket.as_str(),
            travel_id.to_string(),
            name,
            meta.expected_extension.as_str(),
        )?;
        let content_type = file
            .content_type
            .clone()
            .filter(|ct| ct.starts_with("image/"))
            .unwrap_or_else(|| content_type_for_extension(&meta.expected_extension).to_string());
        let provider_metadata = extract_provider_metadata(&file);

        Ok(PreparedUpload {
            meta,
            path,
            content_type,
            provider_metadata,
            bytes: file.bytes,
        })
    }

    async fn upload_all(&self, prepared: Vec<PreparedUpload>) -> Result<Vec<Photo>> {
        let mut photos: Vec<Photo> = Vec::with_capacity(prepared.len());

        for upload in prepared {
            let key = upload.path.key();
            match self
                .store
                .put(&key, upload.bytes, &upload.content_type, upload.provider_metadata)
                .await
            {
                Ok(url) => photos.push(Photo::new(upload.meta, upload.path, url)),
                Err(e) => {
                    metrics::counter!("album.uploads.failed").increment(1);
                    error!(key = %key, error = %e, "Photo upload failed, aborting batch");

                    let stored: Vec<String> = photos.iter().map(|p| p.path().key()).collect();
                    self.discard(&stored).await;

                    return Err(AlbumError::StorageUpload {
                        key,
                        message: format!("{e:#}"),
                    });
                }
            }
        }

        Ok(photos)
    }

    /// Best-effort removal of objects stored by a failed batch
    async fn discard(&self, keys: &[String]) {
        for key in keys {
            match self.store.delete(key).await {
                Ok(()) => metrics::counter!("album.objects.orphan_cleanup").increment(1),
                Err(e) => warn!(key = %key, error = %e, "Failed to delete orphaned photo"),
            }
        }
    }

    pub async fn find_one(&self, travel_id: i64) -> Result<Travel> {
        self.repository
            .find_travel(travel_id)
            .await
            .map_err(AlbumError::repository)?
            .ok_or_else(|| AlbumError::travel_not_found(travel_id))
    }

    async fn find_user(&self, user_id: i64) -> Result<User> {
        self.repository
            .find_user(user_id)
            .await
            .map_err(AlbumError::repository)?
            .ok_or_else(|| AlbumError::user_not_found(user_id))
    }

    /// Summaries of every travel the user is tagged on
    pub async fn find_all_travel_info(&self, user_id: i64) -> Result<Vec<TravelSummary>> {
        self.find_user(user_id).await?;

        let travels = self
            .repository
            .travels_for_user(user_id)
            .await
            .map_err(AlbumError::repository)?;

        let mut result = Vec::with_capacity(travels.len());
        for travel in travels {
            let duration = self
                .repository
                .travel_duration(travel.id())
                .await
                .map_err(AlbumError::repository)?;
            result.push(TravelSummary::new(&travel, duration));
        }
        Ok(result)
    }

    pub async fn get_travel_detail(&self, travel_id: i64) -> Result<TravelDetail> {
        self.find_one(travel_id).await?;

        let adventures = self
            .repository
            .adventure_info(travel_id)
            .await
            .map_err(AlbumError::repository)?;
        let friends = self
            .repository
            .tagged_friends(travel_id)
            .await
            .map_err(AlbumError::repository)?;
        let photo_count = self
            .repository
            .photo_count(travel_id)
            .await
            .map_err(AlbumError::repository)?;

        Ok(TravelDetail {
            travel_id,
            photo_count,
            adventures: adventures.iter().map(AdventureSummary::from).collect(),
            friends,
        })
    }

    /// Fetch a stored photo's bytes and content type
    pub async fn download_photo(&self, photo_id: i64) -> Result<StoredObject> {
        let photo = self
            .repository
            .find_photo(photo_id)
            .await
            .map_err(AlbumError::repository)?
            .ok_or_else(|| AlbumError::photo_not_found(photo_id))?;

        self.store
            .get(&photo.path().key())
            .await
            .map_err(|e| AlbumError::Storage(format!("{e:#}")))
    }
}

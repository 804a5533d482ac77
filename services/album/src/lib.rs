//! Antalbum Album Service
//!
//! Photo ingestion for travel albums. Users upload batches of photos to a
//! travel; each photo's EXIF data is read, the file is stored in S3 under a
//! per-travel key, and the batch is folded into per-date "adventures" with a
//! representative thumbnail.
//!
//! ## Features
//!
//! - **Metadata Extraction**: capture date, GPS position and real file
//!   format read from the image bytes
//! - **Deterministic Storage Keys**: `{travel_id}/{display_name}.{ext}`
//!   inside a single bucket
//! - **Adventure Grouping**: one adventure per capture date, first photo
//!   of the date as its thumbnail
//! - **All-or-nothing Batches**: a failed batch leaves the travel unchanged
//!   and removes the objects it already stored
//!
//! ## Architecture
//!
//! ```text
//!  Upload batch             S3 Bucket                PostgreSQL
//! ┌──────────────┐         ┌──────────────┐         ┌──────────────┐
//! │ files[i]     │         │ {travel_id}/ │         │ travels      │
//! │ names[i]     │         │   {name}.ext │         │ photos       │
//! └──────────────┘         └──────────────┘         │ adventures   │
//!        │                        ▲                 │ tags / users │
//!        ▼                        │                 └──────────────┘
//! ┌──────────────┐         ┌──────────────┐                ▲
//! │ Metadata     │────────▶│ Object       │                │
//! │ Extractor    │  path   │ Store        │                │
//! └──────────────┘         └──────────────┘                │
//!                                 │ urls                   │
//!                                 ▼                        │
//!                          ┌──────────────┐         ┌──────────────┐
//!                          │ Adventure    │────────▶│ Travel       │
//!                          │ Aggregator   │         │ Repository   │
//!                          └──────────────┘         └──────────────┘
//! ```

pub mod adventure;
pub mod api;
pub mod config;
pub mod error;
pub mod object_store;
pub mod photo_meta;
pub mod photo_path;
pub mod travel;
pub mod travel_service;
pub mod travel_store;

#[cfg(test)]
mod test_support;

pub use adventure::aggregate;
pub use api::{create_router, start_api_server, AppState};
pub use config::Config;
pub use error::AlbumError;
pub use object_store::{ObjectStore, S3ObjectStore, StoredObject};
pub use photo_meta::{extract_meta_data, extract_provider_metadata, GeoPoint, PhotoMeta, UploadedFile};
pub use photo_path::PhotoPath;
pub use travel::{AdventureDate, Photo, Tag, TagStatus, Travel, TravelDetail, TravelSummary, User};
pub use travel_service::{NewTravel, TravelService};
pub use travel_store::{PgTravelStore, TravelRepository};

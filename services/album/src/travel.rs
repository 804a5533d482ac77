//! Travel aggregate and the records it owns.
//!
//! [`Travel`] is the only place photos, adventures and the thumbnail are
//! attached to a trip. Its command methods hold the invariants: the
//! thumbnail is set once, adventure dates are never duplicated, and each
//! photo or adventure is assigned to exactly one travel.

use crate::photo_meta::PhotoMeta;
use crate::photo_path::PhotoPath;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Application user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// State of a user's tag on a travel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagStatus {
    Pending,
    Accepted,
    Declined,
}

impl TagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagStatus::Pending => "pending",
            TagStatus::Accepted => "accepted",
            TagStatus::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TagStatus::Pending),
            "accepted" => Some(TagStatus::Accepted),
            "declined" => Some(TagStatus::Declined),
            _ => None,
        }
    }
}

/// A user tagged on a travel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub user_id: i64,
    pub status: TagStatus,
}

/// Tagged user with profile details, as listed on a travel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedFriend {
    pub user_id: i64,
    pub name: String,
    pub status: TagStatus,
}

/// One uploaded photo
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    id: Option<i64>,
    travel_id: Option<i64>,
    meta: PhotoMeta,
    path: PhotoPath,
    url: String,
}

impl Photo {
    /// A photo stored at `path`, reachable at `url`, not yet on a travel
    pub fn new(meta: PhotoMeta, path: PhotoPath, url: impl Into<String>) -> Self {
        Self {
            id: None,
            travel_id: None,
            meta,
            path,
            url: url.into(),
        }
    }

    /// A persisted photo
    pub fn restore(id: i64, travel_id: i64, meta: PhotoMeta, path: PhotoPath, url: String) -> Self {
        Self {
            id: Some(id),
            travel_id: Some(travel_id),
            meta,
            path,
            url,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn travel_id(&self) -> Option<i64> {
        self.travel_id
    }

    pub fn meta(&self) -> &PhotoMeta {
        &self.meta
    }

    pub fn path(&self) -> &PhotoPath {
        &self.path
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Grouping key for adventures
    pub fn date_label(&self) -> Option<&str> {
        self.meta.date_label.as_deref()
    }

    fn assign_travel(&mut self, travel_id: i64) {
        debug_assert!(self.travel_id.is_none(), "photo already assigned to a travel");
        self.travel_id = Some(travel_id);
    }
}

/// One capture date of a travel, represented by a thumbnail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdventureDate {
    pub id: Option<i64>,
    pub travel_id: Option<i64>,
    pub date_label: String,
    pub thumbnail_url: String,
}

impl AdventureDate {
    pub fn new(date_label: impl Into<String>, thumbnail_url: impl Into<String>) -> Self {
        Self {
            id: None,
            travel_id: None,
            date_label: date_label.into(),
            thumbnail_url: thumbnail_url.into(),
        }
    }
}

/// Trip aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct Travel {
    id: i64,
    title: String,
    thumbnail_url: Option<String>,
    photos: Vec<Photo>,
    adventures: Vec<AdventureDate>,
    tags: Vec<Tag>,
}

impl Travel {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            thumbnail_url: None,
            photos: Vec::new(),
            adventures: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Rebuild a travel from persisted state
    pub fn restore(
        id: i64,
        title: String,
        thumbnail_url: Option<String>,
        photos: Vec<Photo>,
        adventures: Vec<AdventureDate>,
        tags: Vec<Tag>,
    ) -> Self {
        Self {
            id,
            title,
            thumbnail_url,
            photos,
            adventures,
            tags,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    pub fn adventures(&self) -> &[AdventureDate] {
        &self.adventures
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Set the thumbnail unless one is already present. Returns whether it changed.
    pub fn set_thumbnail_if_absent(&mut self, url: &str) -> bool {
        if self.thumbnail_url.is_some() {
            return false;
        }
        self.thumbnail_url = Some(url.to_string());
        true
    }

    /// Attach new photos, keeping their order
    pub fn add_photos(&mut self, photos: impl IntoIterator<Item = Photo>) {
        for mut photo in photos {
            photo.assign_travel(self.id);
            self.photos.push(photo);
        }
    }

    /// Attach adventures whose date the travel does not have yet.
    ///
    /// Returns the adventures that were actually added, in order.
    pub fn add_adventures(
        &mut self,
        adventures: impl IntoIterator<Item = AdventureDate>,
    ) -> Vec<AdventureDate> {
        let mut known: HashSet<String> = self
            .adventures
            .iter()
            .map(|a| a.date_label.clone())
            .collect();

        let mut added = Vec::new();
        for mut adventure in adventures {
            if !known.insert(adventure.date_label.clone()) {
                continue;
            }
            adventure.travel_id = Some(self.id);
            self.adventures.push(adventure.clone());
            added.push(adventure);
        }
        added
    }

    /// Tag users on the travel; a user is tagged at most once
    pub fn add_tags(&mut self, tags: impl IntoIterator<Item = Tag>) {
        for tag in tags {
            if self.tags.iter().any(|t| t.user_id == tag.user_id) {
                continue;
            }
            self.tags.push(tag);
        }
    }
}

/// First tag per user, in the given order
pub fn unique_tags(tags: impl IntoIterator<Item = Tag>) -> Vec<Tag> {
    let mut seen = HashSet::new();
    tags.into_iter().filter(|tag| seen.insert(tag.user_id)).collect()
}

/// Travel overview returned after creation and uploads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TravelSummary {
    pub id: i64,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub photo_count: usize,
    pub adventures: Vec<AdventureSummary>,
    /// Distinct capture dates of the travel, ascending
    pub duration: Vec<String>,
}

impl TravelSummary {
    pub fn new(travel: &Travel, duration: Vec<String>) -> Self {
        Self {
            id: travel.id(),
            title: travel.title().to_string(),
            thumbnail_url: travel.thumbnail_url().map(String::from),
            photo_count: travel.photos().len(),
            adventures: travel.adventures().iter().map(AdventureSummary::from).collect(),
            duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdventureSummary {
    pub date: String,
    pub thumbnail_url: String,
}

impl From<&AdventureDate> for AdventureSummary {
    fn from(a: &AdventureDate) -> Self {
        Self {
            date: a.date_label.clone(),
            thumbnail_url: a.thumbnail_url.clone(),
        }
    }
}

/// Detail view of one travel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TravelDetail {
    pub travel_id: i64,
    pub photo_count: i64,
    pub adventures: Vec<AdventureSummary>,
    pub friends: Vec<TaggedFriend>,
}

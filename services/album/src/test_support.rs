//! Fixtures shared by the unit tests: encoded images carrying hand-built
//! EXIF blocks, and in-memory stand-ins for the object store and repository.

use crate::object_store::{ObjectStore, StoredObject};
use crate::photo_meta::PhotoMeta;
use crate::photo_path::PhotoPath;
use crate::travel::{AdventureDate, Photo, Tag, TaggedFriend, Travel, User};
use crate::travel_store::TravelRepository;
use anyhow::{bail, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};

pub const TEST_BUCKET: &str = "antalbum-test";

/// Degrees, minutes, seconds
pub type Dms = (u32, u32, u32);

/// EXIF content of a generated test JPEG
#[derive(Debug, Clone, Default)]
pub struct ExifFixture {
    /// `YYYY:MM:DD HH:MM:SS`, written as DateTimeOriginal
    pub datetime: Option<&'static str>,
    /// (latitude, latitude ref, longitude, longitude ref)
    pub gps: Option<(Dms, u8, Dms, u8)>,
}

impl ExifFixture {
    pub fn dated(datetime: &'static str) -> Self {
        Self {
            datetime: Some(datetime),
            gps: None,
        }
    }
}

const ASCII: u16 = 2;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;

struct IfdEntry {
    tag: u16,
    kind: u16,
    count: u32,
    data: Vec<u8>,
}

impl IfdEntry {
    fn ascii(tag: u16, value: &str) -> Self {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        Self {
            tag,
            kind: ASCII,
            count: data.len() as u32,
            data,
        }
    }

    fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            kind: LONG,
            count: 1,
            data: value.to_be_bytes().to_vec(),
        }
    }

    fn dms(tag: u16, (d, m, s): Dms) -> Self {
        let mut data = Vec::with_capacity(24);
        for part in [d, m, s] {
            data.extend_from_slice(&part.to_be_bytes());
            data.extend_from_slice(&1u32.to_be_bytes());
        }
        Self {
            tag,
            kind: RATIONAL,
            count: 3,
            data,
        }
    }
}

fn ifd_len(entries: &[IfdEntry]) -> u32 {
    let external: usize = entries.iter().filter(|e| e.data.len() > 4).map(|e| e.data.len()).sum();
    (2 + 12 * entries.len() + 4 + external) as u32
}

/// Append a big-endian IFD at the current end of `tiff`
fn write_ifd(tiff: &mut Vec<u8>, entries: &[IfdEntry]) {
    let base = tiff.len() as u32;
    let mut data_offset = base + 2 + 12 * entries.len() as u32 + 4;
    let mut data_area = Vec::new();

    tiff.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for entry in entries {
        tiff.extend_from_slice(&entry.tag.to_be_bytes());
        tiff.extend_from_slice(&entry.kind.to_be_bytes());
        tiff.extend_from_slice(&entry.count.to_be_bytes());
        if entry.data.len() <= 4 {
            let mut inline = entry.data.clone();
            inline.resize(4, 0);
            tiff.extend_from_slice(&inline);
        } else {
            tiff.extend_from_slice(&data_offset.to_be_bytes());
            data_area.extend_from_slice(&entry.data);
            data_offset += entry.data.len() as u32;
        }
    }
    tiff.extend_from_slice(&0u32.to_be_bytes());
    tiff.extend_from_slice(&data_area);
}

fn tiff_block(fixture: &ExifFixture) -> Vec<u8> {
    let exif_entries: Vec<IfdEntry> = fixture
        .datetime
        .map(|dt| vec![IfdEntry::ascii(0x9003, dt)])
        .unwrap_or_default();
    let gps_entries: Vec<IfdEntry> = fixture
        .gps
        .map(|(lat, lat_ref, lon, lon_ref)| {
            vec![
                IfdEntry::ascii(0x0001, &(lat_ref as char).to_string()),
                IfdEntry::dms(0x0002, lat),
                IfdEntry::ascii(0x0003, &(lon_ref as char).to_string()),
                IfdEntry::dms(0x0004, lon),
            ]
        })
        .unwrap_or_default();

    let ifd0_count = usize::from(!exif_entries.is_empty()) + usize::from(!gps_entries.is_empty());
    let ifd0_len = (2 + 12 * ifd0_count + 4) as u32;
    let exif_offset = 8 + ifd0_len;
    let gps_offset = exif_offset + if exif_entries.is_empty() { 0 } else { ifd_len(&exif_entries) };

    let mut ifd0 = Vec::new();
    if !exif_entries.is_empty() {
        ifd0.push(IfdEntry::long(0x8769, exif_offset));
    }
    if !gps_entries.is_empty() {
        ifd0.push(IfdEntry::long(0x8825, gps_offset));
    }

    let mut tiff = b"MM\x00\x2a".to_vec();
    tiff.extend_from_slice(&8u32.to_be_bytes());
    write_ifd(&mut tiff, &ifd0);
    if !exif_entries.is_empty() {
        write_ifd(&mut tiff, &exif_entries);
    }
    if !gps_entries.is_empty() {
        write_ifd(&mut tiff, &gps_entries);
    }
    tiff
}

/// A small valid image in the given container
pub fn encoded(format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::new_rgb8(2, 2)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

/// A valid JPEG with an APP1 segment carrying `payload` right after SOI
pub fn jpeg_with_app1(payload: &[u8]) -> Vec<u8> {
    let jpeg = encoded(ImageFormat::Jpeg);
    let segment_len = (2 + payload.len()) as u16;

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// A JPEG whose APP1 segment carries the given EXIF data
pub fn jpeg_with_exif(fixture: &ExifFixture) -> Vec<u8> {
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&tiff_block(fixture));
    jpeg_with_app1(&payload)
}

/// A JFIF JPEG with no EXIF segment
pub fn jpeg_without_exif() -> Vec<u8> {
    encoded(ImageFormat::Jpeg)
}

pub fn meta_on(date_label: Option<&str>) -> PhotoMeta {
    PhotoMeta {
        capture_date: None,
        date_label: date_label.map(String::from),
        expected_extension: "jpg".to_string(),
        location: None,
    }
}

/// An uploaded, unassigned photo on trip 1
pub fn photo_on(name: &str, date_label: Option<&str>) -> Photo {
    let path = PhotoPath::create(TEST_BUCKET, "1", name, "jpg").unwrap();
    let url = format!("https://cdn.test/{}", path.key());
    Photo::new(meta_on(date_label), path, url)
}

/// Object store keeping everything in memory
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    metadata: Mutex<HashMap<String, HashMap<String, String>>>,
    put_order: Mutex<Vec<String>>,
}

impl MemoryObjectStore {
    pub fn keys(&self) -> Vec<String> {
        self.put_order.lock().clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().contains_key(key)
    }

    pub fn metadata_of(&self, key: &str) -> Option<HashMap<String, String>> {
        self.metadata.lock().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        self.objects.lock().insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        self.metadata.lock().insert(key.to_string(), metadata);
        self.put_order.lock().push(key.to_string());
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> Result<StoredObject> {
        match self.objects.lock().get(key) {
            Some(object) => Ok(object.clone()),
            None => bail!("no object under {key}"),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().remove(key);
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        format!("https://cdn.test/{key}")
    }
}

#[derive(Default)]
struct RepositoryState {
    users: HashMap<i64, User>,
    travels: HashMap<i64, Travel>,
    next_id: i64,
}

impl RepositoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Repository keeping everything in memory, with ids assigned on save
#[derive(Default)]
pub struct MemoryTravelRepository {
    state: Mutex<RepositoryState>,
    fail_saves: AtomicBool,
}

impl MemoryTravelRepository {
    pub fn with_user(self, id: i64, name: &str) -> Self {
        self.state.lock().users.insert(
            id,
            User {
                id,
                name: name.to_string(),
                email: format!("{name}@example.com"),
            },
        );
        self
    }

    pub fn with_travel(self, travel: Travel) -> Self {
        {
            let mut state = self.state.lock();
            state.next_id = state.next_id.max(travel.id());
            state.travels.insert(travel.id(), travel);
        }
        self
    }

    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    pub fn stored(&self, travel_id: i64) -> Option<Travel> {
        self.state.lock().travels.get(&travel_id).cloned()
    }
}

#[async_trait]
impl TravelRepository for MemoryTravelRepository {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>> {
        Ok(self.state.lock().users.get(&user_id).cloned())
    }

    async fn create_travel(&self, title: &str, tags: &[Tag]) -> Result<i64> {
        let mut state = self.state.lock();
        let id = state.next_id();
        // Stored as given, like one row per tag in the tags table.
        let travel = Travel::restore(id, title.to_string(), None, Vec::new(), Vec::new(), tags.to_vec());
        state.travels.insert(id, travel);
        Ok(id)
    }

    async fn find_travel(&self, travel_id: i64) -> Result<Option<Travel>> {
        Ok(self.stored(travel_id))
    }

    async fn save_batch(
        &self,
        travel: &Travel,
        photos: &[Photo],
        adventures: &[AdventureDate],
    ) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            bail!("database unavailable");
        }

        let mut state = self.state.lock();
        let Some(stored) = state.travels.get(&travel.id()).cloned() else {
            bail!("travel {} vanished", travel.id());
        };

        let mut all_photos = stored.photos().to_vec();
        for photo in photos {
            let id = state.next_id();
            all_photos.push(Photo::restore(
                id,
                travel.id(),
                photo.meta().clone(),
                photo.path().clone(),
                photo.url().to_string(),
            ));
        }

        let mut all_adventures = stored.adventures().to_vec();
        for adventure in adventures {
            all_adventures.push(AdventureDate {
                id: Some(state.next_id()),
                travel_id: Some(travel.id()),
                ..adventure.clone()
            });
        }

        let thumbnail = stored
            .thumbnail_url()
            .or(travel.thumbnail_url())
            .map(String::from);

        let updated = Travel::restore(
            travel.id(),
            stored.title().to_string(),
            thumbnail,
            all_photos,
            all_adventures,
            stored.tags().to_vec(),
        );
        state.travels.insert(travel.id(), updated);
        Ok(())
    }

    async fn travel_duration(&self, travel_id: i64) -> Result<Vec<String>> {
        let dates: BTreeSet<String> = self
            .stored(travel_id)
            .map(|t| {
                t.photos()
                    .iter()
                    .filter_map(|p| p.date_label().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(dates.into_iter().collect())
    }

    async fn tagged_friends(&self, travel_id: i64) -> Result<Vec<TaggedFriend>> {
        let state = self.state.lock();
        let Some(travel) = state.travels.get(&travel_id) else {
            return Ok(Vec::new());
        };
        Ok(travel
            .tags()
            .iter()
            .filter_map(|tag| {
                state.users.get(&tag.user_id).map(|user| TaggedFriend {
                    user_id: user.id,
                    name: user.name.clone(),
                    status: tag.status,
                })
            })
            .collect())
    }

    async fn adventure_info(&self, travel_id: i64) -> Result<Vec<AdventureDate>> {
        Ok(self
            .stored(travel_id)
            .map(|t| t.adventures().to_vec())
            .unwrap_or_default())
    }

    async fn photo_count(&self, travel_id: i64) -> Result<i64> {
        Ok(self
            .stored(travel_id)
            .map(|t| t.photos().len() as i64)
            .unwrap_or(0))
    }

    async fn travels_for_user(&self, user_id: i64) -> Result<Vec<Travel>> {
        let state = self.state.lock();
        let mut travels: Vec<Travel> = state
            .travels
            .values()
            .filter(|t| t.tags().iter().any(|tag| tag.user_id == user_id))
            .cloned()
            .collect();
        travels.sort_by_key(|t| std::cmp::Reverse(t.id()));
        Ok(travels)
    }

    async fn find_photo(&self, photo_id: i64) -> Result<Option<Photo>> {
        Ok(self
            .state
            .lock()
            .travels
            .values()
            .flat_map(|t| t.photos())
            .find(|p| p.id() == Some(photo_id))
            .cloned())
    }
}

use crate::config::DatabaseConfig;
use crate::photo_meta::{GeoPoint, PhotoMeta};
use crate::photo_path::PhotoPath;
use crate::travel::{AdventureDate, Photo, Tag, TagStatus, TaggedFriend, Travel, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, instrument};

/// Persistence for users, travels and their photos
#[async_trait]
pub trait TravelRepository: Send + Sync {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>>;

    /// Insert a travel with its tags, returning the new travel id
    async fn create_travel(&self, title: &str, tags: &[Tag]) -> Result<i64>;

    /// Load a travel with its photos, adventures and tags
    async fn find_travel(&self, travel_id: i64) -> Result<Option<Travel>>;

    /// Persist one upload batch: the new photos and adventures plus the
    /// travel's thumbnail, atomically
    async fn save_batch(
        &self,
        travel: &Travel,
        photos: &[Photo],
        adventures: &[AdventureDate],
    ) -> Result<()>;

    /// Distinct capture dates of a travel's photos, ascending
    async fn travel_duration(&self, travel_id: i64) -> Result<Vec<String>>;

    async fn tagged_friends(&self, travel_id: i64) -> Result<Vec<TaggedFriend>>;

    async fn adventure_info(&self, travel_id: i64) -> Result<Vec<AdventureDate>>;

    async fn photo_count(&self, travel_id: i64) -> Result<i64>;

    /// Travels the user is tagged on, newest first
    async fn travels_for_user(&self, user_id: i64) -> Result<Vec<Travel>>;

    async fn find_photo(&self, photo_id: i64) -> Result<Option<Photo>>;
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
}

#[derive(Debug, FromRow)]
struct TravelRow {
    id: i64,
    title: String,
    thumbnail_url: Option<String>,
}

#[derive(Debug, FromRow)]
struct TagRow {
    user_id: i64,
    name: String,
    status: String,
}

#[derive(Debug, FromRow)]
struct AdventureRow {
    id: i64,
    travel_id: i64,
    date_label: String,
    thumbnail_url: String,
}

#[derive(Debug, FromRow)]
struct PhotoRow {
    id: i64,
    travel_id: i64,
    bucket: String,
    trip_key: String,
    display_name: String,
    extension: String,
    url: String,
    capture_date: Option<NaiveDateTime>,
    date_label: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

const PHOTO_COLUMNS: &str = "id, travel_id, bucket, trip_key, display_name, extension, url, \
                             capture_date, date_label, latitude, longitude";

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
        }
    }
}

impl From<AdventureRow> for AdventureDate {
    fn from(row: AdventureRow) -> Self {
        Self {
            id: Some(row.id),
            travel_id: Some(row.travel_id),
            date_label: row.date_label,
            thumbnail_url: row.thumbnail_url,
        }
    }
}

impl TagRow {
    fn status(&self) -> Result<TagStatus> {
        TagStatus::parse(&self.status)
            .with_context(|| format!("Unknown tag status {:?}", self.status))
    }
}

impl TryFrom<PhotoRow> for Photo {
    type Error = anyhow::Error;

    fn try_from(row: PhotoRow) -> Result<Self> {
        let path = PhotoPath::create(row.bucket, row.trip_key, row.display_name, row.extension)
            .context("Stored photo has an invalid path")?;
        let location = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        };
        let meta = PhotoMeta {
            capture_date: row.capture_date,
            date_label: row.date_label,
            expected_extension: path.extension().to_string(),
            location,
        };

        Ok(Photo::restore(row.id, row.travel_id, meta, path, row.url))
    }
}

/// PostgreSQL-backed travel repository
pub struct PgTravelStore {
    pool: PgPool,
}

impl PgTravelStore {
    /// Open a connection pool to the travel database
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to travel database")?;

        info!(max_connections = config.max_connections, "Travel database pool open");
        Ok(Self { pool })
    }

    /// Apply the schema in `migrations/`
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to apply travel schema migrations")?;

        info!("Travel schema up to date");
        Ok(())
    }

    /// Shared with the readiness probe
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn photos_of(&self, travel_id: i64) -> Result<Vec<Photo>> {
        let rows = sqlx::query_as::<_, PhotoRow>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE travel_id = $1 ORDER BY id"
        ))
        .bind(travel_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query photos")?;

        rows.into_iter().map(Photo::try_from).collect()
    }

    async fn tags_of(&self, travel_id: i64) -> Result<Vec<TagRow>> {
        sqlx::query_as::<_, TagRow>(
            r#"
            SELECT t.user_id, u.name, t.status
            FROM tags t
            JOIN users u ON u.id = t.user_id
            WHERE t.travel_id = $1
            ORDER BY t.id
            "#,
        )
        .bind(travel_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query tags")
    }
}

#[async_trait]
impl TravelRepository for PgTravelStore {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, UserRow>("SELECT id, name, email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query user")?;

        Ok(user.map(User::from))
    }

    #[instrument(skip(self, tags), fields(tag_count = tags.len()))]
    async fn create_travel(&self, title: &str, tags: &[Tag]) -> Result<i64> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let (travel_id,): (i64,) =
            sqlx::query_as("INSERT INTO travels (title) VALUES ($1) RETURNING id")
                .bind(title)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to insert travel")?;

        for tag in tags {
            sqlx::query("INSERT INTO tags (travel_id, user_id, status) VALUES ($1, $2, $3)")
                .bind(travel_id)
                .bind(tag.user_id)
                .bind(tag.status.as_str())
                .execute(&mut *tx)
                .await
                .context("Failed to insert tag")?;
        }

        tx.commit().await.context("Failed to commit transaction")?;

        debug!(travel_id = travel_id, "Travel created");
        Ok(travel_id)
    }

    async fn find_travel(&self, travel_id: i64) -> Result<Option<Travel>> {
        let row = sqlx::query_as::<_, TravelRow>(
            "SELECT id, title, thumbnail_url FROM travels WHERE id = $1",
        )
        .bind(travel_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query travel")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let photos = self.photos_of(travel_id).await?;
        let adventures = self.adventure_info(travel_id).await?;
        let tags = self
            .tags_of(travel_id)
            .await?
            .iter()
            .map(|t| {
                Ok(Tag {
                    user_id: t.user_id,
                    status: t.status()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Travel::restore(
            row.id,
            row.title,
            row.thumbnail_url,
            photos,
            adventures,
            tags,
        )))
    }

    #[instrument(
        skip(self, travel, photos, adventures),
        fields(travel_id = travel.id(), photo_count = photos.len(), adventure_count = adventures.len())
    )]
    async fn save_batch(
        &self,
        travel: &Travel,
        photos: &[Photo],
        adventures: &[AdventureDate],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        // First thumbnail wins even against a concurrent writer in another process.
        sqlx::query(
            "UPDATE travels SET thumbnail_url = COALESCE(thumbnail_url, $2) WHERE id = $1",
        )
        .bind(travel.id())
        .bind(travel.thumbnail_url())
        .execute(&mut *tx)
        .await
        .context("Failed to update travel thumbnail")?;

        for photo in photos {
            let meta = photo.meta();
            let path = photo.path();
            sqlx::query(
                r#"
                INSERT INTO photos (
                    travel_id, bucket, trip_key, display_name, extension,
                    object_key, url, capture_date, date_label, latitude, longitude
                ) VALUES (
                    $1, $2, $3, $4, $5,
                    $6, $7, $8, $9, $10, $11
                )
                "#,
            )
            .bind(travel.id())
            .bind(path.bucket())
            .bind(path.trip_id())
            .bind(path.display_name())
            .bind(path.extension())
            .bind(path.key())
            .bind(photo.url())
            .bind(meta.capture_date)
            .bind(&meta.date_label)
            .bind(meta.location.map(|l| l.latitude))
            .bind(meta.location.map(|l| l.longitude))
            .execute(&mut *tx)
            .await
            .context("Failed to insert photo")?;
        }

        for adventure in adventures {
            sqlx::query(
                r#"
                INSERT INTO adventure_dates (travel_id, date_label, thumbnail_url)
                VALUES ($1, $2, $3)
                ON CONFLICT (travel_id, date_label) DO NOTHING
                "#,
            )
            .bind(travel.id())
            .bind(&adventure.date_label)
            .bind(&adventure.thumbnail_url)
            .execute(&mut *tx)
            .await
            .context("Failed to insert adventure date")?;
        }

        tx.commit().await.context("Failed to commit transaction")?;

        debug!("Upload batch persisted");
        Ok(())
    }

    async fn travel_duration(&self, travel_id: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT date_label FROM photos
            WHERE travel_id = $1 AND date_label IS NOT NULL
            ORDER BY date_label
            "#,
        )
        .bind(travel_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query travel duration")?;

        Ok(rows.into_iter().map(|(date,)| date).collect())
    }

    async fn tagged_friends(&self, travel_id: i64) -> Result<Vec<TaggedFriend>> {
        self.tags_of(travel_id)
            .await?
            .into_iter()
            .map(|row| {
                Ok(TaggedFriend {
                    status: row.status()?,
                    user_id: row.user_id,
                    name: row.name,
                })
            })
            .collect()
    }

    async fn adventure_info(&self, travel_id: i64) -> Result<Vec<AdventureDate>> {
        let rows = sqlx::query_as::<_, AdventureRow>(
            r#"
            SELECT id, travel_id, date_label, thumbnail_url
            FROM adventure_dates
            WHERE travel_id = $1
            ORDER BY id
            "#,
        )
        .bind(travel_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query adventure dates")?;

        Ok(rows.into_iter().map(AdventureDate::from).collect())
    }

    async fn photo_count(&self, travel_id: i64) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM photos WHERE travel_id = $1")
            .bind(travel_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count photos")?;

        Ok(count.0)
    }

    async fn travels_for_user(&self, user_id: i64) -> Result<Vec<Travel>> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT travel_id FROM tags WHERE user_id = $1 ORDER BY travel_id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query travels for user")?;

        let mut travels = Vec::with_capacity(ids.len());
        for (travel_id,) in ids {
            if let Some(travel) = self.find_travel(travel_id).await? {
                travels.push(travel);
            }
        }
        Ok(travels)
    }

    async fn find_photo(&self, photo_id: i64) -> Result<Option<Photo>> {
        let row = sqlx::query_as::<_, PhotoRow>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE id = $1"
        ))
        .bind(photo_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query photo")?;

        row.map(Photo::try_from).transpose()
    }
}

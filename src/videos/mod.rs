use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::db::{now_ts, Database};
use crate::error::{Result, TrackerError};
use crate::tracking::Counters;
use crate::youtube::YouTubeVideo;

pub(crate) mod schema;
use schema::{users, videos};

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub channel_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Video {
    pub id: i32,
    pub user_id: String,
    pub youtube_id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<i64>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Video {
    pub fn counters(&self) -> Counters {
        Counters {
            views: self.view_count,
            likes: self.like_count,
            comments: self.comment_count,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVideoInput {
    pub youtube_id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<i64>,
}

#[derive(Queryable)]
struct UserRow {
    id: String,
    display_name: String,
    channel_id: Option<String>,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
struct NewUser<'a> {
    id: &'a str,
    display_name: &'a str,
    channel_id: Option<&'a str>,
    created_at: i64,
}

#[derive(Queryable)]
struct VideoRow {
    id: i32,
    user_id: String,
    youtube_id: String,
    title: String,
    description: Option<String>,
    thumbnail_url: Option<String>,
    published_at: Option<i64>,
    view_count: i64,
    like_count: i64,
    comment_count: i64,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = videos)]
struct NewVideo<'a> {
    user_id: &'a str,
    youtube_id: &'a str,
    title: &'a str,
    description: Option<&'a str>,
    thumbnail_url: Option<&'a str>,
    published_at: Option<i64>,
    view_count: i64,
    like_count: i64,
    comment_count: i64,
    created_at: i64,
    updated_at: i64,
}

#[derive(Clone)]
pub struct VideoStore {
    db: Database,
}

impl VideoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts the user if absent and refreshes the channel id when given.
    pub async fn ensure_user(
        &self,
        user_id: &str,
        display_name: &str,
        channel_id: Option<&str>,
    ) -> Result<User> {
        let mut conn = self.db.conn().await?;
        let existing: Option<UserRow> = users::table
            .filter(users::id.eq(user_id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        match existing {
            Some(_) => {
                if let Some(channel_id) = channel_id {
                    diesel::update(users::table.filter(users::id.eq(user_id)))
                        .set(users::channel_id.eq(Some(channel_id)))
                        .execute(&mut conn)
                        .await
                        .map_err(|e| TrackerError::Runtime(e.to_string()))?;
                }
            }
            None => {
                let new = NewUser {
                    id: user_id,
                    display_name,
                    channel_id,
                    created_at: now_ts(),
                };
                diesel::insert_into(users::table)
                    .values(&new)
                    .execute(&mut conn)
                    .await
                    .map_err(|e| TrackerError::Runtime(e.to_string()))?;
            }
        }

        let row: UserRow = users::table
            .filter(users::id.eq(user_id))
            .first(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(map_user(row))
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let mut conn = self.db.conn().await?;
        let row: Option<UserRow> = users::table
            .filter(users::id.eq(user_id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(row.map(map_user))
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<UserRow> = users::table
            .order(users::created_at.asc())
            .load(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(rows.into_iter().map(map_user).collect())
    }

    pub async fn create_video(&self, user_id: &str, input: &NewVideoInput) -> Result<Video> {
        let youtube_id = input.youtube_id.trim();
        if youtube_id.is_empty() {
            return Err(TrackerError::Validation("youtube_id is required".to_string()));
        }
        if self.find_by_youtube_id(user_id, youtube_id).await?.is_some() {
            return Err(TrackerError::Validation(format!(
                "video {youtube_id} already exists"
            )));
        }

        let now = now_ts();
        let new = NewVideo {
            user_id,
            youtube_id,
            title: input.title.as_str(),
            description: input.description.as_deref(),
            thumbnail_url: input.thumbnail_url.as_deref(),
            published_at: input.published_at,
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(videos::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        let row: VideoRow = videos::table
            .filter(videos::user_id.eq(user_id))
            .order(videos::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(map_video(row))
    }

    /// Inserts or refreshes a video from YouTube metadata, keyed by
    /// `(user_id, youtube_id)`.
    pub async fn upsert_from_youtube(&self, user_id: &str, item: &YouTubeVideo) -> Result<Video> {
        let now = now_ts();
        let mut conn = self.db.conn().await?;
        let existing: Option<VideoRow> = videos::table
            .filter(videos::user_id.eq(user_id))
            .filter(videos::youtube_id.eq(&item.youtube_id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        let id = match existing {
            Some(row) => {
                diesel::update(videos::table.filter(videos::id.eq(row.id)))
                    .set((
                        videos::title.eq(&item.title),
                        videos::description.eq(item.description.as_deref()),
                        videos::thumbnail_url.eq(item.thumbnail_url.as_deref()),
                        videos::published_at.eq(item.published_at),
                        videos::view_count.eq(item.view_count),
                        videos::like_count.eq(item.like_count),
                        videos::comment_count.eq(item.comment_count),
                        videos::updated_at.eq(now),
                    ))
                    .execute(&mut conn)
                    .await
                    .map_err(|e| TrackerError::Runtime(e.to_string()))?;
                row.id
            }
            None => {
                let new = NewVideo {
                    user_id,
                    youtube_id: &item.youtube_id,
                    title: &item.title,
                    description: item.description.as_deref(),
                    thumbnail_url: item.thumbnail_url.as_deref(),
                    published_at: item.published_at,
                    view_count: item.view_count,
                    like_count: item.like_count,
                    comment_count: item.comment_count,
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(videos::table)
                    .values(&new)
                    .execute(&mut conn)
                    .await
                    .map_err(|e| TrackerError::Runtime(e.to_string()))?;
                let row: VideoRow = videos::table
                    .filter(videos::user_id.eq(user_id))
                    .order(videos::id.desc())
                    .first(&mut conn)
                    .await
                    .map_err(|e| TrackerError::Runtime(e.to_string()))?;
                row.id
            }
        };

        let row: VideoRow = videos::table
            .filter(videos::id.eq(id))
            .first(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(map_video(row))
    }

    pub async fn list_videos(&self, user_id: &str) -> Result<Vec<Video>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<VideoRow> = videos::table
            .filter(videos::user_id.eq(user_id))
            .order(videos::id.asc())
            .load(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(rows.into_iter().map(map_video).collect())
    }

    pub async fn get_video(&self, user_id: &str, id: i32) -> Result<Option<Video>> {
        let mut conn = self.db.conn().await?;
        let row: Option<VideoRow> = videos::table
            .filter(videos::user_id.eq(user_id))
            .filter(videos::id.eq(id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(row.map(map_video))
    }

    pub async fn find_by_youtube_id(
        &self,
        user_id: &str,
        youtube_id: &str,
    ) -> Result<Option<Video>> {
        let mut conn = self.db.conn().await?;
        let row: Option<VideoRow> = videos::table
            .filter(videos::user_id.eq(user_id))
            .filter(videos::youtube_id.eq(youtube_id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(row.map(map_video))
    }

    pub async fn update_counters(&self, id: i32, counters: Counters) -> Result<()> {
        let mut conn = self.db.conn().await?;
        let count = diesel::update(videos::table.filter(videos::id.eq(id)))
            .set((
                videos::view_count.eq(counters.views),
                videos::like_count.eq(counters.likes),
                videos::comment_count.eq(counters.comments),
                videos::updated_at.eq(now_ts()),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        if count == 0 {
            return Err(TrackerError::NotFound(format!("video {id}")));
        }
        Ok(())
    }

    /// Deletes the video along with its snapshots, analytics rows and
    /// video-specific alerts.
    pub async fn delete_video(&self, user_id: &str, id: i32) -> Result<bool> {
        use crate::alerts::schema::view_alerts;
        use crate::analytics::schema::video_analytics;
        use crate::tracking::schema::daily_view_stats;

        let mut conn = self.db.conn().await?;
        let count = diesel::delete(
            videos::table
                .filter(videos::user_id.eq(user_id))
                .filter(videos::id.eq(id)),
        )
        .execute(&mut conn)
        .await
        .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        if count == 0 {
            return Ok(false);
        }

        diesel::delete(daily_view_stats::table.filter(daily_view_stats::video_id.eq(id)))
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        diesel::delete(video_analytics::table.filter(video_analytics::video_id.eq(id)))
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        diesel::delete(view_alerts::table.filter(view_alerts::video_id.eq(id)))
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(true)
    }
}

fn map_user(row: UserRow) -> User {
    User {
        id: row.id,
        display_name: row.display_name,
        channel_id: row.channel_id,
        created_at: row.created_at,
    }
}

fn map_video(row: VideoRow) -> Video {
    Video {
        id: row.id,
        user_id: row.user_id,
        youtube_id: row.youtube_id,
        title: row.title,
        description: row.description,
        thumbnail_url: row.thumbnail_url,
        published_at: row.published_at,
        view_count: row.view_count,
        like_count: row.like_count,
        comment_count: row.comment_count,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

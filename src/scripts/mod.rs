use std::fmt;
use std::str::FromStr;

use diesel::dsl::max;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::db::{now_ts, Database};
use crate::error::{Result, TrackerError};

pub(crate) mod schema;
pub mod template;

use schema::{prompt_scripts, script_corrections, script_history, script_profiles};

/// Instruction scripts carry guide text; coordination scripts are the
/// templates the guide is substituted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptFamily {
    Instruction,
    Coordination,
}

impl ScriptFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instruction => "instruction",
            Self::Coordination => "coordination",
        }
    }
}

impl FromStr for ScriptFamily {
    type Err = TrackerError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "instruction" => Ok(Self::Instruction),
            "coordination" => Ok(Self::Coordination),
            other => Err(TrackerError::Validation(format!(
                "unknown script family '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Script,
    Title,
    Thumbnail,
    Description,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Title => "title",
            Self::Thumbnail => "thumbnail",
            Self::Description => "description",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = TrackerError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "script" => Ok(Self::Script),
            "title" => Ok(Self::Title),
            "thumbnail" => Ok(Self::Thumbnail),
            "description" => Ok(Self::Description),
            other => Err(TrackerError::Validation(format!(
                "unknown content type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptScript {
    pub id: i32,
    pub user_id: String,
    pub family: ScriptFamily,
    pub content_type: ContentType,
    pub version: i32,
    pub content: String,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptProfile {
    pub id: i32,
    pub user_id: String,
    pub name: String,
    pub content: String,
    pub is_default: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptCorrection {
    pub id: i32,
    pub user_id: String,
    pub content_type: ContentType,
    pub original_text: String,
    pub corrected_text: String,
    pub note: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: i32,
    pub user_id: String,
    pub content_type: ContentType,
    pub video_id: Option<i32>,
    pub prompt: String,
    pub output: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewScriptInput {
    pub family: ScriptFamily,
    pub content_type: ContentType,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProfileInput {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCorrectionInput {
    pub content_type: ContentType,
    pub original_text: String,
    pub corrected_text: String,
    pub note: Option<String>,
}

#[derive(Queryable)]
struct ScriptRow {
    id: i32,
    user_id: String,
    family: String,
    content_type: String,
    version: i32,
    content: String,
    is_active: bool,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = prompt_scripts)]
struct NewScript<'a> {
    user_id: &'a str,
    family: &'a str,
    content_type: &'a str,
    version: i32,
    content: &'a str,
    is_active: bool,
    created_at: i64,
}

#[derive(Queryable)]
struct ProfileRow {
    id: i32,
    user_id: String,
    name: String,
    content: String,
    is_default: bool,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = script_profiles)]
struct NewProfile<'a> {
    user_id: &'a str,
    name: &'a str,
    content: &'a str,
    is_default: bool,
    created_at: i64,
    updated_at: i64,
}

#[derive(Queryable)]
struct CorrectionRow {
    id: i32,
    user_id: String,
    content_type: String,
    original_text: String,
    corrected_text: String,
    note: Option<String>,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = script_corrections)]
struct NewCorrection<'a> {
    user_id: &'a str,
    content_type: &'a str,
    original_text: &'a str,
    corrected_text: &'a str,
    note: Option<&'a str>,
    created_at: i64,
}

#[derive(Queryable)]
struct HistoryRow {
    id: i32,
    user_id: String,
    content_type: String,
    video_id: Option<i32>,
    prompt: String,
    output: String,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = script_history)]
struct NewHistory<'a> {
    user_id: &'a str,
    content_type: &'a str,
    video_id: Option<i32>,
    prompt: &'a str,
    output: &'a str,
    created_at: i64,
}

#[derive(Clone)]
pub struct ScriptStore {
    db: Database,
}

impl ScriptStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Stores a new version and makes it the only active one for its
    /// family and content type.
    pub async fn save_script(&self, user_id: &str, input: &NewScriptInput) -> Result<PromptScript> {
        if input.content.trim().is_empty() {
            return Err(TrackerError::Validation("content is required".to_string()));
        }
        let family = input.family.as_str();
        let content_type = input.content_type.as_str();

        let mut conn = self.db.conn().await?;
        let latest: Option<i32> = prompt_scripts::table
            .filter(prompt_scripts::user_id.eq(user_id))
            .filter(prompt_scripts::family.eq(family))
            .filter(prompt_scripts::content_type.eq(content_type))
            .select(max(prompt_scripts::version))
            .first(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        diesel::update(
            prompt_scripts::table
                .filter(prompt_scripts::user_id.eq(user_id))
                .filter(prompt_scripts::family.eq(family))
                .filter(prompt_scripts::content_type.eq(content_type)),
        )
        .set(prompt_scripts::is_active.eq(false))
        .execute(&mut conn)
        .await
        .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        let new = NewScript {
            user_id,
            family,
            content_type,
            version: latest.unwrap_or(0) + 1,
            content: &input.content,
            is_active: true,
            created_at: now_ts(),
        };
        diesel::insert_into(prompt_scripts::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        let row: ScriptRow = prompt_scripts::table
            .filter(prompt_scripts::user_id.eq(user_id))
            .order(prompt_scripts::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        map_script(row)
    }

    pub async fn list_versions(
        &self,
        user_id: &str,
        family: ScriptFamily,
        content_type: ContentType,
    ) -> Result<Vec<PromptScript>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<ScriptRow> = prompt_scripts::table
            .filter(prompt_scripts::user_id.eq(user_id))
            .filter(prompt_scripts::family.eq(family.as_str()))
            .filter(prompt_scripts::content_type.eq(content_type.as_str()))
            .order(prompt_scripts::version.desc())
            .load(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        rows.into_iter().map(map_script).collect()
    }

    pub async fn active_script(
        &self,
        user_id: &str,
        family: ScriptFamily,
        content_type: ContentType,
    ) -> Result<Option<PromptScript>> {
        let mut conn = self.db.conn().await?;
        let row: Option<ScriptRow> = prompt_scripts::table
            .filter(prompt_scripts::user_id.eq(user_id))
            .filter(prompt_scripts::family.eq(family.as_str()))
            .filter(prompt_scripts::content_type.eq(content_type.as_str()))
            .filter(prompt_scripts::is_active.eq(true))
            .order(prompt_scripts::version.desc())
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        row.map(map_script).transpose()
    }

    /// Reactivates a stored version, deactivating its siblings.
    pub async fn activate(&self, user_id: &str, id: i32) -> Result<PromptScript> {
        let mut conn = self.db.conn().await?;
        let row: ScriptRow = prompt_scripts::table
            .filter(prompt_scripts::user_id.eq(user_id))
            .filter(prompt_scripts::id.eq(id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| TrackerError::Runtime(e.to_string()))?
            .ok_or_else(|| TrackerError::NotFound(format!("script {id}")))?;

        diesel::update(
            prompt_scripts::table
                .filter(prompt_scripts::user_id.eq(user_id))
                .filter(prompt_scripts::family.eq(&row.family))
                .filter(prompt_scripts::content_type.eq(&row.content_type)),
        )
        .set(prompt_scripts::is_active.eq(false))
        .execute(&mut conn)
        .await
        .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        diesel::update(prompt_scripts::table.filter(prompt_scripts::id.eq(id)))
            .set(prompt_scripts::is_active.eq(true))
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        map_script(ScriptRow {
            is_active: true,
            ..row
        })
    }

    pub async fn create_profile(
        &self,
        user_id: &str,
        input: &NewProfileInput,
    ) -> Result<ScriptProfile> {
        if input.name.trim().is_empty() {
            return Err(TrackerError::Validation("name is required".to_string()));
        }
        let now = now_ts();
        let mut conn = self.db.conn().await?;
        if input.is_default {
            diesel::update(script_profiles::table.filter(script_profiles::user_id.eq(user_id)))
                .set(script_profiles::is_default.eq(false))
                .execute(&mut conn)
                .await
                .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        }

        let new = NewProfile {
            user_id,
            name: input.name.trim(),
            content: &input.content,
            is_default: input.is_default,
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(script_profiles::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        let row: ProfileRow = script_profiles::table
            .filter(script_profiles::user_id.eq(user_id))
            .order(script_profiles::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(map_profile(row))
    }

    pub async fn list_profiles(&self, user_id: &str) -> Result<Vec<ScriptProfile>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<ProfileRow> = script_profiles::table
            .filter(script_profiles::user_id.eq(user_id))
            .order(script_profiles::id.asc())
            .load(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(rows.into_iter().map(map_profile).collect())
    }

    pub async fn get_profile(&self, user_id: &str, id: i32) -> Result<Option<ScriptProfile>> {
        let mut conn = self.db.conn().await?;
        let row: Option<ProfileRow> = script_profiles::table
            .filter(script_profiles::user_id.eq(user_id))
            .filter(script_profiles::id.eq(id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(row.map(map_profile))
    }

    pub async fn default_profile(&self, user_id: &str) -> Result<Option<ScriptProfile>> {
        let mut conn = self.db.conn().await?;
        let row: Option<ProfileRow> = script_profiles::table
            .filter(script_profiles::user_id.eq(user_id))
            .filter(script_profiles::is_default.eq(true))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(row.map(map_profile))
    }

    pub async fn delete_profile(&self, user_id: &str, id: i32) -> Result<bool> {
        let mut conn = self.db.conn().await?;
        let count = diesel::delete(
            script_profiles::table
                .filter(script_profiles::user_id.eq(user_id))
                .filter(script_profiles::id.eq(id)),
        )
        .execute(&mut conn)
        .await
        .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(count > 0)
    }

    pub async fn add_correction(
        &self,
        user_id: &str,
        input: &NewCorrectionInput,
    ) -> Result<ScriptCorrection> {
        if input.corrected_text.trim().is_empty() {
            return Err(TrackerError::Validation(
                "corrected_text is required".to_string(),
            ));
        }
        let new = NewCorrection {
            user_id,
            content_type: input.content_type.as_str(),
            original_text: &input.original_text,
            corrected_text: &input.corrected_text,
            note: input.note.as_deref(),
            created_at: now_ts(),
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(script_corrections::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        let row: CorrectionRow = script_corrections::table
            .filter(script_corrections::user_id.eq(user_id))
            .order(script_corrections::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        map_correction(row)
    }

    /// Newest first.
    pub async fn list_corrections(
        &self,
        user_id: &str,
        content_type: Option<ContentType>,
        limit: usize,
    ) -> Result<Vec<ScriptCorrection>> {
        let mut conn = self.db.conn().await?;
        let mut query = script_corrections::table
            .filter(script_corrections::user_id.eq(user_id))
            .into_boxed();
        if let Some(content_type) = content_type {
            query = query.filter(script_corrections::content_type.eq(content_type.as_str()));
        }
        let rows: Vec<CorrectionRow> = query
            .order(script_corrections::id.desc())
            .limit(limit as i64)
            .load(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        rows.into_iter().map(map_correction).collect()
    }

    pub async fn add_history(
        &self,
        user_id: &str,
        content_type: ContentType,
        video_id: Option<i32>,
        prompt: &str,
        output: &str,
    ) -> Result<HistoryEntry> {
        let new = NewHistory {
            user_id,
            content_type: content_type.as_str(),
            video_id,
            prompt,
            output,
            created_at: now_ts(),
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(script_history::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        let row: HistoryRow = script_history::table
            .filter(script_history::user_id.eq(user_id))
            .order(script_history::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        map_history(row)
    }

    pub async fn list_history(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<HistoryRow> = script_history::table
            .filter(script_history::user_id.eq(user_id))
            .order(script_history::id.desc())
            .limit(limit as i64)
            .load(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        rows.into_iter().map(map_history).collect()
    }
}

fn map_script(row: ScriptRow) -> Result<PromptScript> {
    Ok(PromptScript {
        id: row.id,
        user_id: row.user_id,
        family: row.family.parse()?,
        content_type: row.content_type.parse()?,
        version: row.version,
        content: row.content,
        is_active: row.is_active,
        created_at: row.created_at,
    })
}

fn map_profile(row: ProfileRow) -> ScriptProfile {
    ScriptProfile {
        id: row.id,
        user_id: row.user_id,
        name: row.name,
        content: row.content,
        is_default: row.is_default,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn map_correction(row: CorrectionRow) -> Result<ScriptCorrection> {
    Ok(ScriptCorrection {
        id: row.id,
        user_id: row.user_id,
        content_type: row.content_type.parse()?,
        original_text: row.original_text,
        corrected_text: row.corrected_text,
        note: row.note,
        created_at: row.created_at,
    })
}

fn map_history(row: HistoryRow) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
        id: row.id,
        user_id: row.user_id,
        content_type: row.content_type.parse()?,
        video_id: row.video_id,
        prompt: row.prompt,
        output: row.output,
        created_at: row.created_at,
    })
}

use std::fmt;
use std::str::FromStr;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::db::{now_ts, Database};
use crate::error::{Result, TrackerError};
use crate::stats::{
    engagement_signal, two_proportion_z_test, EngagementSample, EngagementSignal, ProportionTest,
};
use crate::videos::VideoStore;

pub(crate) mod schema;
use schema::{ab_tests, test_variants};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Title,
    Thumbnail,
    Both,
}

impl TestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Thumbnail => "thumbnail",
            Self::Both => "both",
        }
    }
}

impl FromStr for TestType {
    type Err = TrackerError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "title" => Ok(Self::Title),
            "thumbnail" => Ok(Self::Thumbnail),
            "both" => Ok(Self::Both),
            other => Err(TrackerError::Validation(format!("unknown test type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Draft,
    Active,
    Completed,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = TrackerError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(TrackerError::Validation(format!("unknown test status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AbTest {
    pub id: i32,
    pub user_id: String,
    pub video_id: i32,
    pub name: String,
    pub test_type: TestType,
    pub status: TestStatus,
    pub winner_variant_id: Option<i32>,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub notified_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Variant {
    pub id: i32,
    pub test_id: i32,
    pub label: String,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub is_control: bool,
    pub impressions: i64,
    pub clicks: i64,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Variant {
    pub fn ctr(&self) -> f64 {
        if self.impressions <= 0 {
            0.0
        } else {
            self.clicks as f64 / self.impressions as f64
        }
    }

    pub fn engagement(&self) -> EngagementSample {
        EngagementSample {
            views: self.views,
            likes: self.likes,
            comments: self.comments,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AbTestDetail {
    #[serde(flatten)]
    pub test: AbTest,
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTestInput {
    pub video_id: i32,
    pub name: String,
    pub test_type: TestType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVariantInput {
    pub label: String,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub is_control: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct VariantMetrics {
    pub impressions: i64,
    pub clicks: i64,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

impl VariantMetrics {
    fn validate(&self) -> Result<()> {
        let values = [
            self.impressions,
            self.clicks,
            self.views,
            self.likes,
            self.comments,
        ];
        if values.iter().any(|v| *v < 0) {
            return Err(TrackerError::Validation("metrics must not be negative".to_string()));
        }
        if self.clicks > self.impressions {
            return Err(TrackerError::Validation(
                "clicks cannot exceed impressions".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CtrComparison {
    pub leader_id: i32,
    pub runner_up_id: i32,
    pub leader_ctr: f64,
    pub runner_up_ctr: f64,
    pub test: Option<ProportionTest>,
    pub significant: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngagementComparison {
    pub leader_id: i32,
    pub runner_up_id: i32,
    pub signal: Option<EngagementSignal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestEvaluation {
    pub test_id: i32,
    pub ctr: Option<CtrComparison>,
    pub engagement: Option<EngagementComparison>,
}

/// Compares the two variants with the highest click-through rate.
pub fn compare_ctr(variants: &[Variant]) -> Option<CtrComparison> {
    let mut ranked: Vec<&Variant> = variants.iter().collect();
    ranked.sort_by(|a, b| b.ctr().total_cmp(&a.ctr()));
    let (leader, runner_up) = (ranked.as_slice().first()?, ranked.get(1)?);
    let test = two_proportion_z_test(
        leader.clicks,
        leader.impressions,
        runner_up.clicks,
        runner_up.impressions,
    );
    Some(CtrComparison {
        leader_id: leader.id,
        runner_up_id: runner_up.id,
        leader_ctr: leader.ctr(),
        runner_up_ctr: runner_up.ctr(),
        significant: test.is_some_and(|t| t.is_significant()),
        test,
    })
}

/// Compares the two variants with the highest engagement rate.
pub fn compare_engagement(variants: &[Variant]) -> Option<EngagementComparison> {
    let mut ranked: Vec<&Variant> = variants.iter().collect();
    ranked.sort_by(|a, b| b.engagement().rate().total_cmp(&a.engagement().rate()));
    let (leader, runner_up) = (ranked.as_slice().first()?, ranked.get(1)?);
    Some(EngagementComparison {
        leader_id: leader.id,
        runner_up_id: runner_up.id,
        signal: engagement_signal(&leader.engagement(), &runner_up.engagement()),
    })
}

#[derive(Queryable)]
struct TestRow {
    id: i32,
    user_id: String,
    video_id: i32,
    name: String,
    test_type: String,
    status: String,
    winner_variant_id: Option<i32>,
    started_at: Option<i64>,
    ended_at: Option<i64>,
    notified_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = ab_tests)]
struct NewTest<'a> {
    user_id: &'a str,
    video_id: i32,
    name: &'a str,
    test_type: &'a str,
    status: &'a str,
    created_at: i64,
    updated_at: i64,
}

#[derive(Queryable)]
struct VariantRow {
    id: i32,
    test_id: i32,
    label: String,
    title: Option<String>,
    thumbnail_url: Option<String>,
    is_control: bool,
    impressions: i64,
    clicks: i64,
    views: i64,
    likes: i64,
    comments: i64,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = test_variants)]
struct NewVariant<'a> {
    test_id: i32,
    label: &'a str,
    title: Option<&'a str>,
    thumbnail_url: Option<&'a str>,
    is_control: bool,
    impressions: i64,
    clicks: i64,
    views: i64,
    likes: i64,
    comments: i64,
    created_at: i64,
    updated_at: i64,
}

#[derive(Clone)]
pub struct AbTestStore {
    db: Database,
    videos: VideoStore,
}

impl AbTestStore {
    pub fn new(db: Database) -> Self {
        let videos = VideoStore::new(db.clone());
        Self { db, videos }
    }

    pub async fn create_test(&self, user_id: &str, input: &NewTestInput) -> Result<AbTest> {
        if input.name.trim().is_empty() {
            return Err(TrackerError::Validation("name is required".to_string()));
        }
        if self.videos.get_video(user_id, input.video_id).await?.is_none() {
            return Err(TrackerError::NotFound(format!("video {}", input.video_id)));
        }

        let now = now_ts();
        let new = NewTest {
            user_id,
            video_id: input.video_id,
            name: input.name.trim(),
            test_type: input.test_type.as_str(),
            status: TestStatus::Draft.as_str(),
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(ab_tests::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        let row: TestRow = ab_tests::table
            .filter(ab_tests::user_id.eq(user_id))
            .order(ab_tests::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        map_test(row)
    }

    pub async fn list_tests(
        &self,
        user_id: &str,
        status: Option<TestStatus>,
    ) -> Result<Vec<AbTest>> {
        let mut conn = self.db.conn().await?;
        let mut query = ab_tests::table
            .filter(ab_tests::user_id.eq(user_id))
            .into_boxed();
        if let Some(status) = status {
            query = query.filter(ab_tests::status.eq(status.as_str()));
        }
        let rows: Vec<TestRow> = query
            .order(ab_tests::id.desc())
            .load(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        rows.into_iter().map(map_test).collect()
    }

    /// Active tests of every user, for the background monitor.
    pub async fn list_active(&self) -> Result<Vec<AbTest>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<TestRow> = ab_tests::table
            .filter(ab_tests::status.eq(TestStatus::Active.as_str()))
            .order(ab_tests::id.asc())
            .load(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        rows.into_iter().map(map_test).collect()
    }

    pub async fn get_test(&self, user_id: &str, id: i32) -> Result<Option<AbTestDetail>> {
        let Some(test) = self.find_test(user_id, id).await? else {
            return Ok(None);
        };
        let variants = self.list_variants(id).await?;
        Ok(Some(AbTestDetail { test, variants }))
    }

    pub async fn list_variants(&self, test_id: i32) -> Result<Vec<Variant>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<VariantRow> = test_variants::table
            .filter(test_variants::test_id.eq(test_id))
            .order(test_variants::id.asc())
            .load(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(rows.into_iter().map(map_variant).collect())
    }

    pub async fn add_variant(
        &self,
        user_id: &str,
        test_id: i32,
        input: &NewVariantInput,
    ) -> Result<Variant> {
        let test = self.require_test(user_id, test_id).await?;
        if test.status == TestStatus::Completed {
            return Err(TrackerError::Validation(format!(
                "test {test_id} is already completed"
            )));
        }
        if input.label.trim().is_empty() {
            return Err(TrackerError::Validation("label is required".to_string()));
        }

        let now = now_ts();
        let new = NewVariant {
            test_id,
            label: input.label.trim(),
            title: input.title.as_deref(),
            thumbnail_url: input.thumbnail_url.as_deref(),
            is_control: input.is_control,
            impressions: 0,
            clicks: 0,
            views: 0,
            likes: 0,
            comments: 0,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(test_variants::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        let row: VariantRow = test_variants::table
            .filter(test_variants::test_id.eq(test_id))
            .order(test_variants::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(map_variant(row))
    }

    pub async fn update_variant_metrics(
        &self,
        user_id: &str,
        variant_id: i32,
        metrics: &VariantMetrics,
    ) -> Result<Variant> {
        metrics.validate()?;
        let variant = self.find_variant(variant_id).await?;
        // Ownership is checked through the parent test.
        self.require_test(user_id, variant.test_id).await?;

        let mut conn = self.db.conn().await?;
        diesel::update(test_variants::table.filter(test_variants::id.eq(variant_id)))
            .set((
                test_variants::impressions.eq(metrics.impressions),
                test_variants::clicks.eq(metrics.clicks),
                test_variants::views.eq(metrics.views),
                test_variants::likes.eq(metrics.likes),
                test_variants::comments.eq(metrics.comments),
                test_variants::updated_at.eq(now_ts()),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        drop(conn);

        self.find_variant(variant_id).await
    }

    pub async fn start_test(&self, user_id: &str, id: i32) -> Result<AbTest> {
        let test = self.require_test(user_id, id).await?;
        if test.status != TestStatus::Draft {
            return Err(TrackerError::Validation(format!(
                "test {id} is {}, only draft tests can start",
                test.status
            )));
        }
        if self.list_variants(id).await?.len() < 2 {
            return Err(TrackerError::Validation(
                "a test needs at least two variants".to_string(),
            ));
        }

        let now = now_ts();
        let mut conn = self.db.conn().await?;
        diesel::update(ab_tests::table.filter(ab_tests::id.eq(id)))
            .set((
                ab_tests::status.eq(TestStatus::Active.as_str()),
                ab_tests::started_at.eq(Some(now)),
                ab_tests::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        drop(conn);

        self.require_test(user_id, id).await
    }

    pub async fn complete_test(
        &self,
        user_id: &str,
        id: i32,
        winner_variant_id: Option<i32>,
    ) -> Result<AbTest> {
        let test = self.require_test(user_id, id).await?;
        if test.status == TestStatus::Completed {
            return Err(TrackerError::Validation(format!("test {id} is already completed")));
        }
        if let Some(winner) = winner_variant_id {
            let variants = self.list_variants(id).await?;
            if !variants.iter().any(|v| v.id == winner) {
                return Err(TrackerError::Validation(format!(
                    "variant {winner} does not belong to test {id}"
                )));
            }
        }

        let now = now_ts();
        let mut conn = self.db.conn().await?;
        diesel::update(ab_tests::table.filter(ab_tests::id.eq(id)))
            .set((
                ab_tests::status.eq(TestStatus::Completed.as_str()),
                ab_tests::winner_variant_id.eq(winner_variant_id),
                ab_tests::ended_at.eq(Some(now)),
                ab_tests::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        drop(conn);

        self.require_test(user_id, id).await
    }

    pub async fn delete_test(&self, user_id: &str, id: i32) -> Result<bool> {
        let mut conn = self.db.conn().await?;
        let count = diesel::delete(
            ab_tests::table
                .filter(ab_tests::user_id.eq(user_id))
                .filter(ab_tests::id.eq(id)),
        )
        .execute(&mut conn)
        .await
        .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        if count == 0 {
            return Ok(false);
        }
        diesel::delete(test_variants::table.filter(test_variants::test_id.eq(id)))
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(true)
    }

    pub async fn evaluate(&self, user_id: &str, id: i32) -> Result<TestEvaluation> {
        self.require_test(user_id, id).await?;
        let variants = self.list_variants(id).await?;
        Ok(TestEvaluation {
            test_id: id,
            ctr: compare_ctr(&variants),
            engagement: compare_engagement(&variants),
        })
    }

    pub async fn mark_notified(&self, id: i32, ts: i64) -> Result<()> {
        let mut conn = self.db.conn().await?;
        diesel::update(ab_tests::table.filter(ab_tests::id.eq(id)))
            .set((
                ab_tests::notified_at.eq(Some(ts)),
                ab_tests::updated_at.eq(ts),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(())
    }

    async fn find_test(&self, user_id: &str, id: i32) -> Result<Option<AbTest>> {
        let mut conn = self.db.conn().await?;
        let row: Option<TestRow> = ab_tests::table
            .filter(ab_tests::user_id.eq(user_id))
            .filter(ab_tests::id.eq(id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        row.map(map_test).transpose()
    }

    async fn require_test(&self, user_id: &str, id: i32) -> Result<AbTest> {
        self.find_test(user_id, id)
            .await?
            .ok_or_else(|| TrackerError::NotFound(format!("test {id}")))
    }

    async fn find_variant(&self, id: i32) -> Result<Variant> {
        let mut conn = self.db.conn().await?;
        let row: Option<VariantRow> = test_variants::table
            .filter(test_variants::id.eq(id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        row.map(map_variant)
            .ok_or_else(|| TrackerError::NotFound(format!("variant {id}")))
    }
}

fn map_test(row: TestRow) -> Result<AbTest> {
    Ok(AbTest {
        id: row.id,
        user_id: row.user_id,
        video_id: row.video_id,
        name: row.name,
        test_type: row.test_type.parse()?,
        status: row.status.parse()?,
        winner_variant_id: row.winner_variant_id,
        started_at: row.started_at,
        ended_at: row.ended_at,
        notified_at: row.notified_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn map_variant(row: VariantRow) -> Variant {
    Variant {
        id: row.id,
        test_id: row.test_id,
        label: row.label,
        title: row.title,
        thumbnail_url: row.thumbnail_url,
        is_control: row.is_control,
        impressions: row.impressions,
        clicks: row.clicks,
        views: row.views,
        likes: row.likes,
        comments: row.comments,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

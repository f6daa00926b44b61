use crate::{
    domain::{MemeRepository, RatingRepository, TemplateRepository, UserRepository},
    errors::RepoError,
    models::{MemeDetails, MemeTemplate, NewMeme, PageRequest, RatedMeme, Rating, Score, User, UserSummary},
    sampling::SamplingPlan,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres};
use std::sync::Arc;
use tracing::{self, info};

/// Classifies a sqlx failure. Unique violations become `Conflict`,
/// foreign-key violations `NotFound`, the rest backend errors with context.
fn classify(err: sqlx::Error, context: String) -> RepoError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return RepoError::Conflict(context);
        }
        if db_err.is_foreign_key_violation() {
            return RepoError::NotFound(context);
        }
    }
    RepoError::BackendError(anyhow::Error::new(err).context(context))
}

/// Bundle of repository trait objects handed to the services.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub memes: Arc<dyn MemeRepository>,
    pub ratings: Arc<dyn RatingRepository>,
}

impl Repositories {
    /// Postgres-backed repositories sharing one pool.
    pub fn postgres(pool: PgPool, sample_threshold: i64) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            templates: Arc::new(PgTemplateRepository::new(pool.clone())),
            memes: Arc::new(PgMemeRepository::new(pool.clone(), sample_threshold)),
            ratings: Arc::new(PgRatingRepository::new(pool)),
        }
    }
}

// --- Users ---

#[derive(FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    is_staff: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            is_staff: row.is_staff,
            created_at: row.created_at,
        }
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, is_staff, created_at";

#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        info!("Initializing PgUserRepository");
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "Postgres: user with this email".to_string()))?;

        tracing::debug!(user_id = row.id, "Postgres: Inserted user");
        Ok(row.into())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("Postgres: Failed to look up user by email")?;
        Ok(row.map(User::from))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context(format!("Postgres: Failed to get user (id: {})", id))?;
        Ok(row.map(User::from))
    }
}

// --- Templates ---

#[derive(FromRow)]
struct TemplateRow {
    id: i64,
    name: String,
    image_url: String,
    default_top_text: String,
    default_bottom_text: String,
}

impl From<TemplateRow> for MemeTemplate {
    fn from(row: TemplateRow) -> Self {
        MemeTemplate {
            id: row.id,
            name: row.name,
            image_url: row.image_url,
            default_top_text: row.default_top_text,
            default_bottom_text: row.default_bottom_text,
        }
    }
}

const TEMPLATE_COLUMNS: &str = "id, name, image_url, default_top_text, default_bottom_text";

#[derive(Debug, Clone)]
pub struct PgTemplateRepository {
    pool: PgPool,
}

impl PgTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        info!("Initializing PgTemplateRepository");
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for PgTemplateRepository {
    async fn list_all(&self) -> Result<Vec<MemeTemplate>, RepoError> {
        let rows = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {} FROM meme_templates ORDER BY id",
            TEMPLATE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Postgres: Failed to list meme templates")?;

        tracing::debug!("Postgres: Listed {} templates", rows.len());
        Ok(rows.into_iter().map(MemeTemplate::from).collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<MemeTemplate>, RepoError> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {} FROM meme_templates WHERE id = $1",
            TEMPLATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context(format!("Postgres: Failed to get template (id: {})", id))?;
        Ok(row.map(MemeTemplate::from))
    }

    async fn list_in_random_order(&self) -> Result<Vec<MemeTemplate>, RepoError> {
        let rows = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {} FROM meme_templates ORDER BY random()",
            TEMPLATE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Postgres: Failed to list templates in random order")?;
        Ok(rows.into_iter().map(MemeTemplate::from).collect())
    }
}

// --- Memes ---

#[derive(FromRow)]
struct MemeDetailsRow {
    id: i64,
    top_text: String,
    bottom_text: String,
    created_at: DateTime<Utc>,
    image_key: Option<String>,
    template_id: i64,
    template_name: String,
    template_image_url: String,
    template_default_top_text: String,
    template_default_bottom_text: String,
    creator_id: i64,
    creator_email: String,
}

impl From<MemeDetailsRow> for MemeDetails {
    fn from(row: MemeDetailsRow) -> Self {
        MemeDetails {
            id: row.id,
            template: MemeTemplate {
                id: row.template_id,
                name: row.template_name,
                image_url: row.template_image_url,
                default_top_text: row.template_default_top_text,
                default_bottom_text: row.template_default_bottom_text,
            },
            top_text: row.top_text,
            bottom_text: row.bottom_text,
            created_by: UserSummary {
                id: row.creator_id,
                email: row.creator_email,
            },
            created_at: row.created_at,
            image_key: row.image_key,
        }
    }
}

#[derive(FromRow)]
struct RatedMemeRow {
    #[sqlx(flatten)]
    meme: MemeDetailsRow,
    average_score: f64,
}

const MEME_DETAILS_COLUMNS: &str = "m.id, m.top_text, m.bottom_text, m.created_at, m.image_key, \
     t.id AS template_id, t.name AS template_name, t.image_url AS template_image_url, \
     t.default_top_text AS template_default_top_text, t.default_bottom_text AS template_default_bottom_text, \
     u.id AS creator_id, u.email AS creator_email";

const MEME_DETAILS_JOINS: &str = "FROM memes m \
     JOIN meme_templates t ON t.id = m.template_id \
     JOIN users u ON u.id = m.created_by";

#[derive(Debug, Clone)]
pub struct PgMemeRepository {
    pool: PgPool,
    sample_threshold: i64,
}

impl PgMemeRepository {
    pub fn new(pool: PgPool, sample_threshold: i64) -> Self {
        info!(sample_threshold, "Initializing PgMemeRepository");
        Self { pool, sample_threshold }
    }

    async fn estimated_row_count(&self) -> Result<i64, RepoError> {
        let estimate: Option<f32> =
            sqlx::query_scalar("SELECT reltuples FROM pg_class WHERE oid = 'memes'::regclass")
                .fetch_optional(&self.pool)
                .await
                .context("Postgres: Failed to read row estimate for memes")?;
        Ok(estimate.map(|rows| rows as i64).unwrap_or(-1))
    }

    async fn random_id(&self, plan: SamplingPlan) -> Result<Option<i64>, RepoError> {
        let query = match plan {
            SamplingPlan::FullScan => {
                sqlx::query_scalar::<Postgres, i64>("SELECT id FROM memes ORDER BY random() LIMIT 1")
            }
            SamplingPlan::SystemSample { percent } => sqlx::query_scalar::<Postgres, i64>(
                "SELECT id FROM memes TABLESAMPLE SYSTEM ($1::float8) ORDER BY random() LIMIT 1",
            )
            .bind(percent),
        };
        let id = query
            .fetch_optional(&self.pool)
            .await
            .context(format!("Postgres: Failed to pick random meme ({:?})", plan))?;
        Ok(id)
    }
}

#[async_trait]
impl MemeRepository for PgMemeRepository {
    async fn create(&self, meme: &NewMeme) -> Result<i64, RepoError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO memes (template_id, top_text, bottom_text, created_by, image_key) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(meme.template_id)
        .bind(&meme.top_text)
        .bind(&meme.bottom_text)
        .bind(meme.created_by)
        .bind(&meme.image_key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, format!("Postgres: template {} or user {}", meme.template_id, meme.created_by)))?;

        tracing::debug!(meme_id = id, template_id = meme.template_id, "Postgres: Inserted meme");
        Ok(id)
    }

    async fn get_details(&self, id: i64) -> Result<Option<MemeDetails>, RepoError> {
        let row = sqlx::query_as::<_, MemeDetailsRow>(&format!(
            "SELECT {} {} WHERE m.id = $1",
            MEME_DETAILS_COLUMNS, MEME_DETAILS_JOINS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context(format!("Postgres: Failed to get meme (id: {})", id))?;
        Ok(row.map(MemeDetails::from))
    }

    async fn exists(&self, id: i64) -> Result<bool, RepoError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM memes WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context(format!("Postgres: Failed to check meme existence (id: {})", id))?;
        Ok(exists)
    }

    async fn list_page(&self, page: PageRequest) -> Result<(Vec<MemeDetails>, i64), RepoError> {
        // One snapshot for both statements, so `total` always matches the rows.
        let mut tx = self.pool.begin().await.context("Postgres: Failed to begin transaction")?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .context("Postgres: Failed to set isolation level")?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memes")
            .fetch_one(&mut *tx)
            .await
            .context("Postgres: Failed to count memes")?;

        let rows = sqlx::query_as::<_, MemeDetailsRow>(&format!(
            "SELECT {} {} ORDER BY m.id LIMIT $1 OFFSET $2",
            MEME_DETAILS_COLUMNS, MEME_DETAILS_JOINS
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *tx)
        .await
        .context(format!("Postgres: Failed to list memes (page: {})", page.number))?;
        tx.commit().await.context("Postgres: Failed to commit transaction")?;

        tracing::debug!(page = page.number, returned = rows.len(), total, "Postgres: Listed memes");
        Ok((rows.into_iter().map(MemeDetails::from).collect(), total))
    }

    async fn random(&self) -> Result<Option<MemeDetails>, RepoError> {
        let estimate = self.estimated_row_count().await?;
        let plan = SamplingPlan::for_estimate(estimate, self.sample_threshold);
        tracing::debug!(estimate, ?plan, "Postgres: Picking random meme");

        let mut id = self.random_id(plan).await?;
        if id.is_none() && plan != SamplingPlan::FullScan {
            // Block sampling can come back empty on sparse tables.
            tracing::debug!("Postgres: Sample was empty, falling back to full scan");
            id = self.random_id(SamplingPlan::FullScan).await?;
        }

        match id {
            Some(id) => self.get_details(id).await,
            None => Ok(None),
        }
    }

    async fn top_rated(&self, limit: i64) -> Result<Vec<RatedMeme>, RepoError> {
        let rows = sqlx::query_as::<_, RatedMemeRow>(&format!(
            "SELECT {}, ROUND(COALESCE(AVG(r.score), 0), 2)::FLOAT8 AS average_score \
             {} LEFT JOIN ratings r ON r.meme_id = m.id \
             GROUP BY m.id, t.id, u.id \
             ORDER BY average_score DESC, m.id ASC \
             LIMIT $1",
            MEME_DETAILS_COLUMNS, MEME_DETAILS_JOINS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Postgres: Failed to compute top rated memes")?;

        Ok(rows
            .into_iter()
            .map(|row| RatedMeme {
                meme: row.meme.into(),
                average_score: row.average_score,
            })
            .collect())
    }
}

// --- Ratings ---

#[derive(FromRow)]
struct RatingRow {
    id: i64,
    meme_id: i64,
    user_id: i64,
    score: i16,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PgRatingRepository {
    pool: PgPool,
}

impl PgRatingRepository {
    pub fn new(pool: PgPool) -> Self {
        info!("Initializing PgRatingRepository");
        Self { pool }
    }
}

#[async_trait]
impl RatingRepository for PgRatingRepository {
    async fn upsert(&self, meme_id: i64, user_id: i64, score: Score) -> Result<i64, RepoError> {
        // Concurrent upserts for one (meme, user) serialize on the unique index.
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO ratings (meme_id, user_id, score) VALUES ($1, $2, $3) \
             ON CONFLICT (meme_id, user_id) DO UPDATE SET score = EXCLUDED.score \
             RETURNING id",
        )
        .bind(meme_id)
        .bind(user_id)
        .bind(i16::from(score.get()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, format!("Postgres: meme {}", meme_id)))?;

        tracing::debug!(rating_id = id, meme_id, user_id, score = score.get(), "Postgres: Upserted rating");
        Ok(id)
    }

    async fn find(&self, meme_id: i64, user_id: i64) -> Result<Option<Rating>, RepoError> {
        let row = sqlx::query_as::<_, RatingRow>(
            "SELECT id, meme_id, user_id, score, created_at FROM ratings WHERE meme_id = $1 AND user_id = $2",
        )
        .bind(meme_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context(format!("Postgres: Failed to get rating (meme: {}, user: {})", meme_id, user_id))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let score = Score::try_from(i64::from(row.score)).map_err(|e| {
            RepoError::BackendError(anyhow::anyhow!("rating {} holds an invalid score: {}", row.id, e))
        })?;
        Ok(Some(Rating {
            id: row.id,
            meme_id: row.meme_id,
            user_id: row.user_id,
            score,
            created_at: row.created_at,
        }))
    }
}

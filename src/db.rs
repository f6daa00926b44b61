//! Connection pool, schema migrations and template seeding.

use crate::{config::Config, errors::AppError};
use anyhow::Context;
use serde::Deserialize;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::path::Path;
use tracing;

/// Opens the Postgres pool.
pub async fn connect(config: &Config) -> Result<PgPool, AppError> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| AppError::InitError(format!("Failed to connect to Postgres: {}", e)))
}

/// Applies the embedded migrations under `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::InitError(format!("Failed to run migrations: {}", e)))?;
    tracing::info!("Database migrations applied.");
    Ok(())
}

/// One template in the seed fixture.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TemplateSeed {
    pub name: String,
    pub image_url: String,
    #[serde(default)]
    pub default_top_text: String,
    #[serde(default)]
    pub default_bottom_text: String,
}

/// Fixture entries may be plain objects or `{"model", "pk", "fields"}`
/// records as dumped by the admin tooling.
#[derive(Deserialize)]
#[serde(untagged)]
enum FixtureEntry {
    Record { fields: TemplateSeed },
    Plain(TemplateSeed),
}

pub fn parse_template_fixture(json: &str) -> Result<Vec<TemplateSeed>, serde_json::Error> {
    let entries: Vec<FixtureEntry> = serde_json::from_str(json)?;
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            FixtureEntry::Record { fields } => fields,
            FixtureEntry::Plain(seed) => seed,
        })
        .collect())
}

/// Inserts every fixture template whose name is not taken yet. Returns the
/// number of templates inserted.
pub async fn seed_templates(pool: &PgPool, fixture: &Path) -> Result<u64, AppError> {
    let json = tokio::fs::read_to_string(fixture)
        .await
        .map_err(|e| AppError::InitError(format!("Failed to read template fixture '{}': {}", fixture.display(), e)))?;
    let seeds = parse_template_fixture(&json)
        .map_err(|e| AppError::InitError(format!("Invalid template fixture '{}': {}", fixture.display(), e)))?;

    let mut inserted = 0;
    for seed in &seeds {
        let result = sqlx::query(
            "INSERT INTO meme_templates (name, image_url, default_top_text, default_bottom_text) \
             SELECT $1, $2, $3, $4 \
             WHERE NOT EXISTS (SELECT 1 FROM meme_templates WHERE name = $1)",
        )
        .bind(&seed.name)
        .bind(&seed.image_url)
        .bind(&seed.default_top_text)
        .bind(&seed.default_bottom_text)
        .execute(pool)
        .await
        .context(format!("Failed to seed template '{}'", seed.name))
        .map_err(|e| AppError::InitError(format!("{:#}", e)))?;
        inserted += result.rows_affected();
    }

    tracing::info!(fixture = %fixture.display(), total = seeds.len(), inserted, "Template fixture applied.");
    Ok(inserted)
}

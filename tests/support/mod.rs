//! Throwaway Postgres databases for the repository tests.
//!
//! With `TEST_DATABASE_URL` set, each test creates a fresh database on that
//! server. Otherwise an embedded cluster is started per test. Setup failures
//! (no network for the binaries, running as root) skip the test unless
//! `REQUIRE_TEST_CLUSTER` is truthy.

use anyhow::{anyhow, Context};
use meme_rating_service::db;
use postgresql_embedded::PostgreSQL;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::str::FromStr;
use uuid::Uuid;

const EMBEDDED_DATABASE: &str = "meme_rating_test";

/// A migrated database. The pool is dropped before the cluster it points at.
pub struct TestDatabase {
    pub pool: PgPool,
    _cluster: Option<PostgreSQL>,
}

fn require_test_cluster() -> bool {
    std::env::var("REQUIRE_TEST_CLUSTER")
        .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn handle_setup_failure<T>(reason: impl std::fmt::Display) -> Option<T> {
    if require_test_cluster() {
        panic!("Test database setup failed: {reason}");
    }
    eprintln!("SKIP-TEST-CLUSTER: {reason}");
    None
}

/// Returns a migrated, empty database, or `None` when none can be had.
pub async fn test_database() -> Option<TestDatabase> {
    let result = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => external_database(&url).await,
        Err(_) => embedded_database().await,
    };
    match result {
        Ok(database) => Some(database),
        Err(err) => handle_setup_failure(format!("{:#}", err)),
    }
}

async fn external_database(url: &str) -> anyhow::Result<TestDatabase> {
    let admin = PgPoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await
        .context("connecting to TEST_DATABASE_URL")?;
    let name = format!("meme_test_{}", Uuid::new_v4().simple());
    sqlx::raw_sql(&format!("CREATE DATABASE {}", name))
        .execute(&admin)
        .await
        .with_context(|| format!("creating database {}", name))?;
    admin.close().await;

    let options = PgConnectOptions::from_str(url)?.database(&name);
    let pool = PgPoolOptions::new().max_connections(4).connect_with(options).await?;
    migrated(pool, None).await
}

async fn embedded_database() -> anyhow::Result<TestDatabase> {
    let mut cluster = PostgreSQL::default();
    cluster.setup().await.context("postgresql_embedded::setup failed")?;
    cluster.start().await.context("postgresql_embedded::start failed")?;
    cluster
        .create_database(EMBEDDED_DATABASE)
        .await
        .context("postgresql_embedded::create_database failed")?;

    let url = cluster.settings().url(EMBEDDED_DATABASE);
    let pool = PgPoolOptions::new().max_connections(4).connect(&url).await?;
    migrated(pool, Some(cluster)).await
}

async fn migrated(pool: PgPool, cluster: Option<PostgreSQL>) -> anyhow::Result<TestDatabase> {
    db::run_migrations(&pool).await.map_err(|e| anyhow!("running migrations: {}", e))?;
    Ok(TestDatabase { pool, _cluster: cluster })
}

/// Inserts a bare template and returns its id.
pub async fn insert_template(pool: &PgPool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO meme_templates (name, image_url) VALUES ($1, $2) RETURNING id")
        .bind(name)
        .bind(format!("https://img.example/{}.jpg", name))
        .fetch_one(pool)
        .await
        .expect("template insert")
}

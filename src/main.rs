use meme_rating_service::{
    aws_clients::{create_s3_client, create_sdk_config},
    config::{Config, StorageConfig},
    db,
    domain::FileStorage,
    errors::AppError,
    fetch::HttpImageFetcher,
    repositories::Repositories,
    routes::create_router,
    services::ServiceSettings,
    startup::{init_resources, BucketSetup},
    storage::{LocalFileStorage, S3FileStorage},
    AppState,
};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing (logging)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "meme_rating_service=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = Config::load()?;
    tracing::info!(?config, "Configuration loaded.");
    let settings = ServiceSettings::from_config(&config)?;

    // --- Database ---
    tracing::info!("Connecting to Postgres...");
    let pool = db::connect(&config).await?;

    // --- File storage & startup resources ---
    let fixture = config.template_fixture_path.as_deref();
    let (file_storage, media_root): (Arc<dyn FileStorage>, Option<PathBuf>) = match &config.storage {
        StorageConfig::S3 { bucket_name, aws_region, endpoint_url } => {
            tracing::info!("Initializing AWS S3 client...");
            let sdk_config = create_sdk_config(aws_region, endpoint_url.as_deref()).await;
            let s3_client = create_s3_client(&sdk_config, endpoint_url.is_some());

            let bucket = BucketSetup { client: &s3_client, bucket_name, region: aws_region };
            init_resources(&pool, fixture, Some(bucket)).await?;

            let storage = S3FileStorage::new(s3_client, bucket_name.clone(), aws_region, endpoint_url.as_deref());
            (Arc::new(storage), None)
        }
        StorageConfig::Local { media_root, base_url } => {
            init_resources(&pool, fixture, None).await?;

            tokio::fs::create_dir_all(media_root).await?;
            tracing::info!(media_root = %media_root.display(), "Storing generated memes locally.");
            let storage = LocalFileStorage::new(media_root.clone(), base_url.clone());
            (Arc::new(storage), Some(media_root.clone()))
        }
    };

    // --- Application State ---
    let fetcher = HttpImageFetcher::new(config.image_fetch_timeout)
        .map_err(|e| AppError::InitError(format!("Failed to build HTTP client: {}", e)))?;
    let repos = Repositories::postgres(pool, config.random_sample_threshold);
    let state = Arc::new(AppState::new(repos, file_storage, Arc::new(fetcher), &settings));

    let app = create_router(state, media_root);

    // --- Server Startup ---
    tracing::info!("Server listening on http://{}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

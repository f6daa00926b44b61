use crate::{db, errors::AppError};
use aws_sdk_s3::{
    error::SdkError as S3SdkError,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client,
};
use sqlx::PgPool;
use std::path::Path;
use tracing;

/// S3 bucket the storage backend writes to, when that backend is in use.
pub struct BucketSetup<'a> {
    pub client: &'a S3Client,
    pub bucket_name: &'a str,
    pub region: &'a str,
}

/// Ensures the S3 bucket exists, creating it with the correct location constraint if needed.
async fn ensure_s3_bucket_exists(client: &S3Client, bucket_name: &str, region_str: &str) -> Result<(), AppError> {
    let bucket_config = if region_str != "us-east-1" {
        Some(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region_str))
                .build(),
        )
    } else {
        None
    };

    let mut create_bucket_req_builder = client.create_bucket().bucket(bucket_name);
    if let Some(config) = bucket_config {
        create_bucket_req_builder = create_bucket_req_builder.create_bucket_configuration(config);
    }

    match create_bucket_req_builder.send().await {
        Ok(_) => {
            tracing::info!("Startup: S3 bucket '{}' created.", bucket_name);
            Ok(())
        }
        Err(sdk_err) => {
            if let S3SdkError::ServiceError(service_err) = &sdk_err {
                let code = service_err.err().meta().code();
                if code == Some("BucketAlreadyOwnedByYou") || code == Some("BucketAlreadyExists") {
                    tracing::info!("Startup: S3 bucket '{}' already exists.", bucket_name);
                    Ok(())
                } else {
                    let context = format!("Startup: Service error creating S3 bucket '{}'", bucket_name);
                    tracing::error!("{}: {:?}", context, service_err);
                    Err(AppError::InitError(format!("{}: {}", context, sdk_err)))
                }
            } else {
                let context = format!("Startup: SDK error creating S3 bucket '{}'", bucket_name);
                tracing::error!("{}: {}", context, sdk_err);
                Err(AppError::InitError(format!("{}: {}", context, sdk_err)))
            }
        }
    }
}

/// Prepares everything the server needs before it accepts requests: the
/// schema, the seeded templates and, for S3 storage, the bucket.
pub async fn init_resources(
    pool: &PgPool,
    template_fixture: Option<&Path>,
    bucket: Option<BucketSetup<'_>>,
) -> Result<(), AppError> {
    tracing::info!("Startup: Initializing resources...");
    db::run_migrations(pool).await?;

    match template_fixture {
        Some(path) => {
            db::seed_templates(pool, path).await?;
        }
        None => tracing::info!("Startup: No template fixture configured, skipping seeding."),
    }

    if let Some(bucket) = bucket {
        ensure_s3_bucket_exists(bucket.client, bucket.bucket_name, bucket.region).await?;
        tracing::warn!(
            "Startup: Meme URLs point straight at bucket '{}'; it needs a public-read policy for clients to load them.",
            bucket.bucket_name
        );
    }
    tracing::info!("Startup: Resource initialization complete.");
    Ok(())
}

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::Client as S3Client;
use tracing;

// Creates the base AWS SDK configuration for the S3 storage backend.
// Uses the default credential provider chain (which reads env vars, profiles, etc.).
pub async fn create_sdk_config(aws_region: &str, endpoint_url: Option<&str>) -> SdkConfig {
    tracing::info!(sdk_region = %aws_region, "Setting SDK region");

    let mut config_loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(aws_region.to_string()));

    if let Some(endpoint_url) = endpoint_url {
        tracing::info!("Using localstack endpoint override: {}", endpoint_url);
        config_loader = config_loader.endpoint_url(endpoint_url);
    } else {
        tracing::info!("Using default AWS endpoints and credential resolution.");
    }

    config_loader.load().await
}

// Creates an S3 client from a shared SdkConfig. LocalStack only resolves
// path-style bucket addressing.
pub fn create_s3_client(sdk_config: &SdkConfig, path_style: bool) -> S3Client {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
        .force_path_style(path_style)
        .build();
    S3Client::from_conf(s3_config)
}

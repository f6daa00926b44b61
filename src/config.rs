use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

/// Where generated meme images are written.
#[derive(Clone, Debug, PartialEq)]
pub enum StorageConfig {
    /// Files under `media_root`, served by the app itself at `/media`.
    Local { media_root: PathBuf, base_url: String },
    S3 {
        bucket_name: String,
        aws_region: String,
        // Optional endpoint for LocalStack
        endpoint_url: Option<String>,
    },
}

#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub page_size: u32,
    pub random_sample_threshold: i64,
    pub image_fetch_timeout: Option<Duration>,
    pub storage: StorageConfig,
    pub template_fixture_path: Option<PathBuf>,
}

// Hand-written so the database URL and signing secret never end up in logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("database_max_connections", &self.database_max_connections)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("page_size", &self.page_size)
            .field("random_sample_threshold", &self.random_sample_threshold)
            .field("image_fetch_timeout", &self.image_fetch_timeout)
            .field("storage", &self.storage)
            .field("template_fixture_path", &self.template_fixture_path)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let database_url = required(&lookup, "DATABASE_URL")?;
        let jwt_secret = required(&lookup, "JWT_SECRET")?;
        if jwt_secret.is_empty() {
            return Err(ConfigError::InvalidVar("JWT_SECRET".into(), "must not be empty".into()));
        }

        let database_max_connections = parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;
        let access_token_ttl = Duration::from_secs(parsed(&lookup, "ACCESS_TOKEN_TTL_SECS", 300)?);
        let refresh_token_ttl = Duration::from_secs(parsed(&lookup, "REFRESH_TOKEN_TTL_SECS", 86_400)?);

        let bcrypt_cost: u32 = parsed(&lookup, "BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidVar("BCRYPT_COST".into(), "must be between 4 and 31".into()));
        }

        let page_size: u32 = parsed(&lookup, "PAGE_SIZE", 10)?;
        if page_size == 0 {
            return Err(ConfigError::InvalidVar("PAGE_SIZE".into(), "must be positive".into()));
        }

        let random_sample_threshold = parsed(&lookup, "RANDOM_SAMPLE_THRESHOLD", crate::sampling::DEFAULT_SAMPLE_THRESHOLD)?;

        let image_fetch_timeout = match lookup("IMAGE_FETCH_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidVar("IMAGE_FETCH_TIMEOUT_SECS".into(), e.to_string())
            })?)),
            None => None,
        };

        let storage = match lookup("STORAGE_BACKEND").as_deref().unwrap_or("local") {
            "local" => StorageConfig::Local {
                media_root: PathBuf::from(lookup("MEDIA_ROOT").unwrap_or_else(|| "./media".to_string())),
                base_url: lookup("MEDIA_BASE_URL")
                    .unwrap_or_else(|| "http://localhost:3000/media".to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
            "s3" => StorageConfig::S3 {
                bucket_name: required(&lookup, "MEME_BUCKET_NAME")?,
                aws_region: lookup("AWS_DEFAULT_REGION").unwrap_or_else(|| "ca-central-1".to_string()),
                // Allow overriding endpoint for localstack/testing
                endpoint_url: lookup("AWS_ENDPOINT_URL"),
            },
            other => {
                return Err(ConfigError::InvalidVar(
                    "STORAGE_BACKEND".into(),
                    format!("expected 'local' or 's3', got '{}'", other),
                ));
            }
        };

        let template_fixture_path = lookup("TEMPLATE_FIXTURE_PATH").map(PathBuf::from);

        Ok(Config {
            bind_address,
            database_url,
            database_max_connections,
            jwt_secret,
            access_token_ttl,
            refresh_token_ttl,
            bcrypt_cost,
            page_size,
            random_sample_threshold,
            image_fetch_timeout,
            storage,
            template_fixture_path,
        })
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or_else(|| ConfigError::MissingVar(name.into()))
}

fn parsed<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidVar(name.into(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/memes"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.access_token_ttl, Duration::from_secs(300));
        assert_eq!(config.refresh_token_ttl, Duration::from_secs(86_400));
        assert_eq!(config.image_fetch_timeout, None);
        assert!(matches!(config.storage, StorageConfig::Local { .. }));
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = Config::from_lookup(lookup_from(&[("JWT_SECRET", "s3cret")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(name) if name == "DATABASE_URL"));
    }

    #[test]
    fn s3_backend_requires_bucket_name() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/memes"),
            ("JWT_SECRET", "s3cret"),
            ("STORAGE_BACKEND", "s3"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(name) if name == "MEME_BUCKET_NAME"));
    }

    #[test]
    fn rejects_out_of_range_bcrypt_cost() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/memes"),
            ("JWT_SECRET", "s3cret"),
            ("BCRYPT_COST", "2"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar(name, _) if name == "BCRYPT_COST"));
    }

    #[test]
    fn media_base_url_loses_trailing_slash() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/memes"),
            ("JWT_SECRET", "s3cret"),
            ("MEDIA_BASE_URL", "https://cdn.example.com/media/"),
            ("IMAGE_FETCH_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::Local {
                media_root: PathBuf::from("./media"),
                base_url: "https://cdn.example.com/media".to_string(),
            }
        );
        assert_eq!(config.image_fetch_timeout, Some(Duration::from_secs(5)));
    }
}

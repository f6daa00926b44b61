//! Business operations. Handlers call these; these call the repositories.

mod accounts;
mod memes;
mod surprise;

pub use accounts::{normalize_email, AccountService};
pub use memes::{MemeService, TOP_MEMES_LIMIT};
pub use surprise::{SurpriseMeme, SurpriseService, BOTTOM_CAPTIONS, TOP_CAPTIONS};

use crate::{config::Config, errors::AppError};

/// Tunables the services need, split out of [`Config`] so tests can build
/// them without a database URL.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub jwt_secret: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    pub bcrypt_cost: u32,
    pub page_size: u32,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let ttl = |name: &str, value: std::time::Duration| {
            chrono::Duration::from_std(value)
                .map_err(|e| AppError::ConfigError(format!("{} is out of range: {}", name, e)))
        };
        Ok(Self {
            jwt_secret: config.jwt_secret.clone(),
            access_token_ttl: ttl("ACCESS_TOKEN_TTL_SECS", config.access_token_ttl)?,
            refresh_token_ttl: ttl("REFRESH_TOKEN_TTL_SECS", config.refresh_token_ttl)?,
            bcrypt_cost: config.bcrypt_cost,
            page_size: config.page_size,
        })
    }
}

pub mod auth;
pub mod aws_clients;
pub mod compose;
pub mod config;
pub mod db;
pub mod domain;
pub mod dto;
pub mod errors;
pub mod extract;
pub mod fetch;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod sampling;
pub mod services;
pub mod startup;
pub mod storage;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use crate::{
    auth::TokenKeys,
    domain::{FileStorage, ImageFetcher},
    repositories::Repositories,
    services::{AccountService, MemeService, ServiceSettings, SurpriseService},
};
use std::sync::Arc;

/// AppState holds shared resources for the web server.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub memes: MemeService,
    pub surprise: SurpriseService,
    pub file_storage: Arc<dyn FileStorage>,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        file_storage: Arc<dyn FileStorage>,
        fetcher: Arc<dyn ImageFetcher>,
        settings: &ServiceSettings,
    ) -> Self {
        let tokens = Arc::new(TokenKeys::new(
            settings.jwt_secret.as_bytes(),
            settings.access_token_ttl,
            settings.refresh_token_ttl,
        ));
        Self {
            accounts: AccountService::new(repos.users, tokens, settings.bcrypt_cost),
            memes: MemeService::new(
                repos.templates.clone(),
                repos.memes.clone(),
                repos.ratings,
                settings.page_size,
            ),
            surprise: SurpriseService::new(repos.templates, repos.memes, fetcher, file_storage.clone()),
            file_storage,
        }
    }
}

use crate::{
    auth::{hash_password, verify_password, TokenKeys, TokenPair, TokenType},
    domain::UserRepository,
    errors::{AppError, RepoError},
    models::User,
};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Lower-cases the domain part of an email; the local part is kept as typed.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Registration, credential checks and token issuance.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenKeys>,
    bcrypt_cost: u32,
    /// Checked against for unknown emails so they cost as much as a wrong password.
    dummy_hash: Arc<OnceCell<String>>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserRepository>, tokens: Arc<TokenKeys>, bcrypt_cost: u32) -> Self {
        Self { users, tokens, bcrypt_cost, dummy_hash: Arc::new(OnceCell::new()) }
    }

    async fn dummy_hash(&self) -> Result<String, AppError> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| hash_password("unused dummy password".to_string(), self.bcrypt_cost))
            .await?;
        Ok(hash.clone())
    }

    /// Creates a user. An email that is already taken is a bad request.
    pub async fn register(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = normalize_email(email);
        let password_hash = hash_password(password.to_string(), self.bcrypt_cost).await?;

        let user = self.users.create(&email, &password_hash).await.map_err(|e| match e {
            RepoError::Conflict(_) => AppError::BadRequest(format!("email {} is already registered", email)),
            other => other.into(),
        })?;

        info!(user_id = user.id, "Registered user");
        Ok(user)
    }

    /// Exchanges credentials for an access/refresh token pair.
    pub async fn obtain_tokens(&self, email: &str, password: &str) -> Result<TokenPair, AppError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            verify_password(password.to_string(), self.dummy_hash().await?).await?;
            return Err(AppError::Unauthorized("no active account with the given credentials".to_string()));
        };

        if !verify_password(password.to_string(), user.password_hash.clone()).await? {
            return Err(AppError::Unauthorized("no active account with the given credentials".to_string()));
        }

        tracing::debug!(user_id = user.id, "Issuing token pair");
        Ok(self.tokens.issue_pair(user.id)?)
    }

    /// Issues a fresh access token from a valid refresh token.
    pub fn refresh_access_token(&self, refresh_token: &str) -> Result<String, AppError> {
        let user_id = self.tokens.verify(refresh_token, TokenType::Refresh)?;
        tracing::debug!(user_id, "Refreshing access token");
        Ok(self.tokens.issue(user_id, TokenType::Access)?)
    }

    /// Resolves the user behind an access token.
    pub async fn user_for_access_token(&self, access_token: &str) -> Result<User, AppError> {
        let user_id = self.tokens.verify(access_token, TokenType::Access)?;
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized(format!("user {} no longer exists", user_id)))
    }
}

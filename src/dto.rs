//! Request and response bodies of the HTTP API.

use crate::{
    domain::FileStorage,
    errors::AppError,
    models::{MemeDetails, MemeTemplate, Page, RatedMeme, Score, UserSummary},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest caption a meme may carry, in characters.
pub const MAX_CAPTION_CHARS: usize = 100;
const MAX_EMAIL_CHARS: usize = 254;

/// Checks that need more than one field, or more than serde can express.
pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

/// Loose shape check: one `@`, something on both sides, a dot in the domain.
fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.chars().count() > MAX_EMAIL_CHARS || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Postgres text columns cannot store NUL, so it never reaches the database.
fn reject_nul(field: &str, value: &str) -> Result<(), AppError> {
    if value.contains('\0') {
        return Err(AppError::BadRequest(format!("{} may not contain null characters", field)));
    }
    Ok(())
}

// --- Requests ---

#[derive(Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password_1: String,
    pub password_2: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), AppError> {
        reject_nul("email", &self.email)?;
        reject_nul("password_1", &self.password_1)?;
        reject_nul("password_2", &self.password_2)?;
        // Mismatch wins over every check below.
        if self.password_1 != self.password_2 {
            return Err(AppError::BadRequest("passwords do not match".to_string()));
        }
        if self.password_1.is_empty() {
            return Err(AppError::BadRequest("password may not be blank".to_string()));
        }
        if !is_plausible_email(&self.email) {
            return Err(AppError::BadRequest("enter a valid email address".to_string()));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

impl Validate for TokenRequest {
    fn validate(&self) -> Result<(), AppError> {
        reject_nul("email", &self.email)?;
        reject_nul("password", &self.password)?;
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(AppError::BadRequest("email and password are required".to_string()));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh: String,
}

impl Validate for RefreshRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.refresh.is_empty() {
            return Err(AppError::BadRequest("refresh token is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug)]
pub struct CreateMemeRequest {
    pub template_id: i64,
    #[serde(default)]
    pub top_text: Option<String>,
    #[serde(default)]
    pub bottom_text: Option<String>,
}

impl Validate for CreateMemeRequest {
    fn validate(&self) -> Result<(), AppError> {
        for (field, text) in [("top_text", &self.top_text), ("bottom_text", &self.bottom_text)] {
            if let Some(text) = text {
                reject_nul(field, text)?;
                if text.chars().count() > MAX_CAPTION_CHARS {
                    return Err(AppError::BadRequest(format!(
                        "{} is longer than {} characters",
                        field, MAX_CAPTION_CHARS
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug)]
pub struct RateMemeRequest {
    pub score: Score,
}

impl Validate for RateMemeRequest {
    fn validate(&self) -> Result<(), AppError> {
        Ok(())
    }
}

// --- Responses ---

#[derive(Serialize, Debug)]
pub struct AccessTokenResponse {
    pub access: String,
}

#[derive(Serialize, Debug)]
pub struct CreatedMemeResponse {
    pub meme_id: i64,
}

#[derive(Serialize, Debug)]
pub struct CreatedRatingResponse {
    pub rating_id: i64,
}

#[derive(Serialize, Debug)]
pub struct SurpriseResponse {
    pub url: String,
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize, Debug)]
pub struct MemeResponse {
    pub id: i64,
    pub template: MemeTemplate,
    pub top_text: String,
    pub bottom_text: String,
    pub created_by: UserSummary,
    /// Public URL of the generated image, if the meme has one.
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MemeResponse {
    pub fn new(meme: MemeDetails, storage: &dyn FileStorage) -> Self {
        Self {
            image: meme.image_key.as_deref().map(|key| storage.public_url(key)),
            id: meme.id,
            template: meme.template,
            top_text: meme.top_text,
            bottom_text: meme.bottom_text,
            created_by: meme.created_by,
            created_at: meme.created_at,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct RatedMemeResponse {
    pub template: MemeTemplate,
    pub top_text: String,
    pub bottom_text: String,
    pub created_by: UserSummary,
    pub average_score: f64,
}

impl From<RatedMeme> for RatedMemeResponse {
    fn from(rated: RatedMeme) -> Self {
        Self {
            template: rated.meme.template,
            top_text: rated.meme.top_text,
            bottom_text: rated.meme.bottom_text,
            created_by: rated.meme.created_by,
            average_score: rated.average_score,
        }
    }
}

/// Page envelope with links to the neighbouring pages.
#[derive(Serialize, Debug)]
pub struct PageResponse<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> PageResponse<T> {
    pub fn new<U>(page: Page<U>, path: &str, convert: impl FnMut(U) -> T) -> Self {
        let next = page.has_next().then(|| format!("{}?page={}", path, page.number + 1));
        let previous = page.has_previous().then(|| match page.number - 1 {
            1 => path.to_string(),
            n => format!("{}?page={}", path, n),
        });
        Self {
            count: page.total,
            next,
            previous,
            results: page.items.into_iter().map(convert).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn register(email: &str, p1: &str, p2: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password_1: p1.to_string(),
            password_2: p2.to_string(),
        }
    }

    #[rstest]
    #[case("a@b.com")]
    #[case("not-an-email")]
    #[case("")]
    #[case("two@@at.com")]
    fn mismatched_passwords_are_rejected_whatever_the_email(#[case] email: &str) {
        let err = register(email, "one", "two").validate().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains("match")));
    }

    #[rstest]
    #[case("user@example.com", true)]
    #[case("First.Last+tag@sub.example.org", true)]
    #[case("no-at-sign.com", false)]
    #[case("@example.com", false)]
    #[case("user@localhost", false)]
    #[case("user@.com", false)]
    #[case("us er@example.com", false)]
    #[case("a@b@c.com", false)]
    fn email_shape(#[case] email: &str, #[case] ok: bool) {
        assert_eq!(register(email, "p", "p").validate().is_ok(), ok);
    }

    #[test]
    fn blank_password_is_rejected() {
        assert!(register("a@b.com", "", "").validate().is_err());
    }

    #[rstest]
    #[case("a\0b@c.com", "p", "p")]
    #[case("a@b.com", "p\0", "p\0")]
    #[case("a@b.com", "p", "p\0")]
    #[case("a@b.com", "p\0", "p")]
    fn null_characters_are_rejected_on_registration(#[case] email: &str, #[case] p1: &str, #[case] p2: &str) {
        let err = register(email, p1, p2).validate().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains("null")));
    }

    #[rstest]
    #[case("x\0@c.com", "p")]
    #[case("a@b.com", "p\0ss")]
    fn null_characters_are_rejected_on_sign_in(#[case] email: &str, #[case] password: &str) {
        let request = TokenRequest { email: email.to_string(), password: password.to_string() };
        assert!(matches!(request.validate(), Err(AppError::BadRequest(_))));
    }

    #[rstest]
    #[case(Some("top\0"), None)]
    #[case(None, Some("\0bottom"))]
    fn null_characters_are_rejected_in_captions(#[case] top: Option<&str>, #[case] bottom: Option<&str>) {
        let request = CreateMemeRequest {
            template_id: 1,
            top_text: top.map(str::to_string),
            bottom_text: bottom.map(str::to_string),
        };
        assert!(matches!(request.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn captions_over_the_limit_are_rejected() {
        let long = "x".repeat(MAX_CAPTION_CHARS + 1);
        let request = CreateMemeRequest { template_id: 1, top_text: Some(long), bottom_text: None };
        assert!(request.validate().is_err());

        let exact = "é".repeat(MAX_CAPTION_CHARS);
        let request = CreateMemeRequest { template_id: 1, top_text: None, bottom_text: Some(exact) };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn create_meme_captions_are_optional() {
        let request: CreateMemeRequest = serde_json::from_str(r#"{"template_id": 3}"#).unwrap();
        assert_eq!(request.template_id, 3);
        assert!(request.top_text.is_none() && request.bottom_text.is_none());
    }

    #[rstest]
    #[case(r#"{"score": 0}"#)]
    #[case(r#"{"score": 6}"#)]
    #[case(r#"{"score": "3"}"#)]
    #[case(r#"{}"#)]
    fn bad_scores_fail_to_deserialize(#[case] body: &str) {
        assert!(serde_json::from_str::<RateMemeRequest>(body).is_err());
    }

    #[rstest]
    #[case(1, 25, Some("/memes?page=2"), None)]
    #[case(2, 25, Some("/memes?page=3"), Some("/memes"))]
    #[case(3, 25, None, Some("/memes?page=2"))]
    #[case(1, 5, None, None)]
    fn page_links(
        #[case] number: u32,
        #[case] total: i64,
        #[case] next: Option<&str>,
        #[case] previous: Option<&str>,
    ) {
        let page = Page { items: vec![1, 2], number, size: 10, total };
        let response = PageResponse::new(page, "/memes", |n: i32| n * 10);

        assert_eq!(response.count, total);
        assert_eq!(response.next.as_deref(), next);
        assert_eq!(response.previous.as_deref(), previous);
        assert_eq!(response.results, vec![10, 20]);
    }
}

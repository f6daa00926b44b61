//! In-memory backends for tests. Compiled for unit tests and behind the
//! `test-support` feature for the integration suite.

use crate::{
    domain::{FileStorage, ImageFetcher, MemeRepository, RatingRepository, TemplateRepository, UserRepository},
    errors::{FetchError, RepoError, StorageError},
    models::{MemeDetails, MemeTemplate, NewMeme, PageRequest, RatedMeme, Rating, Score, User, UserSummary},
    repositories::Repositories,
    routes::create_router,
    services::ServiceSettings,
    AppState,
};
use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::seq::SliceRandom;
use std::{
    collections::HashMap,
    io::Cursor,
    sync::{Arc, Mutex, MutexGuard},
};

/// Settings with a cheap bcrypt cost.
pub fn test_settings() -> ServiceSettings {
    ServiceSettings {
        jwt_secret: "test-secret".to_string(),
        access_token_ttl: chrono::Duration::minutes(5),
        refresh_token_ttl: chrono::Duration::days(1),
        bcrypt_cost: 4,
        page_size: 10,
    }
}

/// A PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([30, 160, 90]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encoding a PNG in memory");
    out.into_inner()
}

struct StoredMeme {
    id: i64,
    template_id: i64,
    top_text: String,
    bottom_text: String,
    created_by: i64,
    image_key: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    templates: Vec<MemeTemplate>,
    memes: Vec<StoredMeme>,
    ratings: Vec<Rating>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn details(&self, meme: &StoredMeme) -> Option<MemeDetails> {
        let template = self.templates.iter().find(|t| t.id == meme.template_id)?;
        let creator = self.users.iter().find(|u| u.id == meme.created_by)?;
        Some(MemeDetails {
            id: meme.id,
            template: template.clone(),
            top_text: meme.top_text.clone(),
            bottom_text: meme.bottom_text.clone(),
            created_by: UserSummary::from(creator),
            created_at: meme.created_at,
            image_key: meme.image_key.clone(),
        })
    }

    fn average_score(&self, meme_id: i64) -> f64 {
        let scores: Vec<f64> = self
            .ratings
            .iter()
            .filter(|r| r.meme_id == meme_id)
            .map(|r| f64::from(r.score.get()))
            .collect();
        if scores.is_empty() {
            return 0.0;
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        (mean * 100.0).round() / 100.0
    }
}

/// One store implementing every repository trait, with the same integrity
/// rules the database enforces.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            users: self.clone(),
            templates: self.clone(),
            memes: self.clone(),
            ratings: self.clone(),
        }
    }

    pub fn add_template(&self, name: &str, image_url: &str, top: &str, bottom: &str) -> MemeTemplate {
        let mut tables = self.lock();
        let template = MemeTemplate {
            id: tables.next_id(),
            name: name.to_string(),
            image_url: image_url.to_string(),
            default_top_text: top.to_string(),
            default_bottom_text: bottom.to_string(),
        };
        tables.templates.push(template.clone());
        template
    }

    /// A user whose password hash matches no password.
    pub fn add_user(&self, email: &str) -> User {
        let mut tables = self.lock();
        let user = User {
            id: tables.next_id(),
            email: email.to_string(),
            password_hash: "!".to_string(),
            is_staff: false,
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        user
    }

    pub fn add_meme(&self, template_id: i64, user_id: i64, top: &str, bottom: &str) -> i64 {
        let mut tables = self.lock();
        let id = tables.next_id();
        tables.memes.push(StoredMeme {
            id,
            template_id,
            top_text: top.to_string(),
            bottom_text: bottom.to_string(),
            created_by: user_id,
            image_key: None,
            created_at: Utc::now(),
        });
        id
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn meme_count(&self) -> usize {
        self.lock().memes.len()
    }

    pub fn rating_count(&self) -> usize {
        self.lock().ratings.len()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, RepoError> {
        let mut tables = self.lock();
        if tables.users.iter().any(|u| u.email == email) {
            return Err(RepoError::Conflict(format!("users.email '{}'", email)));
        }
        let user = User {
            id: tables.next_id(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_staff: false,
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }
}

#[async_trait]
impl TemplateRepository for InMemoryStore {
    async fn list_all(&self) -> Result<Vec<MemeTemplate>, RepoError> {
        Ok(self.lock().templates.clone())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<MemeTemplate>, RepoError> {
        Ok(self.lock().templates.iter().find(|t| t.id == id).cloned())
    }

    async fn list_in_random_order(&self) -> Result<Vec<MemeTemplate>, RepoError> {
        let mut templates = self.lock().templates.clone();
        templates.shuffle(&mut rand::thread_rng());
        Ok(templates)
    }
}

#[async_trait]
impl MemeRepository for InMemoryStore {
    async fn create(&self, meme: &NewMeme) -> Result<i64, RepoError> {
        let mut tables = self.lock();
        if !tables.templates.iter().any(|t| t.id == meme.template_id) {
            return Err(RepoError::NotFound(format!("Template {}", meme.template_id)));
        }
        if !tables.users.iter().any(|u| u.id == meme.created_by) {
            return Err(RepoError::NotFound(format!("User {}", meme.created_by)));
        }
        let id = tables.next_id();
        tables.memes.push(StoredMeme {
            id,
            template_id: meme.template_id,
            top_text: meme.top_text.clone(),
            bottom_text: meme.bottom_text.clone(),
            created_by: meme.created_by,
            image_key: meme.image_key.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn get_details(&self, id: i64) -> Result<Option<MemeDetails>, RepoError> {
        let tables = self.lock();
        Ok(tables.memes.iter().find(|m| m.id == id).and_then(|m| tables.details(m)))
    }

    async fn exists(&self, id: i64) -> Result<bool, RepoError> {
        Ok(self.lock().memes.iter().any(|m| m.id == id))
    }

    async fn list_page(&self, page: PageRequest) -> Result<(Vec<MemeDetails>, i64), RepoError> {
        let tables = self.lock();
        let items = tables
            .memes
            .iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .filter_map(|m| tables.details(m))
            .collect();
        Ok((items, tables.memes.len() as i64))
    }

    async fn random(&self) -> Result<Option<MemeDetails>, RepoError> {
        let tables = self.lock();
        Ok(tables
            .memes
            .choose(&mut rand::thread_rng())
            .and_then(|m| tables.details(m)))
    }

    async fn top_rated(&self, limit: i64) -> Result<Vec<RatedMeme>, RepoError> {
        let tables = self.lock();
        let mut rated: Vec<RatedMeme> = tables
            .memes
            .iter()
            .filter_map(|m| {
                tables.details(m).map(|meme| RatedMeme {
                    average_score: tables.average_score(m.id),
                    meme,
                })
            })
            .collect();
        rated.sort_by(|a, b| {
            b.average_score
                .total_cmp(&a.average_score)
                .then(a.meme.id.cmp(&b.meme.id))
        });
        rated.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rated)
    }
}

#[async_trait]
impl RatingRepository for InMemoryStore {
    async fn upsert(&self, meme_id: i64, user_id: i64, score: Score) -> Result<i64, RepoError> {
        let mut tables = self.lock();
        if !tables.memes.iter().any(|m| m.id == meme_id) {
            return Err(RepoError::NotFound(format!("Meme {}", meme_id)));
        }
        if !tables.users.iter().any(|u| u.id == user_id) {
            return Err(RepoError::NotFound(format!("User {}", user_id)));
        }
        if let Some(existing) = tables
            .ratings
            .iter_mut()
            .find(|r| r.meme_id == meme_id && r.user_id == user_id)
        {
            existing.score = score;
            return Ok(existing.id);
        }
        let id = tables.next_id();
        tables.ratings.push(Rating { id, meme_id, user_id, score, created_at: Utc::now() });
        Ok(id)
    }

    async fn find(&self, meme_id: i64, user_id: i64) -> Result<Option<Rating>, RepoError> {
        Ok(self
            .lock()
            .ratings
            .iter()
            .find(|r| r.meme_id == meme_id && r.user_id == user_id)
            .cloned())
    }
}

/// File storage that keeps uploads in a map.
pub struct InMemoryFileStorage {
    base_url: String,
    files: Mutex<HashMap<String, (Vec<u8>, Option<String>)>>,
}

impl InMemoryFileStorage {
    pub fn new(base_url: &str) -> Arc<Self> {
        Arc::new(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            files: Mutex::new(HashMap::new()),
        })
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.files.lock().ok()?.get(key).map(|(data, _)| data.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.files.lock().ok()?.get(key).and_then(|(_, ct)| ct.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FileStorage for InMemoryFileStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        self.files
            .lock()
            .map_err(|_| StorageError::UploadFailed("file map poisoned".to_string()))?
            .insert(key.to_string(), (data, content_type));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

/// Serves canned bodies by URL; anything else is unavailable.
#[derive(Default)]
pub struct StubImageFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    requested: Mutex<Vec<String>>,
}

impl StubImageFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: Vec<u8>) {
        if let Ok(mut bodies) = self.bodies.lock() {
            bodies.insert(url.to_string(), body);
        }
    }

    /// URLs fetched so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageFetcher for StubImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(url.to_string());
        }
        self.bodies
            .lock()
            .ok()
            .and_then(|bodies| bodies.get(url).cloned())
            .ok_or_else(|| FetchError::Unavailable(url.to_string(), "no stubbed body".to_string()))
    }
}

/// The full router wired to in-memory backends.
pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub storage: Arc<InMemoryFileStorage>,
    pub fetcher: Arc<StubImageFetcher>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: ServiceSettings) -> Self {
        let store = InMemoryStore::new();
        let storage = InMemoryFileStorage::new("http://media.test");
        let fetcher = StubImageFetcher::new();
        let state = Arc::new(AppState::new(
            store.repositories(),
            storage.clone(),
            fetcher.clone(),
            &settings,
        ));
        Self {
            router: create_router(state, None),
            store,
            storage,
            fetcher,
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

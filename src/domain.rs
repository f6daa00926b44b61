use crate::errors::{FetchError, RepoError, StorageError};
use crate::models::{MemeDetails, MemeTemplate, NewMeme, PageRequest, RatedMeme, Rating, Score, User};
use async_trait::async_trait;

/// Storage of user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Inserts a new user. A taken email yields `RepoError::Conflict`.
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, RepoError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>, RepoError>;
}

/// Read access to meme templates. Templates are seeded out-of-band.
#[async_trait]
pub trait TemplateRepository: Send + Sync + 'static {
    /// All templates ordered by id.
    async fn list_all(&self) -> Result<Vec<MemeTemplate>, RepoError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<MemeTemplate>, RepoError>;

    /// All templates, shuffled.
    async fn list_in_random_order(&self) -> Result<Vec<MemeTemplate>, RepoError>;
}

#[async_trait]
pub trait MemeRepository: Send + Sync + 'static {
    /// Inserts a meme and returns its id.
    /// A missing template or creator yields `RepoError::NotFound`.
    async fn create(&self, meme: &NewMeme) -> Result<i64, RepoError>;

    /// Retrieves a meme joined with its template and creator.
    /// Returns Ok(None) if the meme is not found.
    async fn get_details(&self, id: i64) -> Result<Option<MemeDetails>, RepoError>;

    async fn exists(&self, id: i64) -> Result<bool, RepoError>;

    /// One page of memes ordered by id, plus the total meme count.
    async fn list_page(&self, page: PageRequest) -> Result<(Vec<MemeDetails>, i64), RepoError>;

    /// A uniformly-ish random meme, or Ok(None) when the table is empty.
    async fn random(&self) -> Result<Option<MemeDetails>, RepoError>;

    /// Memes by descending average score, ties by ascending id.
    async fn top_rated(&self, limit: i64) -> Result<Vec<RatedMeme>, RepoError>;
}

#[async_trait]
pub trait RatingRepository: Send + Sync + 'static {
    /// Inserts the rating or overwrites the score of the existing
    /// (meme, user) rating. Returns the rating id.
    async fn upsert(&self, meme_id: i64, user_id: i64, score: Score) -> Result<i64, RepoError>;

    async fn find(&self, meme_id: i64, user_id: i64) -> Result<Option<Rating>, RepoError>;
}

/// Trait defining operations for storing file data (generated meme images).
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    /// Uploads file data to the storage backend.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError>;

    /// Public URL under which `key` is reachable.
    fn public_url(&self, key: &str) -> String;
}

/// Downloads template images from their source URL.
#[async_trait]
pub trait ImageFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

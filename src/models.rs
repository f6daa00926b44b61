use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

/// The `{id, email}` view of a user embedded in meme payloads.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MemeTemplate {
    pub id: i64,
    pub name: String,
    pub image_url: String,
    pub default_top_text: String,
    pub default_bottom_text: String,
}

/// A meme about to be inserted. Captions are already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeme {
    pub template_id: i64,
    pub top_text: String,
    pub bottom_text: String,
    pub created_by: i64,
    pub image_key: Option<String>,
}

/// A meme joined with its template and creator.
#[derive(Debug, Clone, PartialEq)]
pub struct MemeDetails {
    pub id: i64,
    pub template: MemeTemplate,
    pub top_text: String,
    pub bottom_text: String,
    pub created_by: UserSummary,
    pub created_at: DateTime<Utc>,
    pub image_key: Option<String>,
}

/// Leaderboard row. Memes without ratings carry an average of 0.
#[derive(Debug, Clone, PartialEq)]
pub struct RatedMeme {
    pub meme: MemeDetails,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rating {
    pub id: i64,
    pub meme_id: i64,
    pub user_id: i64,
    pub score: Score,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("score must be between 1 and 5, got {0}")]
pub struct InvalidScore(pub i64);

/// A rating score in the closed range 1..=5.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "i64", into = "i64")]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Score {
    type Error = InvalidScore;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(v) if (Self::MIN..=Self::MAX).contains(&v) => Ok(Score(v)),
            _ => Err(InvalidScore(value)),
        }
    }
}

impl From<Score> for i64 {
    fn from(score: Score) -> Self {
        i64::from(score.0)
    }
}

/// A 1-based page of results plus the total row count.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        i64::from(self.number) * i64::from(self.size) < self.total
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }
}

/// Offset/limit window for a page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        i64::from(self.number.saturating_sub(1)) * i64::from(self.size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

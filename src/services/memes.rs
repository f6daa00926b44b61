use crate::{
    domain::{MemeRepository, RatingRepository, TemplateRepository},
    errors::AppError,
    models::{MemeDetails, MemeTemplate, NewMeme, Page, PageRequest, RatedMeme, Score},
};
use std::sync::Arc;
use tracing::info;

/// Size of the leaderboard.
pub const TOP_MEMES_LIMIT: i64 = 10;

/// Uses `text` unless it is missing or only whitespace.
fn caption_or_default(text: Option<String>, default: &str) -> String {
    match text {
        Some(text) if !text.trim().is_empty() => text,
        _ => default.to_string(),
    }
}

/// Templates, memes and ratings as seen by the API.
#[derive(Clone)]
pub struct MemeService {
    templates: Arc<dyn TemplateRepository>,
    memes: Arc<dyn MemeRepository>,
    ratings: Arc<dyn RatingRepository>,
    page_size: u32,
}

impl MemeService {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        memes: Arc<dyn MemeRepository>,
        ratings: Arc<dyn RatingRepository>,
        page_size: u32,
    ) -> Self {
        Self { templates, memes, ratings, page_size }
    }

    pub async fn list_templates(&self) -> Result<Vec<MemeTemplate>, AppError> {
        Ok(self.templates.list_all().await?)
    }

    /// Creates a meme from a template, filling blank captions from the
    /// template defaults. Returns the new meme id.
    pub async fn create(
        &self,
        creator_id: i64,
        template_id: i64,
        top_text: Option<String>,
        bottom_text: Option<String>,
    ) -> Result<i64, AppError> {
        let template = self
            .templates
            .get_by_id(template_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Template {}", template_id)))?;

        let meme = NewMeme {
            template_id: template.id,
            top_text: caption_or_default(top_text, &template.default_top_text),
            bottom_text: caption_or_default(bottom_text, &template.default_bottom_text),
            created_by: creator_id,
            image_key: None,
        };
        // The insert is FK-guarded: a template deleted since the lookup
        // surfaces as NotFound and leaves no row behind.
        let meme_id = self.memes.create(&meme).await?;

        info!(meme_id, template_id, creator_id, "Meme created");
        Ok(meme_id)
    }

    /// Records `user_id`'s score for a meme, replacing any earlier score.
    /// Returns the rating id.
    pub async fn rate(&self, meme_id: i64, user_id: i64, score: Score) -> Result<i64, AppError> {
        if !self.memes.exists(meme_id).await? {
            return Err(AppError::NotFound(format!("Meme {}", meme_id)));
        }
        let rating_id = self.ratings.upsert(meme_id, user_id, score).await?;

        info!(rating_id, meme_id, user_id, score = score.get(), "Meme rated");
        Ok(rating_id)
    }

    pub async fn get(&self, meme_id: i64) -> Result<MemeDetails, AppError> {
        tracing::debug!(meme_id, "Fetching meme details");
        self.memes
            .get_details(meme_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Meme {}", meme_id)))
    }

    /// One page of memes. `page` is the raw query value; anything that is
    /// not a page number, or is past the last page, is NotFound.
    pub async fn list_page(&self, page: Option<&str>) -> Result<Page<MemeDetails>, AppError> {
        let number = match page {
            None => 1,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => return Err(AppError::NotFound(format!("Page '{}'", raw))),
            },
        };

        let request = PageRequest { number, size: self.page_size };
        let (items, total) = self.memes.list_page(request).await?;
        if items.is_empty() && number > 1 {
            return Err(AppError::NotFound(format!("Page {}", number)));
        }

        Ok(Page { items, number, size: self.page_size, total })
    }

    pub async fn random(&self) -> Result<MemeDetails, AppError> {
        self.memes
            .random()
            .await?
            .ok_or_else(|| AppError::NotFound("Meme".to_string()))
    }

    pub async fn top(&self) -> Result<Vec<RatedMeme>, AppError> {
        Ok(self.memes.top_rated(TOP_MEMES_LIMIT).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryStore;
    use rstest::rstest;

    struct Fixture {
        store: Arc<InMemoryStore>,
        service: MemeService,
        template: MemeTemplate,
        user_id: i64,
    }

    fn fixture(page_size: u32) -> Fixture {
        let store = InMemoryStore::new();
        let repos = store.repositories();
        let template = store.add_template("Drake", "https://img.example/drake.jpg", "Default top", "Default bottom");
        let user_id = store.add_user("creator@example.com").id;
        Fixture {
            service: MemeService::new(repos.templates, repos.memes, repos.ratings, page_size),
            store,
            template,
            user_id,
        }
    }

    fn score(raw: i64) -> Score {
        Score::try_from(raw).unwrap()
    }

    #[rstest]
    #[case(None, None, "Default top", "Default bottom")]
    #[case(Some(""), Some("   "), "Default top", "Default bottom")]
    #[case(Some("Mine"), None, "Mine", "Default bottom")]
    #[case(None, Some("Also mine"), "Default top", "Also mine")]
    #[case(Some("A"), Some("B"), "A", "B")]
    #[tokio::test]
    async fn blank_captions_fall_back_to_template_defaults(
        #[case] top: Option<&str>,
        #[case] bottom: Option<&str>,
        #[case] expected_top: &str,
        #[case] expected_bottom: &str,
    ) {
        let f = fixture(10);
        let id = f
            .service
            .create(f.user_id, f.template.id, top.map(String::from), bottom.map(String::from))
            .await
            .unwrap();

        let meme = f.service.get(id).await.unwrap();
        assert_eq!(meme.top_text, expected_top);
        assert_eq!(meme.bottom_text, expected_bottom);
        assert_eq!(meme.template, f.template);
        assert_eq!(meme.created_by.id, f.user_id);
    }

    #[tokio::test]
    async fn creating_from_missing_template_is_not_found() {
        let f = fixture(10);
        let err = f.service.create(f.user_id, 999, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(f.store.meme_count(), 0);
    }

    #[rstest]
    #[case(1)]
    #[case(999)]
    #[case(-5)]
    #[tokio::test]
    async fn missing_meme_is_always_not_found(#[case] id: i64) {
        let f = fixture(10);
        assert!(matches!(f.service.get(id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn rating_twice_keeps_one_row_with_latest_score() {
        let f = fixture(10);
        let meme_id = f.store.add_meme(f.template.id, f.user_id, "t", "b");

        let first = f.service.rate(meme_id, f.user_id, score(2)).await.unwrap();
        let second = f.service.rate(meme_id, f.user_id, score(5)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.store.rating_count(), 1);
        let stored = f.store.repositories().ratings.find(meme_id, f.user_id).await.unwrap().unwrap();
        assert_eq!(stored.score, score(5));
    }

    #[tokio::test]
    async fn rating_a_missing_meme_is_not_found() {
        let f = fixture(10);
        assert!(matches!(f.service.rate(42, f.user_id, score(3)).await, Err(AppError::NotFound(_))));
        assert_eq!(f.store.rating_count(), 0);
    }

    #[tokio::test]
    async fn random_on_empty_table_is_not_found() {
        let f = fixture(10);
        assert!(matches!(f.service.random().await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn random_returns_an_existing_meme() {
        let f = fixture(10);
        let ids: Vec<i64> = (0..5).map(|i| f.store.add_meme(f.template.id, f.user_id, &format!("t{}", i), "b")).collect();

        for _ in 0..20 {
            let meme = f.service.random().await.unwrap();
            assert!(ids.contains(&meme.id));
        }
    }

    #[tokio::test]
    async fn top_is_sorted_capped_and_counts_unrated_as_zero() {
        let f = fixture(10);
        let raters: Vec<i64> = (0..3).map(|i| f.store.add_user(&format!("r{}@example.com", i)).id).collect();
        let memes: Vec<i64> = (0..12).map(|i| f.store.add_meme(f.template.id, f.user_id, &format!("m{}", i), "b")).collect();

        // memes[3]: 5, 4 -> 4.5; memes[7]: 5 -> 5.0; memes[1]: 1, 2, 2 -> 1.67
        f.service.rate(memes[3], raters[0], score(5)).await.unwrap();
        f.service.rate(memes[3], raters[1], score(4)).await.unwrap();
        f.service.rate(memes[7], raters[0], score(5)).await.unwrap();
        for (rater, s) in raters.iter().zip([1, 2, 2]) {
            f.service.rate(memes[1], *rater, score(s)).await.unwrap();
        }

        let top = f.service.top().await.unwrap();
        assert_eq!(top.len(), TOP_MEMES_LIMIT as usize);
        assert_eq!(top[0].meme.id, memes[7]);
        assert_eq!(top[0].average_score, 5.0);
        assert_eq!(top[1].meme.id, memes[3]);
        assert_eq!(top[1].average_score, 4.5);
        assert_eq!(top[2].meme.id, memes[1]);
        assert_eq!(top[2].average_score, 1.67);

        // Unrated memes tie at zero and are ordered by id.
        let rest: Vec<i64> = top[3..].iter().map(|r| r.meme.id).collect();
        assert_eq!(rest, vec![memes[0], memes[2], memes[4], memes[5], memes[6], memes[8], memes[9]]);
        assert!(top[3..].iter().all(|r| r.average_score == 0.0));
    }

    #[tokio::test]
    async fn pages_are_sized_and_bounded() {
        let f = fixture(2);
        for i in 0..5 {
            f.store.add_meme(f.template.id, f.user_id, &format!("m{}", i), "b");
        }

        let first = f.service.list_page(None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total, 5);
        assert!(first.has_next());

        let last = f.service.list_page(Some("3")).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_next());

        for bad in ["4", "0", "-1", "abc"] {
            assert!(matches!(f.service.list_page(Some(bad)).await, Err(AppError::NotFound(_))), "page {}", bad);
        }
    }

    #[tokio::test]
    async fn first_page_of_empty_table_is_empty_not_missing() {
        let f = fixture(10);
        let page = f.service.list_page(Some("1")).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
    }
}

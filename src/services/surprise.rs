use crate::{
    compose::{compose_meme, decode_template},
    domain::{FileStorage, ImageFetcher, MemeRepository, TemplateRepository},
    errors::AppError,
    models::{MemeTemplate, NewMeme},
};
use image::DynamicImage;
use rand::{seq::SliceRandom, Rng};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const TOP_CAPTIONS: [&str; 10] = [
    "When you finally finish your work…",
    "Me trying to explain why…",
    "When you see your friends making plans without you…",
    "That feeling when you’re about to relax…",
    "Me walking into the room like…",
    "When you're about to say something smart…",
    "When you know the answer but the teacher calls on someone else…",
    "Me when I realize I forgot something important…",
    "When you're trying to be productive but…",
    "That moment when you think everything is going well…",
];

pub const BOTTOM_CAPTIONS: [&str; 10] = [
    "…and your boss gives you another task.",
    "…but no one is listening.",
    "…but you weren't invited.",
    "…and your phone rings.",
    "…like I own the place.",
    "…and you mess it up completely.",
    "…and they say the exact thing you were about to say.",
    "…and it's already too late.",
    "…but end up binge-watching Netflix instead.",
    "…and then everything goes horribly wrong.",
];

fn pick_captions<R: Rng + ?Sized>(rng: &mut R) -> (&'static str, &'static str) {
    let top = TOP_CAPTIONS.choose(rng).copied().unwrap_or_default();
    let bottom = BOTTOM_CAPTIONS.choose(rng).copied().unwrap_or_default();
    (top, bottom)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurpriseMeme {
    pub meme_id: i64,
    pub url: String,
}

/// Builds a meme from random captions and the first template whose image
/// can be downloaded.
#[derive(Clone)]
pub struct SurpriseService {
    templates: Arc<dyn TemplateRepository>,
    memes: Arc<dyn MemeRepository>,
    fetcher: Arc<dyn ImageFetcher>,
    storage: Arc<dyn FileStorage>,
}

impl SurpriseService {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        memes: Arc<dyn MemeRepository>,
        fetcher: Arc<dyn ImageFetcher>,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        Self { templates, memes, fetcher, storage }
    }

    pub async fn generate(&self, creator_id: i64) -> Result<SurpriseMeme, AppError> {
        let (top_text, bottom_text) = pick_captions(&mut rand::thread_rng());

        let candidates = self.templates.list_in_random_order().await?;
        let (template, image) = self
            .first_usable_template(candidates)
            .await
            .ok_or_else(|| AppError::NotFound("Usable template image".to_string()))?;

        let jpeg = tokio::task::spawn_blocking(move || compose_meme(&image, top_text, bottom_text))
            .await
            .map_err(|e| AppError::InternalServerError(format!("compositing task failed: {}", e)))??;

        // Upload before insert: a failure up to here leaves no meme row.
        let image_key = format!("memes/{}.jpg", Uuid::new_v4());
        self.storage
            .upload(&image_key, jpeg, Some("image/jpeg".to_string()))
            .await?;

        let meme_id = self
            .memes
            .create(&NewMeme {
                template_id: template.id,
                top_text: top_text.to_string(),
                bottom_text: bottom_text.to_string(),
                created_by: creator_id,
                image_key: Some(image_key.clone()),
            })
            .await?;

        info!(meme_id, template_id = template.id, %image_key, "Surprise meme generated");
        Ok(SurpriseMeme {
            meme_id,
            url: self.storage.public_url(&image_key),
        })
    }

    /// Tries each template in turn; download or decode failures move on to
    /// the next candidate.
    async fn first_usable_template(&self, candidates: Vec<MemeTemplate>) -> Option<(MemeTemplate, DynamicImage)> {
        for template in candidates {
            let bytes = match self.fetcher.fetch(&template.image_url).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(template_id = template.id, error = %e, "Template image unavailable, trying next");
                    continue;
                }
            };
            match decode_template(&bytes) {
                Ok(image) => return Some((template, image)),
                Err(e) => warn!(template_id = template.id, error = %e, "Template image unreadable, trying next"),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{png_bytes, InMemoryFileStorage, InMemoryStore, StubImageFetcher};

    struct Fixture {
        store: Arc<InMemoryStore>,
        storage: Arc<InMemoryFileStorage>,
        fetcher: Arc<StubImageFetcher>,
        service: SurpriseService,
        user_id: i64,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let storage = InMemoryFileStorage::new("https://media.example");
        let fetcher = StubImageFetcher::new();
        let repos = store.repositories();
        let user_id = store.add_user("me@example.com").id;
        Fixture {
            service: SurpriseService::new(repos.templates, repos.memes, fetcher.clone(), storage.clone()),
            store,
            storage,
            fetcher,
            user_id,
        }
    }

    #[test]
    fn captions_come_from_the_pools() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let (top, bottom) = pick_captions(&mut rng);
            assert!(TOP_CAPTIONS.contains(&top));
            assert!(BOTTOM_CAPTIONS.contains(&bottom));
        }
    }

    #[tokio::test]
    async fn no_templates_is_not_found() {
        let f = fixture();
        assert!(matches!(f.service.generate(f.user_id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn all_images_failing_is_not_found_and_stores_nothing() {
        let f = fixture();
        f.store.add_template("a", "https://img.example/a.jpg", "", "");
        let b = f.store.add_template("b", "https://img.example/b.jpg", "", "");
        f.fetcher.serve(&b.image_url, b"not an image".to_vec());

        assert!(matches!(f.service.generate(f.user_id).await, Err(AppError::NotFound(_))));
        assert_eq!(f.fetcher.requested().len(), 2);
        assert_eq!(f.store.meme_count(), 0);
        assert!(f.storage.keys().is_empty());
    }

    #[tokio::test]
    async fn failing_templates_are_skipped() {
        let f = fixture();
        f.store.add_template("broken", "https://img.example/broken.jpg", "", "");
        let good = f.store.add_template("good", "https://img.example/good.png", "", "");
        f.store.add_template("also broken", "https://img.example/gone.jpg", "", "");
        f.fetcher.serve(&good.image_url, png_bytes(120, 80));

        let surprise = f.service.generate(f.user_id).await.unwrap();

        let meme = f.store.repositories().memes.get_details(surprise.meme_id).await.unwrap().unwrap();
        assert_eq!(meme.template.id, good.id);
        assert_eq!(meme.created_by.id, f.user_id);
        assert!(TOP_CAPTIONS.contains(&meme.top_text.as_str()));
        assert!(BOTTOM_CAPTIONS.contains(&meme.bottom_text.as_str()));

        let key = meme.image_key.expect("generated meme keeps its image key");
        assert_eq!(surprise.url, format!("https://media.example/{}", key));
        let stored = f.storage.get(&key).expect("image was uploaded");
        let decoded = image::load_from_memory(&stored).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 80));
    }
}

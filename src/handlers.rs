use crate::{
    dto::{
        AccessTokenResponse, CreateMemeRequest, CreatedMemeResponse, CreatedRatingResponse, HealthResponse,
        MemeResponse, PageResponse, RateMemeRequest, RatedMemeResponse, RefreshRequest, RegisterRequest,
        SurpriseResponse, TokenRequest,
    },
    errors::AppError,
    extract::{AuthUser, ValidatedJson},
    models::MemeTemplate,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing;

/// Path ids that are not integers name no meme at all.
fn parse_meme_id(raw: &str) -> Result<i64, AppError> {
    raw.parse::<i64>()
        .map_err(|_| AppError::NotFound(format!("Meme '{}'", raw)))
}

/// Absolute URL of `path` as the client addressed us, or `path` itself when
/// the request carries no `Host`.
fn absolute_url(headers: &HeaderMap, path: &str) -> String {
    let Some(host) = headers.get(header::HOST).and_then(|value| value.to_str().ok()) else {
        return path.to_string();
    };
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .filter(|proto| matches!(*proto, "http" | "https"))
        .unwrap_or("http");
    format!("{}://{}{}", scheme, host, path)
}

#[derive(Deserialize, Debug)]
pub struct PageQuery {
    page: Option<String>,
}

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> Result<StatusCode, AppError> {
    state.accounts.register(&request.email, &request.password_1).await?;
    Ok(StatusCode::CREATED)
}

pub async fn obtain_token(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<TokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = state.accounts.obtain_tokens(&request.email, &request.password).await?;
    Ok(Json(pair))
}

pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let access = state.accounts.refresh_access_token(&request.refresh)?;
    Ok(Json(AccessTokenResponse { access }))
}

pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
) -> Result<Json<Vec<MemeTemplate>>, AppError> {
    let templates = state.memes.list_templates().await?;
    tracing::debug!("Listing {} templates", templates.len());
    Ok(Json(templates))
}

pub async fn list_memes(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = state.memes.list_page(query.page.as_deref()).await?;
    let storage = state.file_storage.as_ref();
    let base = absolute_url(&headers, "/memes");
    Ok(Json(PageResponse::new(page, &base, |meme| MemeResponse::new(meme, storage))))
}

pub async fn create_meme(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    ValidatedJson(request): ValidatedJson<CreateMemeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let meme_id = state
        .memes
        .create(user.id, request.template_id, request.top_text, request.bottom_text)
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedMemeResponse { meme_id })))
}

pub async fn get_meme(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let meme_id = parse_meme_id(&id_str)?;
    let meme = state.memes.get(meme_id).await?;
    Ok(Json(MemeResponse::new(meme, state.file_storage.as_ref())))
}

pub async fn rate_meme(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id_str): Path<String>,
    ValidatedJson(request): ValidatedJson<RateMemeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let meme_id = parse_meme_id(&id_str)?;
    let rating_id = state.memes.rate(meme_id, user.id, request.score).await?;
    Ok((StatusCode::CREATED, Json(CreatedRatingResponse { rating_id })))
}

pub async fn random_meme(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let meme = state.memes.random().await?;
    tracing::debug!(meme_id = meme.id, "Picked random meme");
    Ok(Json(MemeResponse::new(meme, state.file_storage.as_ref())))
}

pub async fn top_memes(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
) -> Result<Json<Vec<RatedMemeResponse>>, AppError> {
    let top = state.memes.top().await?;
    Ok(Json(top.into_iter().map(RatedMemeResponse::from).collect()))
}

pub async fn surprise_me(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let surprise = state.surprise.generate(user.id).await?;
    Ok(Json(SurpriseResponse { url: surprise.url }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rstest::rstest;

    #[rstest]
    #[case(None, None, "/memes")]
    #[case(Some("api.example.com"), None, "http://api.example.com/memes")]
    #[case(Some("localhost:8000"), Some("https"), "https://localhost:8000/memes")]
    #[case(Some("localhost:8000"), Some("gopher"), "http://localhost:8000/memes")]
    fn page_links_follow_the_request_host(
        #[case] host: Option<&'static str>,
        #[case] proto: Option<&'static str>,
        #[case] expected: &str,
    ) {
        let mut headers = HeaderMap::new();
        if let Some(host) = host {
            headers.insert(header::HOST, HeaderValue::from_static(host));
        }
        if let Some(proto) = proto {
            headers.insert("x-forwarded-proto", HeaderValue::from_static(proto));
        }
        assert_eq!(absolute_url(&headers, "/memes"), expected);
    }

    #[rstest]
    #[case("42", Some(42))]
    #[case("abc", None)]
    #[case("", None)]
    fn meme_ids(#[case] raw: &str, #[case] id: Option<i64>) {
        match (parse_meme_id(raw), id) {
            (Ok(parsed), Some(id)) => assert_eq!(parsed, id),
            (Err(AppError::NotFound(_)), None) => {}
            (other, _) => panic!("unexpected result for {:?}: {:?}", raw, other),
        }
    }
}

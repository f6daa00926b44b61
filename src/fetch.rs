use crate::{domain::ImageFetcher, errors::FetchError};
use async_trait::async_trait;
use std::time::Duration;

/// Fetches template images over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    /// Without a timeout a stalled host stalls the request that asked for it.
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self { client: builder.build()? })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request_failed = |source| FetchError::Request { url: url.to_string(), source };

        tracing::debug!(%url, "Fetching template image");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(request_failed)?;
        let body = response.bytes().await.map_err(request_failed)?;

        if body.is_empty() {
            return Err(FetchError::EmptyBody(url.to_string()));
        }
        tracing::debug!(%url, bytes = body.len(), "Fetched template image");
        Ok(body.to_vec())
    }
}

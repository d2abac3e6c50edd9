//! # TMDB API Client
//!
//! Turns a favorite title into a concrete backdrop image URL using The Movie
//! Database (TMDB) API.
//!
//! ## API Endpoints
//! Two endpoints are used, both keyed with the `api_key` query parameter:
//! ```text
//! https://api.themoviedb.org/3/search/<movie|tv>?api_key=<key>&query=<title>
//! https://api.themoviedb.org/3/<movie|tv>/<id>/images?api_key=<key>
//! ```
//!
//! ## Image URLs
//! The images endpoint returns partial paths that need
//! `https://image.tmdb.org/t/p/original` prepended.
//!
//! ## Matching Rules
//! - The first search result wins; there is no scoring or disambiguation.
//! - Only textless (`iso_639_1` is null) 16:9 backdrops are wallpaper material.
//!   One of them is picked at random, so the same title can come back with a
//!   different image next time.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

use crate::cache::ImageFetcher;
use crate::error::ChangeError;
use crate::favorites::MediaType;

/// Base URL for the TMDB v3 API.
const TMDB_API_URL: &str = "https://api.themoviedb.org/3";

/// Base URL for TMDB image downloads, including the "original" size segment.
const TMDB_IMAGE_URL: &str = "https://image.tmdb.org/t/p/original";

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Aspect ratio a backdrop must round to (two decimals) to count as 16:9
const WIDESCREEN_RATIO: &str = "1.78";

/// One entry of a search response. Only the id is needed.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// An image descriptor as returned by the images endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageDescriptor {
    /// Partial path (needs [`TMDB_IMAGE_URL`] prepended)
    pub file_path: String,
    pub width: u32,
    pub height: u32,
    /// Language of any text in the image; `None` means textless
    #[serde(rename = "iso_639_1")]
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    backdrops: Vec<ImageDescriptor>,
}

/// The TMDB entity a title resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub media_id: u64,
    pub media_type: MediaType,
}

/// A backdrop picked for use as a wallpaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Full download URL
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// The two lookups the resolver needs from a media-metadata service.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Text search scoped to one media type, in the service's ranking order.
    async fn search(&self, title: &str, media_type: MediaType, api_key: &str) -> Result<Vec<SearchHit>, ChangeError>;

    /// All backdrop descriptors for one entity.
    async fn backdrops(&self, media: ResolvedMedia, api_key: &str) -> Result<Vec<ImageDescriptor>, ChangeError>;

    /// Full download URL for a descriptor's partial path.
    fn image_url(&self, file_path: &str) -> String {
        format!("{TMDB_IMAGE_URL}{file_path}")
    }
}

/// Finds the TMDB entity for a title: the first search result, as-is.
pub async fn resolve(
    catalog: &dyn MediaCatalog,
    title: &str,
    media_type: MediaType,
    api_key: &str,
) -> Result<ResolvedMedia, ChangeError> {
    let results = catalog.search(title, media_type, api_key).await?;
    tracing::debug!(title, %media_type, count = results.len(), "search results");

    results
        .first()
        .map(|hit| ResolvedMedia { media_id: hit.id, media_type })
        .ok_or_else(|| ChangeError::NotFound(format!("No results found for: {title} ({media_type})")))
}

/// True for textless backdrops whose width/height rounds to 1.78.
///
/// Rounding goes through the decimal formatter, which rounds the exact binary
/// value: 1420x800 (1.775 on paper, just below it as an `f64`) gives 1.77.
pub fn is_wallpaper_backdrop(image: &ImageDescriptor) -> bool {
    if image.language.is_some() || image.height == 0 {
        return false;
    }
    let ratio = f64::from(image.width) / f64::from(image.height);
    format!("{ratio:.2}") == WIDESCREEN_RATIO
}

/// Picks a random qualifying backdrop for a resolved entity.
pub async fn select_image<R: Rng + ?Sized + Send>(
    catalog: &dyn MediaCatalog,
    media: ResolvedMedia,
    api_key: &str,
    rng: &mut R,
) -> Result<ImageReference, ChangeError> {
    let images = catalog.backdrops(media, api_key).await?;
    let candidates: Vec<&ImageDescriptor> = images.iter().filter(|img| is_wallpaper_backdrop(img)).collect();
    tracing::debug!(media_id = media.media_id, total = images.len(), usable = candidates.len(), "backdrops");

    candidates
        .choose(rng)
        .map(|img| ImageReference {
            url: catalog.image_url(&img.file_path),
            width: img.width,
            height: img.height,
        })
        .ok_or_else(|| ChangeError::NotFound(format!("No suitable backdrops found for media ID: {}", media.media_id)))
}

/// HTTP client for TMDB. Serves both the metadata lookups and image downloads.
#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: reqwest::Client,
    api_url: String,
}

impl TmdbClient {
    /// Creates a client with the standard timeout against the public API.
    pub fn new() -> Result<Self, ChangeError> {
        Self::with_api_url(TMDB_API_URL)
    }

    /// Creates a client against a different API base (a proxy or a test server).
    pub fn with_api_url(api_url: impl Into<String>) -> Result<Self, ChangeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ChangeError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ChangeError> {
        tracing::debug!(url, "GET");
        let response = self.client.get(url).query(query).send().await?.error_for_status()?;
        response
            .json()
            .await
            .map_err(|e| ChangeError::Network(format!("failed to parse TMDB response: {e}")))
    }
}

#[async_trait]
impl MediaCatalog for TmdbClient {
    async fn search(&self, title: &str, media_type: MediaType, api_key: &str) -> Result<Vec<SearchHit>, ChangeError> {
        let url = format!("{}/search/{}", self.api_url, media_type);
        let response: SearchResponse = self
            .get_json(&url, &[("api_key", api_key), ("query", title)])
            .await?;
        Ok(response.results)
    }

    async fn backdrops(&self, media: ResolvedMedia, api_key: &str) -> Result<Vec<ImageDescriptor>, ChangeError> {
        let url = format!("{}/{}/{}/images", self.api_url, media.media_type, media.media_id);
        let response: ImagesResponse = self.get_json(&url, &[("api_key", api_key)]).await?;
        Ok(response.backdrops)
    }
}

#[async_trait]
impl ImageFetcher for TmdbClient {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ChangeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ChangeError::Io(format!("failed to download image: {e}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ChangeError::Io(format!("failed to read image data: {e}")))?;
        Ok(bytes.to_vec())
    }
}

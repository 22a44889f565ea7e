use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::genres::{genre_name, language_name};
use crate::models::{
    CastMember, MovieDetails, MovieId, MovieSummary, Provider, Trailer, WatchProviders,
};
use crate::offline_cache::{CachedResponse, Destination, ResponseCache};

pub const IMAGE_SIZES: &[&str] = &["w92", "w185", "w200", "w300", "w500", "w780", "original"];
const MAX_CAST: usize = 8;

/// One remote feed of movie result pages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MovieQuery {
    Trending,
    Discover {
        genre: Option<u32>,
        language: Option<String>,
    },
    Search {
        query: String,
    },
    NowPlaying {
        language: Option<String>,
    },
}

impl MovieQuery {
    pub fn endpoint(&self, page: u32) -> String {
        match self {
            MovieQuery::Trending => format!("/trending/movie/week?page={page}"),
            MovieQuery::Discover { genre, language } => {
                let mut parts = vec![
                    format!("page={page}"),
                    "include_adult=false".to_string(),
                    "sort_by=popularity.desc".to_string(),
                ];
                if let Some(lang) = language {
                    parts.push(format!("with_original_language={lang}"));
                }
                if let Some(genre) = genre {
                    parts.push(format!("with_genres={genre}"));
                }
                format!("/discover/movie?{}", parts.join("&"))
            }
            MovieQuery::Search { query } => format!(
                "/search/movie?query={}&page={page}",
                urlencoding::encode(query)
            ),
            MovieQuery::NowPlaying { language } => format!(
                "/movie/now_playing?language={}&page={page}",
                language.as_deref().unwrap_or("en")
            ),
        }
    }
}

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn movie_page(&self, query: &MovieQuery, page: u32) -> Result<Vec<RawMovie>>;
    async fn movie_details(&self, id: MovieId) -> Result<MovieDetails>;
    async fn recommendations(&self, id: MovieId) -> Result<Vec<RawMovie>>;
    async fn similar(&self, id: MovieId) -> Result<Vec<RawMovie>>;
    async fn watch_providers(&self, id: MovieId, region: &str) -> Result<WatchProviders>;
    async fn image(&self, size: &str, path: &str) -> Result<CachedResponse>;
}

/// A result item as the API returns it. Only `id` is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMovie {
    pub id: MovieId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<u32>,
    #[serde(default)]
    pub original_language: Option<String>,
}

impl RawMovie {
    /// Returns `None` for items without a usable title.
    pub fn into_summary(self) -> Option<MovieSummary> {
        let title = non_empty(self.title).or_else(|| non_empty(self.name))?;
        Some(MovieSummary {
            id: self.id,
            title,
            original_title: non_empty(self.original_title),
            poster_path: non_empty(self.poster_path),
            backdrop_path: non_empty(self.backdrop_path),
            rating: rating(self.vote_average),
            release_date: non_empty(self.release_date).or_else(|| non_empty(self.first_air_date)),
            genres: self
                .genre_ids
                .iter()
                .filter_map(|id| genre_name(*id))
                .map(str::to_string)
                .collect(),
            original_language: non_empty(self.original_language),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    api_base: String,
    image_base: String,
    cache: Arc<ResponseCache>,
}

impl TmdbClient {
    pub fn new(config: &Config, cache: Arc<ResponseCache>) -> Result<Self> {
        let user_agent = format!("goldenscreen/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        Ok(Self {
            client,
            api_key: config.tmdb_api_key.clone(),
            api_base: config.tmdb_api_base.clone(),
            image_base: config.tmdb_image_base.clone(),
            cache,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        with_api_key(&self.api_base, endpoint, &self.api_key)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.url(endpoint);
        let client = self.client.clone();
        let request_url = url.clone();
        let response = self
            .cache
            .fetch(&url, Destination::Fetch, move || {
                fetch_response(client, request_url)
            })
            .await
            .with_context(|| format!("{endpoint} unavailable"))?;
        if !response.is_success() {
            let text = String::from_utf8_lossy(&response.body);
            return Err(anyhow!(
                "{} -> {} {}",
                endpoint,
                response.status,
                text.chars().take(200).collect::<String>()
            ));
        }
        let parsed: T = serde_json::from_slice(&response.body).context("JSON parse failed")?;
        Ok(parsed)
    }

    async fn get_results(&self, endpoint: &str) -> Result<Vec<RawMovie>> {
        let page: ResultsPage = self.get_json(endpoint).await?;
        Ok(page.into_movies())
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn movie_page(&self, query: &MovieQuery, page: u32) -> Result<Vec<RawMovie>> {
        self.get_results(&query.endpoint(page)).await
    }

    async fn movie_details(&self, id: MovieId) -> Result<MovieDetails> {
        let detail: MovieDetail = self
            .get_json(&format!("/movie/{id}?append_to_response=credits,videos"))
            .await?;
        map_details(detail)
    }

    async fn recommendations(&self, id: MovieId) -> Result<Vec<RawMovie>> {
        self.get_results(&format!("/movie/{id}/recommendations?page=1"))
            .await
    }

    async fn similar(&self, id: MovieId) -> Result<Vec<RawMovie>> {
        self.get_results(&format!("/movie/{id}/similar?page=1")).await
    }

    async fn watch_providers(&self, id: MovieId, region: &str) -> Result<WatchProviders> {
        let payload: ProvidersResponse = self
            .get_json(&format!("/movie/{id}/watch/providers"))
            .await?;
        Ok(providers_for_region(payload, region))
    }

    async fn image(&self, size: &str, path: &str) -> Result<CachedResponse> {
        if !is_valid_image_request(size, path) {
            bail!("invalid image request {size}{path}");
        }
        let url = format!("{}/{}{}", self.image_base, size, path);
        let client = self.client.clone();
        let request_url = url.clone();
        let response = self
            .cache
            .fetch(&url, Destination::Image, move || {
                fetch_response(client, request_url)
            })
            .await?;
        if !response.is_success() {
            bail!("image {size}{path} -> {}", response.status);
        }
        Ok(response)
    }
}

async fn fetch_response(client: Client, url: String) -> Result<CachedResponse> {
    let res = client
        .get(&url)
        .send()
        .await
        .map_err(reqwest::Error::without_url)
        .context("request failed")?;
    let status = res.status().as_u16();
    let content_type = res
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = res
        .bytes()
        .await
        .map_err(reqwest::Error::without_url)
        .context("reading body failed")?;
    Ok(CachedResponse::new(status, content_type, body.to_vec()))
}

pub fn with_api_key(base: &str, endpoint: &str, api_key: &str) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{base}{endpoint}{separator}api_key={api_key}")
}

/// Poster sizes are fixed and the path must be a single file name.
pub fn is_valid_image_request(size: &str, path: &str) -> bool {
    let Some(file) = path.strip_prefix('/') else {
        return false;
    };
    IMAGE_SIZES.contains(&size)
        && !file.is_empty()
        && !file.starts_with('.')
        && file
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[derive(Debug, Deserialize)]
struct ResultsPage {
    #[serde(default)]
    results: Vec<Value>,
}

impl ResultsPage {
    fn into_movies(self) -> Vec<RawMovie> {
        self.results
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<RawMovie>(item) {
                Ok(movie) => Some(movie),
                Err(e) => {
                    debug!("Dropping malformed result item: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct Genre {
    id: u32,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MovieDetail {
    id: MovieId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    original_title: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    runtime: Option<u32>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    vote_average: Option<f64>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    backdrop_path: Option<String>,
    #[serde(default)]
    original_language: Option<String>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    credits: Option<Credits>,
    #[serde(default)]
    videos: Option<Videos>,
}

#[derive(Debug, Deserialize)]
struct Credits {
    #[serde(default)]
    cast: Vec<CastEntry>,
}

#[derive(Debug, Deserialize)]
struct CastEntry {
    name: String,
    #[serde(default)]
    character: Option<String>,
    #[serde(default)]
    profile_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Videos {
    #[serde(default)]
    results: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    site: String,
    #[serde(rename = "type")]
    video_type: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct ProvidersResponse {
    #[serde(default)]
    results: HashMap<String, RegionProviders>,
}

#[derive(Debug, Deserialize)]
struct RegionProviders {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    flatrate: Vec<ProviderEntry>,
    #[serde(default)]
    rent: Vec<ProviderEntry>,
    #[serde(default)]
    buy: Vec<ProviderEntry>,
}

#[derive(Debug, Deserialize)]
struct ProviderEntry {
    provider_name: String,
    #[serde(default)]
    logo_path: Option<String>,
}

fn map_details(detail: MovieDetail) -> Result<MovieDetails> {
    let title = non_empty(detail.title)
        .ok_or_else(|| anyhow!("movie {} has no title", detail.id))?;
    let genres = detail
        .genres
        .into_iter()
        .filter_map(|g| genre_name(g.id).map(str::to_string).or(g.name))
        .collect();
    let cast = detail
        .credits
        .map(|c| c.cast)
        .unwrap_or_default()
        .into_iter()
        .take(MAX_CAST)
        .map(|c| CastMember {
            name: c.name,
            character: non_empty(c.character),
            profile_path: non_empty(c.profile_path),
        })
        .collect();
    let trailer = detail.videos.as_ref().and_then(select_trailer);
    let original_language = non_empty(detail.original_language);

    Ok(MovieDetails {
        summary: MovieSummary {
            id: detail.id,
            title,
            original_title: non_empty(detail.original_title),
            poster_path: non_empty(detail.poster_path),
            backdrop_path: non_empty(detail.backdrop_path),
            rating: rating(detail.vote_average),
            release_date: non_empty(detail.release_date),
            genres,
            original_language: original_language.clone(),
        },
        overview: non_empty(detail.overview),
        runtime_minutes: detail.runtime.filter(|r| *r > 0),
        language: original_language.as_deref().map(language_name),
        cast,
        trailer,
    })
}

fn select_trailer(videos: &Videos) -> Option<Trailer> {
    videos
        .results
        .iter()
        .find(|v| v.site.eq_ignore_ascii_case("YouTube") && v.video_type == "Trailer")
        .or_else(|| {
            videos
                .results
                .iter()
                .find(|v| v.site.eq_ignore_ascii_case("YouTube") && v.video_type == "Teaser")
        })
        .map(|v| Trailer {
            key: v.key.clone(),
            url: format!("https://www.youtube.com/watch?v={}", v.key),
            embed_url: format!("https://www.youtube.com/embed/{}", v.key),
        })
}

fn providers_for_region(payload: ProvidersResponse, region: &str) -> WatchProviders {
    let region = region.to_uppercase();
    let mut results = payload.results;
    let Some(entry) = results.remove(&region) else {
        return WatchProviders {
            region,
            ..WatchProviders::default()
        };
    };
    let convert = |list: Vec<ProviderEntry>| {
        list.into_iter()
            .map(|p| Provider {
                name: p.provider_name,
                logo_path: non_empty(p.logo_path),
            })
            .collect::<Vec<_>>()
    };
    WatchProviders {
        region,
        link: non_empty(entry.link),
        flatrate: convert(entry.flatrate),
        rent: convert(entry.rent),
        buy: convert(entry.buy),
    }
}

fn rating(vote_average: Option<f64>) -> Option<f32> {
    vote_average
        .filter(|r| (0.0..=10.0).contains(r))
        .map(|r| r as f32)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

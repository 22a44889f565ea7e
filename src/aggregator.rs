//! Multi-page fetch, de-duplication and the fallback cascade used to build movie lists.
//!
//! An aggregation pass fans out one request per page, waits for all of them, merges the
//! pages by movie id and, when a filtered query comes back empty, retries with looser
//! queries. Remote failures never escape: a failed page counts as an empty page.
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{FilterConfig, MovieId, MovieSummary};
use crate::tmdb::{MovieQuery, RawMovie, TmdbApi};

pub const DEFAULT_DISCOVER_PAGES: u32 = 3;
pub const DEFAULT_TRENDING_PAGES: u32 = 2;
pub const MAX_PAGES: u32 = 10;
const FALLBACK_FEED_PAGES: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseMode {
    /// Weekly trending feed when no filters are set.
    #[default]
    Trending,
    /// Popularity-sorted discovery even without filters.
    Discover,
    /// Now-playing feed; filtered requests fall back to it.
    NewReleases,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateConfig {
    #[serde(default)]
    pub query: String,
    #[serde(flatten)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub mode: BaseMode,
}

impl AggregateConfig {
    pub fn trending() -> Self {
        Self {
            query: String::new(),
            filters: FilterConfig::default(),
            pages: None,
            mode: BaseMode::Trending,
        }
    }

    pub fn filtered(genre: &str, language: &str) -> Self {
        Self {
            filters: FilterConfig::new(genre, language),
            ..Self::trending()
        }
    }

    pub fn search(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Self::trending()
        }
    }

    pub fn with_pages(mut self, pages: u32) -> Self {
        self.pages = Some(pages);
        self
    }

    fn search_query(&self) -> Option<&str> {
        let q = self.query.trim();
        (!q.is_empty()).then_some(q)
    }

    /// Requested page count, or the default for the feed the request resolves to.
    pub fn page_count(&self) -> u32 {
        let default = if self.search_query().is_some()
            || !self.filters.is_unset()
            || self.mode == BaseMode::Discover
        {
            DEFAULT_DISCOVER_PAGES
        } else {
            DEFAULT_TRENDING_PAGES
        };
        self.pages.unwrap_or(default).min(MAX_PAGES)
    }
}

/// One step of an aggregation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub query: MovieQuery,
    pub pages: u32,
}

/// Ordered queries tried for `config` until one yields results.
pub fn plan(config: &AggregateConfig) -> Vec<Attempt> {
    let pages = config.page_count();
    if let Some(query) = config.search_query() {
        return vec![Attempt {
            query: MovieQuery::Search {
                query: query.to_string(),
            },
            pages,
        }];
    }

    let genre = config.filters.genre_id();
    let language = config.filters.language();

    if genre.is_none() && language.is_none() {
        let base = match config.mode {
            BaseMode::Trending => MovieQuery::Trending,
            BaseMode::Discover => MovieQuery::Discover {
                genre: None,
                language: None,
            },
            BaseMode::NewReleases => MovieQuery::NowPlaying { language: None },
        };
        return vec![Attempt { query: base, pages }];
    }

    let mut attempts: Vec<Attempt> = Vec::new();
    let mut push = |query: MovieQuery, pages: u32| {
        if !attempts.iter().any(|a| a.query == query) {
            attempts.push(Attempt { query, pages });
        }
    };
    push(
        MovieQuery::Discover {
            genre,
            language: language.clone(),
        },
        pages,
    );
    if genre.is_some() {
        push(
            MovieQuery::Discover {
                genre,
                language: None,
            },
            pages,
        );
    }
    if language.is_some() {
        push(
            MovieQuery::Discover {
                genre: None,
                language: language.clone(),
            },
            pages,
        );
    }
    let last = match config.mode {
        BaseMode::NewReleases => MovieQuery::NowPlaying { language },
        BaseMode::Trending | BaseMode::Discover => MovieQuery::Trending,
    };
    push(last, FALLBACK_FEED_PAGES);
    attempts
}

#[derive(Clone)]
pub struct Aggregator {
    tmdb: Arc<dyn TmdbApi>,
}

impl Aggregator {
    pub fn new(tmdb: Arc<dyn TmdbApi>) -> Self {
        Self { tmdb }
    }

    /// Runs one aggregation pass. Never fails; total failure yields an empty list.
    pub async fn aggregate(&self, config: &AggregateConfig) -> Vec<MovieSummary> {
        if config.page_count() == 0 {
            debug!("Zero pages requested, skipping aggregation");
            return Vec::new();
        }

        let attempts = plan(config);
        for (step, attempt) in attempts.iter().enumerate() {
            let pool = self.fetch_pool(&attempt.query, attempt.pages).await;
            // A step whose items are all unusable counts as empty.
            let movies = normalize(pool);
            if !movies.is_empty() {
                if step > 0 {
                    info!(step, query = ?attempt.query, "Fallback query produced results");
                }
                return movies;
            }
            if step + 1 < attempts.len() {
                info!(step, query = ?attempt.query, "No results, relaxing query");
            }
        }

        warn!(?config, "Aggregation produced no results");
        Vec::new()
    }

    /// Recommendations for a movie, falling back to similar titles.
    pub async fn related(&self, id: MovieId) -> Vec<MovieSummary> {
        let recommended = match self.tmdb.recommendations(id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(movie_id = id, "Recommendations fetch failed: {:#}", e);
                Vec::new()
            }
        };
        if !recommended.is_empty() {
            return normalize(dedupe_by_id(vec![recommended]));
        }

        match self.tmdb.similar(id).await {
            Ok(items) => normalize(dedupe_by_id(vec![items])),
            Err(e) => {
                warn!(movie_id = id, "Similar titles fetch failed: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn fetch_pool(&self, query: &MovieQuery, pages: u32) -> Vec<RawMovie> {
        let fetches = (1..=pages).map(|page| self.fetch_page(query, page));
        let per_page = join_all(fetches).await;
        dedupe_by_id(per_page)
    }

    async fn fetch_page(&self, query: &MovieQuery, page: u32) -> Vec<RawMovie> {
        match self.tmdb.movie_page(query, page).await {
            Ok(items) => items,
            Err(e) => {
                warn!(endpoint = %query.endpoint(page), "Page fetch failed: {:#}", e);
                Vec::new()
            }
        }
    }
}

/// Merges pages keeping each id at its first-seen position with its last-seen value.
pub fn dedupe_by_id(pages: Vec<Vec<RawMovie>>) -> Vec<RawMovie> {
    let mut positions: HashMap<MovieId, usize> = HashMap::new();
    let mut merged: Vec<RawMovie> = Vec::new();
    for movie in pages.into_iter().flatten() {
        match positions.get(&movie.id) {
            Some(&idx) => merged[idx] = movie,
            None => {
                positions.insert(movie.id, merged.len());
                merged.push(movie);
            }
        }
    }
    merged
}

fn normalize(pool: Vec<RawMovie>) -> Vec<MovieSummary> {
    pool.into_iter()
        .filter_map(|raw| {
            let id = raw.id;
            let summary = raw.into_summary();
            if summary.is_none() {
                debug!(movie_id = id, "Dropping result without a usable title");
            }
            summary
        })
        .collect()
}

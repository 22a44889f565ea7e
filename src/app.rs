use crate::aggregator::{AggregateConfig, Aggregator, BaseMode};
use crate::config::Config;
use crate::favorites::FavoritesStore;
use crate::feed::Feed;
use crate::models::{
    FavoriteEntry, FilterConfig, MovieDetails, MovieId, MovieSummary, WatchProviders,
};
use crate::offline_cache::{default_rules, ResponseCache};
use crate::tmdb::{is_valid_image_request, TmdbApi, TmdbClient};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;
const EMPTY_RESULTS_MESSAGE: &str = "No movies found for these filters.";
const NO_PROVIDERS_MESSAGE: &str = "Not available for streaming yet.";
const DETAILS_UNAVAILABLE: &str = "Movie details are unavailable right now.";
const FAVORITES_UNAVAILABLE: &str = "Favorites could not be saved.";

#[derive(Clone)]
pub struct AppState {
    pub tmdb: Arc<dyn TmdbApi>,
    pub aggregator: Aggregator,
    pub feed: Arc<Feed>,
    pub favorites: Arc<Mutex<FavoritesStore>>,
    pub watch_region: String,
}

impl AppState {
    pub fn new(tmdb: Arc<dyn TmdbApi>, favorites: FavoritesStore, watch_region: &str) -> Self {
        Self {
            aggregator: Aggregator::new(tmdb.clone()),
            tmdb,
            feed: Arc::new(Feed::new()),
            favorites: Arc::new(Mutex::new(favorites)),
            watch_region: watch_region.to_uppercase(),
        }
    }

    fn favorites(&self) -> MutexGuard<'_, FavoritesStore> {
        self.favorites.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn favorite_ids(&self) -> HashSet<MovieId> {
        self.favorites().list().into_iter().map(|e| e.id).collect()
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let cache = Arc::new(ResponseCache::in_memory(
        &config.cache_version,
        default_rules(&config.tmdb_api_base, &config.tmdb_image_base),
    ));
    cache.activate();

    let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::new(&config, cache)?);
    let favorites = FavoritesStore::open(&config.favorites_dir)?;
    info!("Favorites stored in {}", config.favorites_dir.display());

    let state = AppState::new(tmdb, favorites, &config.watch_region);

    let warmup = state.clone();
    tokio::spawn(async move {
        warmup
            .feed
            .refresh(&warmup.aggregator, AggregateConfig::trending())
            .await;
    });

    let app = build_router(state);

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/movies", get(list_movies))
        .route("/api/movies/:id", get(movie_details))
        .route("/api/movies/:id/recommendations", get(recommendations))
        .route("/api/movies/:id/providers", get(watch_providers))
        .route("/api/feed", get(feed_snapshot).post(refresh_feed))
        .route("/api/favorites", get(list_favorites).post(add_favorite))
        .route("/api/favorites/toggle", post(toggle_favorite))
        .route("/api/favorites/:id", delete(remove_favorite))
        .route("/images/:size/*path", get(image))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Default, Deserialize)]
pub struct MoviesParams {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub mode: Option<BaseMode>,
}

impl From<MoviesParams> for AggregateConfig {
    fn from(params: MoviesParams) -> Self {
        AggregateConfig {
            query: params.query,
            filters: FilterConfig::new(&params.genre, &params.language),
            pages: params.pages,
            mode: params.mode.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MovieCard {
    #[serde(flatten)]
    movie: MovieSummary,
    is_favorite: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MoviesResponse {
    movies: Vec<MovieCard>,
    hero: Option<MovieSummary>,
    message: Option<&'static str>,
}

fn cards(state: &AppState, movies: Vec<MovieSummary>) -> MoviesResponse {
    let favorites = state.favorite_ids();
    let hero = movies.first().cloned();
    let message = movies.is_empty().then_some(EMPTY_RESULTS_MESSAGE);
    MoviesResponse {
        movies: movies
            .into_iter()
            .map(|movie| MovieCard {
                is_favorite: favorites.contains(&movie.id),
                movie,
            })
            .collect(),
        hero,
        message,
    }
}

async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<MoviesParams>,
) -> Json<MoviesResponse> {
    let config = AggregateConfig::from(params);
    let movies = state.aggregator.aggregate(&config).await;
    Json(cards(&state, movies))
}

async fn recommendations(
    State(state): State<AppState>,
    Path(id): Path<MovieId>,
) -> Json<MoviesResponse> {
    let movies = state.aggregator.related(id).await;
    Json(cards(&state, movies))
}

async fn feed_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.feed.snapshot())
}

async fn refresh_feed(
    State(state): State<AppState>,
    Json(config): Json<AggregateConfig>,
) -> impl IntoResponse {
    Json(state.feed.refresh(&state.aggregator, config).await)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetailsResponse {
    #[serde(flatten)]
    details: MovieDetails,
    is_favorite: bool,
}

async fn movie_details(State(state): State<AppState>, Path(id): Path<MovieId>) -> Response {
    match state.tmdb.movie_details(id).await {
        Ok(details) => {
            let is_favorite = state.favorites().is_favorite(id);
            Json(DetailsResponse {
                details,
                is_favorite,
            })
            .into_response()
        }
        Err(e) => {
            warn!(movie_id = id, "Details fetch failed: {:#}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": DETAILS_UNAVAILABLE })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProvidersParams {
    region: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProvidersResponse {
    #[serde(flatten)]
    providers: WatchProviders,
    message: Option<&'static str>,
}

async fn watch_providers(
    State(state): State<AppState>,
    Path(id): Path<MovieId>,
    Query(params): Query<ProvidersParams>,
) -> Json<ProvidersResponse> {
    let region = params
        .region
        .map(|r| r.trim().to_uppercase())
        .filter(|r| r.len() == 2 && r.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or_else(|| state.watch_region.clone());
    let providers = match state.tmdb.watch_providers(id, &region).await {
        Ok(p) => p,
        Err(e) => {
            warn!(movie_id = id, "Watch providers fetch failed: {:#}", e);
            WatchProviders {
                region,
                ..WatchProviders::default()
            }
        }
    };
    let message = providers.is_empty().then_some(NO_PROVIDERS_MESSAGE);
    Json(ProvidersResponse { providers, message })
}

async fn list_favorites(State(state): State<AppState>) -> Json<Vec<FavoriteEntry>> {
    Json(state.favorites().list())
}

fn favorites_error(e: anyhow::Error) -> Response {
    error!("Failed to persist favorites: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": FAVORITES_UNAVAILABLE })),
    )
        .into_response()
}

async fn add_favorite(
    State(state): State<AppState>,
    Json(entry): Json<FavoriteEntry>,
) -> Response {
    let id = entry.id;
    match state.favorites().add(entry) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "id": id, "isFavorite": true })),
        )
            .into_response(),
        Err(e) => favorites_error(e),
    }
}

async fn remove_favorite(State(state): State<AppState>, Path(id): Path<MovieId>) -> Response {
    match state.favorites().remove(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => favorites_error(e),
    }
}

async fn toggle_favorite(
    State(state): State<AppState>,
    Json(entry): Json<FavoriteEntry>,
) -> Response {
    let id = entry.id;
    let toggled = state.favorites().toggle(entry);
    match toggled {
        Ok(is_favorite) => {
            info!(movie_id = id, is_favorite, "Favorite toggled");
            Json(json!({ "id": id, "isFavorite": is_favorite })).into_response()
        }
        Err(e) => favorites_error(e),
    }
}

async fn image(
    State(state): State<AppState>,
    Path((size, path)): Path<(String, String)>,
) -> Response {
    let path = format!("/{}", path.trim_start_matches('/'));
    if !is_valid_image_request(&size, &path) {
        return StatusCode::BAD_REQUEST.into_response();
    }
    match state.tmdb.image(&size, &path).await {
        Ok(response) => {
            let content_type = response
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string());
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
                ],
                response.body,
            )
                .into_response()
        }
        Err(e) => {
            warn!("Image {}{} unavailable: {:#}", size, path, e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use goldenscreen::app::{build_router, AppState};
use goldenscreen::favorites::FavoritesStore;
use goldenscreen::models::{
    CastMember, MovieDetails, MovieId, MovieSummary, Provider, Trailer, WatchProviders,
};
use goldenscreen::offline_cache::CachedResponse;
use goldenscreen::tmdb::{MovieQuery, RawMovie, TmdbApi};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;

#[derive(Default)]
struct FakeTmdb {
    pages: HashMap<MovieQuery, Vec<RawMovie>>,
    calls: Mutex<Vec<(MovieQuery, u32)>>,
    details: HashMap<MovieId, MovieDetails>,
    providers: HashMap<MovieId, WatchProviders>,
    recommendations: Vec<RawMovie>,
}

#[async_trait::async_trait]
impl TmdbApi for FakeTmdb {
    async fn movie_page(&self, query: &MovieQuery, page: u32) -> anyhow::Result<Vec<RawMovie>> {
        self.calls.lock().unwrap().push((query.clone(), page));
        if page > 1 {
            return Ok(Vec::new());
        }
        Ok(self.pages.get(query).cloned().unwrap_or_default())
    }

    async fn movie_details(&self, id: MovieId) -> anyhow::Result<MovieDetails> {
        self.details
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("HTTP 404 for movie {}", id))
    }

    async fn recommendations(&self, _id: MovieId) -> anyhow::Result<Vec<RawMovie>> {
        Ok(self.recommendations.clone())
    }

    async fn similar(&self, _id: MovieId) -> anyhow::Result<Vec<RawMovie>> {
        Ok(Vec::new())
    }

    async fn watch_providers(&self, id: MovieId, region: &str) -> anyhow::Result<WatchProviders> {
        Ok(self.providers.get(&id).cloned().unwrap_or(WatchProviders {
            region: region.to_string(),
            ..WatchProviders::default()
        }))
    }

    async fn image(&self, _size: &str, path: &str) -> anyhow::Result<CachedResponse> {
        if path == "/missing.jpg" {
            anyhow::bail!("HTTP 404 for image");
        }
        Ok(CachedResponse::new(
            200,
            Some("image/jpeg".to_string()),
            b"jpeg-bytes".to_vec(),
        ))
    }
}

fn raw(id: MovieId, title: &str, genre_ids: Vec<u32>) -> RawMovie {
    RawMovie {
        id,
        title: Some(title.to_string()),
        original_title: Some(title.to_string()),
        poster_path: Some(format!("/{id}.jpg")),
        vote_average: Some(7.4),
        release_date: Some("2016-07-20".to_string()),
        genre_ids,
        original_language: Some("ko".to_string()),
        ..RawMovie::default()
    }
}

fn discover(genre: Option<u32>, language: Option<&str>) -> MovieQuery {
    MovieQuery::Discover {
        genre,
        language: language.map(str::to_string),
    }
}

fn train_to_busan() -> MovieDetails {
    MovieDetails {
        summary: MovieSummary {
            id: 396535,
            title: "Train to Busan".to_string(),
            original_title: Some("부산행".to_string()),
            poster_path: Some("/busan.jpg".to_string()),
            backdrop_path: None,
            rating: Some(7.8),
            release_date: Some("2016-07-20".to_string()),
            genres: vec!["Horror".to_string(), "Thriller".to_string()],
            original_language: Some("ko".to_string()),
        },
        overview: Some("A zombie outbreak on a bullet train.".to_string()),
        runtime_minutes: Some(118),
        language: Some("Korean".to_string()),
        cast: vec![CastMember {
            name: "Gong Yoo".to_string(),
            character: Some("Seok-woo".to_string()),
            profile_path: None,
        }],
        trailer: Some(Trailer {
            key: "pyWuHv2-Abk".to_string(),
            url: "https://www.youtube.com/watch?v=pyWuHv2-Abk".to_string(),
            embed_url: "https://www.youtube.com/embed/pyWuHv2-Abk".to_string(),
        }),
    }
}

fn fake_tmdb() -> Arc<FakeTmdb> {
    let mut pages = HashMap::new();
    pages.insert(
        discover(None, Some("ko")),
        vec![
            raw(396535, "Train to Busan", vec![27, 28]),
            raw(496243, "Parasite", vec![35, 53]),
        ],
    );
    pages.insert(MovieQuery::Trending, vec![raw(1, "Trending One", vec![18])]);

    let mut details = HashMap::new();
    details.insert(396535, train_to_busan());

    let mut providers = HashMap::new();
    providers.insert(
        496243,
        WatchProviders {
            region: "US".to_string(),
            link: Some("https://www.themoviedb.org/movie/496243/watch".to_string()),
            flatrate: vec![Provider {
                name: "Hulu".to_string(),
                logo_path: Some("/hulu.png".to_string()),
            }],
            rent: Vec::new(),
            buy: Vec::new(),
        },
    );

    Arc::new(FakeTmdb {
        pages,
        details,
        providers,
        recommendations: vec![raw(496243, "Parasite", vec![35])],
        ..FakeTmdb::default()
    })
}

fn app_with(tmdb: Arc<FakeTmdb>) -> Router {
    build_router(AppState::new(tmdb, FavoritesStore::in_memory(), "us"))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(request).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn favorite_body(id: MovieId, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "posterPath": format!("/{id}.jpg"),
        "rating": 7.8,
        "releaseDate": "2016-07-20",
        "genres": ["Horror"]
    })
}

fn ids(body: &Value) -> Vec<i64> {
    body["movies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn empty_genre_filter_relaxes_to_language() {
    let tmdb = fake_tmdb();
    let app = app_with(tmdb.clone());

    let (status, body) = send(&app, get("/api/movies?genre=horror&language=ko")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec![396535, 496243]);
    assert_eq!(body["hero"]["title"], "Train to Busan");
    assert_eq!(body["movies"][0]["genres"], json!(["Horror", "Action"]));
    assert!(body["message"].is_null());

    let queried: Vec<MovieQuery> = tmdb
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, page)| *page == 1)
        .map(|(q, _)| q.clone())
        .collect();
    assert_eq!(
        queried,
        vec![
            discover(Some(27), Some("ko")),
            discover(Some(27), None),
            discover(None, Some("ko")),
        ]
    );
}

#[tokio::test]
async fn nothing_anywhere_reports_empty_message() {
    let app = app_with(Arc::new(FakeTmdb::default()));

    let (status, body) = send(&app, get("/api/movies?genre=western&pages=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ids(&body).is_empty());
    assert!(body["hero"].is_null());
    assert_eq!(body["message"], "No movies found for these filters.");
}

#[tokio::test]
async fn favorites_round_trip_over_http() {
    let app = app_with(fake_tmdb());

    let (status, body) = send(
        &app,
        post_json("/api/favorites", favorite_body(396535, "Train to Busan")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["isFavorite"], true);

    let (status, _) = send(
        &app,
        post_json("/api/favorites", favorite_body(396535, "Train to Busan")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, list) = send(&app, get("/api/favorites")).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["posterPath"], "/396535.jpg");

    let (_, movies) = send(&app, get("/api/movies?language=ko")).await;
    assert_eq!(movies["movies"][0]["isFavorite"], true);
    assert_eq!(movies["movies"][1]["isFavorite"], false);

    let (status, toggled) = send(
        &app,
        post_json("/api/favorites/toggle", favorite_body(496243, "Parasite")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled, json!({ "id": 496243, "isFavorite": true }));

    let (_, toggled) = send(
        &app,
        post_json("/api/favorites/toggle", favorite_body(496243, "Parasite")),
    )
    .await;
    assert_eq!(toggled["isFavorite"], false);

    let delete = Request::delete("/api/favorites/396535")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let delete_again = Request::delete("/api/favorites/396535")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete_again).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, list) = send(&app, get("/api/favorites")).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn details_include_favorite_flag_and_trailer() {
    let app = app_with(fake_tmdb());
    send(
        &app,
        post_json("/api/favorites", favorite_body(396535, "Train to Busan")),
    )
    .await;

    let (status, body) = send(&app, get("/api/movies/396535")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Train to Busan");
    assert_eq!(body["originalTitle"], "부산행");
    assert_eq!(body["runtimeMinutes"], 118);
    assert_eq!(body["trailer"]["key"], "pyWuHv2-Abk");
    assert_eq!(body["cast"][0]["name"], "Gong Yoo");
    assert_eq!(body["isFavorite"], true);
}

#[tokio::test]
async fn unknown_movie_details_map_to_bad_gateway() {
    let app = app_with(fake_tmdb());
    let (status, body) = send(&app, get("/api/movies/7")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Movie details are unavailable right now.");
}

#[tokio::test]
async fn recommendations_are_listed_as_cards() {
    let app = app_with(fake_tmdb());
    let (status, body) = send(&app, get("/api/movies/396535/recommendations")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec![496243]);
}

#[tokio::test]
async fn providers_report_availability() {
    let app = app_with(fake_tmdb());

    let (_, body) = send(&app, get("/api/movies/496243/providers")).await;
    assert_eq!(body["region"], "US");
    assert_eq!(body["flatrate"][0]["name"], "Hulu");
    assert!(body["message"].is_null());

    let (_, body) = send(&app, get("/api/movies/396535/providers?region=kr")).await;
    assert_eq!(body["region"], "KR");
    assert_eq!(body["message"], "Not available for streaming yet.");
}

#[tokio::test]
async fn images_are_validated_and_proxied() {
    let app = app_with(fake_tmdb());

    let res = app
        .clone()
        .oneshot(get("/images/w500/poster.jpg"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "image/jpeg");
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"jpeg-bytes");

    let res = app
        .clone()
        .oneshot(get("/images/w9999/poster.jpg"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(get("/images/w500/missing.jpg"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn feed_refresh_commits_latest_snapshot() {
    let app = app_with(fake_tmdb());

    let (_, empty) = send(&app, get("/api/feed")).await;
    assert_eq!(empty["sequence"], 0);
    assert!(empty["hero"].is_null());

    let (status, outcome) = send(
        &app,
        post_json("/api/feed", json!({ "genre": "", "language": "ko", "pages": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["committed"], true);
    assert_eq!(outcome["snapshot"]["sequence"], 1);

    let (_, snapshot) = send(&app, get("/api/feed")).await;
    assert_eq!(snapshot["hero"]["id"], 396535);
    assert_eq!(snapshot["config"]["language"], "ko");
    assert_eq!(snapshot["movies"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn health_is_ok() {
    let app = app_with(fake_tmdb());
    let res = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

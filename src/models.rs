use serde::{Deserialize, Serialize};

use crate::genres;

pub type MovieId = i64;

/// Display-ready movie record built from a provider result item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieSummary {
    pub id: MovieId,
    pub title: String,
    pub original_title: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub rating: Option<f32>,
    pub release_date: Option<String>,
    pub genres: Vec<String>,
    pub original_language: Option<String>,
}

impl MovieSummary {
    /// Original title only when it differs from the display title.
    pub fn alternate_title(&self) -> Option<&str> {
        self.original_title
            .as_deref()
            .filter(|original| *original != self.title)
    }
}

/// User-selected criteria. Empty strings mean "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub language: String,
}

impl FilterConfig {
    pub fn new(genre: &str, language: &str) -> Self {
        Self {
            genre: genre.to_string(),
            language: language.to_string(),
        }
    }

    pub fn genre_id(&self) -> Option<u32> {
        if self.genre.trim().is_empty() {
            return None;
        }
        genres::genre_id(&self.genre)
    }

    pub fn language(&self) -> Option<String> {
        genres::normalize_language(&self.language)
    }

    pub fn is_unset(&self) -> bool {
        self.genre_id().is_none() && self.language().is_none()
    }
}

/// Persisted subset of a movie kept in the favorites store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    pub id: MovieId,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl From<&MovieSummary> for FavoriteEntry {
    fn from(movie: &MovieSummary) -> Self {
        Self {
            id: movie.id,
            title: movie.title.clone(),
            poster_path: movie.poster_path.clone(),
            rating: movie.rating,
            release_date: movie.release_date.clone(),
            genres: movie.genres.clone(),
        }
    }
}

impl From<&MovieDetails> for FavoriteEntry {
    fn from(details: &MovieDetails) -> Self {
        Self::from(&details.summary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastMember {
    pub name: String,
    pub character: Option<String>,
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trailer {
    pub key: String,
    pub url: String,
    pub embed_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieDetails {
    #[serde(flatten)]
    pub summary: MovieSummary,
    pub overview: Option<String>,
    pub runtime_minutes: Option<u32>,
    pub language: Option<String>,
    pub cast: Vec<CastMember>,
    pub trailer: Option<Trailer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub name: String,
    pub logo_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchProviders {
    pub region: String,
    pub link: Option<String>,
    pub flatrate: Vec<Provider>,
    pub rent: Vec<Provider>,
    pub buy: Vec<Provider>,
}

impl WatchProviders {
    pub fn is_empty(&self) -> bool {
        self.flatrate.is_empty() && self.rent.is_empty() && self.buy.is_empty()
    }
}

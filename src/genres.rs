//! Static lookup tables: provider genre ids, filter-bar genre tokens and language names.
use once_cell::sync::Lazy;
use std::collections::HashMap;

static GENRE_NAMES: Lazy<HashMap<u32, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (28, "Action"),
        (12, "Adventure"),
        (16, "Animation"),
        (35, "Comedy"),
        (80, "Crime"),
        (99, "Documentary"),
        (18, "Drama"),
        (10751, "Family"),
        (14, "Fantasy"),
        (36, "History"),
        (27, "Horror"),
        (10402, "Music"),
        (9648, "Mystery"),
        (10749, "Romance"),
        (878, "Science Fiction"),
        (10770, "TV Movie"),
        (53, "Thriller"),
        (10752, "War"),
        (37, "Western"),
    ])
});

pub fn genre_name(id: u32) -> Option<&'static str> {
    GENRE_NAMES.get(&id).copied()
}

/// Maps a filter-bar token ("horror", "scifi", ...) to the provider's genre id.
pub fn genre_id(token: &str) -> Option<u32> {
    let id = match token.trim().to_lowercase().as_str() {
        "action" => 28,
        "comedy" => 35,
        "drama" => 18,
        "horror" => 27,
        "romance" => 10749,
        "thriller" => 53,
        "animation" => 16,
        "adventure" => 12,
        "fantasy" => 14,
        "scifi" => 878,
        "mystery" => 9648,
        "crime" => 80,
        "family" => 10751,
        "music" => 10402,
        "history" => 36,
        "war" => 10752,
        "western" => 37,
        "documentary" => 99,
        _ => return None,
    };
    Some(id)
}

/// Accepts only two-letter ISO 639-1 codes; anything else is treated as unset.
pub fn normalize_language(code: &str) -> Option<String> {
    let code = code.trim().to_lowercase();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_lowercase()) {
        Some(code)
    } else {
        None
    }
}

pub fn language_name(code: &str) -> String {
    let name = match code {
        "en" => "English",
        "ar" => "Arabic",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ko" => "Korean",
        "ja" => "Japanese",
        "zh" => "Chinese",
        "hi" => "Hindi",
        "tr" => "Turkish",
        "ru" => "Russian",
        "fa" => "Persian",
        "sv" => "Swedish",
        "da" => "Danish",
        "no" => "Norwegian",
        "nl" => "Dutch",
        "pl" => "Polish",
        "th" => "Thai",
        _ => return code.to_string(),
    };
    name.to_string()
}

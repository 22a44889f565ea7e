use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_API_BASE: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";
pub const DEFAULT_CACHE_VERSION: &str = "goldenscreen-cache-v2";

#[derive(Debug, Clone)]
pub struct Config {
    pub tmdb_api_key: String,
    pub tmdb_api_base: String,
    pub tmdb_image_base: String,
    pub bind_addr: SocketAddr,
    pub favorites_dir: PathBuf,
    pub watch_region: String,
    pub cache_version: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let tmdb_api_key = env::var("TMDB_API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .context("TMDB_API_KEY not set")?;
        let bind_addr = var_or("GOLDENSCREEN_ADDR", "0.0.0.0:3146")
            .parse()
            .context("GOLDENSCREEN_ADDR is not a valid socket address")?;

        Ok(Self {
            tmdb_api_key,
            tmdb_api_base: var_or("TMDB_API_BASE", DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            tmdb_image_base: var_or("TMDB_IMAGE_BASE", DEFAULT_IMAGE_BASE)
                .trim_end_matches('/')
                .to_string(),
            bind_addr,
            favorites_dir: PathBuf::from(var_or("FAVORITES_DIR", "data")),
            watch_region: var_or("WATCH_REGION", "US").to_uppercase(),
            cache_version: var_or("CACHE_VERSION", DEFAULT_CACHE_VERSION),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

//! Run one aggregation pass against TMDB and print what comes back.
//! Usage:
//!   cargo run --bin discover_probe -- <genre|-> <language|-> [pages]
//!   cargo run --bin discover_probe -- search "<query>" [pages]
//! Requires TMDB_API_KEY in the environment (.env supported).
//! Set RUST_LOG=debug to watch the fallback cascade step by step.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use goldenscreen::aggregator::{plan, AggregateConfig, Aggregator};
use goldenscreen::config::Config;
use goldenscreen::offline_cache::{default_rules, ResponseCache};
use goldenscreen::tmdb::{TmdbApi, TmdbClient};
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn parse_args(args: &[String]) -> Result<AggregateConfig> {
    let dash = |s: &str| if s == "-" { String::new() } else { s.to_string() };
    let config = match args {
        [mode, query, rest @ ..] if mode == "search" => {
            with_pages(AggregateConfig::search(query), rest)?
        }
        [genre, language, rest @ ..] => {
            with_pages(AggregateConfig::filtered(&dash(genre), &dash(language)), rest)?
        }
        [] => AggregateConfig::trending(),
        _ => anyhow::bail!("usage: discover_probe <genre|-> <language|-> [pages]"),
    };
    Ok(config)
}

fn with_pages(config: AggregateConfig, rest: &[String]) -> Result<AggregateConfig> {
    match rest.first() {
        Some(p) => Ok(config.with_pages(p.parse().context("pages must be a number")?)),
        None => Ok(config),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = parse_args(&args)?;
    let settings = Config::from_env()?;

    let cache = Arc::new(ResponseCache::in_memory(
        &settings.cache_version,
        default_rules(&settings.tmdb_api_base, &settings.tmdb_image_base),
    ));
    let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::new(&settings, cache)?);

    println!("Plan:");
    for attempt in plan(&config) {
        println!("  {} page(s) of {}", attempt.pages, attempt.query.endpoint(1));
    }

    let movies = Aggregator::new(tmdb).aggregate(&config).await;
    println!("{} movie(s)", movies.len());
    for movie in movies {
        let year = movie
            .release_date
            .as_deref()
            .and_then(|d| d.split('-').next())
            .unwrap_or("----");
        let rating = movie
            .rating
            .map(|r| format!("{r:.1}"))
            .unwrap_or_else(|| "-".to_string());
        match movie.alternate_title() {
            Some(alt) => println!(
                "{:>8}  {}  {:>4}  {} ({})",
                movie.id, year, rating, movie.title, alt
            ),
            None => println!(
                "{:>8}  {}  {:>4}  {}",
                movie.id, year, rating, movie.title
            ),
        }
        if !movie.genres.is_empty() {
            println!("{:>16}{}", "", movie.genres.join(", "));
        }
    }
    Ok(())
}

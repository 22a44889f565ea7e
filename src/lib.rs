pub mod aggregator;
pub mod app;
pub mod config;
pub mod favorites;
pub mod feed;
pub mod genres;
pub mod models;
pub mod offline_cache;
pub mod tmdb;

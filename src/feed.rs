//! Shared display list for the browsing surface.
//!
//! Several refreshes may be in flight when filters change quickly. Each refresh takes a
//! ticket from a monotonically increasing sequence and only commits if no newer refresh
//! has started in the meantime, so a slow, superseded pass can never overwrite newer
//! results.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use crate::aggregator::{AggregateConfig, Aggregator};
use crate::models::MovieSummary;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub sequence: u64,
    pub config: Option<AggregateConfig>,
    pub movies: Vec<MovieSummary>,
    pub hero: Option<MovieSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub committed: bool,
    pub snapshot: FeedSnapshot,
}

#[derive(Debug, Default)]
struct Committed {
    sequence: u64,
    config: Option<AggregateConfig>,
    movies: Vec<MovieSummary>,
}

#[derive(Debug, Default)]
pub struct Feed {
    issued: AtomicU64,
    committed: Mutex<Committed>,
}

impl Feed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the next ticket. Later tickets supersede earlier ones.
    pub fn begin(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket
    }

    /// Stores `movies` if `ticket` is still the latest one issued.
    pub fn commit(&self, ticket: u64, config: AggregateConfig, movies: Vec<MovieSummary>) -> bool {
        let mut committed = self.committed.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_current(ticket) || ticket <= committed.sequence {
            debug!(ticket, "Discarding superseded feed results");
            return false;
        }
        committed.sequence = ticket;
        committed.config = Some(config);
        committed.movies = movies;
        true
    }

    pub async fn refresh(
        &self,
        aggregator: &Aggregator,
        config: AggregateConfig,
    ) -> RefreshOutcome {
        let ticket = self.begin();
        let movies = aggregator.aggregate(&config).await;
        let count = movies.len();
        let committed = self.commit(ticket, config, movies);
        if committed {
            info!(ticket, count, "Feed updated");
        }
        RefreshOutcome {
            committed,
            snapshot: self.snapshot(),
        }
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let committed = self.committed.lock().unwrap_or_else(PoisonError::into_inner);
        FeedSnapshot {
            sequence: committed.sequence,
            config: committed.config.clone(),
            movies: committed.movies.clone(),
            hero: committed.movies.first().cloned(),
        }
    }
}

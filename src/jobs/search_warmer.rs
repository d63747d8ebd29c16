//! Search cache warming and consolidation.
//!
//! `build_search_cache` expands every persisted query into its truncated
//! prefixes and memoizes each of them, trading remote calls now for cache
//! hits while users type. `consolidate_search_cache` merges duplicate
//! persisted records left behind by racing memoizations.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::JobStatus;
use crate::error::PartyError;
use crate::models::RecordId;
use crate::search::{normalize_query, SearchOrigin, SearchService};
use crate::storage::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmSummary {
    /// Every prefix visited, in visiting order.
    pub queries: Vec<String>,
    pub remote_searches: usize,
    pub elapsed: Duration,
}

impl fmt::Display for WarmSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = Duration::from_millis(self.elapsed.as_millis() as u64);
        write!(
            f,
            "{} búsquedas precalentadas ({} remotas) en {}",
            self.queries.len(),
            self.remote_searches,
            humantime::format_duration(elapsed)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationSummary {
    pub queries_examined: usize,
    /// Queries that had duplicate records.
    pub merged: Vec<String>,
    pub records_removed: usize,
}

impl fmt::Display for ConsolidationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} búsquedas revisadas, {} consolidadas, {} registros eliminados",
            self.queries_examined,
            self.merged.len(),
            self.records_removed
        )
    }
}

pub struct SearchCacheWarmer {
    store: Arc<dyn Store>,
    search: Arc<SearchService>,
    warm_memory: bool,
}

impl SearchCacheWarmer {
    /// With `warm_memory` set the in-memory search cache is populated as
    /// well as the persisted one.
    pub fn new(store: Arc<dyn Store>, search: Arc<SearchService>, warm_memory: bool) -> Self {
        Self {
            store,
            search,
            warm_memory,
        }
    }

    /// Memoizes every prefix of every known query.
    ///
    /// A prefix is visited at most once per run even when several seeds
    /// share it. Remote failures abort the run.
    pub async fn build_search_cache(&self, status: &JobStatus) -> Result<WarmSummary, PartyError> {
        let started = Instant::now();
        let seeds = self.store.distinct_search_queries().await?;
        status.message(format!("{} búsquedas conocidas", seeds.len()));

        let mut visited: HashSet<String> = HashSet::new();
        let mut queries = Vec::new();
        let mut remote_searches = 0;

        for seed in seeds {
            let mut prefix = seed;

            while !prefix.is_empty() {
                let key = normalize_query(&prefix);
                prefix.pop();

                if key.is_empty() || !visited.insert(key.clone()) {
                    continue;
                }

                let outcome = self.search.search_with(&key, self.warm_memory).await?;
                if outcome.origin == SearchOrigin::Remote {
                    remote_searches += 1;
                    status.message(format!("'{}' → {} canciones", key, outcome.songs.len()));
                }
                queries.push(key);
            }
        }

        let summary = WarmSummary {
            queries,
            remote_searches,
            elapsed: started.elapsed(),
        };
        info!("🔥 {}", summary);
        Ok(summary)
    }

    /// Leaves at most one persisted record per query.
    ///
    /// Duplicate records are merged into the oldest one, keeping the first
    /// occurrence of each song. Running it again is a no-op.
    pub async fn consolidate_search_cache(
        &self,
        status: &JobStatus,
    ) -> Result<ConsolidationSummary, PartyError> {
        let queries = self.store.distinct_search_queries().await?;
        let mut summary = ConsolidationSummary {
            queries_examined: queries.len(),
            ..Default::default()
        };

        for query in queries {
            let mut records = self.store.find_search_records(&query).await?.into_iter();
            let Some(mut canonical) = records.next() else {
                continue;
            };
            let duplicates: Vec<_> = records.collect();
            if duplicates.is_empty() {
                continue;
            }

            let mut seen: HashSet<RecordId> = canonical.song_ids.iter().copied().collect();
            for record in &duplicates {
                for id in &record.song_ids {
                    if seen.insert(*id) {
                        canonical.song_ids.push(*id);
                    }
                }
            }
            self.store.save_search_record(&canonical).await?;

            let ids: Vec<RecordId> = duplicates.iter().map(|record| record.id).collect();
            let removed = self.store.destroy_search_records(&ids).await?;
            self.search.invalidate(&query);

            warn!(
                "🧹 '{}' tenía {} registros duplicados, consolidados en {}",
                query,
                removed,
                canonical.id
            );
            status.message(format!("'{}' consolidada ({} eliminados)", query, removed));

            summary.records_removed += removed;
            summary.merged.push(query);
        }

        info!("🧹 {}", summary);
        Ok(summary)
    }
}

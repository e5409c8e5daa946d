//! Search coordination: fan a translated request out to every target shard,
//! then merge the partial results into one ranked page.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::SearchConfig;
use crate::domain::{
    Hit, MultiSearchItem, MultiSearchResponse, QueryNode, SearchRequest, SearchResponse, ShardHits,
    TargetSelector,
};
use crate::error::{HelixSearchError, Result};
use crate::query;
use crate::registry::{Index, Registry};

use super::cancel::CancellationToken;
use super::msearch::PairDecoder;

#[derive(Clone)]
pub struct SearchCoordinator {
    registry: Arc<Registry>,
    config: Arc<SearchConfig>,
}

impl SearchCoordinator {
    pub fn new(registry: Arc<Registry>, config: SearchConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn search(&self, selector: &TargetSelector, body: &[u8]) -> Result<SearchResponse> {
        self.search_with_cancel(selector, body, &CancellationToken::new())
            .await
    }

    /// Translates `body` before anything else, so a malformed request never
    /// touches the registry or a shard.
    pub async fn search_with_cancel(
        &self,
        selector: &TargetSelector,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        let request = query::parse_with_default_size(body, self.config.default_size)?;
        self.execute(selector, request, cancel).await
    }

    pub async fn execute(
        &self,
        selector: &TargetSelector,
        request: SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        let started = Instant::now();
        self.check_window(&request)?;
        let targets = self.registry.resolve(selector)?;
        let deadline = request.timeout.unwrap_or_else(|| self.config.timeout());

        let partials = fan_out(&targets, &request, deadline, cancel).await?;
        let shard_total = partials.len();
        let (total, mut hits) = merge_hits(partials, request.from, request.size);
        for hit in &mut hits {
            hit.source = hit.source.take().and_then(|s| request.source.apply(s));
        }

        let took = elapsed_ms(started);
        tracing::debug!(
            indices = targets.len(),
            shards = shard_total,
            total,
            took_ms = took,
            "search finished"
        );
        Ok(SearchResponse::new(took, shard_total, total, hits))
    }

    pub async fn multi_search(&self, default: &TargetSelector, payload: &[u8]) -> Result<MultiSearchResponse> {
        self.multi_search_with_cancel(default, payload, &CancellationToken::new())
            .await
    }

    /// Runs every pair of a multi-search payload. The payload is framed in
    /// full before any pair runs; a framing error fails the whole request.
    /// After that, each pair fails or succeeds on its own and its entry
    /// keeps the pair's position.
    pub async fn multi_search_with_cancel(
        &self,
        default: &TargetSelector,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<MultiSearchResponse> {
        let started = Instant::now();
        let pairs = PairDecoder::decode_all(payload)?;
        let permits = Arc::new(Semaphore::new(self.config.msearch_concurrency.max(1)));

        let mut slots: Vec<Option<MultiSearchItem>> = vec![None; pairs.len()];
        let mut tasks = JoinSet::new();
        for (slot, pair) in pairs.into_iter().enumerate() {
            let header = pair.header.to_vec();
            let body = pair.body.to_vec();
            let coordinator = self.clone();
            let default = default.clone();
            let cancel = cancel.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = coordinator.run_pair(&default, &header, &body, &cancel).await;
                (slot, result)
            });
        }

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(HelixSearchError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((slot, result))) => {
                        if let Err(err) = &result {
                            tracing::warn!(slot, error = %err, "multi-search entry failed");
                        }
                        slots[slot] = Some(MultiSearchItem::from(result));
                    }
                    Some(Err(err)) => {
                        tasks.abort_all();
                        return Err(HelixSearchError::Internal(format!("multi-search task failed: {err}")));
                    }
                },
            }
        }

        let responses = slots
            .into_iter()
            .enumerate()
            .map(|(slot, item)| {
                item.ok_or_else(|| HelixSearchError::Internal(format!("multi-search entry {slot} was never filled")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MultiSearchResponse {
            took: elapsed_ms(started),
            responses,
        })
    }

    async fn run_pair(
        &self,
        default: &TargetSelector,
        header: &[u8],
        body: &[u8],
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        let selector = query::parse_header(header)?.unwrap_or_else(|| default.clone());
        let request = query::parse_with_default_size(body, self.config.default_size)?;
        self.execute(&selector, request, cancel).await
    }

    fn check_window(&self, request: &SearchRequest) -> Result<()> {
        let window = request.window();
        if window > self.config.max_result_window {
            return Err(HelixSearchError::invalid(format!(
                "Result window is too large, from + size must be less than or equal to: [{}] but was [{window}]",
                self.config.max_result_window
            )));
        }
        Ok(())
    }
}

/// Runs the query on every shard of every target on the blocking pool.
/// Stops early, aborting the remaining branches, on the first shard error,
/// on cancellation and on the deadline.
async fn fan_out(
    targets: &[Arc<Index>],
    request: &SearchRequest,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<ShardHits>> {
    let query: Arc<QueryNode> = Arc::new(request.query.clone());
    let limit = request.window();

    let mut branches = JoinSet::new();
    for index in targets {
        for shard in index.shards() {
            let shard = Arc::clone(shard);
            let query = Arc::clone(&query);
            branches.spawn_blocking(move || shard.execute(&query, limit));
        }
    }

    let mut partials = Vec::with_capacity(branches.len());
    let timer = tokio::time::sleep(deadline);
    tokio::pin!(timer);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                branches.abort_all();
                return Err(HelixSearchError::Cancelled);
            }
            () = &mut timer => {
                branches.abort_all();
                return Err(HelixSearchError::Timeout(duration_ms(deadline)));
            }
            joined = branches.join_next() => match joined {
                None => break,
                Some(Ok(Ok(partial))) => partials.push(partial),
                Some(Ok(Err(err))) => {
                    branches.abort_all();
                    return Err(err);
                }
                Some(Err(err)) => {
                    branches.abort_all();
                    return Err(HelixSearchError::Internal(format!("shard task failed: {err}")));
                }
            },
        }
    }
    Ok(partials)
}

/// Sums totals and returns the `[from, from + size)` page of all hits in
/// rank order. Completion order of the partials does not matter.
pub fn merge_hits(partials: Vec<ShardHits>, from: usize, size: usize) -> (u64, Vec<Hit>) {
    let total = partials.iter().map(|p| p.total).sum();
    let mut hits: Vec<Hit> = partials.into_iter().flat_map(|p| p.hits).collect();
    hits.sort_by(Hit::rank_cmp);
    let page = hits.into_iter().skip(from).take(size).collect();
    (total, page)
}

fn elapsed_ms(started: Instant) -> u64 {
    duration_ms(started.elapsed())
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

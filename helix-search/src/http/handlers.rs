use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{
    IndexMeta, MultiSearchResponse, SearchResponse, ShardsInfo, StorageType, TargetSelector,
};
use crate::error::{HelixSearchError, ParseError, Result};
use crate::registry::{Index, Registry};
use crate::services::CancellationToken;

use super::{ApiError, AppState};

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Runs storage work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| HelixSearchError::Internal(format!("blocking task failed: {err}")))?
}

fn registry(state: &AppState) -> Arc<Registry> {
    Arc::clone(state.coordinator.registry())
}

pub async fn search_all(State(state): State<AppState>, body: Bytes) -> ApiResult<SearchResponse> {
    run_search(&state, TargetSelector::All, &body).await
}

pub async fn search_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
    body: Bytes,
) -> ApiResult<SearchResponse> {
    run_search(&state, TargetSelector::from_param(Some(&index)), &body).await
}

/// A dropped request future (client gone) cancels the search through the
/// guard; a completed one disarms it.
async fn run_search(state: &AppState, selector: TargetSelector, body: &[u8]) -> ApiResult<SearchResponse> {
    let cancel = CancellationToken::new();
    let guard = cancel.drop_guard();
    let result = state
        .coordinator
        .search_with_cancel(&selector, body, &cancel)
        .await;
    guard.disarm();
    Ok(Json(result?))
}

pub async fn msearch_all(State(state): State<AppState>, body: Bytes) -> ApiResult<MultiSearchResponse> {
    run_msearch(&state, TargetSelector::All, &body).await
}

pub async fn msearch_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
    body: Bytes,
) -> ApiResult<MultiSearchResponse> {
    run_msearch(&state, TargetSelector::from_param(Some(&index)), &body).await
}

async fn run_msearch(
    state: &AppState,
    default: TargetSelector,
    body: &[u8],
) -> ApiResult<MultiSearchResponse> {
    let cancel = CancellationToken::new();
    let guard = cancel.drop_guard();
    let result = state
        .coordinator
        .multi_search_with_cancel(&default, body, &cancel)
        .await;
    guard.disarm();
    Ok(Json(result?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CreateIndexBody {
    settings: IndexSettings,
    storage_type: Option<StorageType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IndexSettings {
    number_of_shards: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct IndexSummary {
    pub index: String,
    pub storage_type: StorageType,
    pub shard_count: usize,
    pub docs_count: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl IndexSummary {
    fn of(index: &Index) -> Result<Self> {
        Ok(Self {
            index: index.name().to_string(),
            storage_type: index.storage_type(),
            shard_count: index.shard_count(),
            docs_count: index.doc_count()?,
            created_at: index.created_at(),
        })
    }
}

pub async fn create_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Value> {
    let request: CreateIndexBody = if body.trim_ascii().is_empty() {
        CreateIndexBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| HelixSearchError::invalid(format!("invalid index definition: {e}")))?
    };
    let storage_type = request.storage_type.unwrap_or(state.storage.default_storage);
    let shards = request
        .settings
        .number_of_shards
        .unwrap_or(state.storage.default_shards);

    let registry = registry(&state);
    let meta: IndexMeta = blocking(move || {
        let pending = registry.create(&name, storage_type, shards)?;
        Ok(registry.persist(pending)?.meta().clone())
    })
    .await?;
    Ok(Json(json!({
        "acknowledged": true,
        "index": meta.name,
        "storage_type": meta.storage_type,
        "shard_count": meta.shard_count,
    })))
}

pub async fn get_index(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<IndexSummary> {
    let index = state.coordinator.registry().get(&name)?;
    Ok(Json(blocking(move || IndexSummary::of(&index)).await?))
}

pub async fn delete_index(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Value> {
    let registry = registry(&state);
    blocking(move || registry.delete(&name)).await?;
    Ok(Json(json!({ "acknowledged": true })))
}

pub async fn cat_indices(State(state): State<AppState>) -> ApiResult<Vec<IndexSummary>> {
    let indices = state.coordinator.registry().resolve(&TargetSelector::All)?;
    let summaries = blocking(move || indices.iter().map(|i| IndexSummary::of(i)).collect()).await?;
    Ok(Json(summaries))
}

fn document_source(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|e| HelixSearchError::Parse(ParseError::from_json(&e, body)))
}

async fn store_document(state: &AppState, name: &str, id: Option<String>, body: &[u8]) -> ApiResult<Value> {
    let source = document_source(body)?;
    let index = state.coordinator.registry().get(name)?;
    let id = blocking({
        let index = Arc::clone(&index);
        move || index.put_document(id, source)
    })
    .await?;
    Ok(Json(json!({
        "_index": index.name(),
        "_id": id,
        "result": "created",
    })))
}

pub async fn put_document(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Value> {
    store_document(&state, &name, Some(id), &body).await
}

pub async fn add_document(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Value> {
    store_document(&state, &name, None, &body).await
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> ApiResult<Value> {
    let index = state.coordinator.registry().get(&name)?;
    let response = json!({ "_index": index.name(), "_id": id, "result": "deleted" });
    blocking(move || index.delete_document(&id)).await?;
    Ok(Json(response))
}

pub async fn count(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Value> {
    let index = state.coordinator.registry().get(&name)?;
    let shards = ShardsInfo::all_successful(index.shard_count());
    let count = blocking(move || index.doc_count()).await?;
    Ok(Json(json!({ "count": count, "_shards": shards })))
}

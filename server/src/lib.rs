use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use reviewdex_core::config::EngineConfig;
use reviewdex_core::diagnostics::TimingEntry;
use reviewdex_core::persist::{load_index, IndexPaths};
use reviewdex_core::stats::{IndexStatistics, MemoryUsage};
use reviewdex_core::vsm::{top_weighted_terms, SparseVectorSpace, VectorSpace};
use reviewdex_core::{DocId, Diagnostics, Index, QueryEngine, RetrievalModel, Tokenizer};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub model: Option<String>,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub model: RetrievalModel,
    pub terms: Vec<String>,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub key: String,
    pub score: f64,
}

#[derive(Deserialize)]
pub struct TopParams {
    #[serde(default = "default_k")]
    pub n: usize,
}

#[derive(Serialize)]
pub struct DocResponse {
    pub key: String,
    pub doc_id: DocId,
    pub length: u64,
    pub top_terms: Vec<WeightedTerm>,
}

#[derive(Serialize)]
pub struct WeightedTerm {
    pub term: String,
    pub weight: f64,
}

#[derive(Serialize)]
pub struct SimilarResponse {
    pub key: String,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct TermCount {
    pub term: String,
    pub count: u64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub statistics: IndexStatistics,
    pub memory: MemoryUsage,
    pub timings: Vec<TimingEntry>,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub documents: u32,
    pub terms: usize,
    pub took_s: f64,
}

/// Shared server state. The live index sits behind a lock only long enough
/// to clone its `Arc`; a reload swaps in a fully loaded replacement.
#[derive(Clone)]
pub struct AppState {
    pub index_dir: PathBuf,
    pub config: Arc<EngineConfig>,
    pub index: Arc<RwLock<Arc<Index>>>,
    pub tokenizer: Arc<Tokenizer>,
    pub diagnostics: Arc<Diagnostics>,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn load(index_dir: impl Into<PathBuf>, config: EngineConfig, admin_token: Option<String>) -> Result<Self> {
        let index_dir = index_dir.into();
        let diagnostics = Arc::new(Diagnostics::new());
        let (index, _) = load_index(&IndexPaths::new(&index_dir), &config.store, &diagnostics)?;
        let tokenizer = Arc::new(Tokenizer::new(config.tokenizer.clone()));
        Ok(Self {
            index_dir,
            config: Arc::new(config),
            index: Arc::new(RwLock::new(Arc::new(index))),
            tokenizer,
            diagnostics,
            admin_token,
        })
    }

    /// Snapshot of the live index.
    pub fn current(&self) -> Arc<Index> {
        self.index.read().clone()
    }

    fn engine(&self) -> QueryEngine {
        QueryEngine::new(self.current(), self.tokenizer.clone(), self.config.weighting)
    }
}

pub fn build_app(index_dir: String, config: EngineConfig) -> Result<Router> {
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let state = AppState::load(index_dir, config, admin_token)?;

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };
    Ok(router(state).layer(cors).layer(TraceLayer::new_for_http()))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:key", get(doc_handler))
        .route("/doc/:key/similar", get(similar_handler))
        .route("/stats", get(stats_handler))
        .route("/terms/top", get(top_terms_handler))
        .route("/index/reload", post(reload_handler))
        .with_state(state)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let model = match params.model.as_deref() {
        Some(name) => name.parse::<RetrievalModel>().map_err(|e| (StatusCode::BAD_REQUEST, e))?,
        None => RetrievalModel::TfIdf,
    };
    let k = params.k.clamp(1, 100);
    let results = state.engine().search(&reviewdex_core::Query::Text(params.q.clone()), model, k, &state.diagnostics);

    let results_out = results
        .hits
        .into_iter()
        .map(|h| SearchHit { doc_id: h.doc_id, key: h.external_id, score: h.score })
        .collect();
    Ok(Json(SearchResponse {
        query: params.q,
        model,
        terms: results.terms,
        took_s: results.elapsed.as_secs_f64(),
        total_hits: results.total_hits,
        results: results_out,
    }))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<TopParams>,
) -> Result<Json<DocResponse>, ApiError> {
    let index = state.current();
    let Some(doc_id) = index.doc_id(&key) else {
        return Err((StatusCode::NOT_FOUND, format!("no document {key:?}")));
    };
    let length = index.doc(doc_id).map_or(0, |d| d.length);
    let space = SparseVectorSpace::new(index, state.config.weighting);
    let top_terms = top_weighted_terms(&space, doc_id, params.n)
        .into_iter()
        .map(|(term, weight)| WeightedTerm { term, weight })
        .collect();
    Ok(Json(DocResponse { key, doc_id, length, top_terms }))
}

pub async fn similar_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<TopParams>,
) -> Result<Json<SimilarResponse>, ApiError> {
    let index = state.current();
    let Some(doc_id) = index.doc_id(&key) else {
        return Err((StatusCode::NOT_FOUND, format!("no document {key:?}")));
    };
    let space = SparseVectorSpace::new(index.clone(), state.config.weighting);
    let results = {
        let _t = state.diagnostics.timer("Similar Reviews");
        space.most_similar(doc_id, params.n.clamp(1, 100))
    };
    let results = results
        .into_iter()
        .map(|(doc_id, score)| SearchHit {
            doc_id,
            key: index.doc(doc_id).map(|d| d.external_id.clone()).unwrap_or_default(),
            score,
        })
        .collect();
    Ok(Json(SimilarResponse { key, results }))
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let index = state.current();
    Json(StatsResponse {
        statistics: index.statistics(),
        memory: index.memory_usage(),
        timings: state.diagnostics.timings(),
    })
}

pub async fn top_terms_handler(State(state): State<AppState>, Query(params): Query<TopParams>) -> Json<Vec<TermCount>> {
    let terms = state
        .current()
        .most_frequent_terms(params.n.min(1000))
        .into_iter()
        .map(|(term, count)| TermCount { term, count })
        .collect();
    Json(terms)
}

/// Load the live generation from disk and swap it in. The old index keeps
/// serving until the new one is fully loaded; on failure nothing changes.
pub async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<ReloadResponse>, ApiError> {
    authorize(&state, &headers)?;
    let started = std::time::Instant::now();
    let paths = IndexPaths::new(&state.index_dir);
    let store = state.config.store.clone();
    let diagnostics = state.diagnostics.clone();
    let loaded = tokio::task::spawn_blocking(move || load_index(&paths, &store, &diagnostics))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("reload task failed: {e}")))?;
    let (index, _) = loaded.map_err(|e| {
        tracing::warn!(err = %e, "index reload failed, keeping current index");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("reload failed: {e}"))
    })?;

    let response = ReloadResponse {
        documents: index.num_docs(),
        terms: index.vocabulary().len(),
        took_s: started.elapsed().as_secs_f64(),
    };
    *state.index.write() = Arc::new(index);
    tracing::info!(documents = response.documents, terms = response.terms, "index reloaded");
    state.diagnostics.note(format!("reloaded index with {} documents", response.documents));
    Ok(Json(response))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

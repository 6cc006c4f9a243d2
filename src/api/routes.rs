//! HTTP endpoints
//!
//! GET-only triggers over the pipeline operations:
//! - `/most-frequent-words?limit=`
//! - `/process-dataset?minFrequency=`
//! - `/resolve?name=`
//! - `/potential-names?limit=`

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::candidates::CandidateGenerator;
use crate::error::{AuthorityError, IngestError, ResolveError, StoreError};
use crate::ingest::{IngestReport, Ingestor};
use crate::resolver::EntityResolver;
use crate::store::{Entity, FrequencyRecord, NameStore};

const DEFAULT_TOP_LIMIT: usize = 100;
const DEFAULT_CANDIDATE_LIMIT: usize = 10;
const MAX_LIMIT: usize = 10_000;

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn NameStore>,
    ingestor: Arc<Ingestor>,
    resolver: Arc<EntityResolver>,
    generator: Arc<CandidateGenerator>,
    /// Serializes ingestion runs
    ingest_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn NameStore>,
        ingestor: Arc<Ingestor>,
        resolver: Arc<EntityResolver>,
    ) -> Self {
        let generator = Arc::new(CandidateGenerator::new(store.clone(), resolver.clone()));
        Self {
            store,
            ingestor,
            resolver,
            generator,
            ingest_lock: Arc::new(Mutex::new(())),
        }
    }
}

// Request types
#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessParams {
    #[serde(rename = "minFrequency")]
    pub min_frequency: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    pub name: String,
}

// Response types
#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub name: String,
    pub entity: Option<Entity>,
}

#[derive(Debug, Serialize)]
pub struct CandidatesResponse {
    pub candidates: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

fn store_error(e: StoreError) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e)
}

fn clamp_limit(limit: Option<usize>, default: usize) -> usize {
    limit.unwrap_or(default).clamp(1, MAX_LIMIT)
}

/// GET /most-frequent-words
async fn most_frequent_words(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<FrequencyRecord>>, ApiError> {
    let limit = clamp_limit(params.limit, DEFAULT_TOP_LIMIT);
    state
        .store
        .top_words(limit)
        .await
        .map(Json)
        .map_err(store_error)
}

/// GET /process-dataset
async fn process_dataset(
    State(state): State<AppState>,
    Query(params): Query<ProcessParams>,
) -> Result<Json<IngestReport>, ApiError> {
    let _guard = state.ingest_lock.lock().await;

    let result = match params.min_frequency {
        Some(min_frequency) => state.ingestor.run(min_frequency).await,
        None => state.ingestor.run_default().await,
    };

    result.map(Json).map_err(|e| {
        warn!(error = %e, "Ingestion request failed");
        let status = match e {
            IngestError::Fetch(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, e)
    })
}

/// GET /resolve
async fn resolve(
    State(state): State<AppState>,
    Query(params): Query<ResolveParams>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let name = params.name.trim();
    if name.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "name must not be empty"));
    }

    match state.resolver.resolve_name(name).await {
        Ok(entity) => Ok(Json(ResolveResponse {
            name: name.to_string(),
            entity,
        })),
        Err(e) => {
            let status = match &e {
                ResolveError::Authority(AuthorityError::RateLimited { .. }) => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                ResolveError::Authority(AuthorityError::NotConfigured) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ResolveError::Authority(_) => StatusCode::BAD_GATEWAY,
                ResolveError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err(api_error(status, e))
        }
    }
}

/// GET /potential-names
async fn potential_names(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<CandidatesResponse>, ApiError> {
    let limit = clamp_limit(params.limit, DEFAULT_CANDIDATE_LIMIT);
    state
        .generator
        .generate_candidates(limit)
        .await
        .map(|candidates| Json(CandidatesResponse { candidates }))
        .map_err(store_error)
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/most-frequent-words", get(most_frequent_words))
        .route("/process-dataset", get(process_dataset))
        .route("/resolve", get(resolve))
        .route("/potential-names", get(potential_names))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{AuthorityMatch, AuthorityService, IssuedToken};
    use crate::config::{CorpusConfig, IngestConfig};
    use crate::corpus::CorpusFetcher;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct OneBand;

    #[async_trait]
    impl AuthorityService for OneBand {
        async fn issue_token(&self) -> Result<IssuedToken, AuthorityError> {
            Ok(IssuedToken {
                access_token: "tok".into(),
                expires_in: Duration::from_secs(3600),
            })
        }

        async fn search(
            &self,
            _token: &str,
            query: &str,
            _limit: usize,
        ) -> Result<Vec<AuthorityMatch>, AuthorityError> {
            if query.eq_ignore_ascii_case("queen") {
                return Ok(vec![AuthorityMatch {
                    name: "Queen".into(),
                    popularity: 80,
                    data: serde_json::json!({ "name": "Queen" }),
                }]);
            }
            Ok(vec![])
        }
    }

    async fn spawn_app(store: Arc<MemoryStore>, data_dir: &std::path::Path) -> String {
        let corpus = CorpusConfig {
            shards: vec![],
            data_dir: data_dir.to_path_buf(),
            ..CorpusConfig::default()
        };
        let fetcher = CorpusFetcher::new(corpus).unwrap();
        let ingestor = Arc::new(Ingestor::new(
            fetcher,
            store.clone(),
            IngestConfig::default(),
        ));
        let resolver = Arc::new(EntityResolver::new(Arc::new(OneBand), store.clone(), 50));
        let app = create_router(AppState::new(store, ingestor, resolver));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_frequencies(&[
                FrequencyRecord {
                    word: "zeppelin".into(),
                    frequency: 900,
                },
                FrequencyRecord {
                    word: "queen".into(),
                    frequency: 800,
                },
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_most_frequent_words_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_app(seeded().await, dir.path()).await;

        let words: Vec<FrequencyRecord> = reqwest::get(format!("{base}/most-frequent-words?limit=1"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].word, "zeppelin");
    }

    #[tokio::test]
    async fn test_resolve_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_app(seeded().await, dir.path()).await;

        let body: serde_json::Value = reqwest::get(format!("{base}/resolve?name=queen"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["entity"]["name"], "Queen");
        assert_eq!(body["entity"]["popularity"], 80);

        let response = reqwest::get(format!("{base}/resolve?name=%20"))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_potential_names_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded().await;
        let base = spawn_app(store.clone(), dir.path()).await;

        let body: serde_json::Value = reqwest::get(format!("{base}/potential-names?limit=5"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["candidates"], serde_json::json!(["zeppelin"]));
        assert!(store.find_entity("queen").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_process_dataset_with_no_shards() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_app(seeded().await, dir.path()).await;

        let body: serde_json::Value = reqwest::get(format!("{base}/process-dataset?minFrequency=5"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["shards"], serde_json::json!([]));
    }
}

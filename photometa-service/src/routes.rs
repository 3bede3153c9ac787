use crate::error::AppError;
use crate::state::SharedState;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use photometa_core::{FieldValues, Library, ListFilter, Namespace, QueryPage, ScanSnapshot};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn parse_namespace(s: &str) -> Result<Namespace, AppError> {
    Namespace::parse(s).ok_or_else(|| AppError::bad_request(format!("unknown namespace: {s}")))
}

/// Directory argument for scan and listing endpoints: absent means the
/// library root itself.
fn target_dir(library: &Library, dir: &Option<PathBuf>) -> PathBuf {
    dir.clone().unwrap_or_else(|| library.root().to_path_buf())
}

// GET /status
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub libraries: usize,
}

pub async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        libraries: state.library_count().await,
    })
}

// POST /scan
#[derive(Deserialize)]
pub struct ScanRequest {
    pub library: PathBuf,
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Serialize)]
pub struct ScanResponse {
    pub started: bool,
    pub total: usize,
}

pub async fn start_scan(
    State(state): State<SharedState>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, AppError> {
    let library = state.library(&req.library).await?;
    let dir = target_dir(&library, &req.dir);
    let started = tokio::task::spawn_blocking(move || {
        library.start_scan(&dir, req.force).map(|s| ScanResponse {
            started: s.started,
            total: s.total,
        })
    })
    .await??;
    Ok(Json(started))
}

// DELETE /scan
#[derive(Deserialize)]
pub struct CancelRequest {
    pub library: PathBuf,
    pub dir: Option<PathBuf>,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

pub async fn cancel_scan(
    State(state): State<SharedState>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, AppError> {
    let library = state.library(&req.library).await?;
    let dir = target_dir(&library, &req.dir);
    let cancelled = library.cancel_scan(&dir)?;
    Ok(Json(CancelResponse { cancelled }))
}

// GET /scan/status
#[derive(Deserialize)]
pub struct ScanStatusParams {
    pub library: PathBuf,
    pub dir: Option<PathBuf>,
}

pub async fn scan_status(
    State(state): State<SharedState>,
    Query(params): Query<ScanStatusParams>,
) -> Result<Json<ScanSnapshot>, AppError> {
    let library = state.library(&params.library).await?;
    let dir = target_dir(&library, &params.dir);
    Ok(Json(library.scan_status(&dir)?))
}

// GET /images
#[derive(Deserialize)]
pub struct ListParams {
    pub library: PathBuf,
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub page: usize,
    pub page_size: Option<usize>,
    pub search: Option<String>,
    pub namespace: Option<String>,
    pub field: Option<String>,
    #[serde(default)]
    pub untagged: bool,
}

impl ListParams {
    fn filter(&self) -> Result<ListFilter, AppError> {
        let scope = match (&self.namespace, &self.field) {
            (Some(ns), Some(field)) => Some((parse_namespace(ns)?, field.clone())),
            (None, None) => None,
            _ => {
                return Err(AppError::bad_request(
                    "namespace and field must be given together",
                ))
            }
        };

        let query = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());

        // A field with no search text means "find files missing this field"
        if self.untagged || (query.is_none() && scope.is_some()) {
            let (namespace, field) = scope.ok_or_else(|| {
                AppError::bad_request("untagged listing requires namespace and field")
            })?;
            return Ok(ListFilter::Untagged { namespace, field });
        }
        match query {
            Some(q) => Ok(ListFilter::Search {
                query: q.to_string(),
                field: scope,
            }),
            None => Ok(ListFilter::All),
        }
    }
}

pub async fn list_images(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<QueryPage>, AppError> {
    let library = state.library(&params.library).await?;
    let filter = params.filter()?;
    let dir = target_dir(&library, &params.dir);
    let page = tokio::task::spawn_blocking(move || {
        library.list_images(&dir, &filter, params.page, params.page_size)
    })
    .await??;
    Ok(Json(page))
}

// GET /metadata
#[derive(Deserialize)]
pub struct MetadataParams {
    pub library: PathBuf,
    pub path: PathBuf,
}

#[derive(Serialize)]
pub struct MetadataResponse {
    pub path: PathBuf,
    pub fields: Vec<FieldValues>,
}

pub async fn read_metadata(
    State(state): State<SharedState>,
    Query(params): Query<MetadataParams>,
) -> Result<Json<MetadataResponse>, AppError> {
    let library = state.library(&params.library).await?;
    let path = params.path.clone();
    let fields =
        tokio::task::spawn_blocking(move || library.read_metadata(&params.path)).await??;
    Ok(Json(MetadataResponse { path, fields }))
}

// PUT /metadata
#[derive(Deserialize)]
pub struct WriteRequest {
    pub library: PathBuf,
    pub path: PathBuf,
    pub namespace: String,
    pub key: String,
    pub values: Vec<String>,
}

#[derive(Serialize)]
pub struct WriteResponse {
    pub key: String,
    pub values: Vec<String>,
}

pub async fn write_metadata(
    State(state): State<SharedState>,
    Json(req): Json<WriteRequest>,
) -> Result<Json<WriteResponse>, AppError> {
    let library = state.library(&req.library).await?;
    let namespace = parse_namespace(&req.namespace)?;
    let key = req.key.clone();
    let values = tokio::task::spawn_blocking(move || {
        library.write_field(&req.path, namespace, &req.key, &req.values)
    })
    .await??;
    Ok(Json(WriteResponse { key, values }))
}

// GET /tags/search
#[derive(Deserialize)]
pub struct TagSearchParams {
    pub library: PathBuf,
    #[serde(default)]
    pub q: String,
    pub namespace: Option<String>,
    pub field: Option<String>,
    pub limit: Option<usize>,
}

pub async fn search_tags(
    State(state): State<SharedState>,
    Query(params): Query<TagSearchParams>,
) -> Result<Json<Vec<String>>, AppError> {
    let library = state.library(&params.library).await?;
    let scope = match (&params.namespace, &params.field) {
        (Some(ns), Some(field)) => Some((parse_namespace(ns)?, field.clone())),
        (None, None) => None,
        _ => {
            return Err(AppError::bad_request(
                "namespace and field must be given together",
            ))
        }
    };
    let limit = params.limit.unwrap_or(20);
    let values = tokio::task::spawn_blocking(move || {
        let scope = scope.as_ref().map(|(ns, f)| (*ns, f.as_str()));
        library.search_tags(&params.q, scope, limit)
    })
    .await??;
    Ok(Json(values))
}

// GET /fields
pub async fn fields() -> Json<&'static [photometa_core::FieldDef]> {
    Json(photometa_core::FIELD_DEFS)
}

// GET /images/thumbnail and /images/preview
#[derive(Deserialize)]
pub struct ArtifactParams {
    pub library: PathBuf,
    pub path: PathBuf,
}

pub async fn thumbnail(
    State(state): State<SharedState>,
    Query(params): Query<ArtifactParams>,
) -> Result<impl IntoResponse, AppError> {
    serve_artifact(state, params, Library::thumbnail).await
}

pub async fn preview(
    State(state): State<SharedState>,
    Query(params): Query<ArtifactParams>,
) -> Result<impl IntoResponse, AppError> {
    serve_artifact(state, params, Library::preview).await
}

async fn serve_artifact(
    state: SharedState,
    params: ArtifactParams,
    render: fn(&Library, &Path) -> photometa_core::Result<PathBuf>,
) -> Result<impl IntoResponse, AppError> {
    let library = state.library(&params.library).await?;
    let artifact = tokio::task::spawn_blocking({
        let library = Arc::clone(&library);
        move || render(&library, &params.path)
    })
    .await??;
    let bytes = tokio::fs::read(&artifact)
        .await
        .map_err(AppError::internal)?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

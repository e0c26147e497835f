use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, error};

use crate::common::error::{RecordError, RecordErrorKind};
use crate::engine::bulk::{self, ImportSummary};
use crate::engine::{RecordService, SweepReport};
use crate::record::{Record, RecordType};

use super::models::*;

/// 共享应用状态
#[derive(Clone)]
pub struct AppState {
    pub service: RecordService,
}

/// 引擎错误到 HTTP 响应的映射，`Store` 类错误只返回通用信息
pub struct ApiError(pub RecordError);

impl From<RecordError> for ApiError {
    fn from(e: RecordError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            RecordErrorKind::InvalidHostname
            | RecordErrorKind::InvalidRecord
            | RecordErrorKind::CnameCycle
            | RecordErrorKind::ChainTooDeep => StatusCode::BAD_REQUEST,
            RecordErrorKind::DuplicateValue | RecordErrorKind::TypeClash => StatusCode::CONFLICT,
            RecordErrorKind::RecordNotFound | RecordErrorKind::ValueNotFound => StatusCode::NOT_FOUND,
            RecordErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }
        let body = ErrorBody {
            code: self.0.kind().as_str().to_string(),
            message: self.0.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// GET /version
pub async fn get_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /api/dns
pub async fn create_record(
    State(state): State<AppState>,
    body: Result<Json<CreateRecordRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateRecordResponse>)> {
    let Json(req) = body.map_err(|e| RecordError::InvalidRecord(e.body_text()))?;
    let record = req.into_new_record(state.service.settings().default_ttl_secs);
    let committed = state.service.create_record(record).await?;
    let record = committed.value;
    Ok((
        StatusCode::CREATED,
        Json(CreateRecordResponse {
            message: "Record added".to_string(),
            hostname: record.hostname.clone(),
            record: RecordView::from(&record),
        }),
    ))
}

/// GET /api/dns/{hostname}
pub async fn resolve(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
) -> ApiResult<Json<ResolveResponse>> {
    let resolved = state.service.resolve(&hostname).await?;
    Ok(Json(ResolveResponse::from(resolved)))
}

/// GET /api/dns/{hostname}/records
pub async fn list_records(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
) -> ApiResult<Json<ListRecordsResponse>> {
    let records = state.service.list_records(&hostname).await?;
    Ok(Json(ListRecordsResponse {
        hostname: records
            .first()
            .map(|r| r.hostname.clone())
            .unwrap_or(hostname),
        records: records.iter().map(RecordView::from).collect(),
    }))
}

/// DELETE /api/dns/{hostname}?type=A&value=1.2.3.4
pub async fn delete_record(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
    query: Result<Query<DeleteQuery>, axum::extract::rejection::QueryRejection>,
) -> ApiResult<Json<DeleteResponse>> {
    let Query(query) = query.map_err(|e| RecordError::InvalidRecord(e.body_text()))?;
    let record_type: RecordType = query.record_type.parse()?;
    let committed = state
        .service
        .delete_record(&hostname, record_type, &query.value)
        .await?;
    Ok(Json(DeleteResponse::new(
        committed.ack.hostname().to_string(),
        &committed.value,
    )))
}

/// POST /api/dns/bulk/import
///
/// 请求体直接是 JSON 数组，或者 multipart/form-data 上传的 JSON 文件（字段名 `file`）
pub async fn bulk_import(State(state): State<AppState>, req: Request) -> ApiResult<Json<ImportSummary>> {
    let is_upload = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let body = if is_upload {
        let multipart = Multipart::from_request(req, &state)
            .await
            .map_err(|e| RecordError::InvalidRecord(e.body_text()))?;
        read_upload(multipart).await?
    } else {
        String::from_request(req, &state)
            .await
            .map_err(|e| RecordError::InvalidRecord(e.body_text()))?
    };

    let items = bulk::parse_items(&body)?;
    Ok(Json(bulk::import(&state.service, items).await))
}

/// 取出上传的文件内容；优先 `file` 字段，其次任意带文件名的字段
async fn read_upload(mut multipart: Multipart) -> Result<String, RecordError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RecordError::InvalidRecord(e.body_text()))?
    {
        if field.name() == Some("file") || field.file_name().is_some() {
            debug!(file = ?field.file_name(), "bulk import upload received");
            return field
                .text()
                .await
                .map_err(|e| RecordError::InvalidRecord(e.body_text()));
        }
    }
    Err(RecordError::InvalidRecord(
        "multipart upload carries no file field".to_string(),
    ))
}

/// GET /api/dns/bulk/export
pub async fn bulk_export(State(state): State<AppState>) -> ApiResult<Json<Vec<Record>>> {
    Ok(Json(state.service.export().await?))
}

/// POST /api/dns/admin/purge
pub async fn purge_expired(State(state): State<AppState>) -> ApiResult<Json<SweepReport>> {
    Ok(Json(state.service.reaper().run_once().await?))
}

/// POST /api/dns/admin/cache/flush
pub async fn flush_cache(State(state): State<AppState>) -> Json<FlushResponse> {
    Json(FlushResponse {
        dropped: state.service.flush_cache().await,
    })
}

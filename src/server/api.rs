use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_typed_multipart::TypedMultipart;
use log::info;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::metrics::{self, QueryKind};

/// 使用文本搜索图片
#[utoipa::path(
    get,
    path = "/api/search",
    params(TextQuery),
    responses(
        (status = 200, body = SearchResponse),
        (status = 400, description = "缺少搜索文本"),
    )
)]
pub async fn text_search_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TextQuery>,
) -> Result<Response> {
    let Some(text) = query.text.filter(|t| !t.trim().is_empty()) else {
        return Ok((StatusCode::BAD_REQUEST, "text is required").into_response());
    };
    let count = state.result_count(query.count);

    info!("正在搜索文本: {text:?}");
    let start = Instant::now();
    let vector = state.embed_text(text).await?;
    let result = state.db.search_vector(&vector, count, None).await?;
    Ok(Json(finish(QueryKind::Text, start, result)).into_response())
}

/// 使用上传的图片搜索相似图片
#[utoipa::path(
    post,
    path = "/api/search",
    request_body(content = SearchForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = SearchResponse),
    )
)]
pub async fn image_search_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(data): TypedMultipart<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let count = state.result_count(data.count);

    info!("正在搜索上传图片，大小 {} 字节", data.file.len());
    let start = Instant::now();
    let vector = state.embed_image_bytes(data.file).await?;
    let result = state.db.search_vector(&vector, count, None).await?;
    Ok(Json(finish(QueryKind::Image, start, result)))
}

/// Prometheus 指标
#[utoipa::path(get, path = "/metrics", responses((status = 200, body = String)))]
pub async fn metrics_handler() -> Result<Response> {
    let body = metrics::gather_text()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response())
}

fn finish(kind: QueryKind, start: Instant, result: Vec<crate::imdb::SearchResult>) -> SearchResponse {
    let elapsed = start.elapsed();
    metrics::observe_query(kind, elapsed.as_secs_f32(), result.first().map(|r| r.score));
    SearchResponse { time: elapsed.as_millis() as u64, result }
}
